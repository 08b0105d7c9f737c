//! Semantic operation trees.
//!
//! An [`Operation`] is the language-neutral, post-binding view of a method body. Every
//! node has an [`OperationKind`] drawn from a closed set, the syntax it was bound from,
//! an optional result type and constant value, and exactly the children that kind
//! defines. Children are typed fields of [`OperationNode`] rather than an untyped
//! list; [`Operation::children`] flattens them in the fixed order walkers use.
//!
//! Trees are built by a language's binder when a body's semantics are requested and
//! are never mutated afterwards.
//!
//! # Key Components
//!
//! - [`Operation`] / [`OperationNode`] - A node and its kind-specific shape
//! - [`OperationVisitor`] / [`OperationVisitorWithResult`] - Dispatch over the closed kind set
//! - [`OperationWalker`] - Depth-first traversal with a recursion guard
//! - [`analyze_control_flow`] / [`analyze_data_flow`] - Region analyses over statements
//!
//! # Usage Examples
//!
//! ```rust
//! use dotcompile::operations::{
//!     BinaryOperatorKind, ConstantValue, Operation, OperationKind, OperationNode,
//! };
//!
//! let sum = Operation::new(OperationNode::BinaryOperator {
//!     operator: BinaryOperatorKind::Add,
//!     left: Box::new(Operation::literal(ConstantValue::Int32(1))),
//!     right: Box::new(Operation::literal(ConstantValue::Int32(2))),
//!     operator_method: None,
//! });
//! assert_eq!(sum.kind(), OperationKind::BinaryOperator);
//! assert_eq!(sum.children().len(), 2);
//! ```

mod flow;
mod visitor;
mod walker;

pub use flow::{analyze_control_flow, analyze_data_flow, ControlFlowAnalysis, DataFlowAnalysis};
pub use visitor::{OperationVisitor, OperationVisitorWithResult};
pub use walker::{OperationWalker, DEFAULT_MAX_DEPTH};

use std::{fmt, sync::Arc};

use strum::{Display, EnumCount, EnumIter};

use crate::{
    symbols::{FieldSymbol, LocalSymbol, MethodSymbol, ParameterSymbol, TypeSymbol},
    syntax::SyntaxNode,
};

/// Closed set of operation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount, Display)]
pub enum OperationKind {
    /// `{ ... }`
    Block,
    /// A statement declaring one or more locals.
    VariableDeclarationStatement,
    /// One declared local with its initializer.
    VariableDeclaration,
    /// `switch`
    Switch,
    /// One section of a `switch`.
    SwitchCase,
    /// `case value:`
    SingleValueCaseClause,
    /// `case < value:`
    RelationalCaseClause,
    /// `case min to max:`
    RangeCaseClause,
    /// `default:`
    DefaultCaseClause,
    /// `if` / `else`
    If,
    /// `while`, `do`/`while` and their `until` forms.
    WhileUntilLoop,
    /// `for`
    ForLoop,
    /// `foreach`
    ForEachLoop,
    /// `label:`
    Labeled,
    /// `break`, `continue`, `goto`
    Branch,
    /// `;`
    Empty,
    /// `throw`
    Throw,
    /// `return`
    Return,
    /// `yield break`
    YieldBreak,
    /// `yield return`
    YieldReturn,
    /// `lock`
    Lock,
    /// `try` / `catch` / `finally`
    Try,
    /// One `catch` of a `try`.
    CatchClause,
    /// `using`
    Using,
    /// An expression used as a statement.
    ExpressionStatement,
    /// An expression or statement that failed to bind.
    Invalid,
    /// A literal.
    Literal,
    /// A conversion.
    Conversion,
    /// A method call.
    Invocation,
    /// An argument to a call or object creation.
    Argument,
    /// An omitted optional argument.
    OmittedArgument,
    /// `a[i]`
    ArrayElementReference,
    /// A local variable use.
    LocalReference,
    /// A parameter use.
    ParameterReference,
    /// A field use.
    FieldReference,
    /// A method group bound to a single method.
    MethodBinding,
    /// A unary operator.
    UnaryOperator,
    /// A binary operator.
    BinaryOperator,
    /// `c ? a : b`
    ConditionalChoice,
    /// `a ?? b`
    NullCoalescing,
    /// A lambda.
    Lambda,
    /// `new T(...)`
    ObjectCreation,
    /// `new { A = ... }`
    AnonymousObjectCreation,
    /// `new T[n]`
    ArrayCreation,
    /// `{ a, b }` in an array creation.
    ArrayInitializer,
    /// `this`, `base` or an implicit receiver.
    InstanceReference,
    /// `x is T`
    IsType,
    /// `await`
    Await,
    /// `a = b`
    Assignment,
    /// `a += b` and friends.
    CompoundAssignment,
    /// `++` / `--`
    Increment,
    /// `(a)`
    Parenthesized,
    /// `a?.b`
    ConditionalAccess,
    /// The receiver inside a conditional access.
    ConditionalAccessInstance,
    /// `default(T)`
    DefaultValue,
    /// `typeof(T)`
    TypeOf,
    /// `sizeof(T)`
    SizeOf,
    /// `&a`
    AddressOf,
    /// `*p`
    PointerIndirectionReference,
    /// `$"..."`
    InterpolatedString,
    /// Literal text inside an interpolated string.
    InterpolatedStringText,
    /// `{expr,alignment:format}` inside an interpolated string.
    Interpolation,
    /// `(a, b)`
    Tuple,
    /// A field initializer at its declaration.
    FieldInitializer,
    /// A parameter default value.
    ParameterInitializer,
}

impl OperationKind {
    /// `true` for statement kinds.
    #[must_use]
    pub fn is_statement(self) -> bool {
        matches!(
            self,
            OperationKind::Block
                | OperationKind::VariableDeclarationStatement
                | OperationKind::Switch
                | OperationKind::If
                | OperationKind::WhileUntilLoop
                | OperationKind::ForLoop
                | OperationKind::ForEachLoop
                | OperationKind::Labeled
                | OperationKind::Branch
                | OperationKind::Empty
                | OperationKind::Throw
                | OperationKind::Return
                | OperationKind::YieldBreak
                | OperationKind::YieldReturn
                | OperationKind::Lock
                | OperationKind::Try
                | OperationKind::Using
                | OperationKind::ExpressionStatement
        )
    }
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum BinaryOperatorKind {
    /// `+`
    Add,
    /// `-`
    Subtract,
    /// `*`
    Multiply,
    /// `/`
    Divide,
    /// `%`
    Remainder,
    /// `&`
    And,
    /// `|`
    Or,
    /// `^`
    ExclusiveOr,
    /// `&&`
    ConditionalAnd,
    /// `||`
    ConditionalOr,
    /// `<<`
    LeftShift,
    /// `>>`
    RightShift,
    /// `==`
    Equals,
    /// `!=`
    NotEquals,
    /// `<`
    LessThan,
    /// `<=`
    LessThanOrEqual,
    /// `>`
    GreaterThan,
    /// `>=`
    GreaterThanOrEqual,
}

impl BinaryOperatorKind {
    /// `true` for comparisons, which produce `bool`.
    #[must_use]
    pub fn is_relational(self) -> bool {
        matches!(
            self,
            BinaryOperatorKind::Equals
                | BinaryOperatorKind::NotEquals
                | BinaryOperatorKind::LessThan
                | BinaryOperatorKind::LessThanOrEqual
                | BinaryOperatorKind::GreaterThan
                | BinaryOperatorKind::GreaterThanOrEqual
        )
    }

    /// `true` for the short-circuiting `&&` and `||`.
    #[must_use]
    pub fn is_conditional(self) -> bool {
        matches!(
            self,
            BinaryOperatorKind::ConditionalAnd | BinaryOperatorKind::ConditionalOr
        )
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum UnaryOperatorKind {
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `~`
    BitwiseNegation,
    /// `!`
    Not,
}

/// Branch statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BranchKind {
    /// `break`
    Break,
    /// `continue`
    Continue,
    /// `goto label`
    GoTo,
}

/// Receivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstanceReferenceKind {
    /// `this`
    This,
    /// `base`
    Base,
    /// A member accessed without a receiver inside an instance member.
    Implicit,
}

/// Conversion classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConversionKind {
    /// Same type.
    Identity,
    /// Reference conversion to a base type.
    ImplicitReference,
    /// Checked reference conversion to a derived type.
    ExplicitReference,
    /// Value type to reference type.
    Boxing,
    /// Reference type to value type.
    Unboxing,
    /// Between numeric types.
    Numeric,
    /// No conversion exists.
    Invalid,
}

/// `++` and `--` forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IncrementKind {
    /// `++x`
    PrefixIncrement,
    /// `x++`
    PostfixIncrement,
    /// `--x`
    PrefixDecrement,
    /// `x--`
    PostfixDecrement,
}

impl IncrementKind {
    /// `true` for `++`.
    #[must_use]
    pub fn is_increment(self) -> bool {
        matches!(
            self,
            IncrementKind::PrefixIncrement | IncrementKind::PostfixIncrement
        )
    }
}

/// Compile-time constant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConstantValue {
    /// `null`
    Null,
    /// `true` / `false`
    Boolean(bool),
    /// A 32-bit integer.
    Int32(i32),
    /// A string.
    String(String),
}

impl ConstantValue {
    /// The boolean value, if this is one.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConstantValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for ConstantValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstantValue::Null => f.write_str("null"),
            ConstantValue::Boolean(b) => write!(f, "{b}"),
            ConstantValue::Int32(i) => write!(f, "{i}"),
            ConstantValue::String(s) => write!(f, "{s:?}"),
        }
    }
}

type Child = Box<Operation>;

/// Kind-specific shape of an [`Operation`].
#[derive(Debug, Clone)]
pub enum OperationNode {
    /// A block.
    Block {
        /// Statements in order
        statements: Vec<Operation>,
        /// Locals scoped to the block
        locals: Vec<Arc<LocalSymbol>>,
    },
    /// A local declaration statement.
    VariableDeclarationStatement {
        /// [`OperationKind::VariableDeclaration`] children
        declarations: Vec<Operation>,
    },
    /// A single declared local.
    VariableDeclaration {
        /// The local
        variable: Arc<LocalSymbol>,
        /// Initial value
        initializer: Option<Child>,
    },
    /// A switch.
    Switch {
        /// Switched-on value
        value: Child,
        /// [`OperationKind::SwitchCase`] children
        cases: Vec<Operation>,
    },
    /// A switch section.
    SwitchCase {
        /// Case clauses
        clauses: Vec<Operation>,
        /// Statements of the section
        body: Vec<Operation>,
    },
    /// `case value:`
    SingleValueCaseClause {
        /// Matched value
        value: Child,
    },
    /// A relational case clause.
    RelationalCaseClause {
        /// Comparison applied
        relation: BinaryOperatorKind,
        /// Compared value
        value: Child,
    },
    /// A range case clause.
    RangeCaseClause {
        /// Inclusive lower bound
        minimum: Child,
        /// Inclusive upper bound
        maximum: Child,
    },
    /// `default:`
    DefaultCaseClause,
    /// An `if` statement.
    If {
        /// Condition
        condition: Child,
        /// Taken when true
        if_true: Child,
        /// Taken when false
        if_false: Option<Child>,
    },
    /// A `while` / `until` loop.
    WhileUntilLoop {
        /// `true` when the condition is tested before the body
        is_top_test: bool,
        /// `true` for `while`, `false` for `until`
        is_while: bool,
        /// Loop condition
        condition: Child,
        /// Loop body
        body: Child,
    },
    /// A `for` loop.
    ForLoop {
        /// Initializer statements
        before: Vec<Operation>,
        /// Condition, `None` for an infinite loop
        condition: Option<Child>,
        /// Increment statements
        at_loop_bottom: Vec<Operation>,
        /// Loop body
        body: Child,
        /// Locals declared by the initializer
        locals: Vec<Arc<LocalSymbol>>,
    },
    /// A `foreach` loop.
    ForEachLoop {
        /// Iteration variable
        iteration_variable: Arc<LocalSymbol>,
        /// Enumerated collection
        collection: Child,
        /// Loop body
        body: Child,
    },
    /// A labeled statement.
    Labeled {
        /// Label name
        label: String,
        /// Labeled statement
        statement: Option<Child>,
    },
    /// A branch.
    Branch {
        /// Branch form
        kind: BranchKind,
        /// Target label for `goto`
        target: Option<String>,
    },
    /// An empty statement.
    Empty,
    /// A `throw`.
    Throw {
        /// Thrown value, `None` to rethrow
        exception: Option<Child>,
    },
    /// A `return`.
    Return {
        /// Returned value
        value: Option<Child>,
    },
    /// `yield break`
    YieldBreak,
    /// `yield return`
    YieldReturn {
        /// Yielded value
        value: Child,
    },
    /// A `lock`.
    Lock {
        /// Locked object
        locked: Child,
        /// Protected body
        body: Child,
    },
    /// A `try`.
    Try {
        /// Protected body
        body: Child,
        /// [`OperationKind::CatchClause`] children
        catches: Vec<Operation>,
        /// `finally` block
        finally: Option<Child>,
    },
    /// A `catch`.
    CatchClause {
        /// Caught type
        exception_type: TypeSymbol,
        /// Local receiving the exception
        local: Option<Arc<LocalSymbol>>,
        /// `when` filter
        filter: Option<Child>,
        /// Handler block
        handler: Child,
    },
    /// A `using`.
    Using {
        /// Resource declaration or expression
        resource: Child,
        /// Body
        body: Child,
    },
    /// An expression statement.
    ExpressionStatement {
        /// The expression
        expression: Child,
    },
    /// Something that failed to bind.
    Invalid {
        /// Whatever did bind
        children: Vec<Operation>,
    },
    /// A literal; the value is the operation's constant.
    Literal,
    /// A conversion.
    Conversion {
        /// Converted value
        operand: Child,
        /// Classification
        conversion: ConversionKind,
        /// `true` for a cast written in source
        is_explicit: bool,
        /// `true` in a checked context
        is_checked: bool,
    },
    /// A call.
    Invocation {
        /// Target method
        method: Arc<MethodSymbol>,
        /// Receiver, `None` for static calls
        instance: Option<Child>,
        /// [`OperationKind::Argument`] children in parameter order
        arguments: Vec<Operation>,
        /// `true` when dispatched virtually
        is_virtual: bool,
    },
    /// An argument.
    Argument {
        /// Matched parameter
        parameter: Option<Arc<ParameterSymbol>>,
        /// Value
        value: Child,
    },
    /// An omitted argument.
    OmittedArgument,
    /// An array element.
    ArrayElementReference {
        /// Array
        array: Child,
        /// Index per dimension
        indices: Vec<Operation>,
    },
    /// A local use.
    LocalReference {
        /// The local
        local: Arc<LocalSymbol>,
    },
    /// A parameter use.
    ParameterReference {
        /// The parameter
        parameter: Arc<ParameterSymbol>,
    },
    /// A field use.
    FieldReference {
        /// The field
        field: Arc<FieldSymbol>,
        /// Receiver, `None` for static fields
        instance: Option<Child>,
    },
    /// A method group.
    MethodBinding {
        /// Bound method
        method: Arc<MethodSymbol>,
        /// Receiver
        instance: Option<Child>,
    },
    /// A unary operator.
    UnaryOperator {
        /// Operator
        operator: UnaryOperatorKind,
        /// Operand
        operand: Child,
        /// User-defined operator method
        operator_method: Option<Arc<MethodSymbol>>,
    },
    /// A binary operator.
    BinaryOperator {
        /// Operator
        operator: BinaryOperatorKind,
        /// Left operand
        left: Child,
        /// Right operand
        right: Child,
        /// User-defined operator method
        operator_method: Option<Arc<MethodSymbol>>,
    },
    /// A conditional expression.
    ConditionalChoice {
        /// Condition
        condition: Child,
        /// Value when true
        if_true: Child,
        /// Value when false
        if_false: Child,
    },
    /// `??`
    NullCoalescing {
        /// Tested value
        primary: Child,
        /// Fallback
        secondary: Child,
    },
    /// A lambda.
    Lambda {
        /// Synthesized signature
        signature: Arc<MethodSymbol>,
        /// Body block
        body: Child,
    },
    /// Object creation.
    ObjectCreation {
        /// Constructor
        constructor: Option<Arc<MethodSymbol>>,
        /// [`OperationKind::Argument`] children
        arguments: Vec<Operation>,
        /// Member initializers, as assignments
        initializers: Vec<Operation>,
    },
    /// Anonymous object creation.
    AnonymousObjectCreation {
        /// Member initializers, as assignments to the template's fields
        initializers: Vec<Operation>,
    },
    /// Array creation.
    ArrayCreation {
        /// Element type
        element_type: TypeSymbol,
        /// Size per dimension
        dimension_sizes: Vec<Operation>,
        /// Element initializer
        initializer: Option<Child>,
    },
    /// Array initializer.
    ArrayInitializer {
        /// Element values
        element_values: Vec<Operation>,
    },
    /// A receiver.
    InstanceReference {
        /// Receiver form
        kind: InstanceReferenceKind,
    },
    /// A type test.
    IsType {
        /// Tested value
        operand: Child,
        /// Tested type
        is_type: TypeSymbol,
    },
    /// `await`
    Await {
        /// Awaited value
        awaited: Child,
    },
    /// Simple assignment.
    Assignment {
        /// Assigned location
        target: Child,
        /// Value
        value: Child,
    },
    /// Compound assignment.
    CompoundAssignment {
        /// Operator combined with the assignment
        operator: BinaryOperatorKind,
        /// Assigned location
        target: Child,
        /// Value
        value: Child,
    },
    /// `++` / `--`
    Increment {
        /// Form
        kind: IncrementKind,
        /// Incremented location
        target: Child,
    },
    /// Parentheses.
    Parenthesized {
        /// Inner expression
        operand: Child,
    },
    /// `a?.b`
    ConditionalAccess {
        /// Tested receiver
        expression: Child,
        /// Access evaluated when the receiver is not null
        when_not_null: Child,
    },
    /// The receiver placeholder inside a conditional access.
    ConditionalAccessInstance,
    /// `default(T)`
    DefaultValue,
    /// `typeof(T)`
    TypeOf {
        /// Operand type
        type_operand: TypeSymbol,
    },
    /// `sizeof(T)`
    SizeOf {
        /// Operand type
        type_operand: TypeSymbol,
    },
    /// `&a`
    AddressOf {
        /// Referenced location
        reference: Child,
    },
    /// `*p`
    PointerIndirectionReference {
        /// Dereferenced pointer
        pointer: Child,
    },
    /// An interpolated string.
    InterpolatedString {
        /// Text and interpolation parts
        parts: Vec<Operation>,
    },
    /// Literal text of an interpolated string.
    InterpolatedStringText {
        /// The text as a literal
        text: Child,
    },
    /// An interpolation hole.
    Interpolation {
        /// Interpolated value
        expression: Child,
        /// Alignment
        alignment: Option<Child>,
        /// Format string
        format_string: Option<Child>,
    },
    /// A tuple literal.
    Tuple {
        /// Elements
        elements: Vec<Operation>,
    },
    /// Field initializer.
    FieldInitializer {
        /// Initialized fields
        fields: Vec<Arc<FieldSymbol>>,
        /// Value
        value: Child,
    },
    /// Parameter default value.
    ParameterInitializer {
        /// The parameter
        parameter: Arc<ParameterSymbol>,
        /// Value
        value: Child,
    },
}

/// A node of a semantic operation tree.
#[derive(Debug, Clone)]
pub struct Operation {
    node: OperationNode,
    syntax: Option<SyntaxNode>,
    result_type: Option<TypeSymbol>,
    constant: Option<ConstantValue>,
    is_invalid: bool,
}

impl Operation {
    /// Creates a node with no syntax, type or constant.
    #[must_use]
    pub fn new(node: OperationNode) -> Self {
        Operation {
            node,
            syntax: None,
            result_type: None,
            constant: None,
            is_invalid: false,
        }
    }

    /// A literal carrying `value`.
    #[must_use]
    pub fn literal(value: ConstantValue) -> Self {
        Operation::new(OperationNode::Literal).with_constant(value)
    }

    /// A block of `statements` declaring `locals`.
    #[must_use]
    pub fn block(statements: Vec<Operation>, locals: Vec<Arc<LocalSymbol>>) -> Self {
        Operation::new(OperationNode::Block { statements, locals })
    }

    /// `expression;`
    #[must_use]
    pub fn expression_statement(expression: Operation) -> Self {
        let syntax = expression.syntax.clone();
        let mut statement = Operation::new(OperationNode::ExpressionStatement {
            expression: Box::new(expression),
        });
        statement.syntax = syntax;
        statement
    }

    /// Attaches the syntax the node was bound from.
    #[must_use]
    pub fn with_syntax(mut self, syntax: SyntaxNode) -> Self {
        self.syntax = Some(syntax);
        self
    }

    /// Attaches the result type.
    #[must_use]
    pub fn with_type(mut self, ty: TypeSymbol) -> Self {
        self.result_type = Some(ty);
        self
    }

    /// Attaches a constant value.
    #[must_use]
    pub fn with_constant(mut self, value: ConstantValue) -> Self {
        self.constant = Some(value);
        self
    }

    /// Marks the node as containing a binding error.
    #[must_use]
    pub fn into_invalid(mut self) -> Self {
        self.is_invalid = true;
        self
    }

    /// Kind of this node.
    #[must_use]
    pub fn kind(&self) -> OperationKind {
        match &self.node {
            OperationNode::Block { .. } => OperationKind::Block,
            OperationNode::VariableDeclarationStatement { .. } => {
                OperationKind::VariableDeclarationStatement
            }
            OperationNode::VariableDeclaration { .. } => OperationKind::VariableDeclaration,
            OperationNode::Switch { .. } => OperationKind::Switch,
            OperationNode::SwitchCase { .. } => OperationKind::SwitchCase,
            OperationNode::SingleValueCaseClause { .. } => OperationKind::SingleValueCaseClause,
            OperationNode::RelationalCaseClause { .. } => OperationKind::RelationalCaseClause,
            OperationNode::RangeCaseClause { .. } => OperationKind::RangeCaseClause,
            OperationNode::DefaultCaseClause => OperationKind::DefaultCaseClause,
            OperationNode::If { .. } => OperationKind::If,
            OperationNode::WhileUntilLoop { .. } => OperationKind::WhileUntilLoop,
            OperationNode::ForLoop { .. } => OperationKind::ForLoop,
            OperationNode::ForEachLoop { .. } => OperationKind::ForEachLoop,
            OperationNode::Labeled { .. } => OperationKind::Labeled,
            OperationNode::Branch { .. } => OperationKind::Branch,
            OperationNode::Empty => OperationKind::Empty,
            OperationNode::Throw { .. } => OperationKind::Throw,
            OperationNode::Return { .. } => OperationKind::Return,
            OperationNode::YieldBreak => OperationKind::YieldBreak,
            OperationNode::YieldReturn { .. } => OperationKind::YieldReturn,
            OperationNode::Lock { .. } => OperationKind::Lock,
            OperationNode::Try { .. } => OperationKind::Try,
            OperationNode::CatchClause { .. } => OperationKind::CatchClause,
            OperationNode::Using { .. } => OperationKind::Using,
            OperationNode::ExpressionStatement { .. } => OperationKind::ExpressionStatement,
            OperationNode::Invalid { .. } => OperationKind::Invalid,
            OperationNode::Literal => OperationKind::Literal,
            OperationNode::Conversion { .. } => OperationKind::Conversion,
            OperationNode::Invocation { .. } => OperationKind::Invocation,
            OperationNode::Argument { .. } => OperationKind::Argument,
            OperationNode::OmittedArgument => OperationKind::OmittedArgument,
            OperationNode::ArrayElementReference { .. } => OperationKind::ArrayElementReference,
            OperationNode::LocalReference { .. } => OperationKind::LocalReference,
            OperationNode::ParameterReference { .. } => OperationKind::ParameterReference,
            OperationNode::FieldReference { .. } => OperationKind::FieldReference,
            OperationNode::MethodBinding { .. } => OperationKind::MethodBinding,
            OperationNode::UnaryOperator { .. } => OperationKind::UnaryOperator,
            OperationNode::BinaryOperator { .. } => OperationKind::BinaryOperator,
            OperationNode::ConditionalChoice { .. } => OperationKind::ConditionalChoice,
            OperationNode::NullCoalescing { .. } => OperationKind::NullCoalescing,
            OperationNode::Lambda { .. } => OperationKind::Lambda,
            OperationNode::ObjectCreation { .. } => OperationKind::ObjectCreation,
            OperationNode::AnonymousObjectCreation { .. } => {
                OperationKind::AnonymousObjectCreation
            }
            OperationNode::ArrayCreation { .. } => OperationKind::ArrayCreation,
            OperationNode::ArrayInitializer { .. } => OperationKind::ArrayInitializer,
            OperationNode::InstanceReference { .. } => OperationKind::InstanceReference,
            OperationNode::IsType { .. } => OperationKind::IsType,
            OperationNode::Await { .. } => OperationKind::Await,
            OperationNode::Assignment { .. } => OperationKind::Assignment,
            OperationNode::CompoundAssignment { .. } => OperationKind::CompoundAssignment,
            OperationNode::Increment { .. } => OperationKind::Increment,
            OperationNode::Parenthesized { .. } => OperationKind::Parenthesized,
            OperationNode::ConditionalAccess { .. } => OperationKind::ConditionalAccess,
            OperationNode::ConditionalAccessInstance => OperationKind::ConditionalAccessInstance,
            OperationNode::DefaultValue => OperationKind::DefaultValue,
            OperationNode::TypeOf { .. } => OperationKind::TypeOf,
            OperationNode::SizeOf { .. } => OperationKind::SizeOf,
            OperationNode::AddressOf { .. } => OperationKind::AddressOf,
            OperationNode::PointerIndirectionReference { .. } => {
                OperationKind::PointerIndirectionReference
            }
            OperationNode::InterpolatedString { .. } => OperationKind::InterpolatedString,
            OperationNode::InterpolatedStringText { .. } => OperationKind::InterpolatedStringText,
            OperationNode::Interpolation { .. } => OperationKind::Interpolation,
            OperationNode::Tuple { .. } => OperationKind::Tuple,
            OperationNode::FieldInitializer { .. } => OperationKind::FieldInitializer,
            OperationNode::ParameterInitializer { .. } => OperationKind::ParameterInitializer,
        }
    }

    /// Kind-specific shape.
    #[must_use]
    pub fn node(&self) -> &OperationNode {
        &self.node
    }

    /// Syntax the node was bound from.
    #[must_use]
    pub fn syntax(&self) -> Option<&SyntaxNode> {
        self.syntax.as_ref()
    }

    /// Result type of an expression.
    #[must_use]
    pub fn result_type(&self) -> Option<&TypeSymbol> {
        self.result_type.as_ref()
    }

    /// Constant value of an expression.
    #[must_use]
    pub fn constant_value(&self) -> Option<&ConstantValue> {
        self.constant.as_ref()
    }

    /// `true` if this node or its kind denotes a binding error.
    #[must_use]
    pub fn is_invalid(&self) -> bool {
        self.is_invalid || matches!(self.node, OperationNode::Invalid { .. })
    }

    /// Children in walk order.
    ///
    /// The order is fixed per kind and follows evaluation: receivers before
    /// arguments, conditions before branches, and for a
    /// [`OperationKind::WhileUntilLoop`] the condition first only when it is
    /// tested at the top.
    #[must_use]
    pub fn children(&self) -> Vec<&Operation> {
        let mut out: Vec<&Operation> = Vec::new();
        match &self.node {
            OperationNode::Block { statements, .. } => out.extend(statements),
            OperationNode::VariableDeclarationStatement { declarations } => {
                out.extend(declarations);
            }
            OperationNode::VariableDeclaration { initializer, .. } => {
                out.extend(initializer.as_deref());
            }
            OperationNode::Switch { value, cases } => {
                out.push(value);
                out.extend(cases);
            }
            OperationNode::SwitchCase { clauses, body } => {
                out.extend(clauses);
                out.extend(body);
            }
            OperationNode::SingleValueCaseClause { value }
            | OperationNode::RelationalCaseClause { value, .. }
            | OperationNode::YieldReturn { value } => out.push(value),
            OperationNode::RangeCaseClause { minimum, maximum } => {
                out.push(minimum);
                out.push(maximum);
            }
            OperationNode::If {
                condition,
                if_true,
                if_false,
            } => {
                out.push(condition);
                out.push(if_true);
                out.extend(if_false.as_deref());
            }
            OperationNode::WhileUntilLoop {
                is_top_test,
                condition,
                body,
                ..
            } => {
                if *is_top_test {
                    out.push(condition);
                    out.push(body);
                } else {
                    out.push(body);
                    out.push(condition);
                }
            }
            OperationNode::ForLoop {
                before,
                condition,
                at_loop_bottom,
                body,
                ..
            } => {
                out.extend(before);
                out.extend(condition.as_deref());
                out.push(body);
                out.extend(at_loop_bottom);
            }
            OperationNode::ForEachLoop {
                collection, body, ..
            } => {
                out.push(collection);
                out.push(body);
            }
            OperationNode::Labeled { statement, .. } => out.extend(statement.as_deref()),
            OperationNode::Throw { exception } => out.extend(exception.as_deref()),
            OperationNode::Return { value } => out.extend(value.as_deref()),
            OperationNode::Lock { locked, body } => {
                out.push(locked);
                out.push(body);
            }
            OperationNode::Try {
                body,
                catches,
                finally,
            } => {
                out.push(body);
                out.extend(catches);
                out.extend(finally.as_deref());
            }
            OperationNode::CatchClause {
                filter, handler, ..
            } => {
                out.extend(filter.as_deref());
                out.push(handler);
            }
            OperationNode::Using { resource, body } => {
                out.push(resource);
                out.push(body);
            }
            OperationNode::ExpressionStatement { expression } => out.push(expression),
            OperationNode::Invalid { children } => out.extend(children),
            OperationNode::Conversion { operand, .. }
            | OperationNode::UnaryOperator { operand, .. }
            | OperationNode::Parenthesized { operand }
            | OperationNode::IsType { operand, .. } => out.push(operand),
            OperationNode::Invocation {
                instance,
                arguments,
                ..
            } => {
                out.extend(instance.as_deref());
                out.extend(arguments);
            }
            OperationNode::Argument { value, .. }
            | OperationNode::FieldInitializer { value, .. }
            | OperationNode::ParameterInitializer { value, .. } => out.push(value),
            OperationNode::ArrayElementReference { array, indices } => {
                out.push(array);
                out.extend(indices);
            }
            OperationNode::FieldReference { instance, .. }
            | OperationNode::MethodBinding { instance, .. } => out.extend(instance.as_deref()),
            OperationNode::BinaryOperator { left, right, .. } => {
                out.push(left);
                out.push(right);
            }
            OperationNode::ConditionalChoice {
                condition,
                if_true,
                if_false,
            } => {
                out.push(condition);
                out.push(if_true);
                out.push(if_false);
            }
            OperationNode::NullCoalescing { primary, secondary } => {
                out.push(primary);
                out.push(secondary);
            }
            OperationNode::Lambda { body, .. } => out.push(body),
            OperationNode::ObjectCreation {
                arguments,
                initializers,
                ..
            } => {
                out.extend(arguments);
                out.extend(initializers);
            }
            OperationNode::AnonymousObjectCreation { initializers } => out.extend(initializers),
            OperationNode::ArrayCreation {
                dimension_sizes,
                initializer,
                ..
            } => {
                out.extend(dimension_sizes);
                out.extend(initializer.as_deref());
            }
            OperationNode::ArrayInitializer { element_values } => out.extend(element_values),
            OperationNode::Await { awaited } => out.push(awaited),
            OperationNode::Assignment { target, value }
            | OperationNode::CompoundAssignment { target, value, .. } => {
                out.push(target);
                out.push(value);
            }
            OperationNode::Increment { target, .. } => out.push(target),
            OperationNode::ConditionalAccess {
                expression,
                when_not_null,
            } => {
                out.push(expression);
                out.push(when_not_null);
            }
            OperationNode::AddressOf { reference } => out.push(reference),
            OperationNode::PointerIndirectionReference { pointer } => out.push(pointer),
            OperationNode::InterpolatedString { parts } => out.extend(parts),
            OperationNode::InterpolatedStringText { text } => out.push(text),
            OperationNode::Interpolation {
                expression,
                alignment,
                format_string,
            } => {
                out.push(expression);
                out.extend(alignment.as_deref());
                out.extend(format_string.as_deref());
            }
            OperationNode::Tuple { elements } => out.extend(elements),
            OperationNode::DefaultCaseClause
            | OperationNode::Branch { .. }
            | OperationNode::Empty
            | OperationNode::YieldBreak
            | OperationNode::Literal
            | OperationNode::OmittedArgument
            | OperationNode::LocalReference { .. }
            | OperationNode::ParameterReference { .. }
            | OperationNode::InstanceReference { .. }
            | OperationNode::ConditionalAccessInstance
            | OperationNode::DefaultValue
            | OperationNode::TypeOf { .. }
            | OperationNode::SizeOf { .. } => {}
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::{EnumCount, IntoEnumIterator};

    fn int(value: i32) -> Operation {
        Operation::literal(ConstantValue::Int32(value))
    }

    #[test]
    fn test_kind_set_is_closed() {
        assert_eq!(OperationKind::iter().count(), OperationKind::COUNT);
        assert!(OperationKind::If.is_statement());
        assert!(!OperationKind::Literal.is_statement());
        assert_eq!(OperationKind::WhileUntilLoop.to_string(), "WhileUntilLoop");
    }

    #[test]
    fn test_loop_child_order_follows_test_position() {
        let make = |is_top_test| {
            Operation::new(OperationNode::WhileUntilLoop {
                is_top_test,
                is_while: true,
                condition: Box::new(Operation::literal(ConstantValue::Boolean(true))),
                body: Box::new(Operation::block(Vec::new(), Vec::new())),
            })
        };
        let top = make(true);
        assert_eq!(top.children()[0].kind(), OperationKind::Literal);
        let bottom = make(false);
        assert_eq!(bottom.children()[0].kind(), OperationKind::Block);
    }

    #[test]
    fn test_invalid_flag() {
        assert!(!int(1).is_invalid());
        assert!(int(1).into_invalid().is_invalid());
        assert!(Operation::new(OperationNode::Invalid { children: vec![int(2)] }).is_invalid());
    }

    #[test]
    fn test_expression_statement_keeps_constant_off_statement() {
        let statement = Operation::expression_statement(int(3));
        assert_eq!(statement.kind(), OperationKind::ExpressionStatement);
        assert!(statement.constant_value().is_none());
        assert_eq!(
            statement.children()[0].constant_value(),
            Some(&ConstantValue::Int32(3))
        );
    }
}
