//! Visitors over the closed set of operation kinds.
//!
//! Each visitor has one method per [`OperationKind`], all defaulting to
//! `default_visit`. Implementors override only the kinds they care about; new kinds
//! fall through to the default and never break an existing visitor.

use crate::operations::{Operation, OperationKind};

macro_rules! define_visitors {
    ($($kind:ident => $method:ident),* $(,)?) => {
        /// A visitor that returns nothing.
        ///
        /// # Examples
        ///
        /// ```rust
        /// use dotcompile::operations::{ConstantValue, Operation, OperationVisitor};
        ///
        /// #[derive(Default)]
        /// struct CountLiterals(usize);
        ///
        /// impl OperationVisitor for CountLiterals {
        ///     fn visit_literal(&mut self, _operation: &Operation) {
        ///         self.0 += 1;
        ///     }
        /// }
        ///
        /// let mut counter = CountLiterals::default();
        /// counter.visit(&Operation::literal(ConstantValue::Int32(1)));
        /// counter.visit(&Operation::block(Vec::new(), Vec::new()));
        /// assert_eq!(counter.0, 1);
        /// ```
        pub trait OperationVisitor {
            /// Fallback for every kind without an override. Does nothing.
            fn default_visit(&mut self, operation: &Operation) {
                let _ = operation;
            }

            /// Dispatches to the method for `operation`'s kind.
            fn visit(&mut self, operation: &Operation) {
                match operation.kind() {
                    $(OperationKind::$kind => self.$method(operation),)*
                }
            }

            $(
                #[doc = concat!("Visits a [`OperationKind::", stringify!($kind), "`] node.")]
                fn $method(&mut self, operation: &Operation) {
                    self.default_visit(operation);
                }
            )*
        }

        /// A visitor that threads an argument and produces a result.
        pub trait OperationVisitorWithResult<A, R: Default> {
            /// Fallback for every kind without an override; returns `R::default()`.
            fn default_visit(&mut self, operation: &Operation, argument: A) -> R {
                let _ = (operation, argument);
                R::default()
            }

            /// Dispatches to the method for `operation`'s kind.
            fn visit(&mut self, operation: &Operation, argument: A) -> R {
                match operation.kind() {
                    $(OperationKind::$kind => self.$method(operation, argument),)*
                }
            }

            $(
                #[doc = concat!("Visits a [`OperationKind::", stringify!($kind), "`] node.")]
                fn $method(&mut self, operation: &Operation, argument: A) -> R {
                    self.default_visit(operation, argument)
                }
            )*
        }
    };
}

define_visitors! {
    Block => visit_block,
    VariableDeclarationStatement => visit_variable_declaration_statement,
    VariableDeclaration => visit_variable_declaration,
    Switch => visit_switch,
    SwitchCase => visit_switch_case,
    SingleValueCaseClause => visit_single_value_case_clause,
    RelationalCaseClause => visit_relational_case_clause,
    RangeCaseClause => visit_range_case_clause,
    DefaultCaseClause => visit_default_case_clause,
    If => visit_if,
    WhileUntilLoop => visit_while_until_loop,
    ForLoop => visit_for_loop,
    ForEachLoop => visit_for_each_loop,
    Labeled => visit_labeled,
    Branch => visit_branch,
    Empty => visit_empty,
    Throw => visit_throw,
    Return => visit_return,
    YieldBreak => visit_yield_break,
    YieldReturn => visit_yield_return,
    Lock => visit_lock,
    Try => visit_try,
    CatchClause => visit_catch_clause,
    Using => visit_using,
    ExpressionStatement => visit_expression_statement,
    Invalid => visit_invalid,
    Literal => visit_literal,
    Conversion => visit_conversion,
    Invocation => visit_invocation,
    Argument => visit_argument,
    OmittedArgument => visit_omitted_argument,
    ArrayElementReference => visit_array_element_reference,
    LocalReference => visit_local_reference,
    ParameterReference => visit_parameter_reference,
    FieldReference => visit_field_reference,
    MethodBinding => visit_method_binding,
    UnaryOperator => visit_unary_operator,
    BinaryOperator => visit_binary_operator,
    ConditionalChoice => visit_conditional_choice,
    NullCoalescing => visit_null_coalescing,
    Lambda => visit_lambda,
    ObjectCreation => visit_object_creation,
    AnonymousObjectCreation => visit_anonymous_object_creation,
    ArrayCreation => visit_array_creation,
    ArrayInitializer => visit_array_initializer,
    InstanceReference => visit_instance_reference,
    IsType => visit_is_type,
    Await => visit_await,
    Assignment => visit_assignment,
    CompoundAssignment => visit_compound_assignment,
    Increment => visit_increment,
    Parenthesized => visit_parenthesized,
    ConditionalAccess => visit_conditional_access,
    ConditionalAccessInstance => visit_conditional_access_instance,
    DefaultValue => visit_default_value,
    TypeOf => visit_type_of,
    SizeOf => visit_size_of,
    AddressOf => visit_address_of,
    PointerIndirectionReference => visit_pointer_indirection_reference,
    InterpolatedString => visit_interpolated_string,
    InterpolatedStringText => visit_interpolated_string_text,
    Interpolation => visit_interpolation,
    Tuple => visit_tuple,
    FieldInitializer => visit_field_initializer,
    ParameterInitializer => visit_parameter_initializer,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::{BinaryOperatorKind, ConstantValue, OperationNode};

    struct Describe;

    impl OperationVisitorWithResult<usize, String> for Describe {
        fn default_visit(&mut self, operation: &Operation, depth: usize) -> String {
            format!("{}{}", " ".repeat(depth), operation.kind())
        }

        fn visit_literal(&mut self, operation: &Operation, depth: usize) -> String {
            let value = operation
                .constant_value()
                .map(ToString::to_string)
                .unwrap_or_default();
            format!("{}{}", " ".repeat(depth), value)
        }
    }

    #[test]
    fn test_result_visitor_dispatches_by_kind() {
        let mut describe = Describe;
        let literal = Operation::literal(ConstantValue::String("x".into()));
        assert_eq!(describe.visit(&literal, 2), "  \"x\"");

        let binary = Operation::new(OperationNode::BinaryOperator {
            operator: BinaryOperatorKind::Add,
            left: Box::new(literal.clone()),
            right: Box::new(literal),
            operator_method: None,
        });
        assert_eq!(describe.visit(&binary, 0), "BinaryOperator");
    }

    struct LiteralCount;

    impl OperationVisitorWithResult<(), usize> for LiteralCount {
        fn visit_literal(&mut self, _operation: &Operation, _argument: ()) -> usize {
            1
        }
    }

    #[test]
    fn test_result_visitor_defaults_unhandled_kinds() {
        let mut count = LiteralCount;
        let literal = Operation::literal(ConstantValue::Int32(7));
        assert_eq!(count.visit(&literal, ()), 1);
        assert_eq!(count.visit(&Operation::new(OperationNode::Empty), ()), 0);
    }

    #[test]
    fn test_default_visit_is_a_no_op() {
        struct Nothing;
        impl OperationVisitor for Nothing {}
        Nothing.visit(&Operation::new(OperationNode::Empty));
    }
}
