//! Binding of Mini method bodies into operation trees.
//!
//! One [`Binder`] is created per method body. It resolves names against locals,
//! parameters, members of the containing type and its bases, then types, and reports
//! what it cannot resolve as diagnostics; binding itself only fails on contract
//! violations.

use std::sync::Arc;

use crate::{
    compilation::{BindingContext, BoundBody, Compilation, SymbolLookup},
    diagnostics::{Diagnostic, Location},
    lang::{
        codes::MiniErrorCode,
        declare::{field_initializer, TypeResolver},
        syntax::{child_of, children_of, declared_name, is, SyntaxKind},
    },
    operations::{
        BinaryOperatorKind, BranchKind, ConstantValue, ConversionKind, IncrementKind,
        InstanceReferenceKind, Operation, OperationKind, OperationNode, UnaryOperatorKind,
    },
    symbols::{
        AnonymousTypeShape, LocalSymbol, MethodKind, MethodSymbol, NamedTypeSymbol, SpecialType,
        Symbol, SyntaxReference, TypeSymbol,
    },
    syntax::{SyntaxNode, SyntaxTree},
    Result,
};

const MAX_BASE_DEPTH: usize = 64;

/// Nesting of statements, expressions and names a body may reach.
pub(crate) const MAX_BIND_DEPTH: usize = 64;

/// Binds the body of `method`, or returns `None` for methods without one.
pub(crate) fn bind_method_body(
    context: &BindingContext<'_>,
    method: &Arc<MethodSymbol>,
) -> Result<Option<BoundBody>> {
    let Some(reference) = method.declaring_syntax() else {
        return Ok(None);
    };
    let Some(containing_type) = method.containing_type() else {
        return Ok(None);
    };
    if method.is_abstract() {
        return Ok(None);
    }

    let mut binder = Binder {
        compilation: context.compilation,
        lookup: context.lookup,
        method,
        containing_type,
        resolver: TypeResolver::new(
            context.compilation,
            context.lookup,
            &reference.tree,
            &reference.node,
        ),
        scopes: Vec::new(),
        loop_depth: 0,
        depth: 0,
        too_deep: false,
        diagnostics: Vec::new(),
    };

    let operation = match method.method_kind() {
        MethodKind::ScriptEntryPoint => binder.bind_script(&reference.node)?,
        MethodKind::Constructor | MethodKind::StaticConstructor => {
            binder.bind_constructor(&reference.node)?
        }
        MethodKind::Ordinary => {
            let Some(block) = child_of(&reference.node, SyntaxKind::Block) else {
                return Ok(None);
            };
            binder.bind_block(block)?
        }
    };
    Ok(Some(BoundBody {
        operation,
        diagnostics: binder.diagnostics,
    }))
}

/// What a name or member access denotes.
enum Bound {
    Value(Operation),
    Type(TypeSymbol),
    Namespace(String),
}

struct Binder<'a> {
    compilation: &'a Compilation,
    lookup: &'a SymbolLookup,
    method: &'a Arc<MethodSymbol>,
    containing_type: Arc<NamedTypeSymbol>,
    resolver: TypeResolver<'a>,
    scopes: Vec<Vec<Arc<LocalSymbol>>>,
    loop_depth: usize,
    depth: usize,
    too_deep: bool,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Binder<'a> {
    // Diagnostics and helpers

    fn tree(&self) -> &'a SyntaxTree {
        self.resolver.tree
    }

    fn report(&mut self, code: MiniErrorCode, node: &SyntaxNode, args: &[&dyn std::fmt::Display]) {
        self.diagnostics
            .push(code.diagnostic(Location::source(self.tree(), node.span()), args));
    }

    fn special(&self, special: SpecialType) -> TypeSymbol {
        self.lookup.special_type(special)
    }

    fn invalid(&self, node: &SyntaxNode, children: Vec<Operation>) -> Operation {
        Operation::new(OperationNode::Invalid { children }).with_syntax(node.clone())
    }

    /// Steps one level deeper, or reports the body as too deeply nested once.
    fn enter(&mut self, node: &SyntaxNode) -> bool {
        if self.depth >= MAX_BIND_DEPTH {
            if !self.too_deep {
                self.too_deep = true;
                self.report(MiniErrorCode::NestingTooDeep, node, &[]);
            }
            return false;
        }
        self.depth += 1;
        true
    }

    fn this_reference(&self, kind: InstanceReferenceKind) -> Operation {
        let ty = match kind {
            InstanceReferenceKind::Base => self
                .containing_type
                .base_type()
                .unwrap_or_else(|| TypeSymbol::Named(Arc::clone(&self.containing_type))),
            _ => TypeSymbol::Named(Arc::clone(&self.containing_type)),
        };
        Operation::new(OperationNode::InstanceReference { kind }).with_type(ty)
    }

    fn is_missing(&self, symbol: &Symbol) -> bool {
        let container = match symbol {
            Symbol::Method(m) => m.containing_type(),
            Symbol::Field(f) => f.containing_type(),
            _ => None,
        };
        container.is_some_and(|t| {
            self.compilation
                .is_member_missing(&format!("{}.{}", t.full_name(), symbol.name()))
        })
    }

    /// Members named `name` of `ty` and its bases, most derived first.
    fn members_named(&self, ty: &TypeSymbol, name: &str) -> Vec<Symbol> {
        let mut found: Vec<Symbol> = Vec::new();
        let mut current = ty.as_named().cloned();
        let mut depth = 0;
        while let Some(named) = current {
            if depth == MAX_BASE_DEPTH {
                break;
            }
            for member in named.get_members(name) {
                if self.is_missing(member) {
                    continue;
                }
                let hidden = match member {
                    Symbol::Method(m) => found.iter().any(|f| {
                        f.as_method()
                            .is_some_and(|seen| same_parameters(seen, m))
                    }),
                    _ => false,
                };
                if !hidden {
                    found.push(member.clone());
                }
            }
            current = named.base_type().and_then(|b| b.as_named().cloned());
            depth += 1;
        }
        found
    }

    fn lookup_local(&self, name: &str) -> Option<Arc<LocalSymbol>> {
        self.scopes
            .iter()
            .rev()
            .flat_map(|scope| scope.iter().rev())
            .find(|local| local.name() == name)
            .cloned()
    }

    // Conversions

    fn classify(from: Option<&TypeSymbol>, to: &TypeSymbol) -> Option<ConversionKind> {
        let Some(from) = from else {
            return to.is_reference_type().then_some(ConversionKind::ImplicitReference);
        };
        if from == to || from.is_error() || to.is_error() {
            return Some(ConversionKind::Identity);
        }
        if from.special_type() == SpecialType::Void {
            return None;
        }
        if to.special_type() == SpecialType::Object {
            return Some(if from.is_reference_type() {
                ConversionKind::ImplicitReference
            } else {
                ConversionKind::Boxing
            });
        }
        (from.is_reference_type() && from.is_or_derives_from(to))
            .then_some(ConversionKind::ImplicitReference)
    }

    fn convert(&mut self, operand: Operation, to: &TypeSymbol, node: &SyntaxNode) -> Operation {
        match Self::classify(operand.result_type(), to) {
            Some(ConversionKind::Identity) => operand,
            Some(conversion) => Operation::new(OperationNode::Conversion {
                operand: Box::new(operand),
                conversion,
                is_explicit: false,
                is_checked: false,
            })
            .with_type(to.clone()),
            None => {
                if !operand.is_invalid() {
                    let from = operand
                        .result_type()
                        .map_or_else(|| "null".to_string(), TypeSymbol::display_name);
                    self.report(MiniErrorCode::CannotConvert, node, &[&from, &to.display_name()]);
                }
                Operation::new(OperationNode::Conversion {
                    operand: Box::new(operand),
                    conversion: ConversionKind::Invalid,
                    is_explicit: false,
                    is_checked: false,
                })
                .with_type(to.clone())
                .into_invalid()
            }
        }
    }

    // Bodies

    fn bind_script(&mut self, root: &SyntaxNode) -> Result<Operation> {
        self.scopes.push(Vec::new());
        let compilation = self.compilation;
        let mut statements = Vec::new();
        for tree in compilation.syntax_trees().iter() {
            if !tree.is_script() {
                continue;
            }
            self.resolver = TypeResolver::new(compilation, self.lookup, tree, tree.root());
            for global in children_of(tree.root(), SyntaxKind::GlobalStatement) {
                if let Some(statement) = global.children().first() {
                    statements.push(self.bind_statement(statement)?);
                }
            }
        }
        let locals = self.scopes.pop().unwrap_or_default();
        Ok(Operation::block(statements, locals).with_syntax(root.clone()))
    }

    fn bind_constructor(&mut self, node: &SyntaxNode) -> Result<Operation> {
        let is_static = self.method.is_static();
        let mut statements = Vec::new();

        if !is_static {
            if let Some(base) = self.containing_type.base_type().filter(|b| !b.is_error()) {
                let constructor = base.as_named().and_then(|b| {
                    b.methods()
                        .find(|m| {
                            m.method_kind() == MethodKind::Constructor && m.parameters().is_empty()
                        })
                        .cloned()
                });
                match constructor {
                    Some(constructor) => {
                        let call = Operation::new(OperationNode::Invocation {
                            method: constructor,
                            instance: Some(Box::new(self.this_reference(InstanceReferenceKind::Base))),
                            arguments: Vec::new(),
                            is_virtual: false,
                        })
                        .with_type(self.special(SpecialType::Void));
                        statements.push(Operation::expression_statement(call));
                    }
                    None => {
                        self.report(
                            MiniErrorCode::MemberNotFound,
                            node,
                            &[&base.display_name(), &".ctor"],
                        );
                    }
                }
            }
        }

        let fields: Vec<_> = self
            .containing_type
            .fields()
            .filter(|f| f.is_static() == is_static)
            .cloned()
            .collect();
        for field in fields {
            let Some(reference) = field.declaring_syntax() else {
                continue;
            };
            let Some(initializer) = field_initializer(&reference.node) else {
                continue;
            };
            let value = self.bind_expression(initializer)?;
            let value = self.convert(value, field.field_type(), initializer);
            statements.push(
                Operation::new(OperationNode::FieldInitializer {
                    fields: vec![Arc::clone(&field)],
                    value: Box::new(value),
                })
                .with_syntax(reference.node.clone()),
            );
        }

        if is(node, SyntaxKind::ConstructorDeclaration) {
            if let Some(block) = child_of(node, SyntaxKind::Block) {
                statements.push(self.bind_block(block)?);
            }
        }
        Ok(Operation::block(statements, Vec::new()).with_syntax(node.clone()))
    }

    // Statements

    fn bind_block(&mut self, node: &SyntaxNode) -> Result<Operation> {
        self.scopes.push(Vec::new());
        let statements = node
            .children()
            .iter()
            .map(|statement| self.bind_statement(statement))
            .collect::<Result<Vec<_>>>();
        let locals = self.scopes.pop().unwrap_or_default();
        Ok(Operation::block(statements?, locals).with_syntax(node.clone()))
    }

    fn bind_embedded(&mut self, node: Option<&SyntaxNode>) -> Result<Box<Operation>> {
        Ok(Box::new(match node {
            Some(node) => self.bind_statement(node)?,
            None => Operation::new(OperationNode::Empty),
        }))
    }

    fn bind_condition(&mut self, node: Option<&SyntaxNode>) -> Result<Box<Operation>> {
        let boolean = self.special(SpecialType::Boolean);
        Ok(Box::new(match node {
            Some(node) => {
                let condition = self.bind_expression(node)?;
                self.convert(condition, &boolean, node)
            }
            None => Operation::literal(ConstantValue::Boolean(false)).into_invalid(),
        }))
    }

    fn bind_statement(&mut self, node: &SyntaxNode) -> Result<Operation> {
        if !self.enter(node) {
            return Ok(self.invalid(node, Vec::new()));
        }
        let statement = self.bind_statement_inner(node);
        self.depth -= 1;
        statement
    }

    fn bind_statement_inner(&mut self, node: &SyntaxNode) -> Result<Operation> {
        let children = node.children();
        let statement = match SyntaxKind::of(node) {
            Some(SyntaxKind::Block) => return self.bind_block(node),
            Some(SyntaxKind::LocalDeclaration) => return self.bind_local_declaration(node),
            Some(SyntaxKind::GlobalStatement) => match children.first() {
                Some(inner) => return self.bind_statement(inner),
                None => Operation::new(OperationNode::Empty),
            },
            Some(SyntaxKind::IfStatement) => {
                let condition = self.bind_condition(children.first())?;
                let if_true = self.bind_embedded(children.get(1))?;
                let if_false = match children.get(2) {
                    Some(node) => Some(Box::new(self.bind_statement(node)?)),
                    None => None,
                };
                Operation::new(OperationNode::If {
                    condition,
                    if_true,
                    if_false,
                })
            }
            Some(SyntaxKind::WhileStatement) => {
                let condition = self.bind_condition(children.first())?;
                self.loop_depth += 1;
                let body = self.bind_embedded(children.get(1));
                self.loop_depth -= 1;
                Operation::new(OperationNode::WhileUntilLoop {
                    is_top_test: true,
                    is_while: true,
                    condition,
                    body: body?,
                })
            }
            Some(SyntaxKind::DoStatement) => {
                self.loop_depth += 1;
                let body = self.bind_embedded(children.first());
                self.loop_depth -= 1;
                let body = body?;
                let condition = self.bind_condition(children.get(1))?;
                Operation::new(OperationNode::WhileUntilLoop {
                    is_top_test: false,
                    is_while: true,
                    condition,
                    body,
                })
            }
            Some(SyntaxKind::ReturnStatement) => {
                let value = match children.first() {
                    Some(expression) => {
                        let value = self.bind_expression(expression)?;
                        let return_type = self.method.return_type().clone();
                        Some(Box::new(self.convert(value, &return_type, expression)))
                    }
                    None => None,
                };
                Operation::new(OperationNode::Return { value })
            }
            Some(SyntaxKind::ThrowStatement) => {
                let exception = match children.first() {
                    Some(expression) => Some(Box::new(self.bind_expression(expression)?)),
                    None => None,
                };
                Operation::new(OperationNode::Throw { exception })
            }
            Some(kind @ (SyntaxKind::BreakStatement | SyntaxKind::ContinueStatement)) => {
                let branch = Operation::new(OperationNode::Branch {
                    kind: if kind == SyntaxKind::BreakStatement {
                        BranchKind::Break
                    } else {
                        BranchKind::Continue
                    },
                    target: None,
                });
                if self.loop_depth == 0 {
                    self.report(MiniErrorCode::NoEnclosingLoop, node, &[]);
                    branch.into_invalid()
                } else {
                    branch
                }
            }
            Some(SyntaxKind::ExpressionStatement) => match children.first() {
                Some(expression) => Operation::expression_statement(self.bind_expression(expression)?),
                None => Operation::new(OperationNode::Empty),
            },
            Some(SyntaxKind::EmptyStatement) => Operation::new(OperationNode::Empty),
            _ => self.invalid(node, Vec::new()),
        };
        Ok(statement.with_syntax(node.clone()))
    }

    fn bind_local_declaration(&mut self, node: &SyntaxNode) -> Result<Operation> {
        let children = node.children();
        let name = declared_name(node).unwrap_or_default().to_string();
        let initializer_node = children
            .iter()
            .position(|c| is(c, SyntaxKind::Identifier))
            .and_then(|i| children.get(i + 1));
        let initializer = match initializer_node {
            Some(expression) => Some(self.bind_expression(expression)?),
            None => None,
        };

        let type_node = children.first();
        let is_var = type_node
            .is_some_and(|t| is(t, SyntaxKind::PredefinedType) && t.text() == Some("var"));
        let local_type = if is_var {
            match initializer.as_ref().and_then(Operation::result_type) {
                Some(ty) => ty.clone(),
                None => {
                    if initializer.is_none() {
                        self.report(MiniErrorCode::ImplicitlyTypedWithoutInitializer, node, &[]);
                    }
                    TypeSymbol::Named(NamedTypeSymbol::error("", "var", 0))
                }
            }
        } else {
            match type_node {
                Some(syntax) => self.resolver.resolve(syntax, &mut self.diagnostics)?,
                None => TypeSymbol::Named(NamedTypeSymbol::error("", "?", 0)),
            }
        };

        let initializer = match (initializer, initializer_node) {
            (Some(value), Some(expression)) => {
                Some(Box::new(self.convert(value, &local_type, expression)))
            }
            _ => None,
        };

        if !name.is_empty() && self.lookup_local(&name).is_some() {
            self.report(MiniErrorCode::DuplicateLocal, node, &[&name]);
        }
        let local = LocalSymbol::new(
            &name,
            local_type,
            Some(SyntaxReference {
                tree: self.tree().clone(),
                node: node.clone(),
            }),
        );
        if let Some(scope) = self.scopes.last_mut() {
            scope.push(Arc::clone(&local));
        }

        let declaration = Operation::new(OperationNode::VariableDeclaration {
            variable: local,
            initializer,
        })
        .with_syntax(node.clone());
        Ok(Operation::new(OperationNode::VariableDeclarationStatement {
            declarations: vec![declaration],
        })
        .with_syntax(node.clone()))
    }

    // Expressions

    fn bind_expression(&mut self, node: &SyntaxNode) -> Result<Operation> {
        if !self.enter(node) {
            return Ok(self.invalid(node, Vec::new()));
        }
        let operation = self.bind_expression_inner(node);
        self.depth -= 1;
        operation
    }

    fn bind_expression_inner(&mut self, node: &SyntaxNode) -> Result<Operation> {
        let operation = match SyntaxKind::of(node) {
            Some(SyntaxKind::Identifier) | Some(SyntaxKind::MemberAccess) => {
                match self.bind_name(node)? {
                    Bound::Value(value) => value,
                    Bound::Type(ty) => {
                        self.report(MiniErrorCode::UndefinedName, node, &[&ty.display_name()]);
                        self.invalid(node, Vec::new())
                    }
                    Bound::Namespace(name) => {
                        if !name.is_empty() {
                            self.report(MiniErrorCode::UndefinedName, node, &[&name]);
                        }
                        self.invalid(node, Vec::new())
                    }
                }
            }
            Some(SyntaxKind::IntegerLiteral) => {
                let value = node.text().and_then(|t| t.parse::<i32>().ok()).unwrap_or(0);
                Operation::literal(ConstantValue::Int32(value))
                    .with_type(self.special(SpecialType::Int32))
            }
            Some(SyntaxKind::StringLiteral) => {
                Operation::literal(ConstantValue::String(node.text().unwrap_or_default().to_string()))
                    .with_type(self.special(SpecialType::String))
            }
            Some(kind @ (SyntaxKind::TrueLiteral | SyntaxKind::FalseLiteral)) => {
                Operation::literal(ConstantValue::Boolean(kind == SyntaxKind::TrueLiteral))
                    .with_type(self.special(SpecialType::Boolean))
            }
            Some(SyntaxKind::NullLiteral) => Operation::literal(ConstantValue::Null),
            Some(kind @ (SyntaxKind::ThisExpression | SyntaxKind::BaseExpression)) => {
                let (reference, keyword) = if kind == SyntaxKind::ThisExpression {
                    (InstanceReferenceKind::This, "this")
                } else {
                    (InstanceReferenceKind::Base, "base")
                };
                let operation = self.this_reference(reference);
                if self.method.is_static() {
                    self.report(MiniErrorCode::InstanceInStaticContext, node, &[&keyword]);
                    operation.into_invalid()
                } else {
                    operation
                }
            }
            Some(SyntaxKind::ParenthesizedExpression) => {
                let inner = match node.children().first() {
                    Some(inner) => self.bind_expression(inner)?,
                    None => self.invalid(node, Vec::new()),
                };
                let mut operation = Operation::new(OperationNode::Parenthesized {
                    operand: Box::new(inner.clone()),
                });
                if let Some(ty) = inner.result_type() {
                    operation = operation.with_type(ty.clone());
                }
                if let Some(constant) = inner.constant_value() {
                    operation = operation.with_constant(constant.clone());
                }
                operation
            }
            Some(SyntaxKind::InvocationExpression) => self.bind_invocation(node)?,
            Some(SyntaxKind::ObjectCreation) => self.bind_object_creation(node)?,
            Some(SyntaxKind::AnonymousObjectCreation) => self.bind_anonymous_object(node)?,
            Some(SyntaxKind::AssignmentExpression) => self.bind_assignment(node)?,
            Some(SyntaxKind::BinaryExpression) => self.bind_binary(node)?,
            Some(SyntaxKind::UnaryExpression) => self.bind_unary(node)?,
            Some(SyntaxKind::PostfixExpression) => {
                let children = node.children();
                let increment = children.get(1).and_then(SyntaxNode::text) == Some("++");
                let kind = if increment {
                    IncrementKind::PostfixIncrement
                } else {
                    IncrementKind::PostfixDecrement
                };
                self.bind_increment(node, children.first(), kind)?
            }
            _ => self.invalid(node, Vec::new()),
        };
        Ok(operation.with_syntax(node.clone()))
    }

    fn bind_name(&mut self, node: &SyntaxNode) -> Result<Bound> {
        if !self.enter(node) {
            return Ok(Bound::Value(self.invalid(node, Vec::new())));
        }
        let bound = self.bind_name_inner(node);
        self.depth -= 1;
        bound
    }

    fn bind_name_inner(&mut self, node: &SyntaxNode) -> Result<Bound> {
        if is(node, SyntaxKind::MemberAccess) {
            return self.bind_member_access(node);
        }
        let name = node.text().unwrap_or_default();
        if name.is_empty() {
            return Ok(Bound::Namespace(String::new()));
        }

        if let Some(local) = self.lookup_local(name) {
            let ty = local.local_type().clone();
            return Ok(Bound::Value(
                Operation::new(OperationNode::LocalReference { local }).with_type(ty),
            ));
        }
        if let Some(parameter) = self.method.parameters().iter().find(|p| p.name() == name) {
            let ty = parameter.parameter_type().clone();
            return Ok(Bound::Value(
                Operation::new(OperationNode::ParameterReference {
                    parameter: Arc::clone(parameter),
                })
                .with_type(ty),
            ));
        }

        let own_type = TypeSymbol::Named(Arc::clone(&self.containing_type));
        if let Some(member) = self.members_named(&own_type, name).into_iter().next() {
            let instance = self.implicit_instance(node, &member);
            return Ok(Bound::Value(member_value(member, instance)));
        }

        if let Some(ty) = self.resolver.resolve_name(name) {
            return Ok(Bound::Type(TypeSymbol::Named(ty)));
        }
        Ok(Bound::Namespace(name.to_string()))
    }

    /// The implicit `this` for an instance member used without receiver.
    fn implicit_instance(&mut self, node: &SyntaxNode, member: &Symbol) -> Option<Operation> {
        let is_static = match member {
            Symbol::Field(f) => f.is_static(),
            Symbol::Method(m) => m.is_static(),
            _ => true,
        };
        if is_static {
            return None;
        }
        let reference = self.this_reference(InstanceReferenceKind::Implicit);
        if self.method.is_static() {
            self.report(MiniErrorCode::InstanceInStaticContext, node, &[&"this"]);
            return Some(reference.into_invalid());
        }
        Some(reference)
    }

    fn bind_member_access(&mut self, node: &SyntaxNode) -> Result<Bound> {
        let children = node.children();
        let (Some(left), Some(name_node)) = (children.first(), children.get(1)) else {
            return Ok(Bound::Value(self.invalid(node, Vec::new())));
        };
        let name = name_node.text().unwrap_or_default();
        let left = self.bind_receiver(left)?;

        match left {
            Bound::Namespace(namespace) => {
                let full = if namespace.is_empty() {
                    name.to_string()
                } else {
                    format!("{namespace}.{name}")
                };
                Ok(match self.resolver.resolve_name(&full) {
                    Some(ty) => Bound::Type(TypeSymbol::Named(ty)),
                    None => Bound::Namespace(full),
                })
            }
            Bound::Type(ty) => {
                let member = self
                    .members_named(&ty, name)
                    .into_iter()
                    .find(|m| member_is_static(m));
                Ok(Bound::Value(match member {
                    Some(member) => member_value(member, None),
                    None => {
                        self.report(MiniErrorCode::MemberNotFound, node, &[&ty.display_name(), &name]);
                        self.invalid(node, Vec::new())
                    }
                }))
            }
            Bound::Value(receiver) => {
                let Some(ty) = receiver.result_type().cloned() else {
                    if !receiver.is_invalid() {
                        self.report(MiniErrorCode::MemberNotFound, node, &[&"null", &name]);
                    }
                    return Ok(Bound::Value(self.invalid(node, vec![receiver])));
                };
                let member = self
                    .members_named(&ty, name)
                    .into_iter()
                    .find(|m| !member_is_static(m));
                Ok(Bound::Value(match member {
                    Some(member) => member_value(member, Some(receiver)),
                    None => {
                        if !ty.is_error() {
                            self.report(
                                MiniErrorCode::MemberNotFound,
                                node,
                                &[&ty.display_name(), &name],
                            );
                        }
                        self.invalid(node, vec![receiver])
                    }
                }))
            }
        }
    }

    /// Binds the left side of a member access, which may name a type or namespace.
    fn bind_receiver(&mut self, node: &SyntaxNode) -> Result<Bound> {
        if is(node, SyntaxKind::Identifier) || is(node, SyntaxKind::MemberAccess) {
            Ok(match self.bind_name(node)? {
                Bound::Value(value) => Bound::Value(value.with_syntax(node.clone())),
                other => other,
            })
        } else {
            Ok(Bound::Value(self.bind_expression(node)?))
        }
    }

    fn bind_arguments(&mut self, node: Option<&SyntaxNode>) -> Result<Vec<(Operation, SyntaxNode)>> {
        let Some(list) = node else {
            return Ok(Vec::new());
        };
        list.children()
            .iter()
            .map(|argument| Ok((self.bind_expression(argument)?, argument.clone())))
            .collect()
    }

    /// Picks the candidate whose parameters fit the arguments best: identity matches
    /// before implicit conversions, declaration order among equals.
    fn pick_overload(
        candidates: &[Arc<MethodSymbol>],
        arguments: &[(Operation, SyntaxNode)],
    ) -> Option<Arc<MethodSymbol>> {
        let score = |method: &Arc<MethodSymbol>| -> usize {
            let kinds: Vec<_> = method
                .parameters()
                .iter()
                .zip(arguments)
                .map(|(p, (a, _))| Self::classify(a.result_type(), p.parameter_type()))
                .collect();
            if kinds.iter().any(Option::is_none) {
                0
            } else if kinds.iter().all(|k| *k == Some(ConversionKind::Identity)) {
                2
            } else {
                1
            }
        };
        let mut best: Option<(usize, &Arc<MethodSymbol>)> = None;
        for candidate in candidates {
            let value = score(candidate);
            if best.map_or(true, |(b, _)| value > b) {
                best = Some((value, candidate));
            }
        }
        best.map(|(_, m)| Arc::clone(m))
    }

    fn convert_arguments(
        &mut self,
        method: &MethodSymbol,
        arguments: Vec<(Operation, SyntaxNode)>,
    ) -> Vec<Operation> {
        method
            .parameters()
            .iter()
            .zip(arguments)
            .map(|(parameter, (value, syntax))| {
                let value = self.convert(value, parameter.parameter_type(), &syntax);
                Operation::new(OperationNode::Argument {
                    parameter: Some(Arc::clone(parameter)),
                    value: Box::new(value),
                })
                .with_syntax(syntax)
            })
            .collect()
    }

    fn bind_invocation(&mut self, node: &SyntaxNode) -> Result<Operation> {
        let children = node.children();
        let Some(callee) = children.first() else {
            return Ok(self.invalid(node, Vec::new()));
        };
        let arguments = self.bind_arguments(children.get(1))?;

        enum Receiver {
            Implicit,
            Type(TypeSymbol),
            Value(Operation),
        }

        let (receiver, name, receiver_type) = if is(callee, SyntaxKind::Identifier) {
            let own = TypeSymbol::Named(Arc::clone(&self.containing_type));
            (Receiver::Implicit, callee.text().unwrap_or_default(), own)
        } else if is(callee, SyntaxKind::MemberAccess) {
            let (Some(left), Some(name_node)) = (callee.children().first(), callee.children().get(1))
            else {
                return Ok(self.invalid(node, Vec::new()));
            };
            let name = name_node.text().unwrap_or_default();
            match self.bind_receiver(left)? {
                Bound::Type(ty) => (Receiver::Type(ty.clone()), name, ty),
                Bound::Value(value) => match value.result_type().cloned() {
                    Some(ty) => (Receiver::Value(value), name, ty),
                    None => {
                        if !value.is_invalid() {
                            self.report(MiniErrorCode::MemberNotFound, callee, &[&"null", &name]);
                        }
                        let mut children = vec![value];
                        children.extend(arguments.into_iter().map(|(a, _)| a));
                        return Ok(self.invalid(node, children));
                    }
                },
                Bound::Namespace(namespace) => {
                    if !namespace.is_empty() {
                        self.report(MiniErrorCode::UndefinedName, left, &[&namespace]);
                    }
                    let children = arguments.into_iter().map(|(a, _)| a).collect();
                    return Ok(self.invalid(node, children));
                }
            }
        } else {
            let value = self.bind_expression(callee)?;
            let mut children = vec![value];
            children.extend(arguments.into_iter().map(|(a, _)| a));
            return Ok(self.invalid(node, children));
        };

        let candidates: Vec<Arc<MethodSymbol>> = self
            .members_named(&receiver_type, name)
            .iter()
            .filter_map(Symbol::as_method)
            .filter(|m| match &receiver {
                Receiver::Implicit => true,
                Receiver::Type(_) => m.is_static(),
                Receiver::Value(_) => !m.is_static(),
            })
            .cloned()
            .collect();
        let matching: Vec<_> = candidates
            .iter()
            .filter(|m| m.parameters().len() == arguments.len())
            .cloned()
            .collect();

        let Some(method) = Self::pick_overload(&matching, &arguments) else {
            if !receiver_type.is_error() && !name.is_empty() {
                if candidates.is_empty() {
                    self.report(
                        MiniErrorCode::MemberNotFound,
                        callee,
                        &[&receiver_type.display_name(), &name],
                    );
                } else {
                    self.report(
                        MiniErrorCode::ArgumentCountMismatch,
                        callee,
                        &[&name, &arguments.len()],
                    );
                }
            }
            let mut children = Vec::new();
            if let Receiver::Value(value) = receiver {
                children.push(value);
            }
            children.extend(arguments.into_iter().map(|(a, _)| a));
            return Ok(self.invalid(node, children));
        };

        let (instance, is_base) = match receiver {
            Receiver::Value(value) => {
                let is_base = matches!(
                    value.node(),
                    OperationNode::InstanceReference {
                        kind: InstanceReferenceKind::Base
                    }
                );
                (Some(value), is_base)
            }
            Receiver::Implicit => (
                self.implicit_instance(callee, &Symbol::Method(Arc::clone(&method))),
                false,
            ),
            Receiver::Type(_) => (None, false),
        };
        let arguments = self.convert_arguments(&method, arguments);
        let return_type = method.return_type().clone();
        Ok(Operation::new(OperationNode::Invocation {
            is_virtual: method.is_virtual() && !is_base,
            method,
            instance: instance.map(Box::new),
            arguments,
        })
        .with_type(return_type))
    }

    fn bind_object_creation(&mut self, node: &SyntaxNode) -> Result<Operation> {
        let children = node.children();
        let ty = match children.first() {
            Some(syntax) => self.resolver.resolve(syntax, &mut self.diagnostics)?,
            None => TypeSymbol::Named(NamedTypeSymbol::error("", "?", 0)),
        };
        let arguments = self.bind_arguments(children.get(1))?;
        let constructors: Vec<Arc<MethodSymbol>> = ty
            .as_named()
            .map(|named| {
                named
                    .methods()
                    .filter(|m| m.method_kind() == MethodKind::Constructor)
                    .filter(|m| m.parameters().len() == arguments.len())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let Some(constructor) = Self::pick_overload(&constructors, &arguments) else {
            if !ty.is_error() {
                let name = ty.as_named().map_or_else(|| ty.display_name(), |n| n.name().to_string());
                self.report(MiniErrorCode::ArgumentCountMismatch, node, &[&name, &arguments.len()]);
            }
            let children = arguments.into_iter().map(|(a, _)| a).collect();
            return Ok(self.invalid(node, children).with_type(ty));
        };
        let arguments = self.convert_arguments(&constructor, arguments);
        Ok(Operation::new(OperationNode::ObjectCreation {
            constructor: Some(constructor),
            arguments,
            initializers: Vec::new(),
        })
        .with_type(ty))
    }

    fn bind_anonymous_object(&mut self, node: &SyntaxNode) -> Result<Operation> {
        let mut names = Vec::new();
        let mut values = Vec::new();
        for member in children_of(node, SyntaxKind::AnonymousMember) {
            let name = declared_name(member).unwrap_or_default();
            let Some(value_node) = member.children().get(1) else {
                continue;
            };
            let value = self.bind_expression(value_node)?;
            if name.is_empty() {
                continue;
            }
            if names.iter().any(|n| n == name) {
                self.report(MiniErrorCode::DuplicateMember, member, &[&"<anonymous type>", &name]);
                continue;
            }
            names.push(name.to_string());
            values.push((value, member.clone()));
        }

        let object = self.special(SpecialType::Object);
        let types = values
            .iter()
            .map(|(v, _)| v.result_type().cloned().unwrap_or_else(|| object.clone()))
            .collect();
        let shape = AnonymousTypeShape::new(names.clone(), types)?;
        let template = self.compilation.get_or_create_anonymous_type_template(&shape)?;

        let initializers = names
            .iter()
            .zip(values)
            .map(|(name, (value, member))| {
                let field = template.fields().find(|f| f.name() == name).cloned();
                match field {
                    Some(field) => {
                        let field_type = field.field_type().clone();
                        let value = self.convert(value, &field_type, &member);
                        let target = Operation::new(OperationNode::FieldReference {
                            field,
                            instance: None,
                        })
                        .with_type(field_type.clone());
                        Operation::new(OperationNode::Assignment {
                            target: Box::new(target),
                            value: Box::new(value),
                        })
                        .with_type(field_type)
                        .with_syntax(member)
                    }
                    None => self.invalid(&member, vec![value]),
                }
            })
            .collect();
        Ok(
            Operation::new(OperationNode::AnonymousObjectCreation { initializers })
                .with_type(TypeSymbol::Named(template)),
        )
    }

    fn check_assignable(&mut self, target: Operation, node: &SyntaxNode) -> Operation {
        let assignable = matches!(
            target.kind(),
            OperationKind::LocalReference
                | OperationKind::ParameterReference
                | OperationKind::FieldReference
                | OperationKind::ArrayElementReference
        );
        if assignable || target.is_invalid() {
            target
        } else {
            self.report(MiniErrorCode::InvalidAssignmentTarget, node, &[]);
            target.into_invalid()
        }
    }

    fn bind_assignment(&mut self, node: &SyntaxNode) -> Result<Operation> {
        let children = node.children();
        let (Some(target_node), Some(operator), Some(value_node)) =
            (children.first(), children.get(1), children.get(2))
        else {
            return Ok(self.invalid(node, Vec::new()));
        };
        let target = self.bind_expression(target_node)?;
        let target = self.check_assignable(target, target_node);
        let value = self.bind_expression(value_node)?;
        let target_type = target
            .result_type()
            .cloned()
            .unwrap_or_else(|| TypeSymbol::Named(NamedTypeSymbol::error("", "?", 0)));

        let operation = match operator.text().unwrap_or("=") {
            "=" => {
                let value = self.convert(value, &target_type, value_node);
                Operation::new(OperationNode::Assignment {
                    target: Box::new(target),
                    value: Box::new(value),
                })
            }
            compound => {
                let operator = binary_operator(compound.trim_end_matches('='))
                    .unwrap_or(BinaryOperatorKind::Add);
                let is_concat = operator == BinaryOperatorKind::Add
                    && target_type.special_type() == SpecialType::String;
                let value = if is_concat {
                    value
                } else {
                    let int = self.special(SpecialType::Int32);
                    self.convert(value, &int, value_node)
                };
                Operation::new(OperationNode::CompoundAssignment {
                    operator,
                    target: Box::new(target),
                    value: Box::new(value),
                })
            }
        };
        Ok(operation.with_type(target_type))
    }

    fn bind_binary(&mut self, node: &SyntaxNode) -> Result<Operation> {
        let children = node.children();
        let (Some(left_node), Some(operator), Some(right_node)) =
            (children.first(), children.get(1), children.get(2))
        else {
            return Ok(self.invalid(node, Vec::new()));
        };
        let Some(operator) = operator.text().and_then(binary_operator) else {
            return Ok(self.invalid(node, Vec::new()));
        };
        let left = self.bind_expression(left_node)?;
        let right = self.bind_expression(right_node)?;

        let int = self.special(SpecialType::Int32);
        let boolean = self.special(SpecialType::Boolean);
        let string = self.special(SpecialType::String);
        let is_string = |op: &Operation| {
            op.result_type()
                .is_some_and(|t| t.special_type() == SpecialType::String)
        };

        let (left, right, result_type) = if operator.is_conditional() {
            (
                self.convert(left, &boolean, left_node),
                self.convert(right, &boolean, right_node),
                boolean,
            )
        } else if operator == BinaryOperatorKind::Add && (is_string(&left) || is_string(&right)) {
            (left, right, string)
        } else if matches!(operator, BinaryOperatorKind::Equals | BinaryOperatorKind::NotEquals) {
            let (left, right) = match (left.result_type().cloned(), right.result_type().cloned()) {
                (Some(l), None) => (left, self.convert(right, &l, right_node)),
                (None, Some(r)) => (self.convert(left, &r, left_node), right),
                (Some(l), Some(r)) if Self::classify(Some(&r), &l).is_some() => {
                    (left, self.convert(right, &l, right_node))
                }
                (Some(l), Some(r)) => (self.convert(left, &r, left_node), right),
                (None, None) => (left, right),
            };
            (left, right, boolean)
        } else {
            let result = if operator.is_relational() { boolean } else { int.clone() };
            (
                self.convert(left, &int, left_node),
                self.convert(right, &int, right_node),
                result,
            )
        };

        let constant = fold_binary(operator, left.constant_value(), right.constant_value());
        let mut operation = Operation::new(OperationNode::BinaryOperator {
            operator,
            left: Box::new(left),
            right: Box::new(right),
            operator_method: None,
        })
        .with_type(result_type);
        if let Some(constant) = constant {
            operation = operation.with_constant(constant);
        }
        Ok(operation)
    }

    fn bind_unary(&mut self, node: &SyntaxNode) -> Result<Operation> {
        let children = node.children();
        let operator = children.first().and_then(SyntaxNode::text).unwrap_or_default();
        let operand_node = children.get(1);
        let (operator, operand_type) = match operator {
            "++" => return self.bind_increment(node, operand_node, IncrementKind::PrefixIncrement),
            "--" => return self.bind_increment(node, operand_node, IncrementKind::PrefixDecrement),
            "!" => (UnaryOperatorKind::Not, self.special(SpecialType::Boolean)),
            "-" => (UnaryOperatorKind::Minus, self.special(SpecialType::Int32)),
            _ => (UnaryOperatorKind::Plus, self.special(SpecialType::Int32)),
        };
        let Some(operand_node) = operand_node else {
            return Ok(self.invalid(node, Vec::new()));
        };
        let operand = self.bind_expression(operand_node)?;
        let operand = self.convert(operand, &operand_type, operand_node);
        let constant = match (operator, operand.constant_value()) {
            (UnaryOperatorKind::Not, Some(ConstantValue::Boolean(b))) => {
                Some(ConstantValue::Boolean(!b))
            }
            (UnaryOperatorKind::Minus, Some(ConstantValue::Int32(i))) => {
                Some(ConstantValue::Int32(i.wrapping_neg()))
            }
            (UnaryOperatorKind::Plus, Some(c)) => Some(c.clone()),
            _ => None,
        };
        let mut operation = Operation::new(OperationNode::UnaryOperator {
            operator,
            operand: Box::new(operand),
            operator_method: None,
        })
        .with_type(operand_type);
        if let Some(constant) = constant {
            operation = operation.with_constant(constant);
        }
        Ok(operation)
    }

    fn bind_increment(
        &mut self,
        node: &SyntaxNode,
        operand: Option<&SyntaxNode>,
        kind: IncrementKind,
    ) -> Result<Operation> {
        let Some(operand) = operand else {
            return Ok(self.invalid(node, Vec::new()));
        };
        let target = self.bind_expression(operand)?;
        let target = self.check_assignable(target, operand);
        let int = self.special(SpecialType::Int32);
        if Self::classify(target.result_type(), &int) != Some(ConversionKind::Identity) {
            let from = target
                .result_type()
                .map_or_else(|| "null".to_string(), TypeSymbol::display_name);
            self.report(MiniErrorCode::CannotConvert, operand, &[&from, &int.display_name()]);
        }
        Ok(Operation::new(OperationNode::Increment {
            kind,
            target: Box::new(target),
        })
        .with_type(int))
    }
}

fn same_parameters(a: &MethodSymbol, b: &MethodSymbol) -> bool {
    a.parameters().len() == b.parameters().len()
        && a.parameters()
            .iter()
            .zip(b.parameters())
            .all(|(x, y)| x.parameter_type() == y.parameter_type())
}

fn member_is_static(member: &Symbol) -> bool {
    match member {
        Symbol::Field(f) => f.is_static(),
        Symbol::Method(m) => m.is_static(),
        _ => false,
    }
}

fn member_value(member: Symbol, instance: Option<Operation>) -> Operation {
    match member {
        Symbol::Field(field) => {
            let ty = field.field_type().clone();
            Operation::new(OperationNode::FieldReference {
                field,
                instance: instance.map(Box::new),
            })
            .with_type(ty)
        }
        Symbol::Method(method) => Operation::new(OperationNode::MethodBinding {
            method,
            instance: instance.map(Box::new),
        }),
        _ => Operation::new(OperationNode::Invalid {
            children: instance.into_iter().collect(),
        }),
    }
}

fn binary_operator(text: &str) -> Option<BinaryOperatorKind> {
    Some(match text {
        "+" => BinaryOperatorKind::Add,
        "-" => BinaryOperatorKind::Subtract,
        "*" => BinaryOperatorKind::Multiply,
        "/" => BinaryOperatorKind::Divide,
        "%" => BinaryOperatorKind::Remainder,
        "&&" => BinaryOperatorKind::ConditionalAnd,
        "||" => BinaryOperatorKind::ConditionalOr,
        "==" => BinaryOperatorKind::Equals,
        "!=" => BinaryOperatorKind::NotEquals,
        "<" => BinaryOperatorKind::LessThan,
        "<=" => BinaryOperatorKind::LessThanOrEqual,
        ">" => BinaryOperatorKind::GreaterThan,
        ">=" => BinaryOperatorKind::GreaterThanOrEqual,
        _ => return None,
    })
}

fn fold_binary(
    operator: BinaryOperatorKind,
    left: Option<&ConstantValue>,
    right: Option<&ConstantValue>,
) -> Option<ConstantValue> {
    use BinaryOperatorKind as Op;
    use ConstantValue as C;

    Some(match (left?, right?) {
        (C::Int32(l), C::Int32(r)) => {
            let (l, r) = (*l, *r);
            match operator {
                Op::Add => C::Int32(l.wrapping_add(r)),
                Op::Subtract => C::Int32(l.wrapping_sub(r)),
                Op::Multiply => C::Int32(l.wrapping_mul(r)),
                Op::Divide => C::Int32(l.checked_div(r)?),
                Op::Remainder => C::Int32(l.checked_rem(r)?),
                Op::Equals => C::Boolean(l == r),
                Op::NotEquals => C::Boolean(l != r),
                Op::LessThan => C::Boolean(l < r),
                Op::LessThanOrEqual => C::Boolean(l <= r),
                Op::GreaterThan => C::Boolean(l > r),
                Op::GreaterThanOrEqual => C::Boolean(l >= r),
                _ => return None,
            }
        }
        (C::Boolean(l), C::Boolean(r)) => match operator {
            Op::ConditionalAnd => C::Boolean(*l && *r),
            Op::ConditionalOr => C::Boolean(*l || *r),
            Op::Equals => C::Boolean(l == r),
            Op::NotEquals => C::Boolean(l != r),
            _ => return None,
        },
        (C::String(l), C::String(r)) if operator == Op::Add => C::String(format!("{l}{r}")),
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        lang::MiniLanguage,
        operations::OperationKind,
        options::{CompilationOptions, OutputKind},
        references::{AssemblyMetadata, MetadataReference},
        utils::CancellationToken,
    };

    fn compile(source: &str) -> Compilation {
        MiniLanguage::create_compilation(
            Some("Test"),
            [MiniLanguage::parse(source, "test.mini")],
            [MetadataReference::from_metadata(AssemblyMetadata::core_library(), None)],
            CompilationOptions::new(OutputKind::DynamicallyLinkedLibrary),
        )
        .unwrap()
    }

    fn body(compilation: &Compilation, type_name: &str, method: &str) -> BoundBody {
        let ty = compilation.get_type_by_metadata_name(type_name).unwrap().unwrap();
        let method = ty.methods().find(|m| m.name() == method).unwrap().clone();
        let body = compilation
            .get_method_body(&method, &CancellationToken::none())
            .unwrap()
            .unwrap();
        (*body).clone()
    }

    #[test]
    fn test_names_bind_to_locals_parameters_and_fields() {
        let compilation = compile(
            "class C { int count; int Add(int step) { int total = count + step; return total; } }",
        );
        let bound = body(&compilation, "C", "Add");
        assert!(bound.diagnostics.is_empty(), "{:?}", bound.diagnostics);
        let OperationNode::Block { statements, locals } = bound.operation.node() else {
            panic!("expected block");
        };
        assert_eq!(locals.len(), 1);
        assert_eq!(statements[0].kind(), OperationKind::VariableDeclarationStatement);
        let declaration = statements[0].children()[0];
        let sum = declaration.children()[0];
        assert_eq!(sum.children()[0].kind(), OperationKind::FieldReference);
        assert_eq!(sum.children()[1].kind(), OperationKind::ParameterReference);
        assert_eq!(statements[1].children()[0].kind(), OperationKind::LocalReference);
    }

    #[test]
    fn test_static_calls_pick_overload_by_type() {
        let compilation = compile(
            "using System;\nclass C { static void Run() { Console.WriteLine(42); Console.WriteLine(\"hi\"); } }",
        );
        let bound = body(&compilation, "C", "Run");
        assert!(bound.diagnostics.is_empty(), "{:?}", bound.diagnostics);
        let calls: Vec<_> = bound
            .operation
            .children()
            .iter()
            .map(|s| match s.children()[0].node() {
                OperationNode::Invocation { method, .. } => {
                    method.parameters()[0].parameter_type().display_name()
                }
                _ => panic!("expected invocation"),
            })
            .collect();
        assert_eq!(calls, ["System.Int32", "System.String"]);
    }

    #[test]
    fn test_deep_nesting_is_reported() {
        let depth = 120;
        let source = format!(
            "class C {{ void M() {{ {}{} }} }}",
            "if (true) { ".repeat(depth),
            "}".repeat(depth)
        );
        let tree = MiniLanguage::parse(&source, "deep.mini");
        assert!(tree.diagnostics().is_empty(), "{:?}", tree.diagnostics());

        let compilation = compile(&source);
        let bound = body(&compilation, "C", "M");
        let ids: Vec<_> = bound.diagnostics.iter().map(|d| d.id().to_string()).collect();
        assert_eq!(ids, ["MN1007"]);

        let chain = format!(
            "class C {{ int M(int a) {{ return a{}; }} }}",
            " + a".repeat(4 * MAX_BIND_DEPTH)
        );
        let bound = body(&compile(&chain), "C", "M");
        assert!(bound.diagnostics.iter().any(|d| d.id() == "MN1007"));

        let diagnostics = compilation.get_diagnostics(&CancellationToken::none()).unwrap();
        assert!(diagnostics.iter().any(|d| d.id() == "MN1007" && d.is_error()));
    }

    #[test]
    fn test_errors_are_reported_not_raised() {
        let compilation = compile(
            "class C { void M() { missing = 1; break; int x; int x; this.M(1); var v; } }",
        );
        let bound = body(&compilation, "C", "M");
        let ids: Vec<_> = bound.diagnostics.iter().map(|d| d.id().to_string()).collect();
        assert_eq!(ids, ["MN2001", "MN2005", "MN2009", "MN2004", "MN2010"]);
    }

    #[test]
    fn test_constructor_body_order() {
        let compilation = compile("class C { int a = 1; C() { a = 2; } }");
        let bound = body(&compilation, "C", ".ctor");
        let kinds: Vec<_> = bound.operation.children().iter().map(|c| c.kind()).collect();
        assert_eq!(
            kinds,
            [
                OperationKind::ExpressionStatement,
                OperationKind::FieldInitializer,
                OperationKind::Block
            ]
        );
    }

    #[test]
    fn test_constant_folding_and_conversions() {
        let compilation = compile("class C { object M() { return 2 * 3 + 1; } }");
        let bound = body(&compilation, "C", "M");
        let ret = bound.operation.children()[0];
        let conversion = ret.children()[0];
        assert!(matches!(
            conversion.node(),
            OperationNode::Conversion {
                conversion: ConversionKind::Boxing,
                ..
            }
        ));
        assert_eq!(
            conversion.children()[0].constant_value(),
            Some(&ConstantValue::Int32(7))
        );
    }

    #[test]
    fn test_anonymous_objects_share_templates() {
        let compilation = compile(
            "class C { void M() { var a = new { X = 1, Y = \"s\" }; var b = new { X = 2, Y = \"t\" }; } }",
        );
        let bound = body(&compilation, "C", "M");
        assert!(bound.diagnostics.is_empty(), "{:?}", bound.diagnostics);
        assert_eq!(compilation.anonymous_type_templates().len(), 1);
    }
}
