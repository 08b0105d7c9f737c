//! Control and data flow over a region of statements.
//!
//! A region is a contiguous run of statements from one statement list, given as the
//! list plus the inclusive indices of the first and last statement. Reachability is
//! computed structurally from constant conditions and jumps; it does not attempt to
//! prove anything about non-constant conditions.

use std::collections::HashSet;

use crate::{
    operations::{
        BranchKind, Operation, OperationKind, OperationNode, OperationVisitor, OperationWalker,
        DEFAULT_MAX_DEPTH,
    },
    symbols::Symbol,
    Error, Result,
};

/// Result of [`analyze_control_flow`].
#[derive(Debug)]
pub struct ControlFlowAnalysis<'a> {
    /// Whether control can reach the first statement of the region.
    pub start_point_is_reachable: bool,
    /// Whether control can flow past the last statement of the region.
    pub end_point_is_reachable: bool,
    /// `return` statements inside the region, in source order.
    pub return_statements: Vec<&'a Operation>,
}

/// Result of [`analyze_data_flow`].
#[derive(Debug, Default)]
pub struct DataFlowAnalysis {
    /// Locals declared inside the region.
    pub variables_declared: Vec<Symbol>,
    /// Locals and parameters whose value is read inside the region.
    pub read_inside: Vec<Symbol>,
    /// Locals and parameters assigned inside the region.
    pub written_inside: Vec<Symbol>,
}

fn check_region(statements: &[Operation], first: usize, last: usize) -> Result<()> {
    if last >= statements.len() {
        return Err(Error::ArgumentOutOfRange {
            param: "last",
            index: last,
            len: statements.len(),
        });
    }
    if first > last {
        return Err(argument_error!(
            "first",
            "first statement {} is after last statement {}",
            first,
            last
        ));
    }
    Ok(())
}

/// Analyzes control flow through `statements[first..=last]`.
///
/// Start reachability accounts for the statements before `first` in the same list.
///
/// # Errors
///
/// Returns [`Error::ArgumentOutOfRange`] or [`Error::Argument`] for a bad region and
/// [`Error::RecursionLimit`] for pathologically nested statements.
pub fn analyze_control_flow(
    statements: &[Operation],
    first: usize,
    last: usize,
) -> Result<ControlFlowAnalysis<'_>> {
    check_region(statements, first, last)?;

    let mut start = true;
    for statement in &statements[..first] {
        start = start && end_reachable(statement, 0)?;
    }

    let mut end = start;
    let mut return_statements = Vec::new();
    for statement in &statements[first..=last] {
        if end || is_jump_target(statement) {
            end = end_reachable(statement, 0)?;
        }
        collect_returns(statement, &mut return_statements, 0)?;
    }

    Ok(ControlFlowAnalysis {
        start_point_is_reachable: start,
        end_point_is_reachable: end,
        return_statements,
    })
}

fn is_jump_target(statement: &Operation) -> bool {
    statement.kind() == OperationKind::Labeled
}

fn constant_condition(condition: &Operation) -> Option<bool> {
    condition.constant_value().and_then(|c| c.as_bool())
}

fn guard(depth: usize) -> Result<()> {
    if depth >= DEFAULT_MAX_DEPTH {
        return Err(Error::RecursionLimit(DEFAULT_MAX_DEPTH));
    }
    Ok(())
}

fn sequence_end_reachable(statements: &[Operation], depth: usize) -> Result<bool> {
    let mut reachable = true;
    for statement in statements {
        if reachable || is_jump_target(statement) {
            reachable = end_reachable(statement, depth)?;
        }
    }
    Ok(reachable)
}

/// Whether control falls out of the end of `statement` when it is entered.
fn end_reachable(statement: &Operation, depth: usize) -> Result<bool> {
    guard(depth)?;
    let depth = depth + 1;
    let reachable = match statement.node() {
        OperationNode::Return { .. }
        | OperationNode::Throw { .. }
        | OperationNode::Branch { .. }
        | OperationNode::YieldBreak => false,
        OperationNode::Block { statements, .. } => sequence_end_reachable(statements, depth)?,
        OperationNode::Labeled { statement, .. } => match statement {
            Some(inner) => end_reachable(inner, depth)?,
            None => true,
        },
        OperationNode::If {
            condition,
            if_true,
            if_false,
        } => {
            let true_end = end_reachable(if_true, depth)?;
            let false_end = match if_false {
                Some(f) => end_reachable(f, depth)?,
                None => true,
            };
            match constant_condition(condition) {
                Some(true) => true_end,
                Some(false) => false_end,
                None => true_end || false_end,
            }
        }
        OperationNode::WhileUntilLoop {
            is_while,
            condition,
            body,
            ..
        } => {
            let exits_normally = match constant_condition(condition) {
                Some(value) => value != *is_while,
                None => true,
            };
            exits_normally || contains_loop_break(body, depth)?
        }
        OperationNode::ForLoop {
            condition, body, ..
        } => {
            let infinite = match condition {
                None => true,
                Some(c) => constant_condition(c) == Some(true),
            };
            !infinite || contains_loop_break(body, depth)?
        }
        OperationNode::Try {
            body,
            catches,
            finally,
        } => {
            let finally_end = match finally {
                Some(f) => end_reachable(f, depth)?,
                None => true,
            };
            let mut any = end_reachable(body, depth)?;
            for catch in catches {
                if let OperationNode::CatchClause { handler, .. } = catch.node() {
                    any = end_reachable(handler, depth)? || any;
                }
            }
            any && finally_end
        }
        OperationNode::Lock { body, .. } | OperationNode::Using { body, .. } => {
            end_reachable(body, depth)?
        }
        _ => true,
    };
    Ok(reachable)
}

/// Whether `body` contains a `break` that exits the loop owning it.
fn contains_loop_break(body: &Operation, depth: usize) -> Result<bool> {
    guard(depth)?;
    match body.node() {
        OperationNode::Branch {
            kind: BranchKind::Break,
            ..
        } => return Ok(true),
        // Breaks below these belong to them.
        OperationNode::WhileUntilLoop { .. }
        | OperationNode::ForLoop { .. }
        | OperationNode::ForEachLoop { .. }
        | OperationNode::Switch { .. }
        | OperationNode::Lambda { .. } => return Ok(false),
        _ => {}
    }
    for child in body.children() {
        if contains_loop_break(child, depth + 1)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn collect_returns<'a>(
    operation: &'a Operation,
    out: &mut Vec<&'a Operation>,
    depth: usize,
) -> Result<()> {
    guard(depth)?;
    match operation.kind() {
        OperationKind::Return => out.push(operation),
        OperationKind::Lambda => return Ok(()),
        _ => {}
    }
    for child in operation.children() {
        collect_returns(child, out, depth + 1)?;
    }
    Ok(())
}

#[derive(Default)]
struct DataFlowVisitor {
    result: DataFlowAnalysis,
    // Targets of simple assignments: written, not read.
    write_only: HashSet<*const Operation>,
}

fn push_unique(list: &mut Vec<Symbol>, symbol: Symbol) {
    if !list.contains(&symbol) {
        list.push(symbol);
    }
}

fn variable_of(operation: &Operation) -> Option<Symbol> {
    match operation.node() {
        OperationNode::LocalReference { local } => Some(Symbol::Local(local.clone())),
        OperationNode::ParameterReference { parameter } => {
            Some(Symbol::Parameter(parameter.clone()))
        }
        OperationNode::Parenthesized { operand } => variable_of(operand),
        _ => None,
    }
}

impl OperationVisitor for DataFlowVisitor {
    fn visit_variable_declaration(&mut self, operation: &Operation) {
        if let OperationNode::VariableDeclaration {
            variable,
            initializer,
        } = operation.node()
        {
            let symbol = Symbol::Local(variable.clone());
            push_unique(&mut self.result.variables_declared, symbol.clone());
            if initializer.is_some() {
                push_unique(&mut self.result.written_inside, symbol);
            }
        }
    }

    fn visit_for_each_loop(&mut self, operation: &Operation) {
        if let OperationNode::ForEachLoop {
            iteration_variable, ..
        } = operation.node()
        {
            let symbol = Symbol::Local(iteration_variable.clone());
            push_unique(&mut self.result.variables_declared, symbol.clone());
            push_unique(&mut self.result.written_inside, symbol);
        }
    }

    fn visit_catch_clause(&mut self, operation: &Operation) {
        if let OperationNode::CatchClause {
            local: Some(local), ..
        } = operation.node()
        {
            let symbol = Symbol::Local(local.clone());
            push_unique(&mut self.result.variables_declared, symbol.clone());
            push_unique(&mut self.result.written_inside, symbol);
        }
    }

    fn visit_assignment(&mut self, operation: &Operation) {
        if let OperationNode::Assignment { target, .. } = operation.node() {
            if let Some(symbol) = variable_of(target) {
                push_unique(&mut self.result.written_inside, symbol);
                self.write_only.insert(&**target as *const Operation);
            }
        }
    }

    fn visit_compound_assignment(&mut self, operation: &Operation) {
        if let OperationNode::CompoundAssignment { target, .. } = operation.node() {
            if let Some(symbol) = variable_of(target) {
                push_unique(&mut self.result.written_inside, symbol);
            }
        }
    }

    fn visit_increment(&mut self, operation: &Operation) {
        if let OperationNode::Increment { target, .. } = operation.node() {
            if let Some(symbol) = variable_of(target) {
                push_unique(&mut self.result.written_inside, symbol);
            }
        }
    }

    fn visit_local_reference(&mut self, operation: &Operation) {
        self.record_read(operation);
    }

    fn visit_parameter_reference(&mut self, operation: &Operation) {
        self.record_read(operation);
    }
}

impl DataFlowVisitor {
    fn record_read(&mut self, operation: &Operation) {
        if self.write_only.contains(&(operation as *const Operation)) {
            return;
        }
        if let Some(symbol) = variable_of(operation) {
            push_unique(&mut self.result.read_inside, symbol);
        }
    }
}

/// Analyzes variable usage in `statements[first..=last]`.
///
/// # Errors
///
/// Returns [`Error::ArgumentOutOfRange`] or [`Error::Argument`] for a bad region and
/// [`Error::RecursionLimit`] for pathologically nested statements.
pub fn analyze_data_flow(
    statements: &[Operation],
    first: usize,
    last: usize,
) -> Result<DataFlowAnalysis> {
    check_region(statements, first, last)?;

    let mut walker = OperationWalker::new(DataFlowVisitor::default());
    for statement in &statements[first..=last] {
        walker.walk(statement)?;
    }
    Ok(walker.into_inner().result)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        operations::{BinaryOperatorKind, ConstantValue},
        symbols::{LocalSymbol, NamedTypeSymbol, TypeSymbol},
    };

    fn int_type() -> TypeSymbol {
        TypeSymbol::Named(NamedTypeSymbol::error("System", "Int32", 0))
    }

    fn local(name: &str) -> Arc<LocalSymbol> {
        LocalSymbol::new(name, int_type(), None)
    }

    fn read(local: &Arc<LocalSymbol>) -> Operation {
        Operation::new(OperationNode::LocalReference {
            local: local.clone(),
        })
    }

    fn ret(value: Option<Operation>) -> Operation {
        Operation::new(OperationNode::Return {
            value: value.map(Box::new),
        })
    }

    fn boolean(value: bool) -> Operation {
        Operation::literal(ConstantValue::Boolean(value))
    }

    #[test]
    fn test_return_ends_region() {
        let statements = vec![
            Operation::new(OperationNode::Empty),
            ret(None),
            Operation::new(OperationNode::Empty),
        ];
        let flow = analyze_control_flow(&statements, 0, 1).unwrap();
        assert!(flow.start_point_is_reachable);
        assert!(!flow.end_point_is_reachable);
        assert_eq!(flow.return_statements.len(), 1);

        let tail = analyze_control_flow(&statements, 2, 2).unwrap();
        assert!(!tail.start_point_is_reachable);
        assert!(!tail.end_point_is_reachable);
    }

    #[test]
    fn test_if_with_returns_on_both_branches() {
        let x = local("x");
        let condition = Operation::new(OperationNode::BinaryOperator {
            operator: BinaryOperatorKind::LessThan,
            left: Box::new(read(&x)),
            right: Box::new(Operation::literal(ConstantValue::Int32(0))),
            operator_method: None,
        });
        let statements = vec![Operation::new(OperationNode::If {
            condition: Box::new(condition),
            if_true: Box::new(ret(None)),
            if_false: Some(Box::new(ret(None))),
        })];
        let flow = analyze_control_flow(&statements, 0, 0).unwrap();
        assert!(!flow.end_point_is_reachable);
        assert_eq!(flow.return_statements.len(), 2);
    }

    #[test]
    fn test_infinite_loop_with_break() {
        let looping = |body: Operation| {
            vec![Operation::new(OperationNode::WhileUntilLoop {
                is_top_test: true,
                is_while: true,
                condition: Box::new(boolean(true)),
                body: Box::new(body),
            })]
        };
        let forever = looping(Operation::block(Vec::new(), Vec::new()));
        assert!(!analyze_control_flow(&forever, 0, 0).unwrap().end_point_is_reachable);

        let breaks = looping(Operation::new(OperationNode::Branch {
            kind: BranchKind::Break,
            target: None,
        }));
        assert!(analyze_control_flow(&breaks, 0, 0).unwrap().end_point_is_reachable);
    }

    #[test]
    fn test_bad_region() {
        let statements = vec![Operation::new(OperationNode::Empty)];
        assert!(matches!(
            analyze_control_flow(&statements, 0, 3),
            Err(Error::ArgumentOutOfRange { .. })
        ));
        assert!(matches!(
            analyze_data_flow(&statements, 1, 0),
            Err(Error::Argument { param: "first", .. })
        ));
    }

    #[test]
    fn test_data_flow_reads_and_writes() {
        let a = local("a");
        let b = local("b");
        let statements = vec![
            Operation::new(OperationNode::VariableDeclarationStatement {
                declarations: vec![Operation::new(OperationNode::VariableDeclaration {
                    variable: a.clone(),
                    initializer: Some(Box::new(Operation::literal(ConstantValue::Int32(1)))),
                })],
            }),
            Operation::expression_statement(Operation::new(OperationNode::Assignment {
                target: Box::new(read(&b)),
                value: Box::new(read(&a)),
            })),
        ];
        let flow = analyze_data_flow(&statements, 0, 1).unwrap();
        assert_eq!(flow.variables_declared, vec![Symbol::Local(a.clone())]);
        assert_eq!(flow.read_inside, vec![Symbol::Local(a.clone())]);
        assert_eq!(
            flow.written_inside,
            vec![Symbol::Local(a), Symbol::Local(b)]
        );
    }
}
