//! Depth-first traversal of operation trees.

use crate::{
    operations::{Operation, OperationVisitor},
    Error, Result,
};

/// Nesting depth at which a walk gives up.
pub const DEFAULT_MAX_DEPTH: usize = 512;

/// Walks a tree in pre-order, handing every node to a visitor.
///
/// Nodes are visited parent first, then children in [`Operation::children`]
/// order. Walks deeper than the configured limit fail with
/// [`Error::RecursionLimit`] instead of exhausting the stack.
///
/// # Examples
///
/// ```rust
/// use dotcompile::operations::{
///     ConstantValue, Operation, OperationKind, OperationVisitor, OperationWalker,
/// };
///
/// struct Kinds(Vec<OperationKind>);
/// impl OperationVisitor for Kinds {
///     fn default_visit(&mut self, operation: &Operation) {
///         self.0.push(operation.kind());
///     }
/// }
///
/// let tree = Operation::block(
///     vec![Operation::expression_statement(Operation::literal(ConstantValue::Null))],
///     Vec::new(),
/// );
/// let mut walker = OperationWalker::new(Kinds(Vec::new()));
/// walker.walk(&tree)?;
/// assert_eq!(
///     walker.into_inner().0,
///     [OperationKind::Block, OperationKind::ExpressionStatement, OperationKind::Literal]
/// );
/// # Ok::<(), dotcompile::Error>(())
/// ```
pub struct OperationWalker<V> {
    visitor: V,
    max_depth: usize,
}

impl<V: OperationVisitor> OperationWalker<V> {
    /// Creates a walker with [`DEFAULT_MAX_DEPTH`].
    pub fn new(visitor: V) -> Self {
        OperationWalker {
            visitor,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Overrides the depth limit.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Walks `root` and everything below it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RecursionLimit`] if the tree nests deeper than the limit.
    pub fn walk(&mut self, root: &Operation) -> Result<()> {
        self.walk_at(root, 0)
    }

    fn walk_at(&mut self, operation: &Operation, depth: usize) -> Result<()> {
        if depth >= self.max_depth {
            return Err(Error::RecursionLimit(self.max_depth));
        }

        self.visitor.visit(operation);
        for child in operation.children() {
            self.walk_at(child, depth + 1)?;
        }
        Ok(())
    }

    /// The visitor.
    pub fn visitor(&self) -> &V {
        &self.visitor
    }

    /// Consumes the walker, returning the visitor.
    pub fn into_inner(self) -> V {
        self.visitor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::{ConstantValue, OperationNode, UnaryOperatorKind};

    #[derive(Default)]
    struct Count(usize);

    impl OperationVisitor for Count {
        fn default_visit(&mut self, _operation: &Operation) {
            self.0 += 1;
        }
    }

    fn nested(depth: usize) -> Operation {
        let mut op = Operation::literal(ConstantValue::Int32(1));
        for _ in 0..depth {
            op = Operation::new(OperationNode::UnaryOperator {
                operator: UnaryOperatorKind::Minus,
                operand: Box::new(op),
                operator_method: None,
            });
        }
        op
    }

    #[test]
    fn test_walk_visits_every_node() {
        let mut walker = OperationWalker::new(Count::default());
        walker.walk(&nested(10)).unwrap();
        assert_eq!(walker.visitor().0, 11);
    }

    #[test]
    fn test_walk_depth_limit() {
        let mut walker = OperationWalker::new(Count::default()).with_max_depth(5);
        let err = walker.walk(&nested(10)).unwrap_err();
        assert!(matches!(err, Error::RecursionLimit(5)));

        let mut walker = OperationWalker::new(Count::default()).with_max_depth(5);
        assert!(walker.walk(&nested(4)).is_ok());
    }
}
