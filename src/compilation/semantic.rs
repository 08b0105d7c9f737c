//! Per-tree semantic queries.

use std::sync::Arc;

use crate::{
    compilation::Compilation,
    diagnostics::Diagnostic,
    operations::{
        analyze_control_flow, analyze_data_flow, ControlFlowAnalysis, DataFlowAnalysis, Operation,
        OperationNode,
    },
    symbols::{MethodSymbol, Symbol, SyntaxReference},
    syntax::{SyntaxNode, SyntaxTree},
    utils::CancellationToken,
    Result,
};

/// Semantic queries over one tree of a compilation.
///
/// Created by [`Compilation::get_semantic_model`]. The model shares the compilation's
/// cached state, so repeated queries do not rebind.
#[derive(Debug, Clone)]
pub struct SemanticModel {
    compilation: Compilation,
    tree: SyntaxTree,
}

impl SemanticModel {
    pub(crate) fn new(compilation: Compilation, tree: SyntaxTree) -> Self {
        SemanticModel { compilation, tree }
    }

    /// The compilation this model queries.
    #[must_use]
    pub fn compilation(&self) -> &Compilation {
        &self.compilation
    }

    /// The tree this model covers.
    #[must_use]
    pub fn syntax_tree(&self) -> &SyntaxTree {
        &self.tree
    }

    fn declared_here(&self, reference: &SyntaxReference, node: &SyntaxNode) -> bool {
        reference.tree == self.tree && reference.node == *node
    }

    /// The symbol declared by `node`: a type, method or field declaration.
    ///
    /// # Errors
    ///
    /// Propagates declaration failures.
    pub fn get_declared_symbol(&self, node: &SyntaxNode) -> Result<Option<Symbol>> {
        let assembly = self.compilation.assembly()?;
        for ty in assembly.types() {
            if ty
                .declaring_syntax()
                .iter()
                .any(|r| self.declared_here(r, node))
            {
                return Ok(Some(Symbol::from(Arc::clone(ty))));
            }
            for member in ty.members() {
                if member
                    .declaring_syntax()
                    .iter()
                    .any(|r| self.declared_here(r, node))
                {
                    return Ok(Some(member.clone()));
                }
            }
        }
        Ok(None)
    }

    /// The innermost source method of this tree whose declaration contains `node`.
    ///
    /// # Errors
    ///
    /// Propagates declaration failures.
    pub fn get_enclosing_method(&self, node: &SyntaxNode) -> Result<Option<Arc<MethodSymbol>>> {
        let assembly = self.compilation.assembly()?;
        let mut best: Option<(usize, Arc<MethodSymbol>)> = None;
        for ty in assembly.types() {
            for method in ty.methods() {
                let Some(reference) = method.declaring_syntax() else {
                    continue;
                };
                let span = reference.node.span();
                if reference.tree != self.tree || !span.contains_span(node.span()) {
                    continue;
                }
                if best.as_ref().map_or(true, |(len, _)| span.len < *len) {
                    best = Some((span.len, Arc::clone(method)));
                }
            }
        }
        Ok(best.map(|(_, method)| method))
    }

    /// The operation bound for `node`, if `node` is inside a method body and binding
    /// produced an operation for it.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Cancelled`] if `cancel` is signalled.
    pub fn get_operation(
        &self,
        node: &SyntaxNode,
        cancel: &CancellationToken,
    ) -> Result<Option<Operation>> {
        let Some(method) = self.get_enclosing_method(node)? else {
            return Ok(None);
        };
        let Some(body) = self.compilation.get_method_body(&method, cancel)? else {
            return Ok(None);
        };
        Ok(find_operation(&body.operation, node).cloned())
    }

    /// Diagnostics of the compilation located in this tree.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Cancelled`] if `cancel` is signalled.
    pub fn get_diagnostics(&self, cancel: &CancellationToken) -> Result<Vec<Diagnostic>> {
        Ok(self
            .compilation
            .get_diagnostics(cancel)?
            .into_iter()
            .filter(|d| d.location().source_tree() == Some(&self.tree))
            .collect())
    }

    /// Control flow through the statements from `first` to `last`, which must belong
    /// to the same statement list of `body`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Argument`] if the statements are not siblings in `body`
    /// or `first` comes after `last`.
    pub fn analyze_control_flow<'a>(
        &self,
        body: &'a Operation,
        first: &SyntaxNode,
        last: &SyntaxNode,
    ) -> Result<ControlFlowAnalysis<'a>> {
        let (statements, first, last) = locate_region(body, first, last)?;
        analyze_control_flow(statements, first, last)
    }

    /// Data flow through the statements from `first` to `last`.
    ///
    /// # Errors
    ///
    /// See [`SemanticModel::analyze_control_flow`].
    pub fn analyze_data_flow(
        &self,
        body: &Operation,
        first: &SyntaxNode,
        last: &SyntaxNode,
    ) -> Result<DataFlowAnalysis> {
        let (statements, first, last) = locate_region(body, first, last)?;
        analyze_data_flow(statements, first, last)
    }
}

fn find_operation<'a>(operation: &'a Operation, node: &SyntaxNode) -> Option<&'a Operation> {
    if operation.syntax() == Some(node) {
        return Some(operation);
    }
    operation
        .children()
        .into_iter()
        .find_map(|child| find_operation(child, node))
}

fn position(statements: &[Operation], node: &SyntaxNode) -> Option<usize> {
    statements.iter().position(|s| s.syntax() == Some(node))
}

fn locate_region<'a>(
    body: &'a Operation,
    first: &SyntaxNode,
    last: &SyntaxNode,
) -> Result<(&'a [Operation], usize, usize)> {
    let statements: Option<&'a [Operation]> = match body.node() {
        OperationNode::Block { statements, .. } => Some(statements),
        OperationNode::SwitchCase { body, .. } => Some(body),
        _ => None,
    };
    if let Some(statements) = statements {
        if let Some(start) = position(statements, first) {
            return match position(statements, last) {
                Some(end) => Ok((statements, start, end)),
                None => Err(argument_error!(
                    "last",
                    "the last statement is not in the same statement list as the first"
                )),
            };
        }
    }
    for child in body.children() {
        if let Ok(found) = locate_region(child, first, last) {
            return Ok(found);
        }
    }
    Err(argument_error!(
        "first",
        "the first statement is not part of the analyzed body"
    ))
}
