//! Compiler phase notifications.

use std::fmt;

use crate::{symbols::Symbol, syntax::SyntaxTree};

/// An event posted to a compilation's event queue.
///
/// Events arrive in phase order: [`CompilationEvent::CompilationStarted`] once, a
/// [`CompilationEvent::SymbolDeclared`] per source type and member, a
/// [`CompilationEvent::CompilationUnitCompleted`] per tree once its method bodies are
/// bound, and finally [`CompilationEvent::CompilationCompleted`], after which the queue
/// is completed.
#[derive(Clone)]
pub enum CompilationEvent {
    /// Declaration has begun.
    CompilationStarted,
    /// A source symbol was declared.
    SymbolDeclared(Symbol),
    /// Every method body in a tree has been bound.
    CompilationUnitCompleted(SyntaxTree),
    /// Every tree has completed.
    CompilationCompleted,
}

impl fmt::Debug for CompilationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompilationEvent::CompilationStarted => f.write_str("CompilationStarted"),
            CompilationEvent::SymbolDeclared(symbol) => {
                write!(f, "SymbolDeclared({})", symbol.display_name())
            }
            CompilationEvent::CompilationUnitCompleted(tree) => {
                write!(f, "CompilationUnitCompleted({})", tree.file_path())
            }
            CompilationEvent::CompilationCompleted => f.write_str("CompilationCompleted"),
        }
    }
}
