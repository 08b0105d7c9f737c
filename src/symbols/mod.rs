//! Language-neutral symbol model.
//!
//! Symbols are the semantic counterpart of declarations: assemblies, namespaces, types
//! and their members. They come from two places, source declarations built by a
//! language plug-in and assemblies bound from [`crate::references::MetadataReference`]s,
//! and share one representation so that lookups, accessibility checks and emission do
//! not care where a symbol came from.
//!
//! # Key Components
//!
//! - [`Symbol`] - Any symbol, compared by identity
//! - [`TypeSymbol`] - Named, array and pointer types
//! - [`AssemblySymbol`] / [`NamespaceSymbol`] - Containers
//! - [`NamedTypeSymbol`] - Classes, structs, interfaces, error and anonymous types
//! - [`MethodSymbol`], [`FieldSymbol`], [`ParameterSymbol`], [`LocalSymbol`] - Members and variables
//! - [`is_symbol_accessible`] - Default accessibility rules
//! - [`AnonymousTypeManager`] - Anonymous type templates, sealed before emission
//!
//! # Ownership
//!
//! Containers own their contents through `Arc`; back-pointers (type to assembly, member
//! to type) are `Weak`, so an assembly and everything in it is freed together.

mod accessibility;
mod anonymous;
mod assembly;
mod members;
mod types;

pub use accessibility::{is_symbol_accessible, Accessibility};
pub use anonymous::{AnonymousTypeManager, AnonymousTypeShape};
pub use assembly::{AssemblyOrigin, AssemblySymbol, NamespaceSymbol};
pub use members::{FieldSymbol, LocalSymbol, MethodKind, MethodSymbol, ParameterSymbol};
pub use types::{
    ArrayTypeSymbol, NamedTypeBuilder, NamedTypeSymbol, PointerTypeSymbol, SpecialType,
    TypeKind,
};

use std::{fmt, sync::Arc};

use strum::{EnumCount, EnumIter};

use crate::syntax::{SyntaxNode, SyntaxTree};

/// Kind of a [`Symbol`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount)]
pub enum SymbolKind {
    /// An assembly.
    Assembly,
    /// A namespace.
    Namespace,
    /// A named type.
    NamedType,
    /// An array type.
    ArrayType,
    /// A pointer type.
    PointerType,
    /// A method or constructor.
    Method,
    /// A field.
    Field,
    /// A parameter.
    Parameter,
    /// A local variable.
    Local,
}

/// A declaration site: the tree and the declaring node.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxReference {
    /// Tree containing the declaration
    pub tree: SyntaxTree,
    /// Declaring node
    pub node: SyntaxNode,
}

/// Any type.
#[derive(Clone)]
pub enum TypeSymbol {
    /// A named type (including error and anonymous types).
    Named(Arc<NamedTypeSymbol>),
    /// An array.
    Array(Arc<ArrayTypeSymbol>),
    /// An unmanaged pointer.
    Pointer(Arc<PointerTypeSymbol>),
}

impl TypeSymbol {
    /// Display name, e.g. `System.Int32[]`.
    #[must_use]
    pub fn display_name(&self) -> String {
        match self {
            TypeSymbol::Named(t) => t.display_name(),
            TypeSymbol::Array(a) => {
                let commas = ",".repeat(a.rank().saturating_sub(1));
                format!("{}[{}]", a.element_type().display_name(), commas)
            }
            TypeSymbol::Pointer(p) => format!("{}*", p.pointed_at_type().display_name()),
        }
    }

    /// The named type, if this is one.
    #[must_use]
    pub fn as_named(&self) -> Option<&Arc<NamedTypeSymbol>> {
        match self {
            TypeSymbol::Named(t) => Some(t),
            _ => None,
        }
    }

    /// Special type classification; [`SpecialType::None`] for arrays and pointers.
    #[must_use]
    pub fn special_type(&self) -> SpecialType {
        match self {
            TypeSymbol::Named(t) => t.special_type(),
            _ => SpecialType::None,
        }
    }

    /// `true` for error types.
    #[must_use]
    pub fn is_error(&self) -> bool {
        match self {
            TypeSymbol::Named(t) => t.is_error(),
            TypeSymbol::Array(a) => a.element_type().is_error(),
            TypeSymbol::Pointer(p) => p.pointed_at_type().is_error(),
        }
    }

    /// `true` for class-like types, arrays and strings.
    #[must_use]
    pub fn is_reference_type(&self) -> bool {
        match self {
            TypeSymbol::Named(t) => t.is_reference_type(),
            TypeSymbol::Array(_) => true,
            TypeSymbol::Pointer(_) => false,
        }
    }

    /// Kind of this type.
    #[must_use]
    pub fn symbol_kind(&self) -> SymbolKind {
        match self {
            TypeSymbol::Named(_) => SymbolKind::NamedType,
            TypeSymbol::Array(_) => SymbolKind::ArrayType,
            TypeSymbol::Pointer(_) => SymbolKind::PointerType,
        }
    }

    /// Assembly that must be reachable for this type to be usable.
    ///
    /// For arrays and pointers this is the element's assembly.
    #[must_use]
    pub fn containing_assembly(&self) -> Option<Arc<AssemblySymbol>> {
        match self {
            TypeSymbol::Named(t) => t.containing_assembly(),
            TypeSymbol::Array(a) => a.element_type().containing_assembly(),
            TypeSymbol::Pointer(p) => p.pointed_at_type().containing_assembly(),
        }
    }

    /// `true` if `self` is `other` or derives from it through base types.
    #[must_use]
    pub fn is_or_derives_from(&self, other: &TypeSymbol) -> bool {
        let mut current = Some(self.clone());
        let mut guard = 0;
        while let Some(ty) = current {
            if ty == *other {
                return true;
            }
            guard += 1;
            if guard > 256 {
                return false;
            }
            current = ty.as_named().and_then(|n| n.base_type());
        }
        false
    }

    /// Same type by identity. Constructed types compare structurally.
    #[must_use]
    pub fn ptr_eq(&self, other: &TypeSymbol) -> bool {
        self == other
    }
}

impl PartialEq for TypeSymbol {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (TypeSymbol::Named(a), TypeSymbol::Named(b)) => {
                Arc::ptr_eq(a, b) || NamedTypeSymbol::same_construction(a, b)
            }
            (TypeSymbol::Array(a), TypeSymbol::Array(b)) => {
                Arc::ptr_eq(a, b) || (a.rank() == b.rank() && a.element_type() == b.element_type())
            }
            (TypeSymbol::Pointer(a), TypeSymbol::Pointer(b)) => {
                Arc::ptr_eq(a, b) || a.pointed_at_type() == b.pointed_at_type()
            }
            _ => false,
        }
    }
}

impl fmt::Debug for TypeSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl fmt::Display for TypeSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Any symbol.
#[derive(Clone)]
pub enum Symbol {
    /// An assembly.
    Assembly(Arc<AssemblySymbol>),
    /// A namespace.
    Namespace(Arc<NamespaceSymbol>),
    /// A type.
    Type(TypeSymbol),
    /// A method.
    Method(Arc<MethodSymbol>),
    /// A field.
    Field(Arc<FieldSymbol>),
    /// A parameter.
    Parameter(Arc<ParameterSymbol>),
    /// A local.
    Local(Arc<LocalSymbol>),
}

impl Symbol {
    /// Kind of this symbol.
    #[must_use]
    pub fn kind(&self) -> SymbolKind {
        match self {
            Symbol::Assembly(_) => SymbolKind::Assembly,
            Symbol::Namespace(_) => SymbolKind::Namespace,
            Symbol::Type(t) => t.symbol_kind(),
            Symbol::Method(_) => SymbolKind::Method,
            Symbol::Field(_) => SymbolKind::Field,
            Symbol::Parameter(_) => SymbolKind::Parameter,
            Symbol::Local(_) => SymbolKind::Local,
        }
    }

    /// Simple name.
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Symbol::Assembly(a) => a.identity().name().to_string(),
            Symbol::Namespace(n) => n.name().to_string(),
            Symbol::Type(TypeSymbol::Named(t)) => t.name().to_string(),
            Symbol::Type(t) => t.display_name(),
            Symbol::Method(m) => m.name().to_string(),
            Symbol::Field(f) => f.name().to_string(),
            Symbol::Parameter(p) => p.name().to_string(),
            Symbol::Local(l) => l.name().to_string(),
        }
    }

    /// Assembly containing the symbol, if any.
    #[must_use]
    pub fn containing_assembly(&self) -> Option<Arc<AssemblySymbol>> {
        match self {
            Symbol::Assembly(a) => Some(Arc::clone(a)),
            Symbol::Namespace(n) => n.containing_assembly(),
            Symbol::Type(t) => t.containing_assembly(),
            Symbol::Method(m) => m.containing_type().and_then(|t| t.containing_assembly()),
            Symbol::Field(f) => f.containing_type().and_then(|t| t.containing_assembly()),
            Symbol::Parameter(_) | Symbol::Local(_) => None,
        }
    }

    /// Declared accessibility.
    #[must_use]
    pub fn declared_accessibility(&self) -> Accessibility {
        match self {
            Symbol::Type(TypeSymbol::Named(t)) => t.declared_accessibility(),
            Symbol::Method(m) => m.declared_accessibility(),
            Symbol::Field(f) => f.declared_accessibility(),
            _ => Accessibility::NotApplicable,
        }
    }

    /// Declaration sites.
    #[must_use]
    pub fn declaring_syntax(&self) -> Vec<SyntaxReference> {
        match self {
            Symbol::Type(TypeSymbol::Named(t)) => t.declaring_syntax().to_vec(),
            Symbol::Method(m) => m.declaring_syntax().into_iter().cloned().collect(),
            Symbol::Field(f) => f.declaring_syntax().into_iter().cloned().collect(),
            Symbol::Local(l) => l.declaring_syntax().into_iter().cloned().collect(),
            _ => Vec::new(),
        }
    }

    /// The named type, if this symbol is one.
    #[must_use]
    pub fn as_named_type(&self) -> Option<&Arc<NamedTypeSymbol>> {
        match self {
            Symbol::Type(TypeSymbol::Named(t)) => Some(t),
            _ => None,
        }
    }

    /// The method, if this symbol is one.
    #[must_use]
    pub fn as_method(&self) -> Option<&Arc<MethodSymbol>> {
        match self {
            Symbol::Method(m) => Some(m),
            _ => None,
        }
    }

    /// Display string used in diagnostics and keys.
    #[must_use]
    pub fn display_name(&self) -> String {
        match self {
            Symbol::Type(t) => t.display_name(),
            Symbol::Method(m) => m.signature_key(),
            Symbol::Field(f) => f.qualified_name(),
            _ => self.name(),
        }
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Symbol::Assembly(a), Symbol::Assembly(b)) => Arc::ptr_eq(a, b),
            (Symbol::Namespace(a), Symbol::Namespace(b)) => Arc::ptr_eq(a, b),
            (Symbol::Type(a), Symbol::Type(b)) => a == b,
            (Symbol::Method(a), Symbol::Method(b)) => Arc::ptr_eq(a, b),
            (Symbol::Field(a), Symbol::Field(b)) => Arc::ptr_eq(a, b),
            (Symbol::Parameter(a), Symbol::Parameter(b)) => Arc::ptr_eq(a, b),
            (Symbol::Local(a), Symbol::Local(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self.kind(), self.display_name())
    }
}

impl From<TypeSymbol> for Symbol {
    fn from(value: TypeSymbol) -> Self {
        Symbol::Type(value)
    }
}

impl From<Arc<NamedTypeSymbol>> for Symbol {
    fn from(value: Arc<NamedTypeSymbol>) -> Self {
        Symbol::Type(TypeSymbol::Named(value))
    }
}

impl From<Arc<NamedTypeSymbol>> for TypeSymbol {
    fn from(value: Arc<NamedTypeSymbol>) -> Self {
        TypeSymbol::Named(value)
    }
}
