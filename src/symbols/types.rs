//! Named, array and pointer type symbols.

use std::sync::{Arc, OnceLock, Weak};

use crate::{
    symbols::{
        Accessibility, AssemblySymbol, FieldSymbol, MethodSymbol, Symbol, SyntaxReference,
        TypeSymbol,
    },
    Error, Result,
};

/// Kind of a named type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    /// A class.
    Class,
    /// A value type.
    Struct,
    /// An interface.
    Interface,
    /// An enumeration.
    Enum,
    /// A delegate.
    Delegate,
    /// The class generated for a script submission.
    Submission,
    /// A type that could not be resolved.
    Error,
}

/// Types the compiler itself needs to know about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecialType {
    /// Not a special type.
    None,
    /// `System.Object`
    Object,
    /// `System.ValueType`
    ValueType,
    /// `System.Void`
    Void,
    /// `System.Boolean`
    Boolean,
    /// `System.Int32`
    Int32,
    /// `System.String`
    String,
    /// `System.Exception`
    Exception,
}

impl SpecialType {
    /// Full metadata name, `None` for [`SpecialType::None`].
    #[must_use]
    pub fn metadata_name(self) -> Option<&'static str> {
        match self {
            SpecialType::None => None,
            SpecialType::Object => Some("System.Object"),
            SpecialType::ValueType => Some("System.ValueType"),
            SpecialType::Void => Some("System.Void"),
            SpecialType::Boolean => Some("System.Boolean"),
            SpecialType::Int32 => Some("System.Int32"),
            SpecialType::String => Some("System.String"),
            SpecialType::Exception => Some("System.Exception"),
        }
    }

    /// Classifies a full metadata name.
    #[must_use]
    pub fn from_metadata_name(name: &str) -> Self {
        match name {
            "System.Object" => SpecialType::Object,
            "System.ValueType" => SpecialType::ValueType,
            "System.Void" => SpecialType::Void,
            "System.Boolean" => SpecialType::Boolean,
            "System.Int32" => SpecialType::Int32,
            "System.String" => SpecialType::String,
            "System.Exception" => SpecialType::Exception,
            _ => SpecialType::None,
        }
    }
}

/// Builds a [`NamedTypeSymbol`].
#[derive(Debug, Clone)]
pub struct NamedTypeBuilder {
    namespace: String,
    name: String,
    arity: usize,
    kind: TypeKind,
    accessibility: Accessibility,
    is_sealed: bool,
    is_abstract: bool,
    is_static: bool,
    syntax: Vec<SyntaxReference>,
    documentation: Option<String>,
}

impl NamedTypeBuilder {
    /// Starts a public class named `namespace.name`.
    #[must_use]
    pub fn new(namespace: &str, name: &str) -> Self {
        NamedTypeBuilder {
            namespace: namespace.to_string(),
            name: name.to_string(),
            arity: 0,
            kind: TypeKind::Class,
            accessibility: Accessibility::Public,
            is_sealed: false,
            is_abstract: false,
            is_static: false,
            syntax: Vec::new(),
            documentation: None,
        }
    }

    /// Sets the type kind.
    #[must_use]
    pub fn kind(mut self, kind: TypeKind) -> Self {
        self.kind = kind;
        self
    }

    /// Sets the declared accessibility.
    #[must_use]
    pub fn accessibility(mut self, accessibility: Accessibility) -> Self {
        self.accessibility = accessibility;
        self
    }

    /// Sets the number of generic parameters.
    #[must_use]
    pub fn arity(mut self, arity: usize) -> Self {
        self.arity = arity;
        self
    }

    /// Marks the type sealed.
    #[must_use]
    pub fn sealed(mut self, value: bool) -> Self {
        self.is_sealed = value;
        self
    }

    /// Marks the type abstract.
    #[must_use]
    pub fn abstract_type(mut self, value: bool) -> Self {
        self.is_abstract = value;
        self
    }

    /// Marks the type static.
    #[must_use]
    pub fn static_type(mut self, value: bool) -> Self {
        self.is_static = value;
        self
    }

    /// Adds a declaration site.
    #[must_use]
    pub fn syntax(mut self, reference: SyntaxReference) -> Self {
        self.syntax.push(reference);
        self
    }

    /// Attaches the documentation comment XML.
    #[must_use]
    pub fn documentation(mut self, xml: Option<String>) -> Self {
        self.documentation = xml;
        self
    }

    /// Creates the symbol inside `assembly`.
    #[must_use]
    pub fn build(self, assembly: Weak<AssemblySymbol>) -> Arc<NamedTypeSymbol> {
        let special_type = if self.arity == 0 {
            SpecialType::from_metadata_name(&qualified(&self.namespace, &self.name))
        } else {
            SpecialType::None
        };
        Arc::new(NamedTypeSymbol {
            namespace: self.namespace,
            name: self.name,
            arity: self.arity,
            kind: self.kind,
            accessibility: self.accessibility,
            is_sealed: self.is_sealed,
            is_abstract: self.is_abstract,
            is_static: self.is_static,
            special_type,
            containing_assembly: assembly,
            base_type: OnceLock::new(),
            members: OnceLock::new(),
            type_arguments: Vec::new(),
            original: None,
            tuple_element_names: None,
            syntax: self.syntax,
            documentation: self.documentation,
        })
    }
}

fn qualified(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{namespace}.{name}")
    }
}

/// A class, struct, interface, delegate, enum, error or anonymous type.
///
/// Definitions are created with [`NamedTypeBuilder`]; their base type and members are
/// attached once afterwards, when every type they can refer to exists. Constructed
/// generic types point back to their definition through
/// [`NamedTypeSymbol::original_definition`].
pub struct NamedTypeSymbol {
    namespace: String,
    name: String,
    arity: usize,
    kind: TypeKind,
    accessibility: Accessibility,
    is_sealed: bool,
    is_abstract: bool,
    is_static: bool,
    special_type: SpecialType,
    containing_assembly: Weak<AssemblySymbol>,
    base_type: OnceLock<Option<TypeSymbol>>,
    members: OnceLock<Vec<Symbol>>,
    type_arguments: Vec<TypeSymbol>,
    original: Option<Arc<NamedTypeSymbol>>,
    tuple_element_names: Option<Vec<Option<String>>>,
    syntax: Vec<SyntaxReference>,
    documentation: Option<String>,
}

impl NamedTypeSymbol {
    /// Creates an error type for a name that could not be resolved.
    ///
    /// # Arguments
    ///
    /// * `namespace` - Namespace the name was looked up in
    /// * `name` - Simple name
    /// * `arity` - Number of type arguments the reference carried
    #[must_use]
    pub fn error(namespace: &str, name: &str, arity: usize) -> Arc<Self> {
        NamedTypeBuilder::new(namespace, name)
            .kind(TypeKind::Error)
            .arity(arity)
            .build(Weak::new())
    }

    /// Constructs `definition` with `type_arguments`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Argument`] if the argument count does not match the arity or
    /// `definition` is itself constructed.
    pub fn construct(
        definition: &Arc<NamedTypeSymbol>,
        type_arguments: Vec<TypeSymbol>,
    ) -> Result<Arc<Self>> {
        Self::construct_with_names(definition, type_arguments, None)
    }

    pub(crate) fn construct_with_names(
        definition: &Arc<NamedTypeSymbol>,
        type_arguments: Vec<TypeSymbol>,
        tuple_element_names: Option<Vec<Option<String>>>,
    ) -> Result<Arc<Self>> {
        if definition.original.is_some() {
            return Err(argument_error!(
                "definition",
                "'{}' is already constructed",
                definition.display_name()
            ));
        }
        if type_arguments.len() != definition.arity {
            return Err(argument_error!(
                "type_arguments",
                "'{}' expects {} type arguments, got {}",
                definition.full_name(),
                definition.arity,
                type_arguments.len()
            ));
        }
        Ok(Arc::new(NamedTypeSymbol {
            namespace: definition.namespace.clone(),
            name: definition.name.clone(),
            arity: definition.arity,
            kind: definition.kind,
            accessibility: definition.accessibility,
            is_sealed: definition.is_sealed,
            is_abstract: definition.is_abstract,
            is_static: definition.is_static,
            special_type: SpecialType::None,
            containing_assembly: definition.containing_assembly.clone(),
            base_type: OnceLock::new(),
            members: OnceLock::new(),
            type_arguments,
            original: Some(Arc::clone(definition)),
            tuple_element_names,
            syntax: Vec::new(),
            documentation: None,
        }))
    }

    pub(crate) fn same_construction(a: &NamedTypeSymbol, b: &NamedTypeSymbol) -> bool {
        match (&a.original, &b.original) {
            (Some(oa), Some(ob)) => {
                Arc::ptr_eq(oa, ob)
                    && a.type_arguments.len() == b.type_arguments.len()
                    && a.type_arguments
                        .iter()
                        .zip(&b.type_arguments)
                        .all(|(x, y)| x == y)
            }
            _ => false,
        }
    }

    /// Simple name without arity suffix.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Containing namespace, empty for the global namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Number of generic parameters.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Name as stored in metadata, e.g. ``ValueTuple`2``.
    #[must_use]
    pub fn metadata_name(&self) -> String {
        if self.arity > 0 {
            format!("{}`{}", self.name, self.arity)
        } else {
            self.name.clone()
        }
    }

    /// Namespace-qualified metadata name, the key of `get_type_by_metadata_name`.
    #[must_use]
    pub fn full_metadata_name(&self) -> String {
        qualified(&self.namespace, &self.metadata_name())
    }

    /// Namespace-qualified name without arity.
    #[must_use]
    pub fn full_name(&self) -> String {
        qualified(&self.namespace, &self.name)
    }

    /// Display name including type arguments and tuple element names.
    #[must_use]
    pub fn display_name(&self) -> String {
        if let Some(names) = &self.tuple_element_names {
            let elements: Vec<String> = self
                .type_arguments
                .iter()
                .zip(names)
                .map(|(ty, name)| match name {
                    Some(name) => format!("{} {}", ty.display_name(), name),
                    None => ty.display_name(),
                })
                .collect();
            return format!("({})", elements.join(", "));
        }
        if self.type_arguments.is_empty() {
            return self.full_name();
        }
        let arguments: Vec<String> = self.type_arguments.iter().map(TypeSymbol::display_name).collect();
        format!("{}<{}>", self.full_name(), arguments.join(", "))
    }

    /// Kind of type.
    #[must_use]
    pub fn type_kind(&self) -> TypeKind {
        self.kind
    }

    /// Declared accessibility.
    #[must_use]
    pub fn declared_accessibility(&self) -> Accessibility {
        self.accessibility
    }

    /// `true` if the type cannot be derived from.
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.is_sealed
    }

    /// `true` if the type is abstract.
    #[must_use]
    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    /// `true` if the type is static.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.is_static
    }

    /// Special type classification.
    #[must_use]
    pub fn special_type(&self) -> SpecialType {
        match &self.original {
            Some(_) => SpecialType::None,
            None => self.special_type,
        }
    }

    /// `true` for error types.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.kind == TypeKind::Error
    }

    /// `true` for classes, interfaces, delegates and submission classes.
    #[must_use]
    pub fn is_reference_type(&self) -> bool {
        matches!(
            self.kind,
            TypeKind::Class | TypeKind::Interface | TypeKind::Delegate | TypeKind::Submission
        )
    }

    /// `true` for anonymous type templates.
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.name.starts_with("<>f__AnonymousType")
    }

    /// `true` for constructed `System.ValueTuple` types carrying element names.
    #[must_use]
    pub fn is_tuple(&self) -> bool {
        self.tuple_element_names.is_some()
    }

    /// Element names of a tuple type.
    #[must_use]
    pub fn tuple_element_names(&self) -> Option<&[Option<String>]> {
        self.tuple_element_names.as_deref()
    }

    /// Containing assembly; `None` for error types and once the assembly is dropped.
    #[must_use]
    pub fn containing_assembly(&self) -> Option<Arc<AssemblySymbol>> {
        self.containing_assembly.upgrade()
    }

    /// `true` if the type belongs to `assembly`.
    #[must_use]
    pub fn is_in_assembly(&self, assembly: &Arc<AssemblySymbol>) -> bool {
        std::ptr::eq(self.containing_assembly.as_ptr(), Arc::as_ptr(assembly))
    }

    /// Base type, `None` for `System.Object`, interfaces and unresolved types.
    #[must_use]
    pub fn base_type(&self) -> Option<TypeSymbol> {
        match &self.original {
            Some(original) => original.base_type(),
            None => self.base_type.get().cloned().flatten(),
        }
    }

    /// Attaches the base type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] if the base type was already set.
    pub fn set_base_type(&self, base_type: Option<TypeSymbol>) -> Result<()> {
        self.base_type.set(base_type).map_err(|_| {
            Error::InvalidOperation(format!("base type of '{}' is already set", self.full_name()))
        })
    }

    /// Members in declaration order.
    #[must_use]
    pub fn members(&self) -> &[Symbol] {
        match &self.original {
            Some(original) => original.members(),
            None => self.members.get().map_or(&[], Vec::as_slice),
        }
    }

    /// Attaches the members.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] if members were already set.
    pub fn set_members(&self, members: Vec<Symbol>) -> Result<()> {
        self.members.set(members).map_err(|_| {
            Error::InvalidOperation(format!("members of '{}' are already set", self.full_name()))
        })
    }

    /// Members named `name`.
    pub fn get_members<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Symbol> + 'a {
        self.members().iter().filter(move |m| m.name() == name)
    }

    /// Methods in declaration order.
    pub fn methods(&self) -> impl Iterator<Item = &Arc<MethodSymbol>> {
        self.members().iter().filter_map(|m| match m {
            Symbol::Method(method) => Some(method),
            _ => None,
        })
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = &Arc<FieldSymbol>> {
        self.members().iter().filter_map(|m| match m {
            Symbol::Field(field) => Some(field),
            _ => None,
        })
    }

    /// Type arguments of a constructed type.
    #[must_use]
    pub fn type_arguments(&self) -> &[TypeSymbol] {
        &self.type_arguments
    }

    /// Definition a constructed type was built from.
    #[must_use]
    pub fn original_definition(&self) -> Option<&Arc<NamedTypeSymbol>> {
        self.original.as_ref()
    }

    /// Declaration sites.
    #[must_use]
    pub fn declaring_syntax(&self) -> &[SyntaxReference] {
        &self.syntax
    }

    /// Documentation comment XML.
    #[must_use]
    pub fn documentation(&self) -> Option<&str> {
        self.documentation.as_deref()
    }
}

impl std::fmt::Debug for NamedTypeSymbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamedTypeSymbol")
            .field("name", &self.display_name())
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// A single- or multi-dimensional array type.
#[derive(Debug)]
pub struct ArrayTypeSymbol {
    element_type: TypeSymbol,
    rank: usize,
}

impl ArrayTypeSymbol {
    /// Creates an array type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Argument`] if `rank` is 0.
    pub fn new(element_type: TypeSymbol, rank: usize) -> Result<Arc<Self>> {
        if rank == 0 {
            return Err(argument_error!("rank", "array rank must be at least 1"));
        }
        Ok(Arc::new(ArrayTypeSymbol { element_type, rank }))
    }

    /// Element type.
    #[must_use]
    pub fn element_type(&self) -> &TypeSymbol {
        &self.element_type
    }

    /// Number of dimensions.
    #[must_use]
    pub fn rank(&self) -> usize {
        self.rank
    }
}

/// An unmanaged pointer type.
#[derive(Debug)]
pub struct PointerTypeSymbol {
    pointed_at: TypeSymbol,
}

impl PointerTypeSymbol {
    /// Creates a pointer to `pointed_at`.
    #[must_use]
    pub fn new(pointed_at: TypeSymbol) -> Arc<Self> {
        Arc::new(PointerTypeSymbol { pointed_at })
    }

    /// Type pointed at.
    #[must_use]
    pub fn pointed_at_type(&self) -> &TypeSymbol {
        &self.pointed_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_names() {
        let tuple = NamedTypeBuilder::new("System", "ValueTuple").arity(2).build(Weak::new());
        assert_eq!(tuple.metadata_name(), "ValueTuple`2");
        assert_eq!(tuple.full_metadata_name(), "System.ValueTuple`2");
        assert_eq!(tuple.special_type(), SpecialType::None);

        let object = NamedTypeBuilder::new("System", "Object").build(Weak::new());
        assert_eq!(object.special_type(), SpecialType::Object);
        assert!(object.containing_assembly().is_none());
    }

    #[test]
    fn test_construct_checks_arity() {
        let list = NamedTypeBuilder::new("Gen", "List").arity(1).build(Weak::new());
        let int = TypeSymbol::Named(NamedTypeBuilder::new("System", "Int32").kind(TypeKind::Struct).build(Weak::new()));

        let constructed = NamedTypeSymbol::construct(&list, vec![int.clone()]).unwrap();
        assert_eq!(constructed.display_name(), "Gen.List<System.Int32>");
        assert!(NamedTypeSymbol::construct(&list, Vec::new()).is_err());
        assert!(NamedTypeSymbol::construct(&constructed, vec![int.clone()]).is_err());

        let again = NamedTypeSymbol::construct(&list, vec![int]).unwrap();
        assert_eq!(TypeSymbol::Named(constructed), TypeSymbol::Named(again));
    }

    #[test]
    fn test_base_type_set_once() {
        let object = NamedTypeBuilder::new("System", "Object").build(Weak::new());
        let foo = NamedTypeBuilder::new("", "Foo").build(Weak::new());
        foo.set_base_type(Some(TypeSymbol::Named(object.clone()))).unwrap();
        assert!(foo.set_base_type(None).is_err());
        assert_eq!(foo.base_type(), Some(TypeSymbol::Named(object)));
    }

    #[test]
    fn test_array_rank() {
        let object = TypeSymbol::Named(NamedTypeBuilder::new("System", "Object").build(Weak::new()));
        assert!(ArrayTypeSymbol::new(object.clone(), 0).is_err());
        let array = TypeSymbol::Array(ArrayTypeSymbol::new(object, 2).unwrap());
        assert_eq!(array.display_name(), "System.Object[,]");
        assert!(array.is_reference_type());
    }

    #[test]
    fn test_error_type() {
        let error = NamedTypeSymbol::error("N", "Missing", 1);
        assert!(error.is_error());
        assert_eq!(error.full_metadata_name(), "N.Missing`1");
    }
}
