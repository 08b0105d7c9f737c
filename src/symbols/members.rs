//! Method, field, parameter and local symbols.

use std::sync::{Arc, Weak};

use crate::symbols::{Accessibility, NamedTypeSymbol, SyntaxReference, TypeSymbol};

/// Kind of method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodKind {
    /// A regular method.
    Ordinary,
    /// An instance constructor (`.ctor`).
    Constructor,
    /// A type initializer (`.cctor`).
    StaticConstructor,
    /// The synthesized entry point of a script.
    ScriptEntryPoint,
}

/// A method or constructor.
#[derive(Debug)]
pub struct MethodSymbol {
    name: String,
    kind: MethodKind,
    containing_type: Weak<NamedTypeSymbol>,
    accessibility: Accessibility,
    is_static: bool,
    is_virtual: bool,
    is_abstract: bool,
    return_type: TypeSymbol,
    parameters: Vec<Arc<ParameterSymbol>>,
    syntax: Option<SyntaxReference>,
    documentation: Option<String>,
}

impl MethodSymbol {
    /// Starts a public instance method of `containing_type`.
    #[must_use]
    pub fn new(containing_type: &Arc<NamedTypeSymbol>, name: &str, return_type: TypeSymbol) -> Self {
        MethodSymbol {
            name: name.to_string(),
            kind: match name {
                ".ctor" => MethodKind::Constructor,
                ".cctor" => MethodKind::StaticConstructor,
                _ => MethodKind::Ordinary,
            },
            containing_type: Arc::downgrade(containing_type),
            accessibility: Accessibility::Public,
            is_static: name == ".cctor",
            is_virtual: false,
            is_abstract: false,
            return_type,
            parameters: Vec::new(),
            syntax: None,
            documentation: None,
        }
    }

    /// Sets the method kind.
    #[must_use]
    pub fn with_kind(mut self, kind: MethodKind) -> Self {
        self.kind = kind;
        self
    }

    /// Sets the declared accessibility.
    #[must_use]
    pub fn with_accessibility(mut self, accessibility: Accessibility) -> Self {
        self.accessibility = accessibility;
        self
    }

    /// Marks the method static.
    #[must_use]
    pub fn with_static(mut self, value: bool) -> Self {
        self.is_static = value;
        self
    }

    /// Marks the method virtual.
    #[must_use]
    pub fn with_virtual(mut self, value: bool) -> Self {
        self.is_virtual = value;
        self
    }

    /// Marks the method abstract.
    #[must_use]
    pub fn with_abstract(mut self, value: bool) -> Self {
        self.is_abstract = value;
        self
    }

    /// Sets the parameters, numbered in order.
    #[must_use]
    pub fn with_parameters(mut self, parameters: Vec<(String, TypeSymbol)>) -> Self {
        self.parameters = parameters
            .into_iter()
            .enumerate()
            .map(|(ordinal, (name, ty))| Arc::new(ParameterSymbol { name, ty, ordinal }))
            .collect();
        self
    }

    /// Sets the declaration site.
    #[must_use]
    pub fn with_syntax(mut self, syntax: Option<SyntaxReference>) -> Self {
        self.syntax = syntax;
        self
    }

    /// Attaches the documentation comment XML.
    #[must_use]
    pub fn with_documentation(mut self, xml: Option<String>) -> Self {
        self.documentation = xml;
        self
    }

    /// Name; `.ctor` for constructors.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Kind of method.
    #[must_use]
    pub fn method_kind(&self) -> MethodKind {
        self.kind
    }

    /// Containing type, if it is still alive.
    #[must_use]
    pub fn containing_type(&self) -> Option<Arc<NamedTypeSymbol>> {
        self.containing_type.upgrade()
    }

    /// Declared accessibility.
    #[must_use]
    pub fn declared_accessibility(&self) -> Accessibility {
        self.accessibility
    }

    /// `true` for static methods.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.is_static
    }

    /// `true` for virtual methods.
    #[must_use]
    pub fn is_virtual(&self) -> bool {
        self.is_virtual
    }

    /// `true` for abstract methods.
    #[must_use]
    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    /// Return type.
    #[must_use]
    pub fn return_type(&self) -> &TypeSymbol {
        &self.return_type
    }

    /// `true` if the return type is `System.Void`.
    #[must_use]
    pub fn returns_void(&self) -> bool {
        self.return_type.special_type() == crate::symbols::SpecialType::Void
    }

    /// Parameters in order.
    #[must_use]
    pub fn parameters(&self) -> &[Arc<ParameterSymbol>] {
        &self.parameters
    }

    /// Declaration site.
    #[must_use]
    pub fn declaring_syntax(&self) -> Option<&SyntaxReference> {
        self.syntax.as_ref()
    }

    /// Documentation comment XML.
    #[must_use]
    pub fn documentation(&self) -> Option<&str> {
        self.documentation.as_deref()
    }

    /// `Type.Name(ParamType,...)`, unique within an assembly.
    #[must_use]
    pub fn signature_key(&self) -> String {
        let container = self
            .containing_type()
            .map(|t| t.full_metadata_name())
            .unwrap_or_default();
        let parameters: Vec<String> = self.parameters.iter().map(|p| p.ty.display_name()).collect();
        format!("{}.{}({})", container, self.name, parameters.join(","))
    }

    /// Documentation comment id, e.g. `M:N.C.Run(System.Int32)`.
    #[must_use]
    pub fn documentation_id(&self) -> String {
        let container = self
            .containing_type()
            .map(|t| t.full_metadata_name())
            .unwrap_or_default();
        let name = self.name.replace('.', "#");
        if self.parameters.is_empty() {
            format!("M:{container}.{name}")
        } else {
            let parameters: Vec<String> =
                self.parameters.iter().map(|p| p.ty.display_name()).collect();
            format!("M:{container}.{name}({})", parameters.join(","))
        }
    }
}

/// A field.
#[derive(Debug)]
pub struct FieldSymbol {
    name: String,
    containing_type: Weak<NamedTypeSymbol>,
    ty: TypeSymbol,
    accessibility: Accessibility,
    is_static: bool,
    syntax: Option<SyntaxReference>,
    documentation: Option<String>,
}

impl FieldSymbol {
    /// Starts a private instance field of `containing_type`.
    #[must_use]
    pub fn new(containing_type: &Arc<NamedTypeSymbol>, name: &str, ty: TypeSymbol) -> Self {
        FieldSymbol {
            name: name.to_string(),
            containing_type: Arc::downgrade(containing_type),
            ty,
            accessibility: Accessibility::Private,
            is_static: false,
            syntax: None,
            documentation: None,
        }
    }

    /// Sets the declared accessibility.
    #[must_use]
    pub fn with_accessibility(mut self, accessibility: Accessibility) -> Self {
        self.accessibility = accessibility;
        self
    }

    /// Marks the field static.
    #[must_use]
    pub fn with_static(mut self, value: bool) -> Self {
        self.is_static = value;
        self
    }

    /// Sets the declaration site.
    #[must_use]
    pub fn with_syntax(mut self, syntax: Option<SyntaxReference>) -> Self {
        self.syntax = syntax;
        self
    }

    /// Attaches the documentation comment XML.
    #[must_use]
    pub fn with_documentation(mut self, xml: Option<String>) -> Self {
        self.documentation = xml;
        self
    }

    /// Name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Containing type, if it is still alive.
    #[must_use]
    pub fn containing_type(&self) -> Option<Arc<NamedTypeSymbol>> {
        self.containing_type.upgrade()
    }

    /// Field type.
    #[must_use]
    pub fn field_type(&self) -> &TypeSymbol {
        &self.ty
    }

    /// Declared accessibility.
    #[must_use]
    pub fn declared_accessibility(&self) -> Accessibility {
        self.accessibility
    }

    /// `true` for static fields.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.is_static
    }

    /// Declaration site.
    #[must_use]
    pub fn declaring_syntax(&self) -> Option<&SyntaxReference> {
        self.syntax.as_ref()
    }

    /// Documentation comment XML.
    #[must_use]
    pub fn documentation(&self) -> Option<&str> {
        self.documentation.as_deref()
    }

    /// `Namespace.Type.Name`.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        match self.containing_type() {
            Some(t) => format!("{}.{}", t.full_metadata_name(), self.name),
            None => self.name.clone(),
        }
    }
}

/// A method parameter.
#[derive(Debug)]
pub struct ParameterSymbol {
    name: String,
    ty: TypeSymbol,
    ordinal: usize,
}

impl ParameterSymbol {
    /// Name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parameter type.
    #[must_use]
    pub fn parameter_type(&self) -> &TypeSymbol {
        &self.ty
    }

    /// Zero-based position.
    #[must_use]
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }
}

/// A local variable declared in a method body or script.
#[derive(Debug)]
pub struct LocalSymbol {
    name: String,
    ty: TypeSymbol,
    syntax: Option<SyntaxReference>,
}

impl LocalSymbol {
    /// Creates a local.
    #[must_use]
    pub fn new(name: &str, ty: TypeSymbol, syntax: Option<SyntaxReference>) -> Arc<Self> {
        Arc::new(LocalSymbol {
            name: name.to_string(),
            ty,
            syntax,
        })
    }

    /// Name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Local type.
    #[must_use]
    pub fn local_type(&self) -> &TypeSymbol {
        &self.ty
    }

    /// Declaration site.
    #[must_use]
    pub fn declaring_syntax(&self) -> Option<&SyntaxReference> {
        self.syntax.as_ref()
    }
}
