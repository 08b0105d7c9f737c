//! Assembly metadata images.
//!
//! [`AssemblyMetadata`] is the content behind a portable-executable reference: the
//! assembly identity, its module version id, the types it defines with their members,
//! and the assemblies it references. Images are built programmatically with
//! [`AssemblyMetadataBuilder`]; member and base types are written as full metadata
//! names and resolved when a compilation binds its references.

use std::sync::Arc;

use sha1::{Digest, Sha1};
use uguid::Guid;

use crate::{
    references::{AssemblyIdentity, AssemblyVersion},
    symbols::{Accessibility, TypeKind},
};

/// A method defined in an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDefinition {
    /// Name, `.ctor` for constructors
    pub name: String,
    /// Declared accessibility
    pub accessibility: Accessibility,
    /// Static method
    pub is_static: bool,
    /// Virtual method
    pub is_virtual: bool,
    /// Full metadata name of the return type
    pub return_type: String,
    /// Parameter names and full metadata type names
    pub parameters: Vec<(String, String)>,
}

impl MethodDefinition {
    /// A public instance method.
    #[must_use]
    pub fn new(name: &str, return_type: &str) -> Self {
        MethodDefinition {
            name: name.to_string(),
            accessibility: Accessibility::Public,
            is_static: false,
            is_virtual: false,
            return_type: return_type.to_string(),
            parameters: Vec::new(),
        }
    }

    /// A public parameterless constructor.
    #[must_use]
    pub fn constructor() -> Self {
        Self::new(".ctor", "System.Void")
    }

    /// Marks the method static.
    #[must_use]
    pub fn with_static(mut self) -> Self {
        self.is_static = true;
        self
    }

    /// Marks the method virtual.
    #[must_use]
    pub fn with_virtual(mut self) -> Self {
        self.is_virtual = true;
        self
    }

    /// Sets the accessibility.
    #[must_use]
    pub fn with_accessibility(mut self, accessibility: Accessibility) -> Self {
        self.accessibility = accessibility;
        self
    }

    /// Appends a parameter.
    #[must_use]
    pub fn with_parameter(mut self, name: &str, type_name: &str) -> Self {
        self.parameters.push((name.to_string(), type_name.to_string()));
        self
    }
}

/// A field defined in an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDefinition {
    /// Name
    pub name: String,
    /// Full metadata name of the field type
    pub field_type: String,
    /// Declared accessibility
    pub accessibility: Accessibility,
    /// Static field
    pub is_static: bool,
}

/// A type defined in an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDefinition {
    /// Namespace, empty for the global namespace
    pub namespace: String,
    /// Simple name without arity suffix
    pub name: String,
    /// Number of generic parameters
    pub arity: usize,
    /// Type kind
    pub kind: TypeKind,
    /// Declared accessibility
    pub accessibility: Accessibility,
    /// Sealed type
    pub is_sealed: bool,
    /// Abstract type
    pub is_abstract: bool,
    /// Full metadata name of the base type
    pub base_type: Option<String>,
    /// Methods
    pub methods: Vec<MethodDefinition>,
    /// Fields
    pub fields: Vec<FieldDefinition>,
}

impl TypeDefinition {
    /// A public class deriving from `System.Object`.
    #[must_use]
    pub fn class(namespace: &str, name: &str) -> Self {
        TypeDefinition {
            namespace: namespace.to_string(),
            name: name.to_string(),
            arity: 0,
            kind: TypeKind::Class,
            accessibility: Accessibility::Public,
            is_sealed: false,
            is_abstract: false,
            base_type: Some("System.Object".to_string()),
            methods: Vec::new(),
            fields: Vec::new(),
        }
    }

    /// A public struct deriving from `System.ValueType`.
    #[must_use]
    pub fn structure(namespace: &str, name: &str) -> Self {
        TypeDefinition {
            kind: TypeKind::Struct,
            is_sealed: true,
            base_type: Some("System.ValueType".to_string()),
            ..Self::class(namespace, name)
        }
    }

    /// Sets the base type.
    #[must_use]
    pub fn with_base_type(mut self, base_type: Option<&str>) -> Self {
        self.base_type = base_type.map(str::to_string);
        self
    }

    /// Sets the generic arity.
    #[must_use]
    pub fn with_arity(mut self, arity: usize) -> Self {
        self.arity = arity;
        self
    }

    /// Sets the accessibility.
    #[must_use]
    pub fn with_accessibility(mut self, accessibility: Accessibility) -> Self {
        self.accessibility = accessibility;
        self
    }

    /// Marks the type sealed and abstract (a static class).
    #[must_use]
    pub fn with_static(mut self) -> Self {
        self.is_sealed = true;
        self.is_abstract = true;
        self
    }

    /// Marks the type abstract.
    #[must_use]
    pub fn with_abstract(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    /// Appends a method.
    #[must_use]
    pub fn with_method(mut self, method: MethodDefinition) -> Self {
        self.methods.push(method);
        self
    }

    /// Appends a field.
    #[must_use]
    pub fn with_field(mut self, name: &str, field_type: &str, is_static: bool) -> Self {
        self.fields.push(FieldDefinition {
            name: name.to_string(),
            field_type: field_type.to_string(),
            accessibility: Accessibility::Public,
            is_static,
        });
        self
    }

    /// Namespace-qualified metadata name.
    #[must_use]
    pub fn full_metadata_name(&self) -> String {
        let name = if self.arity > 0 {
            format!("{}`{}", self.name, self.arity)
        } else {
            self.name.clone()
        };
        if self.namespace.is_empty() {
            name
        } else {
            format!("{}.{}", self.namespace, name)
        }
    }
}

#[derive(Debug)]
struct AssemblyMetadataData {
    identity: AssemblyIdentity,
    mvid: Guid,
    module_name: String,
    types: Vec<TypeDefinition>,
    references: Vec<AssemblyIdentity>,
    internals_visible_to: Vec<String>,
}

/// Immutable metadata of one assembly image, cheap to clone.
#[derive(Debug, Clone)]
pub struct AssemblyMetadata {
    data: Arc<AssemblyMetadataData>,
}

impl AssemblyMetadata {
    /// Starts building metadata for `identity`.
    #[must_use]
    pub fn builder(identity: AssemblyIdentity) -> AssemblyMetadataBuilder {
        AssemblyMetadataBuilder {
            identity,
            mvid: None,
            types: Vec::new(),
            references: Vec::new(),
            internals_visible_to: Vec::new(),
        }
    }

    /// A minimal core library: `System.Object`, the primitive types used by the
    /// compiler, `System.String`, `System.Exception`, `System.Console` and the
    /// `System.ValueTuple` family up to arity 7.
    #[must_use]
    pub fn core_library() -> Self {
        let identity = AssemblyIdentity::new("mscorlib")
            .with_version(AssemblyVersion::new(4, 0, 0, 0))
            .with_public_key_token(Some([0xb7, 0x7a, 0x5c, 0x56, 0x19, 0x34, 0xe0, 0x89]));

        let mut builder = Self::builder(identity)
            .add_type(
                TypeDefinition::class("System", "Object")
                    .with_base_type(None)
                    .with_method(MethodDefinition::constructor())
                    .with_method(MethodDefinition::new("ToString", "System.String").with_virtual())
                    .with_method(
                        MethodDefinition::new("Equals", "System.Boolean")
                            .with_virtual()
                            .with_parameter("obj", "System.Object"),
                    )
                    .with_method(MethodDefinition::new("GetHashCode", "System.Int32").with_virtual()),
            )
            .add_type(TypeDefinition::class("System", "ValueType").with_abstract())
            .add_type(TypeDefinition::structure("System", "Void"))
            .add_type(TypeDefinition::structure("System", "Boolean"))
            .add_type(TypeDefinition::structure("System", "Int32"))
            .add_type(
                TypeDefinition::class("System", "String")
                    .with_method(
                        MethodDefinition::new("Concat", "System.String")
                            .with_static()
                            .with_parameter("str0", "System.String")
                            .with_parameter("str1", "System.String"),
                    )
                    .with_field("Empty", "System.String", true),
            )
            .add_type(
                TypeDefinition::class("System", "Exception")
                    .with_method(MethodDefinition::constructor())
                    .with_method(
                        MethodDefinition::constructor().with_parameter("message", "System.String"),
                    ),
            )
            .add_type(
                TypeDefinition::class("System", "Console")
                    .with_static()
                    .with_method(
                        MethodDefinition::new("WriteLine", "System.Void")
                            .with_static()
                            .with_parameter("value", "System.String"),
                    )
                    .with_method(
                        MethodDefinition::new("WriteLine", "System.Void")
                            .with_static()
                            .with_parameter("value", "System.Int32"),
                    ),
            );
        for arity in 1..=7 {
            builder = builder.add_type(TypeDefinition::structure("System", "ValueTuple").with_arity(arity));
        }
        builder.build()
    }

    /// Assembly identity.
    #[must_use]
    pub fn identity(&self) -> &AssemblyIdentity {
        &self.data.identity
    }

    /// Module version id.
    #[must_use]
    pub fn mvid(&self) -> Guid {
        self.data.mvid
    }

    /// Manifest module file name.
    #[must_use]
    pub fn module_name(&self) -> &str {
        &self.data.module_name
    }

    /// Defined types.
    #[must_use]
    pub fn types(&self) -> &[TypeDefinition] {
        &self.data.types
    }

    /// Referenced assemblies.
    #[must_use]
    pub fn references(&self) -> &[AssemblyIdentity] {
        &self.data.references
    }

    /// Simple names of assemblies granted internal access.
    #[must_use]
    pub fn internals_visible_to(&self) -> &[String] {
        &self.data.internals_visible_to
    }

    /// `true` if `a` and `b` share the same image.
    #[must_use]
    pub fn ptr_eq(a: &AssemblyMetadata, b: &AssemblyMetadata) -> bool {
        Arc::ptr_eq(&a.data, &b.data)
    }
}

/// Builder for [`AssemblyMetadata`].
#[derive(Debug)]
pub struct AssemblyMetadataBuilder {
    identity: AssemblyIdentity,
    mvid: Option<Guid>,
    types: Vec<TypeDefinition>,
    references: Vec<AssemblyIdentity>,
    internals_visible_to: Vec<String>,
}

impl AssemblyMetadataBuilder {
    /// Sets an explicit module version id. Without one, the id is derived from the content.
    #[must_use]
    pub fn mvid(mut self, mvid: Guid) -> Self {
        self.mvid = Some(mvid);
        self
    }

    /// Adds a type definition.
    #[must_use]
    pub fn add_type(mut self, definition: TypeDefinition) -> Self {
        self.types.push(definition);
        self
    }

    /// Adds a referenced assembly.
    #[must_use]
    pub fn add_reference(mut self, identity: AssemblyIdentity) -> Self {
        self.references.push(identity);
        self
    }

    /// Grants internal access to the assembly named `name`.
    #[must_use]
    pub fn internals_visible_to(mut self, name: &str) -> Self {
        self.internals_visible_to.push(name.to_string());
        self
    }

    /// Finishes the image.
    #[must_use]
    pub fn build(self) -> AssemblyMetadata {
        let mvid = self.mvid.unwrap_or_else(|| content_mvid(&self.identity, &self.types));
        let module_name = format!("{}.dll", self.identity.name());
        AssemblyMetadata {
            data: Arc::new(AssemblyMetadataData {
                identity: self.identity,
                mvid,
                module_name,
                types: self.types,
                references: self.references,
                internals_visible_to: self.internals_visible_to,
            }),
        }
    }
}

fn content_mvid(identity: &AssemblyIdentity, types: &[TypeDefinition]) -> Guid {
    let mut hasher = Sha1::new();
    hasher.update(identity.display_name().as_bytes());
    for ty in types {
        hasher.update(ty.full_metadata_name().as_bytes());
        hasher.update([0u8]);
        for method in &ty.methods {
            hasher.update(method.name.as_bytes());
            for (_, param) in &method.parameters {
                hasher.update(param.as_bytes());
            }
        }
        for field in &ty.fields {
            hasher.update(field.name.as_bytes());
        }
    }
    let digest = hasher.finalize();
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    // Version 5 (name based), RFC 4122 variant.
    bytes[7] = (bytes[7] & 0x0F) | 0x50;
    bytes[8] = (bytes[8] & 0x3F) | 0x80;
    Guid::from_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_library_contents() {
        let corlib = AssemblyMetadata::core_library();
        let names: Vec<_> = corlib.types().iter().map(TypeDefinition::full_metadata_name).collect();
        assert!(names.contains(&"System.Object".to_string()));
        assert!(names.contains(&"System.ValueTuple`7".to_string()));
        assert_eq!(corlib.identity().name(), "mscorlib");
    }

    #[test]
    fn test_content_mvid_is_stable() {
        let a = AssemblyMetadata::core_library();
        let b = AssemblyMetadata::core_library();
        assert_eq!(a.mvid(), b.mvid());
        assert!(!AssemblyMetadata::ptr_eq(&a, &b));

        let other = AssemblyMetadata::builder(AssemblyIdentity::new("Other")).build();
        assert_ne!(a.mvid(), other.mvid());
    }

    #[test]
    fn test_explicit_mvid() {
        let mvid = uguid::guid!("01234567-89ab-cdef-0123-456789abcdef");
        let metadata = AssemblyMetadata::builder(AssemblyIdentity::new("X")).mvid(mvid).build();
        assert_eq!(metadata.mvid(), mvid);
    }
}
