//! Metadata references and reference binding.
//!
//! A [`MetadataReference`] names an assembly a compilation can use: either a
//! portable-executable image described by [`AssemblyMetadata`], or another
//! [`crate::Compilation`]. References compare by identity, so adding the same reference
//! twice is two entries and removal matches the exact instance.
//!
//! # Key Components
//!
//! - [`MetadataReference`] - A reference with its [`MetadataReferenceProperties`]
//! - [`AssemblyIdentity`] / [`AssemblyVersion`] - Assembly names
//! - [`AssemblyMetadata`] - Image content, built with [`AssemblyMetadataBuilder`]
//! - [`ReferenceManager`] - Binds references into assembly symbols, once per reference set
//!
//! # Usage Examples
//!
//! ```rust
//! use dotcompile::references::{AssemblyMetadata, MetadataReference};
//!
//! let corlib = MetadataReference::from_metadata(AssemblyMetadata::core_library(), Some("mscorlib.dll"));
//! let aliased = corlib.with_aliases(&["core"])?;
//! assert_ne!(corlib, aliased);
//! assert_eq!(aliased.properties().aliases(), ["core"]);
//! # Ok::<(), dotcompile::Error>(())
//! ```

mod identity;
mod manager;
mod metadata;

pub use identity::{public_key_token, AssemblyIdentity, AssemblyVersion};
pub use manager::{BoundReferences, ReferenceManager};
pub use metadata::{
    AssemblyMetadata, AssemblyMetadataBuilder, FieldDefinition, MethodDefinition, TypeDefinition,
};

use std::{fmt, sync::Arc};

use crate::{Compilation, Result};

/// Whether a reference is an assembly or a bare module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MetadataImageKind {
    /// An assembly with a manifest.
    #[default]
    Assembly,
    /// A module without a manifest.
    Module,
}

impl MetadataImageKind {
    /// Name used in keys.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            MetadataImageKind::Assembly => "Assembly",
            MetadataImageKind::Module => "Module",
        }
    }
}

/// How a reference is imported.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct MetadataReferenceProperties {
    kind: MetadataImageKind,
    aliases: Vec<String>,
    embed_interop_types: bool,
}

impl MetadataReferenceProperties {
    /// Creates properties.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Argument`] if aliases or interop embedding are requested
    /// for a module, or an alias is empty.
    pub fn new(
        kind: MetadataImageKind,
        aliases: &[&str],
        embed_interop_types: bool,
    ) -> Result<Self> {
        if kind == MetadataImageKind::Module && (!aliases.is_empty() || embed_interop_types) {
            return Err(argument_error!(
                "kind",
                "modules cannot have aliases or embed interop types"
            ));
        }
        if let Some(bad) = aliases.iter().find(|a| a.trim().is_empty()) {
            return Err(argument_error!("aliases", "invalid alias '{}'", bad));
        }
        Ok(MetadataReferenceProperties {
            kind,
            aliases: aliases.iter().map(|a| (*a).to_string()).collect(),
            embed_interop_types,
        })
    }

    /// Properties of a plain module reference.
    #[must_use]
    pub fn module() -> Self {
        MetadataReferenceProperties {
            kind: MetadataImageKind::Module,
            ..Self::default()
        }
    }

    /// Image kind.
    #[must_use]
    pub fn kind(&self) -> MetadataImageKind {
        self.kind
    }

    /// Extern aliases.
    #[must_use]
    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    /// Whether interop types are embedded.
    #[must_use]
    pub fn embed_interop_types(&self) -> bool {
        self.embed_interop_types
    }
}

/// What a reference points at.
#[derive(Clone)]
pub enum MetadataReferenceKind {
    /// A portable-executable image.
    PortableExecutable {
        /// Image content
        metadata: AssemblyMetadata,
        /// Path the image was read from
        file_path: Option<String>,
    },
    /// Another compilation.
    Compilation(Compilation),
}

struct MetadataReferenceData {
    kind: MetadataReferenceKind,
    properties: MetadataReferenceProperties,
}

/// A reference to an assembly, compared by identity.
#[derive(Clone)]
pub struct MetadataReference {
    data: Arc<MetadataReferenceData>,
}

impl MetadataReference {
    /// Reference to an image.
    #[must_use]
    pub fn from_metadata(metadata: AssemblyMetadata, file_path: Option<&str>) -> Self {
        MetadataReference {
            data: Arc::new(MetadataReferenceData {
                kind: MetadataReferenceKind::PortableExecutable {
                    metadata,
                    file_path: file_path.map(str::to_string),
                },
                properties: MetadataReferenceProperties::default(),
            }),
        }
    }

    /// Reference to another compilation.
    #[must_use]
    pub fn from_compilation(compilation: &Compilation) -> Self {
        MetadataReference {
            data: Arc::new(MetadataReferenceData {
                kind: MetadataReferenceKind::Compilation(compilation.clone()),
                properties: MetadataReferenceProperties::default(),
            }),
        }
    }

    /// A new reference to the same target with different properties.
    #[must_use]
    pub fn with_properties(&self, properties: MetadataReferenceProperties) -> Self {
        MetadataReference {
            data: Arc::new(MetadataReferenceData {
                kind: self.data.kind.clone(),
                properties,
            }),
        }
    }

    /// A new reference with different aliases.
    ///
    /// # Errors
    ///
    /// See [`MetadataReferenceProperties::new`].
    pub fn with_aliases(&self, aliases: &[&str]) -> Result<Self> {
        let properties = MetadataReferenceProperties::new(
            self.data.properties.kind,
            aliases,
            self.data.properties.embed_interop_types,
        )?;
        Ok(self.with_properties(properties))
    }

    /// A new reference with a different interop embedding setting.
    ///
    /// # Errors
    ///
    /// See [`MetadataReferenceProperties::new`].
    pub fn with_embed_interop_types(&self, embed: bool) -> Result<Self> {
        let aliases: Vec<&str> = self.data.properties.aliases.iter().map(String::as_str).collect();
        let properties =
            MetadataReferenceProperties::new(self.data.properties.kind, &aliases, embed)?;
        Ok(self.with_properties(properties))
    }

    /// Target of the reference.
    #[must_use]
    pub fn kind(&self) -> &MetadataReferenceKind {
        &self.data.kind
    }

    /// Import properties.
    #[must_use]
    pub fn properties(&self) -> &MetadataReferenceProperties {
        &self.data.properties
    }

    /// Image content for portable-executable references.
    #[must_use]
    pub fn metadata(&self) -> Option<&AssemblyMetadata> {
        match &self.data.kind {
            MetadataReferenceKind::PortableExecutable { metadata, .. } => Some(metadata),
            MetadataReferenceKind::Compilation(_) => None,
        }
    }

    /// Referenced compilation.
    #[must_use]
    pub fn compilation(&self) -> Option<&Compilation> {
        match &self.data.kind {
            MetadataReferenceKind::Compilation(c) => Some(c),
            MetadataReferenceKind::PortableExecutable { .. } => None,
        }
    }

    /// File path of a portable-executable reference.
    #[must_use]
    pub fn file_path(&self) -> Option<&str> {
        match &self.data.kind {
            MetadataReferenceKind::PortableExecutable { file_path, .. } => file_path.as_deref(),
            MetadataReferenceKind::Compilation(_) => None,
        }
    }

    /// Identity of the referenced assembly.
    #[must_use]
    pub fn identity(&self) -> AssemblyIdentity {
        match &self.data.kind {
            MetadataReferenceKind::PortableExecutable { metadata, .. } => metadata.identity().clone(),
            MetadataReferenceKind::Compilation(c) => c.assembly_identity(),
        }
    }

    /// Human-readable description: the path, or the assembly name.
    #[must_use]
    pub fn display(&self) -> String {
        match &self.data.kind {
            MetadataReferenceKind::PortableExecutable { file_path: Some(path), .. } => path.clone(),
            _ => self.identity().name().to_string(),
        }
    }

    /// Stable address, usable as a map key while the reference is alive.
    #[must_use]
    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.data) as *const () as usize
    }
}

impl PartialEq for MetadataReference {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

impl Eq for MetadataReference {}

impl std::hash::Hash for MetadataReference {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Debug for MetadataReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.data.kind {
            MetadataReferenceKind::PortableExecutable { .. } => "PortableExecutable",
            MetadataReferenceKind::Compilation(_) => "Compilation",
        };
        f.debug_struct("MetadataReference")
            .field("kind", &kind)
            .field("display", &self.display())
            .field("properties", &self.data.properties)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_properties_validation() {
        assert!(MetadataReferenceProperties::new(MetadataImageKind::Module, &["a"], false).is_err());
        assert!(MetadataReferenceProperties::new(MetadataImageKind::Module, &[], true).is_err());
        assert!(MetadataReferenceProperties::new(MetadataImageKind::Assembly, &[" "], false).is_err());
        let props = MetadataReferenceProperties::new(MetadataImageKind::Assembly, &["x"], true).unwrap();
        assert!(props.embed_interop_types());
    }

    #[test]
    fn test_identity_equality() {
        let metadata = AssemblyMetadata::core_library();
        let a = MetadataReference::from_metadata(metadata.clone(), None);
        let b = MetadataReference::from_metadata(metadata, None);
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert_eq!(a.display(), "mscorlib");
    }

    #[test]
    fn test_with_properties_keeps_target() {
        let reference = MetadataReference::from_metadata(AssemblyMetadata::core_library(), Some("c.dll"));
        let embedded = reference.with_embed_interop_types(true).unwrap();
        assert!(embedded.properties().embed_interop_types());
        assert!(AssemblyMetadata::ptr_eq(
            reference.metadata().unwrap(),
            embedded.metadata().unwrap()
        ));
        assert_eq!(embedded.file_path(), Some("c.dll"));
    }
}
