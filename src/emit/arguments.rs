//! Inputs of a single emit call.

use std::{fmt, sync::Arc};

use crate::{
    emit::{InputStream, OutputStream},
    options::{DebugInformationFormat, EmitOptions, OutputKind},
    symbols::MethodSymbol,
    syntax::{SourceHashAlgorithm, SourceText},
    utils::CancellationToken,
    Result,
};

type DataProvider = Arc<dyn Fn() -> std::io::Result<Vec<u8>> + Send + Sync>;

/// Where a manifest resource lives.
#[derive(Clone)]
pub enum ResourceData {
    /// Embedded in the image; the provider is called once during emit.
    Embedded(DataProvider),
    /// Stored next to the image in a separate file.
    Linked {
        /// File name recorded in the File table
        file_name: String,
        /// Content, hashed into the File table
        provider: DataProvider,
    },
}

/// A manifest resource.
#[derive(Clone)]
pub struct ResourceDescription {
    name: String,
    is_public: bool,
    data: ResourceData,
}

impl ResourceDescription {
    /// An embedded resource whose bytes come from `provider`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Argument`](crate::Error::Argument) if `name` is empty.
    pub fn embedded(
        name: &str,
        is_public: bool,
        provider: impl Fn() -> std::io::Result<Vec<u8>> + Send + Sync + 'static,
    ) -> Result<Self> {
        if name.is_empty() {
            return Err(argument_error!("name", "resource name cannot be empty"));
        }
        Ok(ResourceDescription {
            name: name.to_string(),
            is_public,
            data: ResourceData::Embedded(Arc::new(provider)),
        })
    }

    /// An embedded resource with fixed content.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Argument`](crate::Error::Argument) if `name` is empty.
    pub fn from_bytes(name: &str, is_public: bool, bytes: Vec<u8>) -> Result<Self> {
        Self::embedded(name, is_public, move || Ok(bytes.clone()))
    }

    /// A resource linked from `file_name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Argument`](crate::Error::Argument) if `name` or `file_name` is empty, or `file_name`
    /// contains a directory separator.
    pub fn linked(
        name: &str,
        file_name: &str,
        is_public: bool,
        provider: impl Fn() -> std::io::Result<Vec<u8>> + Send + Sync + 'static,
    ) -> Result<Self> {
        if name.is_empty() {
            return Err(argument_error!("name", "resource name cannot be empty"));
        }
        if file_name.is_empty() || file_name.contains(['/', '\\']) {
            return Err(argument_error!(
                "file_name",
                "'{}' is not a valid file name",
                file_name
            ));
        }
        Ok(ResourceDescription {
            name: name.to_string(),
            is_public,
            data: ResourceData::Linked {
                file_name: file_name.to_string(),
                provider: Arc::new(provider),
            },
        })
    }

    /// Resource name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `true` if visible outside the assembly.
    #[must_use]
    pub fn is_public(&self) -> bool {
        self.is_public
    }

    /// `true` for embedded resources.
    #[must_use]
    pub fn is_embedded(&self) -> bool {
        matches!(self.data, ResourceData::Embedded(_))
    }

    /// Linked file name.
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        match &self.data {
            ResourceData::Embedded(_) => None,
            ResourceData::Linked { file_name, .. } => Some(file_name),
        }
    }

    /// Reads the content.
    ///
    /// # Errors
    ///
    /// Returns whatever the provider returns.
    pub fn read(&self) -> std::io::Result<Vec<u8>> {
        match &self.data {
            ResourceData::Embedded(provider) | ResourceData::Linked { provider, .. } => provider(),
        }
    }
}

impl fmt::Debug for ResourceDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceDescription")
            .field("name", &self.name)
            .field("is_public", &self.is_public)
            .field("file_name", &self.file_name())
            .finish()
    }
}

/// Source text embedded in the PDB.
#[derive(Debug, Clone)]
pub struct EmbeddedText {
    path: String,
    text: SourceText,
}

impl EmbeddedText {
    /// Embeds `text` under `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Argument`](crate::Error::Argument) if `path` is empty.
    pub fn new(path: &str, text: SourceText) -> Result<Self> {
        if path.is_empty() {
            return Err(argument_error!("path", "embedded text path cannot be empty"));
        }
        Ok(EmbeddedText {
            path: path.to_string(),
            text,
        })
    }

    /// Document path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Checksum algorithm of the document.
    #[must_use]
    pub fn checksum_algorithm(&self) -> SourceHashAlgorithm {
        self.text.checksum_algorithm()
    }

    /// Checksum of the document.
    #[must_use]
    pub fn checksum(&self) -> &[u8] {
        self.text.checksum()
    }

    /// Blob stored in the PDB: a zero length prefix (uncompressed) followed by UTF-8 text.
    #[must_use]
    pub fn blob(&self) -> Vec<u8> {
        let mut blob = Vec::with_capacity(4 + self.text.len());
        blob.extend_from_slice(&0u32.to_le_bytes());
        blob.extend_from_slice(self.text.as_str().as_bytes());
        blob
    }
}

/// Everything an emit call consumes.
///
/// Built around the primary PE stream; every other input is optional.
///
/// ```rust
/// use dotcompile::emit::{EmitArguments, MemoryStream};
/// use dotcompile::options::EmitOptions;
///
/// let mut pe = MemoryStream::new();
/// let mut pdb = MemoryStream::new();
/// let arguments = EmitArguments::new(&mut pe)
///     .with_pdb(&mut pdb)
///     .with_options(EmitOptions::default());
/// # drop(arguments);
/// ```
pub struct EmitArguments<'a> {
    pub(crate) pe: &'a mut dyn OutputStream,
    pub(crate) metadata_pe: Option<&'a mut dyn OutputStream>,
    pub(crate) pdb: Option<&'a mut dyn OutputStream>,
    pub(crate) xml_documentation: Option<&'a mut dyn OutputStream>,
    pub(crate) win32_resources: Option<&'a mut dyn InputStream>,
    pub(crate) source_link: Option<&'a mut dyn InputStream>,
    pub(crate) manifest_resources: Vec<ResourceDescription>,
    pub(crate) embedded_texts: Vec<EmbeddedText>,
    pub(crate) options: Option<EmitOptions>,
    pub(crate) debug_entry_point: Option<Arc<MethodSymbol>>,
    pub(crate) cancel: CancellationToken,
}

impl<'a> EmitArguments<'a> {
    /// Arguments writing the image to `pe`.
    pub fn new(pe: &'a mut dyn OutputStream) -> Self {
        EmitArguments {
            pe,
            metadata_pe: None,
            pdb: None,
            xml_documentation: None,
            win32_resources: None,
            source_link: None,
            manifest_resources: Vec::new(),
            embedded_texts: Vec::new(),
            options: None,
            debug_entry_point: None,
            cancel: CancellationToken::none(),
        }
    }

    /// Also writes a metadata-only reference assembly to `stream`.
    #[must_use]
    pub fn with_metadata_pe(mut self, stream: &'a mut dyn OutputStream) -> Self {
        self.metadata_pe = Some(stream);
        self
    }

    /// Writes a separate PDB to `stream`.
    #[must_use]
    pub fn with_pdb(mut self, stream: &'a mut dyn OutputStream) -> Self {
        self.pdb = Some(stream);
        self
    }

    /// Writes XML documentation to `stream`.
    #[must_use]
    pub fn with_xml_documentation(mut self, stream: &'a mut dyn OutputStream) -> Self {
        self.xml_documentation = Some(stream);
        self
    }

    /// Reads Win32 resources (RES or COFF) from `stream`.
    #[must_use]
    pub fn with_win32_resources(mut self, stream: &'a mut dyn InputStream) -> Self {
        self.win32_resources = Some(stream);
        self
    }

    /// Reads source link JSON from `stream` into the PDB.
    #[must_use]
    pub fn with_source_link(mut self, stream: &'a mut dyn InputStream) -> Self {
        self.source_link = Some(stream);
        self
    }

    /// Manifest resources.
    #[must_use]
    pub fn with_manifest_resources(
        mut self,
        resources: impl IntoIterator<Item = ResourceDescription>,
    ) -> Self {
        self.manifest_resources = resources.into_iter().collect();
        self
    }

    /// Source texts embedded in the PDB.
    #[must_use]
    pub fn with_embedded_texts(mut self, texts: impl IntoIterator<Item = EmbeddedText>) -> Self {
        self.embedded_texts = texts.into_iter().collect();
        self
    }

    /// Emit options. Without them, defaults apply with private members included
    /// unless a reference assembly is requested.
    #[must_use]
    pub fn with_options(mut self, options: EmitOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// Method recorded as the PDB entry point.
    #[must_use]
    pub fn with_debug_entry_point(mut self, method: Arc<MethodSymbol>) -> Self {
        self.debug_entry_point = Some(method);
        self
    }

    /// Token checked between stages.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Checks each stream against its role and the options against the streams,
    /// returning the effective options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Argument`](crate::Error::Argument) naming the offending input.
    pub(crate) fn validate(&self, output_kind: OutputKind) -> Result<EmitOptions> {
        if !self.pe.can_write() {
            return Err(argument_error!("pe_stream", "stream must support write"));
        }

        let explicit = self.options.as_ref();
        let format = explicit.map(EmitOptions::debug_information_format);
        let metadata_only = explicit.is_some_and(EmitOptions::emit_metadata_only);

        if let Some(pdb) = &self.pdb {
            if format == Some(DebugInformationFormat::Embedded) {
                return Err(argument_error!(
                    "pdb_stream",
                    "PDB stream must be absent when debug information is embedded"
                ));
            }
            if !pdb.can_write() {
                return Err(argument_error!("pdb_stream", "stream must support write"));
            }
            if metadata_only {
                return Err(argument_error!(
                    "pdb_stream",
                    "PDB stream must be absent when emitting metadata only"
                ));
            }
        }

        if let Some(metadata_pe) = &self.metadata_pe {
            if metadata_only {
                return Err(argument_error!(
                    "metadata_pe_stream",
                    "metadata PE stream must be absent when emitting metadata only"
                ));
            }
            if explicit.is_some_and(EmitOptions::include_private_members) {
                return Err(argument_error!(
                    "metadata_pe_stream",
                    "including private members is not allowed when emitting a reference assembly"
                ));
            }
            if !metadata_pe.can_write() {
                return Err(argument_error!(
                    "metadata_pe_stream",
                    "stream must support write"
                ));
            }
        }

        let mut options = match explicit {
            Some(options) => options.clone(),
            None => EmitOptions::default().with_include_private_members(self.metadata_pe.is_none()),
        };
        if self.metadata_pe.is_none() && !options.emit_metadata_only() {
            options = options.with_include_private_members(true);
        }

        if options.debug_information_format() == DebugInformationFormat::Embedded
            && options.emit_metadata_only()
        {
            return Err(argument_error!(
                "metadata_pe_stream",
                "embedding a PDB is not allowed when emitting metadata only"
            ));
        }

        if output_kind == OutputKind::NetModule {
            if self.metadata_pe.is_some() {
                return Err(argument_error!(
                    "metadata_pe_stream",
                    "a reference assembly cannot be emitted for a module"
                ));
            }
            if options.emit_metadata_only() {
                return Err(argument_error!(
                    "emit_metadata_only",
                    "a reference assembly cannot be emitted for a module"
                ));
            }
        }

        if let Some(win32) = &self.win32_resources {
            if !win32.can_read() || !win32.can_seek() {
                return Err(argument_error!(
                    "win32_resources",
                    "stream must support read and seek"
                ));
            }
        }

        if let Some(source_link) = &self.source_link {
            if !source_link.can_read() {
                return Err(argument_error!("source_link", "stream must support read"));
            }
        }

        if !self.embedded_texts.is_empty()
            && self.pdb.is_none()
            && options.debug_information_format() != DebugInformationFormat::Embedded
        {
            return Err(argument_error!(
                "embedded_texts",
                "embedded texts are only supported when emitting a PDB"
            ));
        }

        Ok(options)
    }
}

impl fmt::Debug for EmitArguments<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmitArguments")
            .field("metadata_pe", &self.metadata_pe.is_some())
            .field("pdb", &self.pdb.is_some())
            .field("xml_documentation", &self.xml_documentation.is_some())
            .field("win32_resources", &self.win32_resources.is_some())
            .field("source_link", &self.source_link.is_some())
            .field("manifest_resources", &self.manifest_resources)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{emit::MemoryStream, Error};

    fn param_of(result: Result<EmitOptions>) -> &'static str {
        match result {
            Err(Error::Argument { param, .. }) => param,
            other => panic!("expected an argument error, got {other:?}"),
        }
    }

    #[test]
    fn test_private_members_forced_without_reference_assembly() {
        let mut pe = MemoryStream::new();
        let arguments = EmitArguments::new(&mut pe)
            .with_options(EmitOptions::default().with_include_private_members(false));
        let options = arguments.validate(OutputKind::ConsoleApplication).unwrap();
        assert!(options.include_private_members());
    }

    #[test]
    fn test_default_options_with_reference_assembly() {
        let mut pe = MemoryStream::new();
        let mut reference = MemoryStream::new();
        let arguments = EmitArguments::new(&mut pe).with_metadata_pe(&mut reference);
        let options = arguments
            .validate(OutputKind::DynamicallyLinkedLibrary)
            .unwrap();
        assert!(!options.include_private_members());

        let mut pe = MemoryStream::new();
        let mut reference = MemoryStream::new();
        let arguments = EmitArguments::new(&mut pe)
            .with_metadata_pe(&mut reference)
            .with_options(EmitOptions::default());
        assert_eq!(
            param_of(arguments.validate(OutputKind::DynamicallyLinkedLibrary)),
            "metadata_pe_stream"
        );
    }

    #[test]
    fn test_stream_roles() {
        let mut pe = MemoryStream::read_only(Vec::new());
        let arguments = EmitArguments::new(&mut pe);
        assert_eq!(param_of(arguments.validate(OutputKind::ConsoleApplication)), "pe_stream");

        let mut pe = MemoryStream::new();
        let mut pdb = MemoryStream::new();
        let arguments = EmitArguments::new(&mut pe).with_pdb(&mut pdb).with_options(
            EmitOptions::default().with_debug_information_format(DebugInformationFormat::Embedded),
        );
        assert_eq!(param_of(arguments.validate(OutputKind::ConsoleApplication)), "pdb_stream");

        let mut pe = MemoryStream::new();
        let mut win32 = MemoryStream::with_capabilities(Vec::new(), true, false, false);
        let arguments = EmitArguments::new(&mut pe).with_win32_resources(&mut win32);
        assert_eq!(
            param_of(arguments.validate(OutputKind::ConsoleApplication)),
            "win32_resources"
        );
    }

    #[test]
    fn test_module_cannot_have_reference_assembly() {
        let mut pe = MemoryStream::new();
        let arguments = EmitArguments::new(&mut pe).with_options(EmitOptions::metadata_only());
        assert_eq!(
            param_of(arguments.validate(OutputKind::NetModule)),
            "emit_metadata_only"
        );
    }

    #[test]
    fn test_embedded_texts_require_pdb() {
        let text = EmbeddedText::new("a.mini", SourceText::new("class A {}")).unwrap();
        let mut pe = MemoryStream::new();
        let arguments = EmitArguments::new(&mut pe).with_embedded_texts([text.clone()]);
        assert_eq!(
            param_of(arguments.validate(OutputKind::DynamicallyLinkedLibrary)),
            "embedded_texts"
        );

        let mut pe = MemoryStream::new();
        let arguments = EmitArguments::new(&mut pe)
            .with_embedded_texts([text])
            .with_options(
                EmitOptions::default()
                    .with_debug_information_format(DebugInformationFormat::Embedded),
            );
        assert!(arguments.validate(OutputKind::DynamicallyLinkedLibrary).is_ok());
    }

    #[test]
    fn test_resource_descriptions() {
        assert!(ResourceDescription::from_bytes("", true, Vec::new()).is_err());
        assert!(ResourceDescription::linked("r", "dir/r.bin", true, || Ok(Vec::new())).is_err());
        let linked = ResourceDescription::linked("r", "r.bin", false, || Ok(vec![1])).unwrap();
        assert_eq!(linked.file_name(), Some("r.bin"));
        assert!(!linked.is_embedded());
        assert_eq!(linked.read().unwrap(), vec![1]);
    }
}
