//! Compiler-wide options.

use std::{
    collections::BTreeMap,
    fmt,
    hash::{Hash, Hasher},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, OnceLock,
    },
    time::SystemTime,
};

use crate::{
    diagnostics::{Diagnostic, ErrorCode, ReportDiagnostic},
    options::{
        parse::is_valid_identifier, MetadataImportOptions, NullableContextOptions,
        OptimizationLevel, OutputKind, Platform,
    },
    references::{MetadataReference, MetadataReferenceProperties},
    utils::StableHasher,
};

/// Resolves `#r` style reference directives to metadata references.
pub trait MetadataReferenceResolver: Send + Sync {
    /// Resolves `reference`, relative to `base_file_path` when given.
    ///
    /// Returns an empty vector when the reference cannot be found.
    fn resolve_reference(
        &self,
        reference: &str,
        base_file_path: Option<&str>,
        properties: &MetadataReferenceProperties,
    ) -> Vec<MetadataReference>;
}

/// Resolves and normalizes source file paths.
pub trait SourceReferenceResolver: Send + Sync {
    /// Normalizes `path` for use in debug information.
    fn normalize_path(&self, path: &str, base_file_path: Option<&str>) -> Option<String>;
}

/// Resolves files included from documentation comments.
pub trait XmlReferenceResolver: Send + Sync {
    /// Returns the content of the XML file named by `path`, or `None` if it cannot be read.
    fn read_file(&self, path: &str, base_file_path: Option<&str>) -> Option<String>;
}

/// Signs an emitted image with a strong name.
pub trait StrongNameProvider: Send + Sync {
    /// Signs `image` in place with the key from `key_file` or `key_container`.
    ///
    /// # Errors
    ///
    /// Returns a human-readable failure message, reported as a diagnostic.
    fn sign(
        &self,
        image: &mut Vec<u8>,
        key_file: Option<&str>,
        key_container: Option<&str>,
    ) -> std::result::Result<(), String>;
}

#[derive(Clone)]
struct CompilationOptionsData {
    output_kind: OutputKind,
    module_name: Option<String>,
    main_type_name: Option<String>,
    script_class_name: String,
    crypto_key_container: Option<String>,
    crypto_key_file: Option<String>,
    crypto_public_key: Vec<u8>,
    delay_sign: Option<bool>,
    public_sign: bool,
    check_overflow: bool,
    platform: Platform,
    optimization_level: OptimizationLevel,
    general_diagnostic_option: ReportDiagnostic,
    warning_level: u32,
    specific_diagnostic_options: BTreeMap<String, ReportDiagnostic>,
    report_suppressed_diagnostics: bool,
    concurrent_build: bool,
    deterministic: bool,
    current_local_time: Option<SystemTime>,
    debug_plus_mode: bool,
    metadata_import_options: MetadataImportOptions,
    nullable_context_options: NullableContextOptions,
    allow_unsafe: bool,
    usings: Vec<String>,
    metadata_reference_resolver: Option<Arc<dyn MetadataReferenceResolver>>,
    source_reference_resolver: Option<Arc<dyn SourceReferenceResolver>>,
    xml_reference_resolver: Option<Arc<dyn XmlReferenceResolver>>,
    strong_name_provider: Option<Arc<dyn StrongNameProvider>>,
}

fn same_service<T: ?Sized>(a: &Option<Arc<T>>, b: &Option<Arc<T>>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b)),
        _ => false,
    }
}

impl PartialEq for CompilationOptionsData {
    fn eq(&self, other: &Self) -> bool {
        self.output_kind == other.output_kind
            && self.module_name == other.module_name
            && self.main_type_name == other.main_type_name
            && self.script_class_name == other.script_class_name
            && self.crypto_key_container == other.crypto_key_container
            && self.crypto_key_file == other.crypto_key_file
            && self.crypto_public_key == other.crypto_public_key
            && self.delay_sign == other.delay_sign
            && self.public_sign == other.public_sign
            && self.check_overflow == other.check_overflow
            && self.platform == other.platform
            && self.optimization_level == other.optimization_level
            && self.general_diagnostic_option == other.general_diagnostic_option
            && self.warning_level == other.warning_level
            && self.specific_diagnostic_options == other.specific_diagnostic_options
            && self.report_suppressed_diagnostics == other.report_suppressed_diagnostics
            && self.concurrent_build == other.concurrent_build
            && self.deterministic == other.deterministic
            && self.current_local_time == other.current_local_time
            && self.debug_plus_mode == other.debug_plus_mode
            && self.metadata_import_options == other.metadata_import_options
            && self.nullable_context_options == other.nullable_context_options
            && self.allow_unsafe == other.allow_unsafe
            && self.usings == other.usings
            && same_service(&self.metadata_reference_resolver, &other.metadata_reference_resolver)
            && same_service(&self.source_reference_resolver, &other.source_reference_resolver)
            && same_service(&self.xml_reference_resolver, &other.xml_reference_resolver)
            && same_service(&self.strong_name_provider, &other.strong_name_provider)
    }
}

impl CompilationOptionsData {
    // Service objects are compared by identity and left out of the hash; equal
    // options still hash equally.
    fn hash_fields<H: Hasher>(&self, state: &mut H) {
        self.output_kind.hash(state);
        self.module_name.hash(state);
        self.main_type_name.hash(state);
        self.script_class_name.hash(state);
        self.crypto_key_container.hash(state);
        self.crypto_key_file.hash(state);
        self.crypto_public_key.hash(state);
        self.delay_sign.hash(state);
        self.public_sign.hash(state);
        self.check_overflow.hash(state);
        self.platform.hash(state);
        self.optimization_level.hash(state);
        self.general_diagnostic_option.hash(state);
        self.warning_level.hash(state);
        self.specific_diagnostic_options.hash(state);
        self.report_suppressed_diagnostics.hash(state);
        self.concurrent_build.hash(state);
        self.deterministic.hash(state);
        self.current_local_time.hash(state);
        self.debug_plus_mode.hash(state);
        self.metadata_import_options.hash(state);
        self.nullable_context_options.hash(state);
        self.allow_unsafe.hash(state);
        self.usings.hash(state);
    }
}

/// Compiler-wide options.
///
/// # Examples
///
/// ```rust
/// use dotcompile::options::{CompilationOptions, OutputKind};
///
/// let options = CompilationOptions::new(OutputKind::DynamicallyLinkedLibrary)
///     .with_public_sign(true)
///     .with_crypto_key_container(Some("container"));
///
/// // Mutually exclusive settings are diagnostics, not errors.
/// assert_eq!(options.errors().len(), 2);
/// ```
pub struct CompilationOptions {
    data: CompilationOptionsData,
    hash: AtomicU64,
    errors: OnceLock<Vec<Diagnostic>>,
}

impl Clone for CompilationOptions {
    fn clone(&self) -> Self {
        CompilationOptions {
            data: self.data.clone(),
            hash: AtomicU64::new(self.hash.load(Ordering::Relaxed)),
            errors: self.errors.clone(),
        }
    }
}

impl Default for CompilationOptions {
    fn default() -> Self {
        Self::new(OutputKind::DynamicallyLinkedLibrary)
    }
}

impl fmt::Debug for CompilationOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompilationOptions")
            .field("output_kind", &self.data.output_kind)
            .field("platform", &self.data.platform)
            .field("optimization_level", &self.data.optimization_level)
            .field("deterministic", &self.data.deterministic)
            .field("concurrent_build", &self.data.concurrent_build)
            .finish_non_exhaustive()
    }
}

macro_rules! option_getter {
    ($(#[$doc:meta])* $name:ident: $ty:ty) => {
        $(#[$doc])*
        #[must_use]
        pub fn $name(&self) -> $ty {
            self.data.$name
        }
    };
}

impl CompilationOptions {
    /// Default options for the given output kind.
    #[must_use]
    pub fn new(output_kind: OutputKind) -> Self {
        Self::from_data(CompilationOptionsData {
            output_kind,
            module_name: None,
            main_type_name: None,
            script_class_name: "Script".to_string(),
            crypto_key_container: None,
            crypto_key_file: None,
            crypto_public_key: Vec::new(),
            delay_sign: None,
            public_sign: false,
            check_overflow: false,
            platform: Platform::AnyCpu,
            optimization_level: OptimizationLevel::Debug,
            general_diagnostic_option: ReportDiagnostic::Default,
            warning_level: 4,
            specific_diagnostic_options: BTreeMap::new(),
            report_suppressed_diagnostics: false,
            concurrent_build: true,
            deterministic: false,
            current_local_time: None,
            debug_plus_mode: false,
            metadata_import_options: MetadataImportOptions::Public,
            nullable_context_options: NullableContextOptions::Disable,
            allow_unsafe: false,
            usings: Vec::new(),
            metadata_reference_resolver: None,
            source_reference_resolver: None,
            xml_reference_resolver: None,
            strong_name_provider: None,
        })
    }

    fn from_data(data: CompilationOptionsData) -> Self {
        CompilationOptions {
            data,
            hash: AtomicU64::new(0),
            errors: OnceLock::new(),
        }
    }

    fn with(&self, update: impl FnOnce(&mut CompilationOptionsData)) -> Self {
        let mut data = self.data.clone();
        update(&mut data);
        Self::from_data(data)
    }

    option_getter!(
        /// Kind of binary produced.
        output_kind: OutputKind
    );
    option_getter!(
        /// Whether arithmetic overflow is checked by default.
        check_overflow: bool
    );
    option_getter!(
        /// Target platform.
        platform: Platform
    );
    option_getter!(
        /// Optimization level.
        optimization_level: OptimizationLevel
    );
    option_getter!(
        /// Report option applied to warnings without a specific option.
        general_diagnostic_option: ReportDiagnostic
    );
    option_getter!(
        /// Highest warning level that is reported.
        warning_level: u32
    );
    option_getter!(
        /// Whether suppressed diagnostics are still returned, marked as suppressed.
        report_suppressed_diagnostics: bool
    );
    option_getter!(
        /// Whether method bodies may be compiled in parallel.
        concurrent_build: bool
    );
    option_getter!(
        /// Whether output must be byte-for-byte reproducible.
        deterministic: bool
    );
    option_getter!(
        /// Clock value used for wildcard versions; `None` reads the system clock.
        current_local_time: Option<SystemTime>
    );
    option_getter!(
        /// Emit extra debugging information in debug builds.
        debug_plus_mode: bool
    );
    option_getter!(
        /// Which members of referenced assemblies are imported.
        metadata_import_options: MetadataImportOptions
    );
    option_getter!(
        /// Default nullable context.
        nullable_context_options: NullableContextOptions
    );
    option_getter!(
        /// Whether unsafe code is allowed.
        allow_unsafe: bool
    );
    option_getter!(
        /// Whether the assembly is public-signed.
        public_sign: bool
    );
    option_getter!(
        /// Delay signing, `None` when unspecified.
        delay_sign: Option<bool>
    );

    /// Module name override.
    #[must_use]
    pub fn module_name(&self) -> Option<&str> {
        self.data.module_name.as_deref()
    }

    /// Type containing the entry point.
    #[must_use]
    pub fn main_type_name(&self) -> Option<&str> {
        self.data.main_type_name.as_deref()
    }

    /// Name of the class generated for script code.
    #[must_use]
    pub fn script_class_name(&self) -> &str {
        &self.data.script_class_name
    }

    /// Key container used for signing.
    #[must_use]
    pub fn crypto_key_container(&self) -> Option<&str> {
        self.data.crypto_key_container.as_deref()
    }

    /// Key file used for signing.
    #[must_use]
    pub fn crypto_key_file(&self) -> Option<&str> {
        self.data.crypto_key_file.as_deref()
    }

    /// Public key blob.
    #[must_use]
    pub fn crypto_public_key(&self) -> &[u8] {
        &self.data.crypto_public_key
    }

    /// Per-identifier report options.
    #[must_use]
    pub fn specific_diagnostic_options(&self) -> &BTreeMap<String, ReportDiagnostic> {
        &self.data.specific_diagnostic_options
    }

    /// Namespaces imported into every tree.
    #[must_use]
    pub fn usings(&self) -> &[String] {
        &self.data.usings
    }

    /// Resolver for reference directives.
    #[must_use]
    pub fn metadata_reference_resolver(&self) -> Option<&Arc<dyn MetadataReferenceResolver>> {
        self.data.metadata_reference_resolver.as_ref()
    }

    /// Resolver for source paths.
    #[must_use]
    pub fn source_reference_resolver(&self) -> Option<&Arc<dyn SourceReferenceResolver>> {
        self.data.source_reference_resolver.as_ref()
    }

    /// Resolver for documentation includes.
    #[must_use]
    pub fn xml_reference_resolver(&self) -> Option<&Arc<dyn XmlReferenceResolver>> {
        self.data.xml_reference_resolver.as_ref()
    }

    /// Strong-name signing implementation.
    #[must_use]
    pub fn strong_name_provider(&self) -> Option<&Arc<dyn StrongNameProvider>> {
        self.data.strong_name_provider.as_ref()
    }

    /// `true` when any signing input is configured.
    #[must_use]
    pub fn has_signing_options(&self) -> bool {
        self.data.crypto_key_container.is_some()
            || self.data.crypto_key_file.is_some()
            || !self.data.crypto_public_key.is_empty()
            || self.data.delay_sign.is_some()
            || self.data.public_sign
    }

    /// `true` when the output is strong-name signed or public-signed.
    #[must_use]
    pub fn is_signed(&self) -> bool {
        self.data.public_sign
            || self.data.crypto_key_file.is_some()
            || self.data.crypto_key_container.is_some()
    }

    /// Returns options with a different output kind.
    #[must_use]
    pub fn with_output_kind(&self, kind: OutputKind) -> Self {
        self.with(|d| d.output_kind = kind)
    }

    /// Returns options with a different module name.
    #[must_use]
    pub fn with_module_name(&self, name: Option<&str>) -> Self {
        self.with(|d| d.module_name = name.map(str::to_string))
    }

    /// Returns options with a different main type.
    #[must_use]
    pub fn with_main_type_name(&self, name: Option<&str>) -> Self {
        self.with(|d| d.main_type_name = name.map(str::to_string))
    }

    /// Returns options with a different script class name.
    #[must_use]
    pub fn with_script_class_name(&self, name: &str) -> Self {
        self.with(|d| d.script_class_name = name.to_string())
    }

    /// Returns options with a different key container.
    #[must_use]
    pub fn with_crypto_key_container(&self, container: Option<&str>) -> Self {
        self.with(|d| d.crypto_key_container = container.map(str::to_string))
    }

    /// Returns options with a different key file.
    #[must_use]
    pub fn with_crypto_key_file(&self, file: Option<&str>) -> Self {
        self.with(|d| d.crypto_key_file = file.map(str::to_string))
    }

    /// Returns options with a different public key.
    #[must_use]
    pub fn with_crypto_public_key(&self, key: &[u8]) -> Self {
        self.with(|d| d.crypto_public_key = key.to_vec())
    }

    /// Returns options with a different delay-sign setting.
    #[must_use]
    pub fn with_delay_sign(&self, delay_sign: Option<bool>) -> Self {
        self.with(|d| d.delay_sign = delay_sign)
    }

    /// Returns options with a different public-sign setting.
    #[must_use]
    pub fn with_public_sign(&self, public_sign: bool) -> Self {
        self.with(|d| d.public_sign = public_sign)
    }

    /// Returns options with a different overflow-check default.
    #[must_use]
    pub fn with_check_overflow(&self, check: bool) -> Self {
        self.with(|d| d.check_overflow = check)
    }

    /// Returns options with a different platform.
    #[must_use]
    pub fn with_platform(&self, platform: Platform) -> Self {
        self.with(|d| d.platform = platform)
    }

    /// Returns options with a different optimization level.
    #[must_use]
    pub fn with_optimization_level(&self, level: OptimizationLevel) -> Self {
        self.with(|d| d.optimization_level = level)
    }

    /// Returns options with a different general diagnostic option.
    #[must_use]
    pub fn with_general_diagnostic_option(&self, report: ReportDiagnostic) -> Self {
        self.with(|d| d.general_diagnostic_option = report)
    }

    /// Returns options with a different warning level.
    #[must_use]
    pub fn with_warning_level(&self, level: u32) -> Self {
        self.with(|d| d.warning_level = level)
    }

    /// Returns options with different per-identifier report options.
    #[must_use]
    pub fn with_specific_diagnostic_options(
        &self,
        options: BTreeMap<String, ReportDiagnostic>,
    ) -> Self {
        self.with(|d| d.specific_diagnostic_options = options)
    }

    /// Returns options with a different report-suppressed setting.
    #[must_use]
    pub fn with_report_suppressed_diagnostics(&self, report: bool) -> Self {
        self.with(|d| d.report_suppressed_diagnostics = report)
    }

    /// Returns options with a different concurrent-build setting.
    #[must_use]
    pub fn with_concurrent_build(&self, concurrent: bool) -> Self {
        self.with(|d| d.concurrent_build = concurrent)
    }

    /// Returns options with a different determinism setting.
    #[must_use]
    pub fn with_deterministic(&self, deterministic: bool) -> Self {
        self.with(|d| d.deterministic = deterministic)
    }

    /// Returns options with a fixed clock value.
    #[must_use]
    pub fn with_current_local_time(&self, time: Option<SystemTime>) -> Self {
        self.with(|d| d.current_local_time = time)
    }

    /// Returns options with a different debug-plus setting.
    #[must_use]
    pub fn with_debug_plus_mode(&self, debug_plus: bool) -> Self {
        self.with(|d| d.debug_plus_mode = debug_plus)
    }

    /// Returns options with different metadata import options.
    #[must_use]
    pub fn with_metadata_import_options(&self, import: MetadataImportOptions) -> Self {
        self.with(|d| d.metadata_import_options = import)
    }

    /// Returns options with a different nullable context.
    #[must_use]
    pub fn with_nullable_context_options(&self, nullable: NullableContextOptions) -> Self {
        self.with(|d| d.nullable_context_options = nullable)
    }

    /// Returns options with a different unsafe setting.
    #[must_use]
    pub fn with_allow_unsafe(&self, allow: bool) -> Self {
        self.with(|d| d.allow_unsafe = allow)
    }

    /// Returns options with different global usings.
    #[must_use]
    pub fn with_usings<S: Into<String>>(&self, usings: impl IntoIterator<Item = S>) -> Self {
        let usings = usings.into_iter().map(Into::into).collect();
        self.with(|d| d.usings = usings)
    }

    /// Returns options with a different reference-directive resolver.
    #[must_use]
    pub fn with_metadata_reference_resolver(
        &self,
        resolver: Option<Arc<dyn MetadataReferenceResolver>>,
    ) -> Self {
        self.with(|d| d.metadata_reference_resolver = resolver)
    }

    /// Returns options with a different source resolver.
    #[must_use]
    pub fn with_source_reference_resolver(
        &self,
        resolver: Option<Arc<dyn SourceReferenceResolver>>,
    ) -> Self {
        self.with(|d| d.source_reference_resolver = resolver)
    }

    /// Returns options with a different XML resolver.
    #[must_use]
    pub fn with_xml_reference_resolver(
        &self,
        resolver: Option<Arc<dyn XmlReferenceResolver>>,
    ) -> Self {
        self.with(|d| d.xml_reference_resolver = resolver)
    }

    /// Returns options with a different strong-name provider.
    #[must_use]
    pub fn with_strong_name_provider(&self, provider: Option<Arc<dyn StrongNameProvider>>) -> Self {
        self.with(|d| d.strong_name_provider = provider)
    }

    /// Option errors, computed once.
    pub fn errors(&self) -> &[Diagnostic] {
        self.errors.get_or_init(|| {
            let mut diagnostics = Vec::new();
            self.validate(&mut diagnostics);
            diagnostics
        })
    }

    /// Appends diagnostics for invalid or mutually exclusive settings.
    pub fn validate(&self, diagnostics: &mut Vec<Diagnostic>) {
        let d = &self.data;

        if d.public_sign {
            if d.delay_sign == Some(true) {
                diagnostics.push(ErrorCode::PublicSignWithDelaySign.at_none(&[]));
            }
            if d.crypto_key_container.is_some() {
                diagnostics.push(ErrorCode::PublicSignWithKeyContainer.at_none(&[]));
            }
            if d.crypto_key_file.is_none() && d.crypto_public_key.is_empty() {
                diagnostics.push(ErrorCode::PublicSignNoKey.at_none(&[]));
            }
        }

        if d.platform == Platform::AnyCpu32BitPreferred && !d.output_kind.is_application() {
            diagnostics.push(ErrorCode::BadPrefer32OnLibrary.at_none(&[]));
        }

        if d.main_type_name.is_some() && !d.output_kind.is_application() {
            diagnostics.push(ErrorCode::NoMainOnLibrary.at_none(&[]));
        }

        if let Some(name) = &d.module_name {
            if !is_valid_file_name(name) {
                diagnostics.push(ErrorCode::BadModuleName.at_none(&[name]));
            }
        }

        if !is_valid_identifier(&d.script_class_name) {
            diagnostics.push(ErrorCode::BadScriptClassName.at_none(&[&d.script_class_name]));
        }
    }

    /// Hash of every field except service objects, computed once per instance.
    #[must_use]
    pub fn stable_hash(&self) -> u64 {
        let cached = self.hash.load(Ordering::Relaxed);
        if cached != 0 {
            return cached;
        }
        let mut hasher = StableHasher::new();
        self.data.hash_fields(&mut hasher);
        let computed = match hasher.finish() {
            0 => 1,
            h => h,
        };
        self.hash.store(computed, Ordering::Relaxed);
        computed
    }
}

pub(crate) fn is_valid_file_name(name: &str) -> bool {
    !name.is_empty()
        && name.trim() == name
        && !name
            .chars()
            .any(|c| c.is_control() || matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|'))
}

impl PartialEq for CompilationOptions {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
            || (self.stable_hash() == other.stable_hash() && self.data == other.data)
    }
}

impl Eq for CompilationOptions {}

impl Hash for CompilationOptions {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.stable_hash());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_returns_new_options() {
        let options = CompilationOptions::new(OutputKind::ConsoleApplication);
        let derived = options.with_platform(Platform::X86);
        assert_eq!(options.platform(), Platform::AnyCpu);
        assert_eq!(derived.platform(), Platform::X86);
        assert_ne!(options, derived);
        assert_eq!(derived, options.with_platform(Platform::X86));
    }

    #[test]
    fn test_hash_cache_and_sentinel() {
        let options = CompilationOptions::default();
        let hash = options.stable_hash();
        assert_ne!(hash, 0);
        assert_eq!(options.hash.load(Ordering::Relaxed), hash);
    }

    #[test]
    fn test_services_compare_by_identity() {
        struct Normalizer;
        impl SourceReferenceResolver for Normalizer {
            fn normalize_path(&self, path: &str, _: Option<&str>) -> Option<String> {
                Some(path.to_lowercase())
            }
        }

        let resolver: Arc<dyn SourceReferenceResolver> = Arc::new(Normalizer);
        let a = CompilationOptions::default().with_source_reference_resolver(Some(resolver.clone()));
        let b = CompilationOptions::default().with_source_reference_resolver(Some(resolver));
        let c = CompilationOptions::default().with_source_reference_resolver(Some(Arc::new(Normalizer)));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.stable_hash(), c.stable_hash());
    }

    #[test]
    fn test_validate_signing() {
        let options = CompilationOptions::default()
            .with_public_sign(true)
            .with_delay_sign(Some(true));
        let ids: Vec<_> = options.errors().iter().map(|d| d.id().to_string()).collect();
        assert_eq!(
            ids,
            vec![
                ErrorCode::PublicSignWithDelaySign.id(),
                ErrorCode::PublicSignNoKey.id()
            ]
        );

        let ok = CompilationOptions::default()
            .with_public_sign(true)
            .with_crypto_public_key(&[0, 1, 2]);
        assert!(ok.errors().is_empty());
    }

    #[test]
    fn test_validate_output_kind_rules() {
        let options = CompilationOptions::new(OutputKind::DynamicallyLinkedLibrary)
            .with_platform(Platform::AnyCpu32BitPreferred)
            .with_main_type_name(Some("Program"))
            .with_module_name(Some("bad/name"))
            .with_script_class_name("");
        assert_eq!(options.errors().len(), 4);

        let exe = CompilationOptions::new(OutputKind::ConsoleApplication)
            .with_platform(Platform::AnyCpu32BitPreferred)
            .with_main_type_name(Some("Program"));
        assert!(exe.errors().is_empty());
    }

    #[test]
    fn test_signing_option_queries() {
        let options = CompilationOptions::default();
        assert!(!options.has_signing_options());
        let signed = options.with_crypto_key_file(Some("key.snk"));
        assert!(signed.has_signing_options());
        assert!(signed.is_signed());
    }
}
