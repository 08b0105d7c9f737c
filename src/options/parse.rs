//! Per-tree parse options.

use std::{
    collections::BTreeMap,
    hash::{Hash, Hasher},
    sync::{
        atomic::{AtomicU64, Ordering},
        OnceLock,
    },
};

use crate::{
    diagnostics::{Diagnostic, ErrorCode},
    options::{DocumentationMode, SourceCodeKind},
    utils::StableHasher,
};

/// Latest language version understood by this crate.
pub const LATEST_LANGUAGE_VERSION: u16 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ParseOptionsData {
    kind: SourceCodeKind,
    documentation_mode: DocumentationMode,
    language_version: u16,
    preprocessor_symbols: Vec<String>,
    features: BTreeMap<String, String>,
}

/// Options a syntax tree was parsed with.
///
/// # Examples
///
/// ```rust
/// use dotcompile::options::{ParseOptions, SourceCodeKind};
///
/// let script = ParseOptions::script();
/// assert_eq!(script.kind(), SourceCodeKind::Script);
///
/// let with_feature = script.with_features([("strict", "true")]);
/// assert_eq!(with_feature.feature("strict"), Some("true"));
/// assert_ne!(script, with_feature);
/// ```
#[derive(Debug)]
pub struct ParseOptions {
    data: ParseOptionsData,
    hash: AtomicU64,
    errors: OnceLock<Vec<Diagnostic>>,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self::from_data(ParseOptionsData {
            kind: SourceCodeKind::Regular,
            documentation_mode: DocumentationMode::Parse,
            language_version: LATEST_LANGUAGE_VERSION,
            preprocessor_symbols: Vec::new(),
            features: BTreeMap::new(),
        })
    }
}

impl Clone for ParseOptions {
    fn clone(&self) -> Self {
        ParseOptions {
            data: self.data.clone(),
            hash: AtomicU64::new(self.hash.load(Ordering::Relaxed)),
            errors: self.errors.clone(),
        }
    }
}

impl ParseOptions {
    fn from_data(data: ParseOptionsData) -> Self {
        ParseOptions {
            data,
            hash: AtomicU64::new(0),
            errors: OnceLock::new(),
        }
    }

    fn with(&self, update: impl FnOnce(&mut ParseOptionsData)) -> Self {
        let mut data = self.data.clone();
        update(&mut data);
        Self::from_data(data)
    }

    /// Options for regular source.
    #[must_use]
    pub fn regular() -> Self {
        Self::default()
    }

    /// Options for script submissions.
    #[must_use]
    pub fn script() -> Self {
        Self::default().with_kind(SourceCodeKind::Script)
    }

    /// Regular or script.
    #[must_use]
    pub fn kind(&self) -> SourceCodeKind {
        self.data.kind
    }

    /// Documentation comment processing.
    #[must_use]
    pub fn documentation_mode(&self) -> DocumentationMode {
        self.data.documentation_mode
    }

    /// Language version.
    #[must_use]
    pub fn language_version(&self) -> u16 {
        self.data.language_version
    }

    /// Defined preprocessor symbols, in declaration order.
    #[must_use]
    pub fn preprocessor_symbols(&self) -> &[String] {
        &self.data.preprocessor_symbols
    }

    /// Feature flags.
    #[must_use]
    pub fn features(&self) -> &BTreeMap<String, String> {
        &self.data.features
    }

    /// Looks up a single feature flag.
    #[must_use]
    pub fn feature(&self, name: &str) -> Option<&str> {
        self.data.features.get(name).map(String::as_str)
    }

    /// Returns options with a different source kind.
    #[must_use]
    pub fn with_kind(&self, kind: SourceCodeKind) -> Self {
        self.with(|d| d.kind = kind)
    }

    /// Returns options with a different documentation mode.
    #[must_use]
    pub fn with_documentation_mode(&self, mode: DocumentationMode) -> Self {
        self.with(|d| d.documentation_mode = mode)
    }

    /// Returns options with a different language version.
    #[must_use]
    pub fn with_language_version(&self, version: u16) -> Self {
        self.with(|d| d.language_version = version)
    }

    /// Returns options with different preprocessor symbols.
    #[must_use]
    pub fn with_preprocessor_symbols<S: Into<String>>(
        &self,
        symbols: impl IntoIterator<Item = S>,
    ) -> Self {
        let symbols = symbols.into_iter().map(Into::into).collect();
        self.with(|d| d.preprocessor_symbols = symbols)
    }

    /// Returns options with different feature flags.
    #[must_use]
    pub fn with_features<K: Into<String>, V: Into<String>>(
        &self,
        features: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        let features = features
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.with(|d| d.features = features)
    }

    /// Option errors, computed once.
    pub fn errors(&self) -> &[Diagnostic] {
        self.errors.get_or_init(|| {
            let mut diagnostics = Vec::new();
            self.validate(&mut diagnostics);
            diagnostics
        })
    }

    /// Appends diagnostics for invalid settings to `diagnostics`.
    pub fn validate(&self, diagnostics: &mut Vec<Diagnostic>) {
        if self.data.language_version == 0 || self.data.language_version > LATEST_LANGUAGE_VERSION
        {
            diagnostics.push(
                ErrorCode::BadLanguageVersion.at_none(&[&self.data.language_version]),
            );
        }
        for symbol in &self.data.preprocessor_symbols {
            if !is_valid_identifier(symbol) {
                diagnostics.push(ErrorCode::BadPreprocessorSymbol.at_none(&[symbol]));
            }
        }
    }

    /// Hash of every field, computed once per instance.
    #[must_use]
    pub fn stable_hash(&self) -> u64 {
        let cached = self.hash.load(Ordering::Relaxed);
        if cached != 0 {
            return cached;
        }
        let mut hasher = StableHasher::new();
        self.data.hash(&mut hasher);
        let computed = match hasher.finish() {
            0 => 1,
            h => h,
        };
        self.hash.store(computed, Ordering::Relaxed);
        computed
    }
}

pub(crate) fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

impl PartialEq for ParseOptions {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
            || (self.stable_hash() == other.stable_hash() && self.data == other.data)
    }
}

impl Eq for ParseOptions {}

impl Hash for ParseOptions {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.stable_hash());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_equality() {
        let a = ParseOptions::default().with_preprocessor_symbols(["DEBUG"]);
        let b = ParseOptions::default().with_preprocessor_symbols(vec!["DEBUG".to_string()]);
        assert_eq!(a, b);
        assert_eq!(a.stable_hash(), b.stable_hash());
        assert_ne!(a, ParseOptions::default());
    }

    #[test]
    fn test_hash_is_never_zero_and_cached() {
        let options = ParseOptions::script();
        let first = options.stable_hash();
        assert_ne!(first, 0);
        assert_eq!(options.hash.load(Ordering::Relaxed), first);
        assert_eq!(options.clone().stable_hash(), first);
    }

    #[test]
    fn test_with_resets_caches() {
        let options = ParseOptions::default();
        let _ = options.stable_hash();
        let derived = options.with_language_version(1);
        assert_eq!(derived.hash.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_errors() {
        let options = ParseOptions::default()
            .with_language_version(99)
            .with_preprocessor_symbols(["OK", "1BAD"]);
        let ids: Vec<_> = options.errors().iter().map(|d| d.id().to_string()).collect();
        assert_eq!(
            ids,
            vec![
                ErrorCode::BadLanguageVersion.id(),
                ErrorCode::BadPreprocessorSymbol.id()
            ]
        );
    }
}
