//! Source text with lazily computed checksums.

use std::{
    fmt,
    sync::{Arc, OnceLock},
};

use md5::Md5;
use sha1::{Digest, Sha1};

/// Hash algorithm used for source checksums.
///
/// Checksums identify documents in debug information and in the deterministic key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SourceHashAlgorithm {
    /// No checksum.
    None,
    /// SHA-1 (the default).
    #[default]
    Sha1,
    /// MD5.
    Md5,
}

impl SourceHashAlgorithm {
    /// Stable name of the algorithm.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            SourceHashAlgorithm::None => "None",
            SourceHashAlgorithm::Sha1 => "SHA1",
            SourceHashAlgorithm::Md5 => "MD5",
        }
    }

    /// Hashes `data` with this algorithm. Returns an empty vector for
    /// [`SourceHashAlgorithm::None`].
    #[must_use]
    pub fn compute(self, data: &[u8]) -> Vec<u8> {
        match self {
            SourceHashAlgorithm::None => Vec::new(),
            SourceHashAlgorithm::Sha1 => {
                let mut hasher = Sha1::new();
                hasher.update(data);
                hasher.finalize().to_vec()
            }
            SourceHashAlgorithm::Md5 => {
                let mut hasher = Md5::new();
                hasher.update(data);
                hasher.finalize().to_vec()
            }
        }
    }

    /// GUID identifying the algorithm in portable PDB `Document` rows.
    #[must_use]
    pub fn pdb_guid(self) -> uguid::Guid {
        match self {
            SourceHashAlgorithm::None => uguid::Guid::ZERO,
            SourceHashAlgorithm::Sha1 => uguid::guid!("ff1816ec-aa5e-4d10-87f7-6f4963833460"),
            SourceHashAlgorithm::Md5 => uguid::guid!("406ea660-64cf-4c82-b6f0-42d48172a799"),
        }
    }
}

struct SourceTextData {
    text: String,
    encoding: Option<String>,
    algorithm: SourceHashAlgorithm,
    checksum: OnceLock<Vec<u8>>,
    line_starts: OnceLock<Vec<usize>>,
}

/// Immutable source text.
///
/// Cloning is cheap; clones share the text and the lazily computed checksum.
///
/// # Examples
///
/// ```rust
/// use dotcompile::syntax::{SourceHashAlgorithm, SourceText};
///
/// let text = SourceText::new("class Foo {}\n");
/// assert_eq!(text.checksum_algorithm(), SourceHashAlgorithm::Sha1);
/// assert_eq!(text.checksum().len(), 20);
///
/// let md5 = text.with_checksum_algorithm(SourceHashAlgorithm::Md5);
/// assert_eq!(md5.checksum().len(), 16);
/// ```
#[derive(Clone)]
pub struct SourceText {
    data: Arc<SourceTextData>,
}

impl SourceText {
    /// Creates UTF-8 source text hashed with SHA-1.
    pub fn new(text: impl Into<String>) -> Self {
        Self::with_options(text, Some("utf-8"), SourceHashAlgorithm::Sha1)
    }

    /// Creates source text with an explicit encoding name and checksum algorithm.
    pub fn with_options(
        text: impl Into<String>,
        encoding: Option<&str>,
        algorithm: SourceHashAlgorithm,
    ) -> Self {
        SourceText {
            data: Arc::new(SourceTextData {
                text: text.into(),
                encoding: encoding.map(str::to_string),
                algorithm,
                checksum: OnceLock::new(),
                line_starts: OnceLock::new(),
            }),
        }
    }

    /// Returns a copy using a different checksum algorithm.
    #[must_use]
    pub fn with_checksum_algorithm(&self, algorithm: SourceHashAlgorithm) -> Self {
        Self::with_options(self.as_str(), self.encoding(), algorithm)
    }

    /// The text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.data.text
    }

    /// Length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.text.len()
    }

    /// Returns `true` for empty text.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.text.is_empty()
    }

    /// Encoding name, if known.
    #[must_use]
    pub fn encoding(&self) -> Option<&str> {
        self.data.encoding.as_deref()
    }

    /// Checksum algorithm.
    #[must_use]
    pub fn checksum_algorithm(&self) -> SourceHashAlgorithm {
        self.data.algorithm
    }

    /// Checksum of the encoded text, computed on first use.
    #[must_use]
    pub fn checksum(&self) -> &[u8] {
        self.data
            .checksum
            .get_or_init(|| self.data.algorithm.compute(self.data.text.as_bytes()))
    }

    /// Zero-based `(line, column)` of a byte offset.
    #[must_use]
    pub fn line_position(&self, offset: usize) -> (usize, usize) {
        let starts = self.data.line_starts.get_or_init(|| {
            std::iter::once(0)
                .chain(
                    self.data
                        .text
                        .char_indices()
                        .filter(|(_, c)| *c == '\n')
                        .map(|(i, _)| i + 1),
                )
                .collect()
        });
        let line = match starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next - 1,
        };
        (line, offset - starts[line])
    }

    /// Text of `span`, clamped to the text bounds.
    #[must_use]
    pub fn slice(&self, span: super::TextSpan) -> &str {
        let start = span.start.min(self.len());
        let end = span.end().min(self.len());
        self.data.text.get(start..end).unwrap_or("")
    }
}

impl fmt::Debug for SourceText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceText")
            .field("len", &self.len())
            .field("encoding", &self.encoding())
            .field("algorithm", &self.checksum_algorithm())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::TextSpan;

    #[test]
    fn test_checksum_changes_with_content() {
        let a = SourceText::new("class A {}");
        let b = SourceText::new("class B {}");
        assert_ne!(a.checksum(), b.checksum());
        assert_eq!(a.checksum(), SourceText::new("class A {}").checksum());
    }

    #[test]
    fn test_line_position() {
        let text = SourceText::new("a\nbc\n\nd");
        assert_eq!(text.line_position(0), (0, 0));
        assert_eq!(text.line_position(3), (1, 1));
        assert_eq!(text.line_position(5), (2, 0));
        assert_eq!(text.line_position(6), (3, 0));
    }

    #[test]
    fn test_slice() {
        let text = SourceText::new("using System;");
        assert_eq!(text.slice(TextSpan::new(6, 6)), "System");
        assert_eq!(text.slice(TextSpan::new(10, 50)), "em;");
    }

    #[test]
    fn test_none_algorithm() {
        let text = SourceText::with_options("x", None, SourceHashAlgorithm::None);
        assert!(text.checksum().is_empty());
    }
}
