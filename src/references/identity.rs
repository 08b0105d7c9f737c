//! Assembly identities.
//!
//! An assembly is identified by its simple name, a four-part version, an optional
//! culture and, when strong-named, a public key token. Names compare
//! case-insensitively; everything else compares exactly.
//!
//! # Examples
//!
//! ```rust
//! use dotcompile::references::{AssemblyIdentity, AssemblyVersion};
//!
//! let corlib = AssemblyIdentity::parse(
//!     "mscorlib, Version=4.0.0.0, Culture=neutral, PublicKeyToken=b77a5c561934e089",
//! )?;
//! assert_eq!(corlib.version(), AssemblyVersion::new(4, 0, 0, 0));
//! assert!(corlib.is_strong_named());
//! assert_eq!(
//!     corlib.display_name(),
//!     "mscorlib, Version=4.0.0.0, Culture=neutral, PublicKeyToken=b77a5c561934e089"
//! );
//! # Ok::<(), dotcompile::Error>(())
//! ```

use std::{
    fmt::{self, Write},
    hash::{Hash, Hasher},
};

use sha1::{Digest, Sha1};

use crate::Result;

/// Four-part assembly version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct AssemblyVersion {
    /// Major version
    pub major: u16,
    /// Minor version
    pub minor: u16,
    /// Build number
    pub build: u16,
    /// Revision number
    pub revision: u16,
}

impl AssemblyVersion {
    /// Creates a version.
    #[must_use]
    pub const fn new(major: u16, minor: u16, build: u16, revision: u16) -> Self {
        AssemblyVersion {
            major,
            minor,
            build,
            revision,
        }
    }

    /// `true` for `0.0.0.0`.
    #[must_use]
    pub const fn is_unknown(&self) -> bool {
        self.major == 0 && self.minor == 0 && self.build == 0 && self.revision == 0
    }

    /// Parses `major[.minor[.build[.revision]]]`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for anything else.
    pub fn parse(version_str: &str) -> Result<Self> {
        let parts: Vec<&str> = version_str.split('.').collect();
        if parts.len() > 4 {
            return Err(malformed_error!("Invalid version format: {}", version_str));
        }

        let mut components = [0u16; 4];
        for (i, part) in parts.iter().enumerate() {
            components[i] = part
                .trim()
                .parse::<u16>()
                .map_err(|_| malformed_error!("Invalid version component: {}", part))?;
        }

        Ok(Self::new(
            components[0],
            components[1],
            components[2],
            components[3],
        ))
    }
}

impl fmt::Display for AssemblyVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.build, self.revision
        )
    }
}

/// Name, version, culture and public key token of an assembly.
#[derive(Debug, Clone)]
pub struct AssemblyIdentity {
    name: String,
    version: AssemblyVersion,
    culture: Option<String>,
    public_key: Vec<u8>,
    public_key_token: Option<[u8; 8]>,
}

impl AssemblyIdentity {
    /// Culture-neutral, unsigned identity with version `0.0.0.0`.
    #[must_use]
    pub fn new(name: &str) -> Self {
        AssemblyIdentity {
            name: name.to_string(),
            version: AssemblyVersion::default(),
            culture: None,
            public_key: Vec::new(),
            public_key_token: None,
        }
    }

    /// Returns the identity with a different version.
    #[must_use]
    pub fn with_version(mut self, version: AssemblyVersion) -> Self {
        self.version = version;
        self
    }

    /// Returns the identity with a culture; `None` or `"neutral"` means neutral.
    #[must_use]
    pub fn with_culture(mut self, culture: Option<&str>) -> Self {
        self.culture = culture
            .filter(|c| !c.is_empty() && !c.eq_ignore_ascii_case("neutral"))
            .map(str::to_string);
        self
    }

    /// Returns the identity with a full public key; the token is derived from it.
    #[must_use]
    pub fn with_public_key(mut self, public_key: &[u8]) -> Self {
        self.public_key = public_key.to_vec();
        self.public_key_token = if public_key.is_empty() {
            None
        } else {
            Some(public_key_token(public_key))
        };
        self
    }

    /// Returns the identity with an explicit public key token.
    #[must_use]
    pub fn with_public_key_token(mut self, token: Option<[u8; 8]>) -> Self {
        self.public_key = Vec::new();
        self.public_key_token = token;
        self
    }

    /// Parses a display name such as
    /// `Name, Version=1.0.0.0, Culture=neutral, PublicKeyToken=null`.
    ///
    /// Unknown components are ignored.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for an empty name, a bad version or a token
    /// that is not 16 hex digits.
    pub fn parse(display_name: &str) -> Result<Self> {
        let mut parts = display_name.split(',').map(str::trim);

        let name = parts.next().unwrap_or_default();
        if name.is_empty() {
            return Err(malformed_error!("Assembly name cannot be empty"));
        }

        let mut identity = AssemblyIdentity::new(name);
        for part in parts {
            if let Some(value) = part.strip_prefix("Version=") {
                identity.version = AssemblyVersion::parse(value)?;
            } else if let Some(value) = part.strip_prefix("Culture=") {
                identity = identity.with_culture(Some(value));
            } else if let Some(value) = part.strip_prefix("PublicKeyToken=") {
                if value != "null" && !value.is_empty() {
                    identity.public_key_token = Some(decode_token(value)?);
                }
            }
        }
        Ok(identity)
    }

    /// Display name with every component.
    #[must_use]
    pub fn display_name(&self) -> String {
        let mut result = String::with_capacity(self.name.len() + 80);
        result.push_str(&self.name);
        let _ = write!(result, ", Version={}", self.version);
        let _ = write!(
            result,
            ", Culture={}",
            self.culture.as_deref().unwrap_or("neutral")
        );
        result.push_str(", PublicKeyToken=");
        match &self.public_key_token {
            Some(token) => {
                for byte in token {
                    let _ = write!(result, "{byte:02x}");
                }
            }
            None => result.push_str("null"),
        }
        result
    }

    /// Simple name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Version.
    #[must_use]
    pub fn version(&self) -> AssemblyVersion {
        self.version
    }

    /// Culture, `None` when neutral.
    #[must_use]
    pub fn culture(&self) -> Option<&str> {
        self.culture.as_deref()
    }

    /// Full public key, empty when only a token is known.
    #[must_use]
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// Public key token.
    #[must_use]
    pub fn public_key_token(&self) -> Option<[u8; 8]> {
        self.public_key_token
    }

    /// `true` when the identity carries a public key or token.
    #[must_use]
    pub fn is_strong_named(&self) -> bool {
        self.public_key_token.is_some()
    }
}

/// Last eight bytes of the SHA-1 of the key, reversed.
#[must_use]
pub fn public_key_token(public_key: &[u8]) -> [u8; 8] {
    let digest = Sha1::digest(public_key);
    let mut token = [0u8; 8];
    for (i, byte) in digest[digest.len() - 8..].iter().rev().enumerate() {
        token[i] = *byte;
    }
    token
}

fn decode_token(value: &str) -> Result<[u8; 8]> {
    if value.len() != 16 || !value.is_ascii() {
        return Err(malformed_error!(
            "PublicKeyToken must be exactly 16 hex characters, got '{}'",
            value
        ));
    }
    let mut token = [0u8; 8];
    for (i, slot) in token.iter_mut().enumerate() {
        *slot = u8::from_str_radix(&value[i * 2..i * 2 + 2], 16)
            .map_err(|_| malformed_error!("Invalid hex in PublicKeyToken '{}'", value))?;
    }
    Ok(token)
}

impl PartialEq for AssemblyIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.name.eq_ignore_ascii_case(&other.name)
            && self.version == other.version
            && self.culture == other.culture
            && self.public_key_token == other.public_key_token
    }
}

impl Eq for AssemblyIdentity {}

impl Hash for AssemblyIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.to_ascii_lowercase().hash(state);
        self.version.hash(state);
        self.culture.hash(state);
        self.public_key_token.hash(state);
    }
}

impl fmt::Display for AssemblyIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assembly_version_parse_partial() {
        assert_eq!(AssemblyVersion::parse("2.1").unwrap(), AssemblyVersion::new(2, 1, 0, 0));
        assert!(AssemblyVersion::parse("1.2.3.4.5").is_err());
        assert!(AssemblyVersion::parse("1.x").is_err());
        assert!(AssemblyVersion::new(0, 0, 0, 0).is_unknown());
    }

    #[test]
    fn test_assembly_identity_parse_and_display() {
        let identity = AssemblyIdentity::parse("Lib, Version=1.2.3.4, Culture=en-US").unwrap();
        assert_eq!(identity.culture(), Some("en-US"));
        assert!(!identity.is_strong_named());
        assert_eq!(
            identity.to_string(),
            "Lib, Version=1.2.3.4, Culture=en-US, PublicKeyToken=null"
        );
    }

    #[test]
    fn test_assembly_identity_parse_invalid_token() {
        assert!(AssemblyIdentity::parse("Lib, PublicKeyToken=xyz").is_err());
        assert!(AssemblyIdentity::parse("Lib, PublicKeyToken=zz7a5c561934e089").is_err());
        assert!(AssemblyIdentity::parse(" , Version=1.0").is_err());
    }

    #[test]
    fn test_name_comparison_ignores_case() {
        let a = AssemblyIdentity::new("System.Runtime");
        let b = AssemblyIdentity::new("system.runtime");
        assert_eq!(a, b);
        assert_ne!(a, b.with_version(AssemblyVersion::new(1, 0, 0, 0)));
    }

    #[test]
    fn test_public_key_derives_token() {
        let identity = AssemblyIdentity::new("Signed").with_public_key(&[1, 2, 3, 4]);
        assert!(identity.is_strong_named());
        assert_eq!(identity.public_key_token(), Some(public_key_token(&[1, 2, 3, 4])));
        assert!(AssemblyIdentity::new("x").with_public_key(&[]).public_key_token().is_none());
    }
}
