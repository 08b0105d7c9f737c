//! Immutable option records.
//!
//! Options are the entire configuration surface of a compilation. Nothing is read from
//! the environment; every setting lives in one of three records:
//!
//! - [`CompilationOptions`] - compiler-wide settings (output kind, platform, signing,
//!   diagnostic filtering, resolvers)
//! - [`ParseOptions`] - per-tree parse settings (source kind, language version,
//!   preprocessor symbols, features)
//! - [`EmitOptions`] - settings that only affect serialization (alignment, base address,
//!   debug information format)
//!
//! Each record exposes one `with_*` method per field, returning a new record. Equality
//! is structural with ordinal string comparison, and hashing is stable across
//! processes.
//!
//! # Validation
//!
//! Invalid combinations are reported as [`crate::diagnostics::Diagnostic`]s, not as
//! errors: [`CompilationOptions::errors`] and [`ParseOptions::errors`] compute them once
//! and memoize the result.
//!
//! # Usage Examples
//!
//! ```rust
//! use dotcompile::options::{CompilationOptions, OptimizationLevel, OutputKind, Platform};
//!
//! let debug = CompilationOptions::new(OutputKind::ConsoleApplication);
//! let release = debug
//!     .with_optimization_level(OptimizationLevel::Release)
//!     .with_platform(Platform::X64);
//!
//! assert_ne!(debug, release);
//! assert_eq!(debug.optimization_level(), OptimizationLevel::Debug);
//! assert!(release.errors().is_empty());
//! ```

mod compilation;
mod emit;
mod parse;

pub use compilation::{
    CompilationOptions, MetadataReferenceResolver, SourceReferenceResolver, StrongNameProvider,
    XmlReferenceResolver,
};
pub use emit::{EmitOptions, SubsystemVersion, VALID_FILE_ALIGNMENTS};
pub use parse::ParseOptions;

use strum::{EnumCount, EnumIter};

/// Kind of binary produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount)]
pub enum OutputKind {
    /// `.exe` with a console subsystem.
    ConsoleApplication,
    /// `.exe` with a GUI subsystem.
    WindowsApplication,
    /// `.dll`.
    DynamicallyLinkedLibrary,
    /// `.netmodule` without an assembly manifest.
    NetModule,
    /// `.winmdobj`.
    WindowsRuntimeMetadata,
    /// `.exe` for the Windows Runtime.
    WindowsRuntimeApplication,
}

impl OutputKind {
    /// `true` for kinds that have an entry point.
    #[must_use]
    pub fn is_application(self) -> bool {
        matches!(
            self,
            OutputKind::ConsoleApplication
                | OutputKind::WindowsApplication
                | OutputKind::WindowsRuntimeApplication
        )
    }

    /// `true` for a `.netmodule`.
    #[must_use]
    pub fn is_net_module(self) -> bool {
        self == OutputKind::NetModule
    }

    /// `true` for kinds serialized with the DLL characteristic.
    #[must_use]
    pub fn is_dll_image(self) -> bool {
        matches!(
            self,
            OutputKind::DynamicallyLinkedLibrary
                | OutputKind::NetModule
                | OutputKind::WindowsRuntimeMetadata
        )
    }

    /// Conventional file extension.
    #[must_use]
    pub fn default_extension(self) -> &'static str {
        match self {
            OutputKind::ConsoleApplication
            | OutputKind::WindowsApplication
            | OutputKind::WindowsRuntimeApplication => ".exe",
            OutputKind::DynamicallyLinkedLibrary => ".dll",
            OutputKind::NetModule => ".netmodule",
            OutputKind::WindowsRuntimeMetadata => ".winmdobj",
        }
    }

    /// Stable name used by the deterministic key.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            OutputKind::ConsoleApplication => "ConsoleApplication",
            OutputKind::WindowsApplication => "WindowsApplication",
            OutputKind::DynamicallyLinkedLibrary => "DynamicallyLinkedLibrary",
            OutputKind::NetModule => "NetModule",
            OutputKind::WindowsRuntimeMetadata => "WindowsRuntimeMetadata",
            OutputKind::WindowsRuntimeApplication => "WindowsRuntimeApplication",
        }
    }
}

/// Target platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, EnumIter, EnumCount)]
pub enum Platform {
    /// Any CPU.
    #[default]
    AnyCpu,
    /// 32-bit Intel.
    X86,
    /// 64-bit AMD/Intel.
    X64,
    /// Itanium.
    Itanium,
    /// Any CPU, preferring 32-bit when both are available.
    AnyCpu32BitPreferred,
    /// 32-bit ARM (Thumb-2).
    Arm,
    /// 64-bit ARM.
    Arm64,
}

impl Platform {
    /// `true` for platforms that require a 64-bit image (PE32+).
    #[must_use]
    pub fn requires_64bit(self) -> bool {
        matches!(self, Platform::X64 | Platform::Itanium | Platform::Arm64)
    }

    /// `true` for platforms that require a 32-bit process.
    #[must_use]
    pub fn requires_32bit(self) -> bool {
        matches!(self, Platform::X86 | Platform::Arm)
    }

    /// Stable name used by the deterministic key.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Platform::AnyCpu => "AnyCpu",
            Platform::X86 => "X86",
            Platform::X64 => "X64",
            Platform::Itanium => "Itanium",
            Platform::AnyCpu32BitPreferred => "AnyCpu32BitPreferred",
            Platform::Arm => "Arm",
            Platform::Arm64 => "Arm64",
        }
    }
}

/// Optimization level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OptimizationLevel {
    /// Debuggable code.
    #[default]
    Debug,
    /// Optimized code.
    Release,
}

impl OptimizationLevel {
    /// Stable name used by the deterministic key.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            OptimizationLevel::Debug => "Debug",
            OptimizationLevel::Release => "Release",
        }
    }
}

/// Whether a tree is regular source or a script submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SourceCodeKind {
    /// Regular source.
    #[default]
    Regular,
    /// Script or interactive submission.
    Script,
}

/// How documentation comments are processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DocumentationMode {
    /// Treated as regular comments.
    None,
    /// Parsed, no diagnostics.
    #[default]
    Parse,
    /// Parsed and diagnosed.
    Diagnose,
}

/// Format of emitted debug information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DebugInformationFormat {
    /// Windows PDB. This crate writes the portable format for it as well.
    Pdb,
    /// Portable PDB written to a separate stream.
    #[default]
    PortablePdb,
    /// Portable PDB embedded in the PE image.
    Embedded,
}

impl DebugInformationFormat {
    /// Stable name used by the deterministic key.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            DebugInformationFormat::Pdb => "Pdb",
            DebugInformationFormat::PortablePdb => "PortablePdb",
            DebugInformationFormat::Embedded => "Embedded",
        }
    }
}

/// Which members of referenced assemblies are imported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MetadataImportOptions {
    /// Public and protected members only.
    #[default]
    Public,
    /// Also internal members.
    Internal,
    /// All members.
    All,
}

/// Default nullable context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NullableContextOptions {
    /// Disabled.
    #[default]
    Disable,
    /// Warnings only.
    Warnings,
    /// Annotations only.
    Annotations,
    /// Warnings and annotations.
    Enable,
}

impl NullableContextOptions {
    /// Stable name used by the deterministic key.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            NullableContextOptions::Disable => "Disable",
            NullableContextOptions::Warnings => "Warnings",
            NullableContextOptions::Annotations => "Annotations",
            NullableContextOptions::Enable => "Enable",
        }
    }
}

/// Instrumentation inserted into emitted code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InstrumentationKind {
    /// Code coverage counters.
    TestCoverage,
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_output_kind_classification() {
        let dll_images: Vec<_> = OutputKind::iter().filter(|k| k.is_dll_image()).collect();
        assert_eq!(
            dll_images,
            vec![
                OutputKind::DynamicallyLinkedLibrary,
                OutputKind::NetModule,
                OutputKind::WindowsRuntimeMetadata
            ]
        );
        assert!(OutputKind::iter()
            .filter(|k| k.is_application())
            .all(|k| !k.is_dll_image()));
    }

    #[test]
    fn test_platform_bitness() {
        for platform in Platform::iter() {
            assert!(!(platform.requires_32bit() && platform.requires_64bit()));
        }
        assert!(Platform::Arm64.requires_64bit());
        assert!(!Platform::AnyCpu32BitPreferred.requires_32bit());
    }
}
