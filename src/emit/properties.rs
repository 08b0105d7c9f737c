//! Header values of the emitted image, derived from options.
//!
//! [`ModulePropertiesForSerialization`] is computed once per emit from the
//! compilation and emit options and carries every constant the PE writer needs:
//! machine, subsystem, alignments, base address, reserve sizes and the COFF, DLL
//! and CLI flag words.
//!
//! # Reference
//! - [ECMA-335 II.25](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use bitflags::bitflags;

use crate::options::{CompilationOptions, EmitOptions, OutputKind, Platform, SubsystemVersion};

/// Default file alignment; the same for 32 and 64-bit images.
pub const DEFAULT_FILE_ALIGNMENT: u32 = 0x200;
/// Section alignment of every image.
pub const SECTION_ALIGNMENT: u32 = 0x2000;

const DEFAULT_EXE_BASE_32: u64 = 0x0040_0000;
const DEFAULT_EXE_BASE_64: u64 = 0x0001_4000_0000;
const DEFAULT_DLL_BASE_32: u64 = 0x1000_0000;
const DEFAULT_DLL_BASE_64: u64 = 0x0001_8000_0000;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    /// COFF file header characteristics
    pub struct Characteristics: u16 {
        /// Relocations have been stripped
        const RELOCS_STRIPPED = 0x0001;
        /// The image is executable
        const EXECUTABLE_IMAGE = 0x0002;
        /// The image can handle addresses above 2 GB
        const LARGE_ADDRESS_AWARE = 0x0020;
        /// The machine is 32-bit
        const BIT32_MACHINE = 0x0100;
        /// The image is a DLL
        const DLL = 0x2000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    /// Optional header DLL characteristics
    pub struct DllCharacteristics: u16 {
        /// 64-bit address space randomization
        const HIGH_ENTROPY_VA = 0x0020;
        /// Relocatable at load time
        const DYNAMIC_BASE = 0x0040;
        /// Compatible with data execution prevention
        const NX_COMPAT = 0x0100;
        /// No structured exception handlers
        const NO_SEH = 0x0400;
        /// Must run in an app container
        const APP_CONTAINER = 0x1000;
        /// Terminal server aware
        const TERMINAL_SERVER_AWARE = 0x8000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    /// CLI header flags
    pub struct CorFlags: u32 {
        /// The image contains IL only
        const IL_ONLY = 0x0000_0001;
        /// The image must load as a 32-bit process
        const REQUIRES_32BIT = 0x0000_0002;
        /// The image is strong-name signed
        const STRONG_NAME_SIGNED = 0x0000_0008;
        /// The image has a native entry point
        const NATIVE_ENTRY_POINT = 0x0000_0010;
        /// The image prefers a 32-bit process
        const PREFERS_32BIT = 0x0002_0000;
    }
}

/// Target machine written to the COFF header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Machine {
    /// No specific machine; written as I386
    Unknown,
    /// x86
    I386,
    /// x64
    Amd64,
    /// ARM Thumb-2
    ArmThumb2,
    /// ARM64
    Arm64,
    /// Itanium
    IA64,
}

impl Machine {
    /// Machine required by `platform`.
    #[must_use]
    pub fn for_platform(platform: Platform) -> Self {
        match platform {
            Platform::X86 => Machine::I386,
            Platform::X64 => Machine::Amd64,
            Platform::Arm => Machine::ArmThumb2,
            Platform::Arm64 => Machine::Arm64,
            Platform::Itanium => Machine::IA64,
            Platform::AnyCpu | Platform::AnyCpu32BitPreferred => Machine::Unknown,
        }
    }

    /// Value of `IMAGE_FILE_HEADER.Machine`.
    #[must_use]
    pub fn header_value(self) -> u16 {
        match self {
            Machine::Unknown | Machine::I386 => 0x014c,
            Machine::Amd64 => 0x8664,
            Machine::ArmThumb2 => 0x01c4,
            Machine::Arm64 => 0xaa64,
            Machine::IA64 => 0x0200,
        }
    }

    /// `true` for machines that need a PE32+ optional header.
    #[must_use]
    pub fn requires_64bit(self) -> bool {
        matches!(self, Machine::Amd64 | Machine::Arm64 | Machine::IA64)
    }
}

/// Windows subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subsystem {
    /// Windows GUI
    WindowsGui,
    /// Windows console
    WindowsCui,
}

impl Subsystem {
    /// Value of `IMAGE_OPTIONAL_HEADER.Subsystem`.
    #[must_use]
    pub fn header_value(self) -> u16 {
        match self {
            Subsystem::WindowsGui => 2,
            Subsystem::WindowsCui => 3,
        }
    }
}

/// Everything the PE writer takes from options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModulePropertiesForSerialization {
    /// COFF machine
    pub machine: Machine,
    /// Windows subsystem
    pub subsystem: Subsystem,
    /// Subsystem version
    pub subsystem_version: SubsystemVersion,
    /// Alignment of section data in the file
    pub file_alignment: u32,
    /// Alignment of sections in memory
    pub section_alignment: u32,
    /// Preferred image base
    pub base_address: u64,
    /// Stack reserve
    pub size_of_stack_reserve: u64,
    /// Stack commit
    pub size_of_stack_commit: u64,
    /// Heap reserve
    pub size_of_heap_reserve: u64,
    /// Heap commit
    pub size_of_heap_commit: u64,
    /// Linker major version
    pub linker_major_version: u8,
    /// Linker minor version
    pub linker_minor_version: u8,
    /// COFF characteristics
    pub characteristics: Characteristics,
    /// DLL characteristics
    pub dll_characteristics: DllCharacteristics,
    /// CLI header flags
    pub cor_flags: CorFlags,
    /// Version string of the metadata root
    pub runtime_metadata_version: String,
    /// Derive ids and timestamp from content
    pub is_deterministic: bool,
}

impl ModulePropertiesForSerialization {
    /// Derives the properties of an image built with `options` and `emit_options`.
    #[must_use]
    pub fn new(options: &CompilationOptions, emit_options: &EmitOptions) -> Self {
        let platform = options.platform();
        let output_kind = options.output_kind();
        let machine = Machine::for_platform(platform);
        let is_64bit = machine.requires_64bit();

        let subsystem = match output_kind {
            OutputKind::WindowsApplication | OutputKind::WindowsRuntimeApplication => {
                Subsystem::WindowsGui
            }
            _ => Subsystem::WindowsCui,
        };

        let subsystem_version = if emit_options.subsystem_version().is_none() {
            SubsystemVersion::default_for(output_kind)
        } else {
            emit_options.subsystem_version()
        };

        let file_alignment = match emit_options.file_alignment() {
            0 => DEFAULT_FILE_ALIGNMENT,
            value => value,
        };

        let base_address = compute_base_address(emit_options.base_address(), output_kind, is_64bit);

        let (stack_reserve, stack_commit, heap_reserve, heap_commit) = if is_64bit {
            (0x0040_0000, 0x4000, 0x0010_0000, 0x2000)
        } else {
            (0x0010_0000, 0x1000, 0x0010_0000, 0x1000)
        };

        let mut characteristics = Characteristics::EXECUTABLE_IMAGE;
        if machine == Machine::I386 {
            characteristics |= Characteristics::BIT32_MACHINE;
        } else {
            characteristics |= Characteristics::LARGE_ADDRESS_AWARE;
        }
        if output_kind.is_dll_image() {
            characteristics |= Characteristics::DLL;
        }

        let mut dll_characteristics = DllCharacteristics::DYNAMIC_BASE
            | DllCharacteristics::NX_COMPAT
            | DllCharacteristics::NO_SEH
            | DllCharacteristics::TERMINAL_SERVER_AWARE;
        if is_64bit && emit_options.high_entropy_virtual_address_space() {
            dll_characteristics |= DllCharacteristics::HIGH_ENTROPY_VA;
        }
        if output_kind == OutputKind::WindowsRuntimeApplication {
            dll_characteristics |= DllCharacteristics::APP_CONTAINER;
        }

        let mut cor_flags = CorFlags::IL_ONLY;
        match platform {
            Platform::X86 => cor_flags |= CorFlags::REQUIRES_32BIT,
            Platform::AnyCpu32BitPreferred => {
                cor_flags |= CorFlags::REQUIRES_32BIT | CorFlags::PREFERS_32BIT;
            }
            _ => {}
        }
        if options.is_signed() {
            cor_flags |= CorFlags::STRONG_NAME_SIGNED;
        }

        ModulePropertiesForSerialization {
            machine,
            subsystem,
            subsystem_version,
            file_alignment,
            section_alignment: SECTION_ALIGNMENT,
            base_address,
            size_of_stack_reserve: stack_reserve,
            size_of_stack_commit: stack_commit,
            size_of_heap_reserve: heap_reserve,
            size_of_heap_commit: heap_commit,
            linker_major_version: 48,
            linker_minor_version: 0,
            characteristics,
            dll_characteristics,
            cor_flags,
            runtime_metadata_version: emit_options
                .runtime_metadata_version()
                .unwrap_or("v4.0.30319")
                .to_string(),
            is_deterministic: options.deterministic(),
        }
    }

    /// `true` when the image uses a PE32+ optional header.
    #[must_use]
    pub fn requires_64bit(&self) -> bool {
        self.machine.requires_64bit()
    }
}

/// Image base for a requested `base_address`: defaults when zero, otherwise rounded
/// to the nearest 64 KB boundary.
#[must_use]
pub fn compute_base_address(base_address: u64, output_kind: OutputKind, is_64bit: bool) -> u64 {
    if base_address == 0 {
        return match (output_kind.is_dll_image(), is_64bit) {
            (false, false) => DEFAULT_EXE_BASE_32,
            (false, true) => DEFAULT_EXE_BASE_64,
            (true, false) => DEFAULT_DLL_BASE_32,
            (true, true) => DEFAULT_DLL_BASE_64,
        };
    }

    let mask = if is_64bit {
        0xffff_ffff_ffff_0000
    } else {
        0x0000_0000_ffff_0000
    };
    base_address.wrapping_add(0x8000) & mask
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_machine_mapping() {
        assert_eq!(Machine::for_platform(Platform::X86), Machine::I386);
        assert_eq!(Machine::for_platform(Platform::X64), Machine::Amd64);
        assert_eq!(Machine::for_platform(Platform::Arm), Machine::ArmThumb2);
        assert_eq!(Machine::for_platform(Platform::Arm64), Machine::Arm64);
        assert_eq!(Machine::for_platform(Platform::Itanium), Machine::IA64);
        assert_eq!(
            Machine::for_platform(Platform::AnyCpu32BitPreferred),
            Machine::Unknown
        );
        assert_eq!(Machine::Unknown.header_value(), 0x014c);
        assert_eq!(Machine::Amd64.header_value(), 0x8664);
    }

    #[test]
    fn test_base_address_defaults_and_rounding() {
        assert_eq!(
            compute_base_address(0, OutputKind::ConsoleApplication, false),
            0x0040_0000
        );
        assert_eq!(
            compute_base_address(0, OutputKind::DynamicallyLinkedLibrary, true),
            0x0001_8000_0000
        );
        assert_eq!(
            compute_base_address(0x1234_7fff, OutputKind::ConsoleApplication, false),
            0x1234_0000
        );
        assert_eq!(
            compute_base_address(0x1234_8000, OutputKind::ConsoleApplication, false),
            0x1235_0000
        );
        assert_eq!(
            compute_base_address(0xffff_ffff_8000, OutputKind::ConsoleApplication, false),
            0
        );
    }

    #[test]
    fn test_flags_for_platforms() {
        let emit = EmitOptions::default();
        let x86 = ModulePropertiesForSerialization::new(
            &CompilationOptions::new(OutputKind::ConsoleApplication).with_platform(Platform::X86),
            &emit,
        );
        assert!(x86.characteristics.contains(Characteristics::BIT32_MACHINE));
        assert!(x86.cor_flags.contains(CorFlags::REQUIRES_32BIT));
        assert_eq!(x86.subsystem, Subsystem::WindowsCui);
        assert_eq!(x86.file_alignment, DEFAULT_FILE_ALIGNMENT);

        let x64 = ModulePropertiesForSerialization::new(
            &CompilationOptions::new(OutputKind::DynamicallyLinkedLibrary)
                .with_platform(Platform::X64),
            &emit.with_high_entropy_virtual_address_space(true),
        );
        assert!(x64.requires_64bit());
        assert!(x64.characteristics.contains(Characteristics::DLL));
        assert!(x64
            .dll_characteristics
            .contains(DllCharacteristics::HIGH_ENTROPY_VA));
        assert_eq!(x64.size_of_stack_reserve, 0x0040_0000);
        assert_eq!(x64.cor_flags, CorFlags::IL_ONLY);
    }

    #[test]
    fn test_windows_application_subsystem() {
        let properties = ModulePropertiesForSerialization::new(
            &CompilationOptions::new(OutputKind::WindowsApplication),
            &EmitOptions::default(),
        );
        assert_eq!(properties.subsystem, Subsystem::WindowsGui);
        assert_eq!(properties.subsystem.header_value(), 2);
        assert_eq!(properties.runtime_metadata_version, "v4.0.30319");
    }
}
