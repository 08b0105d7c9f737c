//! PE/COFF image writer.
//!
//! [`PortableExecutableSerializer`] is the default [`PeSerializer`]. It lays out one
//! image in a single pass over precomputed sizes:
//!
//! ```text
//! headers | .text: IAT, CLI header, IL, metadata, resources, strong name,
//!         |        debug directory and data, import table, startup stub
//!         | .rsrc  (Win32 resources, optional)
//!         | .reloc (PE32 only, relocates the startup stub)
//! ```
//!
//! Deterministic images are written with a zero MVID and timestamp, hashed, and then
//! patched with values derived from the hash, so identical inputs give identical bytes.
//! Otherwise the MVID is random and the timestamp is the current time.
//!
//! # Reference
//! - [PE Format](https://learn.microsoft.com/en-us/windows/win32/debug/pe-format)
//! - [ECMA-335 II.25](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use std::time::{SystemTime, UNIX_EPOCH};

use flate2::{write::DeflateEncoder, Compression};
use sha1::{Digest, Sha1};
use uguid::Guid;

use crate::{
    diagnostics::{DiagnosticBag, ErrorCode},
    emit::{
        builder::ModuleBuilder,
        codegen::MethodBody,
        metadata::{to_u32, MetadataBase, MetadataBuilder, TableId, Token},
        pdb::{write_portable_pdb, PortablePdb, PDB_ID_SIZE},
        resources::read_manifest_resources,
        OutputStream, PeSerializer,
    },
    options::{DebugInformationFormat, OutputKind},
    utils::CancellationToken,
    Result,
};

const DOS_HEADER_SIZE: usize = 0x80;
const COFF_HEADER_SIZE: usize = 20;
const SECTION_HEADER_SIZE: usize = 40;
const CLI_HEADER_SIZE: usize = 72;
const DEBUG_ENTRY_SIZE: usize = 28;
const IMPORT_TABLE_SIZE: usize = 40;
const IMPORT_LOOKUP_SIZE: usize = 8;

const IMAGE_DEBUG_TYPE_CODEVIEW: u32 = 2;
const IMAGE_DEBUG_TYPE_REPRODUCIBLE: u32 = 16;
const IMAGE_DEBUG_TYPE_EMBEDDED_PORTABLE_PDB: u32 = 17;
const PORTABLE_PDB_VERSION: u16 = 0x0100;
const PORTABLE_CODEVIEW_MINOR: u16 = 0x504D;

const TEXT_CHARACTERISTICS: u32 = 0x6000_0020;
const RSRC_CHARACTERISTICS: u32 = 0x4000_0040;
const RELOC_CHARACTERISTICS: u32 = 0x4200_0040;

/// The MS-DOS stub every image starts with; `e_lfanew` points right after it.
const DOS_STUB: [u8; DOS_HEADER_SIZE] = [
    0x4d, 0x5a, 0x90, 0x00, 0x03, 0x00, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0xff, 0xff, 0x00, 0x00,
    0xb8, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x40, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x80, 0x00, 0x00, 0x00,
    0x0e, 0x1f, 0xba, 0x0e, 0x00, 0xb4, 0x09, 0xcd, 0x21, 0xb8, 0x01, 0x4c, 0xcd, 0x21, 0x54, 0x68,
    0x69, 0x73, 0x20, 0x70, 0x72, 0x6f, 0x67, 0x72, 0x61, 0x6d, 0x20, 0x63, 0x61, 0x6e, 0x6e, 0x6f,
    0x74, 0x20, 0x62, 0x65, 0x20, 0x72, 0x75, 0x6e, 0x20, 0x69, 0x6e, 0x20, 0x44, 0x4f, 0x53, 0x20,
    0x6d, 0x6f, 0x64, 0x65, 0x2e, 0x0d, 0x0d, 0x0a, 0x24, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// Writes images with the built-in PE, metadata and portable PDB writers.
#[derive(Debug, Clone, Copy, Default)]
pub struct PortableExecutableSerializer;

impl PeSerializer for PortableExecutableSerializer {
    fn serialize(
        &self,
        module: &ModuleBuilder,
        pe: &mut dyn OutputStream,
        pdb: Option<&mut dyn OutputStream>,
        diagnostics: &DiagnosticBag,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let Some(image) = build_image(module, pdb.is_some(), diagnostics, cancel)? else {
            return Ok(false);
        };
        pe.write_all(&image.pe)?;
        if let (Some(stream), Some(bytes)) = (pdb, image.pdb) {
            stream.write_all(&bytes)?;
        }
        Ok(true)
    }
}

/// A written image and its external PDB.
#[derive(Debug)]
pub(crate) struct SerializedImage {
    pub(crate) pe: Vec<u8>,
    pub(crate) pdb: Option<Vec<u8>>,
}

/// Position-tracking output buffer.
#[derive(Debug, Default)]
struct ImageWriter {
    data: Vec<u8>,
}

impl ImageWriter {
    fn pos(&self) -> usize {
        self.data.len()
    }

    fn write(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    fn write_u16(&mut self, value: u16) {
        self.write(&value.to_le_bytes());
    }

    fn write_u32(&mut self, value: u32) {
        self.write(&value.to_le_bytes());
    }

    fn write_u64(&mut self, value: u64) {
        self.write(&value.to_le_bytes());
    }

    /// Writes a pointer-sized field: 4 bytes in PE32, 8 bytes in PE32+.
    fn write_pointer(&mut self, value: u64, is_pe32_plus: bool) -> Result<()> {
        if is_pe32_plus {
            self.write_u64(value);
        } else {
            let narrow = u32::try_from(value)
                .map_err(|_| malformed_error!("value 0x{:x} does not fit a PE32 field", value))?;
            self.write_u32(narrow);
        }
        Ok(())
    }

    fn pad_to(&mut self, offset: usize) {
        if self.data.len() < offset {
            self.data.resize(offset, 0);
        }
    }

    fn write_at(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
        self.data
            .get_mut(offset..offset + bytes.len())
            .ok_or_else(|| malformed_error!("patch at {} is outside the image", offset))?
            .copy_from_slice(bytes);
        Ok(())
    }
}

fn align(value: usize, alignment: usize) -> usize {
    value.div_ceil(alignment) * alignment
}

/// Placement of one section.
#[derive(Debug, Clone, Copy)]
struct SectionLayout {
    name: [u8; 8],
    rva: u32,
    virtual_size: u32,
    raw_pointer: u32,
    raw_size: u32,
    characteristics: u32,
}

/// Offsets within `.text`, relative to its start.
#[derive(Debug, Default)]
struct TextLayout {
    iat: usize,
    cli_header: usize,
    il: usize,
    metadata: usize,
    resources: usize,
    strong_name: usize,
    debug_directory: usize,
    import_table: usize,
    stub: usize,
    end: usize,
}

/// One debug directory entry and its data.
struct DebugEntry {
    kind: u32,
    stamp: u32,
    major: u16,
    minor: u16,
    data: Vec<u8>,
}

/// Builds the metadata of `module`.
///
/// Returns `None` if a manifest resource could not be read.
pub(crate) fn build_metadata<'m>(
    module: &'m ModuleBuilder,
    diagnostics: &DiagnosticBag,
    cancel: &CancellationToken,
) -> Result<Option<(MetadataBuilder, Vec<u8>, Vec<(u32, Option<&'m MethodBody>)>)>> {
    let mut metadata = MetadataBuilder::new(MetadataBase::default(), Some(module.assembly.clone()));
    metadata.add_module(&module.module_name, None, Guid::ZERO, None, None)?;
    if module.output_kind != OutputKind::NetModule {
        metadata.add_assembly(&module.identity)?;
    }
    metadata.add_module_type();

    // Rows are reserved up front so bodies can refer to any definition
    let mut reserved = Vec::with_capacity(module.types.len());
    for ty in &module.types {
        let rid = metadata.reserve_type(&ty.symbol);
        let field_list = metadata.next_row(TableId::Field);
        let fields: Vec<u32> = ty
            .fields
            .iter()
            .map(|f| metadata.reserve_field(f))
            .collect();
        let method_list = metadata.next_row(TableId::MethodDef);
        let methods: Vec<u32> = ty
            .methods
            .iter()
            .map(|m| metadata.reserve_method(&m.symbol))
            .collect();
        reserved.push((rid, field_list, fields, method_list, methods));
    }

    let mut method_rows = Vec::new();
    for (ty, (rid, field_list, fields, method_list, methods)) in module.types.iter().zip(reserved) {
        check_cancelled!(cancel);
        metadata.add_type_def(rid, &ty.symbol, field_list, method_list)?;
        for (field, field_rid) in ty.fields.iter().zip(fields) {
            metadata.add_field_def(field_rid, field)?;
        }
        for (method, method_rid) in ty.methods.iter().zip(methods) {
            metadata.add_method_def(method_rid, &method.symbol, method.body.as_ref(), true)?;
            method_rows.push((method_rid, method.body.as_ref()));
        }
    }
    method_rows.sort_by_key(|(rid, _)| *rid);

    let Some((resources, entries)) =
        read_manifest_resources(&module.manifest_resources, diagnostics)?
    else {
        return Ok(None);
    };
    for entry in entries {
        match entry.file {
            Some((file_name, hash)) => {
                let file = metadata.add_file(&file_name, &hash)?;
                metadata.add_manifest_resource(&entry.name, entry.is_public, 0, Some(file));
            }
            None => metadata.add_manifest_resource(&entry.name, entry.is_public, entry.offset, None),
        }
    }

    Ok(Some((metadata, resources, method_rows)))
}

/// Size of the strong name signature blob for `public_key`.
fn strong_name_size(public_key: &[u8]) -> usize {
    if public_key.len() < 160 {
        128
    } else {
        public_key.len() - 32
    }
}

/// Default PDB path written into the CodeView entry.
fn default_pdb_path(module_name: &str) -> String {
    match module_name.rfind('.') {
        Some(dot) => format!("{}.pdb", &module_name[..dot]),
        None => format!("{module_name}.pdb"),
    }
}

/// 16 GUID bytes from `hash` with version and variant bits set.
fn guid_from_hash(hash: &[u8]) -> [u8; 16] {
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hash[..16]);
    bytes[7] = (bytes[7] & 0x0F) | 0x50;
    bytes[8] = (bytes[8] & 0x3F) | 0x80;
    bytes
}

fn random_guid() -> [u8; 16] {
    let mut bytes: [u8; 16] = rand::random();
    bytes[7] = (bytes[7] & 0x0F) | 0x40;
    bytes[8] = (bytes[8] & 0x3F) | 0x80;
    bytes
}

fn current_timestamp() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs() as u32)
}

/// Raw deflate of the embedded PDB image.
fn deflate(data: &[u8]) -> Result<Vec<u8>> {
    use std::io::Write;

    let mut encoder = DeflateEncoder::new(Vec::with_capacity(data.len() / 2), Compression::best());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Writes the image of `module` and, when requested or embedded, its PDB.
///
/// Returns `None` after reporting a diagnostic (unreadable resource, signing failure).
pub(crate) fn build_image(
    module: &ModuleBuilder,
    external_pdb: bool,
    diagnostics: &DiagnosticBag,
    cancel: &CancellationToken,
) -> Result<Option<SerializedImage>> {
    let properties = &module.properties;
    let is_pe32_plus = properties.requires_64bit();
    let needs_stub = !is_pe32_plus;
    let deterministic = properties.is_deterministic;
    let embed_pdb = !module.is_reference_assembly
        && module.emit_options.debug_information_format() == DebugInformationFormat::Embedded;
    let write_pdb = !module.is_reference_assembly && (external_pdb || embed_pdb);

    let Some((metadata, resources, method_rows)) = build_metadata(module, diagnostics, cancel)?
    else {
        return Ok(None);
    };
    check_cancelled!(cancel);

    let entry_point = module
        .entry_point
        .as_ref()
        .and_then(|m| metadata.method_def_token(m));

    // Portable PDB, identified by a content hash or a random id
    let mut pdb = if write_pdb {
        let debug_entry = module
            .debug_entry_point
            .as_ref()
            .and_then(|m| metadata.method_def_token(m))
            .or(entry_point);
        let mut pdb = write_portable_pdb(
            module,
            &method_rows,
            &metadata.aggregate_row_counts(),
            debug_entry,
        )?;
        let mut id = [0u8; PDB_ID_SIZE];
        if deterministic {
            let hash = Sha1::digest(&pdb.bytes);
            id[..16].copy_from_slice(&guid_from_hash(&hash));
            let stamp = u32::from_le_bytes([hash[16], hash[17], hash[18], hash[19]]) | 0x8000_0000;
            id[16..].copy_from_slice(&stamp.to_le_bytes());
        } else {
            id[..16].copy_from_slice(&random_guid());
            id[16..].copy_from_slice(&current_timestamp().to_le_bytes());
        }
        pdb.set_id(&id);
        Some((pdb, id))
    } else {
        None
    };

    let mut debug_entries = Vec::new();
    if let Some((pdb, id)) = &pdb {
        let path = module
            .emit_options
            .pdb_file_path()
            .map_or_else(|| default_pdb_path(&module.module_name), str::to_string);
        let mut data = b"RSDS".to_vec();
        data.extend_from_slice(&id[..16]);
        data.extend_from_slice(&1u32.to_le_bytes());
        data.extend_from_slice(path.as_bytes());
        data.push(0);
        debug_entries.push(DebugEntry {
            kind: IMAGE_DEBUG_TYPE_CODEVIEW,
            stamp: u32::from_le_bytes([id[16], id[17], id[18], id[19]]),
            major: PORTABLE_PDB_VERSION,
            minor: PORTABLE_CODEVIEW_MINOR,
            data,
        });
        if deterministic {
            debug_entries.push(DebugEntry {
                kind: IMAGE_DEBUG_TYPE_REPRODUCIBLE,
                stamp: 0,
                major: 0,
                minor: 0,
                data: Vec::new(),
            });
        }
        if embed_pdb {
            let mut data = b"MPDB".to_vec();
            data.extend_from_slice(&to_u32(pdb.bytes.len())?.to_le_bytes());
            data.extend_from_slice(&deflate(&pdb.bytes)?);
            debug_entries.push(DebugEntry {
                kind: IMAGE_DEBUG_TYPE_EMBEDDED_PORTABLE_PDB,
                stamp: 0,
                major: PORTABLE_PDB_VERSION,
                minor: PORTABLE_PDB_VERSION,
                data,
            });
        }
    } else if deterministic {
        debug_entries.push(DebugEntry {
            kind: IMAGE_DEBUG_TYPE_REPRODUCIBLE,
            stamp: 0,
            major: 0,
            minor: 0,
            data: Vec::new(),
        });
    }

    let strong_name = module
        .signing
        .as_ref()
        .map(|_| strong_name_size(module.identity.public_key()));

    // .text layout
    let file_alignment = properties.file_alignment as usize;
    let section_alignment = properties.section_alignment as usize;
    let text_rva = section_alignment;
    let mut text = TextLayout {
        iat: 0,
        cli_header: if needs_stub { IMPORT_LOOKUP_SIZE } else { 0 },
        ..TextLayout::default()
    };
    text.il = text.cli_header + CLI_HEADER_SIZE;
    let il_rva = to_u32(text_rva + text.il)?;
    let serialized = metadata.serialize(&properties.runtime_metadata_version, il_rva)?;
    text.metadata = align(text.il + metadata.il().len(), 4);
    text.resources = align(text.metadata + serialized.bytes.len(), 8);
    text.strong_name = align(text.resources + resources.len(), 8);
    text.debug_directory = align(text.strong_name + strong_name.unwrap_or(0), 4);
    let mut debug_data_end = text.debug_directory + debug_entries.len() * DEBUG_ENTRY_SIZE;
    let mut debug_data_offsets = Vec::with_capacity(debug_entries.len());
    for entry in &debug_entries {
        debug_data_offsets.push(debug_data_end);
        debug_data_end = align(debug_data_end + entry.data.len(), 4);
    }
    text.import_table = align(debug_data_end, 4);
    let entry_name: &[u8] = if module.output_kind.is_dll_image() {
        b"_CorDllMain\0"
    } else {
        b"_CorExeMain\0"
    };
    let hint_name_size = 2 + entry_name.len();
    let dll_name = b"mscoree.dll\0";
    if needs_stub {
        let import_end = text.import_table
            + IMPORT_TABLE_SIZE
            + IMPORT_LOOKUP_SIZE
            + align(hint_name_size, 2)
            + dll_name.len();
        // The jump operand must be 4-byte aligned
        text.stub = align(import_end + 2, 4) - 2;
        text.end = text.stub + 6;
    } else {
        text.stub = text.import_table;
        text.end = text.import_table;
    }

    // Sections
    let has_rsrc = module
        .win32_resources
        .as_ref()
        .is_some_and(|r| !r.is_empty());
    let section_count = 1 + usize::from(has_rsrc) + usize::from(needs_stub);
    let optional_header_size = if is_pe32_plus { 240 } else { 224 };
    let headers_size = align(
        DOS_HEADER_SIZE + 4 + COFF_HEADER_SIZE + optional_header_size + section_count * SECTION_HEADER_SIZE,
        file_alignment,
    );

    let mut sections = vec![SectionLayout {
        name: *b".text\0\0\0",
        rva: to_u32(text_rva)?,
        virtual_size: to_u32(text.end)?,
        raw_pointer: to_u32(headers_size)?,
        raw_size: to_u32(align(text.end, file_alignment))?,
        characteristics: TEXT_CHARACTERISTICS,
    }];
    let next_section = |previous: &SectionLayout| -> (usize, usize) {
        (
            align(previous.rva as usize + previous.virtual_size as usize, section_alignment),
            previous.raw_pointer as usize + previous.raw_size as usize,
        )
    };

    let mut rsrc = None;
    if let Some(win32) = module.win32_resources.as_ref().filter(|r| !r.is_empty()) {
        let (rva, pointer) = next_section(&sections[sections.len() - 1]);
        let bytes = win32.serialize(to_u32(rva)?)?;
        sections.push(SectionLayout {
            name: *b".rsrc\0\0\0",
            rva: to_u32(rva)?,
            virtual_size: to_u32(bytes.len())?,
            raw_pointer: to_u32(pointer)?,
            raw_size: to_u32(align(bytes.len(), file_alignment))?,
            characteristics: RSRC_CHARACTERISTICS,
        });
        rsrc = Some((sections.len() - 1, bytes));
    }

    let mut reloc = None;
    if needs_stub {
        let (rva, pointer) = next_section(&sections[sections.len() - 1]);
        let operand_rva = to_u32(text_rva + text.stub + 2)?;
        let mut bytes = Vec::with_capacity(12);
        bytes.extend_from_slice(&(operand_rva & !0xFFF).to_le_bytes());
        bytes.extend_from_slice(&12u32.to_le_bytes());
        // IMAGE_REL_BASED_HIGHLOW, then an absolute padding entry
        bytes.extend_from_slice(&((3u16 << 12) | (operand_rva & 0xFFF) as u16).to_le_bytes());
        bytes.extend_from_slice(&0u16.to_le_bytes());
        sections.push(SectionLayout {
            name: *b".reloc\0\0",
            rva: to_u32(rva)?,
            virtual_size: to_u32(bytes.len())?,
            raw_pointer: to_u32(pointer)?,
            raw_size: to_u32(align(bytes.len(), file_alignment))?,
            characteristics: RELOC_CHARACTERISTICS,
        });
        reloc = Some((sections.len() - 1, bytes));
    }

    let last = sections[sections.len() - 1];
    let size_of_image = align(last.rva as usize + last.virtual_size as usize, section_alignment);
    let text_rva_of = |offset: usize| -> Result<u32> { to_u32(text_rva + offset) };
    let text_file_offset = headers_size;

    // Headers
    let mut out = ImageWriter::default();
    out.write(&DOS_STUB);
    out.write(b"PE\0\0");

    let timestamp_offset = out.pos() + 4;
    out.write_u16(properties.machine.header_value());
    out.write_u16(section_count as u16);
    out.write_u32(0);
    out.write_u32(0);
    out.write_u32(0);
    out.write_u16(optional_header_size as u16);
    out.write_u16(properties.characteristics.bits());

    let initialized_data: u32 = sections[1..].iter().map(|s| s.raw_size).sum();
    out.write_u16(if is_pe32_plus { 0x20B } else { 0x10B });
    out.write(&[properties.linker_major_version, properties.linker_minor_version]);
    out.write_u32(sections[0].raw_size);
    out.write_u32(initialized_data);
    out.write_u32(0);
    out.write_u32(if needs_stub { text_rva_of(text.stub)? } else { 0 });
    out.write_u32(sections[0].rva);
    if !is_pe32_plus {
        out.write_u32(sections.get(1).map_or(0, |s| s.rva));
    }
    out.write_pointer(properties.base_address, is_pe32_plus)?;
    out.write_u32(properties.section_alignment);
    out.write_u32(properties.file_alignment);
    out.write_u16(4);
    out.write_u16(0);
    out.write_u16(0);
    out.write_u16(0);
    out.write_u16(properties.subsystem_version.major);
    out.write_u16(properties.subsystem_version.minor);
    out.write_u32(0);
    out.write_u32(to_u32(size_of_image)?);
    out.write_u32(to_u32(headers_size)?);
    out.write_u32(0);
    out.write_u16(properties.subsystem.header_value());
    out.write_u16(properties.dll_characteristics.bits());
    out.write_pointer(properties.size_of_stack_reserve, is_pe32_plus)?;
    out.write_pointer(properties.size_of_stack_commit, is_pe32_plus)?;
    out.write_pointer(properties.size_of_heap_reserve, is_pe32_plus)?;
    out.write_pointer(properties.size_of_heap_commit, is_pe32_plus)?;
    out.write_u32(0);
    out.write_u32(16);

    // Data directories
    let mut directories = [(0u32, 0u32); 16];
    if needs_stub {
        directories[1] = (text_rva_of(text.import_table)?, to_u32(IMPORT_TABLE_SIZE + IMPORT_LOOKUP_SIZE)?);
        directories[12] = (text_rva_of(text.iat)?, to_u32(IMPORT_LOOKUP_SIZE)?);
    }
    if let Some((index, bytes)) = &rsrc {
        directories[2] = (sections[*index].rva, to_u32(bytes.len())?);
    }
    if let Some((index, bytes)) = &reloc {
        directories[5] = (sections[*index].rva, to_u32(bytes.len())?);
    }
    if !debug_entries.is_empty() {
        directories[6] = (
            text_rva_of(text.debug_directory)?,
            to_u32(debug_entries.len() * DEBUG_ENTRY_SIZE)?,
        );
    }
    directories[14] = (text_rva_of(text.cli_header)?, to_u32(CLI_HEADER_SIZE)?);
    for (rva, size) in directories {
        out.write_u32(rva);
        out.write_u32(size);
    }

    for section in &sections {
        out.write(&section.name);
        out.write_u32(section.virtual_size);
        out.write_u32(section.rva);
        out.write_u32(section.raw_size);
        out.write_u32(section.raw_pointer);
        out.write_u32(0);
        out.write_u32(0);
        out.write_u16(0);
        out.write_u16(0);
        out.write_u32(section.characteristics);
    }
    out.pad_to(headers_size);

    // .text
    let hint_name_rva = text_rva_of(text.import_table + IMPORT_TABLE_SIZE + IMPORT_LOOKUP_SIZE)?;
    if needs_stub {
        out.write_u32(hint_name_rva);
        out.write_u32(0);
    }

    out.write_u32(CLI_HEADER_SIZE as u32);
    out.write_u16(2);
    out.write_u16(5);
    out.write_u32(text_rva_of(text.metadata)?);
    out.write_u32(to_u32(serialized.bytes.len())?);
    out.write_u32(properties.cor_flags.bits());
    out.write_u32(entry_point.map_or(0, |t: Token| t.value()));
    if resources.is_empty() {
        out.write_u64(0);
    } else {
        out.write_u32(text_rva_of(text.resources)?);
        out.write_u32(to_u32(resources.len())?);
    }
    match strong_name {
        Some(size) => {
            out.write_u32(text_rva_of(text.strong_name)?);
            out.write_u32(to_u32(size)?);
        }
        None => out.write_u64(0),
    }
    // CodeManagerTable, VTableFixups, ExportAddressTableJumps, ManagedNativeHeader
    for _ in 0..4 {
        out.write_u64(0);
    }

    out.write(metadata.il());
    out.pad_to(text_file_offset + text.metadata);
    let metadata_offset = out.pos();
    out.write(&serialized.bytes);
    out.pad_to(text_file_offset + text.resources);
    out.write(&resources);
    out.pad_to(text_file_offset + text.debug_directory);

    for (entry, &data_offset) in debug_entries.iter().zip(&debug_data_offsets) {
        out.write_u32(0);
        out.write_u32(entry.stamp);
        out.write_u16(entry.major);
        out.write_u16(entry.minor);
        out.write_u32(entry.kind);
        out.write_u32(to_u32(entry.data.len())?);
        if entry.data.is_empty() {
            out.write_u64(0);
        } else {
            out.write_u32(text_rva_of(data_offset)?);
            out.write_u32(to_u32(text_file_offset + data_offset)?);
        }
    }
    for (entry, &data_offset) in debug_entries.iter().zip(&debug_data_offsets) {
        out.pad_to(text_file_offset + data_offset);
        out.write(&entry.data);
    }
    out.pad_to(text_file_offset + text.import_table);

    if needs_stub {
        let lookup_rva = text_rva_of(text.import_table + IMPORT_TABLE_SIZE)?;
        let dll_name_rva = hint_name_rva + to_u32(align(hint_name_size, 2))?;
        out.write_u32(lookup_rva);
        out.write_u32(0);
        out.write_u32(0);
        out.write_u32(dll_name_rva);
        out.write_u32(text_rva_of(text.iat)?);
        out.write(&[0u8; 20]);
        out.write_u32(hint_name_rva);
        out.write_u32(0);
        out.write_u16(0);
        out.write(entry_name);
        out.pad_to(text_file_offset + text.import_table + IMPORT_TABLE_SIZE + IMPORT_LOOKUP_SIZE + align(hint_name_size, 2));
        out.write(dll_name);
        out.pad_to(text_file_offset + text.stub);
        let iat_va = properties.base_address + u64::from(text_rva_of(text.iat)?);
        out.write(&[0xFF, 0x25]);
        out.write_u32(u32::try_from(iat_va).map_err(|_| malformed_error!("IAT address out of range"))?);
    }
    out.pad_to(headers_size + sections[0].raw_size as usize);

    for (index, bytes) in [rsrc, reloc].into_iter().flatten() {
        out.pad_to(sections[index].raw_pointer as usize);
        out.write(&bytes);
        out.pad_to((sections[index].raw_pointer + sections[index].raw_size) as usize);
    }

    // MVID and timestamp
    let mvid_offset = serialized.mvid_offset.map(|o| metadata_offset + o);
    let (mvid, timestamp) = if deterministic {
        let hash = Sha1::digest(&out.data);
        let stamp = u32::from_le_bytes([hash[16], hash[17], hash[18], hash[19]]) | 0x8000_0000;
        (guid_from_hash(&hash), stamp)
    } else {
        (random_guid(), current_timestamp())
    };
    if let Some(offset) = mvid_offset {
        out.write_at(offset, &mvid)?;
    }
    out.write_at(timestamp_offset, &timestamp.to_le_bytes())?;
    log::debug!(
        "image {}: {} bytes, {} sections, mvid {}",
        module.module_name,
        out.pos(),
        section_count,
        Guid::from_bytes(mvid)
    );

    if let Some(signing) = &module.signing {
        if !signing.public_sign {
            let result = match &signing.provider {
                Some(provider) => provider.sign(
                    &mut out.data,
                    signing.key_file.as_deref(),
                    signing.key_container.as_deref(),
                ),
                None => Err("no strong name provider is configured".to_string()),
            };
            if let Err(message) = result {
                log::warn!("signing {} failed: {}", module.module_name, message);
                diagnostics.add(ErrorCode::SigningFailed.at_none(&[&message]));
                return Ok(None);
            }
        }
    }

    let external = match pdb.take() {
        Some((PortablePdb { bytes, .. }, _)) if external_pdb && !embed_pdb => Some(bytes),
        _ => None,
    };
    Ok(Some(SerializedImage {
        pe: out.data,
        pdb: external,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        compilation::Compilation,
        lang::MiniLanguage,
        options::{CompilationOptions, EmitOptions, Platform},
        references::{AssemblyMetadata, MetadataReference},
    };

    fn module(source: &str, options: CompilationOptions, emit_options: EmitOptions) -> ModuleBuilder {
        let compilation = MiniLanguage::create_compilation(
            Some("Image"),
            [MiniLanguage::parse(source, "a.mini")],
            [MetadataReference::from_metadata(AssemblyMetadata::core_library(), None)],
            options,
        )
        .unwrap();
        compiled(&compilation, emit_options)
    }

    fn compiled(compilation: &Compilation, emit_options: EmitOptions) -> ModuleBuilder {
        let cancel = CancellationToken::none();
        let mut module = ModuleBuilder::new(compilation, emit_options, &cancel).unwrap();
        assert!(module
            .compile_methods(compilation, &DiagnosticBag::new(), &cancel)
            .unwrap());
        module
    }

    fn u16_at(data: &[u8], offset: usize) -> u16 {
        u16::from_le_bytes([data[offset], data[offset + 1]])
    }

    fn u32_at(data: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes(data[offset..offset + 4].try_into().unwrap())
    }

    /// File offset of `rva` using the section table.
    fn rva_to_offset(data: &[u8], rva: u32) -> usize {
        let pe = u32_at(data, 0x3C) as usize;
        let sections = u16_at(data, pe + 6) as usize;
        let table = pe + 24 + u16_at(data, pe + 20) as usize;
        for i in 0..sections {
            let header = table + i * 40;
            let va = u32_at(data, header + 12);
            let size = u32_at(data, header + 8);
            if rva >= va && rva < va + size {
                return (rva - va + u32_at(data, header + 20)) as usize;
            }
        }
        panic!("rva 0x{rva:x} not mapped");
    }

    fn build(module: &ModuleBuilder, external_pdb: bool) -> SerializedImage {
        build_image(module, external_pdb, &DiagnosticBag::new(), &CancellationToken::none())
            .unwrap()
            .unwrap()
    }

    const PROGRAM: &str = "class Program { static void Main() { int x = 1; x = x + 2; } }";

    #[test]
    fn test_image_headers() {
        let module = module(
            PROGRAM,
            CompilationOptions::new(OutputKind::ConsoleApplication),
            EmitOptions::default(),
        );
        let image = build(&module, false).pe;
        assert_eq!(&image[..2], b"MZ");
        let pe = u32_at(&image, 0x3C) as usize;
        assert_eq!(&image[pe..pe + 4], b"PE\0\0");
        assert_eq!(u16_at(&image, pe + 4), 0x014c);
        assert_eq!(u16_at(&image, pe + 24), 0x10B);
        // .text and .reloc
        assert_eq!(u16_at(&image, pe + 6), 2);
        assert_eq!(image.len() % 0x200, 0);

        // CLI header -> metadata root
        let cli_rva = u32_at(&image, pe + 24 + 96 + 14 * 8);
        let cli = rva_to_offset(&image, cli_rva);
        assert_eq!(u32_at(&image, cli), 72);
        let metadata = rva_to_offset(&image, u32_at(&image, cli + 8));
        assert_eq!(&image[metadata..metadata + 4], b"BSJB");
        let entry_point = Token(u32_at(&image, cli + 20));
        assert_eq!(entry_point.table(), 0x06);
    }

    #[test]
    fn test_pe32_plus_has_no_startup_stub() {
        let options = CompilationOptions::new(OutputKind::DynamicallyLinkedLibrary)
            .with_platform(Platform::X64);
        let module = module("public class C {}", options, EmitOptions::default());
        let image = build(&module, false).pe;
        let pe = u32_at(&image, 0x3C) as usize;
        assert_eq!(u16_at(&image, pe + 4), 0x8664);
        assert_eq!(u16_at(&image, pe + 24), 0x20B);
        assert_eq!(u16_at(&image, pe + 6), 1);
        // AddressOfEntryPoint
        assert_eq!(u32_at(&image, pe + 24 + 16), 0);
    }

    #[test]
    fn test_deterministic_output_is_stable() {
        let options = CompilationOptions::new(OutputKind::ConsoleApplication).with_deterministic(true);
        let first = build(&module(PROGRAM, options.clone(), EmitOptions::default()), true);
        let second = build(&module(PROGRAM, options.clone(), EmitOptions::default()), true);
        assert_eq!(first.pe, second.pe);
        assert_eq!(first.pdb, second.pdb);

        let changed = build(
            &module(
                "class Program { static void Main() { int x = 2; } }",
                options,
                EmitOptions::default(),
            ),
            true,
        );
        assert_ne!(first.pe, changed.pe);

        let pe = u32_at(&first.pe, 0x3C) as usize;
        assert_ne!(u32_at(&first.pe, pe + 8) & 0x8000_0000, 0);
    }

    #[test]
    fn test_pdb_written_and_referenced() {
        let options = CompilationOptions::new(OutputKind::ConsoleApplication).with_deterministic(true);
        let image = build(&module(PROGRAM, options, EmitOptions::default()), true);
        let pdb = image.pdb.unwrap();
        assert_eq!(&pdb[..4], b"BSJB");
        let needle = b"RSDS";
        let position = image
            .pe
            .windows(4)
            .position(|w| w == needle)
            .unwrap();
        // The CodeView GUID matches the first 16 bytes of the PDB id
        let guid = &image.pe[position + 4..position + 20];
        let pdb_stream = pdb.windows(4).position(|w| w == b"#Pdb").unwrap();
        let pdb_offset = u32_at(&pdb, pdb_stream - 8) as usize;
        assert_eq!(&pdb[pdb_offset..pdb_offset + 16], guid);
    }

    #[test]
    fn test_embedded_pdb() {
        let emit_options =
            EmitOptions::default().with_debug_information_format(DebugInformationFormat::Embedded);
        let module = module(
            PROGRAM,
            CompilationOptions::new(OutputKind::ConsoleApplication),
            emit_options,
        );
        let image = build(&module, false);
        assert!(image.pdb.is_none());
        assert!(image.pe.windows(4).any(|w| w == b"MPDB"));
    }

    #[test]
    fn test_signing_without_provider_is_reported() {
        let options = CompilationOptions::new(OutputKind::DynamicallyLinkedLibrary)
            .with_crypto_key_file(Some("key.snk"));
        let module = module("public class C {}", options, EmitOptions::default());
        let bag = DiagnosticBag::new();
        let result = build_image(&module, false, &bag, &CancellationToken::none()).unwrap();
        assert!(result.is_none());
        assert_eq!(bag.iter().next().unwrap().id(), ErrorCode::SigningFailed.id());
    }

    #[test]
    fn test_embedded_pdb_is_deflated() {
        use std::io::Read;

        let data: Vec<u8> = b"BSJB".iter().copied().cycle().take(0x1_0000).collect();
        let deflated = deflate(&data).unwrap();
        assert!(deflated.len() < data.len() / 10);
        assert_eq!(deflate(&data).unwrap(), deflated);

        let mut inflated = Vec::new();
        flate2::read::DeflateDecoder::new(deflated.as_slice())
            .read_to_end(&mut inflated)
            .unwrap();
        assert_eq!(inflated, data);
    }
}
