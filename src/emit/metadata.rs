//! CLI metadata writer: heaps, tables, signatures and the metadata root.
//!
//! [`MetadataBuilder`] collects rows for one image or one edit-and-continue delta.
//! Definitions are registered by stable keys (type metadata names, method signature
//! keys, qualified field names) so that a delta can seed the maps from a baseline and
//! keep the row numbers of an earlier generation. References to other assemblies
//! create `AssemblyRef`, `TypeRef`, `TypeSpec` and `MemberRef` rows on first use.
//!
//! Full images use the compressed `#~` table stream with the narrowest index sizes.
//! Deltas use the uncompressed `#-` stream with 4-byte indices throughout, signalled
//! by an empty `#JTD` stream.
//!
//! # Reference
//! - [ECMA-335 II.22 - II.24](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use std::{collections::HashMap, fmt, sync::Arc};

use bitflags::bitflags;
use uguid::Guid;
use widestring::U16String;

use crate::{
    emit::codegen::{encode_method_body_header, MethodBody, TokenRef},
    references::AssemblyIdentity,
    symbols::{
        Accessibility, AssemblySymbol, FieldSymbol, MethodKind, MethodSymbol, NamedTypeSymbol,
        SpecialType, TypeKind, TypeSymbol,
    },
    utils::align_to_4_bytes,
    Error, Result,
};

/// Table id byte of user string tokens (`ldstr` operands).
pub(crate) const USER_STRING_TOKEN_TABLE: u8 = 0x70;

const METADATA_SIGNATURE: u32 = 0x424A_5342;
const SORTED_TABLES: u64 = 0x0000_1600_3301_FA00;
const SORTED_PDB_TABLES: u64 = 1 << 0x37;

/// A metadata token: table id in the high byte, row in the low 24 bits.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Token(pub u32);

impl Token {
    /// Token of `row` in table `table`.
    #[must_use]
    pub fn new(table: u8, row: u32) -> Self {
        Token((u32::from(table) << 24) | (row & 0x00FF_FFFF))
    }

    /// Raw value.
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Table id.
    #[must_use]
    pub fn table(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Row number (1-based; 0 is the null row).
    #[must_use]
    pub fn row(&self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    /// `true` for the null token.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl From<u32> for Token {
    fn from(value: u32) -> Self {
        Token(value)
    }
}

impl From<Token> for u32 {
    fn from(token: Token) -> Self {
        token.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Token(0x{:08x}, table: 0x{:02x}, row: {})",
            self.0,
            self.table(),
            self.row()
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

/// Metadata tables written by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub(crate) enum TableId {
    Module = 0x00,
    TypeRef = 0x01,
    TypeDef = 0x02,
    Field = 0x04,
    MethodDef = 0x06,
    Param = 0x08,
    MemberRef = 0x0A,
    StandAloneSig = 0x11,
    ModuleRef = 0x1A,
    TypeSpec = 0x1B,
    EncLog = 0x1E,
    EncMap = 0x1F,
    Assembly = 0x20,
    AssemblyRef = 0x23,
    File = 0x26,
    ExportedType = 0x27,
    ManifestResource = 0x28,
    Document = 0x30,
    MethodDebugInformation = 0x31,
    CustomDebugInformation = 0x37,
}

impl TableId {
    pub(crate) fn token(self, row: u32) -> Token {
        Token::new(self as u8, row)
    }
}

/// Tables a coded index can point into with their tags. ECMA-335 II.24.2.6 and the
/// portable PDB format for `HasCustomDebugInformation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CodedIndexKind {
    TypeDefOrRef,
    ResolutionScope,
    MemberRefParent,
    Implementation,
    HasCustomDebugInformation,
}

impl CodedIndexKind {
    fn tables(self) -> &'static [(TableId, u32)] {
        match self {
            CodedIndexKind::TypeDefOrRef => &[
                (TableId::TypeDef, 0),
                (TableId::TypeRef, 1),
                (TableId::TypeSpec, 2),
            ],
            CodedIndexKind::ResolutionScope => &[
                (TableId::Module, 0),
                (TableId::ModuleRef, 1),
                (TableId::AssemblyRef, 2),
                (TableId::TypeRef, 3),
            ],
            CodedIndexKind::MemberRefParent => &[
                (TableId::TypeDef, 0),
                (TableId::TypeRef, 1),
                (TableId::ModuleRef, 2),
                (TableId::MethodDef, 3),
                (TableId::TypeSpec, 4),
            ],
            CodedIndexKind::Implementation => &[
                (TableId::File, 0),
                (TableId::AssemblyRef, 1),
                (TableId::ExportedType, 2),
            ],
            CodedIndexKind::HasCustomDebugInformation => &[
                (TableId::MethodDef, 0),
                (TableId::Field, 1),
                (TableId::TypeRef, 2),
                (TableId::TypeDef, 3),
                (TableId::Param, 4),
                (TableId::MemberRef, 6),
                (TableId::Module, 7),
                (TableId::StandAloneSig, 11),
                (TableId::ModuleRef, 12),
                (TableId::TypeSpec, 13),
                (TableId::Assembly, 14),
                (TableId::AssemblyRef, 15),
                (TableId::File, 16),
                (TableId::ExportedType, 17),
                (TableId::ManifestResource, 18),
                (TableId::Document, 22),
            ],
        }
    }

    fn tag_bits(self) -> u32 {
        match self {
            CodedIndexKind::MemberRefParent => 3,
            CodedIndexKind::HasCustomDebugInformation => 5,
            _ => 2,
        }
    }

    pub(crate) fn encode(self, table: TableId, row: u32) -> Result<u32> {
        let (_, tag) = self
            .tables()
            .iter()
            .find(|(t, _)| *t == table)
            .ok_or_else(|| malformed_error!("{:?} cannot be encoded as {:?}", table, self))?;
        Ok((row << self.tag_bits()) | tag)
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) struct TypeAttributes: u32 {
        const PUBLIC = 0x0000_0001;
        const SEQUENTIAL_LAYOUT = 0x0000_0008;
        const INTERFACE = 0x0000_0020;
        const ABSTRACT = 0x0000_0080;
        const SEALED = 0x0000_0100;
        const BEFORE_FIELD_INIT = 0x0010_0000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) struct MethodAttributes: u16 {
        const PRIVATE = 0x0001;
        const FAM_AND_ASSEM = 0x0002;
        const ASSEMBLY = 0x0003;
        const FAMILY = 0x0004;
        const FAM_OR_ASSEM = 0x0005;
        const PUBLIC = 0x0006;
        const STATIC = 0x0010;
        const FINAL = 0x0020;
        const VIRTUAL = 0x0040;
        const HIDE_BY_SIG = 0x0080;
        const NEW_SLOT = 0x0100;
        const ABSTRACT = 0x0400;
        const SPECIAL_NAME = 0x0800;
        const RT_SPECIAL_NAME = 0x1000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) struct FieldAttributes: u16 {
        const PRIVATE = 0x0001;
        const FAM_AND_ASSEM = 0x0002;
        const ASSEMBLY = 0x0003;
        const FAMILY = 0x0004;
        const FAM_OR_ASSEM = 0x0005;
        const PUBLIC = 0x0006;
        const STATIC = 0x0010;
    }
}

mod element {
    pub const VOID: u8 = 0x01;
    pub const BOOLEAN: u8 = 0x02;
    pub const I4: u8 = 0x08;
    pub const STRING: u8 = 0x0E;
    pub const PTR: u8 = 0x0F;
    pub const VALUETYPE: u8 = 0x11;
    pub const CLASS: u8 = 0x12;
    pub const ARRAY: u8 = 0x14;
    pub const GENERICINST: u8 = 0x15;
    pub const OBJECT: u8 = 0x1C;
    pub const SZARRAY: u8 = 0x1D;
}

const SIG_HASTHIS: u8 = 0x20;
const SIG_FIELD: u8 = 0x06;
const SIG_LOCALS: u8 = 0x07;

/// Writes `value` as an ECMA-335 compressed unsigned integer (II.23.2).
///
/// # Errors
///
/// Returns [`Error::Malformed`] for values above `0x1FFF_FFFF`.
pub(crate) fn write_compressed_uint(value: u32, out: &mut Vec<u8>) -> Result<()> {
    if value < 0x80 {
        out.push(value as u8);
    } else if value < 0x4000 {
        out.extend_from_slice(&((value as u16) | 0x8000).to_be_bytes());
    } else if value < 0x2000_0000 {
        out.extend_from_slice(&(value | 0xC000_0000).to_be_bytes());
    } else {
        return Err(malformed_error!("{} does not fit a compressed integer", value));
    }
    Ok(())
}

/// Writes `value` as an ECMA-335 compressed signed integer (II.23.2).
///
/// # Errors
///
/// Returns [`Error::Malformed`] for values outside `-2^28 .. 2^28`.
pub(crate) fn write_compressed_int(value: i32, out: &mut Vec<u8>) -> Result<()> {
    let rotate = |mask: u32| ((value << 1) as u32 & mask) | u32::from(value < 0);
    if (-0x40..0x40).contains(&value) {
        out.push(rotate(0x7F) as u8);
    } else if (-0x2000..0x2000).contains(&value) {
        out.extend_from_slice(&((rotate(0x3FFF) as u16) | 0x8000).to_be_bytes());
    } else if (-0x1000_0000..0x1000_0000).contains(&value) {
        out.extend_from_slice(&(rotate(0x1FFF_FFFF) | 0xC000_0000).to_be_bytes());
    } else {
        return Err(malformed_error!("{} does not fit a compressed integer", value));
    }
    Ok(())
}

pub(crate) fn to_u32(value: usize) -> Result<u32> {
    u32::try_from(value).map_err(|_| malformed_error!("{} exceeds the metadata limits", value))
}

fn pad_to_4(data: &mut Vec<u8>) {
    let padded = align_to_4_bytes(data.len() as u64) as usize;
    data.resize(padded, 0);
}

/// `#Strings`: null-terminated UTF-8, deduplicated.
#[derive(Debug)]
pub(crate) struct StringHeap {
    data: Vec<u8>,
    start: u32,
    index: HashMap<String, u32>,
}

impl StringHeap {
    pub(crate) fn new(start: u32) -> Self {
        StringHeap {
            data: if start == 0 { vec![0] } else { Vec::new() },
            start,
            index: HashMap::new(),
        }
    }

    pub(crate) fn add(&mut self, value: &str) -> u32 {
        if value.is_empty() {
            return 0;
        }
        if let Some(&offset) = self.index.get(value) {
            return offset;
        }
        let offset = self.start + self.data.len() as u32;
        self.data.extend_from_slice(value.as_bytes());
        self.data.push(0);
        self.index.insert(value.to_string(), offset);
        offset
    }

    /// Size including every earlier generation.
    pub(crate) fn aggregate_size(&self) -> u32 {
        self.start + self.data.len() as u32
    }
}

/// `#US`: length-prefixed UTF-16 with a trailing flag byte.
#[derive(Debug)]
pub(crate) struct UserStringHeap {
    data: Vec<u8>,
    start: u32,
    index: HashMap<String, u32>,
}

impl UserStringHeap {
    pub(crate) fn new(start: u32) -> Self {
        UserStringHeap {
            data: if start == 0 { vec![0] } else { Vec::new() },
            start,
            index: HashMap::new(),
        }
    }

    pub(crate) fn add(&mut self, value: &str) -> Result<u32> {
        if let Some(&offset) = self.index.get(value) {
            return Ok(offset);
        }
        let offset = self.start + to_u32(self.data.len())?;
        let units = U16String::from_str(value);
        let units = units.as_slice();

        // Set when any unit needs more than an 8-bit comparison. ECMA-335 II.24.2.4
        let special = units.iter().any(|&u| {
            u > 0x7E
                || (0x01..=0x08).contains(&u)
                || (0x0E..=0x1F).contains(&u)
                || u == 0x27
                || u == 0x2D
        });

        write_compressed_uint(to_u32(units.len() * 2 + 1)?, &mut self.data)?;
        for unit in units {
            self.data.extend_from_slice(&unit.to_le_bytes());
        }
        self.data.push(u8::from(special));
        self.index.insert(value.to_string(), offset);
        Ok(offset)
    }

    pub(crate) fn aggregate_size(&self) -> u32 {
        self.start + self.data.len() as u32
    }
}

/// `#Blob`: length-prefixed byte sequences, deduplicated.
#[derive(Debug)]
pub(crate) struct BlobHeap {
    data: Vec<u8>,
    start: u32,
    index: HashMap<Vec<u8>, u32>,
}

impl BlobHeap {
    pub(crate) fn new(start: u32) -> Self {
        BlobHeap {
            data: if start == 0 { vec![0] } else { Vec::new() },
            start,
            index: HashMap::new(),
        }
    }

    pub(crate) fn add(&mut self, value: &[u8]) -> Result<u32> {
        if value.is_empty() {
            return Ok(0);
        }
        if let Some(&offset) = self.index.get(value) {
            return Ok(offset);
        }
        let offset = self.start + to_u32(self.data.len())?;
        write_compressed_uint(to_u32(value.len())?, &mut self.data)?;
        self.data.extend_from_slice(value);
        self.index.insert(value.to_vec(), offset);
        Ok(offset)
    }

    pub(crate) fn aggregate_size(&self) -> u32 {
        self.start + self.data.len() as u32
    }
}

/// `#GUID`: 16-byte entries addressed by 1-based index.
#[derive(Debug)]
pub(crate) struct GuidHeap {
    guids: Vec<Guid>,
    start: u32,
}

impl GuidHeap {
    pub(crate) fn new(start: u32) -> Self {
        GuidHeap {
            guids: Vec::new(),
            start,
        }
    }

    pub(crate) fn add(&mut self, guid: Guid) -> u32 {
        self.guids.push(guid);
        self.start + self.guids.len() as u32
    }

    pub(crate) fn aggregate_count(&self) -> u32 {
        self.start + self.guids.len() as u32
    }

    fn bytes(&self) -> Vec<u8> {
        self.guids.iter().flat_map(|g| g.to_bytes()).collect()
    }
}

/// One column value of a row.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Column {
    U16(u16),
    U32(u32),
    String(u32),
    Guid(u32),
    Blob(u32),
    Table(TableId, u32),
    Coded(CodedIndexKind, TableId, u32),
    /// Offset of a method body in the IL stream; relocated when serialized.
    BodyOffset(Option<u32>),
}

#[derive(Debug, Clone)]
pub(crate) struct Row {
    pub(crate) rid: u32,
    pub(crate) columns: Vec<Column>,
}

/// Index widths of one serialization.
struct IndexSizes {
    wide_strings: bool,
    wide_guids: bool,
    wide_blobs: bool,
    row_counts: [u32; 64],
    all_wide: bool,
}

impl IndexSizes {
    fn heap_flags(&self) -> u8 {
        let mut flags = 0;
        if self.wide_strings {
            flags |= 0x01;
        }
        if self.wide_guids {
            flags |= 0x02;
        }
        if self.wide_blobs {
            flags |= 0x04;
        }
        if self.all_wide {
            flags |= 0x20;
        }
        flags
    }

    fn table_is_wide(&self, table: TableId) -> bool {
        self.all_wide || self.row_counts[table as usize] >= 0x1_0000
    }

    fn coded_is_wide(&self, kind: CodedIndexKind) -> bool {
        let limit = 1u32 << (16 - kind.tag_bits());
        self.all_wide
            || kind
                .tables()
                .iter()
                .any(|(t, _)| self.row_counts[*t as usize] >= limit)
    }
}

fn write_index(out: &mut Vec<u8>, value: u32, wide: bool) -> Result<()> {
    if wide {
        out.extend_from_slice(&value.to_le_bytes());
    } else {
        let narrow =
            u16::try_from(value).map_err(|_| malformed_error!("index {} needs 4 bytes", value))?;
        out.extend_from_slice(&narrow.to_le_bytes());
    }
    Ok(())
}

/// Rows of every table, ordered by table id.
#[derive(Debug, Default)]
pub(crate) struct TableSet {
    tables: std::collections::BTreeMap<TableId, Vec<Row>>,
}

impl TableSet {
    pub(crate) fn push(&mut self, table: TableId, rid: u32, columns: Vec<Column>) {
        self.tables
            .entry(table)
            .or_default()
            .push(Row { rid, columns });
    }

    pub(crate) fn len(&self, table: TableId) -> usize {
        self.tables.get(&table).map_or(0, Vec::len)
    }

    pub(crate) fn rows(&self, table: TableId) -> &[Row] {
        self.tables.get(&table).map_or(&[], Vec::as_slice)
    }

    /// Serializes a table stream.
    ///
    /// `external_rows` are row counts of tables that live in another stream set
    /// (the type system tables a portable PDB refers to); they size indices only.
    pub(crate) fn serialize(
        &self,
        heaps: (u32, u32, u32),
        external_rows: &[u32; 64],
        all_wide: bool,
        sorted: u64,
        il_rva: u32,
    ) -> Result<Vec<u8>> {
        let (string_size, guid_count, blob_size) = heaps;
        let mut row_counts = *external_rows;
        for (table, rows) in &self.tables {
            let max_rid = rows.iter().map(|r| r.rid).max().unwrap_or(0);
            row_counts[*table as usize] = row_counts[*table as usize].max(max_rid);
        }
        let sizes = IndexSizes {
            wide_strings: all_wide || string_size >= 0x1_0000,
            wide_guids: all_wide || guid_count >= 0x1_0000,
            wide_blobs: all_wide || blob_size >= 0x1_0000,
            row_counts,
            all_wide,
        };

        let mut valid: u64 = 0;
        for (table, rows) in &self.tables {
            if !rows.is_empty() {
                valid |= 1 << (*table as u8);
            }
        }

        let mut out = Vec::new();
        out.extend_from_slice(&0u32.to_le_bytes());
        out.push(2);
        out.push(0);
        out.push(sizes.heap_flags());
        out.push(1);
        out.extend_from_slice(&valid.to_le_bytes());
        out.extend_from_slice(&(sorted & valid).to_le_bytes());
        for rows in self.tables.values().filter(|r| !r.is_empty()) {
            out.extend_from_slice(&to_u32(rows.len())?.to_le_bytes());
        }

        for rows in self.tables.values() {
            let mut ordered: Vec<&Row> = rows.iter().collect();
            ordered.sort_by_key(|r| r.rid);
            for row in ordered {
                for column in &row.columns {
                    match *column {
                        Column::U16(v) => out.extend_from_slice(&v.to_le_bytes()),
                        Column::U32(v) => out.extend_from_slice(&v.to_le_bytes()),
                        Column::String(v) => write_index(&mut out, v, sizes.wide_strings)?,
                        Column::Guid(v) => write_index(&mut out, v, sizes.wide_guids)?,
                        Column::Blob(v) => write_index(&mut out, v, sizes.wide_blobs)?,
                        Column::Table(table, v) => {
                            write_index(&mut out, v, sizes.table_is_wide(table))?;
                        }
                        Column::Coded(kind, table, v) => {
                            let encoded = if v == 0 { 0 } else { kind.encode(table, v)? };
                            write_index(&mut out, encoded, sizes.coded_is_wide(kind))?;
                        }
                        Column::BodyOffset(offset) => {
                            let rva = offset.map_or(0, |o| il_rva + o);
                            out.extend_from_slice(&rva.to_le_bytes());
                        }
                    }
                }
            }
        }
        pad_to_4(&mut out);
        Ok(out)
    }
}

/// Writes a metadata root with `streams` in order. ECMA-335 II.24.2.1.
///
/// Returns the image and the offset of every stream's data.
pub(crate) fn write_metadata_root(
    version: &str,
    streams: &[(&str, Vec<u8>)],
) -> Result<(Vec<u8>, Vec<usize>)> {
    let mut version_bytes = version.as_bytes().to_vec();
    version_bytes.push(0);
    pad_to_4(&mut version_bytes);

    let header_names: usize = streams
        .iter()
        .map(|(name, _)| align_to_4_bytes(name.len() as u64 + 1) as usize)
        .sum();
    let header_size = 16 + version_bytes.len() + 4 + streams.len() * 8 + header_names;

    let mut out = Vec::new();
    out.extend_from_slice(&METADATA_SIGNATURE.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&to_u32(version_bytes.len())?.to_le_bytes());
    out.extend_from_slice(&version_bytes);
    out.extend_from_slice(&0u16.to_le_bytes());
    let count = u16::try_from(streams.len()).map_err(|_| malformed_error!("too many streams"))?;
    out.extend_from_slice(&count.to_le_bytes());

    let mut offsets = Vec::with_capacity(streams.len());
    let mut offset = header_size;
    for (name, data) in streams {
        offsets.push(offset);
        out.extend_from_slice(&to_u32(offset)?.to_le_bytes());
        out.extend_from_slice(&to_u32(data.len())?.to_le_bytes());
        let mut name_bytes = name.as_bytes().to_vec();
        name_bytes.push(0);
        pad_to_4(&mut name_bytes);
        out.extend_from_slice(&name_bytes);
        offset += data.len();
    }
    debug_assert_eq!(out.len(), header_size);
    for (_, data) in streams {
        out.extend_from_slice(data);
    }
    Ok((out, offsets))
}

/// Row counts and heap sizes of the generations before the one being written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MetadataBase {
    pub(crate) generation: u32,
    pub(crate) row_counts: [u32; 64],
    pub(crate) string_heap_size: u32,
    pub(crate) user_string_heap_size: u32,
    pub(crate) blob_heap_size: u32,
    pub(crate) guid_count: u32,
}

impl Default for MetadataBase {
    fn default() -> Self {
        MetadataBase {
            generation: 0,
            row_counts: [0; 64],
            string_heap_size: 0,
            user_string_heap_size: 0,
            blob_heap_size: 0,
            guid_count: 0,
        }
    }
}

/// Serialized metadata and the location of the module version id inside it.
#[derive(Debug)]
pub(crate) struct SerializedMetadata {
    pub(crate) bytes: Vec<u8>,
    /// Offset of the 16 MVID bytes, patched after content hashing.
    pub(crate) mvid_offset: Option<usize>,
}

/// Rows, heaps and IL of one image or delta under construction.
pub(crate) struct MetadataBuilder {
    base: MetadataBase,
    module_assembly: Option<Arc<AssemblySymbol>>,
    pub(crate) strings: StringHeap,
    pub(crate) user_strings: UserStringHeap,
    pub(crate) blobs: BlobHeap,
    pub(crate) guids: GuidHeap,
    pub(crate) tables: TableSet,
    added: [u32; 64],
    il: Vec<u8>,
    type_defs: HashMap<String, u32>,
    method_defs: HashMap<String, u32>,
    field_defs: HashMap<String, u32>,
    type_refs: HashMap<(u32, String), u32>,
    assembly_refs: HashMap<String, u32>,
    member_refs: HashMap<(Token, String, Vec<u8>), u32>,
    type_specs: HashMap<Vec<u8>, u32>,
    stand_alone_sigs: HashMap<Vec<u8>, u32>,
    mvid_index: Option<u32>,
}

impl MetadataBuilder {
    /// Starts a builder on top of `base`; a zero base starts a full image.
    pub(crate) fn new(base: MetadataBase, module_assembly: Option<Arc<AssemblySymbol>>) -> Self {
        let is_delta = base.generation > 0;
        MetadataBuilder {
            strings: StringHeap::new(base.string_heap_size),
            user_strings: UserStringHeap::new(base.user_string_heap_size),
            blobs: BlobHeap::new(base.blob_heap_size),
            guids: GuidHeap::new(base.guid_count),
            base,
            module_assembly,
            tables: TableSet::default(),
            added: [0; 64],
            il: if is_delta { vec![0; 4] } else { Vec::new() },
            type_defs: HashMap::new(),
            method_defs: HashMap::new(),
            field_defs: HashMap::new(),
            type_refs: HashMap::new(),
            assembly_refs: HashMap::new(),
            member_refs: HashMap::new(),
            type_specs: HashMap::new(),
            stand_alone_sigs: HashMap::new(),
            mvid_index: None,
        }
    }

    pub(crate) fn is_delta(&self) -> bool {
        self.base.generation > 0
    }

    /// Row the next added row of `table` receives.
    pub(crate) fn next_row(&self, table: TableId) -> u32 {
        self.base.row_counts[table as usize] + self.added[table as usize] + 1
    }

    fn allocate(&mut self, table: TableId) -> u32 {
        let rid = self.next_row(table);
        self.added[table as usize] += 1;
        rid
    }

    /// Row counts after this generation.
    pub(crate) fn aggregate_row_counts(&self) -> [u32; 64] {
        let mut counts = self.base.row_counts;
        for (count, added) in counts.iter_mut().zip(self.added) {
            *count += added;
        }
        counts
    }

    pub(crate) fn il(&self) -> &[u8] {
        &self.il
    }

    /// Key of a type definition.
    pub(crate) fn type_key(ty: &NamedTypeSymbol) -> String {
        ty.full_metadata_name()
    }

    pub(crate) fn register_type(&mut self, key: String, rid: u32) {
        self.type_defs.insert(key, rid);
    }

    pub(crate) fn register_method(&mut self, key: String, rid: u32) {
        self.method_defs.insert(key, rid);
    }

    pub(crate) fn register_field(&mut self, key: String, rid: u32) {
        self.field_defs.insert(key, rid);
    }

    pub(crate) fn register_member_ref(&mut self, key: (Token, String, Vec<u8>), rid: u32) {
        self.member_refs.insert(key, rid);
    }

    pub(crate) fn register_type_ref(&mut self, key: (u32, String), rid: u32) {
        self.type_refs.insert(key, rid);
    }

    pub(crate) fn register_assembly_ref(&mut self, key: String, rid: u32) {
        self.assembly_refs.insert(key, rid);
    }

    pub(crate) fn type_defs(&self) -> &HashMap<String, u32> {
        &self.type_defs
    }

    pub(crate) fn method_defs(&self) -> &HashMap<String, u32> {
        &self.method_defs
    }

    pub(crate) fn field_defs(&self) -> &HashMap<String, u32> {
        &self.field_defs
    }

    pub(crate) fn member_refs(&self) -> &HashMap<(Token, String, Vec<u8>), u32> {
        &self.member_refs
    }

    pub(crate) fn type_refs(&self) -> &HashMap<(u32, String), u32> {
        &self.type_refs
    }

    pub(crate) fn assembly_refs(&self) -> &HashMap<String, u32> {
        &self.assembly_refs
    }

    /// Allocates a row for a new type definition and records it.
    pub(crate) fn reserve_type(&mut self, ty: &NamedTypeSymbol) -> u32 {
        let rid = self.allocate(TableId::TypeDef);
        self.register_type(Self::type_key(ty), rid);
        rid
    }

    /// Allocates a row for a new method definition and records it.
    pub(crate) fn reserve_method(&mut self, method: &MethodSymbol) -> u32 {
        let rid = self.allocate(TableId::MethodDef);
        self.register_method(method.signature_key(), rid);
        rid
    }

    /// Allocates a row for a new field definition and records it.
    pub(crate) fn reserve_field(&mut self, field: &FieldSymbol) -> u32 {
        let rid = self.allocate(TableId::Field);
        self.register_field(field.qualified_name(), rid);
        rid
    }

    /// Module row. The MVID is the first GUID of a full image.
    pub(crate) fn add_module(
        &mut self,
        name: &str,
        mvid_index: Option<u32>,
        mvid: Guid,
        enc_id: Option<Guid>,
        enc_base_id: Option<u32>,
    ) -> Result<()> {
        let generation = u16::try_from(self.base.generation)
            .map_err(|_| malformed_error!("too many generations"))?;
        let name = self.strings.add(name);
        let mvid = match mvid_index {
            Some(index) => index,
            None => self.guids.add(mvid),
        };
        self.mvid_index = Some(mvid);
        let enc_id = enc_id.map_or(0, |id| self.guids.add(id));
        self.tables.push(
            TableId::Module,
            1,
            vec![
                Column::U16(generation),
                Column::String(name),
                Column::Guid(mvid),
                Column::Guid(enc_id),
                Column::Guid(enc_base_id.unwrap_or(0)),
            ],
        );
        if !self.is_delta() {
            self.added[TableId::Module as usize] = 1;
        }
        Ok(())
    }

    /// The `<Module>` type that owns global members. Always row 1.
    pub(crate) fn add_module_type(&mut self) {
        let rid = self.allocate(TableId::TypeDef);
        let name = self.strings.add("<Module>");
        self.tables.push(
            TableId::TypeDef,
            rid,
            vec![
                Column::U32(0),
                Column::String(name),
                Column::String(0),
                Column::Coded(CodedIndexKind::TypeDefOrRef, TableId::TypeDef, 0),
                Column::Table(TableId::Field, self.next_row(TableId::Field)),
                Column::Table(TableId::MethodDef, self.next_row(TableId::MethodDef)),
            ],
        );
    }

    /// Assembly row of this image.
    pub(crate) fn add_assembly(&mut self, identity: &AssemblyIdentity) -> Result<()> {
        let version = identity.version();
        let public_key = self.blobs.add(identity.public_key())?;
        let name = self.strings.add(identity.name());
        let culture = self.strings.add(identity.culture().unwrap_or(""));
        let flags: u32 = if identity.public_key().is_empty() { 0 } else { 0x0001 };
        self.tables.push(
            TableId::Assembly,
            1,
            vec![
                // SHA1
                Column::U32(0x8004),
                Column::U16(version.major),
                Column::U16(version.minor),
                Column::U16(version.build),
                Column::U16(version.revision),
                Column::U32(flags),
                Column::Blob(public_key),
                Column::String(name),
                Column::String(culture),
            ],
        );
        self.added[TableId::Assembly as usize] = 1;
        Ok(())
    }

    /// TypeDef row of a type reserved with [`MetadataBuilder::reserve_type`].
    pub(crate) fn add_type_def(
        &mut self,
        rid: u32,
        ty: &NamedTypeSymbol,
        field_list: u32,
        method_list: u32,
    ) -> Result<()> {
        let extends = match ty.base_type() {
            Some(base) if ty.type_kind() != TypeKind::Interface => {
                let token = self.type_token(&base)?;
                Column::Coded(
                    CodedIndexKind::TypeDefOrRef,
                    table_of(token)?,
                    token.row(),
                )
            }
            _ => Column::Coded(CodedIndexKind::TypeDefOrRef, TableId::TypeDef, 0),
        };
        let flags = type_attributes(ty);
        let name = self.strings.add(&ty.metadata_name());
        let namespace = self.strings.add(ty.namespace());
        self.tables.push(
            TableId::TypeDef,
            rid,
            vec![
                Column::U32(flags.bits()),
                Column::String(name),
                Column::String(namespace),
                extends,
                Column::Table(TableId::Field, field_list),
                Column::Table(TableId::MethodDef, method_list),
            ],
        );
        Ok(())
    }

    /// Field row of a field reserved with [`MetadataBuilder::reserve_field`].
    pub(crate) fn add_field_def(&mut self, rid: u32, field: &FieldSymbol) -> Result<()> {
        let signature = self.field_signature(field)?;
        let signature = self.blobs.add(&signature)?;
        let name = self.strings.add(field.name());
        self.tables.push(
            TableId::Field,
            rid,
            vec![
                Column::U16(field_attributes(field).bits()),
                Column::String(name),
                Column::Blob(signature),
            ],
        );
        Ok(())
    }

    /// MethodDef row of a method reserved with [`MetadataBuilder::reserve_method`],
    /// its body and, when `with_params` is set, its Param rows.
    ///
    /// Returns the tokens of the added Param rows.
    pub(crate) fn add_method_def(
        &mut self,
        rid: u32,
        method: &MethodSymbol,
        body: Option<&MethodBody>,
        with_params: bool,
    ) -> Result<Vec<Token>> {
        let body_offset = match body {
            Some(body) => Some(self.add_method_body(body)?),
            None => None,
        };
        let signature = self.method_signature(method)?;
        let signature = self.blobs.add(&signature)?;
        let name = self.strings.add(method.name());
        let param_list = self.next_row(TableId::Param);
        self.tables.push(
            TableId::MethodDef,
            rid,
            vec![
                Column::BodyOffset(body_offset),
                Column::U16(0),
                Column::U16(method_attributes(method).bits()),
                Column::String(name),
                Column::Blob(signature),
                Column::Table(TableId::Param, param_list),
            ],
        );

        let mut params = Vec::new();
        if with_params {
            for parameter in method.parameters() {
                let rid = self.allocate(TableId::Param);
                let sequence = u16::try_from(parameter.ordinal() + 1)
                    .map_err(|_| malformed_error!("too many parameters"))?;
                let name = self.strings.add(parameter.name());
                self.tables.push(
                    TableId::Param,
                    rid,
                    vec![Column::U16(0), Column::U16(sequence), Column::String(name)],
                );
                params.push(TableId::Param.token(rid));
            }
        }
        Ok(params)
    }

    /// File row for a linked resource.
    pub(crate) fn add_file(&mut self, name: &str, hash: &[u8]) -> Result<u32> {
        let rid = self.allocate(TableId::File);
        let name = self.strings.add(name);
        let hash = self.blobs.add(hash)?;
        self.tables.push(
            TableId::File,
            rid,
            // ContainsNoMetaData
            vec![Column::U32(0x0001), Column::String(name), Column::Blob(hash)],
        );
        Ok(rid)
    }

    /// ManifestResource row; `file` is the File row of a linked resource.
    pub(crate) fn add_manifest_resource(
        &mut self,
        name: &str,
        is_public: bool,
        offset: u32,
        file: Option<u32>,
    ) {
        let rid = self.allocate(TableId::ManifestResource);
        let name = self.strings.add(name);
        let flags: u32 = if is_public { 0x0001 } else { 0x0002 };
        self.tables.push(
            TableId::ManifestResource,
            rid,
            vec![
                Column::U32(offset),
                Column::U32(flags),
                Column::String(name),
                Column::Coded(CodedIndexKind::Implementation, TableId::File, file.unwrap_or(0)),
            ],
        );
    }

    pub(crate) fn add_enc_log(&mut self, token: Token, func: u32) {
        let rid = self.allocate(TableId::EncLog);
        self.tables
            .push(TableId::EncLog, rid, vec![Column::U32(token.value()), Column::U32(func)]);
    }

    pub(crate) fn add_enc_map(&mut self, token: Token) {
        let rid = self.allocate(TableId::EncMap);
        self.tables
            .push(TableId::EncMap, rid, vec![Column::U32(token.value())]);
    }

    /// Every row added to a table other than the EnC tables themselves.
    pub(crate) fn added_tokens(&self) -> Vec<Token> {
        let mut tokens = Vec::new();
        for table in [
            TableId::Module,
            TableId::TypeRef,
            TableId::TypeDef,
            TableId::Field,
            TableId::MethodDef,
            TableId::Param,
            TableId::MemberRef,
            TableId::StandAloneSig,
            TableId::TypeSpec,
            TableId::AssemblyRef,
        ] {
            for row in self.tables.rows(table) {
                tokens.push(table.token(row.rid));
            }
        }
        tokens.sort();
        tokens
    }

    /// Definition token of a source method.
    pub(crate) fn method_def_token(&self, method: &MethodSymbol) -> Option<Token> {
        self.method_defs
            .get(&method.signature_key())
            .map(|&rid| TableId::MethodDef.token(rid))
    }

    fn is_local(&self, ty: &NamedTypeSymbol) -> bool {
        self.module_assembly
            .as_ref()
            .is_some_and(|assembly| ty.is_in_assembly(assembly))
    }

    /// Encodes `body` into the IL stream and returns its offset.
    fn add_method_body(&mut self, body: &MethodBody) -> Result<u32> {
        let local_sig = if body.locals.is_empty() {
            0
        } else {
            let mut signature = vec![SIG_LOCALS];
            write_compressed_uint(to_u32(body.locals.len())?, &mut signature)?;
            for local in &body.locals {
                self.encode_type(local, &mut signature)?;
            }
            self.stand_alone_sig(signature)?.value()
        };

        let mut il = body.il.clone();
        for (offset, target) in &body.fixups {
            let token = self.resolve(target)?;
            il.get_mut(*offset..*offset + 4)
                .ok_or_else(|| malformed_error!("token fixup at {} is outside the body", offset))?
                .copy_from_slice(&token.value().to_le_bytes());
        }

        let header = encode_method_body_header(il.len(), body.max_stack, local_sig, false)?;
        if header.len() > 1 {
            pad_to_4(&mut self.il);
        }
        let offset = to_u32(self.il.len())?;
        self.il.extend_from_slice(&header);
        self.il.extend_from_slice(&il);
        Ok(offset)
    }

    fn stand_alone_sig(&mut self, signature: Vec<u8>) -> Result<Token> {
        if let Some(&rid) = self.stand_alone_sigs.get(&signature) {
            return Ok(TableId::StandAloneSig.token(rid));
        }
        let blob = self.blobs.add(&signature)?;
        let rid = self.allocate(TableId::StandAloneSig);
        self.tables
            .push(TableId::StandAloneSig, rid, vec![Column::Blob(blob)]);
        self.stand_alone_sigs.insert(signature, rid);
        Ok(TableId::StandAloneSig.token(rid))
    }

    /// Token of an instruction operand.
    pub(crate) fn resolve(&mut self, target: &TokenRef) -> Result<Token> {
        match target {
            TokenRef::Type(ty) => self.type_token(ty),
            TokenRef::Method(method) => self.method_token(method),
            TokenRef::Field(field) => self.field_token(field),
            TokenRef::String(value) => Ok(Token::new(
                USER_STRING_TOKEN_TABLE,
                self.user_strings.add(value)?,
            )),
        }
    }

    /// TypeDef, TypeRef or TypeSpec token of `ty`.
    pub(crate) fn type_token(&mut self, ty: &TypeSymbol) -> Result<Token> {
        match ty {
            TypeSymbol::Named(named)
                if named.original_definition().is_none() && !named.is_error() =>
            {
                self.type_def_or_ref(named)
            }
            _ => {
                let mut signature = Vec::new();
                self.encode_type(ty, &mut signature)?;
                self.type_spec(signature)
            }
        }
    }

    fn type_spec(&mut self, signature: Vec<u8>) -> Result<Token> {
        if let Some(&rid) = self.type_specs.get(&signature) {
            return Ok(TableId::TypeSpec.token(rid));
        }
        let blob = self.blobs.add(&signature)?;
        let rid = self.allocate(TableId::TypeSpec);
        self.tables.push(TableId::TypeSpec, rid, vec![Column::Blob(blob)]);
        self.type_specs.insert(signature, rid);
        Ok(TableId::TypeSpec.token(rid))
    }

    fn type_def_or_ref(&mut self, ty: &NamedTypeSymbol) -> Result<Token> {
        if self.is_local(ty) {
            return self
                .type_defs
                .get(&Self::type_key(ty))
                .map(|&rid| TableId::TypeDef.token(rid))
                .ok_or_else(|| {
                    Error::InvalidOperation(format!(
                        "type '{}' is not defined in this module",
                        ty.full_name()
                    ))
                });
        }

        let scope = match ty.containing_assembly() {
            Some(assembly) => TableId::AssemblyRef.token(self.assembly_ref(assembly.identity())?),
            None => TableId::Module.token(1),
        };
        let key = (scope.value(), Self::type_key(ty));
        if let Some(&rid) = self.type_refs.get(&key) {
            return Ok(TableId::TypeRef.token(rid));
        }
        let name = self.strings.add(&ty.metadata_name());
        let namespace = self.strings.add(ty.namespace());
        let rid = self.allocate(TableId::TypeRef);
        self.tables.push(
            TableId::TypeRef,
            rid,
            vec![
                Column::Coded(CodedIndexKind::ResolutionScope, table_of(scope)?, scope.row()),
                Column::String(name),
                Column::String(namespace),
            ],
        );
        self.type_refs.insert(key, rid);
        Ok(TableId::TypeRef.token(rid))
    }

    fn assembly_ref(&mut self, identity: &AssemblyIdentity) -> Result<u32> {
        let key = identity.display_name();
        if let Some(&rid) = self.assembly_refs.get(&key) {
            return Ok(rid);
        }
        let version = identity.version();
        let key_or_token = match identity.public_key_token() {
            Some(token) => self.blobs.add(&token)?,
            None => 0,
        };
        let name = self.strings.add(identity.name());
        let culture = self.strings.add(identity.culture().unwrap_or(""));
        let rid = self.allocate(TableId::AssemblyRef);
        self.tables.push(
            TableId::AssemblyRef,
            rid,
            vec![
                Column::U16(version.major),
                Column::U16(version.minor),
                Column::U16(version.build),
                Column::U16(version.revision),
                Column::U32(0),
                Column::Blob(key_or_token),
                Column::String(name),
                Column::String(culture),
                Column::Blob(0),
            ],
        );
        self.assembly_refs.insert(key, rid);
        Ok(rid)
    }

    /// MethodDef token of a local method, MemberRef token otherwise.
    pub(crate) fn method_token(&mut self, method: &MethodSymbol) -> Result<Token> {
        let owner = method.containing_type().ok_or_else(|| {
            Error::InvalidOperation(format!("'{}' has no containing type", method.name()))
        })?;
        if self.is_local(&owner) {
            return self.method_def_token(method).ok_or_else(|| {
                Error::InvalidOperation(format!(
                    "method '{}' is not defined in this module",
                    method.signature_key()
                ))
            });
        }
        let signature = self.method_signature(method)?;
        self.member_ref(&owner, method.name(), signature)
    }

    /// Field token of a local field, MemberRef token otherwise.
    pub(crate) fn field_token(&mut self, field: &FieldSymbol) -> Result<Token> {
        let owner = field.containing_type().ok_or_else(|| {
            Error::InvalidOperation(format!("'{}' has no containing type", field.name()))
        })?;
        if self.is_local(&owner) {
            return self
                .field_defs
                .get(&field.qualified_name())
                .map(|&rid| TableId::Field.token(rid))
                .ok_or_else(|| {
                    Error::InvalidOperation(format!(
                        "field '{}' is not defined in this module",
                        field.qualified_name()
                    ))
                });
        }
        let signature = self.field_signature(field)?;
        self.member_ref(&owner, field.name(), signature)
    }

    fn member_ref(
        &mut self,
        owner: &Arc<NamedTypeSymbol>,
        name: &str,
        signature: Vec<u8>,
    ) -> Result<Token> {
        let parent = self.type_token(&TypeSymbol::Named(Arc::clone(owner)))?;
        let key = (parent, name.to_string(), signature);
        if let Some(&rid) = self.member_refs.get(&key) {
            return Ok(TableId::MemberRef.token(rid));
        }
        let blob = self.blobs.add(&key.2)?;
        let name = self.strings.add(name);
        let rid = self.allocate(TableId::MemberRef);
        self.tables.push(
            TableId::MemberRef,
            rid,
            vec![
                Column::Coded(CodedIndexKind::MemberRefParent, table_of(parent)?, parent.row()),
                Column::String(name),
                Column::Blob(blob),
            ],
        );
        self.member_refs.insert(key, rid);
        Ok(TableId::MemberRef.token(rid))
    }

    /// Method signature blob. ECMA-335 II.23.2.1.
    pub(crate) fn method_signature(&mut self, method: &MethodSymbol) -> Result<Vec<u8>> {
        let mut signature = vec![if method.is_static() { 0 } else { SIG_HASTHIS }];
        write_compressed_uint(to_u32(method.parameters().len())?, &mut signature)?;
        self.encode_type(method.return_type(), &mut signature)?;
        for parameter in method.parameters() {
            self.encode_type(parameter.parameter_type(), &mut signature)?;
        }
        Ok(signature)
    }

    /// Field signature blob. ECMA-335 II.23.2.4.
    pub(crate) fn field_signature(&mut self, field: &FieldSymbol) -> Result<Vec<u8>> {
        let mut signature = vec![SIG_FIELD];
        self.encode_type(field.field_type(), &mut signature)?;
        Ok(signature)
    }

    /// Appends the encoding of `ty`. Error types encode as `object`.
    pub(crate) fn encode_type(&mut self, ty: &TypeSymbol, out: &mut Vec<u8>) -> Result<()> {
        match ty {
            TypeSymbol::Named(named) => {
                if named.is_error() {
                    out.push(element::OBJECT);
                    return Ok(());
                }
                let primitive = match named.special_type() {
                    SpecialType::Void => Some(element::VOID),
                    SpecialType::Boolean => Some(element::BOOLEAN),
                    SpecialType::Int32 => Some(element::I4),
                    SpecialType::String => Some(element::STRING),
                    SpecialType::Object => Some(element::OBJECT),
                    _ => None,
                };
                if let Some(primitive) = primitive {
                    out.push(primitive);
                    return Ok(());
                }

                match named.original_definition() {
                    Some(definition) => {
                        out.push(element::GENERICINST);
                        out.push(class_or_value_type(definition));
                        let token = self.type_def_or_ref(definition)?;
                        write_compressed_uint(type_def_or_ref_encoded(token)?, out)?;
                        write_compressed_uint(to_u32(named.type_arguments().len())?, out)?;
                        for argument in named.type_arguments() {
                            self.encode_type(argument, out)?;
                        }
                    }
                    None => {
                        out.push(class_or_value_type(named));
                        let token = self.type_def_or_ref(named)?;
                        write_compressed_uint(type_def_or_ref_encoded(token)?, out)?;
                    }
                }
            }
            TypeSymbol::Array(array) => {
                if array.rank() == 1 {
                    out.push(element::SZARRAY);
                    self.encode_type(array.element_type(), out)?;
                } else {
                    out.push(element::ARRAY);
                    self.encode_type(array.element_type(), out)?;
                    let rank = to_u32(array.rank())?;
                    write_compressed_uint(rank, out)?;
                    write_compressed_uint(0, out)?;
                    write_compressed_uint(rank, out)?;
                    for _ in 0..rank {
                        write_compressed_int(0, out)?;
                    }
                }
            }
            TypeSymbol::Pointer(pointer) => {
                out.push(element::PTR);
                self.encode_type(pointer.pointed_at_type(), out)?;
            }
        }
        Ok(())
    }

    /// Serializes heaps and tables into a metadata root.
    ///
    /// `il_rva` relocates method body offsets; deltas pass zero.
    pub(crate) fn serialize(&self, version: &str, il_rva: u32) -> Result<SerializedMetadata> {
        let is_delta = self.is_delta();
        let tables = self.tables.serialize(
            (
                self.strings.aggregate_size(),
                self.guids.aggregate_count(),
                self.blobs.aggregate_size(),
            ),
            &[0; 64],
            is_delta,
            if is_delta { 0 } else { SORTED_TABLES },
            il_rva,
        )?;

        let mut streams: Vec<(&str, Vec<u8>)> = vec![(if is_delta { "#-" } else { "#~" }, tables)];
        streams.extend(self.heap_streams());
        if is_delta {
            streams.push(("#JTD", Vec::new()));
        }
        let (bytes, offsets) = write_metadata_root(version, &streams)?;

        let mvid_offset = match self.mvid_index {
            Some(index) if !is_delta && index > self.base.guid_count => {
                Some(offsets[3] + (index - self.base.guid_count - 1) as usize * 16)
            }
            _ => None,
        };
        Ok(SerializedMetadata { bytes, mvid_offset })
    }

    /// Serializes as a portable PDB: `pdb_stream` first, then tables whose indices
    /// into the image's tables are sized by `type_system_rows`.
    ///
    /// Returns the bytes and the offset of the `#Pdb` stream.
    pub(crate) fn serialize_pdb(
        &self,
        pdb_stream: Vec<u8>,
        type_system_rows: &[u32; 64],
    ) -> Result<(Vec<u8>, usize)> {
        let tables = self.tables.serialize(
            (
                self.strings.aggregate_size(),
                self.guids.aggregate_count(),
                self.blobs.aggregate_size(),
            ),
            type_system_rows,
            false,
            SORTED_PDB_TABLES,
            0,
        )?;
        let mut streams: Vec<(&str, Vec<u8>)> = vec![("#Pdb", pdb_stream), ("#~", tables)];
        streams.extend(self.heap_streams());
        let (bytes, offsets) = write_metadata_root("PDB v1.0", &streams)?;
        Ok((bytes, offsets[0]))
    }

    fn heap_streams(&self) -> [(&'static str, Vec<u8>); 4] {
        let mut strings = self.strings.data.clone();
        pad_to_4(&mut strings);
        let mut user_strings = self.user_strings.data.clone();
        pad_to_4(&mut user_strings);
        let mut blobs = self.blobs.data.clone();
        pad_to_4(&mut blobs);
        [
            ("#Strings", strings),
            ("#US", user_strings),
            ("#GUID", self.guids.bytes()),
            ("#Blob", blobs),
        ]
    }

    pub(crate) fn base(&self) -> &MetadataBase {
        &self.base
    }
}

fn table_of(token: Token) -> Result<TableId> {
    Ok(match token.table() {
        0x00 => TableId::Module,
        0x01 => TableId::TypeRef,
        0x02 => TableId::TypeDef,
        0x06 => TableId::MethodDef,
        0x1A => TableId::ModuleRef,
        0x1B => TableId::TypeSpec,
        0x23 => TableId::AssemblyRef,
        0x26 => TableId::File,
        other => return Err(malformed_error!("unexpected table 0x{:02x}", other)),
    })
}

fn type_def_or_ref_encoded(token: Token) -> Result<u32> {
    CodedIndexKind::TypeDefOrRef.encode(table_of(token)?, token.row())
}

fn class_or_value_type(ty: &NamedTypeSymbol) -> u8 {
    match ty.type_kind() {
        TypeKind::Struct | TypeKind::Enum => element::VALUETYPE,
        _ => element::CLASS,
    }
}

/// Flags of a TypeDef row.
pub(crate) fn type_attributes(ty: &NamedTypeSymbol) -> TypeAttributes {
    let mut flags = TypeAttributes::empty();
    if ty.declared_accessibility() == Accessibility::Public {
        flags |= TypeAttributes::PUBLIC;
    }
    match ty.type_kind() {
        TypeKind::Interface => flags |= TypeAttributes::INTERFACE | TypeAttributes::ABSTRACT,
        TypeKind::Struct => flags |= TypeAttributes::SEQUENTIAL_LAYOUT | TypeAttributes::SEALED,
        TypeKind::Enum => flags |= TypeAttributes::SEALED,
        _ => {}
    }
    if ty.is_abstract() || ty.is_static() {
        flags |= TypeAttributes::ABSTRACT;
    }
    if ty.is_sealed() || ty.is_static() {
        flags |= TypeAttributes::SEALED;
    }

    // A type initializer synthesized for field initializers shares the type's syntax
    let declared = ty.declaring_syntax().first();
    let explicit_cctor = ty
        .methods()
        .any(|m| m.method_kind() == MethodKind::StaticConstructor && m.declaring_syntax() != declared);
    if !explicit_cctor && ty.type_kind() != TypeKind::Interface {
        flags |= TypeAttributes::BEFORE_FIELD_INIT;
    }
    flags
}

/// Flags of a MethodDef row.
pub(crate) fn method_attributes(method: &MethodSymbol) -> MethodAttributes {
    let mut flags = match method.declared_accessibility() {
        Accessibility::Public => MethodAttributes::PUBLIC,
        Accessibility::ProtectedOrInternal => MethodAttributes::FAM_OR_ASSEM,
        Accessibility::Protected => MethodAttributes::FAMILY,
        Accessibility::Internal => MethodAttributes::ASSEMBLY,
        Accessibility::ProtectedAndInternal => MethodAttributes::FAM_AND_ASSEM,
        Accessibility::Private | Accessibility::NotApplicable => MethodAttributes::PRIVATE,
    };
    flags |= MethodAttributes::HIDE_BY_SIG;
    if method.is_static() {
        flags |= MethodAttributes::STATIC;
    }
    if method.is_virtual() || method.is_abstract() {
        flags |= MethodAttributes::VIRTUAL;
        if !overrides_base_method(method) {
            flags |= MethodAttributes::NEW_SLOT;
        }
    }
    if method.is_abstract() {
        flags |= MethodAttributes::ABSTRACT;
    }
    if matches!(
        method.method_kind(),
        MethodKind::Constructor | MethodKind::StaticConstructor
    ) {
        flags |= MethodAttributes::SPECIAL_NAME | MethodAttributes::RT_SPECIAL_NAME;
    }
    flags
}

/// Flags of a Field row.
pub(crate) fn field_attributes(field: &FieldSymbol) -> FieldAttributes {
    let mut flags = match field.declared_accessibility() {
        Accessibility::Public => FieldAttributes::PUBLIC,
        Accessibility::ProtectedOrInternal => FieldAttributes::FAM_OR_ASSEM,
        Accessibility::Protected => FieldAttributes::FAMILY,
        Accessibility::Internal => FieldAttributes::ASSEMBLY,
        Accessibility::ProtectedAndInternal => FieldAttributes::FAM_AND_ASSEM,
        Accessibility::Private | Accessibility::NotApplicable => FieldAttributes::PRIVATE,
    };
    if field.is_static() {
        flags |= FieldAttributes::STATIC;
    }
    flags
}

fn overrides_base_method(method: &MethodSymbol) -> bool {
    let Some(owner) = method.containing_type() else {
        return false;
    };
    let mut current = owner.base_type();
    let mut depth = 0;
    while let Some(TypeSymbol::Named(base)) = current {
        let found = base.methods().any(|candidate| {
            (candidate.is_virtual() || candidate.is_abstract())
                && candidate.name() == method.name()
                && candidate.parameters().len() == method.parameters().len()
                && candidate
                    .parameters()
                    .iter()
                    .zip(method.parameters())
                    .all(|(a, b)| a.parameter_type() == b.parameter_type())
        });
        if found {
            return true;
        }
        depth += 1;
        if depth > 64 {
            return false;
        }
        current = base.base_type();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compressed_integers() {
        let mut out = Vec::new();
        write_compressed_uint(0x03, &mut out).unwrap();
        write_compressed_uint(0x80, &mut out).unwrap();
        write_compressed_uint(0x3FFF, &mut out).unwrap();
        write_compressed_uint(0x4000, &mut out).unwrap();
        assert_eq!(out, [0x03, 0x80, 0x80, 0xBF, 0xFF, 0xC0, 0x00, 0x40, 0x00]);
        assert!(write_compressed_uint(0x2000_0000, &mut out).is_err());

        let mut signed = Vec::new();
        write_compressed_int(3, &mut signed).unwrap();
        write_compressed_int(-3, &mut signed).unwrap();
        write_compressed_int(64, &mut signed).unwrap();
        write_compressed_int(-8192, &mut signed).unwrap();
        assert_eq!(signed, [0x06, 0x7B, 0x80, 0x80, 0x80, 0x01]);
    }

    #[test]
    fn test_token_parts() {
        let token = TableId::MethodDef.token(5);
        assert_eq!(token.value(), 0x0600_0005);
        assert_eq!(token.table(), 0x06);
        assert_eq!(token.row(), 5);
        assert!(!token.is_null());
        assert_eq!(token.to_string(), "0x06000005");
        assert!(format!("{token:?}").contains("row: 5"));
    }

    #[test]
    fn test_default_base_is_generation_zero() {
        let base = MetadataBase::default();
        assert_eq!(base.generation, 0);
        assert!(base.row_counts.iter().all(|&count| count == 0));
        assert_eq!(base.string_heap_size, 0);
        assert_eq!(base.guid_count, 0);
    }

    #[test]
    fn test_heaps_deduplicate() {
        let mut strings = StringHeap::new(0);
        assert_eq!(strings.add(""), 0);
        let a = strings.add("Foo");
        assert_eq!(a, 1);
        assert_eq!(strings.add("Foo"), a);
        assert_eq!(strings.add("Bar"), 5);

        let mut blobs = BlobHeap::new(0);
        assert_eq!(blobs.add(&[]).unwrap(), 0);
        assert_eq!(blobs.add(&[1, 2]).unwrap(), 1);
        assert_eq!(blobs.add(&[1, 2]).unwrap(), 1);
        assert_eq!(blobs.data, [0, 2, 1, 2]);

        let mut delta = StringHeap::new(100);
        assert_eq!(delta.add("x"), 100);
        assert_eq!(delta.aggregate_size(), 102);
    }

    #[test]
    fn test_user_string_flag_byte() {
        let mut heap = UserStringHeap::new(0);
        let plain = heap.add("ab").unwrap();
        assert_eq!(plain, 1);
        assert_eq!(&heap.data[1..], &[5, b'a', 0, b'b', 0, 0]);

        let special = heap.add("é").unwrap();
        let start = special as usize;
        assert_eq!(&heap.data[start..], &[3, 0xE9, 0x00, 1]);
        assert_eq!(heap.add("ab").unwrap(), plain);
    }

    #[test]
    fn test_coded_index_encoding() {
        assert_eq!(
            CodedIndexKind::TypeDefOrRef.encode(TableId::TypeRef, 3).unwrap(),
            (3 << 2) | 1
        );
        assert_eq!(
            CodedIndexKind::MemberRefParent.encode(TableId::TypeSpec, 1).unwrap(),
            (1 << 3) | 4
        );
        assert!(CodedIndexKind::ResolutionScope.encode(TableId::Field, 1).is_err());
    }

    #[test]
    fn test_table_stream_header() {
        let mut tables = TableSet::default();
        tables.push(
            TableId::Module,
            1,
            vec![
                Column::U16(0),
                Column::String(1),
                Column::Guid(1),
                Column::Guid(0),
                Column::Guid(0),
            ],
        );
        let bytes = tables
            .serialize((10, 1, 1), &[0; 64], false, SORTED_TABLES, 0)
            .unwrap();
        assert_eq!(bytes[4], 2);
        assert_eq!(bytes[6], 0);
        assert_eq!(u64::from_le_bytes(bytes[8..16].try_into().unwrap()), 1);
        assert_eq!(u32::from_le_bytes(bytes[24..28].try_into().unwrap()), 1);
        // header + one row of five 2-byte columns, padded
        assert_eq!(bytes.len(), 28 + 12);

        let wide = tables
            .serialize((10, 1, 1), &[0; 64], true, 0, 0)
            .unwrap();
        assert_eq!(wide[6], 0x27);
        assert_eq!(wide.len(), 28 + 20);
    }

    #[test]
    fn test_metadata_root_layout() {
        let (bytes, offsets) =
            write_metadata_root("v4.0.30319", &[("#~", vec![0; 8]), ("#Strings", vec![0; 4])])
                .unwrap();
        assert_eq!(&bytes[0..4], b"BSJB");
        assert_eq!(u32::from_le_bytes(bytes[12..16].try_into().unwrap()), 12);
        assert_eq!(&bytes[16..26], b"v4.0.30319");
        assert_eq!(u16::from_le_bytes(bytes[30..32].try_into().unwrap()), 2);
        assert_eq!(offsets[0], 32 + 8 + 4 + 8 + 12);
        assert_eq!(offsets[1], offsets[0] + 8);
        assert_eq!(bytes.len(), offsets[1] + 4);
    }
}
