//! Win32 and manifest resources.
//!
//! Win32 resources arrive either as a RES file (recognized by a leading zero `u32`)
//! or as a COFF object produced by a resource compiler (`.rsrc$01` directory and
//! `.rsrc$02` data sections). Both are normalized to [`Win32Resources`] and written
//! into the `.rsrc` section once its RVA is known. Input in neither form is reported
//! as a diagnostic.
//!
//! [`Compilation::create_default_win32_resources`] produces the RES file a command
//! line build would use: a null resource, a version resource, an application
//! manifest and an icon group.

use std::collections::{BTreeMap, HashSet};

use sha1::{Digest, Sha1};
use widestring::U16String;

use crate::{
    compilation::Compilation,
    diagnostics::{DiagnosticBag, ErrorCode},
    emit::ResourceDescription,
    options::OutputKind,
    Result,
};

const RT_ICON: u16 = 3;
const RT_GROUP_ICON: u16 = 14;
const RT_VERSION: u16 = 16;
const RT_MANIFEST: u16 = 24;
const DEFAULT_ICON_GROUP_ID: u16 = 32512;

const IMAGE_REL_I386_DIR32NB: u16 = 0x0007;
const IMAGE_REL_AMD64_ADDR32NB: u16 = 0x0003;
const IMAGE_REL_ARM_ADDR32NB: u16 = 0x0002;
const IMAGE_REL_ARM64_ADDR32NB: u16 = 0x0002;

const DEFAULT_MANIFEST: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<assembly xmlns="urn:schemas-microsoft-com:asm.v1" manifestVersion="1.0">
  <assemblyIdentity version="1.0.0.0" name="MyApplication.app"/>
  <trustInfo xmlns="urn:schemas-microsoft-com:asm.v2">
    <security>
      <requestedPrivileges xmlns="urn:schemas-microsoft-com:asm.v3">
        <requestedExecutionLevel level="asInvoker" uiAccess="false"/>
      </requestedPrivileges>
    </security>
  </trustInfo>
</assembly>"#;

/// Type or name of a Win32 resource.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceKey {
    /// A string name; named entries sort before numbered ones.
    Name(String),
    /// A numeric id.
    Id(u16),
}

/// One Win32 resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Win32Resource {
    /// Resource type
    pub kind: ResourceKey,
    /// Resource name
    pub name: ResourceKey,
    /// Language id
    pub language: u16,
    /// Code page recorded in the data entry
    pub code_page: u32,
    /// Raw data
    pub data: Vec<u8>,
}

/// Normalized Win32 resource input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Win32Resources {
    /// Individual resources, laid out by [`Win32Resources::serialize`].
    Entries(Vec<Win32Resource>),
    /// A prebuilt section from a COFF object; `relocations` are offsets of `u32`
    /// values that become RVAs by adding the section RVA.
    Section {
        bytes: Vec<u8>,
        relocations: Vec<usize>,
    },
}

impl Win32Resources {
    /// Reads RES or COFF input.
    ///
    /// # Errors
    ///
    /// Returns a message describing why the input is not a resource file.
    pub(crate) fn read(data: &[u8]) -> std::result::Result<Self, String> {
        if data.len() < 4 {
            return Err("file too small".to_string());
        }
        if data[..4] == [0, 0, 0, 0] {
            return read_res(data).map(Win32Resources::Entries);
        }
        read_coff(data)
    }

    /// `true` if there is nothing to write.
    pub(crate) fn is_empty(&self) -> bool {
        match self {
            Win32Resources::Entries(entries) => entries.is_empty(),
            Win32Resources::Section { bytes, .. } => bytes.is_empty(),
        }
    }

    /// Section contents for a `.rsrc` section at `section_rva`.
    pub(crate) fn serialize(&self, section_rva: u32) -> Result<Vec<u8>> {
        match self {
            Win32Resources::Entries(entries) => serialize_directory(entries, section_rva),
            Win32Resources::Section { bytes, relocations } => {
                let mut bytes = bytes.clone();
                for &offset in relocations {
                    let slot = bytes
                        .get_mut(offset..offset + 4)
                        .ok_or_else(|| malformed_error!("relocation at {} is outside the section", offset))?;
                    let value = u32::from_le_bytes([slot[0], slot[1], slot[2], slot[3]]);
                    slot.copy_from_slice(&(value + section_rva).to_le_bytes());
                }
                Ok(bytes)
            }
        }
    }
}

/// Bounds-checked little-endian reader over resource input.
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8], pos: usize) -> Self {
        Cursor { data, pos }
    }

    fn bytes(&mut self, len: usize) -> std::result::Result<&'a [u8], String> {
        let end = self.pos.checked_add(len).filter(|&e| e <= self.data.len());
        let end = end.ok_or_else(|| format!("unexpected end of file at offset {}", self.pos))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u16(&mut self) -> std::result::Result<u16, String> {
        let b = self.bytes(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> std::result::Result<u32, String> {
        let b = self.bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn align(&mut self, alignment: usize) {
        self.pos = self.pos.div_ceil(alignment) * alignment;
    }

    /// A RES name or type: `0xFFFF` followed by an id, or a null-terminated UTF-16 string.
    fn key(&mut self) -> std::result::Result<ResourceKey, String> {
        let first = self.u16()?;
        if first == 0xFFFF {
            return Ok(ResourceKey::Id(self.u16()?));
        }
        let mut units = Vec::new();
        let mut unit = first;
        while unit != 0 {
            units.push(unit);
            unit = self.u16()?;
        }
        Ok(ResourceKey::Name(
            U16String::from_vec(units).to_string_lossy().to_uppercase(),
        ))
    }
}

fn read_res(data: &[u8]) -> std::result::Result<Vec<Win32Resource>, String> {
    let mut cursor = Cursor::new(data, 0);
    let mut resources = Vec::new();
    while cursor.pos < data.len() {
        let start = cursor.pos;
        let data_size = cursor.u32()? as usize;
        let header_size = cursor.u32()? as usize;
        if header_size < 16 {
            return Err(format!("invalid resource header size {header_size}"));
        }
        let kind = cursor.key()?;
        let name = cursor.key()?;
        cursor.align(4);
        let _data_version = cursor.u32()?;
        let _memory_flags = cursor.u16()?;
        let language = cursor.u16()?;
        let _version = cursor.u32()?;
        let _characteristics = cursor.u32()?;

        cursor.pos = start + header_size;
        let bytes = cursor.bytes(data_size)?;
        cursor.align(4);

        // The null resource that starts every RES file
        if kind == ResourceKey::Id(0) && name == ResourceKey::Id(0) && data_size == 0 {
            continue;
        }
        resources.push(Win32Resource {
            kind,
            name,
            language,
            code_page: 0,
            data: bytes.to_vec(),
        });
    }
    Ok(resources)
}

fn read_coff(data: &[u8]) -> std::result::Result<Win32Resources, String> {
    let mut header = Cursor::new(data, 0);
    let machine = header.u16()?;
    let reloc_type = match machine {
        0x014C => IMAGE_REL_I386_DIR32NB,
        0x8664 => IMAGE_REL_AMD64_ADDR32NB,
        0x01C4 => IMAGE_REL_ARM_ADDR32NB,
        0xAA64 => IMAGE_REL_ARM64_ADDR32NB,
        other => return Err(format!("unrecognized file format (machine 0x{other:04x})")),
    };
    let section_count = header.u16()? as usize;
    let _timestamp = header.u32()?;
    let symbol_table = header.u32()? as usize;
    let symbol_count = header.u32()? as usize;
    let optional_header_size = header.u16()? as usize;
    let _characteristics = header.u16()?;
    header.pos += optional_header_size;

    struct Section {
        raw_size: usize,
        raw_pointer: usize,
        reloc_pointer: usize,
        reloc_count: usize,
    }
    let mut rsrc01 = None;
    let mut rsrc02 = None;
    let mut rsrc02_index = 0;
    for index in 0..section_count {
        let name = header.bytes(8)?;
        let _virtual_size = header.u32()?;
        let _virtual_address = header.u32()?;
        let section = Section {
            raw_size: header.u32()? as usize,
            raw_pointer: header.u32()? as usize,
            reloc_pointer: header.u32()? as usize,
            reloc_count: {
                let _line_numbers = header.u32()?;
                let count = header.u16()? as usize;
                let _line_number_count = header.u16()?;
                let _characteristics = header.u32()?;
                count
            },
        };
        match name {
            b".rsrc$01" => rsrc01 = Some(section),
            b".rsrc$02" => {
                rsrc02 = Some(section);
                rsrc02_index = index + 1;
            }
            _ => {}
        }
    }
    let (Some(directory), Some(contents)) = (rsrc01, rsrc02) else {
        return Err("no resource sections".to_string());
    };

    let mut bytes = Cursor::new(data, directory.raw_pointer)
        .bytes(directory.raw_size)?
        .to_vec();
    bytes.extend_from_slice(Cursor::new(data, contents.raw_pointer).bytes(contents.raw_size)?);

    let mut relocations = Vec::with_capacity(directory.reloc_count);
    let mut reloc = Cursor::new(data, directory.reloc_pointer);
    for _ in 0..directory.reloc_count {
        let offset = reloc.u32()? as usize;
        let symbol_index = reloc.u32()? as usize;
        let kind = reloc.u16()?;
        if kind != reloc_type {
            return Err(format!("unexpected relocation type 0x{kind:04x}"));
        }
        if symbol_index >= symbol_count {
            return Err(format!("symbol index {symbol_index} out of range"));
        }

        let mut symbol = Cursor::new(data, symbol_table + symbol_index * 18 + 8);
        let value = symbol.u32()? as usize;
        let section_number = symbol.u16()? as usize;
        let base = if section_number == rsrc02_index {
            directory.raw_size
        } else {
            0
        };

        let target = u32::try_from(value + base).map_err(|_| "relocation overflow".to_string())?;
        let slot = bytes
            .get_mut(offset..offset + 4)
            .ok_or_else(|| format!("relocation offset {offset} out of range"))?;
        slot.copy_from_slice(&target.to_le_bytes());
        relocations.push(offset);
    }

    Ok(Win32Resources::Section { bytes, relocations })
}

/// Writes the resource directory tree, data entries, names and data.
fn serialize_directory(entries: &[Win32Resource], section_rva: u32) -> Result<Vec<u8>> {
    let mut tree: BTreeMap<&ResourceKey, BTreeMap<&ResourceKey, BTreeMap<u16, usize>>> =
        BTreeMap::new();
    for (index, entry) in entries.iter().enumerate() {
        tree.entry(&entry.kind)
            .or_default()
            .entry(&entry.name)
            .or_default()
            .insert(entry.language, index);
    }

    let table_size = |count: usize| 16 + count * 8;
    let mut directory_size = table_size(tree.len());
    for names in tree.values() {
        directory_size += table_size(names.len());
        for languages in names.values() {
            directory_size += table_size(languages.len());
        }
    }
    let leaf_count: usize = tree
        .values()
        .flat_map(|n| n.values())
        .map(BTreeMap::len)
        .sum();
    let data_entries_start = directory_size;
    let strings_start = data_entries_start + leaf_count * 16;

    let mut strings = Vec::new();
    let mut string_offsets: BTreeMap<&str, u32> = BTreeMap::new();
    for (kind, names) in &tree {
        for key in std::iter::once(*kind).chain(names.keys().copied()) {
            if let ResourceKey::Name(name) = key {
                if !string_offsets.contains_key(name.as_str()) {
                    let units = U16String::from_str(name);
                    string_offsets.insert(name, to_u32(strings_start + strings.len())?);
                    strings.extend_from_slice(&(units.len() as u16).to_le_bytes());
                    for unit in units.as_slice() {
                        strings.extend_from_slice(&unit.to_le_bytes());
                    }
                }
            }
        }
    }
    let data_start = (strings_start + strings.len()).div_ceil(8) * 8;

    let mut directories = Vec::with_capacity(directory_size);
    let mut data_entries = Vec::with_capacity(leaf_count * 16);
    let mut data = Vec::new();

    let entry_name = |key: &ResourceKey| -> u32 {
        match key {
            ResourceKey::Name(name) => 0x8000_0000 | string_offsets.get(name.as_str()).copied().unwrap_or(0),
            ResourceKey::Id(id) => u32::from(*id),
        }
    };
    let write_header = |out: &mut Vec<u8>, named: usize, ids: usize| {
        out.extend_from_slice(&[0u8; 12]);
        out.extend_from_slice(&(named as u16).to_le_bytes());
        out.extend_from_slice(&(ids as u16).to_le_bytes());
    };

    // Level 1: types. Subdirectories follow in the same order.
    let mut next_table = table_size(tree.len());
    let named = tree.keys().filter(|k| is_named(k)).count();
    write_header(&mut directories, named, tree.len() - named);
    let mut name_tables = Vec::new();
    for (kind, names) in &tree {
        directories.extend_from_slice(&entry_name(kind).to_le_bytes());
        directories.extend_from_slice(&(0x8000_0000 | to_u32(next_table)?).to_le_bytes());
        name_tables.push(names);
        next_table += table_size(names.len());
    }

    // Level 2: names
    let mut language_tables = Vec::new();
    for names in &name_tables {
        let named = names.keys().filter(|k| is_named(k)).count();
        write_header(&mut directories, named, names.len() - named);
        for (name, languages) in names.iter() {
            directories.extend_from_slice(&entry_name(name).to_le_bytes());
            directories.extend_from_slice(&(0x8000_0000 | to_u32(next_table)?).to_le_bytes());
            language_tables.push(languages);
            next_table += table_size(languages.len());
        }
    }

    // Level 3: languages, pointing at data entries
    for languages in &language_tables {
        write_header(&mut directories, 0, languages.len());
        for (&language, &index) in languages.iter() {
            let entry_offset = data_entries_start + data_entries.len();
            directories.extend_from_slice(&u32::from(language).to_le_bytes());
            directories.extend_from_slice(&to_u32(entry_offset)?.to_le_bytes());

            let resource = &entries[index];
            let rva = section_rva + to_u32(data_start + data.len())?;
            data_entries.extend_from_slice(&rva.to_le_bytes());
            data_entries.extend_from_slice(&to_u32(resource.data.len())?.to_le_bytes());
            data_entries.extend_from_slice(&resource.code_page.to_le_bytes());
            data_entries.extend_from_slice(&0u32.to_le_bytes());
            data.extend_from_slice(&resource.data);
            data.resize(data.len().div_ceil(8) * 8, 0);
        }
    }
    debug_assert_eq!(directories.len(), directory_size);

    let mut out = directories;
    out.extend_from_slice(&data_entries);
    out.extend_from_slice(&strings);
    out.resize(data_start, 0);
    out.extend_from_slice(&data);
    Ok(out)
}

fn is_named(key: &ResourceKey) -> bool {
    matches!(key, ResourceKey::Name(_))
}

fn to_u32(value: usize) -> Result<u32> {
    u32::try_from(value).map_err(|_| malformed_error!("resource section exceeds 4 GB"))
}

/// Appends one RES entry.
fn write_res_entry(
    out: &mut Vec<u8>,
    kind: &ResourceKey,
    name: &ResourceKey,
    memory_flags: u16,
    data: &[u8],
) {
    let mut header = Vec::new();
    for key in [kind, name] {
        match key {
            ResourceKey::Id(id) => {
                header.extend_from_slice(&0xFFFFu16.to_le_bytes());
                header.extend_from_slice(&id.to_le_bytes());
            }
            ResourceKey::Name(text) => {
                for unit in U16String::from_str(text).as_slice() {
                    header.extend_from_slice(&unit.to_le_bytes());
                }
                header.extend_from_slice(&0u16.to_le_bytes());
            }
        }
    }
    header.resize(header.len().div_ceil(4) * 4, 0);
    header.extend_from_slice(&0u32.to_le_bytes());
    header.extend_from_slice(&memory_flags.to_le_bytes());
    header.extend_from_slice(&0u16.to_le_bytes());
    header.extend_from_slice(&0u32.to_le_bytes());
    header.extend_from_slice(&0u32.to_le_bytes());

    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(&(header.len() as u32 + 8).to_le_bytes());
    out.extend_from_slice(&header);
    out.extend_from_slice(data);
    out.resize(out.len().div_ceil(4) * 4, 0);
}

/// Value of a node in a version resource.
enum VersionValue<'a> {
    Binary(&'a [u8]),
    Text(&'a str),
    None,
}

fn utf16z(text: &str) -> Vec<u8> {
    let mut bytes: Vec<u8> = U16String::from_str(text)
        .as_slice()
        .iter()
        .flat_map(|u| u.to_le_bytes())
        .collect();
    bytes.extend_from_slice(&[0, 0]);
    bytes
}

/// One `VS_VERSIONINFO`-style node: length, value length, type, key, value, children.
fn version_node(key: &str, value: VersionValue<'_>, children: &[Vec<u8>]) -> Vec<u8> {
    let (value_bytes, value_length, is_text) = match value {
        VersionValue::Binary(bytes) => (bytes.to_vec(), bytes.len(), false),
        VersionValue::Text(text) => {
            let bytes = utf16z(text);
            let chars = bytes.len() / 2;
            (bytes, chars, true)
        }
        VersionValue::None => (Vec::new(), 0, true),
    };

    let mut node = vec![0, 0];
    node.extend_from_slice(&(value_length as u16).to_le_bytes());
    node.extend_from_slice(&u16::from(is_text).to_le_bytes());
    node.extend_from_slice(&utf16z(key));
    node.resize(node.len().div_ceil(4) * 4, 0);
    node.extend_from_slice(&value_bytes);
    for child in children {
        node.resize(node.len().div_ceil(4) * 4, 0);
        node.extend_from_slice(child);
    }
    let length = node.len() as u16;
    node[0..2].copy_from_slice(&length.to_le_bytes());
    node
}

/// Version resource data for `file_name` at `version`.
fn version_resource(
    file_name: &str,
    version: [u16; 4],
    is_dll: bool,
    strings: &[(&str, String)],
) -> Vec<u8> {
    let ms = (u32::from(version[0]) << 16) | u32::from(version[1]);
    let ls = (u32::from(version[2]) << 16) | u32::from(version[3]);
    let mut fixed = Vec::with_capacity(52);
    for value in [
        0xFEEF_04BD,
        0x0001_0000,
        ms,
        ls,
        ms,
        ls,
        0x3F,
        0,
        // VOS__WINDOWS32
        0x0000_0004,
        // VFT_DLL or VFT_APP
        if is_dll { 2 } else { 1 },
        0,
        0,
        0,
    ] {
        fixed.extend_from_slice(&u32::to_le_bytes(value));
    }

    let dotted = format!("{}.{}.{}.{}", version[0], version[1], version[2], version[3]);
    let mut pairs: Vec<(&str, String)> = vec![
        ("FileDescription", " ".to_string()),
        ("FileVersion", dotted.clone()),
        ("InternalName", file_name.to_string()),
        ("LegalCopyright", " ".to_string()),
        ("OriginalFilename", file_name.to_string()),
        ("ProductVersion", dotted.clone()),
        ("Assembly Version", dotted),
    ];
    for (key, value) in strings {
        match pairs.iter_mut().find(|(k, _)| k == key) {
            Some(pair) => pair.1.clone_from(value),
            None => pairs.push((key, value.clone())),
        }
    }

    let string_nodes: Vec<Vec<u8>> = pairs
        .iter()
        .map(|(key, value)| version_node(key, VersionValue::Text(value), &[]))
        .collect();
    let string_table = version_node("000004b0", VersionValue::None, &string_nodes);
    let string_info = version_node("StringFileInfo", VersionValue::None, &[string_table]);

    let translation = 0x04B0_0000u32.to_le_bytes();
    let var = version_node("Translation", VersionValue::Binary(&translation), &[]);
    let var_info = version_node("VarFileInfo", VersionValue::None, &[var]);

    version_node(
        "VS_VERSION_INFO",
        VersionValue::Binary(&fixed),
        &[var_info, string_info],
    )
}

/// Splits an `.ico` file into icon images and the group directory that names them.
fn icon_resources(ico: &[u8]) -> Result<(Vec<Vec<u8>>, Vec<u8>)> {
    let invalid = |reason: &str| argument_error!("icon", "invalid icon file: {}", reason);
    let mut cursor = Cursor::new(ico, 0);
    let header = (|| -> std::result::Result<(u16, u16, u16), String> {
        Ok((cursor.u16()?, cursor.u16()?, cursor.u16()?))
    })()
    .map_err(|e| invalid(&e))?;
    if header.0 != 0 || header.1 != 1 || header.2 == 0 {
        return Err(invalid("bad header"));
    }

    let mut images = Vec::new();
    let mut group = Vec::new();
    group.extend_from_slice(&0u16.to_le_bytes());
    group.extend_from_slice(&1u16.to_le_bytes());
    group.extend_from_slice(&header.2.to_le_bytes());
    for id in 1..=header.2 {
        let entry = cursor.bytes(16).map_err(|e| invalid(&e))?;
        let size = u32::from_le_bytes([entry[8], entry[9], entry[10], entry[11]]) as usize;
        let offset = u32::from_le_bytes([entry[12], entry[13], entry[14], entry[15]]) as usize;
        let image = Cursor::new(ico, offset)
            .bytes(size)
            .map_err(|e| invalid(&e))?;
        images.push(image.to_vec());
        group.extend_from_slice(&entry[..12]);
        group.extend_from_slice(&id.to_le_bytes());
    }
    Ok((images, group))
}

impl Compilation {
    /// Builds the RES file a command line build embeds by default: a version
    /// resource, an application manifest and an icon.
    ///
    /// `manifest` replaces the default manifest of applications; `no_manifest`
    /// suppresses it. Modules get no manifest.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Argument`](crate::Error::Argument) if `icon` is not a valid `.ico` file.
    pub fn create_default_win32_resources(
        &self,
        include_version: bool,
        no_manifest: bool,
        manifest: Option<&[u8]>,
        icon: Option<&[u8]>,
    ) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        // Null resource
        write_res_entry(&mut out, &ResourceKey::Id(0), &ResourceKey::Id(0), 0, &[]);

        let output_kind = self.options().output_kind();
        let is_dll = output_kind.is_dll_image();

        if include_version {
            let identity = self.assembly_identity();
            let version = identity.version();
            let file_name = format!(
                "{}{}",
                identity.name(),
                output_kind.default_extension()
            );
            let data = version_resource(
                &file_name,
                [version.major, version.minor, version.build, version.revision],
                is_dll,
                &[],
            );
            write_res_entry(
                &mut out,
                &ResourceKey::Id(RT_VERSION),
                &ResourceKey::Id(1),
                0x0030,
                &data,
            );
        }

        if !no_manifest && output_kind != OutputKind::NetModule {
            let contents = match manifest {
                Some(contents) => Some(contents),
                None if !is_dll => Some(DEFAULT_MANIFEST.as_bytes()),
                None => None,
            };
            if let Some(contents) = contents {
                let id = if is_dll { 2 } else { 1 };
                write_res_entry(
                    &mut out,
                    &ResourceKey::Id(RT_MANIFEST),
                    &ResourceKey::Id(id),
                    0x1030,
                    contents,
                );
            }
        }

        if let Some(icon) = icon {
            let (images, group) = icon_resources(icon)?;
            for (index, image) in images.iter().enumerate() {
                let id = u16::try_from(index + 1).map_err(|_| argument_error!("icon", "too many images"))?;
                write_res_entry(&mut out, &ResourceKey::Id(RT_ICON), &ResourceKey::Id(id), 0x1010, image);
            }
            write_res_entry(
                &mut out,
                &ResourceKey::Id(RT_GROUP_ICON),
                &ResourceKey::Id(DEFAULT_ICON_GROUP_ID),
                0x1030,
                &group,
            );
        }
        Ok(out)
    }
}

/// Checks manifest resources against each other and the output kind.
///
/// Returns `false` if an error was reported.
pub(crate) fn check_manifest_resources(
    resources: &[ResourceDescription],
    output_kind: OutputKind,
    diagnostics: &DiagnosticBag,
) -> bool {
    let mut success = true;
    let mut names = HashSet::new();
    let mut files = HashSet::new();
    for resource in resources {
        if !names.insert(resource.name()) {
            diagnostics.add(ErrorCode::ResourceNotUnique.at_none(&[&resource.name()]));
            success = false;
        }
        if let Some(file_name) = resource.file_name() {
            if output_kind == OutputKind::NetModule {
                diagnostics.add(ErrorCode::ResourceInModule.at_none(&[]));
                success = false;
            } else if !files.insert(file_name) {
                diagnostics.add(ErrorCode::ResourceNotUnique.at_none(&[&file_name]));
                success = false;
            }
        }
    }
    success
}

/// A manifest resource ready for the metadata tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ManifestEntry {
    pub(crate) name: String,
    pub(crate) is_public: bool,
    /// Offset in the resources blob of an embedded resource.
    pub(crate) offset: u32,
    /// File name and SHA-1 hash of a linked resource.
    pub(crate) file: Option<(String, Vec<u8>)>,
}

/// Reads every manifest resource, building the `.mresources` blob.
///
/// Read failures are reported as diagnostics; returns `None` when any occurred.
pub(crate) fn read_manifest_resources(
    resources: &[ResourceDescription],
    diagnostics: &DiagnosticBag,
) -> Result<Option<(Vec<u8>, Vec<ManifestEntry>)>> {
    let mut blob = Vec::new();
    let mut entries = Vec::with_capacity(resources.len());
    let mut failed = false;
    for resource in resources {
        let bytes = match resource.read() {
            Ok(bytes) => bytes,
            Err(error) => {
                log::warn!("resource '{}' could not be read: {}", resource.name(), error);
                diagnostics.add(ErrorCode::CantReadResource.at_none(&[&resource.name(), &error]));
                failed = true;
                continue;
            }
        };
        match resource.file_name() {
            Some(file_name) => entries.push(ManifestEntry {
                name: resource.name().to_string(),
                is_public: resource.is_public(),
                offset: 0,
                file: Some((file_name.to_string(), Sha1::digest(&bytes).to_vec())),
            }),
            None => {
                let offset = to_u32(blob.len())?;
                blob.extend_from_slice(&to_u32(bytes.len())?.to_le_bytes());
                blob.extend_from_slice(&bytes);
                blob.resize(blob.len().div_ceil(8) * 8, 0);
                entries.push(ManifestEntry {
                    name: resource.name().to_string(),
                    is_public: resource.is_public(),
                    offset,
                    file: None,
                });
            }
        }
    }
    Ok((!failed).then_some((blob, entries)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        lang::MiniLanguage,
        options::CompilationOptions,
        references::{AssemblyMetadata, MetadataReference},
    };

    fn compilation(kind: OutputKind) -> Compilation {
        MiniLanguage::create_compilation(
            Some("App"),
            [MiniLanguage::parse("class C { static void Main() {} }", "a.mini")],
            [MetadataReference::from_metadata(AssemblyMetadata::core_library(), None)],
            CompilationOptions::new(kind),
        )
        .unwrap()
    }

    fn tiny_icon() -> Vec<u8> {
        let mut ico = Vec::new();
        ico.extend_from_slice(&[0, 0, 1, 0, 1, 0]);
        ico.extend_from_slice(&[16, 16, 0, 0, 1, 0, 32, 0]);
        ico.extend_from_slice(&4u32.to_le_bytes());
        ico.extend_from_slice(&22u32.to_le_bytes());
        ico.extend_from_slice(&[1, 2, 3, 4]);
        ico
    }

    #[test]
    fn test_default_resources_parse_back() {
        let res = compilation(OutputKind::ConsoleApplication)
            .create_default_win32_resources(true, false, None, Some(&tiny_icon()))
            .unwrap();
        let Win32Resources::Entries(entries) = Win32Resources::read(&res).unwrap() else {
            panic!("expected RES entries");
        };
        let kinds: Vec<&ResourceKey> = entries.iter().map(|e| &e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                &ResourceKey::Id(RT_VERSION),
                &ResourceKey::Id(RT_MANIFEST),
                &ResourceKey::Id(RT_ICON),
                &ResourceKey::Id(RT_GROUP_ICON)
            ]
        );
        let version = &entries[0].data;
        assert_eq!(u16::from_le_bytes([version[0], version[1]]) as usize, version.len());
        assert_eq!(entries[2].data, vec![1, 2, 3, 4]);
        assert_eq!(entries[3].name, ResourceKey::Id(DEFAULT_ICON_GROUP_ID));
    }

    #[test]
    fn test_library_gets_no_default_manifest() {
        let res = compilation(OutputKind::DynamicallyLinkedLibrary)
            .create_default_win32_resources(true, false, None, None)
            .unwrap();
        let Win32Resources::Entries(entries) = Win32Resources::read(&res).unwrap() else {
            panic!("expected RES entries");
        };
        assert_eq!(entries.len(), 1);
        assert!(compilation(OutputKind::DynamicallyLinkedLibrary)
            .create_default_win32_resources(false, true, None, Some(&[1, 2, 3]))
            .is_err());
    }

    #[test]
    fn test_unrecognized_input_is_rejected() {
        assert!(Win32Resources::read(&[1, 2]).is_err());
        assert!(Win32Resources::read(b"not a resource file").is_err());
    }

    #[test]
    fn test_directory_layout() {
        let entries = vec![
            Win32Resource {
                kind: ResourceKey::Id(RT_VERSION),
                name: ResourceKey::Id(1),
                language: 0,
                code_page: 0,
                data: vec![0xAA; 3],
            },
            Win32Resource {
                kind: ResourceKey::Name("CUSTOM".into()),
                name: ResourceKey::Id(7),
                language: 0x409,
                code_page: 0,
                data: vec![0xBB; 2],
            },
        ];
        let section = Win32Resources::Entries(entries).serialize(0x4000).unwrap();
        // one named and one numbered type
        assert_eq!(u16::from_le_bytes([section[12], section[13]]), 1);
        assert_eq!(u16::from_le_bytes([section[14], section[15]]), 1);
        let first_name = u32::from_le_bytes(section[16..20].try_into().unwrap());
        assert_ne!(first_name & 0x8000_0000, 0);

        // 3 levels of 2 tables each with one entry plus the root with two
        let entries_start = 32 + 2 * 24 + 2 * 24;
        let rva = u32::from_le_bytes(section[entries_start..entries_start + 4].try_into().unwrap());
        let offset = (rva - 0x4000) as usize;
        assert_eq!(section[offset..offset + 2], [0xBB, 0xBB]);
    }

    #[test]
    fn test_coff_relocations_applied() {
        // COFF header, two sections, one relocation, two symbols
        let mut coff = Vec::new();
        coff.extend_from_slice(&0x014Cu16.to_le_bytes());
        coff.extend_from_slice(&2u16.to_le_bytes());
        coff.extend_from_slice(&0u32.to_le_bytes());
        let symbols_at = 20 + 2 * 40 + 8 + 4 + 10;
        coff.extend_from_slice(&(symbols_at as u32).to_le_bytes());
        coff.extend_from_slice(&2u32.to_le_bytes());
        coff.extend_from_slice(&0u16.to_le_bytes());
        coff.extend_from_slice(&0u16.to_le_bytes());

        let data01 = 20 + 2 * 40;
        let reloc01 = data01 + 8;
        let data02 = reloc01 + 10;
        let section = |name: &[u8; 8], size: u32, raw: usize, reloc: usize, count: u16| {
            let mut s = name.to_vec();
            s.extend_from_slice(&0u32.to_le_bytes());
            s.extend_from_slice(&0u32.to_le_bytes());
            s.extend_from_slice(&size.to_le_bytes());
            s.extend_from_slice(&(raw as u32).to_le_bytes());
            s.extend_from_slice(&(reloc as u32).to_le_bytes());
            s.extend_from_slice(&0u32.to_le_bytes());
            s.extend_from_slice(&count.to_le_bytes());
            s.extend_from_slice(&0u16.to_le_bytes());
            s.extend_from_slice(&0u32.to_le_bytes());
            s
        };
        coff.extend(section(b".rsrc$01", 8, data01, reloc01, 1));
        coff.extend(section(b".rsrc$02", 4, data02, 0, 0));
        coff.extend_from_slice(&[0u8; 8]);
        coff.extend_from_slice(&4u32.to_le_bytes());
        coff.extend_from_slice(&1u32.to_le_bytes());
        coff.extend_from_slice(&IMAGE_REL_I386_DIR32NB.to_le_bytes());
        coff.extend_from_slice(&[9, 9, 9, 9]);
        // symbol 0 (unused), symbol 1 in .rsrc$02 at value 0
        coff.extend_from_slice(&[0u8; 18]);
        let mut symbol = vec![0u8; 8];
        symbol.extend_from_slice(&0u32.to_le_bytes());
        symbol.extend_from_slice(&2u16.to_le_bytes());
        symbol.extend_from_slice(&[0u8; 4]);
        coff.extend(symbol);

        let resources = Win32Resources::read(&coff).unwrap();
        let bytes = resources.serialize(0x2000).unwrap();
        assert_eq!(bytes.len(), 12);
        assert_eq!(u32::from_le_bytes(bytes[4..8].try_into().unwrap()), 0x2000 + 8);
        assert_eq!(&bytes[8..], &[9, 9, 9, 9]);
    }

    #[test]
    fn test_manifest_resource_checks() {
        let a = ResourceDescription::from_bytes("a", true, vec![1]).unwrap();
        let a2 = ResourceDescription::from_bytes("a", false, vec![2]).unwrap();
        let bag = DiagnosticBag::new();
        assert!(!check_manifest_resources(&[a.clone(), a2], OutputKind::DynamicallyLinkedLibrary, &bag));
        assert_eq!(bag.iter().next().unwrap().id(), ErrorCode::ResourceNotUnique.id());

        let linked = ResourceDescription::linked("l", "l.bin", true, || Ok(vec![5])).unwrap();
        let bag = DiagnosticBag::new();
        assert!(!check_manifest_resources(&[linked.clone()], OutputKind::NetModule, &bag));
        assert_eq!(bag.iter().next().unwrap().id(), ErrorCode::ResourceInModule.id());

        let (blob, entries) = read_manifest_resources(&[a, linked], &DiagnosticBag::new())
            .unwrap()
            .unwrap();
        assert_eq!(blob, vec![1, 0, 0, 0, 1, 0, 0, 0]);
        assert_eq!(entries[0].offset, 0);
        assert_eq!(entries[1].file.as_ref().unwrap().1.len(), 20);
    }

    #[test]
    fn test_unreadable_resource_is_a_diagnostic() {
        let broken = ResourceDescription::embedded("broken", true, || {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"))
        })
        .unwrap();
        let bag = DiagnosticBag::new();
        assert!(read_manifest_resources(&[broken], &bag).unwrap().is_none());
        assert_eq!(bag.iter().next().unwrap().id(), ErrorCode::CantReadResource.id());
    }
}
