//! Portable PDB writer.
//!
//! The PDB is a metadata image of its own with a `#Pdb` stream in front of the usual
//! table and heap streams. It carries one `Document` row per source file, one
//! `MethodDebugInformation` row per method definition and `CustomDebugInformation`
//! rows for embedded sources and source link data. The 20-byte PDB id at the start of
//! the `#Pdb` stream is left zero and patched by the caller once it is known.

use std::collections::HashMap;

use uguid::{guid, Guid};

use crate::{
    emit::{
        builder::ModuleBuilder,
        codegen::{MethodBody, SequencePoint},
        metadata::{
            to_u32, write_compressed_int, write_compressed_uint, CodedIndexKind, Column,
            MetadataBase, MetadataBuilder, TableId, Token,
        },
    },
    syntax::{SourceHashAlgorithm, SourceText},
    Result,
};

/// Kind of the embedded source custom debug information.
pub(crate) const EMBEDDED_SOURCE_KIND: Guid = guid!("0e8a571b-6926-466e-b4ad-8ab04611f5fe");
const SOURCE_LINK_KIND: Guid = guid!("cc110556-a091-4d38-9fec-25ab9a351a6a");
const MINI_LANGUAGE: Guid = guid!("5b2a3e5c-1d0b-4a5f-8c41-7e0d9f6c2a13");

/// Size of the PDB id: GUID and stamp.
pub(crate) const PDB_ID_SIZE: usize = 20;

/// A serialized portable PDB.
#[derive(Debug)]
pub(crate) struct PortablePdb {
    pub(crate) bytes: Vec<u8>,
    /// Offset of the 20-byte PDB id.
    pub(crate) id_offset: usize,
}

impl PortablePdb {
    pub(crate) fn set_id(&mut self, id: &[u8; PDB_ID_SIZE]) {
        self.bytes[self.id_offset..self.id_offset + PDB_ID_SIZE].copy_from_slice(id);
    }
}

/// Writes the PDB for `module`.
///
/// `methods` holds every MethodDef row of the image in row order with its body;
/// `type_system_rows` are the image's row counts.
pub(crate) fn write_portable_pdb(
    module: &ModuleBuilder,
    methods: &[(u32, Option<&MethodBody>)],
    type_system_rows: &[u32; 64],
    entry_point: Option<Token>,
) -> Result<PortablePdb> {
    let mut pdb = MetadataBuilder::new(MetadataBase::default(), None);
    let mut guids: HashMap<Guid, u32> = HashMap::new();
    let mut guid_index = |pdb: &mut MetadataBuilder, guid: Guid| -> u32 {
        *guids.entry(guid).or_insert_with(|| pdb.guids.add(guid))
    };

    // Documents
    let mut documents_by_tree: HashMap<usize, (u32, SourceText)> = HashMap::new();
    let mut documents_by_path: HashMap<String, u32> = HashMap::new();
    let mut next_document = 1u32;
    let mut add_document = |pdb: &mut MetadataBuilder,
                            path: &str,
                            algorithm: SourceHashAlgorithm,
                            hash: &[u8]|
     -> Result<u32> {
        let rid = next_document;
        next_document += 1;
        let name = document_name(pdb, path)?;
        let name = pdb.blobs.add(&name)?;
        let algorithm = guid_index(pdb, algorithm.pdb_guid());
        let hash = pdb.blobs.add(hash)?;
        let language = guid_index(pdb, MINI_LANGUAGE);
        pdb.tables.push(
            TableId::Document,
            rid,
            vec![
                Column::Blob(name),
                Column::Guid(algorithm),
                Column::Blob(hash),
                Column::Guid(language),
            ],
        );
        Ok(rid)
    };

    for tree in module.trees.iter() {
        if tree.file_path().is_empty() || documents_by_path.contains_key(tree.file_path()) {
            continue;
        }
        let text = tree.text();
        let rid = add_document(&mut pdb, tree.file_path(), text.checksum_algorithm(), text.checksum())?;
        documents_by_path.insert(tree.file_path().to_string(), rid);
        documents_by_tree.insert(tree.id(), (rid, tree.text().clone()));
    }

    let mut custom_debug_info: Vec<(TableId, u32, Guid, Vec<u8>)> = Vec::new();
    for embedded in &module.embedded_texts {
        let rid = match documents_by_path.get(embedded.path()) {
            Some(&rid) => rid,
            None => {
                let rid = add_document(
                    &mut pdb,
                    embedded.path(),
                    embedded.checksum_algorithm(),
                    embedded.checksum(),
                )?;
                documents_by_path.insert(embedded.path().to_string(), rid);
                rid
            }
        };
        custom_debug_info.push((TableId::Document, rid, EMBEDDED_SOURCE_KIND, embedded.blob()));
    }
    if let Some(source_link) = &module.source_link {
        custom_debug_info.push((TableId::Module, 1, SOURCE_LINK_KIND, source_link.clone()));
    }

    // Method debug information, one row per MethodDef
    for &(rid, body) in methods {
        let points = body.map_or(&[][..], |b| b.sequence_points.as_slice());
        let (document, blob) = match points.first() {
            Some(first) => match documents_by_tree.get(&first.tree.id()) {
                Some((document, text)) => {
                    let same_tree: Vec<&SequencePoint> = points
                        .iter()
                        .filter(|p| p.tree.id() == first.tree.id())
                        .collect();
                    let blob = sequence_points_blob(&same_tree, text)?;
                    (*document, pdb.blobs.add(&blob)?)
                }
                None => (0, 0),
            },
            None => (0, 0),
        };
        pdb.tables.push(
            TableId::MethodDebugInformation,
            rid,
            vec![
                Column::Table(TableId::Document, document),
                Column::Blob(blob),
            ],
        );
    }

    // Sorted by parent
    custom_debug_info.sort_by_key(|(table, rid, _, _)| {
        CodedIndexKind::HasCustomDebugInformation
            .encode(*table, *rid)
            .unwrap_or(u32::MAX)
    });
    for (index, (table, rid, kind, value)) in custom_debug_info.into_iter().enumerate() {
        let kind = guid_index(&mut pdb, kind);
        let value = pdb.blobs.add(&value)?;
        pdb.tables.push(
            TableId::CustomDebugInformation,
            to_u32(index + 1)?,
            vec![
                Column::Coded(CodedIndexKind::HasCustomDebugInformation, table, rid),
                Column::Guid(kind),
                Column::Blob(value),
            ],
        );
    }

    let mut pdb_stream = vec![0u8; PDB_ID_SIZE];
    pdb_stream.extend_from_slice(&entry_point.map_or(0, |t| t.value()).to_le_bytes());
    let mut referenced: u64 = 0;
    for (table, &rows) in type_system_rows.iter().enumerate().take(0x30) {
        if rows > 0 {
            referenced |= 1 << table;
        }
    }
    pdb_stream.extend_from_slice(&referenced.to_le_bytes());
    for &rows in type_system_rows.iter().take(0x30).filter(|&&r| r > 0) {
        pdb_stream.extend_from_slice(&rows.to_le_bytes());
    }

    let mut external = [0u32; 64];
    external[..0x30].copy_from_slice(&type_system_rows[..0x30]);
    let (bytes, id_offset) = pdb.serialize_pdb(pdb_stream, &external)?;
    log::debug!(
        "portable pdb: {} documents, {} methods, {} bytes",
        documents_by_path.len(),
        methods.len(),
        bytes.len()
    );
    Ok(PortablePdb { bytes, id_offset })
}

/// Document name blob: a separator followed by the blob indices of the parts.
fn document_name(pdb: &mut MetadataBuilder, path: &str) -> Result<Vec<u8>> {
    let separator = if path.contains('\\') { '\\' } else { '/' };
    let mut blob = vec![separator as u8];
    for part in path.split(separator) {
        let index = pdb.blobs.add(part.as_bytes())?;
        write_compressed_uint(index, &mut blob)?;
    }
    Ok(blob)
}

/// Encodes sequence points of one document. Offsets must be increasing; repeated
/// offsets keep the first point.
fn sequence_points_blob(points: &[&SequencePoint], text: &SourceText) -> Result<Vec<u8>> {
    let mut blob = Vec::new();
    // LocalSignature
    write_compressed_uint(0, &mut blob)?;

    let mut previous: Option<(u32, i64, i64)> = None;
    for point in points {
        let (start_line, start_column) = text.line_position(point.span.start);
        let (end_line, end_column) = text.line_position(point.span.end());
        let start_line = start_line as i64 + 1;
        let start_column = start_column as i64 + 1;
        let delta_lines = (end_line as i64 + 1) - start_line;
        let mut delta_columns = (end_column as i64 + 1) - start_column;
        if delta_lines == 0 && delta_columns <= 0 {
            delta_columns = 1;
        }

        match previous {
            Some((offset, _, _)) if point.offset <= offset => continue,
            Some((offset, _, _)) => write_compressed_uint(point.offset - offset, &mut blob)?,
            None => write_compressed_uint(point.offset, &mut blob)?,
        }
        write_compressed_uint(to_u32_checked(delta_lines)?, &mut blob)?;
        if delta_lines == 0 {
            write_compressed_uint(to_u32_checked(delta_columns)?, &mut blob)?;
        } else {
            write_compressed_int(to_i32_checked(delta_columns)?, &mut blob)?;
        }
        match previous {
            Some((_, line, column)) => {
                write_compressed_int(to_i32_checked(start_line - line)?, &mut blob)?;
                write_compressed_int(to_i32_checked(start_column - column)?, &mut blob)?;
            }
            None => {
                write_compressed_uint(to_u32_checked(start_line)?, &mut blob)?;
                write_compressed_uint(to_u32_checked(start_column)?, &mut blob)?;
            }
        }
        previous = Some((point.offset, start_line, start_column));
    }
    Ok(blob)
}

fn to_u32_checked(value: i64) -> Result<u32> {
    u32::try_from(value).map_err(|_| malformed_error!("sequence point value {} out of range", value))
}

fn to_i32_checked(value: i64) -> Result<i32> {
    i32::try_from(value).map_err(|_| malformed_error!("sequence point delta {} out of range", value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{lang::MiniLanguage, syntax::TextSpan};

    #[test]
    fn test_sequence_point_encoding() {
        let tree = MiniLanguage::parse("a\nbb\nccc", "a.mini");
        let points = [
            SequencePoint {
                offset: 0,
                tree: tree.clone(),
                span: TextSpan::new(2, 2),
            },
            SequencePoint {
                offset: 3,
                tree: tree.clone(),
                span: TextSpan::new(5, 3),
            },
            SequencePoint {
                offset: 3,
                tree: tree.clone(),
                span: TextSpan::new(0, 1),
            },
        ];
        let refs: Vec<&SequencePoint> = points.iter().collect();
        let blob = sequence_points_blob(&refs, tree.text()).unwrap();
        assert_eq!(blob, vec![0, 0, 0, 2, 2, 1, 3, 0, 3, 2, 0]);
    }

    #[test]
    fn test_document_name_blob() {
        let mut pdb = MetadataBuilder::new(MetadataBase::default(), None);
        let blob = document_name(&mut pdb, "src/a.mini").unwrap();
        assert_eq!(blob[0], b'/');
        assert_eq!(blob.len(), 3);
        let windows = document_name(&mut pdb, "C:\\src\\a.mini").unwrap();
        assert_eq!(windows[0], b'\\');
        assert_eq!(windows.len(), 4);
    }
}
