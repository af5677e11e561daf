//! `$I30` index decoding for directory side walks.

use crate::attrs::model::FileName;
use crate::attrs::parse::parse_file_name_value;
use crate::error::{EngineError, Frn, Result};
use crate::volume::geometry::Geometry;

const INDEX_ENTRY_FLAG_HAS_SUB_NODE: u16 = 0x0001;
const INDEX_ENTRY_FLAG_LAST: u16 = 0x0002;
const INDX_SIGNATURE: u32 = 0x5844_4E49; // "INDX"

#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub file_reference: u64,
    pub file_name: FileName,
    pub has_sub_node: bool,
    pub sub_node_vcn: Option<u64>,
    /// Found by the trailing-slack scan rather than the structured
    /// entry walk: it lives in bytes the index no longer considers
    /// live, independent of whether the enclosing block itself is
    /// marked allocated in the directory's `$BITMAP`.
    pub is_carved: bool,
}

/// Decode the fixed 16-byte `$INDEX_ROOT` prologue (attribute type,
/// collation rule, index record size) then the entries that follow its
/// embedded `INDEX_HEADER`.
pub fn parse_index_root(value: &[u8], frn: Frn) -> Result<Vec<IndexEntry>> {
    if value.len() < 32 {
        return Err(EngineError::CorruptRecord { frn, reason: "$INDEX_ROOT truncated".into() });
    }
    let first_entry_offset = u32::from_le_bytes(value[16..20].try_into().unwrap()) as usize;
    let total_size = u32::from_le_bytes(value[20..24].try_into().unwrap()) as usize;

    let entries_start = 16 + first_entry_offset;
    let entries_end = (16 + total_size).min(value.len());
    if entries_start > entries_end {
        return Err(EngineError::CorruptRecord { frn, reason: "$INDEX_ROOT entry range invalid".into() });
    }

    parse_entries(&value[entries_start..entries_end], frn)
}

/// Decode one `$INDEX_ALLOCATION` block (one `INDX`-signed, fixed-size
/// index record). Applies the same multi-sector fixup scheme as an MFT
/// record. Returns the block's own VCN and its entries.
pub fn parse_index_allocation_block(
    raw: &mut [u8],
    frn: Frn,
    geometry: &Geometry,
) -> Result<(u64, Vec<IndexEntry>)> {
    if raw.len() < 40 {
        return Err(EngineError::CorruptRecord { frn, reason: "index allocation block truncated".into() });
    }
    let signature = u32::from_le_bytes(raw[0..4].try_into().unwrap());
    if signature != INDX_SIGNATURE {
        return Err(EngineError::CorruptRecord { frn, reason: "bad INDX signature".into() });
    }
    let update_sequence_offset = u16::from_le_bytes([raw[4], raw[5]]) as usize;
    let update_sequence_size = u16::from_le_bytes([raw[6], raw[7]]) as usize;
    let vcn = u64::from_le_bytes(raw[16..24].try_into().unwrap());

    apply_index_fixup(raw, update_sequence_offset, update_sequence_size, frn, geometry)?;

    let header_base = 24;
    let first_entry_offset = u32::from_le_bytes(raw[header_base..header_base + 4].try_into().unwrap()) as usize;
    let total_size = u32::from_le_bytes(raw[header_base + 4..header_base + 8].try_into().unwrap()) as usize;

    let entries_start = header_base + first_entry_offset;
    let entries_end = (header_base + total_size).min(raw.len());
    if entries_start > entries_end {
        return Err(EngineError::CorruptRecord { frn, reason: "index allocation entry range invalid".into() });
    }

    let entries = parse_entries(&raw[entries_start..entries_end], frn)?;
    Ok((vcn, entries))
}

fn parse_entries(data: &[u8], frn: Frn) -> Result<Vec<IndexEntry>> {
    let mut entries = Vec::new();
    let mut offset = 0usize;

    while offset + 16 <= data.len() {
        let file_reference = u64::from_le_bytes(data[offset..offset + 8].try_into().unwrap());
        let entry_length = u16::from_le_bytes([data[offset + 8], data[offset + 9]]) as usize;
        let name_length = u16::from_le_bytes([data[offset + 10], data[offset + 11]]) as usize;
        let flags = u16::from_le_bytes([data[offset + 12], data[offset + 13]]);

        if entry_length < 16 || offset + entry_length > data.len() {
            break;
        }
        let has_sub_node = flags & INDEX_ENTRY_FLAG_HAS_SUB_NODE != 0;
        let is_last = flags & INDEX_ENTRY_FLAG_LAST != 0;

        if !is_last && name_length >= 66 {
            let name_bytes = &data[offset + 16..offset + 16 + name_length];
            if let Ok(file_name) = parse_file_name_value(name_bytes, frn) {
                let sub_node_vcn = if has_sub_node {
                    let vcn_offset = offset + entry_length - 8;
                    Some(u64::from_le_bytes(data[vcn_offset..vcn_offset + 8].try_into().unwrap()))
                } else {
                    None
                };
                entries.push(IndexEntry {
                    file_reference,
                    file_name,
                    has_sub_node,
                    sub_node_vcn,
                    is_carved: false,
                });
            }
        }

        offset += entry_length;
        if is_last {
            break;
        }
    }

    entries.extend(scan_slack(&data[offset.min(data.len())..], frn));
    Ok(entries)
}

/// Walks unused trailing bytes (past the last structured entry, or the
/// whole block when the caller already knows it carries no live
/// entries) looking for byte patterns that still decode as a plausible
/// `$FILE_NAME` index entry. Candidates are tried every 8 bytes, the
/// alignment every real entry is padded to, and are kept only if every
/// structural field checks out: a real entry decoding cleanly here by
/// chance is vanishingly unlikely, but a corrupt one is rejected by
/// `parse_file_name_value`'s own field validation.
fn scan_slack(data: &[u8], frn: Frn) -> Vec<IndexEntry> {
    let mut carved = Vec::new();
    let mut offset = 0usize;
    while offset + 16 <= data.len() {
        if let Some(entry) = try_parse_carved_entry(data, offset, frn) {
            carved.push(entry);
        }
        offset += 8;
    }
    carved
}

fn try_parse_carved_entry(data: &[u8], offset: usize, frn: Frn) -> Option<IndexEntry> {
    let file_reference = u64::from_le_bytes(data[offset..offset + 8].try_into().ok()?);
    let entry_length = u16::from_le_bytes([data[offset + 8], data[offset + 9]]) as usize;
    let name_length = u16::from_le_bytes([data[offset + 10], data[offset + 11]]) as usize;
    let flags = u16::from_le_bytes([data[offset + 12], data[offset + 13]]);

    if entry_length < 16 || entry_length % 8 != 0 || offset + entry_length > data.len() {
        return None;
    }
    if flags & INDEX_ENTRY_FLAG_LAST != 0 || name_length < 66 {
        return None;
    }
    if offset + 16 + name_length > offset + entry_length {
        return None;
    }

    let name_bytes = &data[offset + 16..offset + 16 + name_length];
    let file_name = parse_file_name_value(name_bytes, frn).ok()?;

    let has_sub_node = flags & INDEX_ENTRY_FLAG_HAS_SUB_NODE != 0;
    let sub_node_vcn = if has_sub_node {
        let vcn_offset = offset + entry_length - 8;
        Some(u64::from_le_bytes(data[vcn_offset..vcn_offset + 8].try_into().ok()?))
    } else {
        None
    };

    Some(IndexEntry { file_reference, file_name, has_sub_node, sub_node_vcn, is_carved: true })
}

fn apply_index_fixup(
    data: &mut [u8],
    array_offset: usize,
    array_size: usize,
    frn: Frn,
    geometry: &Geometry,
) -> Result<()> {
    let sector_size = geometry.bytes_per_sector as usize;
    if array_size == 0 || sector_size == 0 || array_offset + 2 > data.len() {
        return Err(EngineError::CorruptFixup { frn, sector: 0 });
    }
    let token = u16::from_le_bytes([data[array_offset], data[array_offset + 1]]);

    for i in 1..array_size {
        let trailer = i * sector_size - 2;
        let slot = array_offset + i * 2;
        if trailer + 2 > data.len() || slot + 2 > data.len() {
            break;
        }
        let stored = u16::from_le_bytes([data[trailer], data[trailer + 1]]);
        if stored != token {
            return Err(EngineError::CorruptFixup { frn, sector: i });
        }
        data[trailer] = data[slot];
        data[trailer + 1] = data[slot + 1];
    }
    Ok(())
}
