//! `$Secure` side walk: one event per security-descriptor entry
//! found via the `$SII` index over `$SDS`. The descriptor bytes
//! themselves are opaque to the engine.

use crate::error::{EngineError, Frn, Result};

#[derive(Debug, Clone)]
pub struct SecurityDescriptorEntry {
    pub security_id: u32,
    pub hash: u32,
    pub offset: u64,
    pub size: u32,
    pub descriptor: Vec<u8>,
}

/// Walk `$SII`'s resident index root for `$Secure`, then slice the
/// matching descriptor bytes out of `$SDS`. `$SII`'s index entries key
/// on security id and carry the `(offset, size)` of the descriptor
/// inside `$SDS`; this engine does not walk `$SII`'s own
/// `$INDEX_ALLOCATION` overflow (most volumes keep few enough unique
/// descriptors that the root fits resident).
pub fn walk_security_descriptors(sii_index_root: &[u8], sds: &[u8], frn: Frn) -> Result<Vec<SecurityDescriptorEntry>> {
    let entries = parse_index_root_raw(sii_index_root, frn)?;
    let mut out = Vec::with_capacity(entries.len());

    for (security_id, hash, offset, size) in entries {
        let start = offset as usize;
        let end = start + size as usize;
        let descriptor = sds.get(start..end).map(|s| s.to_vec()).unwrap_or_default();
        out.push(SecurityDescriptorEntry { security_id, hash, offset, size, descriptor });
    }

    Ok(out)
}

/// `$SII` entries are `SII_INDEX_KEY`/`SII_INDEX_DATA` pairs, not
/// `$FILE_NAME` structures, so they need their own entry parser rather
/// than `mft::i30`'s `$FILE_NAME`-shaped one; the 16-byte
/// `INDEX_HEADER` framing is identical, so that part is reused.
fn parse_index_root_raw(value: &[u8], frn: Frn) -> Result<Vec<(u32, u32, u64, u32)>> {
    if value.len() < 32 {
        return Err(EngineError::CorruptRecord { frn, reason: "$SII index root truncated".into() });
    }
    let first_entry_offset = u32::from_le_bytes(value[16..20].try_into().unwrap()) as usize;
    let total_size = u32::from_le_bytes(value[20..24].try_into().unwrap()) as usize;
    let start = 16 + first_entry_offset;
    let end = (16 + total_size).min(value.len());
    if start > end {
        return Err(EngineError::CorruptRecord { frn, reason: "$SII entry range invalid".into() });
    }

    let data = &value[start..end];
    let mut offset = 0usize;
    let mut out = Vec::new();

    while offset + 16 <= data.len() {
        let entry_length = u16::from_le_bytes([data[offset + 8], data[offset + 9]]) as usize;
        let flags = u16::from_le_bytes([data[offset + 12], data[offset + 13]]);
        const LAST: u16 = 0x0002;
        if entry_length < 16 || offset + entry_length > data.len() {
            break;
        }

        if flags & LAST == 0 && entry_length >= 40 {
            // SII_INDEX_KEY: security_id (u32) at +16; SII_INDEX_DATA:
            // hash (u32), security_id (u32, duplicate), offset (u64),
            // size (u32) starting at +20.
            let security_id = u32::from_le_bytes(data[offset + 16..offset + 20].try_into().unwrap());
            let hash = u32::from_le_bytes(data[offset + 20..offset + 24].try_into().unwrap());
            let sds_offset = u64::from_le_bytes(data[offset + 28..offset + 36].try_into().unwrap());
            let size = u32::from_le_bytes(data[offset + 36..offset + 40].try_into().unwrap());
            out.push((security_id, hash, sds_offset, size));
        }

        if flags & LAST != 0 {
            break;
        }
        offset += entry_length;
    }

    Ok(out)
}
