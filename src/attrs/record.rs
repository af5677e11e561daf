//! Raw MFT record header and multi-sector fixup.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

use crate::error::{EngineError, Frn, Result};
use crate::volume::geometry::Geometry;

pub const MFT_RECORD_SIGNATURE: u32 = 0x4C49_4546; // "FILE"

pub const RECORD_IN_USE: u16 = 0x0001;
pub const RECORD_IS_DIRECTORY: u16 = 0x0002;
pub const RECORD_IN_EXTEND: u16 = 0x0004;
pub const RECORD_IS_VIEW_INDEX: u16 = 0x0008;

#[derive(Debug, Clone, Default)]
pub struct RecordHeader {
    pub signature: u32,
    pub update_sequence_offset: u16,
    pub update_sequence_size: u16,
    pub log_sequence_number: u64,
    pub sequence_number: u16,
    pub hard_link_count: u16,
    pub first_attribute_offset: u16,
    pub flags: u16,
    pub used_size: u32,
    pub allocated_size: u32,
    pub base_record_reference: u64,
    pub next_attribute_id: u16,
    pub record_number: u32,
}

impl RecordHeader {
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < 48 {
            return None;
        }
        let mut cursor = Cursor::new(data);
        Some(Self {
            signature: cursor.read_u32::<LittleEndian>().ok()?,
            update_sequence_offset: cursor.read_u16::<LittleEndian>().ok()?,
            update_sequence_size: cursor.read_u16::<LittleEndian>().ok()?,
            log_sequence_number: cursor.read_u64::<LittleEndian>().ok()?,
            sequence_number: cursor.read_u16::<LittleEndian>().ok()?,
            hard_link_count: cursor.read_u16::<LittleEndian>().ok()?,
            first_attribute_offset: cursor.read_u16::<LittleEndian>().ok()?,
            flags: cursor.read_u16::<LittleEndian>().ok()?,
            used_size: cursor.read_u32::<LittleEndian>().ok()?,
            allocated_size: cursor.read_u32::<LittleEndian>().ok()?,
            base_record_reference: cursor.read_u64::<LittleEndian>().ok()?,
            next_attribute_id: cursor.read_u16::<LittleEndian>().ok()?,
            record_number: 0,
        })
    }

    pub fn is_valid(&self) -> bool {
        self.signature == MFT_RECORD_SIGNATURE
    }

    pub fn is_in_use(&self) -> bool {
        self.flags & RECORD_IN_USE != 0
    }

    pub fn is_directory(&self) -> bool {
        self.flags & RECORD_IS_DIRECTORY != 0
    }

    pub fn is_extension(&self) -> bool {
        self.flags & RECORD_IN_EXTEND != 0
    }

    pub fn base_record_number(&self) -> u64 {
        self.base_record_reference & 0x0000_FFFF_FFFF_FFFF
    }

    pub fn is_base_record(&self) -> bool {
        self.base_record_reference == 0
    }

    /// Full 64-bit FRN of this record (segment = `record_number`,
    /// sequence from this header).
    pub fn frn(&self) -> Frn {
        (self.record_number as u64) | ((self.sequence_number as u64) << 48)
    }
}

/// Verify and restore the update-sequence-array fixup: for each
/// sector stride of the volume's own `bytes_per_sector`, the trailing
/// two bytes must equal the stored sequence token; they are then
/// replaced with the corresponding original bytes from the fixup array.
pub fn apply_fixup(data: &mut [u8], header: &RecordHeader, geometry: &Geometry) -> Result<()> {
    let sector_size = geometry.bytes_per_sector as usize;
    let array_offset = header.update_sequence_offset as usize;
    let array_len = header.update_sequence_size as usize;

    if array_len == 0 || sector_size == 0 || array_offset + 2 > data.len() {
        return Err(EngineError::CorruptFixup { frn: header.frn(), sector: 0 });
    }

    let sequence_token = u16::from_le_bytes([data[array_offset], data[array_offset + 1]]);

    for i in 1..array_len {
        let sector_trailer = i * sector_size - 2;
        let fixup_slot = array_offset + i * 2;

        if sector_trailer + 2 > data.len() || fixup_slot + 2 > data.len() {
            break;
        }

        let stored = u16::from_le_bytes([data[sector_trailer], data[sector_trailer + 1]]);
        if stored != sequence_token {
            return Err(EngineError::CorruptFixup { frn: header.frn(), sector: i });
        }

        data[sector_trailer] = data[fixup_slot];
        data[sector_trailer + 1] = data[fixup_slot + 1];
    }

    Ok(())
}
