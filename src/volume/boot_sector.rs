//! Boot-sector parsing, shared by every backing-store variant.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

use crate::error::{EngineError, Result};
use super::geometry::{FsKind, Geometry, ROOT_DIRECTORY_FRN, SECURE_FRN};

const NTFS_OEM_ID: &[u8; 8] = b"NTFS    ";
const REFS_SIGNATURE: &[u8; 4] = b"ReFS";
const BITLOCKER_SIGNATURE: &[u8; 8] = b"-FVE-FS-";

const VALID_SECTORS_PER_CLUSTER: &[u8] = &[1, 2, 4, 8, 16, 32, 64, 128];

/// Parse the first 512 bytes of a volume/image/partition and return its
/// geometry. Dispatch is purely signature-based; FAT/ReFS/BitLocker are
/// recognized only far enough to fail with `UnsupportedFs` at open time
/// (this engine's dispatch contract, not a parser for those filesystems).
pub fn parse_boot_sector(data: &[u8]) -> Result<Geometry> {
    if data.len() < 0x50 {
        return Err(EngineError::ShortRead { offset: 0, wanted: 0x50, got: data.len() });
    }

    if &data[0x03..0x0B] == NTFS_OEM_ID.as_slice() {
        return parse_ntfs(data);
    }
    if &data[0..4] == REFS_SIGNATURE.as_slice() || &data[3..7] == REFS_SIGNATURE.as_slice() {
        return Err(EngineError::UnsupportedFs("ReFS".into()));
    }
    if &data[3..11] == BITLOCKER_SIGNATURE.as_slice() {
        return Err(EngineError::UnsupportedFs("BitLocker-encrypted volume".into()));
    }
    if let Some(kind) = detect_fat(data) {
        return Err(EngineError::UnsupportedFs(format!("{kind:?}")));
    }

    Err(EngineError::UnsupportedFs("unrecognized boot sector signature".into()))
}

fn detect_fat(data: &[u8]) -> Option<FsKind> {
    // FAT12/16 system-id string lives at 0x36, FAT32's at 0x52.
    let fat16_id = &data[0x36..0x3E];
    let fat32_id = data.get(0x52..0x5A)?;
    if fat16_id.starts_with(b"FAT12") {
        return Some(FsKind::Fat12);
    }
    if fat16_id.starts_with(b"FAT16") {
        return Some(FsKind::Fat16);
    }
    if fat32_id.starts_with(b"FAT32") {
        return Some(FsKind::Fat32);
    }
    None
}

fn parse_ntfs(data: &[u8]) -> Result<Geometry> {
    let bytes_per_sector = u16::from_le_bytes([data[0x0B], data[0x0C]]) as u32;
    let sectors_per_cluster = data[0x0D];

    // BPB fields that must be zero on a well-formed NTFS boot sector.
    let reserved_sectors = u16::from_le_bytes([data[0x0E], data[0x0F]]);
    let num_fats = data[0x10];
    let root_entries = u16::from_le_bytes([data[0x11], data[0x12]]);
    let total_sectors_16 = u16::from_le_bytes([data[0x13], data[0x14]]);
    let sectors_per_fat_16 = u16::from_le_bytes([data[0x16], data[0x17]]);
    let total_sectors_32 = u32::from_le_bytes([data[0x20], data[0x21], data[0x22], data[0x23]]);

    if reserved_sectors != 0
        || num_fats != 0
        || root_entries != 0
        || total_sectors_16 != 0
        || sectors_per_fat_16 != 0
        || total_sectors_32 != 0
    {
        return Err(EngineError::UnsupportedFs(
            "NTFS OEM id present but reserved BPB fields are non-zero".into(),
        ));
    }

    if !VALID_SECTORS_PER_CLUSTER.contains(&sectors_per_cluster) {
        return Err(EngineError::UnsupportedFs(format!(
            "invalid SectorsPerCluster {sectors_per_cluster}"
        )));
    }

    let mut cursor = Cursor::new(&data[0x28..]);
    let total_sectors = cursor.read_u64::<LittleEndian>()?;
    let mft_start_lcn = cursor.read_u64::<LittleEndian>()?;
    let mft_mirror_start_lcn = cursor.read_u64::<LittleEndian>()?;
    let clusters_per_mft_record = data[0x40] as i8;
    // byte at 0x44 is ClustersPerIndexBlock; unused by geometry itself.
    let serial = u64::from_le_bytes(data[0x48..0x50].try_into().unwrap());

    let bytes_per_cluster = bytes_per_sector * sectors_per_cluster as u32;
    let bytes_per_frs = if clusters_per_mft_record < 0 {
        1u32 << (-clusters_per_mft_record as u32)
    } else {
        clusters_per_mft_record as u32 * bytes_per_cluster
    };

    let geometry = Geometry {
        bytes_per_sector,
        bytes_per_cluster,
        bytes_per_frs,
        total_sectors,
        serial,
        fs_kind: FsKind::Ntfs,
        mft_start_lcn,
        mft_mirror_start_lcn,
        root_dir_frn: ROOT_DIRECTORY_FRN,
        secure_frn: SECURE_FRN,
    };

    if bytes_per_frs % 1024 != 0 {
        return Err(EngineError::UnsupportedFs(format!(
            "bytes-per-FRS {bytes_per_frs} is not a multiple of 1024"
        )));
    }
    if !geometry.is_well_formed() {
        return Err(EngineError::UnsupportedFs("boot sector geometry failed invariant checks".into()));
    }

    Ok(geometry)
}
