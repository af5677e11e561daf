//! Synthetic NTFS volume image builder, used by the scenario tests in
//! `tests/`. Hand-assembles boot sector, `$MFT` records and `$I30`
//! index-allocation blocks byte-for-byte, the same way the unit tests
//! in `attrs::record`/`volume::boot_sector` build their own small
//! fixtures, just scaled up to a whole tiny volume.

use std::io::{Seek, SeekFrom, Write};

use tempfile::NamedTempFile;

pub const BYTES_PER_SECTOR: u64 = 512;
pub const SECTORS_PER_CLUSTER: u8 = 8;
pub const BYTES_PER_CLUSTER: u64 = BYTES_PER_SECTOR * SECTORS_PER_CLUSTER as u64;
pub const BYTES_PER_FRS: u64 = 1024;
pub const MFT_START_LCN: u64 = 1;
pub const MFT_RECORD_SLOTS: u64 = 32;
pub const MFT_CLUSTERS: u64 = (MFT_RECORD_SLOTS * BYTES_PER_FRS) / BYTES_PER_CLUSTER;
pub const DATA_START_LCN: u64 = MFT_START_LCN + MFT_CLUSTERS;

pub const ROOT_DIRECTORY_FRN: u64 = 5;
const MFT_RECORD_FRN: u64 = 0;

const MFT_RECORD_SIGNATURE: u32 = 0x4C49_4546; // "FILE"
const ATTRIBUTE_TERMINATOR: u32 = 0xFFFF_FFFF;
const RECORD_IN_USE: u16 = 0x0001;
const RECORD_IS_DIRECTORY: u16 = 0x0002;
const RECORD_FIXUP_TOKEN: u16 = 0x5A5A;
const INDX_FIXUP_TOKEN: u16 = 0x9999;
const INDX_SIGNATURE: u32 = 0x5844_4E49; // "INDX"
const INDEX_ENTRY_FLAG_LAST: u16 = 0x0002;

fn align8(n: usize) -> usize {
    (n + 7) / 8 * 8
}

fn utf16le(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
}

/// Patch the update-sequence-array fixup into place: store the token at
/// `array_offset`, capture each covered sector's trailing two bytes into
/// the array, then overwrite the trailer with the token. The inverse of
/// `attrs::record::apply_fixup`/`mft::i30::apply_index_fixup`.
fn apply_usa_encoding(data: &mut [u8], array_offset: usize, array_size: usize, token: u16) {
    const SECTOR_SIZE: usize = 512;
    data[array_offset..array_offset + 2].copy_from_slice(&token.to_le_bytes());
    for i in 1..array_size {
        let trailer = i * SECTOR_SIZE - 2;
        if trailer + 2 > data.len() {
            break;
        }
        let orig = [data[trailer], data[trailer + 1]];
        let slot = array_offset + i * 2;
        data[slot..slot + 2].copy_from_slice(&orig);
        data[trailer..trailer + 2].copy_from_slice(&token.to_le_bytes());
    }
}

fn build_boot_sector() -> Vec<u8> {
    let mut b = vec![0u8; 512];
    b[0x03..0x0B].copy_from_slice(b"NTFS    ");
    b[0x0B..0x0D].copy_from_slice(&(BYTES_PER_SECTOR as u16).to_le_bytes());
    b[0x0D] = SECTORS_PER_CLUSTER;
    b[0x28..0x30].copy_from_slice(&1_000_000u64.to_le_bytes());
    b[0x30..0x38].copy_from_slice(&MFT_START_LCN.to_le_bytes());
    b[0x38..0x40].copy_from_slice(&(MFT_START_LCN + MFT_CLUSTERS).to_le_bytes());
    b[0x40] = (-10i8) as u8; // 2^10 = 1024-byte FRS
    b[0x48..0x50].copy_from_slice(&0xFEED_FACE_CAFE_0001u64.to_le_bytes());
    b
}

/// One data run, pre-encoding: `(cluster_count, delta)` where `delta`
/// is the LCN delta from the previous real run, or `None` for a sparse
/// run. All counts/deltas used by these fixtures are small and positive,
/// so a fixed 4-byte width per field is always safe (never triggers the
/// decoder's sign-extension branch).
pub fn encode_mapping_pairs(runs: &[(u64, Option<i64>)]) -> Vec<u8> {
    let mut out = Vec::new();
    for (count, delta) in runs {
        match delta {
            None => {
                out.push(0x04);
                out.extend_from_slice(&(*count as u32).to_le_bytes());
            }
            Some(d) => {
                out.push(0x44);
                out.extend_from_slice(&(*count as u32).to_le_bytes());
                out.extend_from_slice(&(*d as i32).to_le_bytes());
            }
        }
    }
    out.push(0);
    out
}

pub struct FileNameSpec {
    pub parent_reference: u64,
    pub name: String,
    pub namespace: u8,
    pub file_attributes: u32,
    pub allocated_size: u64,
    pub data_size: u64,
}

impl FileNameSpec {
    pub fn new(parent_reference: u64, name: &str) -> Self {
        Self {
            parent_reference,
            name: name.to_string(),
            namespace: 1, // Win32
            file_attributes: 0x20, // ARCHIVE
            allocated_size: 0,
            data_size: 0,
        }
    }

    pub fn directory(parent_reference: u64, name: &str) -> Self {
        Self { file_attributes: 0x10, ..Self::new(parent_reference, name) } // DIRECTORY
    }
}

pub fn encode_file_name(spec: &FileNameSpec) -> Vec<u8> {
    let name_bytes = utf16le(&spec.name);
    let mut buf = vec![0u8; 66 + name_bytes.len()];
    buf[0..8].copy_from_slice(&spec.parent_reference.to_le_bytes());
    buf[40..48].copy_from_slice(&spec.allocated_size.to_le_bytes());
    buf[48..56].copy_from_slice(&spec.data_size.to_le_bytes());
    buf[56..60].copy_from_slice(&spec.file_attributes.to_le_bytes());
    buf[64] = spec.name.encode_utf16().count() as u8;
    buf[65] = spec.namespace;
    buf[66..66 + name_bytes.len()].copy_from_slice(&name_bytes);
    buf
}

/// One attribute, unencoded. `build_record` lays these out back to back
/// and terminates the list; this crate's attribute-engine parser is the
/// reader side of exactly this layout (`attrs::parse::parse_one_attribute`).
pub enum AttrSpec {
    Resident { type_code: u32, name: Option<String>, value: Vec<u8> },
    NonResident {
        type_code: u32,
        name: Option<String>,
        lowest_vcn: u64,
        highest_vcn: u64,
        compression_unit: u16,
        allocated_size: u64,
        file_size: u64,
        valid_data_size: u64,
        runs: Vec<u8>,
    },
}

impl AttrSpec {
    pub fn standard_information() -> Self {
        let mut value = vec![0u8; 48];
        value[32..36].copy_from_slice(&0x20u32.to_le_bytes()); // ARCHIVE
        AttrSpec::Resident { type_code: 0x10, name: None, value }
    }

    pub fn file_name(spec: FileNameSpec) -> Self {
        AttrSpec::Resident { type_code: 0x30, name: None, value: encode_file_name(&spec) }
    }

    pub fn data_resident(content: &[u8]) -> Self {
        AttrSpec::Resident { type_code: 0x80, name: None, value: content.to_vec() }
    }

    pub fn data_non_resident(runs: &[(u64, Option<i64>)], file_size: u64) -> Self {
        let cluster_total: u64 = runs.iter().map(|(c, _)| *c).sum();
        let allocated_size = cluster_total * BYTES_PER_CLUSTER;
        AttrSpec::NonResident {
            type_code: 0x80,
            name: None,
            lowest_vcn: 0,
            highest_vcn: cluster_total.saturating_sub(1),
            compression_unit: 0,
            allocated_size,
            file_size,
            valid_data_size: file_size,
            runs: encode_mapping_pairs(runs),
        }
    }

    pub fn index_root_empty() -> Self {
        let mut value = vec![0u8; 48];
        value[16..20].copy_from_slice(&16u32.to_le_bytes()); // first_entry_offset (rel. to byte 16)
        value[20..24].copy_from_slice(&32u32.to_le_bytes()); // total_size (rel. to byte 16)
        value[32..34].copy_from_slice(&16u16.to_le_bytes()); // terminator entry_length
        value[36..38].copy_from_slice(&INDEX_ENTRY_FLAG_LAST.to_le_bytes());
        AttrSpec::Resident { type_code: 0x90, name: Some("$I30".into()), value }
    }

    pub fn index_allocation(runs: &[(u64, Option<i64>)], block_count: u64) -> Self {
        let file_size = block_count * BYTES_PER_CLUSTER;
        AttrSpec::NonResident {
            type_code: 0xA0,
            name: Some("$I30".into()),
            lowest_vcn: 0,
            highest_vcn: block_count.saturating_sub(1),
            compression_unit: 0,
            allocated_size: file_size,
            file_size,
            valid_data_size: file_size,
            runs: encode_mapping_pairs(runs),
        }
    }

    pub fn bitmap_resident(bits: Vec<u8>) -> Self {
        AttrSpec::Resident { type_code: 0xB0, name: Some("$I30".into()), value: bits }
    }
}

fn encode_attr(spec: &AttrSpec, instance_id: u16) -> Vec<u8> {
    match spec {
        AttrSpec::Resident { type_code, name, value } => {
            let header_len = 24usize;
            let name_bytes = name.as_ref().map(|n| utf16le(n)).unwrap_or_default();
            let name_offset = if name_bytes.is_empty() { 0 } else { header_len };
            let value_offset = align8(header_len + name_bytes.len());
            let total_len = align8(value_offset + value.len()).max(8);

            let mut buf = vec![0u8; total_len];
            buf[0..4].copy_from_slice(&type_code.to_le_bytes());
            buf[4..8].copy_from_slice(&(total_len as u32).to_le_bytes());
            buf[8] = 0;
            buf[9] = name.as_ref().map(|n| n.encode_utf16().count() as u8).unwrap_or(0);
            buf[10..12].copy_from_slice(&(name_offset as u16).to_le_bytes());
            buf[14..16].copy_from_slice(&instance_id.to_le_bytes());
            buf[16..20].copy_from_slice(&(value.len() as u32).to_le_bytes());
            buf[20..22].copy_from_slice(&(value_offset as u16).to_le_bytes());
            if !name_bytes.is_empty() {
                buf[name_offset..name_offset + name_bytes.len()].copy_from_slice(&name_bytes);
            }
            buf[value_offset..value_offset + value.len()].copy_from_slice(value);
            buf
        }
        AttrSpec::NonResident {
            type_code,
            name,
            lowest_vcn,
            highest_vcn,
            compression_unit,
            allocated_size,
            file_size,
            valid_data_size,
            runs,
        } => {
            let header_len = 64usize;
            let name_bytes = name.as_ref().map(|n| utf16le(n)).unwrap_or_default();
            let name_offset = if name_bytes.is_empty() { 0 } else { header_len };
            let runs_offset = align8(header_len + name_bytes.len());
            let total_len = align8(runs_offset + runs.len());

            let mut buf = vec![0u8; total_len];
            buf[0..4].copy_from_slice(&type_code.to_le_bytes());
            buf[4..8].copy_from_slice(&(total_len as u32).to_le_bytes());
            buf[8] = 1;
            buf[9] = name.as_ref().map(|n| n.encode_utf16().count() as u8).unwrap_or(0);
            buf[10..12].copy_from_slice(&(name_offset as u16).to_le_bytes());
            buf[14..16].copy_from_slice(&instance_id.to_le_bytes());
            buf[16..24].copy_from_slice(&lowest_vcn.to_le_bytes());
            buf[24..32].copy_from_slice(&highest_vcn.to_le_bytes());
            buf[32..34].copy_from_slice(&(runs_offset as u16).to_le_bytes());
            buf[34..36].copy_from_slice(&compression_unit.to_le_bytes());
            buf[40..48].copy_from_slice(&allocated_size.to_le_bytes());
            buf[48..56].copy_from_slice(&file_size.to_le_bytes());
            buf[56..64].copy_from_slice(&valid_data_size.to_le_bytes());
            if !name_bytes.is_empty() {
                buf[name_offset..name_offset + name_bytes.len()].copy_from_slice(&name_bytes);
            }
            buf[runs_offset..runs_offset + runs.len()].copy_from_slice(runs);
            buf
        }
    }
}

/// Assemble one 1024-byte FRS record: header, attributes back to back,
/// terminator, then the update-sequence fixup.
pub fn build_record(sequence_number: u16, flags: u16, base_record_reference: u64, attrs: &[AttrSpec]) -> Vec<u8> {
    let frs = BYTES_PER_FRS as usize;
    let mut data = vec![0u8; frs];
    data[0..4].copy_from_slice(&MFT_RECORD_SIGNATURE.to_le_bytes());

    let array_offset = 48usize;
    let sectors = frs / 512;
    let array_size = sectors + 1;
    data[4..6].copy_from_slice(&(array_offset as u16).to_le_bytes());
    data[6..8].copy_from_slice(&(array_size as u16).to_le_bytes());
    data[16..18].copy_from_slice(&sequence_number.to_le_bytes());
    data[18..20].copy_from_slice(&1u16.to_le_bytes()); // hard_link_count

    let first_attribute_offset = 56usize;
    data[20..22].copy_from_slice(&(first_attribute_offset as u16).to_le_bytes());
    data[22..24].copy_from_slice(&flags.to_le_bytes());
    data[32..40].copy_from_slice(&base_record_reference.to_le_bytes());

    let mut offset = first_attribute_offset;
    let mut next_id = 0u16;
    for spec in attrs {
        let bytes = encode_attr(spec, next_id);
        assert!(offset + bytes.len() + 8 <= frs, "synthetic record overflowed {frs} bytes");
        data[offset..offset + bytes.len()].copy_from_slice(&bytes);
        offset += bytes.len();
        next_id += 1;
    }
    data[offset..offset + 4].copy_from_slice(&ATTRIBUTE_TERMINATOR.to_le_bytes());
    let used_size = offset + 4;
    data[24..28].copy_from_slice(&(used_size as u32).to_le_bytes());
    data[28..32].copy_from_slice(&(frs as u32).to_le_bytes());
    data[40..42].copy_from_slice(&next_id.to_le_bytes());

    apply_usa_encoding(&mut data, array_offset, array_size, RECORD_FIXUP_TOKEN);
    data
}

pub fn build_file_record(name: FileNameSpec, extra: Vec<AttrSpec>) -> Vec<u8> {
    let mut attrs = vec![AttrSpec::standard_information(), AttrSpec::file_name(name)];
    attrs.extend(extra);
    build_record(0, RECORD_IN_USE, 0, &attrs)
}

pub fn build_directory_record(name: FileNameSpec, extra: Vec<AttrSpec>) -> Vec<u8> {
    let mut attrs = vec![AttrSpec::standard_information(), AttrSpec::file_name(name)];
    attrs.extend(extra);
    build_record(0, RECORD_IN_USE | RECORD_IS_DIRECTORY, 0, &attrs)
}

/// One `$INDEX_ALLOCATION`/`$I30` index entry: `file_reference` +
/// embedded `$FILE_NAME`, non-last (a terminator is always appended
/// after the caller's own entries by `build_index_allocation_block`).
pub fn index_entry(file_reference: u64, name: &FileNameSpec) -> Vec<u8> {
    let fname = encode_file_name(name);
    let entry_length = 16 + fname.len();
    let mut e = vec![0u8; entry_length];
    e[0..8].copy_from_slice(&file_reference.to_le_bytes());
    e[8..10].copy_from_slice(&(entry_length as u16).to_le_bytes());
    e[10..12].copy_from_slice(&(fname.len() as u16).to_le_bytes());
    e[16..16 + fname.len()].copy_from_slice(&fname);
    e
}

fn index_terminator_entry() -> Vec<u8> {
    let mut e = vec![0u8; 16];
    e[8..10].copy_from_slice(&16u16.to_le_bytes());
    e[12..14].copy_from_slice(&INDEX_ENTRY_FLAG_LAST.to_le_bytes());
    e
}

/// One 4096-byte (8-sector) `$INDEX_ALLOCATION` block: `entries`, as
/// built by one or more `index_entry` calls concatenated, followed by
/// the terminator this function appends itself.
pub fn build_index_allocation_block(vcn: u64, entries: &[u8]) -> Vec<u8> {
    let block_len = BYTES_PER_CLUSTER as usize;
    let mut data = vec![0u8; block_len];
    data[0..4].copy_from_slice(&INDX_SIGNATURE.to_le_bytes());

    let array_offset = 40usize;
    let array_size = block_len / 512 + 1; // 9: 8 sectors + token slot
    data[4..6].copy_from_slice(&(array_offset as u16).to_le_bytes());
    data[6..8].copy_from_slice(&(array_size as u16).to_le_bytes());
    data[16..24].copy_from_slice(&vcn.to_le_bytes());

    let header_base = 24usize;
    let first_entry_offset = 40u32; // leaves room for the fixup array at [40, 58)
    let mut all_entries = entries.to_vec();
    all_entries.extend(index_terminator_entry());
    let total_size = (40 + all_entries.len()) as u32;

    data[header_base..header_base + 4].copy_from_slice(&first_entry_offset.to_le_bytes());
    data[header_base + 4..header_base + 8].copy_from_slice(&total_size.to_le_bytes());

    let entries_start = header_base + first_entry_offset as usize;
    data[entries_start..entries_start + all_entries.len()].copy_from_slice(&all_entries);

    apply_usa_encoding(&mut data, array_offset, array_size, INDX_FIXUP_TOKEN);
    data
}

/// Builds up a flat image file one piece at a time: boot sector first,
/// then `$MFT` record slots at fixed offsets, then data clusters
/// allocated sequentially from `DATA_START_LCN` onward. Sparse extents
/// never call `alloc` at all — they carry no physical bytes.
pub struct ImageBuilder {
    tmp: NamedTempFile,
    next_lcn: u64,
}

impl ImageBuilder {
    pub fn new() -> Self {
        let tmp = NamedTempFile::new().expect("create temp image file");
        let mut builder = Self { tmp, next_lcn: DATA_START_LCN };
        builder.write(0, &build_boot_sector());
        builder
    }

    fn write(&mut self, offset: u64, bytes: &[u8]) {
        let file = self.tmp.as_file_mut();
        file.seek(SeekFrom::Start(offset)).expect("seek");
        file.write_all(bytes).expect("write");
    }

    /// Place a pre-built FRS record at the given `$MFT` slot.
    pub fn put_record(&mut self, record_number: u64, bytes: Vec<u8>) {
        assert_eq!(bytes.len(), BYTES_PER_FRS as usize);
        assert!(record_number < MFT_RECORD_SLOTS, "record {record_number} exceeds the fixture's MFT size");
        let offset = MFT_START_LCN * BYTES_PER_CLUSTER + record_number * BYTES_PER_FRS;
        self.write(offset, &bytes);
    }

    /// Allocate `cluster_count` contiguous clusters of real data,
    /// writing `content` zero-padded/truncated to the allocation, and
    /// return the starting LCN.
    pub fn alloc(&mut self, cluster_count: u64, content: &[u8]) -> u64 {
        let lcn = self.next_lcn;
        self.next_lcn += cluster_count;
        let mut buf = vec![0u8; (cluster_count * BYTES_PER_CLUSTER) as usize];
        let n = content.len().min(buf.len());
        buf[..n].copy_from_slice(&content[..n]);
        self.write(lcn * BYTES_PER_CLUSTER, &buf);
        lcn
    }

    /// Writes the `$MFT`'s own record 0, describing its own non-resident
    /// `$DATA` extent over `[MFT_START_LCN, MFT_START_LCN+MFT_CLUSTERS)`
    /// (required before `MftSource::open_online` can locate anything).
    pub fn install_mft_record(&mut self) {
        let data_attr = AttrSpec::NonResident {
            type_code: 0x80,
            name: None,
            lowest_vcn: 0,
            highest_vcn: MFT_CLUSTERS - 1,
            compression_unit: 0,
            allocated_size: MFT_CLUSTERS * BYTES_PER_CLUSTER,
            file_size: MFT_RECORD_SLOTS * BYTES_PER_FRS,
            valid_data_size: MFT_RECORD_SLOTS * BYTES_PER_FRS,
            runs: encode_mapping_pairs(&[(MFT_CLUSTERS, Some(MFT_START_LCN as i64))]),
        };
        let record = build_record(0, RECORD_IN_USE, 0, &[AttrSpec::standard_information(), data_attr]);
        self.put_record(MFT_RECORD_FRN, record);
    }

    /// Finalize: pad the backing file so every byte range any record or
    /// extent could reference is present (`ImageStore::read_at` treats a
    /// read past true EOF as a short read, never silently zero-fills).
    pub fn finish(mut self) -> NamedTempFile {
        let min_len = (MFT_START_LCN + MFT_CLUSTERS) * BYTES_PER_CLUSTER;
        let covered = self.next_lcn * BYTES_PER_CLUSTER;
        let total = covered.max(min_len);
        self.tmp.as_file_mut().set_len(total).expect("resize image");
        self.tmp
    }
}

pub fn open_volume(tmp: &NamedTempFile) -> ntfs_forensics::VolumeIo {
    ntfs_forensics::open_volume(
        ntfs_forensics::VolumeLocation::Image(tmp.path().to_path_buf()),
        ntfs_forensics::OpenOptions::default(),
    )
    .expect("open synthetic volume")
}

pub fn open_mft_source(volume: &ntfs_forensics::VolumeIo) -> ntfs_forensics::MftSource {
    ntfs_forensics::MftSource::open_online(volume.clone_reader()).expect("open $MFT source")
}
