//! `$MFT` source contracts: an "online" source reads `$MFT` through its
//! own data-run extent list on a live volume; an "offline" source reads
//! a dumped `$MFT` file sequentially.

use tracing::debug;

use crate::attrs::dataruns::Extent;
use crate::attrs::parse::parse_record;
use crate::error::{EngineError, Frn, Result};
use crate::volume::VolumeIo;

pub const DEFAULT_BATCH_SIZE: u64 = 64;

/// One fetched record: its expected record number and the raw FRS
/// bytes (still requiring fixup — the caller parses it).
pub struct RawRecord {
    pub record_number: u64,
    pub bytes: Vec<u8>,
}

pub struct MftSource {
    volume: VolumeIo,
    bytes_per_frs: u64,
    bytes_per_cluster: u64,
    /// `None` for an offline source: records are read sequentially at
    /// `record_number * bytes_per_frs` with no extent indirection.
    extents: Option<Vec<Extent>>,
    record_count_hint: u64,
}

impl MftSource {
    /// Locate `$MFT` on a live volume by reading record 0 and decoding
    /// its unnamed `$DATA` extents.
    pub fn open_online(volume: VolumeIo) -> Result<Self> {
        let geometry = volume.geometry().clone();
        let raw = volume.read_exact_at(geometry.mft_byte_offset(), geometry.bytes_per_frs as usize)?;
        let record0 = parse_record(&raw, 0, &geometry)?;

        let data_attr = record0
            .attributes
            .iter()
            .find(|a| a.is_default_data())
            .ok_or_else(|| EngineError::CorruptRecord { frn: 0, reason: "$MFT record 0 has no $DATA".into() })?;

        let nr = match &data_attr.form {
            crate::attrs::model::AttributeForm::NonResident(nr) => nr,
            crate::attrs::model::AttributeForm::Resident { .. } => {
                return Err(EngineError::CorruptRecord { frn: 0, reason: "$MFT $DATA is resident".into() });
            }
        };

        let record_count_hint = nr.file_size / geometry.bytes_per_frs as u64;

        Ok(Self {
            volume,
            bytes_per_frs: geometry.bytes_per_frs as u64,
            bytes_per_cluster: geometry.bytes_per_cluster as u64,
            extents: Some(nr.extents.clone()),
            record_count_hint,
        })
    }

    /// An offline, dumped `$MFT` file: `volume` must be a
    /// `VolumeIo::OfflineMft` opened with the same geometry.
    pub fn open_offline(volume: VolumeIo, file_len: u64) -> Self {
        let bytes_per_frs = volume.geometry().bytes_per_frs as u64;
        Self {
            volume,
            bytes_per_frs,
            bytes_per_cluster: 0,
            extents: None,
            record_count_hint: file_len / bytes_per_frs,
        }
    }

    /// Advisory only; used for progress reporting.
    pub fn mft_record_count(&self) -> u64 {
        self.record_count_hint
    }

    pub fn bytes_per_frs(&self) -> u64 {
        self.bytes_per_frs
    }

    /// Read `count` consecutive records starting at `start_record`, in
    /// record-number order.
    pub fn batch(&self, start_record: u64, count: u64) -> Result<Vec<RawRecord>> {
        let logical_offset = start_record * self.bytes_per_frs;
        let length = count * self.bytes_per_frs;
        let bytes = self.read_logical_range(logical_offset, length)?;

        Ok(bytes
            .chunks(self.bytes_per_frs as usize)
            .enumerate()
            .map(|(i, chunk)| RawRecord { record_number: start_record + i as u64, bytes: chunk.to_vec() })
            .collect())
    }

    /// Fetch an ad-hoc, possibly-scattered list of FRNs: sorted,
    /// grouped into contiguous runs, read as one batch per run, then
    /// matched back to the expected FRN. A result whose segment or
    /// sequence number mismatches the request is dropped, not errored.
    pub fn fetch_by_frn(&self, frns: &[Frn]) -> Result<Vec<RawRecord>> {
        let mut record_numbers: Vec<u64> = frns.iter().map(|f| f & 0x0000_FFFF_FFFF_FFFF).collect();
        record_numbers.sort_unstable();
        record_numbers.dedup();

        let mut results = Vec::with_capacity(record_numbers.len());
        let mut i = 0;
        while i < record_numbers.len() {
            let run_start = record_numbers[i];
            let mut run_end = run_start + 1;
            let mut j = i + 1;
            while j < record_numbers.len() && record_numbers[j] == run_end {
                run_end += 1;
                j += 1;
            }

            let batch = self.batch(run_start, run_end - run_start)?;
            results.extend(batch);
            i = j;
        }

        Ok(results)
    }

    /// Verify a fetched raw record actually carries the expected FRN
    /// (segment + sequence); mismatches are dropped per source
    /// contract, not surfaced as an error.
    pub fn verify_frn(raw: &RawRecord, expected: Frn, actual_sequence: u16) -> bool {
        let expected_segment = expected & 0x0000_FFFF_FFFF_FFFF;
        let expected_sequence = (expected >> 48) as u16;
        if raw.record_number != expected_segment {
            debug!(expected_segment, got = raw.record_number, "fetched record segment mismatch");
            return false;
        }
        if expected_sequence != 0 && actual_sequence != expected_sequence {
            debug!(expected_sequence, actual_sequence, "fetched record sequence mismatch");
            return false;
        }
        true
    }

    fn read_logical_range(&self, logical_offset: u64, length: u64) -> Result<Vec<u8>> {
        match &self.extents {
            None => self.volume.read_exact_at(logical_offset, length as usize),
            Some(extents) => {
                let mut out = Vec::with_capacity(length as usize);
                let mut remaining_start = logical_offset;
                let mut remaining_len = length;

                for extent in extents {
                    let extent_start = extent.vcn * self.bytes_per_cluster;
                    let extent_len = extent.cluster_count * self.bytes_per_cluster;
                    let extent_end = extent_start + extent_len;

                    if remaining_len == 0 {
                        break;
                    }
                    if remaining_start >= extent_end || remaining_start + remaining_len <= extent_start {
                        continue;
                    }

                    let window_start = remaining_start.max(extent_start);
                    let window_end = (remaining_start + remaining_len).min(extent_end);
                    let window_len = (window_end - window_start) as usize;

                    if extent.is_sparse {
                        out.resize(out.len() + window_len, 0);
                    } else {
                        let physical_offset = extent.lcn * self.bytes_per_cluster + (window_start - extent_start);
                        let chunk = self.volume.read_exact_at(physical_offset, window_len)?;
                        out.extend_from_slice(&chunk);
                    }

                    if window_end >= remaining_start + remaining_len {
                        break;
                    }
                }

                if out.len() < length as usize {
                    out.resize(length as usize, 0);
                }
                Ok(out)
            }
        }
    }
}
