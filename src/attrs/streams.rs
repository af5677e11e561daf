//! Byte-stream abstraction over attribute extents. `raw` and `data`
//! are both materialized eagerly into an
//! `Arc<[u8]>` on open rather than windowed lazily — simpler, and
//! acceptable because the forensic read path processes one attribute
//! at a time rather than holding thousands of open streams.

use std::sync::Arc;

use crate::attrs::compression::{lznt1, xpress};
use crate::attrs::model::NonResidentDescriptor;
use crate::attrs::types::WofAlgorithm;
use crate::config::CompressionPolicy;
use crate::error::{EngineError, Frn, Result};
use crate::volume::VolumeIo;

/// A `raw` or `data` view over one attribute instance. Single-producer:
/// cloning gives an independent cursor over the same bytes.
pub struct AttributeStream {
    bytes: Arc<[u8]>,
    position: u64,
}

impl AttributeStream {
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn seek(&mut self, position: u64) {
        self.position = position.min(self.bytes.len() as u64);
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        let start = self.position as usize;
        if start >= self.bytes.len() {
            return 0;
        }
        let n = buf.len().min(self.bytes.len() - start);
        buf[..n].copy_from_slice(&self.bytes[start..start + n]);
        self.position += n as u64;
        n
    }

    pub fn clone_position(&self) -> AttributeStream {
        AttributeStream { bytes: Arc::clone(&self.bytes), position: self.position }
    }
}

/// `data` stream for a resident attribute: an in-memory view of the
/// value bytes. Never compressed.
pub fn open_resident(value: &[u8]) -> AttributeStream {
    AttributeStream { bytes: Arc::from(value), position: 0 }
}

/// `raw` stream: on-disk bytes exactly as stored, sparse extents
/// zero-filled, no decompression even when `compression_unit > 0`.
pub fn open_raw(volume: &VolumeIo, nr: &NonResidentDescriptor, frn: Frn) -> Result<AttributeStream> {
    let bytes = materialize_extents(volume, nr, frn)?;
    Ok(AttributeStream { bytes: bytes.into(), position: 0 })
}

/// `data` stream: LZNT1-decompressed when `compression_unit > 0` and
/// `policy` allows it, otherwise identical to `raw` but trimmed/zero-
/// padded to `valid_data_size`/`file_size`.
///
/// `policy` governs what happens to a compressed unit:
/// `Decompress` always decompresses and surfaces any decode error;
/// `RawOnly` never decompresses, returning the stored bytes as-is;
/// `BestEffort` decompresses and falls back to the raw bytes if that
/// fails instead of erroring the whole stream.
pub fn open_data(
    volume: &VolumeIo,
    nr: &NonResidentDescriptor,
    frn: Frn,
    policy: CompressionPolicy,
) -> Result<AttributeStream> {
    let mut bytes = if nr.compression_unit == 0 {
        materialize_extents(volume, nr, frn)?
    } else {
        match policy {
            CompressionPolicy::RawOnly => materialize_extents(volume, nr, frn)?,
            CompressionPolicy::Decompress => decompress_lznt1(volume, nr, frn)?,
            CompressionPolicy::BestEffort => match decompress_lznt1(volume, nr, frn) {
                Ok(bytes) => bytes,
                Err(_) => materialize_extents(volume, nr, frn)?,
            },
        }
    };

    if (nr.valid_data_size as usize) < bytes.len() {
        for b in &mut bytes[nr.valid_data_size as usize..] {
            *b = 0;
        }
    }
    bytes.resize(nr.file_size as usize, 0);

    Ok(AttributeStream { bytes: bytes.into(), position: 0 })
}

/// `data` stream for a WOF-compressed file: decodes the
/// `WofCompressedData` named stream using the XPRESS variant recorded
/// in the reparse point. The chunk table layout (one `u32` offset per
/// chunk boundary, ahead of the compressed payload) follows the
/// commonly documented WOF on-disk format; LZX is recognized but
/// rejected.
pub fn open_wof_data(
    compressed: &[u8],
    algorithm: WofAlgorithm,
    uncompressed_size: u64,
    frn: Frn,
) -> Result<AttributeStream> {
    let chunk_size = algorithm.chunk_size().ok_or_else(|| EngineError::UnsupportedAlgo {
        frn,
        attribute: "WofCompressedData".into(),
        algo: "LZX".into(),
    })?;

    if uncompressed_size == 0 {
        return Ok(AttributeStream { bytes: Arc::from(&[][..]), position: 0 });
    }

    let total_chunks = (uncompressed_size as usize).div_ceil(chunk_size);
    let table_entries = total_chunks - 1;
    let table_bytes = table_entries * 4;
    if compressed.len() < table_bytes {
        return Err(EngineError::CorruptRecord { frn, reason: "WOF chunk table truncated".into() });
    }

    let mut offsets = Vec::with_capacity(total_chunks + 1);
    offsets.push(0usize);
    for i in 0..table_entries {
        let o = u32::from_le_bytes(compressed[i * 4..i * 4 + 4].try_into().unwrap());
        offsets.push(o as usize);
    }
    let payload = &compressed[table_bytes..];
    offsets.push(payload.len());

    let mut out = Vec::with_capacity(uncompressed_size as usize);
    for i in 0..total_chunks {
        let start = offsets[i];
        let end = offsets[i + 1];
        let chunk = payload
            .get(start..end)
            .ok_or_else(|| EngineError::CorruptRecord { frn, reason: "WOF chunk offset out of range".into() })?;

        let remaining = uncompressed_size as usize - out.len();
        let this_chunk_size = chunk_size.min(remaining);

        if chunk.len() == this_chunk_size {
            out.extend_from_slice(chunk); // stored verbatim: compression gained nothing
        } else {
            let mut decoded = vec![0u8; this_chunk_size];
            let n = xpress::decompress_chunk(chunk, &mut decoded, frn)?;
            decoded.truncate(n);
            out.extend_from_slice(&decoded);
        }
    }

    Ok(AttributeStream { bytes: out.into(), position: 0 })
}

fn materialize_extents(volume: &VolumeIo, nr: &NonResidentDescriptor, frn: Frn) -> Result<Vec<u8>> {
    let bytes_per_cluster = volume.geometry().bytes_per_cluster as u64;
    let mut out = Vec::with_capacity(nr.allocated_size as usize);

    for extent in &nr.extents {
        let extent_bytes = (extent.cluster_count * bytes_per_cluster) as usize;
        if extent.is_sparse {
            out.resize(out.len() + extent_bytes, 0);
            continue;
        }
        let offset = extent.lcn * bytes_per_cluster;
        let chunk = volume.read_exact_at(offset, extent_bytes).map_err(|e| match e {
            EngineError::ShortRead { .. } => EngineError::Incomplete {
                frn,
                reason: format!("extent at LCN {} truncated on read", extent.lcn),
            },
            other => other,
        })?;
        out.extend_from_slice(&chunk);
    }

    Ok(out)
}

/// Decode a full non-resident `$DATA` value as a chain of LZNT1
/// compression units, each `2^compression_unit` clusters (clamped to
/// 16, the only unit size NTFS actually uses).
fn decompress_lznt1(volume: &VolumeIo, nr: &NonResidentDescriptor, frn: Frn) -> Result<Vec<u8>> {
    let bytes_per_cluster = volume.geometry().bytes_per_cluster as u64;
    let clusters_per_unit = 1u64 << (nr.compression_unit as u32).min(4);
    let unit_bytes = (clusters_per_unit * bytes_per_cluster) as usize;

    let raw = materialize_extents(volume, nr, frn)?;
    let mut out = Vec::with_capacity(nr.file_size as usize);

    for unit in raw.chunks(unit_bytes) {
        let mut decoded = vec![0u8; unit_bytes];
        lznt1::decompress_unit(unit, &mut decoded, frn)?;
        out.extend_from_slice(&decoded);
    }

    Ok(out)
}
