//! Flat-file (dd image / raw VHD payload) backing store.
//!
//! `memmap2`-backed so random `read_at` calls cost a slice copy out of
//! the mapping rather than a syscall each.

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;

use crate::error::{EngineError, Result};

pub struct ImageStore {
    mmap: Mmap,
}

impl ImageStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        // SAFETY: the file is not expected to be concurrently truncated
        // by another process during the life of this mapping; this is
        // the standard caveat for all `memmap2` use, accepted by every
        // other consumer in this ecosystem.
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self { mmap })
    }

    pub fn len(&self) -> u64 {
        self.mmap.len() as u64
    }

    pub fn read_at(&self, offset: u64, buffer: &mut [u8]) -> Result<usize> {
        let start = offset as usize;
        if start >= self.mmap.len() {
            return Ok(0);
        }
        let end = (start + buffer.len()).min(self.mmap.len());
        let n = end - start;
        buffer[..n].copy_from_slice(&self.mmap[start..end]);
        if n < buffer.len() && end < self.mmap.len() {
            return Err(EngineError::ShortRead { offset, wanted: buffer.len(), got: n });
        }
        Ok(n)
    }
}
