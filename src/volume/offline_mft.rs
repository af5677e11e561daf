//! Offline `$MFT` dump backing store.
//!
//! Has no boot sector; geometry is supplied by the caller. `read_at` is
//! only valid for whole-record reads at FRS-aligned offsets — any other
//! offset fails with `NotSupported`.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Mutex;

use crate::error::{EngineError, Result};
use crate::volume::geometry::Geometry;

pub struct OfflineMftStore {
    file: Mutex<File>,
    bytes_per_frs: u64,
}

impl OfflineMftStore {
    pub fn open(path: impl AsRef<Path>, geometry: &Geometry) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self { file: Mutex::new(file), bytes_per_frs: geometry.bytes_per_frs as u64 })
    }

    pub fn read_at(&self, offset: u64, buffer: &mut [u8]) -> Result<usize> {
        if offset % self.bytes_per_frs != 0 || buffer.len() as u64 != self.bytes_per_frs {
            return Err(EngineError::NotSupported(
                "offline $MFT reader only supports whole-record reads at FRS boundaries".into(),
            ));
        }
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start(offset))?;
        let mut read = 0;
        while read < buffer.len() {
            match file.read(&mut buffer[read..])? {
                0 => break,
                n => read += n,
            }
        }
        Ok(read)
    }
}
