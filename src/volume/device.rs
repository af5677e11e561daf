//! Live Windows volume/physical-drive backing store.
//!
//! Gated to `cfg(windows)`: this is the only variant that talks to the
//! Win32 API. `read_at` serializes the seek+read critical section
//! using a single `parking_lot::Mutex` around the raw handle, since
//! `SetFilePointerEx` + `ReadFile` is not atomic across threads sharing
//! one handle.

use std::ffi::OsStr;
use std::os::windows::ffi::OsStrExt;

use parking_lot::Mutex;
use windows::core::PCWSTR;
use windows::Win32::Foundation::{CloseHandle, HANDLE};
use windows::Win32::Storage::FileSystem::{
    CreateFileW, ReadFile, SetFilePointerEx, FILE_BEGIN, FILE_FLAGS_AND_ATTRIBUTES,
    FILE_FLAG_NO_BUFFERING, FILE_SHARE_MODE, FILE_SHARE_READ, FILE_SHARE_WRITE, GENERIC_READ,
    OPEN_EXISTING,
};

use crate::error::{EngineError, Result};

struct RawHandle(HANDLE);

// SAFETY: HANDLE is an opaque kernel object id; Windows permits using one
// handle from multiple threads as long as the seek+read pair is
// serialized (which the surrounding Mutex guarantees).
unsafe impl Send for RawHandle {}

impl Drop for RawHandle {
    fn drop(&mut self) {
        if !self.0.is_invalid() {
            unsafe {
                let _ = CloseHandle(self.0);
            }
        }
    }
}

pub struct DeviceStore {
    handle: Mutex<RawHandle>,
}

impl DeviceStore {
    /// Open `\\.\C:` or `\\.\PhysicalDriveN` for raw, unbuffered,
    /// share-read/share-write access.
    pub fn open(path: &str) -> Result<Self> {
        let wide: Vec<u16> = OsStr::new(path).encode_wide().chain(std::iter::once(0)).collect();

        let handle = unsafe {
            CreateFileW(
                PCWSTR::from_raw(wide.as_ptr()),
                GENERIC_READ.0,
                FILE_SHARE_MODE(FILE_SHARE_READ.0 | FILE_SHARE_WRITE.0),
                None,
                OPEN_EXISTING,
                FILE_FLAGS_AND_ATTRIBUTES(FILE_FLAG_NO_BUFFERING.0),
                None,
            )
        }
        .map_err(|e| EngineError::Io(std::io::Error::from_raw_os_error(e.code().0)))?;

        Ok(Self { handle: Mutex::new(RawHandle(handle)) })
    }

    pub fn read_at(&self, offset: u64, buffer: &mut [u8]) -> Result<usize> {
        let guard = self.handle.lock();
        let mut new_pos: i64 = 0;
        unsafe {
            SetFilePointerEx(guard.0, offset as i64, Some(&mut new_pos), FILE_BEGIN)
                .map_err(|e| EngineError::Io(std::io::Error::from_raw_os_error(e.code().0)))?;
        }

        let mut bytes_read: u32 = 0;
        unsafe {
            ReadFile(guard.0, Some(buffer), Some(&mut bytes_read), None)
                .map_err(|e| EngineError::Io(std::io::Error::from_raw_os_error(e.code().0)))?;
        }
        Ok(bytes_read as usize)
    }

    /// Open an independent handle to the same path (a fresh seek
    /// position, same backing device).
    pub fn reopen(path: &str) -> Result<Self> {
        Self::open(path)
    }
}
