//! Error types for the NTFS forensic engine.

use thiserror::Error;

/// File reference number: 48-bit segment + 16-bit sequence, packed into a u64.
pub type Frn = u64;

/// Top-level error type returned by every fallible operation in this crate.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("short read at offset {offset}: wanted {wanted} bytes, got {got}")]
    ShortRead { offset: u64, wanted: usize, got: usize },

    #[error("fixup signature mismatch on record {frn:016x} at sector {sector}")]
    CorruptFixup { frn: Frn, sector: usize },

    #[error("corrupt record {frn:016x}: {reason}")]
    CorruptRecord { frn: Frn, reason: String },

    #[error("unsupported filesystem: {0}")]
    UnsupportedFs(String),

    #[error("unsupported algorithm for {frn:016x}/{attribute}: {algo}")]
    UnsupportedAlgo { frn: Frn, attribute: String, algo: String },

    #[error("record {frn:016x} delivered incomplete: {reason}")]
    Incomplete { frn: Frn, reason: String },

    #[error("stopped by user callback")]
    StoppedByUser,

    #[error("not ready: {0}")]
    NotReady(String),

    #[error("operation not supported by this reader: {0}")]
    NotSupported(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    /// Soft failures never abort a walk; they drop one record or one
    /// attribute and get logged (see `logging` module) instead.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EngineError::CorruptFixup { .. }
                | EngineError::CorruptRecord { .. }
                | EngineError::UnsupportedAlgo { .. }
                | EngineError::Incomplete { .. }
        )
    }
}
