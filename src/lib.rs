//! Read-only NTFS forensic parsing engine: volume reading, attribute
//! reconstruction, MFT walking and match-term search over raw devices,
//! images, or offline `$MFT` dumps.
//!
//! # Example
//!
//! ```no_run
//! use ntfs_forensics::callbacks::WalkCallbacks;
//! use ntfs_forensics::mft::{MftSource, WalkOptions, Walker};
//! use ntfs_forensics::volume::{open_volume, OpenOptions, VolumeLocation};
//!
//! fn main() -> ntfs_forensics::Result<()> {
//!     let volume = open_volume(VolumeLocation::Image("disk.img".into()), OpenOptions::default())?;
//!     let source = MftSource::open_online(volume.clone_reader())?;
//!     let mut walker = Walker::new(source, WalkOptions::default());
//!
//!     let callbacks = WalkCallbacks::new().on_filename(|_reader, _record, name, path| {
//!         println!("{path} ({})", name.name);
//!     });
//!
//!     let stats = walker.walk(&volume, callbacks)?;
//!     println!("records reported: {}", stats.records_reported);
//!     Ok(())
//! }
//! ```

pub mod attrs;
pub mod callbacks;
pub mod config;
pub mod error;
pub mod find;
pub mod logging;
pub mod mft;
pub mod multi;
pub mod volume;

pub use callbacks::{ControlFlow, WalkCallbacks};
pub use config::EngineConfig;
pub use error::{EngineError, Frn, Result};
pub use find::{FindEngine, Match, MatchTerm};
pub use mft::{MftSource, Stats, WalkOptions, Walker};
pub use volume::{open_volume, OpenOptions, VolumeIo, VolumeLocation};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
