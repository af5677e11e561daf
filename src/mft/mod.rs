//! MFT walker: drives an `MftSource`, assembles complete
//! records, rebuilds paths, and runs the optional `$I30`/`$Secure`
//! side walks.

pub mod i30;
pub mod location;
pub mod path;
pub mod secure;
pub mod source;
pub mod walker;

pub use source::MftSource;
pub use walker::{Stats, WalkOptions, Walker};
