//! Tracing setup for consumers of this crate.
//!
//! The library itself never installs a global subscriber — only events
//! and spans. `init_demo_logging` is provided for the `ntfs-walk` binary
//! (and for tests that want readable output) and is not on the hot path
//! of any engine operation.

use tracing_subscriber::EnvFilter;

/// Install a `tracing_subscriber::fmt` subscriber driven by `RUST_LOG`,
/// defaulting to `info` when the variable is unset or invalid.
pub fn init_demo_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
