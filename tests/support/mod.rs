//! Shared fixture support for the scenario/integration tests: a tiny,
//! byte-exact synthetic NTFS image builder. Not a general-purpose NTFS
//! writer — just enough surface to stand up the records each scenario
//! test needs.

pub mod image;
