//! Find engine: compiled match terms evaluated against records
//! the MFT walker produces.

pub mod eval;
pub mod index;
pub mod match_result;
pub mod run;
pub mod term;
pub mod yara;

pub use eval::FindEngine;
pub use match_result::Match;
pub use run::run as find_on_volume;
pub use term::MatchTerm;
