//! Engine configuration surface: one
//! `serde`-(de)serializable struct covering everything `walk_volume`
//! and `find` recognize, so a caller can load a scan profile from
//! JSON/TOML rather than constructing it in code. This crate never
//! reads that file itself — loading it is the caller's concern.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::find::term::MatchTerm;
use crate::find::FindEngine;
use crate::mft::WalkOptions;

fn default_batch_size() -> u64 {
    crate::mft::source::DEFAULT_BATCH_SIZE
}

fn default_memory_threshold() -> usize {
    50_000
}

fn default_contains_window() -> usize {
    4 * 1024 * 1024
}

fn default_yara_memory_map() -> u64 {
    32 * 1024 * 1024
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionPolicy {
    Decompress,
    RawOnly,
    BestEffort,
}

impl Default for CompressionPolicy {
    fn default() -> Self {
        CompressionPolicy::BestEffort
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HashKind {
    Md5,
    Sha1,
    Sha256,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub include_unallocated: bool,
    pub parse_i30: bool,
    #[serde(default = "default_true")]
    pub store_matches: bool,
    #[serde(default = "default_yara_memory_map")]
    pub max_yara_memory_map: u64,
    pub match_hashes: Vec<HashKind>,
    #[serde(default)]
    pub compression_policy: CompressionPolicy,
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
    #[serde(default = "default_memory_threshold")]
    pub memory_threshold: usize,
    #[serde(default = "default_contains_window")]
    pub contains_window: usize,
    pub location_prefixes: Vec<String>,
    pub terms: Vec<MatchTerm>,
    pub exclude_terms: Vec<MatchTerm>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            include_unallocated: false,
            parse_i30: false,
            store_matches: true,
            max_yara_memory_map: default_yara_memory_map(),
            match_hashes: Vec::new(),
            compression_policy: CompressionPolicy::default(),
            batch_size: default_batch_size(),
            memory_threshold: default_memory_threshold(),
            contains_window: default_contains_window(),
            location_prefixes: Vec::new(),
            terms: Vec::new(),
            exclude_terms: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Splits this profile into the `Walker` options and the compiled
    /// `FindEngine` that `walk_volume`/`find` actually run against.
    /// `store_matches` and `max_yara_memory_map` are read by the
    /// caller, not by this crate: the former only makes sense against
    /// the caller's own `on_match` accumulator, and the latter against
    /// whatever Yara integration the caller wires in, so neither has a
    /// corresponding field on `WalkOptions` or `FindEngine`.
    pub fn build(&self) -> Result<(WalkOptions, FindEngine)> {
        let walk_options = WalkOptions {
            include_unallocated: self.include_unallocated,
            parse_i30: self.parse_i30,
            location_prefixes: self.location_prefixes.clone(),
            batch_size: self.batch_size,
            memory_threshold: self.memory_threshold,
        };

        let engine = FindEngine::build_with(
            self.terms.clone(),
            self.exclude_terms.clone(),
            self.match_hashes.clone(),
            self.compression_policy,
            self.contains_window,
        )?;

        Ok((walk_options, engine))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let mut config = EngineConfig::default();
        config.match_hashes.push(HashKind::Sha256);
        let json = serde_json::to_string(&config).unwrap();
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.match_hashes, vec![HashKind::Sha256]);
        assert_eq!(back.batch_size, default_batch_size());
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: EngineConfig = serde_json::from_str("{}").unwrap();
        assert!(!config.include_unallocated);
        assert!(config.store_matches);
        assert_eq!(config.max_yara_memory_map, default_yara_memory_map());
    }

    #[test]
    fn build_carries_walk_and_engine_settings_through() {
        let mut config = EngineConfig::default();
        config.include_unallocated = true;
        config.parse_i30 = true;
        config.batch_size = 128;
        config.compression_policy = CompressionPolicy::RawOnly;
        config.contains_window = 1024;

        let (walk_options, _engine) = config.build().unwrap();
        assert!(walk_options.include_unallocated);
        assert!(walk_options.parse_i30);
        assert_eq!(walk_options.batch_size, 128);
    }
}
