//! Full-path reconstruction.

use std::collections::HashMap;

use crate::error::Frn;

pub const NO_NAME: &str = "<NoName>";
pub const ORPHAN_PREFIX: &str = "__";
pub const ORPHAN_SUFFIX: &str = "__";

/// One entry of the walker's directory map: a directory FRN's name and
/// its own parent, enough to climb to the root without re-parsing.
#[derive(Debug, Clone)]
pub struct DirectoryEntry {
    pub name: String,
    pub parent_frn: Frn,
}

/// Reusable scratch buffer for path assembly; the walker owns one
/// instance and overwrites it per callback.
#[derive(Default)]
pub struct PathBuilder {
    segments: Vec<String>,
}

impl PathBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Climb from `parent_frn` to `root_frn`, returning the assembled
    /// path and whether any ancestor was missing from `directories`.
    pub fn build(
        &mut self,
        name: &str,
        parent_frn: Frn,
        root_frn: Frn,
        directories: &HashMap<Frn, DirectoryEntry>,
        ads_name: Option<&str>,
    ) -> (String, bool) {
        self.segments.clear();
        self.segments.push(name.to_string());

        let mut orphaned = false;
        let mut current = parent_frn;
        let mut hops = 0usize;
        while current != root_frn {
            hops += 1;
            if hops > 4096 {
                // cyclic parent chain on a corrupt volume; stop climbing
                orphaned = true;
                break;
            }
            match directories.get(&current) {
                Some(dir) => {
                    self.segments.push(dir.name.clone());
                    current = dir.parent_frn;
                }
                None => {
                    self.segments.push(format!("{ORPHAN_PREFIX}{current:016x}{ORPHAN_SUFFIX}"));
                    orphaned = true;
                    break;
                }
            }
        }

        self.segments.reverse();
        let mut path = self.segments.join("\\");
        if let Some(ads) = ads_name {
            if !ads.is_empty() {
                path.push(':');
                path.push_str(ads);
            }
        }
        (path, orphaned)
    }

    pub fn resolve_name(name: Option<&str>) -> &str {
        name.filter(|n| !n.is_empty()).unwrap_or(NO_NAME)
    }
}
