//! Location-prefix filter: an optional set of
//! path prefixes that scopes a walk, with a tri-state cache per
//! directory FRN to avoid re-testing the same ancestor chain.

use std::collections::HashMap;

use crate::error::Frn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    In,
    Out,
}

pub struct LocationFilter {
    prefixes: Vec<String>,
    cache: HashMap<Frn, Scope>,
}

impl LocationFilter {
    pub fn new(prefixes: &[String]) -> Self {
        let prefixes = prefixes.iter().map(|p| normalize(p)).collect();
        Self { prefixes, cache: HashMap::new() }
    }

    pub fn is_unrestricted(&self) -> bool {
        self.prefixes.is_empty()
    }

    /// Is `path` in scope? `directory_frn` is the immediate containing
    /// directory, used only to key the cache — the prefix test itself
    /// always runs against the full rebuilt path.
    pub fn accepts(&mut self, directory_frn: Frn, path: &str) -> bool {
        if self.prefixes.is_empty() {
            return true;
        }
        if let Some(scope) = self.cache.get(&directory_frn) {
            return *scope == Scope::In;
        }

        let normalized = normalize(path);
        let in_scope = self.prefixes.iter().any(|p| normalized.starts_with(p.as_str()));
        self.cache.insert(directory_frn, if in_scope { Scope::In } else { Scope::Out });
        in_scope
    }
}

fn normalize(path: &str) -> String {
    path.replace('/', "\\").to_ascii_lowercase()
}
