//! Term indexing: four lookup structures so most records short-circuit
//! on a hash lookup instead of walking every configured term.

use std::collections::HashMap;

use regex::RegexBuilder;

use crate::error::{EngineError, Result};
use crate::find::term::{MatchTerm, StringMatch};

/// A `StringMatch` compiled once at index-build time rather than per
/// record. Wildcards are translated to an anchored, case-insensitive
/// regex (`?` → any one char, `*` → any run of chars).
pub enum CompiledMatch {
    Exact(String),
    Pattern(regex::Regex),
}

impl CompiledMatch {
    pub fn compile(source: &StringMatch) -> Result<Self> {
        match source {
            StringMatch::Exact(s) => Ok(CompiledMatch::Exact(s.to_ascii_lowercase())),
            StringMatch::Wildcard(pattern) => {
                let regex_src = wildcard_to_regex(pattern);
                let re = RegexBuilder::new(&regex_src)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| EngineError::InvalidConfig(format!("bad wildcard pattern {pattern:?}: {e}")))?;
                Ok(CompiledMatch::Pattern(re))
            }
            StringMatch::Regex(pattern) => {
                let re = RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| EngineError::InvalidConfig(format!("bad regex {pattern:?}: {e}")))?;
                Ok(CompiledMatch::Pattern(re))
            }
        }
    }

    pub fn is_match(&self, candidate: &str) -> bool {
        match self {
            CompiledMatch::Exact(expected) => expected.eq_ignore_ascii_case(candidate),
            CompiledMatch::Pattern(re) => re.is_match(candidate),
        }
    }
}

fn wildcard_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() * 2 + 2);
    out.push('^');
    for c in pattern.chars() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '.' | '+' | '(' | ')' | '[' | ']' | '{' | '}' | '^' | '$' | '|' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out.push('$');
    out
}

/// Four-way lookup over a term set. `general`
/// holds any term whose cheapest criterion isn't an exact string/size,
/// so it must always be consulted.
#[derive(Default)]
pub struct TermIndex {
    pub by_name: HashMap<String, Vec<usize>>,
    pub by_path: HashMap<String, Vec<usize>>,
    pub by_size: HashMap<u64, Vec<usize>>,
    pub general: Vec<usize>,
}

impl TermIndex {
    pub fn build(terms: &[MatchTerm]) -> Result<Self> {
        let mut index = TermIndex::default();

        for (i, term) in terms.iter().enumerate() {
            term.validate()?;

            let mut indexed = false;

            if let Some(StringMatch::Exact(name)) = &term.name {
                index.by_name.entry(name.to_ascii_lowercase()).or_default().push(i);
                indexed = true;
            }
            if let Some(StringMatch::Exact(path)) = &term.path {
                index.by_path.entry(normalize_path(path)).or_default().push(i);
                indexed = true;
            }
            // Unanchored: the same exact text could appear as a bare
            // name or as part of a path, so it's indexed under both.
            if let Some(StringMatch::Exact(text)) = &term.generic_name {
                index.by_name.entry(text.to_ascii_lowercase()).or_default().push(i);
                index.by_path.entry(normalize_path(text)).or_default().push(i);
                indexed = true;
            }
            if let Some(size) = &term.size {
                if size.op == crate::find::term::SizeComparison::Equal {
                    index.by_size.entry(size.bytes).or_default().push(i);
                    indexed = true;
                }
            }

            if !indexed {
                index.general.push(i);
            }
        }

        Ok(index)
    }

    /// Candidate term indices worth fully evaluating against a record
    /// with the given names/sizes: the union of exact hits plus every
    /// general term.
    pub fn candidates(&self, names: &[&str], paths: &[&str], sizes: &[u64]) -> Vec<usize> {
        let mut out: Vec<usize> = self.general.clone();

        for name in names {
            if let Some(hits) = self.by_name.get(&name.to_ascii_lowercase()) {
                out.extend(hits);
            }
        }
        for path in paths {
            if let Some(hits) = self.by_path.get(&normalize_path(path)) {
                out.extend(hits);
            }
        }
        for size in sizes {
            if let Some(hits) = self.by_size.get(size) {
                out.extend(hits);
            }
        }

        out.sort_unstable();
        out.dedup();
        out
    }
}

pub fn normalize_path(path: &str) -> String {
    path.replace('/', "\\").to_ascii_lowercase()
}
