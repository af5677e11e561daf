//! Per-record term evaluation.

use std::cell::RefCell;
use std::collections::HashMap;

use aho_corasick::AhoCorasick;
use regex::bytes::Regex as BytesRegex;

use crate::attrs::hashing::{self, HashAlgorithm};
use crate::attrs::model::{Attribute, AttributePayload, FileName};
use crate::attrs::parse::ParsedRecord;
use crate::attrs::streams;
use crate::attrs::types::AttributeType;
use crate::config::{CompressionPolicy, HashKind};
use crate::error::Result;
use crate::find::index::{CompiledMatch, TermIndex};
use crate::find::match_result::{Match, MatchedAttribute, MatchedName};
use crate::find::term::{ByteNeedle, HeaderPattern, MatchTerm, SizeComparison};
use crate::volume::VolumeIo;

const WOF_COMPRESSED_STREAM_NAME: &str = "WofCompressedData";

fn default_contains_window() -> usize {
    4 * 1024 * 1024
}

/// One compiled, ready-to-evaluate view of a `MatchTerm`.
struct CompiledTerm {
    term: MatchTerm,
    name: Option<CompiledMatch>,
    path: Option<CompiledMatch>,
    generic_name: Option<CompiledMatch>,
    ads_name: Option<CompiledMatch>,
    attribute_name: Option<CompiledMatch>,
    header_regex: Option<BytesRegex>,
    header_bytes: Option<Vec<u8>>,
    contains_needles: Vec<Vec<u8>>,
}

impl CompiledTerm {
    fn compile(term: MatchTerm) -> Result<Self> {
        let name = term.name.as_ref().map(CompiledMatch::compile).transpose()?;
        let path = term.path.as_ref().map(CompiledMatch::compile).transpose()?;
        let generic_name = term.generic_name.as_ref().map(CompiledMatch::compile).transpose()?;
        let ads_name = term.ads_name.as_ref().map(CompiledMatch::compile).transpose()?;
        let attribute_name = term.attribute_name.as_ref().map(CompiledMatch::compile).transpose()?;

        let (header_regex, header_bytes) = match &term.header {
            Some(h) => match &h.pattern {
                HeaderPattern::Plain(bytes) => (None, Some(bytes.clone())),
                HeaderPattern::Hex(text) => {
                    let bytes = ByteNeedle::Hex(text.clone()).to_bytes()?;
                    (None, Some(bytes))
                }
                HeaderPattern::Regex(pattern) => {
                    let re = BytesRegex::new(pattern).map_err(|e| {
                        crate::error::EngineError::InvalidConfig(format!("bad header regex {pattern:?}: {e}"))
                    })?;
                    (Some(re), None)
                }
            },
            None => (None, None),
        };

        let contains_needles = term
            .contains
            .iter()
            .map(ByteNeedle::to_bytes)
            .collect::<Result<Vec<_>>>()?;

        Ok(CompiledTerm {
            term,
            name,
            path,
            generic_name,
            ads_name,
            attribute_name,
            header_regex,
            header_bytes,
            contains_needles,
        })
    }
}

pub struct FindEngine {
    terms: Vec<CompiledTerm>,
    term_index: TermIndex,
    excludes: Vec<CompiledTerm>,
    exclude_index: TermIndex,
    global_hashes: Vec<HashKind>,
    compression_policy: CompressionPolicy,
    contains_window: usize,
    stats: std::sync::Mutex<TermStatsByIndex>,
}

impl FindEngine {
    /// Builds an engine with the default compressed-stream policy
    /// (`BestEffort`) and the default contains-window size. Most
    /// callers go through `EngineConfig::build` instead, which also
    /// wires `WalkOptions`; this constructor stays around for callers
    /// that only need a `FindEngine` with no other configuration.
    pub fn build(terms: Vec<MatchTerm>, excludes: Vec<MatchTerm>, global_hashes: Vec<HashKind>) -> Result<Self> {
        Self::build_with(terms, excludes, global_hashes, CompressionPolicy::default(), default_contains_window())
    }

    pub fn build_with(
        terms: Vec<MatchTerm>,
        excludes: Vec<MatchTerm>,
        global_hashes: Vec<HashKind>,
        compression_policy: CompressionPolicy,
        contains_window: usize,
    ) -> Result<Self> {
        let term_index = TermIndex::build(&terms)?;
        let exclude_index = TermIndex::build(&excludes)?;
        let terms = terms.into_iter().map(CompiledTerm::compile).collect::<Result<Vec<_>>>()?;
        let excludes = excludes.into_iter().map(CompiledTerm::compile).collect::<Result<Vec<_>>>()?;
        Ok(Self {
            terms,
            term_index,
            excludes,
            exclude_index,
            global_hashes,
            compression_policy,
            contains_window,
            stats: std::sync::Mutex::new(HashMap::new()),
        })
    }

    /// Snapshot of per-term match counts and bytes read, accumulated
    /// across every `evaluate` call so far.
    pub fn stats(&self) -> TermStatsByIndex {
        self.stats.lock().unwrap().clone()
    }

    /// Evaluates every configured term against one record. `names` are
    /// the record's in-scope `$FILE_NAME`s paired with their rebuilt
    /// full paths (the walker's location filter has already run; an
    /// out-of-scope name is simply omitted by the caller).
    pub fn evaluate(
        &self,
        volume: &VolumeIo,
        record: &ParsedRecord,
        names: &[(&FileName, &str)],
        is_deleted: bool,
    ) -> Vec<Match> {
        if names.is_empty() {
            return Vec::new();
        }

        let data_attrs: Vec<&Attribute> = record
            .attributes
            .iter()
            .filter(|a| matches!(a.payload, AttributePayload::Data))
            .collect();

        let name_strs: Vec<&str> = names.iter().map(|(n, _)| n.name.as_str()).collect();
        let path_strs: Vec<&str> = names.iter().map(|(_, p)| *p).collect();
        let size_hits: Vec<u64> = data_attrs.iter().map(|a| a.form.size()).collect();

        let candidates = self.term_index.candidates(&name_strs, &path_strs, &size_hits);

        let mut matches = Vec::new();
        for term_idx in candidates {
            if let Some(m) = self.evaluate_term(volume, record, &self.terms[term_idx], term_idx, names, &data_attrs, is_deleted) {
                if !self.is_excluded(volume, record, &m, names) {
                    self.record_stats(term_idx, &m);
                    matches.push(m);
                }
            }
        }
        matches
    }

    fn evaluate_term(
        &self,
        volume: &VolumeIo,
        record: &ParsedRecord,
        compiled: &CompiledTerm,
        term_idx: usize,
        names: &[(&FileName, &str)],
        data_attrs: &[&Attribute],
        is_deleted: bool,
    ) -> Option<Match> {
        // 1. Name, or an unanchored name that may land on either the
        // name or the rebuilt path.
        let matched_names: Vec<(&FileName, &str)> = if let Some(matcher) = &compiled.name {
            names.iter().copied().filter(|(n, _)| matcher.is_match(&n.name)).collect()
        } else if let Some(matcher) = &compiled.generic_name {
            names
                .iter()
                .copied()
                .filter(|(n, p)| matcher.is_match(&n.name) || matcher.is_match(p))
                .collect()
        } else {
            names.to_vec()
        };
        if (compiled.name.is_some() || compiled.generic_name.is_some()) && matched_names.is_empty() {
            return None;
        }

        // 2. Path.
        let matched_names: Vec<(&FileName, &str)> = if let Some(matcher) = &compiled.path {
            matched_names.into_iter().filter(|(_, p)| matcher.is_match(p)).collect()
        } else {
            matched_names
        };
        if compiled.path.is_some() && matched_names.is_empty() {
            return None;
        }

        // 3. Data-attribute size/ADS name.
        let relevant_data: Vec<&Attribute> = data_attrs
            .iter()
            .copied()
            .filter(|a| {
                if a.name.as_deref() == Some(WOF_COMPRESSED_STREAM_NAME) && !wants_wof_stream(&compiled.term) {
                    return false;
                }
                if let Some(size) = &compiled.term.size {
                    if !size_matches(*size, a.form.size()) {
                        return false;
                    }
                }
                if let Some(matcher) = &compiled.ads_name {
                    if !a.is_named() || !matcher.is_match(a.name.as_deref().unwrap_or_default()) {
                        return false;
                    }
                }
                true
            })
            .collect();

        let has_data_criterion = compiled.term.size.is_some() || compiled.ads_name.is_some();
        if has_data_criterion && relevant_data.is_empty() {
            return None;
        }

        // 4. Location: enforced upstream (only in-scope names are
        // passed in); `matched_names` already reflects that.
        if matched_names.is_empty() {
            return None;
        }

        // 5. Attribute type/name.
        let attribute_candidates: Vec<&Attribute> = record
            .attributes
            .iter()
            .filter(|a| {
                if let Some(expected) = compiled.term.attribute_type {
                    if a.type_code != expected {
                        return false;
                    }
                }
                if let Some(matcher) = &compiled.attribute_name {
                    if !matcher.is_match(a.name.as_deref().unwrap_or_default()) {
                        return false;
                    }
                }
                true
            })
            .collect();
        let has_attr_criterion = compiled.term.attribute_type.is_some() || compiled.attribute_name.is_some();
        if has_attr_criterion && attribute_candidates.is_empty() {
            return None;
        }

        // 6. Data content checks.
        let needs_content_check = compiled.header_bytes.is_some()
            || compiled.header_regex.is_some()
            || !compiled.contains_needles.is_empty()
            || !compiled.term.hashes.is_empty()
            || !compiled.term.yara_rules.is_empty();

        let content_targets: Vec<&Attribute> = if relevant_data.is_empty() {
            data_attrs.iter().copied().collect()
        } else {
            relevant_data.clone()
        };

        // Shared across this term's content check and its eventual
        // `Match` attribute hashes, so an attribute that both filters on
        // a hash and gets attached to the result is hashed only once.
        let hash_cache: RefCell<HashMap<u16, hashing::HashResults>> = RefCell::new(HashMap::new());

        if needs_content_check {
            let any_matched = content_targets
                .iter()
                .copied()
                .any(|a| self.attribute_satisfies_content(volume, record.frn, a, compiled, &hash_cache));
            if !any_matched {
                return None;
            }
        }

        // 7. Build the Match.
        let mut result = Match::new(term_idx, record.frn, is_deleted);
        result.standard_information = record.standard_information().cloned();
        result.names = matched_names
            .iter()
            .map(|(n, p)| MatchedName { name: n.name.clone(), full_path: p.to_string() })
            .collect();

        let attrs_to_attach: Vec<&Attribute> = if !relevant_data.is_empty() {
            relevant_data.clone()
        } else if !attribute_candidates.is_empty() {
            attribute_candidates
        } else if let Some(default) = record.attributes.iter().find(|a| a.is_default_data()) {
            vec![default]
        } else {
            Vec::new()
        };

        for attr in attrs_to_attach {
            result.attributes.push(self.build_matched_attribute(volume, record.frn, attr, &hash_cache));
        }

        Some(result)
    }

    fn build_matched_attribute(
        &self,
        volume: &VolumeIo,
        frn: u64,
        attr: &Attribute,
        hash_cache: &RefCell<HashMap<u16, hashing::HashResults>>,
    ) -> MatchedAttribute {
        let mut out = MatchedAttribute {
            type_code: attr.type_code,
            instance_id: attr.instance_id,
            name: attr.name.clone(),
            size: attr.form.size(),
            md5: None,
            sha1: None,
            sha256: None,
            data: None,
            raw: None,
        };

        if self.global_hashes.is_empty() {
            return out;
        }
        let algos: Vec<HashAlgorithm> = self.global_hashes.iter().map(hash_kind_to_algo).collect();
        let Some(results) = self.hashes_for(volume, frn, attr, &algos, hash_cache) else { return out };
        out.md5 = results.md5;
        out.sha1 = results.sha1;
        out.sha256 = results.sha256;
        out
    }

    /// Computes (or reuses) the full-stream hash pass for `attr`,
    /// keyed by its instance ID within the record: two call sites in
    /// the same term evaluation (content filtering and result
    /// attachment) share one pass instead of re-reading the stream.
    fn hashes_for(
        &self,
        volume: &VolumeIo,
        frn: u64,
        attr: &Attribute,
        algos: &[HashAlgorithm],
        hash_cache: &RefCell<HashMap<u16, hashing::HashResults>>,
    ) -> Option<hashing::HashResults> {
        if let Some(cached) = hash_cache.borrow().get(&attr.instance_id) {
            return Some(cached.clone());
        }
        let stream = self.open_data_stream(volume, attr, frn)?;
        let results = hashing::hash_stream(stream, algos);
        hash_cache.borrow_mut().insert(attr.instance_id, results.clone());
        Some(results)
    }

    fn attribute_satisfies_content(
        &self,
        volume: &VolumeIo,
        frn: u64,
        attr: &Attribute,
        compiled: &CompiledTerm,
        hash_cache: &RefCell<HashMap<u16, hashing::HashResults>>,
    ) -> bool {
        let Some(mut stream) = self.open_data_stream(volume, attr, frn) else { return false };

        if let Some(needle) = &compiled.header_bytes {
            let window = compiled.term.header.as_ref().and_then(|h| h.window).unwrap_or(needle.len());
            let mut buf = vec![0u8; window];
            stream.seek(0);
            let n = stream.read(&mut buf);
            if &buf[..n.min(needle.len())] != needle.as_slice() || n < needle.len() {
                return false;
            }
        }
        if let Some(re) = &compiled.header_regex {
            let window = compiled.term.header.as_ref().and_then(|h| h.window).unwrap_or(256);
            let mut buf = vec![0u8; window];
            stream.seek(0);
            let n = stream.read(&mut buf);
            if !re.is_match(&buf[..n]) {
                return false;
            }
        }
        if !compiled.contains_needles.is_empty()
            && !contains_any(&mut stream, &compiled.contains_needles, self.contains_window)
        {
            return false;
        }
        if !compiled.term.hashes.is_empty() {
            let mut wanted: Vec<HashAlgorithm> =
                compiled.term.hashes.iter().map(|(k, _)| hash_kind_to_algo(k)).collect();
            for h in &self.global_hashes {
                let a = hash_kind_to_algo(h);
                if !wanted.contains(&a) {
                    wanted.push(a);
                }
            }
            let Some(results) = self.hashes_for(volume, frn, attr, &wanted, hash_cache) else { return false };
            let ok = compiled.term.hashes.iter().all(|(k, expected)| {
                results.get(hash_kind_to_algo(k)).is_some_and(|g| g.eq_ignore_ascii_case(expected))
            });
            if !ok {
                return false;
            }
        }
        // Yara evaluation is left to the caller-supplied scanner via
        // `find::yara::YaraScanner`; this engine only tracks which
        // rule names a term cares about.
        true
    }

    fn record_stats(&self, term_idx: usize, found: &Match) {
        let mut stats = self.stats.lock().unwrap();
        let entry = stats.entry(term_idx).or_default();
        entry.match_count += 1;
        entry.bytes_read += found.attributes.iter().map(|a| a.size).sum::<u64>();
    }

    fn open_data_stream(&self, volume: &VolumeIo, attr: &Attribute, frn: u64) -> Option<streams::AttributeStream> {
        match &attr.form {
            crate::attrs::model::AttributeForm::Resident { value } => Some(streams::open_resident(value)),
            crate::attrs::model::AttributeForm::NonResident(nr) => {
                streams::open_data(volume, nr, frn, self.compression_policy).ok()
            }
        }
    }

    fn is_excluded(&self, volume: &VolumeIo, record: &ParsedRecord, found: &Match, names: &[(&FileName, &str)]) -> bool {
        if self.excludes.is_empty() {
            return false;
        }
        let name_strs: Vec<&str> = names.iter().map(|(n, _)| n.name.as_str()).collect();
        let path_strs: Vec<&str> = names.iter().map(|(_, p)| *p).collect();
        let size_hits: Vec<u64> = found.attributes.iter().map(|a| a.size).collect();
        let candidates = self.exclude_index.candidates(&name_strs, &path_strs, &size_hits);

        candidates.iter().any(|&idx| {
            self.evaluate_term(volume, record, &self.excludes[idx], idx, names, &record.attributes.iter().filter(|a| matches!(a.payload, AttributePayload::Data)).collect::<Vec<_>>(), found.is_deleted).is_some()
        })
    }
}

fn hash_kind_to_algo(kind: &HashKind) -> HashAlgorithm {
    match kind {
        HashKind::Md5 => HashAlgorithm::Md5,
        HashKind::Sha1 => HashAlgorithm::Sha1,
        HashKind::Sha256 => HashAlgorithm::Sha256,
    }
}

fn wants_wof_stream(term: &MatchTerm) -> bool {
    term.ads_name
        .as_ref()
        .is_some_and(|m| matches!(m, crate::find::term::StringMatch::Exact(s) if s.eq_ignore_ascii_case(WOF_COMPRESSED_STREAM_NAME)))
}

fn size_matches(criterion: crate::find::term::SizeCriterion, actual: u64) -> bool {
    match criterion.op {
        SizeComparison::Equal => actual == criterion.bytes,
        SizeComparison::Less => actual < criterion.bytes,
        SizeComparison::LessOrEqual => actual <= criterion.bytes,
        SizeComparison::Greater => actual > criterion.bytes,
        SizeComparison::GreaterOrEqual => actual >= criterion.bytes,
    }
}

/// Sliding-window substring search: one Aho-Corasick automaton
/// over all needles active on this attribute, instead of N independent
/// Boyer-Moore scans, preserving `max_needle_len - 1` bytes of overlap
/// between windows.
fn contains_any(stream: &mut streams::AttributeStream, needles: &[Vec<u8>], window_size: usize) -> bool {
    let Ok(ac) = AhoCorasick::new(needles) else { return false };
    let max_len = needles.iter().map(|n| n.len()).max().unwrap_or(1);
    let overlap = max_len.saturating_sub(1);

    stream.seek(0);
    let mut window = vec![0u8; window_size];
    let mut carry: Vec<u8> = Vec::new();

    loop {
        window[..carry.len()].copy_from_slice(&carry);
        let n = stream.read(&mut window[carry.len()..]);
        let total_len = carry.len() + n;
        let buf = &window[..total_len];
        if buf.is_empty() {
            return false;
        }
        if ac.is_match(buf) {
            return true;
        }
        if n == 0 {
            return false;
        }
        let keep_from = total_len.saturating_sub(overlap);
        carry = buf[keep_from..].to_vec();
    }
}

/// Per-term accounting: match counts and bytes read, accumulated as
/// evaluation proceeds rather than recomputed.
#[derive(Debug, Clone, Default)]
pub struct TermStats {
    pub match_count: u64,
    pub bytes_read: u64,
}

pub type TermStatsByIndex = HashMap<usize, TermStats>;
