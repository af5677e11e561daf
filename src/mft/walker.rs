//! MFT walker: drives an `MftSource`, assembles base + extension
//! records into complete records keyed by FRN, rebuilds full paths, and
//! delivers callbacks while keeping memory bounded.

use std::collections::{HashMap, HashSet};

use tracing::{debug, instrument, warn};

use crate::attrs::attribute_list::AttributeListEntry;
use crate::attrs::model::{AttributeForm, AttributePayload};
use crate::attrs::parse::{parse_record, ParsedRecord};
use crate::attrs::record::RecordHeader;
use crate::attrs::streams;
use crate::callbacks::{ControlFlow, WalkCallbacks};
use crate::error::{EngineError, Frn, Result};
use crate::mft::i30::{parse_index_allocation_block, parse_index_root};
use crate::mft::location::LocationFilter;
use crate::mft::path::{DirectoryEntry, PathBuilder};
use crate::mft::source::MftSource;
use crate::volume::{
    geometry::{Geometry, ROOT_DIRECTORY_FRN},
    VolumeIo,
};

#[derive(Debug, Clone)]
pub struct WalkOptions {
    pub include_unallocated: bool,
    pub parse_i30: bool,
    pub location_prefixes: Vec<String>,
    pub batch_size: u64,
    pub memory_threshold: usize,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            include_unallocated: false,
            parse_i30: false,
            location_prefixes: Vec::new(),
            batch_size: crate::mft::source::DEFAULT_BATCH_SIZE,
            memory_threshold: 50_000,
        }
    }
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct Stats {
    pub records_seen: u64,
    pub records_reported: u64,
    pub records_incomplete_at_end: u64,
    pub directories_seen: u64,
    pub bytes_read: u64,
}

struct ArenaEntry {
    header: Option<RecordHeader>,
    attributes: Vec<crate::attrs::model::Attribute>,
    extensions_seen: HashSet<Frn>,
    attribute_list_hosts: HashSet<Frn>,
}

impl ArenaEntry {
    fn missing(&self, self_frn: Frn) -> HashSet<Frn> {
        let mut missing = HashSet::new();
        if self.header.is_none() {
            missing.insert(self_frn);
        }
        for host in &self.attribute_list_hosts {
            if *host != self_frn && !self.extensions_seen.contains(host) {
                missing.insert(*host);
            }
        }
        missing
    }

    fn to_record(&self, frn: Frn) -> ParsedRecord {
        ParsedRecord {
            header: self.header.clone().unwrap_or_else(|| synth_header(frn)),
            frn,
            attributes: self.attributes.clone(),
        }
    }
}

fn synth_header(frn: Frn) -> RecordHeader {
    RecordHeader {
        signature: crate::attrs::record::MFT_RECORD_SIGNATURE,
        record_number: (frn & 0x0000_FFFF_FFFF_FFFF) as u32,
        sequence_number: (frn >> 48) as u16,
        ..Default::default()
    }
}

pub struct Walker {
    source: MftSource,
    options: WalkOptions,
    arena: HashMap<Frn, ArenaEntry>,
    directories: HashMap<Frn, DirectoryEntry>,
    location: LocationFilter,
    path_builder: PathBuilder,
    fetched: HashSet<Frn>,
    /// Base FRNs already delivered through `report`. A `keep_alive`
    /// entry stays in the arena for attribute-list/parent resolution
    /// but must not fire its callbacks a second time.
    reported: HashSet<Frn>,
    stats: Stats,
}

impl Walker {
    pub fn new(source: MftSource, options: WalkOptions) -> Self {
        let location = LocationFilter::new(&options.location_prefixes);
        Self {
            source,
            options,
            arena: HashMap::new(),
            directories: HashMap::new(),
            location,
            path_builder: PathBuilder::new(),
            fetched: HashSet::new(),
            reported: HashSet::new(),
            stats: Stats::default(),
        }
    }

    #[instrument(level = "info", skip(self, volume, callbacks))]
    pub fn walk(&mut self, volume: &VolumeIo, mut callbacks: WalkCallbacks) -> Result<Stats> {
        let total = self.source.mft_record_count().max(1);
        let mut next_record = 0u64;

        'outer: loop {
            let batch = self.source.batch(next_record, self.options.batch_size)?;
            if batch.is_empty() {
                break;
            }
            for raw in &batch {
                self.stats.bytes_read += raw.bytes.len() as u64;
                match self.ingest_raw(raw.record_number, &raw.bytes, volume.geometry()) {
                    Ok(()) => {}
                    Err(e) if e.is_recoverable() => {
                        debug!(record_number = raw.record_number, error = ?e, "skipping unparseable record");
                    }
                    Err(e) => return Err(e),
                }
            }
            next_record += batch.len() as u64;

            if self.drain_ready(volume, &mut callbacks)?.is_stop() {
                break 'outer;
            }
            if self.arena.len() > self.options.memory_threshold
                && self.sweep_partial(volume, &mut callbacks)?.is_stop()
            {
                break 'outer;
            }

            if let Some(progress) = callbacks.progress.as_mut() {
                let percent = (next_record as f64 / total as f64 * 100.0).min(100.0);
                if progress(percent).is_stop() {
                    break 'outer;
                }
            }

            if next_record >= total {
                break;
            }
        }

        self.resolve_dependencies(volume)?;
        if !self.drain_ready(volume, &mut callbacks)?.is_stop() {
            self.final_sweep(volume, &mut callbacks)?;
        }

        Ok(self.stats.clone())
    }

    fn ingest_raw(&mut self, record_number: u64, raw: &[u8], geometry: &Geometry) -> Result<()> {
        let parsed = parse_record(raw, record_number as u32, geometry)?;
        if !self.options.include_unallocated && !parsed.header.is_in_use() {
            return Ok(());
        }
        self.stats.records_seen += 1;
        self.ingest(parsed);
        Ok(())
    }

    fn ingest(&mut self, parsed: ParsedRecord) {
        let base_frn = if parsed.is_base() {
            parsed.frn
        } else {
            parsed.header.base_record_reference
        };

        let hosts: HashSet<Frn> = parsed
            .attribute_list()
            .map(|entries| entries.iter().map(AttributeListEntry::frn).collect())
            .unwrap_or_default();

        let entry = self.arena.entry(base_frn).or_insert_with(|| ArenaEntry {
            header: None,
            attributes: Vec::new(),
            extensions_seen: HashSet::new(),
            attribute_list_hosts: HashSet::new(),
        });

        if parsed.is_base() {
            entry.header = Some(parsed.header.clone());
        } else {
            entry.extensions_seen.insert(parsed.frn);
        }
        entry.attribute_list_hosts.extend(hosts);
        entry.attributes.extend(parsed.attributes);

        if let Some(primary) = entry_primary_name(entry) {
            self.directories.entry(base_frn).or_insert_with(|| DirectoryEntry {
                name: primary.name.clone(),
                parent_frn: primary.parent_record_number(),
            });
        }
    }

    /// Re-request every still-missing FRN across the whole arena, in
    /// as many rounds as it takes for the fetch set to stop shrinking.
    fn resolve_dependencies(&mut self, volume: &VolumeIo) -> Result<()> {
        loop {
            let to_fetch: Vec<Frn> = {
                let mut set: HashSet<Frn> = HashSet::new();
                for (frn, entry) in &self.arena {
                    for m in entry.missing(*frn) {
                        if !self.fetched.contains(&m) {
                            set.insert(m);
                        }
                    }
                    if let Some(parent) = missing_parent(entry, &self.directories) {
                        if !self.fetched.contains(&parent) {
                            set.insert(parent);
                        }
                    }
                }
                set.into_iter().collect()
            };

            if to_fetch.is_empty() {
                break;
            }
            for frn in &to_fetch {
                self.fetched.insert(*frn);
            }

            let raws = self.source.fetch_by_frn(&to_fetch)?;
            let mut any_ingested = false;
            for raw in raws {
                if let Ok(parsed) = parse_record(&raw.bytes, raw.record_number as u32, volume.geometry()) {
                    any_ingested = true;
                    self.ingest(parsed);
                }
            }
            if !any_ingested {
                break;
            }
        }
        Ok(())
    }

    fn drain_ready(&mut self, volume: &VolumeIo, callbacks: &mut WalkCallbacks) -> Result<ControlFlow> {
        let ready: Vec<Frn> = self
            .arena
            .iter()
            .filter(|(frn, e)| {
                !self.reported.contains(*frn)
                    && e.missing(**frn).is_empty()
                    && missing_parent(e, &self.directories).is_none()
            })
            .map(|(frn, _)| *frn)
            .collect();

        for frn in ready {
            if self.report(frn, volume, callbacks, None)?.is_stop() {
                return Ok(ControlFlow::Stop);
            }
        }
        Ok(ControlFlow::Continue)
    }

    fn sweep_partial(&mut self, volume: &VolumeIo, callbacks: &mut WalkCallbacks) -> Result<ControlFlow> {
        let candidates: Vec<Frn> = self
            .arena
            .iter()
            .filter(|(frn, e)| !self.reported.contains(*frn) && entry_primary_name(e).is_some())
            .map(|(frn, _)| *frn)
            .collect();

        for frn in candidates {
            if self.report(frn, volume, callbacks, Some("memory pressure sweep"))?.is_stop() {
                return Ok(ControlFlow::Stop);
            }
        }
        Ok(ControlFlow::Continue)
    }

    fn final_sweep(&mut self, volume: &VolumeIo, callbacks: &mut WalkCallbacks) -> Result<ControlFlow> {
        let remaining: Vec<Frn> = self
            .arena
            .keys()
            .copied()
            .filter(|frn| !self.reported.contains(frn))
            .collect();
        self.stats.records_incomplete_at_end = remaining.len() as u64;
        for frn in remaining {
            if self
                .report(frn, volume, callbacks, Some("end of walk: dependency never resolved"))?
                .is_stop()
            {
                return Ok(ControlFlow::Stop);
            }
        }
        Ok(ControlFlow::Continue)
    }

    fn report(
        &mut self,
        frn: Frn,
        volume: &VolumeIo,
        callbacks: &mut WalkCallbacks,
        incomplete_reason: Option<&str>,
    ) -> Result<ControlFlow> {
        if self.reported.contains(&frn) {
            return Ok(ControlFlow::Continue);
        }
        let Some(entry) = self.arena.get(&frn) else { return Ok(ControlFlow::Continue) };
        let record = entry.to_record(frn);

        if let Some(reason) = incomplete_reason {
            warn!(frn = format!("{frn:016x}"), reason, "reporting incomplete record");
        }

        if let Some(f) = callbacks.attribute.as_mut() {
            if let Some(entries) = record.attribute_list() {
                for e in entries {
                    f(volume, &record, e);
                }
            }
        }

        let is_directory = record.is_directory();
        if is_directory {
            self.stats.directories_seen += 1;
        }

        for name in record.file_names() {
            let in_scope_path = self.build_path_if_in_scope(frn, name);
            if let Some(path) = &in_scope_path {
                if let Some(f) = callbacks.filename.as_mut() {
                    f(volume, &record, name, path);
                }
                if is_directory {
                    if let Some(f) = callbacks.directory.as_mut() {
                        f(&record, name, record.attributes.iter().any(|a| {
                            matches!(a.payload, AttributePayload::IndexAllocation)
                        }));
                    }
                }
            }
        }

        for attr in &record.attributes {
            if matches!(attr.payload, AttributePayload::Data) {
                if let Some(f) = callbacks.data.as_mut() {
                    f(volume, &record, attr);
                }
                if let Some(f) = callbacks.filename_and_data.as_mut() {
                    for name in record.file_names() {
                        f(&record, name, attr);
                    }
                }
            }
        }

        if self.options.parse_i30 && is_directory {
            self.walk_i30(frn, &record, volume, callbacks)?;
        }

        let mut keep = false;
        if let Some(f) = callbacks.keep_alive.as_mut() {
            keep = f(&record);
        }
        let mut control = ControlFlow::Continue;
        if let Some(f) = callbacks.element.as_mut() {
            control = f(volume, &record);
        }

        self.stats.records_reported += 1;
        self.reported.insert(frn);
        if !keep {
            self.arena.remove(&frn);
        }
        Ok(control)
    }

    fn build_path_if_in_scope(
        &mut self,
        frn: Frn,
        name: &crate::attrs::model::FileName,
    ) -> Option<String> {
        let (path, _orphaned) = self.path_builder.build(
            &name.name,
            name.parent_record_number(),
            ROOT_DIRECTORY_FRN,
            &self.directories,
            None,
        );
        if self.location.accepts(name.parent_record_number(), &path) {
            Some(path)
        } else {
            None
        }
    }

    fn walk_i30(
        &mut self,
        frn: Frn,
        record: &ParsedRecord,
        volume: &VolumeIo,
        callbacks: &mut WalkCallbacks,
    ) -> Result<()> {
        let Some(f) = callbacks.i30.as_mut() else { return Ok(()) };

        for attr in &record.attributes {
            let AttributePayload::IndexRoot { raw } = &attr.payload else { continue };
            if attr.name.as_deref() != Some("$I30") {
                continue;
            }
            let entries = parse_index_root(raw, frn)?;
            for entry in &entries {
                if entry.file_name.parent_record_number() != frn {
                    continue;
                }
                let mut builder = PathBuilder::new();
                let (path, _) = builder.build(
                    &entry.file_name.name,
                    frn,
                    ROOT_DIRECTORY_FRN,
                    &self.directories,
                    None,
                );
                f(volume, record, entry, &path, entry.is_carved);
            }
        }

        // $INDEX_ALLOCATION overflow blocks, when present, are read on
        // demand rather than kept resident in the arena. One cluster is
        // assumed per index block, so an extent's starting VCN doubles
        // as its bit index into the sibling $BITMAP.
        let bitmap = bitmap_bytes(record, volume, frn)?;
        let block_allocated = |block_number: u64| -> bool {
            let Some(bytes) = &bitmap else { return true };
            let byte_idx = (block_number / 8) as usize;
            let bit = 1u8 << (block_number % 8);
            bytes.get(byte_idx).is_some_and(|b| b & bit != 0)
        };

        if let Some(alloc) = record.attributes.iter().find(|a| {
            matches!(a.payload, AttributePayload::IndexAllocation) && a.name.as_deref() == Some("$I30")
        }) {
            if let AttributeForm::NonResident(nr) = &alloc.form {
                let bytes_per_cluster = volume.geometry().bytes_per_cluster as u64;
                for extent in &nr.extents {
                    if extent.is_sparse {
                        continue;
                    }
                    let block_len = (extent.cluster_count * bytes_per_cluster) as usize;
                    let mut block = volume.read_exact_at(extent.lcn * bytes_per_cluster, block_len)?;
                    if let Ok((_, entries)) =
                        parse_index_allocation_block(&mut block, frn, volume.geometry())
                    {
                        let block_carved = !block_allocated(extent.vcn);
                        for entry in &entries {
                            if entry.file_name.parent_record_number() != frn {
                                continue;
                            }
                            let mut builder = PathBuilder::new();
                            let (path, _) = builder.build(
                                &entry.file_name.name,
                                frn,
                                ROOT_DIRECTORY_FRN,
                                &self.directories,
                                None,
                            );
                            f(volume, record, entry, &path, block_carved || entry.is_carved);
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

/// Raw bytes of the `$I30` `$BITMAP`, if the directory record carries
/// one, covering both resident and non-resident forms: bitmap
/// consultation distinguishes allocated vs. unallocated index blocks.
fn bitmap_bytes(record: &ParsedRecord, volume: &VolumeIo, frn: Frn) -> Result<Option<Vec<u8>>> {
    let Some(attr) = record.attributes.iter().find(|a| {
        matches!(a.payload, AttributePayload::Bitmap { .. }) && a.name.as_deref() == Some("$I30")
    }) else {
        return Ok(None);
    };

    match &attr.form {
        AttributeForm::Resident { value } => Ok(Some(value.clone())),
        AttributeForm::NonResident(nr) => {
            let mut stream = streams::open_raw(volume, nr, frn)?;
            let mut bytes = vec![0u8; stream.size() as usize];
            let mut read = 0usize;
            while read < bytes.len() {
                let n = stream.read(&mut bytes[read..]);
                if n == 0 {
                    break;
                }
                read += n;
            }
            Ok(Some(bytes))
        }
    }
}

/// The entry's immediate parent FRN, if its primary name's parent
/// directory hasn't been seen yet. Only the immediate parent is
/// tracked, not the whole ancestor chain
/// up to root: a record with a resolvable immediate parent is reported
/// with a best-effort path, falling back to an orphan placeholder
/// segment for any further-up ancestor that never arrives.
fn missing_parent(entry: &ArenaEntry, directories: &HashMap<Frn, DirectoryEntry>) -> Option<Frn> {
    let primary = entry_primary_name(entry)?;
    let parent = primary.parent_record_number();
    if parent == ROOT_DIRECTORY_FRN || directories.contains_key(&parent) {
        None
    } else {
        Some(parent)
    }
}

fn entry_primary_name(entry: &ArenaEntry) -> Option<&crate::attrs::model::FileName> {
    entry
        .attributes
        .iter()
        .filter_map(|a| match &a.payload {
            AttributePayload::FileName(fname) => Some(fname),
            _ => None,
        })
        .fold(None, |best, candidate| match best {
            None => Some(candidate),
            Some(current)
                if candidate.namespace.dominance_rank() > current.namespace.dominance_rank() =>
            {
                Some(candidate)
            }
            Some(current) => Some(current),
        })
}
