//! Drives a `Walker` and evaluates a `FindEngine` against every record
//! it reports. Kept separate from `mft::walker` so the walker itself
//! stays ignorant of match terms.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use crate::attrs::model::FileName;
use crate::callbacks::{ControlFlow, WalkCallbacks};
use crate::error::{Frn, Result};
use crate::find::eval::FindEngine;
use crate::find::match_result::Match;
use crate::mft::{MftSource, Stats, WalkOptions, Walker};
use crate::volume::VolumeIo;

/// Walks `source` over `volume`, evaluating `engine` against each
/// complete record's in-scope filenames, and calls `on_match` for every
/// delivered `Match`. Returning `ControlFlow::Stop` from `on_match`
/// aborts the remainder of the walk, same as stopping from `element`.
/// `engine` is an `Arc` (rather than a borrow) because the walker's
/// callback contract requires `'static` closures.
pub fn run(
    volume: &VolumeIo,
    source: MftSource,
    walk_options: WalkOptions,
    engine: Arc<FindEngine>,
    mut on_match: impl FnMut(Match) -> ControlFlow + 'static,
) -> Result<Stats> {
    let pending: Rc<RefCell<HashMap<Frn, Vec<(FileName, String)>>>> = Rc::new(RefCell::new(HashMap::new()));

    let collect_pending = Rc::clone(&pending);
    let mut callbacks = WalkCallbacks::new().on_filename(move |_reader, record, name, path| {
        collect_pending
            .borrow_mut()
            .entry(record.frn)
            .or_default()
            .push((name.clone(), path.to_string()));
    });

    let evaluate_pending = Rc::clone(&pending);
    callbacks = callbacks.on_element(move |reader, record| {
        let names = evaluate_pending.borrow_mut().remove(&record.frn).unwrap_or_default();
        let name_refs: Vec<(&FileName, &str)> = names.iter().map(|(n, p)| (n, p.as_str())).collect();
        let is_deleted = !record.header.is_in_use();

        let matches = engine.evaluate(reader, record, &name_refs, is_deleted);

        for m in matches {
            if on_match(m).is_stop() {
                return ControlFlow::Stop;
            }
        }
        ControlFlow::Continue
    });

    let mut walker = Walker::new(source, walk_options);
    walker.walk(volume, callbacks)
}
