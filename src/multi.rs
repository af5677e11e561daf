//! Multi-volume fan-out: the only place this crate uses parallelism.
//! Each volume is walked on its own `rayon` task; every individual walk
//! stays single-threaded.

use std::collections::HashMap;
use std::sync::Arc;

use rayon::prelude::*;

use crate::callbacks::{ControlFlow, WalkCallbacks};
use crate::error::Result;
use crate::find::{FindEngine, Match};
use crate::mft::{MftSource, Stats, WalkOptions};
use crate::volume::VolumeIo;

/// Runs `walk_volume` over every `(volume, source)` pair concurrently,
/// one callback builder per volume so each task gets its own boxed
/// closures rather than sharing mutable state across threads. Results
/// are keyed by the volume's boot-sector serial number.
pub fn walk_many<F>(
    volumes: Vec<(VolumeIo, MftSource)>,
    options: WalkOptions,
    make_callbacks: F,
) -> HashMap<u64, Result<Stats>>
where
    F: Fn() -> WalkCallbacks + Sync,
{
    volumes
        .into_par_iter()
        .map(|(volume, source)| {
            let serial = volume.geometry().serial;
            let mut walker = crate::mft::Walker::new(source, options.clone());
            let stats = walker.walk(&volume, make_callbacks());
            (serial, stats)
        })
        .collect::<Vec<_>>()
        .into_iter()
        .collect()
}

/// Runs `find` over every volume concurrently against one shared,
/// already-compiled `FindEngine`. `on_match` is invoked once per
/// delivered `Match`, tagged with the serial number of the volume it
/// came from, and may be called concurrently from different volumes'
/// tasks.
pub fn find_many<OnMatch>(
    volumes: Vec<(VolumeIo, MftSource)>,
    options: WalkOptions,
    engine: Arc<FindEngine>,
    on_match: OnMatch,
) -> HashMap<u64, Result<Stats>>
where
    OnMatch: Fn(u64, Match) -> ControlFlow + Sync + Send,
{
    let on_match = Arc::new(on_match);

    volumes
        .into_par_iter()
        .map(|(volume, source)| {
            let serial = volume.geometry().serial;
            let engine = Arc::clone(&engine);
            let on_match = Arc::clone(&on_match);
            let stats = crate::find::find_on_volume(&volume, source, options.clone(), engine, move |m| {
                on_match(serial, m)
            });
            (serial, stats)
        })
        .collect::<Vec<_>>()
        .into_iter()
        .collect()
}
