//! Demo CLI: walks a volume or image and prints every in-scope path.
//! Exercises the library end to end; not part of the public API.

use std::path::PathBuf;

use clap::Parser;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};

use ntfs_forensics::callbacks::{ControlFlow, WalkCallbacks};
use ntfs_forensics::mft::{MftSource, WalkOptions, Walker};
use ntfs_forensics::volume::{open_volume, OpenOptions, VolumeLocation};

#[derive(Parser, Debug)]
#[command(name = "ntfs-walk", about = "Walk an NTFS volume or image and print in-scope paths")]
struct Args {
    /// Image file path, or a `\\.\C:`-style device path.
    target: PathBuf,

    /// Treat `target` as a live Windows device rather than a flat image.
    #[arg(long)]
    device: bool,

    /// Only report paths under this prefix (repeatable).
    #[arg(long = "prefix")]
    location_prefixes: Vec<String>,

    /// Include records not currently in use (recovers deleted entries).
    #[arg(long)]
    include_unallocated: bool,

    /// Decode $I30 directory indexes as well.
    #[arg(long)]
    parse_i30: bool,
}

fn main() -> anyhow::Result<()> {
    ntfs_forensics::logging::init_demo_logging();
    let args = Args::parse();

    let location = if args.device {
        VolumeLocation::Device(args.target.to_string_lossy().into_owned())
    } else {
        VolumeLocation::Image(args.target.clone())
    };

    let volume = open_volume(location, OpenOptions::default())?;
    let source = MftSource::open_online(volume.clone_reader())?;

    let progress = ProgressBar::new(100);
    progress.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos:>3}% {msg}").unwrap(),
    );

    let callbacks = WalkCallbacks::new()
        .on_filename(|_reader, _record, name, path| {
            println!("{path} ({})", format_size(name.data_size, BINARY));
        })
        .on_progress(move |percent| {
            progress.set_position(percent as u64);
            ControlFlow::Continue
        });

    let options = WalkOptions {
        include_unallocated: args.include_unallocated,
        parse_i30: args.parse_i30,
        location_prefixes: args.location_prefixes,
        ..WalkOptions::default()
    };

    let mut walker = Walker::new(source, options);
    let stats = walker.walk(&volume, callbacks)?;

    println!(
        "records reported: {}, directories: {}, incomplete at end: {}",
        stats.records_reported, stats.directories_seen, stats.records_incomplete_at_end
    );

    Ok(())
}
