//! End-to-end scenario tests driving the real `Walker`/`FindEngine`
//! against synthetic volume images built by `support::image`. Each
//! scenario stands up just the MFT records and `$I30` structures it
//! needs, then exercises the engine the same way a caller embedding
//! this crate would.

mod support;

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use ntfs_forensics::attrs::types::AttributeType;
use ntfs_forensics::config::{CompressionPolicy, HashKind};
use ntfs_forensics::find::find_on_volume;
use ntfs_forensics::find::term::{SizeComparison, SizeCriterion, StringMatch};
use ntfs_forensics::{ControlFlow, FindEngine, MatchTerm, WalkCallbacks, WalkOptions, Walker};

use support::image::{
    build_directory_record, build_file_record, build_index_allocation_block, index_entry, open_mft_source,
    open_volume, AttrSpec, FileNameSpec, ImageBuilder, ROOT_DIRECTORY_FRN,
};

const A_TXT: u64 = 6;
const B_BIN: u64 = 7;
const C_DAT: u64 = 8;
const KID_BIN: u64 = 10;
const IDX_DIR: u64 = 11;
const REPORT_LOG: u64 = 16;
const DIR: u64 = 20;

fn walk_paths(volume: &ntfs_forensics::VolumeIo, source: ntfs_forensics::MftSource, options: WalkOptions) -> Vec<String> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let collect = Rc::clone(&seen);
    let callbacks = WalkCallbacks::new().on_filename(move |_v, _r, _name, path| {
        collect.borrow_mut().push(path.to_string());
    });
    let mut walker = Walker::new(source, options);
    walker.walk(volume, callbacks).expect("walk succeeds");
    Rc::try_unwrap(seen).unwrap().into_inner()
}

fn find_matches(
    volume: &ntfs_forensics::VolumeIo,
    source: ntfs_forensics::MftSource,
    options: WalkOptions,
    engine: Arc<FindEngine>,
) -> Vec<ntfs_forensics::Match> {
    let matches = Rc::new(RefCell::new(Vec::new()));
    let collect = Rc::clone(&matches);
    find_on_volume(volume, source, options, engine, move |m| {
        collect.borrow_mut().push(m);
        ControlFlow::Continue
    })
    .expect("walk succeeds");
    Rc::try_unwrap(matches).unwrap().into_inner()
}

/// S1: resident file at root level, found by exact name and verified by
/// content MD5.
#[test]
fn s1_resident_file_matches_by_name_and_hash() {
    let content = b"hello world";
    let mut img = ImageBuilder::new();
    img.install_mft_record();
    img.put_record(
        A_TXT,
        build_file_record(FileNameSpec::new(ROOT_DIRECTORY_FRN, "A.TXT"), vec![AttrSpec::data_resident(content)]),
    );
    let tmp = img.finish();
    let volume = open_volume(&tmp);
    let source = open_mft_source(&volume);

    let term = MatchTerm {
        name: Some(StringMatch::Exact("A.TXT".into())),
        hashes: vec![(HashKind::Md5, "5eb63bbbe01eeed093cb22bb8f5acdc3".into())],
        ..Default::default()
    };
    let engine = Arc::new(FindEngine::build(vec![term], vec![], vec![]).unwrap());
    let matches = find_matches(&volume, source, WalkOptions::default(), engine);

    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].names[0].name, "A.TXT");
    assert_eq!(matches[0].names[0].full_path, "A.TXT");
    assert!(!matches[0].is_deleted);
}

/// S2: non-resident file spread across two real extents, verified by
/// SHA-1 over the reassembled content.
#[test]
fn s2_non_resident_two_extents_matches_by_sha1() {
    let payload: Vec<u8> = (0..20_480u32).map(|i| (i % 251) as u8).collect();
    let split = 8_192usize; // 2 clusters

    let mut img = ImageBuilder::new();
    img.install_mft_record();
    let lcn1 = img.alloc(2, &payload[..split]);
    let lcn2 = img.alloc(3, &payload[split..]);

    let runs = vec![(2u64, Some(lcn1 as i64)), (3u64, Some(lcn2 as i64 - lcn1 as i64))];
    let data_attr = AttrSpec::data_non_resident(&runs, payload.len() as u64);
    img.put_record(B_BIN, build_file_record(FileNameSpec::new(ROOT_DIRECTORY_FRN, "B.BIN"), vec![data_attr]));
    let tmp = img.finish();

    let volume = open_volume(&tmp);
    let source = open_mft_source(&volume);

    let term = MatchTerm {
        name: Some(StringMatch::Exact("B.BIN".into())),
        hashes: vec![(HashKind::Sha1, "fdca6e77d1cfe307413677b02b424b3f518c0170".into())],
        ..Default::default()
    };
    let engine = Arc::new(FindEngine::build(vec![term], vec![], vec![]).unwrap());
    let matches = find_matches(&volume, source, WalkOptions::default(), engine);

    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].attributes[0].size, payload.len() as u64);
}

/// S3: non-resident file with a sparse middle extent; verifies the
/// gap reads back as zero and the reported size matches `file_size`.
#[test]
fn s3_sparse_middle_extent_reads_back_as_zero() {
    let head: Vec<u8> = (0..8_192u32).map(|i| (i % 7) as u8).collect();
    let tail: Vec<u8> = (0..4_096u32).map(|i| (i % 13) as u8).collect();
    let file_size = (head.len() + 12_288 + tail.len()) as u64;

    let mut img = ImageBuilder::new();
    img.install_mft_record();
    let lcn1 = img.alloc(2, &head);
    // sparse run of 3 clusters: no backing allocation.
    let lcn3 = img.alloc(1, &tail);

    let runs = vec![(2u64, Some(lcn1 as i64)), (3u64, None), (1u64, Some(lcn3 as i64 - lcn1 as i64))];
    let data_attr = AttrSpec::data_non_resident(&runs, file_size);
    img.put_record(C_DAT, build_file_record(FileNameSpec::new(ROOT_DIRECTORY_FRN, "C.DAT"), vec![data_attr]));
    let tmp = img.finish();

    let volume = open_volume(&tmp);
    let source = open_mft_source(&volume);
    let mut walker = Walker::new(source, WalkOptions::default());

    let captured: Rc<RefCell<Option<Vec<u8>>>> = Rc::new(RefCell::new(None));
    let capture = Rc::clone(&captured);
    let callbacks = WalkCallbacks::new().on_data(move |v, r, attr| {
        if let ntfs_forensics::attrs::model::AttributeForm::NonResident(nr) = &attr.form {
            let mut stream = ntfs_forensics::attrs::streams::open_data(v, nr, r.frn, CompressionPolicy::BestEffort)
                .expect("open data stream");
            let mut buf = vec![0u8; nr.file_size as usize];
            let n = stream.read(&mut buf);
            buf.truncate(n);
            *capture.borrow_mut() = Some(buf);
        }
    });
    walker.walk(&volume, callbacks).expect("walk succeeds");

    let data = captured.borrow().clone().expect("data attribute captured");
    assert_eq!(data.len(), file_size as usize);
    assert_eq!(&data[..head.len()], &head[..]);
    assert!(data[head.len()..head.len() + 12_288].iter().all(|&b| b == 0));
    assert_eq!(&data[head.len() + 12_288..], &tail[..]);
}

/// S4: a child record with a lower MFT record number than its parent
/// directory, walked with `batch_size = 1` so the parent is still
/// unknown when the child is first ingested. Exercises the walker's
/// missing-parent resolution path; the rebuilt path must still be
/// correct and carries no leading backslash.
#[test]
fn s4_child_resolved_before_parent_batch_size_one() {
    let mut img = ImageBuilder::new();
    img.install_mft_record();
    img.put_record(
        KID_BIN,
        build_file_record(FileNameSpec::new(DIR, "KID.BIN"), vec![AttrSpec::data_resident(b"payload")]),
    );
    img.put_record(DIR, build_directory_record(FileNameSpec::directory(ROOT_DIRECTORY_FRN, "DIR"), vec![]));
    let tmp = img.finish();

    let volume = open_volume(&tmp);
    let source = open_mft_source(&volume);
    let options = WalkOptions { batch_size: 1, ..WalkOptions::default() };

    let paths = walk_paths(&volume, source, options);
    assert!(paths.contains(&"DIR".to_string()));
    assert!(paths.contains(&"DIR\\KID.BIN".to_string()));
    assert!(!paths.iter().any(|p| p.starts_with('\\')));
}

/// S5: content search combining a header pattern, a body regex, a
/// sha256 over the whole stream, and an exact-size criterion, feeding
/// all three global hashes through `FindEngine::build`.
#[test]
fn s5_content_criteria_and_global_hashes() {
    let header = b"LOGSTART";
    let body = b"normal line one\nERROR: disk failure on sdb1\nnormal line two\n";
    let mut content = header.to_vec();
    content.extend_from_slice(body);
    content.resize(4096, 0);

    let mut img = ImageBuilder::new();
    img.install_mft_record();
    let lcn = img.alloc(1, &content);
    let runs = vec![(1u64, Some(lcn as i64))];
    let data_attr = AttrSpec::data_non_resident(&runs, content.len() as u64);
    img.put_record(
        REPORT_LOG,
        build_file_record(FileNameSpec::new(ROOT_DIRECTORY_FRN, "REPORT.LOG"), vec![data_attr]),
    );
    let tmp = img.finish();

    let volume = open_volume(&tmp);
    let source = open_mft_source(&volume);

    let term = MatchTerm {
        name: Some(StringMatch::Exact("REPORT.LOG".into())),
        size: Some(SizeCriterion { op: SizeComparison::Equal, bytes: 4096 }),
        header: Some(ntfs_forensics::find::term::HeaderMatch {
            pattern: ntfs_forensics::find::term::HeaderPattern::Plain(header.to_vec()),
            window: None,
        }),
        contains: vec![ntfs_forensics::find::term::ByteNeedle::Plain(b"ERROR:".to_vec())],
        hashes: vec![(HashKind::Sha256, "1e881545edeca5051748d9f2ea529e974eb6b146fd8658822a729635d98b1e87".into())],
        ..Default::default()
    };
    let engine = Arc::new(
        FindEngine::build(vec![term], vec![], vec![HashKind::Md5, HashKind::Sha1, HashKind::Sha256]).unwrap(),
    );
    let matches = find_matches(&volume, source, WalkOptions::default(), engine);

    assert_eq!(matches.len(), 1);
    let attr = &matches[0].attributes[0];
    assert!(attr.md5.is_some());
    assert!(attr.sha1.is_some());
    assert_eq!(attr.sha256.as_deref(), Some("1e881545edeca5051748d9f2ea529e974eb6b146fd8658822a729635d98b1e87"));
}

/// S6: a directory's `$I30` index has one `$INDEX_ALLOCATION` block
/// marked unallocated in the sibling `$BITMAP`; its surviving entry
/// must be reported through `on_i30` with `is_carved = true`, while
/// allocated blocks report `is_carved = false`.
#[test]
fn s6_carved_index_entry_flagged_via_bitmap() {
    let mut img = ImageBuilder::new();
    img.install_mft_record();

    let ghost = FileNameSpec::new(IDX_DIR, "GHOST.TXT");
    let carved_entry = index_entry(9_999, &ghost);
    let blocks = [
        build_index_allocation_block(0, &[]),
        build_index_allocation_block(1, &[]),
        build_index_allocation_block(2, &[]),
        build_index_allocation_block(3, &carved_entry),
    ];

    let mut lcns = Vec::new();
    for block in &blocks {
        lcns.push(img.alloc(1, block));
    }

    let mut runs = Vec::new();
    let mut prev_lcn: Option<u64> = None;
    for &lcn in &lcns {
        let delta = match prev_lcn {
            None => lcn as i64,
            Some(p) => lcn as i64 - p as i64,
        };
        runs.push((1u64, Some(delta)));
        prev_lcn = Some(lcn);
    }
    let alloc_attr = AttrSpec::index_allocation(&runs, blocks.len() as u64);
    let bitmap_attr = AttrSpec::bitmap_resident(vec![0b0000_0111]); // blocks 0,1,2 allocated, 3 carved

    img.put_record(
        IDX_DIR,
        build_directory_record(
            FileNameSpec::directory(ROOT_DIRECTORY_FRN, "IDX"),
            vec![AttrSpec::index_root_empty(), alloc_attr, bitmap_attr],
        ),
    );
    let tmp = img.finish();

    let volume = open_volume(&tmp);
    let source = open_mft_source(&volume);
    let options = WalkOptions { parse_i30: true, ..WalkOptions::default() };

    let hits: Rc<RefCell<Vec<(String, bool)>>> = Rc::new(RefCell::new(Vec::new()));
    let collect = Rc::clone(&hits);
    let callbacks = WalkCallbacks::new().on_i30(move |_v, _r, entry, path, is_carved| {
        collect.borrow_mut().push((format!("{path} ({})", entry.file_name.name), is_carved));
    });
    let mut walker = Walker::new(source, options);
    walker.walk(&volume, callbacks).expect("walk succeeds");

    let hits = hits.borrow();
    assert_eq!(hits.len(), 1, "only the carved block carries a surviving entry: {hits:?}");
    assert!(hits[0].0.contains("GHOST.TXT"));
    assert!(hits[0].1, "entry from an unallocated bitmap block must be reported as carved");
}

/// An attribute filter on type/name narrows a `Match`'s attached
/// attributes to only the matching attribute, even when the file
/// carries others.
#[test]
fn attribute_type_filter_narrows_attached_attributes() {
    let content = b"typed content";
    let mut img = ImageBuilder::new();
    img.install_mft_record();
    img.put_record(
        A_TXT,
        build_file_record(FileNameSpec::new(ROOT_DIRECTORY_FRN, "A.TXT"), vec![AttrSpec::data_resident(content)]),
    );
    let tmp = img.finish();

    let volume = open_volume(&tmp);
    let source = open_mft_source(&volume);

    let term = MatchTerm {
        name: Some(StringMatch::Exact("A.TXT".into())),
        attribute_type: Some(AttributeType::Data),
        ..Default::default()
    };
    let engine = Arc::new(FindEngine::build(vec![term], vec![], vec![]).unwrap());
    let matches = find_matches(&volume, source, WalkOptions::default(), engine);

    assert_eq!(matches.len(), 1);
    assert!(matches[0].attributes.iter().all(|a| a.type_code == AttributeType::Data));
}
