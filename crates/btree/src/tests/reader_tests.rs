use crate::tests::{rec, write_records};
use crate::{AccessMode, BTreeReader, Error, FoldOutcome, Lookup, Range, RangeCursor};
use std::fs;
use tempfile::tempdir;

fn sample_path(dir: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("A-0.data");
    write_records(
        &path,
        vec![
            rec(b"a", Some(b"apple")),
            rec(b"b", Some(b"banana")),
            rec(b"c", Some(b"")),
            rec(b"d", None),
        ],
    )
    .unwrap();
    path
}

fn collect_range(
    reader: &BTreeReader,
    range: &Range,
    limit: Option<usize>,
) -> FoldOutcome<Vec<Vec<u8>>> {
    reader
        .range_fold(
            |mut acc: Vec<Vec<u8>>, r| {
                acc.push(r.key.clone());
                acc
            },
            Vec::new(),
            range,
            limit,
        )
        .unwrap()
}

// -------------------- Basic lookups --------------------

#[test]
fn open_and_lookup_entries() {
    let dir = tempdir().unwrap();
    let path = sample_path(dir.path());
    let reader = BTreeReader::open(&path, AccessMode::Random).unwrap();

    assert_eq!(reader.lookup(b"a").unwrap(), Lookup::Found(b"apple".to_vec()));
    assert_eq!(
        reader.lookup(b"b").unwrap(),
        Lookup::Found(b"banana".to_vec())
    );
    // An empty value is a live value, not a tombstone.
    assert_eq!(reader.lookup(b"c").unwrap(), Lookup::Found(b"".to_vec()));
    assert_eq!(reader.lookup(b"d").unwrap(), Lookup::Tombstone);
    assert_eq!(reader.lookup(b"nope").unwrap(), Lookup::NotFound);
}

#[test]
fn lookup_below_file_minimum_misses() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("A-0.data");
    let records: Vec<_> = (0..200u32)
        .map(|i| rec(format!("m{:04}", i).as_bytes(), Some(b"v")))
        .collect();
    write_records(&path, records).unwrap();

    let reader = BTreeReader::open(&path, AccessMode::Random).unwrap();
    assert_eq!(reader.lookup(b"a").unwrap(), Lookup::NotFound);
    assert_eq!(reader.lookup(b"z").unwrap(), Lookup::NotFound);
}

// -------------------- Bloom soundness --------------------

#[test]
fn every_present_key_survives_the_bloom_gate() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("A-0.data");
    let n = 1000u32;
    let records: Vec<_> = (0..n)
        .map(|i| rec(format!("key{:05}", i).as_bytes(), Some(b"v")))
        .collect();
    write_records(&path, records).unwrap();

    let reader = BTreeReader::open(&path, AccessMode::Random).unwrap();
    for i in 0..n {
        let key = format!("key{:05}", i);
        assert!(
            matches!(reader.lookup(key.as_bytes()).unwrap(), Lookup::Found(_)),
            "bloom must never hide {}",
            key
        );
    }
}

// -------------------- Corruption --------------------

#[test]
fn corrupt_trailer_is_detected_at_open() {
    let dir = tempdir().unwrap();
    let path = sample_path(dir.path());

    let mut data = fs::read(&path).unwrap();
    let len = data.len();
    for b in &mut data[len - 12..] {
        *b = 0xFF;
    }
    fs::write(&path, &data).unwrap();

    let result = BTreeReader::open(&path, AccessMode::Random);
    assert!(matches!(result, Err(Error::Corrupt { .. })));
}

#[test]
fn truncated_file_is_corrupt() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("A-0.data");
    fs::write(&path, &[1, 2, 3]).unwrap();

    let result = BTreeReader::open(&path, AccessMode::Random);
    assert!(matches!(result, Err(Error::Corrupt { .. })));
}

#[test]
fn root_offset_out_of_range_is_corrupt() {
    let dir = tempdir().unwrap();
    let path = sample_path(dir.path());

    // Rewrite the trailer's root_offset to point past the block region.
    let mut data = fs::read(&path).unwrap();
    let len = data.len();
    data[len - 8..].copy_from_slice(&(len as u64).to_be_bytes());
    fs::write(&path, &data).unwrap();

    let result = BTreeReader::open(&path, AccessMode::Random);
    assert!(matches!(result, Err(Error::Corrupt { .. })));
}

#[test]
fn mangled_bloom_is_corrupt() {
    let dir = tempdir().unwrap();
    let path = sample_path(dir.path());

    // The compressed bloom sits directly before the 12-byte trailer;
    // flipping its first bytes breaks decompression.
    let mut data = fs::read(&path).unwrap();
    let len = data.len();
    let bloom_size = u32::from_be_bytes(data[len - 12..len - 8].try_into().unwrap()) as usize;
    let bloom_start = len - 12 - bloom_size;
    for b in &mut data[bloom_start..bloom_start + 4] {
        *b ^= 0xFF;
    }
    fs::write(&path, &data).unwrap();

    let result = BTreeReader::open(&path, AccessMode::Random);
    assert!(matches!(result, Err(Error::Corrupt { .. })));
}

#[test]
fn missing_file_is_io_error() {
    let result = BTreeReader::open("/tmp/no-such-level-file.data", AccessMode::Random);
    assert!(matches!(result, Err(Error::Io { .. })));
}

// -------------------- Sequential leaf iteration --------------------

#[test]
fn leaf_scan_yields_all_records_in_order() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("A-0.data");
    let n = 300u32;
    let records: Vec<_> = (0..n)
        .map(|i| rec(format!("key{:05}", i).as_bytes(), Some(b"v")))
        .collect();
    write_records(&path, records).unwrap();

    let reader = BTreeReader::open(&path, AccessMode::Sequential).unwrap();
    let mut scan = reader.leaf_scan();
    let mut seen = Vec::new();
    while let Some(leaf) = scan.next_leaf().unwrap() {
        for r in leaf {
            seen.push(r.key);
        }
    }

    assert_eq!(seen.len(), n as usize);
    for w in seen.windows(2) {
        assert!(w[0] < w[1], "leaf scan must be strictly ascending");
    }
}

#[test]
fn leaf_scan_includes_tombstones() {
    let dir = tempdir().unwrap();
    let path = sample_path(dir.path());

    let reader = BTreeReader::open(&path, AccessMode::Sequential).unwrap();
    let mut scan = reader.leaf_scan();
    let leaf = scan.next_leaf().unwrap().unwrap();
    assert_eq!(leaf.len(), 4);
    assert_eq!(leaf[3].key, b"d");
    assert!(leaf[3].value.is_none());
}

// -------------------- Range folds --------------------

#[test]
fn range_fold_half_open_interval() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("A-0.data");
    let records: Vec<_> = (0..100u32)
        .map(|i| rec(format!("k{:03}", i).as_bytes(), Some(b"v")))
        .collect();
    write_records(&path, records).unwrap();

    let reader = BTreeReader::open(&path, AccessMode::Sequential).unwrap();
    let range = Range::new(Some(b"k010".to_vec()), Some(b"k020".to_vec()));
    match collect_range(&reader, &range, None) {
        FoldOutcome::Done(keys) => {
            assert_eq!(keys.len(), 10);
            assert_eq!(keys.first().unwrap(), b"k010");
            assert_eq!(keys.last().unwrap(), b"k019");
        }
        FoldOutcome::Limited(..) => panic!("unbounded fold must finish"),
    }
}

#[test]
fn range_fold_inclusive_upper_bound() {
    let dir = tempdir().unwrap();
    let path = sample_path(dir.path());

    let reader = BTreeReader::open(&path, AccessMode::Sequential).unwrap();
    let range = Range::new(Some(b"b".to_vec()), Some(b"c".to_vec())).inclusive_to();
    match collect_range(&reader, &range, None) {
        FoldOutcome::Done(keys) => assert_eq!(keys, vec![b"b".to_vec(), b"c".to_vec()]),
        FoldOutcome::Limited(..) => panic!("unbounded fold must finish"),
    }
}

#[test]
fn range_fold_exclusive_lower_bound() {
    let dir = tempdir().unwrap();
    let path = sample_path(dir.path());

    let reader = BTreeReader::open(&path, AccessMode::Sequential).unwrap();
    let range = Range::new(Some(b"b".to_vec()), None).exclusive_from();
    match collect_range(&reader, &range, None) {
        FoldOutcome::Done(keys) => {
            assert_eq!(keys, vec![b"c".to_vec(), b"d".to_vec()]);
        }
        FoldOutcome::Limited(..) => panic!("unbounded fold must finish"),
    }
}

#[test]
fn range_fold_limit_reports_resume_key() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("A-0.data");
    let records: Vec<_> = (0..50u32)
        .map(|i| rec(format!("k{:03}", i).as_bytes(), Some(b"v")))
        .collect();
    write_records(&path, records).unwrap();

    let reader = BTreeReader::open(&path, AccessMode::Sequential).unwrap();
    match collect_range(&reader, &Range::all(), Some(10)) {
        FoldOutcome::Limited(keys, next) => {
            assert_eq!(keys.len(), 10);
            assert_eq!(next, b"k010".to_vec());
        }
        FoldOutcome::Done(_) => panic!("limited fold must stop early"),
    }
}

#[test]
fn paginated_fold_equals_unbounded_fold() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("A-0.data");
    let n = 237u32; // deliberately not a multiple of the page size
    let records: Vec<_> = (0..n)
        .map(|i| rec(format!("k{:04}", i).as_bytes(), Some(b"v")))
        .collect();
    write_records(&path, records).unwrap();

    let reader = BTreeReader::open(&path, AccessMode::Sequential).unwrap();

    let all = match collect_range(&reader, &Range::all(), None) {
        FoldOutcome::Done(keys) => keys,
        FoldOutcome::Limited(..) => panic!("unbounded fold must finish"),
    };

    let mut paged = Vec::new();
    let mut range = Range::all();
    loop {
        match collect_range(&reader, &range, Some(10)) {
            FoldOutcome::Done(mut keys) => {
                paged.append(&mut keys);
                break;
            }
            FoldOutcome::Limited(mut keys, next) => {
                paged.append(&mut keys);
                range = range.resume_from(next);
            }
        }
    }

    assert_eq!(paged, all);
}

// -------------------- Range cursors --------------------

#[test]
fn range_cursor_streams_in_range_records() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("A-0.data");
    let records: Vec<_> = (0..100u32)
        .map(|i| rec(format!("k{:03}", i).as_bytes(), Some(b"v")))
        .collect();
    write_records(&path, records).unwrap();

    let range = Range::new(Some(b"k090".to_vec()), None);
    let mut cursor = RangeCursor::open(&path, range).unwrap();
    let mut keys = Vec::new();
    while let Some(r) = cursor.next_record().unwrap() {
        keys.push(r.key);
    }
    assert_eq!(keys.len(), 10);
    assert_eq!(keys.first().unwrap(), b"k090");
    assert_eq!(keys.last().unwrap(), b"k099");
}

#[test]
fn range_cursor_exhausts_cleanly() {
    let dir = tempdir().unwrap();
    let path = sample_path(dir.path());

    let mut cursor = RangeCursor::open(&path, Range::all()).unwrap();
    let mut count = 0;
    while cursor.next_record().unwrap().is_some() {
        count += 1;
    }
    assert_eq!(count, 4);
    assert!(cursor.next_record().unwrap().is_none());
}
