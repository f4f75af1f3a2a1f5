use btree::{AccessMode, BTreeReader, BTreeWriter, Lookup, Record};
use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use std::path::Path;
use tempfile::tempdir;

const N_KEYS: usize = 10_000;
const VALUE_SIZE: usize = 100;

fn build_records() -> Vec<Record> {
    (0..N_KEYS)
        .map(|i| Record {
            key: format!("key{:06}", i).into_bytes(),
            value: Some(vec![b'x'; VALUE_SIZE]),
        })
        .collect()
}

fn write_level_file(path: &Path) {
    BTreeWriter::write_from_iterator(path, N_KEYS, build_records()).unwrap();
}

fn btree_write_benchmark(c: &mut Criterion) {
    c.bench_function("btree_write_10k", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                let path = dir.path().join("A-0.data");
                (dir, path)
            },
            |(_dir, path)| {
                write_level_file(&path);
            },
            BatchSize::SmallInput,
        );
    });
}

fn btree_lookup_hit_benchmark(c: &mut Criterion) {
    c.bench_function("btree_lookup_hit_10k", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                let path = dir.path().join("A-0.data");
                write_level_file(&path);
                let reader = BTreeReader::open(&path, AccessMode::Random).unwrap();
                (dir, reader)
            },
            |(_dir, reader)| {
                for i in 0..N_KEYS {
                    let key = format!("key{:06}", i).into_bytes();
                    let result = reader.lookup(&key).unwrap();
                    assert!(matches!(result, Lookup::Found(_)));
                }
            },
            BatchSize::LargeInput,
        );
    });
}

fn btree_lookup_miss_benchmark(c: &mut Criterion) {
    c.bench_function("btree_lookup_miss_10k", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                let path = dir.path().join("A-0.data");
                write_level_file(&path);
                let reader = BTreeReader::open(&path, AccessMode::Random).unwrap();
                (dir, reader)
            },
            |(_dir, reader)| {
                for i in 0..N_KEYS {
                    let key = format!("missing{:06}", i).into_bytes();
                    let result = reader.lookup(&key).unwrap();
                    assert!(matches!(result, Lookup::NotFound));
                }
            },
            BatchSize::LargeInput,
        );
    });
}

criterion_group!(
    benches,
    btree_write_benchmark,
    btree_lookup_hit_benchmark,
    btree_lookup_miss_benchmark
);
criterion_main!(benches);
