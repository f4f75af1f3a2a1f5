use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::{Tree, TreeOptions, NURSERY_FILENAME};

/// Opens a tree with a small nursery so tests can force flushes cheaply.
/// Log fsync is off — durability is exercised by the dedicated recovery
/// tests.
pub fn small_tree(dir: &Path, nursery_max: usize) -> Tree {
    Tree::open_with(
        dir,
        TreeOptions {
            nursery_max,
            log_sync: false,
            chunk_size: 10,
            fold_timeout: Duration::from_secs(3),
        },
    )
    .unwrap()
}

/// Counts the level files in a tree directory (the nursery log does not
/// count).
pub fn count_level_files(dir: &Path) -> usize {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| {
            let name = e.file_name();
            let name = name.to_string_lossy();
            name.ends_with(".data") && name != NURSERY_FILENAME
        })
        .count()
}

pub fn key(i: u32) -> Vec<u8> {
    format!("k{:03}", i).into_bytes()
}

pub fn value(i: u32) -> Vec<u8> {
    format!("v{}", i).into_bytes()
}
