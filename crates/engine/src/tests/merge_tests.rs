use super::helpers::{count_level_files, key, small_tree, value};
use crate::*;
use anyhow::Result;
use tempfile::tempdir;

// --------------------- Merge cascade ---------------------

#[test]
fn flood_forces_flushes_and_merges() -> Result<()> {
    let dir = tempdir()?;
    let mut tree = small_tree(dir.path(), 64);

    // 300 records force several nursery flushes; level 0 saturates and
    // merges into level 1.
    for i in 0..300 {
        tree.put(key(i), value(i))?;
    }
    tree.force_flush()?;

    let pairs = tree.sync_range(&Range::new(Some(key(100)), Some(key(200))))?;
    assert_eq!(pairs.len(), 100);
    for (i, (k, v)) in pairs.iter().enumerate() {
        assert_eq!(k, &key(100 + i as u32));
        assert_eq!(v, &value(100 + i as u32));
    }
    Ok(())
}

#[test]
fn depth_grows_under_load() -> Result<()> {
    let dir = tempdir()?;
    let mut tree = small_tree(dir.path(), 16);

    for i in 0..400 {
        tree.put(key(i), value(i))?;
    }
    // Settle whatever merges are still in flight.
    tree.close()?;

    let tree = small_tree(dir.path(), 16);
    assert!(tree.depth() >= 2, "400 records over a 16-record nursery must cascade");
    for i in 0..400 {
        assert_eq!(tree.lookup(&key(i))?, Some(value(i)), "k{:03}", i);
    }
    Ok(())
}

#[test]
fn merge_keeps_newest_value() -> Result<()> {
    let dir = tempdir()?;
    let mut tree = small_tree(dir.path(), 4);

    // Write the same keys repeatedly across many flushes so merges must
    // repeatedly pick the shallower entry.
    for round in 0..10u32 {
        for i in 0..8 {
            tree.put(key(i), format!("r{}v{}", round, i).into_bytes())?;
        }
    }

    for i in 0..8 {
        assert_eq!(
            tree.lookup(&key(i))?,
            Some(format!("r9v{}", i).into_bytes())
        );
    }
    Ok(())
}

#[test]
fn deleted_keys_stay_dead_through_merges() -> Result<()> {
    let dir = tempdir()?;
    let mut tree = small_tree(dir.path(), 8);

    for i in 0..64 {
        tree.put(key(i), value(i))?;
    }
    for i in (0..64).step_by(4) {
        tree.delete(key(i))?;
    }
    // Push the tombstones down through more flushes.
    for i in 100..164 {
        tree.put(key(i), value(i))?;
    }

    for i in 0..64 {
        if i % 4 == 0 {
            assert_eq!(tree.lookup(&key(i))?, None, "k{:03} must stay deleted", i);
        } else {
            assert_eq!(tree.lookup(&key(i))?, Some(value(i)));
        }
    }
    Ok(())
}

#[test]
fn merges_reduce_file_count() -> Result<()> {
    let dir = tempdir()?;
    let mut tree = small_tree(dir.path(), 8);

    for i in 0..200 {
        tree.put(key(i), value(i))?;
    }
    // Close settles every pending merge.
    tree.close()?;

    // Each level holds at most two files once everything has settled.
    let tree = small_tree(dir.path(), 8);
    let files = count_level_files(dir.path());
    assert!(files >= 1);
    assert!(
        files <= 2 * tree.depth().max(1),
        "no level may hold more than two files ({} files, depth {})",
        files,
        tree.depth()
    );
    Ok(())
}

#[test]
fn data_survives_merge_cascade_and_reopen() -> Result<()> {
    let dir = tempdir()?;
    {
        let mut tree = small_tree(dir.path(), 16);
        for i in 0..250 {
            tree.put(key(i), value(i))?;
        }
        for i in (0..250).step_by(5) {
            tree.delete(key(i))?;
        }
        tree.close()?;
    }

    let tree = small_tree(dir.path(), 16);
    for i in 0..250 {
        if i % 5 == 0 {
            assert_eq!(tree.lookup(&key(i))?, None);
        } else {
            assert_eq!(tree.lookup(&key(i))?, Some(value(i)));
        }
    }
    Ok(())
}
