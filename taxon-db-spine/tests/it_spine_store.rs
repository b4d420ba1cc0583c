//! Integration tests: growth, concurrent publication and persistence.

use rayon::prelude::*;
use std::sync::Arc;
use taxon_db_spine::{
    IntSpine, PackedInts, Spine, SpineDirectory, SpineError, SpineStore, SpinedArrayMap,
    SpinedIntMap,
};

#[derive(Debug, PartialEq, Eq)]
struct Run(Vec<u32>);

impl PackedInts for Run {
    fn ints(&self) -> &[u32] {
        &self.0
    }

    fn from_ints(ints: Vec<u32>) -> Result<Self, String> {
        if ints.len() % 2 != 0 {
            return Err(format!("odd length {}", ints.len()));
        }
        Ok(Run(ints))
    }
}

fn int_store(spine_size: usize, increment: usize) -> SpineStore<IntSpine> {
    SpineStore::new(spine_size, increment, Arc::new(|n| IntSpine::new(n, 0)))
}

#[test]
fn set_spine_far_beyond_capacity_preserves_earlier_spines() {
    let store = int_store(32, 16);
    assert_eq!(store.spine_count(), 16);
    let early: Vec<Arc<IntSpine>> = (0..16).map(|i| store.spine(i)).collect();
    for (i, spine) in early.iter().enumerate() {
        spine.set(0, i as i32);
    }

    let far = Arc::new(IntSpine::new(32, 0));
    far.set(31, 5000);
    store.set_spine(5000, Arc::clone(&far));

    assert!(store.spine_count() > 5000);
    assert!(Arc::ptr_eq(&store.spine(5000), &far));
    for (i, spine) in early.iter().enumerate() {
        let current = store.spine(i);
        assert!(Arc::ptr_eq(&current, spine));
        assert_eq!(current.get(0), i as i32);
    }
}

#[test]
fn concurrent_publication_yields_one_spine_per_index() {
    let store = int_store(16, 1);
    let handles: Vec<(usize, Arc<IntSpine>)> = (0..2000usize)
        .into_par_iter()
        .map(|i| (i % 40, store.spine(i % 40)))
        .collect();
    for (index, handle) in handles {
        assert!(Arc::ptr_eq(&handle, &store.spine(index)));
    }
}

#[test]
fn concurrent_accumulate_loses_no_update() {
    let map = SpinedIntMap::new(8, 1, 0);
    (0..4000usize).into_par_iter().for_each(|i| {
        map.accumulate_and_get(i % 50, 1, |a, b| a + b);
    });
    for key in 0..50 {
        assert_eq!(map.get(key), 80);
    }
}

#[test]
fn array_map_survives_sync_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let seg = SpineDirectory::open(dir.path()).unwrap();

    let map: SpinedArrayMap<Run> = SpinedArrayMap::new(4, 2);
    map.put(0, Run(vec![1, 2]));
    map.put(13, Run(vec![3, 4, 5, 6]));
    assert_eq!(map.store().dirty_indices(), vec![0, 3]);
    assert_eq!(map.sync(&seg).unwrap(), 2);
    assert!(map.store().dirty_indices().is_empty());
    assert_eq!(seg.spine_count().unwrap(), map.store().spine_count());
    assert_eq!(seg.spine_indices().unwrap(), vec![0, 3]);

    // Nothing dirty: nothing rewritten.
    assert_eq!(map.sync(&seg).unwrap(), 0);

    let restored: SpinedArrayMap<Run> = SpinedArrayMap::new(4, 2);
    assert_eq!(restored.load(&seg).unwrap(), 2);
    assert_eq!(restored.keys(), vec![0, 13]);
    assert_eq!(*restored.get(13).unwrap(), Run(vec![3, 4, 5, 6]));
    assert!(restored.store().dirty_indices().is_empty());
}

#[test]
fn int_map_survives_sync_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let seg = SpineDirectory::open(dir.path()).unwrap();
    let map = SpinedIntMap::new(8, 4, -1);
    map.put(3, 30);
    map.put(70, 700);
    map.sync(&seg).unwrap();

    let restored = SpinedIntMap::new(8, 4, -1);
    restored.load(&seg).unwrap();
    assert_eq!(restored.get(3), 30);
    assert_eq!(restored.get(70), 700);
    assert_eq!(restored.get(71), -1);
    assert_eq!(restored.get(20), -1);
}

#[test]
fn load_rejects_foreign_spine_size() {
    let dir = tempfile::tempdir().unwrap();
    let seg = SpineDirectory::open(dir.path()).unwrap();
    let map = SpinedIntMap::new(8, 1, 0);
    map.put(1, 1);
    map.sync(&seg).unwrap();

    let other = SpinedIntMap::new(16, 1, 0);
    let err = other.load(&seg).unwrap_err();
    assert!(matches!(err, SpineError::Corrupt { index: 0, .. }));
}

#[test]
fn load_rejects_undecodable_values() {
    let dir = tempfile::tempdir().unwrap();
    let seg = SpineDirectory::open(dir.path()).unwrap();
    // One slot holding three ints: Run refuses odd lengths.
    let mut bytes = Vec::new();
    for v in [1i32, 3, 7, 8, 9] {
        bytes.extend_from_slice(&v.to_be_bytes());
    }
    seg.write_spine(0, &bytes).unwrap();
    seg.write_spine_count(1).unwrap();

    let map: SpinedArrayMap<Run> = SpinedArrayMap::new(1, 1);
    let err = map.load(&seg).unwrap_err();
    assert!(err.to_string().contains("odd length"));
}

#[test]
fn load_rejects_spine_beyond_marker() {
    let dir = tempfile::tempdir().unwrap();
    let seg = SpineDirectory::open(dir.path()).unwrap();
    let spine = IntSpine::new(2, 0);
    let mut bytes = Vec::new();
    spine.encode(&mut bytes);
    seg.write_spine(4, &bytes).unwrap();
    seg.write_spine_count(2).unwrap();

    let store = int_store(2, 1);
    assert!(matches!(store.load(&seg), Err(SpineError::Inconsistent(_))));
}

#[test]
fn sync_failure_keeps_indices_dirty() {
    let dir = tempfile::tempdir().unwrap();
    let seg = SpineDirectory::open(dir.path().join("seg")).unwrap();
    let map = SpinedIntMap::new(4, 1, 0);
    map.put(1, 1);
    map.put(9, 9);
    // Remove the directory so the first write fails.
    std::fs::remove_dir_all(dir.path().join("seg")).unwrap();
    assert!(matches!(map.sync(&seg), Err(SpineError::Io { .. })));
    assert_eq!(map.store().dirty_indices(), vec![0, 2]);
}
