use bytes::Bytes;
use cmfs::storage::{
    AccessGraph, BlockCache, EngineConfig, OrderedIndex, ReadSource, StorageEngine, StorageError,
    BLOCK_SIZE,
};
use tempfile::tempdir;

fn open_engine(dir: &tempfile::TempDir, blocks: u64, cache: usize) -> StorageEngine {
    StorageEngine::open(EngineConfig::new(dir.path().join("cmfs_data.img"), blocks, cache)).unwrap()
}

#[test]
fn notes_scenario_cache_then_disk() {
    let dir = tempdir().unwrap();
    let mut engine = open_engine(&dir, 64, 4);

    engine.write("notes.txt", Bytes::from_static(b"hello")).unwrap();
    let first = engine.read("notes.txt").unwrap();
    assert_eq!(&first.content[..], b"hello");
    assert_eq!(first.source, ReadSource::Cache);

    for i in 0..4 {
        engine
            .write(&format!("filler-{}", i), Bytes::from(format!("filler {}", i)))
            .unwrap();
    }

    let second = engine.read("notes.txt").unwrap();
    assert_eq!(second.source, ReadSource::Disk);
    assert_eq!(&second.content[..], b"hello");
}

#[test]
fn every_written_file_reads_back_exactly() {
    let dir = tempdir().unwrap();
    let mut engine = open_engine(&dir, 128, 8);

    let files: Vec<(String, Vec<u8>)> = (0..40)
        .map(|i| {
            let len = (i * 97) % BLOCK_SIZE;
            (format!("dir{}/file{:02}", i % 3, i), vec![(i % 251) as u8; len])
        })
        .collect();

    for (name, content) in &files {
        engine.write(name, Bytes::from(content.clone())).unwrap();
        assert_eq!(engine.read(name).unwrap().content.as_ref(), content.as_slice());
    }
    // Most of these now miss the cache and come back from the block store.
    for (name, content) in &files {
        assert_eq!(engine.read(name).unwrap().content.as_ref(), content.as_slice());
    }

    let listed: Vec<_> = engine.list("dir1/").into_iter().map(|f| f.name).collect();
    let mut expected: Vec<_> = files
        .iter()
        .map(|(name, _)| name.clone())
        .filter(|name| name.starts_with("dir1/"))
        .collect();
    expected.sort();
    assert_eq!(listed, expected);
    assert_eq!(engine.complete("dir1/"), expected);
}

#[test]
fn prediction_scenario() {
    let dir = tempdir().unwrap();
    let mut engine = open_engine(&dir, 8, 2);
    engine.write("a.txt", Bytes::from_static(b"a")).unwrap();

    for _ in 0..3 {
        engine.record_access_pair("a.txt", "b.txt");
    }
    engine.record_access_pair("a.txt", "c.txt");

    let mut graph = AccessGraph::new();
    for _ in 0..3 {
        graph.record("a.txt", "b.txt");
    }
    graph.record("a.txt", "c.txt");
    let predicted: Vec<_> = graph
        .predict("a.txt", 2)
        .into_iter()
        .map(|p| (p.target, p.weight))
        .collect();
    assert_eq!(predicted, vec![("b.txt".to_string(), 3), ("c.txt".to_string(), 1)]);

    let outcome = engine.read("a.txt").unwrap();
    assert_eq!(outcome.predictions.len(), 2);
    assert_eq!(outcome.predictions[0].target, "b.txt");

    // One decay removes c.txt; two more remove b.txt.
    assert_eq!(engine.decay(), 1);
    engine.decay();
    engine.decay();
    assert!(engine.read("a.txt").unwrap().predictions.is_empty());
}

#[test]
fn index_scenario_splits_root() {
    let mut index = OrderedIndex::new();
    for (i, key) in ["b", "a", "d", "c", "e"].iter().enumerate() {
        index.insert(*key, i as u64);
    }
    let keys: Vec<_> = index.iter().map(|e| e.file_id).collect();
    assert_eq!(keys, vec!["a", "b", "c", "d", "e"]);
    assert!(index.height() > 1);
}

#[test]
fn cache_evicts_first_of_capacity_plus_one() {
    let mut cache = BlockCache::new(5);
    for i in 0..6 {
        cache.put(format!("id{}", i), Bytes::new());
    }
    assert_eq!(cache.len(), 5);
    assert!(!cache.contains("id0"));
    assert!(cache.contains("id5"));
}

#[test]
fn full_disk_fails_closed_until_delete_with_reclaim() {
    let dir = tempdir().unwrap();
    let mut config = EngineConfig::new(dir.path().join("small.img"), 2, 2);
    config.reclaim_policy = cmfs::storage::ReclaimPolicy::FreeList;
    let mut engine = StorageEngine::open(config).unwrap();

    engine.write("a", Bytes::from_static(b"a")).unwrap();
    engine.write("b", Bytes::from_static(b"b")).unwrap();
    let err = engine.write("c", Bytes::from_static(b"c")).unwrap_err();
    assert!(matches!(err, StorageError::CapacityExceeded { .. }));
    assert_eq!(err.kind(), "CapacityExceeded");

    engine.delete("a").unwrap();
    engine.write("c", Bytes::from_static(b"c")).unwrap();
    assert_eq!(engine.stats().allocated_blocks, 2);
}

#[test]
fn leaked_blocks_are_counted_not_reused() {
    let dir = tempdir().unwrap();
    let mut engine = open_engine(&dir, 2, 2);

    engine.write("a", Bytes::from_static(b"a")).unwrap();
    engine.delete("a").unwrap();
    engine.write("b", Bytes::from_static(b"b")).unwrap();
    assert!(engine.write("c", Bytes::from_static(b"c")).is_err());

    let stats = engine.stats();
    assert_eq!(stats.leaked_blocks, 1);
    assert_eq!(stats.files, 1);
}
