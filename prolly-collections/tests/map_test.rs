//! Map behavior tests
//!
//! Construction collapse rules, point operations and their benign cases,
//! ordered iteration, diff correctness, and the shared-subtree diff
//! optimization measured through a read-counting store.

use async_trait::async_trait;
use prolly_collections::{Map, MemoryStore, Value};
use prolly_core::error::Result as CoreResult;
use prolly_core::hash::Hash;
use prolly_core::store::{ChunkRead, ChunkStore, ChunkWrite};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn store() -> Arc<dyn ChunkStore> {
    Arc::new(MemoryStore::new())
}

fn entries(pairs: impl IntoIterator<Item = (i64, &'static str)>) -> Vec<(Value, Value)> {
    pairs
        .into_iter()
        .map(|(k, v)| (Value::Int(k), Value::from(v)))
        .collect()
}

#[tokio::test]
async fn test_leaf_only_map() {
    let map = Map::new(store(), entries([(1, "a"), (2, "b"), (3, "c")]))
        .await
        .unwrap();
    assert_eq!(map.len(), 3);
    assert_eq!(map.get(&Value::Int(2)).await.unwrap(), Some(Value::from("b")));
    assert!(!map.has(&Value::Int(4)).await.unwrap());
    assert!(map.has(&Value::Int(1)).await.unwrap());
}

#[tokio::test]
async fn test_duplicate_keys_collapse_later_wins() {
    let map = Map::new(store(), entries([(1, "a"), (1, "b")])).await.unwrap();
    assert_eq!(map.len(), 1);
    assert_eq!(map.get(&Value::Int(1)).await.unwrap(), Some(Value::from("b")));
}

#[tokio::test]
async fn test_set_and_delete() {
    let map = Map::new(store(), entries([(1, "a"), (3, "c")])).await.unwrap();

    let with_two = map.set(Value::Int(2), Value::from("b")).await.unwrap();
    assert_eq!(with_two.len(), 3);
    assert_eq!(
        with_two.get(&Value::Int(2)).await.unwrap(),
        Some(Value::from("b"))
    );
    // the original is untouched
    assert!(!map.has(&Value::Int(2)).await.unwrap());

    let without = with_two.delete(&Value::Int(2)).await.unwrap();
    assert_eq!(without, map);
    assert_eq!(without.hash(), map.hash());
}

#[tokio::test]
async fn test_benign_operations_return_equal_maps() {
    let map = Map::new(store(), entries([(1, "a"), (2, "b")])).await.unwrap();

    // setting an unchanged value
    let same = map.set(Value::Int(1), Value::from("a")).await.unwrap();
    assert_eq!(same.hash(), map.hash());

    // deleting an absent key, below and above the key range
    assert_eq!(map.delete(&Value::Int(0)).await.unwrap().hash(), map.hash());
    assert_eq!(map.delete(&Value::Int(9)).await.unwrap().hash(), map.hash());
}

#[tokio::test]
async fn test_set_past_all_keys() {
    let map = Map::new(store(), entries([(1, "a"), (2, "b")])).await.unwrap();
    let grown = map.set(Value::Int(100), Value::from("z")).await.unwrap();
    assert_eq!(grown.len(), 3);
    assert_eq!(
        grown.first().await.unwrap(),
        Some((Value::Int(1), Value::from("a")))
    );
    assert_eq!(
        grown.get(&Value::Int(100)).await.unwrap(),
        Some(Value::from("z"))
    );
}

#[tokio::test]
async fn test_construction_order_does_not_matter() {
    let forward: Vec<(Value, Value)> = (0..4000)
        .map(|k| (Value::Int(k), Value::Int(k * 2)))
        .collect();
    let mut reversed = forward.clone();
    reversed.reverse();

    let a = Map::new(store(), forward).await.unwrap();
    let b = Map::new(store(), reversed).await.unwrap();
    assert_eq!(a.hash(), b.hash());
}

#[tokio::test]
async fn test_ordered_unique_iteration() {
    // Random keys with plenty of duplicates: iteration must be strictly
    // increasing and the size must match the distinct-key count.
    let mut rng = StdRng::seed_from_u64(42);
    let mut pairs = Vec::new();
    let mut reference: BTreeMap<i64, i64> = BTreeMap::new();
    for _ in 0..5000 {
        let k = rng.gen_range(0..2000);
        let v = rng.gen_range(0..1_000_000);
        pairs.push((Value::Int(k), Value::Int(v)));
        reference.insert(k, v);
    }

    let map = Map::new(store(), pairs).await.unwrap();
    assert_eq!(map.len(), reference.len() as u64);

    let mut previous: Option<Value> = None;
    let mut entries_seen = Vec::new();
    map.for_each(|k, v| {
        if let Some(prev) = &previous {
            assert!(*prev < k, "iteration must be strictly increasing");
        }
        previous = Some(k.clone());
        entries_seen.push((k, v));
    })
    .await
    .unwrap();

    let expected: Vec<(Value, Value)> = reference
        .into_iter()
        .map(|(k, v)| (Value::Int(k), Value::Int(v)))
        .collect();
    assert_eq!(entries_seen, expected);
}

#[tokio::test]
async fn test_point_edits_match_bulk_construction() {
    let st = store();
    let base: Vec<(Value, Value)> = (0..6000)
        .map(|k| (Value::Int(k), Value::Int(k)))
        .collect();
    let map = Map::new(st.clone(), base.clone()).await.unwrap();

    let edited = map.set(Value::Int(3000), Value::Int(-1)).await.unwrap();

    let mut edited_entries = base;
    edited_entries[3000].1 = Value::Int(-1);
    let reference = Map::new(st, edited_entries).await.unwrap();
    assert_eq!(edited.hash(), reference.hash());
}

async fn collect(map: &Map) -> Vec<(Value, Value)> {
    let mut out = Vec::new();
    let mut iter = map.iter().await.unwrap();
    while let Some(entry) = iter.next().await.unwrap() {
        out.push(entry);
    }
    out
}

#[tokio::test]
async fn test_diff_apply_recovers_new_map() {
    let mut rng = StdRng::seed_from_u64(7);
    let st = store();

    let mut old_entries: BTreeMap<i64, i64> = BTreeMap::new();
    for _ in 0..3000 {
        old_entries.insert(rng.gen_range(0..10_000), rng.gen_range(0..100));
    }
    let mut new_entries = old_entries.clone();
    for _ in 0..200 {
        match rng.gen_range(0..3) {
            0 => {
                new_entries.insert(rng.gen_range(0..10_000), rng.gen_range(0..100));
            }
            1 => {
                let k = rng.gen_range(0..10_000);
                new_entries.remove(&k);
            }
            _ => {
                let k = rng.gen_range(0..10_000);
                if new_entries.contains_key(&k) {
                    new_entries.insert(k, rng.gen_range(100..200));
                }
            }
        }
    }

    let to_pairs = |m: &BTreeMap<i64, i64>| -> Vec<(Value, Value)> {
        m.iter()
            .map(|(&k, &v)| (Value::Int(k), Value::Int(v)))
            .collect()
    };
    let old = Map::new(st.clone(), to_pairs(&old_entries)).await.unwrap();
    let new = Map::new(st, to_pairs(&new_entries)).await.unwrap();

    let diff = new.diff(&old).await.unwrap();

    // replay the diff over the old contents
    let mut rebuilt: BTreeMap<Value, Value> = collect(&old).await.into_iter().collect();
    for (k, _) in &diff.removed {
        rebuilt.remove(k);
    }
    for (k, v) in &diff.added {
        rebuilt.insert(k.clone(), v.clone());
    }
    for m in &diff.modified {
        rebuilt.insert(m.key.clone(), m.new_value.clone());
    }
    let rebuilt: Vec<(Value, Value)> = rebuilt.into_iter().collect();
    assert_eq!(rebuilt, collect(&new).await);
}

// ============================================================================
// Shared-subtree diff cost
// ============================================================================

/// A store that counts chunk reads, for asserting traversal cost
#[derive(Debug, Clone)]
struct CountingStore {
    inner: MemoryStore,
    gets: Arc<AtomicUsize>,
}

impl CountingStore {
    fn new() -> Self {
        CountingStore {
            inner: MemoryStore::new(),
            gets: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl ChunkRead for CountingStore {
    async fn get(&self, hash: &Hash) -> CoreResult<Option<Vec<u8>>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(hash).await
    }
}

#[async_trait]
impl ChunkWrite for CountingStore {
    async fn put(&self, bytes: &[u8]) -> CoreResult<Hash> {
        self.inner.put(bytes).await
    }
}

#[tokio::test]
async fn test_diff_skips_shared_subtrees() {
    let counting = CountingStore::new();
    let st: Arc<dyn ChunkStore> = Arc::new(counting.clone());

    let old_pairs: Vec<(Value, Value)> = (0..30_000)
        .map(|k| (Value::Int(k), Value::Int(k)))
        .collect();
    let mut new_pairs = old_pairs.clone();
    new_pairs[15_000].1 = Value::Int(-1);

    let old = Map::new(st.clone(), old_pairs).await.unwrap();
    let new = Map::new(st, new_pairs).await.unwrap();
    assert!(new.sequence().is_meta(), "tree too small for this test");

    counting.gets.store(0, Ordering::SeqCst);
    let diff = new.diff(&old).await.unwrap();

    assert!(diff.added.is_empty());
    assert!(diff.removed.is_empty());
    assert_eq!(diff.modified.len(), 1);
    assert_eq!(diff.modified[0].key, Value::Int(15_000));
    assert_eq!(diff.modified[0].new_value, Value::Int(-1));

    // Identical regions are skipped by meta-tuple comparison; only the
    // spine holding the modification gets loaded. A full walk would read
    // every leaf chunk on both sides (dozens here).
    let reads = counting.gets.load(Ordering::SeqCst);
    assert!(
        reads < 30,
        "diff read {} chunks; shared subtrees were not skipped",
        reads
    );
}
