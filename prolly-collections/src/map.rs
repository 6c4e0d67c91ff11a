//! Key-ordered maps
//!
//! A `Map` is an immutable collection of entries ordered by key. Bulk
//! construction sorts the input and collapses duplicate keys (the later
//! entry wins); point edits splice through the chunker, so the result's
//! identity is independent of edit order.

use crate::common::collection_hash;
use prolly_core::encode::encode_sequence;
use prolly_core::error::{Error, Result};
use prolly_core::hash::Hash;
use prolly_core::key::OrderedKey;
use prolly_core::meta::Ref;
use prolly_core::sequence::{Item, MapEntry, Sequence, SequenceKind};
use prolly_core::store::{write_sequence, ChunkStore};
use prolly_core::value::Value;
use prolly_tree::cursor::SequenceCursor;
use prolly_tree::diff::{diff_ordered, DiffChange};
use prolly_tree::mutate::chunk_sequence;
use std::sync::Arc;

/// Sort entries by key, later duplicates winning
fn build_map_data(mut entries: Vec<MapEntry>) -> Vec<MapEntry> {
    // Stable sort keeps insertion order among equal keys
    entries.sort_by(|a, b| a.key.cmp(&b.key));
    let mut out: Vec<MapEntry> = Vec::with_capacity(entries.len());
    for e in entries {
        match out.last_mut() {
            Some(last) if last.key == e.key => *last = e,
            _ => out.push(e),
        }
    }
    out
}

/// One key present in both maps with different values
#[derive(Clone, Debug, PartialEq)]
pub struct MapModification {
    pub key: Value,
    pub new_value: Value,
    pub old_value: Value,
}

/// Changes turning one map into another
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MapDiff {
    /// Entries only in the new map
    pub added: Vec<(Value, Value)>,
    /// Entries only in the old map
    pub removed: Vec<(Value, Value)>,
    /// Keys in both with differing values
    pub modified: Vec<MapModification>,
}

/// An immutable, content-addressed map ordered by key
#[derive(Clone, Debug)]
pub struct Map {
    store: Arc<dyn ChunkStore>,
    seq: Arc<Sequence>,
}

impl Map {
    /// Build a map from `(key, value)` pairs. Later duplicate keys win.
    pub async fn new(store: Arc<dyn ChunkStore>, entries: Vec<(Value, Value)>) -> Result<Self> {
        let entries = build_map_data(
            entries
                .into_iter()
                .map(|(k, v)| MapEntry::new(k, v))
                .collect(),
        );
        let items = entries.into_iter().map(Item::Entry).collect();
        let seq = chunk_sequence(store.clone(), SequenceKind::Map, None, items, 0).await?;
        Ok(Map { store, seq })
    }

    /// The empty map
    pub fn empty(store: Arc<dyn ChunkStore>) -> Self {
        Map {
            store,
            seq: Arc::new(Sequence::empty(SequenceKind::Map)),
        }
    }

    /// Wrap an existing root sequence in the map facade
    pub fn from_sequence(store: Arc<dyn ChunkStore>, seq: Arc<Sequence>) -> Result<Self> {
        if seq.kind() != SequenceKind::Map {
            return Err(Error::precondition(format!(
                "expected a map sequence, got {}",
                seq.kind().name()
            )));
        }
        Ok(Map { store, seq })
    }

    /// The root sequence
    pub fn sequence(&self) -> &Arc<Sequence> {
        &self.seq
    }

    /// Number of entries
    pub fn len(&self) -> u64 {
        self.seq.num_leaves()
    }

    /// Whether the map holds no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Content address of the root node
    pub fn hash(&self) -> Hash {
        collection_hash(&self.seq)
    }

    /// Persist the root chunk and return its ref
    pub async fn persist(&self) -> Result<Ref> {
        write_sequence(self.store.as_ref(), &self.seq).await
    }

    /// Cursor resting on `key`'s entry, or on its insertion point
    async fn cursor_at(&self, key: &Value, for_insertion: bool) -> Result<SequenceCursor> {
        SequenceCursor::new_at_key(
            self.store.clone(),
            self.seq.clone(),
            Some(&OrderedKey::new(key.clone())),
            for_insertion,
            false,
        )
        .await
    }

    /// The entry under a lookup cursor, when it matches `key`
    fn entry_at(cur: &SequenceCursor, key: &Value) -> Option<MapEntry> {
        match cur.current_item() {
            Some(Item::Entry(e)) if e.key == *key => Some(e),
            _ => None,
        }
    }

    /// Whether `key` is present
    pub async fn has(&self, key: &Value) -> Result<bool> {
        let cur = self.cursor_at(key, false).await?;
        Ok(Self::entry_at(&cur, key).is_some())
    }

    /// The value under `key`, if present
    pub async fn get(&self, key: &Value) -> Result<Option<Value>> {
        let cur = self.cursor_at(key, false).await?;
        Ok(Self::entry_at(&cur, key).map(|e| e.value))
    }

    /// Bind `key` to `value`, returning the new map. Setting an unchanged
    /// value returns an equal map without rebuilding.
    pub async fn set(&self, key: Value, value: Value) -> Result<Map> {
        let cur = self.cursor_at(&key, true).await?;
        let remove = match Self::entry_at(&cur, &key) {
            Some(existing) if existing.value == value => return Ok(self.clone()),
            Some(_) => 1,
            None => 0,
        };
        let seq = chunk_sequence(
            self.store.clone(),
            SequenceKind::Map,
            Some(cur),
            vec![Item::Entry(MapEntry::new(key, value))],
            remove,
        )
        .await?;
        Ok(Map {
            store: self.store.clone(),
            seq,
        })
    }

    /// Remove `key`, returning the new map. Deleting an absent key
    /// returns an equal map.
    pub async fn delete(&self, key: &Value) -> Result<Map> {
        let cur = self.cursor_at(key, false).await?;
        if Self::entry_at(&cur, key).is_none() {
            return Ok(self.clone());
        }
        let seq = chunk_sequence(
            self.store.clone(),
            SequenceKind::Map,
            Some(cur),
            vec![],
            1,
        )
        .await?;
        Ok(Map {
            store: self.store.clone(),
            seq,
        })
    }

    /// The smallest entry, if any
    pub async fn first(&self) -> Result<Option<(Value, Value)>> {
        let cur =
            SequenceCursor::new_at_index(self.store.clone(), self.seq.clone(), 0).await?;
        Ok(match cur.current_item() {
            Some(Item::Entry(e)) => Some((e.key, e.value)),
            _ => None,
        })
    }

    /// Visit every entry in key order
    pub async fn for_each<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(Value, Value),
    {
        let mut cur =
            SequenceCursor::new_at_index(self.store.clone(), self.seq.clone(), 0).await?;
        cur.iter(|item, _| {
            if let Item::Entry(e) = item {
                f(e.key, e.value);
            }
            false
        })
        .await
    }

    /// Iterator over entries in key order
    pub async fn iter(&self) -> Result<MapIterator> {
        let cursor =
            SequenceCursor::new_at_index(self.store.clone(), self.seq.clone(), 0).await?;
        Ok(MapIterator { cursor })
    }

    /// Changes turning `other` into `self`
    pub async fn diff(&self, other: &Map) -> Result<MapDiff> {
        let changes = diff_ordered(
            self.store.clone(),
            self.seq.clone(),
            other.store.clone(),
            other.seq.clone(),
        )
        .await?;
        let mut diff = MapDiff::default();
        for change in changes {
            match change {
                DiffChange::Added(Item::Entry(e)) => diff.added.push((e.key, e.value)),
                DiffChange::Removed(Item::Entry(e)) => diff.removed.push((e.key, e.value)),
                DiffChange::Modified {
                    new: Item::Entry(new),
                    old: Item::Entry(old),
                } => diff.modified.push(MapModification {
                    key: new.key,
                    new_value: new.value,
                    old_value: old.value,
                }),
                other => return Err(Error::invariant(format!("non-entry map change {:?}", other))),
            }
        }
        Ok(diff)
    }
}

// Map equality is root identity
impl PartialEq for Map {
    fn eq(&self, other: &Self) -> bool {
        encode_sequence(&self.seq) == encode_sequence(&other.seq)
    }
}

impl Eq for Map {}

/// Cursor-backed iterator over map entries
pub struct MapIterator {
    cursor: SequenceCursor,
}

impl MapIterator {
    /// The next entry in key order, or `None` at the end
    pub async fn next(&mut self) -> Result<Option<(Value, Value)>> {
        if !self.cursor.valid() {
            return Ok(None);
        }
        let entry = match self.cursor.current_item() {
            Some(Item::Entry(e)) => e,
            _ => return Err(Error::invariant("map cursor landed off an entry")),
        };
        self.cursor.advance().await?;
        Ok(Some((entry.key, entry.value)))
    }
}
