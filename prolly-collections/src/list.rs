//! Indexed lists
//!
//! A `List` pairs a root sequence with its chunk store. Lists are
//! immutable values: every edit returns a new list, and two lists with
//! the same logical contents share the same root hash however they were
//! built.

use crate::common::collection_hash;
use prolly_core::encode::encode_sequence;
use prolly_core::error::{Error, Result};
use prolly_core::hash::Hash;
use prolly_core::meta::Ref;
use prolly_core::sequence::{Item, Sequence, SequenceKind};
use prolly_core::store::{write_sequence, ChunkStore};
use prolly_core::value::Value;
use prolly_tree::cursor::SequenceCursor;
use prolly_tree::diff::{diff_indexed, Splice};
use prolly_tree::mutate::chunk_sequence;
use std::sync::Arc;

/// An immutable, content-addressed list of values
#[derive(Clone, Debug)]
pub struct List {
    store: Arc<dyn ChunkStore>,
    seq: Arc<Sequence>,
}

impl List {
    /// Build a list from values, chunking them into a tree
    pub async fn new(store: Arc<dyn ChunkStore>, values: Vec<Value>) -> Result<Self> {
        let items = values.into_iter().map(Item::Value).collect();
        let seq = chunk_sequence(store.clone(), SequenceKind::List, None, items, 0).await?;
        Ok(List { store, seq })
    }

    /// The empty list
    pub fn empty(store: Arc<dyn ChunkStore>) -> Self {
        List {
            store,
            seq: Arc::new(Sequence::empty(SequenceKind::List)),
        }
    }

    /// Wrap an existing root sequence in the list facade
    pub fn from_sequence(store: Arc<dyn ChunkStore>, seq: Arc<Sequence>) -> Result<Self> {
        if seq.kind() != SequenceKind::List {
            return Err(Error::precondition(format!(
                "expected a list sequence, got {}",
                seq.kind().name()
            )));
        }
        Ok(List { store, seq })
    }

    /// The root sequence
    pub fn sequence(&self) -> &Arc<Sequence> {
        &self.seq
    }

    /// The chunk store this list reads through
    pub fn store(&self) -> &Arc<dyn ChunkStore> {
        &self.store
    }

    /// Number of values
    pub fn len(&self) -> u64 {
        self.seq.num_leaves()
    }

    /// Whether the list holds no values
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Content address of the root node
    pub fn hash(&self) -> Hash {
        collection_hash(&self.seq)
    }

    /// Persist the root chunk (interior chunks are written during
    /// construction) and return its ref
    pub async fn persist(&self) -> Result<Ref> {
        write_sequence(self.store.as_ref(), &self.seq).await
    }

    /// The value at index `i`
    pub async fn get(&self, i: u64) -> Result<Value> {
        if i >= self.len() {
            return Err(Error::precondition(format!(
                "index {} out of range 0..{}",
                i,
                self.len()
            )));
        }
        let cur = SequenceCursor::new_at_index(self.store.clone(), self.seq.clone(), i).await?;
        match cur.current_item() {
            Some(Item::Value(v)) => Ok(v),
            _ => Err(Error::invariant("list cursor landed off an item")),
        }
    }

    /// Remove `remove` values at `at` and insert `insert` in their place,
    /// returning the new list
    pub async fn splice(&self, at: u64, remove: u64, insert: Vec<Value>) -> Result<List> {
        let len = self.len();
        if at > len || remove > len - at {
            return Err(Error::precondition(format!(
                "splice ({}, {}) out of range for length {}",
                at, remove, len
            )));
        }
        if remove == 0 && insert.is_empty() {
            return Ok(self.clone());
        }
        tracing::debug!(at, remove, insert = insert.len(), "list splice");
        let cur =
            SequenceCursor::new_at_index(self.store.clone(), self.seq.clone(), at).await?;
        let items = insert.into_iter().map(Item::Value).collect();
        let seq = chunk_sequence(
            self.store.clone(),
            SequenceKind::List,
            Some(cur),
            items,
            remove,
        )
        .await?;
        Ok(List {
            store: self.store.clone(),
            seq,
        })
    }

    /// Append one value
    pub async fn append(&self, value: Value) -> Result<List> {
        self.splice(self.len(), 0, vec![value]).await
    }

    /// Insert one value before index `i`
    pub async fn insert(&self, i: u64, value: Value) -> Result<List> {
        self.splice(i, 0, vec![value]).await
    }

    /// Remove the value at index `i`
    pub async fn remove(&self, i: u64) -> Result<List> {
        self.splice(i, 1, vec![]).await
    }

    /// Visit every value in order with its index
    pub async fn for_each<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(Value, u64),
    {
        let mut cur =
            SequenceCursor::new_at_index(self.store.clone(), self.seq.clone(), 0).await?;
        cur.iter(|item, i| {
            if let Item::Value(v) = item {
                f(v, i);
            }
            false
        })
        .await
    }

    /// Iterator over all values
    pub async fn iter(&self) -> Result<ListIterator> {
        self.iter_at(0).await
    }

    /// Iterator starting at index `i`
    pub async fn iter_at(&self, i: u64) -> Result<ListIterator> {
        let cursor =
            SequenceCursor::new_at_index(self.store.clone(), self.seq.clone(), i.min(self.len()))
                .await?;
        Ok(ListIterator { cursor })
    }

    /// Materialize the values in `[start, end)` (end clamps to the
    /// length)
    pub async fn to_vec(&self, start: u64, end: u64) -> Result<Vec<Value>> {
        let items = self.seq.range(self.store.as_ref(), start, end).await?;
        items
            .into_iter()
            .map(|it| match it {
                Item::Value(v) => Ok(v),
                other => Err(Error::invariant(format!("non-value item {:?} in list", other))),
            })
            .collect()
    }

    /// Splices rewriting `other` into `self`.
    ///
    /// `max_matrix` bounds the minimal-edit computation; larger unshared
    /// regions collapse into one replacement splice.
    pub async fn diff(&self, other: &List, max_matrix: usize) -> Result<Vec<Splice>> {
        diff_indexed(
            self.store.clone(),
            self.seq.clone(),
            other.store.clone(),
            other.seq.clone(),
            max_matrix,
        )
        .await
    }
}

// List equality is root identity
impl PartialEq for List {
    fn eq(&self, other: &Self) -> bool {
        encode_sequence(&self.seq) == encode_sequence(&other.seq)
    }
}

impl Eq for List {}

/// Cursor-backed iterator over list values
pub struct ListIterator {
    cursor: SequenceCursor,
}

impl ListIterator {
    /// The next value, or `None` at the end
    pub async fn next(&mut self) -> Result<Option<Value>> {
        if !self.cursor.valid() {
            return Ok(None);
        }
        let value = match self.cursor.current_item() {
            Some(Item::Value(v)) => v,
            _ => return Err(Error::invariant("list cursor landed off an item")),
        };
        self.cursor.advance().await?;
        Ok(Some(value))
    }
}
