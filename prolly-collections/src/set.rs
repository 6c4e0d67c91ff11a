//! Value-ordered sets
//!
//! Like `Map` without values: an immutable sorted collection of unique
//! values with splice-based inserts and deletes.

use crate::common::collection_hash;
use prolly_core::encode::encode_sequence;
use prolly_core::error::{Error, Result};
use prolly_core::hash::Hash;
use prolly_core::key::OrderedKey;
use prolly_core::meta::Ref;
use prolly_core::sequence::{Item, Sequence, SequenceKind};
use prolly_core::store::{write_sequence, ChunkStore};
use prolly_core::value::Value;
use prolly_tree::cursor::SequenceCursor;
use prolly_tree::diff::{diff_ordered, DiffChange};
use prolly_tree::mutate::chunk_sequence;
use std::sync::Arc;

/// Values added to and removed from a set
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SetDiff {
    /// Values only in the new set
    pub added: Vec<Value>,
    /// Values only in the old set
    pub removed: Vec<Value>,
}

/// An immutable, content-addressed set of values
#[derive(Clone, Debug)]
pub struct Set {
    store: Arc<dyn ChunkStore>,
    seq: Arc<Sequence>,
}

impl Set {
    /// Build a set from values, dropping duplicates
    pub async fn new(store: Arc<dyn ChunkStore>, mut values: Vec<Value>) -> Result<Self> {
        values.sort();
        values.dedup();
        let items = values.into_iter().map(Item::Value).collect();
        let seq = chunk_sequence(store.clone(), SequenceKind::Set, None, items, 0).await?;
        Ok(Set { store, seq })
    }

    /// The empty set
    pub fn empty(store: Arc<dyn ChunkStore>) -> Self {
        Set {
            store,
            seq: Arc::new(Sequence::empty(SequenceKind::Set)),
        }
    }

    /// Wrap an existing root sequence in the set facade
    pub fn from_sequence(store: Arc<dyn ChunkStore>, seq: Arc<Sequence>) -> Result<Self> {
        if seq.kind() != SequenceKind::Set {
            return Err(Error::precondition(format!(
                "expected a set sequence, got {}",
                seq.kind().name()
            )));
        }
        Ok(Set { store, seq })
    }

    /// The root sequence
    pub fn sequence(&self) -> &Arc<Sequence> {
        &self.seq
    }

    /// Number of members
    pub fn len(&self) -> u64 {
        self.seq.num_leaves()
    }

    /// Whether the set holds no members
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

    async fn cursor_at(&self, value: &Value, for_insertion: bool) -> Result<SequenceCursor> {
        SequenceCursor::new_at_key(
            self.store.clone(),
            self.seq.clone(),
            Some(&OrderedKey::new(value.clone())),
            for_insertion,
            false,
        )
        .await
    }

    fn member_at(cur: &SequenceCursor, value: &Value) -> bool {
        matches!(cur.current_item(), Some(Item::Value(v)) if v == *value)
    }

    /// Whether `value` is a member
    pub async fn has(&self, value: &Value) -> Result<bool> {
        let cur = self.cursor_at(value, false).await?;
        Ok(Self::member_at(&cur, value))
    }

    /// Add `value`, returning the new set. Adding an existing member
    /// returns an equal set.
    pub async fn insert(&self, value: Value) -> Result<Set> {
        let cur = self.cursor_at(&value, true).await?;
        if Self::member_at(&cur, &value) {
            return Ok(self.clone());
        }
        let seq = chunk_sequence(
            self.store.clone(),
            SequenceKind::Set,
            Some(cur),
            vec![Item::Value(value)],
            0,
        )
        .await?;
        Ok(Set {
            store: self.store.clone(),
            seq,
        })
    }

    /// Remove `value`, returning the new set. Removing an absent value
    /// returns an equal set.
    pub async fn delete(&self, value: &Value) -> Result<Set> {
        let cur = self.cursor_at(value, false).await?;
        if !Self::member_at(&cur, value) {
            return Ok(self.clone());
        }
        let seq = chunk_sequence(
            self.store.clone(),
            SequenceKind::Set,
            Some(cur),
            vec![],
            1,
        )
        .await?;
        Ok(Set {
            store: self.store.clone(),
            seq,
        })
    }

    /// The smallest member, if any
    pub async fn first(&self) -> Result<Option<Value>> {
        let cur =
            SequenceCursor::new_at_index(self.store.clone(), self.seq.clone(), 0).await?;
        Ok(match cur.current_item() {
            Some(Item::Value(v)) => Some(v),
            _ => None,
        })
    }

    /// Visit every member in order
    pub async fn for_each<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(Value),
    {
        let mut cur =
            SequenceCursor::new_at_index(self.store.clone(), self.seq.clone(), 0).await?;
        cur.iter(|item, _| {
            if let Item::Value(v) = item {
                f(v);
            }
            false
        })
        .await
    }

    /// Iterator over members in order
    pub async fn iter(&self) -> Result<SetIterator> {
        let cursor =
            SequenceCursor::new_at_index(self.store.clone(), self.seq.clone(), 0).await?;
        Ok(SetIterator { cursor })
    }

    /// Members separating `other` from `self`
    pub async fn diff(&self, other: &Set) -> Result<SetDiff> {
        let changes = diff_ordered(
            self.store.clone(),
            self.seq.clone(),
            other.store.clone(),
            other.seq.clone(),
        )
        .await?;
        let mut diff = SetDiff::default();
        for change in changes {
            match change {
                DiffChange::Added(Item::Value(v)) => diff.added.push(v),
                DiffChange::Removed(Item::Value(v)) => diff.removed.push(v),
                other => return Err(Error::invariant(format!("non-value set change {:?}", other))),
            }
        }
        Ok(diff)
    }
}

// Set equality is root identity
impl PartialEq for Set {
    fn eq(&self, other: &Self) -> bool {
        encode_sequence(&self.seq) == encode_sequence(&other.seq)
    }
}

impl Eq for Set {}

/// Cursor-backed iterator over set members
pub struct SetIterator {
    cursor: SequenceCursor,
}

impl SetIterator {
    /// The next member in order, or `None` at the end
    pub async fn next(&mut self) -> Result<Option<Value>> {
        if !self.cursor.valid() {
            return Ok(None);
        }
        let value = match self.cursor.current_item() {
            Some(Item::Value(v)) => v,
            _ => return Err(Error::invariant("set cursor landed off a member")),
        };
        self.cursor.advance().await?;
        Ok(Some(value))
    }
}
