//! Sequence nodes
//!
//! A prolly-tree node is a `Sequence`: one of four leaf shapes (list,
//! map, set, blob) or a meta node whose entries are `MetaTuple`s pointing
//! at child chunks. All shapes are immutable after construction and share
//! one dispatch surface so the cursor, chunker, and diff can treat them
//! uniformly.
//!
//! Meta nodes precompute cumulative leaf counts (`offsets`) so that
//! descending to a leaf index is a binary search per level.

use crate::error::{Error, Result};
use crate::key::OrderedKey;
use crate::meta::MetaTuple;
use crate::store::{read_sequence, ChunkRead};
use crate::value::Value;
use futures::future::BoxFuture;
use std::sync::Arc;

/// Which collection a tree belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SequenceKind {
    /// Indexed values
    List,
    /// Entries ordered by key
    Map,
    /// Values ordered by themselves
    Set,
    /// Indexed bytes
    Blob,
}

impl SequenceKind {
    /// Short name for logs and errors
    pub fn name(&self) -> &'static str {
        match self {
            SequenceKind::List => "list",
            SequenceKind::Map => "map",
            SequenceKind::Set => "set",
            SequenceKind::Blob => "blob",
        }
    }

    /// Whether trees of this kind are ordered by key (vs by position)
    pub fn is_ordered(&self) -> bool {
        matches!(self, SequenceKind::Map | SequenceKind::Set)
    }
}

/// A key/value entry of a map leaf
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MapEntry {
    pub key: Value,
    pub value: Value,
}

impl MapEntry {
    /// Create an entry
    pub fn new(key: Value, value: Value) -> Self {
        MapEntry { key, value }
    }
}

/// The uniform element type flowing through the cursor and chunker
#[derive(Clone, Debug, PartialEq)]
pub enum Item {
    /// List or set leaf element
    Value(Value),
    /// Map leaf element
    Entry(MapEntry),
    /// Blob leaf element
    Byte(u8),
    /// Meta node element
    Meta(MetaTuple),
}

impl Item {
    /// The ordering key of this item, when it has one
    pub fn key(&self) -> Option<OrderedKey> {
        match self {
            Item::Value(v) => Some(OrderedKey::new(v.clone())),
            Item::Entry(e) => Some(OrderedKey::new(e.key.clone())),
            Item::Byte(_) => None,
            Item::Meta(mt) => Some(mt.key().clone()),
        }
    }

    /// Borrow the meta tuple, when this is a meta item
    pub fn as_meta(&self) -> Option<&MetaTuple> {
        match self {
            Item::Meta(mt) => Some(mt),
            _ => None,
        }
    }
}

/// A meta node: an ordered run of child refs with boundary keys
#[derive(Clone, Debug, PartialEq)]
pub struct MetaSequence {
    kind: SequenceKind,
    height: u64,
    items: Vec<MetaTuple>,
    /// offsets[i] = leaves reachable through children 0..=i
    offsets: Vec<u64>,
}

impl MetaSequence {
    /// Build a meta node from its tuples. `height` is 1 + child height.
    pub fn new(kind: SequenceKind, height: u64, items: Vec<MetaTuple>) -> Self {
        debug_assert!(height >= 1);
        debug_assert!(items.iter().all(|mt| mt.child_ref().height == height - 1));
        let mut offsets = Vec::with_capacity(items.len());
        let mut total = 0u64;
        for mt in &items {
            total += mt.num_leaves();
            offsets.push(total);
        }
        MetaSequence {
            kind,
            height,
            items,
            offsets,
        }
    }

    /// The node's tuples
    pub fn tuples(&self) -> &[MetaTuple] {
        &self.items
    }

    /// Which collection this node belongs to
    pub fn kind(&self) -> SequenceKind {
        self.kind
    }

    /// Tree height of this node (leaf = 0)
    pub fn height(&self) -> u64 {
        self.height
    }
}

/// A prolly-tree node
#[derive(Clone, Debug, PartialEq)]
pub enum Sequence {
    ListLeaf(Vec<Value>),
    MapLeaf(Vec<MapEntry>),
    SetLeaf(Vec<Value>),
    BlobLeaf(Vec<u8>),
    Meta(MetaSequence),
}

impl Sequence {
    /// The zero-length sequence of a kind
    pub fn empty(kind: SequenceKind) -> Sequence {
        match kind {
            SequenceKind::List => Sequence::ListLeaf(Vec::new()),
            SequenceKind::Map => Sequence::MapLeaf(Vec::new()),
            SequenceKind::Set => Sequence::SetLeaf(Vec::new()),
            SequenceKind::Blob => Sequence::BlobLeaf(Vec::new()),
        }
    }

    /// Which collection this node belongs to
    pub fn kind(&self) -> SequenceKind {
        match self {
            Sequence::ListLeaf(_) => SequenceKind::List,
            Sequence::MapLeaf(_) => SequenceKind::Map,
            Sequence::SetLeaf(_) => SequenceKind::Set,
            Sequence::BlobLeaf(_) => SequenceKind::Blob,
            Sequence::Meta(m) => m.kind,
        }
    }

    /// Number of items in this node
    pub fn len(&self) -> usize {
        match self {
            Sequence::ListLeaf(v) => v.len(),
            Sequence::MapLeaf(v) => v.len(),
            Sequence::SetLeaf(v) => v.len(),
            Sequence::BlobLeaf(v) => v.len(),
            Sequence::Meta(m) => m.items.len(),
        }
    }

    /// Whether this node holds no items
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether this is a meta node
    pub fn is_meta(&self) -> bool {
        matches!(self, Sequence::Meta(_))
    }

    /// Tree height (leaf = 0)
    pub fn height(&self) -> u64 {
        match self {
            Sequence::Meta(m) => m.height,
            _ => 0,
        }
    }

    /// Leaf items reachable through this node
    pub fn num_leaves(&self) -> u64 {
        match self {
            Sequence::Meta(m) => m.offsets.last().copied().unwrap_or(0),
            leaf => leaf.len() as u64,
        }
    }

    /// Leaf items reachable through items `0..=i`
    pub fn cumulative_number_of_leaves(&self, i: usize) -> u64 {
        match self {
            Sequence::Meta(m) => m.offsets[i],
            _ => i as u64 + 1,
        }
    }

    /// The item at `i`
    pub fn item(&self, i: usize) -> Item {
        match self {
            Sequence::ListLeaf(v) => Item::Value(v[i].clone()),
            Sequence::MapLeaf(v) => Item::Entry(v[i].clone()),
            Sequence::SetLeaf(v) => Item::Value(v[i].clone()),
            Sequence::BlobLeaf(v) => Item::Byte(v[i]),
            Sequence::Meta(m) => Item::Meta(m.items[i].clone()),
        }
    }

    /// The ordering key of the item at `i`.
    ///
    /// Indexed leaves (list, blob) report a counted key; it is never used
    /// for seeking, only for boundary bookkeeping.
    pub fn get_key(&self, i: usize) -> OrderedKey {
        match self {
            Sequence::ListLeaf(_) | Sequence::BlobLeaf(_) => OrderedKey::counted(i as u64 + 1),
            Sequence::MapLeaf(v) => OrderedKey::new(v[i].key.clone()),
            Sequence::SetLeaf(v) => OrderedKey::new(v[i].clone()),
            Sequence::Meta(m) => m.items[i].key().clone(),
        }
    }

    /// The meta node, when this is one
    pub fn meta(&self) -> Option<&MetaSequence> {
        match self {
            Sequence::Meta(m) => Some(m),
            _ => None,
        }
    }

    /// Blob leaf bytes, when this is one
    pub fn blob_bytes(&self) -> Option<&[u8]> {
        match self {
            Sequence::BlobLeaf(v) => Some(v),
            _ => None,
        }
    }

    /// The child at `i` when it is cached in memory (fresh nodes only)
    pub fn get_child_sequence_sync(&self, i: usize) -> Option<Arc<Sequence>> {
        match self {
            Sequence::Meta(m) => m.items[i].cached().cloned(),
            _ => None,
        }
    }

    /// Load the child at `i`, reading through the store unless cached.
    /// Leaves have no children.
    pub async fn get_child_sequence(
        &self,
        store: &dyn ChunkRead,
        i: usize,
    ) -> Result<Option<Arc<Sequence>>> {
        let Sequence::Meta(m) = self else {
            return Ok(None);
        };
        let mt = &m.items[i];
        if let Some(cached) = mt.cached() {
            return Ok(Some(cached.clone()));
        }
        Ok(Some(read_sequence(store, mt.child_ref()).await?))
    }

    /// Collect the leaf items at positions `[start, end)` under this
    /// node, descending through meta levels.
    pub fn range<'a>(
        &'a self,
        store: &'a dyn ChunkRead,
        start: u64,
        end: u64,
    ) -> BoxFuture<'a, Result<Vec<Item>>> {
        Box::pin(async move {
            let end = end.min(self.num_leaves());
            if start >= end {
                return Ok(Vec::new());
            }
            let m = match self {
                Sequence::Meta(m) => m,
                leaf => {
                    let mut out = Vec::with_capacity((end - start) as usize);
                    for i in start..end {
                        out.push(leaf.item(i as usize));
                    }
                    return Ok(out);
                }
            };

            let mut out = Vec::with_capacity((end - start) as usize);
            let mut child_start = 0u64;
            for (i, child_end) in m.offsets.iter().copied().enumerate() {
                if child_end > start {
                    let lo = start.saturating_sub(child_start);
                    let hi = end.min(child_end) - child_start;
                    let child = self
                        .get_child_sequence(store, i)
                        .await?
                        .ok_or_else(|| Error::invariant("meta node without child"))?;
                    out.extend(child.range(store, lo, hi).await?);
                    if child_end >= end {
                        break;
                    }
                }
                child_start = child_end;
            }
            Ok(out)
        })
    }

    /// Diff predicate over `(i, j)`: leaf shapes compare items, meta
    /// shapes compare child identities.
    pub fn equals_at(&self, other: &Sequence, i: usize, j: usize) -> bool {
        match (self, other) {
            (Sequence::Meta(a), Sequence::Meta(b)) => {
                a.items[i].child_ref().hash == b.items[j].child_ref().hash
            }
            _ => self.item(i) == other.item(j),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::Hash;
    use crate::meta::Ref;
    use crate::store::MemoryStore;

    fn int_leaf(values: &[i64]) -> Sequence {
        Sequence::ListLeaf(values.iter().map(|&v| Value::Int(v)).collect())
    }

    #[test]
    fn test_leaf_invariants() {
        let leaf = int_leaf(&[1, 2, 3]);
        assert!(!leaf.is_meta());
        assert_eq!(leaf.len(), 3);
        assert_eq!(leaf.num_leaves(), 3);
        assert_eq!(leaf.cumulative_number_of_leaves(0), 1);
        assert_eq!(leaf.cumulative_number_of_leaves(2), 3);
        assert!(leaf.get_child_sequence_sync(0).is_none());
    }

    #[test]
    fn test_meta_offsets() {
        let mk = |n: u64, seed: &[u8]| {
            MetaTuple::new(Ref::new(Hash::of(seed), 0), OrderedKey::counted(n), n)
        };
        let meta = MetaSequence::new(
            SequenceKind::List,
            1,
            vec![mk(3, b"a"), mk(2, b"b"), mk(4, b"c")],
        );
        let seq = Sequence::Meta(meta);
        assert!(seq.is_meta());
        assert_eq!(seq.num_leaves(), 9);
        assert_eq!(seq.cumulative_number_of_leaves(0), 3);
        assert_eq!(seq.cumulative_number_of_leaves(1), 5);
        assert_eq!(seq.cumulative_number_of_leaves(2), 9);
    }

    #[tokio::test]
    async fn test_range_on_leaf() {
        let store = MemoryStore::new();
        let leaf = int_leaf(&[10, 11, 12, 13]);
        let items = leaf.range(&store, 1, 3).await.unwrap();
        assert_eq!(
            items,
            vec![Item::Value(Value::Int(11)), Item::Value(Value::Int(12))]
        );
        // Out-of-range end clamps
        let items = leaf.range(&store, 2, 100).await.unwrap();
        assert_eq!(items.len(), 2);
    }

    #[tokio::test]
    async fn test_range_descends_cached_children() {
        let store = MemoryStore::new();
        let left = Arc::new(int_leaf(&[1, 2]));
        let right = Arc::new(int_leaf(&[3, 4, 5]));
        let mk = |seq: &Arc<Sequence>, seed: &[u8]| {
            MetaTuple::new(
                Ref::new(Hash::of(seed), 0),
                OrderedKey::counted(seq.num_leaves()),
                seq.num_leaves(),
            )
            .with_cached(seq.clone())
        };
        let meta = Sequence::Meta(MetaSequence::new(
            SequenceKind::List,
            1,
            vec![mk(&left, b"l"), mk(&right, b"r")],
        ));
        let items = meta.range(&store, 1, 4).await.unwrap();
        let got: Vec<i64> = items
            .iter()
            .map(|it| match it {
                Item::Value(Value::Int(i)) => *i,
                other => panic!("unexpected item {:?}", other),
            })
            .collect();
        assert_eq!(got, vec![2, 3, 4]);
    }
}
