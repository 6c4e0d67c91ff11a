//! Sequence cursors
//!
//! A cursor locates a single item in a prolly-tree as a stack of
//! `(node, index)` frames, one per tree level, root first. Frames own
//! their nodes through `Arc`, so cursors are cheap to clone and never
//! mutate the tree.
//!
//! Movement has a synchronous fast path (`advance_local` /
//! `retreat_local`) for steps within the current chunk and an async slow
//! path (`advance` / `retreat`) that hops across chunk boundaries by
//! stepping the parent frame and re-reading the child through the chunk
//! store. Suspension happens only on those child-chunk loads.
//!
//! Valid positions are `0 <= idx < len`. Two sentinel positions are legal
//! but invalid: `-1` (before the start) and `len` (past the end).
//! Stepping further outward from a sentinel returns `false` without
//! changing state.

use futures::future::BoxFuture;
use prolly_core::error::{Error, Result};
use prolly_core::key::OrderedKey;
use prolly_core::sequence::{Item, Sequence};
use prolly_core::store::ChunkStore;
use std::cmp::Ordering;
use std::sync::Arc;

/// One level of a cursor: a node and a position within it
#[derive(Clone, Debug)]
pub(crate) struct Frame {
    pub(crate) seq: Arc<Sequence>,
    pub(crate) idx: isize,
}

/// A stack of frames locating one item in a tree
#[derive(Clone, Debug)]
pub struct SequenceCursor {
    store: Arc<dyn ChunkStore>,
    pub(crate) frames: Vec<Frame>,
}

/// Binary search: the first index in `0..len` where `pred` is true, or
/// `len` when it never is. `pred` must be monotone.
fn search(len: usize, pred: impl Fn(usize) -> bool) -> usize {
    let (mut lo, mut hi) = (0, len);
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if pred(mid) {
            hi = mid;
        } else {
            lo = mid + 1;
        }
    }
    lo
}

/// Locate `key` within one node: the first position whose key is >= `key`.
///
/// Returns `(idx, found)`. On a miss with `last_if_missing` the position
/// clamps to the final item (meta descent must enter the last subtree for
/// insertions past every existing key).
fn seek_in(seq: &Sequence, key: &OrderedKey, last_if_missing: bool) -> (isize, bool) {
    let len = seq.len();
    let idx = search(len, |i| seq.get_key(i).cmp(key) != Ordering::Less);
    if idx == len {
        if last_if_missing && len > 0 {
            return (len as isize - 1, true);
        }
        return (len as isize, false);
    }
    (idx as isize, true)
}

impl SequenceCursor {
    /// Cursor at leaf position `idx` of the tree rooted at `root`.
    ///
    /// `idx == num_leaves` yields a past-end cursor resting on the final
    /// chunk: meta descent clamps to the last child instead of falling off
    /// the tree.
    pub async fn new_at_index(
        store: Arc<dyn ChunkStore>,
        root: Arc<Sequence>,
        idx: u64,
    ) -> Result<Self> {
        if idx > root.num_leaves() {
            return Err(Error::precondition(format!(
                "cursor index {} out of range 0..={}",
                idx,
                root.num_leaves()
            )));
        }
        let mut frames = Vec::new();
        let mut seq = root;
        let mut remaining = idx;
        loop {
            if !seq.is_meta() {
                frames.push(Frame {
                    seq,
                    idx: remaining as isize,
                });
                break;
            }
            let len = seq.len();
            if len == 0 {
                return Err(Error::invariant("empty meta node"));
            }
            let mut child_idx =
                search(len, |i| remaining < seq.cumulative_number_of_leaves(i));
            if child_idx == len {
                // Exactly at the cumulative end: rest on the last child
                child_idx = len - 1;
            }
            if child_idx > 0 {
                remaining -= seq.cumulative_number_of_leaves(child_idx - 1);
            }
            let child = seq
                .get_child_sequence(store.as_ref(), child_idx)
                .await?
                .ok_or_else(|| Error::invariant("meta node without child"))?;
            frames.push(Frame {
                seq,
                idx: child_idx as isize,
            });
            seq = child;
        }
        Ok(SequenceCursor { store, frames })
    }

    /// Cursor at `key` within an ordered tree.
    ///
    /// With no key and `last` set, descends to the final item.
    /// `for_insertion` relaxes meta descent so a key past every existing
    /// key still resolves through the last subtree to its insertion
    /// point; without it such a lookup stops with an invalid cursor.
    pub async fn new_at_key(
        store: Arc<dyn ChunkStore>,
        root: Arc<Sequence>,
        key: Option<&OrderedKey>,
        for_insertion: bool,
        last: bool,
    ) -> Result<Self> {
        let mut frames = Vec::new();
        let mut seq = root;
        loop {
            let is_meta = seq.is_meta();
            let len = seq.len() as isize;
            let (idx, found) = match key {
                Some(key) => seek_in(&seq, key, for_insertion && is_meta),
                None => (if last { len - 1 } else { 0 }, len > 0),
            };
            frames.push(Frame {
                seq: seq.clone(),
                idx,
            });
            if !is_meta || !found {
                break;
            }
            let child = seq
                .get_child_sequence(store.as_ref(), idx as usize)
                .await?
                .ok_or_else(|| Error::invariant("meta node without child"))?;
            seq = child;
        }
        Ok(SequenceCursor { store, frames })
    }

    fn leaf(&self) -> &Frame {
        self.frames.last().expect("cursor has at least one frame")
    }

    fn leaf_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("cursor has at least one frame")
    }

    /// Number of tree levels under this cursor
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// The store this cursor reads through
    pub fn store(&self) -> &Arc<dyn ChunkStore> {
        &self.store
    }

    /// The leaf node the cursor currently rests in
    pub fn sequence(&self) -> &Arc<Sequence> {
        &self.leaf().seq
    }

    /// Position within the current chunk (may be a sentinel)
    pub fn index_in_chunk(&self) -> isize {
        self.leaf().idx
    }

    /// Whether the cursor rests on an item
    pub fn valid(&self) -> bool {
        let f = self.leaf();
        f.idx >= 0 && f.idx < f.seq.len() as isize
    }

    /// Whether the cursor rests on the final item of its chunk
    pub fn at_last_item(&self) -> bool {
        let f = self.leaf();
        !f.seq.is_empty() && f.idx == f.seq.len() as isize - 1
    }

    /// The item under the cursor, when valid
    pub fn current_item(&self) -> Option<Item> {
        let f = self.leaf();
        if f.idx < 0 || f.idx >= f.seq.len() as isize {
            return None;
        }
        Some(f.seq.item(f.idx as usize))
    }

    /// The ordering key of the item under the cursor, when valid
    pub fn current_key(&self) -> Option<OrderedKey> {
        let f = self.leaf();
        if f.idx < 0 || f.idx >= f.seq.len() as isize {
            return None;
        }
        Some(f.seq.get_key(f.idx as usize))
    }

    /// Order two cursors into the same tree by position
    pub fn compare(&self, other: &Self) -> Ordering {
        debug_assert_eq!(
            self.frames.len(),
            other.frames.len(),
            "compared cursors must share a tree"
        );
        for (a, b) in self.frames.iter().zip(&other.frames) {
            match a.idx.cmp(&b.idx) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        Ordering::Equal
    }

    /// A cursor over the parent levels only (`None` at the root)
    pub fn parent_cursor(&self) -> Option<SequenceCursor> {
        if self.frames.len() <= 1 {
            return None;
        }
        Some(SequenceCursor {
            store: self.store.clone(),
            frames: self.frames[..self.frames.len() - 1].to_vec(),
        })
    }

    /// Re-read the frame at `depth` from its parent's current position
    async fn sync(&mut self, depth: usize) -> Result<()> {
        debug_assert!(depth > 0);
        let (parent_seq, parent_idx) = {
            let p = &self.frames[depth - 1];
            (p.seq.clone(), p.idx as usize)
        };
        let child = parent_seq
            .get_child_sequence(self.store.as_ref(), parent_idx)
            .await?
            .ok_or_else(|| Error::invariant("sync through a leaf frame"))?;
        self.frames[depth].seq = child;
        Ok(())
    }

    fn advance_at(&mut self, depth: usize, allow_past_end: bool) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move {
            let len = self.frames[depth].seq.len() as isize;
            let idx = self.frames[depth].idx;
            if idx < len - 1 {
                self.frames[depth].idx = idx + 1;
                return Ok(true);
            }
            if idx == len {
                return Ok(false);
            }
            if depth > 0 && self.advance_at(depth - 1, false).await? {
                self.sync(depth).await?;
                self.frames[depth].idx = 0;
                return Ok(true);
            }
            if allow_past_end {
                self.frames[depth].idx = len;
            }
            Ok(false)
        })
    }

    fn retreat_at(
        &mut self,
        depth: usize,
        allow_before_start: bool,
    ) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move {
            let idx = self.frames[depth].idx;
            if idx > 0 {
                self.frames[depth].idx = idx - 1;
                return Ok(true);
            }
            if idx == -1 {
                return Ok(false);
            }
            if depth > 0 && self.retreat_at(depth - 1, false).await? {
                self.sync(depth).await?;
                self.frames[depth].idx = self.frames[depth].seq.len() as isize - 1;
                return Ok(true);
            }
            if allow_before_start {
                self.frames[depth].idx = -1;
            }
            Ok(false)
        })
    }

    /// Step forward one item, crossing chunk boundaries as needed.
    ///
    /// Returns `false` (and parks past-end) when no item follows. If this
    /// future is dropped after the parent frame stepped but before the
    /// child frame re-synced, the cursor is indeterminate and must not be
    /// reused.
    pub async fn advance(&mut self) -> Result<bool> {
        let d = self.frames.len() - 1;
        self.advance_at(d, true).await
    }

    /// Step backward one item; `false` parks before-start
    pub async fn retreat(&mut self) -> Result<bool> {
        let d = self.frames.len() - 1;
        self.retreat_at(d, true).await
    }

    /// Synchronous step within the current chunk only.
    ///
    /// Returns true iff the new position is valid. At the final item,
    /// `allow_past_end` moves onto the past-end sentinel (still `false`).
    pub fn advance_local(&mut self, allow_past_end: bool) -> bool {
        let f = self.leaf_mut();
        let len = f.seq.len() as isize;
        if f.idx < len - 1 {
            f.idx += 1;
            return true;
        }
        if allow_past_end && f.idx == len - 1 {
            f.idx = len;
        }
        false
    }

    /// Synchronous backward step within the current chunk only
    pub fn retreat_local(&mut self, allow_before_start: bool) -> bool {
        let f = self.leaf_mut();
        if f.idx > 0 {
            f.idx -= 1;
            return true;
        }
        if allow_before_start && f.idx == 0 {
            f.idx = -1;
        }
        false
    }

    /// Position at `key` within the current chunk (see `seek` semantics
    /// in `new_at_key`); returns whether the cursor is left valid
    pub fn seek_to(&mut self, key: &OrderedKey, last_if_missing: bool) -> bool {
        let f = self.leaf_mut();
        let (idx, found) = seek_in(&f.seq, key, last_if_missing);
        f.idx = idx;
        found && idx >= 0
    }

    /// Jump to the first item of the next chunk (one parent hop)
    pub async fn advance_chunk(&mut self) -> Result<bool> {
        let d = self.frames.len() - 1;
        self.frames[d].idx = self.frames[d].seq.len() as isize - 1;
        self.advance_at(d, true).await
    }

    /// Step the parent frames one position, leaving the leaf frame stale.
    ///
    /// Chunker-internal: the caller is consuming the remainder of the
    /// current chunk logically and will drop or replace this cursor.
    pub(crate) async fn advance_parent(&mut self, allow_past_end: bool) -> Result<bool> {
        let d = self.frames.len();
        if d <= 1 {
            return Ok(false);
        }
        self.advance_at(d - 2, allow_past_end).await
    }

    /// Step the frame at `depth` one position without touching the
    /// deeper (now stale) frames. Diff-internal: the caller either keeps
    /// stepping at this level or follows up with `resync_below`.
    pub(crate) async fn advance_frame(&mut self, depth: usize, allow_past_end: bool) -> Result<bool> {
        self.advance_at(depth, allow_past_end).await
    }

    /// Reload every frame below `depth` onto the first item of its
    /// parent's current child, restoring cursor consistency after
    /// meta-level stepping.
    pub(crate) async fn resync_below(&mut self, depth: usize) -> Result<()> {
        for d in depth + 1..self.frames.len() {
            self.sync(d).await?;
            self.frames[d].idx = 0;
        }
        Ok(())
    }

    /// Park the cursor on its past-end sentinel (tree exhausted during
    /// meta-level stepping; deeper frames may be stale)
    pub(crate) fn park_past_end(&mut self) {
        let f = self.leaf_mut();
        f.idx = f.seq.len() as isize;
    }

    /// Yield `(item, i)` from the current position until `cb` returns
    /// true or the sequence ends. `i` counts from the starting position.
    /// Iteration within a chunk never suspends.
    pub async fn iter<F>(&mut self, mut cb: F) -> Result<()>
    where
        F: FnMut(Item, u64) -> bool,
    {
        let mut i = 0u64;
        while self.valid() {
            let item = self
                .current_item()
                .ok_or_else(|| Error::invariant("valid cursor without an item"))?;
            if cb(item, i) {
                return Ok(());
            }
            i += 1;
            let f = self.leaf();
            if f.idx + 1 < f.seq.len() as isize {
                self.advance_local(false);
            } else if !self.advance().await? {
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prolly_core::store::MemoryStore;
    use prolly_core::value::Value;

    fn store() -> Arc<dyn ChunkStore> {
        Arc::new(MemoryStore::new())
    }

    fn int_leaf(values: std::ops::Range<i64>) -> Arc<Sequence> {
        Arc::new(Sequence::ListLeaf(values.map(Value::Int).collect()))
    }

    #[tokio::test]
    async fn test_advance_retreat_within_leaf() {
        let root = int_leaf(0..5);
        let mut cur = SequenceCursor::new_at_index(store(), root, 2).await.unwrap();
        assert!(cur.valid());
        assert_eq!(cur.current_item(), Some(Item::Value(Value::Int(2))));

        assert!(cur.advance().await.unwrap());
        assert_eq!(cur.current_item(), Some(Item::Value(Value::Int(3))));
        assert!(cur.retreat().await.unwrap());
        assert!(cur.retreat().await.unwrap());
        assert_eq!(cur.current_item(), Some(Item::Value(Value::Int(1))));
    }

    #[tokio::test]
    async fn test_past_end_sentinel() {
        let root = int_leaf(0..5);
        let mut cur = SequenceCursor::new_at_index(store(), root, 5).await.unwrap();
        assert!(!cur.valid());
        assert_eq!(cur.index_in_chunk(), 5);
        // advancing from past-end stays put
        assert!(!cur.advance().await.unwrap());
        assert_eq!(cur.index_in_chunk(), 5);
        // retreating lands on the final item
        assert!(cur.retreat().await.unwrap());
        assert!(cur.valid());
        assert_eq!(cur.current_item(), Some(Item::Value(Value::Int(4))));
    }

    #[tokio::test]
    async fn test_before_start_sentinel() {
        let root = int_leaf(0..3);
        let mut cur = SequenceCursor::new_at_index(store(), root, 0).await.unwrap();
        assert!(!cur.retreat().await.unwrap());
        assert_eq!(cur.index_in_chunk(), -1);
        assert!(!cur.valid());
        assert!(!cur.retreat().await.unwrap());
        assert!(cur.advance().await.unwrap());
        assert_eq!(cur.current_item(), Some(Item::Value(Value::Int(0))));
    }

    #[tokio::test]
    async fn test_out_of_range_index_rejected() {
        let root = int_leaf(0..3);
        assert!(SequenceCursor::new_at_index(store(), root, 4).await.is_err());
    }

    #[tokio::test]
    async fn test_advance_local_stops_at_chunk_edge() {
        let root = int_leaf(0..2);
        let mut cur = SequenceCursor::new_at_index(store(), root, 1).await.unwrap();
        assert!(!cur.advance_local(false));
        assert_eq!(cur.index_in_chunk(), 1);
        assert!(!cur.advance_local(true));
        assert_eq!(cur.index_in_chunk(), 2);
    }

    #[tokio::test]
    async fn test_seek_within_set_leaf() {
        let root = Arc::new(Sequence::SetLeaf(vec![
            Value::Int(10),
            Value::Int(20),
            Value::Int(30),
        ]));
        let mut cur = SequenceCursor::new_at_index(store(), root, 0).await.unwrap();
        assert!(cur.seek_to(&OrderedKey::new(Value::Int(20)), false));
        assert_eq!(cur.current_item(), Some(Item::Value(Value::Int(20))));
        // between items: lands on the next larger
        assert!(cur.seek_to(&OrderedKey::new(Value::Int(21)), false));
        assert_eq!(cur.current_item(), Some(Item::Value(Value::Int(30))));
        // past everything: invalid, or clamped when asked
        assert!(!cur.seek_to(&OrderedKey::new(Value::Int(99)), false));
        assert!(!cur.valid());
        assert!(cur.seek_to(&OrderedKey::new(Value::Int(99)), true));
        assert_eq!(cur.current_item(), Some(Item::Value(Value::Int(30))));
    }

    #[tokio::test]
    async fn test_iter_collects_in_order() {
        let root = int_leaf(0..4);
        let mut cur = SequenceCursor::new_at_index(store(), root, 1).await.unwrap();
        let mut seen = Vec::new();
        cur.iter(|item, i| {
            if let Item::Value(Value::Int(v)) = item {
                seen.push((i, v));
            }
            false
        })
        .await
        .unwrap();
        assert_eq!(seen, vec![(0, 1), (1, 2), (2, 3)]);
    }

    #[tokio::test]
    async fn test_iter_early_stop() {
        let root = int_leaf(0..10);
        let mut cur = SequenceCursor::new_at_index(store(), root, 0).await.unwrap();
        let mut count = 0;
        cur.iter(|_, _| {
            count += 1;
            count == 3
        })
        .await
        .unwrap();
        assert_eq!(count, 3);
        // cursor rests where the callback stopped
        assert_eq!(cur.current_item(), Some(Item::Value(Value::Int(2))));
    }
}
