//! Sequence chunker
//!
//! Builds prolly-trees from item streams. Each level of the tree has its
//! own chunker: appended items collect in a buffer while their serialized
//! bytes stream through a level-salted rolling hasher; when the hasher
//! crosses the boundary pattern the buffer becomes a chunk, the chunk is
//! persisted, and a meta tuple for it is appended into the (lazily
//! created) parent chunker one level up.
//!
//! Because boundaries depend only on local content, any two builds of the
//! same logical sequence emit identical chunks, however the sequence was
//! edited into existence. A chunker may *resume* from a cursor into an
//! existing tree: it replays the cursor's chunk prefix to reproduce the
//! hasher state at the edit point, consumes appended edits, and on
//! `done()` re-appends trailing items only until a new boundary lands
//! where an old one did, at which point entire untouched chunks are
//! reused through their parent tuples.

use crate::cursor::SequenceCursor;
use futures::future::BoxFuture;
use prolly_core::encode::encode_sequence;
use prolly_core::error::{Error, Result};
use prolly_core::hash::Hash;
use prolly_core::key::OrderedKey;
use prolly_core::meta::{MetaTuple, Ref};
use prolly_core::rolling::{hash_value_bytes, meta_hash_value_bytes, RollingValueHasher};
use prolly_core::sequence::{Item, MapEntry, MetaSequence, Sequence, SequenceKind};
use prolly_core::store::{read_sequence, write_sequence, ChunkStore};
use prolly_core::value::Value;
use std::cmp::Ordering;
use std::sync::Arc;

/// Build one chunk's node from buffered items.
///
/// Level 0 builds the kind's leaf shape; higher levels build meta nodes.
/// Returns the node, its boundary key, and its leaf count.
fn make_chunk(
    kind: SequenceKind,
    level: u64,
    items: Vec<Item>,
) -> Result<(Sequence, OrderedKey, u64)> {
    if level == 0 {
        let n = items.len() as u64;
        let seq = match kind {
            SequenceKind::List => Sequence::ListLeaf(
                items.into_iter().map(expect_value).collect::<Result<_>>()?,
            ),
            SequenceKind::Set => Sequence::SetLeaf(
                items.into_iter().map(expect_value).collect::<Result<_>>()?,
            ),
            SequenceKind::Map => Sequence::MapLeaf(
                items.into_iter().map(expect_entry).collect::<Result<_>>()?,
            ),
            SequenceKind::Blob => Sequence::BlobLeaf(
                items.into_iter().map(expect_byte).collect::<Result<_>>()?,
            ),
        };
        let key = if n == 0 {
            OrderedKey::counted(0)
        } else {
            seq.get_key(seq.len() - 1)
        };
        return Ok((seq, key, n));
    }

    let tuples: Vec<MetaTuple> = items.into_iter().map(expect_meta).collect::<Result<_>>()?;
    let num_leaves = tuples.iter().map(MetaTuple::num_leaves).sum();
    let key = match tuples.last() {
        Some(mt) => mt.key().clone(),
        None => OrderedKey::counted(0),
    };
    Ok((
        Sequence::Meta(MetaSequence::new(kind, level, tuples)),
        key,
        num_leaves,
    ))
}

fn expect_value(item: Item) -> Result<Value> {
    match item {
        Item::Value(v) => Ok(v),
        other => Err(Error::invariant(format!("expected value item, got {:?}", other))),
    }
}

fn expect_entry(item: Item) -> Result<MapEntry> {
    match item {
        Item::Entry(e) => Ok(e),
        other => Err(Error::invariant(format!("expected map entry, got {:?}", other))),
    }
}

fn expect_byte(item: Item) -> Result<u8> {
    match item {
        Item::Byte(b) => Ok(b),
        other => Err(Error::invariant(format!("expected byte item, got {:?}", other))),
    }
}

fn expect_meta(item: Item) -> Result<MetaTuple> {
    match item {
        Item::Meta(mt) => Ok(mt),
        other => Err(Error::invariant(format!("expected meta tuple, got {:?}", other))),
    }
}

/// Builds one level of a new tree; levels link through `parent`
pub struct SequenceChunker {
    store: Arc<dyn ChunkStore>,
    kind: SequenceKind,
    level: u64,
    /// Resume cursor into the pre-edit tree, when mutating
    cur: Option<SequenceCursor>,
    parent: Option<Box<SequenceChunker>>,
    current: Vec<Item>,
    rv: RollingValueHasher,
    is_leaf: bool,
    done: bool,
    /// The candidate root chunk, held unwritten until a parent forces
    /// persistence or `done()` hands it to the caller
    unwritten: Option<Arc<Sequence>>,
}

impl SequenceChunker {
    /// Chunker for a brand-new tree
    pub fn new(store: Arc<dyn ChunkStore>, kind: SequenceKind) -> Self {
        Self::empty_at_level(store, kind, 0)
    }

    /// Chunker resuming from a cursor into an existing tree (or a fresh
    /// one when `cur` is `None`)
    pub async fn with_cursor(
        store: Arc<dyn ChunkStore>,
        kind: SequenceKind,
        cur: Option<SequenceCursor>,
    ) -> Result<Self> {
        Self::with_cursor_at_level(store, kind, cur, 0).await
    }

    fn empty_at_level(store: Arc<dyn ChunkStore>, kind: SequenceKind, level: u64) -> Self {
        SequenceChunker {
            store,
            kind,
            level,
            cur: None,
            parent: None,
            current: Vec::new(),
            rv: RollingValueHasher::new((level % 256) as u8),
            is_leaf: level == 0,
            done: false,
            unwritten: None,
        }
    }

    fn with_cursor_at_level(
        store: Arc<dyn ChunkStore>,
        kind: SequenceKind,
        cur: Option<SequenceCursor>,
        level: u64,
    ) -> BoxFuture<'static, Result<SequenceChunker>> {
        Box::pin(async move {
            let mut sc = Self::empty_at_level(store, kind, level);
            if let Some(cur) = cur {
                sc.cur = Some(cur);
                sc.resume().await?;
            }
            Ok(sc)
        })
    }

    fn cur_depth(&self) -> usize {
        self.cur.as_ref().map_or(0, SequenceCursor::depth)
    }

    /// Walk back to the chunk start and replay the prefix, reproducing
    /// the hasher and buffer state at the cursor position. A cursor with
    /// parent frames spins up the parent chain first, resumed likewise.
    async fn resume(&mut self) -> Result<()> {
        if self.cur_depth() > 1 && self.parent.is_none() {
            self.create_parent().await?;
        }
        let Some(mut cur) = self.cur.take() else {
            return Err(Error::invariant("resume without a cursor"));
        };
        let idx = cur.index_in_chunk();
        while cur.index_in_chunk() > 0 && cur.retreat_local(false) {}
        tracing::trace!(
            level = self.level,
            replay = idx - cur.index_in_chunk(),
            "chunker resume"
        );
        while cur.index_in_chunk() < idx {
            let item = cur
                .current_item()
                .ok_or_else(|| Error::invariant("resume replay ran off the chunk"))?;
            self.append(item).await?;
            cur.advance_local(true);
        }
        self.cur = Some(cur);
        Ok(())
    }

    fn create_parent(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            debug_assert!(self.parent.is_none());
            let parent_cur = self.cur.as_ref().and_then(SequenceCursor::parent_cursor);
            let parent = Self::with_cursor_at_level(
                self.store.clone(),
                self.kind,
                parent_cur,
                self.level + 1,
            )
            .await?;
            self.parent = Some(Box::new(parent));
            // A parent can no longer hold this level's output in memory:
            // persist the chunk that was being held back as a possible root.
            if let Some(root) = self.unwritten.take() {
                write_sequence(self.store.as_ref(), &root).await?;
            }
            Ok(())
        })
    }

    /// Append one item. Returns whether it landed on a chunk boundary.
    pub async fn append(&mut self, item: Item) -> Result<bool> {
        self.append_boxed(item).await
    }

    fn append_boxed(&mut self, item: Item) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move {
            if self.done {
                return Err(Error::precondition("append on a finished chunker"));
            }
            if self.is_leaf {
                hash_value_bytes(&item, &mut self.rv);
            } else {
                let mt = item
                    .as_meta()
                    .ok_or_else(|| Error::invariant("non-tuple item at a meta level"))?;
                meta_hash_value_bytes(mt, &mut self.rv);
            }
            self.current.push(item);
            if self.rv.crossed_boundary {
                self.handle_chunk_boundary().await?;
                return Ok(true);
            }
            Ok(false)
        })
    }

    /// Consume one item of the pre-edit sequence without re-appending it
    /// (splice removal)
    pub async fn skip(&mut self) -> Result<()> {
        let cur = self
            .cur
            .as_mut()
            .ok_or_else(|| Error::precondition("skip without a resume cursor"))?;
        cur.advance().await?;
        Ok(())
    }

    async fn handle_chunk_boundary(&mut self) -> Result<()> {
        debug_assert!(!self.current.is_empty());
        self.rv.reset();
        if self.parent.is_none() {
            self.create_parent().await?;
        }
        let (_, mt) = self.create_chunk(true).await?;
        tracing::debug!(level = self.level, hash = %mt.child_ref().hash, "chunk boundary");
        self.parent
            .as_mut()
            .expect("parent just ensured")
            .append_boxed(Item::Meta(mt))
            .await?;
        Ok(())
    }

    /// Turn the buffered items into a chunk and a tuple pointing at it.
    ///
    /// Eagerly persisted when `write` is set (a parent will link it);
    /// otherwise held in `unwritten` as the candidate root, cached on the
    /// tuple so it stays reachable without a store read.
    async fn create_chunk(&mut self, write: bool) -> Result<(Arc<Sequence>, MetaTuple)> {
        let items = std::mem::take(&mut self.current);
        let (seq, key, num_leaves) = make_chunk(self.kind, self.level, items)?;
        let seq = Arc::new(seq);
        let mut mt;
        if write {
            let r = write_sequence(self.store.as_ref(), &seq).await?;
            mt = MetaTuple::new(r, key, num_leaves);
        } else {
            let hash = Hash::of(&encode_sequence(&seq));
            mt = MetaTuple::new(Ref::new(hash, seq.height()), key, num_leaves);
            mt = mt.with_cached(seq.clone());
            self.unwritten = Some(seq.clone());
        }
        Ok((seq, mt))
    }

    /// Advance to the next edit position, consuming or skipping the
    /// pre-edit items in between.
    ///
    /// Four cases:
    /// 1. already aligned — nothing to do;
    /// 2. this level overshot (a lower level crossed a chunk) — pull
    ///    `next` forward until aligned;
    /// 3. behind `next` within reach — consume items until aligned;
    /// 4. behind `next`, but a fresh boundary lands on a pre-existing
    ///    chunk end first — align the parents and re-resume at `next`,
    ///    letting the untouched chunks in between flow through the parent
    ///    level as whole tuples.
    pub fn advance_to(&mut self, next: SequenceCursor) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if self.cur.is_none() {
                return Err(Error::precondition("advance_to without a resume cursor"));
            }
            let mut next = next;
            while self.cur.as_ref().expect("checked").compare(&next) == Ordering::Greater {
                next.advance().await?; // Case 2
            }

            let mut reached_next = true;
            while self.cur.as_ref().expect("checked").compare(&next) == Ordering::Less {
                let item = self
                    .cur
                    .as_ref()
                    .expect("checked")
                    .current_item()
                    .ok_or_else(|| Error::invariant("advance_to consumed past the end"))?;
                let boundary = self.append_boxed(item).await?;
                if boundary && self.cur.as_ref().expect("checked").at_last_item() {
                    let cur = self.cur.as_mut().expect("checked");
                    if cur.depth() > 1 {
                        let cur_parent = cur.parent_cursor().expect("depth > 1");
                        let next_parent = next.parent_cursor().expect("cursors share a tree");
                        if cur_parent.compare(&next_parent) == Ordering::Less {
                            // Case 4: boundary before entering next's chunk
                            reached_next = false;
                        }
                        // Consume this position at the parent level without
                        // loading the chunk that follows.
                        cur.advance_parent(false).await?;
                    }
                    break;
                }
                self.cur.as_mut().expect("checked").advance().await?;
            }

            if self.parent.is_some() {
                if let Some(next_parent) = next.parent_cursor() {
                    // The parent walks on from wherever this level's chunk
                    // crossings left its view of the tree.
                    let parent_pos = self
                        .cur
                        .as_ref()
                        .expect("checked")
                        .parent_cursor();
                    let parent = self.parent.as_mut().expect("checked");
                    parent.cur = parent_pos;
                    parent.advance_to(next_parent).await?;
                }
            }

            self.cur = Some(next);
            if !reached_next {
                self.resume().await?; // Case 4
            }
            Ok(())
        })
    }

    /// Whether this level or any parent still buffers items
    fn any_pending(&self) -> bool {
        !self.current.is_empty() || self.parent.as_ref().is_some_and(|p| p.any_pending())
    }

    /// When mutating, re-append trailing pre-edit items until the end of
    /// the sequence or until a fresh boundary coincides with an old chunk
    /// end — the point from which the old tree is reused wholesale.
    async fn finalize_cursor(&mut self) -> Result<()> {
        loop {
            let Some(cur) = &self.cur else { break };
            if !cur.valid() {
                break;
            }
            let item = cur
                .current_item()
                .ok_or_else(|| Error::invariant("valid cursor without an item"))?;
            let boundary = self.append_boxed(item).await?;
            if boundary && self.cur.as_ref().expect("looping on cur").at_last_item() {
                // boundary occurred at the same place in old and new
                break;
            }
            self.cur.as_mut().expect("looping on cur").advance().await?;
        }

        // This cursor is spent; step the parent past the chunk it covered
        // so the parent level finalizes from the right tuple.
        let Some(mut cur) = self.cur.take() else {
            return Ok(());
        };
        if cur.depth() > 1 {
            cur.advance_parent(true).await?;
            if let Some(parent) = &mut self.parent {
                parent.cur = cur.parent_cursor();
            }
        }
        Ok(())
    }

    /// Finish the build and return the root of the resulting tree.
    ///
    /// The chunker is single-use; calling `done` twice is an error.
    pub async fn done(&mut self) -> Result<Arc<Sequence>> {
        self.done_boxed().await
    }

    fn done_boxed(&mut self) -> BoxFuture<'_, Result<Arc<Sequence>>> {
        Box::pin(async move {
            if self.done {
                return Err(Error::precondition("chunker is single-use"));
            }
            self.done = true;

            if self.cur.is_some() {
                self.finalize_cursor().await?;
            }

            // Content above us means some parent owns the root: push the
            // tail up (end of input is an implicit boundary) and delegate.
            let parent_pending = self.parent.as_ref().is_some_and(|p| p.any_pending());
            if parent_pending {
                if !self.current.is_empty() {
                    self.handle_chunk_boundary().await?;
                }
                return self.parent.as_mut().expect("pending parent").done_boxed().await;
            }

            // Everything at this level sits in `current`. A leaf, or a
            // meta holding several tuples, is the canonical root.
            if self.is_leaf || self.current.len() > 1 {
                let (seq, _) = self.create_chunk(false).await?;
                return Ok(seq);
            }
            if self.current.is_empty() {
                return Err(Error::invariant(
                    "non-leaf chunker finished with no entries",
                ));
            }

            // A meta holding a single tuple is a root, but not the
            // canonical one: descend through single-child meta chains.
            let mut mt = expect_meta(self.current.pop().expect("len checked"))?;
            loop {
                let child = match mt.cached() {
                    Some(c) => c.clone(),
                    None => read_sequence(self.store.as_ref(), mt.child_ref()).await?,
                };
                if !child.is_meta() || child.len() > 1 {
                    return Ok(child);
                }
                mt = expect_meta(child.item(0))?;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prolly_core::store::MemoryStore;

    fn store() -> Arc<dyn ChunkStore> {
        Arc::new(MemoryStore::new())
    }

    async fn build_list(store: Arc<dyn ChunkStore>, values: Vec<i64>) -> Arc<Sequence> {
        let mut sc = SequenceChunker::new(store, SequenceKind::List);
        for v in values {
            sc.append(Item::Value(Value::Int(v))).await.unwrap();
        }
        sc.done().await.unwrap()
    }

    #[tokio::test]
    async fn test_small_input_stays_a_single_leaf() {
        let root = build_list(store(), (0..5).collect()).await;
        assert!(!root.is_meta());
        assert_eq!(root.num_leaves(), 5);
    }

    #[tokio::test]
    async fn test_empty_input_builds_empty_leaf() {
        let root = build_list(store(), vec![]).await;
        assert!(!root.is_meta());
        assert_eq!(root.num_leaves(), 0);
    }

    #[tokio::test]
    async fn test_large_input_builds_multi_level_tree() {
        let root = build_list(store(), (0..20_000).collect()).await;
        assert!(root.is_meta(), "20k ints should chunk into a tree");
        assert_eq!(root.num_leaves(), 20_000);
        assert!(root.len() > 1, "root must be canonical (multi-entry)");
    }

    #[tokio::test]
    async fn test_determinism_across_builds() {
        let a = build_list(store(), (0..10_000).collect()).await;
        let b = build_list(store(), (0..10_000).collect()).await;
        assert_eq!(
            Hash::of(&encode_sequence(&a)),
            Hash::of(&encode_sequence(&b))
        );
    }

    #[tokio::test]
    async fn test_root_is_not_persisted_until_needed() {
        let st = MemoryStore::new();
        let root = build_list(Arc::new(st.clone()), (0..5).collect()).await;
        // Single-leaf tree: nothing was written at all
        assert!(!root.is_meta());
        assert_eq!(st.len(), 0);
    }

    #[tokio::test]
    async fn test_inner_chunks_are_persisted() {
        let st = MemoryStore::new();
        let root = build_list(Arc::new(st.clone()), (0..20_000).collect()).await;
        assert!(root.is_meta());
        assert!(st.len() > 0);
        // The root itself is handed back unwritten
        let root_hash = Hash::of(&encode_sequence(&root));
        assert!(!st.hashes().contains(&root_hash));
    }

    #[tokio::test]
    async fn test_done_is_single_use() {
        let mut sc = SequenceChunker::new(store(), SequenceKind::List);
        sc.append(Item::Value(Value::Int(1))).await.unwrap();
        sc.done().await.unwrap();
        assert!(sc.done().await.is_err());
        assert!(sc.append(Item::Value(Value::Int(2))).await.is_err());
    }

    #[tokio::test]
    async fn test_resume_rebuilds_identically() {
        // Rebuilding the same logical sequence through a no-op splice must
        // reproduce the same root.
        let st: Arc<dyn ChunkStore> = Arc::new(MemoryStore::new());
        let root = build_list(st.clone(), (0..15_000).collect()).await;

        let cur = SequenceCursor::new_at_index(st.clone(), root.clone(), 7_500)
            .await
            .unwrap();
        let mut sc = SequenceChunker::with_cursor(st, SequenceKind::List, Some(cur))
            .await
            .unwrap();
        let rebuilt = sc.done().await.unwrap();
        assert_eq!(
            Hash::of(&encode_sequence(&root)),
            Hash::of(&encode_sequence(&rebuilt))
        );
    }

    #[tokio::test]
    async fn test_advance_to_batches_edits() {
        // Apply two point edits in one pass using advance_to between them,
        // and check it matches two separate single-edit passes.
        let values: Vec<i64> = (0..12_000).collect();
        let st: Arc<dyn ChunkStore> = Arc::new(MemoryStore::new());
        let root = build_list(st.clone(), values.clone()).await;

        // one pass, two edits
        let c1 = SequenceCursor::new_at_index(st.clone(), root.clone(), 2_000)
            .await
            .unwrap();
        let mut sc = SequenceChunker::with_cursor(st.clone(), SequenceKind::List, Some(c1))
            .await
            .unwrap();
        sc.append(Item::Value(Value::Int(-1))).await.unwrap();
        sc.skip().await.unwrap();
        let c2 = SequenceCursor::new_at_index(st.clone(), root.clone(), 9_000)
            .await
            .unwrap();
        sc.advance_to(c2).await.unwrap();
        sc.append(Item::Value(Value::Int(-2))).await.unwrap();
        sc.skip().await.unwrap();
        let batched = sc.done().await.unwrap();

        // reference: plain rebuild of the edited contents
        let mut edited = values;
        edited[2_000] = -1;
        edited[9_000] = -2;
        let reference = build_list(st, edited).await;

        assert_eq!(
            Hash::of(&encode_sequence(&batched)),
            Hash::of(&encode_sequence(&reference))
        );
    }
}
