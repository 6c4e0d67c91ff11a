//! Tree diffing
//!
//! Two algorithms, both built on synchronized cursor walks:
//!
//! - **Ordered diff** (maps, sets): walk both trees in key order,
//!   emitting added/removed/modified items. Content addressing pays off
//!   here: when both cursors rest at the start of subtrees with the same
//!   chunk hash, the whole subtree is skipped on both sides in O(1).
//! - **Indexed diff** (lists): trim the common prefix (with the same
//!   subtree skip) and suffix, then compute minimal splices for the
//!   middle with an edit-distance matrix capped at `max_matrix` cells,
//!   degrading to one coarse replacement splice beyond the cap.

use crate::cursor::SequenceCursor;
use prolly_core::encode::encode_sequence;
use prolly_core::error::{Error, Result};
use prolly_core::hash::Hash;
use prolly_core::sequence::{Item, Sequence};
use prolly_core::store::ChunkStore;
use prolly_core::value::Value;
use std::cmp::Ordering;
use std::sync::Arc;

/// One difference between two ordered trees
#[derive(Clone, Debug, PartialEq)]
pub enum DiffChange {
    /// Present in the new tree only
    Added(Item),
    /// Present in the old tree only
    Removed(Item),
    /// Same key, different payload
    Modified { new: Item, old: Item },
}

/// One splice turning the old list into the new one
#[derive(Clone, Debug, PartialEq)]
pub struct Splice {
    /// Index in the old list where the splice applies
    pub at: u64,
    /// Items removed from the old list
    pub removed: u64,
    /// Values inserted from the new list
    pub added: Vec<Value>,
}

/// Subtrees the cursor currently rests at the very start of, tallest
/// first: `(meta frame depth, subtree height, subtree hash, leaf count)`.
fn subtree_candidates(cur: &SequenceCursor) -> Vec<(usize, u64, Hash, u64)> {
    let n = cur.frames.len();
    // Smallest L with every frame at L.. sitting on index 0
    let mut first_zero = n;
    for d in (0..n).rev() {
        if cur.frames[d].idx == 0 {
            first_zero = d;
        } else {
            break;
        }
    }
    let mut out = Vec::new();
    for d in first_zero.saturating_sub(1)..n.saturating_sub(1) {
        let f = &cur.frames[d];
        if f.idx < 0 || f.idx >= f.seq.len() as isize {
            continue;
        }
        if let Item::Meta(mt) = f.seq.item(f.idx as usize) {
            out.push((
                d,
                mt.child_ref().height,
                mt.child_ref().hash,
                mt.num_leaves(),
            ));
        }
    }
    out
}

/// Find equal-height subtrees with the same hash at both cursors'
/// current positions. Returns the meta frame depths to skip at.
fn matching_subtrees(a: &SequenceCursor, b: &SequenceCursor) -> Option<(usize, usize)> {
    let ca = subtree_candidates(a);
    if ca.is_empty() {
        return None;
    }
    let cb = subtree_candidates(b);
    for (da, ha, hash_a, _) in &ca {
        for (db, hb, hash_b, _) in &cb {
            if ha == hb && hash_a == hash_b {
                return Some((*da, *db));
            }
        }
    }
    None
}

/// The `(height, hash, num_leaves)` of the tuple under a meta frame,
/// when the frame rests on one
fn frame_tuple(cur: &SequenceCursor, depth: usize) -> Option<(u64, Hash, u64)> {
    let f = &cur.frames[depth];
    if f.idx < 0 || f.idx >= f.seq.len() as isize {
        return None;
    }
    match f.seq.item(f.idx as usize) {
        Item::Meta(mt) => Some((mt.child_ref().height, mt.child_ref().hash, mt.num_leaves())),
        _ => None,
    }
}

/// Consume matching subtrees on both cursors, comparing tuples at the
/// meta level so untouched runs are skipped without loading a single
/// child chunk. Entered with `(da, db)` resting on tuples already known
/// to match; returns the shared leaf count consumed.
async fn skip_shared(
    a: &mut SequenceCursor,
    b: &mut SequenceCursor,
    da: usize,
    db: usize,
) -> Result<u64> {
    let mut skipped = 0u64;
    loop {
        let (_, _, n) = frame_tuple(a, da)
            .ok_or_else(|| Error::invariant("subtree skip off a meta tuple"))?;
        skipped += n;

        let a_ok = a.advance_frame(da, true).await?;
        let b_ok = b.advance_frame(db, true).await?;
        if !a_ok || !b_ok {
            // At least one tree ran out above its skip level
            if a_ok {
                a.resync_below(da).await?;
            } else {
                a.park_past_end();
            }
            if b_ok {
                b.resync_below(db).await?;
            } else {
                b.park_past_end();
            }
            return Ok(skipped);
        }
        match (frame_tuple(a, da), frame_tuple(b, db)) {
            (Some((ha, hash_a, _)), Some((hb, hash_b, _))) if ha == hb && hash_a == hash_b => {
                continue;
            }
            _ => {
                a.resync_below(da).await?;
                b.resync_below(db).await?;
                return Ok(skipped);
            }
        }
    }
}

fn item_key(item: &Item) -> Result<prolly_core::key::OrderedKey> {
    item.key()
        .ok_or_else(|| Error::precondition("ordered diff requires keyed items"))
}

/// Symmetric difference of two ordered trees, as changes turning `old`
/// into `new`.
pub async fn diff_ordered(
    new_store: Arc<dyn ChunkStore>,
    new_root: Arc<Sequence>,
    old_store: Arc<dyn ChunkStore>,
    old_root: Arc<Sequence>,
) -> Result<Vec<DiffChange>> {
    let mut out = Vec::new();
    if root_hash(&new_root) == root_hash(&old_root) {
        return Ok(out);
    }
    let mut a = SequenceCursor::new_at_index(new_store, new_root, 0).await?;
    let mut b = SequenceCursor::new_at_index(old_store, old_root, 0).await?;

    while a.valid() && b.valid() {
        if let Some((da, db)) = matching_subtrees(&a, &b) {
            skip_shared(&mut a, &mut b, da, db).await?;
            continue;
        }
        let ia = a.current_item().expect("valid cursor");
        let ib = b.current_item().expect("valid cursor");
        match item_key(&ia)?.cmp(&item_key(&ib)?) {
            Ordering::Less => {
                out.push(DiffChange::Added(ia));
                a.advance().await?;
            }
            Ordering::Greater => {
                out.push(DiffChange::Removed(ib));
                b.advance().await?;
            }
            Ordering::Equal => {
                if ia != ib {
                    out.push(DiffChange::Modified { new: ia, old: ib });
                }
                a.advance().await?;
                b.advance().await?;
            }
        }
    }
    while a.valid() {
        out.push(DiffChange::Added(a.current_item().expect("valid cursor")));
        a.advance().await?;
    }
    while b.valid() {
        out.push(DiffChange::Removed(b.current_item().expect("valid cursor")));
        b.advance().await?;
    }
    Ok(out)
}

fn root_hash(seq: &Sequence) -> Hash {
    Hash::of(&encode_sequence(seq))
}

fn expect_values(items: Vec<Item>) -> Result<Vec<Value>> {
    items
        .into_iter()
        .map(|it| match it {
            Item::Value(v) => Ok(v),
            other => Err(Error::invariant(format!(
                "indexed diff over non-value item {:?}",
                other
            ))),
        })
        .collect()
}

/// Diff two lists into splices that rewrite `old` into `new`.
///
/// `max_matrix` caps the edit-distance work: when the unshared middles
/// would need more matrix cells, the whole middle becomes one
/// replacement splice.
pub async fn diff_indexed(
    new_store: Arc<dyn ChunkStore>,
    new_root: Arc<Sequence>,
    old_store: Arc<dyn ChunkStore>,
    old_root: Arc<Sequence>,
    max_matrix: usize,
) -> Result<Vec<Splice>> {
    if root_hash(&new_root) == root_hash(&old_root) {
        return Ok(Vec::new());
    }
    let a_len = new_root.num_leaves();
    let b_len = old_root.num_leaves();

    // Common prefix, skipping shared subtrees wholesale. Positions stay
    // aligned because both sides always consume the same count.
    let mut a = SequenceCursor::new_at_index(new_store.clone(), new_root.clone(), 0).await?;
    let mut b = SequenceCursor::new_at_index(old_store.clone(), old_root.clone(), 0).await?;
    let mut prefix = 0u64;
    while a.valid() && b.valid() {
        if let Some((da, db)) = matching_subtrees(&a, &b) {
            prefix += skip_shared(&mut a, &mut b, da, db).await?;
            continue;
        }
        if !a.sequence().equals_at(
            b.sequence(),
            a.index_in_chunk() as usize,
            b.index_in_chunk() as usize,
        ) {
            break;
        }
        prefix += 1;
        a.advance().await?;
        b.advance().await?;
    }

    // Common suffix, item by item from the tails
    let max_suffix = a_len.min(b_len) - prefix;
    let mut suffix = 0u64;
    if max_suffix > 0 {
        let mut sa = SequenceCursor::new_at_index(new_store, new_root.clone(), a_len - 1).await?;
        let mut sb = SequenceCursor::new_at_index(old_store, old_root.clone(), b_len - 1).await?;
        while suffix < max_suffix {
            if !sa.sequence().equals_at(
                sb.sequence(),
                sa.index_in_chunk() as usize,
                sb.index_in_chunk() as usize,
            ) {
                break;
            }
            suffix += 1;
            if !sa.retreat().await? || !sb.retreat().await? {
                break;
            }
        }
    }

    let a_mid = a_len - prefix - suffix;
    let b_mid = b_len - prefix - suffix;
    if a_mid == 0 && b_mid == 0 {
        return Ok(Vec::new());
    }

    let store = a.store().clone();
    let added = expect_values(
        new_root
            .range(store.as_ref(), prefix, prefix + a_mid)
            .await?,
    )?;
    if a_mid == 0 || b_mid == 0 || (a_mid as u128) * (b_mid as u128) > max_matrix as u128 {
        // Pure insert, pure delete, or too large for minimal splices
        return Ok(vec![Splice {
            at: prefix,
            removed: b_mid,
            added,
        }]);
    }

    let b_store = b.store().clone();
    let removed = expect_values(
        old_root
            .range(b_store.as_ref(), prefix, prefix + b_mid)
            .await?,
    )?;
    Ok(calc_splices(&added, &removed, prefix))
}

/// Minimal splices rewriting `old` into `new`, positions offset by
/// `offset` (LCS backtrack).
fn calc_splices(new: &[Value], old: &[Value], offset: u64) -> Vec<Splice> {
    let m = old.len();
    let n = new.len();
    // lcs[i][j] = longest common subsequence of old[i..] and new[j..]
    let mut lcs = vec![vec![0u32; n + 1]; m + 1];
    for i in (0..m).rev() {
        for j in (0..n).rev() {
            lcs[i][j] = if old[i] == new[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let mut splices = Vec::new();
    let mut open: Option<Splice> = None;
    let (mut i, mut j) = (0, 0);
    while i < m || j < n {
        if i < m && j < n && old[i] == new[j] {
            if let Some(sp) = open.take() {
                splices.push(sp);
            }
            i += 1;
            j += 1;
            continue;
        }
        let sp = open.get_or_insert_with(|| Splice {
            at: offset + i as u64,
            removed: 0,
            added: Vec::new(),
        });
        // Prefer whichever direction preserves the longer common tail
        if j >= n || (i < m && lcs[i + 1][j] >= lcs[i][j + 1]) {
            sp.removed += 1;
            i += 1;
        } else {
            sp.added.push(new[j].clone());
            j += 1;
        }
    }
    if let Some(sp) = open {
        splices.push(sp);
    }
    splices
}
