//! Tree mutation
//!
//! A splice against an immutable tree is expressed as: resume a chunker
//! at the edit position, append the inserted items, skip the removed
//! ones, and let `done()` stitch the tail back on. The result is a new
//! root whose identity depends only on the final logical contents.

use crate::chunker::SequenceChunker;
use crate::cursor::SequenceCursor;
use futures::FutureExt;
use prolly_core::error::{Error, Result};
use prolly_core::sequence::{Item, Sequence, SequenceKind};
use prolly_core::store::ChunkStore;
use std::sync::Arc;

/// Rebuild a tree around a splice.
///
/// `cursor` marks the edit position in the pre-edit tree (`None` builds
/// from scratch); `insert` lands there, then `remove` pre-edit items are
/// dropped. Returns the new root, unpersisted (interior chunks are
/// written as they form).
pub async fn chunk_sequence(
    store: Arc<dyn ChunkStore>,
    kind: SequenceKind,
    cursor: Option<SequenceCursor>,
    insert: Vec<Item>,
    remove: u64,
) -> Result<Arc<Sequence>> {
    let mut sc = SequenceChunker::with_cursor(store, kind, cursor).await?;
    for item in insert {
        sc.append(item).await?;
    }
    for _ in 0..remove {
        sc.skip().await?;
    }
    sc.done().await
}

/// `chunk_sequence`, driven synchronously.
///
/// Legal only when every chunk the build touches is already in memory
/// (bulk construction, `MemoryStore`-backed trees): a chunk load that
/// would suspend is a caller error, not a wait.
pub fn chunk_sequence_sync(
    store: Arc<dyn ChunkStore>,
    kind: SequenceKind,
    cursor: Option<SequenceCursor>,
    insert: Vec<Item>,
    remove: u64,
) -> Result<Arc<Sequence>> {
    match chunk_sequence(store, kind, cursor, insert, remove).now_or_never() {
        Some(result) => result,
        None => Err(Error::precondition(
            "chunk_sequence_sync suspended on a chunk load; all chunks must be in memory",
        )),
    }
}
