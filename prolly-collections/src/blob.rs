//! Byte blobs
//!
//! A `Blob` is an immutable byte sequence chunked byte-by-byte through
//! the rolling hasher, so chunk boundaries are defined by the raw
//! content. `BlobReader` streams the bytes chunk at a time with
//! `std::io`-style seeking; its `&mut self` methods make overlapping
//! reads impossible by construction.

use crate::common::collection_hash;
use prolly_core::encode::encode_sequence;
use prolly_core::error::{Error, Result};
use prolly_core::hash::Hash;
use prolly_core::meta::Ref;
use prolly_core::sequence::{Item, Sequence, SequenceKind};
use prolly_core::store::{write_sequence, ChunkStore};
use prolly_tree::cursor::SequenceCursor;
use prolly_tree::mutate::chunk_sequence;
use std::io::SeekFrom;
use std::sync::Arc;

/// An immutable, content-addressed byte sequence
#[derive(Clone, Debug)]
pub struct Blob {
    store: Arc<dyn ChunkStore>,
    seq: Arc<Sequence>,
}

impl Blob {
    /// Build a blob from bytes
    pub async fn new(store: Arc<dyn ChunkStore>, bytes: Vec<u8>) -> Result<Self> {
        let items = bytes.into_iter().map(Item::Byte).collect();
        let seq = chunk_sequence(store.clone(), SequenceKind::Blob, None, items, 0).await?;
        Ok(Blob { store, seq })
    }

    /// The empty blob
    pub fn empty(store: Arc<dyn ChunkStore>) -> Self {
        Blob {
            store,
            seq: Arc::new(Sequence::empty(SequenceKind::Blob)),
        }
    }

    /// Wrap an existing root sequence in the blob facade
    pub fn from_sequence(store: Arc<dyn ChunkStore>, seq: Arc<Sequence>) -> Result<Self> {
        if seq.kind() != SequenceKind::Blob {
            return Err(Error::precondition(format!(
                "expected a blob sequence, got {}",
                seq.kind().name()
            )));
        }
        Ok(Blob { store, seq })
    }

    /// The root sequence
    pub fn sequence(&self) -> &Arc<Sequence> {
        &self.seq
    }

    /// Number of bytes
    pub fn len(&self) -> u64 {
        self.seq.num_leaves()
    }

    /// Whether the blob holds no bytes
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

    /// Remove `remove` bytes at `at` and insert `insert` in their place
    pub async fn splice(&self, at: u64, remove: u64, insert: Vec<u8>) -> Result<Blob> {
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
        let cur =
            SequenceCursor::new_at_index(self.store.clone(), self.seq.clone(), at).await?;
        let items = insert.into_iter().map(Item::Byte).collect();
        let seq = chunk_sequence(
            self.store.clone(),
            SequenceKind::Blob,
            Some(cur),
            items,
            remove,
        )
        .await?;
        Ok(Blob {
            store: self.store.clone(),
            seq,
        })
    }

    /// Materialize the bytes in `[offset, offset + len)` (the window
    /// clamps to the blob's end)
    pub async fn read_at(&self, offset: u64, len: u64) -> Result<Vec<u8>> {
        let items = self
            .seq
            .range(self.store.as_ref(), offset, offset.saturating_add(len))
            .await?;
        items
            .into_iter()
            .map(|it| match it {
                Item::Byte(b) => Ok(b),
                other => Err(Error::invariant(format!("non-byte item {:?} in blob", other))),
            })
            .collect()
    }

    /// Materialize all bytes
    pub async fn bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.len() as usize);
        let mut reader = self.reader().await?;
        while let Some(chunk) = reader.read().await? {
            out.extend_from_slice(&chunk);
        }
        Ok(out)
    }

    /// A reader positioned at the start
    pub async fn reader(&self) -> Result<BlobReader> {
        let cursor =
            SequenceCursor::new_at_index(self.store.clone(), self.seq.clone(), 0).await?;
        Ok(BlobReader {
            store: self.store.clone(),
            root: self.seq.clone(),
            len: self.len(),
            pos: 0,
            cursor,
        })
    }
}

// Blob equality is root identity
impl PartialEq for Blob {
    fn eq(&self, other: &Self) -> bool {
        encode_sequence(&self.seq) == encode_sequence(&other.seq)
    }
}

impl Eq for Blob {}

/// Streams a blob chunk by chunk with seeking.
///
/// Stateful and single-owner: both `read` and `seek` take `&mut self`,
/// so a second operation cannot start before the first completes.
pub struct BlobReader {
    store: Arc<dyn ChunkStore>,
    root: Arc<Sequence>,
    len: u64,
    pos: u64,
    cursor: SequenceCursor,
}

impl BlobReader {
    /// Current byte offset
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// The rest of the current chunk (the whole chunk when positioned at
    /// its start), advancing to the next chunk. `None` at the end.
    pub async fn read(&mut self) -> Result<Option<Vec<u8>>> {
        if !self.cursor.valid() {
            return Ok(None);
        }
        let leaf = self.cursor.sequence().clone();
        let start = self.cursor.index_in_chunk() as usize;
        let bytes = leaf
            .blob_bytes()
            .ok_or_else(|| Error::invariant("blob cursor rests off a blob leaf"))?[start..]
            .to_vec();
        self.pos += bytes.len() as u64;
        self.cursor.advance_chunk().await?;
        Ok(Some(bytes))
    }

    /// Reposition with `std::io` whence semantics. Seeking before the
    /// start is an error; seeking past the end clamps (reads return
    /// `None` there).
    pub async fn seek(&mut self, from: SeekFrom) -> Result<u64> {
        let target: i128 = match from {
            SeekFrom::Start(o) => o as i128,
            SeekFrom::Current(d) => self.pos as i128 + d as i128,
            SeekFrom::End(d) => self.len as i128 + d as i128,
        };
        if target < 0 {
            return Err(Error::precondition(format!(
                "seek to negative offset {}",
                target
            )));
        }
        let target = (target as u64).min(self.len);
        self.cursor =
            SequenceCursor::new_at_index(self.store.clone(), self.root.clone(), target).await?;
        self.pos = target;
        Ok(target)
    }
}
