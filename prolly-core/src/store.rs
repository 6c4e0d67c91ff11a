//! Chunk store traits
//!
//! The tree core reads and writes chunks through these traits; the
//! backing store is an external collaborator with its own concurrency
//! contract. The traits are runtime-agnostic and use `async_trait`.
//!
//! ## Traits
//!
//! - `ChunkRead`: resolve chunk bytes by content hash
//! - `ChunkWrite`: persist bytes, returning their content hash
//! - `ChunkStore`: marker combining both (implemented blanketly)
//!
//! ## Implementations
//!
//! - `MemoryStore`: HashMap behind a lock; tests and in-memory trees
//! - `FileStore`: fan-out directory of chunk files (`native` feature)
//!
//! Writes must be idempotent by content hash: putting the same bytes
//! twice returns the same hash and stores one copy.

use crate::encode::{decode_sequence, encode_sequence};
use crate::error::{Error, Result};
use crate::hash::Hash;
use crate::meta::Ref;
use crate::sequence::Sequence;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, RwLock};

/// Read-only chunk resolution
#[async_trait]
pub trait ChunkRead: Debug + Send + Sync {
    /// Resolve chunk bytes by content hash. `None` means the store has
    /// never seen this hash.
    async fn get(&self, hash: &Hash) -> Result<Option<Vec<u8>>>;

    /// Whether the store holds this hash
    async fn has(&self, hash: &Hash) -> Result<bool> {
        Ok(self.get(hash).await?.is_some())
    }
}

/// Persisting chunks
#[async_trait]
pub trait ChunkWrite: ChunkRead {
    /// Persist bytes under their content hash and return it.
    ///
    /// Idempotent: the same bytes always map to the same hash.
    async fn put(&self, bytes: &[u8]) -> Result<Hash>;
}

/// Full store capability marker
pub trait ChunkStore: ChunkWrite {}
impl<T: ChunkWrite> ChunkStore for T {}

/// Read a chunk and decode it as a sequence node.
///
/// A missing chunk for a known ref is a fatal integrity violation, not a
/// lookup miss: refs only exist for chunks that were written.
pub async fn read_sequence(store: &dyn ChunkRead, r: &Ref) -> Result<Arc<Sequence>> {
    match store.get(&r.hash).await? {
        Some(bytes) => Ok(Arc::new(decode_sequence(&bytes)?)),
        None => Err(Error::corrupt(r.hash)),
    }
}

/// Encode a node and persist it, returning its ref
pub async fn write_sequence(store: &dyn ChunkWrite, seq: &Sequence) -> Result<Ref> {
    let bytes = encode_sequence(seq);
    let hash = store.put(&bytes).await?;
    tracing::trace!(hash = %hash, height = seq.height(), len = seq.len(), "chunk written");
    Ok(Ref::new(hash, seq.height()))
}

// ============================================================================
// MemoryStore
// ============================================================================

/// A simple in-memory chunk store
///
/// Stores chunks in a HashMap with interior mutability, so clones share
/// the same underlying map. Useful for tests and in-memory collections.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    data: Arc<RwLock<HashMap<Hash, Vec<u8>>>>,
}

impl MemoryStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct chunks held
    pub fn len(&self) -> usize {
        self.data.read().expect("RwLock poisoned").len()
    }

    /// Whether the store holds no chunks
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all chunk hashes (test helper for reuse assertions)
    pub fn hashes(&self) -> Vec<Hash> {
        self.data
            .read()
            .expect("RwLock poisoned")
            .keys()
            .copied()
            .collect()
    }
}

#[async_trait]
impl ChunkRead for MemoryStore {
    async fn get(&self, hash: &Hash) -> Result<Option<Vec<u8>>> {
        Ok(self
            .data
            .read()
            .expect("RwLock poisoned")
            .get(hash)
            .cloned())
    }

    async fn has(&self, hash: &Hash) -> Result<bool> {
        Ok(self
            .data
            .read()
            .expect("RwLock poisoned")
            .contains_key(hash))
    }
}

#[async_trait]
impl ChunkWrite for MemoryStore {
    async fn put(&self, bytes: &[u8]) -> Result<Hash> {
        let hash = Hash::of(bytes);
        self.data
            .write()
            .expect("RwLock poisoned")
            .entry(hash)
            .or_insert_with(|| bytes.to_vec());
        Ok(hash)
    }
}

// ============================================================================
// FileStore (native only)
// ============================================================================

/// File-backed chunk store (native targets only)
///
/// Chunks live under `{base}/{hh}/{rest-of-hash}.chunk` where `hh` is the
/// first hex byte, keeping directories to a manageable fan-out.
#[cfg(feature = "native")]
#[derive(Debug, Clone)]
pub struct FileStore {
    base_path: std::path::PathBuf,
}

#[cfg(feature = "native")]
impl FileStore {
    /// Create a store rooted at `base_path`
    pub fn new(base_path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn chunk_path(&self, hash: &Hash) -> std::path::PathBuf {
        let hex = hash.to_hex();
        self.base_path
            .join(&hex[..2])
            .join(format!("{}.chunk", &hex[2..]))
    }
}

#[cfg(feature = "native")]
#[async_trait]
impl ChunkRead for FileStore {
    async fn get(&self, hash: &Hash) -> Result<Option<Vec<u8>>> {
        let path = self.chunk_path(hash);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::io(format!(
                "failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }
}

#[cfg(feature = "native")]
#[async_trait]
impl ChunkWrite for FileStore {
    async fn put(&self, bytes: &[u8]) -> Result<Hash> {
        let hash = Hash::of(bytes);
        let path = self.chunk_path(&hash);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            // Content-addressed: existing file already holds these bytes
            return Ok(hash);
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::io(format!("failed to create {}: {}", parent.display(), e))
            })?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| Error::io(format!("failed to write {}: {}", path.display(), e)))?;
        Ok(hash)
    }
}

// ============================================================================
// Tests
// ============================================================================
