//! # Prolly Core
//!
//! Core types for content-addressed prolly-tree collections.
//!
//! This crate provides:
//! - `Value`: the ordered, hashable element type
//! - `Hash` / `Ref`: content addresses and chunk handles
//! - `OrderedKey`: total order over values and out-of-band hashes
//! - `Sequence` / `MetaTuple`: immutable tree nodes (leaf and meta)
//! - `RollingValueHasher`: the boundary-detecting chunk hash
//! - Chunk store traits with in-memory and file-backed implementations
//!
//! ## Design Principles
//!
//! 1. **Runtime-agnostic**: no forced executor; async only at the chunk
//!    I/O seam
//! 2. **Deterministic bytes**: one canonical encoding feeds both the
//!    rolling boundary hash and the persistent content address
//! 3. **Immutable values**: nodes never change after construction;
//!    identity is the chunk hash

pub mod codec;
pub mod encode;
pub mod error;
pub mod hash;
pub mod key;
pub mod meta;
pub mod rolling;
pub mod sequence;
pub mod store;
pub mod value;

// Re-export main types
pub use encode::{decode_sequence, encode_sequence};
pub use error::{Error, Result};
pub use hash::{Hash, HASH_LEN};
pub use key::OrderedKey;
pub use meta::{MetaTuple, Ref};
pub use rolling::{
    hash_value_bytes, meta_hash_value_bytes, RollingValueHasher, CHUNK_PATTERN, CHUNK_WINDOW,
};
pub use sequence::{Item, MapEntry, MetaSequence, Sequence, SequenceKind};
pub use store::{
    read_sequence, write_sequence, ChunkRead, ChunkStore, ChunkWrite, MemoryStore,
};
#[cfg(feature = "native")]
pub use store::FileStore;
pub use value::Value;
