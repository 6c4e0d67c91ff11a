//! # Prolly Collections
//!
//! Typed collection facades over content-addressed prolly-trees:
//!
//! - `List`: values indexed by position
//! - `Map`: entries ordered by key
//! - `Set`: unique values ordered by themselves
//! - `Blob`: bytes, with a seekable chunk-at-a-time `BlobReader`
//!
//! Every collection is an immutable value sharing one chunk store;
//! edits return new collections, and collections with the same logical
//! contents have the same root hash regardless of how they were built.
//!
//! ## Example
//!
//! ```ignore
//! use prolly_collections::Map;
//! use prolly_core::{MemoryStore, Value};
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryStore::new());
//! let map = Map::new(store, vec![(Value::Int(1), Value::from("a"))]).await?;
//! let map2 = map.set(Value::Int(2), Value::from("b")).await?;
//! assert_eq!(map2.get(&Value::Int(1)).await?, Some(Value::from("a")));
//! ```

mod common;

pub mod blob;
pub mod list;
pub mod map;
pub mod set;

pub use blob::{Blob, BlobReader};
pub use list::{List, ListIterator};
pub use map::{Map, MapDiff, MapIterator, MapModification};
pub use set::{Set, SetDiff, SetIterator};

// Frequently-needed core types, re-exported for callers
pub use prolly_core::{Hash, MemoryStore, Value};
pub use prolly_tree::diff::Splice;
