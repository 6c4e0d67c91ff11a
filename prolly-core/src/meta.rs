//! Refs and meta tuples
//!
//! A `Ref` is the handle to a persisted chunk: its content hash plus the
//! height of the subtree it roots (leaf = 0). A `MetaTuple` is one entry
//! of a meta node: the child ref, the subtree's boundary key, and how
//! many leaf items the subtree holds. A tuple logically owns its subtree;
//! physically the subtree is read back through the chunk store on demand.
//!
//! Freshly built chunks may also be cached in-memory on the tuple so they
//! can be reached without a store read (and before they are persisted at
//! all, in the case of a pending root). The cache never participates in
//! equality or serialization.

use crate::codec::{self, Reader};
use crate::error::Result;
use crate::hash::{Hash, HASH_LEN};
use crate::key::OrderedKey;
use crate::sequence::Sequence;
use std::sync::Arc;

/// Handle to a persisted chunk
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Ref {
    /// Content hash of the chunk bytes
    pub hash: Hash,
    /// Height of the referenced subtree (leaf = 0)
    pub height: u64,
}

impl Ref {
    /// Create a ref
    pub fn new(hash: Hash, height: u64) -> Self {
        Ref { hash, height }
    }

    /// Append the serialized form to `buf`
    pub fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self.hash.as_bytes());
        codec::encode_varint(self.height, buf);
    }

    /// Decode one ref from the reader
    pub fn decode(r: &mut Reader<'_>) -> Result<Ref> {
        let bytes: [u8; HASH_LEN] = r.read_exact(HASH_LEN)?.try_into().expect("32-byte slice");
        let height = r.read_varint()?;
        Ok(Ref::new(Hash::from_bytes(bytes), height))
    }
}

/// One entry of a meta node: (child ref, boundary key, subtree leaf count)
#[derive(Clone, Debug)]
pub struct MetaTuple {
    child: Ref,
    key: OrderedKey,
    num_leaves: u64,
    /// Strong reference to the in-memory child, for fresh chunks.
    /// Not part of the tuple's identity.
    cached: Option<Arc<Sequence>>,
}

impl MetaTuple {
    /// Create a tuple for a persisted child
    pub fn new(child: Ref, key: OrderedKey, num_leaves: u64) -> Self {
        MetaTuple {
            child,
            key,
            num_leaves,
            cached: None,
        }
    }

    /// Attach an in-memory copy of the child
    pub fn with_cached(mut self, seq: Arc<Sequence>) -> Self {
        debug_assert_eq!(seq.height(), self.child.height);
        self.cached = Some(seq);
        self
    }

    /// The child ref
    pub fn child_ref(&self) -> &Ref {
        &self.child
    }

    /// The subtree's boundary key (largest key for ordered trees, a
    /// counted key for indexed trees)
    pub fn key(&self) -> &OrderedKey {
        &self.key
    }

    /// Leaf items reachable through this child
    pub fn num_leaves(&self) -> u64 {
        self.num_leaves
    }

    /// The cached in-memory child, if present
    pub fn cached(&self) -> Option<&Arc<Sequence>> {
        self.cached.as_ref()
    }
}

// Equality ignores the cache: a tuple freshly decoded from storage equals
// the tuple that produced it.
impl PartialEq for MetaTuple {
    fn eq(&self, other: &Self) -> bool {
        self.child == other.child && self.key == other.key && self.num_leaves == other.num_leaves
    }
}

impl Eq for MetaTuple {}
