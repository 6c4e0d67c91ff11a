//! Ordered boundary keys
//!
//! Meta tuples and ordered collections need a total order over keys even
//! when one side is a subtree we have not read yet (we only know its
//! content hash). `OrderedKey` is either *value-ordered* (wraps a
//! key-orderable `Value`) or *hash-ordered* (wraps a content hash, used
//! when the key is a compound value whose natural order is its hash).
//!
//! Comparison rule: every value-ordered key sorts before every
//! hash-ordered key; two keys of the same kind compare by payload. The
//! rule is arbitrary but must be identical everywhere, since it shapes
//! chunk boundaries and therefore content addresses.

use crate::codec::Reader;
use crate::error::{Error, Result};
use crate::hash::{Hash, HASH_LEN};
use crate::value::Value;
use std::cmp::Ordering;

const KEY_BY_VALUE: u8 = 0;
const KEY_BY_HASH: u8 = 1;

/// A totally ordered key over either a raw value or a content hash
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OrderedKey {
    /// Ordered by the wrapped value's natural order
    ByValue(Value),
    /// Ordered by content hash byte order
    ByHash(Hash),
}

impl OrderedKey {
    /// Key for a value: value-ordered when the value supports it,
    /// hash-ordered (over the value's serialized form) otherwise.
    pub fn new(v: Value) -> Self {
        if v.is_key_orderable() {
            OrderedKey::ByValue(v)
        } else {
            OrderedKey::ByHash(Hash::of(&v.encode_to_vec()))
        }
    }

    /// Key for an out-of-band content hash
    pub fn from_hash(h: Hash) -> Self {
        OrderedKey::ByHash(h)
    }

    /// Counted key used by indexed (list/blob) meta tuples.
    ///
    /// Never consulted for seeking — indexed descent uses cumulative leaf
    /// offsets — but it participates in the hashed and persisted bytes,
    /// so it must be deterministic.
    pub fn counted(n: u64) -> Self {
        OrderedKey::ByValue(Value::Int(n as i64))
    }

    /// The wrapped value, if this key is value-ordered
    pub fn value(&self) -> Option<&Value> {
        match self {
            OrderedKey::ByValue(v) => Some(v),
            OrderedKey::ByHash(_) => None,
        }
    }

    /// Whether this key is ordered by value (vs by hash)
    pub fn is_ordered_by_value(&self) -> bool {
        matches!(self, OrderedKey::ByValue(_))
    }

    /// Append the deterministic serialized form to `buf`
    pub fn encode(&self, buf: &mut Vec<u8>) {
        match self {
            OrderedKey::ByValue(v) => {
                buf.push(KEY_BY_VALUE);
                v.encode(buf);
            }
            OrderedKey::ByHash(h) => {
                buf.push(KEY_BY_HASH);
                buf.extend_from_slice(h.as_bytes());
            }
        }
    }

    /// Decode one key from the reader
    pub fn decode(r: &mut Reader<'_>) -> Result<OrderedKey> {
        match r.read_u8()? {
            KEY_BY_VALUE => Ok(OrderedKey::ByValue(Value::decode(r)?)),
            KEY_BY_HASH => {
                let bytes: [u8; HASH_LEN] =
                    r.read_exact(HASH_LEN)?.try_into().expect("32-byte slice");
                Ok(OrderedKey::ByHash(Hash::from_bytes(bytes)))
            }
            tag => Err(Error::codec(format!("unknown key tag {}", tag))),
        }
    }

    // codec helper, used by encode tests
    #[cfg(test)]
    fn encode_to_vec(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode(&mut buf);
        buf
    }
}

impl Ord for OrderedKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (OrderedKey::ByValue(a), OrderedKey::ByValue(b)) => a.cmp(b),
            (OrderedKey::ByHash(a), OrderedKey::ByHash(b)) => a.cmp(b),
            (OrderedKey::ByValue(_), OrderedKey::ByHash(_)) => Ordering::Less,
            (OrderedKey::ByHash(_), OrderedKey::ByValue(_)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for OrderedKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
