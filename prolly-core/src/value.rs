//! Values stored in collections
//!
//! The tree core only needs three things from a value: a strict total
//! order, equality, and a deterministic byte serialization. The same
//! serialization feeds the rolling boundary hash and the persisted chunk
//! bytes, so chunk boundaries and content addresses agree across
//! implementations by construction.
//!
//! ## Ordering
//!
//! Values order first by type tag (`Bool < Int < Float < String < Bytes`),
//! then by payload. Floats use IEEE total ordering so the order stays
//! total in the presence of NaN. There is no cross-type numeric
//! comparison: `Int(1)` and `Float(1.0)` are distinct, adjacent values.
//!
//! `Bool`/`Int`/`Float`/`String` are *key-orderable*: they can appear
//! directly inside an ordered boundary key. `Bytes` stands in for
//! compound payloads and is keyed by content hash instead (see
//! `OrderedKey`).

use crate::codec::{self, Reader};
use crate::error::{Error, Result};
use std::cmp::Ordering;

/// Type tag bytes used in the serialized form.
///
/// Tag order defines the cross-type sort order; do not renumber.
const TAG_BOOL: u8 = 0;
const TAG_INT: u8 = 1;
const TAG_FLOAT: u8 = 2;
const TAG_STRING: u8 = 3;
const TAG_BYTES: u8 = 4;

/// A value stored in a `List`, `Map`, or `Set`
#[derive(Clone, Debug)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
}

impl Value {
    /// Whether this value can order a boundary key directly.
    ///
    /// Non-orderable values are keyed by their content hash.
    pub fn is_key_orderable(&self) -> bool {
        !matches!(self, Value::Bytes(_))
    }

    fn tag(&self) -> u8 {
        match self {
            Value::Bool(_) => TAG_BOOL,
            Value::Int(_) => TAG_INT,
            Value::Float(_) => TAG_FLOAT,
            Value::String(_) => TAG_STRING,
            Value::Bytes(_) => TAG_BYTES,
        }
    }

    /// Append the deterministic serialized form to `buf`
    pub fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(self.tag());
        match self {
            Value::Bool(b) => buf.push(*b as u8),
            Value::Int(i) => codec::encode_zigzag(*i, buf),
            Value::Float(f) => buf.extend_from_slice(&f.to_bits().to_le_bytes()),
            Value::String(s) => {
                codec::encode_varint(s.len() as u64, buf);
                buf.extend_from_slice(s.as_bytes());
            }
            Value::Bytes(b) => {
                codec::encode_varint(b.len() as u64, buf);
                buf.extend_from_slice(b);
            }
        }
    }

    /// Serialized form as an owned vector
    pub fn encode_to_vec(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode(&mut buf);
        buf
    }

    /// Decode one value from the reader
    pub fn decode(r: &mut Reader<'_>) -> Result<Value> {
        match r.read_u8()? {
            TAG_BOOL => match r.read_u8()? {
                0 => Ok(Value::Bool(false)),
                1 => Ok(Value::Bool(true)),
                b => Err(Error::codec(format!("invalid bool byte {}", b))),
            },
            TAG_INT => Ok(Value::Int(r.read_zigzag()?)),
            TAG_FLOAT => {
                let bytes: [u8; 8] = r.read_exact(8)?.try_into().expect("8-byte slice");
                Ok(Value::Float(f64::from_bits(u64::from_le_bytes(bytes))))
            }
            TAG_STRING => {
                let len = r.read_len()?;
                let bytes = r.read_exact(len)?;
                let s = std::str::from_utf8(bytes)
                    .map_err(|e| Error::codec(format!("invalid utf-8 in string value: {}", e)))?;
                Ok(Value::String(s.to_string()))
            }
            TAG_BYTES => {
                let len = r.read_len()?;
                Ok(Value::Bytes(r.read_exact(len)?.to_vec()))
            }
            tag => Err(Error::codec(format!("unknown value tag {}", tag))),
        }
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Bytes(a), Value::Bytes(b)) => a.cmp(b),
            _ => self.tag().cmp(&other.tag()),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}
