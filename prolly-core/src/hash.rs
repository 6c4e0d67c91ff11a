//! Content hashes
//!
//! Every persisted chunk is identified by the SHA-256 digest of its
//! serialized bytes. `Hash` is a fixed 32-byte newtype; the lowercase hex
//! rendering is the canonical external form (storage paths, error
//! messages).

use crate::error::{Error, Result};
use sha2::Digest;
use std::fmt;

/// Length of a content hash in bytes (SHA-256)
pub const HASH_LEN: usize = 32;

/// A content hash identifying a persisted chunk
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Hash([u8; HASH_LEN]);

impl Hash {
    /// Hash the given bytes with SHA-256
    pub fn of(bytes: &[u8]) -> Self {
        let mut hasher = sha2::Sha256::new();
        hasher.update(bytes);
        Hash(hasher.finalize().into())
    }

    /// Wrap an existing digest
    pub fn from_bytes(bytes: [u8; HASH_LEN]) -> Self {
        Hash(bytes)
    }

    /// The raw digest bytes
    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    /// Lowercase hex rendering
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a lowercase hex rendering back into a hash
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| Error::codec(format!("invalid hash hex: {}", e)))?;
        let arr: [u8; HASH_LEN] = bytes
            .try_into()
            .map_err(|_| Error::codec("invalid hash length"))?;
        Ok(Hash(arr))
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // First 8 hex chars are enough to tell chunks apart in logs
        write!(f, "Hash({}..)", &self.to_hex()[..8])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_deterministic() {
        let a = Hash::of(b"hello");
        let b = Hash::of(b"hello");
        let c = Hash::of(b"world");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_hex_round_trip() {
        let h = Hash::of(b"some chunk bytes");
        let hex = h.to_hex();
        assert_eq!(hex.len(), 64);
        assert_eq!(Hash::from_hex(&hex).unwrap(), h);
    }

    #[test]
    fn test_bad_hex() {
        assert!(Hash::from_hex("zz").is_err());
        assert!(Hash::from_hex("abcd").is_err());
    }
}
