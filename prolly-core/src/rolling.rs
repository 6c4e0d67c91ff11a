//! Rolling value hasher
//!
//! The chunker decides where chunks end by streaming each appended item's
//! serialized bytes through a windowed rolling hash and cutting whenever
//! the hash state matches a fixed bit pattern. Because the hash only ever
//! depends on the last `CHUNK_WINDOW` bytes, the decision at any byte is a
//! pure function of its local context: edits far away cannot shift a
//! boundary here, which is what lets the chunker reuse untouched chunks.
//!
//! Each tree level salts the hasher with `level % 256` so meta levels
//! chunk independently of the leaf level.

use crate::meta::MetaTuple;
use crate::sequence::{Item, MapEntry};

/// Width of the rolling window in bytes
pub const CHUNK_WINDOW: usize = 64;

/// Boundary pattern: 12 low bits set, giving an expected chunk size of
/// 4 KiB of hashed bytes
pub const CHUNK_PATTERN: u32 = (1 << 12) - 1;

const MULT: u32 = 0x0100_0193;

// MULT^CHUNK_WINDOW mod 2^32: the multiplier a byte's contribution has
// accumulated by the time it leaves the window.
const MULT_OUT: u32 = mult_pow(CHUNK_WINDOW);

const fn mult_pow(n: usize) -> u32 {
    let mut acc: u32 = 1;
    let mut i = 0;
    while i < n {
        acc = acc.wrapping_mul(MULT);
        i += 1;
    }
    acc
}

/// Byte-streaming rolling hash with boundary detection
#[derive(Debug)]
pub struct RollingValueHasher {
    window: [u8; CHUNK_WINDOW],
    pos: usize,
    h: u32,
    salt: u8,
    /// Set when any hashed byte matched the boundary pattern since the
    /// last reset
    pub crossed_boundary: bool,
}

impl RollingValueHasher {
    /// Create a hasher salted for one tree level
    pub fn new(salt: u8) -> Self {
        RollingValueHasher {
            window: [0; CHUNK_WINDOW],
            pos: 0,
            h: 0,
            salt,
            crossed_boundary: false,
        }
    }

    /// Clear the window, running hash, and boundary flag (salt persists)
    pub fn reset(&mut self) {
        self.window = [0; CHUNK_WINDOW];
        self.pos = 0;
        self.h = 0;
        self.crossed_boundary = false;
    }

    /// Stream one byte
    #[inline]
    pub fn hash_byte(&mut self, b: u8) {
        let incoming = b ^ self.salt;
        let outgoing = self.window[self.pos];
        self.window[self.pos] = incoming;
        self.pos = (self.pos + 1) % CHUNK_WINDOW;

        // Slide the polynomial: age every term, admit the new byte, and
        // retire the term that just left the window.
        self.h = self
            .h
            .wrapping_mul(MULT)
            .wrapping_add(incoming as u32)
            .wrapping_sub((outgoing as u32).wrapping_mul(MULT_OUT));

        if self.h & CHUNK_PATTERN == CHUNK_PATTERN {
            self.crossed_boundary = true;
        }
    }

    /// Stream a byte slice
    pub fn hash_bytes(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.hash_byte(b);
        }
    }
}

/// Stream a leaf item's persisted byte form into the hasher.
///
/// Blob bytes are streamed raw (no tag) so blob boundaries are defined by
/// the content itself; other items stream their chunk encoding.
pub fn hash_value_bytes(item: &Item, rv: &mut RollingValueHasher) {
    match item {
        Item::Byte(b) => rv.hash_byte(*b),
        Item::Value(v) => {
            let mut buf = Vec::with_capacity(16);
            v.encode(&mut buf);
            rv.hash_bytes(&buf);
        }
        Item::Entry(MapEntry { key, value }) => {
            let mut buf = Vec::with_capacity(32);
            key.encode(&mut buf);
            value.encode(&mut buf);
            rv.hash_bytes(&buf);
        }
        Item::Meta(_) => unreachable!("meta tuples hash through meta_hash_value_bytes"),
    }
}

/// Stream a meta tuple into the hasher: the child ref's bytes followed by
/// the boundary key's bytes. Hash-ordered keys contribute their tag and
/// digest, so the byte stream is identical however the key was produced.
pub fn meta_hash_value_bytes(mt: &MetaTuple, rv: &mut RollingValueHasher) {
    let mut buf = Vec::with_capacity(64);
    mt.child_ref().encode(&mut buf);
    mt.key().encode(&mut buf);
    rv.hash_bytes(&buf);
}
