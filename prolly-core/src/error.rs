//! Error types for prolly-core

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type
#[derive(Error, Debug)]
pub enum Error {
    /// Caller violated an API precondition (bad index, reused chunker, ...)
    #[error("Precondition violated: {0}")]
    Precondition(String),

    /// A chunk referenced by the tree is missing from the store.
    ///
    /// This is a fatal integrity violation: refs are produced by writes,
    /// so a missing chunk means the store lost data.
    #[error("Chunk store corruption: missing chunk {0}")]
    Corrupt(String),

    /// Malformed chunk bytes
    #[error("Codec error: {0}")]
    Codec(String),

    /// Storage backend failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(String),

    /// Internal invariant broken
    #[error("Invariant violated: {0}")]
    Invariant(String),
}

impl Error {
    /// Create a precondition error
    pub fn precondition(msg: impl Into<String>) -> Self {
        Error::Precondition(msg.into())
    }

    /// Create a corruption error for a missing chunk hash
    pub fn corrupt(hash: impl std::fmt::Display) -> Self {
        Error::Corrupt(hash.to_string())
    }

    /// Create a codec error
    pub fn codec(msg: impl Into<String>) -> Self {
        Error::Codec(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Error::Storage(msg.into())
    }

    /// Create an I/O error
    pub fn io(msg: impl Into<String>) -> Self {
        Error::Io(msg.into())
    }

    /// Create an invariant error
    pub fn invariant(msg: impl Into<String>) -> Self {
        Error::Invariant(msg.into())
    }
}
