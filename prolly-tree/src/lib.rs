//! # Prolly Tree
//!
//! Navigation and construction machinery for content-addressed
//! prolly-trees over `prolly-core` sequences:
//!
//! - `SequenceCursor`: a frame stack locating one item, with synchronous
//!   in-chunk movement and async chunk-hopping
//! - `SequenceChunker`: rebuilds trees from item streams, reusing
//!   untouched chunks when resuming from a cursor
//! - `chunk_sequence` / `chunk_sequence_sync`: the splice primitive
//! - `diff_ordered` / `diff_indexed`: cursor-walking diffs with
//!   shared-subtree skipping

pub mod chunker;
pub mod cursor;
pub mod diff;
pub mod mutate;

pub use chunker::SequenceChunker;
pub use cursor::SequenceCursor;
pub use diff::{diff_indexed, diff_ordered, DiffChange, Splice};
pub use mutate::{chunk_sequence, chunk_sequence_sync};
