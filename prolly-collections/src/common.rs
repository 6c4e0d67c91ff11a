//! Shared facade helpers

use prolly_core::encode::encode_sequence;
use prolly_core::hash::Hash;
use prolly_core::sequence::Sequence;

/// Content address of a collection's root node.
///
/// Computed from the canonical encoding, so it is available whether or
/// not the root chunk has been persisted.
pub(crate) fn collection_hash(seq: &Sequence) -> Hash {
    Hash::of(&encode_sequence(seq))
}
