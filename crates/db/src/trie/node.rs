//! Node shapes and hash rule for the height-251 sparse Merkle trie.

use bitvec::prelude::{BitVec, Msb0};
use starknet_types_core::felt::Felt;
use starknet_types_core::hash::{Pedersen, Poseidon, StarkHash};

/// A bit path through the trie, most-significant bit first. Used both as the edge node's own
/// path segment and as the "location" prefix a node is stored under.
pub type Path = BitVec<u8, Msb0>;

/// Trie height. StarkNet's prime is slightly above 2^251, so the top 5 bits of every 256-bit Felt
/// encoding are always zero and are dropped from the path.
pub const TRIE_HEIGHT: usize = 251;

/// The full-height path of a trie key, MSB first.
pub fn path_of(key: Felt) -> Path {
    let bytes = key.to_bytes_be();
    let bits = BitVec::<u8, Msb0>::from_slice(&bytes);
    bits[bits.len() - TRIE_HEIGHT..].to_bitvec()
}

/// Interprets a path's bits as the big-endian integer they'd occupy at full trie height, i.e.
/// left-padded with zero bits up to 256 total. This is the `path_bits_as_felt` term in the edge
/// hash rule.
pub fn path_to_felt(path: &Path) -> Felt {
    let mut padded = BitVec::<u8, Msb0>::repeat(false, 256 - path.len());
    padded.extend_from_bitslice(path);
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(padded.as_raw_slice());
    Felt::from_bytes_be(&bytes)
}

/// A stored trie node. There is no explicit "empty" variant: absence of an entry at a given
/// location *is* the empty node, with hash 0.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node {
    /// Two children, both present. `left_hash`/`right_hash` are the precomputed hashes of the
    /// subtrees rooted at this node's location extended by bit 0 / bit 1, so this node's own
    /// hash never requires re-reading its children.
    Binary { left_hash: Felt, right_hash: Felt },
    /// A compressed run of single-child nodes. `child_hash` is the hash of the subtree at the far
    /// end of `path`; at full height (path reaching depth [`TRIE_HEIGHT`]) `child_hash` is instead
    /// the leaf *value* itself, per the data model's "leaves are edges terminating at depth H"
    /// rule.
    Edge { path: Path, child_hash: Felt },
}

impl Node {
    pub fn hash<H: TrieHasher>(&self) -> Felt {
        match self {
            Node::Binary { left_hash, right_hash } => H::hash(*left_hash, *right_hash),
            Node::Edge { path, child_hash } => {
                H::hash(*child_hash, path_to_felt(path)) + Felt::from(path.len() as u64)
            }
        }
    }
}

/// The hash function a trie is parameterized over, injected at construction.
pub trait TrieHasher: Clone + Send + Sync + 'static {
    fn hash(a: Felt, b: Felt) -> Felt;
    fn name() -> &'static str;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct PedersenHasher;

impl TrieHasher for PedersenHasher {
    fn hash(a: Felt, b: Felt) -> Felt {
        Pedersen::hash(&a, &b)
    }

    fn name() -> &'static str {
        "pedersen"
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct PoseidonHasher;

impl TrieHasher for PoseidonHasher {
    fn hash(a: Felt, b: Felt) -> Felt {
        Poseidon::hash(&a, &b)
    }

    fn name() -> &'static str {
        "poseidon"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_round_trips_through_felt_and_back() {
        let key = Felt::from(0x1234_5678u64);
        let path = path_of(key);
        assert_eq!(path.len(), TRIE_HEIGHT);
        assert_eq!(path_to_felt(&path), key);
    }

    #[test]
    fn zero_key_is_all_zero_path() {
        let path = path_of(Felt::ZERO);
        assert!(path.not_any());
    }
}
