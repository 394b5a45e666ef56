//! Felt-based domain types shared by the state engine: addresses, class hashes, storage slots,
//! nonces, block numbers, declared classes and state diffs.
//!
//! Field-element arithmetic and the Pedersen/Poseidon hash functions themselves are treated as
//! opaque, pure functions over 252-bit field elements and are not reimplemented here; this crate
//! re-exports [`starknet_types_core::felt::Felt`] rather than defining its own.

mod macros;

pub mod address;
pub mod block;
pub mod class;
pub mod class_hash;
pub mod nonce;
pub mod state_diff;
pub mod storage;

pub use address::Address;
pub use block::BlockNumber;
pub use class::{Class, DeclaredClass};
pub use class_hash::{ClassHash, CompiledClassHash};
pub use nonce::Nonce;
pub use starknet_types_core::felt::Felt;
pub use state_diff::{StateDiff, StateUpdate};
pub use storage::{StorageKey, StorageValue};

/// `STARKNET_STATE_V0` interpreted as a Felt: the domain separator for the top-level state root
/// computation when the classes trie is non-empty.
pub fn state_version() -> Felt {
    Felt::from_bytes_be_slice(b"STARKNET_STATE_V0")
}

/// `CONTRACT_CLASS_LEAF_V0` interpreted as a Felt: the domain separator folded into every leaf of
/// the global classes trie.
pub fn contract_class_leaf_version() -> Felt {
    Felt::from_bytes_be_slice(b"CONTRACT_CLASS_LEAF_V0")
}
