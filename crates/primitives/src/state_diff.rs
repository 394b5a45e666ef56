use indexmap::IndexMap;

use crate::address::Address;
use crate::class_hash::{ClassHash, CompiledClassHash};
use crate::nonce::Nonce;
use crate::storage::{StorageKey, StorageValue};
use starknet_types_core::felt::Felt;

/// The per-block delta of declared classes, deployed contracts, class replacements, nonces and
/// storage slot writes. Field order matches the application order the engine enforces: deploys,
/// then replaced classes, then nonces, then storage, with classes registered up front.
///
/// Maps use [`IndexMap`] rather than a hash map so that iteration order matches insertion order
/// for types where order is semantically meaningful (notably `storage_diffs`, where a duplicate
/// key later in the list overrides an earlier one).
#[derive(Clone, Debug, Default)]
pub struct StateDiff {
    pub deployed_contracts: IndexMap<Address, ClassHash>,
    pub declared_v0_classes: Vec<ClassHash>,
    pub declared_v1_classes: IndexMap<ClassHash, CompiledClassHash>,
    pub replaced_classes: IndexMap<Address, ClassHash>,
    pub nonces: IndexMap<Address, Nonce>,
    pub storage_diffs: IndexMap<Address, IndexMap<StorageKey, StorageValue>>,
}

impl StateDiff {
    pub fn is_empty(&self) -> bool {
        self.deployed_contracts.is_empty()
            && self.declared_v0_classes.is_empty()
            && self.declared_v1_classes.is_empty()
            && self.replaced_classes.is_empty()
            && self.nonces.is_empty()
            && self.storage_diffs.is_empty()
    }
}

/// The shape of a state update as returned by the feeder gateway: fetching it is out of scope
/// here, but its shape matters to everything downstream.
#[derive(Clone, Debug)]
pub struct StateUpdate {
    pub block_hash: Felt,
    pub old_root: Felt,
    pub new_root: Felt,
    pub state_diff: StateDiff,
}
