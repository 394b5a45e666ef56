//! Per-contract state: materialized on demand from KV reads, owning a storage trie and
//! two scalar slots.

use sse_primitives::{Address, ClassHash, Nonce, StorageKey, StorageValue};
use starknet_types_core::felt::Felt;

use crate::column;
use crate::error::Result;
use crate::kv::KvTransaction;
use crate::trie::node::PedersenHasher;
use crate::trie::Trie;

/// A mutated storage slot, reported to the caller so it can be written to the history log before
/// the new value replaces it. A plain return value in place of a changed-value callback.
pub struct StorageChange {
    pub key: StorageKey,
    pub old_value: StorageValue,
}

/// A deployed contract, materialized from its address. Dropping a `Contract` without calling
/// [`Contract::commit`] discards any pending storage-trie writes; the scalar fields
/// (`class_hash`, `nonce`) are written to the transaction immediately since they cost one KV
/// write each and don't need lazy batching.
pub struct Contract {
    address: Address,
    storage: Trie<PedersenHasher>,
}

impl Contract {
    pub fn open(tx: &dyn KvTransaction, address: Address) -> Result<Self> {
        let storage = Trie::open_at(tx, column::CONTRACT_STORAGE_TRIE, address.to_be_bytes().to_vec())?;
        Ok(Self { address, storage })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn class_hash(&self, tx: &dyn KvTransaction) -> Result<ClassHash> {
        match tx.get(column::CONTRACT_CLASS_HASH, &self.address.to_be_bytes())? {
            Some(bytes) => Ok(ClassHash::from_be_bytes(array32(&bytes)?)),
            None => Ok(ClassHash::ZERO),
        }
    }

    /// Zero for a deployed contract that has never had its nonce mutated: a contract that exists
    /// but was never touched reads as nonce 0, not `NotFound`.
    pub fn nonce(&self, tx: &dyn KvTransaction) -> Result<Nonce> {
        match tx.get(column::CONTRACT_NONCE, &self.address.to_be_bytes())? {
            Some(bytes) => Ok(Nonce::from_be_bytes(array32(&bytes)?)),
            None => Ok(Nonce::ZERO),
        }
    }

    pub fn storage(&self, tx: &dyn KvTransaction, key: StorageKey) -> Result<StorageValue> {
        Ok(StorageValue::new(self.storage.get(tx, key.as_felt())?))
    }

    pub fn root(&self) -> Felt {
        self.storage.root()
    }

    /// `commitment(A) = Pedersen(Pedersen(Pedersen(class_hash, storage_root), nonce), 0)`.
    pub fn commitment(&self, tx: &dyn KvTransaction) -> Result<Felt> {
        use starknet_types_core::hash::{Pedersen, StarkHash};
        let class_hash = self.class_hash(tx)?.as_felt();
        let nonce = self.nonce(tx)?.as_felt();
        let h = Pedersen::hash(&class_hash, &self.root());
        let h = Pedersen::hash(&h, &nonce);
        Ok(Pedersen::hash(&h, &Felt::ZERO))
    }

    pub fn set_class_hash(&self, tx: &mut dyn KvTransaction, class_hash: ClassHash) {
        tx.set(column::CONTRACT_CLASS_HASH, self.address.to_be_bytes().to_vec(), class_hash.to_be_bytes().to_vec());
    }

    pub fn set_nonce(&self, tx: &mut dyn KvTransaction, nonce: Nonce) {
        tx.set(column::CONTRACT_NONCE, self.address.to_be_bytes().to_vec(), nonce.to_be_bytes().to_vec());
    }

    /// Applies a class replacement, returning the class hash that was in effect before.
    pub fn replace(&self, tx: &mut dyn KvTransaction, new_class_hash: ClassHash) -> Result<ClassHash> {
        let old = self.class_hash(tx)?;
        self.set_class_hash(tx, new_class_hash);
        Ok(old)
    }

    pub fn update_nonce(&self, tx: &mut dyn KvTransaction, new_nonce: Nonce) -> Result<Nonce> {
        let old = self.nonce(tx)?;
        self.set_nonce(tx, new_nonce);
        Ok(old)
    }

    /// Applies a storage diff in order, last-write-wins for duplicate keys within `diff`.
    /// Returns one [`StorageChange`] per distinct key actually touched, each carrying the value
    /// that was live *before* the whole diff (not before each individual write), so the caller
    /// can write one history entry per key even when the diff names it twice.
    pub fn update_storage(
        &mut self,
        tx: &dyn KvTransaction,
        diff: &[(StorageKey, StorageValue)],
    ) -> Result<Vec<StorageChange>> {
        let mut first_old_value = indexmap::IndexMap::new();
        for (key, value) in diff {
            let old = self.storage.put(tx, key.as_felt(), value.as_felt())?;
            first_old_value.entry(*key).or_insert(StorageValue::new(old));
        }
        Ok(first_old_value.into_iter().map(|(key, old_value)| StorageChange { key, old_value }).collect())
    }

    pub fn commit(&mut self, tx: &mut dyn KvTransaction) -> Result<Felt> {
        self.storage.commit(tx)
    }

    /// Deletes every per-contract KV entry and collapses the storage trie, undoing a deploy on
    /// `Revert`. The contract's leaf in the global contracts trie is the caller's responsibility
    /// to zero out. Storage-trie node bodies are reference counted (see [`crate::trie::Trie::purge`])
    /// so this never deletes a node another live contract's storage still depends on.
    pub fn purge(mut self, tx: &mut dyn KvTransaction) -> Result<()> {
        tx.delete(column::CONTRACT_CLASS_HASH, self.address.to_be_bytes().to_vec());
        tx.delete(column::CONTRACT_NONCE, self.address.to_be_bytes().to_vec());
        tx.delete(column::CONTRACT_DEPLOYMENT_HEIGHT, self.address.to_be_bytes().to_vec());

        self.storage.commit(tx)?; // flush whatever is pending before tearing it down
        self.storage.purge(tx)?;
        Ok(())
    }
}

fn array32(bytes: &[u8]) -> Result<[u8; 32]> {
    bytes
        .try_into()
        .map_err(|_| crate::error::StateEngineError::corruption("contract::array32", "expected 32-byte scalar"))
}
