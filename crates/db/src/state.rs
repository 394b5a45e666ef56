//! The orchestrator: mediates between the contract store and the history log, owns the two
//! global tries, and implements the `Update`/`Revert` protocol plus the `StateHistoryReader`
//! surface.

use indexmap::IndexMap;
use starknet_types_core::felt::Felt;
use starknet_types_core::hash::{Poseidon, StarkHash};

use sse_primitives::{
    contract_class_leaf_version, state_version, Address, BlockNumber, Class, ClassHash, DeclaredClass, Nonce,
    StateDiff, StateUpdate, StorageKey, StorageValue,
};

use crate::class_store::ClassStore;
use crate::column;
use crate::config::RocksDBConfig;
use crate::contract::Contract;
use crate::error::{Result, StateEngineError};
use crate::history::HistoryLog;
use crate::kv::{KvTransaction, RocksTransaction};
use crate::trie::node::{PedersenHasher, PoseidonHasher};
use crate::trie::Trie;

/// The state engine: owns the RocksDB handle and exposes `Root`/`Update`/`Revert` plus the
/// read-only `StateHistoryReader` surface. Single-writer: callers must serialize `update`
/// and `revert` calls themselves.
pub struct StateEngine {
    db: rocksdb::DB,
}

impl StateEngine {
    pub fn open(config: &RocksDBConfig) -> Result<Self> {
        let opts = config.to_rocksdb_options();
        let path = config.database_path();
        std::fs::create_dir_all(&path).map_err(|e| {
            StateEngineError::corruption("StateEngine::open", format!("creating {}: {e}", path.display()))
        })?;
        let db = rocksdb::DB::open_cf(&opts, &path, column::ALL)?;
        tracing::debug!(chain_id = %config.chain_id, "opened state engine database");
        Ok(Self { db })
    }

    /// `Root() -> Felt`. 0 for a fresh engine.
    pub fn root(&self) -> Result<Felt> {
        let tx = RocksTransaction::new(&self.db);
        global_root(&tx)
    }

    /// Whether every column family is empty. Exists for tests asserting a full revert round-trip
    /// leaves no keys anywhere, since the underlying `db` handle is private to this module.
    pub fn is_fully_empty(&self) -> Result<bool> {
        let tx = RocksTransaction::new(&self.db);
        for bucket in column::ALL {
            if !tx.iterate_with_prefix(bucket, &[])?.is_empty() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Applies `update` at `block`, registering `classes` along the way. Atomic: any failure
    /// leaves the database untouched.
    pub fn update(
        &self,
        block: BlockNumber,
        update: &StateUpdate,
        classes: &IndexMap<ClassHash, Class>,
    ) -> Result<()> {
        let mut tx = RocksTransaction::new(&self.db);
        self.apply_update(&mut tx, block, update, classes)?;
        tx.commit()?;
        tracing::debug!(%block, root = %update.new_root, "applied update");
        Ok(())
    }

    fn apply_update(
        &self,
        tx: &mut RocksTransaction<'_>,
        block: BlockNumber,
        update: &StateUpdate,
        classes: &IndexMap<ClassHash, Class>,
    ) -> Result<()> {
        let before = global_root(tx)?;
        if before != update.old_root {
            return Err(StateEngineError::mismatched_root(block, update.old_root, before));
        }

        for (hash, class) in classes {
            ClassStore::declare_if_absent(tx, *hash, block, class.clone())?;
        }

        let mut classes_trie = Trie::<PoseidonHasher>::open(tx, column::CLASSES_TRIE)?;
        for (class_hash, compiled_class_hash) in &update.state_diff.declared_v1_classes {
            let leaf = Poseidon::hash(&contract_class_leaf_version(), &compiled_class_hash.as_felt());
            classes_trie.put(tx, class_hash.as_felt(), leaf)?;
        }
        classes_trie.commit(tx)?;

        let mut contracts_trie = Trie::<PedersenHasher>::open(tx, column::STATE_TRIE)?;

        for (address, class_hash) in &update.state_diff.deployed_contracts {
            let contract = Contract::open(tx, *address)?;
            contract.set_class_hash(tx, *class_hash);
            tx.set(column::CONTRACT_DEPLOYMENT_HEIGHT, address.to_be_bytes().to_vec(), block.to_be_bytes().to_vec());
            let commitment = contract.commitment(tx)?;
            contracts_trie.put(tx, address.as_felt(), commitment)?;
        }

        apply_mutations(tx, &update.state_diff, block, &mut contracts_trie, true)?;

        contracts_trie.commit(tx)?;

        let after = global_root(tx)?;
        if after != update.new_root {
            return Err(StateEngineError::mismatched_root(block, update.new_root, after));
        }
        Ok(())
    }

    /// Reverses `update`, which must be the diff that was applied at `block`. Atomic like
    /// [`StateEngine::update`].
    pub fn revert(&self, block: BlockNumber, update: &StateUpdate) -> Result<()> {
        let mut tx = RocksTransaction::new(&self.db);
        self.apply_revert(&mut tx, block, update)?;
        tx.commit()?;
        tracing::debug!(%block, root = %update.old_root, "reverted update");
        Ok(())
    }

    fn apply_revert(&self, tx: &mut RocksTransaction<'_>, block: BlockNumber, update: &StateUpdate) -> Result<()> {
        let before = global_root(tx)?;
        if before != update.new_root {
            return Err(StateEngineError::mismatched_root(block, update.new_root, before));
        }

        for hash in &update.state_diff.declared_v0_classes {
            remove_if_declared_at(tx, *hash, block)?;
        }
        for (hash, _) in &update.state_diff.declared_v1_classes {
            remove_if_declared_at(tx, *hash, block)?;
        }

        let mut classes_trie = Trie::<PoseidonHasher>::open(tx, column::CLASSES_TRIE)?;
        for (class_hash, _) in &update.state_diff.declared_v1_classes {
            classes_trie.put(tx, class_hash.as_felt(), Felt::ZERO)?;
        }
        classes_trie.commit(tx)?;

        let mut contracts_trie = Trie::<PedersenHasher>::open(tx, column::STATE_TRIE)?;

        let reverse_diff = build_reverse_diff(tx, &update.state_diff, block)?;
        apply_mutations(tx, &reverse_diff, block, &mut contracts_trie, false)?;

        for (address, _) in &update.state_diff.deployed_contracts {
            let contract = Contract::open(tx, *address)?;
            contract.purge(tx)?;
            contracts_trie.put(tx, address.as_felt(), Felt::ZERO)?;
        }

        contracts_trie.commit(tx)?;

        let after = global_root(tx)?;
        if after != update.old_root {
            return Err(StateEngineError::mismatched_root(block, update.old_root, after));
        }
        Ok(())
    }

    // ---- StateHistoryReader surface ----

    pub fn class(&self, class_hash: ClassHash) -> Result<Option<DeclaredClass>> {
        let tx = RocksTransaction::new(&self.db);
        ClassStore::get(&tx, class_hash)
    }

    pub fn contract_class_hash(&self, address: Address) -> Result<ClassHash> {
        let tx = RocksTransaction::new(&self.db);
        Contract::open(&tx, address)?.class_hash(&tx)
    }

    pub fn contract_class_hash_at(&self, address: Address, at_block: BlockNumber) -> Result<ClassHash> {
        let tx = RocksTransaction::new(&self.db);
        match HistoryLog::class_hash_after(&tx, address, at_block)? {
            Some(value) => Ok(value),
            None => Contract::open(&tx, address)?.class_hash(&tx),
        }
    }

    pub fn contract_nonce(&self, address: Address) -> Result<Nonce> {
        let tx = RocksTransaction::new(&self.db);
        Contract::open(&tx, address)?.nonce(&tx)
    }

    pub fn contract_nonce_at(&self, address: Address, at_block: BlockNumber) -> Result<Nonce> {
        let tx = RocksTransaction::new(&self.db);
        match HistoryLog::nonce_after(&tx, address, at_block)? {
            Some(value) => Ok(value),
            None => Contract::open(&tx, address)?.nonce(&tx),
        }
    }

    pub fn contract_storage(&self, address: Address, key: StorageKey) -> Result<StorageValue> {
        let tx = RocksTransaction::new(&self.db);
        Contract::open(&tx, address)?.storage(&tx, key)
    }

    pub fn contract_storage_at(
        &self,
        address: Address,
        key: StorageKey,
        at_block: BlockNumber,
    ) -> Result<StorageValue> {
        let tx = RocksTransaction::new(&self.db);
        match HistoryLog::storage_after(&tx, address, key, at_block)? {
            Some(value) => Ok(value),
            None => Contract::open(&tx, address)?.storage(&tx, key),
        }
    }

    pub fn contract_is_already_deployed_at(&self, address: Address, at_block: BlockNumber) -> Result<bool> {
        let tx = RocksTransaction::new(&self.db);
        deployed_at(&tx, address)?.map_or(Ok(false), |height| Ok(height <= at_block))
    }
}

/// The block a contract was deployed at, or `None` if it has never been deployed.
fn deployed_at(tx: &dyn KvTransaction, address: Address) -> Result<Option<BlockNumber>> {
    match tx.get(column::CONTRACT_DEPLOYMENT_HEIGHT, &address.to_be_bytes())? {
        Some(bytes) => {
            let height = BlockNumber::from_be_bytes(
                bytes.as_slice().try_into().map_err(|_| StateEngineError::corruption("deployed_at", "malformed height"))?,
            );
            Ok(Some(height))
        }
        None => Ok(None),
    }
}

/// Rejects a diff entry that mutates a contract not yet deployed as of `block`, per `operation`.
fn require_deployed(tx: &dyn KvTransaction, address: Address, block: BlockNumber, operation: &'static str) -> Result<()> {
    match deployed_at(tx, address)? {
        Some(height) if height <= block => Ok(()),
        _ => Err(StateEngineError::InvalidDiff { address, operation, block }),
    }
}

/// `root = classes_root == 0 ? contracts_root : Poseidon(STATE_VERSION, contracts_root, classes_root)`.
fn global_root(tx: &dyn KvTransaction) -> Result<Felt> {
    let contracts_root = Trie::<PedersenHasher>::open(tx, column::STATE_TRIE)?.root();
    let classes_root = Trie::<PoseidonHasher>::open(tx, column::CLASSES_TRIE)?.root();
    if classes_root == Felt::ZERO {
        Ok(contracts_root)
    } else {
        Ok(Poseidon::hash_array(&[state_version(), contracts_root, classes_root]))
    }
}

fn remove_if_declared_at(tx: &mut dyn KvTransaction, class_hash: ClassHash, block: BlockNumber) -> Result<()> {
    if let Some(declared) = ClassStore::get(tx, class_hash)? {
        if declared.declared_at == block {
            ClassStore::remove(tx, class_hash);
        }
    }
    Ok(())
}

/// Applies replaced-classes, then nonces, then storage diffs, in that fixed order, writing
/// history entries when `log_history` is set. Shared by `Update` (forward, logging on) and
/// `Revert` (reverse diff, logging off).
fn apply_mutations(
    tx: &mut dyn KvTransaction,
    diff: &StateDiff,
    block: BlockNumber,
    contracts_trie: &mut Trie<PedersenHasher>,
    log_history: bool,
) -> Result<()> {
    let mut touched: IndexMap<Address, ()> = IndexMap::new();

    for (address, class_hash) in &diff.replaced_classes {
        require_deployed(tx, *address, block, "replaced_classes")?;
        let contract = Contract::open(tx, *address)?;
        let old = contract.replace(tx, *class_hash)?;
        if log_history {
            HistoryLog::record_class_hash(tx, *address, block, old);
        }
        touched.insert(*address, ());
    }

    for (address, nonce) in &diff.nonces {
        require_deployed(tx, *address, block, "nonces")?;
        let contract = Contract::open(tx, *address)?;
        let old = contract.update_nonce(tx, *nonce)?;
        if log_history {
            HistoryLog::record_nonce(tx, *address, block, old);
        }
        touched.insert(*address, ());
    }

    for (address, slots) in &diff.storage_diffs {
        require_deployed(tx, *address, block, "storage_diffs")?;
        let mut contract = Contract::open(tx, *address)?;
        let ordered: Vec<(StorageKey, StorageValue)> = slots.iter().map(|(k, v)| (*k, *v)).collect();
        let changes = contract.update_storage(tx, &ordered)?;
        for change in changes {
            if log_history {
                HistoryLog::record_storage(tx, *address, change.key, block, change.old_value);
            }
        }
        contract.commit(tx)?;
        touched.insert(*address, ());
    }

    for address in touched.keys() {
        let contract = Contract::open(tx, *address)?;
        let commitment = contract.commitment(tx)?;
        contracts_trie.put(tx, address.as_felt(), commitment)?;
    }

    Ok(())
}

/// Builds the diff that undoes `diff` as applied at `block`: for every mutated slot/nonce/class
/// hash, look up its value as of block `B-1` via the history log, deleting the log entry at
/// block `B` along the way. `B == 0` has no history to fall back to, so every pre-image is zero.
fn build_reverse_diff(tx: &mut dyn KvTransaction, diff: &StateDiff, block: BlockNumber) -> Result<StateDiff> {
    let mut reverse = StateDiff::default();

    for (address, _) in &diff.replaced_classes {
        let pre_image = pre_image_class_hash(tx, *address, block)?;
        HistoryLog::delete_class_hash_at(tx, *address, block);
        reverse.replaced_classes.insert(*address, pre_image);
    }

    for (address, _) in &diff.nonces {
        let pre_image = pre_image_nonce(tx, *address, block)?;
        HistoryLog::delete_nonce_at(tx, *address, block);
        reverse.nonces.insert(*address, pre_image);
    }

    for (address, slots) in &diff.storage_diffs {
        let mut per_address = IndexMap::new();
        for key in slots.keys() {
            let pre_image = pre_image_storage(tx, *address, *key, block)?;
            HistoryLog::delete_storage_at(tx, *address, *key, block);
            per_address.insert(*key, pre_image);
        }
        reverse.storage_diffs.insert(*address, per_address);
    }

    Ok(reverse)
}

fn pre_image_class_hash(tx: &dyn KvTransaction, address: Address, block: BlockNumber) -> Result<ClassHash> {
    if block.is_genesis() {
        return Ok(ClassHash::ZERO);
    }
    match block.prev().and_then(|prev| HistoryLog::class_hash_after(tx, address, prev).transpose()) {
        Some(value) => value,
        None => Contract::open(tx, address)?.class_hash(tx),
    }
}

fn pre_image_nonce(tx: &dyn KvTransaction, address: Address, block: BlockNumber) -> Result<Nonce> {
    if block.is_genesis() {
        return Ok(Nonce::ZERO);
    }
    match block.prev().and_then(|prev| HistoryLog::nonce_after(tx, address, prev).transpose()) {
        Some(value) => value,
        None => Contract::open(tx, address)?.nonce(tx),
    }
}

fn pre_image_storage(tx: &dyn KvTransaction, address: Address, key: StorageKey, block: BlockNumber) -> Result<StorageValue> {
    if block.is_genesis() {
        return Ok(StorageValue::ZERO);
    }
    match block.prev().and_then(|prev| HistoryLog::storage_after(tx, address, key, prev).transpose()) {
        Some(value) => value,
        None => Contract::open(tx, address)?.storage(tx, key),
    }
}

