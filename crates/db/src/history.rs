//! The history log: for every storage slot, nonce, and class-hash mutation at block `B`,
//! records the pre-image — the value in effect during block `B-1` — keyed so a scan forward from
//! any block finds the next logged change.
//!
//! History never holds the *current* value; `*_after` returns `None` when nothing was logged
//! after `at_block`, and the caller (the `State` orchestrator, which owns the live KV reads) falls
//! back to the live value in that case.

use sse_primitives::{Address, BlockNumber, ClassHash, Nonce, StorageKey, StorageValue};

use crate::column;
use crate::error::{Result, StateEngineError};
use crate::kv::KvTransaction;

fn storage_key(address: Address, key: StorageKey, block: BlockNumber) -> Vec<u8> {
    let mut buf = Vec::with_capacity(72);
    buf.extend_from_slice(&address.to_be_bytes());
    buf.extend_from_slice(&key.to_be_bytes());
    buf.extend_from_slice(&block.to_be_bytes());
    buf
}

fn storage_prefix(address: Address, key: StorageKey) -> Vec<u8> {
    let mut buf = Vec::with_capacity(64);
    buf.extend_from_slice(&address.to_be_bytes());
    buf.extend_from_slice(&key.to_be_bytes());
    buf
}

fn scalar_key(address: Address, block: BlockNumber) -> Vec<u8> {
    let mut buf = Vec::with_capacity(40);
    buf.extend_from_slice(&address.to_be_bytes());
    buf.extend_from_slice(&block.to_be_bytes());
    buf
}

fn scalar_prefix(address: Address) -> Vec<u8> {
    address.to_be_bytes().to_vec()
}

/// Finds the entry with the smallest block strictly greater than `at_block` among `entries`
/// (already sorted ascending by full key, which sorts by block ascending since every entry shares
/// the same prefix). Returns its decoded value.
fn first_after<T>(
    entries: Vec<(Vec<u8>, Vec<u8>)>,
    at_block: BlockNumber,
    decode: impl Fn(&[u8]) -> Result<T>,
) -> Result<Option<T>> {
    for (key, value) in entries {
        if key.len() < 8 {
            return Err(StateEngineError::corruption("history::first_after", "key shorter than block suffix"));
        }
        let block_bytes: [u8; 8] = key[key.len() - 8..].try_into().unwrap();
        let block = BlockNumber::from_be_bytes(block_bytes);
        if block > at_block {
            return Ok(Some(decode(&value)?));
        }
    }
    Ok(None)
}

pub struct HistoryLog;

impl HistoryLog {
    pub fn record_storage(
        tx: &mut dyn KvTransaction,
        address: Address,
        key: StorageKey,
        block: BlockNumber,
        pre_image: StorageValue,
    ) {
        tx.set(column::HISTORY_STORAGE, storage_key(address, key, block), pre_image.to_be_bytes().to_vec());
    }

    pub fn record_nonce(tx: &mut dyn KvTransaction, address: Address, block: BlockNumber, pre_image: Nonce) {
        tx.set(column::HISTORY_NONCE, scalar_key(address, block), pre_image.to_be_bytes().to_vec());
    }

    pub fn record_class_hash(tx: &mut dyn KvTransaction, address: Address, block: BlockNumber, pre_image: ClassHash) {
        tx.set(column::HISTORY_CLASS_HASH, scalar_key(address, block), pre_image.to_be_bytes().to_vec());
    }

    pub fn storage_after(
        tx: &dyn KvTransaction,
        address: Address,
        key: StorageKey,
        at_block: BlockNumber,
    ) -> Result<Option<StorageValue>> {
        let entries = tx.iterate_with_prefix(column::HISTORY_STORAGE, &storage_prefix(address, key))?;
        first_after(entries, at_block, |bytes| Ok(StorageValue::from_be_bytes(array32(bytes)?)))
    }

    pub fn nonce_after(tx: &dyn KvTransaction, address: Address, at_block: BlockNumber) -> Result<Option<Nonce>> {
        let entries = tx.iterate_with_prefix(column::HISTORY_NONCE, &scalar_prefix(address))?;
        first_after(entries, at_block, |bytes| Ok(Nonce::from_be_bytes(array32(bytes)?)))
    }

    pub fn class_hash_after(
        tx: &dyn KvTransaction,
        address: Address,
        at_block: BlockNumber,
    ) -> Result<Option<ClassHash>> {
        let entries = tx.iterate_with_prefix(column::HISTORY_CLASS_HASH, &scalar_prefix(address))?;
        first_after(entries, at_block, |bytes| Ok(ClassHash::from_be_bytes(array32(bytes)?)))
    }

    /// Deletes every log entry recorded at exactly `block`, for the given (address, key) (or
    /// address, for the scalar logs), per the Revert protocol's step 4.
    pub fn delete_storage_at(tx: &mut dyn KvTransaction, address: Address, key: StorageKey, block: BlockNumber) {
        tx.delete(column::HISTORY_STORAGE, storage_key(address, key, block));
    }

    pub fn delete_nonce_at(tx: &mut dyn KvTransaction, address: Address, block: BlockNumber) {
        tx.delete(column::HISTORY_NONCE, scalar_key(address, block));
    }

    pub fn delete_class_hash_at(tx: &mut dyn KvTransaction, address: Address, block: BlockNumber) {
        tx.delete(column::HISTORY_CLASS_HASH, scalar_key(address, block));
    }
}

fn array32(bytes: &[u8]) -> Result<[u8; 32]> {
    bytes
        .try_into()
        .map_err(|_| StateEngineError::corruption("history::array32", "expected 32-byte scalar"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::RocksTransaction;

    fn open_db() -> (tempfile::TempDir, rocksdb::DB) {
        let dir = tempfile::tempdir().unwrap();
        let mut opts = rocksdb::Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        let db = rocksdb::DB::open_cf(&opts, dir.path(), crate::column::ALL).unwrap();
        (dir, db)
    }

    #[test]
    fn storage_after_finds_the_next_logged_block() {
        let (_dir, db) = open_db();
        let mut tx = RocksTransaction::new(&db);
        let addr = Address::from(0x1u64);
        let key = StorageKey::from(0xAu64);

        HistoryLog::record_storage(&mut tx, addr, key, BlockNumber::from(2), StorageValue::from(0x7u64));
        HistoryLog::record_storage(&mut tx, addr, key, BlockNumber::from(5), StorageValue::from(0x9u64));

        assert_eq!(
            HistoryLog::storage_after(&tx, addr, key, BlockNumber::from(1)).unwrap(),
            Some(StorageValue::from(0x7u64))
        );
        assert_eq!(
            HistoryLog::storage_after(&tx, addr, key, BlockNumber::from(2)).unwrap(),
            Some(StorageValue::from(0x9u64))
        );
        assert_eq!(HistoryLog::storage_after(&tx, addr, key, BlockNumber::from(5)).unwrap(), None);
    }

    #[test]
    fn delete_at_block_removes_only_that_entry() {
        let (_dir, db) = open_db();
        let mut tx = RocksTransaction::new(&db);
        let addr = Address::from(0x1u64);

        HistoryLog::record_nonce(&mut tx, addr, BlockNumber::from(3), Nonce::from(1u64));
        HistoryLog::delete_nonce_at(&mut tx, addr, BlockNumber::from(3));

        assert_eq!(HistoryLog::nonce_after(&tx, addr, BlockNumber::from(0)).unwrap(), None);
    }
}
