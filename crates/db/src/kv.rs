//! The KV transaction abstraction the engine consumes: `get`/`set`/`delete`/
//! `iterate_with_prefix` under a bucketed keyspace, with the transaction object owning
//! commit/rollback so the engine never commits directly.
//!
//! [`RocksTransaction`] buffers every write in memory and flushes it as a single
//! [`rocksdb::WriteBatch`] on [`RocksTransaction::commit`]. Reads check the overlay before
//! falling through to the database, giving read-your-own-writes within one `Update`/`Revert`
//! without needing RocksDB's own transactional API. Rollback is simply dropping the
//! transaction: the database was never touched, so no write is ever externally visible on
//! failure.

use std::collections::BTreeMap;

use rocksdb::{WriteBatch, WriteOptions, DB};

use crate::error::{Result, StateEngineError};

/// Bucketed, transactional access to the underlying key-value store. The engine is generic over
/// this trait rather than tied to [`RocksTransaction`] directly, so tests can swap in a plain
/// in-memory fake.
pub trait KvTransaction {
    fn get(&self, bucket: &str, key: &[u8]) -> Result<Option<Vec<u8>>>;
    fn set(&mut self, bucket: &str, key: Vec<u8>, value: Vec<u8>);
    fn delete(&mut self, bucket: &str, key: Vec<u8>);
    /// All entries whose key starts with `prefix`, in byte-lexicographic key order.
    fn iterate_with_prefix(&self, bucket: &str, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;
}

type Overlay = BTreeMap<(String, Vec<u8>), Option<Vec<u8>>>;

/// A single `Update` or `Revert` call's worth of buffered writes over a RocksDB handle.
pub struct RocksTransaction<'db> {
    db: &'db DB,
    overlay: Overlay,
}

impl<'db> RocksTransaction<'db> {
    pub fn new(db: &'db DB) -> Self {
        Self { db, overlay: BTreeMap::new() }
    }

    fn cf(&self, bucket: &str) -> Result<rocksdb::ColumnFamilyRef<'_>> {
        self.db
            .cf_handle(bucket)
            .ok_or_else(|| StateEngineError::corruption("kv::cf", format!("unknown column family {bucket}")))
    }

    /// Flush the buffered overlay to the database as one atomic write batch. Consumes `self`:
    /// once committed, a transaction cannot be reused or rolled back.
    pub fn commit(self) -> Result<()> {
        if self.overlay.is_empty() {
            return Ok(());
        }
        let mut batch = WriteBatch::default();
        for ((bucket, key), value) in &self.overlay {
            let cf = self
                .db
                .cf_handle(bucket)
                .ok_or_else(|| StateEngineError::corruption("kv::commit", format!("unknown column family {bucket}")))?;
            match value {
                Some(v) => batch.put_cf(&cf, key, v),
                None => batch.delete_cf(&cf, key),
            }
        }
        let mut opts = WriteOptions::new();
        opts.set_sync(false);
        self.db.write_opt(batch, &opts)?;
        Ok(())
    }
}

impl<'db> KvTransaction for RocksTransaction<'db> {
    fn get(&self, bucket: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if let Some(overlaid) = self.overlay.get(&(bucket.to_string(), key.to_vec())) {
            return Ok(overlaid.clone());
        }
        let cf = self.cf(bucket)?;
        Ok(self.db.get_cf(&cf, key)?)
    }

    fn set(&mut self, bucket: &str, key: Vec<u8>, value: Vec<u8>) {
        self.overlay.insert((bucket.to_string(), key), Some(value));
    }

    fn delete(&mut self, bucket: &str, key: Vec<u8>) {
        self.overlay.insert((bucket.to_string(), key), None);
    }

    fn iterate_with_prefix(&self, bucket: &str, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let cf = self.cf(bucket)?;
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();

        let mode = rocksdb::IteratorMode::From(prefix, rocksdb::Direction::Forward);
        for item in self.db.iterator_cf(&cf, mode) {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            merged.insert(key.to_vec(), value.to_vec());
        }

        for ((overlay_bucket, key), value) in &self.overlay {
            if overlay_bucket != bucket || !key.starts_with(prefix) {
                continue;
            }
            match value {
                Some(v) => {
                    merged.insert(key.clone(), v.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }

        Ok(merged.into_iter().collect())
    }
}
