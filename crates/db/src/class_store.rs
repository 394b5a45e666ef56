//! The class store: declared classes keyed by class hash, immutable once written.

use sse_primitives::{BlockNumber, Class, ClassHash, DeclaredClass};

use crate::codec::{decode_bincode, encode_bincode};
use crate::column;
use crate::error::Result;
use crate::kv::KvTransaction;

pub struct ClassStore;

impl ClassStore {
    pub fn get(tx: &dyn KvTransaction, class_hash: ClassHash) -> Result<Option<DeclaredClass>> {
        match tx.get(column::CLASS, &class_hash.to_be_bytes())? {
            Some(bytes) => Ok(Some(decode_bincode("class_store::get", &bytes)?)),
            None => Ok(None),
        }
    }

    pub fn is_declared(tx: &dyn KvTransaction, class_hash: ClassHash) -> Result<bool> {
        Ok(tx.get(column::CLASS, &class_hash.to_be_bytes())?.is_some())
    }

    /// First-writer-wins insert: a class hash already present is left untouched, its recorded
    /// declaration block is never overwritten. Returns whether this call actually inserted a new
    /// entry.
    pub fn declare_if_absent(
        tx: &mut dyn KvTransaction,
        class_hash: ClassHash,
        declared_at: BlockNumber,
        class: Class,
    ) -> Result<bool> {
        if Self::is_declared(tx, class_hash)? {
            return Ok(false);
        }
        let record = DeclaredClass { declared_at, class };
        let bytes = encode_bincode("class_store::declare_if_absent", &record)?;
        tx.set(column::CLASS, class_hash.to_be_bytes().to_vec(), bytes);
        Ok(true)
    }

    /// Reverts a declaration made at `block`, per Revert step 2. The caller is responsible for
    /// only calling this for classes whose recorded `declared_at` equals `block`.
    pub fn remove(tx: &mut dyn KvTransaction, class_hash: ClassHash) {
        tx.delete(column::CLASS, class_hash.to_be_bytes().to_vec());
    }
}
