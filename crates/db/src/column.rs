//! The column family layout: one RocksDB column family per logical bucket.
//!
//! Contract-local data (storage trie nodes, and the history logs) cannot each get their own
//! column family — there would be one per contract address, an unbounded number of CFs. Instead
//! those buckets share one column family and the entity's canonical bytes become a key prefix:
//! the bucket byte is the column family, the entity encoding is the key prefix within it.

pub const STATE_TRIE: &str = "state_trie";
pub const CLASSES_TRIE: &str = "classes_trie";
pub const CONTRACT_STORAGE_TRIE: &str = "contract_storage_trie";
pub const CONTRACT_CLASS_HASH: &str = "contract_class_hash";
pub const CONTRACT_NONCE: &str = "contract_nonce";
pub const CONTRACT_DEPLOYMENT_HEIGHT: &str = "contract_deployment_height";
pub const CLASS: &str = "class";
pub const HISTORY_STORAGE: &str = "history_storage";
pub const HISTORY_NONCE: &str = "history_nonce";
pub const HISTORY_CLASS_HASH: &str = "history_class_hash";

/// Reference counts for trie node bodies, keyed by `bucket name ++ 0x00 ++ node hash`. Node
/// bodies are content-addressed and shared across every trie that happens to hash the same
/// subtree into the same bucket (e.g. two contracts with identical storage), so a node can only
/// be deleted once nothing else still points to it.
pub const TRIE_NODE_REFCOUNT: &str = "trie_node_refcount";

/// All column families the engine needs, for opening the database.
pub const ALL: &[&str] = &[
    STATE_TRIE,
    CLASSES_TRIE,
    CONTRACT_STORAGE_TRIE,
    CONTRACT_CLASS_HASH,
    CONTRACT_NONCE,
    CONTRACT_DEPLOYMENT_HEIGHT,
    CLASS,
    HISTORY_STORAGE,
    HISTORY_NONCE,
    HISTORY_CLASS_HASH,
    TRIE_NODE_REFCOUNT,
];
