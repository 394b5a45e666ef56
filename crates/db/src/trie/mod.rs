//! The sparse Merkle trie: content-addressed nodes with path-compressed edges, lazy
//! hashing buffered until [`Trie::commit`], and a root-key pointer so reading an empty or
//! single-leaf trie costs one KV lookup rather than a walk from an empty spine.
//!
//! Nodes are addressed by hash rather than by position: the root-pointer entry (key = the
//! bucket's bare prefix) stores the current root's hash, and every node body is stored under a
//! key equal to that node's own hash. A child pointer that doesn't resolve to a stored node is
//! corruption, which a position-keyed scheme can't distinguish from "never written" —
//! hash-addressing can, and is also how nodes with the same content (both subtries fully empty,
//! for instance) end up structurally shared. That sharing means node bodies can't be deleted
//! just because one trie stops using them — see [`Trie::purge`]'s reference counting.

pub mod node;

use bitvec::prelude::{BitSlice, Msb0};
use starknet_types_core::felt::Felt;
use std::marker::PhantomData;

use crate::codec::{decode_node, encode_node, felt_from_be_slice, root_pointer_key};
use crate::column;
use crate::error::{Result, StateEngineError};
use crate::kv::KvTransaction;
use node::{path_of, path_to_felt, Node as WireNode, Path, TrieHasher, TRIE_HEIGHT};

/// A child pointer: either a previously-committed subtree known only by its hash, or a node
/// expanded and possibly mutated in memory this session.
#[derive(Clone, Debug)]
enum Child {
    Hash(Felt),
    Node(Box<TrieNode>),
}

#[derive(Clone, Debug)]
enum TrieNode {
    Binary { left: Child, right: Child },
    Edge { path: Path, child: Child },
}

enum Resolved {
    Binary { left: Child, right: Child },
    Edge { path: Path, child: Child },
}

/// A height-251 sparse Merkle trie over one KV bucket, parameterized by its hash function.
pub struct Trie<H: TrieHasher> {
    bucket: &'static str,
    /// The key the root's hash is persisted under. Empty for the two global tries (the bucket's
    /// bare prefix); the requesting address's bytes for a per-contract storage trie, since those
    /// share one column family and node bodies are hash-addressed and already collision-free
    /// across contracts.
    root_key: Vec<u8>,
    root: Child,
    _hasher: PhantomData<H>,
}

impl<H: TrieHasher> Trie<H> {
    /// Opens the global contracts or classes trie at its current committed root.
    pub fn open(tx: &dyn KvTransaction, bucket: &'static str) -> Result<Self> {
        Self::open_at(tx, bucket, root_pointer_key())
    }

    /// Opens a trie whose root pointer lives at `root_key` rather than the bucket's bare prefix
    /// (the per-contract storage trie case).
    pub fn open_at(tx: &dyn KvTransaction, bucket: &'static str, root_key: Vec<u8>) -> Result<Self> {
        let root = match tx.get(bucket, &root_key)? {
            Some(bytes) => Child::Hash(felt_from_be_slice(&bytes)?),
            None => Child::Hash(Felt::ZERO),
        };
        Ok(Self { bucket, root_key, root, _hasher: PhantomData })
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.root, Child::Hash(h) if h == Felt::ZERO)
    }

    /// The trie's current root hash, without touching storage for any part of the tree already
    /// expanded in memory. 0 for an empty trie.
    pub fn root(&self) -> Felt {
        Self::hash_of(&self.root)
    }

    fn hash_of(child: &Child) -> Felt {
        match child {
            Child::Hash(h) => *h,
            Child::Node(n) => match n.as_ref() {
                TrieNode::Binary { left, right } => H::hash(Self::hash_of(left), Self::hash_of(right)),
                TrieNode::Edge { path, child } => {
                    H::hash(Self::hash_of(child), path_to_felt(path)) + Felt::from(path.len() as u64)
                }
            },
        }
    }

    /// `value == Felt::ZERO` deletes the leaf. Returns the value that was present before this
    /// call (`Felt::ZERO` if there was none).
    pub fn put(&mut self, tx: &dyn KvTransaction, key: Felt, value: Felt) -> Result<Felt> {
        let path = path_of(key);
        let root = std::mem::replace(&mut self.root, Child::Hash(Felt::ZERO));
        let (new_root, old) = Self::put_rec(root, tx, self.bucket, &path, value)?;
        self.root = new_root;
        Ok(old)
    }

    pub fn get(&self, tx: &dyn KvTransaction, key: Felt) -> Result<Felt> {
        let path = path_of(key);
        Self::get_rec(&self.root, tx, self.bucket, &path)
    }

    /// Flushes every node expanded in memory to the KV, keyed by its own hash, and re-persists
    /// the root-key pointer (deleting it outright if the trie is now empty, per the data model's
    /// note that `Root() == 0` must mean "missing", not "present and zero"). Idempotent when
    /// nothing changed since the last commit: an already-`Hash` root writes nothing.
    pub fn commit(&mut self, tx: &mut dyn KvTransaction) -> Result<Felt> {
        let root = std::mem::replace(&mut self.root, Child::Hash(Felt::ZERO));
        let root_hash = Self::commit_rec(root, tx, self.bucket)?;
        self.root = Child::Hash(root_hash);
        if root_hash == Felt::ZERO {
            tx.delete(self.bucket, self.root_key.clone());
        } else {
            tx.set(self.bucket, self.root_key.clone(), root_hash.to_bytes_be().to_vec());
        }
        Ok(root_hash)
    }

    fn resolve(child: &Child, tx: &dyn KvTransaction, bucket: &str) -> Result<Option<Resolved>> {
        match child {
            Child::Node(n) => Ok(Some(match n.as_ref() {
                TrieNode::Binary { left, right } => Resolved::Binary { left: left.clone(), right: right.clone() },
                TrieNode::Edge { path, child } => Resolved::Edge { path: path.clone(), child: child.clone() },
            })),
            Child::Hash(h) if *h == Felt::ZERO => Ok(None),
            Child::Hash(h) => {
                let key = h.to_bytes_be().to_vec();
                let bytes = tx.get(bucket, &key)?.ok_or_else(|| {
                    StateEngineError::corruption("trie::resolve", format!("dangling node hash {h:#x}"))
                })?;
                #[cfg(feature = "trace-nodes")]
                tracing::trace!(bucket, hash = %h, "resolved trie node from storage");
                Ok(Some(match decode_node(&bytes)? {
                    WireNode::Binary { left_hash, right_hash } => {
                        Resolved::Binary { left: Child::Hash(left_hash), right: Child::Hash(right_hash) }
                    }
                    WireNode::Edge { path, child_hash } => Resolved::Edge { path, child: Child::Hash(child_hash) },
                }))
            }
        }
    }

    fn get_rec(
        child: &Child,
        tx: &dyn KvTransaction,
        bucket: &str,
        remaining: &BitSlice<u8, Msb0>,
    ) -> Result<Felt> {
        if remaining.is_empty() {
            return match child {
                Child::Hash(v) => Ok(*v),
                Child::Node(_) => Err(StateEngineError::corruption("trie::get", "node found at leaf depth")),
            };
        }
        match Self::resolve(child, tx, bucket)? {
            None => Ok(Felt::ZERO),
            Some(Resolved::Binary { left, right }) => {
                let (bit, rest) = (remaining[0], &remaining[1..]);
                if !bit { Self::get_rec(&left, tx, bucket, rest) } else { Self::get_rec(&right, tx, bucket, rest) }
            }
            Some(Resolved::Edge { path, child }) => {
                if remaining.len() < path.len() || remaining[..path.len()] != path[..] {
                    return Ok(Felt::ZERO);
                }
                Self::get_rec(&child, tx, bucket, &remaining[path.len()..])
            }
        }
    }

    fn put_rec(
        child: Child,
        tx: &dyn KvTransaction,
        bucket: &str,
        remaining: &BitSlice<u8, Msb0>,
        value: Felt,
    ) -> Result<(Child, Felt)> {
        if remaining.is_empty() {
            let old = match &child {
                Child::Hash(v) => *v,
                Child::Node(_) => return Err(StateEngineError::corruption("trie::put", "node found at leaf depth")),
            };
            return Ok((Child::Hash(value), old));
        }

        match Self::resolve(&child, tx, bucket)? {
            None => {
                if value == Felt::ZERO {
                    return Ok((Child::Hash(Felt::ZERO), Felt::ZERO));
                }
                let edge = TrieNode::Edge { path: remaining.to_bitvec(), child: Child::Hash(value) };
                Ok((Child::Node(Box::new(edge)), Felt::ZERO))
            }
            Some(Resolved::Binary { left, right }) => {
                let rest = &remaining[1..];
                let (new_left, new_right, old) = if !remaining[0] {
                    let (nl, old) = Self::put_rec(left, tx, bucket, rest, value)?;
                    (nl, right, old)
                } else {
                    let (nr, old) = Self::put_rec(right, tx, bucket, rest, value)?;
                    (left, nr, old)
                };
                let both_empty = matches!(new_left, Child::Hash(h) if h == Felt::ZERO)
                    && matches!(new_right, Child::Hash(h) if h == Felt::ZERO);
                if both_empty {
                    Ok((Child::Hash(Felt::ZERO), old))
                } else {
                    Ok((Child::Node(Box::new(TrieNode::Binary { left: new_left, right: new_right })), old))
                }
            }
            Some(Resolved::Edge { path, child: edge_child }) => {
                let shared = path.len().min(remaining.len());
                let common = common_prefix_len(&path, &remaining[..shared]);
                if common == path.len() {
                    let (new_child, old) = Self::put_rec(edge_child, tx, bucket, &remaining[path.len()..], value)?;
                    if matches!(new_child, Child::Hash(h) if h == Felt::ZERO) {
                        Ok((Child::Hash(Felt::ZERO), old))
                    } else {
                        Ok((Child::Node(Box::new(TrieNode::Edge { path, child: new_child })), old))
                    }
                } else if value == Felt::ZERO {
                    // Deleting a key whose path diverges from this edge: it was never present.
                    Ok((Child::Node(Box::new(TrieNode::Edge { path, child: edge_child })), Felt::ZERO))
                } else {
                    Ok((split_edge(path, edge_child, remaining, value), Felt::ZERO))
                }
            }
        }
    }

    fn commit_rec(child: Child, tx: &mut dyn KvTransaction, bucket: &str) -> Result<Felt> {
        let node = match child {
            Child::Hash(h) => return Ok(h),
            Child::Node(n) => *n,
        };
        let (wire, hash) = match node {
            TrieNode::Binary { left, right } => {
                let left_hash = Self::commit_rec(left, tx, bucket)?;
                let right_hash = Self::commit_rec(right, tx, bucket)?;
                (WireNode::Binary { left_hash, right_hash }, H::hash(left_hash, right_hash))
            }
            TrieNode::Edge { path, child } => {
                let child_hash = Self::commit_rec(child, tx, bucket)?;
                let hash = H::hash(child_hash, path_to_felt(&path)) + Felt::from(path.len() as u64);
                (WireNode::Edge { path, child_hash }, hash)
            }
        };
        #[cfg(feature = "trace-nodes")]
        tracing::trace!(bucket, hasher = H::name(), hash = %hash, "writing trie node");
        tx.set(bucket, hash.to_bytes_be().to_vec(), encode_node(&wire));
        bump_refcount(tx, bucket, hash)?;
        Ok(hash)
    }

    /// Deletes every node reachable from the trie's current committed root, then its root
    /// pointer — the counterpart to [`Trie::commit`] used to undo a deploy on revert.
    ///
    /// Node bodies are content-addressed and shared across every trie hashing into the same
    /// bucket, so a node already open elsewhere (e.g. another contract's storage happens to share
    /// a subtree) can't simply be deleted because this trie no longer needs it: each node carries
    /// a reference count, bumped once per [`Trie::commit_rec`] write, and `purge` only deletes a
    /// node body once its count drops to zero, otherwise it just decrements and stops without
    /// recursing into that node's children (something else still holds them alive too).
    ///
    /// This only accounts for references created by `commit`: a plain storage write that
    /// overwrites a key back to a value already in the trie elsewhere doesn't bump anything, so a
    /// node's count can end up higher than the number of *live* referents. That's a conservative
    /// leak, never a false deletion — a node can be kept around longer than strictly necessary,
    /// but `purge` will never delete a node another live root still depends on.
    pub fn purge(self, tx: &mut dyn KvTransaction) -> Result<()> {
        let root_hash = match self.root {
            Child::Hash(h) => h,
            Child::Node(_) => {
                return Err(StateEngineError::corruption(
                    "trie::purge",
                    "cannot purge a trie with uncommitted in-memory writes",
                ))
            }
        };
        tx.delete(self.bucket, self.root_key.clone());

        let mut stack = vec![root_hash];
        while let Some(hash) = stack.pop() {
            if hash == Felt::ZERO {
                continue;
            }
            let key = hash.to_bytes_be().to_vec();
            let Some(bytes) = tx.get(self.bucket, &key)? else { continue };

            let rc_key = refcount_key(self.bucket, hash);
            let count = read_refcount(tx, &rc_key)?;
            if count > 1 {
                tx.set(column::TRIE_NODE_REFCOUNT, rc_key, (count - 1).to_be_bytes().to_vec());
                continue;
            }

            tx.delete(self.bucket, key);
            tx.delete(column::TRIE_NODE_REFCOUNT, rc_key);
            match decode_node(&bytes)? {
                WireNode::Binary { left_hash, right_hash } => {
                    stack.push(left_hash);
                    stack.push(right_hash);
                }
                WireNode::Edge { child_hash, .. } => {
                    // At a leaf edge `child_hash` is the raw stored value rather than a node
                    // hash; the lookup above just won't find an entry for it and the loop moves
                    // on without recursing.
                    stack.push(child_hash);
                }
            }
        }
        Ok(())
    }
}

fn refcount_key(bucket: &str, hash: Felt) -> Vec<u8> {
    let mut key = Vec::with_capacity(bucket.len() + 1 + 32);
    key.extend_from_slice(bucket.as_bytes());
    key.push(0);
    key.extend_from_slice(&hash.to_bytes_be());
    key
}

fn read_refcount(tx: &dyn KvTransaction, rc_key: &[u8]) -> Result<u64> {
    match tx.get(column::TRIE_NODE_REFCOUNT, rc_key)? {
        None => Ok(0),
        Some(bytes) => {
            let array: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                StateEngineError::corruption("trie::refcount", "refcount record has wrong length")
            })?;
            Ok(u64::from_be_bytes(array))
        }
    }
}

fn bump_refcount(tx: &mut dyn KvTransaction, bucket: &str, hash: Felt) -> Result<()> {
    let rc_key = refcount_key(bucket, hash);
    let count = read_refcount(tx, &rc_key)?;
    tx.set(column::TRIE_NODE_REFCOUNT, rc_key, (count + 1).to_be_bytes().to_vec());
    Ok(())
}

/// Splits an edge whose path diverges from `remaining` at `common_prefix_len` bits, inserting a
/// new leaf. Produces a `Binary` at the divergence point, wrapped in a shorter edge if the shared
/// prefix is non-empty.
fn split_edge(path: Path, edge_child: Child, remaining: &BitSlice<u8, Msb0>, value: Felt) -> Child {
    let shared = path.len().min(remaining.len());
    let common = common_prefix_len(&path, &remaining[..shared]);

    let old_bit = path[common];
    let new_bit = remaining[common];
    debug_assert_ne!(old_bit, new_bit, "split_edge called on a non-diverging prefix");

    let old_suffix = path[common + 1..].to_bitvec();
    let new_suffix = remaining[common + 1..].to_bitvec();

    let old_branch = if old_suffix.is_empty() {
        edge_child
    } else {
        Child::Node(Box::new(TrieNode::Edge { path: old_suffix, child: edge_child }))
    };
    let new_branch = if new_suffix.is_empty() {
        Child::Hash(value)
    } else {
        Child::Node(Box::new(TrieNode::Edge { path: new_suffix, child: Child::Hash(value) }))
    };

    let (left, right) = if !old_bit { (old_branch, new_branch) } else { (new_branch, old_branch) };
    let binary = TrieNode::Binary { left, right };

    if common == 0 {
        Child::Node(Box::new(binary))
    } else {
        Child::Node(Box::new(TrieNode::Edge { path: path[..common].to_bitvec(), child: Child::Node(Box::new(binary)) }))
    }
}

fn common_prefix_len(a: &BitSlice<u8, Msb0>, b: &BitSlice<u8, Msb0>) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

#[cfg(test)]
mod tests {
    use super::node::PedersenHasher;
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
    fn empty_trie_has_zero_root() {
        let (_dir, db) = open_db();
        let tx = RocksTransaction::new(&db);
        let trie = Trie::<PedersenHasher>::open(&tx, crate::column::STATE_TRIE).unwrap();
        assert!(trie.is_empty());
        assert_eq!(trie.root(), Felt::ZERO);
    }

    #[test]
    fn single_put_then_get_round_trips() {
        let (_dir, db) = open_db();
        let mut tx = RocksTransaction::new(&db);
        let mut trie = Trie::<PedersenHasher>::open(&tx, crate::column::STATE_TRIE).unwrap();

        let key = Felt::from(0x1u64);
        let value = Felt::from(0x7u64);
        let old = trie.put(&tx, key, value).unwrap();
        assert_eq!(old, Felt::ZERO);
        assert_eq!(trie.get(&tx, key).unwrap(), value);

        let root = trie.commit(&mut tx).unwrap();
        assert_ne!(root, Felt::ZERO);
        tx.commit().unwrap();

        let tx2 = RocksTransaction::new(&db);
        let trie2 = Trie::<PedersenHasher>::open(&tx2, crate::column::STATE_TRIE).unwrap();
        assert_eq!(trie2.root(), root);
        assert_eq!(trie2.get(&tx2, key).unwrap(), value);
    }

    #[test]
    fn delete_collapses_back_to_empty() {
        let (_dir, db) = open_db();
        let mut tx = RocksTransaction::new(&db);
        let mut trie = Trie::<PedersenHasher>::open(&tx, crate::column::STATE_TRIE).unwrap();

        let key = Felt::from(0x42u64);
        trie.put(&tx, key, Felt::from(0x5u64)).unwrap();
        trie.commit(&mut tx).unwrap();

        trie.put(&tx, key, Felt::ZERO).unwrap();
        let root = trie.commit(&mut tx).unwrap();

        assert_eq!(root, Felt::ZERO);
        assert!(trie.is_empty());
    }

    #[test]
    fn two_diverging_keys_split_into_a_binary_node() {
        let (_dir, db) = open_db();
        let mut tx = RocksTransaction::new(&db);
        let mut trie = Trie::<PedersenHasher>::open(&tx, crate::column::STATE_TRIE).unwrap();

        trie.put(&tx, Felt::from(0x1u64), Felt::from(11u64)).unwrap();
        trie.put(&tx, Felt::from(0x2u64), Felt::from(22u64)).unwrap();

        assert_eq!(trie.get(&tx, Felt::from(0x1u64)).unwrap(), Felt::from(11u64));
        assert_eq!(trie.get(&tx, Felt::from(0x2u64)).unwrap(), Felt::from(22u64));

        let root = trie.commit(&mut tx).unwrap();
        assert_ne!(root, Felt::ZERO);
    }
}
