//! Byte encodings for everything that crosses the KV boundary: trie node locations and bodies,
//! and the bincode wrapper used for [`sse_primitives::DeclaredClass`].
//!
//! Felt-keyed scalars (class hash, nonce, address) use the big-endian codec on their own newtype
//! (`to_be_bytes`/`from_be_bytes`) rather than anything here, since that's already canonical and
//! lexicographically ordered.

use bitvec::prelude::{BitVec, Msb0};
use starknet_types_core::felt::Felt;

use crate::error::{Result, StateEngineError};
use crate::trie::node::{Node, Path};

/// The root-pointer entry's key within a trie's bucket: the bucket prefix with no suffix at all.
pub fn root_pointer_key() -> Vec<u8> {
    Vec::new()
}

/// Encodes a node's storage-location path as `[u16 bit length BE][packed MSB-first bytes]`.
pub fn encode_path(path: &Path) -> Vec<u8> {
    let len = path.len() as u16;
    let mut buf = Vec::with_capacity(2 + path.as_raw_slice().len());
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(path.as_raw_slice());
    buf
}

pub fn decode_path(bytes: &[u8]) -> Result<Path> {
    if bytes.len() < 2 {
        return Err(StateEngineError::corruption("codec::decode_path", "key shorter than length prefix"));
    }
    let bit_len = u16::from_be_bytes([bytes[0], bytes[1]]) as usize;
    let mut bits = BitVec::<u8, Msb0>::from_slice(&bytes[2..]);
    if bit_len > bits.len() {
        return Err(StateEngineError::corruption("codec::decode_path", "length prefix exceeds packed bytes"));
    }
    bits.truncate(bit_len);
    Ok(bits)
}

const TAG_BINARY: u8 = 0;
const TAG_EDGE: u8 = 1;

/// Serializes a node body: tag byte, then variant-specific fields. Both hashes/child hashes are
/// canonical 32-byte big-endian Felts.
pub fn encode_node(node: &Node) -> Vec<u8> {
    match node {
        Node::Binary { left_hash, right_hash } => {
            let mut buf = Vec::with_capacity(1 + 64);
            buf.push(TAG_BINARY);
            buf.extend_from_slice(&left_hash.to_bytes_be());
            buf.extend_from_slice(&right_hash.to_bytes_be());
            buf
        }
        Node::Edge { path, child_hash } => {
            let path_bytes = encode_path(path);
            let mut buf = Vec::with_capacity(1 + path_bytes.len() + 32);
            buf.push(TAG_EDGE);
            buf.extend_from_slice(&path_bytes);
            buf.extend_from_slice(&child_hash.to_bytes_be());
            buf
        }
    }
}

pub fn decode_node(bytes: &[u8]) -> Result<Node> {
    let (&tag, rest) = bytes
        .split_first()
        .ok_or_else(|| StateEngineError::corruption("codec::decode_node", "empty node record"))?;
    match tag {
        TAG_BINARY => {
            if rest.len() != 64 {
                return Err(StateEngineError::corruption("codec::decode_node", "binary record has wrong length"));
            }
            let left_hash = felt_from_be_slice(&rest[0..32])?;
            let right_hash = felt_from_be_slice(&rest[32..64])?;
            Ok(Node::Binary { left_hash, right_hash })
        }
        TAG_EDGE => {
            if rest.len() < 32 {
                return Err(StateEngineError::corruption("codec::decode_node", "edge record missing child hash"));
            }
            let (path_bytes, hash_bytes) = rest.split_at(rest.len() - 32);
            let path = decode_path(path_bytes)?;
            let child_hash = felt_from_be_slice(hash_bytes)?;
            Ok(Node::Edge { path, child_hash })
        }
        other => Err(StateEngineError::corruption("codec::decode_node", format!("unknown node tag {other}"))),
    }
}

pub(crate) fn felt_from_be_slice(bytes: &[u8]) -> Result<Felt> {
    let array: [u8; 32] = bytes
        .try_into()
        .map_err(|_| StateEngineError::corruption("codec::felt_from_be_slice", "expected 32 bytes"))?;
    Ok(Felt::from_bytes_be(&array))
}

/// Encodes a bincode-compatible value for storage (used for [`sse_primitives::DeclaredClass`]).
pub fn encode_bincode<T: serde::Serialize>(context: &'static str, value: &T) -> Result<Vec<u8>> {
    bincode::serialize(value).map_err(|e| StateEngineError::codec(context, e))
}

pub fn decode_bincode<T: serde::de::DeserializeOwned>(context: &'static str, bytes: &[u8]) -> Result<T> {
    bincode::deserialize(bytes).map_err(|e| StateEngineError::codec(context, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trie::node::path_of;

    #[test]
    fn path_codec_round_trips() {
        let path = path_of(Felt::from(0xDEADBEEFu64));
        let encoded = encode_path(&path);
        assert_eq!(decode_path(&encoded).unwrap(), path);
    }

    #[test]
    fn node_codec_round_trips_both_variants() {
        let binary = Node::Binary { left_hash: Felt::from(1u64), right_hash: Felt::from(2u64) };
        assert_eq!(decode_node(&encode_node(&binary)).unwrap(), binary);

        let edge = Node::Edge { path: path_of(Felt::from(7u64)), child_hash: Felt::from(9u64) };
        assert_eq!(decode_node(&encode_node(&edge)).unwrap(), edge);
    }
}
