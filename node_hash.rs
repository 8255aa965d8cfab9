//! Child references: either a 32-byte Keccak hash of a node's RLP encoding,
//! or the RLP encoding itself when it is shorter than 32 bytes (an "inline"
//! or "embedded" child, see spec §3 "Child reference").

use ethereum_types::H256;
use sha3::{Digest, Keccak256};
use smallvec::SmallVec;

use crate::error::TrieError;

/// Below this many bytes an RLP-encoded node is embedded directly as a
/// child reference rather than hashed; the root of a trie is always hashed
/// regardless of its encoded size.
pub const INLINE_THRESHOLD: usize = 32;

/// A reference to a child (or root) node: either its content hash, or the
/// node's own encoding when that encoding is under [`INLINE_THRESHOLD`]
/// bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeHash {
    Hashed(H256),
    Inline(SmallVec<[u8; 31]>),
}

impl NodeHash {
    /// Hashes or embeds `encoded` depending on its length. `force_hash`
    /// must be set for the trie root, which is always addressed by hash.
    pub fn from_encoded(encoded: &[u8], force_hash: bool) -> Self {
        if !force_hash && encoded.len() < INLINE_THRESHOLD {
            NodeHash::Inline(SmallVec::from_slice(encoded))
        } else {
            NodeHash::Hashed(keccak(encoded))
        }
    }

    pub fn is_inline(&self) -> bool {
        matches!(self, NodeHash::Inline(_))
    }

    /// The 32-byte hash, if this is a [`NodeHash::Hashed`] reference.
    pub fn as_hash(&self) -> Option<H256> {
        match self {
            NodeHash::Hashed(hash) => Some(*hash),
            NodeHash::Inline(_) => None,
        }
    }

    /// The raw bytes used to address this node in the backing store: the
    /// hash bytes if hashed, or the inline encoding itself.
    pub fn as_store_key(&self) -> &[u8] {
        match self {
            NodeHash::Hashed(hash) => hash.as_bytes(),
            NodeHash::Inline(bytes) => bytes,
        }
    }

    /// Decodes the RLP item produced when a child reference sits inside a
    /// parent node's encoding: a 32-byte string is a hash, anything shorter
    /// is an inline node encoding, and anything else is malformed.
    pub fn decode_child(rlp: &[u8]) -> Result<Self, TrieError> {
        match rlp.len() {
            32 => Ok(NodeHash::Hashed(H256::from_slice(rlp))),
            0..=31 => Ok(NodeHash::Inline(SmallVec::from_slice(rlp))),
            other => Err(TrieError::InvalidHashLength(other)),
        }
    }
}

impl From<H256> for NodeHash {
    fn from(hash: H256) -> Self {
        NodeHash::Hashed(hash)
    }
}

pub fn keccak(data: &[u8]) -> H256 {
    H256::from_slice(Keccak256::new().chain_update(data).finalize().as_slice())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_encoding_is_inline() {
        let encoded = vec![1, 2, 3];
        assert!(matches!(
            NodeHash::from_encoded(&encoded, false),
            NodeHash::Inline(_)
        ));
    }

    #[test]
    fn long_encoding_is_hashed() {
        let encoded = vec![0u8; 64];
        assert!(matches!(
            NodeHash::from_encoded(&encoded, false),
            NodeHash::Hashed(_)
        ));
    }

    #[test]
    fn root_is_always_hashed() {
        let encoded = vec![1, 2, 3];
        assert!(matches!(
            NodeHash::from_encoded(&encoded, true),
            NodeHash::Hashed(_)
        ));
    }

    #[test]
    fn decode_child_rejects_bad_length() {
        let bad = vec![0u8; 40];
        assert!(matches!(
            NodeHash::decode_child(&bad),
            Err(TrieError::InvalidHashLength(40))
        ));
    }
}
