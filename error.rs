use ethereum_types::H256;
use thiserror::Error;

use crate::nibbles::Nibbles;
use crate::node_hash::NodeHash;
use crate::traversal::HexaryTrieNode;

/// Errors produced by the hexary trie engine, its traversal/proof machinery,
/// the fog tracker, and the binary trie / sparse Merkle tree variants.
#[derive(Debug, Error)]
pub enum TrieError {
    #[error(transparent)]
    RlpDecode(#[from] rlp::DecoderError),

    #[error("invalid node payload: expected 0, 2 or 17 RLP items, found shape that decodes to neither")]
    InvalidNode,

    #[error("nibble sequence has odd length and cannot be converted back to bytes")]
    InvalidNibbles,

    #[error("node hash must be exactly 32 bytes, got {0}")]
    InvalidHashLength(usize),

    #[error(
        "missing trie node: hash {missing_hash:#x} referenced from root {root_hash:#x} while looking up key prefix {prefix:?}"
    )]
    MissingTrieNode {
        missing_hash: H256,
        root_hash: H256,
        key: Option<Vec<u8>>,
        prefix: Nibbles,
    },

    #[error(
        "missing traversal node: hash {missing_hash:#x} referenced from root {root_hash:#x} while traversing prefix {prefix:?}"
    )]
    MissingTraversalNode {
        missing_hash: H256,
        root_hash: H256,
        prefix: Nibbles,
    },

    #[error(
        "traversal ended inside a leaf/extension key: traversed {traversed:?}, untraversed tail {untraversed:?}"
    )]
    TraversedPartialPath {
        traversed: Nibbles,
        untraversed: Nibbles,
        actual_node: Box<HexaryTrieNode>,
        simulated_node: Box<HexaryTrieNode>,
    },

    /// Raw lookup failure at the node-reference layer, before the caller
    /// has enough context (root hash, key prefix) to raise a proper
    /// `MissingTrieNode`/`MissingTraversalNode`. Never escapes the crate.
    #[error("node referenced by hash {0:?} not found in backing store")]
    NodeNotFound(NodeHash),

    #[error("bad trie proof: node required for verification was not supplied in the proof")]
    BadTrieProof,

    #[error("operation would override a terminal leaf at an existing keypath")]
    NodeOverride,

    #[error("fog has no unexplored prefixes left (perfect visibility)")]
    PerfectVisibility,

    #[error("fog has no unexplored prefix in the requested direction")]
    FullDirectionalVisibility,

    #[error("fog operation violates the no-prefix-overlap invariant")]
    InvalidFogSegments,

    #[error("backing store error: {0}")]
    Storage(String),

    #[error("pruning protocol violation: {0}")]
    PruningViolation(String),
}
