//! A reference to a child (or root) node: either an in-memory node that has
//! not yet been written to the backing store, or a [`NodeHash`] pointing at
//! one that has (or is embedded).

use std::sync::{Arc, OnceLock};

use crate::error::TrieError;
use crate::node::RawNode;
use crate::node_hash::NodeHash;
use crate::pruning::RefCounts;
use crate::state::TrieState;

/// Mirrors the lifecycle of a node within a mutation: freshly
/// inserted/modified nodes live as `Node(Arc<RawNode>, ..)` until `commit`
/// writes them out and replaces them with a stable `Hash` reference.
#[derive(Debug, Clone)]
pub enum NodeRef {
    Node(Arc<RawNode>, OnceLock<NodeHash>),
    Hash(NodeHash),
}

impl NodeRef {
    pub fn from_node(node: RawNode) -> Self {
        NodeRef::Node(Arc::new(node), OnceLock::new())
    }

    pub fn from_hash(hash: NodeHash) -> Self {
        NodeRef::Hash(hash)
    }

    /// A `NodeRef` pointing at nothing (used for absent branch slots).
    pub fn blank() -> Self {
        NodeRef::Hash(NodeHash::Inline(Default::default()))
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, NodeRef::Hash(NodeHash::Inline(bytes)) if bytes.is_empty())
    }

    /// Resolves this reference to its node contents, fetching from `state`
    /// if this is a hash reference that isn't resident in memory.
    pub fn get_node(&self, state: &TrieState) -> Result<Arc<RawNode>, TrieError> {
        match self {
            NodeRef::Node(node, _) => Ok(node.clone()),
            NodeRef::Hash(hash) => state.get_node(hash),
        }
    }

    /// The content hash (or inline encoding) of this reference, computing
    /// and caching it on first access for in-memory nodes.
    pub fn compute_hash(&self, force_hash: bool) -> NodeHash {
        match self {
            NodeRef::Node(node, cached) => cached
                .get_or_init(|| node.compute_hash(force_hash))
                .clone(),
            NodeRef::Hash(hash) => hash.clone(),
        }
    }

    /// Writes this reference (and, recursively, any in-memory children) to
    /// `state`'s backing store, returning the stable hash reference that
    /// replaces it. `ref_counts`, when given, is incremented once per hash
    /// actually written.
    pub fn commit(
        &self,
        state: &TrieState,
        force_hash: bool,
        ref_counts: Option<&RefCounts>,
    ) -> Result<NodeHash, TrieError> {
        match self {
            NodeRef::Hash(hash) => Ok(hash.clone()),
            NodeRef::Node(node, cached) => {
                let hash = node.commit(state, force_hash, ref_counts)?;
                let _ = cached.set(hash.clone());
                Ok(hash)
            }
        }
    }
}
