//! Ordered key/value/item/node iteration over a hexary trie (spec §4.F),
//! built on top of the fog/traversal machinery in [`crate::fog`] and
//! [`crate::traversal`].

use ethereum_types::H256;

use crate::error::TrieError;
use crate::fog::{HexaryTrieFog, TrieFrontierCache};
use crate::nibbles::{nibbles_to_bytes, Nibbles};
use crate::node::NodeRef;
use crate::state::TrieState;
use crate::traversal::{self, HexaryTrieNode};

/// A read-only, left-to-right walk over every reachable node of a trie as
/// of the root it was constructed with.
pub struct NodeIterator<'a> {
    state: &'a TrieState,
    root: Option<NodeRef>,
    root_hash: H256,
}

impl<'a> NodeIterator<'a> {
    pub fn new(state: &'a TrieState, root: Option<NodeRef>, root_hash: H256) -> Self {
        Self { state, root, root_hash }
    }

    /// `(prefix, node)` pairs in left-to-right order; every reachable node
    /// is visited exactly once.
    pub fn nodes(&self) -> Result<Vec<(Nibbles, HexaryTrieNode)>, TrieError> {
        let mut fog = HexaryTrieFog::new();
        let mut cache = TrieFrontierCache::new();
        let mut results = Vec::new();

        while !fog.is_complete() {
            let prefix = fog.nearest_right(&Nibbles::empty())?;
            let node = if let Some((parent, suffix)) = cache.get(&prefix).cloned() {
                let parent_prefix = prefix.slice(0, prefix.len() - suffix.len());
                traversal::traverse_from(
                    self.state,
                    &HexaryTrieNode::from_raw(Some(&parent)),
                    &suffix,
                    self.root_hash,
                    parent_prefix,
                )?
            } else {
                traversal::traverse(self.state, self.root.as_ref(), self.root_hash, &prefix)?
            };
            cache.remove(&prefix);

            for segment in &node.sub_segments {
                if let Some(raw) = &node.raw {
                    cache.insert(prefix.concat(segment), raw.clone(), segment.clone());
                }
            }
            fog = fog.explore(&prefix, &node.sub_segments)?;
            results.push((prefix, node));
        }
        Ok(results)
    }

    /// Every key reachable from the root, in ascending byte order.
    pub fn keys(&self) -> Result<Vec<Vec<u8>>, TrieError> {
        Ok(self.items()?.into_iter().map(|(k, _)| k).collect())
    }

    pub fn values(&self) -> Result<Vec<Vec<u8>>, TrieError> {
        Ok(self.items()?.into_iter().map(|(_, v)| v).collect())
    }

    /// Every `(key, value)` pair reachable from the root, in ascending key
    /// order.
    pub fn items(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>, TrieError> {
        let mut items = Vec::new();
        for (prefix, node) in self.nodes()? {
            if node.value.is_empty() {
                continue;
            }
            let key_nibbles = prefix.concat(&node.suffix);
            let key = nibbles_to_bytes(key_nibbles.as_ref())?;
            items.push((key, node.value));
        }
        items.sort();
        Ok(items)
    }

    /// The smallest key strictly greater than `key_bytes`, if any.
    pub fn next(&self, key_bytes: &[u8]) -> Result<Option<Vec<u8>>, TrieError> {
        Ok(self
            .keys()?
            .into_iter()
            .filter(|k| k.as_slice() > key_bytes)
            .min())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryTrieDB;
    use crate::node::{LeafNode, RawNode};

    fn state() -> TrieState {
        TrieState::new(Box::new(InMemoryTrieDB::new()))
    }

    #[test]
    fn iterates_single_leaf() {
        let state = state();
        let leaf = RawNode::Leaf(LeafNode::new(Nibbles::from_bytes(b"cat"), b"meow".to_vec()));
        let root = Some(NodeRef::from_node(leaf));
        let iter = NodeIterator::new(&state, root, H256::zero());
        assert_eq!(iter.items().unwrap(), vec![(b"cat".to_vec(), b"meow".to_vec())]);
    }

    #[test]
    fn next_skips_to_following_key() {
        let state = state();
        let leaf = RawNode::Leaf(LeafNode::new(Nibbles::from_bytes(b"b"), b"2".to_vec()));
        let root = Some(NodeRef::from_node(leaf));
        let iter = NodeIterator::new(&state, root, H256::zero());
        assert_eq!(iter.next(b"a").unwrap(), Some(b"b".to_vec()));
        assert_eq!(iter.next(b"b").unwrap(), None);
    }
}
