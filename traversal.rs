//! Node-granular traversal (spec §4.D "traverse"/"traverse_from", §4.F).
//! Unlike `get`/`set`/`delete`, these walks surface *exactly* how far they
//! got before hitting missing data or the inside of a leaf/extension key,
//! so a remote-sync driver can resume.

use ethereum_types::H256;

use crate::error::TrieError;
use crate::nibbles::Nibbles;
use crate::node::{NodeRef, RawNode};
use crate::state::TrieState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Blank,
    Leaf,
    Extension,
    Branch,
}

/// The external, read-only view of a node at a given prefix (spec §3
/// "Annotated node").
#[derive(Debug, Clone)]
pub struct HexaryTrieNode {
    pub sub_segments: Vec<Nibbles>,
    pub value: Vec<u8>,
    pub suffix: Nibbles,
    pub raw: Option<RawNode>,
    pub node_type: NodeType,
}

impl HexaryTrieNode {
    pub fn blank() -> Self {
        Self::from_raw(None)
    }

    pub fn from_raw(raw: Option<&RawNode>) -> Self {
        match raw {
            None => HexaryTrieNode {
                sub_segments: Vec::new(),
                value: Vec::new(),
                suffix: Nibbles::empty(),
                raw: None,
                node_type: NodeType::Blank,
            },
            Some(RawNode::Leaf(leaf)) => HexaryTrieNode {
                sub_segments: Vec::new(),
                value: leaf.value.clone(),
                suffix: leaf.partial.without_terminator(),
                raw: Some(raw.unwrap().clone()),
                node_type: NodeType::Leaf,
            },
            Some(RawNode::Extension(ext)) => HexaryTrieNode {
                sub_segments: vec![ext.prefix.clone()],
                value: Vec::new(),
                suffix: Nibbles::empty(),
                raw: Some(raw.unwrap().clone()),
                node_type: NodeType::Extension,
            },
            Some(RawNode::Branch(branch)) => HexaryTrieNode {
                sub_segments: branch
                    .choices
                    .iter()
                    .enumerate()
                    .filter(|(_, choice)| !choice.is_blank())
                    .map(|(i, _)| Nibbles::from_hex(vec![i as u8]))
                    .collect(),
                value: branch.value.clone().unwrap_or_default(),
                suffix: Nibbles::empty(),
                raw: Some(raw.unwrap().clone()),
                node_type: NodeType::Branch,
            },
        }
    }

    pub fn is_blank(&self) -> bool {
        self.node_type == NodeType::Blank
    }
}

/// Navigates from `root` consuming `prefix`, returning the annotated node
/// found exactly at that prefix.
pub fn traverse(
    state: &TrieState,
    root: Option<&NodeRef>,
    root_hash: H256,
    prefix: &Nibbles,
) -> Result<HexaryTrieNode, TrieError> {
    walk(state, root.cloned(), prefix.clone(), Nibbles::empty(), root_hash)
}

/// Same as [`traverse`], but resumes a walk from an already-resolved node
/// body rather than the root.
pub fn traverse_from(
    state: &TrieState,
    parent: &HexaryTrieNode,
    sub_prefix: &Nibbles,
    root_hash: H256,
    consumed_prefix: Nibbles,
) -> Result<HexaryTrieNode, TrieError> {
    let current = parent.raw.clone().map(NodeRef::from_node);
    walk(state, current, sub_prefix.clone(), consumed_prefix, root_hash)
}

fn walk(
    state: &TrieState,
    mut current: Option<NodeRef>,
    mut remaining: Nibbles,
    mut consumed: Nibbles,
    root_hash: H256,
) -> Result<HexaryTrieNode, TrieError> {
    loop {
        let resolved = match &current {
            None => None,
            Some(node_ref) => Some(node_ref.get_node(state).map_err(|err| match err {
                TrieError::NodeNotFound(missing) => TrieError::MissingTraversalNode {
                    missing_hash: missing.as_hash().unwrap_or_default(),
                    root_hash,
                    prefix: consumed.clone(),
                },
                other => other,
            })?),
        };

        if remaining.is_empty() {
            return Ok(HexaryTrieNode::from_raw(resolved.as_deref()));
        }

        match resolved.as_deref() {
            None => return Ok(HexaryTrieNode::blank()),
            Some(RawNode::Leaf(leaf)) => {
                let leaf_key = leaf.partial.without_terminator();
                let match_len = remaining.count_prefix(&leaf_key);
                if match_len == remaining.len() {
                    if match_len == leaf_key.len() {
                        return Ok(HexaryTrieNode::from_raw(resolved.as_deref()));
                    }
                    let traversed = consumed.clone();
                    let untraversed = leaf_key.offset(match_len);
                    let actual_node = HexaryTrieNode::from_raw(resolved.as_deref());
                    let mut simulated = actual_node.clone();
                    simulated.suffix = untraversed.clone();
                    return Err(TrieError::TraversedPartialPath {
                        traversed,
                        untraversed,
                        actual_node: Box::new(actual_node),
                        simulated_node: Box::new(simulated),
                    });
                }
                return Ok(HexaryTrieNode::blank());
            }
            Some(RawNode::Extension(ext)) => {
                let match_len = remaining.count_prefix(&ext.prefix);
                if match_len == ext.prefix.len() {
                    consumed.extend(&ext.prefix);
                    remaining = remaining.offset(match_len);
                    current = Some(ext.child.clone());
                    continue;
                }
                if match_len == remaining.len() {
                    let traversed = consumed.clone();
                    let untraversed = ext.prefix.offset(match_len);
                    let actual_node = HexaryTrieNode::from_raw(resolved.as_deref());
                    let simulated = HexaryTrieNode {
                        sub_segments: vec![untraversed.clone()],
                        ..actual_node.clone()
                    };
                    return Err(TrieError::TraversedPartialPath {
                        traversed,
                        untraversed,
                        actual_node: Box::new(actual_node),
                        simulated_node: Box::new(simulated),
                    });
                }
                return Ok(HexaryTrieNode::blank());
            }
            Some(RawNode::Branch(branch)) => {
                let idx = remaining.at(0);
                let child = &branch.choices[idx];
                if child.is_blank() {
                    return Ok(HexaryTrieNode::blank());
                }
                consumed.append(idx as u8);
                remaining = remaining.offset(1);
                current = Some(child.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryTrieDB;
    use crate::node::LeafNode;

    fn state() -> TrieState {
        TrieState::new(Box::new(InMemoryTrieDB::new()))
    }

    #[test]
    fn root_node_of_single_leaf() {
        let state = state();
        let leaf = RawNode::Leaf(LeafNode::new(
            Nibbles::from_bytes(b"\xffleaf-at-root"),
            b"some-value".to_vec(),
        ));
        let root = Some(NodeRef::from_node(leaf));
        let node = traverse(&state, root.as_ref(), H256::zero(), &Nibbles::empty()).unwrap();
        assert_eq!(node.node_type, NodeType::Leaf);
        assert_eq!(node.value, b"some-value");
    }

    #[test]
    fn partial_traversal_inside_leaf_key() {
        let state = state();
        let leaf = RawNode::Leaf(LeafNode::new(
            Nibbles::from_bytes(b"\xffleaf-at-root"),
            b"some-value".to_vec(),
        ));
        let root = Some(NodeRef::from_node(leaf));
        let prefix = Nibbles::from_hex(vec![0xF]);
        let err = traverse(&state, root.as_ref(), H256::zero(), &prefix).unwrap_err();
        match err {
            TrieError::TraversedPartialPath { simulated_node, .. } => {
                assert_eq!(simulated_node.suffix.at(0), 0xF);
            }
            other => panic!("expected TraversedPartialPath, got {other:?}"),
        }
    }

    #[test]
    fn diverging_prefix_returns_blank() {
        let state = state();
        let leaf = RawNode::Leaf(LeafNode::new(
            Nibbles::from_bytes(b"\xffleaf-at-root"),
            b"some-value".to_vec(),
        ));
        let root = Some(NodeRef::from_node(leaf));
        let prefix = Nibbles::from_hex(vec![0x0]);
        let node = traverse(&state, root.as_ref(), H256::zero(), &prefix).unwrap();
        assert!(node.is_blank());
    }
}
