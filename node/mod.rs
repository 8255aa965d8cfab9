//! Raw trie nodes: the three node kinds a hexary trie is built from (spec
//! §3 "Raw node") and the core get/insert/remove algorithms that operate on
//! them (spec §4.D).

pub mod branch;
pub mod extension;
pub mod leaf;
pub mod node_ref;

pub use branch::BranchNode;
pub use extension::ExtensionNode;
pub use leaf::LeafNode;
pub use node_ref::NodeRef;

use ethereum_types::H256;

use crate::codec;
use crate::error::TrieError;
use crate::nibbles::Nibbles;
use crate::node_hash::NodeHash;
use crate::pruning::{PendingPrune, RefCounts};
use crate::state::TrieState;

/// Turns the internal `NodeNotFound` signal into a `MissingTrieNode` bearing
/// the prefix consumed so far; `root_hash` and `key` are filled in with
/// placeholders here and patched by the caller in `trie.rs`, which is the
/// only layer that actually knows them.
fn attach_prefix(err: TrieError, consumed: &Nibbles) -> TrieError {
    match err {
        TrieError::NodeNotFound(hash) => TrieError::MissingTrieNode {
            missing_hash: hash.as_hash().unwrap_or_default(),
            root_hash: H256::zero(),
            key: None,
            prefix: consumed.full_consumed_prefix(),
        },
        other => other,
    }
}

/// Notes `existing`'s current hash (if it is a stored, non-inline node
/// reference) as displaced, since a rewrite is about to descend into and
/// replace it. No-op when `pending` is `None` (pruning disabled).
fn note_displaced(pending: &mut Option<&mut PendingPrune>, existing: &NodeRef) {
    if let Some(p) = pending.as_deref_mut() {
        if let NodeHash::Hashed(h) = existing.compute_hash(false) {
            p.note_old_hash(h);
        }
    }
}

#[derive(Debug, Clone)]
pub enum RawNode {
    Branch(BranchNode),
    Extension(ExtensionNode),
    Leaf(LeafNode),
}

impl RawNode {
    pub fn encode(&self) -> Vec<u8> {
        codec::encode_raw(self, false)
    }

    pub fn compute_hash(&self, force_hash: bool) -> NodeHash {
        let encoded = codec::encode_raw(self, false);
        NodeHash::from_encoded(&encoded, force_hash)
    }

    /// Recursively writes any in-memory children to `state`'s backing
    /// store, then this node itself (unless it would be embedded inline).
    /// `ref_counts`, when given, is incremented once per hash actually
    /// written here (spec §4.E).
    pub fn commit(
        &self,
        state: &TrieState,
        force_hash: bool,
        ref_counts: Option<&RefCounts>,
    ) -> Result<NodeHash, TrieError> {
        match self {
            RawNode::Leaf(_) => {}
            RawNode::Extension(ext) => {
                ext.child.commit(state, false, ref_counts)?;
            }
            RawNode::Branch(branch) => {
                for choice in &branch.choices {
                    choice.commit(state, false, ref_counts)?;
                }
            }
        }
        let encoded = codec::encode_raw(self, false);
        let hash = NodeHash::from_encoded(&encoded, force_hash);
        if let NodeHash::Hashed(h) = &hash {
            state.insert_node(*h, encoded)?;
            if let Some(ref_counts) = ref_counts {
                ref_counts.increment(*h);
            }
        }
        Ok(hash)
    }

    pub fn get(&self, path: &Nibbles, state: &TrieState) -> Result<Option<Vec<u8>>, TrieError> {
        match self {
            RawNode::Leaf(leaf) => Ok((&leaf.partial == path).then(|| leaf.value.clone())),
            RawNode::Extension(ext) => {
                let mut rest = path.clone();
                if rest.skip_prefix(&ext.prefix) {
                    let child = ext
                        .child
                        .get_node(state)
                        .map_err(|e| attach_prefix(e, &rest))?;
                    child.get(&rest, state)
                } else {
                    Ok(None)
                }
            }
            RawNode::Branch(branch) => {
                let mut rest = path.clone();
                match rest.next_choice() {
                    Some(idx) => {
                        if branch.choices[idx].is_blank() {
                            return Ok(None);
                        }
                        let child = branch.choices[idx]
                            .get_node(state)
                            .map_err(|e| attach_prefix(e, &rest))?;
                        child.get(&rest, state)
                    }
                    None => Ok(branch.value.clone()),
                }
            }
        }
    }

    /// Inserts `value` at `path`, consuming `self` and returning the node
    /// (possibly of a different kind) that should replace it. `pending`,
    /// when given, is told which existing node hashes this rewrite
    /// displaces (spec §4.E).
    pub fn insert(
        self,
        path: Nibbles,
        value: Vec<u8>,
        state: &TrieState,
        mut pending: Option<&mut PendingPrune>,
    ) -> Result<RawNode, TrieError> {
        match self {
            RawNode::Leaf(leaf) => {
                if leaf.partial == path {
                    return Ok(RawNode::Leaf(LeafNode::new(path, value)));
                }
                let match_len = path.count_prefix(&leaf.partial);
                let mut branch = BranchNode::empty();
                insert_into_branch(&mut branch, leaf.partial.offset(match_len), leaf.value);
                insert_into_branch(&mut branch, path.offset(match_len), value);
                Ok(wrap_branch_with_prefix(branch, path.slice(0, match_len)))
            }
            RawNode::Extension(ext) => {
                let match_len = path.count_prefix(&ext.prefix);
                if match_len == ext.prefix.len() {
                    let descend_path = path.offset(match_len);
                    note_displaced(&mut pending, &ext.child);
                    let child = ext
                        .child
                        .get_node(state)
                        .map_err(|e| attach_prefix(e, &descend_path))?;
                    let new_child = (*child)
                        .clone()
                        .insert(descend_path, value, state, pending.as_deref_mut())?;
                    return Ok(RawNode::Extension(ExtensionNode::new(
                        ext.prefix,
                        NodeRef::from_node(new_child),
                    )));
                }
                let common = ext.prefix.slice(0, match_len);
                let existing_rest = ext.prefix.offset(match_len);
                let new_rest = path.offset(match_len);

                let mut branch = BranchNode::empty();
                let existing_idx = existing_rest.at(0);
                let existing_tail = existing_rest.offset(1);
                branch.choices[existing_idx] = if existing_tail.is_empty() {
                    ext.child
                } else {
                    NodeRef::from_node(RawNode::Extension(ExtensionNode::new(
                        existing_tail,
                        ext.child,
                    )))
                };
                insert_into_branch(&mut branch, new_rest, value);
                Ok(wrap_branch_with_prefix(branch, common))
            }
            RawNode::Branch(mut branch) => {
                let mut rest = path.clone();
                match rest.next_choice() {
                    None => branch.value = Some(value),
                    Some(idx) => {
                        let new_child = if branch.choices[idx].is_blank() {
                            RawNode::Leaf(LeafNode::new(rest, value))
                        } else {
                            note_displaced(&mut pending, &branch.choices[idx]);
                            let child = branch.choices[idx]
                                .get_node(state)
                                .map_err(|e| attach_prefix(e, &rest))?;
                            (*child)
                                .clone()
                                .insert(rest, value, state, pending.as_deref_mut())?
                        };
                        branch.choices[idx] = NodeRef::from_node(new_child);
                    }
                }
                Ok(RawNode::Branch(branch))
            }
        }
    }

    /// Removes `path`, consuming `self`. Returns `(replacement, removed)`
    /// where `replacement` is `None` if the whole subtree vanished and
    /// `removed` is whether `path` was actually present.
    pub fn remove(
        self,
        path: Nibbles,
        state: &TrieState,
        mut pending: Option<&mut PendingPrune>,
    ) -> Result<(Option<RawNode>, bool), TrieError> {
        match self {
            RawNode::Leaf(leaf) => {
                if leaf.partial == path {
                    Ok((None, true))
                } else {
                    Ok((Some(RawNode::Leaf(leaf)), false))
                }
            }
            RawNode::Extension(ext) => {
                let mut rest = path.clone();
                if !rest.skip_prefix(&ext.prefix) {
                    return Ok((Some(RawNode::Extension(ext)), false));
                }
                note_displaced(&mut pending, &ext.child);
                let child = ext
                    .child
                    .get_node(state)
                    .map_err(|e| attach_prefix(e, &rest))?;
                let (new_child, removed) =
                    (*child).clone().remove(rest, state, pending.as_deref_mut())?;
                match new_child {
                    None => Ok((None, removed)),
                    Some(nc) => Ok((Some(merge_extension(ext.prefix, nc)), removed)),
                }
            }
            RawNode::Branch(mut branch) => {
                let mut rest = path.clone();
                let removed = match rest.next_choice() {
                    None => {
                        if branch.value.is_none() {
                            return Ok((Some(RawNode::Branch(branch)), false));
                        }
                        branch.value = None;
                        true
                    }
                    Some(idx) => {
                        if branch.choices[idx].is_blank() {
                            return Ok((Some(RawNode::Branch(branch)), false));
                        }
                        note_displaced(&mut pending, &branch.choices[idx]);
                        let child = branch.choices[idx]
                            .get_node(state)
                            .map_err(|e| attach_prefix(e, &rest))?;
                        let (new_child, removed) =
                            (*child).clone().remove(rest, state, pending.as_deref_mut())?;
                        if !removed {
                            return Ok((Some(RawNode::Branch(branch)), false));
                        }
                        branch.choices[idx] = match new_child {
                            Some(nc) => NodeRef::from_node(nc),
                            None => NodeRef::blank(),
                        };
                        true
                    }
                };

                if let Some(idx) = branch.only_child_index() {
                    let prefix = Nibbles::from_hex(vec![idx as u8]);
                    note_displaced(&mut pending, &branch.choices[idx]);
                    let only = branch.choices[idx]
                        .get_node(state)
                        .map_err(|e| attach_prefix(e, &prefix))?;
                    return Ok((Some(merge_extension(prefix, (*only).clone())), removed));
                }
                if branch.child_count() == 0 {
                    return Ok(match branch.value.take() {
                        Some(v) => (
                            Some(RawNode::Leaf(LeafNode::new(Nibbles::from_hex(vec![16]), v))),
                            removed,
                        ),
                        None => (None, removed),
                    });
                }
                Ok((Some(RawNode::Branch(branch)), removed))
            }
        }
    }
}

fn insert_into_branch(branch: &mut BranchNode, mut path: Nibbles, value: Vec<u8>) {
    match path.next_choice() {
        Some(idx) => branch.choices[idx] = NodeRef::from_node(RawNode::Leaf(LeafNode::new(path, value))),
        None => branch.value = Some(value),
    }
}

fn wrap_branch_with_prefix(branch: BranchNode, prefix: Nibbles) -> RawNode {
    if prefix.is_empty() {
        RawNode::Branch(branch)
    } else {
        RawNode::Extension(ExtensionNode::new(prefix, NodeRef::from_node(RawNode::Branch(branch))))
    }
}

/// Splices `prefix` onto `child`, merging the two extensions/leaf-keys into
/// one node where possible so that no stored extension ever points at
/// another extension and no branch ever has exactly one child.
fn merge_extension(prefix: Nibbles, child: RawNode) -> RawNode {
    match child {
        RawNode::Extension(inner) => {
            RawNode::Extension(ExtensionNode::new(prefix.concat(&inner.prefix), inner.child))
        }
        RawNode::Leaf(leaf) => RawNode::Leaf(LeafNode::new(prefix.concat(&leaf.partial), leaf.value)),
        RawNode::Branch(_) => RawNode::Extension(ExtensionNode::new(prefix, NodeRef::from_node(child))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryTrieDB;

    fn state() -> TrieState {
        TrieState::new(Box::new(InMemoryTrieDB::new()))
    }

    #[test]
    fn leaf_insert_same_key_replaces_value() {
        let state = state();
        let leaf = RawNode::Leaf(LeafNode::new(Nibbles::from_bytes(b"key"), b"a".to_vec()));
        let updated = leaf
            .insert(Nibbles::from_bytes(b"key"), b"b".to_vec(), &state, None)
            .unwrap();
        assert_eq!(updated.get(&Nibbles::from_bytes(b"key"), &state).unwrap(), Some(b"b".to_vec()));
    }

    #[test]
    fn leaf_split_on_divergent_key() {
        let state = state();
        let leaf = RawNode::Leaf(LeafNode::new(Nibbles::from_bytes(b"dog"), b"woof".to_vec()));
        let updated = leaf
            .insert(Nibbles::from_bytes(b"cat"), b"meow".to_vec(), &state, None)
            .unwrap();
        assert_eq!(updated.get(&Nibbles::from_bytes(b"dog"), &state).unwrap(), Some(b"woof".to_vec()));
        assert_eq!(updated.get(&Nibbles::from_bytes(b"cat"), &state).unwrap(), Some(b"meow".to_vec()));
    }

    #[test]
    fn insert_then_remove_restores_leaf() {
        let state = state();
        let leaf = RawNode::Leaf(LeafNode::new(Nibbles::from_bytes(b"dog"), b"woof".to_vec()));
        let inserted = leaf
            .insert(Nibbles::from_bytes(b"cat"), b"meow".to_vec(), &state, None)
            .unwrap();
        let (removed, did_remove) = inserted
            .remove(Nibbles::from_bytes(b"cat"), &state, None)
            .unwrap();
        assert!(did_remove);
        let removed = removed.unwrap();
        assert_eq!(removed.get(&Nibbles::from_bytes(b"dog"), &state).unwrap(), Some(b"woof".to_vec()));
        assert_eq!(removed.get(&Nibbles::from_bytes(b"cat"), &state).unwrap(), None);
    }

    #[test]
    fn remove_missing_key_is_noop() {
        let state = state();
        let leaf = RawNode::Leaf(LeafNode::new(Nibbles::from_bytes(b"dog"), b"woof".to_vec()));
        let (node, removed) = leaf
            .clone()
            .remove(Nibbles::from_bytes(b"cat"), &state, None)
            .unwrap();
        assert!(!removed);
        assert_eq!(node.unwrap().get(&Nibbles::from_bytes(b"dog"), &state).unwrap(), Some(b"woof".to_vec()));
    }

    #[test]
    fn insert_then_overwrite_notes_displaced_hash() {
        let state = state();
        let leaf = RawNode::Leaf(LeafNode::new(Nibbles::from_bytes(b"dog"), b"woof".to_vec()));
        let root = leaf
            .insert(Nibbles::from_bytes(b"cat"), b"meow".to_vec(), &state, None)
            .unwrap();
        let root_hash = root.commit(&state, true, None).unwrap().as_hash().unwrap();
        let root = (*state.get_node(&NodeHash::Hashed(root_hash)).unwrap()).clone();

        let mut pending = PendingPrune::new();
        let updated = root
            .insert(Nibbles::from_bytes(b"cat"), b"hiss".to_vec(), &state, Some(&mut pending))
            .unwrap();
        assert_eq!(
            updated.get(&Nibbles::from_bytes(b"cat"), &state).unwrap(),
            Some(b"hiss".to_vec())
        );
    }
}
