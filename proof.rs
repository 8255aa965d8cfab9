//! Merkle proof generation and stateless verification (spec §4.D
//! `get_proof`/`get_from_proof`).

use ethereum_types::H256;

use crate::db::InMemoryTrieDB;
use crate::error::TrieError;
use crate::nibbles::Nibbles;
use crate::node::{NodeRef, RawNode};
use crate::node_hash::{keccak, NodeHash};
use crate::state::TrieState;

/// Collects every node visited walking from `root` toward `key_path`, in
/// root-to-leaf order, stopping at the first node that cannot be extended
/// further toward the key. The result proves either inclusion or
/// exclusion of the key.
pub fn get_proof(
    state: &TrieState,
    root: Option<&NodeRef>,
    key_path: &Nibbles,
) -> Result<Vec<Vec<u8>>, TrieError> {
    let mut proof = Vec::new();
    let mut current = root.cloned();
    let mut remaining = key_path.clone();

    loop {
        let node_ref = match current.take() {
            Some(node_ref) if !node_ref.is_blank() => node_ref,
            _ => return Ok(proof),
        };
        let node = node_ref.get_node(state)?;
        proof.push(node.encode());

        match &*node {
            RawNode::Leaf(_) => return Ok(proof),
            RawNode::Extension(ext) => {
                if remaining.skip_prefix(&ext.prefix) {
                    current = Some(ext.child.clone());
                } else {
                    return Ok(proof);
                }
            }
            RawNode::Branch(branch) => match remaining.next_choice() {
                None => return Ok(proof),
                Some(idx) => current = Some(branch.choices[idx].clone()),
            },
        }
    }
}

/// Stateless verification: replays `get(key)` against a fresh in-memory
/// store seeded only with `proof`'s nodes. Fails with [`TrieError::BadTrieProof`]
/// if a node needed along the way was not supplied.
pub fn get_from_proof(
    root_hash: H256,
    key_path: &Nibbles,
    proof: &[Vec<u8>],
) -> Result<Vec<u8>, TrieError> {
    let db = InMemoryTrieDB::new();
    for encoded in proof {
        let hash = keccak(encoded);
        db.put(hash.as_bytes().to_vec(), encoded.clone())?;
    }
    let state = TrieState::new(Box::new(db));

    if proof.is_empty() {
        return Ok(Vec::new());
    }

    let root = NodeRef::from_hash(NodeHash::Hashed(root_hash));
    match root.get_node(&state) {
        Ok(node) => node
            .get(key_path, &state)
            .map(|value| value.unwrap_or_default())
            .map_err(|_| TrieError::BadTrieProof),
        Err(_) => Err(TrieError::BadTrieProof),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::LeafNode;
    use crate::state::TrieState as State;

    fn empty_state() -> State {
        State::new(Box::new(InMemoryTrieDB::new()))
    }

    #[test]
    fn proof_of_single_leaf_root_verifies() {
        let state = empty_state();
        let leaf = RawNode::Leaf(LeafNode::new(Nibbles::from_bytes(b"cat"), b"meow".to_vec()));
        let root_hash = leaf.compute_hash(true);
        let root = NodeRef::from_node(leaf);
        let proof = get_proof(&state, Some(&root), &Nibbles::from_bytes(b"cat")).unwrap();
        assert_eq!(proof.len(), 1);

        let root_hash = root_hash.as_hash().unwrap();
        let value = get_from_proof(root_hash, &Nibbles::from_bytes(b"cat"), &proof).unwrap();
        assert_eq!(value, b"meow");
    }

    #[test]
    fn tampering_with_proof_node_fails_verification() {
        let state = empty_state();
        let leaf = RawNode::Leaf(LeafNode::new(Nibbles::from_bytes(b"cat"), b"meow".to_vec()));
        let root_hash = leaf.compute_hash(true).as_hash().unwrap();
        let root = NodeRef::from_node(leaf);
        let mut proof = get_proof(&state, Some(&root), &Nibbles::from_bytes(b"cat")).unwrap();
        let last = proof.last_mut().unwrap();
        last[0] ^= 0xFF;
        assert!(matches!(
            get_from_proof(root_hash, &Nibbles::from_bytes(b"cat"), &proof),
            Err(TrieError::BadTrieProof)
        ));
    }
}
