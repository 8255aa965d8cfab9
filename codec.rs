//! RLP encoding of raw trie nodes. The trie relies on the `rlp` crate for
//! wire-level encoding (spec's "Non-goal: the serialization codec itself")
//! and only defines how a [`RawNode`] maps onto the rlp data model: a leaf
//! or extension is a 2-item list, a branch is a 17-item list, and a child
//! reference is either a 32-byte hash string or, when it would be shorter,
//! the child's own encoding spliced in as a nested RLP item.

use rlp::{Rlp, RlpStream};

use crate::error::TrieError;
use crate::nibbles::Nibbles;
use crate::node::branch::BranchNode;
use crate::node::extension::ExtensionNode;
use crate::node::leaf::LeafNode;
use crate::node::node_ref::NodeRef;
use crate::node::RawNode;
use crate::node_hash::NodeHash;

pub fn encode_raw(node: &RawNode, force_hash_children: bool) -> Vec<u8> {
    let mut stream = RlpStream::new();
    match node {
        RawNode::Leaf(leaf) => {
            stream.begin_list(2);
            stream.append(&leaf.partial.encode_compact());
            stream.append(&leaf.value);
        }
        RawNode::Extension(ext) => {
            stream.begin_list(2);
            stream.append(&ext.prefix.encode_compact());
            append_child(&mut stream, &ext.child.compute_hash(false));
        }
        RawNode::Branch(branch) => {
            let _ = force_hash_children;
            stream.begin_list(17);
            for choice in &branch.choices {
                append_child(&mut stream, &choice.compute_hash(false));
            }
            match &branch.value {
                Some(value) => {
                    stream.append(value);
                }
                None => {
                    stream.append_empty_data();
                }
            }
        }
    }
    stream.out().to_vec()
}

fn append_child(stream: &mut RlpStream, hash: &NodeHash) {
    match hash {
        NodeHash::Hashed(h) => {
            stream.append(&h.as_bytes());
        }
        NodeHash::Inline(bytes) => {
            if bytes.is_empty() {
                stream.append_empty_data();
            } else {
                stream.append_raw(bytes, 1);
            }
        }
    }
}

pub fn decode_raw(encoded: &[u8]) -> Result<RawNode, TrieError> {
    let rlp = Rlp::new(encoded);
    let items = rlp.item_count().map_err(TrieError::RlpDecode)?;
    match items {
        2 => {
            let compact: Vec<u8> = rlp.val_at(0).map_err(TrieError::RlpDecode)?;
            let path = Nibbles::decode_compact(&compact);
            if path.is_leaf() {
                let value: Vec<u8> = rlp.val_at(1).map_err(TrieError::RlpDecode)?;
                Ok(RawNode::Leaf(LeafNode::new(path, value)))
            } else {
                let child_rlp = rlp.at(1).map_err(TrieError::RlpDecode)?;
                let child = decode_child(&child_rlp)?;
                Ok(RawNode::Extension(ExtensionNode::new(
                    path,
                    NodeRef::from_hash(child),
                )))
            }
        }
        17 => {
            let mut choices: [NodeRef; 16] = std::array::from_fn(|_| NodeRef::blank());
            for (i, choice) in choices.iter_mut().enumerate() {
                let item = rlp.at(i).map_err(TrieError::RlpDecode)?;
                *choice = NodeRef::from_hash(decode_child(&item)?);
            }
            let value_item = rlp.at(16).map_err(TrieError::RlpDecode)?;
            let value = if value_item.is_empty() {
                None
            } else {
                Some(value_item.data().map_err(TrieError::RlpDecode)?.to_vec())
            };
            Ok(RawNode::Branch(BranchNode::new(choices, value)))
        }
        _ => Err(TrieError::InvalidNode),
    }
}

fn decode_child(item: &Rlp) -> Result<NodeHash, TrieError> {
    if item.is_data() {
        let data = item.data().map_err(TrieError::RlpDecode)?;
        if data.is_empty() {
            Ok(NodeHash::Inline(Default::default()))
        } else {
            NodeHash::decode_child(data)
        }
    } else {
        // An embedded node: keep its raw RLP bytes as the inline encoding.
        Ok(NodeHash::Inline(smallvec::SmallVec::from_slice(
            item.as_raw(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_roundtrip() {
        let leaf = RawNode::Leaf(LeafNode::new(
            Nibbles::from_bytes(b"cat"),
            b"dog".to_vec(),
        ));
        let encoded = encode_raw(&leaf, false);
        let decoded = decode_raw(&encoded).unwrap();
        assert_eq!(encode_raw(&decoded, false), encoded);
    }

    #[test]
    fn branch_roundtrip_empty() {
        let branch = RawNode::Branch(BranchNode::empty());
        let encoded = encode_raw(&branch, false);
        let decoded = decode_raw(&encoded).unwrap();
        assert_eq!(encode_raw(&decoded, false), encoded);
    }
}
