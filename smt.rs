//! Fixed-depth Sparse Merkle Tree (spec §4.H "SparseMerkleTree"): an
//! address-indexed commitment scheme with precomputed empty-subtree
//! hashes so unwritten subtrees never need to be materialized.

use ethereum_types::H256;

use crate::db::TrieDB;
use crate::error::TrieError;
use crate::node_hash::keccak;

fn bit_at(key: &[u8], index: usize) -> u8 {
    let byte = key[index / 8];
    (byte >> (7 - (index % 8))) & 1
}

fn combine(left: H256, right: H256) -> H256 {
    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(left.as_bytes());
    buf[32..].copy_from_slice(right.as_bytes());
    keccak(&buf)
}

/// A complete binary tree of depth `8 * key_size`, every leaf initially
/// `default`.
pub struct SparseMerkleTree {
    key_size: usize,
    depth: usize,
    /// `empty_hashes[level]` is the root hash of a subtree of `level`
    /// levels of depth whose leaves are all `default`; `empty_hashes[0]`
    /// is the leaf hash of `default` itself.
    empty_hashes: Vec<H256>,
    db: Box<dyn TrieDB>,
    root: H256,
}

impl SparseMerkleTree {
    pub fn new(key_size: usize, default: Vec<u8>, db: Box<dyn TrieDB>) -> Self {
        assert!((1..=32).contains(&key_size), "key_size must be in 1..=32");
        let depth = 8 * key_size;
        let mut empty_hashes = Vec::with_capacity(depth + 1);
        empty_hashes.push(keccak(&default));
        for level in 1..=depth {
            let prev = empty_hashes[level - 1];
            empty_hashes.push(combine(prev, prev));
        }
        let root = empty_hashes[depth];
        Self { key_size, depth, empty_hashes, db, root }
    }

    pub fn root_hash(&self) -> H256 {
        self.root
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    fn children_of(&self, hash: H256, level: usize) -> Result<(H256, H256), TrieError> {
        if hash == self.empty_hashes[level] {
            let child = self.empty_hashes[level - 1];
            return Ok((child, child));
        }
        let bytes = self
            .db
            .get(hash.as_bytes())?
            .ok_or_else(|| TrieError::Storage(format!("SMT node {hash:#x} missing")))?;
        if bytes.len() != 64 {
            return Err(TrieError::InvalidNode);
        }
        Ok((H256::from_slice(&bytes[..32]), H256::from_slice(&bytes[32..])))
    }

    fn check_key(&self, key: &[u8]) -> Result<(), TrieError> {
        if key.len() != self.key_size {
            return Err(TrieError::InvalidHashLength(key.len()));
        }
        Ok(())
    }

    /// Siblings of `key`'s path, root-to-leaf.
    pub fn branch(&self, key: &[u8]) -> Result<Vec<H256>, TrieError> {
        self.check_key(key)?;
        let mut siblings = Vec::with_capacity(self.depth);
        let mut current = self.root;
        for level in (1..=self.depth).rev() {
            let (left, right) = self.children_of(current, level)?;
            let bit = bit_at(key, self.depth - level);
            let (child, sibling) = if bit == 0 { (left, right) } else { (right, left) };
            siblings.push(sibling);
            current = child;
        }
        Ok(siblings)
    }

    /// Writes `value` at `key`, recomputing the path from leaf to root.
    /// Returns the `depth` new internal-node hashes, root-to-leaf order.
    pub fn set(&mut self, key: &[u8], value: &[u8]) -> Result<Vec<H256>, TrieError> {
        let siblings = self.branch(key)?;

        let mut new_hash = keccak(value);
        let mut path_hashes = vec![new_hash];
        for (i, sibling) in siblings.iter().enumerate().rev() {
            let bit = bit_at(key, i);
            let (left, right) = if bit == 0 { (new_hash, *sibling) } else { (*sibling, new_hash) };
            new_hash = combine(left, right);
            self.db.put(new_hash.as_bytes().to_vec(), {
                let mut buf = Vec::with_capacity(64);
                buf.extend_from_slice(left.as_bytes());
                buf.extend_from_slice(right.as_bytes());
                buf
            })?;
            path_hashes.push(new_hash);
        }
        path_hashes.reverse();
        self.root = new_hash;
        Ok(path_hashes)
    }
}

/// A holder's view of one key's inclusion (or default-value exclusion)
/// proof against a [`SparseMerkleTree`], kept in sync across updates
/// without needing the full tree.
#[derive(Debug, Clone)]
pub struct SparseMerkleProof {
    key: Vec<u8>,
    value: Vec<u8>,
    /// Sibling hashes, root-to-leaf.
    branch: Vec<H256>,
}

impl SparseMerkleProof {
    pub fn new(key: Vec<u8>, value: Vec<u8>, branch: Vec<H256>) -> Self {
        Self { key, value, branch }
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Recomputes the root hash implied by the tracked `(key, value, branch)`.
    pub fn root_hash(&self) -> H256 {
        let depth = self.branch.len();
        let mut hash = keccak(&self.value);
        for (i, sibling) in self.branch.iter().enumerate().rev() {
            let bit = bit_at(&self.key, i);
            hash = if bit == 0 { combine(hash, *sibling) } else { combine(*sibling, hash) };
        }
        debug_assert_eq!(depth, self.branch.len());
        hash
    }

    /// Applies a concurrent update at `other_key` to this proof: finds the
    /// depth at which `other_key` diverges from the tracked key and
    /// splices in the corresponding entry from `node_updates` (the
    /// root-to-leaf hash list `SparseMerkleTree::set` produced for that
    /// update). If the keys are identical, just refreshes `value`.
    pub fn update(
        &mut self,
        other_key: &[u8],
        other_value: &[u8],
        node_updates: &[H256],
    ) -> Result<(), TrieError> {
        if other_key == self.key.as_slice() {
            self.value = other_value.to_vec();
            return Ok(());
        }
        let depth = self.branch.len();
        let divergence = (0..depth)
            .find(|&i| bit_at(&self.key, i) != bit_at(other_key, i))
            .unwrap_or(depth - 1);
        // `node_updates` is root-to-leaf (index 0 = root); the sibling
        // `self.branch[divergence]` caches lives one level deeper than the
        // shared ancestor at `divergence`, at `divergence + 1`.
        let replacement = node_updates
            .get(divergence + 1)
            .ok_or(TrieError::InvalidNode)?;
        self.branch[divergence] = *replacement;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryTrieDB;

    #[test]
    fn empty_tree_root_is_stable() {
        let tree = SparseMerkleTree::new(4, vec![0u8; 8], Box::new(InMemoryTrieDB::new()));
        let tree2 = SparseMerkleTree::new(4, vec![0u8; 8], Box::new(InMemoryTrieDB::new()));
        assert_eq!(tree.root_hash(), tree2.root_hash());
    }

    #[test]
    fn set_changes_root_and_branch_is_consistent() {
        let mut tree = SparseMerkleTree::new(2, vec![0u8; 8], Box::new(InMemoryTrieDB::new()));
        let key = [0x12, 0x34];
        let value = b"hello";
        let updates = tree.set(&key, value).unwrap();
        assert_eq!(updates.first().copied().unwrap(), tree.root_hash());

        let branch = tree.branch(&key).unwrap();
        let proof = SparseMerkleProof::new(key.to_vec(), value.to_vec(), branch);
        assert_eq!(proof.root_hash(), tree.root_hash());
    }

    #[test]
    fn proof_update_tracks_unrelated_key_change() {
        let mut tree = SparseMerkleTree::new(1, vec![0u8; 4], Box::new(InMemoryTrieDB::new()));
        let key_a = [0b0000_0000];
        let key_b = [0b1000_0000];

        tree.set(&key_a, b"a-value").unwrap();
        let branch_a = tree.branch(&key_a).unwrap();
        let mut proof = SparseMerkleProof::new(key_a.to_vec(), b"a-value".to_vec(), branch_a);
        assert_eq!(proof.root_hash(), tree.root_hash());

        let updates_b = tree.set(&key_b, b"b-value").unwrap();
        proof.update(&key_b, b"b-value", &updates_b).unwrap();
        assert_eq!(proof.root_hash(), tree.root_hash());
    }
}
