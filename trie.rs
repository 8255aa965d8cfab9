//! Content-addressed, persistent radix-16 Merkle Patricia Trie: the public
//! entry point gluing the node algorithms, backing store, pruning
//! controller, traversal/fog machinery and proof generation into the
//! mutating [`Trie`] type (spec §4.D/§4.E/§5).

pub mod binary_trie;
pub mod codec;
pub mod db;
pub mod error;
pub mod fog;
pub mod nibbles;
mod node;
pub mod node_hash;
pub mod proof;
pub mod pruning;
pub mod smt;
mod state;
pub mod traversal;
pub mod trie_iter;

use ethereum_types::H256;
use lazy_static::lazy_static;

pub use self::db::{InMemoryTrieDB, ScratchOverlayDB, TrieDB};
pub use self::error::TrieError;
pub use self::fog::{HexaryTrieFog, TrieFrontierCache};
pub use self::nibbles::Nibbles;
pub use self::node_hash::NodeHash;
pub use self::pruning::{PendingPrune, RefCounts};
pub use self::state::TrieState;
pub use self::traversal::{HexaryTrieNode, NodeType};
pub use self::trie_iter::NodeIterator;

use self::node::{LeafNode, NodeRef, RawNode};

/// RLP-encoded trie path.
pub type PathRLP = Vec<u8>;
/// RLP-encoded trie value.
pub type ValueRLP = Vec<u8>;
/// RLP-encoded trie node.
pub type NodeRLP = Vec<u8>;

lazy_static! {
    /// keccak(rlp("")) — the well-known hash of an empty trie's blank root.
    pub static ref EMPTY_TRIE_HASH: H256 = node_hash::keccak(&[0x80]);
}

/// A mutating, reference-counted-pruning-capable hexary Merkle Patricia
/// Trie. Every `set`/`delete` commits to the backing store immediately, so
/// [`Trie::root_hash`] is always in sync with what's durably stored.
pub struct Trie {
    state: TrieState,
    root: Option<NodeRef>,
    /// `Some` when this trie prunes unreferenced nodes as it mutates
    /// (spec §4.E "an optional 'prune' mode").
    ref_counts: Option<RefCounts>,
}

impl Trie {
    /// A trie over a fresh backing store, with pruning disabled.
    pub fn new(db: Box<dyn TrieDB>) -> Self {
        Self { state: TrieState::new(db), root: None, ref_counts: None }
    }

    /// Like [`Trie::new`], but tracks per-hash reference counts and deletes
    /// nodes from `db` as soon as they become unreachable.
    pub fn new_pruning(db: Box<dyn TrieDB>) -> Self {
        Self {
            state: TrieState::new(db),
            root: None,
            ref_counts: Some(RefCounts::new()),
        }
    }

    /// Opens a trie rooted at `root_hash` against an already-populated `db`.
    pub fn open(db: Box<dyn TrieDB>, root_hash: H256) -> Self {
        Self {
            state: TrieState::new(db),
            root: Self::root_ref_for(root_hash),
            ref_counts: None,
        }
    }

    /// Like [`Trie::open`], with pruning enabled.
    pub fn open_pruning(db: Box<dyn TrieDB>, root_hash: H256) -> Self {
        Self {
            state: TrieState::new(db),
            root: Self::root_ref_for(root_hash),
            ref_counts: Some(RefCounts::new()),
        }
    }

    fn root_ref_for(root_hash: H256) -> Option<NodeRef> {
        (root_hash != *EMPTY_TRIE_HASH).then(|| NodeRef::from_hash(NodeHash::Hashed(root_hash)))
    }

    pub fn is_pruning(&self) -> bool {
        self.ref_counts.is_some()
    }

    /// A non-pruning, read-only snapshot of this trie's backing store
    /// rooted at `root_hash` instead of the live root (spec §5). Rejected
    /// against a pruning trie: pruning may already have deleted nodes
    /// unreachable from the live root but still reachable from an older
    /// one, so a snapshot could silently observe a half-collected trie.
    pub fn at_root(&self, root_hash: H256) -> Result<Trie, TrieError> {
        if self.ref_counts.is_some() {
            return Err(TrieError::PruningViolation(
                "at_root snapshots are rejected against a pruning trie".to_string(),
            ));
        }
        Ok(Trie {
            state: TrieState::new_arc(self.state.db_arc()),
            root: Self::root_ref_for(root_hash),
            ref_counts: None,
        })
    }

    /// The hash of the current root, or [`EMPTY_TRIE_HASH`] for an empty
    /// trie. The root is always addressed by hash regardless of its
    /// encoded size (spec §3 "short-root exception").
    pub fn root_hash(&self) -> H256 {
        match &self.root {
            None => *EMPTY_TRIE_HASH,
            Some(root) => root.compute_hash(true).as_hash().unwrap_or(*EMPTY_TRIE_HASH),
        }
    }

    fn root_node(&self) -> Result<Option<std::sync::Arc<RawNode>>, TrieError> {
        match &self.root {
            None => Ok(None),
            Some(root) => {
                let root_hash = self.root_hash();
                let node = root.get_node(&self.state).map_err(|err| match err {
                    TrieError::NodeNotFound(missing) => TrieError::MissingTrieNode {
                        missing_hash: missing.as_hash().unwrap_or_default(),
                        root_hash,
                        key: None,
                        prefix: Nibbles::empty(),
                    },
                    other => other,
                })?;
                Ok(Some(node))
            }
        }
    }

    /// Notes the current root's hash as displaced, since a rewrite is about
    /// to replace it wholesale. `node.rs`'s `note_displaced` covers every
    /// child replaced along the way, but the root itself has no parent to
    /// note it, so this layer must.
    fn note_old_root(&self, pending: &mut Option<PendingPrune>) {
        if let (Some(p), Some(old_root)) = (pending.as_mut(), &self.root) {
            if let NodeHash::Hashed(h) = old_root.compute_hash(true) {
                p.note_old_hash(h);
            }
        }
    }

    /// Patches the placeholder `root_hash`/`key` fields `node.rs` leaves in
    /// a `MissingTrieNode` error raised mid-walk with the values only this
    /// layer knows.
    fn patch_missing(&self, err: TrieError, key: &[u8]) -> TrieError {
        match err {
            TrieError::MissingTrieNode { missing_hash, prefix, .. } => TrieError::MissingTrieNode {
                missing_hash,
                root_hash: self.root_hash(),
                key: Some(key.to_vec()),
                prefix,
            },
            other => other,
        }
    }

    /// Retrieves the value stored at `path`, if any.
    pub fn get(&self, path: &PathRLP) -> Result<Option<ValueRLP>, TrieError> {
        match self.root_node()? {
            None => Ok(None),
            Some(node) => node
                .get(&Nibbles::from_bytes(path), &self.state)
                .map_err(|e| self.patch_missing(e, path)),
        }
    }

    pub fn exists(&self, path: &PathRLP) -> Result<bool, TrieError> {
        Ok(self.get(path)?.is_some())
    }

    /// Inserts `value` at `path`, committing the rewritten path to the
    /// backing store (and, under pruning, deleting any node hashes the
    /// rewrite displaced once their reference count reaches zero).
    pub fn insert(&mut self, path: PathRLP, value: ValueRLP) -> Result<(), TrieError> {
        if value.is_empty() {
            self.remove(path)?;
            return Ok(());
        }
        let key = Nibbles::from_bytes(&path);
        let mut pending = self.ref_counts.is_some().then(PendingPrune::new);
        self.note_old_root(&mut pending);

        let new_root = match self.root_node()? {
            Some(node) => (*node)
                .clone()
                .insert(key, value, &self.state, pending.as_mut())
                .map_err(|e| self.patch_missing(e, &path))?,
            None => RawNode::Leaf(LeafNode::new(key, value)),
        };

        let new_root_ref = NodeRef::from_node(new_root);
        new_root_ref.commit(&self.state, true, self.ref_counts.as_ref())?;
        self.root = Some(new_root_ref);

        if let (Some(pending), Some(ref_counts)) = (pending.take(), &self.ref_counts) {
            pending.commit(ref_counts, self.state.db())?;
        }
        Ok(())
    }

    /// Removes `path`, returning its prior value if it was present.
    pub fn remove(&mut self, path: PathRLP) -> Result<Option<ValueRLP>, TrieError> {
        let key = Nibbles::from_bytes(&path);
        let Some(node) = self.root_node()? else {
            return Ok(None);
        };
        let old_value = node.get(&key, &self.state).map_err(|e| self.patch_missing(e, &path))?;
        if old_value.is_none() {
            return Ok(None);
        }

        let mut pending = self.ref_counts.is_some().then(PendingPrune::new);
        self.note_old_root(&mut pending);
        let (new_root, removed) = (*node)
            .clone()
            .remove(key, &self.state, pending.as_mut())
            .map_err(|e| self.patch_missing(e, &path))?;
        debug_assert!(removed);

        self.root = match new_root {
            Some(raw) => {
                let root_ref = NodeRef::from_node(raw);
                root_ref.commit(&self.state, true, self.ref_counts.as_ref())?;
                Some(root_ref)
            }
            None => None,
        };

        if let (Some(pending), Some(ref_counts)) = (pending.take(), &self.ref_counts) {
            pending.commit(ref_counts, self.state.db())?;
        }
        Ok(old_value)
    }

    /// Collects the proof of inclusion/exclusion of `path` against the
    /// current root (spec §4.D `get_proof`).
    pub fn get_proof(&self, path: &PathRLP) -> Result<Vec<NodeRLP>, TrieError> {
        proof::get_proof(&self.state, self.root.as_ref(), &Nibbles::from_bytes(path))
    }

    /// Stateless verification of a proof produced by [`Trie::get_proof`]
    /// against `root_hash`, without needing a live `Trie`.
    pub fn get_from_proof(
        root_hash: H256,
        path: &PathRLP,
        nodes: &[NodeRLP],
    ) -> Result<ValueRLP, TrieError> {
        proof::get_from_proof(root_hash, &Nibbles::from_bytes(path), nodes)
    }

    /// The annotated node found by consuming `prefix` from the root
    /// (spec §4.D/§4.F `traverse`).
    pub fn traverse(&self, prefix: &Nibbles) -> Result<HexaryTrieNode, TrieError> {
        traversal::traverse(&self.state, self.root.as_ref(), self.root_hash(), prefix)
    }

    /// Resumes a traversal from an already-resolved node (spec §4.F
    /// `traverse_from`), used by [`NodeIterator`] and remote-sync drivers
    /// replaying a [`TrieFrontierCache`] hit.
    pub fn traverse_from(
        &self,
        parent: &HexaryTrieNode,
        sub_prefix: &Nibbles,
        consumed_prefix: Nibbles,
    ) -> Result<HexaryTrieNode, TrieError> {
        traversal::traverse_from(&self.state, parent, sub_prefix, self.root_hash(), consumed_prefix)
    }

    /// A left-to-right node/key/value iterator over the current root.
    pub fn iter(&self) -> NodeIterator<'_> {
        NodeIterator::new(&self.state, self.root.clone(), self.root_hash())
    }

    /// Runs `f` against a scratch overlay layered over this trie's backing
    /// store, flushing every write into the real store only if `f`
    /// succeeds; on error (or early return) the overlay is simply dropped
    /// and nothing written underneath is touched (spec §5 "squash_changes").
    pub fn squash_changes<T>(
        &mut self,
        f: impl FnOnce(&mut Trie) -> Result<T, TrieError>,
    ) -> Result<T, TrieError> {
        let overlay = std::sync::Arc::new(ScratchOverlayDB::new(self.state.db_arc()));
        // The scratch trie always prunes, regardless of whether `self` does:
        // a squash must not leave nodes its own rewrites orphaned sitting in
        // the flushed store. It starts from `self`'s own counts (when it has
        // any) rather than an empty map, so prune decisions made inside `f`
        // see the same references `self` already knows about.
        let scratch_ref_counts = match &self.ref_counts {
            Some(ours) => RefCounts::from_snapshot(ours.snapshot()),
            None => RefCounts::new(),
        };
        let mut scratch = Trie {
            state: TrieState::new_arc(overlay.clone()),
            root: self.root.clone(),
            ref_counts: Some(scratch_ref_counts),
        };
        let result = f(&mut scratch)?;
        overlay.flush()?;
        self.root = scratch.root;
        if self.ref_counts.is_some() {
            self.ref_counts = scratch.ref_counts;
        }
        Ok(result)
    }

    /// Rebuilds the reference-count map from scratch by walking every node
    /// reachable from the current root, counting each reference once (spec
    /// §4.E `regenerate_ref_count`). Only meaningful on a pruning trie; a
    /// no-op otherwise.
    pub fn regenerate_ref_count(&self) -> Result<(), TrieError> {
        let Some(ref_counts) = &self.ref_counts else {
            return Ok(());
        };
        let mut hashes = Vec::new();
        if let Some(root) = &self.root {
            if let NodeHash::Hashed(h) = root.compute_hash(true) {
                hashes.push(h);
            }
        }
        for (_, node) in self.iter().nodes()? {
            if let Some(raw) = &node.raw {
                for child_hash in child_hashes(raw) {
                    hashes.push(child_hash);
                }
            }
        }
        ref_counts.regenerate(hashes);
        Ok(())
    }
}

fn child_hashes(node: &RawNode) -> Vec<H256> {
    match node {
        RawNode::Leaf(_) => Vec::new(),
        RawNode::Extension(ext) => match ext.child.compute_hash(false) {
            NodeHash::Hashed(h) => vec![h],
            NodeHash::Inline(_) => Vec::new(),
        },
        RawNode::Branch(branch) => branch
            .choices
            .iter()
            .filter_map(|c| match c.compute_hash(false) {
                NodeHash::Hashed(h) => Some(h),
                NodeHash::Inline(_) => None,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    fn new_memory_trie() -> Trie {
        Trie::new(Box::new(InMemoryTrieDB::new()))
    }

    fn new_pruning_memory_trie() -> (InMemoryTrieDB, Trie) {
        let db = InMemoryTrieDB::new();
        let trie = Trie::new_pruning(Box::new(db.clone()));
        (db, trie)
    }

    #[test]
    fn empty_trie_hash_is_well_known() {
        let trie = new_memory_trie();
        assert_eq!(trie.root_hash(), *EMPTY_TRIE_HASH);
        assert_eq!(
            trie.root_hash().as_bytes(),
            hex!("56e81f171bcc55a6ff8345e692c0f86e5b48e01b996cadc001622fb5e363b421")
        );
    }

    #[test]
    fn get_insert_words() {
        let mut trie = new_memory_trie();
        assert!(trie.get(&b"first".to_vec()).unwrap().is_none());
        trie.insert(b"first".to_vec(), b"value_a".to_vec()).unwrap();
        trie.insert(b"second".to_vec(), b"value_b".to_vec()).unwrap();
        assert_eq!(trie.get(&b"first".to_vec()).unwrap(), Some(b"value_a".to_vec()));
        assert_eq!(trie.get(&b"second".to_vec()).unwrap(), Some(b"value_b".to_vec()));
    }

    #[test]
    fn insert_remove_roundtrip() {
        let mut trie = new_memory_trie();
        trie.insert(b"do".to_vec(), b"verb".to_vec()).unwrap();
        trie.insert(b"horse".to_vec(), b"stallion".to_vec()).unwrap();
        trie.insert(b"doge".to_vec(), b"coin".to_vec()).unwrap();
        let removed = trie.remove(b"horse".to_vec()).unwrap();
        assert_eq!(removed, Some(b"stallion".to_vec()));
        assert_eq!(trie.get(&b"do".to_vec()).unwrap(), Some(b"verb".to_vec()));
        assert_eq!(trie.get(&b"doge".to_vec()).unwrap(), Some(b"coin".to_vec()));
        assert!(trie.get(&b"horse".to_vec()).unwrap().is_none());
    }

    #[test]
    fn open_on_empty_hash_yields_empty_trie() {
        let db = InMemoryTrieDB::new();
        let trie = Trie::open(Box::new(db), *EMPTY_TRIE_HASH);
        assert!(trie.root.is_none());
        assert_eq!(trie.root_hash(), *EMPTY_TRIE_HASH);
    }

    #[test]
    fn reopening_by_root_hash_sees_same_data() {
        let db = InMemoryTrieDB::new();
        let root_hash = {
            let mut trie = Trie::new(Box::new(db.clone()));
            trie.insert(b"key1".to_vec(), b"value1".to_vec()).unwrap();
            trie.insert(b"key2".to_vec(), b"value2".to_vec()).unwrap();
            trie.root_hash()
        };
        let reopened = Trie::open(Box::new(db), root_hash);
        assert_eq!(reopened.get(&b"key1".to_vec()).unwrap(), Some(b"value1".to_vec()));
        assert_eq!(reopened.get(&b"key2".to_vec()).unwrap(), Some(b"value2".to_vec()));
    }

    #[test]
    fn missing_backing_node_surfaces_as_missing_trie_node() {
        let db = InMemoryTrieDB::new();
        let mut trie = Trie::new(Box::new(db.clone()));
        trie.insert(b"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".to_vec(), b"a".to_vec()).unwrap();
        trie.insert(b"bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb".to_vec(), b"b".to_vec()).unwrap();
        let root_hash = trie.root_hash();

        // Simulate a partially-synced backing store: the root node itself
        // never made it over.
        db.delete(root_hash.as_bytes()).unwrap();

        let trie = Trie::open(Box::new(db), root_hash);
        let err = trie.get(&b"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".to_vec()).unwrap_err();
        assert!(matches!(err, TrieError::MissingTrieNode { .. }));
    }

    #[test]
    fn pruning_trie_deletes_overwritten_leaf() {
        let db = InMemoryTrieDB::new();
        let mut trie = Trie::new_pruning(Box::new(db.clone()));
        trie.insert(b"alpha".to_vec(), b"one".to_vec()).unwrap();
        let before = db.len();
        trie.insert(b"alpha".to_vec(), b"two".to_vec()).unwrap();
        // The old leaf's hash dropped to zero references and was pruned,
        // while the replacement leaf was written: size stays flat rather
        // than growing unboundedly across overwrites of the same key.
        assert_eq!(db.len(), before);
        assert_eq!(trie.get(&b"alpha".to_vec()).unwrap(), Some(b"two".to_vec()));
    }

    #[test]
    fn get_proof_round_trips_through_get_from_proof() {
        let mut trie = new_memory_trie();
        trie.insert(b"duck".to_vec(), b"duckling".to_vec()).unwrap();
        trie.insert(b"goose".to_vec(), b"gosling".to_vec()).unwrap();
        let proof = trie.get_proof(&b"duck".to_vec()).unwrap();
        let value = Trie::get_from_proof(trie.root_hash(), &b"duck".to_vec(), &proof).unwrap();
        assert_eq!(value, b"duckling");
    }

    #[test]
    fn squash_changes_discards_on_error() {
        let mut trie = new_memory_trie();
        trie.insert(b"kept".to_vec(), b"value".to_vec()).unwrap();
        let before = trie.root_hash();

        let result: Result<(), TrieError> = trie.squash_changes(|scratch| {
            scratch.insert(b"scratch-only".to_vec(), b"value".to_vec())?;
            Err(TrieError::BadTrieProof)
        });
        assert!(result.is_err());
        assert_eq!(trie.root_hash(), before);
        assert!(trie.get(&b"scratch-only".to_vec()).unwrap().is_none());
    }

    #[test]
    fn squash_changes_commits_on_success() {
        let mut trie = new_memory_trie();
        trie.insert(b"kept".to_vec(), b"value".to_vec()).unwrap();

        trie.squash_changes(|scratch| scratch.insert(b"added".to_vec(), b"value".to_vec()))
            .unwrap();
        assert_eq!(trie.get(&b"added".to_vec()).unwrap(), Some(b"value".to_vec()));
        assert_eq!(trie.get(&b"kept".to_vec()).unwrap(), Some(b"value".to_vec()));
    }

    #[test]
    fn squash_changes_prunes_overwritten_nodes_on_a_pruning_trie() {
        let (db, mut trie) = new_pruning_memory_trie();
        trie.insert(b"kept".to_vec(), vec![b'k'; 40]).unwrap();

        let key = b"overwritten".to_vec();
        trie.squash_changes(|scratch| scratch.insert(key.clone(), vec![b'1'; 40]))
            .unwrap();
        let before = db.len();

        trie.squash_changes(|scratch| scratch.insert(key.clone(), vec![b'2'; 40]))
            .unwrap();
        assert_eq!(db.len(), before, "overwriting inside a squash must not leak the stale leaf");
        assert_eq!(trie.get(&key).unwrap(), Some(vec![b'2'; 40]));
    }

    #[test]
    fn squash_changes_prunes_even_when_the_outer_trie_does_not() {
        let db = InMemoryTrieDB::new();
        let mut trie = Trie::new(Box::new(db.clone()));
        trie.insert(b"kept".to_vec(), vec![b'k'; 40]).unwrap();

        let key = b"overwritten".to_vec();
        trie.squash_changes(|scratch| scratch.insert(key.clone(), vec![b'1'; 40]))
            .unwrap();
        let before = db.len();

        trie.squash_changes(|scratch| scratch.insert(key.clone(), vec![b'2'; 40]))
            .unwrap();
        assert_eq!(
            db.len(),
            before,
            "a squash must prune its own orphaned rewrites regardless of the outer trie's pruning mode"
        );
        assert_eq!(trie.get(&key).unwrap(), Some(vec![b'2'; 40]));
    }

    #[test]
    fn regenerate_ref_count_is_noop_without_pruning() {
        let mut trie = new_memory_trie();
        trie.insert(b"a".to_vec(), b"b".to_vec()).unwrap();
        assert!(trie.regenerate_ref_count().is_ok());
    }

    #[test]
    fn at_root_reaches_a_prior_root_on_a_non_pruning_trie() {
        let mut trie = new_memory_trie();
        trie.insert(b"key".to_vec(), b"old".to_vec()).unwrap();
        let old_root = trie.root_hash();
        trie.insert(b"key".to_vec(), b"new".to_vec()).unwrap();

        let snapshot = trie.at_root(old_root).unwrap();
        assert_eq!(snapshot.get(&b"key".to_vec()).unwrap(), Some(b"old".to_vec()));
        assert_eq!(trie.get(&b"key".to_vec()).unwrap(), Some(b"new".to_vec()));
    }

    #[test]
    fn at_root_is_rejected_against_a_pruning_trie() {
        let mut trie = Trie::new_pruning(Box::new(InMemoryTrieDB::new()));
        trie.insert(b"key".to_vec(), b"old".to_vec()).unwrap();
        let old_root = trie.root_hash();
        trie.insert(b"key".to_vec(), b"new".to_vec()).unwrap();

        assert!(matches!(trie.at_root(old_root), Err(TrieError::PruningViolation(_))));
    }

    #[test]
    fn regenerate_ref_count_rebuilds_counts_for_pruning_trie() {
        let mut trie = Trie::new_pruning(Box::new(InMemoryTrieDB::new()));
        trie.insert(b"alpha".to_vec(), b"1".to_vec()).unwrap();
        trie.insert(b"beta".to_vec(), b"2".to_vec()).unwrap();
        trie.regenerate_ref_count().unwrap();
        let ref_counts = trie.ref_counts.as_ref().unwrap();
        if let NodeHash::Hashed(h) = trie.root.as_ref().unwrap().compute_hash(true) {
            assert!(ref_counts.get(&h) >= 1);
        }
    }
}
