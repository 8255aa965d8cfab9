//! Glues the raw node algorithms to a [`TrieDB`] backing store, caching
//! decoded nodes so a hot path doesn't re-decode RLP on every hop (spec
//! §4.C/§4.D).

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

use ethereum_types::H256;

use crate::codec;
use crate::db::TrieDB;
use crate::error::TrieError;
use crate::node::RawNode;
use crate::node_hash::NodeHash;

pub struct TrieState {
    db: Arc<dyn TrieDB>,
    cache: RefCell<HashMap<H256, Arc<RawNode>>>,
}

impl TrieState {
    pub fn new(db: Box<dyn TrieDB>) -> Self {
        Self::new_arc(Arc::from(db))
    }

    /// Like [`TrieState::new`], sharing an already-`Arc`'d store (used by
    /// `squash_changes` to layer a scratch overlay over the same backing
    /// store instance rather than a fresh copy).
    pub fn new_arc(db: Arc<dyn TrieDB>) -> Self {
        Self {
            db,
            cache: RefCell::new(HashMap::new()),
        }
    }

    /// Resolves a child reference to its decoded node. Inline references
    /// decode directly from their embedded bytes; hashed references go
    /// through the cache, falling back to the backing store.
    pub fn get_node(&self, hash: &NodeHash) -> Result<Arc<RawNode>, TrieError> {
        match hash {
            NodeHash::Inline(bytes) => {
                if bytes.is_empty() {
                    return Err(TrieError::NodeNotFound(hash.clone()));
                }
                Ok(Arc::new(codec::decode_raw(bytes)?))
            }
            NodeHash::Hashed(h) => {
                if let Some(node) = self.cache.borrow().get(h) {
                    return Ok(node.clone());
                }
                let bytes = self
                    .db
                    .get(h.as_bytes())?
                    .ok_or_else(|| TrieError::NodeNotFound(hash.clone()))?;
                let node = Arc::new(codec::decode_raw(&bytes)?);
                self.cache.borrow_mut().insert(*h, node.clone());
                Ok(node)
            }
        }
    }

    /// Writes an already-encoded node to the backing store, keyed by its
    /// hash. Called once per in-memory node during `commit`.
    pub fn insert_node(&self, hash: H256, encoded: Vec<u8>) -> Result<(), TrieError> {
        self.db.put(hash.as_bytes().to_vec(), encoded)
    }

    pub fn db(&self) -> &dyn TrieDB {
        self.db.as_ref()
    }

    pub fn db_arc(&self) -> Arc<dyn TrieDB> {
        self.db.clone()
    }
}
