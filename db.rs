//! The backing key-value store a trie persists its nodes to (spec §4.C).
//! Nodes are addressed by their [`NodeHash`] store key: either a 32-byte
//! hash or, for embedded nodes that never reach the store, not stored at
//! all (callers only ever look up [`NodeHash::Hashed`] keys).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::TrieError;

pub type TrieDBRef = Arc<dyn TrieDB>;

/// Minimal key-value contract a trie needs from its backing store.
/// Implementations must be safe to share across threads: a `Trie` may be
/// cloned cheaply and handed to multiple workers.
pub trait TrieDB: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, TrieError>;
    fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<(), TrieError>;
    fn put_batch(&self, batch: Vec<(Vec<u8>, Vec<u8>)>) -> Result<(), TrieError> {
        for (key, value) in batch {
            self.put(key, value)?;
        }
        Ok(())
    }
    /// Removes a key. Absence of the key is not an error: pruning is
    /// reference-counted above this layer, so a double-delete can happen
    /// legitimately during rollback.
    fn delete(&self, key: &[u8]) -> Result<(), TrieError>;
}

/// A `TrieDB` backed by an in-process `HashMap`, used for tests and for
/// tries that never need to outlive the process.
#[derive(Debug, Default, Clone)]
pub struct InMemoryTrieDB {
    inner: Arc<Mutex<HashMap<Vec<u8>, Vec<u8>>>>,
}

impl InMemoryTrieDB {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TrieDB for InMemoryTrieDB {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, TrieError> {
        Ok(self
            .inner
            .lock()
            .map_err(|_| TrieError::Storage("poisoned lock".into()))?
            .get(key)
            .cloned())
    }

    fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<(), TrieError> {
        self.inner
            .lock()
            .map_err(|_| TrieError::Storage("poisoned lock".into()))?
            .insert(key, value);
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<(), TrieError> {
        self.inner
            .lock()
            .map_err(|_| TrieError::Storage("poisoned lock".into()))?
            .remove(key);
        Ok(())
    }
}

/// A scratch overlay used by `squash_changes`: writes land in an in-memory
/// map layered over a shared `parent`, reads fall through to `parent` on a
/// miss, and the overlay is either discarded or flushed into `parent` as a
/// batch when the scope ends (spec §5 "squash_changes").
pub struct ScratchOverlayDB {
    parent: TrieDBRef,
    overlay: Mutex<HashMap<Vec<u8>, Option<Vec<u8>>>>,
}

impl ScratchOverlayDB {
    pub fn new(parent: TrieDBRef) -> Self {
        Self {
            parent,
            overlay: Mutex::new(HashMap::new()),
        }
    }

    /// Flushes every write recorded in the overlay into `parent`, in one
    /// batch. Deletions performed inside the scope are replayed as deletes.
    pub fn flush(&self) -> Result<(), TrieError> {
        let overlay = self
            .overlay
            .lock()
            .map_err(|_| TrieError::Storage("poisoned lock".into()))?;
        let mut batch = Vec::new();
        for (key, value) in overlay.iter() {
            match value {
                Some(value) => batch.push((key.clone(), value.clone())),
                None => self.parent.delete(key)?,
            }
        }
        self.parent.put_batch(batch)
    }
}

impl TrieDB for ScratchOverlayDB {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, TrieError> {
        let overlay = self
            .overlay
            .lock()
            .map_err(|_| TrieError::Storage("poisoned lock".into()))?;
        match overlay.get(key) {
            Some(value) => Ok(value.clone()),
            None => self.parent.get(key),
        }
    }

    fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<(), TrieError> {
        self.overlay
            .lock()
            .map_err(|_| TrieError::Storage("poisoned lock".into()))?
            .insert(key, Some(value));
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<(), TrieError> {
        self.overlay
            .lock()
            .map_err(|_| TrieError::Storage("poisoned lock".into()))?
            .insert(key.to_vec(), None);
        Ok(())
    }
}
