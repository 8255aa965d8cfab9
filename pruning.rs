//! Reference-counted pruning (spec §4.E): deletes nodes from the backing
//! store once no reachable trie references them, without corrupting
//! sub-structure shared by other tries or other roots.

use std::cell::RefCell;

use ethereum_types::H256;
use rustc_hash::FxHashMap;

use crate::db::TrieDB;
use crate::error::TrieError;

/// Process-wide (per mutating trie) count of known outgoing references to
/// each hash from within the engine-tracked working set. Does not track
/// pre-existing references already resident in the underlying store.
#[derive(Debug, Default)]
pub struct RefCounts {
    counts: RefCell<FxHashMap<H256, i64>>,
}

impl RefCounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a fresh `RefCounts` pre-seeded with `snapshot`'s counts, so a
    /// scratch trie layered over the same store sees the same baseline the
    /// trie it was forked from already holds.
    pub fn from_snapshot(snapshot: FxHashMap<H256, i64>) -> Self {
        Self { counts: RefCell::new(snapshot) }
    }

    pub fn get(&self, hash: &H256) -> i64 {
        *self.counts.borrow().get(hash).unwrap_or(&0)
    }

    /// Called whenever a node is written during commit.
    pub fn increment(&self, hash: H256) {
        *self.counts.borrow_mut().entry(hash).or_insert(0) += 1;
    }

    fn decrement(&self, hash: H256, by: i64) -> i64 {
        let mut counts = self.counts.borrow_mut();
        let entry = counts.entry(hash).or_insert(0);
        *entry -= by;
        *entry
    }

    /// Rebuilds the map from scratch given every hash reachable from the
    /// live trie, each reported once per reference. Used for self-tests
    /// and recovery (`regenerate_ref_count`).
    pub fn regenerate<I: IntoIterator<Item = H256>>(&self, reachable: I) {
        let mut counts = self.counts.borrow_mut();
        counts.clear();
        for hash in reachable {
            *counts.entry(hash).or_insert(0) += 1;
        }
    }

    pub fn snapshot(&self) -> FxHashMap<H256, i64> {
        self.counts.borrow().clone()
    }
}

/// A batched mutation scope: every node hash displaced by a rewrite during
/// one set/delete is noted here, and only decremented/possibly-pruned on
/// successful completion. Dropping the scope without calling [`commit`]
/// performs no deletes and leaves `ref_count` untouched.
///
/// [`commit`]: PendingPrune::commit
#[derive(Debug, Default)]
pub struct PendingPrune {
    decrements: FxHashMap<H256, i64>,
}

impl PendingPrune {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `hash`, previously referenced, is being displaced by a
    /// rewrite and so loses one reference.
    pub fn note_old_hash(&mut self, hash: H256) {
        *self.decrements.entry(hash).or_insert(0) += 1;
    }

    /// Applies every recorded decrement to `ref_counts`, deleting any hash
    /// whose resulting count drops to zero or below from `db`. Consumes
    /// `self`: a scope can only be closed once.
    pub fn commit(self, ref_counts: &RefCounts, db: &dyn TrieDB) -> Result<(), TrieError> {
        for (hash, by) in self.decrements {
            let remaining = ref_counts.decrement(hash, by);
            if remaining <= 0 {
                if db.get(hash.as_bytes())?.is_none() {
                    return Err(TrieError::PruningViolation(format!(
                        "hash {hash:#x} scheduled for deletion but absent from storage"
                    )));
                }
                db.delete(hash.as_bytes())?;
            }
        }
        Ok(())
    }

    /// Explicit, no-op rollback: discards every recorded decrement without
    /// touching `ref_counts` or `db`. Named for symmetry with `commit` so
    /// call sites read as an explicit choice rather than relying on drop.
    pub fn rollback(self) {}
}
