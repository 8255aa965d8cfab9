//! Trie fog (spec §4.G): an immutable record of which key prefixes a
//! partial/remote view of the trie has *not* resolved yet.

use std::collections::BTreeSet;

use rustc_hash::FxHashMap;

use crate::error::TrieError;
use crate::nibbles::{directional_distance, Nibbles};
use crate::node::RawNode;

/// Immutable set of unexplored-prefix `Nibbles`, maintaining the invariant
/// that no element is a strict prefix of another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexaryTrieFog {
    unexplored: BTreeSet<Nibbles>,
}

impl Default for HexaryTrieFog {
    fn default() -> Self {
        // A brand new fog starts knowing nothing: the whole trie, rooted
        // at the empty prefix, is unexplored.
        let mut unexplored = BTreeSet::new();
        unexplored.insert(Nibbles::empty());
        Self { unexplored }
    }
}

impl HexaryTrieFog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fog with nothing left to explore.
    pub fn complete() -> Self {
        Self {
            unexplored: BTreeSet::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.unexplored.is_empty()
    }

    pub fn len(&self) -> usize {
        self.unexplored.len()
    }

    pub fn is_empty(&self) -> bool {
        self.unexplored.is_empty()
    }

    pub fn contains(&self, prefix: &Nibbles) -> bool {
        self.unexplored.contains(prefix)
    }

    fn validate_sub_segments(sub_segments: &[Nibbles]) -> Result<(), TrieError> {
        for (i, a) in sub_segments.iter().enumerate() {
            for b in &sub_segments[i + 1..] {
                if a == b || a.is_prefix_of(b) || b.is_prefix_of(a) {
                    return Err(TrieError::InvalidFogSegments);
                }
            }
        }
        Ok(())
    }

    /// Removes `old_prefix` and inserts `old_prefix ‖ s` for each `s` in
    /// `sub_segments`. An empty `sub_segments` simply marks `old_prefix`
    /// fully known.
    pub fn explore(
        &self,
        old_prefix: &Nibbles,
        sub_segments: &[Nibbles],
    ) -> Result<HexaryTrieFog, TrieError> {
        if !self.unexplored.contains(old_prefix) {
            return Err(TrieError::InvalidFogSegments);
        }
        Self::validate_sub_segments(sub_segments)?;

        let mut unexplored = self.unexplored.clone();
        unexplored.remove(old_prefix);
        for segment in sub_segments {
            unexplored.insert(old_prefix.concat(segment));
        }
        Ok(HexaryTrieFog { unexplored })
    }

    /// Removes each of `prefixes`, all of which must already be present.
    pub fn mark_all_complete(&self, prefixes: &[Nibbles]) -> Result<HexaryTrieFog, TrieError> {
        let mut unexplored = self.unexplored.clone();
        for prefix in prefixes {
            if !unexplored.remove(prefix) {
                return Err(TrieError::InvalidFogSegments);
            }
        }
        Ok(HexaryTrieFog { unexplored })
    }

    /// The unexplored prefix with minimum directional distance to `key`;
    /// ties go to the lexicographically greater (rightmost) prefix.
    pub fn nearest_unknown(&self, key: &Nibbles) -> Result<Nibbles, TrieError> {
        self.unexplored
            .iter()
            .map(|candidate| (directional_distance(key, candidate), candidate))
            .min_by(|(da, a), (db, b)| da.cmp(db).then_with(|| b.cmp(a)))
            .map(|(_, candidate)| candidate.clone())
            .ok_or(TrieError::PerfectVisibility)
    }

    /// The leftmost unexplored prefix `>= key`.
    pub fn nearest_right(&self, key: &Nibbles) -> Result<Nibbles, TrieError> {
        if self.unexplored.is_empty() {
            return Err(TrieError::PerfectVisibility);
        }
        self.unexplored
            .range(key.clone()..)
            .next()
            .cloned()
            .ok_or(TrieError::FullDirectionalVisibility)
    }

    /// A stable byte encoding preserving the set exactly.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(self.unexplored.len() as u32).to_le_bytes());
        for prefix in &self.unexplored {
            let nibbles = prefix.as_ref();
            out.extend_from_slice(&(nibbles.len() as u32).to_le_bytes());
            out.extend_from_slice(nibbles);
        }
        out
    }

    pub fn deserialize(bytes: &[u8]) -> Result<HexaryTrieFog, TrieError> {
        let mut cursor = 0usize;
        let read_u32 = |cursor: &mut usize| -> Result<u32, TrieError> {
            let end = *cursor + 4;
            let slice = bytes.get(*cursor..end).ok_or(TrieError::InvalidFogSegments)?;
            *cursor = end;
            Ok(u32::from_le_bytes(slice.try_into().unwrap()))
        };

        let count = read_u32(&mut cursor)?;
        let mut unexplored = BTreeSet::new();
        for _ in 0..count {
            let len = read_u32(&mut cursor)? as usize;
            let end = cursor + len;
            let nibbles = bytes.get(cursor..end).ok_or(TrieError::InvalidFogSegments)?;
            unexplored.insert(Nibbles::from_hex(nibbles.to_vec()));
            cursor = end;
        }
        Ok(HexaryTrieFog { unexplored })
    }
}

/// Caches the parent node body at each unexplored prefix so that a single
/// `traverse_from` hop resolves the next step (spec §4.F/§4.G).
#[derive(Debug, Clone, Default)]
pub struct TrieFrontierCache {
    entries: FxHashMap<Nibbles, (RawNode, Nibbles)>,
}

impl TrieFrontierCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, unexplored_prefix: Nibbles, parent: RawNode, suffix_from_parent: Nibbles) {
        self.entries.insert(unexplored_prefix, (parent, suffix_from_parent));
    }

    pub fn get(&self, unexplored_prefix: &Nibbles) -> Option<&(RawNode, Nibbles)> {
        self.entries.get(unexplored_prefix)
    }

    pub fn remove(&mut self, unexplored_prefix: &Nibbles) {
        self.entries.remove(unexplored_prefix);
    }
}
