//! Byte↔nibble conversion and the hex-prefix (compact-key) encoding used by
//! leaf and extension nodes.

use std::cmp::{self, Ordering};

use crate::error::TrieError;

/// A single nibble, always in `0..=15`.
pub type Nibble = u8;

/// Marks the end of a key inside a [`Nibbles`] sequence (the "terminator").
/// Kept as a sentinel value outside the `0..=15` range of a real nibble so
/// that `has_terminator` is a plain equality check against the last element.
const TERMINATOR: u8 = 16;

/// Splits a byte string into its nibbles, high nibble first, with no
/// terminator. `nibbles_to_bytes(bytes_to_nibbles(b)) == b` for every `b`.
pub fn bytes_to_nibbles(bytes: &[u8]) -> Vec<Nibble> {
    bytes
        .iter()
        .flat_map(|byte| [byte >> 4, byte & 0x0F])
        .collect()
}

/// Recombines a nibble sequence into bytes. Fails with
/// [`TrieError::InvalidNibbles`] if `nibbles` has odd length.
pub fn nibbles_to_bytes(nibbles: &[Nibble]) -> Result<Vec<u8>, TrieError> {
    if nibbles.len() % 2 != 0 {
        return Err(TrieError::InvalidNibbles);
    }
    Ok(nibbles
        .chunks_exact(2)
        .map(|pair| (pair[0] << 4) | pair[1])
        .collect())
}

/// An ordered sequence of nibbles, used both as a trie key (with a trailing
/// [`TERMINATOR`] marker) and as a plain path fragment (without one).
///
/// Equality, ordering and hashing only consider `data`; `already_consumed`
/// tracks nibbles a traversal has walked past so a cursor mid-walk can still
/// report the full prefix it started from (used by `MissingTrieNode` and
/// friends).
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Nibbles {
    data: Vec<u8>,
    already_consumed: Vec<u8>,
}

impl PartialEq for Nibbles {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

impl Eq for Nibbles {}

impl PartialOrd for Nibbles {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Nibbles {
    fn cmp(&self, other: &Self) -> Ordering {
        self.data.cmp(&other.data)
    }
}

impl std::hash::Hash for Nibbles {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.data.hash(state);
    }
}

impl Nibbles {
    /// Builds a `Nibbles` directly from raw nibble values (`0..=16`, where
    /// `16` may only appear as the last element, as a terminator).
    pub fn from_hex(data: Vec<u8>) -> Self {
        Self {
            data,
            already_consumed: Vec::new(),
        }
    }

    /// Splits `bytes` into nibbles and appends the terminator. This is the
    /// representation used for full trie keys.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self::from_raw(bytes, true)
    }

    /// Splits `bytes` into nibbles, appending the terminator iff `is_leaf`.
    pub fn from_raw(bytes: &[u8], is_leaf: bool) -> Self {
        let mut data = bytes_to_nibbles(bytes);
        if is_leaf {
            data.push(TERMINATOR);
        }
        Self::from_hex(data)
    }

    /// An empty, terminator-less path fragment.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Whether this sequence carries the leaf terminator.
    pub fn is_leaf(&self) -> bool {
        self.data.last() == Some(&TERMINATOR)
    }

    /// This sequence with its trailing terminator nibble dropped, if any.
    pub fn without_terminator(&self) -> Nibbles {
        if self.is_leaf() {
            Nibbles::from_hex(self.data[..self.data.len() - 1].to_vec())
        } else {
            self.clone()
        }
    }

    pub fn as_ref(&self) -> &[u8] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    /// Nibbles consumed so far by a walk that produced `self` via repeated
    /// [`Nibbles::skip_prefix`]/[`Nibbles::next`] calls, concatenated with
    /// the remaining `data`. Used to report the full prefix on errors raised
    /// mid-traversal.
    pub fn full_consumed_prefix(&self) -> Nibbles {
        Nibbles::from_hex(self.already_consumed.clone())
    }

    /// If `prefix` is a prefix of `self` (ignoring `self`'s terminator, if
    /// any, since prefixes never carry one), advances past it and returns
    /// `true`; otherwise leaves `self` untouched and returns `false`.
    pub fn skip_prefix(&mut self, prefix: &Nibbles) -> bool {
        if self.len() >= prefix.len() && self.data[..prefix.len()] == prefix.data[..] {
            self.already_consumed.extend_from_slice(&prefix.data);
            self.data.drain(..prefix.len());
            true
        } else {
            false
        }
    }

    /// Number of leading nibbles `self` and `other` share.
    pub fn count_prefix(&self, other: &Nibbles) -> usize {
        self.data
            .iter()
            .zip(other.data.iter())
            .take_while(|(a, b)| a == b)
            .count()
    }

    /// Removes and returns the first nibble, if any.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<u8> {
        if self.data.is_empty() {
            return None;
        }
        let nibble = self.data.remove(0);
        self.already_consumed.push(nibble);
        Some(nibble)
    }

    /// Removes and returns the first nibble if it is a valid branch index
    /// (`< 16`); otherwise leaves `self` untouched.
    pub fn next_choice(&mut self) -> Option<usize> {
        if self.data.first().is_some_and(|n| *n < 16) {
            self.next().map(usize::from)
        } else {
            None
        }
    }

    /// The nibble sequence from `start` (inclusive) to `end` (exclusive).
    pub fn slice(&self, start: usize, end: usize) -> Nibbles {
        Nibbles::from_hex(self.data[start..end].to_vec())
    }

    /// The nibble sequence starting at `offset`, preserving the notion of
    /// what has already been consumed.
    pub fn offset(&self, offset: usize) -> Nibbles {
        let mut already_consumed = self.already_consumed.clone();
        already_consumed.extend_from_slice(&self.data[..offset]);
        Nibbles {
            data: self.data[offset..].to_vec(),
            already_consumed,
        }
    }

    pub fn extend(&mut self, other: &Nibbles) {
        self.data.extend_from_slice(&other.data);
    }

    /// Concatenates two nibble sequences into a new one.
    pub fn concat(&self, other: &Nibbles) -> Nibbles {
        let mut out = self.clone();
        out.extend(other);
        out
    }

    pub fn at(&self, index: usize) -> usize {
        self.data[index] as usize
    }

    pub fn prepend(&mut self, nibble: u8) {
        self.data.insert(0, nibble);
    }

    pub fn append(&mut self, nibble: u8) {
        self.data.push(nibble);
    }

    /// Whether `self` is a strict prefix of `other` (used by the fog's
    /// no-overlap invariant).
    pub fn is_strict_prefix_of(&self, other: &Nibbles) -> bool {
        self.len() < other.len() && other.data[..self.len()] == self.data[..]
    }

    /// Whether `self` is a prefix of `other` (non-strict).
    pub fn is_prefix_of(&self, other: &Nibbles) -> bool {
        self.len() <= other.len() && other.data[..self.len()] == self.data[..]
    }

    /// Encodes the nibbles (minus terminator, if any) into hex-prefix
    /// (compact-key) form: see spec §4.A.
    pub fn encode_compact(&self) -> Vec<u8> {
        let is_leaf = self.is_leaf();
        let mut hex: &[u8] = if is_leaf {
            &self.data[..self.data.len() - 1]
        } else {
            &self.data[..]
        };

        let mut compact = Vec::with_capacity(hex.len() / 2 + 1);
        let odd = hex.len() % 2 == 1;
        let first = (if is_leaf { 0x20 } else { 0x00 }) | (if odd { 0x10 } else { 0x00 });
        let first = if odd {
            let nibble = hex[0];
            hex = &hex[1..];
            first | nibble
        } else {
            first
        };
        compact.push(first);
        for pair in hex.chunks_exact(2) {
            compact.push((pair[0] << 4) | pair[1]);
        }
        compact
    }

    /// Decodes a hex-prefix-encoded byte string back into `Nibbles`,
    /// restoring the terminator when the prefix nibble indicates a leaf.
    pub fn decode_compact(compact: &[u8]) -> Self {
        Self::from_hex(compact_to_hex(compact))
    }
}

fn compact_to_hex(compact: &[u8]) -> Vec<u8> {
    if compact.is_empty() {
        return Vec::new();
    }
    let first = compact[0];
    let is_leaf = first & 0x20 != 0;
    let is_odd = first & 0x10 != 0;

    let mut hex = Vec::with_capacity(compact.len() * 2);
    if is_odd {
        hex.push(first & 0x0F);
    }
    for byte in &compact[1..] {
        hex.push(byte >> 4);
        hex.push(byte & 0x0F);
    }
    if is_leaf {
        hex.push(TERMINATOR);
    }
    hex
}

/// Signed, component-wise directional distance used by
/// [`crate::fog::HexaryTrieFog::nearest_unknown`]: pads the shorter of two
/// nibble sequences on the low side with `0xF` nibbles and the high side
/// with `0x0` nibbles, then compares component-wise signed differences.
pub(crate) fn directional_distance(a: &Nibbles, b: &Nibbles) -> Vec<i16> {
    let len = cmp::max(a.len(), b.len());
    let pad = |n: &Nibbles, fill_high: bool| -> Vec<i16> {
        let mut out: Vec<i16> = n.data.iter().map(|&x| x as i16).collect();
        let fill = if fill_high { 0x0 } else { 0xF };
        out.resize(len, fill);
        out
    };
    // `a` is conventionally the "low" side key and `b` the candidate being
    // measured; padding direction is picked per spec: pad the shorter
    // sequence on the low side with 0xF, the high side with 0x0.
    let a_padded = pad(a, false);
    let b_padded = pad(b, true);
    a_padded
        .iter()
        .zip(b_padded.iter())
        .map(|(x, y)| y - x)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn roundtrip_even() {
        let bytes = vec![0xDE, 0xAD, 0xBE, 0xEF];
        let nibbles = bytes_to_nibbles(&bytes);
        assert_eq!(nibbles_to_bytes(&nibbles).unwrap(), bytes);
    }

    #[test]
    fn odd_nibbles_fail() {
        assert!(matches!(
            nibbles_to_bytes(&[1, 2, 3]),
            Err(TrieError::InvalidNibbles)
        ));
    }

    #[test]
    fn compact_key_extension_even() {
        let n = Nibbles::from_raw(&[0x12, 0x34], false);
        let compact = n.encode_compact();
        assert_eq!(compact, vec![0x00, 0x12, 0x34]);
        assert_eq!(Nibbles::decode_compact(&compact), n);
    }

    #[test]
    fn compact_key_extension_odd() {
        let mut n = Nibbles::from_hex(vec![0x1, 0x2, 0x3]);
        let compact = n.encode_compact();
        assert_eq!(compact, vec![0x11, 0x23]);
        assert_eq!(Nibbles::decode_compact(&compact), n);
        n.append(0); // sanity: still comparably equal after no-op mutation path
    }

    #[test]
    fn compact_key_leaf_even() {
        let n = Nibbles::from_raw(&[0xAB, 0xCD], true);
        let compact = n.encode_compact();
        assert_eq!(compact, vec![0x20, 0xAB, 0xCD]);
        assert_eq!(Nibbles::decode_compact(&compact), n);
    }

    #[test]
    fn compact_key_leaf_odd() {
        let n = Nibbles::from_hex(vec![0xA, TERMINATOR]);
        let compact = n.encode_compact();
        assert_eq!(compact, vec![0x3A]);
        assert_eq!(Nibbles::decode_compact(&compact), n);
    }

    #[test]
    fn skip_prefix_advances_and_tracks_consumed() {
        let mut n = Nibbles::from_hex(vec![1, 2, 3, 4]);
        let prefix = Nibbles::from_hex(vec![1, 2]);
        assert!(n.skip_prefix(&prefix));
        assert_eq!(n, Nibbles::from_hex(vec![3, 4]));
        assert_eq!(n.full_consumed_prefix(), Nibbles::from_hex(vec![1, 2]));
    }

    #[test]
    fn skip_prefix_rejects_mismatch() {
        let mut n = Nibbles::from_hex(vec![1, 2, 3]);
        let prefix = Nibbles::from_hex(vec![1, 3]);
        assert!(!n.skip_prefix(&prefix));
        assert_eq!(n, Nibbles::from_hex(vec![1, 2, 3]));
    }

    proptest! {
        #[test]
        fn roundtrip_prop(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
            let nibbles = bytes_to_nibbles(&bytes);
            prop_assert_eq!(nibbles_to_bytes(&nibbles).unwrap(), bytes);
        }

        #[test]
        fn compact_key_roundtrip_prop(
            bytes in proptest::collection::vec(any::<u8>(), 0..32),
            extra_nibble in 0u8..16,
            odd in any::<bool>(),
            is_leaf in any::<bool>(),
        ) {
            let mut hex = bytes_to_nibbles(&bytes);
            if odd {
                hex.push(extra_nibble);
            }
            if is_leaf {
                hex.push(TERMINATOR);
            }
            let n = Nibbles::from_hex(hex);
            let compact = n.encode_compact();
            prop_assert_eq!(Nibbles::decode_compact(&compact), n);
        }
    }
}
