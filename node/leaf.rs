use crate::nibbles::Nibbles;

/// A terminal node: the tail of a key (with its terminator nibble) paired
/// with the value stored at that key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafNode {
    pub partial: Nibbles,
    pub value: Vec<u8>,
}

impl LeafNode {
    pub fn new(partial: Nibbles, value: Vec<u8>) -> Self {
        Self { partial, value }
    }
}
