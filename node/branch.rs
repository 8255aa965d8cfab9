use crate::node::node_ref::NodeRef;

/// A 16-way fan-out node, one slot per nibble value, plus an optional value
/// for a key that terminates exactly at this branch.
#[derive(Debug, Clone)]
pub struct BranchNode {
    pub choices: [NodeRef; 16],
    pub value: Option<Vec<u8>>,
}

impl BranchNode {
    pub fn new(choices: [NodeRef; 16], value: Option<Vec<u8>>) -> Self {
        Self { choices, value }
    }

    pub fn empty() -> Self {
        Self {
            choices: std::array::from_fn(|_| NodeRef::blank()),
            value: None,
        }
    }

    /// Number of non-blank children, used by `remove` to decide whether a
    /// branch with a single remaining child should collapse into an
    /// extension (or a leaf, if that child is itself a leaf).
    pub fn child_count(&self) -> usize {
        self.choices.iter().filter(|c| !c.is_blank()).count()
    }

    /// The index of the sole non-blank child, if there is exactly one and
    /// no branch value.
    pub fn only_child_index(&self) -> Option<usize> {
        if self.value.is_some() {
            return None;
        }
        let mut found = None;
        for (i, choice) in self.choices.iter().enumerate() {
            if !choice.is_blank() {
                if found.is_some() {
                    return None;
                }
                found = Some(i);
            }
        }
        found
    }
}
