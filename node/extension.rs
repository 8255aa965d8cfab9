use crate::nibbles::Nibbles;
use crate::node::node_ref::NodeRef;

/// A shared key fragment (no terminator: extensions never end a key) above
/// a single child, collapsing runs of single-child branches.
#[derive(Debug, Clone)]
pub struct ExtensionNode {
    pub prefix: Nibbles,
    pub child: NodeRef,
}

impl ExtensionNode {
    pub fn new(prefix: Nibbles, child: NodeRef) -> Self {
        Self { prefix, child }
    }
}
