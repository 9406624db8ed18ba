//! Position of the builder inside the block being parsed.

use crate::utils::graph::NodeId;

/// Where the next instruction is appended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BuilderCursor {
    /// The block being filled
    pub block: NodeId,
    /// The last node on the block's chain (the block header while the block is empty)
    pub last: NodeId,
    /// bci of the bytecode being translated
    pub bci: i32,
}

impl BuilderCursor {
    /// Positions a cursor at the start of an empty block.
    #[must_use]
    pub fn at_block(block: NodeId, bci: i32) -> Self {
        BuilderCursor {
            block,
            last: block,
            bci,
        }
    }
}
