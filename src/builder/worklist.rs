//! Ordered block worklist.

use crate::{
    ir::{BlockFlags, Graph},
    utils::graph::NodeId,
};

/// Blocks waiting to be parsed, ordered so that [`WorkList::remove`] yields the block with the
/// lowest depth-first number.
///
/// The list is kept sorted by descending depth-first number and popped from the end. A block
/// is added at most once per build: adding sets `ON_WORK_LIST`, which is never cleared, and
/// parsed blocks are rejected.
#[derive(Debug, Default)]
pub struct WorkList {
    blocks: Vec<(i32, NodeId)>,
}

impl WorkList {
    /// Creates an empty worklist.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `block` unless it is already on the list or has been parsed.
    ///
    /// Returns `true` if the block was added.
    pub fn add(&mut self, graph: &mut Graph, block: NodeId) -> bool {
        let header = graph.block(block);
        if header.is_set(BlockFlags::ON_WORK_LIST) || header.is_set(BlockFlags::WAS_VISITED) {
            return false;
        }
        let dfn = header.depth_first_number;
        graph.set_block_flag(block, BlockFlags::ON_WORK_LIST);

        // insertion sort, descending by depth-first number
        let mut pos = self.blocks.len();
        while pos > 0 && self.blocks[pos - 1].0 < dfn {
            pos -= 1;
        }
        self.blocks.insert(pos, (dfn, block));
        true
    }

    /// Removes the block with the lowest depth-first number.
    pub fn remove(&mut self) -> Option<NodeId> {
        self.blocks.pop().map(|(_, block)| block)
    }

    /// Number of queued blocks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// `true` if no block is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}
