//! Basic block headers.

use bitflags::bitflags;

use crate::utils::graph::NodeId;

/// bci of the synthetic blocks that exist before the first bytecode executes (the
/// synchronization handler and the monitor enter of synchronized methods).
pub const SYNCHRONIZATION_ENTRY_BCI: i32 = -1;

bitflags! {
    #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
    /// Per-block state and classification flags
    pub struct BlockFlags : u16 {
        /// Entry of an exception handler; starts with an `ExceptionObject`
        const EXCEPTION_ENTRY = 0x0001;
        /// Target of a back edge, gets phis for every live slot on first reach
        const PARSER_LOOP_HEADER = 0x0002;
        /// Was added to the worklist (never cleared)
        const ON_WORK_LIST = 0x0004;
        /// Instructions have been parsed
        const WAS_VISITED = 0x0008;
        /// Inserted to split a critical edge
        const CRITICAL_EDGE_SPLIT = 0x0010;
        /// The synthetic catch-all handler that releases the lock of a synchronized method
        const DEFAULT_EXCEPTION_HANDLER = 0x0020;
        /// The standard entry block (bci 0)
        const STD_ENTRY = 0x0040;
    }
}

/// Header of a basic block.
///
/// The `BlockBegin` node owns the block: its successor slot 0 heads the instruction chain,
/// slots 1.. point at the entry blocks of the exception handlers covering the block. The
/// block's entry state is the node's `state_before`.
#[derive(Clone, Debug, PartialEq)]
pub struct BlockBegin {
    /// First bci, or [`SYNCHRONIZATION_ENTRY_BCI`]
    pub bci: i32,
    /// Unique number, assigned in creation order
    pub block_number: usize,
    /// Position in the parse order; `-1` for blocks outside the bytecode block map
    pub depth_first_number: i32,
    /// State flags
    pub flags: BlockFlags,
    /// One entry per incoming edge, duplicates allowed
    pub predecessors: Vec<NodeId>,
    /// Phis owned by this block
    pub phis: Vec<NodeId>,
    /// The block end, `NULL` until parsed
    pub end: NodeId,
}

impl BlockBegin {
    /// Creates an empty block header.
    #[must_use]
    pub fn new(bci: i32, block_number: usize) -> Self {
        BlockBegin {
            bci,
            block_number,
            depth_first_number: -1,
            flags: BlockFlags::empty(),
            predecessors: Vec::new(),
            phis: Vec::new(),
            end: NodeId::NULL,
        }
    }

    /// Tests a flag.
    #[must_use]
    #[inline]
    pub fn is_set(&self, flag: BlockFlags) -> bool {
        self.flags.contains(flag)
    }

    /// `true` if merges may still arrive after the block was parsed.
    #[must_use]
    pub fn accepts_late_merges(&self) -> bool {
        self.flags
            .intersects(BlockFlags::PARSER_LOOP_HEADER | BlockFlags::EXCEPTION_ENTRY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_block_is_blank() {
        let block = BlockBegin::new(7, 3);
        assert_eq!(block.bci, 7);
        assert_eq!(block.block_number, 3);
        assert!(block.end.is_null());
        assert!(block.flags.is_empty());
        assert!(!block.accepts_late_merges());
    }

    #[test]
    fn test_late_merge_flags() {
        let mut block = BlockBegin::new(0, 0);
        block.flags |= BlockFlags::EXCEPTION_ENTRY;
        assert!(block.accepts_late_merges());
        assert!(block.is_set(BlockFlags::EXCEPTION_ENTRY));
        assert!(!block.is_set(BlockFlags::WAS_VISITED));
    }
}
