//! Basic block discovery over raw bytecode.
//!
//! The [`BlockMap`] splits a method's code into basic blocks before any graph construction
//! happens. A block starts at bci 0, at every branch and switch target, after every
//! instruction that ends a block, at every handler entry and at both ends of every protected
//! range. The map also records the CFG edges between blocks (normal and exceptional), assigns
//! depth-first numbers in reverse postorder and marks loop headers.
//!
//! Depth-first numbers drive the builder's worklist: blocks are parsed in increasing number,
//! so every forward predecessor of a block has been parsed before the block itself. A block
//! that has a predecessor with an equal or higher number is reached through a back edge and
//! is a loop header.

use rustc_hash::FxHashMap;

use crate::{
    bytecode::{opcodes, BytecodeStream},
    meta::MethodInfo,
    utils::{
        graph::{algorithms, GraphBase, NodeId, Successors},
        BitSet,
    },
    Result,
};

/// A basic block of bytecode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockInfo {
    /// First bci of the block
    pub start_bci: i32,
    /// One past the last bci of the block
    pub end_bci: i32,
    /// bci of the block's last instruction
    pub last_bci: i32,
    /// Start bcis of the normal successors, in bytecode order
    pub successors: Vec<i32>,
    /// Entry bcis of the handlers covering this block, in declaration order
    pub handlers: Vec<i32>,
    /// Reached through a back edge
    pub is_loop_header: bool,
    /// Entry of an exception handler
    pub is_exception_entry: bool,
    /// Position in reverse postorder; unreachable blocks are numbered after all others
    pub depth_first_number: i32,
}

/// The basic blocks of one method.
#[derive(Clone, Debug)]
pub struct BlockMap {
    blocks: Vec<BlockInfo>,
    index: FxHashMap<i32, usize>,
}

impl BlockMap {
    /// Computes the block map of a method.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the code is truncated, a branch leaves the code
    /// or lands inside an instruction, or control falls off the end of the code.
    pub fn build(method: &MethodInfo) -> Result<BlockMap> {
        let code = &method.code;
        let code_len = method.code_len();

        let mut instruction_starts = BitSet::new(code.len());
        let mut block_starts = BitSet::new(code.len() + 1);
        let mut targets = Vec::new();
        block_starts.insert(0);

        let mut stream = BytecodeStream::new(code)?;
        while let Some(op) = stream.current_bc() {
            let bci = stream.current_bci();
            instruction_starts.insert(bci as usize);

            if opcodes::is_block_end(op) {
                for target in Self::branch_targets(&stream, op)? {
                    targets.push((bci, target));
                    if (0..code_len).contains(&target) {
                        block_starts.insert(target as usize);
                    }
                }
                if stream.next_bci() < code_len {
                    block_starts.insert(stream.next_bci() as usize);
                }
            } else if stream.next_bci() >= code_len {
                return Err(malformed_error!(
                    "Control falls off the end of the code at bci {}",
                    bci
                ));
            }
            stream.next()?;
        }

        for handler in &method.handlers {
            block_starts.insert(handler.start_bci as usize);
            block_starts.insert(handler.handler_bci as usize);
            if handler.end_bci < code_len {
                block_starts.insert(handler.end_bci as usize);
            }
        }

        for (from, to) in &targets {
            if !(0..code_len).contains(to) || !instruction_starts.contains(*to as usize) {
                return Err(malformed_error!(
                    "Branch at bci {} to invalid target {}",
                    from,
                    to
                ));
            }
        }
        for start in block_starts.iter() {
            if start < code.len() && !instruction_starts.contains(start) {
                return Err(malformed_error!(
                    "Handler boundary {} is inside an instruction",
                    start
                ));
            }
        }

        let starts: Vec<i32> = block_starts
            .iter()
            .filter(|&s| s < code.len())
            .map(|s| s as i32)
            .collect();

        let mut blocks = Vec::with_capacity(starts.len());
        let mut index = FxHashMap::default();
        for (i, &start) in starts.iter().enumerate() {
            let end = starts.get(i + 1).copied().unwrap_or(code_len);
            let last = (start..end)
                .rev()
                .find(|&b| instruction_starts.contains(b as usize))
                .unwrap_or(start);

            stream.set_bci(last)?;
            let op = stream.current_bc().unwrap_or(opcodes::NOP);
            let successors = if opcodes::is_block_end(op) {
                Self::branch_targets(&stream, op)?
            } else {
                vec![end]
            };

            let handlers = method
                .handlers
                .iter()
                .filter(|h| h.covers(start))
                .map(|h| h.handler_bci)
                .collect();

            index.insert(start, i);
            blocks.push(BlockInfo {
                start_bci: start,
                end_bci: end,
                last_bci: last,
                successors,
                handlers,
                is_loop_header: false,
                is_exception_entry: method.handlers.iter().any(|h| h.handler_bci == start),
                depth_first_number: -1,
            });
        }

        let mut map = BlockMap { blocks, index };
        map.number_blocks();
        Ok(map)
    }

    fn branch_targets(stream: &BytecodeStream<'_>, op: u8) -> Result<Vec<i32>> {
        Ok(match op {
            opcodes::GOTO | opcodes::GOTO_W | opcodes::JSR | opcodes::JSR_W => {
                vec![stream.read_branch_dest()?]
            }
            opcodes::TABLESWITCH => {
                let table = stream.read_table_switch()?;
                let mut dests = table.dests;
                dests.push(table.default_dest);
                dests
            }
            opcodes::LOOKUPSWITCH => {
                let lookup = stream.read_lookup_switch()?;
                let mut dests = lookup.dests;
                dests.push(lookup.default_dest);
                dests
            }
            op if opcodes::is_conditional_branch(op) => {
                vec![stream.read_branch_dest()?, stream.next_bci()]
            }
            _ => Vec::new(),
        })
    }

    fn number_blocks(&mut self) {
        let order = algorithms::reverse_postorder(&*self, NodeId::new(0));
        let mut rpo = vec![usize::MAX; self.blocks.len()];
        for (n, id) in order.iter().enumerate() {
            rpo[id.index()] = n;
        }

        let mut next = order.len();
        for (i, block) in self.blocks.iter_mut().enumerate() {
            if rpo[i] == usize::MAX {
                block.depth_first_number = next as i32;
                next += 1;
            } else {
                block.depth_first_number = rpo[i] as i32;
            }
        }

        for i in 0..self.blocks.len() {
            if rpo[i] == usize::MAX {
                continue;
            }
            let succs: Vec<usize> = self.successors(NodeId::new(i)).map(|s| s.index()).collect();
            for s in succs {
                if rpo[s] <= rpo[i] {
                    self.blocks[s].is_loop_header = true;
                }
            }
        }
    }

    /// All blocks, ordered by start bci.
    #[must_use]
    pub fn blocks(&self) -> &[BlockInfo] {
        &self.blocks
    }

    /// Start bcis of all blocks, ascending.
    pub fn block_starts(&self) -> impl Iterator<Item = i32> + '_ {
        self.blocks.iter().map(|b| b.start_bci)
    }

    /// Number of blocks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// `true` if the map holds no blocks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Returns the block starting at `bci`.
    #[must_use]
    pub fn block_at(&self, bci: i32) -> Option<&BlockInfo> {
        self.index.get(&bci).map(|&i| &self.blocks[i])
    }

    /// `true` if a block starts at `bci`.
    #[must_use]
    pub fn is_block_start(&self, bci: i32) -> bool {
        self.index.contains_key(&bci)
    }

    /// `true` if the block at `bci` is reached through a back edge.
    #[must_use]
    pub fn is_loop_header(&self, bci: i32) -> bool {
        self.block_at(bci).is_some_and(|b| b.is_loop_header)
    }

    /// `true` if the block at `bci` is a handler entry.
    #[must_use]
    pub fn is_exception_entry(&self, bci: i32) -> bool {
        self.block_at(bci).is_some_and(|b| b.is_exception_entry)
    }

    /// Depth-first number of the block at `bci`.
    #[must_use]
    pub fn depth_first_number(&self, bci: i32) -> Option<i32> {
        self.block_at(bci).map(|b| b.depth_first_number)
    }
}

impl GraphBase for BlockMap {
    fn node_count(&self) -> usize {
        self.blocks.len()
    }

    fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.blocks.len()).map(NodeId::new)
    }
}

impl Successors for BlockMap {
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        let block = &self.blocks[node.index()];
        block
            .successors
            .iter()
            .chain(block.handlers.iter())
            .filter_map(|bci| self.index.get(bci).copied())
            .map(NodeId::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{bytecode::opcodes::*, meta::ExceptionHandlerEntry, test::static_method};

    #[test]
    fn test_straight_line_is_one_block() {
        let method = static_method("()I", vec![ICONST_1, ICONST_2, IADD, IRETURN], 0);
        let map = BlockMap::build(&method).unwrap();
        assert_eq!(map.len(), 1);
        let block = map.block_at(0).unwrap();
        assert_eq!(block.end_bci, 4);
        assert_eq!(block.last_bci, 3);
        assert!(block.successors.is_empty());
        assert_eq!(block.depth_first_number, 0);
    }

    #[test]
    fn test_diamond() {
        // 0: iload_0  1: ifeq 8  4: iconst_1  5: goto 9  8: iconst_2  9: ireturn
        let code = vec![ILOAD_0, IFEQ, 0, 7, ICONST_1, GOTO, 0, 4, ICONST_2, IRETURN];
        let map = BlockMap::build(&static_method("(I)I", code, 1)).unwrap();

        assert_eq!(map.block_starts().collect::<Vec<_>>(), vec![0, 4, 8, 9]);
        assert_eq!(map.block_at(0).unwrap().successors, vec![8, 4]);
        assert_eq!(map.block_at(4).unwrap().successors, vec![9]);
        assert_eq!(map.block_at(8).unwrap().successors, vec![9]);
        assert!(!map.is_loop_header(9));
        assert_eq!(map.depth_first_number(0), Some(0));
        assert_eq!(map.depth_first_number(9), Some(3));
    }

    #[test]
    fn test_loop_header() {
        // 0: iconst_0  1: istore_0  2: iinc 0 1  5: iload_0  6: ifne -4  9: return
        let code = vec![ICONST_0, ISTORE_0, IINC, 0, 1, ILOAD_0, IFNE, 0xff, 0xfc, RETURN];
        let map = BlockMap::build(&static_method("()V", code, 1)).unwrap();
        assert_eq!(map.block_starts().collect::<Vec<_>>(), vec![0, 2, 9]);
        assert!(map.is_loop_header(2));
        assert!(!map.is_loop_header(0));
        assert!(!map.is_loop_header(9));
    }

    #[test]
    fn test_handler_boundaries() {
        // 0: aload_0  1: arraylength  2: pop  3: return  4: pop  5: return
        let code = vec![ALOAD_0, ARRAYLENGTH, POP, RETURN, POP, RETURN];
        let method = static_method("([I)V", code, 1)
            .with_handler(ExceptionHandlerEntry::new(1, 3, 4, None))
            .unwrap();
        let map = BlockMap::build(&method).unwrap();

        assert_eq!(map.block_starts().collect::<Vec<_>>(), vec![0, 1, 3, 4]);
        assert!(map.is_exception_entry(4));
        assert_eq!(map.block_at(1).unwrap().handlers, vec![4]);
        assert!(map.block_at(0).unwrap().handlers.is_empty());
        assert_eq!(map.block_at(1).unwrap().successors, vec![3]);
    }

    #[test]
    fn test_unreachable_blocks_numbered_last() {
        // 0: goto 4  3: nop (dead)  4: return
        let code = vec![GOTO, 0, 4, NOP, RETURN];
        let map = BlockMap::build(&static_method("()V", code, 0)).unwrap();
        assert_eq!(map.depth_first_number(0), Some(0));
        assert_eq!(map.depth_first_number(4), Some(1));
        assert_eq!(map.depth_first_number(3), Some(2));
    }

    #[test]
    fn test_malformed_code() {
        assert!(BlockMap::build(&static_method("()V", vec![NOP], 0)).is_err());
        assert!(BlockMap::build(&static_method("()V", vec![GOTO, 0, 10], 0)).is_err());
        // branch into the middle of sipush
        let code = vec![SIPUSH, 0, 1, GOTO, 0xff, 0xfe];
        assert!(BlockMap::build(&static_method("()V", code, 0)).is_err());
    }
}
