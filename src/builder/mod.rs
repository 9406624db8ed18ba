//! Bytecode to IR graph construction.
//!
//! [`GraphBuilder`] abstractly interprets a method's bytecode block by block. Blocks come from
//! the [`BlockMap`] and are parsed in increasing depth-first number from a [`WorkList`], so
//! every forward predecessor of a join has merged its state before the join is parsed. Loop
//! headers and handler entries get phis for every live slot when they are first reached.
//!
//! # Architecture
//!
//! - `mod.rs` - block iteration, instruction appending, block ends and state propagation
//! - [`bytecodes`] - the opcode dispatch and the stack, local, arithmetic and branch opcodes
//! - [`access`] - constants, fields, arrays, allocation and type checks
//! - [`invoke`] - calls and devirtualization
//! - [`monitor`] - monitors, synchronized methods and returns
//! - [`exceptions`] - the handler table and exception edge construction
//!
//! Malformed bytecode discovered while parsing is reported as a bailout: the method simply is
//! not compiled. Inconsistencies in the builder's own bookkeeping panic.

mod access;
mod bytecodes;
mod cursor;
mod exceptions;
mod invoke;
mod monitor;
mod worklist;

pub use cursor::BuilderCursor;
pub use exceptions::ExceptionHandler;
pub use worklist::WorkList;

use rustc_hash::FxHashMap;

use crate::{
    bytecode::{opcodes, BlockMap, BytecodeStream},
    compiler::{Compilation, CompilerConfig, IrCounters},
    ir::{BlockBegin, BlockFlags, FrameStateBuilder, Graph, Node, NodeKind},
    meta::{Kind, MethodInfo, Runtime},
    utils::graph::NodeId,
    Error, Result,
};

/// Builds the IR graph of one method.
pub struct GraphBuilder<'a> {
    method: &'a MethodInfo,
    runtime: &'a dyn Runtime,
    config: &'a CompilerConfig,
    graph: &'a mut Graph,
    counters: &'a mut IrCounters,
    stream: BytecodeStream<'a>,
    block_map: BlockMap,
    blocks: FxHashMap<i32, NodeId>,
    handlers: Vec<ExceptionHandler>,
    frame: FrameStateBuilder,
    worklist: WorkList,
    start_block: NodeId,
    std_entry: NodeId,
    sync_object: NodeId,
}

impl<'a> GraphBuilder<'a> {
    /// Prepares a build: computes the block map and creates one block per bytecode block.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Bailout`] if the bytecode cannot be split into blocks.
    pub fn new(
        compilation: Compilation<'a>,
        graph: &'a mut Graph,
        counters: &'a mut IrCounters,
    ) -> Result<Self> {
        let method = compilation.method;
        let stream = BytecodeStream::new(&method.code).map_err(into_bailout)?;
        let block_map = BlockMap::build(method).map_err(into_bailout)?;

        let start_block = graph.add_block(BlockBegin::new(0, counters.next_block_number()));
        graph.set_start(start_block);

        let mut blocks = FxHashMap::default();
        for info in block_map.blocks() {
            let mut header = BlockBegin::new(info.start_bci, counters.next_block_number());
            header.depth_first_number = info.depth_first_number;
            if info.is_loop_header {
                header.flags |= BlockFlags::PARSER_LOOP_HEADER;
            }
            if info.is_exception_entry {
                header.flags |= BlockFlags::EXCEPTION_ENTRY;
            }
            blocks.insert(info.start_bci, graph.add_block(header));
        }

        let std_entry = blocks
            .get(&0)
            .copied()
            .ok_or_else(|| bailout!("no block starts at bci 0"))?;
        graph.set_block_flag(std_entry, BlockFlags::STD_ENTRY);

        let handlers = method
            .handlers
            .iter()
            .map(|entry| {
                let block = blocks.get(&entry.handler_bci).copied().ok_or_else(|| {
                    bailout!("no block starts at handler bci {}", entry.handler_bci)
                })?;
                Ok(ExceptionHandler::new(entry, block))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(GraphBuilder {
            method,
            runtime: compilation.runtime,
            config: compilation.config,
            graph,
            counters,
            stream,
            block_map,
            blocks,
            handlers,
            frame: FrameStateBuilder::new(method.max_locals),
            worklist: WorkList::new(),
            start_block,
            std_entry,
            sync_object: NodeId::NULL,
        })
    }

    /// Parses every reachable block.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Bailout`] if the method uses a construct the builder does not support,
    /// exceeds the instruction cap or is malformed, and [`Error::Unresolved`] if the constant
    /// pool has no entry for an index the bytecode uses.
    pub fn build(mut self) -> Result<()> {
        if self.config.trace_instructions() {
            log::trace!("parsing {}", self.method.name());
        }
        self.build_blocks().map_err(into_bailout)
    }

    fn build_blocks(&mut self) -> Result<()> {
        self.seed_locals();
        let start = self.start_block;
        let state = self.frame.create(self.graph, 0);
        self.graph.node_mut(start).state_before = state;
        self.graph
            .set_block_flag(start, BlockFlags::WAS_VISITED | BlockFlags::ON_WORK_LIST);

        let mut cursor = BuilderCursor::at_block(start, 0);
        let sync_handler = if self.method.method.is_synchronized() {
            Some(self.enter_synchronized_method(&mut cursor)?)
        } else {
            None
        };

        cursor.bci = 0;
        let std_entry = self.std_entry;
        self.finish_block(
            &mut cursor,
            Node::new(NodeKind::Base, Kind::Void),
            vec![std_entry],
            0,
        )?;

        while let Some(block) = self.worklist.remove() {
            if !self.graph.block(block).is_set(BlockFlags::WAS_VISITED) {
                self.parse_block(block)?;
            }
        }

        if let Some(handler) = sync_handler {
            if !self.graph.node(handler).state_before.is_null() {
                self.fill_sync_handler(handler)?;
            }
        }
        Ok(())
    }

    /// Creates a `Local` for the receiver and every argument.
    fn seed_locals(&mut self) {
        let method = self.method;
        let target = &method.method;
        let mut slot = 0;
        if !target.is_static() {
            self.store_parameter(slot, Kind::Object);
            slot += 1;
        }
        for argument in target.signature().arguments() {
            self.store_parameter(slot, argument.kind);
            slot += argument.kind.slots();
        }
    }

    fn store_parameter(&mut self, index: usize, kind: Kind) {
        let kind = kind.stack_kind();
        let local = self.graph.add(Node::new(NodeKind::Local { index }, kind));
        self.frame.store_local(index, kind, local);
    }

    fn parse_block(&mut self, block: NodeId) -> Result<()> {
        self.graph.set_block_flag(block, BlockFlags::WAS_VISITED);
        let state = self.graph.node(block).state_before;
        invariant!(!state.is_null(), "block {} parsed without an entry state", block);
        self.frame.initialize_from(self.graph, state);

        let header = self.graph.block(block);
        let block_bci = header.bci;
        let exception_entry = header.is_set(BlockFlags::EXCEPTION_ENTRY);
        let mut cursor = BuilderCursor::at_block(block, block_bci);

        if exception_entry {
            let exception = self.append(&mut cursor, Node::new(NodeKind::ExceptionObject, Kind::Object))?;
            self.frame.apush(exception);
        }

        self.stream.set_bci(block_bci)?;
        let mut prev_bci = block_bci;
        loop {
            let bci = self.stream.current_bci();
            let Some(op) = self.stream.current_bc() else {
                return Err(bailout!("control falls off the end of the code at bci {}", prev_bci));
            };

            if bci != block_bci && self.block_map.is_block_start(bci) {
                let next = self.block_at(bci)?;
                cursor.bci = prev_bci;
                self.finish_block(
                    &mut cursor,
                    Node::new(NodeKind::Goto { safepoint: false }, Kind::Void),
                    vec![next],
                    bci,
                )?;
                return Ok(());
            }

            cursor.bci = bci;
            self.trace_state();
            self.trace_instruction(bci, op, bci == block_bci);
            self.translate(&mut cursor, op)?;
            if self.graph.node(cursor.last).kind.is_block_end() {
                return Ok(());
            }

            self.stream.next()?;
            let next_bci = self.stream.current_bci();
            self.ensure_state_after(&cursor, next_bci);
            prev_bci = bci;
        }
    }

    /// Gives the last appended instruction a state-after snapshot if it needs one.
    fn ensure_state_after(&mut self, cursor: &BuilderCursor, bci: i32) {
        let last = self.graph.node(cursor.last);
        if last.kind.needs_state_after() && last.state_after.is_null() {
            let state = self.frame.create(self.graph, bci);
            self.graph.node_mut(cursor.last).state_after = state;
        }
    }

    /// Appends `node` at the cursor and returns its id.
    ///
    /// Counts the instruction against the configured cap and connects trapping instructions
    /// to the handlers covering the cursor's bci.
    fn append(&mut self, cursor: &mut BuilderCursor, mut node: Node) -> Result<NodeId> {
        node.bci = Some(cursor.bci);
        node.block = cursor.block;
        let can_trap = node.kind.can_trap();
        let id = self.graph.add(node);
        self.link(cursor, id);

        if self.counters.count_node() > self.config.max_instruction_count {
            return Err(bailout!("Method and/or inlining is too large"));
        }
        if can_trap {
            self.handle_exception(cursor, id)?;
        }
        Ok(id)
    }

    /// Links `id` after the cursor's last instruction.
    fn link(&mut self, cursor: &mut BuilderCursor, id: NodeId) {
        let node = self.graph.node_mut(id);
        invariant!(!node.appended, "instruction {} ({}) appended twice", id, node);
        node.appended = true;

        let last = self.graph.node(cursor.last);
        invariant!(
            last.successors.first().map_or(true, |next| next.is_null()),
            "appending {} after {} which already has a successor",
            id,
            cursor.last
        );
        self.graph.set_successor(cursor.last, 0, id);
        cursor.last = id;
    }

    /// Appends a block end, snapshots the state at `state_bci` as its state after and merges
    /// that state into every successor.
    fn finish_block(
        &mut self,
        cursor: &mut BuilderCursor,
        mut end: Node,
        successors: Vec<NodeId>,
        state_bci: i32,
    ) -> Result<NodeId> {
        end.successors = successors.clone();
        let id = self.append(cursor, end)?;

        let state = self.frame.create(self.graph, state_bci);
        self.graph.node_mut(id).state_after = state;
        self.graph.block_mut(cursor.block).end = id;

        for succ in successors {
            self.graph.add_predecessor(succ, cursor.block);
            self.graph.merge_or_clone(succ, state);
            self.worklist.add(self.graph, succ);
        }
        Ok(id)
    }

    fn block_at(&self, bci: i32) -> Result<NodeId> {
        self.blocks
            .get(&bci)
            .copied()
            .ok_or_else(|| bailout!("no block starts at bci {}", bci))
    }

    /// `true` if a branch to `target` from the current bci polls for safepoints.
    fn is_safepoint_branch(&self, cursor: &BuilderCursor, target: i32) -> bool {
        !self.config.no_safepoints && target <= cursor.bci
    }

    fn trace_instruction(&self, bci: i32, op: u8, block_start: bool) {
        if !self.config.trace_instructions() {
            return;
        }
        let mut line = format!(
            "{}{:>3}: {}",
            if block_start { '+' } else { '|' },
            bci,
            opcodes::name_of(op).unwrap_or("<illegal>")
        );
        for offset in 1..self.stream.next_bci() - bci {
            if let Ok(byte) = self.stream.read_u8(offset) {
                line.push(' ');
                line.push_str(&byte.to_string());
            }
        }
        log::trace!("{line}");
    }

    fn trace_state(&self) {
        if self.config.trace_states() {
            log::trace!(
                "|   state [locals = {}, stack = {}, method = {}]\n{}",
                self.frame.locals_size(),
                self.frame.stack_size(),
                self.method.name(),
                self.frame.dump(self.graph)
            );
        }
    }
}

/// Reports malformed input found during construction as a bailout.
fn into_bailout(error: Error) -> Error {
    match error {
        Error::Malformed { message, .. } => Error::Bailout { reason: message },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bytecode::BytecodeAssembler,
        compiler::CompilerConfig,
        meta::DefaultRuntime,
        test::{build_raw, instance_method, static_method},
    };

    fn construct(method: &MethodInfo, config: &CompilerConfig) -> Result<Graph> {
        let mut graph = Graph::new();
        let mut counters = IrCounters::default();
        let compilation = Compilation {
            method,
            runtime: &DefaultRuntime,
            config,
        };
        GraphBuilder::new(compilation, &mut graph, &mut counters)?.build()?;
        Ok(graph)
    }

    fn kinds(graph: &Graph, block: NodeId) -> Vec<&'static str> {
        graph
            .instructions(block)
            .into_iter()
            .map(|id| graph.node(id).kind.name())
            .collect()
    }

    #[test]
    fn test_straight_line() -> Result<()> {
        let mut asm = BytecodeAssembler::new();
        asm.iload(0)?.iconst(1)?.iadd()?.ireturn()?;
        let method = static_method("(I)I", asm.finish()?, 1);
        let graph = construct(&method, &CompilerConfig::default())?;

        let start = graph.start();
        assert_eq!(kinds(&graph, start), vec!["Base"]);
        let entry = graph.block_successors(start)[0];
        assert!(graph.block(entry).is_set(BlockFlags::STD_ENTRY));
        assert_eq!(kinds(&graph, entry), vec!["Constant", "Arithmetic", "Return"]);

        let chain = graph.instructions(entry);
        let add = graph.node(chain[1]);
        assert!(matches!(graph.node(add.inputs[0]).kind, NodeKind::Local { index: 0 }));
        assert_eq!(graph.node(chain[2]).inputs, vec![chain[1]]);
        graph.verify()?;
        Ok(())
    }

    #[test]
    fn test_receiver_occupies_slot_zero() -> Result<()> {
        let mut asm = BytecodeAssembler::new();
        asm.iload(1)?.ireturn()?;
        let method = instance_method("(I)I", asm.finish()?, 2);
        let graph = construct(&method, &CompilerConfig::default())?;

        let entry = graph.block_successors(graph.start())[0];
        let ret = graph.block(entry).end;
        let value = graph.node(ret).inputs[0];
        assert!(matches!(graph.node(value).kind, NodeKind::Local { index: 1 }));
        Ok(())
    }

    #[test]
    fn test_fallthrough_appends_goto() -> Result<()> {
        let mut asm = BytecodeAssembler::new();
        asm.iconst(0)?
            .istore(0)?
            .label("loop")?
            .iinc(0, 1)?
            .iload(0)?
            .ifne("loop")?
            .iload(0)?
            .ireturn()?;
        let method = static_method("()I", asm.finish()?, 1);
        let ir = build_raw(&method);
        let graph = ir.graph();

        let entry = graph.block_successors(graph.start())[0];
        let end = graph.block(entry).end;
        assert_eq!(graph.node(end).kind, NodeKind::Goto { safepoint: false });
        let header = graph.node(end).successors[0];
        assert!(graph.block(header).is_set(BlockFlags::PARSER_LOOP_HEADER));
        // entry and back edge
        assert_eq!(graph.predecessors(header).len(), 2);
        graph.verify()?;
        Ok(())
    }

    #[test]
    fn test_instruction_cap_bails_out() -> Result<()> {
        let mut asm = BytecodeAssembler::new();
        for _ in 0..8 {
            asm.iconst(1)?.op(opcodes::POP)?;
        }
        asm.vreturn()?;
        let method = static_method("()V", asm.finish()?, 0);

        let config = CompilerConfig::default().with_max_instruction_count(4);
        let err = construct(&method, &config).unwrap_err();
        assert_eq!(err.bailout_reason(), Some("Method and/or inlining is too large"));
        Ok(())
    }

    #[test]
    fn test_truncated_code_bails_out() {
        let method = static_method("()V", vec![opcodes::SIPUSH, 0], 0);
        let err = construct(&method, &CompilerConfig::default()).unwrap_err();
        assert!(err.is_bailout());
    }

    #[test]
    #[should_panic(expected = "appended twice")]
    fn test_append_twice_panics() {
        let method = static_method("()V", vec![opcodes::RETURN], 0);
        let config = CompilerConfig::default();
        let mut graph = Graph::new();
        let mut counters = IrCounters::default();
        let compilation = Compilation {
            method: &method,
            runtime: &DefaultRuntime,
            config: &config,
        };
        let mut builder = GraphBuilder::new(compilation, &mut graph, &mut counters).unwrap();
        let block = builder.std_entry;
        let mut cursor = BuilderCursor::at_block(block, 0);
        let id = builder
            .append(&mut cursor, Node::constant(crate::meta::Constant::Int(1)))
            .unwrap();
        let mut other = BuilderCursor::at_block(builder.start_block, 0);
        builder.link(&mut other, id);
    }
}
