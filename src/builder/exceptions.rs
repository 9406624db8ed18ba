//! Exception handler table and exception edges.

use crate::{
    builder::{BuilderCursor, GraphBuilder},
    meta::{ExceptionHandlerEntry, TypeRef},
    utils::graph::NodeId,
    Result,
};

/// An exception table row bound to the block its handler code starts.
#[derive(Clone, Debug, PartialEq)]
pub struct ExceptionHandler {
    /// First covered bci (inclusive)
    pub start_bci: i32,
    /// End of the covered range (exclusive)
    pub end_bci: i32,
    /// Entry bci of the handler code
    pub handler_bci: i32,
    /// Caught type, `None` for a catch-all
    pub catch_type: Option<TypeRef>,
    /// The handler's entry block
    pub entry_block: NodeId,
}

impl ExceptionHandler {
    /// Binds an exception table row to its entry block.
    #[must_use]
    pub fn new(entry: &ExceptionHandlerEntry, entry_block: NodeId) -> Self {
        ExceptionHandler {
            start_bci: entry.start_bci,
            end_bci: entry.end_bci,
            handler_bci: entry.handler_bci,
            catch_type: entry.catch_type.clone(),
            entry_block,
        }
    }

    /// Returns `true` if `bci` lies within `[start_bci, end_bci)`.
    #[must_use]
    #[inline]
    pub fn covers(&self, bci: i32) -> bool {
        self.start_bci <= bci && bci < self.end_bci
    }

    /// Returns `true` for handlers catching every exception.
    #[must_use]
    #[inline]
    pub fn is_catch_all(&self) -> bool {
        self.catch_type.is_none()
    }
}

impl GraphBuilder<'_> {
    /// Entry blocks of the handlers an exception raised at `bci` may reach, in declaration
    /// order up to and including the first catch-all.
    pub(super) fn covering_handlers(&self, bci: i32) -> Vec<NodeId> {
        let mut entries = Vec::new();
        for handler in self.handlers.iter().filter(|h| h.covers(bci)) {
            entries.push(handler.entry_block);
            if handler.is_catch_all() {
                break;
            }
        }
        entries
    }

    /// Connects the trapping instruction `node` to every handler covering the cursor's bci.
    ///
    /// Each handler entry receives the current locals and locks with an empty stack as an
    /// additional incoming state, and becomes an exception successor of the current block.
    pub(super) fn handle_exception(&mut self, cursor: &BuilderCursor, node: NodeId) -> Result<()> {
        let entries = self.covering_handlers(cursor.bci);
        if entries.is_empty() {
            return Ok(());
        }

        let state = self.frame.create(self.graph, cursor.bci);
        for entry in entries {
            let entry_state = self.graph.node(entry).state_before;
            if !entry_state.is_null() {
                let expected = self.graph.frame_state(entry_state).locks_size;
                if expected != self.frame.locks_size() {
                    return Err(bailout!(
                        "handler at {} entered with {} locks, expected {} [bci={}]",
                        entry,
                        self.frame.locks_size(),
                        expected,
                        cursor.bci
                    ));
                }
            }

            let incoming = self.graph.duplicate_with_empty_stack(state);
            self.graph.add_predecessor(entry, cursor.block);
            self.graph.merge_or_clone(entry, incoming);
            self.graph.add_exception_successor(cursor.block, entry);
            self.graph.node_mut(node).exception_handlers.push(entry);
            self.worklist.add(self.graph, entry);

            self.graph.clear_inputs(incoming);
            self.graph.delete(incoming);
        }
        self.graph.clear_inputs(state);
        self.graph.delete(state);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        bytecode::{opcodes, BytecodeAssembler},
        ir::{BlockFlags, NodeKind},
        meta::{AccessFlags, ConstantTable, JavaMethod, JavaType, Signature},
        test::{build, method_with, test_class},
    };

    #[test]
    fn test_covers() {
        let entry = ExceptionHandlerEntry::new(2, 6, 9, Some(JavaType::class("E").into_ref()));
        let handler = ExceptionHandler::new(&entry, NodeId::new(5));
        assert!(!handler.covers(1));
        assert!(handler.covers(2));
        assert!(handler.covers(5));
        assert!(!handler.covers(6));
        assert!(!handler.is_catch_all());
    }

    #[test]
    fn test_call_gets_exception_edge() -> Result<()> {
        let mut pool = ConstantTable::new();
        let callee = JavaMethod::new(
            test_class(),
            "callee",
            Signature::parse("()V")?,
            AccessFlags::STATIC,
        )
        .into_ref();
        let cpi = pool.add_method(callee);

        let mut asm = BytecodeAssembler::new();
        asm.label("try")?
            .cpi(opcodes::INVOKESTATIC, cpi)?
            .label("end")?
            .vreturn()?
            .label("handler")?
            .astore(0)?
            .vreturn()?;
        let code = asm.finish()?;
        let method = method_with(
            AccessFlags::STATIC,
            "()V",
            code,
            1,
            Arc::new(pool),
        )
        .with_handler(ExceptionHandlerEntry::new(0, 3, 4, None))?;

        let ir = build(&method);
        let graph = ir.graph();
        let entry = graph.block_successors(graph.start())[0];
        let handlers = graph.exception_successors(entry);
        assert_eq!(handlers.len(), 1);
        let handler = handlers[0];
        assert!(graph.block(handler).is_set(BlockFlags::EXCEPTION_ENTRY));
        assert!(graph.predecessors(handler).contains(&entry));

        let first = graph.instructions(handler)[0];
        assert_eq!(graph.node(first).kind, NodeKind::ExceptionObject);

        let invoke = graph.instructions(entry)[0];
        assert_eq!(graph.node(invoke).exception_handlers, vec![handler]);
        ir.verify()?;
        Ok(())
    }
}
