//! Monitors, synchronized methods and returns.
//!
//! A synchronized method locks its receiver (or its holder's class mirror when static) at
//! bci `-1`, before the first bytecode runs. Every return releases that lock, and a synthetic
//! catch-all handler releases it before rethrowing any exception that escapes the method.
//! Both releases sit at bci `-1` so no handler covers them.

use crate::{
    builder::{BuilderCursor, ExceptionHandler, GraphBuilder},
    ir::{BlockBegin, BlockFlags, Node, NodeKind, SYNCHRONIZATION_ENTRY_BCI},
    meta::{Constant, Kind, Representation},
    utils::graph::NodeId,
    Result,
};

impl GraphBuilder<'_> {
    /// `MonitorAddress` of lock `lock_number`, if the runtime uses on-stack lock records.
    fn lock_address(&mut self, cursor: &mut BuilderCursor, lock_number: usize) -> Result<Option<NodeId>> {
        if self.runtime.size_of_basic_object_lock() == 0 {
            return Ok(None);
        }
        let node = Node::new(NodeKind::MonitorAddress { lock_number }, Kind::Long);
        self.append(cursor, node).map(Some)
    }

    fn append_monitor_enter(&mut self, cursor: &mut BuilderCursor, object: NodeId) -> Result<NodeId> {
        let lock_number = self.frame.locks_size();
        let mut inputs = vec![object];
        inputs.extend(self.lock_address(cursor, lock_number)?);
        let node = Node::new(NodeKind::MonitorEnter { lock_number }, Kind::Void).with_inputs(inputs);
        let id = self.append(cursor, node)?;
        self.frame.lock(object);
        self.counters.record_locks(self.frame.locks_size());
        Ok(id)
    }

    /// Releases the innermost lock, which must be held on `object`.
    fn append_monitor_exit(&mut self, cursor: &mut BuilderCursor, object: NodeId) -> Result<NodeId> {
        let Some(lock_number) = self.frame.locks_size().checked_sub(1) else {
            return Err(bailout!("monitor stack underflow"));
        };
        let mut inputs = vec![object];
        inputs.extend(self.lock_address(cursor, lock_number)?);
        let node = Node::new(NodeKind::MonitorExit { lock_number }, Kind::Void).with_inputs(inputs);
        let id = self.append(cursor, node)?;
        self.frame.unlock();
        Ok(id)
    }

    pub(super) fn monitor_enter(&mut self, cursor: &mut BuilderCursor) -> Result<()> {
        let object = self.frame.apop();
        self.append_monitor_enter(cursor, object)?;
        Ok(())
    }

    pub(super) fn monitor_exit(&mut self, cursor: &mut BuilderCursor) -> Result<()> {
        let object = self.frame.apop();
        self.append_monitor_exit(cursor, object)?;
        Ok(())
    }

    /// Locks the method's monitor in the start block and creates the handler that releases
    /// it on exceptional exit. Returns the handler's block.
    pub(super) fn enter_synchronized_method(&mut self, cursor: &mut BuilderCursor) -> Result<NodeId> {
        cursor.bci = SYNCHRONIZATION_ENTRY_BCI;
        let method = self.method;
        let target = &method.method;
        let object = if target.is_static() {
            let mirror = Constant::type_encoding(target.holder().name(), Representation::JavaClass);
            self.append_constant(cursor, mirror)?
        } else {
            match self.frame.load_local(0) {
                Some(receiver) => receiver.value,
                None => internal_error!("synchronized instance method without a receiver"),
            }
        };
        self.sync_object = object;

        let enter = self.append_monitor_enter(cursor, object)?;
        let state = self.frame.create(self.graph, 0);
        self.graph.node_mut(enter).state_after = state;

        let mut header = BlockBegin::new(SYNCHRONIZATION_ENTRY_BCI, self.counters.next_block_number());
        header.flags = BlockFlags::EXCEPTION_ENTRY
            | BlockFlags::ON_WORK_LIST
            | BlockFlags::DEFAULT_EXCEPTION_HANDLER;
        let handler = self.graph.add_block(header);
        self.handlers.push(ExceptionHandler {
            start_bci: 0,
            end_bci: self.method.code_len(),
            handler_bci: SYNCHRONIZATION_ENTRY_BCI,
            catch_type: None,
            entry_block: handler,
        });
        Ok(handler)
    }

    /// Emits the body of the synchronized method's handler: release the lock and rethrow.
    pub(super) fn fill_sync_handler(&mut self, handler: NodeId) -> Result<()> {
        let state = self.graph.node(handler).state_before;
        self.frame.initialize_from(self.graph, state);
        self.graph.set_block_flag(handler, BlockFlags::WAS_VISITED);

        let mut cursor = BuilderCursor::at_block(handler, SYNCHRONIZATION_ENTRY_BCI);
        let exception = self.append(&mut cursor, Node::new(NodeKind::ExceptionObject, Kind::Object))?;

        let lock = self.frame.top_lock();
        invariant!(
            lock == Some(self.sync_object),
            "sync handler entered without the method lock ({:?})",
            lock
        );
        let exit = self.append_monitor_exit(&mut cursor, self.sync_object)?;
        let after = self.frame.create(self.graph, SYNCHRONIZATION_ENTRY_BCI);
        self.graph.node_mut(exit).state_after = after;

        self.frame.apush(exception);
        let before = self.frame.create(self.graph, SYNCHRONIZATION_ENTRY_BCI);
        self.frame.apop();
        self.frame.clear_stack();
        let throw = Node::new(
            NodeKind::Throw {
                safepoint: !self.config.no_safepoints,
            },
            Kind::Void,
        )
        .with_inputs(vec![exception])
        .with_state_before(before);
        self.finish_block(&mut cursor, throw, Vec::new(), SYNCHRONIZATION_ENTRY_BCI)?;
        Ok(())
    }

    /// Registers the receiver of a root-class constructor for finalization if its runtime
    /// type may have a finalizer.
    fn register_finalizer(&mut self, cursor: &mut BuilderCursor) -> Result<()> {
        let method = self.method;
        let holder = method.method.holder();
        let needed = match holder.exact_type() {
            Some(exact) => exact.has_finalizer(),
            None => holder.has_finalizable_subclass(),
        };
        if !needed {
            return Ok(());
        }

        let Some(receiver) = self.frame.load_local(0) else {
            return Err(bailout!("constructor without a receiver in local 0"));
        };
        let node = Node::new(NodeKind::RegisterFinalizer, Kind::Void).with_inputs(vec![receiver.value]);
        let id = self.append(cursor, node)?;
        let state = self.frame.create(self.graph, cursor.bci);
        self.graph.node_mut(id).state_after = state;
        Ok(())
    }

    pub(super) fn method_return(&mut self, cursor: &mut BuilderCursor, kind: Kind) -> Result<()> {
        let value = (kind != Kind::Void).then(|| self.frame.pop(kind));

        let method = self.method;
        let target = &method.method;
        if target.is_constructor() && target.holder().super_name().is_none() {
            self.register_finalizer(cursor)?;
        }

        self.frame.clear_stack();
        if target.is_synchronized() {
            let bci = cursor.bci;
            cursor.bci = SYNCHRONIZATION_ENTRY_BCI;
            let exit = self.append_monitor_exit(cursor, self.sync_object)?;
            cursor.bci = bci;
            let state = self.frame.create(self.graph, bci);
            self.graph.node_mut(exit).state_after = state;
        }

        let node = Node::new(
            NodeKind::Return {
                safepoint: !self.config.no_safepoints,
            },
            Kind::Void,
        )
        .with_inputs(value.into_iter().collect());
        self.finish_block(cursor, node, Vec::new(), cursor.bci)?;
        Ok(())
    }
}
