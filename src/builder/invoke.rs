//! Calls and devirtualization.

use crate::{
    builder::{BuilderCursor, GraphBuilder},
    bytecode::opcodes,
    ir::{Node, NodeKind},
    meta::{AccessFlags, JavaType, MethodRef, Representation, TypeRef},
    utils::graph::NodeId,
    Result,
};

impl GraphBuilder<'_> {
    fn lookup_method(&self, opcode: u8) -> Result<MethodRef> {
        let cpi = self.stream.read_cpi()?;
        self.method.pool.lookup_method(cpi, opcode)
    }

    pub(super) fn invoke_static(&mut self, cursor: &mut BuilderCursor) -> Result<()> {
        let target = self.lookup_method(opcodes::INVOKESTATIC)?;
        let holder = target.holder().clone();
        let initialized =
            !self.config.test_patching && target.is_resolved() && holder.is_initialized();
        if !initialized && self.config.resolve_class_before_static_invoke {
            self.resolve_class(cursor, Representation::StaticFields, &holder, false)?;
        }
        let args = self
            .frame
            .pop_arguments(target.signature().argument_slots(false));
        self.append_invoke(cursor, opcodes::INVOKESTATIC, target, args)
    }

    pub(super) fn invoke_special(&mut self, cursor: &mut BuilderCursor) -> Result<()> {
        let target = self.lookup_method(opcodes::INVOKESPECIAL)?;
        let args = self
            .frame
            .pop_arguments(target.signature().argument_slots(true));
        self.append_invoke(cursor, opcodes::INVOKESPECIAL, target, args)
    }

    /// `invokevirtual` and `invokeinterface`, bound directly when the receiver's target can
    /// be determined at compile time.
    pub(super) fn invoke_virtual(&mut self, cursor: &mut BuilderCursor, opcode: u8) -> Result<()> {
        let target = self.lookup_method(opcode)?;
        let args = self
            .frame
            .pop_arguments(target.signature().argument_slots(true));

        if target.is_resolved() && !self.config.test_patching {
            if target.can_be_statically_bound() && !target.is_abstract() {
                return self.append_invoke(cursor, opcodes::INVOKESPECIAL, target, args);
            }

            let receiver = args.first().copied().unwrap_or(NodeId::NULL);
            if let Some(exact) = self.exact_type(target.holder(), receiver) {
                if let Some(resolved) = self.runtime.resolve_method_impl(&exact, &target) {
                    log::trace!(
                        "devirtualized {} on exact type {}",
                        target.qualified_name(),
                        exact.name()
                    );
                    return self.append_invoke(cursor, opcodes::INVOKESPECIAL, resolved, args);
                }
            }
        }
        self.append_invoke(cursor, opcode, target, args)
    }

    /// The exact runtime type of a receiver: the static type if it admits no subtypes,
    /// otherwise whatever the receiver value reveals. Allocations are exact; other values are
    /// exact when their declared type is.
    fn exact_type(&self, static_type: &TypeRef, receiver: NodeId) -> Option<TypeRef> {
        if let Some(exact) = static_type.exact_type() {
            return Some(exact);
        }
        if receiver.is_null() {
            return None;
        }
        match &self.graph.node(receiver).kind {
            NodeKind::NewInstance { ty, .. } if ty.is_resolved() => Some(ty.clone()),
            NodeKind::NewTypeArray { element } => element
                .type_char()
                .map(|c| JavaType::class(&format!("[{c}")).into_ref()),
            NodeKind::NewObjectArray { element } if element.is_resolved() => {
                Some(object_array_of(element))
            }
            NodeKind::Constant(constant) => self.runtime.type_of_constant(constant),
            NodeKind::CheckCast { ty } if ty.is_resolved() => ty.exact_type(),
            _ => self.declared_type(receiver)?.exact_type(),
        }
    }

    fn declared_type(&self, value: NodeId) -> Option<TypeRef> {
        match &self.graph.node(value).kind {
            NodeKind::Local { index } => self.parameter_type(*index),
            NodeKind::LoadField { field } => field.declared_type().cloned(),
            NodeKind::Invoke { target, .. } => {
                let descriptor = target.signature().return_type().descriptor.as_deref()?;
                self.runtime.lookup_type(descriptor)
            }
            _ => None,
        }
    }

    /// The declared type of the parameter stored in local `index` on entry.
    fn parameter_type(&self, index: usize) -> Option<TypeRef> {
        let target = &self.method.method;
        let mut slot = 0;
        if !target.is_static() {
            if index == 0 {
                return Some(target.holder().clone());
            }
            slot = 1;
        }
        for argument in target.signature().arguments() {
            if slot == index {
                let descriptor = argument.descriptor.as_deref()?;
                return self.runtime.lookup_type(descriptor);
            }
            slot += argument.kind.slots();
        }
        None
    }

    fn append_invoke(
        &mut self,
        cursor: &mut BuilderCursor,
        opcode: u8,
        target: MethodRef,
        args: Vec<NodeId>,
    ) -> Result<()> {
        let result = target.signature().return_kind();
        let node = Node::new(NodeKind::Invoke { opcode, target }, result.stack_kind())
            .with_inputs(args);
        let id = self.append(cursor, node)?;
        self.frame.push_return(result, id);
        Ok(())
    }
}

/// The array class with elements of `element`; array classes are never subclassed.
fn object_array_of(element: &TypeRef) -> TypeRef {
    let name = if element.is_array() {
        format!("[{}", element.name())
    } else {
        format!("[L{};", element.name())
    };
    JavaType::class(&name)
        .with_access(AccessFlags::PUBLIC | AccessFlags::FINAL)
        .into_ref()
}
