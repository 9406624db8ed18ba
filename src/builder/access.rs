//! Constants, fields, arrays, allocation and type checks.
//!
//! Anything naming a constant pool entry may find it unresolved. Unresolved accesses carry a
//! `state_before` so the runtime can deoptimize and resolve lazily, and class references
//! become `ResolveClass` nodes instead of constants.

use crate::{
    builder::{BuilderCursor, GraphBuilder},
    bytecode::opcodes,
    ir::{Node, NodeKind},
    meta::{Constant, FieldRef, Kind, PoolConstant, Representation, TypeRef},
    utils::graph::NodeId,
    Result,
};

impl GraphBuilder<'_> {
    /// `true` if the descriptor may be treated as resolved.
    fn resolved(&self, resolved: bool) -> bool {
        resolved && !self.config.test_patching
    }

    /// The state before the current instruction, or `NULL` when the access is resolved.
    fn state_if_unresolved(&mut self, cursor: &BuilderCursor, resolved: bool) -> NodeId {
        if self.resolved(resolved) {
            NodeId::NULL
        } else {
            self.frame.create(self.graph, cursor.bci)
        }
    }

    /// Materializes `ty` in `representation`: a constant when the class is initialized, a
    /// deferred `ResolveClass` otherwise.
    pub(super) fn resolve_class(
        &mut self,
        cursor: &mut BuilderCursor,
        representation: Representation,
        ty: &TypeRef,
        initialized: bool,
    ) -> Result<NodeId> {
        if initialized {
            return self.append_constant(cursor, Constant::type_encoding(ty.name(), representation));
        }
        let state = self.frame.create(self.graph, cursor.bci);
        let node = Node::new(
            NodeKind::ResolveClass {
                ty: ty.clone(),
                representation,
            },
            Kind::Object,
        )
        .with_state_before(state);
        self.append(cursor, node)
    }

    pub(super) fn load_constant(&mut self, cursor: &mut BuilderCursor) -> Result<()> {
        let cpi = self.stream.read_cpi()?;
        let id = match self.method.pool.lookup_constant(cpi)? {
            PoolConstant::Type(ty) => {
                let resolved = self.resolved(ty.is_resolved());
                self.resolve_class(cursor, Representation::JavaClass, &ty, resolved)?
            }
            PoolConstant::Value(value) => self.append_constant(cursor, value)?,
        };
        let kind = self.graph.node(id).value_kind;
        self.frame.push(kind, id);
        Ok(())
    }

    pub(super) fn load_indexed(&mut self, cursor: &mut BuilderCursor, element: Kind) -> Result<()> {
        let index = self.frame.ipop();
        let array = self.frame.apop();
        let length = self.append_array_length(cursor, array)?;
        let node = Node::new(NodeKind::LoadIndexed { element }, element.stack_kind())
            .with_inputs(vec![array, index, length]);
        let id = self.append(cursor, node)?;
        self.frame.push(element, id);
        Ok(())
    }

    pub(super) fn store_indexed(&mut self, cursor: &mut BuilderCursor, element: Kind) -> Result<()> {
        let value = self.frame.pop(element);
        let index = self.frame.ipop();
        let array = self.frame.apop();
        let length = self.append_array_length(cursor, array)?;
        let node = Node::new(NodeKind::StoreIndexed { element }, Kind::Void)
            .with_inputs(vec![array, index, length, value]);
        self.append(cursor, node)?;
        Ok(())
    }

    fn append_array_length(&mut self, cursor: &mut BuilderCursor, array: NodeId) -> Result<NodeId> {
        self.append(
            cursor,
            Node::new(NodeKind::ArrayLength, Kind::Int).with_inputs(vec![array]),
        )
    }

    pub(super) fn array_length(&mut self, cursor: &mut BuilderCursor) -> Result<()> {
        let array = self.frame.apop();
        let id = self.append_array_length(cursor, array)?;
        self.frame.ipush(id);
        Ok(())
    }

    fn lookup_field(&self, opcode: u8) -> Result<FieldRef> {
        let cpi = self.stream.read_cpi()?;
        self.method.pool.lookup_field(cpi, opcode)
    }

    pub(super) fn get_field(&mut self, cursor: &mut BuilderCursor) -> Result<()> {
        let field = self.lookup_field(opcodes::GETFIELD)?;
        let state = self.state_if_unresolved(cursor, field.is_resolved());
        let object = self.frame.apop();
        let kind = field.kind();
        let node = Node::new(NodeKind::LoadField { field }, kind.stack_kind())
            .with_inputs(vec![object])
            .with_state_before(state);
        let id = self.append(cursor, node)?;
        self.frame.push(kind, id);
        Ok(())
    }

    pub(super) fn put_field(&mut self, cursor: &mut BuilderCursor) -> Result<()> {
        let field = self.lookup_field(opcodes::PUTFIELD)?;
        let state = self.state_if_unresolved(cursor, field.is_resolved());
        let value = self.frame.pop(field.kind());
        let object = self.frame.apop();
        let node = Node::new(NodeKind::StoreField { field }, Kind::Void)
            .with_inputs(vec![object, value])
            .with_state_before(state);
        self.append(cursor, node)?;
        Ok(())
    }

    pub(super) fn get_static(&mut self, cursor: &mut BuilderCursor) -> Result<()> {
        let field = self.lookup_field(opcodes::GETSTATIC)?;
        let resolved = self.resolved(field.is_resolved());
        if resolved {
            if let Some(value) = field.constant_value() {
                let id = self.append_constant(cursor, value.clone())?;
                self.frame.push(value.kind(), id);
                return Ok(());
            }
        }

        let state = self.state_if_unresolved(cursor, field.is_resolved());
        let holder = field.holder().clone();
        let container = self.resolve_class(
            cursor,
            Representation::StaticFields,
            &holder,
            field.is_resolved(),
        )?;
        let kind = field.kind();
        let node = Node::new(NodeKind::LoadField { field }, kind.stack_kind())
            .with_inputs(vec![container])
            .with_state_before(state);
        let id = self.append(cursor, node)?;
        self.frame.push(kind, id);
        Ok(())
    }

    pub(super) fn put_static(&mut self, cursor: &mut BuilderCursor) -> Result<()> {
        let field = self.lookup_field(opcodes::PUTSTATIC)?;
        let state = self.state_if_unresolved(cursor, field.is_resolved());
        let holder = field.holder().clone();
        let container = self.resolve_class(
            cursor,
            Representation::StaticFields,
            &holder,
            field.is_resolved(),
        )?;
        let value = self.frame.pop(field.kind());
        let node = Node::new(NodeKind::StoreField { field }, Kind::Void)
            .with_inputs(vec![container, value])
            .with_state_before(state);
        self.append(cursor, node)?;
        Ok(())
    }

    fn lookup_type(&self, opcode: u8) -> Result<(u16, TypeRef)> {
        let cpi = self.stream.read_cpi()?;
        Ok((cpi, self.method.pool.lookup_type(cpi, opcode)?))
    }

    /// The hub of a type check target.
    fn type_check_hub(&mut self, cursor: &mut BuilderCursor, ty: &TypeRef) -> Result<NodeId> {
        let initialized = self.resolved(ty.is_resolved()) && ty.is_initialized();
        self.resolve_class(cursor, Representation::ObjectHub, ty, initialized)
    }

    pub(super) fn check_cast(&mut self, cursor: &mut BuilderCursor) -> Result<()> {
        let (_, ty) = self.lookup_type(opcodes::CHECKCAST)?;
        let hub = self.type_check_hub(cursor, &ty)?;
        let object = self.frame.apop();
        let node =
            Node::new(NodeKind::CheckCast { ty }, Kind::Object).with_inputs(vec![object, hub]);
        let id = self.append(cursor, node)?;
        self.frame.apush(id);
        Ok(())
    }

    pub(super) fn instance_of(&mut self, cursor: &mut BuilderCursor) -> Result<()> {
        let (_, ty) = self.lookup_type(opcodes::INSTANCEOF)?;
        let hub = self.type_check_hub(cursor, &ty)?;
        let object = self.frame.apop();
        let node = Node::new(NodeKind::InstanceOf { ty }, Kind::Int).with_inputs(vec![object, hub]);
        let id = self.append(cursor, node)?;
        self.frame.ipush(id);
        Ok(())
    }

    pub(super) fn new_instance(&mut self, cursor: &mut BuilderCursor) -> Result<()> {
        let (cpi, ty) = self.lookup_type(opcodes::NEW)?;
        let state = self.state_if_unresolved(cursor, ty.is_resolved());
        let node = Node::new(NodeKind::NewInstance { ty, cpi }, Kind::Object).with_state_before(state);
        let id = self.append(cursor, node)?;
        self.frame.apush(id);
        Ok(())
    }

    pub(super) fn new_type_array(&mut self, cursor: &mut BuilderCursor) -> Result<()> {
        let code = self.stream.read_u8(1)?;
        let Some(element) = Kind::from_array_type_code(code) else {
            return Err(bailout!(
                "invalid newarray type code {} [bci={}]",
                code,
                cursor.bci
            ));
        };
        let length = self.frame.ipop();
        let node =
            Node::new(NodeKind::NewTypeArray { element }, Kind::Object).with_inputs(vec![length]);
        let id = self.append(cursor, node)?;
        self.frame.apush(id);
        Ok(())
    }

    pub(super) fn new_object_array(&mut self, cursor: &mut BuilderCursor) -> Result<()> {
        let (_, element) = self.lookup_type(opcodes::ANEWARRAY)?;
        let state = self.state_if_unresolved(cursor, element.is_resolved());
        let length = self.frame.ipop();
        let node = Node::new(NodeKind::NewObjectArray { element }, Kind::Object)
            .with_inputs(vec![length])
            .with_state_before(state);
        let id = self.append(cursor, node)?;
        self.frame.apush(id);
        Ok(())
    }

    pub(super) fn new_multi_array(&mut self, cursor: &mut BuilderCursor) -> Result<()> {
        let (cpi, ty) = self.lookup_type(opcodes::MULTIANEWARRAY)?;
        let state = self.state_if_unresolved(cursor, ty.is_resolved());
        let rank = usize::from(self.stream.read_u8(3)?);
        let mut dims = vec![NodeId::NULL; rank];
        for dim in dims.iter_mut().rev() {
            *dim = self.frame.ipop();
        }
        let node = Node::new(NodeKind::NewMultiArray { ty, cpi }, Kind::Object)
            .with_inputs(dims)
            .with_state_before(state);
        let id = self.append(cursor, node)?;
        self.frame.apush(id);
        Ok(())
    }
}
