//! Opcode dispatch and the stack, local, arithmetic and branch opcodes.

use crate::{
    builder::{BuilderCursor, GraphBuilder},
    bytecode::opcodes,
    ir::{Condition, Node, NodeKind, Slot},
    meta::{Constant, Kind},
    utils::graph::NodeId,
    Result,
};

impl GraphBuilder<'_> {
    /// Translates the instruction the stream is positioned on.
    pub(super) fn translate(&mut self, cursor: &mut BuilderCursor, op: u8) -> Result<()> {
        use opcodes::*;

        match op {
            NOP => {}
            ACONST_NULL => self.push_constant(cursor, Constant::Null)?,
            ICONST_M1..=ICONST_5 => {
                self.push_constant(cursor, Constant::Int(i32::from(op) - i32::from(ICONST_0)))?;
            }
            LCONST_0 | LCONST_1 => {
                self.push_constant(cursor, Constant::Long(i64::from(op - LCONST_0)))?;
            }
            FCONST_0..=FCONST_2 => {
                self.push_constant(cursor, Constant::Float(f32::from(op - FCONST_0)))?;
            }
            DCONST_0 | DCONST_1 => {
                self.push_constant(cursor, Constant::Double(f64::from(op - DCONST_0)))?;
            }
            BIPUSH => {
                let value = i32::from(self.stream.read_i8(1)?);
                self.push_constant(cursor, Constant::Int(value))?;
            }
            SIPUSH => {
                let value = i32::from(self.stream.read_i16(1)?);
                self.push_constant(cursor, Constant::Int(value))?;
            }
            LDC | LDC_W | LDC2_W => self.load_constant(cursor)?,

            ILOAD => self.load_local(Kind::Int, self.stream.read_local_index()?)?,
            LLOAD => self.load_local(Kind::Long, self.stream.read_local_index()?)?,
            FLOAD => self.load_local(Kind::Float, self.stream.read_local_index()?)?,
            DLOAD => self.load_local(Kind::Double, self.stream.read_local_index()?)?,
            ALOAD => self.load_local(Kind::Object, self.stream.read_local_index()?)?,
            ILOAD_0..=ILOAD_3 => self.load_local(Kind::Int, usize::from(op - ILOAD_0))?,
            LLOAD_0..=LLOAD_3 => self.load_local(Kind::Long, usize::from(op - LLOAD_0))?,
            FLOAD_0..=FLOAD_3 => self.load_local(Kind::Float, usize::from(op - FLOAD_0))?,
            DLOAD_0..=DLOAD_3 => self.load_local(Kind::Double, usize::from(op - DLOAD_0))?,
            ALOAD_0..=ALOAD_3 => self.load_local(Kind::Object, usize::from(op - ALOAD_0))?,

            ISTORE => self.store_local(Kind::Int, self.stream.read_local_index()?)?,
            LSTORE => self.store_local(Kind::Long, self.stream.read_local_index()?)?,
            FSTORE => self.store_local(Kind::Float, self.stream.read_local_index()?)?,
            DSTORE => self.store_local(Kind::Double, self.stream.read_local_index()?)?,
            ASTORE => self.store_local(Kind::Object, self.stream.read_local_index()?)?,
            ISTORE_0..=ISTORE_3 => self.store_local(Kind::Int, usize::from(op - ISTORE_0))?,
            LSTORE_0..=LSTORE_3 => self.store_local(Kind::Long, usize::from(op - LSTORE_0))?,
            FSTORE_0..=FSTORE_3 => self.store_local(Kind::Float, usize::from(op - FSTORE_0))?,
            DSTORE_0..=DSTORE_3 => self.store_local(Kind::Double, usize::from(op - DSTORE_0))?,
            ASTORE_0..=ASTORE_3 => self.store_local(Kind::Object, usize::from(op - ASTORE_0))?,

            IALOAD => self.load_indexed(cursor, Kind::Int)?,
            LALOAD => self.load_indexed(cursor, Kind::Long)?,
            FALOAD => self.load_indexed(cursor, Kind::Float)?,
            DALOAD => self.load_indexed(cursor, Kind::Double)?,
            AALOAD => self.load_indexed(cursor, Kind::Object)?,
            BALOAD => self.load_indexed(cursor, Kind::Byte)?,
            CALOAD => self.load_indexed(cursor, Kind::Char)?,
            SALOAD => self.load_indexed(cursor, Kind::Short)?,
            IASTORE => self.store_indexed(cursor, Kind::Int)?,
            LASTORE => self.store_indexed(cursor, Kind::Long)?,
            FASTORE => self.store_indexed(cursor, Kind::Float)?,
            DASTORE => self.store_indexed(cursor, Kind::Double)?,
            AASTORE => self.store_indexed(cursor, Kind::Object)?,
            BASTORE => self.store_indexed(cursor, Kind::Byte)?,
            CASTORE => self.store_indexed(cursor, Kind::Char)?,
            SASTORE => self.store_indexed(cursor, Kind::Short)?,

            POP..=SWAP => self.stack_op(op),

            IADD | ISUB | IMUL | IDIV | IREM => self.arithmetic(cursor, Kind::Int, op)?,
            LADD | LSUB | LMUL | LDIV | LREM => self.arithmetic(cursor, Kind::Long, op)?,
            FADD | FSUB | FMUL | FDIV | FREM => self.arithmetic(cursor, Kind::Float, op)?,
            DADD | DSUB | DMUL | DDIV | DREM => self.arithmetic(cursor, Kind::Double, op)?,
            INEG => self.negate(cursor, Kind::Int)?,
            LNEG => self.negate(cursor, Kind::Long)?,
            FNEG => self.negate(cursor, Kind::Float)?,
            DNEG => self.negate(cursor, Kind::Double)?,
            ISHL | ISHR | IUSHR => self.shift(cursor, Kind::Int, op)?,
            LSHL | LSHR | LUSHR => self.shift(cursor, Kind::Long, op)?,
            IAND | IOR | IXOR => self.logic(cursor, Kind::Int, op)?,
            LAND | LOR | LXOR => self.logic(cursor, Kind::Long, op)?,
            IINC => self.increment(cursor)?,

            I2L => self.convert(cursor, op, Kind::Int, Kind::Long)?,
            I2F => self.convert(cursor, op, Kind::Int, Kind::Float)?,
            I2D => self.convert(cursor, op, Kind::Int, Kind::Double)?,
            L2I => self.convert(cursor, op, Kind::Long, Kind::Int)?,
            L2F => self.convert(cursor, op, Kind::Long, Kind::Float)?,
            L2D => self.convert(cursor, op, Kind::Long, Kind::Double)?,
            F2I => self.convert(cursor, op, Kind::Float, Kind::Int)?,
            F2L => self.convert(cursor, op, Kind::Float, Kind::Long)?,
            F2D => self.convert(cursor, op, Kind::Float, Kind::Double)?,
            D2I => self.convert(cursor, op, Kind::Double, Kind::Int)?,
            D2L => self.convert(cursor, op, Kind::Double, Kind::Long)?,
            D2F => self.convert(cursor, op, Kind::Double, Kind::Float)?,
            I2B => self.convert(cursor, op, Kind::Int, Kind::Byte)?,
            I2C => self.convert(cursor, op, Kind::Int, Kind::Char)?,
            I2S => self.convert(cursor, op, Kind::Int, Kind::Short)?,

            LCMP => self.compare(cursor, Kind::Long, op)?,
            FCMPL | FCMPG => self.compare(cursor, Kind::Float, op)?,
            DCMPL | DCMPG => self.compare(cursor, Kind::Double, op)?,

            IFEQ..=IFLE => self.if_zero(cursor, op)?,
            IF_ICMPEQ..=IF_ICMPLE => self.if_same(cursor, Kind::Int, op)?,
            IF_ACMPEQ | IF_ACMPNE => self.if_same(cursor, Kind::Object, op)?,
            IFNULL | IFNONNULL => self.if_null(cursor, op)?,
            GOTO | GOTO_W => self.goto(cursor)?,
            TABLESWITCH => self.table_switch(cursor)?,
            LOOKUPSWITCH => self.lookup_switch(cursor)?,
            JSR | JSR_W | RET => return Err(bailout!("jsr/ret not supported")),

            IRETURN => self.method_return(cursor, Kind::Int)?,
            LRETURN => self.method_return(cursor, Kind::Long)?,
            FRETURN => self.method_return(cursor, Kind::Float)?,
            DRETURN => self.method_return(cursor, Kind::Double)?,
            ARETURN => self.method_return(cursor, Kind::Object)?,
            RETURN => self.method_return(cursor, Kind::Void)?,
            ATHROW => self.throw(cursor)?,

            GETSTATIC => self.get_static(cursor)?,
            PUTSTATIC => self.put_static(cursor)?,
            GETFIELD => self.get_field(cursor)?,
            PUTFIELD => self.put_field(cursor)?,
            INVOKEVIRTUAL | INVOKEINTERFACE => self.invoke_virtual(cursor, op)?,
            INVOKESPECIAL => self.invoke_special(cursor)?,
            INVOKESTATIC => self.invoke_static(cursor)?,

            NEW => self.new_instance(cursor)?,
            NEWARRAY => self.new_type_array(cursor)?,
            ANEWARRAY => self.new_object_array(cursor)?,
            MULTIANEWARRAY => self.new_multi_array(cursor)?,
            ARRAYLENGTH => self.array_length(cursor)?,
            CHECKCAST => self.check_cast(cursor)?,
            INSTANCEOF => self.instance_of(cursor)?,
            MONITORENTER => self.monitor_enter(cursor)?,
            MONITOREXIT => self.monitor_exit(cursor)?,

            BREAKPOINT => return Err(bailout!("concurrent setting of breakpoint")),
            _ => {
                return Err(bailout!(
                    "Unsupported opcode {} ({}) [bci={}]",
                    op,
                    opcodes::name_of(op).unwrap_or("<illegal>"),
                    cursor.bci
                ))
            }
        }
        Ok(())
    }

    /// Appends a constant node.
    pub(super) fn append_constant(
        &mut self,
        cursor: &mut BuilderCursor,
        value: Constant,
    ) -> Result<NodeId> {
        self.append(cursor, Node::constant(value))
    }

    fn push_constant(&mut self, cursor: &mut BuilderCursor, value: Constant) -> Result<()> {
        let kind = value.kind();
        let id = self.append_constant(cursor, value)?;
        self.frame.push(kind, id);
        Ok(())
    }

    fn local(&self, kind: Kind, index: usize) -> Result<NodeId> {
        match self.frame.load_local(index) {
            Some(Slot { value, kind: found }) if found == kind.stack_kind() => Ok(value),
            Some(Slot { kind: found, .. }) => Err(bailout!(
                "load of {} from local {} holding {} [bci={}]",
                kind,
                index,
                found,
                self.stream.current_bci()
            )),
            None => Err(bailout!(
                "load of {} from bogus local {} [bci={}]",
                kind,
                index,
                self.stream.current_bci()
            )),
        }
    }

    fn load_local(&mut self, kind: Kind, index: usize) -> Result<()> {
        let value = self.local(kind, index)?;
        self.frame.push(kind, value);
        Ok(())
    }

    fn store_local(&mut self, kind: Kind, index: usize) -> Result<()> {
        if index + kind.slots() > self.frame.locals_size() {
            return Err(bailout!(
                "store to local {} outside frame of {} locals [bci={}]",
                index,
                self.frame.locals_size(),
                self.stream.current_bci()
            ));
        }
        let value = self.frame.pop(kind);
        self.frame.store_local(index, kind, value);
        Ok(())
    }

    fn stack_op(&mut self, op: u8) {
        let frame = &mut self.frame;
        match op {
            opcodes::POP => {
                frame.xpop();
            }
            opcodes::POP2 => {
                frame.xpop();
                frame.xpop();
            }
            opcodes::DUP => {
                let w = frame.xpop();
                frame.xpush(w);
                frame.xpush(w);
            }
            opcodes::DUP_X1 => {
                let w1 = frame.xpop();
                let w2 = frame.xpop();
                frame.xpush(w1);
                frame.xpush(w2);
                frame.xpush(w1);
            }
            opcodes::DUP_X2 => {
                let w1 = frame.xpop();
                let w2 = frame.xpop();
                let w3 = frame.xpop();
                frame.xpush(w1);
                frame.xpush(w3);
                frame.xpush(w2);
                frame.xpush(w1);
            }
            opcodes::DUP2 => {
                let w1 = frame.xpop();
                let w2 = frame.xpop();
                for w in [w2, w1, w2, w1] {
                    frame.xpush(w);
                }
            }
            opcodes::DUP2_X1 => {
                let w1 = frame.xpop();
                let w2 = frame.xpop();
                let w3 = frame.xpop();
                for w in [w2, w1, w3, w2, w1] {
                    frame.xpush(w);
                }
            }
            opcodes::DUP2_X2 => {
                let w1 = frame.xpop();
                let w2 = frame.xpop();
                let w3 = frame.xpop();
                let w4 = frame.xpop();
                for w in [w2, w1, w4, w3, w2, w1] {
                    frame.xpush(w);
                }
            }
            opcodes::SWAP => {
                let w1 = frame.xpop();
                let w2 = frame.xpop();
                frame.xpush(w1);
                frame.xpush(w2);
            }
            other => internal_error!("{} is not a stack opcode", other),
        }
    }

    fn arithmetic(&mut self, cursor: &mut BuilderCursor, kind: Kind, opcode: u8) -> Result<()> {
        let y = self.frame.pop(kind);
        let x = self.frame.pop(kind);
        let strict = self.method.method.is_strict();
        let node = Node::new(NodeKind::Arithmetic { opcode, strict }, kind).with_inputs(vec![x, y]);
        let id = self.append(cursor, node)?;
        self.frame.push(kind, id);
        Ok(())
    }

    fn negate(&mut self, cursor: &mut BuilderCursor, kind: Kind) -> Result<()> {
        let x = self.frame.pop(kind);
        let id = self.append(cursor, Node::new(NodeKind::Negate, kind).with_inputs(vec![x]))?;
        self.frame.push(kind, id);
        Ok(())
    }

    fn shift(&mut self, cursor: &mut BuilderCursor, kind: Kind, opcode: u8) -> Result<()> {
        let s = self.frame.ipop();
        let x = self.frame.pop(kind);
        let node = Node::new(NodeKind::Shift { opcode }, kind).with_inputs(vec![x, s]);
        let id = self.append(cursor, node)?;
        self.frame.push(kind, id);
        Ok(())
    }

    fn logic(&mut self, cursor: &mut BuilderCursor, kind: Kind, opcode: u8) -> Result<()> {
        let y = self.frame.pop(kind);
        let x = self.frame.pop(kind);
        let node = Node::new(NodeKind::Logic { opcode }, kind).with_inputs(vec![x, y]);
        let id = self.append(cursor, node)?;
        self.frame.push(kind, id);
        Ok(())
    }

    fn compare(&mut self, cursor: &mut BuilderCursor, kind: Kind, opcode: u8) -> Result<()> {
        let y = self.frame.pop(kind);
        let x = self.frame.pop(kind);
        let node = Node::new(NodeKind::Compare { opcode }, Kind::Int).with_inputs(vec![x, y]);
        let id = self.append(cursor, node)?;
        self.frame.ipush(id);
        Ok(())
    }

    fn convert(&mut self, cursor: &mut BuilderCursor, opcode: u8, from: Kind, to: Kind) -> Result<()> {
        let to = to.stack_kind();
        let x = self.frame.pop(from);
        let node = Node::new(NodeKind::Convert { opcode }, to).with_inputs(vec![x]);
        let id = self.append(cursor, node)?;
        self.frame.push(to, id);
        Ok(())
    }

    fn increment(&mut self, cursor: &mut BuilderCursor) -> Result<()> {
        let index = self.stream.read_local_index()?;
        let delta = self.stream.read_iinc_increment()?;
        let x = self.local(Kind::Int, index)?;
        let y = self.append_constant(cursor, Constant::Int(delta))?;
        let node = Node::new(
            NodeKind::Arithmetic {
                opcode: opcodes::IADD,
                strict: self.method.method.is_strict(),
            },
            Kind::Int,
        )
        .with_inputs(vec![x, y]);
        let id = self.append(cursor, node)?;
        self.frame.store_local(index, Kind::Int, id);
        Ok(())
    }

    fn goto(&mut self, cursor: &mut BuilderCursor) -> Result<()> {
        let dest = self.stream.read_branch_dest()?;
        let target = self.block_at(dest)?;
        let safepoint = self.is_safepoint_branch(cursor, dest);
        self.finish_block(
            cursor,
            Node::new(NodeKind::Goto { safepoint }, Kind::Void),
            vec![target],
            cursor.bci,
        )?;
        Ok(())
    }

    /// The state before a branch, kept only for safepoints.
    fn branch_state(&mut self, safepoint: bool, bci: i32) -> NodeId {
        if safepoint {
            self.frame.create(self.graph, bci)
        } else {
            NodeId::NULL
        }
    }

    fn if_zero(&mut self, cursor: &mut BuilderCursor, op: u8) -> Result<()> {
        let y = self.append_constant(cursor, Constant::Int(0))?;
        let safepoint = self.if_is_safepoint(cursor)?;
        let state = self.branch_state(safepoint, cursor.bci);
        let x = self.frame.ipop();
        self.if_node(cursor, op, x, y, safepoint, state)
    }

    fn if_null(&mut self, cursor: &mut BuilderCursor, op: u8) -> Result<()> {
        let safepoint = self.if_is_safepoint(cursor)?;
        let state = self.branch_state(safepoint, cursor.bci);
        let y = self.append_constant(cursor, Constant::Null)?;
        let x = self.frame.apop();
        self.if_node(cursor, op, x, y, safepoint, state)
    }

    fn if_same(&mut self, cursor: &mut BuilderCursor, kind: Kind, op: u8) -> Result<()> {
        let safepoint = self.if_is_safepoint(cursor)?;
        let state = self.branch_state(safepoint, cursor.bci);
        let y = self.frame.pop(kind);
        let x = self.frame.pop(kind);
        self.if_node(cursor, op, x, y, safepoint, state)
    }

    fn if_is_safepoint(&self, cursor: &BuilderCursor) -> Result<bool> {
        let taken = self.stream.read_branch_dest()?;
        let fallthrough = self.stream.next_bci();
        Ok(self.is_safepoint_branch(cursor, taken) || self.is_safepoint_branch(cursor, fallthrough))
    }

    fn if_node(
        &mut self,
        cursor: &mut BuilderCursor,
        op: u8,
        x: NodeId,
        y: NodeId,
        safepoint: bool,
        state_before: NodeId,
    ) -> Result<()> {
        let condition = match Condition::of_branch(op) {
            Some(condition) => condition,
            None => internal_error!("{} is not a conditional branch", op),
        };
        let taken = self.block_at(self.stream.read_branch_dest()?)?;
        let fallthrough = self.block_at(self.stream.next_bci())?;
        let node = Node::new(NodeKind::If { condition, safepoint }, Kind::Void)
            .with_inputs(vec![x, y])
            .with_state_before(state_before);
        self.finish_block(cursor, node, vec![taken, fallthrough], cursor.bci)?;
        Ok(())
    }

    fn table_switch(&mut self, cursor: &mut BuilderCursor) -> Result<()> {
        let switch = self.stream.read_table_switch()?;
        let mut dests = switch.dests.clone();
        dests.push(switch.default_dest);
        let successors = dests
            .iter()
            .map(|&dest| self.block_at(dest))
            .collect::<Result<Vec<_>>>()?;
        let safepoint = dests.iter().any(|&dest| self.is_safepoint_branch(cursor, dest));

        let state = self.branch_state(safepoint, cursor.bci);
        let key = self.frame.ipop();
        let node = Node::new(
            NodeKind::TableSwitch {
                low_key: switch.low_key,
                safepoint,
            },
            Kind::Void,
        )
        .with_inputs(vec![key])
        .with_state_before(state);
        self.finish_block(cursor, node, successors, cursor.bci)?;
        Ok(())
    }

    fn lookup_switch(&mut self, cursor: &mut BuilderCursor) -> Result<()> {
        let switch = self.stream.read_lookup_switch()?;
        let mut dests = switch.dests.clone();
        dests.push(switch.default_dest);
        let successors = dests
            .iter()
            .map(|&dest| self.block_at(dest))
            .collect::<Result<Vec<_>>>()?;
        let safepoint = dests.iter().any(|&dest| self.is_safepoint_branch(cursor, dest));

        let state = self.branch_state(safepoint, cursor.bci);
        let key = self.frame.ipop();
        let node = Node::new(
            NodeKind::LookupSwitch {
                keys: switch.keys,
                safepoint,
            },
            Kind::Void,
        )
        .with_inputs(vec![key])
        .with_state_before(state);
        self.finish_block(cursor, node, successors, cursor.bci)?;
        Ok(())
    }

    fn throw(&mut self, cursor: &mut BuilderCursor) -> Result<()> {
        let state = self.frame.create(self.graph, cursor.bci);
        let exception = self.frame.apop();
        self.frame.clear_stack();
        let node = Node::new(
            NodeKind::Throw {
                safepoint: !self.config.no_safepoints,
            },
            Kind::Void,
        )
        .with_inputs(vec![exception])
        .with_state_before(state);
        self.finish_block(cursor, node, Vec::new(), cursor.bci)?;
        Ok(())
    }
}
