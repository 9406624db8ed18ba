//! IR node definitions.
//!
//! Every node lives in the [`Graph`](crate::ir::Graph) arena and is addressed by a
//! [`NodeId`]. A node has ordered input edges (the values it consumes) and ordered successor
//! edges (control flow). What the edges mean depends on the [`NodeKind`]:
//!
//! | Kind | Inputs | Successors |
//! |------|--------|------------|
//! | `BlockBegin` | - | chain head, then exception handler entries |
//! | appended instruction | operands | next instruction on the chain |
//! | `If` | `x`, `y` | true block, false block |
//! | switches | key | case blocks in order, then default |
//! | `Return` / `Throw` | value (optional) / exception | - |
//! | `Phi` | one value per block predecessor | - |
//! | `FrameState` | locals, stack, locks (bogus slots are `NULL`) | - |
//!
//! Frame state references (`state_before`, `state_after`) are edges too: traversals that
//! follow inputs follow them as well.

use std::fmt;

use strum::{EnumCount, EnumIter, IntoStaticStr};

use crate::{
    bytecode::opcodes,
    ir::BlockBegin,
    meta::{Constant, FieldRef, Kind, MethodRef, Representation, TypeRef},
    utils::graph::NodeId,
};

/// Comparison condition of an `If`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, EnumCount, strum::Display)]
pub enum Condition {
    /// `==`
    #[strum(serialize = "==")]
    Eq,
    /// `!=`
    #[strum(serialize = "!=")]
    Ne,
    /// `<`
    #[strum(serialize = "<")]
    Lt,
    /// `<=`
    #[strum(serialize = "<=")]
    Le,
    /// `>`
    #[strum(serialize = ">")]
    Gt,
    /// `>=`
    #[strum(serialize = ">=")]
    Ge,
}

impl Condition {
    /// The condition that holds exactly when `self` does not.
    #[must_use]
    pub const fn negate(self) -> Condition {
        match self {
            Condition::Eq => Condition::Ne,
            Condition::Ne => Condition::Eq,
            Condition::Lt => Condition::Ge,
            Condition::Le => Condition::Gt,
            Condition::Gt => Condition::Le,
            Condition::Ge => Condition::Lt,
        }
    }

    /// The condition with swapped operands (`x < y` is `y > x`).
    #[must_use]
    pub const fn mirror(self) -> Condition {
        match self {
            Condition::Eq => Condition::Eq,
            Condition::Ne => Condition::Ne,
            Condition::Lt => Condition::Gt,
            Condition::Le => Condition::Ge,
            Condition::Gt => Condition::Lt,
            Condition::Ge => Condition::Le,
        }
    }

    /// Evaluates the condition on two ints.
    #[must_use]
    pub const fn fold(self, x: i32, y: i32) -> bool {
        match self {
            Condition::Eq => x == y,
            Condition::Ne => x != y,
            Condition::Lt => x < y,
            Condition::Le => x <= y,
            Condition::Gt => x > y,
            Condition::Ge => x >= y,
        }
    }

    /// The condition tested by a conditional branch opcode.
    #[must_use]
    pub const fn of_branch(opcode: u8) -> Option<Condition> {
        Some(match opcode {
            opcodes::IFEQ | opcodes::IF_ICMPEQ | opcodes::IF_ACMPEQ | opcodes::IFNULL => {
                Condition::Eq
            }
            opcodes::IFNE | opcodes::IF_ICMPNE | opcodes::IF_ACMPNE | opcodes::IFNONNULL => {
                Condition::Ne
            }
            opcodes::IFLT | opcodes::IF_ICMPLT => Condition::Lt,
            opcodes::IFGE | opcodes::IF_ICMPGE => Condition::Ge,
            opcodes::IFGT | opcodes::IF_ICMPGT => Condition::Gt,
            opcodes::IFLE | opcodes::IF_ICMPLE => Condition::Le,
            _ => return None,
        })
    }
}

/// Shape of a frame state snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameStateInfo {
    /// bci the state describes
    pub bci: i32,
    /// Number of local slots
    pub locals_size: usize,
    /// Number of stack slots (wide values count twice)
    pub stack_size: usize,
    /// Number of held locks
    pub locks_size: usize,
}

impl FrameStateInfo {
    /// Total number of input slots.
    #[must_use]
    pub fn slots(&self) -> usize {
        self.locals_size + self.stack_size + self.locks_size
    }
}

/// The operation a node performs.
#[derive(Clone, Debug, PartialEq, IntoStaticStr)]
pub enum NodeKind {
    /// Sentinel occupying id 0; stands for "no node" in edge slots
    Null,
    /// Anchor at id 1; its single successor is the start block
    Root,
    /// Block header
    BlockBegin(BlockBegin),

    /// Start block end, jumps to the standard entry
    Base,
    /// Unconditional jump
    Goto {
        /// Poll for safepoints before jumping
        safepoint: bool,
    },
    /// Two-way branch on `x <condition> y`
    If {
        /// The tested condition
        condition: Condition,
        /// Poll for safepoints before branching
        safepoint: bool,
    },
    /// Dense switch, case `i` matches key `low_key + i`
    TableSwitch {
        /// Key of the first case
        low_key: i32,
        /// Poll for safepoints before branching
        safepoint: bool,
    },
    /// Sparse switch
    LookupSwitch {
        /// Key per case
        keys: Vec<i32>,
        /// Poll for safepoints before branching
        safepoint: bool,
    },
    /// Method return, with the result as optional input
    Return {
        /// Poll for safepoints before returning
        safepoint: bool,
    },
    /// Exception throw
    Throw {
        /// Poll for safepoints before throwing
        safepoint: bool,
    },

    /// Incoming argument or receiver
    Local {
        /// Local slot index
        index: usize,
    },
    /// Compile-time constant
    Constant(Constant),
    /// Merge of values flowing into `block`, one input per predecessor
    Phi {
        /// Owning block
        block: NodeId,
    },
    /// `add`, `sub`, `mul`, `div`, `rem` of any numeric kind
    Arithmetic {
        /// The bytecode opcode
        opcode: u8,
        /// Strict floating point semantics
        strict: bool,
    },
    /// `ineg`, `lneg`, `fneg`, `dneg`
    Negate,
    /// `shl`, `shr`, `ushr`
    Shift {
        /// The bytecode opcode
        opcode: u8,
    },
    /// `and`, `or`, `xor`
    Logic {
        /// The bytecode opcode
        opcode: u8,
    },
    /// `lcmp`, `fcmpl`, `fcmpg`, `dcmpl`, `dcmpg`
    Compare {
        /// The bytecode opcode
        opcode: u8,
    },
    /// Primitive conversions `i2l` ... `i2s`
    Convert {
        /// The bytecode opcode
        opcode: u8,
    },

    /// Array length
    ArrayLength,
    /// Array element load; inputs `array`, `index`, `length`
    LoadIndexed {
        /// Element kind
        element: Kind,
    },
    /// Array element store; inputs `array`, `index`, `length`, `value`
    StoreIndexed {
        /// Element kind
        element: Kind,
    },
    /// Field load; input `object` for instance fields, `holder` for static fields
    LoadField {
        /// The accessed field
        field: FieldRef,
    },
    /// Field store; inputs `object` (or `holder`), `value`
    StoreField {
        /// The accessed field
        field: FieldRef,
    },

    /// Deferred class resolution, materializing `ty` in `representation`
    ResolveClass {
        /// The class to resolve
        ty: TypeRef,
        /// What to materialize
        representation: Representation,
    },
    /// `new`
    NewInstance {
        /// Allocated class
        ty: TypeRef,
        /// Constant pool index of the class
        cpi: u16,
    },
    /// `newarray`; input length
    NewTypeArray {
        /// Element kind
        element: Kind,
    },
    /// `anewarray`; input length
    NewObjectArray {
        /// Element class
        element: TypeRef,
    },
    /// `multianewarray`; one input per dimension
    NewMultiArray {
        /// Array class
        ty: TypeRef,
        /// Constant pool index of the class
        cpi: u16,
    },
    /// `checkcast`; inputs object and the class hub
    CheckCast {
        /// Target class
        ty: TypeRef,
    },
    /// `instanceof`; inputs object and the class hub
    InstanceOf {
        /// Tested class
        ty: TypeRef,
    },
    /// Method call; inputs receiver (if any) then arguments
    Invoke {
        /// Dispatch opcode after devirtualization
        opcode: u8,
        /// The called method
        target: MethodRef,
    },
    /// Address of the on-stack lock record
    MonitorAddress {
        /// Lock depth
        lock_number: usize,
    },
    /// Lock acquisition; inputs object and optional address
    MonitorEnter {
        /// Lock depth
        lock_number: usize,
    },
    /// Lock release; inputs object and optional address
    MonitorExit {
        /// Lock depth
        lock_number: usize,
    },
    /// The exception caught on handler entry
    ExceptionObject,
    /// Registration of a freshly constructed object that may need finalization
    RegisterFinalizer,

    /// Snapshot of the abstract interpreter state
    FrameState(FrameStateInfo),
}

impl NodeKind {
    /// Returns the variant name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.into()
    }

    /// `true` for control flow nodes: the root, block headers and block ends.
    #[must_use]
    pub fn is_cfg(&self) -> bool {
        matches!(self, NodeKind::Root | NodeKind::BlockBegin(_)) || self.is_block_end()
    }

    /// `true` for instructions that terminate a block.
    #[must_use]
    pub fn is_block_end(&self) -> bool {
        matches!(
            self,
            NodeKind::Base
                | NodeKind::Goto { .. }
                | NodeKind::If { .. }
                | NodeKind::TableSwitch { .. }
                | NodeKind::LookupSwitch { .. }
                | NodeKind::Return { .. }
                | NodeKind::Throw { .. }
        )
    }

    /// `true` for nodes where control flow joins.
    #[must_use]
    pub fn is_control_merge(&self) -> bool {
        matches!(self, NodeKind::BlockBegin(_))
    }

    /// `true` for nodes that never sit on an instruction chain.
    #[must_use]
    pub fn is_floating(&self) -> bool {
        matches!(
            self,
            NodeKind::Null
                | NodeKind::Root
                | NodeKind::Phi { .. }
                | NodeKind::Local { .. }
                | NodeKind::FrameState(_)
        )
    }

    /// `true` for instructions that may raise an exception.
    #[must_use]
    pub fn can_trap(&self) -> bool {
        match self {
            NodeKind::Arithmetic { opcode, .. } => matches!(
                *opcode,
                opcodes::IDIV | opcodes::IREM | opcodes::LDIV | opcodes::LREM
            ),
            NodeKind::ArrayLength
            | NodeKind::LoadIndexed { .. }
            | NodeKind::StoreIndexed { .. }
            | NodeKind::LoadField { .. }
            | NodeKind::StoreField { .. }
            | NodeKind::ResolveClass { .. }
            | NodeKind::NewInstance { .. }
            | NodeKind::NewTypeArray { .. }
            | NodeKind::NewObjectArray { .. }
            | NodeKind::NewMultiArray { .. }
            | NodeKind::CheckCast { .. }
            | NodeKind::InstanceOf { .. }
            | NodeKind::Invoke { .. }
            | NodeKind::MonitorEnter { .. }
            | NodeKind::MonitorExit { .. }
            | NodeKind::RegisterFinalizer
            | NodeKind::Throw { .. } => true,
            _ => false,
        }
    }

    /// `true` for instructions whose side effects need a state snapshot right after them.
    #[must_use]
    pub fn needs_state_after(&self) -> bool {
        matches!(
            self,
            NodeKind::Invoke { .. }
                | NodeKind::StoreField { .. }
                | NodeKind::StoreIndexed { .. }
                | NodeKind::MonitorEnter { .. }
                | NodeKind::MonitorExit { .. }
                | NodeKind::RegisterFinalizer
        )
    }

    /// `true` for block ends that poll for safepoints.
    #[must_use]
    pub fn is_safepoint(&self) -> bool {
        match self {
            NodeKind::Goto { safepoint }
            | NodeKind::If { safepoint, .. }
            | NodeKind::TableSwitch { safepoint, .. }
            | NodeKind::LookupSwitch { safepoint, .. }
            | NodeKind::Return { safepoint }
            | NodeKind::Throw { safepoint } => *safepoint,
            _ => false,
        }
    }
}

/// A node in the IR graph.
#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    /// The operation
    pub kind: NodeKind,
    /// Kind of the produced value, `Void` if none
    pub value_kind: Kind,
    /// Consumed values
    pub inputs: Vec<NodeId>,
    /// Control successors
    pub successors: Vec<NodeId>,
    /// Frame state on entry, `NULL` if none
    pub state_before: NodeId,
    /// Frame state after the side effect, `NULL` if none
    pub state_after: NodeId,
    /// Entry blocks of the handlers that catch exceptions raised here
    pub exception_handlers: Vec<NodeId>,
    /// Owning block once appended, `NULL` otherwise
    pub block: NodeId,
    /// bci of the originating bytecode
    pub bci: Option<i32>,
    /// Linked into an instruction chain
    pub appended: bool,
}

impl Node {
    /// Creates a detached node.
    #[must_use]
    pub fn new(kind: NodeKind, value_kind: Kind) -> Self {
        Node {
            kind,
            value_kind,
            inputs: Vec::new(),
            successors: Vec::new(),
            state_before: NodeId::NULL,
            state_after: NodeId::NULL,
            exception_handlers: Vec::new(),
            block: NodeId::NULL,
            bci: None,
            appended: false,
        }
    }

    /// Sets the inputs.
    #[must_use]
    pub fn with_inputs(mut self, inputs: Vec<NodeId>) -> Self {
        self.inputs = inputs;
        self
    }

    /// Sets the state before.
    #[must_use]
    pub fn with_state_before(mut self, state: NodeId) -> Self {
        self.state_before = state;
        self
    }

    /// Creates a constant node.
    #[must_use]
    pub fn constant(value: Constant) -> Self {
        let kind = value.kind();
        Node::new(NodeKind::Constant(value), kind)
    }

    /// Inputs followed by the non-null frame state references.
    pub fn input_edges(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.inputs
            .iter()
            .copied()
            .chain([self.state_before, self.state_after])
            .filter(|id| !id.is_null())
    }

    /// The constant value, if this is a constant node.
    #[must_use]
    pub fn as_constant(&self) -> Option<&Constant> {
        match &self.kind {
            NodeKind::Constant(c) => Some(c),
            _ => None,
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            NodeKind::Constant(c) => write!(f, "Constant({c})"),
            NodeKind::If { condition, .. } => write!(f, "If({condition})"),
            NodeKind::Invoke { target, .. } => write!(f, "Invoke({})", target.qualified_name()),
            NodeKind::BlockBegin(b) => write!(f, "B{}[{}]", b.block_number, b.bci),
            other => f.write_str(other.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_condition_algebra() {
        for cond in Condition::iter() {
            assert_eq!(cond.negate().negate(), cond);
            assert_eq!(cond.mirror().mirror(), cond);
            for (x, y) in [(1, 2), (2, 2), (3, 2)] {
                assert_eq!(cond.fold(x, y), !cond.negate().fold(x, y));
                assert_eq!(cond.fold(x, y), cond.mirror().fold(y, x));
            }
        }
        assert_eq!(Condition::COUNT, 6);
        assert_eq!(Condition::Le.to_string(), "<=");
    }

    #[test]
    fn test_branch_conditions() {
        assert_eq!(Condition::of_branch(opcodes::IFNULL), Some(Condition::Eq));
        assert_eq!(Condition::of_branch(opcodes::IF_ICMPGE), Some(Condition::Ge));
        assert_eq!(Condition::of_branch(opcodes::GOTO), None);
    }

    #[test]
    fn test_classification() {
        let idiv = NodeKind::Arithmetic {
            opcode: opcodes::IDIV,
            strict: false,
        };
        let iadd = NodeKind::Arithmetic {
            opcode: opcodes::IADD,
            strict: false,
        };
        assert!(idiv.can_trap());
        assert!(!iadd.can_trap());
        assert!(!iadd.is_floating());
        assert!(NodeKind::Phi {
            block: NodeId::NULL
        }
        .is_floating());
        assert!(NodeKind::Throw { safepoint: true }.can_trap());
        assert!(NodeKind::Throw { safepoint: true }.is_block_end());
        assert!(NodeKind::Root.is_cfg());
        assert!(!NodeKind::Root.is_block_end());
        assert!(NodeKind::RegisterFinalizer.needs_state_after());
        assert!(!NodeKind::ArrayLength.needs_state_after());
        assert!(NodeKind::Goto { safepoint: true }.is_safepoint());
        assert_eq!(NodeKind::ExceptionObject.name(), "ExceptionObject");
    }

    #[test]
    fn test_input_edges_include_states() {
        let node = Node::new(NodeKind::ArrayLength, Kind::Int)
            .with_inputs(vec![NodeId::new(4)])
            .with_state_before(NodeId::new(9));
        let edges: Vec<_> = node.input_edges().collect();
        assert_eq!(edges, vec![NodeId::new(4), NodeId::new(9)]);
    }
}
