//! The intermediate representation produced by the graph builder.
//!
//! The IR is a single arena ([`Graph`]) holding both the control-flow graph and the values
//! computed in it:
//!
//! - Blocks are [`BlockBegin`] nodes. Each block's instructions hang off the header as a
//!   chain linked through successor slot 0 and end in a block end (`Goto`, `If`, switches,
//!   `Return`, `Throw`, `Base`), whose successors are the next blocks.
//! - Values are nodes whose inputs are other values. Phis are owned by blocks and have one
//!   input per block predecessor.
//! - Frame states ([`FrameStateInfo`]) snapshot the interpreter state where deoptimization
//!   or exception dispatch needs it.
//!
//! During parsing the mutable interpreter state lives in a [`FrameStateBuilder`]; block entry
//! states are combined with [`Graph::merge_or_clone`].

mod block;
mod frame;
mod graph;
mod node;
mod state;

pub use block::{BlockBegin, BlockFlags, SYNCHRONIZATION_ENTRY_BCI};
pub use frame::{FrameStateBuilder, Slot};
pub use graph::Graph;
pub use node::{Condition, FrameStateInfo, Node, NodeKind};
