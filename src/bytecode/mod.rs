//! Raw JVM bytecode: opcodes, decoding, block discovery and assembly.
//!
//! # Key Components
//!
//! - [`opcodes`] - Opcode constants, mnemonics and instruction lengths
//! - [`BytecodeStream`] - Instruction decoder with random re-seek
//! - [`BlockMap`] - Basic blocks, loop headers and depth-first numbers
//! - [`BytecodeAssembler`] - Label-resolving assembler for building test methods

mod assembler;
mod blockmap;
mod stream;

pub mod opcodes;

pub use assembler::BytecodeAssembler;
pub use blockmap::{BlockInfo, BlockMap};
pub use stream::{BytecodeStream, LookupSwitch, TableSwitch};
