//! # bcgraph Prelude
//!
//! Re-exports the types needed to describe a method, build its IR and inspect the result.
//!
//! ```rust,ignore
//! use bcgraph::prelude::*;
//! ```

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all bcgraph operations
pub use crate::Error;

/// The result type used throughout bcgraph
pub use crate::Result;

// ================================================================================================
// Compilation
// ================================================================================================

/// Construction entry point and options
pub use crate::compiler::{
    compile_all, CompilationStats, CompileOutcome, CompilerConfig, Ir,
};

// ================================================================================================
// Method Description
// ================================================================================================

/// Descriptors of the method under compilation and what it references
pub use crate::meta::{
    AccessFlags, Constant, ConstantPool, ConstantTable, DefaultRuntime, ExceptionHandlerEntry,
    JavaField, JavaMethod, JavaType, Kind, MethodInfo, MethodRef, Runtime, Signature, TypeRef,
};

/// Bytecode assembly for tests and tools
pub use crate::bytecode::{opcodes, BytecodeAssembler};

// ================================================================================================
// IR Inspection
// ================================================================================================

/// Graph, nodes and blocks
pub use crate::ir::{BlockBegin, BlockFlags, Condition, Graph, Node, NodeKind};

/// Node identifiers
pub use crate::NodeId;
