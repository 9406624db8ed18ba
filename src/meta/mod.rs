//! Method metadata consumed by the graph builder.
//!
//! This module holds everything the builder reads but never produces: value kinds, constants,
//! method descriptors, the type/field/method descriptors a constant pool resolves to, the
//! method being compiled and the runtime it is compiled for.
//!
//! # Key Components
//!
//! - [`Kind`] - Value kinds, including stack widening and slot sizes
//! - [`Constant`] - Compile-time constant values
//! - [`Signature`] - Parsed method descriptors
//! - [`JavaType`], [`JavaField`], [`JavaMethod`] - Resolved (or symbolic) runtime descriptors
//! - [`MethodInfo`] - The method under compilation, with its exception table
//! - [`ConstantPool`] / [`ConstantTable`] - Constant pool index resolution
//! - [`Runtime`] / [`DefaultRuntime`] - Virtual machine queries

mod constant;
mod kind;
mod method;
mod pool;
mod runtime;
mod signature;
mod types;

pub use constant::{Constant, Representation};
pub use kind::Kind;
pub use method::{ExceptionHandlerEntry, MethodInfo};
pub use pool::{ConstantPool, ConstantTable, PoolConstant, PoolEntry};
pub use runtime::{DefaultRuntime, Runtime};
pub use signature::{Signature, SignatureType};
pub use types::{AccessFlags, FieldRef, JavaField, JavaMethod, JavaType, MethodRef, TypeRef};
