//! Shared fixtures for unit tests.
//!
//! Methods are assembled from raw bytes or with [`crate::bytecode::BytecodeAssembler`] and
//! wrapped in a [`MethodInfo`] whose holder is the test class `T`.

use std::sync::Arc;

use crate::{
    compiler::{CompilerConfig, Ir},
    meta::{
        AccessFlags, ConstantPool, ConstantTable, DefaultRuntime, JavaMethod, JavaType,
        MethodInfo, Signature,
    },
};

// Helper function to create a static method of class T with an empty constant pool
pub fn static_method(descriptor: &str, code: Vec<u8>, max_locals: usize) -> MethodInfo {
    method_with(
        AccessFlags::PUBLIC | AccessFlags::STATIC,
        descriptor,
        code,
        max_locals,
        Arc::new(ConstantTable::new()),
    )
}

// Helper function to create an instance method of class T with an empty constant pool
pub fn instance_method(descriptor: &str, code: Vec<u8>, max_locals: usize) -> MethodInfo {
    method_with(
        AccessFlags::PUBLIC,
        descriptor,
        code,
        max_locals,
        Arc::new(ConstantTable::new()),
    )
}

// Helper function to create a method with explicit access flags and constant pool
pub fn method_with(
    access: AccessFlags,
    descriptor: &str,
    code: Vec<u8>,
    max_locals: usize,
    pool: Arc<dyn ConstantPool>,
) -> MethodInfo {
    let method = JavaMethod::new(
        test_class(),
        "m",
        Signature::parse(descriptor).unwrap(),
        access,
    )
    .into_ref();
    MethodInfo::new(method, code, max_locals, 8, pool).unwrap()
}

// The holder class of all test methods
pub fn test_class() -> Arc<JavaType> {
    JavaType::class("T").into_ref()
}

// Builds a method with the default runtime and configuration, panicking on bailouts
pub fn build(method: &MethodInfo) -> Ir {
    Ir::build(method, &DefaultRuntime, &CompilerConfig::default()).unwrap()
}

// Builds a method with only graph construction enabled, no cleanup passes
pub fn build_raw(method: &MethodInfo) -> Ir {
    let config = CompilerConfig::default()
        .with_fold_constant_branches(false)
        .with_eliminate_dead_code(false)
        .with_simplify_phis(false);
    Ir::build(method, &DefaultRuntime, &config).unwrap()
}
