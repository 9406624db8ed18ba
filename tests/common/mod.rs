//! Fixtures shared by the integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use bcgraph::prelude::*;

/// Routes `log` output to the test harness; `RUST_LOG=bcgraph=trace` shows bytecode traces.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// The holder class of every test method.
pub fn holder() -> TypeRef {
    JavaType::class("demo/Holder").into_ref()
}

/// A method of [`holder`] named `m`.
pub fn method(
    access: AccessFlags,
    descriptor: &str,
    code: Vec<u8>,
    max_locals: usize,
    pool: ConstantTable,
) -> Result<MethodInfo> {
    let target = JavaMethod::new(holder(), "m", Signature::parse(descriptor)?, access).into_ref();
    MethodInfo::new(target, code, max_locals, 16, Arc::new(pool))
}

/// A public static method with an empty constant pool.
pub fn static_method(descriptor: &str, code: Vec<u8>, max_locals: usize) -> Result<MethodInfo> {
    method(
        AccessFlags::PUBLIC | AccessFlags::STATIC,
        descriptor,
        code,
        max_locals,
        ConstantTable::new(),
    )
}

/// Builds with the default runtime and configuration.
pub fn build(method: &MethodInfo) -> Result<Ir> {
    Ir::build(method, &DefaultRuntime, &CompilerConfig::default())
}

/// The start block's only successor, the block at bci 0.
pub fn entry_block(ir: &Ir) -> NodeId {
    ir.graph().block_successors(ir.start_block())[0]
}

/// Names of the instructions of `block` in chain order.
pub fn kinds(graph: &Graph, block: NodeId) -> Vec<&'static str> {
    graph
        .instructions(block)
        .into_iter()
        .map(|id| graph.node(id).kind.name())
        .collect()
}

/// Live blocks that carry `flag`.
pub fn blocks_with(graph: &Graph, flag: BlockFlags) -> Vec<NodeId> {
    graph
        .blocks()
        .into_iter()
        .filter(|&b| graph.block(b).is_set(flag))
        .collect()
}

/// The bytecode block whose first bci is `bci`; the start block and split blocks are skipped.
pub fn block_at(graph: &Graph, bci: i32) -> Option<NodeId> {
    graph.blocks().into_iter().find(|&b| {
        let block = graph.block(b);
        b != graph.start() && block.bci == bci && !block.is_set(BlockFlags::CRITICAL_EDGE_SPLIT)
    })
}
