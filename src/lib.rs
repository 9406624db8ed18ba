// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(clippy::too_many_arguments)]

//! # bcgraph
//!
//! Builds the high-level intermediate representation of a JVM method for a tiered JIT
//! compiler. The bytecode of one method is abstractly interpreted block by block into an
//! arena graph of basic blocks, instructions, phis and frame state snapshots, which is then
//! cleaned (constant-branch folding, dead code elimination, phi simplification) and ordered
//! for register allocation after splitting critical edges.
//!
//! ## Features
//!
//! - **Arena IR** - Every node lives in one [`ir::Graph`] and is addressed by a [`NodeId`]
//! - **SSA on the fly** - Phis are inserted while merging frame states at block entries
//! - **Exception edges** - Trapping instructions are connected to the handlers covering them
//! - **Synchronized methods** - Monitor enter, exit on every return and a catch-all unlock handler
//! - **Batch compilation** - Independent methods compile in parallel through `rayon`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use bcgraph::prelude::*;
//!
//! let mut asm = BytecodeAssembler::new();
//! asm.iload(0)?.iconst(1)?.iadd()?.ireturn()?;
//! let method = MethodInfo::new(method_ref, asm.finish()?, 1, 2, pool)?;
//!
//! let mut ir = Ir::build(&method, &DefaultRuntime, &CompilerConfig::default())?;
//! for &block in ir.linear_scan_order() {
//!     println!("{}", ir.graph().node(block));
//! }
//! # Ok::<(), bcgraph::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`meta`] - Method, type, field and constant pool descriptors and the [`meta::Runtime`] queries
//! - [`bytecode`] - Bytecode stream, opcode table, block map and a small assembler
//! - [`ir`] - The node arena, blocks and frame states
//! - [`builder`] - The abstract interpreter that fills the graph
//! - [`compiler`] - Construction orchestration, cleanup passes and batch compilation
//! - [`utils`] - Generic graph traversals and bit sets
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T>`](Result). A method the pipeline cannot handle
//! fails with [`Error::Bailout`]; the caller falls back to a lower tier:
//!
//! ```rust,ignore
//! use bcgraph::{Error, Ir};
//!
//! match Ir::build(&method, &runtime, &config) {
//!     Ok(ir) => println!("{}", ir.stats()),
//!     Err(Error::Bailout { reason }) => println!("bailout: {reason}"),
//!     Err(e) => println!("error: {e}"),
//! }
//! ```
//!
//! ## Logging
//!
//! Progress is reported through the `log` facade. Compilation start, bailouts and pass results
//! are logged at `debug`; per-bytecode traces at `trace`, when enabled through
//! [`CompilerConfig::trace_level`].
#[macro_use]
pub(crate) mod macros;

#[macro_use]
pub(crate) mod error;

#[cfg(test)]
pub(crate) mod test;

pub mod builder;
pub mod bytecode;
pub mod compiler;
pub mod ir;
pub mod meta;
pub mod prelude;
pub mod utils;

/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `bcgraph` Error type
///
/// See [`error::Error`](crate::Error) for the variants.
pub use error::Error;

/// Builds, cleans and orders the IR of one method.
pub use compiler::{compile_all, CompilationStats, CompilerConfig, Ir};

/// The runtime used when no embedder knowledge is available.
pub use meta::DefaultRuntime;

/// Identifier of a node in the IR arena.
pub use utils::graph::NodeId;
