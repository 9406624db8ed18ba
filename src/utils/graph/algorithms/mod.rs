//! Graph algorithms used by the builder and the IR passes.
//!
//! | Algorithm | Used by |
//! |-----------|---------|
//! | [`dfs`] | dead-code elimination (control reachability) |
//! | [`reverse_postorder`] | block map depth-first numbering, final block order |
//! | [`postorder`] | building block for [`reverse_postorder`] |

mod traversal;

pub use traversal::{dfs, postorder, reverse_postorder};
