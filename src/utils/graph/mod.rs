//! Generic graph infrastructure.
//!
//! Holds the [`NodeId`] type used by the IR arena and the traversal algorithms that run over
//! anything implementing [`Successors`].

mod node;
mod traits;

pub mod algorithms;

pub use node::NodeId;
pub use traits::{GraphBase, Successors};
