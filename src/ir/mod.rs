//! The SSA IR graph model: nodes, modes, control-flow blocks, the node
//! arena and the generic walk utilities every pass builds on.

pub mod arena;
pub mod block;
pub mod frame_type;
pub mod graph;
pub mod node;
pub mod walk;

pub use arena::{Arena, Use};
pub use graph::{BlockVisitedGuard, Graph, LinkGuard};
pub use node::{Node, NodeId, Opcode};
