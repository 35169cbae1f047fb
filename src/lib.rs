#![forbid(unsafe_code)]
//! SSA intermediate representation and backend support services: a node
//! arena with a toggle-able reverse use-edge index, a Phi-SCC redundancy
//! elimination pass, and the analyses a register allocator is built on top
//! of (liveness, a next-use distance oracle, a Belady-style spill
//! heuristic, frame layout and stack-pointer simulation).
//!
//! Instruction selection, scheduling and register allocation proper are out
//! of scope; this crate models the graph and the bookkeeping those passes
//! consume and produce.

pub mod be;
pub mod error;
pub mod ir;
pub mod mode;
pub mod opt;
pub mod regreq;

pub use error::{CoreError, CoreResult};
pub use ir::{Arena, BlockVisitedGuard, Graph, LinkGuard, Node, NodeId, Opcode, Use};
pub use mode::{Mode, ModeKind};
