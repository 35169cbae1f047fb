//! Graph-rewriting optimizer passes.

pub mod phi_scc;

pub use phi_scc::{eliminate_redundant_phi_sccs, PhiSccStats};
