//! Backend support services: liveness and the next-use oracle, the Belady
//! spill heuristic, frame layout and stack-pointer simulation (spec.md §4.3
//! through §4.5). None of this schedules instructions or allocates
//! registers; it is the analysis and bookkeeping a register allocator and
//! instruction scheduler are built on top of.

pub mod belady;
pub mod frame;
pub mod liveness;
pub mod stack;

pub use belady::{BeladySpiller, Reload, ReloadPoint, SpillDecisions, WorkingSet};
pub use frame::{layout_frame, round_up_misaligned, sort_frame_entities};
pub use liveness::{
    AnyDataValue, BlockFrequency, ClassMembership, Liveness, NextUseOracle, Schedule,
    UniformFrequency, NEXT_USE_INFINITY,
};
pub use stack::{prune_sp_producers, repair_sp_ssa, simulate, simulate_block, SP_BIAS_RESET};
