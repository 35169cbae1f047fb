//! Stack-pointer simulation (spec.md §4.5): walks each block's schedule
//! threading a single running SP offset through `IncSp` nodes, stamping
//! `MemPerm` nodes with the offset in effect when they execute, handing
//! every other node to a target-supplied `sim` closure, and repairing the
//! SP value chain so every `IncSp` consumes the SP value its position in the
//! schedule actually follows.
//!
//! Placing a new SP definition at a CFG merge point in general needs a Phi
//! (proper SSA repair via dominance frontiers); this module only threads a
//! single straight-line chain per block and leaves join points to the
//! caller, since instruction selection and full SSA construction are out of
//! scope (spec.md §1, Non-goals).

use std::collections::HashMap;

use crate::be::liveness::Schedule;
use crate::ir::block::preds;
use crate::ir::graph::Graph;
use crate::ir::node::{NodeId, Opcode};

/// Sentinel a target's `sim` closure returns to signal that the node just
/// simulated reloaded SP from the frame pointer, resetting the running bias
/// to zero (spec.md §4.5, glossary `SP_BIAS_RESET`).
pub const SP_BIAS_RESET: i32 = 0;

/// Rounds `x` down to the nearest multiple of `alignment` (stack growth is
/// downward, so "more aligned" means "more negative").
fn round_towards_more_negative(x: i64, alignment: i64) -> i64 {
    x - x.rem_euclid(alignment)
}

/// Walks `block`'s schedule starting from `(start_offset, start_wanted_bias)`,
/// accumulating each `IncSp`'s delta (rewriting the node in place when its
/// own alignment requirement demands slack), stamping every `MemPerm` with
/// the offset in effect, and otherwise delegating to `sim`. Returns the
/// `(offset, wanted_bias)` in effect at the end of the block.
///
/// `sim` receives the node and the current offset and returns the new
/// offset; returning [`SP_BIAS_RESET`] resets `wanted_bias` to zero (the
/// node reloaded SP from the frame pointer).
pub fn simulate_block(
    graph: &mut Graph,
    block: NodeId,
    schedule: &Schedule,
    start_offset: i32,
    start_wanted_bias: i32,
    misalign: i32,
    mut sim: impl FnMut(&mut Graph, NodeId, i32) -> i32,
) -> (i32, i32) {
    let mut offset = start_offset;
    let mut wanted_bias = start_wanted_bias;
    for &n in schedule.of(block).to_vec().iter() {
        match &graph.arena().get(n).opcode {
            Opcode::IncSp(attrs) => {
                let align = attrs.align;
                let original_delta = attrs.delta;
                if align > 0 {
                    let alignment = 1i64 << align;
                    let target = offset as i64 + original_delta as i64 + misalign as i64;
                    let aligned_with_misalign = round_towards_more_negative(target, alignment);
                    let aligned = aligned_with_misalign - misalign as i64;
                    let slack = (aligned - (offset as i64 + original_delta as i64)) as i32;
                    let new_delta = original_delta + slack;
                    if let Opcode::IncSp(a) = &mut graph.arena_mut().get_mut(n).opcode {
                        a.delta = new_delta;
                    }
                    offset += original_delta + slack;
                    wanted_bias += original_delta + slack;
                } else {
                    offset += original_delta;
                    wanted_bias += original_delta;
                }
            }
            Opcode::MemPerm(_) => {
                let current = offset;
                if let Opcode::MemPerm(attrs) = &mut graph.arena_mut().get_mut(n).opcode {
                    attrs.recorded_offset = Some(current);
                }
            }
            _ => {
                let new_offset = sim(graph, n, offset);
                wanted_bias = if new_offset == SP_BIAS_RESET {
                    0
                } else {
                    wanted_bias + (new_offset - offset)
                };
                offset = new_offset;
            }
        }
        assert!(
            offset >= wanted_bias,
            "sp simulation invariant violated in block {block:?} at node {n:?}: offset {offset} < wanted_bias {wanted_bias}"
        );
    }
    (offset, wanted_bias)
}

/// Runs [`simulate_block`] over `blocks` in the given order (must be a CFG
/// walk where every non-loop predecessor precedes its successor), starting
/// each block from its unique predecessor's ending `(offset, wanted_bias)`;
/// blocks reached only through a merge start fresh at `(0, 0)`, matching the
/// module-level note that full join reconciliation is the caller's concern.
pub fn simulate(
    graph: &mut Graph,
    blocks: &[NodeId],
    schedule: &Schedule,
    misalign: i32,
    mut sim: impl FnMut(&mut Graph, NodeId, i32) -> i32,
) -> HashMap<NodeId, (i32, i32)> {
    let mut end_state = HashMap::new();
    for &b in blocks {
        let preds_b = preds(graph, b).to_vec();
        let (start_offset, start_bias) = if preds_b.len() == 1 {
            end_state.get(&preds_b[0]).copied().unwrap_or((0, 0))
        } else {
            (0, 0)
        };
        let end = simulate_block(graph, b, schedule, start_offset, start_bias, misalign, &mut sim);
        end_state.insert(b, end);
    }
    end_state
}

/// Repairs the SP value chain: every `IncSp` encountered in schedule order
/// is rewired to consume the block's current running SP value (the
/// previous `IncSp` in the same block, or `initial_sp` for the first one),
/// and becomes the new running value itself. Returns the SP value live at
/// the end of each block.
pub fn repair_sp_ssa(
    graph: &mut Graph,
    blocks: &[NodeId],
    schedule: &Schedule,
    initial_sp: NodeId,
) -> HashMap<NodeId, NodeId> {
    let mut end_sp = HashMap::new();
    for &b in blocks {
        let preds_b = preds(graph, b).to_vec();
        let mut current = if preds_b.len() == 1 {
            end_sp.get(&preds_b[0]).copied().unwrap_or(initial_sp)
        } else {
            initial_sp
        };
        for &n in schedule.of(b).to_vec().iter() {
            if graph.arena().get(n).opcode.is_phi() {
                continue;
            }
            if matches!(graph.arena().get(n).opcode, Opcode::IncSp(_)) {
                if graph.arena().get(n).arity() > 0 {
                    graph.arena_mut().set_input(n, 0, current);
                }
                current = n;
            }
        }
        end_sp.insert(b, current);
    }
    end_sp
}

/// Prunes dead `IncSp` producers from `candidates`, run after
/// [`repair_sp_ssa`] so every `IncSp` already has its real operand wired.
/// Two distinct cases, both grounded on `arm_finish.c`'s epilogue cleanup:
///
/// - a producer that has already lost every user (SSA repair rewired
///   everything downstream around it) is killed outright;
/// - a producer whose delta simulated to zero net effect is spliced out via
///   `exchange`, which itself only kills the old node once it is
///   unreferenced — a live producer, zero delta or not, is never killed.
pub fn prune_sp_producers(graph: &mut Graph, candidates: &[NodeId]) {
    for &n in candidates {
        if !matches!(graph.arena().get(n).opcode, Opcode::IncSp(_)) {
            continue;
        }
        if graph.arena().use_edges_active() && !graph.arena().has_users(n) {
            tracing::trace!(target: "be.stack", node = n.index(), "killing sp producer with no remaining users");
            graph.arena_mut().kill(n);
            continue;
        }
        let is_zero = matches!(
            &graph.arena().get(n).opcode,
            Opcode::IncSp(attrs) if attrs.delta == 0
        );
        if !is_zero {
            continue;
        }
        let operand = graph.arena().get(n).input(0);
        tracing::trace!(target: "be.stack", node = n.index(), "splicing out zero-delta sp producer");
        graph.arena_mut().exchange(n, operand);
    }
}
