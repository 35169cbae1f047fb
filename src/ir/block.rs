//! Control-flow graph over nodes of mode `block`.
//!
//! A `Block`'s inputs are its control predecessors, in the order Phis in
//! that block rely on (spec.md §3: "operand *i* flows from predecessor
//! *i*"). Successors are derived from the use-edge index when it is active.

use anyhow::{ensure, Result};

use crate::ir::graph::Graph;
use crate::ir::node::{NodeId, Opcode, PhiAttrs};
use crate::mode::Mode;

/// Appends a new block with the given predecessors, in order.
pub fn new_block(graph: &mut Graph, preds: Vec<NodeId>) -> NodeId {
    graph
        .arena_mut()
        .new_node(None, Opcode::Block, Mode::block(), preds, Default::default())
}

pub fn preds<'g>(graph: &'g Graph, block: NodeId) -> &'g [NodeId] {
    let node = graph.arena().get(block);
    assert!(node.opcode.is_block(), "{block:?} is not a Block node");
    node.inputs()
}

/// Successor blocks, derived from the use-edge index. Requires the index to
/// be active.
pub fn succs(graph: &Graph, block: NodeId) -> Vec<NodeId> {
    graph
        .arena()
        .uses_of(block)
        .iter()
        .filter(|u| graph.arena().get(u.user).opcode.is_block())
        .map(|u| u.user)
        .collect()
}

/// Every Phi whose home block is `block`, in arena order. Phis are not
/// reachable through `block`'s own input edges (those are control
/// predecessors), so this scans node identities rather than use-edges and
/// works whether or not the use-edge index is active.
pub fn phis_of(graph: &Graph, block: NodeId) -> Vec<NodeId> {
    graph
        .arena()
        .iter_ids()
        .filter(|&id| {
            let n = graph.arena().get(id);
            n.opcode.is_phi() && n.block() == Some(block)
        })
        .collect()
}

/// If `v` is a Phi whose home block is `to`, returns the operand flowing in
/// along the `from -> to` edge; otherwise returns `v` unchanged. `None` only
/// when `from` is not actually among `to`'s predecessors.
pub fn resolve_phi_operand(graph: &Graph, from: NodeId, to: NodeId, v: NodeId) -> Option<NodeId> {
    let node = graph.arena().get(v);
    if node.block() != Some(to) || !node.opcode.is_phi() {
        return Some(v);
    }
    let pos = preds(graph, to).iter().position(|&p| p == from)?;
    Some(node.input(pos))
}

/// Adds a Phi to `block`. Arity must equal `block`'s predecessor count
/// (spec.md §3 invariant); operand `i` is supplied by the caller and must
/// correspond to predecessor `i`.
pub fn new_phi(
    graph: &mut Graph,
    block: NodeId,
    mode: Mode,
    operands: Vec<NodeId>,
    loop_header: bool,
) -> Result<NodeId> {
    let pred_count = preds(graph, block).len();
    ensure!(
        operands.len() == pred_count,
        "Phi arity {} does not match block {:?}'s predecessor count {}",
        operands.len(),
        block,
        pred_count
    );
    Ok(graph.arena_mut().new_node(
        Some(block),
        Opcode::Phi(PhiAttrs { loop_header }),
        mode,
        operands,
        Default::default(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phi_arity_must_match_predecessor_count() {
        let mut g = Graph::new();
        let b0 = new_block(&mut g, vec![g.start_block()]);
        let b1 = new_block(&mut g, vec![g.start_block()]);
        let join = new_block(&mut g, vec![b0, b1]);
        assert!(new_phi(&mut g, join, Mode::int(32, true), vec![b0], false).is_err());
        assert!(new_phi(&mut g, join, Mode::int(32, true), vec![b0, b1], false).is_ok());
    }

    #[test]
    fn succs_derived_from_use_edges() {
        let mut g = Graph::new();
        g.arena_mut().enable_use_edges();
        let b0 = new_block(&mut g, vec![g.start_block()]);
        let b1 = new_block(&mut g, vec![b0]);
        assert_eq!(succs(&g, b0), vec![b1]);
    }
}
