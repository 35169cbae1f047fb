//! Per-block liveness and the next-use distance oracle, restricted to a
//! single register class at a time (spec.md §4.3, and §E "supplemented
//! features": one environment per class, run once per class in use).

use std::collections::{HashMap, HashSet};

use crate::ir::block::{phis_of, preds, resolve_phi_operand, succs};
use crate::ir::graph::Graph;
use crate::ir::node::NodeId;
use crate::regreq::RegisterClass;

/// The schedule a front-end/instruction-selector hands the back end: an
/// ordering of non-Phi, non-Block instructions per block. Liveness, the
/// next-use oracle and the Belady spiller all consume it; nothing in this
/// crate constructs one (scheduling itself is out of scope, per spec.md §1).
#[derive(Clone, Debug, Default)]
pub struct Schedule {
    instrs: HashMap<NodeId, Vec<NodeId>>,
}

impl Schedule {
    pub fn new() -> Schedule {
        Schedule::default()
    }

    pub fn set_block(&mut self, block: NodeId, instrs: Vec<NodeId>) {
        self.instrs.insert(block, instrs);
    }

    pub fn of(&self, block: NodeId) -> &[NodeId] {
        self.instrs.get(&block).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Picks out which graph values belong to the register class liveness is
/// being computed for. Most callers pass something like "has a result
/// register request for this class"; tests often just check `is_data()`.
pub trait ClassMembership {
    fn in_class(&self, graph: &Graph, value: NodeId, class: RegisterClass) -> bool;
}

/// Default membership test: any node producing a data-moded (int/float/ref)
/// value belongs to every class. Good enough when the target has exactly
/// one class; targets with several classes supply their own via
/// [`ClassMembership`] (e.g. by inspecting `Node::reg_reqs`).
pub struct AnyDataValue;

impl ClassMembership for AnyDataValue {
    fn in_class(&self, graph: &Graph, value: NodeId, _class: RegisterClass) -> bool {
        graph.arena().get(value).mode.is_data()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Liveness {
    pub class: Option<RegisterClass>,
    pub live_in: HashMap<NodeId, HashSet<NodeId>>,
    pub live_out: HashMap<NodeId, HashSet<NodeId>>,
    valid: bool,
}

impl Liveness {
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn invalidate(&mut self) {
        self.valid = false;
    }

    /// Computes `live_in`/`live_out` for every block reachable from
    /// `blocks`, to a dataflow fixpoint over the reverse CFG.
    pub fn compute(
        graph: &Graph,
        blocks: &[NodeId],
        schedule: &Schedule,
        class: RegisterClass,
        membership: &dyn ClassMembership,
    ) -> Liveness {
        let in_class = |g: &Graph, v: NodeId| membership.in_class(g, v, class);

        let mut gen: HashMap<NodeId, HashSet<NodeId>> = HashMap::new();
        let mut kill: HashMap<NodeId, HashSet<NodeId>> = HashMap::new();
        for &b in blocks {
            let mut g_set = HashSet::new();
            let mut k_set = HashSet::new();
            for phi in phis_of(graph, b) {
                k_set.insert(phi);
            }
            for &n in schedule.of(b) {
                for &operand in graph.arena().get(n).inputs() {
                    if in_class(graph, operand) && !k_set.contains(&operand) {
                        g_set.insert(operand);
                    }
                }
                if in_class(graph, n) {
                    k_set.insert(n);
                }
            }
            gen.insert(b, g_set);
            kill.insert(b, k_set);
        }

        let mut live_in: HashMap<NodeId, HashSet<NodeId>> =
            blocks.iter().map(|&b| (b, HashSet::new())).collect();
        let mut live_out: HashMap<NodeId, HashSet<NodeId>> =
            blocks.iter().map(|&b| (b, HashSet::new())).collect();

        loop {
            let mut changed = false;
            for &b in blocks {
                let mut out = HashSet::new();
                for s in succs(graph, b) {
                    if let Some(li) = live_in.get(&s) {
                        out.extend(li.iter().copied());
                    }
                    let preds_s = preds(graph, s);
                    if let Some(pos) = preds_s.iter().position(|&p| p == b) {
                        for phi in phis_of(graph, s) {
                            let operand = graph.arena().get(phi).input(pos);
                            if in_class(graph, operand) {
                                out.insert(operand);
                            }
                        }
                    }
                }
                if out != live_out[&b] {
                    changed = true;
                    live_out.insert(b, out.clone());
                }
                let mut new_in = gen[&b].clone();
                for v in &out {
                    if !kill[&b].contains(v) {
                        new_in.insert(*v);
                    }
                }
                if new_in != live_in[&b] {
                    changed = true;
                    live_in.insert(b, new_in);
                }
            }
            if !changed {
                break;
            }
        }

        Liveness {
            class: Some(class),
            live_in,
            live_out,
            valid: true,
        }
    }
}

/// Distance, in scheduled steps, to the next use of a value from a program
/// point. `u32::MAX` (`NEXT_USE_INFINITY`) means "not used again on any
/// forward path".
pub const NEXT_USE_INFINITY: u32 = u32::MAX;

/// The per-block execution-frequency weight applied to the constant cost of
/// crossing a block boundary while searching for a next use. Defaults to
/// `1.0` everywhere (a uniform weighting) when the caller has no profile
/// data.
pub trait BlockFrequency {
    fn frequency(&self, block: NodeId) -> f64;
}

pub struct UniformFrequency;

impl BlockFrequency for UniformFrequency {
    fn frequency(&self, _block: NodeId) -> f64 {
        1.0
    }
}

const INTER_BLOCK_BASE_COST: f64 = 1.0;

pub struct NextUseOracle<'a> {
    graph: &'a Graph,
    schedule: &'a Schedule,
    liveness: &'a Liveness,
    class: RegisterClass,
    membership: &'a dyn ClassMembership,
    freq: &'a dyn BlockFrequency,
}

impl<'a> NextUseOracle<'a> {
    pub fn new(
        graph: &'a Graph,
        schedule: &'a Schedule,
        liveness: &'a Liveness,
        class: RegisterClass,
        membership: &'a dyn ClassMembership,
        freq: &'a dyn BlockFrequency,
    ) -> NextUseOracle<'a> {
        NextUseOracle {
            graph,
            schedule,
            liveness,
            class,
            membership,
            freq,
        }
    }

    /// Distance to the next use of `v` strictly after position `t` in
    /// `block` (`None` means "before the first scheduled instruction").
    pub fn distance(&self, block: NodeId, t: Option<usize>, v: NodeId) -> u32 {
        if self.graph.arena().get(v).dont_spill {
            return 0;
        }
        let mut visited = HashSet::new();
        self.distance_rec(block, t, v, &mut visited)
    }

    fn distance_rec(
        &self,
        block: NodeId,
        t: Option<usize>,
        v: NodeId,
        visited: &mut HashSet<NodeId>,
    ) -> u32 {
        let instrs = self.schedule.of(block);
        let base: i64 = t.map(|i| i as i64).unwrap_or(-1);
        for (j, &n) in instrs.iter().enumerate() {
            if (j as i64) <= base {
                continue;
            }
            if self.graph.arena().get(n).inputs().contains(&v) {
                return (j as i64 - base) as u32;
            }
        }

        if !visited.insert(block) {
            return NEXT_USE_INFINITY;
        }

        let live_out_here = self
            .liveness
            .live_out
            .get(&block)
            .is_some_and(|s| s.contains(&v));
        if !live_out_here {
            return NEXT_USE_INFINITY;
        }

        let remaining = (instrs.len() as i64 - base).max(0) as u32;
        let cross = (INTER_BLOCK_BASE_COST * self.freq.frequency(block)).round().max(1.0) as u32;

        let mut best = NEXT_USE_INFINITY;
        for s in succs(self.graph, block) {
            let Some(v_in_succ) = resolve_phi_operand(self.graph, block, s, v) else {
                continue;
            };
            let tail = self.distance_rec(s, None, v_in_succ, visited);
            if tail == NEXT_USE_INFINITY {
                continue;
            }
            let candidate = remaining.saturating_add(cross).saturating_add(tail);
            best = best.min(candidate);
        }
        best
    }

    #[allow(dead_code)]
    fn class(&self) -> RegisterClass {
        self.class
    }

    #[allow(dead_code)]
    fn in_class(&self, v: NodeId) -> bool {
        self.membership.in_class(self.graph, v, self.class)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::block::new_block;
    use crate::ir::node::{GenericAttrs, Opcode};
    use crate::mode::Mode;

    fn instr(graph: &mut Graph, block: NodeId, inputs: Vec<NodeId>) -> NodeId {
        graph.arena_mut().new_node(
            Some(block),
            Opcode::Generic(GenericAttrs { name: "i".into() }),
            Mode::int(32, true),
            inputs,
            Default::default(),
        )
    }

    #[test]
    fn straight_line_next_use_distance() {
        let mut g = Graph::new();
        g.arena_mut().enable_use_edges();
        let b0 = new_block(&mut g, vec![g.start_block()]);
        let a = instr(&mut g, b0, vec![]);
        let use_a = instr(&mut g, b0, vec![a]);
        let _other = instr(&mut g, b0, vec![]);
        let use_a_again = instr(&mut g, b0, vec![a]);

        let mut schedule = Schedule::new();
        schedule.set_block(b0, vec![a, use_a, _other, use_a_again]);

        let class = RegisterClass::new();
        let liveness = Liveness::compute(&g, &[b0], &schedule, class, &AnyDataValue);
        let oracle = NextUseOracle::new(&g, &schedule, &liveness, class, &AnyDataValue, &UniformFrequency);

        // position 0 is right after `a` (index 0); next use of `a` is at index 1.
        assert_eq!(oracle.distance(b0, Some(0), a), 1);
        // from before the first instruction, the next use is 2 steps away.
        assert_eq!(oracle.distance(b0, None, a), 2);
    }

    #[test]
    fn dont_spill_forces_zero_distance() {
        let mut g = Graph::new();
        g.arena_mut().enable_use_edges();
        let b0 = new_block(&mut g, vec![g.start_block()]);
        let a = instr(&mut g, b0, vec![]);
        g.arena_mut().get_mut(a).dont_spill = true;
        let schedule = Schedule::new();
        let class = RegisterClass::new();
        let liveness = Liveness::compute(&g, &[b0], &schedule, class, &AnyDataValue);
        let oracle = NextUseOracle::new(&g, &schedule, &liveness, class, &AnyDataValue, &UniformFrequency);
        assert_eq!(oracle.distance(b0, None, a), 0);
    }
}
