//! Phi-SCC redundancy elimination.
//!
//! Finds strongly connected components of Phi nodes that collapse to a
//! single value outside the component and rewires the graph accordingly.
//! See spec.md §4.2 for the full algorithm description this module follows.

use std::collections::{HashMap, HashSet, VecDeque};

use anyhow::{ensure, Result};

use crate::error::CoreError;
use crate::ir::graph::{Graph, LinkGuard};
use crate::ir::node::NodeId;

/// Per-node Tarjan scratch state, held in the link slot for the duration of
/// the seeding walk.
#[derive(Clone, Copy, Default)]
struct TarjanInfo {
    dfn: u32,
    uplink: u32,
    on_stack: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhiSccStats {
    /// Distinct strongly connected components examined across all rounds.
    pub sccs_considered: usize,
    /// Phi nodes that were replaced and exchanged away.
    pub nodes_replaced: usize,
}

fn is_candidate(graph: &Graph, id: NodeId) -> bool {
    let node = graph.arena().get(id);
    node.opcode.is_phi() && !node.is_loop_phi()
}

/// Finds every maximal SCC among Phi nodes reachable from the subgraph of
/// `is_candidate` nodes, in reverse topological order (inner first), using
/// an explicit stack so the recursion depth of the source's `find_scc_at`
/// cannot overflow the native stack on deep graphs.
fn seed_sccs(graph: &Graph, link: &mut LinkGuard<'_, TarjanInfo>) -> Vec<Vec<NodeId>> {
    struct Frame {
        node: NodeId,
        next_child: usize,
    }

    let mut next_index = 0u32;
    let mut tarjan_stack: Vec<NodeId> = Vec::new();
    let mut sccs: Vec<Vec<NodeId>> = Vec::new();

    let all_ids: Vec<NodeId> = graph.arena().iter_ids().collect();
    for root in all_ids {
        if !is_candidate(graph, root) || link.get(root).is_some() {
            continue;
        }

        next_index += 1;
        link.set(
            root,
            TarjanInfo {
                dfn: next_index,
                uplink: next_index,
                on_stack: true,
            },
        );
        tarjan_stack.push(root);
        let mut call_stack = vec![Frame { node: root, next_child: 0 }];

        while let Some(top) = call_stack.len().checked_sub(1) {
            let node = call_stack[top].node;
            let next_child = call_stack[top].next_child;
            let inputs = graph.arena().get(node).inputs().to_vec();
            if next_child < inputs.len() {
                call_stack[top].next_child += 1;
                let child = inputs[next_child];
                if !is_candidate(graph, child) {
                    continue;
                }
                match link.get(child).copied() {
                    None => {
                        next_index += 1;
                        link.set(
                            child,
                            TarjanInfo {
                                dfn: next_index,
                                uplink: next_index,
                                on_stack: true,
                            },
                        );
                        tarjan_stack.push(child);
                        call_stack.push(Frame { node: child, next_child: 0 });
                    }
                    Some(child_info) if child_info.on_stack => {
                        let node_info = link.get(node).copied().unwrap();
                        let new_uplink = node_info.uplink.min(child_info.dfn);
                        link.get_mut(node).as_mut().unwrap().uplink = new_uplink;
                    }
                    Some(_) => {}
                }
            } else {
                call_stack.pop();
                let node_info = link.get(node).copied().unwrap();
                if let Some(parent_frame) = call_stack.last() {
                    let parent = parent_frame.node;
                    let parent_info = link.get(parent).copied().unwrap();
                    let new_uplink = parent_info.uplink.min(node_info.uplink);
                    link.get_mut(parent).as_mut().unwrap().uplink = new_uplink;
                }
                if node_info.dfn == node_info.uplink {
                    let mut scc = Vec::new();
                    loop {
                        let w = tarjan_stack.pop().expect("tarjan stack underflow");
                        link.get_mut(w).as_mut().unwrap().on_stack = false;
                        scc.push(w);
                        if w == node {
                            break;
                        }
                    }
                    sccs.push(scc);
                }
            }
        }
    }
    sccs
}

/// Follows the replacement chain to its fixpoint. The source resolves this
/// at every operand lookup *and* again at final exchange time; we do the
/// same rather than caching, since the map keeps growing across rounds.
fn resolve(map: &HashMap<NodeId, NodeId>, mut node: NodeId, bound: usize) -> NodeId {
    for _ in 0..=bound {
        match map.get(&node) {
            Some(&next) => node = next,
            None => return node,
        }
    }
    panic!("replacement map chain for {node:?} did not terminate; map is cyclic");
}

/// Runs the pass to completion on `graph`. Requires the use-edge index to be
/// active (the `exchange` step rewrites every user of a replaced node).
pub fn eliminate_redundant_phi_sccs(graph: &mut Graph) -> Result<PhiSccStats> {
    ensure!(
        graph.arena().use_edges_active(),
        CoreError::AnalysisNotValid {
            analysis: "use-edges"
        }
    );

    let initial_sccs = {
        let mut link = graph.reserve_link::<TarjanInfo>()?;
        seed_sccs(graph, &mut link)
    };

    let bound = graph.arena().len();
    let mut replacement: HashMap<NodeId, NodeId> = HashMap::new();
    let mut working: VecDeque<Vec<NodeId>> = initial_sccs.into_iter().collect();
    let mut stats = PhiSccStats::default();

    loop {
        let mut next_round: Vec<Vec<NodeId>> = Vec::new();
        let mut any_progress = false;

        for scc in working.drain(..) {
            stats.sccs_considered += 1;
            let members: HashSet<NodeId> = scc.iter().copied().collect();

            let mut unique_pred: Option<NodeId> = None;
            let mut redundant = true;
            let mut pinned: HashSet<NodeId> = HashSet::new();

            for &member in &scc {
                let mut eligible_for_next = true;
                for &orig_pred in graph.arena().get(member).inputs() {
                    let pred = resolve(&replacement, orig_pred, bound);
                    if members.contains(&pred) {
                        continue;
                    }
                    eligible_for_next = false;
                    match unique_pred {
                        None => unique_pred = Some(pred),
                        Some(p) if p == pred => {}
                        Some(_) => redundant = false,
                    }
                }
                if !eligible_for_next {
                    pinned.insert(member);
                }
            }

            if redundant {
                let p = unique_pred.expect(
                    "a completely isolated Phi cycle has no outside predecessor; \
                     well-formed graphs are not expected to contain one",
                );
                for &member in &scc {
                    replacement.insert(member, p);
                }
                stats.nodes_replaced += scc.len();
                any_progress = true;
            } else {
                if !pinned.is_empty() {
                    any_progress = true;
                }
                let residual: Vec<NodeId> =
                    scc.into_iter().filter(|m| !pinned.contains(m)).collect();
                if residual.len() >= 2 {
                    next_round.push(residual);
                }
            }
        }

        working = next_round.into();
        if !any_progress || working.is_empty() {
            break;
        }
    }

    for (&member, _) in replacement.clone().iter() {
        let target = resolve(&replacement, member, bound);
        graph.arena_mut().exchange(member, target);
    }

    Ok(stats)
}
