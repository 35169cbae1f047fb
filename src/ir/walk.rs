//! Generic traversal helpers shared by the passes: pre/post order walks over
//! the operand graph, and a block walk over the CFG.

use crate::ir::block::succs;
use crate::ir::graph::Graph;
use crate::ir::node::NodeId;

/// Visits every node reachable from `root` through operand edges, calling
/// `visit` before descending into a node's operands.
pub fn walk_pre(graph: &Graph, root: NodeId, mut visit: impl FnMut(NodeId)) {
    let mut link = graph.reserve_link::<()>().expect("walk_pre: link slot busy");
    let mut stack = vec![root];
    while let Some(n) = stack.pop() {
        if link.get(n).is_some() {
            continue;
        }
        link.set(n, ());
        visit(n);
        for &input in graph.arena().get(n).inputs() {
            stack.push(input);
        }
    }
}

/// Visits every node reachable from `root` through operand edges, calling
/// `visit` only after all of a node's operands have been visited
/// (topological / post order). A node is marked "pending" the moment it is
/// pushed, not when it is popped, so a cycle through a Phi never re-enqueues
/// an ancestor that is still being expanded; that ancestor's own `visit`
/// simply runs later, when its original stack entry is popped.
pub fn walk_post(graph: &Graph, root: NodeId, mut visit: impl FnMut(NodeId)) {
    let mut link = graph.reserve_link::<bool>().expect("walk_post: link slot busy");
    // false = pending (pushed, operands not yet expanded), true = done
    let mut stack = vec![(root, false)];
    link.set(root, false);
    while let Some((n, expand_children)) = stack.pop() {
        if expand_children {
            link.set(n, true);
            visit(n);
            continue;
        }
        stack.push((n, true));
        for &input in graph.arena().get(n).inputs() {
            if link.get(input).is_none() {
                link.set(input, false);
                stack.push((input, false));
            }
        }
    }
}

/// Visits every block reachable from `start` in the CFG, in post order
/// (every successor visited before the block itself), each block visited at
/// most once.
pub fn walk_blocks_post(graph: &Graph, start: NodeId, mut visit: impl FnMut(NodeId)) {
    let mut visited = graph
        .reserve_block_visited()
        .expect("walk_blocks_post: block-visited counter busy");
    let mut stack = vec![(start, false)];
    while let Some((b, expanded)) = stack.pop() {
        if expanded {
            visit(b);
            continue;
        }
        if !visited.visit(b) {
            continue;
        }
        stack.push((b, true));
        for s in succs(graph, b) {
            if !visited.is_visited(s) {
                stack.push((s, false));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::block::new_block;

    #[test]
    fn pre_order_visits_each_node_once() {
        let mut g = Graph::new();
        g.arena_mut().enable_use_edges();
        let b0 = new_block(&mut g, vec![g.start_block()]);
        let b1 = new_block(&mut g, vec![b0]);
        let mut seen = Vec::new();
        walk_pre(&g, b1, |n| seen.push(n));
        assert_eq!(seen.len(), seen.iter().collect::<std::collections::HashSet<_>>().len());
        assert!(seen.contains(&b0));
        assert!(seen.contains(&b1));
    }

    #[test]
    fn block_walk_visits_each_block_once() {
        let mut g = Graph::new();
        g.arena_mut().enable_use_edges();
        let b0 = new_block(&mut g, vec![g.start_block()]);
        let _b1 = new_block(&mut g, vec![b0]);
        let mut count = 0;
        walk_blocks_post(&g, g.start_block(), |_| count += 1);
        assert_eq!(count, 3); // start_block, b0, b1
    }
}
