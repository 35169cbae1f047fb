//! Node ownership, operand edges and the optional use-edge index.

use crate::ir::node::{Node, NodeId, Opcode};
use crate::mode::Mode;
use crate::regreq::NodeRegReqs;

/// A `(user, operand_position)` pair: one entry in a use-edge list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Use {
    pub user: NodeId,
    pub pos: usize,
}

/// Owns every node of one procedure and, when active, the reverse use-edge
/// index.
#[derive(Debug, Default)]
pub struct Arena {
    nodes: Vec<Option<Node>>,
    use_edges: Option<Vec<Vec<Use>>>,
}

impl Arena {
    pub fn new() -> Arena {
        Arena {
            nodes: Vec::new(),
            use_edges: None,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn use_edges_active(&self) -> bool {
        self.use_edges.is_some()
    }

    /// Builds the reverse index from the current forward edges. Passes that
    /// need it declare so on entry; this is the one-time cost of doing so.
    pub fn enable_use_edges(&mut self) {
        if self.use_edges.is_some() {
            return;
        }
        let mut table: Vec<Vec<Use>> = vec![Vec::new(); self.nodes.len()];
        for slot in self.nodes.iter().flatten() {
            for (pos, &input) in slot.inputs.iter().enumerate() {
                table[input.0].push(Use { user: slot.idx, pos });
            }
        }
        self.use_edges = Some(table);
    }

    pub fn disable_use_edges(&mut self) {
        self.use_edges = None;
    }

    #[allow(clippy::too_many_arguments)]
    pub fn new_node(
        &mut self,
        block: Option<NodeId>,
        opcode: Opcode,
        mode: Mode,
        inputs: Vec<NodeId>,
        reg_reqs: NodeRegReqs,
    ) -> NodeId {
        let idx = NodeId(self.nodes.len());
        let node = Node {
            idx,
            opcode,
            mode,
            block,
            inputs,
            reg_reqs,
            dont_spill: false,
        };
        if let Some(table) = &mut self.use_edges {
            for (pos, &input) in node.inputs.iter().enumerate() {
                table[input.0].push(Use { user: idx, pos });
            }
            table.push(Vec::new());
        }
        self.nodes.push(Some(node));
        idx
    }

    pub fn get(&self, id: NodeId) -> &Node {
        self.nodes[id.0]
            .as_ref()
            .unwrap_or_else(|| panic!("node {id:?} was killed"))
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut Node {
        self.nodes[id.0]
            .as_mut()
            .unwrap_or_else(|| panic!("node {id:?} was killed"))
    }

    pub fn is_live(&self, id: NodeId) -> bool {
        self.nodes[id.0].is_some()
    }

    pub fn uses_of(&self, id: NodeId) -> &[Use] {
        self.use_edges
            .as_ref()
            .unwrap_or_else(|| panic!("use-edge index is not active"))[id.0]
            .as_slice()
    }

    pub fn has_users(&self, id: NodeId) -> bool {
        !self.uses_of(id).is_empty()
    }

    pub fn iter_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(i, n)| n.as_ref().map(|_| NodeId(i)))
    }

    /// Atomically swaps the edge at `pos`, updating the use-edge index if
    /// active.
    pub fn set_input(&mut self, node: NodeId, pos: usize, new: NodeId) {
        let old = {
            let n = self.get_mut(node);
            let old = n.inputs[pos];
            n.inputs[pos] = new;
            old
        };
        if old == new {
            return;
        }
        if let Some(table) = &mut self.use_edges {
            if let Some(i) = table[old.0].iter().position(|u| u.user == node && u.pos == pos) {
                table[old.0].swap_remove(i);
            }
            table[new.0].push(Use { user: node, pos });
        }
    }

    /// Rewrites every user of `old` to reference `new` at the corresponding
    /// position, then kills `old` if it ends up unreferenced.
    ///
    /// Requires the use-edge index to be active: materializing the user list
    /// up front (rather than iterating the live index while mutating it) is
    /// exactly the precaution spec.md's "observe each old edge exactly once"
    /// requirement calls for.
    pub fn exchange(&mut self, old: NodeId, new: NodeId) {
        if old == new {
            return;
        }
        let users: Vec<Use> = self.uses_of(old).to_vec();
        for u in users {
            self.set_input(u.user, u.pos, new);
        }
        if !self.has_users(old) && old != new {
            self.kill(old);
        }
    }

    /// Precondition: `node` has no users and has not been scheduled.
    pub fn kill(&mut self, node: NodeId) {
        if self.use_edges_active() && self.has_users(node) {
            panic!("kill({node:?}): node still has users");
        }
        let inputs = self.get(node).inputs.clone();
        if let Some(table) = &mut self.use_edges {
            for (pos, input) in inputs.into_iter().enumerate() {
                if let Some(i) = table[input.0]
                    .iter()
                    .position(|u| u.user == node && u.pos == pos)
                {
                    table[input.0].swap_remove(i);
                }
            }
            table[node.0].clear();
        }
        self.nodes[node.0] = None;
    }
}
