//! Per-procedure container: the node arena plus the handful of scoped,
//! process-of-one resources passes reserve while they run (see spec.md §5).

use std::cell::Cell;

use anyhow::{ensure, Result};

use crate::ir::arena::Arena;
use crate::ir::frame_type::FrameType;
use crate::ir::node::{NodeId, Opcode};
use crate::mode::Mode;

/// A procedure's SSA graph: the node arena, entry/end blocks and frame type.
pub struct Graph {
    pub(crate) arena: Arena,
    start_block: NodeId,
    end_block: NodeId,
    start: NodeId,
    end: NodeId,
    pub frame: FrameType,
    link_reserved: Cell<bool>,
    block_visited_reserved: Cell<bool>,
    block_visited_counter: Cell<u32>,
}

impl Graph {
    /// Creates a new, empty procedure: a `Start` node in the entry block and
    /// an `End` node in the end block, wired to each other's control flow
    /// the way a fresh procedure graph is expected to begin.
    pub fn new() -> Graph {
        let mut arena = Arena::new();
        let start_block = arena.new_node(None, Opcode::Block, Mode::block(), vec![], Default::default());
        let start = arena.new_node(Some(start_block), Opcode::Start, Mode::control(), vec![], Default::default());
        let end_block = arena.new_node(None, Opcode::Block, Mode::block(), vec![start_block], Default::default());
        let end = arena.new_node(Some(end_block), Opcode::End, Mode::control(), vec![], Default::default());
        Graph {
            arena,
            start_block,
            end_block,
            start,
            end,
            frame: FrameType::new(),
            link_reserved: Cell::new(false),
            block_visited_reserved: Cell::new(false),
            block_visited_counter: Cell::new(0),
        }
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    pub fn arena_mut(&mut self) -> &mut Arena {
        &mut self.arena
    }

    pub fn start_block(&self) -> NodeId {
        self.start_block
    }

    pub fn end_block(&self) -> NodeId {
        self.end_block
    }

    pub fn start(&self) -> NodeId {
        self.start
    }

    pub fn end(&self) -> NodeId {
        self.end
    }

    /// Reserves the scratch link slot for the duration of a pass. The
    /// returned [`LinkGuard`] owns a freshly cleared side table sized to the
    /// current node count; dropping it releases the reservation.
    pub fn reserve_link<T>(&self) -> Result<LinkGuard<'_, T>> {
        ensure!(
            !self.link_reserved.replace(true),
            crate::error::CoreError::ResourceAlreadyReserved { resource: "link" }
        );
        Ok(LinkGuard {
            reserved: &self.link_reserved,
            table: (0..self.arena.len()).map(|_| None).collect(),
        })
    }

    /// Reserves the block-visited counter, bumping it so any marks left by a
    /// previous reservation are implicitly invalidated.
    pub fn reserve_block_visited(&self) -> Result<BlockVisitedGuard<'_>> {
        ensure!(
            !self.block_visited_reserved.replace(true),
            crate::error::CoreError::ResourceAlreadyReserved {
                resource: "block-visited"
            }
        );
        let stamp = self.block_visited_counter.get() + 1;
        self.block_visited_counter.set(stamp);
        Ok(BlockVisitedGuard {
            reserved: &self.block_visited_reserved,
            stamp,
            marks: vec![0; self.arena.len()],
        })
    }
}

impl Default for Graph {
    fn default() -> Self {
        Graph::new()
    }
}

/// Scoped reservation of the link-slot scratch field, modeled as a dense
/// side table indexed by node identity rather than a pointer on the node
/// itself (see `DESIGN.md`).
pub struct LinkGuard<'g, T> {
    reserved: &'g Cell<bool>,
    table: Vec<Option<T>>,
}

impl<'g, T> LinkGuard<'g, T> {
    pub fn get(&self, id: NodeId) -> Option<&T> {
        self.table.get(id.index()).and_then(|o| o.as_ref())
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut Option<T> {
        if id.index() >= self.table.len() {
            self.table.resize_with(id.index() + 1, || None);
        }
        &mut self.table[id.index()]
    }

    pub fn set(&mut self, id: NodeId, value: T) {
        *self.get_mut(id) = Some(value);
    }

    pub fn clear(&mut self) {
        for slot in &mut self.table {
            *slot = None;
        }
    }
}

impl<T> Drop for LinkGuard<'_, T> {
    fn drop(&mut self) {
        self.reserved.set(false);
    }
}

/// Scoped reservation of the block-visited counter.
pub struct BlockVisitedGuard<'g> {
    reserved: &'g Cell<bool>,
    stamp: u32,
    marks: Vec<u32>,
}

impl<'g> BlockVisitedGuard<'g> {
    pub fn visit(&mut self, id: NodeId) -> bool {
        if id.index() >= self.marks.len() {
            self.marks.resize(id.index() + 1, 0);
        }
        if self.marks[id.index()] == self.stamp {
            false
        } else {
            self.marks[id.index()] = self.stamp;
            true
        }
    }

    pub fn is_visited(&self, id: NodeId) -> bool {
        self.marks.get(id.index()).copied() == Some(self.stamp)
    }
}

impl Drop for BlockVisitedGuard<'_> {
    fn drop(&mut self) {
        self.reserved.set(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlapping_link_reservation_fails() {
        let g = Graph::new();
        let _first = g.reserve_link::<u32>().unwrap();
        let second = g.reserve_link::<u32>();
        assert!(second.is_err());
    }

    #[test]
    fn release_allows_reacquire() {
        let g = Graph::new();
        {
            let _first = g.reserve_link::<u32>().unwrap();
        }
        assert!(g.reserve_link::<u32>().is_ok());
    }

    #[test]
    fn block_visited_reservation_bumps_counter() {
        let g = Graph::new();
        let mut guard = g.reserve_block_visited().unwrap();
        assert!(guard.visit(g.start_block()));
        assert!(!guard.visit(g.start_block()));
    }
}
