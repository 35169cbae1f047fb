//! Frame layout (spec.md §4.5): assigns every [`FrameEntity`] a byte offset
//! within the activation record and fixes the frame's total size.
//!
//! The frame grows downward from a caller-supplied `begin`. Members already
//! carrying a front-end-assigned offset are left untouched and do not
//! advance the cursor; the rest are placed in sorted order, one immediately
//! below the last.

use crate::ir::frame_type::{EntityKind, FrameEntity, FrameType};

/// Reorders `frame`'s members so spill slots are grouped either first or
/// last, with members of the same kind ordered by their `nr` (spec.md
/// §4.5's "sort step").
pub fn sort_frame_entities(frame: &mut FrameType, spillslots_first: bool) {
    frame.members.sort_by(|a, b| {
        let a_slot = a.kind == EntityKind::SpillSlot;
        let b_slot = b.kind == EntityKind::SpillSlot;
        if a_slot != b_slot {
            let a_first = a_slot == spillslots_first;
            let b_first = b_slot == spillslots_first;
            return b_first.cmp(&a_first);
        }
        a.nr.cmp(&b.nr)
    });
}

/// Rounds `x` up so that `x + misalign` is a multiple of `alignment`, then
/// removes `misalign` again. Used both per-member (so each entity lands on
/// its required boundary once `misalign` bytes — e.g. a return address
/// already pushed by the caller — are accounted for) and is folded directly
/// into the per-member offset update below.
pub fn round_up_misaligned(x: i64, alignment: u32, misalign: i64) -> i64 {
    if alignment <= 1 {
        return x;
    }
    let a = alignment as i64;
    let total = x + misalign;
    let rounded = (total + a - 1).div_euclid(a) * a;
    rounded - misalign
}

/// Assigns offsets to every member of `frame` that doesn't already have one
/// and fixes the frame's total size, under the caller's `misalign`
/// correction. `frame` must already be in the order [`sort_frame_entities`]
/// leaves it in. Panics if `frame` is already fixed — layout runs exactly
/// once per procedure.
pub fn layout_frame(frame: &mut FrameType, begin: i64, misalign: i64) {
    assert!(!frame.fixed, "frame layout already fixed");

    let mut offset = begin;
    for entity in &mut frame.members {
        if entity.has_offset() {
            assert!(
                entity.offset >= begin,
                "pre-assigned offset {} of entity {} lies below begin {}",
                entity.offset,
                entity.nr,
                begin
            );
            continue;
        }
        offset -= entity.size as i64;
        offset = -round_up_misaligned(-offset, entity.alignment.max(1), misalign);
        entity.offset = offset;
    }
    frame.size = (-offset) as u32;
    frame.fixed = true;
}
