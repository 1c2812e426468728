//! Slot allocator used by the alpha pass.
//!
//! A lock box hands out buffer slots to outgoing faces and takes them back
//! when the downstream face consumes the data. Claims are first fit: the
//! lowest free slot is reused before the box grows, which keeps the local
//! flux buffers as small as the sweep front allows. The box length after
//! the pass is the slot count the buffer must be allocated with.

use crate::debug_invariants::DebugInvariants;
use crate::sweep_error::SweepError;
use crate::topology::GlobalCellId;
use std::collections::HashSet;

/// Position of a slot inside a lock box.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotIndex(usize);

impl SlotIndex {
    #[inline]
    pub const fn get(self) -> usize {
        self.0
    }
}

/// Identifies the face that will consume a slot: the downstream cell's
/// global id and the index of its incoming face.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct FaceTag {
    pub cell: GlobalCellId,
    pub face: usize,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SlotState {
    Free,
    Claimed(FaceTag),
}

#[derive(Clone, Debug, Default)]
pub struct LockBox {
    slots: Vec<SlotState>,
    num_claimed: usize,
}

impl LockBox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the lowest free slot for `tag`, growing the box if none is free.
    pub fn claim(&mut self, tag: FaceTag) -> SlotIndex {
        self.num_claimed += 1;
        if let Some(i) = self.slots.iter().position(|s| *s == SlotState::Free) {
            self.slots[i] = SlotState::Claimed(tag);
            return SlotIndex(i);
        }
        self.slots.push(SlotState::Claimed(tag));
        SlotIndex(self.slots.len() - 1)
    }

    /// Slot currently claimed for `tag`, if any.
    pub fn lookup(&self, tag: FaceTag) -> Option<SlotIndex> {
        self.slots
            .iter()
            .position(|s| *s == SlotState::Claimed(tag))
            .map(SlotIndex)
    }

    /// Free the slot claimed for `tag`. `None` when no slot carries it.
    pub fn release(&mut self, tag: FaceTag) -> Option<SlotIndex> {
        let slot = self.lookup(tag)?;
        self.slots[slot.0] = SlotState::Free;
        self.num_claimed -= 1;
        Some(slot)
    }

    pub fn num_claimed(&self) -> usize {
        self.num_claimed
    }

    /// Slots ever needed at once (the allocation size).
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn state(&self, slot: SlotIndex) -> Option<SlotState> {
        self.slots.get(slot.0).copied()
    }
}

impl DebugInvariants for LockBox {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "LockBox");
    }

    fn validate_invariants(&self) -> Result<(), SweepError> {
        let mut seen = HashSet::new();
        let mut claimed = 0usize;
        for s in &self.slots {
            if let SlotState::Claimed(tag) = s {
                claimed += 1;
                if !seen.insert(*tag) {
                    return Err(SweepError::InvalidGrid(format!(
                        "face {} of cell {} claims two lock box slots",
                        tag.face, tag.cell
                    )));
                }
            }
        }
        if claimed != self.num_claimed {
            return Err(SweepError::InvalidGrid(format!(
                "lock box counts {} claims but holds {claimed}",
                self.num_claimed
            )));
        }
        Ok(())
    }
}
