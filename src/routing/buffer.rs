use crate::error::{Error, Result};
use crate::types::ItemId;

/// One overflow position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferSlot {
    pub id: usize,
    pub occupant: Option<ItemId>,
}

/// A change in buffer fullness. Produced only on the transition itself, never while the buffer
/// merely stays full or stays open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferEdge {
    BecameFull,
    BecameAvailable,
}

/// Fixed-size overflow buffer for items that no bin currently accepts.
#[derive(Debug, Clone)]
pub struct Buffer {
    slots: Vec<BufferSlot>,
    // fullness as of the last observed edge
    reported_full: bool,
}

impl Buffer {
    pub fn new(size: usize) -> Self {
        Self {
            slots: (0..size).map(|id| BufferSlot { id, occupant: None }).collect(),
            reported_full: false,
        }
    }

    /// Rebuilds a buffer from restored occupants. The current fullness counts as already
    /// reported so a restore does not replay a `BecameFull` edge.
    pub(super) fn restored(occupants: Vec<Option<ItemId>>) -> Self {
        let slots: Vec<BufferSlot> = occupants
            .into_iter()
            .enumerate()
            .map(|(id, occupant)| BufferSlot { id, occupant })
            .collect();
        let reported_full = !slots.is_empty() && slots.iter().all(|s| s.occupant.is_some());
        Self {
            slots,
            reported_full,
        }
    }

    pub fn size(&self) -> usize {
        self.slots.len()
    }

    pub fn slots(&self) -> &[BufferSlot] {
        &self.slots
    }

    pub fn occupancy(&self) -> usize {
        self.slots.iter().filter(|s| s.occupant.is_some()).count()
    }

    pub fn is_full(&self) -> bool {
        self.occupancy() == self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.occupancy() == 0
    }

    pub fn occupant(&self, slot: usize) -> Option<ItemId> {
        self.slots.get(slot).and_then(|s| s.occupant)
    }

    pub fn slot_of(&self, item: ItemId) -> Option<usize> {
        self.slots.iter().position(|s| s.occupant == Some(item))
    }

    /// Places `item` in the first empty slot, returning the slot index.
    pub(super) fn occupy(&mut self, item: ItemId) -> Option<usize> {
        let slot = self.slots.iter_mut().find(|s| s.occupant.is_none())?;
        slot.occupant = Some(item);
        Some(slot.id)
    }

    /// Places `item` back into a specific slot if that slot is still empty.
    pub(super) fn occupy_at(&mut self, slot: usize, item: ItemId) -> Result<bool> {
        let entry = self.slots.get_mut(slot).ok_or(Error::UnknownBufferSlot(slot))?;
        match entry.occupant {
            None => {
                entry.occupant = Some(item);
                Ok(true)
            }
            Some(existing) => Ok(existing == item),
        }
    }

    /// Empties a slot, returning whoever was in it.
    pub(super) fn vacate(&mut self, slot: usize) -> Result<Option<ItemId>> {
        let entry = self.slots.get_mut(slot).ok_or(Error::UnknownBufferSlot(slot))?;
        Ok(entry.occupant.take())
    }

    /// Compares the current fullness with the last reported one and returns the edge, if any.
    pub fn take_edge(&mut self) -> Option<BufferEdge> {
        let full = self.is_full();
        if full == self.reported_full {
            return None;
        }

        self.reported_full = full;
        Some(if full {
            BufferEdge::BecameFull
        } else {
            BufferEdge::BecameAvailable
        })
    }
}
