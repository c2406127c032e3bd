use crate::error::{Error, Result};
use crate::types::{BinId, Color, ItemId};

/// A single position inside a bin. `Reserved` and `Filled` are mutually exclusive by
/// construction: a slot holds at most one item id in exactly one of the two modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Empty,
    Reserved(ItemId),
    Filled(ItemId),
}

impl Slot {
    pub fn is_empty(&self) -> bool {
        matches!(self, Slot::Empty)
    }

    /// Returns the item occupying this slot, reserved or filled.
    pub fn item(&self) -> Option<ItemId> {
        match self {
            Slot::Empty => None,
            Slot::Reserved(item) | Slot::Filled(item) => Some(*item),
        }
    }
}

/// Where a bin is in its life. Bins only ever move forward through these states, apart from a
/// full bin dropping back to active when one of its reservations is released before draining.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinLifecycle {
    Active,
    /// No empty slot left; every slot is filled or reserved.
    Full,
    /// The drain countdown is running. Nothing new is admitted.
    Draining,
    Retired,
}

/// A capacity-limited, single-color destination. The color is fixed for the bin's whole life;
/// changing color means retiring this bin and creating another.
#[derive(Debug, Clone)]
pub struct Bin {
    id: BinId,
    color: Color,
    slots: Vec<Slot>,
    lifecycle: BinLifecycle,
}

impl Bin {
    pub(super) fn new(id: BinId, color: Color, capacity: usize) -> Self {
        debug_assert!(capacity > 0, "bin capacity must be non-zero");

        Self {
            id,
            color,
            slots: vec![Slot::Empty; capacity],
            lifecycle: BinLifecycle::Active,
        }
    }

    pub fn id(&self) -> BinId {
        self.id
    }

    pub fn color(&self) -> Color {
        self.color
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn lifecycle(&self) -> BinLifecycle {
        self.lifecycle
    }

    pub fn filled_count(&self) -> usize {
        self.slots.iter().filter(|s| matches!(s, Slot::Filled(_))).count()
    }

    pub fn reserved_count(&self) -> usize {
        self.slots.iter().filter(|s| matches!(s, Slot::Reserved(_))).count()
    }

    /// Number of slots neither reserved nor filled.
    pub fn free_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_empty()).count()
    }

    pub fn first_empty_slot(&self) -> Option<usize> {
        self.slots.iter().position(Slot::is_empty)
    }

    pub fn has_open_reservations(&self) -> bool {
        self.reserved_count() > 0
    }

    /// Returns `true` if the bin can take another item right now.
    pub fn is_accepting(&self) -> bool {
        self.lifecycle == BinLifecycle::Active && self.free_count() > 0
    }

    pub fn filled_items(&self) -> Vec<ItemId> {
        self.slots
            .iter()
            .filter_map(|slot| match slot {
                Slot::Filled(item) => Some(*item),
                _ => None,
            })
            .collect()
    }

    fn slot_ref(&self, slot: usize) -> Result<&Slot> {
        self.slots.get(slot).ok_or(Error::SlotOutOfRange {
            bin: self.id,
            slot,
            capacity: self.slots.len(),
        })
    }

    /// Compare-and-set `Empty -> Reserved(item)`. Any other current value is a conflict and
    /// leaves the slot untouched.
    pub(super) fn reserve(&mut self, slot: usize, item: ItemId) -> Result<()> {
        if self.lifecycle != BinLifecycle::Active {
            return Err(Error::BinNotActive(self.id));
        }

        match *self.slot_ref(slot)? {
            Slot::Empty => {
                self.slots[slot] = Slot::Reserved(item);
                if self.free_count() == 0 {
                    self.lifecycle = BinLifecycle::Full;
                }
                Ok(())
            }
            Slot::Reserved(holder) | Slot::Filled(holder) => Err(Error::ReservationConflict {
                bin: self.id,
                slot,
                holder,
            }),
        }
    }

    /// `Reserved(item) -> Filled(item)`. The reservation has to belong to `item`.
    pub(super) fn fill(&mut self, slot: usize, item: ItemId) -> Result<()> {
        match *self.slot_ref(slot)? {
            Slot::Reserved(holder) if holder == item => {
                self.slots[slot] = Slot::Filled(item);
                Ok(())
            }
            Slot::Reserved(holder) => Err(Error::FillMismatch {
                bin: self.id,
                slot,
                expected: holder,
                found: item,
            }),
            _ => Err(Error::SlotNotReserved { bin: self.id, slot }),
        }
    }

    /// `Reserved(_) -> Empty`, returning the item whose reservation was dropped.
    pub(super) fn release(&mut self, slot: usize) -> Result<ItemId> {
        match *self.slot_ref(slot)? {
            Slot::Reserved(holder) => {
                self.slots[slot] = Slot::Empty;
                if self.lifecycle == BinLifecycle::Full {
                    self.lifecycle = BinLifecycle::Active;
                }
                Ok(holder)
            }
            _ => Err(Error::SlotNotReserved { bin: self.id, slot }),
        }
    }

    pub(super) fn begin_drain(&mut self) {
        debug_assert_eq!(self.lifecycle, BinLifecycle::Full);
        self.lifecycle = BinLifecycle::Draining;
    }

    /// Marks the bin retired and empties it, returning the filled items in slot order.
    pub(super) fn retire(&mut self) -> Vec<ItemId> {
        debug_assert!(!self.has_open_reservations());
        let filled = self.filled_items();
        self.slots.iter_mut().for_each(|slot| *slot = Slot::Empty);
        self.lifecycle = BinLifecycle::Retired;
        filled
    }

    /// Builds a bin from restored slot contents; everything present is treated as filled. A bin
    /// saved mid-drain stays draining even if slots reserved at save time came back empty.
    pub(super) fn restored(
        id: BinId,
        color: Color,
        contents: Vec<Option<ItemId>>,
        draining: bool,
    ) -> Self {
        let slots: Vec<Slot> = contents
            .into_iter()
            .map(|item| item.map_or(Slot::Empty, Slot::Filled))
            .collect();
        let lifecycle = if draining {
            BinLifecycle::Draining
        } else if slots.iter().any(Slot::is_empty) {
            BinLifecycle::Active
        } else {
            BinLifecycle::Full
        };

        Self {
            id,
            color,
            slots,
            lifecycle,
        }
    }

    #[cfg(debug_assertions)]
    /// Verifies the slot invariants, panicking in debug builds when something is inconsistent.
    pub fn sanity_check(&self) {
        debug_assert!(self.filled_count() + self.reserved_count() <= self.capacity());
        if self.lifecycle == BinLifecycle::Retired {
            debug_assert_eq!(self.free_count(), self.capacity());
        }
        if self.lifecycle == BinLifecycle::Active {
            debug_assert!(self.free_count() > 0);
        }

        let mut seen: Vec<ItemId> = self.slots.iter().filter_map(Slot::item).collect();
        let occupied = seen.len();
        seen.sort_unstable();
        seen.dedup();
        debug_assert_eq!(seen.len(), occupied, "an item occupies two slots of bin {}", self.id);
    }
}
