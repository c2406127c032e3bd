use std::collections::BTreeMap;

use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::routing::bin::{Bin, BinLifecycle};
use crate::routing::buffer::{Buffer, BufferEdge};
use crate::types::{BinId, Color, ItemId, clamp_capacity};

/// Free capacity and bin counts per color, as seen by the replacement planner.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapacityView {
    free: BTreeMap<Color, usize>,
    bins: BTreeMap<Color, usize>,
}

impl CapacityView {
    /// Free slots over the active bins of `color`.
    pub fn available(&self, color: Color) -> usize {
        self.free.get(&color).copied().unwrap_or(0)
    }

    /// Number of active bins of `color`.
    pub fn bin_count(&self, color: Color) -> usize {
        self.bins.get(&color).copied().unwrap_or(0)
    }

    pub(crate) fn add_bin(&mut self, color: Color, free: usize) {
        *self.bins.entry(color).or_default() += 1;
        *self.free.entry(color).or_default() += free;
    }
}

/**
 * The canonical state of every bin and of the overflow buffer. Every slot mutation in the crate
 * goes through here: `reserve`, `fill` and `release` for bin slots, and the `buffer_*` family for
 * the buffer. Retired bins stay in the ledger until the planner either replaces or discards them.
 */
#[derive(Debug)]
pub struct Ledger {
    bins: BTreeMap<BinId, Bin>,
    buffer: Buffer,
    next_bin_id: BinId,
}

impl Ledger {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            bins: BTreeMap::new(),
            buffer: Buffer::new(buffer_size),
            next_bin_id: 0,
        }
    }

    /// Rebuilds a ledger from already repaired bins and buffer contents.
    pub(super) fn restored(bins: Vec<Bin>, buffer: Buffer) -> Self {
        let next_bin_id = bins.iter().map(|b| b.id() + 1).max().unwrap_or(0);
        Self {
            bins: bins.into_iter().map(|b| (b.id(), b)).collect(),
            buffer,
            next_bin_id,
        }
    }

    /// Creates a new active bin. The capacity is clamped into the legal range.
    pub fn create_bin(&mut self, color: Color, capacity: usize) -> BinId {
        let id = self.next_bin_id;
        self.next_bin_id += 1;
        let capacity = clamp_capacity(capacity as i64);
        self.bins.insert(id, Bin::new(id, color, capacity));
        debug!(bin = id, %color, capacity, "Bin created");
        id
    }

    pub fn bin(&self, id: BinId) -> Option<&Bin> {
        self.bins.get(&id)
    }

    pub fn bins(&self) -> impl Iterator<Item = &Bin> {
        self.bins.values()
    }

    /// Bins that are still admitting items.
    pub fn active_bins(&self) -> impl Iterator<Item = &Bin> {
        self.bins
            .values()
            .filter(|b| b.lifecycle() == BinLifecycle::Active)
    }

    fn bin_mut(&mut self, id: BinId) -> Result<&mut Bin> {
        self.bins.get_mut(&id).ok_or(Error::UnknownBin(id))
    }

    /// Free slots over all active bins of `color`.
    pub fn available_capacity(&self, color: Color) -> usize {
        self.active_bins()
            .filter(|b| b.color() == color)
            .map(Bin::free_count)
            .sum()
    }

    /// Returns the first active bin of `color` with an empty slot, and that slot.
    pub fn find_open_slot(&self, color: Color) -> Option<(BinId, usize)> {
        self.active_bins()
            .filter(|b| b.color() == color)
            .find_map(|b| b.first_empty_slot().map(|slot| (b.id(), slot)))
    }

    /// Capacity per color over active bins, leaving out `excluding`.
    pub fn capacity_view(&self, excluding: Option<BinId>) -> CapacityView {
        let mut view = CapacityView::default();
        for bin in self.active_bins().filter(|b| Some(b.id()) != excluding) {
            view.add_bin(bin.color(), bin.free_count());
        }
        view
    }

    /// Claims `slot` of `bin` for `item`. Succeeds only if the slot is empty; the check and the
    /// claim happen in one step, so a second request for the same slot always sees the first.
    pub fn reserve(&mut self, bin: BinId, slot: usize, item: ItemId) -> Result<()> {
        self.bin_mut(bin)?.reserve(slot, item)?;
        trace!(bin, slot, item, "Slot reserved");
        Ok(())
    }

    /// Turns the reservation held by `item` into a filled slot.
    pub fn fill(&mut self, bin: BinId, slot: usize, item: ItemId) -> Result<()> {
        self.bin_mut(bin)?.fill(slot, item)?;
        trace!(bin, slot, item, "Slot filled");
        Ok(())
    }

    /// Drops a reservation, returning the item that held it.
    pub fn release(&mut self, bin: BinId, slot: usize) -> Result<ItemId> {
        let item = self.bin_mut(bin)?.release(slot)?;
        trace!(bin, slot, item, "Reservation released");
        Ok(item)
    }

    /// Starts draining a full bin.
    pub fn begin_drain(&mut self, bin: BinId) -> Result<()> {
        let entry = self.bin_mut(bin)?;
        if entry.lifecycle() != BinLifecycle::Full {
            return Err(Error::BinNotActive(bin));
        }
        entry.begin_drain();
        debug!(bin, "Bin draining");
        Ok(())
    }

    /// Retires a draining bin and returns every filled item it held. Refused while any slot is
    /// still reserved.
    pub fn retire(&mut self, bin: BinId) -> Result<Vec<ItemId>> {
        let entry = self.bin_mut(bin)?;
        if entry.lifecycle() != BinLifecycle::Draining {
            return Err(Error::BinNotActive(bin));
        }
        if entry.has_open_reservations() {
            return Err(Error::RetirementBlocked(bin));
        }

        let items = entry.retire();
        debug!(bin, committed = items.len(), "Bin retired");
        Ok(items)
    }

    /// Destroys a retired bin and creates its replacement. The old bin must already be retired,
    /// which guarantees its filled items went through commit accounting first.
    pub fn replace(&mut self, retired: BinId, color: Color, capacity: usize) -> Result<BinId> {
        self.discard(retired)?;
        Ok(self.create_bin(color, capacity))
    }

    /// Destroys a retired bin without a replacement.
    pub fn discard(&mut self, retired: BinId) -> Result<()> {
        let entry = self.bins.get(&retired).ok_or(Error::UnknownBin(retired))?;
        if entry.lifecycle() != BinLifecycle::Retired {
            return Err(Error::BinNotRetired(retired));
        }
        self.bins.remove(&retired);
        Ok(())
    }

    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    /// Puts `item` into the first empty buffer slot.
    pub fn buffer_admit(&mut self, item: ItemId) -> Option<usize> {
        let slot = self.buffer.occupy(item)?;
        trace!(slot, item, "Buffer slot taken");
        Some(slot)
    }

    /// Returns `item` to a specific buffer slot. `Ok(false)` means the slot is held by another
    /// item.
    pub fn buffer_return(&mut self, slot: usize, item: ItemId) -> Result<bool> {
        self.buffer.occupy_at(slot, item)
    }

    pub fn buffer_vacate(&mut self, slot: usize) -> Result<Option<ItemId>> {
        let item = self.buffer.vacate(slot)?;
        trace!(slot, ?item, "Buffer slot vacated");
        Ok(item)
    }

    pub fn buffer_edge(&mut self) -> Option<BufferEdge> {
        self.buffer.take_edge()
    }

    #[cfg(debug_assertions)]
    /// Verifies every bin and that no item appears in two bin slots.
    pub fn sanity_check(&self) {
        let mut seen: Vec<ItemId> = Vec::new();
        for bin in self.bins.values() {
            bin.sanity_check();
            seen.extend(bin.slots().iter().filter_map(|s| s.item()));
        }
        let in_bins = seen.len();
        seen.sort_unstable();
        seen.dedup();
        debug_assert_eq!(seen.len(), in_bins, "an item occupies two bin slots");
    }
}
