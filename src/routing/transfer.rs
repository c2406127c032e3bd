use std::collections::BTreeMap;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::routing::event::Endpoint;
use crate::routing::item::{ItemState, Owner, OwnershipRegistry};
use crate::routing::ledger::Ledger;
use crate::routing::timer::TimerSet;
use crate::types::{BinId, ItemId};

/// Phase of a single item's trip. `Idle` is simply the absence of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferPhase {
    Reserved,
    InTransit,
    /// Landed in its bin slot; waits there until the bin retires.
    Placed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transfer {
    pub item: ItemId,
    /// Where the item is coming from: the source or a buffer slot.
    pub origin: Owner,
    pub bin: BinId,
    pub slot: usize,
    pub phase: TransferPhase,
}

impl Transfer {
    pub fn from_endpoint(&self) -> Endpoint {
        match self.origin {
            Owner::Buffer(slot) => Endpoint::Buffer(slot),
            _ => Endpoint::Source,
        }
    }

    pub fn to_endpoint(&self) -> Endpoint {
        Endpoint::BinSlot {
            bin: self.bin,
            slot: self.slot,
        }
    }
}

/// Where a failed transfer left its item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailedTransfer {
    pub item: ItemId,
    pub bin: BinId,
    pub slot: usize,
    /// `Owner::Buffer` if the item is back in the buffer, `Owner::Source` if no slot was free.
    pub returned_to: Owner,
}

/**
 * Drives items from a reserved bin slot, through flight, to placement. Each in-flight item runs a
 * fixed-duration timer; when it elapses the transfer is due and the router lands it, unless the
 * animation driver reported completion or failure first.
 *
 * Placement is not commitment: a placed item only becomes committed when its bin retires.
 */
#[derive(Debug)]
pub struct TransferMachine {
    transfers: BTreeMap<ItemId, Transfer>,
    timers: TimerSet<ItemId>,
    duration: Duration,
}

impl TransferMachine {
    pub fn new(duration: Duration) -> Self {
        Self {
            transfers: BTreeMap::new(),
            timers: TimerSet::new(),
            duration,
        }
    }

    pub fn get(&self, item: ItemId) -> Option<&Transfer> {
        self.transfers.get(&item)
    }

    /// Number of items currently reserved or in flight.
    pub fn open_count(&self) -> usize {
        self.transfers
            .values()
            .filter(|t| t.phase != TransferPhase::Placed)
            .count()
    }

    /// Records a reservation the ledger already granted and moves the item to `Reserved`.
    pub fn reserve(
        &mut self,
        registry: &mut OwnershipRegistry,
        item: ItemId,
        origin: Owner,
        bin: BinId,
        slot: usize,
    ) -> Result<()> {
        registry.transition(item, ItemState::Reserved, origin)?;
        self.transfers.insert(
            item,
            Transfer {
                item,
                origin,
                bin,
                slot,
                phase: TransferPhase::Reserved,
            },
        );
        Ok(())
    }

    /// Puts a reserved item in flight and returns the snapshot the animation driver needs.
    pub fn start(&mut self, registry: &mut OwnershipRegistry, item: ItemId) -> Result<Transfer> {
        let transfer = self
            .transfers
            .get_mut(&item)
            .filter(|t| t.phase == TransferPhase::Reserved)
            .ok_or(Error::UnknownTransfer(item))?;

        registry.transition(item, ItemState::InTransit, transfer.origin)?;
        transfer.phase = TransferPhase::InTransit;
        self.timers.start(item, self.duration);
        debug!(item, bin = transfer.bin, slot = transfer.slot, "Transfer started");
        Ok(*transfer)
    }

    /// Lands an in-flight item: fills its reserved slot, frees the buffer slot it came from and
    /// hands ownership to the bin, all in one step.
    pub fn complete(
        &mut self,
        ledger: &mut Ledger,
        registry: &mut OwnershipRegistry,
        item: ItemId,
    ) -> Result<Transfer> {
        let transfer = self
            .transfers
            .get_mut(&item)
            .filter(|t| t.phase == TransferPhase::InTransit)
            .ok_or(Error::UnknownTransfer(item))?;

        ledger.fill(transfer.bin, transfer.slot, item)?;
        if let Owner::Buffer(buffer_slot) = transfer.origin {
            ledger.buffer_vacate(buffer_slot)?;
        }
        registry.transition(item, ItemState::Placed, Owner::Bin(transfer.bin))?;
        transfer.phase = TransferPhase::Placed;
        self.timers.cancel(item);
        debug!(item, bin = transfer.bin, slot = transfer.slot, "Transfer landed");
        Ok(*transfer)
    }

    /// Abandons a reserved or in-flight transfer: the bin reservation is released and the item
    /// goes back to the buffer. An item that came from the source takes any empty buffer slot,
    /// or returns to the source if there is none.
    pub fn fail(
        &mut self,
        ledger: &mut Ledger,
        registry: &mut OwnershipRegistry,
        item: ItemId,
    ) -> Result<FailedTransfer> {
        let transfer = self
            .transfers
            .get(&item)
            .copied()
            .filter(|t| t.phase != TransferPhase::Placed)
            .ok_or(Error::UnknownTransfer(item))?;

        ledger.release(transfer.bin, transfer.slot)?;
        self.transfers.remove(&item);
        self.timers.cancel(item);

        let returned_to = match transfer.origin {
            Owner::Buffer(buffer_slot) => {
                // the buffer slot stays held for the whole trip
                if !ledger.buffer_return(buffer_slot, item)? {
                    warn!(item, buffer_slot, "Buffer slot taken while item was in flight");
                }
                Owner::Buffer(buffer_slot)
            }
            _ => match ledger.buffer_admit(item) {
                Some(buffer_slot) => Owner::Buffer(buffer_slot),
                None => Owner::Source,
            },
        };

        let state = match returned_to {
            Owner::Buffer(_) => ItemState::Buffered,
            _ => ItemState::Available,
        };
        registry.transition(item, state, returned_to)?;
        warn!(item, bin = transfer.bin, slot = transfer.slot, ?returned_to, "Transfer failed");

        Ok(FailedTransfer {
            item,
            bin: transfer.bin,
            slot: transfer.slot,
            returned_to,
        })
    }

    /// Commits the items a retirement drained and forgets their transfers.
    pub fn commit(&mut self, registry: &mut OwnershipRegistry, items: &[ItemId]) -> Result<()> {
        for &item in items {
            registry.commit(item)?;
            self.transfers.remove(&item);
        }
        Ok(())
    }

    /// Advances every flight timer and returns the items whose flight is over.
    pub fn advance(&mut self, delta: Duration) -> Vec<ItemId> {
        self.timers.advance(delta)
    }
}
