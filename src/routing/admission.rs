use tracing::trace;

use crate::error::Result;
use crate::routing::item::{ItemState, OwnershipRegistry};
use crate::routing::ledger::Ledger;
use crate::types::{BinId, Color, ItemId};

/// Where an item was admitted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// A bin slot was reserved; a transfer has to carry the item there.
    Bin { bin: BinId, slot: usize },
    /// The item now waits in this buffer slot.
    Buffer { slot: usize },
    /// Nothing could take the item. It stays at the source until released again.
    Rejected,
}

impl Admission {
    pub fn is_granted(&self) -> bool {
        !matches!(self, Admission::Rejected)
    }
}

/// A reservation made for an item that was waiting in the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferedReservation {
    pub item: ItemId,
    pub buffer_slot: usize,
    pub bin: BinId,
    pub slot: usize,
}

/// Routes a freshly released item: first an open slot in an active bin of its color, then an
/// empty buffer slot. A reservation conflict is returned as an error and nothing is claimed.
pub fn admit(ledger: &mut Ledger, item: ItemId, color: Color) -> Result<Admission> {
    if let Some((bin, slot)) = ledger.find_open_slot(color) {
        ledger.reserve(bin, slot, item)?;
        trace!(item, bin, slot, "Admitted to bin");
        return Ok(Admission::Bin { bin, slot });
    }

    if let Some(slot) = ledger.buffer_admit(item) {
        trace!(item, slot, "Admitted to buffer");
        return Ok(Admission::Buffer { slot });
    }

    trace!(item, %color, "Admission rejected");
    Ok(Admission::Rejected)
}

/// Reserves slots of `bin` for items waiting in the buffer, in buffer-slot order, until the bin
/// has no empty slot left. Items that already have a transfer under way are skipped.
pub fn admit_buffered(
    ledger: &mut Ledger,
    registry: &OwnershipRegistry,
    bin: BinId,
) -> Result<Vec<BufferedReservation>> {
    let Some(target) = ledger.bin(bin) else {
        return Ok(Vec::new());
    };
    let color = target.color();

    let waiting: Vec<(usize, ItemId)> = ledger
        .buffer()
        .slots()
        .iter()
        .filter_map(|s| s.occupant.map(|item| (s.id, item)))
        .filter(|&(_, item)| {
            registry
                .get(item)
                .is_some_and(|r| r.state == ItemState::Buffered && r.color == color)
        })
        .collect();

    let mut reservations = Vec::new();
    for (buffer_slot, item) in waiting {
        let Some(slot) = ledger
            .bin(bin)
            .filter(|b| b.is_accepting())
            .and_then(|b| b.first_empty_slot())
        else {
            break;
        };

        ledger.reserve(bin, slot, item)?;
        reservations.push(BufferedReservation {
            item,
            buffer_slot,
            bin,
            slot,
        });
    }

    Ok(reservations)
}
