//! Error types for the sorting library.

use thiserror::Error;

use crate::routing::ItemState;
use crate::types::{BinId, ItemId};

/// A specialized `Result` type for routing operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the ledger, the ownership registry and the transfer machine.
#[derive(Debug, Error)]
pub enum Error {
    /// A reservation targeted a slot that is already reserved or filled. This always means some
    /// upstream bookkeeping is broken.
    #[error("slot {slot} of bin {bin} is already held by item {holder}")]
    ReservationConflict {
        bin: BinId,
        slot: usize,
        holder: ItemId,
    },

    #[error("unknown bin {0}")]
    UnknownBin(BinId),

    #[error("unknown item {0}")]
    UnknownItem(ItemId),

    #[error("slot {slot} is out of range for bin {bin} with capacity {capacity}")]
    SlotOutOfRange {
        bin: BinId,
        slot: usize,
        capacity: usize,
    },

    #[error("slot {slot} of bin {bin} is not reserved")]
    SlotNotReserved { bin: BinId, slot: usize },

    /// `fill` was called with an item that does not own the reservation.
    #[error("slot {slot} of bin {bin} is reserved for item {expected}, not {found}")]
    FillMismatch {
        bin: BinId,
        slot: usize,
        expected: ItemId,
        found: ItemId,
    },

    #[error("bin {0} is not accepting items")]
    BinNotActive(BinId),

    /// Retirement was attempted while some slot of the bin is still reserved.
    #[error("bin {0} still has unresolved reservations")]
    RetirementBlocked(BinId),

    #[error("bin {0} has not been retired")]
    BinNotRetired(BinId),

    #[error("item {item} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        item: ItemId,
        from: ItemState,
        to: ItemState,
    },

    #[error("item {0} has no transfer in progress")]
    UnknownTransfer(ItemId),

    #[error("buffer slot {0} does not exist")]
    UnknownBufferSlot(usize),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
