use crate::types::{BinId, Color, ItemId, RequestId};

/// An abstract place an item can be moved between. The layout layer maps these to positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// Where the item was freed, before any admission.
    Source,
    Buffer(usize),
    BinSlot { bin: BinId, slot: usize },
}

/// Everything the router reports to the outside world. Events queue up in the order they happen
/// and are handed out by `Router::drain_events`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouterEvent {
    /// Answer to an `item_released` call.
    ReservationResult { item: ItemId, granted: bool },
    TransferStarted {
        item: ItemId,
        from: Endpoint,
        to: Endpoint,
    },
    BinCreated {
        bin: BinId,
        color: Color,
        capacity: usize,
    },
    BinRetired {
        bin: BinId,
        color: Color,
        committed: Vec<ItemId>,
    },
    BinReplaced {
        retired: BinId,
        replacement: BinId,
        old_color: Color,
        new_color: Color,
        capacity: usize,
    },
    /// The router needs a demand forecast; answer with `Router::demand_forecast_received`.
    DemandRequested { request: RequestId },
    ProgressChanged {
        committed: u64,
        total: u64,
        percent: u8,
    },
    CompletionReached,
    BufferFull,
    BufferAvailable,
    /// The buffer stayed full for the whole countdown.
    BufferCountdownElapsed,
}
