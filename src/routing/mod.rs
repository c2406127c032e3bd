//! Item routing for the sorting puzzle: bins, the overflow buffer, transfers between them and the
//! planner that replaces retired bins.

pub mod admission;
pub mod bin;
pub mod buffer;
pub mod event;
pub mod forecast;
pub mod item;
pub mod ledger;
pub mod planner;
pub mod progress;
pub mod router;
pub mod snapshot;
pub mod timer;
pub mod transfer;

#[cfg(test)]
mod tests;

// Re-export the main types for easier access
pub use admission::Admission;
pub use bin::{Bin, BinLifecycle, Slot};
pub use buffer::{Buffer, BufferSlot};
pub use event::{Endpoint, RouterEvent};
pub use forecast::DemandForecast;
pub use item::{ItemRecord, ItemState, Owner, OwnershipRegistry};
pub use ledger::{CapacityView, Ledger};
pub use planner::{PlanDecision, ReplacementReason};
pub use progress::{ProgressAccountant, ProgressReport};
pub use router::Router;
pub use snapshot::{BinRecord, BufferRecord, LevelSnapshot, ProgressRecord};
