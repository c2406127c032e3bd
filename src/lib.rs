//! Routing core for a color-sorting puzzle. Items freed at a source are matched to bin slots of
//! their color, parked in a small overflow buffer, or rejected; full bins drain, retire and are
//! replaced according to a demand forecast.
//!
//! The crate does no rendering, input handling or timing of its own. The host drives a
//! [`routing::Router`] with calls and frame ticks and reacts to the events it returns.

pub mod config;
pub mod error;
pub mod routing;
pub mod types;

pub use config::RouterConfig;
pub use error::{Error, Result};
pub use routing::{DemandForecast, Router, RouterEvent};
pub use types::{BinId, Color, ItemId, RequestId};
