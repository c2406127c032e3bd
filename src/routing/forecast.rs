use std::collections::BTreeMap;

use crate::types::{BinId, Color, RequestId};

/// Items not yet admitted (still at the source or waiting in the buffer), counted per color.
/// Iteration follows `Color` declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DemandForecast {
    counts: BTreeMap<Color, u32>,
}

impl DemandForecast {
    pub fn new() -> Self {
        Self::default()
    }

    /// The forecast used when no answer arrives in time.
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn with(mut self, color: Color, count: u32) -> Self {
        self.set(color, count);
        self
    }

    pub fn set(&mut self, color: Color, count: u32) {
        if count == 0 {
            self.counts.remove(&color);
        } else {
            self.counts.insert(color, count);
        }
    }

    pub fn demand(&self, color: Color) -> u32 {
        self.counts.get(&color).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.values().map(|&c| c as u64).sum()
    }

    /// Colors with non-zero demand, in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (Color, u32)> + '_ {
        self.counts.iter().map(|(color, count)| (*color, *count))
    }
}

impl FromIterator<(Color, u32)> for DemandForecast {
    fn from_iter<I: IntoIterator<Item = (Color, u32)>>(iter: I) -> Self {
        let mut forecast = Self::new();
        for (color, count) in iter {
            let merged = forecast.demand(color) + count;
            forecast.set(color, merged);
        }
        forecast
    }
}

/// A demand query waiting for its answer, remembered against the retirement that asked for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingForecast {
    pub request: RequestId,
    pub retired_bin: BinId,
    pub retired_color: Color,
}

/// Hands out correlation ids and remembers which retirement each outstanding query belongs to.
#[derive(Debug, Default)]
pub struct ForecastRequests {
    next_request: RequestId,
    pending: BTreeMap<RequestId, PendingForecast>,
}

impl ForecastRequests {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&mut self, retired_bin: BinId, retired_color: Color) -> RequestId {
        let request = self.next_request;
        self.next_request += 1;
        self.pending.insert(
            request,
            PendingForecast {
                request,
                retired_bin,
                retired_color,
            },
        );
        request
    }

    /// Resolves a query. Unknown or already resolved ids yield `None`.
    pub fn resolve(&mut self, request: RequestId) -> Option<PendingForecast> {
        self.pending.remove(&request)
    }

    pub fn is_pending(&self, request: RequestId) -> bool {
        self.pending.contains_key(&request)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
