use std::collections::BTreeSet;
use std::time::Duration;

use tracing::{debug, error, info, trace, warn};

use crate::config::RouterConfig;
use crate::error::{Error, Result};
use crate::routing::admission::{self, Admission};
use crate::routing::bin::{Bin, BinLifecycle};
use crate::routing::buffer::BufferEdge;
use crate::routing::event::RouterEvent;
use crate::routing::forecast::{DemandForecast, ForecastRequests, PendingForecast};
use crate::routing::item::{ItemState, Owner, OwnershipRegistry};
use crate::routing::ledger::Ledger;
use crate::routing::planner::{self, PlanDecision};
use crate::routing::progress::{ProgressAccountant, ProgressUpdate};
use crate::routing::snapshot::{self, LevelSnapshot};
use crate::routing::timer::{Countdown, TimerSet};
use crate::routing::transfer::TransferMachine;
use crate::types::{BinId, Color, ItemId, RequestId};

/**
 * Single entry point for the routing core. The host feeds it released items, animation results,
 * demand forecasts and frame ticks; everything it decides comes back as [`RouterEvent`]s from
 * [`Router::drain_events`].
 *
 * All state lives in one owned value and every call runs to completion before returning, so the
 * only hazard is ordering. Two rules keep that safe:
 * - a bin slot reserved for an item stays reserved until that item lands or fails, and nothing
 *   else can target it in between;
 * - a bin whose drain timer fires while a reservation is still open does not retire until the
 *   last reservation resolves.
 */
#[derive(Debug)]
pub struct Router {
    config: RouterConfig,
    ledger: Ledger,
    registry: OwnershipRegistry,
    transfers: TransferMachine,
    progress: ProgressAccountant,
    drain_timers: TimerSet<BinId>,
    // drain expired, waiting on open reservations
    deferred_retirements: BTreeSet<BinId>,
    forecasts: ForecastRequests,
    forecast_timeouts: TimerSet<RequestId>,
    buffer_countdown: Option<Countdown>,
    events: Vec<RouterEvent>,
}

impl Router {
    /// Creates a router for an empty level. Bins are added with [`Router::spawn_bin`].
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is unusable.
    pub fn new(config: RouterConfig) -> Result<Self> {
        config.validate()?;
        let ledger = Ledger::new(config.buffer_slots);
        Ok(Self::assemble(
            config,
            ledger,
            OwnershipRegistry::new(),
            ProgressAccountant::new(),
        ))
    }

    /// Rebuilds a router from a saved level. Malformed records are repaired, in-flight transfers
    /// are dropped, draining bins resume their countdown, full bins start draining and buffered
    /// items are routed to any bin with room.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is unusable.
    pub fn restore(config: RouterConfig, saved: LevelSnapshot) -> Result<Self> {
        config.validate()?;
        let level = snapshot::restore(saved, config.buffer_slots);
        let mut router = Self::assemble(config, level.ledger, level.registry, level.progress);

        if router.ledger.buffer().is_full() {
            router.buffer_countdown = Some(Countdown::new(router.config.buffer_full_countdown()));
        }
        for (bin, left) in level.draining {
            router.drain_timers.start(bin, left);
        }
        for bin in level.full_bins {
            router.drain_if_full(bin)?;
        }
        let open: Vec<BinId> = router.ledger.active_bins().map(Bin::id).collect();
        for bin in open {
            router.admit_buffered_into(bin)?;
        }
        router.sync_buffer();

        info!(
            bins = router.ledger.bins().count(),
            buffered = router.ledger.buffer().occupancy(),
            "Level restored"
        );
        Ok(router)
    }

    fn assemble(
        config: RouterConfig,
        ledger: Ledger,
        registry: OwnershipRegistry,
        progress: ProgressAccountant,
    ) -> Self {
        let transfers = TransferMachine::new(config.transfer_duration());
        Self {
            config,
            ledger,
            registry,
            transfers,
            progress,
            drain_timers: TimerSet::new(),
            deferred_retirements: BTreeSet::new(),
            forecasts: ForecastRequests::new(),
            forecast_timeouts: TimerSet::new(),
            buffer_countdown: None,
            events: Vec::new(),
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn registry(&self) -> &OwnershipRegistry {
        &self.registry
    }

    pub fn transfers(&self) -> &TransferMachine {
        &self.transfers
    }

    pub fn progress(&self) -> &ProgressAccountant {
        &self.progress
    }

    /// Number of demand queries still waiting for an answer.
    pub fn pending_forecasts(&self) -> usize {
        self.forecasts.len()
    }

    /// Returns `true` if `bin` finished draining but still waits on a reservation.
    pub fn is_retirement_deferred(&self, bin: BinId) -> bool {
        self.deferred_retirements.contains(&bin)
    }

    /// Hands over every event produced since the last call.
    pub fn drain_events(&mut self) -> Vec<RouterEvent> {
        std::mem::take(&mut self.events)
    }

    /// Captures the resting state of the level.
    pub fn snapshot(&self) -> LevelSnapshot {
        snapshot::capture(
            &self.ledger,
            &self.registry,
            &self.progress,
            &self.drain_timers,
        )
    }

    /// Adds a bin at level start. Buffered items of its color are routed to it right away.
    pub fn spawn_bin(&mut self, color: Color, capacity: usize) -> BinId {
        let bin = self.ledger.create_bin(color, capacity);
        self.push_created(bin);
        if let Err(err) = self.admit_buffered_into(bin) {
            self.report("spawn_bin", err);
        }
        self.sync_buffer();
        bin
    }

    /// Sets the number of items the level holds in total. Values below the current total are
    /// ignored.
    pub fn set_total_items(&mut self, total: u64) {
        let update = self.progress.set_total(total);
        self.push_progress(update);
    }

    /// Raises the total as more items become known.
    pub fn add_total_items(&mut self, more: u64) {
        let update = self.progress.add_total(more);
        self.push_progress(update);
    }

    /// An item was freed at the source. It is routed to a bin slot if one of its color is open,
    /// otherwise to the buffer, otherwise rejected; the answer is a `ReservationResult` event.
    pub fn item_released(&mut self, item: ItemId, color: Color) {
        let granted = match self.admit_released(item, color) {
            Ok(admission) => admission.is_granted(),
            Err(err) => {
                self.report("item_released", err);
                false
            }
        };
        self.events.push(RouterEvent::ReservationResult { item, granted });
        self.sync_buffer();
    }

    fn admit_released(&mut self, item: ItemId, color: Color) -> Result<Admission> {
        self.registry.register(item, color)?;

        let admission = admission::admit(&mut self.ledger, item, color)?;
        match admission {
            Admission::Bin { bin, slot } => self.begin_transfer(item, Owner::Source, bin, slot)?,
            Admission::Buffer { slot } => {
                self.registry
                    .transition(item, ItemState::Buffered, Owner::Buffer(slot))?;
            }
            Admission::Rejected => debug!(item, %color, "No bin or buffer slot for item"),
        }
        Ok(admission)
    }

    /// The animation driver reports that `item` arrived.
    pub fn transfer_completed(&mut self, item: ItemId) {
        if self.registry.state(item) == Some(ItemState::Placed) {
            // already landed by its flight timer
            trace!(item, "Late completion ignored");
            return;
        }
        if let Err(err) = self.land(item) {
            self.report("transfer_completed", err);
        }
        self.sync_buffer();
    }

    /// The animation driver reports that `item` could not be delivered.
    pub fn transfer_failed(&mut self, item: ItemId, reason: &str) {
        debug!(item, reason, "Transfer failure reported");
        if let Err(err) = self.abandon(item) {
            self.report("transfer_failed", err);
        }
        self.sync_buffer();
    }

    /// Answer to a `DemandRequested` event. Answers for unknown or timed out requests are ignored.
    pub fn demand_forecast_received(&mut self, request: RequestId, forecast: DemandForecast) {
        let Some(pending) = self.forecasts.resolve(request) else {
            debug!(request, "Ignoring forecast for unknown request");
            return;
        };
        self.forecast_timeouts.cancel(request);

        if let Err(err) = self.apply_plan(pending, &forecast) {
            self.report("demand_forecast_received", err);
        }
        self.sync_buffer();
    }

    /// Advances every timer by `delta`. Flights land first so that a drain expiring in the same
    /// tick sees them, then drains, then demand timeouts, then the buffer countdown. Timers
    /// started while handling this tick only begin counting on the next one.
    pub fn tick(&mut self, delta: Duration) {
        let landed = self.transfers.advance(delta);
        let drained = self.drain_timers.advance(delta);
        let timed_out = self.forecast_timeouts.advance(delta);

        for item in landed {
            if let Err(err) = self.land(item) {
                self.report("tick/transfer", err);
            }
        }

        for bin in drained {
            if let Err(err) = self.try_retire(bin) {
                self.report("tick/drain", err);
            }
        }

        for request in timed_out {
            if let Some(pending) = self.forecasts.resolve(request) {
                warn!(
                    request,
                    bin = pending.retired_bin,
                    "Demand query timed out, planning with zero demand"
                );
                if let Err(err) = self.apply_plan(pending, &DemandForecast::zero()) {
                    self.report("tick/demand_timeout", err);
                }
            }
        }

        // a landing in this tick may already have freed the buffer
        self.sync_buffer();
        if let Some(countdown) = self.buffer_countdown.as_mut() {
            if countdown.advance(delta) {
                warn!("Buffer stayed full for the whole countdown");
                self.events.push(RouterEvent::BufferCountdownElapsed);
            }
        }
    }

    /// Records an already granted reservation and puts the item in flight. If the item cannot
    /// be moved, the slot is handed back so it does not leak.
    fn begin_transfer(&mut self, item: ItemId, origin: Owner, bin: BinId, slot: usize) -> Result<()> {
        if let Err(err) = self
            .transfers
            .reserve(&mut self.registry, item, origin, bin, slot)
        {
            self.ledger.release(bin, slot)?;
            return Err(err);
        }

        let transfer = self.transfers.start(&mut self.registry, item)?;
        self.events.push(RouterEvent::TransferStarted {
            item,
            from: transfer.from_endpoint(),
            to: transfer.to_endpoint(),
        });
        self.drain_if_full(bin)
    }

    /// Routes waiting buffered items into `bin` while it has room.
    fn admit_buffered_into(&mut self, bin: BinId) -> Result<()> {
        let reservations = admission::admit_buffered(&mut self.ledger, &self.registry, bin)?;
        for reservation in reservations {
            self.begin_transfer(
                reservation.item,
                Owner::Buffer(reservation.buffer_slot),
                reservation.bin,
                reservation.slot,
            )?;
        }
        Ok(())
    }

    /// Starts the drain countdown once the last empty slot of `bin` is claimed.
    fn drain_if_full(&mut self, bin: BinId) -> Result<()> {
        let full = self
            .ledger
            .bin(bin)
            .is_some_and(|b| b.lifecycle() == BinLifecycle::Full);
        if full {
            self.ledger.begin_drain(bin)?;
            self.drain_timers.start(bin, self.config.drain_duration());
        }
        Ok(())
    }

    fn land(&mut self, item: ItemId) -> Result<()> {
        let transfer = self
            .transfers
            .complete(&mut self.ledger, &mut self.registry, item)?;
        self.resume_retirement(transfer.bin)
    }

    fn abandon(&mut self, item: ItemId) -> Result<()> {
        let failed = self
            .transfers
            .fail(&mut self.ledger, &mut self.registry, item)?;

        let reopened = self.ledger.bin(failed.bin).is_some_and(Bin::is_accepting);
        if reopened {
            self.admit_buffered_into(failed.bin)?;
        }
        self.resume_retirement(failed.bin)
    }

    /// Retires `bin` now if nothing is reserved in it, otherwise defers until that resolves.
    fn try_retire(&mut self, bin: BinId) -> Result<()> {
        let blocked = self
            .ledger
            .bin(bin)
            .ok_or(Error::UnknownBin(bin))?
            .has_open_reservations();
        if blocked {
            debug!(bin, "Drain finished with open reservations, deferring retirement");
            self.deferred_retirements.insert(bin);
            return Ok(());
        }
        self.retire_now(bin)
    }

    /// Called whenever a reservation on `bin` resolves.
    fn resume_retirement(&mut self, bin: BinId) -> Result<()> {
        if !self.deferred_retirements.contains(&bin) {
            return Ok(());
        }
        let clear = self
            .ledger
            .bin(bin)
            .is_some_and(|b| !b.has_open_reservations());
        if clear {
            self.deferred_retirements.remove(&bin);
            self.retire_now(bin)?;
        }
        Ok(())
    }

    /// Commits everything in `bin`, reports progress and asks for a demand forecast so the
    /// planner can decide on a replacement.
    fn retire_now(&mut self, bin: BinId) -> Result<()> {
        let color = self.ledger.bin(bin).ok_or(Error::UnknownBin(bin))?.color();
        let items = self.ledger.retire(bin)?;
        self.transfers.commit(&mut self.registry, &items)?;
        for &item in &items {
            self.registry.dispose(item)?;
        }

        let update = self.progress.record_retirement(items.len());
        self.events.push(RouterEvent::BinRetired {
            bin,
            color,
            committed: items,
        });
        self.push_progress(update);

        let request = self.forecasts.open(bin, color);
        self.forecast_timeouts
            .start(request, self.config.demand_timeout());
        self.events.push(RouterEvent::DemandRequested { request });
        Ok(())
    }

    fn apply_plan(&mut self, pending: PendingForecast, forecast: &DemandForecast) -> Result<()> {
        let others = self.ledger.capacity_view(Some(pending.retired_bin));
        match planner::plan(pending.retired_color, forecast, &others) {
            PlanDecision::Replace { color, capacity, .. } => {
                let replacement = self.ledger.replace(pending.retired_bin, color, capacity)?;
                let capacity = self
                    .ledger
                    .bin(replacement)
                    .map_or(capacity, Bin::capacity);
                info!(
                    retired = pending.retired_bin,
                    replacement,
                    old_color = %pending.retired_color,
                    new_color = %color,
                    capacity,
                    "Bin replaced"
                );
                self.events.push(RouterEvent::BinReplaced {
                    retired: pending.retired_bin,
                    replacement,
                    old_color: pending.retired_color,
                    new_color: color,
                    capacity,
                });
                self.admit_buffered_into(replacement)
            }
            PlanDecision::RetireOnly => {
                debug!(bin = pending.retired_bin, "Bin retired without replacement");
                self.ledger.discard(pending.retired_bin)
            }
        }
    }

    /// Turns buffer fullness changes into edge events, arms or cancels the countdown, and keeps
    /// the progress cap in step with buffer occupancy.
    fn sync_buffer(&mut self) {
        match self.ledger.buffer_edge() {
            Some(BufferEdge::BecameFull) => {
                debug!("Buffer full");
                self.events.push(RouterEvent::BufferFull);
                self.buffer_countdown = Some(Countdown::new(self.config.buffer_full_countdown()));
            }
            Some(BufferEdge::BecameAvailable) => {
                debug!("Buffer has space again");
                self.events.push(RouterEvent::BufferAvailable);
                self.buffer_countdown = None;
            }
            None => {}
        }

        let occupied = !self.ledger.buffer().is_empty();
        let update = self.progress.set_buffer_occupied(occupied);
        self.push_progress(update);

        #[cfg(debug_assertions)]
        self.ledger.sanity_check();
    }

    fn push_created(&mut self, bin: BinId) {
        if let Some(created) = self.ledger.bin(bin) {
            self.events.push(RouterEvent::BinCreated {
                bin,
                color: created.color(),
                capacity: created.capacity(),
            });
        }
    }

    fn push_progress(&mut self, update: ProgressUpdate) {
        if let Some(report) = update.changed {
            self.events.push(RouterEvent::ProgressChanged {
                committed: report.committed,
                total: report.total,
                percent: report.percent,
            });
        }
        if update.completed {
            info!("Level complete");
            self.events.push(RouterEvent::CompletionReached);
        }
    }

    /// Reports a dropped request. Reservation conflicts mean the bookkeeping upstream is broken
    /// and go to the consistency log; everything else was already recovered locally.
    fn report(&self, context: &'static str, err: Error) {
        match err {
            Error::ReservationConflict { bin, slot, holder } => {
                error!(target: "consistency", bin, slot, holder, context, "Reservation conflict, request dropped");
            }
            other => warn!(context, error = %other, "Routing request dropped"),
        }
    }
}
