use tracing::debug;

/// A progress reading as reported to the outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressReport {
    pub committed: u64,
    pub total: u64,
    pub percent: u8,
}

/// What changed after an update. Both flags are edges: each is raised only when the reading
/// differs from the last one reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub changed: Option<ProgressReport>,
    pub completed: bool,
}

/**
 * Derives completion from retirements only. `committed` grows by the number of items each
 * retirement drains and never shrinks; `total` is learned asynchronously and may only grow.
 *
 * The percentage is capped at 99 while anything sits in the buffer, and completion is reported
 * once, on the first reading of 100 (which already implies an empty buffer).
 */
#[derive(Debug, Default)]
pub struct ProgressAccountant {
    committed: u64,
    total: u64,
    buffer_occupied: bool,
    last_reported: Option<ProgressReport>,
    completed: bool,
}

impl ProgressAccountant {
    pub fn new() -> Self {
        Self {
            last_reported: Some(ProgressReport {
                committed: 0,
                total: 0,
                percent: 0,
            }),
            ..Self::default()
        }
    }

    /// Restores counters from a saved level. The restored reading counts as already reported.
    pub fn restored(committed: u64, total: u64, buffer_occupied: bool) -> Self {
        let mut accountant = Self {
            committed,
            total,
            buffer_occupied,
            last_reported: None,
            completed: false,
        };
        let report = accountant.report();
        accountant.completed = report.percent == 100;
        accountant.last_reported = Some(report);
        accountant
    }

    pub fn committed(&self) -> u64 {
        self.committed
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn is_complete(&self) -> bool {
        self.completed
    }

    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }

        let raw = (self.committed.saturating_mul(100) / self.total).min(100) as u8;
        if self.buffer_occupied { raw.min(99) } else { raw }
    }

    pub fn report(&self) -> ProgressReport {
        ProgressReport {
            committed: self.committed,
            total: self.total,
            percent: self.percent(),
        }
    }

    /// Adds the items drained by one retirement.
    pub fn record_retirement(&mut self, items: usize) -> ProgressUpdate {
        self.committed += items as u64;
        self.publish()
    }

    /// Sets the known total. A smaller value than already known is ignored.
    pub fn set_total(&mut self, total: u64) -> ProgressUpdate {
        self.total = self.total.max(total);
        self.publish()
    }

    /// Raises the known total by `more` items.
    pub fn add_total(&mut self, more: u64) -> ProgressUpdate {
        self.total += more;
        self.publish()
    }

    pub fn set_buffer_occupied(&mut self, occupied: bool) -> ProgressUpdate {
        self.buffer_occupied = occupied;
        self.publish()
    }

    fn publish(&mut self) -> ProgressUpdate {
        let report = self.report();
        if self.last_reported == Some(report) {
            return ProgressUpdate::default();
        }
        self.last_reported = Some(report);

        let completed = !self.completed && report.percent == 100 && !self.buffer_occupied;
        if completed {
            self.completed = true;
            debug!(committed = report.committed, total = report.total, "Level complete");
        }

        ProgressUpdate {
            changed: Some(report),
            completed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retirements_move_progress_once_each() {
        let mut progress = ProgressAccountant::new();
        progress.set_total(4);

        let update = progress.record_retirement(2);
        assert_eq!(
            update.changed,
            Some(ProgressReport {
                committed: 2,
                total: 4,
                percent: 50
            })
        );
        assert!(!update.completed);

        // an identical reading is not re-reported
        assert_eq!(progress.set_total(4), ProgressUpdate::default());
    }

    #[test]
    fn occupied_buffer_caps_at_99() {
        let mut progress = ProgressAccountant::new();
        progress.set_total(2);
        progress.set_buffer_occupied(true);

        let update = progress.record_retirement(2);
        assert_eq!(update.changed.map(|r| r.percent), Some(99));
        assert!(!update.completed);

        let update = progress.set_buffer_occupied(false);
        assert_eq!(update.changed.map(|r| r.percent), Some(100));
        assert!(update.completed);
    }

    #[test]
    fn completion_fires_exactly_once() {
        let mut progress = ProgressAccountant::new();
        progress.set_total(1);
        assert!(progress.record_retirement(1).completed);

        progress.set_buffer_occupied(true);
        let update = progress.set_buffer_occupied(false);
        assert_eq!(update.changed.map(|r| r.percent), Some(100));
        assert!(!update.completed);
        assert!(progress.is_complete());
    }

    #[test]
    fn total_only_grows() {
        let mut progress = ProgressAccountant::new();
        progress.set_total(10);
        progress.set_total(3);
        assert_eq!(progress.total(), 10);
        progress.add_total(5);
        assert_eq!(progress.total(), 15);
    }

    #[test]
    fn unknown_total_reads_zero() {
        let mut progress = ProgressAccountant::new();
        let update = progress.record_retirement(3);
        assert_eq!(update.changed.map(|r| r.percent), Some(0));
        assert!(!update.completed);
    }
}
