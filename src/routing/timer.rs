//! Tick-driven timers. Nothing here schedules itself; every timer only moves when the owner calls
//! `advance` with the frame delta.

use std::collections::BTreeMap;
use std::time::Duration;

/// A one-shot countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Countdown {
    remaining: Duration,
    fired: bool,
}

impl Countdown {
    pub fn new(duration: Duration) -> Self {
        Self {
            remaining: duration,
            fired: false,
        }
    }

    pub fn remaining(&self) -> Duration {
        self.remaining
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }

    /// Advances by `delta`. Returns `true` exactly once, on the call that reaches zero.
    pub fn advance(&mut self, delta: Duration) -> bool {
        if self.fired {
            return false;
        }

        self.remaining = self.remaining.saturating_sub(delta);
        if self.remaining.is_zero() {
            self.fired = true;
            return true;
        }
        false
    }
}

/// A set of independent countdowns keyed by entity. Fired timers are removed and reported in key
/// order so that processing is deterministic.
#[derive(Debug, Clone)]
pub struct TimerSet<K: Ord + Copy> {
    timers: BTreeMap<K, Countdown>,
}

impl<K: Ord + Copy> Default for TimerSet<K> {
    fn default() -> Self {
        Self {
            timers: BTreeMap::new(),
        }
    }
}

impl<K: Ord + Copy> TimerSet<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a timer for `key`. A timer that is already running keeps its original deadline.
    pub fn start(&mut self, key: K, duration: Duration) {
        self.timers.entry(key).or_insert_with(|| Countdown::new(duration));
    }

    pub fn cancel(&mut self, key: K) -> bool {
        self.timers.remove(&key).is_some()
    }

    pub fn contains(&self, key: K) -> bool {
        self.timers.contains_key(&key)
    }

    pub fn remaining(&self, key: K) -> Option<Duration> {
        self.timers.get(&key).map(Countdown::remaining)
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Advances every timer and returns the keys that fired during this call.
    pub fn advance(&mut self, delta: Duration) -> Vec<K> {
        let fired: Vec<K> = self
            .timers
            .iter_mut()
            .filter_map(|(key, timer)| timer.advance(delta).then_some(*key))
            .collect();
        for key in &fired {
            self.timers.remove(key);
        }
        fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: Duration = Duration::from_millis(1);

    #[test]
    fn countdown_fires_once() {
        let mut countdown = Countdown::new(MS * 10);
        assert!(!countdown.advance(MS * 4));
        assert_eq!(countdown.remaining(), MS * 6);
        assert!(countdown.advance(MS * 20));
        assert!(!countdown.advance(MS * 20));
        assert!(countdown.has_fired());
    }

    #[test]
    fn zero_length_countdown_fires_on_first_tick() {
        let mut countdown = Countdown::new(Duration::ZERO);
        assert!(countdown.advance(Duration::ZERO));
    }

    #[test]
    fn timer_set_reports_in_key_order_and_forgets_fired() {
        let mut timers = TimerSet::new();
        timers.start(3u32, MS * 5);
        timers.start(1u32, MS * 5);
        timers.start(2u32, MS * 50);

        assert_eq!(timers.advance(MS * 5), vec![1, 3]);
        assert_eq!(timers.len(), 1);
        assert!(timers.advance(MS * 5).is_empty());
        assert!(timers.cancel(2));
        assert!(timers.is_empty());
    }

    #[test]
    fn restarting_keeps_original_deadline() {
        let mut timers = TimerSet::new();
        timers.start(7u32, MS * 10);
        timers.advance(MS * 6);
        timers.start(7u32, MS * 10);
        assert_eq!(timers.remaining(7), Some(MS * 4));
    }
}
