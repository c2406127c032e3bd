//! Plain records for saving and loading a level. The encoding is left to the caller; these types
//! only derive `serde` traits. Loading never rejects a record: malformed data is repaired.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::routing::bin::{Bin, BinLifecycle, Slot};
use crate::routing::buffer::Buffer;
use crate::routing::item::{ItemState, Owner, OwnershipRegistry};
use crate::routing::ledger::Ledger;
use crate::routing::progress::ProgressAccountant;
use crate::routing::timer::TimerSet;
use crate::types::{BinId, Color, ItemId, clamp_capacity};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinRecord {
    pub id: BinId,
    pub color: Color,
    // signed so that corrupt negative values survive decoding and get repaired
    pub capacity: i64,
    pub slots: Vec<Option<ItemId>>,
    /// Time left on the drain countdown if the bin was draining. Zero means the drain already
    /// ended and retirement was waiting on a transfer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drain_remaining_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferRecord {
    pub id: usize,
    pub occupant: Option<ItemId>,
    /// Color of the occupant. Needed to route the item again after loading.
    #[serde(default)]
    pub color: Option<Color>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub committed: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelSnapshot {
    pub bins: Vec<BinRecord>,
    pub buffer: Vec<BufferRecord>,
    #[serde(default)]
    pub progress: Option<ProgressRecord>,
}

/// Captures the resting state of a level. Reserved slots are written as empty: transfers in
/// flight do not survive a save. Retired bins awaiting their replacement decision are skipped.
/// Draining bins keep whatever is left of their countdown in `drains`.
pub fn capture(
    ledger: &Ledger,
    registry: &OwnershipRegistry,
    progress: &ProgressAccountant,
    drains: &TimerSet<BinId>,
) -> LevelSnapshot {
    let bins = ledger
        .bins()
        .filter(|b| b.lifecycle() != BinLifecycle::Retired)
        .map(|b| BinRecord {
            id: b.id(),
            color: b.color(),
            capacity: b.capacity() as i64,
            slots: b
                .slots()
                .iter()
                .map(|slot| match slot {
                    Slot::Filled(item) => Some(*item),
                    _ => None,
                })
                .collect(),
            drain_remaining_ms: (b.lifecycle() == BinLifecycle::Draining).then(|| {
                drains
                    .remaining(b.id())
                    .map_or(0, |left| left.as_millis() as u64)
            }),
        })
        .collect();

    let buffer = ledger
        .buffer()
        .slots()
        .iter()
        .map(|s| BufferRecord {
            id: s.id,
            occupant: s.occupant,
            color: s.occupant.and_then(|item| registry.get(item)).map(|r| r.color),
        })
        .collect();

    LevelSnapshot {
        bins,
        buffer,
        progress: Some(ProgressRecord {
            committed: progress.committed(),
            total: progress.total(),
        }),
    }
}

/// The pieces of a level rebuilt from a snapshot.
#[derive(Debug)]
pub struct RestoredLevel {
    pub ledger: Ledger,
    pub registry: OwnershipRegistry,
    pub progress: ProgressAccountant,
    /// Bins that came back completely filled and have to start draining.
    pub full_bins: Vec<BinId>,
    /// Bins that were already draining, with the time left on their countdown.
    pub draining: Vec<(BinId, Duration)>,
}

/// Rebuilds ledger, registry and progress from `snapshot`, repairing as it goes: capacities are
/// clamped, slot arrays truncated or padded to capacity, duplicate bin and item ids dropped, and
/// the buffer laid out to exactly `buffer_size` slots.
pub fn restore(snapshot: LevelSnapshot, buffer_size: usize) -> RestoredLevel {
    let mut registry = OwnershipRegistry::new();
    let mut seen_items: BTreeSet<ItemId> = BTreeSet::new();
    let mut seen_bins: BTreeSet<BinId> = BTreeSet::new();
    let mut bins = Vec::new();
    let mut draining = Vec::new();

    for record in snapshot.bins {
        if !seen_bins.insert(record.id) {
            warn!(bin = record.id, "Dropping duplicate bin record");
            continue;
        }

        let capacity = clamp_capacity(record.capacity);
        if capacity as i64 != record.capacity || record.slots.len() != capacity {
            warn!(
                bin = record.id,
                capacity = record.capacity,
                slots = record.slots.len(),
                repaired = capacity,
                "Repairing bin record"
            );
        }

        let mut contents = record.slots;
        contents.resize(capacity, None);
        for entry in contents.iter_mut() {
            if let Some(item) = *entry {
                if !seen_items.insert(item) {
                    warn!(bin = record.id, item, "Dropping duplicate item");
                    *entry = None;
                    continue;
                }
                registry.insert_restored(item, record.color, Owner::Bin(record.id), ItemState::Placed);
            }
        }

        if let Some(left) = record.drain_remaining_ms {
            draining.push((record.id, Duration::from_millis(left)));
        }
        let resumes_drain = record.drain_remaining_ms.is_some();
        bins.push(Bin::restored(record.id, record.color, contents, resumes_drain));
    }

    let mut occupants: Vec<Option<ItemId>> = vec![None; buffer_size];
    let mut overflow = Vec::new();
    for record in snapshot.buffer {
        let Some(item) = record.occupant else {
            continue;
        };
        let Some(color) = record.color else {
            warn!(slot = record.id, item, "Dropping buffered item without a color");
            continue;
        };
        if !seen_items.insert(item) {
            warn!(slot = record.id, item, "Dropping duplicate item");
            continue;
        }

        match occupants.get_mut(record.id) {
            Some(entry) if entry.is_none() => {
                *entry = Some(item);
                registry.insert_restored(item, color, Owner::Buffer(record.id), ItemState::Buffered);
            }
            _ => overflow.push((item, color)),
        }
    }

    // records that pointed outside the buffer or at a taken slot go to the first free slot
    for (item, color) in overflow {
        match occupants.iter().position(Option::is_none) {
            Some(slot) => {
                occupants[slot] = Some(item);
                registry.insert_restored(item, color, Owner::Buffer(slot), ItemState::Buffered);
            }
            None => warn!(item, "No buffer slot left for restored item"),
        }
    }

    let full_bins = bins
        .iter()
        .filter(|b| b.lifecycle() == BinLifecycle::Full)
        .map(Bin::id)
        .collect();
    let buffer = Buffer::restored(occupants);
    let progress = match snapshot.progress {
        Some(record) => ProgressAccountant::restored(record.committed, record.total, !buffer.is_empty()),
        None => ProgressAccountant::restored(0, 0, !buffer.is_empty()),
    };

    RestoredLevel {
        ledger: Ledger::restored(bins, buffer),
        registry,
        progress,
        full_bins,
        draining,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bin_record(id: BinId, capacity: i64, slots: Vec<Option<ItemId>>) -> BinRecord {
        BinRecord {
            id,
            color: Color::Red,
            capacity,
            slots,
            drain_remaining_ms: None,
        }
    }

    #[test]
    fn capacity_and_slot_length_are_repaired() {
        let snapshot = LevelSnapshot {
            bins: vec![
                bin_record(0, -2, vec![]),
                bin_record(1, 9, vec![Some(1), None, Some(2), Some(3), Some(4)]),
                bin_record(2, 2, vec![Some(5)]),
            ],
            ..Default::default()
        };

        let level = restore(snapshot, 2);
        let capacities: Vec<usize> = level.ledger.bins().map(Bin::capacity).collect();
        assert_eq!(capacities, vec![1, 3, 2]);

        // truncation dropped item 4
        assert_eq!(level.ledger.bin(1).unwrap().filled_items(), vec![1, 2]);
        assert!(level.registry.get(4).is_none());
        assert_eq!(level.ledger.bin(2).unwrap().slots()[1], Slot::Empty);
        assert_eq!(level.registry.get(5).unwrap().state, ItemState::Placed);
    }

    #[test]
    fn duplicates_are_dropped() {
        let snapshot = LevelSnapshot {
            bins: vec![
                bin_record(0, 2, vec![Some(1), Some(2)]),
                bin_record(0, 1, vec![Some(3)]),
                bin_record(1, 2, vec![Some(1), None]),
            ],
            buffer: vec![BufferRecord {
                id: 0,
                occupant: Some(2),
                color: Some(Color::Red),
            }],
            progress: None,
        };

        let level = restore(snapshot, 1);
        assert_eq!(level.ledger.bins().count(), 2);
        assert_eq!(level.ledger.bin(1).unwrap().filled_items(), Vec::<ItemId>::new());
        assert!(level.ledger.buffer().is_empty());
        assert_eq!(level.full_bins, vec![0]);
    }

    #[test]
    fn buffer_is_laid_out_to_configured_size() {
        let snapshot = LevelSnapshot {
            buffer: vec![
                BufferRecord {
                    id: 7,
                    occupant: Some(10),
                    color: Some(Color::Blue),
                },
                BufferRecord {
                    id: 0,
                    occupant: Some(11),
                    color: Some(Color::Green),
                },
                BufferRecord {
                    id: 1,
                    occupant: Some(12),
                    color: None,
                },
            ],
            ..Default::default()
        };

        let level = restore(snapshot, 3);
        let buffer = level.ledger.buffer();
        assert_eq!(buffer.size(), 3);
        assert_eq!(buffer.occupant(0), Some(11));
        assert_eq!(buffer.occupant(1), Some(10));
        assert_eq!(buffer.occupant(2), None);
        assert!(level.registry.is_held_by(10, Owner::Buffer(1)));
        assert!(level.registry.get(12).is_none());
    }

    #[test]
    fn capture_writes_reservations_as_empty() {
        let mut ledger = Ledger::new(1);
        let mut registry = OwnershipRegistry::new();
        let bin = ledger.create_bin(Color::Red, 2);
        ledger.reserve(bin, 0, 1).unwrap();
        ledger.reserve(bin, 1, 2).unwrap();
        ledger.fill(bin, 1, 2).unwrap();
        registry.register(3, Color::Blue).unwrap();
        ledger.buffer_admit(3).unwrap();

        let snapshot = capture(&ledger, &registry, &ProgressAccountant::new(), &TimerSet::new());
        assert_eq!(snapshot.bins[0].slots, vec![None, Some(2)]);
        assert_eq!(snapshot.buffer[0].color, Some(Color::Blue));
        assert_eq!(snapshot.progress, Some(ProgressRecord { committed: 0, total: 0 }));
        assert_eq!(snapshot.bins[0].drain_remaining_ms, None);
    }

    #[test]
    fn drain_countdown_survives_a_save() {
        let mut ledger = Ledger::new(1);
        let registry = OwnershipRegistry::new();
        let bin = ledger.create_bin(Color::Red, 2);
        ledger.reserve(bin, 0, 1).unwrap();
        ledger.fill(bin, 0, 1).unwrap();
        ledger.reserve(bin, 1, 2).unwrap();
        ledger.begin_drain(bin).unwrap();
        let mut drains = TimerSet::new();
        drains.start(bin, Duration::from_millis(300));
        drains.advance(Duration::from_millis(120));

        let snapshot = capture(&ledger, &registry, &ProgressAccountant::new(), &drains);
        assert_eq!(snapshot.bins[0].drain_remaining_ms, Some(180));

        // the in-flight item is gone, but the bin must not reopen
        let level = restore(snapshot, 1);
        let restored = level.ledger.bin(bin).unwrap();
        assert_eq!(restored.lifecycle(), BinLifecycle::Draining);
        assert_eq!(restored.free_count(), 1);
        assert!(level.full_bins.is_empty());
        assert_eq!(level.draining, vec![(bin, Duration::from_millis(180))]);
    }

    #[test]
    fn expired_drain_is_saved_as_zero() {
        let mut ledger = Ledger::new(1);
        let bin = ledger.create_bin(Color::Blue, 1);
        ledger.reserve(bin, 0, 1).unwrap();
        ledger.begin_drain(bin).unwrap();

        let snapshot = capture(
            &ledger,
            &OwnershipRegistry::new(),
            &ProgressAccountant::new(),
            &TimerSet::new(),
        );
        assert_eq!(snapshot.bins[0].drain_remaining_ms, Some(0));
    }
}
