use std::collections::BTreeSet;
use std::time::Duration;

use proptest::prelude::*;

use crate::config::RouterConfig;
use crate::routing::bin::Slot;
use crate::routing::event::RouterEvent;
use crate::routing::forecast::DemandForecast;
use crate::routing::item::{ItemState, Owner};
use crate::routing::ledger::CapacityView;
use crate::routing::planner::{PlanDecision, plan};
use crate::routing::router::Router;
use crate::types::{Color, ItemId, RequestId, clamp_capacity};

const PALETTE: [Color; 3] = [Color::Red, Color::Blue, Color::Green];

#[derive(Debug, Clone)]
enum Op {
    Release(usize),
    Complete(usize),
    Fail(usize),
    Tick(u64),
    Answer(usize, u32, u32),
    Spawn(usize, usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0..PALETTE.len()).prop_map(Op::Release),
        2 => any::<usize>().prop_map(Op::Complete),
        1 => any::<usize>().prop_map(Op::Fail),
        3 => (0_u64..300).prop_map(Op::Tick),
        2 => (any::<usize>(), 0_u32..4, 0_u32..4).prop_map(|(i, red, blue)| Op::Answer(i, red, blue)),
        1 => (0..PALETTE.len(), 1_usize..=3).prop_map(|(c, capacity)| Op::Spawn(c, capacity)),
    ]
}

fn config() -> RouterConfig {
    RouterConfig {
        buffer_slots: 3,
        drain_ms: 120,
        transfer_ms: 80,
        demand_timeout_ms: 250,
        buffer_full_countdown_ms: 500,
    }
}

fn in_flight(router: &Router) -> Vec<ItemId> {
    router
        .registry()
        .iter()
        .filter(|(_, r)| r.state == ItemState::InTransit)
        .map(|(item, _)| item)
        .collect()
}

/// Checks every cross-structure invariant that must hold between calls.
fn check(router: &Router) {
    let ledger = router.ledger();
    let registry = router.registry();
    let mut placed = BTreeSet::new();

    for bin in ledger.bins() {
        for (slot, entry) in bin.slots().iter().enumerate() {
            match *entry {
                Slot::Empty => {}
                Slot::Reserved(item) => {
                    let transfer = router.transfers().get(item).expect("reservation without transfer");
                    assert_eq!((transfer.bin, transfer.slot), (bin.id(), slot));
                    let state = registry.state(item);
                    assert!(matches!(
                        state,
                        Some(ItemState::Reserved | ItemState::InTransit)
                    ));
                }
                Slot::Filled(item) => {
                    assert!(registry.is_held_by(item, Owner::Bin(bin.id())));
                    assert_eq!(registry.state(item), Some(ItemState::Placed));
                }
            }
            if let Some(item) = entry.item() {
                assert!(placed.insert(item), "item {item} in two bin slots");
                assert_eq!(registry.get(item).map(|r| r.color), Some(bin.color()));
            }
        }
    }

    for slot in ledger.buffer().slots() {
        let Some(item) = slot.occupant else {
            continue;
        };
        assert!(registry.is_held_by(item, Owner::Buffer(slot.id)));
        // a buffered item in flight also holds a bin reservation, nothing else may
        if registry.state(item) == Some(ItemState::Buffered) {
            assert!(!placed.contains(&item));
        }
    }

    let disposed = registry.count_in(ItemState::Disposed) as u64;
    assert_eq!(router.progress().committed(), disposed);
    assert_eq!(registry.count_in(ItemState::Committed), 0);
    if !ledger.buffer().is_empty() {
        assert!(router.progress().percent() <= 99);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn random_event_sequences_keep_bookkeeping_consistent(
        ops in prop::collection::vec(op(), 1..=200),
    ) {
        let mut router = Router::new(config()).unwrap();
        router.spawn_bin(Color::Red, 2);
        router.spawn_bin(Color::Blue, 3);
        router.set_total_items(40);

        let mut next_item: ItemId = 0;
        let mut pending: Vec<RequestId> = Vec::new();
        let mut buffer_full = false;
        let mut committed = 0_u64;
        let mut completions = 0;

        for op in ops {
            match op {
                Op::Release(color) => {
                    next_item += 1;
                    router.item_released(next_item, PALETTE[color]);
                }
                Op::Complete(pick) => {
                    let flying = in_flight(&router);
                    if !flying.is_empty() {
                        router.transfer_completed(flying[pick % flying.len()]);
                    }
                }
                Op::Fail(pick) => {
                    let flying = in_flight(&router);
                    if !flying.is_empty() {
                        router.transfer_failed(flying[pick % flying.len()], "test");
                    }
                }
                Op::Tick(ms) => router.tick(Duration::from_millis(ms)),
                Op::Answer(pick, red, blue) => {
                    if !pending.is_empty() {
                        let request = pending.remove(pick % pending.len());
                        let forecast = DemandForecast::new().with(Color::Red, red).with(Color::Blue, blue);
                        router.demand_forecast_received(request, forecast);
                    }
                }
                Op::Spawn(color, capacity) => {
                    router.spawn_bin(PALETTE[color], capacity);
                }
            }

            for event in router.drain_events() {
                match event {
                    RouterEvent::DemandRequested { request } => pending.push(request),
                    RouterEvent::BufferFull => {
                        prop_assert!(!buffer_full);
                        buffer_full = true;
                    }
                    RouterEvent::BufferAvailable => {
                        prop_assert!(buffer_full);
                        buffer_full = false;
                    }
                    RouterEvent::BinRetired { committed: items, .. } => {
                        committed += items.len() as u64;
                    }
                    RouterEvent::ProgressChanged { committed: reported, total, percent } => {
                        prop_assert_eq!(reported, committed);
                        prop_assert!(total >= 40);
                        prop_assert!(percent <= 100);
                    }
                    RouterEvent::CompletionReached => completions += 1,
                    _ => {}
                }
            }

            check(&router);
            prop_assert_eq!(buffer_full, router.ledger().buffer().is_full());
        }

        prop_assert!(completions <= 1);
    }
}

fn color() -> impl Strategy<Value = Color> {
    (0..Color::ALL.len()).prop_map(|i| Color::ALL[i])
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn planner_never_serves_zero_demand_and_never_strands_a_color(
        retired in color(),
        demand in prop::collection::vec((color(), 0_u32..6), 0..6),
        bins in prop::collection::vec((color(), 0_usize..=3), 0..5),
    ) {
        let forecast: DemandForecast = demand.into_iter().collect();
        let mut others = CapacityView::default();
        for (color, free) in bins {
            others.add_bin(color, free);
        }
        let stranded = |color: Color| forecast.demand(color) > 0 && others.bin_count(color) == 0;
        let any_stranded = Color::ALL.into_iter().any(&stranded);

        match plan(retired, &forecast, &others) {
            PlanDecision::Replace { color, capacity, .. } => {
                prop_assert!(forecast.demand(color) > 0);
                prop_assert_eq!(capacity, clamp_capacity(i64::from(forecast.demand(color))));
                if any_stranded {
                    prop_assert!(stranded(color));
                }
            }
            PlanDecision::RetireOnly => prop_assert!(!any_stranded),
        }
    }
}
