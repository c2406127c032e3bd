use tracing::debug;

use crate::routing::forecast::DemandForecast;
use crate::routing::ledger::CapacityView;
use crate::types::{Color, clamp_capacity};

/// Which rule produced a replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplacementReason {
    /// Some color is short by more than one slot.
    UnmetDemand,
    /// A color is short by exactly one slot and has no active bin at all.
    NoBinForColor,
    /// Skipping the replacement would leave a color with demand but no bin to go to.
    DeadlockAvoidance,
}

/// Outcome of a planning pass for one retired bin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanDecision {
    Replace {
        color: Color,
        capacity: usize,
        reason: ReplacementReason,
    },
    RetireOnly,
}

/// Shortfall for `color`: demand that the free slots of the other active bins cannot absorb.
fn unmet(forecast: &DemandForecast, others: &CapacityView, color: Color) -> u32 {
    forecast
        .demand(color)
        .saturating_sub(others.available(color) as u32)
}

/// A color is starved when it still has demand but no active bin would be left to take it.
fn is_starved(forecast: &DemandForecast, others: &CapacityView, color: Color) -> bool {
    forecast.demand(color) > 0 && others.bin_count(color) == 0
}

/**
 * Decides whether the bin of `retired_color` that just retired gets a replacement, and with which
 * color and capacity. `others` must describe the active bins *excluding* the retired one.
 *
 * Rules, in order:
 * 1. If the largest shortfall exceeds one slot, replace with that color. Ties go to the color
 *    declared first in `Color`.
 * 2. If the largest shortfall is exactly one, replace only for a color that has no active bin;
 *    a single stray item is not worth churning a bin over otherwise.
 * 3. If any color would be left with demand and no active bin, a replacement for it is forced,
 *    unless the rules above already picked such a color. Among binless colors the highest demand
 *    wins, then `Color` declaration order.
 *
 * The new capacity is the chosen color's demand clamped into the legal range. A color with zero
 * demand is never chosen.
 */
pub fn plan(retired_color: Color, forecast: &DemandForecast, others: &CapacityView) -> PlanDecision {
    let mut largest: Option<(Color, u32)> = None;
    for (color, _) in forecast.iter() {
        let shortfall = unmet(forecast, others, color);
        // strictly greater keeps the earliest color on ties
        if shortfall > 0 && largest.is_none_or(|(_, best)| shortfall > best) {
            largest = Some((color, shortfall));
        }
    }

    let mut choice = match largest {
        Some((color, shortfall)) if shortfall > 1 => Some((color, ReplacementReason::UnmetDemand)),
        Some(_) => forecast
            .iter()
            .map(|(color, _)| color)
            .find(|&color| {
                unmet(forecast, others, color) == 1 && others.bin_count(color) == 0
            })
            .map(|color| (color, ReplacementReason::NoBinForColor)),
        None => None,
    };

    // a binless color with demand can only pile up in the buffer, so it overrides any choice
    // that would leave it binless
    let starved = forecast
        .iter()
        .filter(|&(color, _)| is_starved(forecast, others, color))
        .fold(None, |best: Option<(Color, u32)>, (color, demand)| match best {
            Some((_, top)) if top >= demand => best,
            _ => Some((color, demand)),
        });
    if let Some((color, _)) = starved {
        let keep = choice.is_some_and(|(chosen, _)| is_starved(forecast, others, chosen));
        if !keep {
            choice = Some((color, ReplacementReason::DeadlockAvoidance));
        }
    }

    match choice {
        Some((color, reason)) => {
            let capacity = clamp_capacity(forecast.demand(color) as i64);
            debug!(%retired_color, %color, capacity, ?reason, "Replacement planned");
            PlanDecision::Replace {
                color,
                capacity,
                reason,
            }
        }
        None => {
            debug!(%retired_color, "No replacement needed");
            PlanDecision::RetireOnly
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(bins: &[(Color, usize)]) -> CapacityView {
        let mut view = CapacityView::default();
        for &(color, free) in bins {
            view.add_bin(color, free);
        }
        view
    }

    #[test]
    fn large_shortfall_replaces_with_that_color() {
        let forecast = DemandForecast::new().with(Color::Red, 3).with(Color::Blue, 1);
        let others = view(&[(Color::Red, 1), (Color::Blue, 2)]);

        assert_eq!(
            plan(Color::Red, &forecast, &others),
            PlanDecision::Replace {
                color: Color::Red,
                capacity: 3,
                reason: ReplacementReason::UnmetDemand
            }
        );
    }

    #[test]
    fn ties_go_to_first_declared_color() {
        let forecast = DemandForecast::new().with(Color::Green, 4).with(Color::Blue, 4);
        let others = view(&[(Color::Green, 1), (Color::Blue, 1)]);

        assert!(matches!(
            plan(Color::Green, &forecast, &others),
            PlanDecision::Replace {
                color: Color::Blue,
                ..
            }
        ));
    }

    #[test]
    fn no_demand_means_no_replacement() {
        let forecast = DemandForecast::new().with(Color::Red, 0);
        let others = view(&[(Color::Red, 2)]);
        assert_eq!(plan(Color::Red, &forecast, &others), PlanDecision::RetireOnly);
    }

    #[test]
    fn single_stray_item_does_not_churn_when_color_has_a_bin() {
        // blue is one short, but a (full) blue bin still exists
        let forecast = DemandForecast::new().with(Color::Blue, 1);
        let others = view(&[(Color::Blue, 0), (Color::Red, 2)]);
        assert_eq!(plan(Color::Red, &forecast, &others), PlanDecision::RetireOnly);
    }

    #[test]
    fn single_item_without_any_bin_gets_one() {
        let forecast = DemandForecast::new().with(Color::Yellow, 1);
        let others = view(&[(Color::Red, 2)]);

        assert_eq!(
            plan(Color::Red, &forecast, &others),
            PlanDecision::Replace {
                color: Color::Yellow,
                capacity: 1,
                reason: ReplacementReason::NoBinForColor
            }
        );
    }

    #[test]
    fn retired_color_left_binless_is_forced() {
        // blue is short by two and still has a bin; red would be left with nothing
        let forecast = DemandForecast::new().with(Color::Red, 2).with(Color::Blue, 4);
        let others = view(&[(Color::Blue, 2)]);

        assert_eq!(
            plan(Color::Red, &forecast, &others),
            PlanDecision::Replace {
                color: Color::Red,
                capacity: 2,
                reason: ReplacementReason::DeadlockAvoidance
            }
        );
    }

    #[test]
    fn starved_choice_is_kept_over_retired_color() {
        let forecast = DemandForecast::new().with(Color::Red, 2).with(Color::Green, 5);
        let others = CapacityView::default();

        assert_eq!(
            plan(Color::Red, &forecast, &others),
            PlanDecision::Replace {
                color: Color::Green,
                capacity: 3,
                reason: ReplacementReason::UnmetDemand
            }
        );
    }

    #[test]
    fn binless_color_beats_larger_shortfall_elsewhere() {
        // red is five short but keeps a bin; blue would have nowhere to go at all
        let forecast = DemandForecast::new().with(Color::Red, 5).with(Color::Blue, 1);
        let others = view(&[(Color::Red, 1)]);

        assert_eq!(
            plan(Color::Green, &forecast, &others),
            PlanDecision::Replace {
                color: Color::Blue,
                capacity: 1,
                reason: ReplacementReason::DeadlockAvoidance
            }
        );
    }

    #[test]
    fn binless_colors_rank_by_demand_then_declaration() {
        let forecast = DemandForecast::new()
            .with(Color::Yellow, 2)
            .with(Color::Green, 2)
            .with(Color::Red, 6);
        let others = view(&[(Color::Red, 0)]);

        assert_eq!(
            plan(Color::Red, &forecast, &others),
            PlanDecision::Replace {
                color: Color::Green,
                capacity: 2,
                reason: ReplacementReason::DeadlockAvoidance
            }
        );
    }

    #[test]
    fn covered_demand_does_not_replace() {
        let forecast = DemandForecast::new().with(Color::Red, 2);
        let others = view(&[(Color::Red, 2)]);
        assert_eq!(plan(Color::Red, &forecast, &others), PlanDecision::RetireOnly);
    }
}
