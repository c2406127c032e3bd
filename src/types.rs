//! Shared primitive types used across the sorting library.

use std::fmt;

use serde::{Deserialize, Serialize};

// Items, bins and demand requests are identified by plain integers.
pub type ItemId = u32;
pub type BinId = u32;
pub type RequestId = u64;

/*
 * Bounds on how many slots a single bin may carry. Replacement bins size themselves from demand
 * and are clamped into this range.
 */
pub const MIN_BIN_CAPACITY: usize = 1;
pub const MAX_BIN_CAPACITY: usize = 3;

/// The closed set of item colors. Declaration order is the stable order used whenever colors
/// need to be ranked against each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Red,
    Blue,
    Green,
    Yellow,
    Purple,
    Orange,
    Pink,
    Cyan,
}

impl Color {
    /// Every color, in declaration order.
    pub const ALL: [Color; 8] = [
        Color::Red,
        Color::Blue,
        Color::Green,
        Color::Yellow,
        Color::Purple,
        Color::Orange,
        Color::Pink,
        Color::Cyan,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Color::Red => "red",
            Color::Blue => "blue",
            Color::Green => "green",
            Color::Yellow => "yellow",
            Color::Purple => "purple",
            Color::Orange => "orange",
            Color::Pink => "pink",
            Color::Cyan => "cyan",
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Clamps a requested bin capacity into `[MIN_BIN_CAPACITY, MAX_BIN_CAPACITY]`.
pub fn clamp_capacity(requested: i64) -> usize {
    requested.clamp(MIN_BIN_CAPACITY as i64, MAX_BIN_CAPACITY as i64) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_is_clamped_into_bounds() {
        assert_eq!(clamp_capacity(-4), 1);
        assert_eq!(clamp_capacity(0), 1);
        assert_eq!(clamp_capacity(2), 2);
        assert_eq!(clamp_capacity(17), 3);
    }

    #[test]
    fn colors_order_by_declaration() {
        let mut shuffled = vec![Color::Cyan, Color::Red, Color::Green];
        shuffled.sort();
        assert_eq!(shuffled, vec![Color::Red, Color::Green, Color::Cyan]);
        assert_eq!(Color::Blue.to_string(), "blue");
    }
}
