//! Order book side
//!
//! Bids are kept best-first in descending price order, asks best-first in
//! ascending price order. `Side::ranks_ahead` is the single place that rule
//! is encoded.

use std::cmp::Ordering;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Side of the book a level rests on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Resting buy interest
    Bid,
    /// Resting sell interest
    Ask,
}

impl Side {
    /// Get the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            Side::Bid => Side::Ask,
            Side::Ask => Side::Bid,
        }
    }

    /// Compare two prices in display order for this side.
    ///
    /// `Ordering::Less` means `a` is displayed before `b` (closer to the
    /// top of the book).
    pub fn display_order(&self, a: Decimal, b: Decimal) -> Ordering {
        match self {
            Side::Bid => b.cmp(&a),
            Side::Ask => a.cmp(&b),
        }
    }

    /// Whether price `a` is strictly better than price `b` on this side.
    pub fn ranks_ahead(&self, a: Decimal, b: Decimal) -> bool {
        self.display_order(a, b) == Ordering::Less
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Bid => "bid",
            Side::Ask => "ask",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opposite() {
        assert_eq!(Side::Bid.opposite(), Side::Ask);
        assert_eq!(Side::Ask.opposite(), Side::Bid);
    }

    #[test]
    fn test_bid_prefers_higher_price() {
        assert!(Side::Bid.ranks_ahead(Decimal::from(101), Decimal::from(100)));
        assert!(!Side::Bid.ranks_ahead(Decimal::from(100), Decimal::from(101)));
    }

    #[test]
    fn test_ask_prefers_lower_price() {
        assert!(Side::Ask.ranks_ahead(Decimal::from(100), Decimal::from(101)));
        assert!(!Side::Ask.ranks_ahead(Decimal::from(101), Decimal::from(100)));
    }

    #[test]
    fn test_equal_prices_do_not_rank_ahead() {
        let p = Decimal::from(100);
        assert!(!Side::Bid.ranks_ahead(p, p));
        assert!(!Side::Ask.ranks_ahead(p, p));
    }

    #[test]
    fn test_side_serialization() {
        assert_eq!(serde_json::to_string(&Side::Bid).unwrap(), "\"bid\"");
        let side: Side = serde_json::from_str("\"ask\"").unwrap();
        assert_eq!(side, Side::Ask);
    }
}
