//! Normalized book events
//!
//! Both venue protocols decode into `BookEvent`, so the store only knows
//! four kinds of change: point deltas, whole-side snapshots, best-level
//! upserts, and messages that carry no book information at all.

use serde::{Deserialize, Serialize};
use types::numeric::DecimalText;
use types::side::Side;

/// One level as published by the venue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelUpdate {
    /// Which side the level belongs to.
    pub side: Side,
    /// Level price.
    pub price: DecimalText,
    /// New total quantity (0 = remove the level).
    pub quantity: DecimalText,
    /// Number of resting orders, when the protocol publishes it.
    pub order_count: Option<u32>,
}

impl LevelUpdate {
    pub fn new(side: Side, price: DecimalText, quantity: DecimalText) -> Self {
        Self {
            side,
            price,
            quantity,
            order_count: None,
        }
    }

    pub fn with_order_count(mut self, order_count: u32) -> Self {
        self.order_count = Some(order_count);
        self
    }

    /// Whether this update removes the level.
    pub fn is_removal(&self) -> bool {
        self.quantity.is_zero()
    }
}

/// A normalized change to the book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum BookEvent {
    /// Point-wise level changes, applied in order.
    Delta { updates: Vec<LevelUpdate> },

    /// Whole-side replacement. `None` leaves that side untouched.
    Snapshot {
        bids: Option<Vec<LevelUpdate>>,
        asks: Option<Vec<LevelUpdate>>,
    },

    /// Top-of-book ticker: upsert of the best level on each side present.
    BestUpdate {
        bid: Option<LevelUpdate>,
        ask: Option<LevelUpdate>,
    },

    /// No book information (pong, subscription acknowledgement).
    Ignore,
}

impl BookEvent {
    /// Event type label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            BookEvent::Delta { .. } => "Delta",
            BookEvent::Snapshot { .. } => "Snapshot",
            BookEvent::BestUpdate { .. } => "BestUpdate",
            BookEvent::Ignore => "Ignore",
        }
    }

    /// Whether applying this event can change the book.
    pub fn touches_book(&self) -> bool {
        !matches!(self, BookEvent::Ignore)
    }

    /// Number of levels carried by the event.
    pub fn level_count(&self) -> usize {
        match self {
            BookEvent::Delta { updates } => updates.len(),
            BookEvent::Snapshot { bids, asks } => {
                bids.as_ref().map_or(0, Vec::len) + asks.as_ref().map_or(0, Vec::len)
            }
            BookEvent::BestUpdate { bid, ask } => {
                usize::from(bid.is_some()) + usize::from(ask.is_some())
            }
            BookEvent::Ignore => 0,
        }
    }
}
