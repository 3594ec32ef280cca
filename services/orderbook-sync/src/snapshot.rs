//! Consumer snapshots of the order book
//!
//! A `BookSnapshot` is an owned copy taken under the store lock. Readers get
//! a consistent view of both sides and can hold it as long as they like
//! without blocking ingestion.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use types::symbol::Symbol;

use crate::order_book::{mid_of, BookLevel, OrderBook};

/// A checksummed copy of the book at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookSnapshot {
    /// Trading pair the book belongs to.
    pub symbol: Symbol,
    /// Bid levels in descending price order (best first).
    pub bids: Vec<BookLevel>,
    /// Ask levels in ascending price order (best first).
    pub asks: Vec<BookLevel>,
    /// Time of the last change applied before the copy was taken.
    pub last_update: Option<DateTime<Utc>>,
    /// Number of changes applied to the book since startup.
    pub update_count: u64,
    /// SHA-256 over the levels and update count.
    pub checksum: String,
}

impl BookSnapshot {
    /// Copy the book's current state.
    pub fn capture(book: &OrderBook) -> Self {
        let bids = book.bids().levels().to_vec();
        let asks = book.asks().levels().to_vec();
        let update_count = book.update_count();
        let checksum = compute_checksum(&bids, &asks, update_count);

        Self {
            symbol: book.symbol().clone(),
            bids,
            asks,
            last_update: book.last_update(),
            update_count,
            checksum,
        }
    }

    pub fn best_bid(&self) -> Option<&BookLevel> {
        self.bids.first()
    }

    pub fn best_ask(&self) -> Option<&BookLevel> {
        self.asks.first()
    }

    pub fn mid_price(&self) -> Option<Decimal> {
        mid_of(self.best_bid()?.price(), self.best_ask()?.price())
    }

    /// Best ask minus best bid.
    pub fn spread(&self) -> Option<Decimal> {
        self.best_ask()?.price().checked_sub(self.best_bid()?.price())
    }

    /// True when neither side has any level.
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }
}

/// Compute a SHA-256 checksum over the book levels and update count.
///
/// Levels are hashed by numeric value, so `"100.0"` and `"100.00"` hash
/// identically.
pub fn compute_checksum(bids: &[BookLevel], asks: &[BookLevel], update_count: u64) -> String {
    let mut hasher = Sha256::new();

    for levels in [bids, asks] {
        for level in levels {
            hasher.update(level.price().normalize().to_string().as_bytes());
            hasher.update(b":");
            hasher.update(level.quantity().normalize().to_string().as_bytes());
            hasher.update(b"|");
        }
        hasher.update(b"---");
    }

    hasher.update(update_count.to_le_bytes());

    format!("{:x}", hasher.finalize())
}

/// Verify that a snapshot's checksum matches its content.
pub fn verify_snapshot_integrity(snapshot: &BookSnapshot) -> bool {
    let expected = compute_checksum(&snapshot.bids, &snapshot.asks, snapshot.update_count);
    snapshot.checksum == expected
}
