//! In-memory order book state
//!
//! Mirrors the venue's top-of-book for a single symbol.
//! All arithmetic uses `Decimal`; prices are matched within `PRICE_EPSILON`
//! so a level published as `"100.0"` and later as `"100.00"` is one level.
//!
//! The book processes:
//! - `Delta` → insert, overwrite or remove individual levels
//! - `Snapshot` → replace a whole side
//! - `BestUpdate` → upsert the best level, dropping levels it supersedes
//!
//! Each side is kept sorted best-first, free of duplicate prices and zero
//! quantities, and bounded to `MAX_LEVELS`.

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;
use types::numeric::DecimalText;
use types::side::Side;
use types::symbol::Symbol;

use crate::events::{BookEvent, LevelUpdate};
use crate::snapshot::BookSnapshot;

/// Maximum number of visible levels per side.
pub const MAX_LEVELS: usize = 20;

/// Tolerance for treating two prices as the same level (1e-9).
pub const PRICE_EPSILON: Decimal = Decimal::from_parts(1, 0, 0, false, 9);

/// Whether two prices identify the same level.
pub fn prices_match(a: Decimal, b: Decimal) -> bool {
    a.checked_sub(b)
        .is_some_and(|diff| diff.abs() <= PRICE_EPSILON)
}

/// Average of two prices, or `None` if their sum overflows.
pub fn mid_of(bid: Decimal, ask: Decimal) -> Option<Decimal> {
    bid.checked_add(ask).map(|sum| sum / Decimal::TWO)
}

/// A single price level in the order book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookLevel {
    /// The price of this level, with its wire text.
    pub price: DecimalText,
    /// Total quantity resting at this level.
    pub quantity: DecimalText,
    /// Number of orders resting at this level, when published.
    pub order_count: Option<u32>,
}

impl BookLevel {
    pub fn new(price: DecimalText, quantity: DecimalText, order_count: Option<u32>) -> Self {
        Self {
            price,
            quantity,
            order_count,
        }
    }

    fn from_update(update: &LevelUpdate) -> Self {
        Self::new(
            update.price.clone(),
            update.quantity.clone(),
            update.order_count,
        )
    }

    pub fn price(&self) -> Decimal {
        self.price.value()
    }

    pub fn quantity(&self) -> Decimal {
        self.quantity.value()
    }
}

/// One side of the book, sorted best-first and bounded in length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookSide {
    side: Side,
    levels: Vec<BookLevel>,
    capacity: usize,
}

impl BookSide {
    pub fn new(side: Side, capacity: usize) -> Self {
        Self {
            side,
            levels: Vec::with_capacity(capacity + 1),
            capacity,
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    /// Levels in display order (best first).
    pub fn levels(&self) -> &[BookLevel] {
        &self.levels
    }

    pub fn best(&self) -> Option<&BookLevel> {
        self.levels.first()
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn clear(&mut self) {
        self.levels.clear();
    }

    /// Apply one point-wise change. Returns whether the side changed.
    ///
    /// Zero quantity removes the level; a removal for an absent price is a
    /// no-op.
    pub fn apply_delta(&mut self, update: &LevelUpdate) -> bool {
        let removal = update.quantity.value() <= Decimal::ZERO;

        match self.find(update.price.value()) {
            Some(idx) if removal => {
                self.levels.remove(idx);
                true
            }
            Some(idx) => {
                let level = &mut self.levels[idx];
                level.quantity = update.quantity.clone();
                if update.order_count.is_some() {
                    level.order_count = update.order_count;
                }
                true
            }
            None if removal => false,
            None => self.insert_sorted(BookLevel::from_update(update)),
        }
    }

    /// Replace every level on this side.
    ///
    /// Non-positive quantities are dropped; for duplicate prices the later
    /// entry wins.
    pub fn replace(&mut self, updates: &[LevelUpdate]) {
        self.levels.clear();

        for update in updates {
            if update.quantity.value() <= Decimal::ZERO {
                continue;
            }
            match self.find(update.price.value()) {
                Some(idx) => self.levels[idx] = BookLevel::from_update(update),
                None => self.levels.push(BookLevel::from_update(update)),
            }
        }

        let side = self.side;
        self.levels
            .sort_by(|a, b| side.display_order(a.price(), b.price()));
        self.levels.truncate(self.capacity);
    }

    /// Upsert the level advertised as the current best.
    ///
    /// Levels ranking ahead of it can no longer be resting and are dropped,
    /// so the advertised level always ends up at the front.
    pub fn upsert_best(&mut self, update: &LevelUpdate) -> bool {
        if update.quantity.value() <= Decimal::ZERO {
            return self.apply_delta(update);
        }

        let price = update.price.value();
        let side = self.side;
        let stale = self
            .levels
            .iter()
            .take_while(|l| side.ranks_ahead(l.price(), price) && !prices_match(l.price(), price))
            .count();
        if stale > 0 {
            debug!(side = %side, stale, "Dropping levels superseded by best update");
            self.levels.drain(..stale);
        }

        match self.levels.first_mut() {
            Some(front) if prices_match(front.price(), price) => {
                front.quantity = update.quantity.clone();
                if update.order_count.is_some() {
                    front.order_count = update.order_count;
                }
            }
            _ => {
                self.levels.insert(0, BookLevel::from_update(update));
                self.levels.truncate(self.capacity);
            }
        }

        true
    }

    fn find(&self, price: Decimal) -> Option<usize> {
        self.levels.iter().position(|l| prices_match(l.price(), price))
    }

    /// Insert keeping display order; anything pushed past capacity is evicted.
    fn insert_sorted(&mut self, level: BookLevel) -> bool {
        let price = level.price();
        let side = self.side;
        let at = self
            .levels
            .partition_point(|l| side.ranks_ahead(l.price(), price));

        if at >= self.capacity {
            return false;
        }

        self.levels.insert(at, level);
        self.levels.truncate(self.capacity);
        true
    }
}

/// In-memory order book mirror for a single symbol.
///
/// Bids stored in descending price order (best bid first).
/// Asks stored in ascending price order (best ask first).
#[derive(Debug, Clone)]
pub struct OrderBook {
    symbol: Symbol,
    bids: BookSide,
    asks: BookSide,
    /// Time of the last change applied.
    last_update: Option<DateTime<Utc>>,
    /// Number of changes applied since creation; never reset.
    update_count: u64,
}

impl OrderBook {
    /// Create an empty order book for the given symbol.
    pub fn new(symbol: Symbol) -> Self {
        Self::with_capacity(symbol, MAX_LEVELS)
    }

    fn with_capacity(symbol: Symbol, capacity: usize) -> Self {
        Self {
            symbol,
            bids: BookSide::new(Side::Bid, capacity),
            asks: BookSide::new(Side::Ask, capacity),
            last_update: None,
            update_count: 0,
        }
    }

    /// Apply a normalized event. Returns whether the book changed.
    pub fn apply(&mut self, event: &BookEvent, now: DateTime<Utc>) -> bool {
        let changed = match event {
            BookEvent::Delta { updates } => {
                let mut changed = false;
                for update in updates {
                    changed |= self.side_mut(update.side).apply_delta(update);
                }
                changed
            }
            BookEvent::Snapshot { bids, asks } => {
                if let Some(levels) = bids {
                    self.bids.replace(levels);
                }
                if let Some(levels) = asks {
                    self.asks.replace(levels);
                }
                bids.is_some() || asks.is_some()
            }
            BookEvent::BestUpdate { bid, ask } => {
                let mut changed = false;
                if let Some(level) = bid {
                    changed |= self.bids.upsert_best(level);
                }
                if let Some(level) = ask {
                    changed |= self.asks.upsert_best(level);
                }
                changed
            }
            BookEvent::Ignore => false,
        };

        if changed {
            self.last_update = Some(now);
            self.update_count += 1;
        }
        changed
    }

    /// Drop every level on both sides.
    pub fn clear(&mut self) {
        self.bids.clear();
        self.asks.clear();
        self.last_update = None;
    }

    /// Switch to a new symbol with an empty book.
    pub fn reset(&mut self, symbol: Symbol) {
        self.symbol = symbol;
        self.clear();
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn bids(&self) -> &BookSide {
        &self.bids
    }

    pub fn asks(&self) -> &BookSide {
        &self.asks
    }

    pub fn side(&self, side: Side) -> &BookSide {
        match side {
            Side::Bid => &self.bids,
            Side::Ask => &self.asks,
        }
    }

    fn side_mut(&mut self, side: Side) -> &mut BookSide {
        match side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        }
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.last_update
    }

    pub fn update_count(&self) -> u64 {
        self.update_count
    }

    /// Get the current best bid price.
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.best().map(BookLevel::price)
    }

    /// Get the current best ask price.
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.best().map(BookLevel::price)
    }

    /// Get the mid-market price (average of best bid and best ask).
    ///
    /// `None` when either side is empty or the sum is not representable.
    pub fn mid_price(&self) -> Option<Decimal> {
        mid_of(self.best_bid()?, self.best_ask()?)
    }

    /// Build an immutable copy of the book.
    pub fn snapshot(&self) -> BookSnapshot {
        BookSnapshot::capture(self)
    }
}

/// Shared owner of the order book.
///
/// Every mutation and read happens inside one short critical section;
/// callers never receive a reference that outlives the lock.
#[derive(Debug)]
pub struct OrderBookStore {
    book: Mutex<OrderBook>,
}

impl OrderBookStore {
    pub fn new(symbol: Symbol) -> Self {
        Self {
            book: Mutex::new(OrderBook::new(symbol)),
        }
    }

    /// Apply an event under exclusive access. Returns whether the book changed.
    pub fn apply_event(&self, event: &BookEvent) -> bool {
        let changed = self.lock().apply(event, Utc::now());
        debug!(
            event_type = event.label(),
            levels = event.level_count(),
            changed,
            "Book event applied"
        );
        changed
    }

    /// Reset both sides to empty.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Switch the book to another symbol, discarding all levels.
    pub fn reset(&self, symbol: Symbol) {
        self.lock().reset(symbol);
    }

    /// Immutable copy of the current book.
    pub fn snapshot(&self) -> BookSnapshot {
        self.lock().snapshot()
    }

    /// Run a read-only closure against the book while holding the lock.
    pub fn read<R>(&self, f: impl FnOnce(&OrderBook) -> R) -> R {
        f(&self.lock())
    }

    pub fn mid_price(&self) -> Option<Decimal> {
        self.lock().mid_price()
    }

    pub fn symbol(&self) -> Symbol {
        self.lock().symbol().clone()
    }

    // A panic while holding the lock cannot leave a half-applied event
    // visible: `OrderBook::apply` only mutates through `BookSide` methods
    // that restore the invariants before returning.
    fn lock(&self) -> MutexGuard<'_, OrderBook> {
        self.book.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
