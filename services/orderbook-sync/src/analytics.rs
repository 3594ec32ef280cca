//! Order book analytics
//!
//! Spread, liquidity imbalance and depth curves are pure functions of a
//! `BookSnapshot`. The only state lives in `PriceTrend` and
//! `MidPriceHistory`, which the session feeds once per applied update that
//! yields a valid mid price.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::order_book::{mid_of, BookLevel};
use crate::snapshot::BookSnapshot;

/// Samples kept by `PriceTrend` and `MidPriceHistory`.
pub const TREND_CAPACITY: usize = 100;
/// Samples averaged for the short-term trend.
pub const SHORT_WINDOW: usize = 10;
/// Samples averaged for the long-term trend.
pub const LONG_WINDOW: usize = 30;
/// Writes between the two samples compared for momentum.
pub const MOMENTUM_LAG: usize = 10;

/// Top-of-book metrics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBookMetrics {
    pub best_bid: Option<Decimal>,
    pub best_ask: Option<Decimal>,
    /// Best ask minus best bid.
    pub spread: Decimal,
    /// Spread as a percentage of the mid price.
    pub spread_pct: Decimal,
    pub mid_price: Decimal,
    /// Total visible bid quantity.
    pub bid_volume: Decimal,
    /// Total visible ask quantity.
    pub ask_volume: Decimal,
    /// (bid volume - ask volume) / (bid volume + ask volume), in [-1, 1].
    pub liquidity_imbalance: Decimal,
    pub trend: TrendSummary,
    /// Time-weighted mid price over the rolling history.
    pub twap: Option<Decimal>,
}

/// One point of a cumulative depth curve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthPoint {
    pub price: Decimal,
    /// Running quantity from the best level out to this one.
    pub cumulative: Decimal,
    /// This level's quantity relative to the side's largest level (0..=1).
    pub intensity: Decimal,
}

/// Cumulative depth on both sides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthMetrics {
    pub bid_curve: Vec<DepthPoint>,
    pub ask_curve: Vec<DepthPoint>,
    pub cumulative_bid: Decimal,
    pub cumulative_ask: Decimal,
    pub depth_imbalance_ratio: Decimal,
}

/// Short/long averages and momentum of recent mid prices.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendSummary {
    pub short_term_average: Decimal,
    pub long_term_average: Decimal,
    /// (newest - sample ten writes earlier) / newest.
    pub momentum: Decimal,
    /// Mid prices recorded since the last reset.
    pub samples: u64,
}

/// `(a - b) / (a + b)`, or zero when both are zero or the sum overflows.
pub fn imbalance(a: Decimal, b: Decimal) -> Decimal {
    let (Some(total), Some(diff)) = (a.checked_add(b), a.checked_sub(b)) else {
        return Decimal::ZERO;
    };
    diff.checked_div(total).unwrap_or(Decimal::ZERO)
}

/// Compute top-of-book metrics from a snapshot.
///
/// If either side is empty, or the top of book is not representable, every
/// field stays at its zero value. Trend and TWAP are not part of the
/// snapshot and are left empty.
pub fn compute_book_metrics(snapshot: &BookSnapshot) -> OrderBookMetrics {
    let (Some(bid), Some(ask)) = (snapshot.best_bid(), snapshot.best_ask()) else {
        return OrderBookMetrics::default();
    };

    let best_bid = bid.price();
    let best_ask = ask.price();
    let (Some(spread), Some(mid_price)) = (best_ask.checked_sub(best_bid), mid_of(best_bid, best_ask))
    else {
        return OrderBookMetrics::default();
    };
    let spread_pct = spread
        .checked_div(mid_price)
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .unwrap_or(Decimal::ZERO);

    let bid_volume = total_quantity(&snapshot.bids);
    let ask_volume = total_quantity(&snapshot.asks);

    OrderBookMetrics {
        best_bid: Some(best_bid),
        best_ask: Some(best_ask),
        spread,
        spread_pct,
        mid_price,
        bid_volume,
        ask_volume,
        liquidity_imbalance: imbalance(bid_volume, ask_volume),
        trend: TrendSummary::default(),
        twap: None,
    }
}

/// Compute cumulative depth curves from a snapshot.
pub fn compute_depth_metrics(snapshot: &BookSnapshot) -> DepthMetrics {
    let bid_curve = depth_curve(&snapshot.bids);
    let ask_curve = depth_curve(&snapshot.asks);
    let cumulative_bid = bid_curve.last().map_or(Decimal::ZERO, |p| p.cumulative);
    let cumulative_ask = ask_curve.last().map_or(Decimal::ZERO, |p| p.cumulative);

    DepthMetrics {
        bid_curve,
        ask_curve,
        cumulative_bid,
        cumulative_ask,
        depth_imbalance_ratio: imbalance(cumulative_bid, cumulative_ask),
    }
}

/// Sum of quantities, saturating at `Decimal::MAX`.
fn total_quantity(levels: &[BookLevel]) -> Decimal {
    levels
        .iter()
        .fold(Decimal::ZERO, |acc, level| acc.saturating_add(level.quantity()))
}

fn depth_curve(levels: &[BookLevel]) -> Vec<DepthPoint> {
    let max_quantity = levels
        .iter()
        .map(BookLevel::quantity)
        .max()
        .unwrap_or(Decimal::ZERO);

    let mut cumulative = Decimal::ZERO;
    levels
        .iter()
        .map(|level| {
            cumulative = cumulative.saturating_add(level.quantity());
            DepthPoint {
                price: level.price(),
                cumulative,
                intensity: level
                    .quantity()
                    .checked_div(max_quantity)
                    .unwrap_or(Decimal::ZERO),
            }
        })
        .collect()
}

/// Circular buffer of recent mid prices.
///
/// The first sample fills the whole buffer so averages are meaningful from
/// the first update.
#[derive(Debug, Clone)]
pub struct PriceTrend {
    samples: Vec<Decimal>,
    cursor: usize,
    written: u64,
}

impl PriceTrend {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(LONG_WINDOW).max(MOMENTUM_LAG + 1);
        Self {
            samples: vec![Decimal::ZERO; capacity],
            cursor: 0,
            written: 0,
        }
    }

    /// Record one mid price.
    pub fn record(&mut self, mid: Decimal) {
        if self.written == 0 {
            self.samples.fill(mid);
        }
        self.samples[self.cursor] = mid;
        self.cursor = (self.cursor + 1) % self.samples.len();
        self.written += 1;
    }

    /// Sample written `age` writes ago (0 = newest).
    fn back(&self, age: usize) -> Decimal {
        let len = self.samples.len();
        self.samples[(self.cursor + len - 1 - age % len) % len]
    }

    /// Mean of the newest `window` samples. Falls back to averaging term by
    /// term when the running total overflows.
    fn mean_of_recent(&self, window: usize) -> Decimal {
        let count = Decimal::from(window);
        let total = (0..window).try_fold(Decimal::ZERO, |acc, age| acc.checked_add(self.back(age)));
        match total {
            Some(total) => total / count,
            None => (0..window)
                .map(|age| self.back(age) / count)
                .fold(Decimal::ZERO, Decimal::saturating_add),
        }
    }

    pub fn short_term_average(&self) -> Decimal {
        self.mean_of_recent(SHORT_WINDOW)
    }

    pub fn long_term_average(&self) -> Decimal {
        self.mean_of_recent(LONG_WINDOW)
    }

    pub fn momentum(&self) -> Decimal {
        let current = self.back(0);
        current
            .checked_sub(self.back(MOMENTUM_LAG))
            .and_then(|change| change.checked_div(current))
            .unwrap_or(Decimal::ZERO)
    }

    pub fn summary(&self) -> TrendSummary {
        if self.written == 0 {
            return TrendSummary::default();
        }
        TrendSummary {
            short_term_average: self.short_term_average(),
            long_term_average: self.long_term_average(),
            momentum: self.momentum(),
            samples: self.written,
        }
    }

    pub fn reset(&mut self) {
        self.samples.fill(Decimal::ZERO);
        self.cursor = 0;
        self.written = 0;
    }
}

impl Default for PriceTrend {
    fn default() -> Self {
        Self::new(TREND_CAPACITY)
    }
}

/// Rolling window of timestamped mid prices for TWAP.
#[derive(Debug, Clone)]
pub struct MidPriceHistory {
    samples: VecDeque<(Decimal, DateTime<Utc>)>,
    capacity: usize,
}

impl MidPriceHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn record(&mut self, mid: Decimal, at: DateTime<Utc>) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back((mid, at));
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Time-weighted average price.
    ///
    /// Sample `i` is weighted by the milliseconds since sample `i - 1`. When
    /// no time has elapsed across the window, or the weighted sum overflows,
    /// the newest price is returned.
    pub fn twap(&self) -> Option<Decimal> {
        let (last_price, _) = *self.samples.back()?;

        let mut weighted = Decimal::ZERO;
        let mut total_weight = Decimal::ZERO;
        for (prev, next) in self.samples.iter().zip(self.samples.iter().skip(1)) {
            let elapsed_ms = (next.1 - prev.1).num_milliseconds().max(0);
            let weight = Decimal::from(elapsed_ms);
            let Some(sum) = next
                .0
                .checked_mul(weight)
                .and_then(|term| weighted.checked_add(term))
            else {
                return Some(last_price);
            };
            weighted = sum;
            total_weight += weight;
        }

        Some(weighted.checked_div(total_weight).unwrap_or(last_price))
    }
}

impl Default for MidPriceHistory {
    fn default() -> Self {
        Self::new(TREND_CAPACITY)
    }
}

/// Render a quantity with a K/M suffix and two decimals.
pub fn format_compact(value: Decimal) -> String {
    let thousand = Decimal::from(1_000);
    let million = Decimal::from(1_000_000);
    let magnitude = value.abs();

    if magnitude >= million {
        format!("{:.2}M", (value / million).round_dp(2))
    } else if magnitude >= thousand {
        format!("{:.2}K", (value / thousand).round_dp(2))
    } else {
        format!("{:.2}", value.round_dp(2))
    }
}
