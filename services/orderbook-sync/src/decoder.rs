//! Wire-message decoding
//!
//! Each venue protocol is a `ProtocolAdapter`: it knows how to subscribe,
//! whether the connection needs an application-level ping, and how to turn
//! one parsed JSON message into a `BookEvent`.
//!
//! ```text
//! spot     d.asks / d.bids  [{p, v}]            → Delta
//!          d.a d.A d.b d.B                      → BestUpdate
//! futures  channel=push.depth.full
//!          data.asks / data.bids [[p, v, n]]    → Snapshot (both sides)
//! ```
//!
//! Decoding failures are per-message: the caller logs and drops the message
//! and the connection stays up.

use std::fmt;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{json, Map, Value};
use tracing::debug;
use types::errors::DecodeError;
use types::numeric::DecimalText;
use types::side::Side;
use types::symbol::Symbol;

use crate::events::{BookEvent, LevelUpdate};

/// Default subscription depth for both protocols.
pub const DEFAULT_DEPTH: usize = 20;

/// Channel carrying full-depth pushes on the futures stream.
pub const FULL_DEPTH_CHANNEL: &str = "push.depth.full";

/// Largest accepted price or quantity (1e18). Keeps sums across a full book
/// well inside `Decimal` range.
pub const MAX_LEVEL_VALUE: Decimal = Decimal::from_parts(0xA764_0000, 0x0DE0_B6B3, 0, false, 0);

/// A venue wire protocol.
pub trait ProtocolAdapter: Send + Sync + fmt::Debug {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Subscription request for `symbol`, sent once per connection.
    fn subscription_message(&self, symbol: &Symbol) -> String;

    /// Application-level ping. `None` means the protocol has no heartbeat.
    fn ping_message(&self) -> Option<String>;

    /// Decode one parsed message.
    fn decode(&self, message: &Value) -> Result<BookEvent, DecodeError>;

    /// Decode a text frame.
    fn decode_text(&self, text: &str) -> Result<BookEvent, DecodeError> {
        let message: Value =
            serde_json::from_str(text).map_err(|e| DecodeError::InvalidJson(e.to_string()))?;
        self.decode(&message)
    }

    /// Decode a binary frame; only UTF-8 JSON payloads are accepted.
    fn decode_binary(&self, bytes: &[u8]) -> Result<BookEvent, DecodeError> {
        let text = std::str::from_utf8(bytes).map_err(|_| DecodeError::NotUtf8)?;
        self.decode_text(text)
    }
}

/// Spot protocol: incremental depth deltas plus a best bid/ask ticker.
#[derive(Debug, Clone)]
pub struct IncrementalAdapter {
    depth: usize,
}

impl IncrementalAdapter {
    pub fn new(depth: usize) -> Self {
        Self { depth }
    }

    fn decode_depth(&self, data: &Map<String, Value>) -> Result<BookEvent, DecodeError> {
        let mut updates = Vec::new();

        for (key, side) in [("asks", Side::Ask), ("bids", Side::Bid)] {
            let Some(entries) = data.get(key) else {
                continue;
            };
            let entries = entries.as_array().ok_or(DecodeError::UnexpectedType {
                field: if side == Side::Ask { "d.asks" } else { "d.bids" },
                expected: "array",
            })?;

            for entry in entries {
                let price = required(entry, "p")?;
                let quantity = required(entry, "v")?;
                updates.push(level(side, price, quantity, "p", "v")?);
            }
        }

        Ok(BookEvent::Delta { updates })
    }

    fn decode_ticker(&self, data: &Map<String, Value>) -> Result<BookEvent, DecodeError> {
        let bid = ticker_level(data, Side::Bid, "b", "B")?;
        let ask = ticker_level(data, Side::Ask, "a", "A")?;
        Ok(BookEvent::BestUpdate { bid, ask })
    }
}

impl Default for IncrementalAdapter {
    fn default() -> Self {
        Self::new(DEFAULT_DEPTH)
    }
}

impl ProtocolAdapter for IncrementalAdapter {
    fn name(&self) -> &'static str {
        "spot-incremental"
    }

    fn subscription_message(&self, symbol: &Symbol) -> String {
        let pair = symbol.concatenated();
        json!({
            "method": "SUBSCRIPTION",
            "params": [
                format!("spot@public.limit.depth.v3.api@{}@{}", pair, self.depth),
                format!("spot@public.bookTicker.v3.api@{}", pair),
            ],
        })
        .to_string()
    }

    fn ping_message(&self) -> Option<String> {
        None
    }

    fn decode(&self, message: &Value) -> Result<BookEvent, DecodeError> {
        // Subscription acks and anything else without a payload
        let Some(data) = message.get("d") else {
            return Ok(BookEvent::Ignore);
        };
        let data = data.as_object().ok_or(DecodeError::UnexpectedType {
            field: "d",
            expected: "object",
        })?;

        if data.contains_key("asks") || data.contains_key("bids") {
            self.decode_depth(data)
        } else if ["a", "A", "b", "B"].iter().any(|k| data.contains_key(*k)) {
            self.decode_ticker(data)
        } else {
            Err(DecodeError::Unrecognized(preview(message)))
        }
    }
}

/// Futures protocol: every push replaces the top levels of both sides.
#[derive(Debug, Clone)]
pub struct FullSnapshotAdapter {
    depth: usize,
}

impl FullSnapshotAdapter {
    pub fn new(depth: usize) -> Self {
        Self { depth }
    }

    fn decode_side(&self, data: &Value, side: Side) -> Result<Vec<LevelUpdate>, DecodeError> {
        let (key, field) = match side {
            Side::Ask => ("asks", "data.asks"),
            Side::Bid => ("bids", "data.bids"),
        };
        let Some(entries) = data.get(key) else {
            return Ok(Vec::new());
        };
        let entries = entries.as_array().ok_or(DecodeError::UnexpectedType {
            field,
            expected: "array",
        })?;

        let mut levels = Vec::with_capacity(entries.len());
        for entry in entries {
            let fields = match entry.as_array() {
                Some(fields) if fields.len() >= 3 => fields,
                _ => {
                    debug!(side = %side, entry = %entry, "Skipping short depth entry");
                    continue;
                }
            };

            let update = level(side, &fields[0], &fields[1], "price", "volume")?;
            if update.quantity.is_zero() {
                continue;
            }
            levels.push(update.with_order_count(order_count(&fields[2])?));
        }

        Ok(levels)
    }
}

impl Default for FullSnapshotAdapter {
    fn default() -> Self {
        Self::new(DEFAULT_DEPTH)
    }
}

impl ProtocolAdapter for FullSnapshotAdapter {
    fn name(&self) -> &'static str {
        "futures-full-snapshot"
    }

    fn subscription_message(&self, symbol: &Symbol) -> String {
        json!({
            "method": "sub.depth.full",
            "param": {
                "symbol": symbol.underscored(),
                "limit": self.depth,
            },
        })
        .to_string()
    }

    fn ping_message(&self) -> Option<String> {
        Some(json!({ "method": "ping" }).to_string())
    }

    fn decode(&self, message: &Value) -> Result<BookEvent, DecodeError> {
        if message.get("method").and_then(Value::as_str) == Some("pong") {
            return Ok(BookEvent::Ignore);
        }
        if message.get("channel").and_then(Value::as_str) != Some(FULL_DEPTH_CHANNEL) {
            return Ok(BookEvent::Ignore);
        }

        let data = message.get("data").ok_or(DecodeError::MissingField("data"))?;
        if !data.is_object() {
            return Err(DecodeError::UnexpectedType {
                field: "data",
                expected: "object",
            });
        }
        let asks = self.decode_side(data, Side::Ask)?;
        let bids = self.decode_side(data, Side::Bid)?;

        Ok(BookEvent::Snapshot {
            bids: Some(bids),
            asks: Some(asks),
        })
    }
}

fn required<'a>(entry: &'a Value, key: &'static str) -> Result<&'a Value, DecodeError> {
    entry.get(key).ok_or(DecodeError::MissingField(key))
}

fn numeric(value: &Value, field: &'static str) -> Result<DecimalText, DecodeError> {
    DecimalText::from_json(value).map_err(|source| DecodeError::Numeric { field, source })
}

/// Parse and sanity-check one price/quantity pair.
fn level(
    side: Side,
    price: &Value,
    quantity: &Value,
    price_field: &'static str,
    quantity_field: &'static str,
) -> Result<LevelUpdate, DecodeError> {
    let price = numeric(price, price_field)?;
    let quantity = numeric(quantity, quantity_field)?;

    if price.value() <= Decimal::ZERO {
        return Err(DecodeError::InvalidLevel(format!(
            "{} price {} is not positive",
            side, price
        )));
    }
    if quantity.is_sign_negative() {
        return Err(DecodeError::InvalidLevel(format!(
            "{} quantity {} at {} is negative",
            side, quantity, price
        )));
    }
    if price.value() > MAX_LEVEL_VALUE || quantity.value() > MAX_LEVEL_VALUE {
        return Err(DecodeError::InvalidLevel(format!(
            "{} level {} x {} is out of range",
            side, price, quantity
        )));
    }

    Ok(LevelUpdate::new(side, price, quantity))
}

fn ticker_level(
    data: &Map<String, Value>,
    side: Side,
    price_key: &'static str,
    quantity_key: &'static str,
) -> Result<Option<LevelUpdate>, DecodeError> {
    match (data.get(price_key), data.get(quantity_key)) {
        (None, None) => Ok(None),
        (Some(price), Some(quantity)) => {
            level(side, price, quantity, price_key, quantity_key).map(Some)
        }
        (Some(_), None) => Err(DecodeError::MissingField(quantity_key)),
        (None, Some(_)) => Err(DecodeError::MissingField(price_key)),
    }
}

fn order_count(value: &Value) -> Result<u32, DecodeError> {
    let count = numeric(value, "orderCount")?;
    count
        .value()
        .trunc()
        .to_u32()
        .ok_or_else(|| DecodeError::InvalidLevel(format!("order count {} out of range", count)))
}

fn preview(message: &Value) -> String {
    let mut text = message.to_string();
    if text.len() > 120 {
        let cut = (0..=120).rev().find(|i| text.is_char_boundary(*i)).unwrap_or(0);
        text.truncate(cut);
        text.push_str("...");
    }
    text
}
