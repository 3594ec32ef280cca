//! Order Book Synchronization Engine
//!
//! Follows one exchange market-data stream and maintains:
//! - A bounded, sorted top-of-book mirror (20 levels per side)
//! - Spread, liquidity imbalance and cumulative depth analytics
//! - Short/long mid-price trend, momentum and TWAP
//!
//! Two wire protocols are supported: incremental deltas with a best
//! bid/ask ticker (spot) and full top-N snapshots with an application
//! heartbeat (futures).
//!
//! # Architecture
//!
//! ```text
//!  Exchange websocket
//!        │ frames
//!  ┌─────▼──────────────┐
//!  │ ConnectionSession  │ ← connect / subscribe / heartbeat / reconnect
//!  └─────┬──────────────┘
//!        │ raw JSON
//!  ┌─────▼──────────────┐
//!  │ ProtocolAdapter    │ ← spot deltas │ futures snapshots
//!  └─────┬──────────────┘
//!        │ BookEvent
//!  ┌─────▼──────────────┐      ┌────────────┐
//!  │ OrderBookStore     │─────►│ PriceTrend │
//!  └─────┬──────────────┘      └─────┬──────┘
//!        │ BookSnapshot              │
//!  ┌─────▼───────────────────────────▼──┐
//!  │ OrderBookSession (consumer handle) │ ← HTTP, summary log
//!  └────────────────────────────────────┘
//! ```

pub mod analytics;
pub mod config;
pub mod decoder;
pub mod events;
pub mod heartbeat;
pub mod http;
pub mod metrics;
pub mod order_book;
pub mod session;
pub mod snapshot;
pub mod transport;

pub use config::{ServiceConfig, SessionConfig, Venue};
pub use session::{ConnectionSession, ConnectionState, OrderBookSession};

// Library version
pub const SERVICE_VERSION: &str = "0.1.0";
