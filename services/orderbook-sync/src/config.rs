//! Session and service configuration
//!
//! Protocol constants live in `Default`-style constructors; the binary can
//! override the common knobs through `ORDERBOOK_*` environment variables.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Duration;
use types::errors::{FatalError, SymbolError};
use types::symbol::Symbol;

use crate::decoder::{FullSnapshotAdapter, IncrementalAdapter, ProtocolAdapter, DEFAULT_DEPTH};
use crate::heartbeat::HeartbeatConfig;
use crate::order_book::MAX_LEVELS;

pub const SPOT_ENDPOINT: &str = "wss://wbs.mexc.com/ws";
pub const FUTURES_ENDPOINT: &str = "wss://contract.mexc.com/edge";

/// Configuration errors raised while reading overrides.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Unknown venue: {0} (expected spot or futures)")]
    UnknownVenue(String),

    #[error("Invalid value for {key}: {value} ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("Invalid symbol: {0}")]
    Symbol(#[from] SymbolError),
}

/// Which market stream to follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Venue {
    /// Incremental deltas plus best bid/ask ticker.
    Spot,
    /// Full top-of-book snapshots with application ping.
    Futures,
}

impl Venue {
    pub fn default_endpoint(&self) -> &'static str {
        match self {
            Venue::Spot => SPOT_ENDPOINT,
            Venue::Futures => FUTURES_ENDPOINT,
        }
    }

    /// Wire protocol for this venue.
    pub fn adapter(&self, depth: usize) -> Arc<dyn ProtocolAdapter> {
        match self {
            Venue::Spot => Arc::new(IncrementalAdapter::new(depth)),
            Venue::Futures => Arc::new(FullSnapshotAdapter::new(depth)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Venue::Spot => "spot",
            Venue::Futures => "futures",
        }
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Venue {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "spot" => Ok(Venue::Spot),
            "futures" | "contract" => Ok(Venue::Futures),
            other => Err(ConfigError::UnknownVenue(other.to_string())),
        }
    }
}

/// Configuration for one synchronization session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub venue: Venue,
    /// Websocket URL to connect to.
    pub endpoint: String,
    /// Initial symbol; may be changed at runtime.
    pub symbol: Symbol,
    /// Levels requested in the subscription.
    pub depth: usize,
    /// Ping/timeout policy, used only when the protocol has a ping.
    pub heartbeat: HeartbeatConfig,
    /// Pause before reconnecting (default: 1s).
    pub reconnect_backoff: Duration,
    /// Upper bound on the connect handshake (default: 10s).
    pub connect_timeout: Duration,
}

impl SessionConfig {
    /// Defaults for `venue`, following `symbol`.
    pub fn new(venue: Venue, symbol: Symbol) -> Self {
        Self {
            venue,
            endpoint: venue.default_endpoint().to_string(),
            symbol,
            depth: DEFAULT_DEPTH,
            heartbeat: HeartbeatConfig::default(),
            reconnect_backoff: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn adapter(&self) -> Arc<dyn ProtocolAdapter> {
        self.venue.adapter(self.depth)
    }

    /// Reject configurations the session cannot run with.
    pub fn validate(&self) -> Result<(), FatalError> {
        let endpoint = self.endpoint.trim();
        if endpoint.is_empty() {
            return Err(FatalError::InvalidConfig("endpoint is empty".to_string()));
        }
        if !(endpoint.starts_with("ws://") || endpoint.starts_with("wss://")) {
            return Err(FatalError::InvalidConfig(format!(
                "endpoint {} is not a websocket URL",
                endpoint
            )));
        }
        if self.depth == 0 || self.depth > MAX_LEVELS {
            return Err(FatalError::InvalidConfig(format!(
                "depth {} outside 1..={}",
                self.depth, MAX_LEVELS
            )));
        }
        if self.heartbeat.timeout <= self.heartbeat.ping_interval {
            return Err(FatalError::InvalidConfig(
                "heartbeat timeout must exceed the ping interval".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration for the headless binary.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub session: SessionConfig,
    /// Address for the read-only HTTP surface.
    pub http_addr: SocketAddr,
    /// Interval between book summary log lines.
    pub summary_interval: Duration,
}

impl ServiceConfig {
    /// Read overrides from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the environment, in production).
    ///
    /// Keys: `ORDERBOOK_VENUE`, `ORDERBOOK_ENDPOINT`, `ORDERBOOK_BASE`,
    /// `ORDERBOOK_QUOTE`, `ORDERBOOK_HTTP_ADDR`, `ORDERBOOK_SUMMARY_SECS`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let venue = match lookup("ORDERBOOK_VENUE") {
            Some(value) => value.parse()?,
            None => Venue::Spot,
        };

        let base = lookup("ORDERBOOK_BASE").unwrap_or_else(|| "ETH".to_string());
        let quote = lookup("ORDERBOOK_QUOTE").unwrap_or_else(|| "USDT".to_string());
        let symbol = Symbol::try_new(&base, &quote)?;

        let mut session = SessionConfig::new(venue, symbol);
        if let Some(endpoint) = lookup("ORDERBOOK_ENDPOINT") {
            session.endpoint = endpoint;
        }

        let http_addr = match lookup("ORDERBOOK_HTTP_ADDR") {
            Some(value) => value.parse().map_err(|e: std::net::AddrParseError| {
                ConfigError::InvalidValue {
                    key: "ORDERBOOK_HTTP_ADDR",
                    value: value.clone(),
                    reason: e.to_string(),
                }
            })?,
            None => SocketAddr::from(([127, 0, 0, 1], 8080)),
        };

        let summary_secs = match lookup("ORDERBOOK_SUMMARY_SECS") {
            Some(value) => match value.parse::<u64>() {
                Ok(secs) if secs > 0 => secs,
                Ok(_) => {
                    return Err(ConfigError::InvalidValue {
                        key: "ORDERBOOK_SUMMARY_SECS",
                        value,
                        reason: "must be positive".to_string(),
                    })
                }
                Err(e) => {
                    return Err(ConfigError::InvalidValue {
                        key: "ORDERBOOK_SUMMARY_SECS",
                        reason: e.to_string(),
                        value,
                    })
                }
            },
            None => 5,
        };

        Ok(Self {
            session,
            http_addr,
            summary_interval: Duration::from_secs(summary_secs),
        })
    }
}
