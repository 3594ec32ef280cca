//! Error types for the order book synchronization engine
//!
//! Comprehensive error taxonomy using thiserror. Everything except
//! `FatalError` is recoverable: transport failures and timeouts force a
//! reconnect, decode failures drop a single message.

use thiserror::Error;

/// Top-level session error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Timeout: {0}")]
    Timeout(#[from] TimeoutError),

    #[error("Fatal error: {0}")]
    Fatal(#[from] FatalError),
}

impl SessionError {
    /// Whether this error requires tearing down the current connection.
    ///
    /// Decode errors only cost the offending message; fatal errors end the
    /// session instead of reconnecting.
    pub fn requires_reconnect(&self) -> bool {
        matches!(self, SessionError::Transport(_) | SessionError::Timeout(_))
    }
}

/// Connect, handshake, read or write failure on the streaming connection
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Connect to {endpoint} failed: {reason}")]
    Connect { endpoint: String, reason: String },

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Receive failed: {0}")]
    Receive(String),

    #[error("Connection closed by peer")]
    Closed,
}

/// A single feed message could not be turned into a book event
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Binary frame is not valid UTF-8")]
    NotUtf8,

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Field {field} has unexpected type, expected {expected}")]
    UnexpectedType {
        field: &'static str,
        expected: &'static str,
    },

    #[error("Invalid numeric field {field}: {source}")]
    Numeric {
        field: &'static str,
        source: NumericError,
    },

    #[error("Invalid level: {0}")]
    InvalidLevel(String),

    #[error("Unrecognized message shape: {0}")]
    Unrecognized(String),
}

/// Numeric text could not be parsed
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NumericError {
    #[error("empty value")]
    Empty,

    #[error("not a decimal: {0}")]
    Invalid(String),

    #[error("expected a number or numeric string, got {0}")]
    NotNumeric(&'static str),
}

/// No inbound message within the heartbeat timeout
#[derive(Error, Debug, Clone, PartialEq)]
#[error("no message received for {silent_for_ms}ms (limit {limit_ms}ms)")]
pub struct TimeoutError {
    pub silent_for_ms: u64,
    pub limit_ms: u64,
}

/// Errors that end the session; never auto-restarted
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FatalError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Ingestion task aborted: {0}")]
    TaskAborted(String),
}

/// Symbol construction errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SymbolError {
    #[error("Base asset is empty")]
    EmptyBase,

    #[error("Quote asset is empty")]
    EmptyQuote,

    #[error("Symbol {0} has no BASE/QUOTE separator")]
    MissingSeparator(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_display() {
        let err = DecodeError::MissingField("d.asks[0].p");
        assert_eq!(err.to_string(), "Missing field: d.asks[0].p");
    }

    #[test]
    fn test_numeric_error_is_source_of_decode_error() {
        use std::error::Error as _;

        let err = DecodeError::Numeric {
            field: "price",
            source: NumericError::Invalid("abc".to_string()),
        };
        assert!(err.source().is_some());
        assert!(err.to_string().contains("abc"));
    }

    #[test]
    fn test_session_error_from_transport_error() {
        let err: SessionError = TransportError::Closed.into();
        assert!(matches!(err, SessionError::Transport(_)));
        assert!(err.requires_reconnect());
    }

    #[test]
    fn test_decode_error_does_not_require_reconnect() {
        let err: SessionError = DecodeError::NotUtf8.into();
        assert!(!err.requires_reconnect());
    }

    #[test]
    fn test_fatal_error_does_not_reconnect() {
        let err: SessionError = FatalError::InvalidConfig("empty endpoint".to_string()).into();
        assert!(!err.requires_reconnect());

        let err: SessionError = TimeoutError {
            silent_for_ms: 30_000,
            limit_ms: 30_000,
        }
        .into();
        assert!(err.requires_reconnect());
    }

    #[test]
    fn test_timeout_error_display() {
        let err = TimeoutError {
            silent_for_ms: 31_000,
            limit_ms: 30_000,
        };
        assert!(err.to_string().contains("31000ms"));
    }
}
