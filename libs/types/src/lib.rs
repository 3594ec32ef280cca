//! Types library for the order book synchronization engine
//!
//! This library provides the vocabulary shared between the feed decoder,
//! the book store and any consumer of book snapshots, so that every layer
//! agrees on sides, symbols, numeric representation and failure modes.
//!
//! # Version
//! v1.0.0
//!
//! # Modules
//! - `side`: Book side (bid / ask) and its ordering rule
//! - `numeric`: Decimal values that keep their original wire text
//! - `symbol`: Trading pair symbols and venue-specific renderings
//! - `errors`: Error taxonomy (transport, decode, timeout, fatal)

// Public modules
pub mod side;
pub mod numeric;
pub mod symbol;
pub mod errors;

// Library version constant
pub const LIB_VERSION: &str = "1.0.0";

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::side::*;
    pub use crate::numeric::*;
    pub use crate::symbol::*;
    pub use crate::errors::*;
}
