//! Trading pair symbols
//!
//! A `Symbol` is a BASE/QUOTE pair. Venues spell it differently: the spot
//! stream wants `ETHUSDT`, the futures stream wants `ETH_USDT`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::SymbolError;

/// Trading pair identifier (e.g. "ETH/USDT")
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol {
    base: String,
    quote: String,
}

impl Symbol {
    /// Create a symbol from base and quote assets.
    ///
    /// Whitespace is trimmed and assets are upper-cased.
    pub fn try_new(base: &str, quote: &str) -> Result<Self, SymbolError> {
        let base = normalize_asset(base).ok_or(SymbolError::EmptyBase)?;
        let quote = normalize_asset(quote).ok_or(SymbolError::EmptyQuote)?;
        Ok(Self { base, quote })
    }

    /// Parse `BASE/QUOTE`, `BASE_QUOTE` or `BASE-QUOTE`.
    pub fn parse(pair: &str) -> Result<Self, SymbolError> {
        let (base, quote) = pair
            .split_once(['/', '_', '-'])
            .ok_or_else(|| SymbolError::MissingSeparator(pair.to_string()))?;
        Self::try_new(base, quote)
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn quote(&self) -> &str {
        &self.quote
    }

    /// Concatenated form used by the spot stream: `ETHUSDT`.
    pub fn concatenated(&self) -> String {
        format!("{}{}", self.base, self.quote)
    }

    /// Underscore-joined form used by the futures stream: `ETH_USDT`.
    pub fn underscored(&self) -> String {
        format!("{}_{}", self.base, self.quote)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

fn normalize_asset(asset: &str) -> Option<String> {
    let trimmed = asset.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_ascii_uppercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_normalizes_assets() {
        let s = Symbol::try_new(" eth ", "usdt").unwrap();
        assert_eq!(s.base(), "ETH");
        assert_eq!(s.quote(), "USDT");
        assert_eq!(s.to_string(), "ETH/USDT");
    }

    #[test]
    fn test_venue_spellings() {
        let s = Symbol::try_new("BTC", "USDT").unwrap();
        assert_eq!(s.concatenated(), "BTCUSDT");
        assert_eq!(s.underscored(), "BTC_USDT");
    }

    #[test]
    fn test_empty_assets_rejected() {
        assert_eq!(Symbol::try_new("", "USDT"), Err(SymbolError::EmptyBase));
        assert_eq!(Symbol::try_new("ETH", "  "), Err(SymbolError::EmptyQuote));
    }

    #[test]
    fn test_parse_separators() {
        let expected = Symbol::try_new("ETH", "USDT").unwrap();
        assert_eq!(Symbol::parse("ETH/USDT").unwrap(), expected);
        assert_eq!(Symbol::parse("eth_usdt").unwrap(), expected);
        assert_eq!(Symbol::parse("ETH-USDT").unwrap(), expected);
        assert!(matches!(
            Symbol::parse("ETHUSDT"),
            Err(SymbolError::MissingSeparator(_))
        ));
    }
}
