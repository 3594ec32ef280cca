//! Decimal values that remember their wire text
//!
//! Venues publish prices and quantities either as decimal text (`"2650.50"`)
//! or as JSON numbers. Both are parsed into `rust_decimal::Decimal` so book
//! arithmetic is deterministic, while the original text is kept verbatim for
//! lossless display.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::NumericError;

/// A parsed decimal together with the text it was parsed from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecimalText {
    value: Decimal,
    text: String,
}

impl DecimalText {
    /// Parse decimal text such as `"100.00"` or `"1.5e-3"`.
    pub fn parse(text: &str) -> Result<Self, NumericError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(NumericError::Empty);
        }

        let value = Decimal::from_str(trimmed)
            .or_else(|_| Decimal::from_scientific(trimmed))
            .map_err(|_| NumericError::Invalid(trimmed.to_string()))?;

        Ok(Self {
            value,
            text: trimmed.to_string(),
        })
    }

    /// Parse a JSON string or number.
    ///
    /// Numbers keep serde_json's canonical rendering as their text.
    pub fn from_json(value: &Value) -> Result<Self, NumericError> {
        match value {
            Value::String(s) => Self::parse(s),
            Value::Number(n) => Self::parse(&n.to_string()),
            other => Err(NumericError::NotNumeric(json_kind(other))),
        }
    }

    /// Build from an already-known decimal; the text is its canonical form.
    pub fn from_decimal(value: Decimal) -> Self {
        Self {
            value,
            text: value.to_string(),
        }
    }

    /// The numeric value.
    pub fn value(&self) -> Decimal {
        self.value
    }

    /// The original wire text.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_zero(&self) -> bool {
        self.value.is_zero()
    }

    pub fn is_sign_negative(&self) -> bool {
        self.value.is_sign_negative() && !self.value.is_zero()
    }
}

impl fmt::Display for DecimalText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl FromStr for DecimalText {
    type Err = NumericError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
