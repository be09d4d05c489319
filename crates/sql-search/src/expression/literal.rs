//! Literal values carried by comparison predicates.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A typed literal.
///
/// The variant is kept all the way to parameter binding so the database
/// receives the value with its semantic type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum LiteralValue {
    /// 64-bit integer (surrogate ids, type ids).
    Integer(i64),
    /// Exact decimal (numbers and quantities).
    Decimal(Decimal),
    /// Text.
    String(String),
    /// Instant in UTC.
    DateTime(DateTime<Utc>),
    /// Boolean flag.
    Bool(bool),
}

impl LiteralValue {
    /// Returns the instant if this is a date-time literal.
    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            LiteralValue::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }

    /// Returns the decimal value of numeric literals.
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            LiteralValue::Decimal(d) => Some(*d),
            LiteralValue::Integer(i) => Some(Decimal::from(*i)),
            _ => None,
        }
    }

    /// Returns the text of string literals.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            LiteralValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for LiteralValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiteralValue::Integer(i) => write!(f, "{}", i),
            LiteralValue::Decimal(d) => write!(f, "{}", d),
            LiteralValue::String(s) => write!(f, "'{}'", s),
            LiteralValue::DateTime(dt) => {
                write!(f, "{}", dt.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            LiteralValue::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl From<i64> for LiteralValue {
    fn from(value: i64) -> Self {
        LiteralValue::Integer(value)
    }
}

impl From<Decimal> for LiteralValue {
    fn from(value: Decimal) -> Self {
        LiteralValue::Decimal(value)
    }
}

impl From<&str> for LiteralValue {
    fn from(value: &str) -> Self {
        LiteralValue::String(value.to_string())
    }
}

impl From<String> for LiteralValue {
    fn from(value: String) -> Self {
        LiteralValue::String(value)
    }
}

impl From<DateTime<Utc>> for LiteralValue {
    fn from(value: DateTime<Utc>) -> Self {
        LiteralValue::DateTime(value)
    }
}

impl From<bool> for LiteralValue {
    fn from(value: bool) -> Self {
        LiteralValue::Bool(value)
    }
}
