//! Positional query parameters.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::expression::LiteralValue;

/// A bound SQL parameter value, typed for binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlParam {
    /// `bigint`
    BigInt(i64),
    /// `int`
    Int(i32),
    /// `smallint`
    SmallInt(i16),
    /// `tinyint`
    TinyInt(u8),
    /// `decimal(18,6)`
    Decimal(Decimal),
    /// `nvarchar`
    NVarChar(String),
    /// `datetime2(7)`
    DateTime2(DateTime<Utc>),
    /// `bit`
    Bit(bool),
}

impl SqlParam {
    /// The T-SQL type used when declaring this parameter.
    pub fn sql_type(&self) -> String {
        match self {
            SqlParam::BigInt(_) => "bigint".to_string(),
            SqlParam::Int(_) => "int".to_string(),
            SqlParam::SmallInt(_) => "smallint".to_string(),
            SqlParam::TinyInt(_) => "tinyint".to_string(),
            SqlParam::Decimal(_) => "decimal(18,6)".to_string(),
            SqlParam::NVarChar(s) => format!("nvarchar({})", s.chars().count().max(1)),
            SqlParam::DateTime2(_) => "datetime2(7)".to_string(),
            SqlParam::Bit(_) => "bit".to_string(),
        }
    }
}

impl fmt::Display for SqlParam {
    /// Renders the value as a T-SQL literal.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlParam::BigInt(v) => write!(f, "{}", v),
            SqlParam::Int(v) => write!(f, "{}", v),
            SqlParam::SmallInt(v) => write!(f, "{}", v),
            SqlParam::TinyInt(v) => write!(f, "{}", v),
            SqlParam::Decimal(v) => write!(f, "{}", v),
            SqlParam::NVarChar(v) => write!(f, "N'{}'", v.replace('\'', "''")),
            SqlParam::DateTime2(v) => write!(
                f,
                "'{}'",
                v.naive_utc().format("%Y-%m-%dT%H:%M:%S%.3f")
            ),
            SqlParam::Bit(v) => write!(f, "{}", u8::from(*v)),
        }
    }
}

impl From<LiteralValue> for SqlParam {
    fn from(value: LiteralValue) -> Self {
        match value {
            LiteralValue::Integer(v) => SqlParam::BigInt(v),
            LiteralValue::Decimal(v) => SqlParam::Decimal(v),
            LiteralValue::String(v) => SqlParam::NVarChar(v),
            LiteralValue::DateTime(v) => SqlParam::DateTime2(v),
            LiteralValue::Bool(v) => SqlParam::Bit(v),
        }
    }
}

impl From<&LiteralValue> for SqlParam {
    fn from(value: &LiteralValue) -> Self {
        value.clone().into()
    }
}

impl From<i64> for SqlParam {
    fn from(value: i64) -> Self {
        SqlParam::BigInt(value)
    }
}

impl From<i32> for SqlParam {
    fn from(value: i32) -> Self {
        SqlParam::Int(value)
    }
}

impl From<i16> for SqlParam {
    fn from(value: i16) -> Self {
        SqlParam::SmallInt(value)
    }
}

impl From<u8> for SqlParam {
    fn from(value: u8) -> Self {
        SqlParam::TinyInt(value)
    }
}

impl From<&str> for SqlParam {
    fn from(value: &str) -> Self {
        SqlParam::NVarChar(value.to_string())
    }
}

impl From<String> for SqlParam {
    fn from(value: String) -> Self {
        SqlParam::NVarChar(value)
    }
}

/// A named parameter of a compiled command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlParameter {
    /// Placeholder name, including the `@` prefix.
    pub name: String,
    /// The bound value.
    pub value: SqlParam,
}

impl SqlParameter {
    /// `DECLARE @pN <type> = <value>` for replaying a command by hand.
    pub fn declare_statement(&self) -> String {
        format!(
            "DECLARE {} {} = {}",
            self.name,
            self.value.sql_type(),
            self.value
        )
    }
}

impl fmt::Display for SqlParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

/// Assigns placeholders to literal values in first-use order.
///
/// Every call yields a fresh placeholder; equal values are not shared.
#[derive(Debug, Default)]
pub struct SqlQueryParameterManager {
    parameters: Vec<SqlParameter>,
}

impl SqlQueryParameterManager {
    /// Creates an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a parameter and returns its placeholder.
    pub fn add(&mut self, value: impl Into<SqlParam>) -> String {
        let name = format!("@p{}", self.parameters.len());
        self.parameters.push(SqlParameter {
            name: name.clone(),
            value: value.into(),
        });
        name
    }

    /// Number of parameters added so far.
    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    /// Returns true if no parameters have been added.
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// The parameters added so far.
    pub fn parameters(&self) -> &[SqlParameter] {
        &self.parameters
    }

    /// Consumes the manager, returning the parameters in placeholder order.
    pub fn into_parameters(self) -> Vec<SqlParameter> {
        self.parameters
    }
}
