//! The database seam: executes compiled commands and returns their rows.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{BackendError, StorageError, StorageResult};
use crate::sql::SqlCommand;

/// Executes a compiled search command.
///
/// Implementations wrap a real database connection. Failures reported by the
/// database should surface as [`BackendError::Sql`] so the search service can
/// map known error numbers onto domain outcomes.
#[async_trait]
pub trait SqlCommandExecutor: Send + Sync {
    /// Runs `command` and returns every row of its first result set.
    ///
    /// `cancellation` is cancelled when the caller gives up on the search.
    async fn execute_reader(
        &self,
        command: &SqlCommand,
        cancellation: &CancellationToken,
    ) -> StorageResult<Vec<SqlRow>>;
}

/// A column value as read from the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlValue {
    /// SQL `NULL`.
    Null,
    /// `bit`
    Bit(bool),
    /// `tinyint`
    TinyInt(u8),
    /// `smallint`
    SmallInt(i16),
    /// `int`
    Int(i32),
    /// `bigint`
    BigInt(i64),
    /// `nvarchar`
    NVarChar(String),
    /// `varbinary`
    VarBinary(Vec<u8>),
}

impl SqlValue {
    fn type_name(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::Bit(_) => "bit",
            SqlValue::TinyInt(_) => "tinyint",
            SqlValue::SmallInt(_) => "smallint",
            SqlValue::Int(_) => "int",
            SqlValue::BigInt(_) => "bigint",
            SqlValue::NVarChar(_) => "nvarchar",
            SqlValue::VarBinary(_) => "varbinary",
        }
    }
}

/// One result row, indexed by column ordinal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqlRow {
    values: Vec<SqlValue>,
}

impl From<Vec<SqlValue>> for SqlRow {
    fn from(values: Vec<SqlValue>) -> Self {
        Self { values }
    }
}

impl SqlRow {
    /// Creates a row from its column values.
    pub fn new(values: Vec<SqlValue>) -> Self {
        Self { values }
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true for a row without columns.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The raw value at `column`.
    pub fn get(&self, column: usize) -> StorageResult<&SqlValue> {
        self.values
            .get(column)
            .ok_or_else(|| decode_error(column, "column out of range"))
    }

    /// Reads a `smallint` or `tinyint` column.
    pub fn get_i16(&self, column: usize) -> StorageResult<i16> {
        match self.get(column)? {
            SqlValue::TinyInt(v) => Ok(i16::from(*v)),
            SqlValue::SmallInt(v) => Ok(*v),
            other => Err(type_error(column, "smallint", other)),
        }
    }

    /// Reads an `int`, `smallint` or `tinyint` column.
    pub fn get_i32(&self, column: usize) -> StorageResult<i32> {
        match self.get(column)? {
            SqlValue::TinyInt(v) => Ok(i32::from(*v)),
            SqlValue::SmallInt(v) => Ok(i32::from(*v)),
            SqlValue::Int(v) => Ok(*v),
            other => Err(type_error(column, "int", other)),
        }
    }

    /// Reads any integer column, widening to `i64`.
    pub fn get_i64(&self, column: usize) -> StorageResult<i64> {
        match self.get(column)? {
            SqlValue::BigInt(v) => Ok(*v),
            _ => self.get_i32(column).map(i64::from),
        }
    }

    /// Reads a `bit` column.
    pub fn get_bool(&self, column: usize) -> StorageResult<bool> {
        match self.get(column)? {
            SqlValue::Bit(v) => Ok(*v),
            other => Err(type_error(column, "bit", other)),
        }
    }

    /// Reads a non-null `nvarchar` column.
    pub fn get_string(&self, column: usize) -> StorageResult<String> {
        self.get_opt_string(column)?
            .ok_or_else(|| decode_error(column, "unexpected null"))
    }

    /// Reads a nullable `nvarchar` column.
    pub fn get_opt_string(&self, column: usize) -> StorageResult<Option<String>> {
        match self.get(column)? {
            SqlValue::Null => Ok(None),
            SqlValue::NVarChar(v) => Ok(Some(v.clone())),
            other => Err(type_error(column, "nvarchar", other)),
        }
    }

    /// Reads a nullable `varbinary` column.
    pub fn get_opt_bytes(&self, column: usize) -> StorageResult<Option<&[u8]>> {
        match self.get(column)? {
            SqlValue::Null => Ok(None),
            SqlValue::VarBinary(v) => Ok(Some(v)),
            other => Err(type_error(column, "varbinary", other)),
        }
    }
}

fn decode_error(column: usize, message: impl Into<String>) -> StorageError {
    BackendError::RowDecode {
        column,
        message: message.into(),
    }
    .into()
}

fn type_error(column: usize, expected: &str, actual: &SqlValue) -> StorageError {
    decode_error(
        column,
        format!("expected {}, found {}", expected, actual.type_name()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_widening() {
        let row = SqlRow::new(vec![
            SqlValue::TinyInt(3),
            SqlValue::SmallInt(103),
            SqlValue::Int(7),
            SqlValue::BigInt(1 << 40),
        ]);
        assert_eq!(row.get_i16(0).unwrap(), 3);
        assert_eq!(row.get_i32(1).unwrap(), 103);
        assert_eq!(row.get_i64(2).unwrap(), 7);
        assert_eq!(row.get_i64(3).unwrap(), 1 << 40);
        assert!(row.get_i32(3).is_err());
    }

    #[test]
    fn test_nulls_and_type_mismatches() {
        let row = SqlRow::new(vec![SqlValue::Null, SqlValue::Bit(true)]);
        assert_eq!(row.get_opt_string(0).unwrap(), None);
        assert_eq!(row.get_opt_bytes(0).unwrap(), None);
        assert!(row.get_string(0).is_err());

        match row.get_string(1).unwrap_err() {
            StorageError::Backend(BackendError::RowDecode { column, message }) => {
                assert_eq!(column, 1);
                assert_eq!(message, "expected nvarchar, found bit");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(row.get(2).is_err());
    }
}
