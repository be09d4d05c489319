//! Error types for the search compiler and executor.
//!
//! Errors are split by who is at fault:
//! - [`SearchError`] - the request itself is malformed (surfaced to the caller)
//! - [`QueryError`] - an internal invariant of the compiler was violated (a defect)
//! - [`ResourceError`], [`ConcurrencyError`] - domain outcomes reported by the store
//! - [`BackendError`] - failures of the database or object store collaborators

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use thiserror::Error;

use crate::sql::TableExpressionKind;

/// The primary error type for all search operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// User-input errors
    #[error(transparent)]
    Search(#[from] SearchError),

    /// Compiler defects
    #[error(transparent)]
    Query(#[from] QueryError),

    /// Resource state errors
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// Concurrency and versioning errors
    #[error(transparent)]
    Concurrency(#[from] ConcurrencyError),

    /// Backend-specific errors
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl StorageError {
    /// Returns true if the error was caused by the request rather than the server.
    pub fn is_user_error(&self) -> bool {
        matches!(self, StorageError::Search(_))
    }
}

/// Errors caused by a malformed search request.
#[derive(Error, Debug)]
pub enum SearchError {
    /// The continuation token is not a surrogate id.
    #[error("invalid continuation token: {token}")]
    InvalidContinuationToken { token: String },

    /// The request shape is invalid.
    #[error("invalid search request: {message}")]
    InvalidRequest { message: String },

    /// The resource type is not known to the store.
    #[error("unknown resource type: {resource_type}")]
    UnknownResourceType { resource_type: String },

    /// The date cannot be represented as a resource surrogate id.
    #[error("date {value} is outside the supported range")]
    DateOutOfRange { value: String },
}

/// Internal invariant violations in the rewrite pipeline or the query generator.
///
/// These never come from well-formed input and are never retried.
#[derive(Error, Debug)]
pub enum QueryError {
    /// OR is not supported as a top-level expression.
    #[error("OR is not supported as a top-level expression")]
    TopLevelOr,

    /// A table expression was built over a predicate outside the allowed set.
    #[error("invalid normalized predicate for a table expression: {expression}")]
    InvalidNormalizedPredicate { expression: String },

    /// A pass received an expression shape it does not handle.
    #[error("{pass} does not support expression {expression}")]
    UnsupportedExpression {
        pass: &'static str,
        expression: String,
    },

    /// A pass received an operator it does not handle.
    #[error("{pass} does not support operator {operator}")]
    UnsupportedOperator {
        pass: &'static str,
        operator: String,
    },

    /// A table expression kind reached code that cannot handle it.
    #[error("unexpected table expression kind {kind} in {context}")]
    UnexpectedTableExpressionKind {
        kind: TableExpressionKind,
        context: &'static str,
    },

    /// A table expression requires a predecessor that does not exist.
    #[error("table expression {index} has no restricting predecessor")]
    MissingPredecessor { index: usize },

    /// An include was generated before the main select.
    #[error("include table expression generated before the main select")]
    MissingMainSelect,

    /// The search parameter is not registered in the model.
    #[error("search parameter is not registered: {url}")]
    UnknownSearchParameter { url: String },

    /// A composite component predicate has no component index.
    #[error("composite predicate without component index: {expression}")]
    MissingComponentIndex { expression: String },
}

/// Errors related to resource state, mapped from store error numbers.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// The requested resource was not found.
    #[error("resource not found: {message}")]
    NotFound { message: String },

    /// The method is not allowed for the resource.
    #[error("method not allowed: {message}")]
    MethodNotAllowed { message: String },
}

/// Errors related to concurrency control.
#[derive(Error, Debug)]
pub enum ConcurrencyError {
    /// An optimistic concurrency precondition failed.
    #[error("precondition failed: {message}")]
    PreconditionFailed { message: String },
}

/// Errors originating from the database or object store.
#[derive(Error, Debug)]
pub enum BackendError {
    /// The database reported an error.
    #[error("sql error {number}: {message}")]
    Sql { number: i32, message: String },

    /// The operation was cancelled.
    #[error("search cancelled")]
    Cancelled,

    /// A result row did not have the expected shape.
    #[error("failed to decode column {column}: {message}")]
    RowDecode { column: usize, message: String },

    /// Internal backend error.
    #[error("internal error in {backend_name}: {message}")]
    Internal {
        backend_name: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for compiler operations.
pub type QueryResult<T> = Result<T, QueryError>;

/// Known store error numbers.
pub mod sql_error_codes {
    /// Custom error numbers are offset from this base.
    const CUSTOM_ERROR_CODE_BASE: i32 = 50000;

    /// A resource was not found.
    pub const NOT_FOUND: i32 = CUSTOM_ERROR_CODE_BASE + 404;

    /// The client used an unacceptable HTTP method during the request.
    pub const METHOD_NOT_ALLOWED: i32 = CUSTOM_ERROR_CODE_BASE + 405;

    /// An optimistic concurrency precondition failed.
    pub const PRECONDITION_FAILED: i32 = CUSTOM_ERROR_CODE_BASE + 412;
}

/// Maps a store error onto the domain outcome it encodes.
///
/// Errors that are not [`BackendError::Sql`], or carry an unknown number, are
/// returned unchanged.
pub fn map_storage_error(err: StorageError) -> StorageError {
    match err {
        StorageError::Backend(BackendError::Sql { number, message }) => match number {
            sql_error_codes::NOT_FOUND => ResourceError::NotFound { message }.into(),
            sql_error_codes::METHOD_NOT_ALLOWED => {
                ResourceError::MethodNotAllowed { message }.into()
            }
            sql_error_codes::PRECONDITION_FAILED => {
                ConcurrencyError::PreconditionFailed { message }.into()
            }
            _ => {
                tracing::error!("Unhandled sql error {}: {}", number, message);
                BackendError::Sql { number, message }.into()
            }
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sql_error(number: i32) -> StorageError {
        BackendError::Sql {
            number,
            message: "boom".to_string(),
        }
        .into()
    }

    #[test]
    fn test_search_error_display() {
        let err = SearchError::InvalidContinuationToken {
            token: "abc".to_string(),
        };
        assert_eq!(err.to_string(), "invalid continuation token: abc");
    }

    #[test]
    fn test_query_error_display() {
        let err = QueryError::UnexpectedTableExpressionKind {
            kind: TableExpressionKind::Top,
            context: "predecessor lookup",
        };
        assert_eq!(
            err.to_string(),
            "unexpected table expression kind Top in predecessor lookup"
        );
    }

    #[test]
    fn test_user_error_classification() {
        let err: StorageError = SearchError::InvalidRequest {
            message: "bad".to_string(),
        }
        .into();
        assert!(err.is_user_error());

        let err: StorageError = QueryError::TopLevelOr.into();
        assert!(!err.is_user_error());
    }

    #[test]
    fn test_map_known_codes() {
        assert!(matches!(
            map_storage_error(sql_error(50404)),
            StorageError::Resource(ResourceError::NotFound { .. })
        ));
        assert!(matches!(
            map_storage_error(sql_error(50405)),
            StorageError::Resource(ResourceError::MethodNotAllowed { .. })
        ));
        assert!(matches!(
            map_storage_error(sql_error(50412)),
            StorageError::Concurrency(ConcurrencyError::PreconditionFailed { .. })
        ));
    }

    #[test]
    fn test_map_unknown_code_is_unchanged() {
        match map_storage_error(sql_error(1205)) {
            StorageError::Backend(BackendError::Sql { number, message }) => {
                assert_eq!(number, 1205);
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        assert!(matches!(
            map_storage_error(BackendError::Cancelled.into()),
            StorageError::Backend(BackendError::Cancelled)
        ));
    }
}
