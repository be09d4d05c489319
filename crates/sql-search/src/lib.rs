//! Helios FHIR Server SQL Search
//!
//! This crate compiles FHIR search expressions into T-SQL for the relational
//! resource store and runs them.
//!
//! # Architecture
//!
//! - [`expression`] - the search expression tree handed over by the request parser
//! - [`sql`] - the rewrite pipeline, the partitioned [`SqlRootExpression`](sql::SqlRootExpression)
//!   and the CTE query generator
//! - [`search`] - the [`SqlSearchService`] orchestrating compilation, execution,
//!   pagination and totals
//! - [`types`] - request and result types, and the surrogate id codec
//! - [`config`] - service configuration
//! - [`error`] - error types for all operations
//!
//! # Compiling a search
//!
//! ```
//! use helios_sql_search::expression::{
//!     Expression, FieldName, SearchParamType, SearchParameterInfo,
//! };
//! use helios_sql_search::sql::{
//!     InMemorySearchModel, RewriteContext, RewritePipeline, SqlQueryGenerator,
//! };
//!
//! let model = InMemorySearchModel::new();
//! model.add_search_param("http://hl7.org/fhir/SearchParameter/clinical-code", 8);
//!
//! let code = Expression::search_parameter(
//!     SearchParameterInfo::new(
//!         "code",
//!         "http://hl7.org/fhir/SearchParameter/clinical-code",
//!         SearchParamType::Token,
//!     ),
//!     Expression::string_equals(FieldName::TokenCode, "1234-5"),
//! );
//!
//! let context = RewriteContext { count_only: false, max_item_count: 10 };
//! let root = RewritePipeline::new().rewrite(Some(&code), &context).unwrap();
//! let command = SqlQueryGenerator::new(&model, context, false).generate(&root).unwrap();
//!
//! assert!(command.text.starts_with("WITH cte0 AS"));
//! assert_eq!(command.parameters.len(), 3);
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod error;
pub mod expression;
pub mod search;
pub mod sql;
pub mod types;

pub use config::SqlSearchConfig;
pub use error::{StorageError, StorageResult};
pub use search::{RawResourceStore, SqlCommandExecutor, SqlSearchService};
pub use sql::{SqlCommand, SqlRootExpression};
pub use types::{SearchOptions, SearchResult, TotalType};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
