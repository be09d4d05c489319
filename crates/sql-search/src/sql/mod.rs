//! Compilation of search expressions into T-SQL.
//!
//! A search expression goes through the [`RewritePipeline`], which partitions
//! it into a [`SqlRootExpression`] of table expressions. The
//! [`SqlQueryGenerator`] then renders the root as a chain of common table
//! expressions plus a final select over the resource table.

pub mod generators;
pub mod model;
pub mod parameters;
pub mod query_generator;
pub mod rewriters;
pub mod root;
pub mod schema;
pub mod writer;

pub use generators::{PredicateRenderer, QueryGenerator};
pub use model::{InMemorySearchModel, SearchModel};
pub use parameters::{SqlParam, SqlParameter, SqlQueryParameterManager};
pub use query_generator::{SqlCommand, SqlQueryGenerator};
pub use rewriters::{RewriteContext, RewritePipeline};
pub use root::{SqlRootExpression, TableExpression, TableExpressionKind};
pub use writer::SqlWriter;
