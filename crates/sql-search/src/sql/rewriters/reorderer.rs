//! Orders table expressions by expected selectivity.

use crate::error::StorageResult;
use crate::sql::root::{SqlRootExpression, TableExpression};

use super::{RewriteContext, RootRewriter};

/// Stably moves reference and compartment table expressions after the
/// others. Relative order within each group is kept.
#[derive(Debug, Default, Clone, Copy)]
pub struct NormalizedPredicateReorderer;

impl RootRewriter for NormalizedPredicateReorderer {
    fn name(&self) -> &'static str {
        "normalized predicate reorderer"
    }

    fn rewrite_root(
        &self,
        root: &SqlRootExpression,
        _context: &RewriteContext,
    ) -> StorageResult<Option<SqlRootExpression>> {
        let tables = root.table_expressions();
        if tables.len() <= 1 {
            return Ok(None);
        }

        let mut reordered = tables.to_vec();
        reordered.sort_by_key(is_reference_bound);
        if reordered == tables {
            return Ok(None);
        }

        Ok(Some(SqlRootExpression::new(
            reordered,
            root.denormalized_expressions().to_vec(),
        )))
    }
}

fn is_reference_bound(table: &TableExpression) -> bool {
    table
        .query_generator()
        .is_some_and(|generator| generator.is_reference_bound())
}
