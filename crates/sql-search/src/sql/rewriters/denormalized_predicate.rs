//! Pushes resource type and surrogate id predicates into the table expressions.

use crate::error::StorageResult;
use crate::expression::parameter::{RESOURCE_SURROGATE_ID, RESOURCE_TYPE};
use crate::expression::{ExprRef, Expression};
use crate::sql::root::SqlRootExpression;

use super::{RewriteContext, RootRewriter, conjoin, is_chain_or_include};

/// Moves `_type` and `_resourceSurrogateId` predicates from the resource
/// table onto every search parameter table expression, so each table scan is
/// restricted as early as possible. Chain and include table expressions are
/// left alone; when no other table expression exists the predicates stay on
/// the root.
#[derive(Debug, Default, Clone, Copy)]
pub struct DenormalizedPredicateRewriter;

impl RootRewriter for DenormalizedPredicateRewriter {
    fn name(&self) -> &'static str {
        "denormalized predicate"
    }

    fn rewrite_root(
        &self,
        root: &SqlRootExpression,
        _context: &RewriteContext,
    ) -> StorageResult<Option<SqlRootExpression>> {
        let tables = root.table_expressions();
        if root.denormalized_expressions().is_empty() || tables.iter().all(is_chain_or_include) {
            return Ok(None);
        }

        let (extracted, remaining): (Vec<ExprRef>, Vec<ExprRef>) = root
            .denormalized_expressions()
            .iter()
            .cloned()
            .partition(|e| is_promotable(e));

        let Some(extracted) = conjoin(extracted) else {
            return Ok(None);
        };

        let tables = tables
            .iter()
            .map(|table| {
                if is_chain_or_include(table) {
                    return table.clone();
                }
                let predicate = match table.denormalized_predicate() {
                    Some(existing) => Expression::and(vec![existing.clone(), extracted.clone()]),
                    None => extracted.clone(),
                };
                table.with_denormalized_predicate(Some(predicate))
            })
            .collect();

        Ok(Some(SqlRootExpression::new(tables, remaining)))
    }
}

fn is_promotable(expression: &Expression) -> bool {
    matches!(
        expression,
        Expression::SearchParameter { parameter, .. }
            if parameter.name == RESOURCE_SURROGATE_ID || parameter.name == RESOURCE_TYPE
    )
}
