//! `:missing=true` as the absence of any indexed value.

use crate::error::StorageResult;
use crate::expression::{ExprRef, Expression};
use crate::sql::root::{SqlRootExpression, TableExpression, TableExpressionKind};

use super::{ExpressionRewriter, RewriteContext, RootRewriter, rewrite_children};

/// Turns a table expression testing `:missing=true` into a `NotExists` table
/// expression over the positive predicate (`:missing=false`).
///
/// `NotExists` restricts its predecessor, so when there is none an `All`
/// seed over every current resource is inserted first.
#[derive(Debug, Default, Clone, Copy)]
pub struct MissingSearchParamRewriter;

impl RootRewriter for MissingSearchParamRewriter {
    fn name(&self) -> &'static str {
        "missing search param"
    }

    fn rewrite_root(
        &self,
        root: &SqlRootExpression,
        _context: &RewriteContext,
    ) -> StorageResult<Option<SqlRootExpression>> {
        let tables = root.table_expressions();
        let mut rewritten: Option<Vec<TableExpression>> = None;

        for (i, table) in tables.iter().enumerate() {
            let predicate = match (table.kind(), table.normalized_predicate()) {
                (TableExpressionKind::Normal, Some(p)) if tests_missing(p) => p,
                _ => {
                    if let Some(list) = rewritten.as_mut() {
                        list.push(table.clone());
                    }
                    continue;
                }
            };

            let list = rewritten.get_or_insert_with(|| tables[..i].to_vec());
            if list.is_empty() {
                list.push(TableExpression::all(
                    table.query_generator(),
                    table.denormalized_predicate().cloned(),
                ));
            }

            let present = PresentRewriter
                .rewrite(predicate)?
                .unwrap_or_else(|| predicate.clone());
            list.push(
                table
                    .with_normalized_predicate(Some(present))?
                    .with_kind(TableExpressionKind::NotExists),
            );
        }

        Ok(rewritten.map(|tables| {
            SqlRootExpression::new(tables, root.denormalized_expressions().to_vec())
        }))
    }
}

fn tests_missing(expression: &Expression) -> bool {
    expression.any(&|node| {
        matches!(
            node,
            Expression::MissingSearchParameter {
                is_missing: true,
                ..
            }
        )
    })
}

/// `:missing=true` to `:missing=false`.
struct PresentRewriter;

impl ExpressionRewriter for PresentRewriter {
    fn name(&self) -> &'static str {
        "missing search param negation"
    }

    fn rewrite(&self, expression: &ExprRef) -> StorageResult<Option<ExprRef>> {
        match expression.as_ref() {
            Expression::MissingSearchParameter {
                parameter,
                is_missing: true,
            } => Ok(Some(Expression::missing_search_parameter(
                parameter.clone(),
                false,
            ))),
            _ => rewrite_children(self, expression),
        }
    }
}
