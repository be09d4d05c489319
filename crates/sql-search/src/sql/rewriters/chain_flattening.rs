//! Unrolls chained predicates into one table expression per hop.

use crate::error::{QueryError, StorageResult};
use crate::expression::{ExprRef, Expression, MultiaryOperator};
use crate::sql::generators::{QueryGenerator, normalized_generator};
use crate::sql::root::{SqlRootExpression, TableExpression, TableExpressionKind};

use super::{RewriteContext, RootRewriter, conjoin};

const NAME: &str = "chain flattening";

/// Replaces every chain table expression by a run of `Chain` table
/// expressions, one per reference hop with increasing chain level, followed by
/// the table expressions of the innermost predicate at the deepest level.
///
/// An innermost predicate without a search parameter table becomes the
/// denormalized predicate of the last hop.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChainFlatteningRewriter;

impl RootRewriter for ChainFlatteningRewriter {
    fn name(&self) -> &'static str {
        NAME
    }

    fn rewrite_root(
        &self,
        root: &SqlRootExpression,
        _context: &RewriteContext,
    ) -> StorageResult<Option<SqlRootExpression>> {
        let tables = root.table_expressions();
        if !tables.iter().any(|t| t.kind() == TableExpressionKind::Chain) {
            return Ok(None);
        }

        let mut flattened = Vec::with_capacity(tables.len() + 1);
        for table in tables {
            match (table.kind(), table.normalized_predicate()) {
                (TableExpressionKind::Chain, Some(predicate)) => {
                    flattened.extend(flatten(predicate, Some(table), table.chain_level())?)
                }
                _ => flattened.push(table.clone()),
            }
        }

        Ok(Some(SqlRootExpression::new(
            flattened,
            root.denormalized_expressions().to_vec(),
        )))
    }
}

fn flatten(
    chain: &ExprRef,
    containing: Option<&TableExpression>,
    level: usize,
) -> StorageResult<Vec<TableExpression>> {
    let Expression::Chained {
        expression: inner, ..
    } = chain.as_ref()
    else {
        return Err(unsupported(chain));
    };

    if let Expression::Chained { .. } = inner.as_ref() {
        let anchor = match containing {
            Some(table) => table.clone(),
            None => anchor(chain, None, level)?,
        };
        let mut tables = vec![anchor];
        tables.extend(flatten(inner, None, level + 1)?);
        return Ok(tables);
    }

    let children = match inner.as_ref() {
        Expression::Multiary {
            op: MultiaryOperator::And,
            expressions,
        } => expressions.as_slice(),
        _ => std::slice::from_ref(inner),
    };

    let mut normal = Vec::new();
    let mut denormalized = Vec::new();
    for child in children {
        match normalized_generator(child) {
            Some(QueryGenerator::ChainAnchor | QueryGenerator::Include) => {
                return Err(unsupported(child));
            }
            Some(generator) => normal.push(TableExpression::new(
                TableExpressionKind::Normal,
                Some(generator),
                Some(child.clone()),
                None,
                level,
            )?),
            None => denormalized.push(child.clone()),
        }
    }

    let denormalized = conjoin(denormalized);
    let anchor = match containing {
        Some(table) if denormalized.is_none() => table.clone(),
        _ => anchor(chain, denormalized, level)?,
    };

    let mut tables = Vec::with_capacity(normal.len() + 1);
    tables.push(anchor);
    tables.extend(normal);
    Ok(tables)
}

fn anchor(
    chain: &ExprRef,
    denormalized: Option<ExprRef>,
    level: usize,
) -> StorageResult<TableExpression> {
    Ok(TableExpression::new(
        TableExpressionKind::Chain,
        Some(QueryGenerator::ChainAnchor),
        Some(chain.clone()),
        denormalized,
        level,
    )?)
}

fn unsupported(expression: &ExprRef) -> crate::error::StorageError {
    QueryError::UnsupportedExpression {
        pass: NAME,
        expression: expression.to_string(),
    }
    .into()
}
