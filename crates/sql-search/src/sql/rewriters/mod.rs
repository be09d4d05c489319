//! Rewrite passes from a search expression to a [`SqlRootExpression`].
//!
//! The first passes work on the bare expression tree ([`ExpressionRewriter`]).
//! The partitioner then splits the tree into table expressions, and every
//! later pass works on the partitioned root ([`RootRewriter`]).
//!
//! A rewriter returns `Ok(None)` when it leaves its input unchanged, so
//! unchanged subtrees keep sharing their nodes with the input.

mod chain_flattening;
mod date_time_bounded_range;
mod date_time_equality;
mod denormalized_predicate;
mod flattening;
mod include;
mod include_denormalized;
mod last_updated;
mod missing_search_param;
mod numeric_range;
mod partitioner;
mod pipeline;
mod reorderer;
mod string_overflow;
mod top;

pub use chain_flattening::ChainFlatteningRewriter;
pub use date_time_bounded_range::DateTimeBoundedRangeRewriter;
pub use date_time_equality::DateTimeEqualityRewriter;
pub use denormalized_predicate::DenormalizedPredicateRewriter;
pub use flattening::FlatteningRewriter;
pub use include::IncludeRewriter;
pub use include_denormalized::IncludeDenormalizedRewriter;
pub use last_updated::LastUpdatedToResourceSurrogateIdRewriter;
pub use missing_search_param::MissingSearchParamRewriter;
pub use numeric_range::NumericRangeRewriter;
pub use partitioner::partition;
pub use pipeline::RewritePipeline;
pub use reorderer::NormalizedPredicateReorderer;
pub use string_overflow::StringOverflowRewriter;
pub use top::TopRewriter;

use std::sync::Arc;

use crate::error::StorageResult;
use crate::expression::{ExprRef, Expression};

use super::root::{SqlRootExpression, TableExpression, TableExpressionKind};

/// Request properties the root passes depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewriteContext {
    /// Only the number of matches is wanted.
    pub count_only: bool,
    /// Page size.
    pub max_item_count: usize,
}

/// A pass over the bare expression tree.
pub trait ExpressionRewriter: Send + Sync {
    /// Name used in diagnostics.
    fn name(&self) -> &'static str;

    /// Rewrites `expression`, returning `None` if nothing changed.
    fn rewrite(&self, expression: &ExprRef) -> StorageResult<Option<ExprRef>>;
}

/// A pass over the partitioned root.
pub trait RootRewriter: Send + Sync {
    /// Name used in diagnostics.
    fn name(&self) -> &'static str;

    /// Rewrites `root`, returning `None` if nothing changed.
    fn rewrite_root(
        &self,
        root: &SqlRootExpression,
        context: &RewriteContext,
    ) -> StorageResult<Option<SqlRootExpression>>;
}

/// Applies `rewriter` to the direct children of `expression`, rebuilding the
/// node only if a child changed.
pub(crate) fn rewrite_children<R: ExpressionRewriter + ?Sized>(
    rewriter: &R,
    expression: &ExprRef,
) -> StorageResult<Option<ExprRef>> {
    match expression.as_ref() {
        Expression::SearchParameter {
            parameter,
            expression: inner,
        } => Ok(rewriter
            .rewrite(inner)?
            .map(|inner| Expression::search_parameter(parameter.clone(), inner))),
        Expression::Chained {
            reversed,
            source_type,
            reference_parameter,
            target_type,
            expression: inner,
        } => Ok(rewriter.rewrite(inner)?.map(|inner| {
            Arc::new(Expression::Chained {
                reversed: *reversed,
                source_type: source_type.clone(),
                reference_parameter: reference_parameter.clone(),
                target_type: target_type.clone(),
                expression: inner,
            })
        })),
        Expression::Multiary { op, expressions } => Ok(rewrite_all(rewriter, expressions)?
            .map(|expressions| Expression::multiary(*op, expressions))),
        _ => Ok(None),
    }
}

/// Applies `rewriter` to each of `expressions`, allocating a new list only
/// if one of them changed.
pub(crate) fn rewrite_all<R: ExpressionRewriter + ?Sized>(
    rewriter: &R,
    expressions: &[ExprRef],
) -> StorageResult<Option<Vec<ExprRef>>> {
    let mut rewritten: Option<Vec<ExprRef>> = None;
    for (i, expression) in expressions.iter().enumerate() {
        match rewriter.rewrite(expression)? {
            Some(new) => rewritten
                .get_or_insert_with(|| expressions[..i].to_vec())
                .push(new),
            None => {
                if let Some(list) = rewritten.as_mut() {
                    list.push(expression.clone());
                }
            }
        }
    }
    Ok(rewritten)
}

/// Applies `rewriter` to the normalized predicate of every table expression
/// except chain anchors and includes, whose predicates have already been
/// promoted to table expressions of their own.
pub(crate) fn rewrite_table_predicates<R: ExpressionRewriter + ?Sized>(
    rewriter: &R,
    root: &SqlRootExpression,
) -> StorageResult<Option<SqlRootExpression>> {
    let tables = root.table_expressions();
    let mut rewritten: Option<Vec<TableExpression>> = None;

    for (i, table) in tables.iter().enumerate() {
        let new = match table.normalized_predicate() {
            Some(predicate) if !is_chain_or_include(table) => rewriter
                .rewrite(predicate)?
                .map(|p| table.with_normalized_predicate(Some(p)))
                .transpose()?,
            _ => None,
        };

        match new {
            Some(new) => rewritten.get_or_insert_with(|| tables[..i].to_vec()).push(new),
            None => {
                if let Some(list) = rewritten.as_mut() {
                    list.push(table.clone());
                }
            }
        }
    }

    Ok(rewritten.map(|tables| {
        SqlRootExpression::new(tables, root.denormalized_expressions().to_vec())
    }))
}

pub(crate) fn is_chain_or_include(table: &TableExpression) -> bool {
    matches!(
        table.kind(),
        TableExpressionKind::Chain | TableExpressionKind::Include
    )
}

/// Conjoins `expressions`; a single expression is returned as is.
pub(crate) fn conjoin(mut expressions: Vec<ExprRef>) -> Option<ExprRef> {
    match expressions.len() {
        0 => None,
        1 => expressions.pop(),
        _ => Some(Expression::and(expressions)),
    }
}
