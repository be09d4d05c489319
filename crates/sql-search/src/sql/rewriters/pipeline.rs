//! The fixed sequence of rewrite passes.

use crate::error::StorageResult;
use crate::expression::ExprRef;
use crate::sql::root::SqlRootExpression;

use super::{
    ChainFlatteningRewriter, DateTimeBoundedRangeRewriter, DateTimeEqualityRewriter,
    DenormalizedPredicateRewriter, ExpressionRewriter, FlatteningRewriter,
    IncludeDenormalizedRewriter,
    IncludeRewriter, LastUpdatedToResourceSurrogateIdRewriter, MissingSearchParamRewriter,
    NormalizedPredicateReorderer, NumericRangeRewriter, RewriteContext, RootRewriter,
    StringOverflowRewriter, TopRewriter, partition,
};

/// Runs the rewrite passes in order, from a search expression to the
/// [`SqlRootExpression`] the query generator renders.
///
/// The passes are stateless; one pipeline can serve concurrent searches.
pub struct RewritePipeline {
    expression_passes: Vec<Box<dyn ExpressionRewriter>>,
    root_passes: Vec<Box<dyn RootRewriter>>,
}

impl Default for RewritePipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl RewritePipeline {
    /// Creates the pipeline with the standard pass order.
    pub fn new() -> Self {
        Self {
            expression_passes: vec![
                Box::new(LastUpdatedToResourceSurrogateIdRewriter),
                Box::new(DateTimeEqualityRewriter),
                Box::new(FlatteningRewriter),
            ],
            root_passes: vec![
                Box::new(DenormalizedPredicateRewriter),
                Box::new(NormalizedPredicateReorderer),
                Box::new(ChainFlatteningRewriter),
                Box::new(DateTimeBoundedRangeRewriter),
                Box::new(StringOverflowRewriter),
                Box::new(NumericRangeRewriter),
                Box::new(MissingSearchParamRewriter),
                Box::new(IncludeDenormalizedRewriter),
                Box::new(TopRewriter),
                Box::new(IncludeRewriter),
            ],
        }
    }

    /// Rewrites `expression` into a partitioned root.
    ///
    /// No expression yields an empty root: a scan of the resource table.
    pub fn rewrite(
        &self,
        expression: Option<&ExprRef>,
        context: &RewriteContext,
    ) -> StorageResult<SqlRootExpression> {
        let mut expression = expression.cloned();

        if let Some(current) = expression.as_mut() {
            for pass in &self.expression_passes {
                if let Some(rewritten) = pass.rewrite(current)? {
                    tracing::trace!(
                        pass = pass.name(),
                        expression = %rewritten,
                        "rewrote expression"
                    );
                    *current = rewritten;
                }
            }
        }

        let mut root = partition(expression.as_ref())?;
        tracing::trace!(root = %root, "partitioned expression");

        for pass in &self.root_passes {
            if let Some(rewritten) = pass.rewrite_root(&root, context)? {
                tracing::trace!(pass = pass.name(), root = %rewritten, "rewrote root");
                root = rewritten;
            }
        }

        tracing::debug!(root = %root, "search expression rewritten");
        Ok(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::{Expression, FieldName, SearchParamType, SearchParameterInfo};
    use crate::sql::root::TableExpressionKind;

    fn context(count_only: bool) -> RewriteContext {
        RewriteContext {
            count_only,
            max_item_count: 10,
        }
    }

    fn code_eq(value: &str) -> ExprRef {
        Expression::search_parameter(
            SearchParameterInfo::new("code", "http://example.org/code", SearchParamType::Token),
            Expression::string_equals(FieldName::TokenCode, value),
        )
    }

    #[test]
    fn test_single_parameter() {
        let root = RewritePipeline::new()
            .rewrite(Some(&code_eq("x")), &context(false))
            .unwrap();
        assert_eq!(
            root.kinds(),
            vec![TableExpressionKind::Normal, TableExpressionKind::Top]
        );
    }

    #[test]
    fn test_missing_parameter() {
        let missing = Expression::missing_search_parameter(
            SearchParameterInfo::new("name", "http://example.org/name", SearchParamType::String),
            true,
        );
        let root = RewritePipeline::new()
            .rewrite(Some(&missing), &context(true))
            .unwrap();
        assert_eq!(
            root.kinds(),
            vec![TableExpressionKind::All, TableExpressionKind::NotExists]
        );
    }

    #[test]
    fn test_include_with_match() {
        let expr = Expression::and(vec![
            Expression::include("Observation", None, None, true, false),
            code_eq("x"),
        ]);
        let root = RewritePipeline::new()
            .rewrite(Some(&expr), &context(false))
            .unwrap();
        assert_eq!(
            root.kinds(),
            vec![
                TableExpressionKind::Normal,
                TableExpressionKind::Top,
                TableExpressionKind::Include,
                TableExpressionKind::IncludeUnionAll,
            ]
        );
    }

    #[test]
    fn test_empty_expression() {
        let root = RewritePipeline::new().rewrite(None, &context(true)).unwrap();
        assert!(root.table_expressions().is_empty());
        assert!(root.denormalized_expressions().is_empty());
    }
}
