//! Page limiting of the matched set.

use crate::error::StorageResult;
use crate::sql::root::{SqlRootExpression, TableExpression, TableExpressionKind};

use super::{RewriteContext, RootRewriter};

/// Appends a `Top` table expression that selects one page (plus one row, to
/// tell whether another page exists) of distinct matches. Count-only requests
/// and requests without table expressions are left alone.
#[derive(Debug, Default, Clone, Copy)]
pub struct TopRewriter;

impl RootRewriter for TopRewriter {
    fn name(&self) -> &'static str {
        "top"
    }

    fn rewrite_root(
        &self,
        root: &SqlRootExpression,
        context: &RewriteContext,
    ) -> StorageResult<Option<SqlRootExpression>> {
        if context.count_only || root.table_expressions().is_empty() {
            return Ok(None);
        }

        let mut tables = root.table_expressions().to_vec();
        tables.push(TableExpression::marker(TableExpressionKind::Top));
        Ok(Some(SqlRootExpression::new(
            tables,
            root.denormalized_expressions().to_vec(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::Expression;
    use crate::sql::rewriters::partition;

    #[test]
    fn test_top_is_appended_unless_counting() {
        let root = partition(Some(&Expression::compartment("Patient", "p1"))).unwrap();

        let paged = RewriteContext {
            count_only: false,
            max_item_count: 10,
        };
        let rewritten = TopRewriter.rewrite_root(&root, &paged).unwrap().unwrap();
        assert_eq!(
            rewritten.kinds(),
            vec![TableExpressionKind::Normal, TableExpressionKind::Top]
        );

        let counting = RewriteContext {
            count_only: true,
            ..paged
        };
        assert!(TopRewriter.rewrite_root(&root, &counting).unwrap().is_none());
    }

    #[test]
    fn test_no_tables_no_top() {
        let context = RewriteContext {
            count_only: false,
            max_item_count: 10,
        };
        assert!(
            TopRewriter
                .rewrite_root(&SqlRootExpression::default(), &context)
                .unwrap()
                .is_none()
        );
    }
}
