//! Applies resource-table predicates before includes when nothing else matches.

use crate::error::StorageResult;
use crate::sql::root::{SqlRootExpression, TableExpression, TableExpressionKind};

use super::{RewriteContext, RootRewriter, conjoin};

/// When every table expression is an include, prepends an `All` table
/// expression carrying the resource-table predicates, so matches are computed
/// before they are expanded.
#[derive(Debug, Default, Clone, Copy)]
pub struct IncludeDenormalizedRewriter;

impl RootRewriter for IncludeDenormalizedRewriter {
    fn name(&self) -> &'static str {
        "include denormalized"
    }

    fn rewrite_root(
        &self,
        root: &SqlRootExpression,
        _context: &RewriteContext,
    ) -> StorageResult<Option<SqlRootExpression>> {
        let tables = root.table_expressions();
        if tables.is_empty()
            || !tables
                .iter()
                .all(|t| t.kind() == TableExpressionKind::Include)
        {
            return Ok(None);
        }

        let denormalized = conjoin(root.denormalized_expressions().to_vec());
        let mut rewritten = Vec::with_capacity(tables.len() + 1);
        rewritten.push(TableExpression::all(None, denormalized));
        rewritten.extend(tables.iter().cloned());

        Ok(Some(SqlRootExpression::with_table_expressions(rewritten)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::{Expression, FieldName, SearchParamType, SearchParameterInfo};
    use crate::sql::rewriters::partition;

    fn context() -> RewriteContext {
        RewriteContext {
            count_only: false,
            max_item_count: 10,
        }
    }

    #[test]
    fn test_include_only_gets_all_with_denormalized_predicates() {
        let expr = Expression::and(vec![
            Expression::search_parameter(
                SearchParameterInfo::new(
                    "_type",
                    "http://example.org/type",
                    SearchParamType::Token,
                ),
                Expression::string_equals(FieldName::TokenCode, "Observation"),
            ),
            Expression::include("Observation", None, None, true, false),
        ]);
        let root = partition(Some(&expr)).unwrap();

        let rewritten = IncludeDenormalizedRewriter
            .rewrite_root(&root, &context())
            .unwrap()
            .unwrap();

        assert_eq!(
            rewritten.kinds(),
            vec![TableExpressionKind::All, TableExpressionKind::Include]
        );
        assert!(rewritten.denormalized_expressions().is_empty());
        assert!(rewritten.table_expressions()[0].denormalized_predicate().is_some());
    }

    #[test]
    fn test_mixed_tables_are_untouched() {
        let expr = Expression::and(vec![
            Expression::compartment("Patient", "p1"),
            Expression::include("Observation", None, None, true, false),
        ]);
        let root = partition(Some(&expr)).unwrap();
        assert!(
            IncludeDenormalizedRewriter
                .rewrite_root(&root, &context())
                .unwrap()
                .is_none()
        );
    }
}
