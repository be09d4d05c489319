//! Matching of string and token values longer than their indexed columns.

use crate::error::StorageResult;
use crate::expression::{ExprRef, Expression, FieldName, StringOperator};
use crate::sql::root::{SqlRootExpression, TableExpressionKind};
use crate::sql::schema::{STRING_TEXT_MAX_LENGTH, TOKEN_CODE_MAX_LENGTH};

use super::{ExpressionRewriter, RewriteContext, RootRewriter, rewrite_children};

/// Follows every table expression whose predicate may match text beyond the
/// indexed column with a `Concatenation` copy that matches the overflow
/// column instead. The generator unions the two.
///
/// Indexed string columns hold the first 256 characters and token codes the
/// first 128; longer values are kept whole in the overflow column.
#[derive(Debug, Default, Clone, Copy)]
pub struct StringOverflowRewriter;

impl RootRewriter for StringOverflowRewriter {
    fn name(&self) -> &'static str {
        "string overflow"
    }

    fn rewrite_root(
        &self,
        root: &SqlRootExpression,
        _context: &RewriteContext,
    ) -> StorageResult<Option<SqlRootExpression>> {
        let tables = root.table_expressions();
        let mut rewritten = None;

        for (i, table) in tables.iter().enumerate() {
            let overflow = match (table.kind(), table.normalized_predicate()) {
                (TableExpressionKind::Normal, Some(predicate)) => {
                    OverflowFieldRewriter.rewrite(predicate)?
                }
                _ => None,
            };

            match overflow {
                Some(predicate) => {
                    let list = rewritten.get_or_insert_with(|| tables[..i].to_vec());
                    list.push(table.clone());
                    list.push(
                        table
                            .with_normalized_predicate(Some(predicate))?
                            .with_kind(TableExpressionKind::Concatenation),
                    );
                }
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
}

/// Moves string leaves that may need the full value onto the overflow field.
struct OverflowFieldRewriter;

impl ExpressionRewriter for OverflowFieldRewriter {
    fn name(&self) -> &'static str {
        "string overflow field"
    }

    fn rewrite(&self, expression: &ExprRef) -> StorageResult<Option<ExprRef>> {
        match expression.as_ref() {
            Expression::String {
                op,
                field,
                component_index,
                value,
                ignore_case,
            } => {
                let overflow_field = match field {
                    FieldName::String
                        if value.chars().count() > STRING_TEXT_MAX_LENGTH
                            || matches!(op, StringOperator::Contains | StringOperator::EndsWith) =>
                    {
                        FieldName::TextOverflow
                    }
                    FieldName::TokenCode if value.chars().count() > TOKEN_CODE_MAX_LENGTH => {
                        FieldName::TokenCodeOverflow
                    }
                    _ => return Ok(None),
                };
                Ok(Some(Expression::string(
                    *op,
                    overflow_field,
                    *component_index,
                    value.clone(),
                    *ignore_case,
                )))
            }
            _ => rewrite_children(self, expression),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::{SearchParamType, SearchParameterInfo};
    use crate::sql::rewriters::partition;

    fn context() -> RewriteContext {
        RewriteContext {
            count_only: false,
            max_item_count: 10,
        }
    }

    fn name(op: StringOperator, value: &str) -> ExprRef {
        Expression::search_parameter(
            SearchParameterInfo::new("name", "http://example.org/name", SearchParamType::String),
            Expression::string(op, FieldName::String, None, value, true),
        )
    }

    #[test]
    fn test_long_value_adds_concatenation() {
        let long = "a".repeat(STRING_TEXT_MAX_LENGTH + 1);
        let root = partition(Some(&name(StringOperator::Equals, &long))).unwrap();

        let rewritten = StringOverflowRewriter
            .rewrite_root(&root, &context())
            .unwrap()
            .unwrap();
        assert_eq!(
            rewritten.kinds(),
            vec![TableExpressionKind::Normal, TableExpressionKind::Concatenation]
        );
        assert!(
            rewritten.table_expressions()[1]
                .normalized_predicate()
                .unwrap()
                .to_string()
                .contains("TextOverflow")
        );
    }

    #[test]
    fn test_contains_always_checks_overflow() {
        let root = partition(Some(&name(StringOperator::Contains, "abc"))).unwrap();
        let rewritten = StringOverflowRewriter
            .rewrite_root(&root, &context())
            .unwrap()
            .unwrap();
        assert_eq!(rewritten.table_expressions().len(), 2);
    }

    #[test]
    fn test_short_prefix_is_unchanged() {
        let root = partition(Some(&name(StringOperator::StartsWith, "abc"))).unwrap();
        assert!(
            StringOverflowRewriter
                .rewrite_root(&root, &context())
                .unwrap()
                .is_none()
        );
    }
}
