//! Splits a search expression into table expressions and resource-table predicates.

use crate::error::{QueryError, StorageResult};
use crate::expression::{ExprRef, Expression, MultiaryOperator};
use crate::sql::generators::{QueryGenerator, normalized_generator};
use crate::sql::root::{SqlRootExpression, TableExpression, TableExpressionKind};

/// Partitions `expression` into a [`SqlRootExpression`].
///
/// The top-level node is either an AND of predicates or a single predicate.
/// Each predicate bound to a search parameter table becomes a table
/// expression; the rest stay as predicates over the resource table. Both
/// lists keep the input order.
pub fn partition(expression: Option<&ExprRef>) -> StorageResult<SqlRootExpression> {
    let Some(expression) = expression else {
        return Ok(SqlRootExpression::default());
    };

    let predicates = match expression.as_ref() {
        Expression::Multiary {
            op: MultiaryOperator::And,
            expressions,
        } => expressions.as_slice(),
        Expression::Multiary {
            op: MultiaryOperator::Or,
            ..
        } => return Err(QueryError::TopLevelOr.into()),
        _ => std::slice::from_ref(expression),
    };

    let mut table_expressions = Vec::new();
    let mut denormalized_expressions = Vec::new();

    for predicate in predicates {
        match normalized_generator(predicate) {
            Some(QueryGenerator::ChainAnchor) => table_expressions.push(TableExpression::new(
                TableExpressionKind::Chain,
                Some(QueryGenerator::ChainAnchor),
                Some(predicate.clone()),
                None,
                1,
            )?),
            Some(QueryGenerator::Include) => table_expressions.push(TableExpression::new(
                TableExpressionKind::Include,
                Some(QueryGenerator::Include),
                Some(predicate.clone()),
                None,
                0,
            )?),
            Some(generator) => table_expressions.push(TableExpression::new(
                TableExpressionKind::Normal,
                Some(generator),
                Some(predicate.clone()),
                None,
                0,
            )?),
            None => denormalized_expressions.push(predicate.clone()),
        }
    }

    Ok(SqlRootExpression::new(
        table_expressions,
        denormalized_expressions,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::{FieldName, SearchParamType, SearchParameterInfo};

    fn code_eq(value: &str) -> ExprRef {
        Expression::search_parameter(
            SearchParameterInfo::new("code", "http://example.org/code", SearchParamType::Token),
            Expression::string_equals(FieldName::TokenCode, value),
        )
    }

    fn id_eq(value: &str) -> ExprRef {
        Expression::search_parameter(
            SearchParameterInfo::new("_id", "http://example.org/id", SearchParamType::Token),
            Expression::string_equals(FieldName::TokenCode, value),
        )
    }

    #[test]
    fn test_single_predicate_becomes_one_normal_table() {
        let root = partition(Some(&code_eq("x"))).unwrap();
        assert_eq!(root.kinds(), vec![TableExpressionKind::Normal]);
        assert!(root.denormalized_expressions().is_empty());
        assert_eq!(
            root.table_expressions()[0].query_generator(),
            Some(QueryGenerator::Token)
        );
    }

    #[test]
    fn test_resource_level_predicates_stay_denormalized_in_order() {
        let expr = Expression::and(vec![id_eq("a"), code_eq("x"), id_eq("b")]);
        let root = partition(Some(&expr)).unwrap();

        assert_eq!(root.kinds(), vec![TableExpressionKind::Normal]);
        assert_eq!(root.denormalized_expressions().len(), 2);
        assert!(root.denormalized_expressions()[0].to_string().contains("'a'"));
        assert!(root.denormalized_expressions()[1].to_string().contains("'b'"));
    }

    #[test]
    fn test_chain_and_include_kinds() {
        let chain = Expression::chained(
            "Observation",
            SearchParameterInfo::new(
                "subject",
                "http://example.org/subject",
                SearchParamType::Reference,
            ),
            "Patient",
            false,
            code_eq("x"),
        );
        let include = Expression::include("Observation", None, None, true, false);
        let root = partition(Some(&Expression::and(vec![chain, include]))).unwrap();

        assert_eq!(
            root.kinds(),
            vec![TableExpressionKind::Chain, TableExpressionKind::Include]
        );
        assert_eq!(root.table_expressions()[0].chain_level(), 1);
        assert_eq!(root.table_expressions()[1].chain_level(), 0);
    }

    #[test]
    fn test_top_level_or_is_a_defect() {
        let expr = Expression::or(vec![code_eq("x"), code_eq("y")]);
        let err = partition(Some(&expr)).unwrap_err();
        assert!(matches!(
            err,
            crate::error::StorageError::Query(QueryError::TopLevelOr)
        ));
    }

    #[test]
    fn test_no_expression_is_empty_root() {
        assert_eq!(partition(None).unwrap(), SqlRootExpression::default());
    }
}
