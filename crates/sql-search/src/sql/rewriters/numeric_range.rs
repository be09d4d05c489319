//! Number and quantity comparisons against the stored low/high range.

use rust_decimal::Decimal;

use crate::error::{QueryError, StorageResult};
use crate::expression::{BinaryOperator, ExprRef, Expression, FieldName, LiteralValue};
use crate::sql::root::SqlRootExpression;
use crate::sql::schema::{decimal_max, decimal_min};

use super::{
    ExpressionRewriter, RewriteContext, RootRewriter, rewrite_children, rewrite_table_predicates,
};

const NAME: &str = "numeric range";

/// Rewrites comparisons of a number or quantity into comparisons of the
/// `LowValue`/`HighValue` columns each stored value is indexed as.
///
/// | search   | rewritten                               |
/// |----------|-----------------------------------------|
/// | `> x`    | `High > x AND Low <= max`               |
/// | `>= x`   | `High >= x AND Low <= max`              |
/// | `< x`    | `Low < x AND High >= min`               |
/// | `<= x`   | `Low <= x AND High >= min`              |
/// | `= x`    | `Low >= x AND High <= x`                |
/// | `!= x`   | `Low < x OR High > x`                   |
#[derive(Debug, Default, Clone, Copy)]
pub struct NumericRangeRewriter;

impl ExpressionRewriter for NumericRangeRewriter {
    fn name(&self) -> &'static str {
        NAME
    }

    fn rewrite(&self, expression: &ExprRef) -> StorageResult<Option<ExprRef>> {
        let Expression::Binary {
            field,
            component_index,
            op,
            value,
        } = expression.as_ref()
        else {
            return rewrite_children(self, expression);
        };

        let (low, high) = match field {
            FieldName::Number => (FieldName::NumberLow, FieldName::NumberHigh),
            FieldName::Quantity => (FieldName::QuantityLow, FieldName::QuantityHigh),
            _ => return Ok(None),
        };

        let x = match value {
            LiteralValue::Decimal(d) => *d,
            LiteralValue::Integer(i) => Decimal::from(*i),
            _ => {
                return Err(QueryError::UnsupportedExpression {
                    pass: NAME,
                    expression: expression.to_string(),
                }
                .into());
            }
        };

        let ci = *component_index;
        let compare = |op, field, value: Decimal| Expression::binary(op, field, ci, value);

        use BinaryOperator::*;
        let rewritten = match op {
            GreaterThan | GreaterThanOrEqual => Expression::and(vec![
                compare(*op, high, x),
                compare(LessThanOrEqual, low, decimal_max()),
            ]),
            LessThan | LessThanOrEqual => Expression::and(vec![
                compare(*op, low, x),
                compare(GreaterThanOrEqual, high, decimal_min()),
            ]),
            Equal => Expression::and(vec![
                compare(GreaterThanOrEqual, low, x),
                compare(LessThanOrEqual, high, x),
            ]),
            NotEqual => {
                Expression::or(vec![compare(LessThan, low, x), compare(GreaterThan, high, x)])
            }
        };
        Ok(Some(rewritten))
    }
}

impl RootRewriter for NumericRangeRewriter {
    fn name(&self) -> &'static str {
        NAME
    }

    fn rewrite_root(
        &self,
        root: &SqlRootExpression,
        _context: &RewriteContext,
    ) -> StorageResult<Option<SqlRootExpression>> {
        rewrite_table_predicates(self, root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rewrite(expr: &ExprRef) -> String {
        ExpressionRewriter::rewrite(&NumericRangeRewriter, expr)
            .unwrap()
            .unwrap()
            .to_string()
    }

    #[test]
    fn test_greater_than_is_bounded_by_column_maximum() {
        let expr = Expression::greater_than(FieldName::Number, Decimal::new(5, 0));
        assert_eq!(
            rewrite(&expr),
            "(And (FieldGreaterThan NumberHigh 5) \
             (FieldLessThanOrEqual NumberLow 999999999999.999999))"
        );
    }

    #[test]
    fn test_equality_is_containment() {
        let expr = Expression::binary(BinaryOperator::Equal, FieldName::Quantity, Some(1), 3i64);
        assert_eq!(
            rewrite(&expr),
            "(And (FieldGreaterThanOrEqual QuantityLow[1] 3) \
             (FieldLessThanOrEqual QuantityHigh[1] 3))"
        );
    }

    #[test]
    fn test_not_equal_is_disjunction() {
        let expr = Expression::binary(
            BinaryOperator::NotEqual,
            FieldName::Number,
            None,
            Decimal::new(25, 1),
        );
        assert_eq!(
            rewrite(&expr),
            "(Or (FieldLessThan NumberLow 2.5) (FieldGreaterThan NumberHigh 2.5))"
        );
    }

    #[test]
    fn test_other_fields_are_untouched() {
        let expr = Expression::equal(FieldName::TokenCode, "x");
        assert!(
            ExpressionRewriter::rewrite(&NumericRangeRewriter, &expr)
                .unwrap()
                .is_none()
        );
    }
}
