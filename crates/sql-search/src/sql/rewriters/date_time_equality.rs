//! Date-time equality becomes a one-millisecond range.

use chrono::TimeDelta;

use crate::error::StorageResult;
use crate::expression::{BinaryOperator, ExprRef, Expression, FieldName, LiteralValue};
use crate::types::surrogate_id::truncate_to_millisecond;

use super::{ExpressionRewriter, rewrite_children};

/// Expands `field = t` over a date-time column into `field >= t AND field < t + 1ms`,
/// since stored instants are only precise to the millisecond.
#[derive(Debug, Default, Clone, Copy)]
pub struct DateTimeEqualityRewriter;

impl ExpressionRewriter for DateTimeEqualityRewriter {
    fn name(&self) -> &'static str {
        "date time equality"
    }

    fn rewrite(&self, expression: &ExprRef) -> StorageResult<Option<ExprRef>> {
        match expression.as_ref() {
            Expression::Binary {
                field: field @ (FieldName::DateTimeStart | FieldName::DateTimeEnd),
                component_index,
                op: BinaryOperator::Equal,
                value: LiteralValue::DateTime(value),
            } => {
                let start = truncate_to_millisecond(*value);
                let end = start + TimeDelta::milliseconds(1);
                Ok(Some(Expression::and(vec![
                    Expression::binary(
                        BinaryOperator::GreaterThanOrEqual,
                        *field,
                        *component_index,
                        start,
                    ),
                    Expression::binary(BinaryOperator::LessThan, *field, *component_index, end),
                ])))
            }
            _ => rewrite_children(self, expression),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_equality_becomes_half_open_range() {
        let t = Utc.with_ymd_and_hms(2021, 3, 4, 5, 6, 7).unwrap() + TimeDelta::microseconds(2500);
        let expr = Expression::equal(FieldName::DateTimeStart, t);

        let rewritten = DateTimeEqualityRewriter.rewrite(&expr).unwrap().unwrap();
        assert_eq!(
            rewritten.to_string(),
            "(And (FieldGreaterThanOrEqual DateTimeStart 2021-03-04T05:06:07.002Z) \
             (FieldLessThan DateTimeStart 2021-03-04T05:06:07.003Z))"
        );
    }

    #[test]
    fn test_component_index_is_kept() {
        let t = Utc.with_ymd_and_hms(2021, 3, 4, 0, 0, 0).unwrap();
        let expr = Expression::binary(BinaryOperator::Equal, FieldName::DateTimeEnd, Some(1), t);

        let rewritten = DateTimeEqualityRewriter.rewrite(&expr).unwrap().unwrap();
        assert!(rewritten.to_string().contains("DateTimeEnd[1]"));
    }

    #[test]
    fn test_ranges_are_untouched() {
        let t = Utc.with_ymd_and_hms(2021, 3, 4, 0, 0, 0).unwrap();
        let expr = Expression::and(vec![
            Expression::greater_than(FieldName::DateTimeStart, t),
            Expression::equal(FieldName::Number, 5i64),
        ]);
        assert!(DateTimeEqualityRewriter.rewrite(&expr).unwrap().is_none());
    }
}
