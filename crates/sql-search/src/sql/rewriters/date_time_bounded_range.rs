//! Bounds open-ended date-time ranges by the column limits.

use chrono::{DateTime, Utc};

use crate::error::StorageResult;
use crate::expression::{
    BinaryOperator, ExprRef, Expression, FieldName, LiteralValue, MultiaryOperator,
};
use crate::sql::root::SqlRootExpression;
use crate::sql::schema::{datetime_max, datetime_min};

use super::{
    ExpressionRewriter, RewriteContext, RootRewriter, rewrite_children, rewrite_table_predicates,
};

/// Clamps date-time literals into the column's range and closes every
/// one-sided comparison with the opposite column limit, so each range over a
/// date-time column has both bounds within one conjunction.
#[derive(Debug, Default, Clone, Copy)]
pub struct DateTimeBoundedRangeRewriter;

impl ExpressionRewriter for DateTimeBoundedRangeRewriter {
    fn name(&self) -> &'static str {
        "date time bounded range"
    }

    fn rewrite(&self, expression: &ExprRef) -> StorageResult<Option<ExprRef>> {
        match expression.as_ref() {
            Expression::Binary { .. } if as_date_time_bound(expression).is_some() => {
                let group = self.bound_group(std::slice::from_ref(expression))?;
                Ok(group.map(|mut group| {
                    if group.len() == 1 {
                        group.remove(0)
                    } else {
                        Expression::and(group)
                    }
                }))
            }
            Expression::Multiary {
                op: MultiaryOperator::And,
                expressions,
            } => Ok(self.bound_group(expressions)?.map(Expression::and)),
            _ => rewrite_children(self, expression),
        }
    }
}

impl RootRewriter for DateTimeBoundedRangeRewriter {
    fn name(&self) -> &'static str {
        ExpressionRewriter::name(self)
    }

    fn rewrite_root(
        &self,
        root: &SqlRootExpression,
        _context: &RewriteContext,
    ) -> StorageResult<Option<SqlRootExpression>> {
        rewrite_table_predicates(self, root)
    }
}

type Column = (FieldName, Option<usize>);

impl DateTimeBoundedRangeRewriter {
    fn bound_group(&self, children: &[ExprRef]) -> StorageResult<Option<Vec<ExprRef>>> {
        let mut changed = false;
        let mut group = Vec::with_capacity(children.len() + 1);
        let mut lower: Vec<Column> = Vec::new();
        let mut upper: Vec<Column> = Vec::new();

        for child in children {
            let Some((column, op, value)) = as_date_time_bound(child) else {
                match self.rewrite(child)? {
                    Some(new) => {
                        changed = true;
                        group.push(new);
                    }
                    None => group.push(child.clone()),
                }
                continue;
            };

            match op {
                BinaryOperator::GreaterThan | BinaryOperator::GreaterThanOrEqual => {
                    push_unique(&mut lower, column)
                }
                BinaryOperator::LessThan | BinaryOperator::LessThanOrEqual => {
                    push_unique(&mut upper, column)
                }
                BinaryOperator::Equal => {
                    push_unique(&mut lower, column);
                    push_unique(&mut upper, column);
                }
                BinaryOperator::NotEqual => {}
            }

            let clamped = value.clamp(datetime_min(), datetime_max());
            if clamped != value {
                changed = true;
                group.push(Expression::binary(op, column.0, column.1, clamped));
            } else {
                group.push(child.clone());
            }
        }

        for column in &lower {
            if !upper.contains(column) {
                changed = true;
                group.push(Expression::binary(
                    BinaryOperator::LessThanOrEqual,
                    column.0,
                    column.1,
                    datetime_max(),
                ));
            }
        }
        for column in &upper {
            if !lower.contains(column) {
                changed = true;
                group.push(Expression::binary(
                    BinaryOperator::GreaterThanOrEqual,
                    column.0,
                    column.1,
                    datetime_min(),
                ));
            }
        }

        Ok(changed.then_some(group))
    }
}

fn as_date_time_bound(expression: &Expression) -> Option<(Column, BinaryOperator, DateTime<Utc>)> {
    match expression {
        Expression::Binary {
            field: field @ (FieldName::DateTimeStart | FieldName::DateTimeEnd),
            component_index,
            op,
            value: LiteralValue::DateTime(value),
        } => Some(((*field, *component_index), *op, *value)),
        _ => None,
    }
}

fn push_unique(columns: &mut Vec<Column>, column: Column) {
    if !columns.contains(&column) {
        columns.push(column);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_open_lower_bound_gets_column_maximum() {
        let t = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let expr = Expression::greater_than(FieldName::DateTimeEnd, t);

        let bounded = ExpressionRewriter::rewrite(&DateTimeBoundedRangeRewriter, &expr)
            .unwrap()
            .unwrap();
        assert_eq!(
            bounded.to_string(),
            "(And (FieldGreaterThan DateTimeEnd 2020-01-01T00:00:00Z) \
             (FieldLessThanOrEqual DateTimeEnd 9999-12-31T23:59:59.999Z))"
        );
    }

    #[test]
    fn test_closed_ranges_are_unchanged() {
        let start = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
        let expr = Expression::and(vec![
            Expression::greater_than_or_equal(FieldName::DateTimeStart, start),
            Expression::less_than(FieldName::DateTimeStart, end),
        ]);
        assert!(
            ExpressionRewriter::rewrite(&DateTimeBoundedRangeRewriter, &expr)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_upper_bound_per_column() {
        let t = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let expr = Expression::and(vec![
            Expression::less_than(FieldName::DateTimeStart, t),
            Expression::binary(BinaryOperator::LessThan, FieldName::DateTimeStart, Some(1), t),
        ]);

        let bounded = ExpressionRewriter::rewrite(&DateTimeBoundedRangeRewriter, &expr)
            .unwrap()
            .unwrap();
        let text = bounded.to_string();
        assert!(text.contains("(FieldGreaterThanOrEqual DateTimeStart 0001-01-01T00:00:00Z)"));
        assert!(text.contains("(FieldGreaterThanOrEqual DateTimeStart[1] 0001-01-01T00:00:00Z)"));
    }
}
