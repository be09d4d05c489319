//! `_lastUpdated` predicates become `_resourceSurrogateId` ranges.

use chrono::{DateTime, TimeDelta, Utc};

use crate::error::{QueryError, StorageResult};
use crate::expression::parameter::LAST_UPDATED;
use crate::expression::{
    BinaryOperator, ExprRef, Expression, FieldName, LiteralValue, SearchParameterInfo,
};
use crate::types::surrogate_id::{
    last_updated_to_surrogate_id, max_last_updated, min_last_updated, truncate_to_millisecond,
};

use super::{ExpressionRewriter, rewrite_children};

const NAME: &str = "last updated to resource surrogate id";

/// Rewrites predicates over the last-updated instant into predicates over the
/// surrogate id, which encodes it and orders the resource table.
#[derive(Debug, Default, Clone, Copy)]
pub struct LastUpdatedToResourceSurrogateIdRewriter;

impl ExpressionRewriter for LastUpdatedToResourceSurrogateIdRewriter {
    fn name(&self) -> &'static str {
        NAME
    }

    fn rewrite(&self, expression: &ExprRef) -> StorageResult<Option<ExprRef>> {
        match expression.as_ref() {
            Expression::SearchParameter {
                parameter,
                expression: inner,
            } if parameter.name == LAST_UPDATED => Ok(Some(Expression::search_parameter(
                SearchParameterInfo::resource_surrogate_id(),
                to_surrogate_id_range(inner)?,
            ))),
            Expression::MissingSearchParameter {
                parameter,
                is_missing,
            } if parameter.name == LAST_UPDATED => Ok(Some(Expression::missing_search_parameter(
                SearchParameterInfo::resource_surrogate_id(),
                *is_missing,
            ))),
            _ => rewrite_children(self, expression),
        }
    }
}

fn to_surrogate_id_range(expression: &ExprRef) -> StorageResult<ExprRef> {
    match expression.as_ref() {
        Expression::Multiary { op, expressions } => {
            let converted = expressions
                .iter()
                .map(to_surrogate_id_range)
                .collect::<StorageResult<Vec<_>>>()?;
            Ok(Expression::multiary(*op, converted))
        }
        Expression::Binary {
            field: FieldName::DateTimeStart | FieldName::DateTimeEnd,
            op,
            value: LiteralValue::DateTime(instant),
            ..
        } => binary_to_range(*op, *instant),
        _ => Err(QueryError::UnsupportedExpression {
            pass: NAME,
            expression: expression.to_string(),
        }
        .into()),
    }
}

fn binary_to_range(op: BinaryOperator, instant: DateTime<Utc>) -> StorageResult<ExprRef> {
    let truncated = truncate_to_millisecond(instant);
    let millisecond = TimeDelta::milliseconds(1);

    let expression = match op {
        BinaryOperator::GreaterThan => at_least(surrogate_id(truncated + millisecond)?),
        BinaryOperator::GreaterThanOrEqual => at_least(surrogate_id(truncated)?),
        BinaryOperator::LessThan if instant == truncated => {
            at_most(surrogate_id(truncated - millisecond)?)
        }
        BinaryOperator::LessThan | BinaryOperator::LessThanOrEqual => {
            at_most(surrogate_id(truncated)?)
        }
        BinaryOperator::Equal => Expression::and(vec![
            at_least(surrogate_id(truncated)?),
            Expression::less_than(
                FieldName::ResourceSurrogateId,
                surrogate_id(truncated + millisecond)?,
            ),
        ]),
        BinaryOperator::NotEqual => {
            return Err(QueryError::UnsupportedOperator {
                pass: NAME,
                operator: op.to_string(),
            }
            .into());
        }
    };
    Ok(expression)
}

/// Encodes `value`, clamped to the instants a surrogate id can represent.
fn surrogate_id(value: DateTime<Utc>) -> StorageResult<i64> {
    let clamped = value.clamp(min_last_updated(), max_last_updated());
    Ok(last_updated_to_surrogate_id(clamped)?)
}

fn at_least(id: i64) -> ExprRef {
    Expression::greater_than_or_equal(FieldName::ResourceSurrogateId, id)
}

fn at_most(id: i64) -> ExprRef {
    Expression::less_than_or_equal(FieldName::ResourceSurrogateId, id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::SearchParamType;
    use chrono::TimeZone;

    fn last_updated(inner: ExprRef) -> ExprRef {
        Expression::search_parameter(
            SearchParameterInfo::new(
                LAST_UPDATED,
                "http://hl7.org/fhir/SearchParameter/Resource-lastUpdated",
                SearchParamType::Date,
            ),
            inner,
        )
    }

    fn rewrite(expr: &ExprRef) -> String {
        LastUpdatedToResourceSurrogateIdRewriter
            .rewrite(expr)
            .unwrap()
            .unwrap()
            .to_string()
    }

    #[test]
    fn test_greater_than_starts_at_next_millisecond() {
        let t = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let expected = last_updated_to_surrogate_id(t + TimeDelta::milliseconds(1)).unwrap();

        let expr = last_updated(Expression::greater_than(FieldName::DateTimeStart, t));
        assert_eq!(
            rewrite(&expr),
            format!(
                "(Param _resourceSurrogateId \
                 (FieldGreaterThanOrEqual ResourceSurrogateId {expected}))"
            )
        );
    }

    #[test]
    fn test_less_than_on_a_whole_millisecond_excludes_it() {
        let t = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let before = last_updated_to_surrogate_id(t - TimeDelta::milliseconds(1)).unwrap();
        let expr = last_updated(Expression::less_than(FieldName::DateTimeEnd, t));
        let expected = format!("(FieldLessThanOrEqual ResourceSurrogateId {before}))");
        assert!(rewrite(&expr).ends_with(&expected));

        let fractional = t + TimeDelta::microseconds(1500);
        let same = last_updated_to_surrogate_id(truncate_to_millisecond(fractional)).unwrap();
        let expr = last_updated(Expression::less_than(FieldName::DateTimeEnd, fractional));
        let expected = format!("(FieldLessThanOrEqual ResourceSurrogateId {same}))");
        assert!(rewrite(&expr).ends_with(&expected));
    }

    #[test]
    fn test_missing_parameter_is_renamed() {
        let expr = Expression::missing_search_parameter(
            SearchParameterInfo::new(LAST_UPDATED, "http://example.org/lu", SearchParamType::Date),
            true,
        );
        assert_eq!(rewrite(&expr), "(MissingParam _resourceSurrogateId)");
    }

    #[test]
    fn test_other_parameters_are_untouched() {
        let expr = Expression::search_parameter(
            SearchParameterInfo::new("date", "http://example.org/date", SearchParamType::Date),
            Expression::greater_than(FieldName::DateTimeStart, Utc::now()),
        );
        assert!(
            LastUpdatedToResourceSurrogateIdRewriter
                .rewrite(&expr)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_not_equal_is_a_defect() {
        let expr = last_updated(Expression::binary(
            BinaryOperator::NotEqual,
            FieldName::DateTimeStart,
            None,
            Utc::now(),
        ));
        let err = LastUpdatedToResourceSurrogateIdRewriter.rewrite(&expr).unwrap_err();
        assert!(!err.is_user_error());
    }
}
