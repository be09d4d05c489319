//! Per-table SQL fragment generators.
//!
//! Every predicate is bound either to a search parameter table (a
//! [`QueryGenerator`]) or to the resource table itself (a
//! [`DenormalizedGenerator`]). The classifier functions here decide which.

mod predicates;

pub use predicates::PredicateRenderer;

use crate::expression::parameter::{RESOURCE_ID, RESOURCE_SURROGATE_ID, RESOURCE_TYPE};
use crate::expression::{ExprRef, Expression, FieldName, SearchParamType, SearchParameterInfo};

use super::schema::SearchParamTable;

/// Generators for predicates evaluated against a search parameter table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryGenerator {
    /// Token codes and systems.
    Token,
    /// Token display text.
    TokenText,
    /// String values, with the overflow column for long ones.
    String,
    /// URIs.
    Uri,
    /// Numbers, stored as low/high ranges.
    Number,
    /// Quantities: a range plus system and code.
    Quantity,
    /// Date-time periods.
    DateTime,
    /// References, by base, type, id and version.
    Reference,
    /// Compartment membership.
    Compartment,
    /// Reference and token components.
    ReferenceTokenComposite,
    /// Two token components.
    TokenTokenComposite,
    /// Token and date-time components.
    TokenDateTimeComposite,
    /// Token and quantity components.
    TokenQuantityComposite,
    /// Token and string components.
    TokenStringComposite,
    /// Token and two number components.
    TokenNumberNumberComposite,
    /// One hop of a chain; joins the reference and resource tables itself.
    ChainAnchor,
    /// Include expansion; joins the reference and resource tables itself.
    Include,
}

impl QueryGenerator {
    /// The table this generator reads, if it reads exactly one.
    pub fn table(self) -> Option<SearchParamTable> {
        let table = match self {
            QueryGenerator::Token => SearchParamTable::Token,
            QueryGenerator::TokenText => SearchParamTable::TokenText,
            QueryGenerator::String => SearchParamTable::String,
            QueryGenerator::Uri => SearchParamTable::Uri,
            QueryGenerator::Number => SearchParamTable::Number,
            QueryGenerator::Quantity => SearchParamTable::Quantity,
            QueryGenerator::DateTime => SearchParamTable::DateTime,
            QueryGenerator::Reference => SearchParamTable::Reference,
            QueryGenerator::Compartment => SearchParamTable::CompartmentAssignment,
            QueryGenerator::ReferenceTokenComposite => SearchParamTable::ReferenceTokenComposite,
            QueryGenerator::TokenTokenComposite => SearchParamTable::TokenTokenComposite,
            QueryGenerator::TokenDateTimeComposite => SearchParamTable::TokenDateTimeComposite,
            QueryGenerator::TokenQuantityComposite => SearchParamTable::TokenQuantityComposite,
            QueryGenerator::TokenStringComposite => SearchParamTable::TokenStringComposite,
            QueryGenerator::TokenNumberNumberComposite => {
                SearchParamTable::TokenNumberNumberComposite
            }
            QueryGenerator::ChainAnchor | QueryGenerator::Include => return None,
        };
        Some(table)
    }

    /// Reference and compartment tables are scheduled after the others.
    pub fn is_reference_bound(self) -> bool {
        matches!(self, QueryGenerator::Reference | QueryGenerator::Compartment)
    }
}

/// Generators for predicates evaluated against the resource table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DenormalizedGenerator {
    /// `_id`
    ResourceId,
    /// `_type`
    ResourceType,
    /// `_resourceSurrogateId` (and `_lastUpdated` once rewritten)
    ResourceSurrogateId,
}

/// Chooses the search parameter table generator for `expression`.
///
/// Returns `None` when the predicate must be evaluated against the resource
/// table instead.
pub fn normalized_generator(expression: &Expression) -> Option<QueryGenerator> {
    match expression {
        Expression::SearchParameter {
            parameter,
            expression,
        } => parameter_generator(parameter, Some(expression)),
        Expression::MissingSearchParameter { parameter, .. } => {
            parameter_generator(parameter, None)
        }
        Expression::Compartment { .. } => Some(QueryGenerator::Compartment),
        Expression::Chained { .. } => Some(QueryGenerator::ChainAnchor),
        Expression::Include { .. } => Some(QueryGenerator::Include),
        _ => None,
    }
}

/// Chooses the resource table generator for a resource-level parameter.
pub fn denormalized_generator(parameter: &SearchParameterInfo) -> Option<DenormalizedGenerator> {
    match parameter.name.as_str() {
        RESOURCE_ID => Some(DenormalizedGenerator::ResourceId),
        RESOURCE_TYPE => Some(DenormalizedGenerator::ResourceType),
        RESOURCE_SURROGATE_ID => Some(DenormalizedGenerator::ResourceSurrogateId),
        _ => None,
    }
}

fn parameter_generator(
    parameter: &SearchParameterInfo,
    inner: Option<&ExprRef>,
) -> Option<QueryGenerator> {
    if parameter.is_resource_level() {
        return None;
    }

    match parameter.param_type {
        SearchParamType::Token => {
            let is_text = inner.is_some_and(|e| {
                e.any(&|node| {
                    matches!(
                        node,
                        Expression::String {
                            field: FieldName::TokenText,
                            ..
                        }
                    )
                })
            });
            Some(if is_text {
                QueryGenerator::TokenText
            } else {
                QueryGenerator::Token
            })
        }
        SearchParamType::String => Some(QueryGenerator::String),
        SearchParamType::Uri => Some(QueryGenerator::Uri),
        SearchParamType::Number => Some(QueryGenerator::Number),
        SearchParamType::Quantity => Some(QueryGenerator::Quantity),
        SearchParamType::Date => Some(QueryGenerator::DateTime),
        SearchParamType::Reference => Some(QueryGenerator::Reference),
        SearchParamType::Composite => composite_generator(&parameter.component_types),
        SearchParamType::Special => None,
    }
}

fn composite_generator(components: &[SearchParamType]) -> Option<QueryGenerator> {
    use SearchParamType::*;

    match components {
        [Reference, Token] => Some(QueryGenerator::ReferenceTokenComposite),
        [Token, Token] => Some(QueryGenerator::TokenTokenComposite),
        [Token, Date] => Some(QueryGenerator::TokenDateTimeComposite),
        [Token, Quantity] => Some(QueryGenerator::TokenQuantityComposite),
        [Token, String] => Some(QueryGenerator::TokenStringComposite),
        [Token, Number, Number] => Some(QueryGenerator::TokenNumberNumberComposite),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param(name: &str, param_type: SearchParamType) -> SearchParameterInfo {
        SearchParameterInfo::new(name, format!("http://example.org/{name}"), param_type)
    }

    #[test]
    fn test_resource_level_parameters_are_denormalized() {
        for name in ["_id", "_type", "_lastUpdated", "_resourceSurrogateId"] {
            let expr = Expression::search_parameter(
                param(name, SearchParamType::Token),
                Expression::string_equals(FieldName::TokenCode, "x"),
            );
            assert_eq!(normalized_generator(&expr), None, "{name}");
        }
    }

    #[test]
    fn test_token_text_is_detected_from_field() {
        let code = param("code", SearchParamType::Token);
        let by_code = Expression::search_parameter(
            code.clone(),
            Expression::string_equals(FieldName::TokenCode, "x"),
        );
        let by_text = Expression::search_parameter(
            code,
            Expression::string(
                crate::expression::StringOperator::StartsWith,
                FieldName::TokenText,
                None,
                "hea",
                true,
            ),
        );

        assert_eq!(normalized_generator(&by_code), Some(QueryGenerator::Token));
        assert_eq!(normalized_generator(&by_text), Some(QueryGenerator::TokenText));
    }

    #[test]
    fn test_special_kinds() {
        let chain = Expression::chained(
            "Observation",
            param("subject", SearchParamType::Reference),
            "Patient",
            false,
            Expression::search_parameter(
                param("name", SearchParamType::String),
                Expression::string_equals(FieldName::String, "x"),
            ),
        );
        assert_eq!(normalized_generator(&chain), Some(QueryGenerator::ChainAnchor));

        let include = Expression::include("Observation", None, None, true, false);
        assert_eq!(normalized_generator(&include), Some(QueryGenerator::Include));
        assert_eq!(QueryGenerator::Include.table(), None);
    }

    #[test]
    fn test_composite_shapes() {
        let composite = SearchParameterInfo::composite(
            "code-value-quantity",
            "http://example.org/cvq",
            vec![SearchParamType::Token, SearchParamType::Quantity],
        );
        let expr = Expression::missing_search_parameter(composite, false);
        assert_eq!(
            normalized_generator(&expr),
            Some(QueryGenerator::TokenQuantityComposite)
        );

        let unknown = SearchParameterInfo::composite(
            "odd",
            "http://example.org/odd",
            vec![SearchParamType::Uri, SearchParamType::Uri],
        );
        assert_eq!(
            normalized_generator(&Expression::missing_search_parameter(unknown, false)),
            None
        );
    }
}
