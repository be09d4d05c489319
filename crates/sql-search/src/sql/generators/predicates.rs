//! Rendering of predicates into SQL conditions.

use crate::error::{QueryError, SearchError, StorageError, StorageResult};
use crate::expression::{
    BinaryOperator, ExprRef, Expression, FieldName, LiteralValue, MultiaryOperator,
    StringOperator,
};
use crate::sql::model::{SearchModel, require_resource_type_id, require_search_param_id};
use crate::sql::parameters::SqlQueryParameterManager;
use crate::sql::schema::{
    STRING_TEXT_MAX_LENGTH, TOKEN_CODE_MAX_LENGTH, column_name, compartment, qualify,
    quantity_code, resource, search_param, system,
};

use super::{DenormalizedGenerator, QueryGenerator, denormalized_generator};

const CASE_SENSITIVE_COLLATION: &str = "Latin1_General_100_CS_AS";

const NORMALIZED_PASS: &str = "normalized predicate generator";
const DENORMALIZED_PASS: &str = "denormalized predicate generator";

/// Renders predicates as SQL conditions, binding literals as parameters.
///
/// Column references are qualified with the table alias when one is set.
pub struct PredicateRenderer<'a> {
    params: &'a mut SqlQueryParameterManager,
    model: &'a dyn SearchModel,
    table_alias: Option<&'a str>,
}

impl<'a> PredicateRenderer<'a> {
    /// Renders into `params`, qualifying columns with `table_alias`.
    pub fn new(
        params: &'a mut SqlQueryParameterManager,
        model: &'a dyn SearchModel,
        table_alias: Option<&'a str>,
    ) -> Self {
        Self {
            params,
            model,
            table_alias,
        }
    }

    /// Renders a predicate over the resource table.
    pub fn denormalized(&mut self, expression: &ExprRef) -> StorageResult<String> {
        match expression.as_ref() {
            Expression::SearchParameter {
                parameter,
                expression: inner,
            } => {
                let generator = denormalized_generator(parameter)
                    .ok_or_else(|| unsupported(DENORMALIZED_PASS, expression))?;
                self.denormalized_value(generator, inner)
            }
            Expression::MissingSearchParameter {
                parameter,
                is_missing,
            } => {
                denormalized_generator(parameter)
                    .ok_or_else(|| unsupported(DENORMALIZED_PASS, expression))?;
                // Resource-level values are always present.
                Ok(if *is_missing { "1 = 0" } else { "1 = 1" }.to_string())
            }
            Expression::Multiary { op, expressions } => {
                let parts = expressions
                    .iter()
                    .map(|e| self.denormalized(e))
                    .collect::<StorageResult<Vec<_>>>()?;
                Ok(join(*op, parts))
            }
            _ => Err(unsupported(DENORMALIZED_PASS, expression)),
        }
    }

    fn denormalized_value(
        &mut self,
        generator: DenormalizedGenerator,
        expression: &ExprRef,
    ) -> StorageResult<String> {
        match (generator, expression.as_ref()) {
            (_, Expression::Multiary { op, expressions }) => {
                let parts = expressions
                    .iter()
                    .map(|e| self.denormalized_value(generator, e))
                    .collect::<StorageResult<Vec<_>>>()?;
                Ok(join(*op, parts))
            }
            (
                DenormalizedGenerator::ResourceId,
                Expression::String {
                    op,
                    value,
                    ignore_case,
                    ..
                },
            ) => {
                let column = self.column(resource::RESOURCE_ID);
                Ok(self.string_condition(&column, *op, value, *ignore_case, false))
            }
            (
                DenormalizedGenerator::ResourceType,
                Expression::String {
                    op: StringOperator::Equals,
                    value,
                    ..
                },
            ) => {
                let id = require_resource_type_id(self.model, value)?;
                let column = self.column(resource::RESOURCE_TYPE_ID);
                Ok(format!("{} = {}", column, self.params.add(id)))
            }
            (
                DenormalizedGenerator::ResourceSurrogateId,
                Expression::Binary {
                    field: FieldName::ResourceSurrogateId,
                    op,
                    value: value @ LiteralValue::Integer(_),
                    ..
                },
            ) => {
                let column = self.column(resource::RESOURCE_SURROGATE_ID);
                Ok(format!("{} {} {}", column, op.sql(), self.params.add(value)))
            }
            _ => Err(unsupported(DENORMALIZED_PASS, expression)),
        }
    }

    /// Renders the normalized predicate of a table expression against the
    /// table of `generator`.
    pub fn normalized(
        &mut self,
        generator: QueryGenerator,
        expression: &ExprRef,
    ) -> StorageResult<String> {
        match expression.as_ref() {
            Expression::SearchParameter {
                parameter,
                expression: inner,
            } => {
                let id = require_search_param_id(self.model, &parameter.url)?;
                let column = self.column(search_param::SEARCH_PARAM_ID);
                let head = format!("{} = {}", column, self.params.add(id));
                let body = self.value(generator, inner)?;
                Ok(format!("{} AND {}", head, body))
            }
            Expression::MissingSearchParameter {
                parameter,
                is_missing: false,
            } => {
                let id = require_search_param_id(self.model, &parameter.url)?;
                let column = self.column(search_param::SEARCH_PARAM_ID);
                Ok(format!("{} = {}", column, self.params.add(id)))
            }
            Expression::Compartment {
                compartment_type,
                compartment_id,
            } => {
                let type_id = self
                    .model
                    .compartment_type_id(compartment_type)
                    .ok_or_else(|| SearchError::InvalidRequest {
                        message: format!("unknown compartment type: {}", compartment_type),
                    })?;
                let type_column = self.column(compartment::COMPARTMENT_TYPE_ID);
                let id_column = self.column(compartment::REFERENCE_RESOURCE_ID);
                Ok(format!(
                    "{} = {} AND {} = {}",
                    type_column,
                    self.params.add(type_id),
                    id_column,
                    self.params.add(compartment_id.as_str())
                ))
            }
            _ => Err(unsupported(NORMALIZED_PASS, expression)),
        }
    }

    fn value(&mut self, generator: QueryGenerator, expression: &ExprRef) -> StorageResult<String> {
        let composite = generator.table().is_some_and(|t| t.is_composite());

        match expression.as_ref() {
            Expression::Multiary { op, expressions } => {
                let parts = expressions
                    .iter()
                    .map(|e| self.value(generator, e))
                    .collect::<StorageResult<Vec<_>>>()?;
                Ok(join(*op, parts))
            }
            Expression::Binary {
                field,
                component_index,
                op,
                value,
            } => {
                check_component(composite, *component_index, expression)?;
                let column = self.column(&column_name(*field, *component_index));
                if is_lookup_field(*field) {
                    let text = value
                        .as_str()
                        .ok_or_else(|| unsupported(NORMALIZED_PASS, expression))?;
                    return self.lookup_condition(*field, &column, *op, text, expression);
                }
                Ok(format!("{} {} {}", column, op.sql(), self.params.add(value)))
            }
            Expression::String {
                op,
                field,
                component_index,
                value,
                ignore_case,
            } => {
                check_component(composite, *component_index, expression)?;
                let column = self.column(&column_name(*field, *component_index));
                if is_lookup_field(*field) {
                    if *op != StringOperator::Equals {
                        return Err(QueryError::UnsupportedOperator {
                            pass: NORMALIZED_PASS,
                            operator: op.to_string(),
                        }
                        .into());
                    }
                    return self.lookup_condition(
                        *field,
                        &column,
                        BinaryOperator::Equal,
                        value,
                        expression,
                    );
                }

                let overflow_of = match field {
                    FieldName::TextOverflow => Some((FieldName::String, STRING_TEXT_MAX_LENGTH)),
                    FieldName::TokenCodeOverflow => {
                        Some((FieldName::TokenCode, TOKEN_CODE_MAX_LENGTH))
                    }
                    _ => None,
                };

                let case_insensitive = is_case_insensitive_column(*field);
                match overflow_of {
                    None => Ok(self.string_condition(
                        &column,
                        *op,
                        value,
                        *ignore_case,
                        case_insensitive,
                    )),
                    Some((indexed_field, max_length)) => {
                        let mut parts = vec![format!("{} IS NOT NULL", column)];
                        if matches!(op, StringOperator::Equals | StringOperator::StartsWith)
                            && value.chars().count() > max_length
                        {
                            let indexed =
                                self.column(&column_name(indexed_field, *component_index));
                            let prefix: String = value.chars().take(max_length).collect();
                            parts.push(self.string_condition(
                                &indexed,
                                StringOperator::Equals,
                                &prefix,
                                *ignore_case,
                                is_case_insensitive_column(indexed_field),
                            ));
                        }
                        parts.push(self.string_condition(
                            &column,
                            *op,
                            value,
                            *ignore_case,
                            case_insensitive,
                        ));
                        Ok(parts.join(" AND "))
                    }
                }
            }
            Expression::MissingField {
                field,
                component_index,
            } => {
                check_component(composite, *component_index, expression)?;
                let column = self.column(&column_name(*field, *component_index));
                Ok(format!("{} IS NULL", column))
            }
            _ => Err(unsupported(NORMALIZED_PASS, expression)),
        }
    }

    fn lookup_condition(
        &mut self,
        field: FieldName,
        column: &str,
        op: BinaryOperator,
        value: &str,
        expression: &ExprRef,
    ) -> StorageResult<String> {
        if op != BinaryOperator::Equal {
            return Err(QueryError::UnsupportedOperator {
                pass: NORMALIZED_PASS,
                operator: op.to_string(),
            }
            .into());
        }

        match field {
            FieldName::TokenSystem | FieldName::QuantitySystem => {
                Ok(match self.model.system_id(value) {
                    Some(id) => format!("{} = {}", column, self.params.add(id)),
                    None => format!(
                        "{} IN (SELECT {} FROM {} WHERE {} = {})",
                        column,
                        system::SYSTEM_ID,
                        system::TABLE,
                        system::VALUE,
                        self.params.add(value)
                    ),
                })
            }
            FieldName::QuantityCode => Ok(match self.model.quantity_code_id(value) {
                Some(id) => format!("{} = {}", column, self.params.add(id)),
                None => format!(
                    "{} IN (SELECT {} FROM {} WHERE {} = {})",
                    column,
                    quantity_code::QUANTITY_CODE_ID,
                    quantity_code::TABLE,
                    quantity_code::VALUE,
                    self.params.add(value)
                ),
            }),
            FieldName::ReferenceResourceType => {
                let id = require_resource_type_id(self.model, value)?;
                Ok(format!("{} = {}", column, self.params.add(id)))
            }
            _ => Err(unsupported(NORMALIZED_PASS, expression)),
        }
    }

    fn string_condition(
        &mut self,
        column: &str,
        op: StringOperator,
        value: &str,
        ignore_case: bool,
        case_insensitive_column: bool,
    ) -> String {
        let column = if !ignore_case && case_insensitive_column {
            format!("{} COLLATE {}", column, CASE_SENSITIVE_COLLATION)
        } else {
            column.to_string()
        };

        match op {
            StringOperator::Equals => format!("{} = {}", column, self.params.add(value)),
            StringOperator::StartsWith => format!(
                "{} LIKE {}",
                column,
                self.params.add(format!("{}%", escape_like(value)))
            ),
            StringOperator::EndsWith => format!(
                "{} LIKE {}",
                column,
                self.params.add(format!("%{}", escape_like(value)))
            ),
            StringOperator::Contains => format!(
                "{} LIKE {}",
                column,
                self.params.add(format!("%{}%", escape_like(value)))
            ),
        }
    }

    fn column(&self, column: &str) -> String {
        qualify(self.table_alias, column)
    }
}

/// Escapes the `LIKE` wildcards of `value`.
pub(crate) fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '%' => escaped.push_str("[%]"),
            '_' => escaped.push_str("[_]"),
            '[' => escaped.push_str("[[]"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn join(op: MultiaryOperator, parts: Vec<String>) -> String {
    let separator = match op {
        MultiaryOperator::And => " AND ",
        MultiaryOperator::Or => " OR ",
    };
    format!("({})", parts.join(separator))
}

fn is_lookup_field(field: FieldName) -> bool {
    matches!(
        field,
        FieldName::TokenSystem
            | FieldName::QuantitySystem
            | FieldName::QuantityCode
            | FieldName::ReferenceResourceType
    )
}

fn is_case_insensitive_column(field: FieldName) -> bool {
    matches!(
        field,
        FieldName::String | FieldName::TokenText | FieldName::TextOverflow
    )
}

fn check_component(
    composite: bool,
    component_index: Option<usize>,
    expression: &ExprRef,
) -> StorageResult<()> {
    if composite && component_index.is_none() {
        return Err(QueryError::MissingComponentIndex {
            expression: expression.to_string(),
        }
        .into());
    }
    Ok(())
}

fn unsupported(pass: &'static str, expression: &ExprRef) -> StorageError {
    QueryError::UnsupportedExpression {
        pass,
        expression: expression.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::{SearchParamType, SearchParameterInfo};
    use crate::sql::model::InMemorySearchModel;
    use crate::sql::parameters::SqlParam;

    fn model() -> InMemorySearchModel {
        let model = InMemorySearchModel::new();
        model.add_resource_type("Patient", 103);
        model.add_search_param("http://example.org/name", 7);
        model.add_search_param("http://example.org/code", 8);
        model.add_compartment_type("Patient", 1);
        model.add_system("http://loinc.org", 42);
        model
    }

    fn param(name: &str, param_type: SearchParamType) -> SearchParameterInfo {
        SearchParameterInfo::new(name, format!("http://example.org/{name}"), param_type)
    }

    #[test]
    fn test_normalized_string_is_case_sensitive_unless_ignoring_case() {
        let model = model();
        let mut params = SqlQueryParameterManager::new();
        let expr = Expression::search_parameter(
            param("name", SearchParamType::String),
            Expression::string(StringOperator::StartsWith, FieldName::String, None, "a_b", false),
        );

        let sql = PredicateRenderer::new(&mut params, &model, None)
            .normalized(QueryGenerator::String, &expr)
            .unwrap();

        assert_eq!(
            sql,
            "SearchParamId = @p0 AND Text COLLATE Latin1_General_100_CS_AS LIKE @p1"
        );
        assert_eq!(params.parameters()[0].value, SqlParam::SmallInt(7));
        assert_eq!(
            params.parameters()[1].value,
            SqlParam::NVarChar("a[_]b%".to_string())
        );
    }

    #[test]
    fn test_known_and_unknown_systems() {
        let model = model();
        let mut params = SqlQueryParameterManager::new();
        let code = param("code", SearchParamType::Token);
        let known = Expression::search_parameter(
            code.clone(),
            Expression::and(vec![
                Expression::string_equals(FieldName::TokenSystem, "http://loinc.org"),
                Expression::string_equals(FieldName::TokenCode, "1234-5"),
            ]),
        );
        let unknown = Expression::search_parameter(
            code,
            Expression::string_equals(FieldName::TokenSystem, "http://unknown.org"),
        );

        let mut renderer = PredicateRenderer::new(&mut params, &model, None);
        assert_eq!(
            renderer.normalized(QueryGenerator::Token, &known).unwrap(),
            "SearchParamId = @p0 AND (SystemId = @p1 AND Code = @p2)"
        );
        assert_eq!(
            renderer.normalized(QueryGenerator::Token, &unknown).unwrap(),
            "SearchParamId = @p3 AND SystemId IN \
             (SELECT SystemId FROM dbo.System WHERE Value = @p4)"
        );
    }

    #[test]
    fn test_overflow_compares_prefix_and_full_text() {
        let model = model();
        let mut params = SqlQueryParameterManager::new();
        let long = "x".repeat(300);
        let expr = Expression::search_parameter(
            param("name", SearchParamType::String),
            Expression::string(
                StringOperator::Equals,
                FieldName::TextOverflow,
                None,
                long.clone(),
                true,
            ),
        );

        let sql = PredicateRenderer::new(&mut params, &model, None)
            .normalized(QueryGenerator::String, &expr)
            .unwrap();

        assert_eq!(
            sql,
            "SearchParamId = @p0 AND TextOverflow IS NOT NULL AND Text = @p1 AND TextOverflow = @p2"
        );
        assert_eq!(
            params.parameters()[1].value,
            SqlParam::NVarChar("x".repeat(STRING_TEXT_MAX_LENGTH))
        );
        assert_eq!(params.parameters()[2].value, SqlParam::NVarChar(long));
    }

    #[test]
    fn test_compartment_and_missing_field() {
        let model = model();
        let mut params = SqlQueryParameterManager::new();
        let mut renderer = PredicateRenderer::new(&mut params, &model, Some("t"));

        assert_eq!(
            renderer
                .normalized(QueryGenerator::Compartment, &Expression::compartment("Patient", "p1"))
                .unwrap(),
            "t.CompartmentTypeId = @p0 AND t.ReferenceResourceId = @p1"
        );

        let missing = Expression::search_parameter(
            param("name", SearchParamType::String),
            Expression::missing_field(FieldName::String, None),
        );
        assert_eq!(
            renderer.normalized(QueryGenerator::String, &missing).unwrap(),
            "t.SearchParamId = @p2 AND t.Text IS NULL"
        );
    }

    #[test]
    fn test_composite_requires_component_index() {
        let model = model();
        let mut params = SqlQueryParameterManager::new();
        let expr = Expression::search_parameter(
            param("code", SearchParamType::Composite),
            Expression::string_equals(FieldName::TokenCode, "a"),
        );

        let err = PredicateRenderer::new(&mut params, &model, None)
            .normalized(QueryGenerator::TokenTokenComposite, &expr)
            .unwrap_err();
        assert!(matches!(
            err,
            StorageError::Query(QueryError::MissingComponentIndex { .. })
        ));
    }

    #[test]
    fn test_denormalized_predicates() {
        let model = model();
        let mut params = SqlQueryParameterManager::new();
        let mut renderer = PredicateRenderer::new(&mut params, &model, Some("r"));

        let by_type = Expression::search_parameter(
            param("_type", SearchParamType::Token),
            Expression::string_equals(FieldName::TokenCode, "Patient"),
        );
        assert_eq!(
            renderer.denormalized(&by_type).unwrap(),
            "r.ResourceTypeId = @p0"
        );

        let by_sid = Expression::search_parameter(
            SearchParameterInfo::resource_surrogate_id(),
            Expression::binary(
                BinaryOperator::GreaterThan,
                FieldName::ResourceSurrogateId,
                None,
                500i64,
            ),
        );
        assert_eq!(
            renderer.denormalized(&by_sid).unwrap(),
            "r.ResourceSurrogateId > @p1"
        );

        let missing_id =
            Expression::missing_search_parameter(param("_id", SearchParamType::Token), true);
        assert_eq!(renderer.denormalized(&missing_id).unwrap(), "1 = 0");
    }

    #[test]
    fn test_unknown_resource_type_is_a_user_error() {
        let model = model();
        let mut params = SqlQueryParameterManager::new();
        let expr = Expression::search_parameter(
            param("_type", SearchParamType::Token),
            Expression::string_equals(FieldName::TokenCode, "Spaceship"),
        );

        let err = PredicateRenderer::new(&mut params, &model, None)
            .denormalized(&expr)
            .unwrap_err();
        assert!(err.is_user_error());
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_[a]"), "50[%][_][[]a]");
    }
}
