//! The search expression tree.
//!
//! An [`Expression`] is the boolean predicate produced by search-request
//! parsing. Nodes are immutable and shared through [`ExprRef`], so a rewrite
//! only allocates the nodes on the path from a changed leaf to the root.

mod literal;
pub mod parameter;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use literal::LiteralValue;
pub use parameter::{SearchParamType, SearchParameterInfo};

/// Shared handle to an immutable expression node.
pub type ExprRef = Arc<Expression>;

/// Fields of a search value that predicates compare against.
///
/// The fields after [`FieldName::ResourceSurrogateId`] only appear after the
/// rewrite pipeline has mapped a predicate onto a storage representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldName {
    /// Start of a date-time period.
    DateTimeStart,
    /// End of a date-time period.
    DateTimeEnd,
    /// Set when a date-time period spans more than a day.
    DateTimeIsLongerThanADay,
    /// A number value.
    Number,
    /// The numeric part of a quantity.
    Quantity,
    /// Unit code of a quantity.
    QuantityCode,
    /// Unit system of a quantity.
    QuantitySystem,
    /// A string value.
    String,
    /// Code of a token.
    TokenCode,
    /// System of a token.
    TokenSystem,
    /// Display text of a token.
    TokenText,
    /// A URI value.
    Uri,
    /// Base URL of a reference.
    ReferenceBase,
    /// Resource type of a reference target.
    ReferenceResourceType,
    /// Logical id of a reference target.
    ReferenceResourceId,
    /// Version of a reference target.
    ReferenceResourceVersion,
    /// Surrogate id of the resource row.
    ResourceSurrogateId,
    /// Full text of a string value longer than the indexed column.
    TextOverflow,
    /// Full code of a token value longer than the indexed column.
    TokenCodeOverflow,
    /// Lower bound of a stored number range.
    NumberLow,
    /// Upper bound of a stored number range.
    NumberHigh,
    /// Lower bound of a stored quantity range.
    QuantityLow,
    /// Upper bound of a stored quantity range.
    QuantityHigh,
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Binary comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOperator {
    /// `=`
    Equal,
    /// `<>`
    NotEqual,
    /// `>`
    GreaterThan,
    /// `>=`
    GreaterThanOrEqual,
    /// `<`
    LessThan,
    /// `<=`
    LessThanOrEqual,
}

impl BinaryOperator {
    /// The SQL operator text.
    pub fn sql(self) -> &'static str {
        match self {
            BinaryOperator::Equal => "=",
            BinaryOperator::NotEqual => "<>",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::GreaterThanOrEqual => ">=",
            BinaryOperator::LessThan => "<",
            BinaryOperator::LessThanOrEqual => "<=",
        }
    }
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// String matching operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StringOperator {
    /// Whole-value match.
    Equals,
    /// Prefix match.
    StartsWith,
    /// Suffix match.
    EndsWith,
    /// Substring match.
    Contains,
}

impl fmt::Display for StringOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// N-ary boolean operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MultiaryOperator {
    /// All children hold.
    And,
    /// At least one child holds.
    Or,
}

impl fmt::Display for MultiaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A node of the search expression tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expression {
    /// A predicate scoped to one search parameter.
    SearchParameter {
        /// The parameter the inner predicate applies to.
        parameter: SearchParameterInfo,
        /// Predicate over the parameter's values.
        expression: ExprRef,
    },
    /// `:missing` on a search parameter.
    MissingSearchParameter {
        /// The parameter tested for values.
        parameter: SearchParameterInfo,
        /// `true` for `:missing=true`.
        is_missing: bool,
    },
    /// A field compared to a literal.
    Binary {
        /// Compared field.
        field: FieldName,
        /// Component of a composite parameter, if any.
        component_index: Option<usize>,
        /// Comparison operator.
        op: BinaryOperator,
        /// Literal compared against.
        value: LiteralValue,
    },
    /// A field matched against text.
    String {
        /// Matching operator.
        op: StringOperator,
        /// Matched field.
        field: FieldName,
        /// Component of a composite parameter, if any.
        component_index: Option<usize>,
        /// Text to match.
        value: String,
        /// Match case-insensitively.
        ignore_case: bool,
    },
    /// A field that has no value.
    MissingField {
        /// Field without a value.
        field: FieldName,
        /// Component of a composite parameter, if any.
        component_index: Option<usize>,
    },
    /// A reference traversal: `source_type` resources whose
    /// `reference_parameter` points at `target_type` resources matching
    /// `expression`. When `reversed`, `expression` applies to the source side.
    Chained {
        /// Traverse the reference backwards.
        reversed: bool,
        /// Type of the resource holding the reference.
        source_type: String,
        /// Reference parameter followed.
        reference_parameter: SearchParameterInfo,
        /// Type of the referenced resource.
        target_type: String,
        /// Predicate at the far end of the hop.
        expression: ExprRef,
    },
    /// Membership of a compartment.
    Compartment {
        /// Compartment type, such as `Patient`.
        compartment_type: String,
        /// Id of the compartment owner.
        compartment_id: String,
    },
    /// `_include` / `_revinclude` expansion.
    Include {
        /// `:*` include of every reference parameter.
        wildcard: bool,
        /// `_revinclude` rather than `_include`.
        reversed: bool,
        /// Type of the resource holding the reference.
        resource_type: String,
        /// Reference parameter followed; `None` for wildcards.
        reference_parameter: Option<SearchParameterInfo>,
        /// Restricts included resources to one type.
        target_type: Option<String>,
    },
    /// AND or OR over children.
    Multiary {
        /// Boolean operator.
        op: MultiaryOperator,
        /// Operands.
        expressions: Vec<ExprRef>,
    },
}

impl Expression {
    /// Wraps `expression` in a search parameter scope.
    pub fn search_parameter(parameter: SearchParameterInfo, expression: ExprRef) -> ExprRef {
        Arc::new(Expression::SearchParameter {
            parameter,
            expression,
        })
    }

    /// `:missing=<is_missing>` on `parameter`.
    pub fn missing_search_parameter(parameter: SearchParameterInfo, is_missing: bool) -> ExprRef {
        Arc::new(Expression::MissingSearchParameter {
            parameter,
            is_missing,
        })
    }

    /// Compares `field` to `value`.
    pub fn binary(
        op: BinaryOperator,
        field: FieldName,
        component_index: Option<usize>,
        value: impl Into<LiteralValue>,
    ) -> ExprRef {
        Arc::new(Expression::Binary {
            field,
            component_index,
            op,
            value: value.into(),
        })
    }

    /// `field = value`.
    pub fn equal(field: FieldName, value: impl Into<LiteralValue>) -> ExprRef {
        Self::binary(BinaryOperator::Equal, field, None, value)
    }

    /// `field > value`.
    pub fn greater_than(field: FieldName, value: impl Into<LiteralValue>) -> ExprRef {
        Self::binary(BinaryOperator::GreaterThan, field, None, value)
    }

    /// `field >= value`.
    pub fn greater_than_or_equal(field: FieldName, value: impl Into<LiteralValue>) -> ExprRef {
        Self::binary(BinaryOperator::GreaterThanOrEqual, field, None, value)
    }

    /// `field < value`.
    pub fn less_than(field: FieldName, value: impl Into<LiteralValue>) -> ExprRef {
        Self::binary(BinaryOperator::LessThan, field, None, value)
    }

    /// `field <= value`.
    pub fn less_than_or_equal(field: FieldName, value: impl Into<LiteralValue>) -> ExprRef {
        Self::binary(BinaryOperator::LessThanOrEqual, field, None, value)
    }

    /// Matches `field` against `value`.
    pub fn string(
        op: StringOperator,
        field: FieldName,
        component_index: Option<usize>,
        value: impl Into<String>,
        ignore_case: bool,
    ) -> ExprRef {
        Arc::new(Expression::String {
            op,
            field,
            component_index,
            value: value.into(),
            ignore_case,
        })
    }

    /// Case-sensitive string equality.
    pub fn string_equals(field: FieldName, value: impl Into<String>) -> ExprRef {
        Self::string(StringOperator::Equals, field, None, value, false)
    }

    /// `field` has no value.
    pub fn missing_field(field: FieldName, component_index: Option<usize>) -> ExprRef {
        Arc::new(Expression::MissingField {
            field,
            component_index,
        })
    }

    /// Follows `reference_parameter` from `source_type` to `target_type`.
    pub fn chained(
        source_type: impl Into<String>,
        reference_parameter: SearchParameterInfo,
        target_type: impl Into<String>,
        reversed: bool,
        expression: ExprRef,
    ) -> ExprRef {
        Arc::new(Expression::Chained {
            reversed,
            source_type: source_type.into(),
            reference_parameter,
            target_type: target_type.into(),
            expression,
        })
    }

    /// Resources in the compartment of `compartment_type/compartment_id`.
    pub fn compartment(
        compartment_type: impl Into<String>,
        compartment_id: impl Into<String>,
    ) -> ExprRef {
        Arc::new(Expression::Compartment {
            compartment_type: compartment_type.into(),
            compartment_id: compartment_id.into(),
        })
    }

    /// `_include` of `reference_parameter` from `resource_type`.
    pub fn include(
        resource_type: impl Into<String>,
        reference_parameter: Option<SearchParameterInfo>,
        target_type: Option<String>,
        wildcard: bool,
        reversed: bool,
    ) -> ExprRef {
        Arc::new(Expression::Include {
            wildcard,
            reversed,
            resource_type: resource_type.into(),
            reference_parameter,
            target_type,
        })
    }

    /// Combines `expressions` with `op`.
    pub fn multiary(op: MultiaryOperator, expressions: Vec<ExprRef>) -> ExprRef {
        Arc::new(Expression::Multiary { op, expressions })
    }

    /// Conjunction of `expressions`.
    pub fn and(expressions: Vec<ExprRef>) -> ExprRef {
        Self::multiary(MultiaryOperator::And, expressions)
    }

    /// Disjunction of `expressions`.
    pub fn or(expressions: Vec<ExprRef>) -> ExprRef {
        Self::multiary(MultiaryOperator::Or, expressions)
    }

    /// Returns the search parameter this node is scoped to, if any.
    pub fn parameter(&self) -> Option<&SearchParameterInfo> {
        match self {
            Expression::SearchParameter { parameter, .. }
            | Expression::MissingSearchParameter { parameter, .. } => Some(parameter),
            _ => None,
        }
    }

    /// Returns true if any node in this subtree satisfies `predicate`.
    pub fn any(&self, predicate: &dyn Fn(&Expression) -> bool) -> bool {
        if predicate(self) {
            return true;
        }
        match self {
            Expression::SearchParameter { expression, .. }
            | Expression::Chained { expression, .. } => expression.any(predicate),
            Expression::Multiary { expressions, .. } => {
                expressions.iter().any(|e| e.any(predicate))
            }
            _ => false,
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn component(index: &Option<usize>) -> String {
            index.map(|i| format!("[{}]", i)).unwrap_or_default()
        }

        match self {
            Expression::SearchParameter {
                parameter,
                expression,
            } => write!(f, "(Param {} {})", parameter.name, expression),
            Expression::MissingSearchParameter {
                parameter,
                is_missing,
            } => {
                let prefix = if *is_missing { "" } else { "Not" };
                write!(f, "({}MissingParam {})", prefix, parameter.name)
            }
            Expression::Binary {
                field,
                component_index,
                op,
                value,
            } => write!(
                f,
                "(Field{} {}{} {})",
                op,
                field,
                component(component_index),
                value
            ),
            Expression::String {
                op,
                field,
                component_index,
                value,
                ignore_case,
            } => write!(
                f,
                "(String{}{} {}{} '{}')",
                op,
                if *ignore_case { "IgnoreCase" } else { "" },
                field,
                component(component_index),
                value
            ),
            Expression::MissingField {
                field,
                component_index,
            } => write!(f, "(MissingField {}{})", field, component(component_index)),
            Expression::Chained {
                reversed,
                source_type,
                reference_parameter,
                target_type,
                expression,
            } => write!(
                f,
                "({}Chain {}:{} {} {})",
                if *reversed { "Reverse" } else { "" },
                source_type,
                reference_parameter.name,
                target_type,
                expression
            ),
            Expression::Compartment {
                compartment_type,
                compartment_id,
            } => write!(f, "(Compartment {} '{}')", compartment_type, compartment_id),
            Expression::Include {
                wildcard,
                reversed,
                resource_type,
                reference_parameter,
                target_type,
            } => {
                write!(
                    f,
                    "({} {}:{}",
                    if *reversed { "RevInclude" } else { "Include" },
                    resource_type,
                    if *wildcard {
                        "*"
                    } else {
                        reference_parameter
                            .as_ref()
                            .map(|p| p.name.as_str())
                            .unwrap_or("")
                    }
                )?;
                if let Some(target) = target_type {
                    write!(f, ":{}", target)?;
                }
                write!(f, ")")
            }
            Expression::Multiary { op, expressions } => {
                write!(f, "({}", op)?;
                for expression in expressions {
                    write!(f, " {}", expression)?;
                }
                write!(f, ")")
            }
        }
    }
}
