//! Search parameter descriptors referenced by the expression tree.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Name of the `_id` search parameter.
pub const RESOURCE_ID: &str = "_id";

/// Name of the `_type` search parameter.
pub const RESOURCE_TYPE: &str = "_type";

/// Name of the `_lastUpdated` search parameter.
pub const LAST_UPDATED: &str = "_lastUpdated";

/// Name of the internal parameter over the resource surrogate id column.
pub const RESOURCE_SURROGATE_ID: &str = "_resourceSurrogateId";

/// FHIR search parameter types.
///
/// See: https://build.fhir.org/search.html#ptypes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchParamType {
    /// A simple string, like a name or description.
    String,
    /// A search against a URI.
    Uri,
    /// A search for a number.
    Number,
    /// A search for a date, dateTime, or period.
    Date,
    /// A quantity, with a number and units.
    Quantity,
    /// A code from a code system or value set.
    Token,
    /// A reference to another resource.
    Reference,
    /// A composite search parameter that combines others.
    Composite,
    /// Special search parameters (_id, _lastUpdated, etc.).
    Special,
}

impl fmt::Display for SearchParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchParamType::String => write!(f, "string"),
            SearchParamType::Uri => write!(f, "uri"),
            SearchParamType::Number => write!(f, "number"),
            SearchParamType::Date => write!(f, "date"),
            SearchParamType::Quantity => write!(f, "quantity"),
            SearchParamType::Token => write!(f, "token"),
            SearchParamType::Reference => write!(f, "reference"),
            SearchParamType::Composite => write!(f, "composite"),
            SearchParamType::Special => write!(f, "special"),
        }
    }
}

impl FromStr for SearchParamType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "string" => Ok(SearchParamType::String),
            "uri" => Ok(SearchParamType::Uri),
            "number" => Ok(SearchParamType::Number),
            "date" => Ok(SearchParamType::Date),
            "quantity" => Ok(SearchParamType::Quantity),
            "token" => Ok(SearchParamType::Token),
            "reference" => Ok(SearchParamType::Reference),
            "composite" => Ok(SearchParamType::Composite),
            "special" => Ok(SearchParamType::Special),
            _ => Err(format!("unknown search parameter type: {}", s)),
        }
    }
}

/// A search parameter as seen by the compiler.
///
/// The `url` is the canonical identity used to look up the parameter's
/// storage id; the `name` is what the request used.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchParameterInfo {
    /// The parameter code (e.g. `code`, `_lastUpdated`).
    pub name: String,
    /// The canonical URL of the parameter definition.
    pub url: String,
    /// The parameter type.
    pub param_type: SearchParamType,
    /// Component types, in order, for composite parameters.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub component_types: Vec<SearchParamType>,
}

impl SearchParameterInfo {
    /// Creates a new non-composite parameter.
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        param_type: SearchParamType,
    ) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            param_type,
            component_types: Vec::new(),
        }
    }

    /// Creates a composite parameter with the given component types.
    pub fn composite(
        name: impl Into<String>,
        url: impl Into<String>,
        component_types: Vec<SearchParamType>,
    ) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            param_type: SearchParamType::Composite,
            component_types,
        }
    }

    /// The internal parameter over the resource surrogate id column.
    pub fn resource_surrogate_id() -> Self {
        Self::new(
            RESOURCE_SURROGATE_ID,
            "http://hl7.org/fhir/SearchParameter/Resource-resourceSurrogateId",
            SearchParamType::Special,
        )
    }

    /// Returns true if this parameter is evaluated against the resource table itself.
    pub fn is_resource_level(&self) -> bool {
        matches!(
            self.name.as_str(),
            RESOURCE_ID | RESOURCE_TYPE | LAST_UPDATED | RESOURCE_SURROGATE_ID
        )
    }
}

impl fmt::Display for SearchParameterInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_param_type_round_trip_text() {
        assert_eq!(SearchParamType::Token.to_string(), "token");
        assert_eq!(
            "Reference".parse::<SearchParamType>().unwrap(),
            SearchParamType::Reference
        );
        assert!("nope".parse::<SearchParamType>().is_err());
    }

    #[test]
    fn test_resource_level_parameters() {
        let last_updated = SearchParameterInfo::new(
            LAST_UPDATED,
            "http://hl7.org/fhir/SearchParameter/Resource-lastUpdated",
            SearchParamType::Date,
        );
        assert!(last_updated.is_resource_level());
        assert!(SearchParameterInfo::resource_surrogate_id().is_resource_level());

        let code = SearchParameterInfo::new(
            "code",
            "http://hl7.org/fhir/SearchParameter/clinical-code",
            SearchParamType::Token,
        );
        assert!(!code.is_resource_level());
    }

    #[test]
    fn test_composite_serde_keeps_components() {
        let param = SearchParameterInfo::composite(
            "code-value-quantity",
            "http://hl7.org/fhir/SearchParameter/Observation-code-value-quantity",
            vec![SearchParamType::Token, SearchParamType::Quantity],
        );
        let json = serde_json::to_value(&param).unwrap();
        assert_eq!(json["param_type"], "composite");
        assert_eq!(json["component_types"][1], "quantity");
    }
}
