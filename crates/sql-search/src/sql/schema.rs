//! Table and column names of the relational search schema.
//!
//! Resources live in `dbo.Resource`, one row per version. Each indexed
//! search value lives in a per-type search parameter table keyed by the
//! resource's surrogate id.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

use crate::expression::FieldName;

/// The primary resource table.
pub mod resource {
    /// Table name.
    pub const TABLE: &str = "dbo.Resource";
    /// Resource type, as a model id.
    pub const RESOURCE_TYPE_ID: &str = "ResourceTypeId";
    /// Logical id of the resource.
    pub const RESOURCE_ID: &str = "ResourceId";
    /// Version of the row.
    pub const VERSION: &str = "Version";
    /// Set on every version but the latest.
    pub const IS_HISTORY: &str = "IsHistory";
    /// Clustering key; encodes the last-updated instant.
    pub const RESOURCE_SURROGATE_ID: &str = "ResourceSurrogateId";
    /// Set on delete markers.
    pub const IS_DELETED: &str = "IsDeleted";
    /// HTTP method that produced the version.
    pub const REQUEST_METHOD: &str = "RequestMethod";
    /// Compressed resource body.
    pub const RAW_RESOURCE: &str = "RawResource";
    /// Set when the body lives in the object store.
    pub const IS_RAW_RESOURCE_IN_BLOB_STORE: &str = "IsRawResourceInBlobStore";
    /// Object key of a body kept in the object store.
    pub const LINK_TO_RAW_RESOURCE: &str = "LinkToRawResource";
}

/// Columns shared by every search parameter table.
pub mod search_param {
    /// Type of the resource the row indexes.
    pub const RESOURCE_TYPE_ID: &str = "ResourceTypeId";
    /// Surrogate id of the resource the row indexes.
    pub const RESOURCE_SURROGATE_ID: &str = "ResourceSurrogateId";
    /// Search parameter, as a model id.
    pub const SEARCH_PARAM_ID: &str = "SearchParamId";
    /// Set on rows of historical versions.
    pub const IS_HISTORY: &str = "IsHistory";
}

/// The reference search parameter table.
pub mod reference {
    /// Type of the referenced resource.
    pub const REFERENCE_RESOURCE_TYPE_ID: &str = "ReferenceResourceTypeId";
    /// Logical id of the referenced resource.
    pub const REFERENCE_RESOURCE_ID: &str = "ReferenceResourceId";
}

/// The compartment assignment table.
pub mod compartment {
    /// Compartment type, as a model id.
    pub const COMPARTMENT_TYPE_ID: &str = "CompartmentTypeId";
    /// Logical id of the compartment owner.
    pub const REFERENCE_RESOURCE_ID: &str = "ReferenceResourceId";
}

/// Lookup table of token and quantity systems.
pub mod system {
    /// Table name.
    pub const TABLE: &str = "dbo.System";
    /// Id referenced from the token and quantity tables.
    pub const SYSTEM_ID: &str = "SystemId";
    /// System URI.
    pub const VALUE: &str = "Value";
}

/// Lookup table of quantity codes.
pub mod quantity_code {
    /// Table name.
    pub const TABLE: &str = "dbo.QuantityCode";
    /// Id referenced from the quantity tables.
    pub const QUANTITY_CODE_ID: &str = "QuantityCodeId";
    /// Unit code.
    pub const VALUE: &str = "Value";
}

/// Length of `StringSearchParam.Text`; longer values spill into `TextOverflow`.
pub const STRING_TEXT_MAX_LENGTH: usize = 256;

/// Length of `TokenSearchParam.Code`; longer values spill into `CodeOverflow`.
pub const TOKEN_CODE_MAX_LENGTH: usize = 128;

/// Largest value of a `decimal(18,6)` column.
pub fn decimal_max() -> Decimal {
    Decimal::new(999_999_999_999_999_999, 6)
}

/// Smallest value of a `decimal(18,6)` column.
pub fn decimal_min() -> Decimal {
    -decimal_max()
}

/// Smallest value of a `datetime2(7)` column.
pub fn datetime_min() -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(1, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Largest value of a `datetime2(7)` column (at millisecond precision).
pub fn datetime_max() -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(9999, 12, 31)
        .and_then(|d| d.and_hms_milli_opt(23, 59, 59, 999))
        .map(|dt| dt.and_utc())
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// The per-parameter tables search predicates are evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchParamTable {
    /// `dbo.TokenSearchParam`.
    Token,
    /// `dbo.TokenText`.
    TokenText,
    /// `dbo.StringSearchParam`.
    String,
    /// `dbo.UriSearchParam`.
    Uri,
    /// `dbo.NumberSearchParam`.
    Number,
    /// `dbo.QuantitySearchParam`.
    Quantity,
    /// `dbo.DateTimeSearchParam`.
    DateTime,
    /// `dbo.ReferenceSearchParam`.
    Reference,
    /// `dbo.CompartmentAssignment`.
    CompartmentAssignment,
    /// `dbo.ReferenceTokenCompositeSearchParam`.
    ReferenceTokenComposite,
    /// `dbo.TokenTokenCompositeSearchParam`.
    TokenTokenComposite,
    /// `dbo.TokenDateTimeCompositeSearchParam`.
    TokenDateTimeComposite,
    /// `dbo.TokenQuantityCompositeSearchParam`.
    TokenQuantityComposite,
    /// `dbo.TokenStringCompositeSearchParam`.
    TokenStringComposite,
    /// `dbo.TokenNumberNumberCompositeSearchParam`.
    TokenNumberNumberComposite,
}

impl SearchParamTable {
    /// The qualified table name.
    pub fn name(self) -> &'static str {
        match self {
            SearchParamTable::Token => "dbo.TokenSearchParam",
            SearchParamTable::TokenText => "dbo.TokenText",
            SearchParamTable::String => "dbo.StringSearchParam",
            SearchParamTable::Uri => "dbo.UriSearchParam",
            SearchParamTable::Number => "dbo.NumberSearchParam",
            SearchParamTable::Quantity => "dbo.QuantitySearchParam",
            SearchParamTable::DateTime => "dbo.DateTimeSearchParam",
            SearchParamTable::Reference => "dbo.ReferenceSearchParam",
            SearchParamTable::CompartmentAssignment => "dbo.CompartmentAssignment",
            SearchParamTable::ReferenceTokenComposite => "dbo.ReferenceTokenCompositeSearchParam",
            SearchParamTable::TokenTokenComposite => "dbo.TokenTokenCompositeSearchParam",
            SearchParamTable::TokenDateTimeComposite => "dbo.TokenDateTimeCompositeSearchParam",
            SearchParamTable::TokenQuantityComposite => "dbo.TokenQuantityCompositeSearchParam",
            SearchParamTable::TokenStringComposite => "dbo.TokenStringCompositeSearchParam",
            SearchParamTable::TokenNumberNumberComposite => {
                "dbo.TokenNumberNumberCompositeSearchParam"
            }
        }
    }

    /// Returns true for tables holding one row per composite value.
    pub fn is_composite(self) -> bool {
        matches!(
            self,
            SearchParamTable::ReferenceTokenComposite
                | SearchParamTable::TokenTokenComposite
                | SearchParamTable::TokenDateTimeComposite
                | SearchParamTable::TokenQuantityComposite
                | SearchParamTable::TokenStringComposite
                | SearchParamTable::TokenNumberNumberComposite
        )
    }
}

impl fmt::Display for SearchParamTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The column storing `field`.
///
/// Component predicates of composite parameters address the column suffixed
/// with the one-based component ordinal (`Code1`, `SingleValue2`, ...).
pub fn column_name(field: FieldName, component_index: Option<usize>) -> String {
    let base = match field {
        FieldName::DateTimeStart => "StartDateTime",
        FieldName::DateTimeEnd => "EndDateTime",
        FieldName::DateTimeIsLongerThanADay => "IsLongerThanADay",
        FieldName::Number | FieldName::Quantity => "SingleValue",
        FieldName::NumberLow | FieldName::QuantityLow => "LowValue",
        FieldName::NumberHigh | FieldName::QuantityHigh => "HighValue",
        FieldName::QuantityCode => quantity_code::QUANTITY_CODE_ID,
        FieldName::QuantitySystem | FieldName::TokenSystem => system::SYSTEM_ID,
        FieldName::String | FieldName::TokenText => "Text",
        FieldName::TextOverflow => "TextOverflow",
        FieldName::TokenCode => "Code",
        FieldName::TokenCodeOverflow => "CodeOverflow",
        FieldName::Uri => "Uri",
        FieldName::ReferenceBase => "BaseUri",
        FieldName::ReferenceResourceType => reference::REFERENCE_RESOURCE_TYPE_ID,
        FieldName::ReferenceResourceId => reference::REFERENCE_RESOURCE_ID,
        FieldName::ReferenceResourceVersion => "ReferenceResourceVersion",
        FieldName::ResourceSurrogateId => search_param::RESOURCE_SURROGATE_ID,
    };

    match component_index {
        Some(index) => format!("{}{}", base, index + 1),
        None => base.to_string(),
    }
}

/// Qualifies `column` with `alias` when one is given.
pub fn qualify(alias: Option<&str>, column: &str) -> String {
    match alias {
        Some(alias) => format!("{}.{}", alias, column),
        None => column.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_columns_are_suffixed() {
        assert_eq!(column_name(FieldName::TokenCode, None), "Code");
        assert_eq!(column_name(FieldName::TokenCode, Some(0)), "Code1");
        assert_eq!(column_name(FieldName::QuantityLow, Some(1)), "LowValue2");
    }

    #[test]
    fn test_column_limits() {
        assert_eq!(decimal_max().to_string(), "999999999999.999999");
        assert_eq!(decimal_min().to_string(), "-999999999999.999999");
        assert_eq!(datetime_min().to_rfc3339(), "0001-01-01T00:00:00+00:00");
        assert_eq!(datetime_max().to_rfc3339(), "9999-12-31T23:59:59.999+00:00");
    }

    #[test]
    fn test_qualify() {
        assert_eq!(qualify(Some("r"), resource::IS_HISTORY), "r.IsHistory");
        assert_eq!(qualify(None, resource::IS_HISTORY), "IsHistory");
    }
}
