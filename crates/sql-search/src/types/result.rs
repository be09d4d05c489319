//! Search results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::options::UnsupportedParameter;

/// Why an entry is part of a result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchEntryMode {
    /// The resource matched the search.
    Match,
    /// The resource was pulled in by `_include` or `_revinclude`.
    Include,
}

/// A stored resource version as returned by a search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceWrapper {
    /// Logical id.
    pub resource_id: String,
    /// Version id.
    pub version_id: String,
    /// Resource type name.
    pub resource_type: String,
    /// Raw JSON body; `None` when it could not be fetched.
    pub raw_resource: Option<String>,
    /// HTTP method of the request that wrote this version.
    pub request_method: Option<String>,
    /// When this version was written (millisecond precision).
    pub last_modified: DateTime<Utc>,
    /// Whether this version is a delete marker.
    pub is_deleted: bool,
    /// The surrogate id of this version.
    pub resource_surrogate_id: i64,
}

impl ResourceWrapper {
    /// Returns the relative URL (`Type/id`).
    pub fn url(&self) -> String {
        format!("{}/{}", self.resource_type, self.resource_id)
    }
}

/// One entry of a search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResultEntry {
    /// The resource.
    pub resource: ResourceWrapper,
    /// Match or include.
    pub mode: SearchEntryMode,
}

/// The outcome of a search.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Matched and included entries in surrogate id order.
    pub results: Vec<SearchResultEntry>,
    /// Total matches, when requested.
    pub total_count: Option<i64>,
    /// Token for the next page, when more matches exist.
    pub continuation_token: Option<String>,
    /// Search parameters that were not honored.
    pub unsupported_search_parameters: Vec<UnsupportedParameter>,
    /// Sort parameters that were not honored.
    pub unsupported_sorting_parameters: Vec<UnsupportedParameter>,
}

impl SearchResult {
    /// Creates a result page.
    pub fn new(results: Vec<SearchResultEntry>, continuation_token: Option<String>) -> Self {
        Self {
            results,
            continuation_token,
            ..Default::default()
        }
    }

    /// Creates a count-only result.
    pub fn count(total: i64) -> Self {
        Self {
            total_count: Some(total),
            ..Default::default()
        }
    }

    /// Sets the total count.
    pub fn with_total(mut self, total: i64) -> Self {
        self.total_count = Some(total);
        self
    }

    /// Sets the unsupported search parameters.
    pub fn with_unsupported_search_parameters(
        mut self,
        parameters: Vec<UnsupportedParameter>,
    ) -> Self {
        self.unsupported_search_parameters = parameters;
        self
    }

    /// Sets the unsupported sort parameters.
    pub fn with_unsupported_sorting_parameters(
        mut self,
        parameters: Vec<UnsupportedParameter>,
    ) -> Self {
        self.unsupported_sorting_parameters = parameters;
        self
    }

    /// Iterates over the matched entries.
    pub fn matches(&self) -> impl Iterator<Item = &SearchResultEntry> {
        self.results
            .iter()
            .filter(|e| e.mode == SearchEntryMode::Match)
    }

    /// Iterates over the included entries.
    pub fn included(&self) -> impl Iterator<Item = &SearchResultEntry> {
        self.results
            .iter()
            .filter(|e| e.mode == SearchEntryMode::Include)
    }
}
