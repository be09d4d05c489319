//! Search request descriptor.

use serde::{Deserialize, Serialize};

use crate::error::SearchError;
use crate::expression::{ExprRef, SearchParameterInfo};

/// How the total number of matches should be reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TotalType {
    /// No total.
    #[default]
    None,
    /// An estimate is acceptable.
    Estimate,
    /// The exact number of matches.
    Accurate,
}

/// A requested `_sort` key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortParameter {
    /// The parameter to sort on.
    pub parameter: SearchParameterInfo,
    /// Ascending when true.
    pub ascending: bool,
}

/// A search parameter (or sort key) that could not be honored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsupportedParameter {
    /// The parameter name as requested.
    pub name: String,
    /// Why it was not honored.
    pub reason: String,
}

impl UnsupportedParameter {
    /// Creates a new entry.
    pub fn new(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// A compiled search request.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// The search predicate; `None` matches every current resource.
    pub expression: Option<ExprRef>,
    /// Page size.
    pub max_item_count: usize,
    /// Only count matches.
    pub count_only: bool,
    /// Total reporting mode.
    pub include_total: TotalType,
    /// Continuation token from the previous page.
    pub continuation_token: Option<String>,
    /// Parameters dropped while parsing the request.
    pub unsupported_search_params: Vec<UnsupportedParameter>,
    /// Parameters dropped from `_sort` while parsing the request.
    pub unsupported_sorting_params: Vec<UnsupportedParameter>,
    /// Requested sort keys.
    pub sort: Vec<SortParameter>,
}

impl SearchOptions {
    /// Creates options for the given predicate with the given page size.
    pub fn new(expression: Option<ExprRef>, max_item_count: usize) -> Self {
        Self {
            expression,
            max_item_count,
            ..Default::default()
        }
    }

    /// Sets the count-only flag.
    pub fn with_count_only(mut self, count_only: bool) -> Self {
        self.count_only = count_only;
        self
    }

    /// Sets the total mode.
    pub fn with_total(mut self, total: TotalType) -> Self {
        self.include_total = total;
        self
    }

    /// Sets the continuation token.
    pub fn with_continuation_token(mut self, token: impl Into<String>) -> Self {
        self.continuation_token = Some(token.into());
        self
    }

    /// Adds a sort key.
    pub fn with_sort(mut self, parameter: SearchParameterInfo, ascending: bool) -> Self {
        self.sort.push(SortParameter {
            parameter,
            ascending,
        });
        self
    }

    /// Parses the continuation token.
    ///
    /// Blank tokens are treated as absent. Anything else must be the
    /// non-negative decimal surrogate id of the last match of the previous page.
    pub fn parse_continuation_token(&self) -> Result<Option<i64>, SearchError> {
        let Some(token) = self.continuation_token.as_deref() else {
            return Ok(None);
        };
        if token.trim().is_empty() {
            return Ok(None);
        }
        if !token.bytes().all(|b| b.is_ascii_digit()) {
            return Err(SearchError::InvalidContinuationToken {
                token: token.to_string(),
            });
        }
        token
            .parse::<i64>()
            .map(Some)
            .map_err(|_| SearchError::InvalidContinuationToken {
                token: token.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_continuation_token_parsing() {
        let options = SearchOptions::new(None, 10);
        assert_eq!(options.parse_continuation_token().unwrap(), None);

        let options = SearchOptions::new(None, 10).with_continuation_token("500");
        assert_eq!(options.parse_continuation_token().unwrap(), Some(500));

        let options = SearchOptions::new(None, 10).with_continuation_token("  ");
        assert_eq!(options.parse_continuation_token().unwrap(), None);
    }

    #[test]
    fn test_malformed_continuation_tokens() {
        for token in ["abc", "-5", "+5", "1.5", " 5", "99999999999999999999"] {
            let options = SearchOptions::new(None, 10).with_continuation_token(token);
            assert!(
                matches!(
                    options.parse_continuation_token(),
                    Err(SearchError::InvalidContinuationToken { .. })
                ),
                "token {token:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_total_type_serde() {
        assert_eq!(
            serde_json::to_string(&TotalType::Accurate).unwrap(),
            "\"accurate\""
        );
        assert_eq!(TotalType::default(), TotalType::None);
    }
}
