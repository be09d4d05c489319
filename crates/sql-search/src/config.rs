//! Search service configuration.

use serde::{Deserialize, Serialize};

use crate::error::{BackendError, StorageError, StorageResult};

/// Configuration for the SQL search service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqlSearchConfig {
    /// Page size used when a request does not specify one.
    pub default_max_item_count: usize,

    /// Largest page size a request may ask for; larger values are clamped.
    pub max_item_count_limit: usize,

    /// Object-store bucket holding raw resource bodies.
    pub raw_resource_bucket: String,

    /// Prefix every command with `SET STATISTICS IO/TIME ON`.
    pub enable_statistics: bool,

    /// Log parameter declarations and command text at debug level.
    pub log_sql_commands: bool,
}

impl Default for SqlSearchConfig {
    fn default() -> Self {
        Self {
            default_max_item_count: 10,
            max_item_count_limit: 1000,
            raw_resource_bucket: "hfs".to_string(),
            enable_statistics: false,
            log_sql_commands: false,
        }
    }
}

impl SqlSearchConfig {
    /// Returns the page size to use for a requested count.
    ///
    /// Zero means "not specified".
    pub fn effective_max_item_count(&self, requested: usize) -> usize {
        match requested {
            0 => self.default_max_item_count,
            n => n.min(self.max_item_count_limit),
        }
    }

    /// Validates configuration invariants.
    pub fn validate(&self) -> StorageResult<()> {
        if self.default_max_item_count == 0 {
            return Err(invalid("default_max_item_count must be > 0"));
        }

        if self.max_item_count_limit == 0 {
            return Err(invalid("max_item_count_limit must be > 0"));
        }

        if self.default_max_item_count > self.max_item_count_limit {
            return Err(invalid(
                "default_max_item_count must not exceed max_item_count_limit",
            ));
        }

        if self.raw_resource_bucket.trim().is_empty() {
            return Err(invalid("raw_resource_bucket must not be empty"));
        }

        Ok(())
    }
}

fn invalid(message: &str) -> StorageError {
    StorageError::Backend(BackendError::Internal {
        backend_name: "sql-search".to_string(),
        message: message.to_string(),
        source: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(SqlSearchConfig::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_page_size() {
        let config = SqlSearchConfig {
            default_max_item_count: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_default_above_limit() {
        let config = SqlSearchConfig {
            default_max_item_count: 50,
            max_item_count_limit: 20,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_blank_bucket() {
        let config = SqlSearchConfig {
            raw_resource_bucket: "  ".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn page_size_is_defaulted_and_clamped() {
        let config = SqlSearchConfig::default();
        assert_eq!(config.effective_max_item_count(0), 10);
        assert_eq!(config.effective_max_item_count(25), 25);
        assert_eq!(config.effective_max_item_count(5000), 1000);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let config: SqlSearchConfig =
            serde_json::from_str(r#"{"raw_resource_bucket": "bodies"}"#).unwrap();
        assert_eq!(config.raw_resource_bucket, "bodies");
        assert_eq!(config.default_max_item_count, 10);
        assert!(!config.log_sql_commands);
    }
}
