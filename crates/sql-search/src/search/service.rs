//! The search orchestrator.

use std::collections::HashSet;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::SqlSearchConfig;
use crate::error::{BackendError, StorageError, StorageResult, map_storage_error};
use crate::expression::{BinaryOperator, ExprRef, Expression, FieldName, SearchParameterInfo};
use crate::sql::{
    RewriteContext, RewritePipeline, SearchModel, SqlCommand, SqlQueryGenerator,
};
use crate::types::surrogate_id::surrogate_id_to_last_updated;
use crate::types::{
    ResourceWrapper, SearchEntryMode, SearchOptions, SearchResult, SearchResultEntry, TotalType,
    UnsupportedParameter,
};

use super::executor::{SqlCommandExecutor, SqlRow};
use super::raw_resource::decode_raw_resource;
use super::store::RawResourceStore;

const SORT_NOT_SUPPORTED: &str = "sorting is not supported";

/// Column ordinals of a result row, in the order the generator selects them.
mod column {
    pub const RESOURCE_TYPE_ID: usize = 0;
    pub const RESOURCE_ID: usize = 1;
    pub const VERSION: usize = 2;
    pub const IS_DELETED: usize = 3;
    pub const RESOURCE_SURROGATE_ID: usize = 4;
    pub const REQUEST_METHOD: usize = 5;
    pub const IS_MATCH: usize = 6;
    pub const RAW_RESOURCE: usize = 7;
    pub const IS_RAW_RESOURCE_IN_BLOB_STORE: usize = 8;
    pub const LINK_TO_RAW_RESOURCE: usize = 9;
}

/// Runs searches against the relational store.
///
/// Each search is compiled through the rewrite pipeline and the query
/// generator, executed through the [`SqlCommandExecutor`], and its rows
/// decoded into a [`SearchResult`]. Raw bodies kept in the object store are
/// fetched through the [`RawResourceStore`].
pub struct SqlSearchService {
    config: SqlSearchConfig,
    executor: Arc<dyn SqlCommandExecutor>,
    store: Arc<dyn RawResourceStore>,
    model: Arc<dyn SearchModel>,
    pipeline: RewritePipeline,
}

impl SqlSearchService {
    /// Creates a service after validating `config`.
    pub fn new(
        config: SqlSearchConfig,
        executor: Arc<dyn SqlCommandExecutor>,
        store: Arc<dyn RawResourceStore>,
        model: Arc<dyn SearchModel>,
    ) -> StorageResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            executor,
            store,
            model,
            pipeline: RewritePipeline::new(),
        })
    }

    /// Returns the service configuration.
    pub fn config(&self) -> &SqlSearchConfig {
        &self.config
    }

    /// Searches current resource versions.
    ///
    /// With [`TotalType::Accurate`] the total is taken from the page itself
    /// when it is both the first and the last page, and from a second
    /// count-only search otherwise.
    pub async fn search(
        &self,
        options: &SearchOptions,
        cancellation: &CancellationToken,
    ) -> StorageResult<SearchResult> {
        if options.include_total != TotalType::Accurate || options.count_only {
            return self.search_impl(options, false, cancellation).await;
        }

        let result = self.search_impl(options, false, cancellation).await?;
        let first_page = options.parse_continuation_token()?.is_none();

        if first_page && result.continuation_token.is_none() {
            let total = result.matches().count() as i64;
            return Ok(result.with_total(total));
        }

        let count_options = SearchOptions {
            count_only: true,
            ..options.clone()
        };
        let count = self.search_impl(&count_options, false, cancellation).await?;
        Ok(result.with_total(count.total_count.unwrap_or(0)))
    }

    /// Searches every version of the matching resources, including history
    /// and delete markers.
    pub async fn search_history(
        &self,
        options: &SearchOptions,
        cancellation: &CancellationToken,
    ) -> StorageResult<SearchResult> {
        self.search_impl(options, true, cancellation).await
    }

    /// Compiles a search into the command it would execute.
    pub fn compile(&self, options: &SearchOptions, history: bool) -> StorageResult<SqlCommand> {
        let context = RewriteContext {
            count_only: options.count_only,
            max_item_count: self.config.effective_max_item_count(options.max_item_count),
        };
        let expression = search_expression(options)?;
        let root = self.pipeline.rewrite(expression.as_ref(), &context)?;

        let mut command =
            SqlQueryGenerator::new(self.model.as_ref(), context, history).generate(&root)?;

        if self.config.enable_statistics {
            command.text = format!(
                "SET STATISTICS IO ON;\nSET STATISTICS TIME ON;\n\n{}",
                command.text
            );
        }
        if self.config.log_sql_commands {
            tracing::debug!("{}", command.to_debug_script());
        }
        Ok(command)
    }

    async fn search_impl(
        &self,
        options: &SearchOptions,
        history: bool,
        cancellation: &CancellationToken,
    ) -> StorageResult<SearchResult> {
        let command = self.compile(options, history)?;

        let rows = tokio::select! {
            biased;
            _ = cancellation.cancelled() => return Err(BackendError::Cancelled.into()),
            rows = self.executor.execute_reader(&command, cancellation) => {
                rows.map_err(map_storage_error)?
            }
        };

        if options.count_only {
            let total = match rows.first() {
                Some(row) => row.get_i64(0)?,
                None => 0,
            };
            tracing::debug!(total, "count search completed");
            return Ok(SearchResult::count(total)
                .with_unsupported_search_parameters(options.unsupported_search_params.clone()));
        }

        let max_item_count = self.config.effective_max_item_count(options.max_item_count);
        let mut page = Vec::with_capacity(max_item_count);
        let mut last_match = None;
        let mut match_count = 0;
        let mut more_results = false;

        for row in &rows {
            let row = ResultRow::decode(row)?;

            // Matches beyond the page only signal that another page exists.
            if row.is_match && match_count >= max_item_count {
                more_results = true;
                continue;
            }
            if row.is_match {
                last_match = Some(row.resource_surrogate_id);
                match_count += 1;
            }
            page.push(row);
        }

        let match_ids: HashSet<i64> = page
            .iter()
            .filter(|row| row.is_match)
            .map(|row| row.resource_surrogate_id)
            .collect();
        let mut include_ids = HashSet::new();

        let mut entries = Vec::with_capacity(page.len());
        for row in page {
            if cancellation.is_cancelled() {
                return Err(BackendError::Cancelled.into());
            }
            if !row.is_match
                && (match_ids.contains(&row.resource_surrogate_id)
                    || !include_ids.insert(row.resource_surrogate_id))
            {
                continue;
            }
            entries.push(self.entry(row).await?);
        }

        let continuation_token = if more_results {
            last_match.map(|id: i64| id.to_string())
        } else {
            None
        };
        tracing::debug!(
            matches = match_count,
            entries = entries.len(),
            more_results,
            "search completed"
        );

        Ok(SearchResult::new(entries, continuation_token)
            .with_unsupported_search_parameters(options.unsupported_search_params.clone())
            .with_unsupported_sorting_parameters(unsupported_sorting_parameters(options)))
    }

    async fn entry(&self, row: ResultRow) -> StorageResult<SearchResultEntry> {
        let resource_type = self
            .model
            .resource_type_name(row.resource_type_id)
            .ok_or_else(|| BackendError::RowDecode {
                column: column::RESOURCE_TYPE_ID,
                message: format!("unknown resource type id {}", row.resource_type_id),
            })?;
        let last_modified = surrogate_id_to_last_updated(row.resource_surrogate_id).ok_or_else(
            || BackendError::RowDecode {
                column: column::RESOURCE_SURROGATE_ID,
                message: format!("surrogate id {} out of range", row.resource_surrogate_id),
            },
        )?;
        let raw_resource = self.raw_resource(&row).await?;

        Ok(SearchResultEntry {
            resource: ResourceWrapper {
                resource_id: row.resource_id,
                version_id: row.version.to_string(),
                resource_type,
                raw_resource,
                request_method: row.request_method,
                last_modified,
                is_deleted: row.is_deleted,
                resource_surrogate_id: row.resource_surrogate_id,
            },
            mode: if row.is_match {
                SearchEntryMode::Match
            } else {
                SearchEntryMode::Include
            },
        })
    }

    /// The body of `row`. Bodies the object store cannot return are logged and
    /// left empty rather than failing the search.
    async fn raw_resource(&self, row: &ResultRow) -> StorageResult<Option<String>> {
        if !row.is_raw_resource_in_blob_store {
            return row
                .raw_resource
                .as_deref()
                .map(decode_raw_resource)
                .transpose();
        }

        let Some(key) = row.link_to_raw_resource.as_deref() else {
            tracing::warn!(
                resource_id = %row.resource_id,
                "raw resource is in the object store but has no link"
            );
            return Ok(None);
        };

        match self
            .store
            .get_object(&self.config.raw_resource_bucket, key)
            .await
        {
            Ok(Some(bytes)) => match String::from_utf8(bytes) {
                Ok(text) => Ok(Some(text)),
                Err(e) => {
                    tracing::warn!(key, error = %e, "raw resource object is not valid UTF-8");
                    Ok(None)
                }
            },
            Ok(None) => {
                tracing::warn!(key, "raw resource object not found");
                Ok(None)
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "failed to read raw resource object");
                Ok(None)
            }
        }
    }
}

/// The request predicate, restricted to matches after the continuation
/// token. Count-only searches ignore the token.
fn search_expression(options: &SearchOptions) -> StorageResult<Option<ExprRef>> {
    if options.count_only {
        return Ok(options.expression.clone());
    }
    let Some(token) = options.parse_continuation_token()? else {
        return Ok(options.expression.clone());
    };

    let after_token = Expression::search_parameter(
        SearchParameterInfo::resource_surrogate_id(),
        Expression::binary(
            BinaryOperator::GreaterThan,
            FieldName::ResourceSurrogateId,
            None,
            token,
        ),
    );
    Ok(Some(match &options.expression {
        Some(expression) => Expression::and(vec![after_token, expression.clone()]),
        None => after_token,
    }))
}

fn unsupported_sorting_parameters(options: &SearchOptions) -> Vec<UnsupportedParameter> {
    options
        .unsupported_sorting_params
        .iter()
        .cloned()
        .chain(
            options
                .sort
                .iter()
                .map(|s| UnsupportedParameter::new(s.parameter.name.clone(), SORT_NOT_SUPPORTED)),
        )
        .collect()
}

/// A decoded result row.
struct ResultRow {
    resource_type_id: i16,
    resource_id: String,
    version: i32,
    is_deleted: bool,
    resource_surrogate_id: i64,
    request_method: Option<String>,
    is_match: bool,
    raw_resource: Option<Vec<u8>>,
    is_raw_resource_in_blob_store: bool,
    link_to_raw_resource: Option<String>,
}

impl ResultRow {
    fn decode(row: &SqlRow) -> Result<Self, StorageError> {
        Ok(Self {
            resource_type_id: row.get_i16(column::RESOURCE_TYPE_ID)?,
            resource_id: row.get_string(column::RESOURCE_ID)?,
            version: row.get_i32(column::VERSION)?,
            is_deleted: row.get_bool(column::IS_DELETED)?,
            resource_surrogate_id: row.get_i64(column::RESOURCE_SURROGATE_ID)?,
            request_method: row.get_opt_string(column::REQUEST_METHOD)?,
            is_match: row.get_bool(column::IS_MATCH)?,
            raw_resource: row.get_opt_bytes(column::RAW_RESOURCE)?.map(<[u8]>::to_vec),
            is_raw_resource_in_blob_store: row.get_bool(column::IS_RAW_RESOURCE_IN_BLOB_STORE)?,
            link_to_raw_resource: row.get_opt_string(column::LINK_TO_RAW_RESOURCE)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SearchError;
    use crate::expression::SearchParamType;

    fn code_eq(value: &str) -> ExprRef {
        Expression::search_parameter(
            SearchParameterInfo::new("code", "http://example.org/code", SearchParamType::Token),
            Expression::string_equals(FieldName::TokenCode, value),
        )
    }

    #[test]
    fn test_token_is_conjoined_first() {
        let options = SearchOptions::new(Some(code_eq("x")), 10).with_continuation_token("500");
        let expression = search_expression(&options).unwrap().unwrap();
        assert_eq!(
            expression.to_string(),
            "(And (Param _resourceSurrogateId (FieldGreaterThan ResourceSurrogateId 500)) \
             (Param code (StringEquals TokenCode 'x')))"
        );
    }

    #[test]
    fn test_token_alone_and_ignored_when_counting() {
        let options = SearchOptions::new(None, 10).with_continuation_token("500");
        assert!(search_expression(&options).unwrap().is_some());

        let counting = options.clone().with_count_only(true);
        assert!(search_expression(&counting).unwrap().is_none());
    }

    #[test]
    fn test_malformed_token_is_a_user_error() {
        let options = SearchOptions::new(None, 10).with_continuation_token("abc");
        assert!(matches!(
            search_expression(&options),
            Err(StorageError::Search(SearchError::InvalidContinuationToken { .. }))
        ));
    }

    #[test]
    fn test_sort_parameters_are_reported() {
        let options = SearchOptions::new(None, 10).with_sort(
            SearchParameterInfo::new(
                "birthdate",
                "http://example.org/birthdate",
                SearchParamType::Date,
            ),
            true,
        );
        let unsupported = unsupported_sorting_parameters(&options);
        assert_eq!(
            unsupported,
            vec![UnsupportedParameter::new("birthdate", SORT_NOT_SUPPORTED)]
        );
    }
}
