//! Test doubles for the database and object store collaborators.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use helios_sql_search::error::{BackendError, StorageResult};
use helios_sql_search::expression::{
    ExprRef, Expression, FieldName, SearchParamType, SearchParameterInfo,
};
use helios_sql_search::search::{
    ObjectStoreError, RawResourceStore, SqlCommandExecutor, SqlRow, SqlValue, encode_raw_resource,
};
use helios_sql_search::sql::{InMemorySearchModel, SqlCommand};
use helios_sql_search::{SqlSearchConfig, SqlSearchService};

pub const PATIENT: i16 = 103;
pub const OBSERVATION: i16 = 96;

/// First surrogate id of 2024-01-01T00:00:00Z.
pub const BASE_SURROGATE_ID: i64 = 63_839_664_000_000 * 80_000;

pub fn model() -> InMemorySearchModel {
    let model = InMemorySearchModel::new();
    model.add_resource_type("Observation", OBSERVATION);
    model.add_resource_type("Patient", PATIENT);
    model.add_search_param("http://example.org/code", 8);
    model.add_search_param("http://example.org/name", 7);
    model.add_search_param("http://example.org/subject", 9);
    model
}

pub fn param(name: &str, param_type: SearchParamType) -> SearchParameterInfo {
    SearchParameterInfo::new(name, format!("http://example.org/{name}"), param_type)
}

pub fn code_eq(value: &str) -> ExprRef {
    Expression::search_parameter(
        param("code", SearchParamType::Token),
        Expression::string_equals(FieldName::TokenCode, value),
    )
}

#[derive(Debug, Default)]
struct ExecutorState {
    responses: VecDeque<StorageResult<Vec<SqlRow>>>,
    commands: Vec<SqlCommand>,
    delay: Option<Duration>,
}

/// Replays queued responses and records every executed command.
#[derive(Debug, Clone, Default)]
pub struct MockExecutor {
    state: Arc<Mutex<ExecutorState>>,
}

impl MockExecutor {
    pub fn respond(&self, rows: Vec<SqlRow>) -> &Self {
        self.state.lock().unwrap().responses.push_back(Ok(rows));
        self
    }

    pub fn fail(&self, error: BackendError) -> &Self {
        self.state
            .lock()
            .unwrap()
            .responses
            .push_back(Err(error.into()));
        self
    }

    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().unwrap().delay = Some(delay);
    }

    pub fn commands(&self) -> Vec<SqlCommand> {
        self.state.lock().unwrap().commands.clone()
    }
}

#[async_trait]
impl SqlCommandExecutor for MockExecutor {
    async fn execute_reader(
        &self,
        command: &SqlCommand,
        _cancellation: &CancellationToken,
    ) -> StorageResult<Vec<SqlRow>> {
        let (response, delay) = {
            let mut state = self.state.lock().unwrap();
            state.commands.push(command.clone());
            (state.responses.pop_front(), state.delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        response.unwrap_or_else(|| Ok(Vec::new()))
    }
}

#[derive(Debug, Default)]
struct StoreState {
    objects: HashMap<(String, String), Vec<u8>>,
    fail: bool,
    requests: Vec<(String, String)>,
}

/// An in-memory object store.
#[derive(Debug, Clone, Default)]
pub struct MockStore {
    state: Arc<Mutex<StoreState>>,
}

impl MockStore {
    pub fn put(&self, bucket: &str, key: &str, body: &str) {
        self.state.lock().unwrap().objects.insert(
            (bucket.to_string(), key.to_string()),
            body.as_bytes().to_vec(),
        );
    }

    pub fn set_fail(&self, fail: bool) {
        self.state.lock().unwrap().fail = fail;
    }

    pub fn requests(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().requests.clone()
    }
}

#[async_trait]
impl RawResourceStore for MockStore {
    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<Option<Vec<u8>>, ObjectStoreError> {
        let mut state = self.state.lock().unwrap();
        state.requests.push((bucket.to_string(), key.to_string()));
        if state.fail {
            return Err(ObjectStoreError::Unavailable("connection reset".to_string()));
        }
        Ok(state
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned())
    }
}

pub struct Harness {
    pub service: SqlSearchService,
    pub executor: MockExecutor,
    pub store: MockStore,
}

pub fn harness() -> Harness {
    harness_with(SqlSearchConfig::default())
}

pub fn harness_with(config: SqlSearchConfig) -> Harness {
    let executor = MockExecutor::default();
    let store = MockStore::default();
    let service = SqlSearchService::new(
        config,
        Arc::new(executor.clone()),
        Arc::new(store.clone()),
        Arc::new(model()),
    )
    .unwrap();
    Harness {
        service,
        executor,
        store,
    }
}

/// A result row for a resource whose body is stored inline.
pub fn row(resource_type_id: i16, id: &str, surrogate_id: i64, is_match: bool) -> SqlRow {
    let body = format!(r#"{{"id":"{id}"}}"#);
    SqlRow::new(vec![
        SqlValue::SmallInt(resource_type_id),
        SqlValue::NVarChar(id.to_string()),
        SqlValue::Int(1),
        SqlValue::Bit(false),
        SqlValue::BigInt(surrogate_id),
        SqlValue::NVarChar("PUT".to_string()),
        SqlValue::Bit(is_match),
        SqlValue::VarBinary(encode_raw_resource(&body).unwrap()),
        SqlValue::Bit(false),
        SqlValue::Null,
    ])
}

/// A result row for a resource whose body lives in the object store.
pub fn blob_row(resource_type_id: i16, id: &str, surrogate_id: i64, key: &str) -> SqlRow {
    SqlRow::new(vec![
        SqlValue::SmallInt(resource_type_id),
        SqlValue::NVarChar(id.to_string()),
        SqlValue::Int(2),
        SqlValue::Bit(false),
        SqlValue::BigInt(surrogate_id),
        SqlValue::Null,
        SqlValue::Bit(true),
        SqlValue::Null,
        SqlValue::Bit(true),
        SqlValue::NVarChar(key.to_string()),
    ])
}

pub fn count_row(count: i32) -> SqlRow {
    SqlRow::new(vec![SqlValue::Int(count)])
}

/// `n` matching patient rows with increasing surrogate ids.
pub fn patient_rows(n: usize) -> Vec<SqlRow> {
    (0..n)
        .map(|i| {
            row(
                PATIENT,
                &format!("p{i}"),
                BASE_SURROGATE_ID + (i as i64 + 1) * 80_000,
                true,
            )
        })
        .collect()
}
