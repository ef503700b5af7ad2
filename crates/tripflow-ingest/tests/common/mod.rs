//! Shared test doubles for Tripflow ingest integration tests
//!
//! - [`MockWarehouse`]: records every statement and models the raw table row
//!   count (truncate resets it, each bulk append adds the rows configured for
//!   its stage). Individual statements can be scripted to succeed with a
//!   given result or to fail.
//! - [`MockStage`]: object stage that records uploads and can be told to
//!   reject a unit.
//!
//! Every test file includes this module but uses only part of it.
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tripflow_common::types::IngestionUnit;
use tripflow_ingest::config::SourceConfig;
use tripflow_ingest::stage::{unit_location, ObjectStage, StageLocation};
use tripflow_ingest::warehouse::{StatementContext, StatementResult, Warehouse, WarehouseError};

pub const RAW_TABLE: &str = "RAW.yellow_taxi_trips";
pub const STAGE_PREFIX: &str = "raw_stage";
pub const BUCKET: &str = "trip-stage";

/// Parse a `YYYY-MM` unit
pub fn unit(text: &str) -> IngestionUnit {
    text.parse().expect("valid unit")
}

/// Source settings pointing at a mock server
pub fn source_config(server_uri: &str, work_dir: &Path) -> SourceConfig {
    let mut config = SourceConfig::new(
        format!("{}/trip-data/yellow_tripdata_{{year}}-{{month}}.parquet", server_uri),
        work_dir,
    );
    config.fetch_timeout_secs = 2;
    config
}

/// Path served for `unit` by [`source_config`]
pub fn source_path(unit: &str) -> String {
    format!("/trip-data/yellow_tripdata_{}.parquet", unit)
}

/// Fake parquet payload: magic bytes around some filler
pub fn payload(len: usize) -> Vec<u8> {
    let mut bytes = b"PAR1".to_vec();
    bytes.extend(std::iter::repeat(0xAB).take(len.saturating_sub(8)));
    bytes.extend_from_slice(b"PAR1");
    bytes
}

/// Files left in a directory
pub fn files_in(dir: &Path) -> Vec<PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
        Err(_) => Vec::new(),
    }
}

// ============================================================================
// Warehouse
// ============================================================================

enum Scripted {
    Result(StatementResult),
    Error(String),
}

#[derive(Default)]
struct WarehouseState {
    statements: Vec<String>,
    contexts: Vec<StatementContext>,
    raw_rows: u64,
    copied_stages: Vec<String>,
}

/// In-memory warehouse session
#[derive(Default)]
pub struct MockWarehouse {
    rules: Mutex<Vec<(String, Scripted)>>,
    copy_rows: Mutex<HashMap<String, u64>>,
    state: Mutex<WarehouseState>,
}

impl MockWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Statements containing `pattern` return `result` (first match wins)
    pub fn on(&self, pattern: &str, result: StatementResult) -> &Self {
        self.rules
            .lock()
            .unwrap()
            .push((pattern.to_string(), Scripted::Result(result)));
        self
    }

    /// Statements containing `pattern` return a count
    pub fn on_count(&self, pattern: &str, count: u64) -> &Self {
        self.on(pattern, StatementResult::scalar("COUNT(*)", count))
    }

    /// Statements containing `pattern` are rejected with `message`
    pub fn fail_on(&self, pattern: &str, message: &str) -> &Self {
        self.rules
            .lock()
            .unwrap()
            .push((pattern.to_string(), Scripted::Error(message.to_string())));
        self
    }

    /// Rows appended by a bulk load from `stage`
    pub fn copy_rows(&self, stage: &str, rows: u64) -> &Self {
        self.copy_rows.lock().unwrap().insert(stage.to_string(), rows);
        self
    }

    /// Preset raw table content
    pub fn set_raw_rows(&self, rows: u64) -> &Self {
        self.state.lock().unwrap().raw_rows = rows;
        self
    }

    pub fn raw_rows(&self) -> u64 {
        self.state.lock().unwrap().raw_rows
    }

    pub fn statements(&self) -> Vec<String> {
        self.state.lock().unwrap().statements.clone()
    }

    /// Context each recorded statement ran under, in order
    pub fn contexts(&self) -> Vec<StatementContext> {
        self.state.lock().unwrap().contexts.clone()
    }

    /// Role override of the first statement containing `pattern`
    pub fn role_for(&self, pattern: &str) -> Option<String> {
        let state = self.state.lock().unwrap();
        state
            .statements
            .iter()
            .position(|s| s.contains(pattern))
            .and_then(|i| state.contexts[i].role.clone())
    }

    /// Stages a bulk load succeeded from, in order
    pub fn copied_stages(&self) -> Vec<String> {
        self.state.lock().unwrap().copied_stages.clone()
    }

    pub fn statements_containing(&self, pattern: &str) -> Vec<String> {
        self.statements()
            .into_iter()
            .filter(|s| s.contains(pattern))
            .collect()
    }

    fn scripted(&self, sql: &str) -> Option<Result<StatementResult, WarehouseError>> {
        let rules = self.rules.lock().unwrap();
        rules
            .iter()
            .find(|(pattern, _)| sql.contains(pattern.as_str()))
            .map(|(_, scripted)| match scripted {
                Scripted::Result(result) => Ok(result.clone()),
                Scripted::Error(message) => Err(WarehouseError::rejected("002003", message.clone())),
            })
    }

    fn modelled(&self, sql: &str) -> StatementResult {
        let trimmed = sql.trim();
        let mut state = self.state.lock().unwrap();

        if trimmed.starts_with("TRUNCATE TABLE") {
            state.raw_rows = 0;
            return StatementResult::status("Statement executed successfully.");
        }

        if trimmed.starts_with("COPY INTO") {
            let stage = trimmed
                .split('@')
                .nth(1)
                .and_then(|rest| rest.split_whitespace().next())
                .unwrap_or_default()
                .to_string();
            let rows = self.copy_rows.lock().unwrap().get(&stage).copied().unwrap_or(0);
            state.raw_rows += rows;
            state.copied_stages.push(stage.clone());
            return StatementResult {
                columns: vec![
                    "file".into(),
                    "status".into(),
                    "rows_parsed".into(),
                    "rows_loaded".into(),
                ],
                rows: vec![vec![
                    Some(format!("s3://{}/{}.parquet", BUCKET, stage)),
                    Some("LOADED".into()),
                    Some(rows.to_string()),
                    Some(rows.to_string()),
                ]],
                rows_affected: None,
            };
        }

        if trimmed == format!("SELECT COUNT(*) FROM {}", RAW_TABLE) {
            return StatementResult::scalar("COUNT(*)", state.raw_rows);
        }

        if trimmed.starts_with("SELECT COUNT(*)") {
            return StatementResult::scalar("COUNT(*)", 0);
        }

        StatementResult::status("Statement executed successfully.")
    }
}

#[async_trait]
impl Warehouse for MockWarehouse {
    async fn execute_in(
        &self,
        context: &StatementContext,
        sql: &str,
        _bindings: &[String],
    ) -> Result<StatementResult, WarehouseError> {
        {
            let mut state = self.state.lock().unwrap();
            state.statements.push(sql.to_string());
            state.contexts.push(context.clone());
        }

        match self.scripted(sql) {
            Some(outcome) => outcome,
            None => Ok(self.modelled(sql)),
        }
    }
}

// ============================================================================
// Object stage
// ============================================================================

/// Upload seen by [`MockStage`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub key: String,
    pub bytes: u64,
}

pub struct MockStage {
    bucket: String,
    key_prefix: String,
    uploads: Mutex<Vec<Upload>>,
    reject: Mutex<Vec<String>>,
}

impl MockStage {
    pub fn new() -> Self {
        Self::at(BUCKET, "tripflow/raw")
    }

    /// Stage rooted at another bucket and key prefix
    pub fn at(bucket: &str, key_prefix: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            key_prefix: key_prefix.to_string(),
            uploads: Mutex::new(Vec::new()),
            reject: Mutex::new(Vec::new()),
        }
    }

    /// Fail uploads whose object key contains `pattern`
    pub fn reject(&self, pattern: &str) -> &Self {
        self.reject.lock().unwrap().push(pattern.to_string());
        self
    }

    pub fn uploads(&self) -> Vec<Upload> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStage for MockStage {
    fn location(&self, unit: &IngestionUnit) -> StageLocation {
        unit_location(&self.bucket, &self.key_prefix, unit)
    }

    fn access_clause(&self) -> String {
        "STORAGE_INTEGRATION = TRIP_S3_INT".to_string()
    }

    async fn upload(
        &self,
        local_path: &Path,
        location: &StageLocation,
        file_name: &str,
    ) -> anyhow::Result<u64> {
        let key = location.object_key(file_name);
        if self.reject.lock().unwrap().iter().any(|p| key.contains(p.as_str())) {
            anyhow::bail!("Access Denied for {}", key);
        }

        let bytes = tokio::fs::metadata(local_path).await?.len();
        self.uploads.lock().unwrap().push(Upload { key, bytes });
        Ok(bytes)
    }
}
