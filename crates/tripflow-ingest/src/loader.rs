//! Bulk loading of a fetched payload into the raw table
//!
//! Each unit gets a named external stage (`<prefix>_<YYYY_MM>`) over its own
//! object-storage folder. The stage definition is replaced on every load so
//! its URL and access clause always follow the current stage settings.
//! Staged objects are never rolled back; a rerun simply overwrites them.

use std::path::Path;
use tracing::{debug, info, instrument, warn};
use tripflow_common::types::IngestionUnit;

use crate::error::IngestError;
use crate::stage::{ObjectStage, StageLocation};
use crate::warehouse::{quote_literal, TableName, Warehouse};

/// Column of the bulk-load result holding per-file loaded row counts
const ROWS_LOADED_COLUMN: &str = "rows_loaded";

/// Outcome of loading one unit
#[derive(Debug)]
pub struct LoadOutcome {
    pub unit: IngestionUnit,
    pub rows_affected: u64,
    pub error: Option<IngestError>,
}

impl LoadOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    fn failed(unit: IngestionUnit, error: IngestError) -> Self {
        Self {
            unit,
            rows_affected: 0,
            error: Some(error),
        }
    }
}

/// Stages local payloads and appends them into the raw table
pub struct BulkLoader<S: ObjectStage> {
    stage: S,
    raw_table: TableName,
    stage_name_prefix: String,
}

impl<S: ObjectStage> BulkLoader<S> {
    pub fn new(stage: S, raw_table: TableName, stage_name_prefix: impl Into<String>) -> Self {
        Self {
            stage,
            raw_table,
            stage_name_prefix: stage_name_prefix.into(),
        }
    }

    pub fn raw_table(&self) -> &TableName {
        &self.raw_table
    }

    /// Warehouse stage dedicated to `unit`
    pub fn stage_name(&self, unit: &IngestionUnit) -> String {
        stage_name(&self.stage_name_prefix, unit)
    }

    /// Stage and append the payload at `local_path`.
    ///
    /// The local file is removed once the attempt ends, whatever the outcome.
    #[instrument(skip(self, warehouse, local_path), fields(unit = %unit))]
    pub async fn load(
        &self,
        warehouse: &dyn Warehouse,
        unit: IngestionUnit,
        local_path: &Path,
    ) -> LoadOutcome {
        let outcome = match self.stage_and_copy(warehouse, &unit, local_path).await {
            Ok(rows) => {
                info!(rows = rows, table = %self.raw_table, "Payload appended to raw table");
                LoadOutcome {
                    unit,
                    rows_affected: rows,
                    error: None,
                }
            },
            Err(e) => {
                warn!(error = %e, "Load failed");
                LoadOutcome::failed(unit, e)
            },
        };

        remove_local(local_path).await;
        outcome
    }

    async fn stage_and_copy(
        &self,
        warehouse: &dyn Warehouse,
        unit: &IngestionUnit,
        local_path: &Path,
    ) -> Result<u64, IngestError> {
        let stage_name = self.stage_name(unit);
        let location = self.stage.location(unit);
        let file_name = staged_file_name(local_path);

        debug!(stage = %stage_name, url = %location.url(), "Ensuring unit stage");
        warehouse
            .execute(&self.create_stage_sql(&stage_name, &location))
            .await
            .map_err(|e| IngestError::stage(&stage_name, e))?;

        let bytes = self
            .stage
            .upload(local_path, &location, &file_name)
            .await
            .map_err(|e| IngestError::stage(&stage_name, format!("{:#}", e)))?;
        debug!(stage = %stage_name, file = %file_name, bytes = bytes, "Payload staged");

        let result = warehouse
            .execute(&self.copy_sql(&stage_name, &file_name))
            .await
            .map_err(|e| IngestError::load(self.raw_table.as_str(), e))?;

        let rows = result
            .sum_column(ROWS_LOADED_COLUMN)
            .map_err(|e| IngestError::load(self.raw_table.as_str(), e))?
            .or(result.rows_affected)
            .unwrap_or(0);

        Ok(rows)
    }

    fn create_stage_sql(&self, stage_name: &str, location: &StageLocation) -> String {
        let access = self.stage.access_clause();
        let mut sql = format!(
            "CREATE OR REPLACE STAGE {}\n  URL = {}\n",
            stage_name,
            quote_literal(&location.url())
        );
        if !access.is_empty() {
            sql.push_str("  ");
            sql.push_str(&access);
            sql.push('\n');
        }
        sql.push_str("  FILE_FORMAT = (TYPE = 'PARQUET')");
        sql
    }

    fn copy_sql(&self, stage_name: &str, file_name: &str) -> String {
        format!(
            "COPY INTO {}\n  FROM @{}\n  FILES = ({})\n  FILE_FORMAT = (TYPE = 'PARQUET')\n  MATCH_BY_COLUMN_NAME = CASE_INSENSITIVE",
            self.raw_table,
            stage_name,
            quote_literal(file_name)
        )
    }
}

/// Name of the warehouse stage for `unit`, e.g. `raw_stage_2024_01`
pub fn stage_name(prefix: &str, unit: &IngestionUnit) -> String {
    format!("{}_{}", prefix, unit.compact())
}

/// Object name for a transient payload: `<name>.<uuid>.part` becomes `<name>`
fn staged_file_name(local_path: &Path) -> String {
    let name = local_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "payload".to_string());

    let Some(base) = name.strip_suffix(".part") else {
        return name;
    };
    match base.rsplit_once('.') {
        Some((stem, tag)) if tag.len() == 32 && tag.chars().all(|c| c.is_ascii_hexdigit()) => {
            stem.to_string()
        },
        _ => base.to_string(),
    }
}

async fn remove_local(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "Removed local payload"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
        Err(e) => warn!(path = %path.display(), error = %e, "Could not remove local payload"),
    }
}
