//! Per-unit fetch and load across a whole run
//!
//! The raw table is truncated once before the first unit. Units are then
//! processed strictly in order; a failed unit is recorded in the
//! [`RunSummary`] and the run moves on to the next one. Rerunning the whole
//! pipeline is the retry mechanism.

use serde::Serialize;
use std::fmt;
use tracing::{debug, error, info, instrument, warn};
use tripflow_common::types::IngestionUnit;

use crate::error::{FailureKind, IngestError, Result};
use crate::fetcher::UnitFetcher;
use crate::loader::BulkLoader;
use crate::stage::ObjectStage;
use crate::warehouse::Warehouse;

/// Processing state of one unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    Pending,
    Fetching,
    FetchFailed,
    Fetched,
    Loading,
    LoadFailed,
    Loaded,
}

impl UnitState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            UnitState::FetchFailed | UnitState::LoadFailed | UnitState::Loaded
        )
    }

    /// Whether `next` is a legal successor of this state
    pub fn can_become(self, next: UnitState) -> bool {
        use UnitState::*;
        matches!(
            (self, next),
            (Pending, Fetching)
                | (Fetching, FetchFailed)
                | (Fetching, Fetched)
                | (Fetched, Loading)
                | (Loading, LoadFailed)
                | (Loading, Loaded)
        )
    }
}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UnitState::Pending => "PENDING",
            UnitState::Fetching => "FETCHING",
            UnitState::FetchFailed => "FETCH_FAILED",
            UnitState::Fetched => "FETCHED",
            UnitState::Loading => "LOADING",
            UnitState::LoadFailed => "LOAD_FAILED",
            UnitState::Loaded => "LOADED",
        };
        f.write_str(name)
    }
}

/// Successful unit and the rows it appended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitLoad {
    pub unit: IngestionUnit,
    pub rows: u64,
}

/// Failed unit with the category and text of its error
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitFailure {
    pub unit: IngestionUnit,
    pub kind: FailureKind,
    pub error: String,
}

/// Aggregate outcome of one run.
///
/// Counters only grow through [`record_success`](Self::record_success) and
/// [`record_failure`](Self::record_failure), which keeps
/// `succeeded + failed.len() == attempted` at all times.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    attempted: usize,
    succeeded: usize,
    loaded: Vec<UnitLoad>,
    failed: Vec<UnitFailure>,
    total_raw_rows: Option<u64>,
}

impl RunSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&mut self, unit: IngestionUnit, rows: u64) {
        self.attempted += 1;
        self.succeeded += 1;
        self.loaded.push(UnitLoad { unit, rows });
    }

    pub fn record_failure(&mut self, unit: IngestionUnit, kind: FailureKind, error: &IngestError) {
        self.attempted += 1;
        self.failed.push(UnitFailure {
            unit,
            kind,
            error: error.to_string(),
        });
    }

    fn set_total_raw_rows(&mut self, total: Option<u64>) {
        self.total_raw_rows = total;
    }

    pub fn attempted(&self) -> usize {
        self.attempted
    }

    pub fn succeeded(&self) -> usize {
        self.succeeded
    }

    /// Successful units in processing order
    pub fn loaded(&self) -> &[UnitLoad] {
        &self.loaded
    }

    /// Failed units in processing order
    pub fn failed(&self) -> &[UnitFailure] {
        &self.failed
    }

    /// Raw table row count after the run; `None` if the count query failed
    pub fn total_raw_rows(&self) -> Option<u64> {
        self.total_raw_rows
    }

    /// Rows appended by this run
    pub fn rows_loaded(&self) -> u64 {
        self.loaded.iter().map(|l| l.rows).sum()
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Drives fetch then load for every unit of a run
pub struct IngestionOrchestrator<S: ObjectStage> {
    fetcher: UnitFetcher,
    loader: BulkLoader<S>,
}

impl<S: ObjectStage> IngestionOrchestrator<S> {
    pub fn new(fetcher: UnitFetcher, loader: BulkLoader<S>) -> Self {
        Self { fetcher, loader }
    }

    /// Run `units` in order against the raw table.
    ///
    /// Only a failed truncate is returned as an error; per-unit failures end
    /// up in the summary.
    #[instrument(skip(self, warehouse, units), fields(units = units.len(), table = %self.loader.raw_table()))]
    pub async fn run(&self, warehouse: &dyn Warehouse, units: &[IngestionUnit]) -> Result<RunSummary> {
        let table = self.loader.raw_table().clone();

        warehouse
            .execute(&format!("TRUNCATE TABLE {}", table))
            .await
            .map_err(|e| {
                error!(error = %e, "Could not truncate raw table, aborting run");
                IngestError::from(e)
            })?;
        info!("Raw table truncated");

        let mut summary = RunSummary::new();
        let total = units.len();

        for (index, unit) in units.iter().copied().enumerate() {
            info!(unit = %unit, "Processing unit {}/{}", index + 1, total);
            self.process_unit(warehouse, unit, &mut summary).await;
        }

        let total_raw_rows = match warehouse.count(&format!("SELECT COUNT(*) FROM {}", table)).await {
            Ok(n) => Some(n),
            Err(e) => {
                warn!(error = %e, "Could not count raw rows after run");
                None
            },
        };
        summary.set_total_raw_rows(total_raw_rows);

        info!(
            attempted = summary.attempted(),
            succeeded = summary.succeeded(),
            failed = summary.failed().len(),
            rows_loaded = summary.rows_loaded(),
            total_raw_rows = ?summary.total_raw_rows(),
            "Ingestion run finished: {}/{} units loaded",
            summary.succeeded(),
            summary.attempted()
        );

        Ok(summary)
    }

    async fn process_unit(&self, warehouse: &dyn Warehouse, unit: IngestionUnit, summary: &mut RunSummary) {
        let mut state = UnitState::Pending;

        advance(unit, &mut state, UnitState::Fetching);
        let fetched = self.fetcher.fetch(unit).await;

        let local_path = match (fetched.local_path, fetched.error) {
            (Some(path), None) => path,
            (_, error) => {
                advance(unit, &mut state, UnitState::FetchFailed);
                let error = error.unwrap_or_else(|| {
                    IngestError::transport(&fetched.locator, "no payload produced")
                });
                warn!(unit = %unit, state = %state, error = %error, "Unit skipped");
                let kind = error.kind().unwrap_or(FailureKind::Transport);
                summary.record_failure(unit, kind, &error);
                return;
            },
        };
        advance(unit, &mut state, UnitState::Fetched);

        advance(unit, &mut state, UnitState::Loading);
        let outcome = self.loader.load(warehouse, unit, &local_path).await;

        match outcome.error {
            None => {
                advance(unit, &mut state, UnitState::Loaded);
                info!(unit = %unit, state = %state, rows = outcome.rows_affected, "Unit loaded");
                summary.record_success(unit, outcome.rows_affected);
            },
            Some(error) => {
                advance(unit, &mut state, UnitState::LoadFailed);
                warn!(unit = %unit, state = %state, error = %error, "Unit failed");
                let kind = error.kind().unwrap_or(FailureKind::Load);
                summary.record_failure(unit, kind, &error);
            },
        }
    }
}

fn advance(unit: IngestionUnit, state: &mut UnitState, next: UnitState) {
    debug_assert!(state.can_become(next), "illegal transition {} -> {}", state, next);
    debug!(unit = %unit, from = %state, to = %next, "Unit state change");
    *state = next;
}
