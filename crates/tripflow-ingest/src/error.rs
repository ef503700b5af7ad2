//! Ingestion error types

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tripflow_common::types::IngestionUnit;

use crate::warehouse::WarehouseError;

/// Result type for ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Category of a per-unit failure recorded in a run summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Transport,
    Stage,
    Load,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Transport => write!(f, "transport"),
            FailureKind::Stage => write!(f, "stage"),
            FailureKind::Load => write!(f, "load"),
        }
    }
}

/// Error types for ingestion
#[derive(Debug, Error)]
pub enum IngestError {
    /// Fetch failure: timeout, non-success status or partial transfer
    #[error("Transport error fetching {locator}: {reason}")]
    Transport { locator: String, reason: String },

    /// Stage creation or file transfer failure
    #[error("Stage error for {stage}: {reason}")]
    Stage { stage: String, reason: String },

    /// Bulk-append statement failure
    #[error("Load error into {table}: {reason}")]
    Load { table: String, reason: String },

    #[error("Invalid period range: end {end} is before start {start}")]
    InvalidRange {
        start: IngestionUnit,
        end: IngestionUnit,
    },

    #[error("Warehouse error: {0}")]
    Warehouse(#[from] WarehouseError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Resource error: {0}")]
    Resource(String),

    #[error("Report error: {0}")]
    Report(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IngestError {
    pub fn transport(locator: impl Into<String>, reason: impl ToString) -> Self {
        IngestError::Transport {
            locator: locator.into(),
            reason: reason.to_string(),
        }
    }

    pub fn stage(stage: impl Into<String>, reason: impl ToString) -> Self {
        IngestError::Stage {
            stage: stage.into(),
            reason: reason.to_string(),
        }
    }

    pub fn load(table: impl Into<String>, reason: impl ToString) -> Self {
        IngestError::Load {
            table: table.into(),
            reason: reason.to_string(),
        }
    }

    /// Per-unit category, `None` for errors that are not isolated per unit.
    pub fn kind(&self) -> Option<FailureKind> {
        match self {
            IngestError::Transport { .. } => Some(FailureKind::Transport),
            IngestError::Stage { .. } => Some(FailureKind::Stage),
            IngestError::Load { .. } => Some(FailureKind::Load),
            _ => None,
        }
    }
}
