//! Warehouse-side transformations from the raw layer to staging and final marts
//!
//! A transformation is a named, idempotent operation whose statement body is
//! an opaque resource. This module only decides when each one runs and what
//! happens on failure.

pub mod resources;
pub mod statements;

use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use crate::config::TableConfig;
use crate::error::{IngestError, Result};
use crate::warehouse::{StatementContext, TableName, Warehouse, WarehouseError};

pub use resources::{FsResourceLoader, ResourceLoader};
pub use statements::split_statements;

/// A named operation producing `output` from the statement text in `resource`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transformation {
    pub name: String,
    pub resource: String,
    pub output: TableName,
}

impl Transformation {
    pub fn new(name: impl Into<String>, resource: impl Into<String>, output: TableName) -> Self {
        Self {
            name: name.into(),
            resource: resource.into(),
            output,
        }
    }
}

/// Staging table first, then the final marts built from it
pub fn default_plan(tables: &TableConfig) -> Result<Vec<Transformation>> {
    let mut plan = vec![Transformation::new(
        "staging_clean_trips",
        "staging_clean_trips.sql",
        tables.staging_table.clone(),
    )];

    for mart in ["daily_summary", "zone_analysis", "hourly_patterns"] {
        let output: TableName = format!("{}.{}", tables.final_schema, mart).parse()?;
        plan.push(Transformation::new(
            format!("final_{}", mart),
            format!("final_{}.sql", mart),
            output,
        ));
    }

    Ok(plan)
}

/// Completed transformation and the row count of its output
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransformOutcome {
    pub name: String,
    pub output: String,
    pub rows: u64,
}

/// Outcome of a transformation plan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransformSummary {
    pub completed: Vec<TransformOutcome>,
    /// First failing transformation and its error; later ones never ran
    pub failed: Option<(String, String)>,
    pub skipped: Vec<String>,
}

impl TransformSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_none()
    }
}

/// Runs transformations in order, stopping at the first failure
pub struct TransformRunner<L: ResourceLoader> {
    resources: L,
}

impl<L: ResourceLoader> TransformRunner<L> {
    pub fn new(resources: L) -> Self {
        Self { resources }
    }

    #[instrument(skip(self, warehouse, plan), fields(transformations = plan.len()))]
    pub async fn run(&self, warehouse: &dyn Warehouse, plan: &[Transformation]) -> TransformSummary {
        let mut summary = TransformSummary::default();

        for (index, step) in plan.iter().enumerate() {
            match self.apply(warehouse, step).await {
                Ok(rows) => {
                    info!(transformation = %step.name, output = %step.output, rows = rows, "Transformation applied");
                    summary.completed.push(TransformOutcome {
                        name: step.name.clone(),
                        output: step.output.to_string(),
                        rows,
                    });
                },
                Err(e) => {
                    error!(transformation = %step.name, error = %e, "Transformation failed");
                    summary.failed = Some((step.name.clone(), e.to_string()));
                    summary.skipped = plan[index + 1..].iter().map(|t| t.name.clone()).collect();
                    if !summary.skipped.is_empty() {
                        warn!(skipped = ?summary.skipped, "Dependent transformations not run");
                    }
                    break;
                },
            }
        }

        summary
    }

    async fn apply(&self, warehouse: &dyn Warehouse, step: &Transformation) -> Result<u64> {
        let script = self.resources.load(&step.resource)?;
        let mut context = StatementContext::default();
        let executed = execute_script(warehouse, &script, &mut context).await?;
        if executed == 0 {
            return Err(IngestError::Resource(format!("{} contains no statements", step.resource)));
        }
        debug!(transformation = %step.name, statements = executed, "Script executed");

        let count_sql = format!("SELECT COUNT(*) FROM {}", step.output);
        Ok(warehouse.execute_in(&context, &count_sql, &[]).await?.scalar_u64()?)
    }
}

/// Run every statement of `script` in order, stopping at the first failure.
///
/// `USE ...` statements only update `context`, which every later statement
/// is sent with; the updated context stays available to the caller. Returns
/// the number of statements sent.
pub async fn execute_script(
    warehouse: &dyn Warehouse,
    script: &str,
    context: &mut StatementContext,
) -> std::result::Result<usize, WarehouseError> {
    let mut executed = 0;
    for statement in split_statements(script) {
        if context.apply_use(&statement) {
            debug!(statement = %statement.trim(), "Session context updated");
            continue;
        }
        warehouse.execute_in(context, &statement, &[]).await?;
        executed += 1;
    }
    Ok(executed)
}

/// Row counts across the raw and staging layers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LayerSummary {
    pub raw_rows: u64,
    pub staging_rows: u64,
}

impl LayerSummary {
    pub async fn collect(warehouse: &dyn Warehouse, raw: &TableName, staging: &TableName) -> Result<Self> {
        let raw_rows = warehouse.count(&format!("SELECT COUNT(*) FROM {}", raw)).await?;
        let staging_rows = warehouse.count(&format!("SELECT COUNT(*) FROM {}", staging)).await?;
        Ok(Self { raw_rows, staging_rows })
    }

    /// Share of raw rows kept by cleaning; `None` when the raw layer is empty
    pub fn retention_percentage(&self) -> Option<f64> {
        if self.raw_rows == 0 {
            return None;
        }
        Some((self.staging_rows as f64 * 100.0 / self.raw_rows as f64 * 100.0).round() / 100.0)
    }

    pub fn removed_rows(&self) -> u64 {
        self.raw_rows.saturating_sub(self.staging_rows)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn tables() -> TableConfig {
        TableConfig {
            raw_table: "RAW.yellow_taxi_trips".parse().unwrap(),
            staging_table: "STAGING.clean_trips".parse().unwrap(),
            final_schema: "FINAL".to_string(),
        }
    }

    #[test]
    fn test_default_plan_order() {
        let plan = default_plan(&tables()).unwrap();
        let outputs: Vec<String> = plan.iter().map(|t| t.output.to_string()).collect();
        assert_eq!(
            outputs,
            vec![
                "STAGING.clean_trips",
                "FINAL.daily_summary",
                "FINAL.zone_analysis",
                "FINAL.hourly_patterns"
            ]
        );
        assert_eq!(plan[2].resource, "final_zone_analysis.sql");
    }

    #[test]
    fn test_default_plan_rejects_bad_schema() {
        let mut t = tables();
        t.final_schema = "FINAL; DROP".to_string();
        assert!(default_plan(&t).is_err());
    }

    #[test]
    fn test_layer_retention() {
        let layers = LayerSummary { raw_rows: 200, staging_rows: 150 };
        assert_eq!(layers.retention_percentage(), Some(75.0));
        assert_eq!(layers.removed_rows(), 50);
        assert_eq!(LayerSummary { raw_rows: 0, staging_rows: 0 }.retention_percentage(), None);
    }
}
