//! Quality analysis over the raw table

use tracing::{info, instrument, warn};

use super::checks::QualityCheck;
use super::report::{QualityMetric, QualityReport};
use crate::error::Result;
use crate::warehouse::{TableName, Warehouse};

/// Runs every [`QualityCheck`] against the raw table.
///
/// Each check is its own full-table count; nothing is cached between runs,
/// so two analyses of an unchanged table produce equal reports.
pub struct QualityAnalyzer {
    raw_table: TableName,
}

impl QualityAnalyzer {
    pub fn new(raw_table: TableName) -> Self {
        Self { raw_table }
    }

    #[instrument(skip(self, warehouse), fields(table = %self.raw_table))]
    pub async fn analyze(&self, warehouse: &dyn Warehouse) -> Result<QualityReport> {
        let total_rows = warehouse
            .count(&format!("SELECT COUNT(*) FROM {}", self.raw_table))
            .await?;
        info!(total_rows = total_rows, "Analyzing raw data quality");

        if total_rows == 0 {
            warn!("Raw table is empty, no quality metrics computed");
            return Ok(QualityReport::empty());
        }

        let mut metrics = Vec::with_capacity(QualityCheck::ALL.len());
        for check in QualityCheck::ALL {
            let count = warehouse.count(&check.count_sql(self.raw_table.as_str())).await?;
            let Some(metric) = QualityMetric::new(check, count, total_rows) else {
                continue;
            };

            if count > 0 {
                warn!(check = %check, count = count, percentage = metric.percentage, "{}", check.title());
            } else {
                info!(check = %check, "No defects");
            }
            metrics.push(metric);
        }

        let report = QualityReport::new(total_rows, metrics);
        info!(
            clean_rows_estimate = report.clean_rows_estimate,
            clean_percentage = ?report.clean_percentage(),
            "Quality analysis complete"
        );
        Ok(report)
    }
}
