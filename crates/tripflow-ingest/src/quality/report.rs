//! Quality report values

use serde::{Deserialize, Serialize};

use super::checks::QualityCheck;

/// Count and share of rows failing one check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityMetric {
    #[serde(rename = "name")]
    pub check: QualityCheck,
    pub absolute_count: u64,
    /// `100 * absolute_count / total_rows`, rounded to two decimals
    pub percentage: f64,
}

impl QualityMetric {
    /// Build a metric; `None` when `total_rows` is zero
    pub fn new(check: QualityCheck, absolute_count: u64, total_rows: u64) -> Option<Self> {
        Some(Self {
            check,
            absolute_count,
            percentage: percentage(absolute_count as f64, total_rows)?,
        })
    }

    pub fn name(&self) -> &'static str {
        self.check.name()
    }
}

/// Result of one analysis of the raw table.
///
/// Problem counts overlap: a row failing two checks is counted twice, so
/// `clean_rows_estimate` is a lower-bound approximation and may go negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub total_rows: u64,
    pub metrics: Vec<QualityMetric>,
    pub clean_rows_estimate: i64,
}

impl QualityReport {
    /// Report for an empty table: no metrics at all
    pub fn empty() -> Self {
        Self {
            total_rows: 0,
            metrics: Vec::new(),
            clean_rows_estimate: 0,
        }
    }

    pub fn new(total_rows: u64, metrics: Vec<QualityMetric>) -> Self {
        let problems: u64 = metrics.iter().map(|m| m.absolute_count).sum();
        let clean_rows_estimate = i64::try_from(total_rows)
            .unwrap_or(i64::MAX)
            .saturating_sub(i64::try_from(problems).unwrap_or(i64::MAX));

        Self {
            total_rows,
            metrics,
            clean_rows_estimate,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total_rows == 0
    }

    pub fn metric(&self, check: QualityCheck) -> Option<&QualityMetric> {
        self.metrics.iter().find(|m| m.check == check)
    }

    /// Sum of all problem counts, overlaps included
    pub fn problem_total(&self) -> u64 {
        self.metrics.iter().map(|m| m.absolute_count).sum()
    }

    /// Share of estimated clean rows; `None` for an empty table
    pub fn clean_percentage(&self) -> Option<f64> {
        percentage(self.clean_rows_estimate as f64, self.total_rows)
    }

    /// Cleaning rules warranted by the defects found, in check order
    pub fn recommended_rules(&self) -> Vec<&'static str> {
        self.metrics
            .iter()
            .filter(|m| m.absolute_count > 0)
            .map(|m| m.check.cleaning_rule())
            .collect()
    }
}

fn percentage(count: f64, total_rows: u64) -> Option<f64> {
    if total_rows == 0 {
        return None;
    }
    Some((count * 100.0 / total_rows as f64 * 100.0).round() / 100.0)
}
