//! Durable rendering of quality reports

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::info;

use super::report::QualityReport;
use crate::error::{IngestError, Result};

/// File stem shared by every rendered report
pub const REPORT_FILE_STEM: &str = "raw_data_quality_report";

/// Renders a [`QualityReport`] to an artifact and returns its path
pub trait ReportWriter {
    fn render(&self, report: &QualityReport, table: &str) -> Result<String>;

    fn path(&self) -> PathBuf;

    fn write(&self, report: &QualityReport, table: &str) -> Result<PathBuf> {
        let path = self.path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, self.render(report, table)?)?;
        info!(path = %path.display(), "Quality report written");
        Ok(path)
    }
}

/// Human-readable Markdown report
pub struct MarkdownReportWriter {
    dir: PathBuf,
}

impl MarkdownReportWriter {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }
}

impl ReportWriter for MarkdownReportWriter {
    fn path(&self) -> PathBuf {
        self.dir.join(format!("{}.md", REPORT_FILE_STEM))
    }

    fn render(&self, report: &QualityReport, table: &str) -> Result<String> {
        render_markdown(report, table).map_err(|e| IngestError::Report(e.to_string()))
    }
}

/// Machine-readable JSON report
pub struct JsonReportWriter {
    dir: PathBuf,
}

impl JsonReportWriter {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }
}

impl ReportWriter for JsonReportWriter {
    fn path(&self) -> PathBuf {
        self.dir.join(format!("{}.json", REPORT_FILE_STEM))
    }

    fn render(&self, report: &QualityReport, table: &str) -> Result<String> {
        let value = serde_json::json!({
            "table": table,
            "total_rows": report.total_rows,
            "metrics": report.metrics,
            "clean_rows_estimate": report.clean_rows_estimate,
            "clean_percentage": report.clean_percentage(),
            "clean_rows_estimate_is_approximate": true,
            "recommended_rules": report.recommended_rules(),
        });
        serde_json::to_string_pretty(&value).map_err(|e| IngestError::Report(e.to_string()))
    }
}

fn render_markdown(report: &QualityReport, table: &str) -> std::result::Result<String, std::fmt::Error> {
    let mut out = String::new();
    writeln!(out, "# Raw Data Quality Report")?;
    writeln!(out)?;

    let Some(clean_pct) = report.clean_percentage() else {
        writeln!(out, "No data found in table `{}`; no quality metrics were computed.", table)?;
        return Ok(out);
    };

    writeln!(out, "## Summary")?;
    writeln!(out, "- **Table**: `{}`", table)?;
    writeln!(out, "- **Rows analyzed**: {}", group_thousands(report.total_rows as i64))?;
    writeln!(
        out,
        "- **Estimated clean rows**: {} ({:.2}%)",
        group_thousands(report.clean_rows_estimate),
        clean_pct
    )?;
    writeln!(out)?;
    writeln!(
        out,
        "> The clean-row figure is an approximation. Checks overlap, so a row with \
         several defects is subtracted once per defect and the estimate can understate \
         the clean rows."
    )?;
    writeln!(out)?;

    writeln!(out, "## Issues")?;
    for (index, metric) in report.metrics.iter().enumerate() {
        writeln!(out)?;
        writeln!(out, "### {}. {}", index + 1, metric.check.title())?;
        writeln!(out, "- **Count**: {}", group_thousands(metric.absolute_count as i64))?;
        writeln!(out, "- **Percentage**: {:.2}%", metric.percentage)?;
    }
    writeln!(out)?;

    writeln!(out, "## Recommended Cleaning Rules")?;
    let rules = report.recommended_rules();
    if rules.is_empty() {
        writeln!(out, "- None, no defects found")?;
    }
    for rule in rules {
        writeln!(out, "- {}", rule)?;
    }

    Ok(out)
}

fn group_thousands(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if value < 0 {
        grouped.push('-');
    }
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    grouped
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::quality::{QualityCheck, QualityMetric};
    use tempfile::TempDir;

    fn sample_report() -> QualityReport {
        let metrics = QualityCheck::ALL
            .iter()
            .map(|&check| {
                let count = if check == QualityCheck::MonetaryValidity { 50 } else { 0 };
                QualityMetric::new(check, count, 1000).unwrap()
            })
            .collect();
        QualityReport::new(1000, metrics)
    }

    #[test]
    fn test_group_thousands() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1000), "1,000");
        assert_eq!(group_thousands(41_169_720), "41,169,720");
        assert_eq!(group_thousands(-1234), "-1,234");
    }

    #[test]
    fn test_markdown_report() {
        let md = render_markdown(&sample_report(), "RAW.yellow_taxi_trips").unwrap();
        assert!(md.contains("- **Estimated clean rows**: 950 (95.00%)"));
        assert!(md.contains("### 2. Negative amounts\n- **Count**: 50\n- **Percentage**: 5.00%"));
        assert!(md.contains("approximation"));
        assert!(md.contains("- Drop rows with a negative fare or total amount"));
    }

    #[test]
    fn test_markdown_empty_report() {
        let md = render_markdown(&QualityReport::empty(), "RAW.t").unwrap();
        assert!(md.contains("No data found in table `RAW.t`"));
        assert!(!md.contains("Percentage"));
    }

    #[test]
    fn test_writers_use_stable_paths() {
        let dir = TempDir::new().unwrap();
        let report = sample_report();

        let md_path = MarkdownReportWriter::new(dir.path()).write(&report, "RAW.t").unwrap();
        let json_path = JsonReportWriter::new(dir.path()).write(&report, "RAW.t").unwrap();

        assert_eq!(md_path, dir.path().join("raw_data_quality_report.md"));
        assert_eq!(json_path, dir.path().join("raw_data_quality_report.json"));

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(json_path).unwrap()).unwrap();
        assert_eq!(json["total_rows"], 1000);
        assert_eq!(json["metrics"][1]["name"], "monetary_validity");
        assert_eq!(json["metrics"][1]["percentage"], 5.0);
        assert_eq!(json["clean_rows_estimate_is_approximate"], true);
    }

    #[test]
    fn test_json_empty_report_has_no_percentages() {
        let text = JsonReportWriter::new("/tmp")
            .render(&QualityReport::empty(), "RAW.t")
            .unwrap();
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["metrics"].as_array().unwrap().len(), 0);
        assert!(json["clean_percentage"].is_null());
    }
}
