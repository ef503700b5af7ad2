//! Raw-table data quality: checks, analysis and report artifacts

pub mod analyzer;
pub mod checks;
pub mod report;
pub mod writer;

pub use analyzer::QualityAnalyzer;
pub use checks::{QualityCheck, EXTREME_DISTANCE_THRESHOLD, REQUIRED_FIELDS};
pub use report::{QualityMetric, QualityReport};
pub use writer::{JsonReportWriter, MarkdownReportWriter, ReportWriter, REPORT_FILE_STEM};
