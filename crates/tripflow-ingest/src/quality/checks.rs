//! Fixed battery of raw-table quality checks

use serde::{Deserialize, Serialize};
use std::fmt;

/// Trip distance above which a row counts as an extreme outlier
pub const EXTREME_DISTANCE_THRESHOLD: u32 = 1000;

/// Fields that must all be present for a row to count as complete
pub const REQUIRED_FIELDS: &[&str] = &[
    "vendorid",
    "tpep_pickup_datetime",
    "tpep_dropoff_datetime",
    "passenger_count",
    "trip_distance",
    "ratecodeid",
    "store_and_fwd_flag",
    "pulocationid",
    "dolocationid",
    "payment_type",
    "fare_amount",
    "total_amount",
    "congestion_surcharge",
    "airport_fee",
];

/// One quantitative check, evaluated as its own full-table count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityCheck {
    Completeness,
    MonetaryValidity,
    ZeroDistance,
    ExtremeDistance,
    TemporalConsistency,
}

impl QualityCheck {
    /// Every check, in evaluation order
    pub const ALL: [QualityCheck; 5] = [
        QualityCheck::Completeness,
        QualityCheck::MonetaryValidity,
        QualityCheck::ZeroDistance,
        QualityCheck::ExtremeDistance,
        QualityCheck::TemporalConsistency,
    ];

    pub fn name(self) -> &'static str {
        match self {
            QualityCheck::Completeness => "completeness",
            QualityCheck::MonetaryValidity => "monetary_validity",
            QualityCheck::ZeroDistance => "zero_distance",
            QualityCheck::ExtremeDistance => "extreme_distance",
            QualityCheck::TemporalConsistency => "temporal_consistency",
        }
    }

    /// Heading used in rendered reports
    pub fn title(self) -> &'static str {
        match self {
            QualityCheck::Completeness => "Missing values",
            QualityCheck::MonetaryValidity => "Negative amounts",
            QualityCheck::ZeroDistance => "Zero-distance trips",
            QualityCheck::ExtremeDistance => "Extreme distances (> 1000 miles)",
            QualityCheck::TemporalConsistency => "Inconsistent timestamps",
        }
    }

    /// `WHERE` predicate selecting the defective rows
    pub fn predicate(self) -> String {
        match self {
            QualityCheck::Completeness => REQUIRED_FIELDS
                .iter()
                .map(|field| format!("{} IS NULL", field))
                .collect::<Vec<_>>()
                .join("\n   OR "),
            QualityCheck::MonetaryValidity => "fare_amount < 0 OR total_amount < 0".to_string(),
            QualityCheck::ZeroDistance => "trip_distance = 0".to_string(),
            QualityCheck::ExtremeDistance => {
                format!("trip_distance > {}", EXTREME_DISTANCE_THRESHOLD)
            },
            QualityCheck::TemporalConsistency => {
                "tpep_dropoff_datetime <= tpep_pickup_datetime".to_string()
            },
        }
    }

    /// Count query for this check against `table`
    pub fn count_sql(self, table: &str) -> String {
        format!("SELECT COUNT(*) FROM {}\nWHERE {}", table, self.predicate())
    }

    /// Cleaning rule the staging layer applies when this check finds defects
    pub fn cleaning_rule(self) -> &'static str {
        match self {
            QualityCheck::Completeness => "Drop rows missing any required field",
            QualityCheck::MonetaryValidity => "Drop rows with a negative fare or total amount",
            QualityCheck::ZeroDistance => "Drop zero-distance trips",
            QualityCheck::ExtremeDistance => "Drop trips longer than 1000 miles",
            QualityCheck::TemporalConsistency => "Drop trips whose dropoff is not after pickup",
        }
    }
}

impl fmt::Display for QualityCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
