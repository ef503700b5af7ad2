//! Common types used across Tripflow

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CommonError;

/// Earliest year accepted for an ingestion unit.
pub const MIN_YEAR: i32 = 1;

/// Latest year accepted for an ingestion unit.
pub const MAX_YEAR: i32 = 9999;

/// One monthly batch window of the source dataset.
///
/// Units are plain values: ordering is chronological (year first, then
/// month) and two units are equal exactly when they name the same calendar
/// month. They serialize as `"YYYY-MM"`.
///
/// # Examples
///
/// ```
/// use tripflow_common::types::IngestionUnit;
///
/// let unit: IngestionUnit = "2024-03".parse().unwrap();
/// assert_eq!(unit.year(), 2024);
/// assert_eq!(unit.month(), 3);
/// assert_eq!(unit.to_string(), "2024-03");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IngestionUnit {
    year: i32,
    month: u32,
}

impl IngestionUnit {
    /// Build a unit, rejecting months outside 1..=12 and years outside
    /// [`MIN_YEAR`]..=[`MAX_YEAR`].
    pub fn new(year: i32, month: u32) -> Result<Self, CommonError> {
        if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
            return Err(CommonError::InvalidPeriod {
                input: format!("{}-{:02}", year, month),
                reason: format!("year must be between {} and {}", MIN_YEAR, MAX_YEAR),
            });
        }
        if !(1..=12).contains(&month) {
            return Err(CommonError::InvalidPeriod {
                input: format!("{}-{:02}", year, month),
                reason: "month must be between 1 and 12".to_string(),
            });
        }
        Ok(Self { year, month })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// The following calendar month, or `None` past [`MAX_YEAR`].
    pub fn next(&self) -> Option<Self> {
        if self.month == 12 {
            if self.year >= MAX_YEAR {
                return None;
            }
            Some(Self {
                year: self.year + 1,
                month: 1,
            })
        } else {
            Some(Self {
                year: self.year,
                month: self.month + 1,
            })
        }
    }

    /// The preceding calendar month, or `None` before [`MIN_YEAR`].
    pub fn previous(&self) -> Option<Self> {
        if self.month == 1 {
            if self.year <= MIN_YEAR {
                return None;
            }
            Some(Self {
                year: self.year - 1,
                month: 12,
            })
        } else {
            Some(Self {
                year: self.year,
                month: self.month - 1,
            })
        }
    }

    /// Identifier-safe form, e.g. `2024_01`, used in stage and key names.
    pub fn compact(&self) -> String {
        format!("{}_{:02}", self.year, self.month)
    }

    /// Number of months from `self` to `other`, negative when `other` is earlier.
    pub fn months_until(&self, other: &IngestionUnit) -> i64 {
        (i64::from(other.year) - i64::from(self.year)) * 12
            + (i64::from(other.month) - i64::from(self.month))
    }

    /// Unit containing the given calendar date.
    pub fn containing(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }
}

impl fmt::Display for IngestionUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02}", self.year, self.month)
    }
}

impl FromStr for IngestionUnit {
    type Err = CommonError;

    /// Accepts `YYYY-MM` or `YYYY_MM`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let invalid = |reason: &str| CommonError::InvalidPeriod {
            input: s.to_string(),
            reason: reason.to_string(),
        };

        let (year, month) = trimmed
            .split_once(['-', '_'])
            .ok_or_else(|| invalid("expected YYYY-MM"))?;

        if year.len() != 4 || month.len() != 2 {
            return Err(invalid("expected YYYY-MM"));
        }

        let year: i32 = year.parse().map_err(|_| invalid("year is not a number"))?;
        let month: u32 = month.parse().map_err(|_| invalid("month is not a number"))?;

        Self::new(year, month).map_err(|e| match e {
            CommonError::InvalidPeriod { reason, .. } => invalid(&reason),
            other => other,
        })
    }
}

impl TryFrom<String> for IngestionUnit {
    type Error = CommonError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<IngestionUnit> for String {
    fn from(unit: IngestionUnit) -> Self {
        unit.to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_accepts_dash_and_underscore() {
        let a: IngestionUnit = "2024-01".parse().unwrap();
        let b: IngestionUnit = "2024_01".parse().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.compact(), "2024_01");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!("2024-13".parse::<IngestionUnit>().is_err());
        assert!("2024-00".parse::<IngestionUnit>().is_err());
        assert!("2024-1".parse::<IngestionUnit>().is_err());
        assert!("202401".parse::<IngestionUnit>().is_err());
        assert!("abcd-01".parse::<IngestionUnit>().is_err());
        assert!("".parse::<IngestionUnit>().is_err());
    }

    #[test]
    fn test_next_rolls_over_year() {
        let dec = IngestionUnit::new(2024, 12).unwrap();
        assert_eq!(dec.next(), Some(IngestionUnit::new(2025, 1).unwrap()));

        let last = IngestionUnit::new(MAX_YEAR, 12).unwrap();
        assert_eq!(last.next(), None);
    }

    #[test]
    fn test_previous_rolls_back_year() {
        let jan = IngestionUnit::new(2025, 1).unwrap();
        assert_eq!(jan.previous(), Some(IngestionUnit::new(2024, 12).unwrap()));
    }

    #[test]
    fn test_ordering_is_chronological() {
        let a = IngestionUnit::new(2023, 12).unwrap();
        let b = IngestionUnit::new(2024, 1).unwrap();
        assert!(a < b);
        assert_eq!(a.months_until(&b), 1);
        assert_eq!(b.months_until(&a), -1);
    }

    #[test]
    fn test_serde_uses_label() {
        let unit = IngestionUnit::new(2025, 9).unwrap();
        let json = serde_json::to_string(&unit).unwrap();
        assert_eq!(json, "\"2025-09\"");
        let back: IngestionUnit = serde_json::from_str(&json).unwrap();
        assert_eq!(back, unit);
        assert!(serde_json::from_str::<IngestionUnit>("\"2025-99\"").is_err());
    }

    #[test]
    fn test_containing_date() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(IngestionUnit::containing(date).to_string(), "2024-02");
    }

    proptest! {
        #[test]
        fn next_is_one_month_later(year in 1i32..9999, month in 1u32..=12) {
            let unit = IngestionUnit::new(year, month).unwrap();
            let next = unit.next().unwrap();
            prop_assert!(next > unit);
            prop_assert_eq!(unit.months_until(&next), 1);
            prop_assert_eq!(next.previous(), Some(unit));
        }
    }
}
