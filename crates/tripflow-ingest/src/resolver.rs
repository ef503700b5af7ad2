//! Resolution of the ingestion units covered by a run

use tripflow_common::types::IngestionUnit;

use crate::error::{IngestError, Result};

/// Enumerates monthly units between two inclusive bounds
#[derive(Debug, Clone, Copy, Default)]
pub struct SourceUnitResolver;

impl SourceUnitResolver {
    pub fn new() -> Self {
        Self
    }

    /// Every month from `start` to `end`, both included, oldest first.
    ///
    /// Fails with [`IngestError::InvalidRange`] when `end` precedes `start`.
    pub fn resolve(&self, start: IngestionUnit, end: IngestionUnit) -> Result<Vec<IngestionUnit>> {
        if end < start {
            return Err(IngestError::InvalidRange { start, end });
        }

        let capacity = usize::try_from(start.months_until(&end) + 1).unwrap_or(0);
        let mut units = Vec::with_capacity(capacity);
        let mut current = Some(start);

        while let Some(unit) = current {
            if unit > end {
                break;
            }
            units.push(unit);
            current = unit.next();
        }

        Ok(units)
    }
}
