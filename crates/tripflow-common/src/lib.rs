//! Building blocks shared by the Tripflow crates.
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! [`types::IngestionUnit`] is the calendar-month batch window every stage of
//! a run is keyed on. [`logging`] installs the `tracing` subscriber used by
//! the binaries, and [`CommonError`] covers failures of the shared types.
//!
//! ```
//! use tripflow_common::types::IngestionUnit;
//!
//! # fn main() -> tripflow_common::Result<()> {
//! let unit: IngestionUnit = "2024-12".parse()?;
//! assert_eq!(unit.next().map(|u| u.to_string()), Some("2025-01".to_string()));
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod logging;
pub mod types;

pub use error::{CommonError, Result};
