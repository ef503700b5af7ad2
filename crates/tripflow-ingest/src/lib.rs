//! Tripflow Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Monthly batch ingestion of trip data into a layered warehouse, with
//! data-quality reporting over the raw layer.
//!
//! # Components
//!
//! - [`resolver`]: the inclusive list of monthly units for a run
//! - [`fetcher`]: streams one unit's source file to local transient storage
//! - [`loader`]: stages the file and bulk-appends it into the raw table
//! - [`orchestrator`]: truncate once, then fetch and load every unit in order
//! - [`quality`]: fixed checks over the raw table and their report artifacts
//! - [`transform`]: staging and final marts from external statement resources
//!
//! Every warehouse operation takes the session as an explicit
//! `&dyn Warehouse` argument.
//!
//! # Example
//!
//! ```no_run
//! use tripflow_ingest::config::IngestConfig;
//! use tripflow_ingest::fetcher::UnitFetcher;
//! use tripflow_ingest::loader::BulkLoader;
//! use tripflow_ingest::orchestrator::IngestionOrchestrator;
//! use tripflow_ingest::resolver::SourceUnitResolver;
//! use tripflow_ingest::stage::S3Stage;
//! use tripflow_ingest::warehouse::SnowflakeClient;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = IngestConfig::from_env()?;
//!     let warehouse = SnowflakeClient::new(config.warehouse.clone())?;
//!
//!     let units = SourceUnitResolver::new()
//!         .resolve("2024-01".parse()?, "2024-03".parse()?)?;
//!
//!     let loader = BulkLoader::new(
//!         S3Stage::new(config.stage.clone()).await?,
//!         config.tables.raw_table.clone(),
//!         config.stage.stage_name_prefix.clone(),
//!     );
//!     let orchestrator =
//!         IngestionOrchestrator::new(UnitFetcher::new(config.source.clone())?, loader);
//!
//!     let summary = orchestrator.run(&warehouse, &units).await?;
//!     println!("{}/{} units loaded", summary.succeeded(), summary.attempted());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod fetcher;
pub mod loader;
pub mod orchestrator;
pub mod progress;
pub mod quality;
pub mod resolver;
pub mod setup;
pub mod stage;
pub mod transform;
pub mod warehouse;

pub use error::{FailureKind, IngestError, Result};
