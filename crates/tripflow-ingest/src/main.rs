//! Tripflow Ingest - monthly trip data pipeline

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info, warn};
use tripflow_common::logging::{init_logging, LogConfig, LogLevel};
use tripflow_common::types::IngestionUnit;
use tripflow_ingest::config::{IngestConfig, RunConfig};
use tripflow_ingest::fetcher::UnitFetcher;
use tripflow_ingest::loader::BulkLoader;
use tripflow_ingest::orchestrator::{IngestionOrchestrator, RunSummary};
use tripflow_ingest::progress::format_bytes;
use tripflow_ingest::quality::{
    JsonReportWriter, MarkdownReportWriter, QualityAnalyzer, QualityReport, ReportWriter,
};
use tripflow_ingest::resolver::SourceUnitResolver;
use tripflow_ingest::setup;
use tripflow_ingest::stage::S3Stage;
use tripflow_ingest::transform::{self, FsResourceLoader, LayerSummary, TransformRunner};
use tripflow_ingest::warehouse::{SnowflakeClient, Warehouse};

#[derive(Parser, Debug)]
#[command(name = "tripflow-ingest")]
#[command(author, version, about = "Monthly trip data ingestion and quality pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Args, Debug, Clone, Default)]
struct PeriodArgs {
    /// First month to ingest (YYYY-MM); defaults to INGEST_START_PERIOD
    #[arg(long)]
    start: Option<IngestionUnit>,

    /// Last month to ingest (YYYY-MM); defaults to INGEST_END_PERIOD, then
    /// the last completed month
    #[arg(long)]
    end: Option<IngestionUnit>,
}

#[derive(Args, Debug, Clone, Default)]
struct IngestArgs {
    #[command(flatten)]
    period: PeriodArgs,

    /// Write the run summary as JSON to this path
    #[arg(long)]
    summary_json: Option<PathBuf>,

    /// Exit with an error if any unit failed
    #[arg(long)]
    strict: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the units a run would process
    Units {
        #[command(flatten)]
        period: PeriodArgs,
    },

    /// Create role, warehouse, database and raw table
    Setup,

    /// Drop the per-unit stages and the staging table
    Reset {
        #[command(flatten)]
        period: PeriodArgs,
    },

    /// Truncate the raw table and load every unit of the period
    Ingest(IngestArgs),

    /// Analyze raw data quality and write the report
    Analyze,

    /// Build the staging table and final marts
    Transform,

    /// Ingest, analyze, then transform
    Pipeline(IngestArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("tripflow-ingest")
        .build();

    // Environment variables take precedence
    let log_config = LogConfig::from_env_with(log_config.clone()).unwrap_or(log_config);
    let _guard = init_logging(&log_config)?;

    if let Err(e) = execute(cli.command).await {
        error!(error = %e, "Command failed");
        return Err(e);
    }
    Ok(())
}

async fn execute(command: Command) -> Result<()> {
    match command {
        Command::Units { period } => {
            let run = RunConfig::from_env()?;
            for unit in resolve_units(&period, &run)? {
                println!("{}", unit);
            }
            Ok(())
        },
        Command::Setup => {
            let config = IngestConfig::from_env()?;
            let warehouse = SnowflakeClient::new(config.warehouse.clone())?;
            let resources = FsResourceLoader::new(&config.run.sql_dir);
            let executed =
                setup::run_setup(&warehouse, &resources, config.run.role_password.as_deref())
                    .await?;
            println!("Setup complete: {} statements executed", executed);
            Ok(())
        },
        Command::Reset { period } => {
            let config = IngestConfig::from_env()?;
            let warehouse = SnowflakeClient::new(config.warehouse.clone())?;
            let units = resolve_units(&period, &config.run)?;
            let outcomes = setup::reset(
                &warehouse,
                &units,
                &config.stage.stage_name_prefix,
                &config.tables.staging_table,
            )
            .await?;
            for (name, absence) in outcomes {
                println!("{:<32} {:?}", name, absence);
            }
            Ok(())
        },
        Command::Ingest(args) => {
            let config = IngestConfig::from_env()?;
            let warehouse = SnowflakeClient::new(config.warehouse.clone())?;
            let summary = ingest(&config, &warehouse, &args).await?;
            finish_ingest(&summary, &args)
        },
        Command::Analyze => {
            let config = IngestConfig::from_env()?;
            let warehouse = SnowflakeClient::new(config.warehouse.clone())?;
            analyze(&config, &warehouse).await?;
            Ok(())
        },
        Command::Transform => {
            let config = IngestConfig::from_env()?;
            let warehouse = SnowflakeClient::new(config.warehouse.clone())?;
            run_transformations(&config, &warehouse).await
        },
        Command::Pipeline(args) => {
            let config = IngestConfig::from_env()?;
            let warehouse = SnowflakeClient::new(config.warehouse.clone())?;

            let summary = ingest(&config, &warehouse, &args).await?;
            finish_ingest(&summary, &args)?;
            if summary.succeeded() == 0 {
                anyhow::bail!("No unit was loaded; skipping analysis and transformations");
            }

            analyze(&config, &warehouse).await?;
            run_transformations(&config, &warehouse).await
        },
    }
}

fn resolve_units(period: &PeriodArgs, run: &RunConfig) -> Result<Vec<IngestionUnit>> {
    let start = period
        .start
        .or(run.start_period)
        .context("A start period is required (--start or INGEST_START_PERIOD)")?;

    let end = match period.end.or(run.end_period) {
        Some(end) => end,
        None => IngestionUnit::containing(Utc::now().date_naive())
            .previous()
            .context("No completed month before the current one")?,
    };

    Ok(SourceUnitResolver::new().resolve(start, end)?)
}

async fn ingest(config: &IngestConfig, warehouse: &dyn Warehouse, args: &IngestArgs) -> Result<RunSummary> {
    let units = resolve_units(&args.period, &config.run)?;
    info!(
        units = units.len(),
        first = ?units.first().map(|u| u.to_string()),
        last = ?units.last().map(|u| u.to_string()),
        "Starting ingestion"
    );

    let stage = S3Stage::new(config.stage.clone()).await?;
    let loader = BulkLoader::new(
        stage,
        config.tables.raw_table.clone(),
        config.stage.stage_name_prefix.clone(),
    );
    let orchestrator = IngestionOrchestrator::new(UnitFetcher::new(config.source.clone())?, loader);

    Ok(orchestrator.run(warehouse, &units).await?)
}

fn finish_ingest(summary: &RunSummary, args: &IngestArgs) -> Result<()> {
    print_summary(summary);

    if let Some(path) = &args.summary_json {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(summary)?)
            .with_context(|| format!("Cannot write run summary to {}", path.display()))?;
        info!(path = %path.display(), "Run summary written");
    }

    if args.strict && !summary.is_complete() {
        anyhow::bail!("{} of {} units failed", summary.failed().len(), summary.attempted());
    }
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!(
        "Loaded {}/{} units ({} rows appended)",
        summary.succeeded(),
        summary.attempted(),
        summary.rows_loaded()
    );
    match summary.total_raw_rows() {
        Some(total) => println!("Raw table now holds {} rows", total),
        None => println!("Raw table row count unavailable"),
    }
    for failure in summary.failed() {
        println!("  FAILED {} [{}]: {}", failure.unit, failure.kind, failure.error);
    }
}

async fn analyze(config: &IngestConfig, warehouse: &dyn Warehouse) -> Result<QualityReport> {
    let table = config.tables.raw_table.as_str();
    let report = QualityAnalyzer::new(config.tables.raw_table.clone())
        .analyze(warehouse)
        .await?;

    let markdown = MarkdownReportWriter::new(&config.run.report_dir).write(&report, table)?;
    let json = JsonReportWriter::new(&config.run.report_dir).write(&report, table)?;

    match report.clean_percentage() {
        Some(clean) => {
            println!("Analyzed {} rows", report.total_rows);
            for metric in &report.metrics {
                println!(
                    "  {:<22} {:>12} ({:.2}%)",
                    metric.name(),
                    metric.absolute_count,
                    metric.percentage
                );
            }
            println!(
                "  {:<22} {:>12} ({:.2}%, approximate)",
                "clean_rows_estimate", report.clean_rows_estimate, clean
            );
        },
        None => {
            warn!("Raw table is empty");
            println!("No rows in {}; nothing to analyze", table);
        },
    }
    println!("Reports: {} ({}), {}", markdown.display(), report_size(&markdown), json.display());

    Ok(report)
}

fn report_size(path: &std::path::Path) -> String {
    std::fs::metadata(path)
        .map(|m| format_bytes(m.len()))
        .unwrap_or_else(|_| "?".to_string())
}

async fn run_transformations(config: &IngestConfig, warehouse: &dyn Warehouse) -> Result<()> {
    let plan = transform::default_plan(&config.tables)?;
    let runner = TransformRunner::new(FsResourceLoader::new(&config.run.sql_dir));
    let summary = runner.run(warehouse, &plan).await;

    for outcome in &summary.completed {
        println!("{:<24} {:<28} {:>12} rows", outcome.name, outcome.output, outcome.rows);
    }

    if let Some((name, reason)) = &summary.failed {
        anyhow::bail!(
            "Transformation {} failed: {} (not run: {})",
            name,
            reason,
            summary.skipped.join(", ")
        );
    }

    let layers =
        LayerSummary::collect(warehouse, &config.tables.raw_table, &config.tables.staging_table)
            .await?;
    match layers.retention_percentage() {
        Some(kept) => println!(
            "Staging kept {} of {} raw rows ({:.2}%)",
            layers.staging_rows, layers.raw_rows, kept
        ),
        None => println!("Raw layer is empty"),
    }
    Ok(())
}
