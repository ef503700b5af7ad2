//! Ingestion configuration
//!
//! Every section is loaded from environment variables (a `.env` file is
//! honoured through `dotenvy`) and validated before any component is built.
//! Credentials and warehouse identifiers have no defaults.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tripflow_common::types::IngestionUnit;

use crate::warehouse::{is_identifier, TableName};

// ============================================================================
// Defaults
// ============================================================================

/// Public monthly trip files, one parquet file per month.
pub const DEFAULT_SOURCE_URL_TEMPLATE: &str =
    "https://d37ci6vzurychx.cloudfront.net/trip-data/yellow_tripdata_{year}-{month}.parquet";

/// Default fetch timeout in seconds (5 minutes per monthly file).
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 300;

/// Default directory for transient downloads.
pub const DEFAULT_WORK_DIR: &str = "./data/tmp";

/// Default per-request HTTP timeout against the warehouse API.
pub const DEFAULT_WAREHOUSE_HTTP_TIMEOUT_SECS: u64 = 120;

/// Default interval between status polls of a running statement.
pub const DEFAULT_WAREHOUSE_POLL_INTERVAL_MS: u64 = 1000;

/// Default auth token type for the SQL API.
pub const DEFAULT_TOKEN_TYPE: &str = "PROGRAMMATIC_ACCESS_TOKEN";

pub const DEFAULT_RAW_TABLE: &str = "RAW.yellow_taxi_trips";
pub const DEFAULT_STAGING_TABLE: &str = "STAGING.clean_trips";
pub const DEFAULT_FINAL_SCHEMA: &str = "FINAL";

pub const DEFAULT_STAGE_PREFIX: &str = "tripflow/raw";
pub const DEFAULT_STAGE_NAME_PREFIX: &str = "raw_stage";
pub const DEFAULT_STAGE_REGION: &str = "us-east-1";

pub const DEFAULT_REPORT_DIR: &str = "./reports";
pub const DEFAULT_SQL_DIR: &str = "./sql";

// ============================================================================
// Configuration types
// ============================================================================

/// Complete configuration for one pipeline process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub warehouse: WarehouseConfig,
    pub tables: TableConfig,
    pub source: SourceConfig,
    pub stage: StageConfig,
    pub run: RunConfig,
}

/// Warehouse connection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarehouseConfig {
    /// Account identifier, e.g. "xy12345.eu-west-1"
    pub account: String,
    /// Overrides the API base URL derived from the account
    pub api_url: Option<String>,
    #[serde(skip_serializing)]
    pub token: String,
    pub token_type: String,
    pub warehouse: String,
    pub database: String,
    pub schema: String,
    pub role: Option<String>,
    pub http_timeout_secs: u64,
    pub poll_interval_ms: u64,
}

/// Table identifiers for each warehouse layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableConfig {
    pub raw_table: TableName,
    pub staging_table: TableName,
    pub final_schema: String,
}

/// Remote source settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Locator template with `{year}` and `{month}` placeholders
    pub url_template: String,
    pub fetch_timeout_secs: u64,
    /// Directory for transient payload files
    pub work_dir: PathBuf,
    pub show_progress: bool,
}

/// Object stage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    pub bucket: String,
    /// Key prefix under which each unit gets its own folder
    pub key_prefix: String,
    pub region: String,
    pub endpoint: Option<String>,
    #[serde(skip_serializing)]
    pub access_key: Option<String>,
    #[serde(skip_serializing)]
    pub secret_key: Option<String>,
    pub path_style: bool,
    /// Warehouse storage integration allowed to read the bucket
    pub storage_integration: Option<String>,
    /// Prefix of per-unit stage names ("raw_stage" -> "raw_stage_2024_01")
    pub stage_name_prefix: String,
}

/// Per-run settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub start_period: Option<IngestionUnit>,
    pub end_period: Option<IngestionUnit>,
    pub report_dir: PathBuf,
    pub sql_dir: PathBuf,
    #[serde(skip_serializing)]
    pub role_password: Option<String>,
}

// ============================================================================
// Environment helpers
// ============================================================================

fn required(name: &str) -> anyhow::Result<String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => anyhow::bail!("{} must be set", name),
    }
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed_or<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional(name) {
        Some(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("{} has invalid value '{}': {}", name, raw, e)),
        None => Ok(default),
    }
}

fn parsed_optional<T>(name: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    optional(name)
        .map(|raw| {
            raw.parse()
                .map_err(|e| anyhow::anyhow!("{} has invalid value '{}': {}", name, raw, e))
        })
        .transpose()
}

// ============================================================================
// Loading and validation
// ============================================================================

impl IngestConfig {
    /// Load configuration from `.env` and the process environment
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            warehouse: WarehouseConfig::from_env()?,
            tables: TableConfig::from_env()?,
            source: SourceConfig::from_env()?,
            stage: StageConfig::from_env()?,
            run: RunConfig::from_env()?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.warehouse.validate()?;
        self.source.validate()?;
        self.stage.validate()?;
        if self.tables.final_schema.trim().is_empty() {
            anyhow::bail!("FINAL_SCHEMA cannot be empty");
        }
        Ok(())
    }
}

impl WarehouseConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            account: required("SNOWFLAKE_ACCOUNT")?,
            api_url: optional("SNOWFLAKE_API_URL"),
            token: required("SNOWFLAKE_TOKEN")?,
            token_type: optional("SNOWFLAKE_TOKEN_TYPE")
                .unwrap_or_else(|| DEFAULT_TOKEN_TYPE.to_string()),
            warehouse: required("SNOWFLAKE_WAREHOUSE")?,
            database: required("SNOWFLAKE_DATABASE")?,
            schema: required("SNOWFLAKE_SCHEMA")?,
            role: optional("SNOWFLAKE_ROLE"),
            http_timeout_secs: parsed_or(
                "SNOWFLAKE_HTTP_TIMEOUT_SECS",
                DEFAULT_WAREHOUSE_HTTP_TIMEOUT_SECS,
            )?,
            poll_interval_ms: parsed_or(
                "SNOWFLAKE_POLL_INTERVAL_MS",
                DEFAULT_WAREHOUSE_POLL_INTERVAL_MS,
            )?,
        })
    }

    /// Base URL of the SQL API
    pub fn base_url(&self) -> String {
        match &self.api_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://{}.snowflakecomputing.com", self.account),
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.account.trim().is_empty() {
            anyhow::bail!("SNOWFLAKE_ACCOUNT cannot be empty");
        }
        if self.token.trim().is_empty() {
            anyhow::bail!("SNOWFLAKE_TOKEN cannot be empty");
        }
        if self.http_timeout_secs == 0 {
            anyhow::bail!("SNOWFLAKE_HTTP_TIMEOUT_SECS must be greater than 0");
        }
        Ok(())
    }
}

impl TableConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let raw = optional("RAW_TABLE").unwrap_or_else(|| DEFAULT_RAW_TABLE.to_string());
        let staging =
            optional("STAGING_TABLE").unwrap_or_else(|| DEFAULT_STAGING_TABLE.to_string());

        Ok(Self {
            raw_table: raw.parse().context("RAW_TABLE is not a valid table name")?,
            staging_table: staging
                .parse()
                .context("STAGING_TABLE is not a valid table name")?,
            final_schema: optional("FINAL_SCHEMA")
                .unwrap_or_else(|| DEFAULT_FINAL_SCHEMA.to_string()),
        })
    }
}

impl SourceConfig {
    /// Source settings with default timeout and progress display off
    pub fn new(url_template: impl Into<String>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            url_template: url_template.into(),
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            work_dir: work_dir.into(),
            show_progress: false,
        }
    }

    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            url_template: optional("SOURCE_URL_TEMPLATE")
                .unwrap_or_else(|| DEFAULT_SOURCE_URL_TEMPLATE.to_string()),
            fetch_timeout_secs: parsed_or("FETCH_TIMEOUT_SECS", DEFAULT_FETCH_TIMEOUT_SECS)?,
            work_dir: optional("WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_WORK_DIR)),
            show_progress: parsed_or("SHOW_PROGRESS", false)?,
        })
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.url_template.contains("{year}") || !self.url_template.contains("{month}") {
            anyhow::bail!("SOURCE_URL_TEMPLATE must contain {{year}} and {{month}} placeholders");
        }
        if self.fetch_timeout_secs == 0 {
            anyhow::bail!("FETCH_TIMEOUT_SECS must be greater than 0");
        }
        Ok(())
    }
}

impl StageConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            bucket: required("STAGE_BUCKET")?,
            key_prefix: optional("STAGE_PREFIX").unwrap_or_else(|| DEFAULT_STAGE_PREFIX.to_string()),
            region: optional("STAGE_REGION").unwrap_or_else(|| DEFAULT_STAGE_REGION.to_string()),
            endpoint: optional("STAGE_ENDPOINT"),
            access_key: optional("STAGE_ACCESS_KEY").or_else(|| optional("AWS_ACCESS_KEY_ID")),
            secret_key: optional("STAGE_SECRET_KEY")
                .or_else(|| optional("AWS_SECRET_ACCESS_KEY")),
            path_style: parsed_or("STAGE_PATH_STYLE", false)?,
            storage_integration: optional("STAGE_STORAGE_INTEGRATION"),
            stage_name_prefix: optional("STAGE_NAME_PREFIX")
                .unwrap_or_else(|| DEFAULT_STAGE_NAME_PREFIX.to_string()),
        })
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bucket.trim().is_empty() {
            anyhow::bail!("STAGE_BUCKET cannot be empty");
        }
        if self.access_key.is_some() != self.secret_key.is_some() {
            anyhow::bail!("STAGE_ACCESS_KEY and STAGE_SECRET_KEY must be set together");
        }
        if self.storage_integration.is_none() && self.access_key.is_none() {
            anyhow::bail!(
                "Either STAGE_STORAGE_INTEGRATION or stage access keys are required for the warehouse to read staged files"
            );
        }
        if let Some(integration) = &self.storage_integration {
            if !is_identifier(integration) {
                anyhow::bail!("STAGE_STORAGE_INTEGRATION '{}' is not a valid identifier", integration);
            }
        }
        if !is_identifier(&self.stage_name_prefix) {
            anyhow::bail!("STAGE_NAME_PREFIX must be a plain identifier (letters, digits, '_')");
        }
        Ok(())
    }
}

impl RunConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            start_period: parsed_optional("INGEST_START_PERIOD")?,
            end_period: parsed_optional("INGEST_END_PERIOD")?,
            report_dir: optional("REPORT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_REPORT_DIR)),
            sql_dir: optional("SQL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SQL_DIR)),
            role_password: optional("SNOWFLAKE_ROLE_PASSWORD"),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn stage_config() -> StageConfig {
        StageConfig {
            bucket: "trip-stage".to_string(),
            key_prefix: DEFAULT_STAGE_PREFIX.to_string(),
            region: DEFAULT_STAGE_REGION.to_string(),
            endpoint: None,
            access_key: None,
            secret_key: None,
            path_style: false,
            storage_integration: Some("TRIP_S3_INT".to_string()),
            stage_name_prefix: DEFAULT_STAGE_NAME_PREFIX.to_string(),
        }
    }

    fn warehouse_config() -> WarehouseConfig {
        WarehouseConfig {
            account: "xy12345".to_string(),
            api_url: None,
            token: "secret".to_string(),
            token_type: DEFAULT_TOKEN_TYPE.to_string(),
            warehouse: "TRIP_WH".to_string(),
            database: "TRIP_DB".to_string(),
            schema: "RAW".to_string(),
            role: None,
            http_timeout_secs: DEFAULT_WAREHOUSE_HTTP_TIMEOUT_SECS,
            poll_interval_ms: DEFAULT_WAREHOUSE_POLL_INTERVAL_MS,
        }
    }

    #[test]
    fn test_default_source_template_is_valid() {
        let config = SourceConfig::new(DEFAULT_SOURCE_URL_TEMPLATE, DEFAULT_WORK_DIR);
        assert!(config.validate().is_ok());
        assert_eq!(config.fetch_timeout(), Duration::from_secs(300));
    }

    #[test]
    fn test_source_template_requires_placeholders() {
        let config = SourceConfig::new("https://host/trips_{year}.parquet", DEFAULT_WORK_DIR);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_fetch_timeout_rejected() {
        let mut config = SourceConfig::new(DEFAULT_SOURCE_URL_TEMPLATE, DEFAULT_WORK_DIR);
        config.fetch_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_base_url_from_account_or_override() {
        let mut config = warehouse_config();
        assert_eq!(config.base_url(), "https://xy12345.snowflakecomputing.com");

        config.api_url = Some("http://127.0.0.1:8080/".to_string());
        assert_eq!(config.base_url(), "http://127.0.0.1:8080");
    }

    #[test]
    fn test_stage_requires_read_access() {
        let mut config = stage_config();
        assert!(config.validate().is_ok());

        config.storage_integration = None;
        assert!(config.validate().is_err());

        config.access_key = Some("AKIA".to_string());
        assert!(config.validate().is_err(), "secret key missing");

        config.secret_key = Some("shh".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_stage_name_prefix_must_be_identifier() {
        let mut config = stage_config();
        config.stage_name_prefix = "raw-stage".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_secrets_not_serialized() {
        let json = serde_json::to_string(&warehouse_config()).unwrap();
        assert!(!json.contains("secret"));
    }
}
