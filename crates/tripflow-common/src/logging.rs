//! `tracing` subscriber setup shared by Tripflow binaries
//!
//! Lines go to the console, to a daily rolling file, or to both, as text or
//! JSON. A programmatic base configuration is built first and environment
//! variables are applied on top of it:
//!
//! | variable                 | values                          |
//! |--------------------------|---------------------------------|
//! | `LOG_LEVEL`              | trace, debug, info, warn, error |
//! | `LOG_OUTPUT`             | console, file, both             |
//! | `LOG_FORMAT`             | text, json                      |
//! | `LOG_DIR`                | directory for rolling files     |
//! | `LOG_FILE_PREFIX`        | file name prefix                |
//! | `LOG_FILTER`             | extra directives, comma separated |
//! | `LOG_INCLUDE_LOCATION`   | true/false                      |
//! | `LOG_INCLUDE_THREAD_IDS` | true/false                      |
//! | `LOG_INCLUDE_TARGETS`    | true/false                      |
//!
//! ```no_run
//! use tripflow_common::logging::{init_logging, LogConfig, LogLevel};
//!
//! fn main() -> anyhow::Result<()> {
//!     let base = LogConfig::builder()
//!         .level(LogLevel::Debug)
//!         .log_file_prefix("tripflow-ingest")
//!         .build();
//!     let _guard = init_logging(&LogConfig::from_env_with(base)?)?;
//!     tracing::info!(unit = "2024-01", "Unit loaded");
//!     Ok(())
//! }
//! ```

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::{self, format::FmtSpan, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// HTTP and AWS client internals are chatty at debug; keep them at warn
/// unless a directive says otherwise.
const QUIET_DEPENDENCIES: &[&str] = &[
    "hyper=warn",
    "hyper_util=warn",
    "reqwest=warn",
    "aws_config=warn",
    "aws_smithy_runtime=warn",
    "aws_sdk_s3=warn",
];

type SharedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Look `value` up in a table of accepted spellings
fn keyword<T: Copy>(what: &str, value: &str, table: &[(&str, T)]) -> Result<T> {
    let lowered = value.trim().to_ascii_lowercase();
    table
        .iter()
        .find(|(name, _)| *name == lowered)
        .map(|(_, v)| *v)
        .ok_or_else(|| anyhow!("Invalid log {}: {}", what, value))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

impl FromStr for LogLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        keyword(
            "level",
            s,
            &[
                ("trace", LogLevel::Trace),
                ("debug", LogLevel::Debug),
                ("info", LogLevel::Info),
                ("warn", LogLevel::Warn),
                ("warning", LogLevel::Warn),
                ("error", LogLevel::Error),
            ],
        )
    }
}

/// Destination of log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Console,
    File,
    Both,
}

impl LogOutput {
    fn console(self) -> bool {
        self != LogOutput::File
    }

    fn file(self) -> bool {
        self != LogOutput::Console
    }
}

impl FromStr for LogOutput {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        keyword(
            "output",
            s,
            &[
                ("console", LogOutput::Console),
                ("stdout", LogOutput::Console),
                ("file", LogOutput::File),
                ("both", LogOutput::Both),
                ("all", LogOutput::Both),
            ],
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        keyword(
            "format",
            s,
            &[
                ("text", LogFormat::Text),
                ("pretty", LogFormat::Text),
                ("json", LogFormat::Json),
            ],
        )
    }
}

/// Subscriber settings for one binary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    pub level: LogLevel,
    pub output: LogOutput,
    pub format: LogFormat,
    pub log_dir: PathBuf,
    /// Rolling files are named `<prefix>.<YYYY-MM-DD>`
    pub log_file_prefix: String,
    /// Directives added after the dependency defaults, e.g. `tripflow_ingest::fetcher=trace`
    pub filter_directives: Option<String>,
    pub include_location: bool,
    pub include_thread_ids: bool,
    pub include_targets: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            output: LogOutput::Console,
            format: LogFormat::Text,
            log_dir: PathBuf::from("./logs"),
            log_file_prefix: "tripflow".to_string(),
            filter_directives: None,
            include_location: false,
            include_thread_ids: false,
            include_targets: true,
        }
    }
}

/// Replace `slot` with the parsed value of `var` when it is set
fn env_override<T>(slot: &mut T, var: &str) -> Result<()>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Ok(raw) = std::env::var(var) {
        *slot = raw.parse().map_err(|e| anyhow!("{}: {}", var, e))?;
    }
    Ok(())
}

impl LogConfig {
    pub fn builder() -> LogConfigBuilder {
        LogConfigBuilder::default()
    }

    pub fn from_env() -> Result<Self> {
        Self::from_env_with(Self::default())
    }

    /// `base` with every set `LOG_*` variable applied
    pub fn from_env_with(base: LogConfig) -> Result<Self> {
        let mut config = base;
        env_override(&mut config.level, "LOG_LEVEL")?;
        env_override(&mut config.output, "LOG_OUTPUT")?;
        env_override(&mut config.format, "LOG_FORMAT")?;
        env_override(&mut config.log_dir, "LOG_DIR")?;
        env_override(&mut config.log_file_prefix, "LOG_FILE_PREFIX")?;
        env_override(&mut config.include_location, "LOG_INCLUDE_LOCATION")?;
        env_override(&mut config.include_thread_ids, "LOG_INCLUDE_THREAD_IDS")?;
        env_override(&mut config.include_targets, "LOG_INCLUDE_TARGETS")?;
        if let Ok(filter) = std::env::var("LOG_FILTER") {
            config.filter_directives = Some(filter);
        }
        Ok(config)
    }

    fn directives(&self) -> impl Iterator<Item = &str> {
        QUIET_DEPENDENCIES.iter().copied().chain(
            self.filter_directives
                .as_deref()
                .unwrap_or_default()
                .split(',')
                .map(str::trim)
                .filter(|d| !d.is_empty()),
        )
    }

    fn env_filter(&self) -> Result<EnvFilter> {
        let base = EnvFilter::builder()
            .with_default_directive(LevelFilter::from(self.level).into())
            .from_env_lossy();

        self.directives().try_fold(base, |filter, directive| -> Result<EnvFilter> {
            let parsed = directive
                .parse()
                .with_context(|| format!("Invalid filter directive '{}'", directive))?;
            Ok(filter.add_directive(parsed))
        })
    }

    fn layer<W>(&self, writer: W, ansi: bool) -> SharedLayer
    where
        W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    {
        let base = fmt::layer()
            .with_writer(writer)
            .with_ansi(ansi)
            .with_target(self.include_targets)
            .with_thread_ids(self.include_thread_ids)
            .with_file(self.include_location)
            .with_line_number(self.include_location)
            .with_span_events(FmtSpan::CLOSE);

        if self.format == LogFormat::Json {
            base.json().boxed()
        } else {
            base.boxed()
        }
    }
}

#[derive(Default)]
pub struct LogConfigBuilder {
    config: LogConfig,
}

impl LogConfigBuilder {
    pub fn level(mut self, level: LogLevel) -> Self {
        self.config.level = level;
        self
    }

    pub fn output(mut self, output: LogOutput) -> Self {
        self.config.output = output;
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.config.format = format;
        self
    }

    pub fn log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.log_dir = dir.into();
        self
    }

    pub fn log_file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.log_file_prefix = prefix.into();
        self
    }

    pub fn filter_directives(mut self, directives: impl Into<String>) -> Self {
        self.config.filter_directives = Some(directives.into());
        self
    }

    pub fn build(self) -> LogConfig {
        self.config
    }
}

/// Install the global subscriber; call once per process.
///
/// With file output the returned guard owns the background writer and must
/// live until exit, or buffered lines are lost.
pub fn init_logging(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let filter = config.env_filter()?;

    let console = config
        .output
        .console()
        .then(|| config.layer(std::io::stdout, true));

    let (file, guard) = if config.output.file() {
        std::fs::create_dir_all(&config.log_dir)
            .with_context(|| format!("Cannot create log directory {}", config.log_dir.display()))?;
        let rolling = tracing_appender::rolling::daily(&config.log_dir, &config.log_file_prefix);
        let (writer, guard) = tracing_appender::non_blocking(rolling);
        (Some(config.layer(writer, false)), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(console.into_iter().chain(file).collect::<Vec<_>>())
        .with(filter)
        .try_init()
        .context("A global tracing subscriber is already installed")?;

    Ok(guard)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_keywords_accept_aliases() {
        assert_eq!("WARNING".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!(" stdout ".parse::<LogOutput>().unwrap(), LogOutput::Console);
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Text);

        let err = "loud".parse::<LogLevel>().unwrap_err();
        assert_eq!(err.to_string(), "Invalid log level: loud");
    }

    #[test]
    fn test_output_destinations() {
        assert!(LogOutput::Both.console() && LogOutput::Both.file());
        assert!(!LogOutput::File.console());
        assert!(!LogOutput::Console.file());
    }

    #[test]
    fn test_directives_start_with_quiet_dependencies() {
        let config = LogConfig::builder()
            .filter_directives("tripflow_ingest::fetcher=trace, ,tripflow_ingest::loader=debug")
            .build();
        let directives: Vec<&str> = config.directives().collect();

        assert_eq!(directives.len(), QUIET_DEPENDENCIES.len() + 2);
        assert_eq!(directives[0], "hyper=warn");
        assert_eq!(directives.last(), Some(&"tripflow_ingest::loader=debug"));
    }

    #[test]
    fn test_bad_directive_is_an_error() {
        let config = LogConfig::builder().filter_directives("reqwest=loud").build();
        let err = config.env_filter().unwrap_err();
        assert!(err.to_string().contains("reqwest=loud"));
    }

    #[test]
    fn test_builder_for_ingest_binary() {
        let config = LogConfig::builder()
            .level(LogLevel::Debug)
            .output(LogOutput::Both)
            .format(LogFormat::Json)
            .log_dir("/var/log/tripflow")
            .log_file_prefix("tripflow-ingest")
            .build();

        assert_eq!(LevelFilter::from(config.level), LevelFilter::DEBUG);
        assert_eq!(config.log_dir, PathBuf::from("/var/log/tripflow"));
        assert_eq!(config.log_file_prefix, "tripflow-ingest");
        assert!(config.include_targets);
    }
}
