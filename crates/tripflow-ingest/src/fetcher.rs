//! Retrieval of one unit's source payload into local transient storage
//!
//! The payload is streamed chunk by chunk into `<work_dir>/<file>.<uuid>.part`,
//! so peak memory does not depend on the file size. A failed fetch never
//! leaves that file behind.

use futures::StreamExt;
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};
use tripflow_common::types::IngestionUnit;
use uuid::Uuid;

use crate::config::SourceConfig;
use crate::error::{IngestError, Result};
use crate::progress::{format_bytes, transfer_bar};

/// Outcome of fetching one unit
#[derive(Debug)]
pub struct FetchResult {
    pub unit: IngestionUnit,
    /// Source locator the payload was requested from
    pub locator: String,
    /// Transient file holding the payload; `None` when the fetch failed
    pub local_path: Option<PathBuf>,
    pub byte_size: u64,
    /// Hex SHA-256 of the payload; empty when the fetch failed
    pub sha256: String,
    pub error: Option<IngestError>,
}

impl FetchResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.local_path.is_some()
    }

    /// Name the payload is staged under: the locator's last path segment
    pub fn file_name(&self) -> String {
        file_name_of(&self.locator)
    }

    fn failed(unit: IngestionUnit, locator: String, error: IngestError) -> Self {
        Self {
            unit,
            locator,
            local_path: None,
            byte_size: 0,
            sha256: String::new(),
            error: Some(error),
        }
    }
}

struct Downloaded {
    bytes: u64,
    sha256: String,
}

/// Downloads unit payloads from the templated source locator
pub struct UnitFetcher {
    client: Client,
    config: SourceConfig,
}

impl UnitFetcher {
    pub fn new(config: SourceConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| IngestError::Config(e.to_string()))?;

        let client = Client::builder()
            .timeout(config.fetch_timeout())
            .user_agent(concat!("tripflow-ingest/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| IngestError::Config(format!("Cannot build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Source locator for `unit`; a pure function of the unit identity
    pub fn locator(&self, unit: &IngestionUnit) -> String {
        render_locator(&self.config.url_template, unit)
    }

    /// Fetch `unit` into a fresh transient file.
    ///
    /// Transport failures are returned inside the [`FetchResult`], never as
    /// an `Err`, so the caller can record them and move on.
    #[instrument(skip(self), fields(unit = %unit))]
    pub async fn fetch(&self, unit: IngestionUnit) -> FetchResult {
        let locator = self.locator(&unit);

        if let Err(e) = tokio::fs::create_dir_all(&self.config.work_dir).await {
            return FetchResult::failed(
                unit,
                locator.clone(),
                IngestError::transport(
                    locator,
                    format!("cannot create {}: {}", self.config.work_dir.display(), e),
                ),
            );
        }

        let local_path = self.config.work_dir.join(format!(
            "{}.{}.part",
            file_name_of(&locator),
            Uuid::new_v4().simple()
        ));

        debug!(locator = %locator, path = %local_path.display(), "Fetching source payload");

        match self.download(&locator, &local_path).await {
            Ok(downloaded) => {
                info!(
                    bytes = downloaded.bytes,
                    size = %format_bytes(downloaded.bytes),
                    sha256 = %downloaded.sha256,
                    "Fetched source payload"
                );
                FetchResult {
                    unit,
                    locator,
                    local_path: Some(local_path),
                    byte_size: downloaded.bytes,
                    sha256: downloaded.sha256,
                    error: None,
                }
            },
            Err(e) => {
                remove_partial(&local_path).await;
                warn!(error = %e, "Fetch failed");
                FetchResult::failed(unit, locator, e)
            },
        }
    }

    async fn download(&self, locator: &str, local_path: &Path) -> Result<Downloaded> {
        let response = self
            .client
            .get(locator)
            .send()
            .await
            .map_err(|e| IngestError::transport(locator, describe(&e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(IngestError::transport(locator, format!("HTTP {}", status)));
        }

        let expected = response.content_length();
        let pb = self
            .config
            .show_progress
            .then(|| transfer_bar(&format!("Fetching {}", locator), expected));

        let mut file = tokio::fs::File::create(local_path)
            .await
            .map_err(|e| IngestError::transport(locator, format!("cannot create local file: {}", e)))?;

        let mut hasher = Sha256::new();
        let mut written = 0u64;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| IngestError::transport(locator, describe(&e)))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| IngestError::transport(locator, format!("local write failed: {}", e)))?;
            hasher.update(&chunk);
            written += chunk.len() as u64;
            if let Some(pb) = &pb {
                pb.set_position(written);
            }
        }

        file.flush()
            .await
            .map_err(|e| IngestError::transport(locator, format!("local write failed: {}", e)))?;

        if let Some(pb) = pb {
            pb.finish_and_clear();
        }

        if let Some(expected) = expected {
            if written != expected {
                return Err(IngestError::transport(
                    locator,
                    format!("partial transfer: received {} of {} bytes", written, expected),
                ));
            }
        }

        Ok(Downloaded {
            bytes: written,
            sha256: hex::encode(hasher.finalize()),
        })
    }
}

fn render_locator(template: &str, unit: &IngestionUnit) -> String {
    template
        .replace("{year}", &format!("{:04}", unit.year()))
        .replace("{month}", &format!("{:02}", unit.month()))
}

fn file_name_of(locator: &str) -> String {
    let path = locator.split(['?', '#']).next().unwrap_or(locator);
    path.rsplit('/')
        .find(|segment| !segment.is_empty())
        .unwrap_or("payload")
        .to_string()
}

fn describe(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        format!("timed out: {}", error)
    } else {
        error.to_string()
    }
}

async fn remove_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "Removed partial payload"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
        Err(e) => warn!(path = %path.display(), error = %e, "Could not remove partial payload"),
    }
}
