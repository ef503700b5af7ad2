//! S3-compatible object stage

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::{config::Region, primitives::ByteStream, Client};
use std::path::Path;
use tracing::{debug, info, instrument};
use tripflow_common::types::IngestionUnit;

use super::{unit_location, ObjectStage, StageLocation};
use crate::config::StageConfig;
use crate::warehouse::quote_literal;

#[derive(Clone)]
pub struct S3Stage {
    client: Client,
    config: StageConfig,
}

impl S3Stage {
    pub async fn new(config: StageConfig) -> Result<Self> {
        config.validate()?;

        let mut builder = match (&config.access_key, &config.secret_key) {
            (Some(access_key), Some(secret_key)) => {
                let credentials =
                    Credentials::new(access_key, secret_key, None, None, "tripflow-stage");
                aws_sdk_s3::Config::builder()
                    .behavior_version(BehaviorVersion::latest())
                    .credentials_provider(credentials)
                    .region(Region::new(config.region.clone()))
            },
            _ => {
                let shared = aws_config::defaults(BehaviorVersion::latest())
                    .region(Region::new(config.region.clone()))
                    .load()
                    .await;
                aws_sdk_s3::config::Builder::from(&shared)
            },
        };

        builder = builder.force_path_style(config.path_style);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(builder.build());
        info!(bucket = %config.bucket, prefix = %config.key_prefix, "Object stage initialized");

        Ok(Self { client, config })
    }
}

#[async_trait]
impl ObjectStage for S3Stage {
    fn location(&self, unit: &IngestionUnit) -> StageLocation {
        unit_location(&self.config.bucket, &self.config.key_prefix, unit)
    }

    fn access_clause(&self) -> String {
        match (
            &self.config.storage_integration,
            &self.config.access_key,
            &self.config.secret_key,
        ) {
            (Some(integration), _, _) => format!("STORAGE_INTEGRATION = {}", integration),
            (None, Some(key), Some(secret)) => format!(
                "CREDENTIALS = (AWS_KEY_ID = {} AWS_SECRET_KEY = {})",
                quote_literal(key),
                quote_literal(secret)
            ),
            _ => String::new(),
        }
    }

    #[instrument(skip(self, local_path, location), fields(key = %location.object_key(file_name)))]
    async fn upload(&self, local_path: &Path, location: &StageLocation, file_name: &str) -> Result<u64> {
        let size = tokio::fs::metadata(local_path)
            .await
            .with_context(|| format!("Cannot stat {}", local_path.display()))?
            .len();

        // Parquet is already compressed; the body goes up untouched.
        let body = ByteStream::from_path(local_path)
            .await
            .with_context(|| format!("Cannot open {} for upload", local_path.display()))?;

        let key = location.object_key(file_name);
        debug!(bytes = size, "Uploading payload to s3://{}/{}", location.bucket, key);

        self.client
            .put_object()
            .bucket(&location.bucket)
            .key(&key)
            .content_length(size as i64)
            .body(body)
            .send()
            .await
            .context("Failed to upload payload to object stage")?;

        info!(bytes = size, "Payload staged at s3://{}/{}", location.bucket, key);
        Ok(size)
    }
}
