//! Object stage that the warehouse bulk-load statement reads from
//!
//! Each ingestion unit gets its own folder so that stages never share files
//! across units.

pub mod s3;

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tripflow_common::types::IngestionUnit;

pub use s3::S3Stage;

/// Storage folder dedicated to one unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageLocation {
    pub bucket: String,
    /// Key prefix without trailing slash, e.g. `tripflow/raw/2024_01`
    pub key_prefix: String,
}

impl StageLocation {
    /// URL the warehouse stage points at, always ending with `/`
    pub fn url(&self) -> String {
        format!("s3://{}/{}/", self.bucket, self.key_prefix)
    }

    pub fn object_key(&self, file_name: &str) -> String {
        format!("{}/{}", self.key_prefix, file_name)
    }
}

/// Transfer mechanism for local payloads
#[async_trait]
pub trait ObjectStage: Send + Sync {
    /// Folder reserved for `unit`
    fn location(&self, unit: &IngestionUnit) -> StageLocation;

    /// Clause granting the warehouse read access to the location,
    /// e.g. `STORAGE_INTEGRATION = TRIP_S3_INT`
    fn access_clause(&self) -> String;

    /// Upload the file byte-for-byte and return the number of bytes sent
    async fn upload(
        &self,
        local_path: &Path,
        location: &StageLocation,
        file_name: &str,
    ) -> anyhow::Result<u64>;
}

#[async_trait]
impl<T: ObjectStage + ?Sized> ObjectStage for Arc<T> {
    fn location(&self, unit: &IngestionUnit) -> StageLocation {
        (**self).location(unit)
    }

    fn access_clause(&self) -> String {
        (**self).access_clause()
    }

    async fn upload(
        &self,
        local_path: &Path,
        location: &StageLocation,
        file_name: &str,
    ) -> anyhow::Result<u64> {
        (**self).upload(local_path, location, file_name).await
    }
}

/// Build a stage location for `unit` under `key_prefix`
pub fn unit_location(bucket: &str, key_prefix: &str, unit: &IngestionUnit) -> StageLocation {
    let prefix = key_prefix.trim_matches('/');
    let key_prefix = if prefix.is_empty() {
        unit.compact()
    } else {
        format!("{}/{}", prefix, unit.compact())
    };

    StageLocation {
        bucket: bucket.to_string(),
        key_prefix,
    }
}
