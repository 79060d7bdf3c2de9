use async_trait::async_trait;
use std::error::Error;
use std::path::Path;
use std::time::Duration;

/// Outbound port for durable artifact storage.
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait StoragePort: Send + Sync {
    /// Download an object to a local path
    async fn download(
        &self,
        key: &str,
        local_path: &Path,
    ) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// Upload a local file to storage under the given key
    async fn upload(
        &self,
        local_path: &Path,
        key: &str,
        content_type: &str,
    ) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// Produce a time-limited signed retrieval URL for an arbitrary key
    async fn presign(
        &self,
        key: &str,
        ttl: Duration,
    ) -> Result<String, Box<dyn Error + Send + Sync>>;

    /// Lightweight reachability check against the configured bucket
    async fn bucket_reachable(&self) -> bool;
}
