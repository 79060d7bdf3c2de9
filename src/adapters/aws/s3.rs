use crate::ports::storage::StoragePort;
use async_trait::async_trait;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::Client;
use std::error::Error;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// S3Adapter implements StoragePort for AWS S3 (and S3-compatible stores).
#[derive(Clone)]
pub struct S3Adapter {
    client: Client,
    bucket: String,
}

impl S3Adapter {
    pub fn new(client: Client, bucket: String) -> Self {
        Self { client, bucket }
    }
}

#[async_trait]
impl StoragePort for S3Adapter {
    async fn download(
        &self,
        key: &str,
        local_path: &Path,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await?;

        let body = resp.body.collect().await?;
        tokio::fs::write(local_path, body.into_bytes()).await?;
        Ok(())
    }

    async fn upload(
        &self,
        local_path: &Path,
        key: &str,
        content_type: &str,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        // Empty artifacts never leave the process.
        let size = tokio::fs::metadata(local_path).await?.len();
        if size == 0 {
            return Err(format!("refusing to upload empty file {:?}", local_path).into());
        }

        let body = aws_sdk_s3::primitives::ByteStream::from_path(local_path).await?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(body)
            .send()
            .await?;
        Ok(())
    }

    async fn presign(
        &self,
        key: &str,
        ttl: Duration,
    ) -> Result<String, Box<dyn Error + Send + Sync>> {
        let config = PresigningConfig::expires_in(ttl)?;
        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(config)
            .await?;
        Ok(presigned.uri().to_string())
    }

    async fn bucket_reachable(&self) -> bool {
        match self
            .client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
        {
            Ok(_) => true,
            Err(e) => {
                warn!(bucket = %self.bucket, error = %e, "Bucket reachability check failed");
                false
            }
        }
    }
}
