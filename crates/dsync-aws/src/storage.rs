//! S3 bucket client

use crate::fault::{storage_error, Fault};
use async_trait::async_trait;
use aws_config::SdkConfig;
use dsync_core::error::StorageError;
use dsync_core::StorageClient;

/// S3 as seen by one profile
#[derive(Debug, Clone)]
pub struct S3Storage {
    client: aws_sdk_s3::Client,
}

impl S3Storage {
    pub fn new(config: &SdkConfig) -> Self {
        Self::from_client(aws_sdk_s3::Client::new(config))
    }

    /// Create from a pre-built client
    pub fn from_client(client: aws_sdk_s3::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StorageClient for S3Storage {
    async fn head_bucket(&self, bucket: &str) -> Result<(), StorageError> {
        tracing::debug!(bucket, "s3:HeadBucket");
        self.client
            .head_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| storage_error(Fault::from_sdk(&e)))?;
        Ok(())
    }

    async fn get_bucket_policy(&self, bucket: &str) -> Result<String, StorageError> {
        tracing::debug!(bucket, "s3:GetBucketPolicy");
        let output = self
            .client
            .get_bucket_policy()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| storage_error(Fault::from_sdk(&e)))?;
        output.policy().map(str::to_string).ok_or_else(|| {
            StorageError::from_code("NoSuchBucketPolicy", "empty policy in response")
        })
    }

    async fn put_bucket_policy(&self, bucket: &str, policy: &str) -> Result<(), StorageError> {
        tracing::debug!(bucket, bytes = policy.len(), "s3:PutBucketPolicy");
        self.client
            .put_bucket_policy()
            .bucket(bucket)
            .policy(policy)
            .send()
            .await
            .map_err(|e| storage_error(Fault::from_sdk(&e)))?;
        Ok(())
    }
}
