//! DataSync client

use crate::fault::{transfer_error, Fault};
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_datasync::types::{
    LogLevel, Options, OverwriteMode, PreserveDeletedFiles, PreserveDevices, S3Config,
    S3StorageClass, TaskMode, TransferMode, VerifyMode,
};
use dsync_core::error::{RemoteFault, TransferError};
use dsync_core::options::TaskOptions;
use dsync_core::{LocationRequest, TaskRequest, TransferClient};

/// DataSync in the source account
#[derive(Debug, Clone)]
pub struct DataSyncTransfer {
    client: aws_sdk_datasync::Client,
}

impl DataSyncTransfer {
    pub fn new(config: &SdkConfig) -> Self {
        Self::from_client(aws_sdk_datasync::Client::new(config))
    }

    /// Create from a pre-built client
    pub fn from_client(client: aws_sdk_datasync::Client) -> Self {
        Self { client }
    }
}

/// Task options in SDK form
fn sdk_options(options: &TaskOptions) -> Options {
    Options::builder()
        .transfer_mode(TransferMode::from(options.transfer_mode.as_str()))
        .verify_mode(VerifyMode::from(options.verify_mode.as_str()))
        .overwrite_mode(OverwriteMode::from(options.overwrite_mode.as_str()))
        .log_level(LogLevel::from(options.log_level.as_str()))
        .preserve_deleted_files(PreserveDeletedFiles::from(
            options.preserve_deleted_files.as_str(),
        ))
        .preserve_devices(PreserveDevices::from(options.preserve_devices.as_str()))
        .build()
}

fn missing(field: &str) -> TransferError {
    TransferError::MalformedResponse(format!("missing {field}"))
}

#[async_trait]
impl TransferClient for DataSyncTransfer {
    async fn create_s3_location(&self, request: &LocationRequest) -> Result<String, TransferError> {
        tracing::debug!(bucket_arn = %request.bucket_arn, "datasync:CreateLocationS3");
        let s3_config = S3Config::builder()
            .bucket_access_role_arn(&request.access_role_arn)
            .build()
            .map_err(|e| {
                TransferError::InvalidRequest(RemoteFault::new("InvalidS3Config", e.to_string()))
            })?;
        let output = self
            .client
            .create_location_s3()
            .s3_bucket_arn(&request.bucket_arn)
            .subdirectory(&request.subdirectory)
            .s3_storage_class(S3StorageClass::from(request.storage_class.as_str()))
            .s3_config(s3_config)
            .send()
            .await
            .map_err(|e| transfer_error(Fault::from_sdk(&e)))?;
        output
            .location_arn()
            .map(str::to_string)
            .ok_or_else(|| missing("LocationArn"))
    }

    async fn create_task(&self, request: &TaskRequest) -> Result<String, TransferError> {
        tracing::debug!(name = %request.name, "datasync:CreateTask");
        let output = self
            .client
            .create_task()
            .name(&request.name)
            .source_location_arn(&request.source_location_arn)
            .destination_location_arn(&request.destination_location_arn)
            .options(sdk_options(&request.options))
            .set_task_mode(request.task_mode.as_deref().map(TaskMode::from))
            .send()
            .await
            .map_err(|e| transfer_error(Fault::from_sdk(&e)))?;
        output
            .task_arn()
            .map(str::to_string)
            .ok_or_else(|| missing("TaskArn"))
    }

    async fn delete_location(&self, location_arn: &str) -> Result<(), TransferError> {
        tracing::debug!(location_arn, "datasync:DeleteLocation");
        self.client
            .delete_location()
            .location_arn(location_arn)
            .send()
            .await
            .map_err(|e| transfer_error(Fault::from_sdk(&e)))?;
        Ok(())
    }

    async fn delete_task(&self, task_arn: &str) -> Result<(), TransferError> {
        tracing::debug!(task_arn, "datasync:DeleteTask");
        self.client
            .delete_task()
            .task_arn(task_arn)
            .send()
            .await
            .map_err(|e| transfer_error(Fault::from_sdk(&e)))?;
        Ok(())
    }
}
