//! Remote control-plane clients
//!
//! The engine only sees these traits. `dsync-aws` implements them on top of
//! the AWS SDK; `dsync-test-utils` provides recording fakes.

use crate::error::{IdentityError, StorageError, TransferError};
use crate::options::TaskOptions;
use async_trait::async_trait;
use std::sync::Arc;

/// Storage class for DataSync S3 locations
pub const DEFAULT_STORAGE_CLASS: &str = "STANDARD";

/// Location subdirectory (whole bucket)
pub const DEFAULT_SUBDIRECTORY: &str = "/";

/// Role as reported by the identity service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleInfo {
    pub role_name: String,
    pub arn: String,
}

/// Parameters for creating a role
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRoleRequest {
    pub role_name: String,
    /// Trust policy JSON
    pub assume_role_policy: String,
    pub description: String,
}

/// Parameters for creating an S3 location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationRequest {
    pub bucket_arn: String,
    /// Role DataSync assumes to reach the bucket
    pub access_role_arn: String,
    pub subdirectory: String,
    pub storage_class: String,
}

impl LocationRequest {
    /// Whole-bucket location with the standard storage class
    pub fn for_bucket(bucket: &str, access_role_arn: impl Into<String>) -> Self {
        Self {
            bucket_arn: dsync_policy::arn::bucket_arn(bucket),
            access_role_arn: access_role_arn.into(),
            subdirectory: DEFAULT_SUBDIRECTORY.to_string(),
            storage_class: DEFAULT_STORAGE_CLASS.to_string(),
        }
    }
}

/// Parameters for creating a task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRequest {
    pub name: String,
    pub source_location_arn: String,
    pub destination_location_arn: String,
    pub options: TaskOptions,
    /// Only sent when the operator asked for one
    pub task_mode: Option<String>,
}

/// Resolves the account id behind a profile
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccountResolver: Send + Sync {
    /// Account id of the caller
    async fn caller_account(&self) -> Result<String, IdentityError>;
}

/// IAM operations
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityClient: Send + Sync {
    /// Look up a role by name
    async fn get_role(&self, role_name: &str) -> Result<RoleInfo, IdentityError>;

    /// Create a role with a trust policy
    async fn create_role(&self, request: &CreateRoleRequest) -> Result<RoleInfo, IdentityError>;

    /// Attach an inline permission policy to a role
    async fn put_role_policy(
        &self,
        role_name: &str,
        policy_name: &str,
        policy_document: &str,
    ) -> Result<(), IdentityError>;
}

/// S3 bucket operations
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Existence and permission probe
    async fn head_bucket(&self, bucket: &str) -> Result<(), StorageError>;

    /// Current bucket policy text; `NoSuchBucketPolicy` when none is attached
    async fn get_bucket_policy(&self, bucket: &str) -> Result<String, StorageError>;

    /// Replace the bucket policy
    async fn put_bucket_policy(&self, bucket: &str, policy: &str) -> Result<(), StorageError>;
}

/// DataSync operations
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TransferClient: Send + Sync {
    /// Register an S3 location, returning its ARN
    async fn create_s3_location(&self, request: &LocationRequest) -> Result<String, TransferError>;

    /// Create a task (does not start it), returning its ARN
    async fn create_task(&self, request: &TaskRequest) -> Result<String, TransferError>;

    async fn delete_location(&self, location_arn: &str) -> Result<(), TransferError>;

    async fn delete_task(&self, task_arn: &str) -> Result<(), TransferError>;
}

/// Read a bucket policy, mapping "no policy" to `None`
///
/// # Errors
/// Any storage error other than `NoSuchBucketPolicy`
pub async fn fetch_bucket_policy(
    storage: &dyn StorageClient,
    bucket: &str,
) -> Result<Option<String>, StorageError> {
    match storage.get_bucket_policy(bucket).await {
        Ok(policy) => Ok(Some(policy)),
        Err(StorageError::NoSuchBucketPolicy(_)) => Ok(None),
        Err(err) => Err(err),
    }
}

/// Every client a run needs
#[derive(Clone)]
pub struct Clients {
    /// Resolves the source account id
    pub source_account: Arc<dyn AccountResolver>,
    /// Resolves the destination account id
    pub destination_account: Arc<dyn AccountResolver>,
    /// IAM in the source account
    pub identity: Arc<dyn IdentityClient>,
    /// S3 as the source profile
    pub source_storage: Arc<dyn StorageClient>,
    /// S3 as the destination profile
    pub destination_storage: Arc<dyn StorageClient>,
    /// DataSync in the source account
    pub transfer: Arc<dyn TransferClient>,
}

impl std::fmt::Debug for Clients {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Clients").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteFault;

    #[tokio::test]
    async fn missing_policy_is_none() {
        let mut storage = MockStorageClient::new();
        storage
            .expect_get_bucket_policy()
            .returning(|_| Err(StorageError::NoSuchBucketPolicy(RemoteFault::new("NoSuchBucketPolicy", ""))));

        assert_eq!(fetch_bucket_policy(&storage, "b").await.unwrap(), None);
    }

    #[tokio::test]
    async fn other_errors_propagate() {
        let mut storage = MockStorageClient::new();
        storage
            .expect_get_bucket_policy()
            .returning(|_| Err(StorageError::from_code("AccessDenied", "nope")));

        assert!(matches!(
            fetch_bucket_policy(&storage, "b").await,
            Err(StorageError::AccessDenied(_))
        ));
    }

    #[tokio::test]
    async fn policy_text_returned_verbatim() {
        let mut storage = MockStorageClient::new();
        storage
            .expect_get_bucket_policy()
            .returning(|_| Ok("{ \"Statement\": [] }".to_string()));

        assert_eq!(
            fetch_bucket_policy(&storage, "b").await.unwrap().as_deref(),
            Some("{ \"Statement\": [] }")
        );
    }

    #[test]
    fn location_request_for_bucket() {
        let request = LocationRequest::for_bucket("data", "arn:role");
        assert_eq!(request.bucket_arn, "arn:aws:s3:::data");
        assert_eq!(request.subdirectory, "/");
        assert_eq!(request.storage_class, "STANDARD");
    }
}
