//! Bucket reachability checks run before any mutation

use crate::clients::StorageClient;
use crate::error::StorageError;
use crate::notify::Notifier;
use std::fmt;
use std::sync::Arc;

/// Outcome of a bucket probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketAccess {
    /// Bucket exists and the caller may use it
    Reachable,
    /// Bucket does not exist
    NotFound,
    /// Bucket exists but the caller is denied
    Forbidden,
}

impl BucketAccess {
    #[inline]
    #[must_use]
    pub fn is_reachable(self) -> bool {
        matches!(self, Self::Reachable)
    }
}

impl fmt::Display for BucketAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Reachable => "reachable",
            Self::NotFound => "bucket does not exist",
            Self::Forbidden => "access denied",
        };
        f.write_str(text)
    }
}

/// Probes buckets and reports actionable messages
#[derive(Debug, Clone)]
pub struct AccessVerifier {
    notifier: Arc<dyn crate::notify::Notifier>,
}

impl AccessVerifier {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    /// Probe `bucket`
    ///
    /// Missing and forbidden buckets are reported through the return value.
    ///
    /// # Errors
    /// Any other storage error is logged and returned
    pub async fn verify(
        &self,
        storage: &dyn StorageClient,
        bucket: &str,
    ) -> Result<BucketAccess, StorageError> {
        match storage.head_bucket(bucket).await {
            Ok(()) => {
                self.notifier.debug(&format!("Bucket '{bucket}' is reachable"));
                Ok(BucketAccess::Reachable)
            }
            Err(StorageError::NoSuchBucket(_)) => {
                self.notifier
                    .error(&format!("Bucket '{bucket}' does not exist"));
                Ok(BucketAccess::NotFound)
            }
            Err(StorageError::AccessDenied(_)) => {
                self.notifier.error(&format!(
                    "Access denied to bucket '{bucket}' (check the profile's S3 permissions)"
                ));
                Ok(BucketAccess::Forbidden)
            }
            Err(err) => {
                self.notifier
                    .error(&format!("Cannot access bucket '{bucket}': {err}"));
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::MockStorageClient;
    use crate::notify::TracingNotifier;

    fn verifier() -> AccessVerifier {
        AccessVerifier::new(Arc::new(TracingNotifier))
    }

    fn storage_failing_with(err: StorageError) -> MockStorageClient {
        let mut storage = MockStorageClient::new();
        storage
            .expect_head_bucket()
            .times(1)
            .returning(move |_| Err(err.clone()));
        storage
    }

    #[tokio::test]
    async fn reachable_bucket() {
        let mut storage = MockStorageClient::new();
        storage.expect_head_bucket().times(1).returning(|_| Ok(()));

        let access = verifier().verify(&storage, "data").await.unwrap();
        assert!(access.is_reachable());
    }

    #[tokio::test]
    async fn missing_bucket_is_not_an_error() {
        let storage = storage_failing_with(StorageError::from_status(404, "Not Found"));
        let access = verifier().verify(&storage, "data").await.unwrap();
        assert_eq!(access, BucketAccess::NotFound);
    }

    #[tokio::test]
    async fn forbidden_bucket_is_not_an_error() {
        let storage = storage_failing_with(StorageError::from_status(403, "Forbidden"));
        let access = verifier().verify(&storage, "data").await.unwrap();
        assert_eq!(access, BucketAccess::Forbidden);
    }

    #[tokio::test]
    async fn unknown_error_surfaces() {
        let storage = storage_failing_with(StorageError::Transport("connection reset".into()));
        let err = verifier().verify(&storage, "data").await.unwrap_err();
        assert!(matches!(err, StorageError::Transport(_)));
    }
}
