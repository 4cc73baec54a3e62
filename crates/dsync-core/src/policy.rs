//! Bucket policy updates
//!
//! Reads the current policy, swaps in the owned DataSync statements and writes
//! the whole document back. A policy that cannot be parsed is left alone.

use crate::clients::{fetch_bucket_policy, StorageClient};
use crate::error::MigrationError;
use crate::notify::Notifier;
use crate::retry::RetryPolicy;
use crate::types::RunMode;
use dsync_policy::{
    bucket_access_statements, merge_statements, AccessDocument, MergeOutcome, OwnedStatementSet,
    PolicyError,
};
use std::sync::Arc;

/// Compute the merged policy for `bucket` from its current policy text
///
/// A missing policy is treated as an empty document.
///
/// # Errors
/// Returns `PolicyError` if `current` cannot be parsed or merged
pub fn plan_merge(
    current: Option<&str>,
    owned: &OwnedStatementSet,
    bucket: &str,
    role_arn: &str,
) -> Result<MergeOutcome, PolicyError> {
    let document = match current {
        Some(text) => AccessDocument::parse(text)?,
        None => AccessDocument::empty(),
    };
    let fresh = bucket_access_statements(bucket, role_arn)?;
    merge_statements(document, owned, fresh.to_vec())
}

/// Applies the owned statements to bucket policies
#[derive(Debug, Clone)]
pub struct PolicyMergeEngine {
    owned: OwnedStatementSet,
    notifier: Arc<dyn Notifier>,
    retry: RetryPolicy,
    mode: RunMode,
}

impl PolicyMergeEngine {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            owned: OwnedStatementSet::DATASYNC,
            notifier,
            retry: RetryPolicy::default(),
            mode: RunMode::Live,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Grant `role_arn` access to `bucket`, keeping every foreign statement
    ///
    /// Returns `None` in dry-run mode, where nothing is read or written.
    ///
    /// # Errors
    /// - `MigrationError::Storage` if the policy cannot be read or written
    /// - `MigrationError::Policy` if the current policy cannot be merged safely
    pub async fn apply(
        &self,
        storage: &dyn StorageClient,
        bucket: &str,
        role_arn: &str,
    ) -> Result<Option<MergeOutcome>, MigrationError> {
        if self.mode.is_dry_run() {
            self.notifier
                .info(&format!("[DRY RUN] Would update policy for {bucket}"));
            return Ok(None);
        }

        let current = self
            .retry
            .run("get-bucket-policy", self.notifier.as_ref(), || {
                fetch_bucket_policy(storage, bucket)
            })
            .await
            .map_err(|e| MigrationError::storage(bucket, e))?;
        if current.is_none() {
            self.notifier
                .debug(&format!("Bucket '{bucket}' has no policy, starting from empty"));
        }

        let outcome = plan_merge(current.as_deref(), &self.owned, bucket, role_arn)
            .map_err(|e| MigrationError::policy(bucket, e))?;
        let text = outcome
            .document
            .to_json()
            .map_err(|e| MigrationError::policy(bucket, e))?;

        self.retry
            .run("put-bucket-policy", self.notifier.as_ref(), || {
                storage.put_bucket_policy(bucket, &text)
            })
            .await
            .map_err(|e| MigrationError::storage(bucket, e))?;

        self.notifier.success(&format!(
            "Updated policy for {bucket} ({} existing statement(s) preserved)",
            outcome.preserved
        ));
        Ok(Some(outcome))
    }
}
