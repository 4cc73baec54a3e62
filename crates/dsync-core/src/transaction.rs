//! Transactional creation of DataSync resources
//!
//! A migration needs three resources: a source location, a destination
//! location and a task linking them. [`ProvisioningTransaction`] is an undo
//! log; every resource is recorded right after it is created. If a later step
//! fails the log is replayed newest-first, each delete attempted once, and the
//! original failure is returned together with a [`RollbackReport`].

use crate::clients::{LocationRequest, TaskRequest, TransferClient};
use crate::config::MigrationSpec;
use crate::error::TransferError;
use crate::notify::Notifier;
use crate::options::TaskOptions;
use crate::retry::RetryPolicy;
use crate::types::RunMode;
use std::fmt;
use std::sync::Arc;

/// Kind of a created transfer resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Location,
    Task,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Location => f.write_str("location"),
            Self::Task => f.write_str("task"),
        }
    }
}

/// A resource created during the current transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedResource {
    pub kind: ResourceKind,
    pub arn: String,
}

/// Result of deleting one resource during rollback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackOutcome {
    Deleted,
    Failed(TransferError),
}

/// One rollback step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackEntry {
    pub resource: CreatedResource,
    pub outcome: RollbackOutcome,
}

/// Per-resource outcome of a rollback, in deletion order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollbackReport {
    entries: Vec<RollbackEntry>,
}

impl RollbackReport {
    /// Entries in deletion order (newest resource first)
    #[inline]
    #[must_use]
    pub fn entries(&self) -> &[RollbackEntry] {
        &self.entries
    }

    /// True if every resource was deleted
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.entries
            .iter()
            .all(|e| e.outcome == RollbackOutcome::Deleted)
    }

    /// Resources that could not be deleted and may be orphaned
    pub fn orphans(&self) -> impl Iterator<Item = &CreatedResource> {
        self.entries
            .iter()
            .filter(|e| e.outcome != RollbackOutcome::Deleted)
            .map(|e| &e.resource)
    }
}

impl FromIterator<RollbackEntry> for RollbackReport {
    fn from_iter<I: IntoIterator<Item = RollbackEntry>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for RollbackReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let failed = self.orphans().count();
        write!(
            f,
            "rolled back {} of {} resource(s)",
            self.entries.len() - failed,
            self.entries.len()
        )?;
        if failed > 0 {
            write!(f, ", {failed} left behind")?;
        }
        Ok(())
    }
}

/// Undo log for one migration's resource creation
#[derive(Debug, Default)]
pub struct ProvisioningTransaction {
    created: Vec<CreatedResource>,
}

impl ProvisioningTransaction {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a resource that now exists remotely
    pub fn record(&mut self, kind: ResourceKind, arn: impl Into<String>) {
        self.created.push(CreatedResource {
            kind,
            arn: arn.into(),
        });
    }

    /// Resources recorded so far, in creation order
    #[inline]
    #[must_use]
    pub fn created(&self) -> &[CreatedResource] {
        &self.created
    }

    /// Keep everything; returns what was created
    #[must_use]
    pub fn commit(self) -> Vec<CreatedResource> {
        self.created
    }

    /// Delete every recorded resource, newest first
    ///
    /// Each delete goes through `retry`. A delete that still fails is logged
    /// and recorded; the remaining deletes still run.
    pub async fn rollback(
        self,
        transfer: &dyn TransferClient,
        notifier: &dyn Notifier,
        retry: &RetryPolicy,
    ) -> RollbackReport {
        let mut entries = Vec::with_capacity(self.created.len());
        for resource in self.created.into_iter().rev() {
            let arn = resource.arn.as_str();
            let result = match resource.kind {
                ResourceKind::Location => {
                    retry
                        .run("delete-location", notifier, || transfer.delete_location(arn))
                        .await
                }
                ResourceKind::Task => {
                    retry
                        .run("delete-task", notifier, || transfer.delete_task(arn))
                        .await
                }
            };
            let outcome = match result {
                Ok(()) => {
                    notifier.info(&format!("Deleted {}: {}", resource.kind, resource.arn));
                    RollbackOutcome::Deleted
                }
                Err(err) => {
                    notifier.error(&format!("Rollback failed for {}: {err}", resource.arn));
                    RollbackOutcome::Failed(err)
                }
            };
            entries.push(RollbackEntry { resource, outcome });
        }
        RollbackReport { entries }
    }
}

/// Creation step of a migration's resources
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStep {
    SourceLocation,
    DestinationLocation,
    Task,
}

impl fmt::Display for BuildStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SourceLocation => f.write_str("source location"),
            Self::DestinationLocation => f.write_str("destination location"),
            Self::Task => f.write_str("task"),
        }
    }
}

/// Resource creation failed; everything created before was rolled back
#[derive(Debug, thiserror::Error)]
#[error("failed to create {step}: {cause} ({rollback})")]
pub struct BuildError {
    pub step: BuildStep,
    /// Original failure, never replaced by a rollback error
    #[source]
    pub cause: TransferError,
    pub rollback: RollbackReport,
}

/// Name of the task for a bucket pair
#[must_use]
pub fn task_name(source_bucket: &str, destination_bucket: &str) -> String {
    format!("Migration-{source_bucket}-to-{destination_bucket}")
}

/// Placeholder task ARN reported in dry-run mode
#[must_use]
pub fn dry_run_task_arn(region: &str, account: &str) -> String {
    format!("arn:aws:datasync:{region}:{account}:task/task-DRYRUN")
}

/// Creates the locations and task of one migration as a unit
#[derive(Clone)]
pub struct TransactionalBuilder {
    transfer: Arc<dyn TransferClient>,
    notifier: Arc<dyn Notifier>,
    retry: RetryPolicy,
    mode: RunMode,
    region: String,
    account: String,
}

impl fmt::Debug for TransactionalBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionalBuilder")
            .field("mode", &self.mode)
            .field("region", &self.region)
            .field("account", &self.account)
            .finish_non_exhaustive()
    }
}

impl TransactionalBuilder {
    /// Builder creating resources in `region` of `account`
    pub fn new(
        transfer: Arc<dyn TransferClient>,
        notifier: Arc<dyn Notifier>,
        region: impl Into<String>,
        account: impl Into<String>,
    ) -> Self {
        Self {
            transfer,
            notifier,
            retry: RetryPolicy::default(),
            mode: RunMode::Live,
            region: region.into(),
            account: account.into(),
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

    /// Create both locations and the task for `spec`, returning the task ARN
    ///
    /// The task is created but never started.
    ///
    /// # Errors
    /// `BuildError` carrying the first creation failure and the rollback report
    pub async fn build(&self, spec: &MigrationSpec, role_arn: &str) -> Result<String, BuildError> {
        if self.mode.is_dry_run() {
            self.notifier.info(&format!(
                "[DRY RUN] Would create task: {} → {}",
                spec.source_bucket, spec.destination_bucket
            ));
            return Ok(dry_run_task_arn(&self.region, &self.account));
        }

        let mut txn = ProvisioningTransaction::new();
        match self.create_all(&mut txn, spec, role_arn).await {
            Ok(task_arn) => {
                let kept = txn.commit();
                self.notifier
                    .debug(&format!("Committed {} resource(s)", kept.len()));
                Ok(task_arn)
            }
            Err((step, cause)) => {
                if !txn.created().is_empty() {
                    self.notifier.warning(&format!(
                        "Creating {step} failed, rolling back {} resource(s)...",
                        txn.created().len()
                    ));
                }
                let rollback = txn
                    .rollback(self.transfer.as_ref(), self.notifier.as_ref(), &self.retry)
                    .await;
                Err(BuildError {
                    step,
                    cause,
                    rollback,
                })
            }
        }
    }

    async fn create_all(
        &self,
        txn: &mut ProvisioningTransaction,
        spec: &MigrationSpec,
        role_arn: &str,
    ) -> Result<String, (BuildStep, TransferError)> {
        let source = self
            .create_location(BuildStep::SourceLocation, &spec.source_bucket, role_arn)
            .await?;
        txn.record(ResourceKind::Location, &source);
        self.notifier.success(&format!("Source location: {source}"));

        let destination = self
            .create_location(BuildStep::DestinationLocation, &spec.destination_bucket, role_arn)
            .await?;
        txn.record(ResourceKind::Location, &destination);
        self.notifier.success(&format!("Dest location: {destination}"));

        let request = TaskRequest {
            name: task_name(&spec.source_bucket, &spec.destination_bucket),
            source_location_arn: source,
            destination_location_arn: destination,
            options: TaskOptions::resolve(&spec.options),
            task_mode: spec.options.task_mode.clone(),
        };
        let task = self
            .retry
            .run("create-task", self.notifier.as_ref(), || {
                self.transfer.create_task(&request)
            })
            .await
            .map_err(|e| (BuildStep::Task, e))?;
        txn.record(ResourceKind::Task, &task);
        self.notifier.success(&format!("Task: {task}"));
        Ok(task)
    }

    async fn create_location(
        &self,
        step: BuildStep,
        bucket: &str,
        role_arn: &str,
    ) -> Result<String, (BuildStep, TransferError)> {
        let request = LocationRequest::for_bucket(bucket, role_arn);
        self.retry
            .run("create-location", self.notifier.as_ref(), || {
                self.transfer.create_s3_location(&request)
            })
            .await
            .map_err(|e| (step, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::MockTransferClient;
    use crate::notify::TracingNotifier;
    use crate::options::TaskOverrides;
    use mockall::predicate::eq;
    use mockall::Sequence;

    const ROLE: &str = "arn:aws:iam::111111111111:role/DataSyncMigrationRole";

    fn builder(transfer: MockTransferClient) -> TransactionalBuilder {
        TransactionalBuilder::new(
            Arc::new(transfer),
            Arc::new(TracingNotifier),
            "us-east-1",
            "111111111111",
        )
    }

    fn spec() -> MigrationSpec {
        MigrationSpec::new("legacy-assets", "platform-assets")
    }

    fn invalid() -> TransferError {
        TransferError::from_code("InvalidRequestException", "bad options")
    }

    #[test]
    fn task_name_format() {
        assert_eq!(task_name("a-src", "b-dst"), "Migration-a-src-to-b-dst");
    }

    #[tokio::test]
    async fn success_creates_three_resources_and_deletes_none() {
        let mut transfer = MockTransferClient::new();
        transfer
            .expect_create_s3_location()
            .times(2)
            .returning(|req| Ok(format!("loc:{}", req.bucket_arn)));
        transfer
            .expect_create_task()
            .withf(|req| {
                req.name == "Migration-legacy-assets-to-platform-assets"
                    && req.source_location_arn == "loc:arn:aws:s3:::legacy-assets"
                    && req.destination_location_arn == "loc:arn:aws:s3:::platform-assets"
                    && req.options == TaskOptions::default()
                    && req.task_mode.is_none()
            })
            .times(1)
            .returning(|_| Ok("task-1".to_string()));
        transfer.expect_delete_location().never();
        transfer.expect_delete_task().never();

        let arn = builder(transfer).build(&spec(), ROLE).await.unwrap();
        assert_eq!(arn, "task-1");
    }

    #[tokio::test]
    async fn task_mode_passed_through_when_set() {
        let mut transfer = MockTransferClient::new();
        transfer
            .expect_create_s3_location()
            .returning(|_| Ok("loc".to_string()));
        transfer
            .expect_create_task()
            .withf(|req| req.task_mode.as_deref() == Some("ENHANCED") && req.options.transfer_mode == "ALL")
            .times(1)
            .returning(|_| Ok("task-1".to_string()));

        let spec = spec().with_options(TaskOverrides {
            transfer_mode: Some("ALL".to_string()),
            task_mode: Some("ENHANCED".to_string()),
            ..TaskOverrides::default()
        });
        builder(transfer).build(&spec, ROLE).await.unwrap();
    }

    #[tokio::test]
    async fn task_failure_rolls_back_locations_newest_first() {
        let mut transfer = MockTransferClient::new();
        let mut seq = Sequence::new();
        transfer
            .expect_create_s3_location()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok("loc-src".to_string()));
        transfer
            .expect_create_s3_location()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok("loc-dst".to_string()));
        transfer
            .expect_create_task()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(invalid()));
        transfer
            .expect_delete_location()
            .with(eq("loc-dst"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        transfer
            .expect_delete_location()
            .with(eq("loc-src"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        transfer.expect_delete_task().never();

        let err = builder(transfer).build(&spec(), ROLE).await.unwrap_err();
        assert_eq!(err.step, BuildStep::Task);
        assert_eq!(err.cause, invalid());
        assert!(err.rollback.is_clean());
        assert_eq!(err.rollback.entries().len(), 2);
    }

    #[tokio::test]
    async fn first_step_failure_deletes_nothing() {
        let mut transfer = MockTransferClient::new();
        transfer
            .expect_create_s3_location()
            .times(1)
            .returning(|_| Err(invalid()));
        transfer.expect_create_task().never();
        transfer.expect_delete_location().never();

        let err = builder(transfer).build(&spec(), ROLE).await.unwrap_err();
        assert_eq!(err.step, BuildStep::SourceLocation);
        assert!(err.rollback.entries().is_empty());
    }

    #[tokio::test]
    async fn delete_failure_does_not_stop_rollback_or_mask_cause() {
        let mut transfer = MockTransferClient::new();
        let mut seq = Sequence::new();
        transfer
            .expect_create_s3_location()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|req| Ok(req.bucket_arn.clone()));
        transfer
            .expect_create_task()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(invalid()));
        transfer
            .expect_delete_location()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(TransferError::Transport("connection reset".into())));
        transfer
            .expect_delete_location()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let err = builder(transfer).build(&spec(), ROLE).await.unwrap_err();
        assert_eq!(err.cause, invalid());
        assert!(!err.rollback.is_clean());
        assert_eq!(
            err.rollback.orphans().map(|r| r.arn.as_str()).collect::<Vec<_>>(),
            vec!["arn:aws:s3:::platform-assets"]
        );
        assert_eq!(err.rollback.to_string(), "rolled back 1 of 2 resource(s), 1 left behind");
    }

    #[tokio::test]
    async fn rollback_deletes_tasks_too() {
        let mut transfer = MockTransferClient::new();
        let mut seq = Sequence::new();
        transfer
            .expect_delete_task()
            .with(eq("task-1"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        transfer
            .expect_delete_location()
            .with(eq("loc-1"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let mut txn = ProvisioningTransaction::new();
        txn.record(ResourceKind::Location, "loc-1");
        txn.record(ResourceKind::Task, "task-1");
        let report = txn
            .rollback(&transfer, &TracingNotifier, &RetryPolicy::default())
            .await;

        assert_eq!(
            report
                .entries()
                .iter()
                .map(|e| e.resource.kind)
                .collect::<Vec<_>>(),
            vec![ResourceKind::Task, ResourceKind::Location]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn throttled_delete_is_retried() {
        let mut transfer = MockTransferClient::new();
        let mut seq = Sequence::new();
        transfer
            .expect_delete_location()
            .with(eq("loc-1"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(TransferError::from_code("ThrottlingException", "slow down")));
        transfer
            .expect_delete_location()
            .with(eq("loc-1"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let mut txn = ProvisioningTransaction::new();
        txn.record(ResourceKind::Location, "loc-1");
        let report = txn
            .rollback(&transfer, &TracingNotifier, &RetryPolicy::default())
            .await;

        assert!(report.is_clean());
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_delete_throttle_recorded_as_orphan() {
        let mut transfer = MockTransferClient::new();
        transfer
            .expect_delete_location()
            .with(eq("loc-2"))
            .times(3)
            .returning(|_| Err(TransferError::from_code("ThrottlingException", "slow down")));
        transfer
            .expect_delete_location()
            .with(eq("loc-1"))
            .times(1)
            .returning(|_| Ok(()));

        let mut txn = ProvisioningTransaction::new();
        txn.record(ResourceKind::Location, "loc-1");
        txn.record(ResourceKind::Location, "loc-2");
        let report = txn
            .rollback(&transfer, &TracingNotifier, &RetryPolicy::default())
            .await;

        assert_eq!(
            report.orphans().map(|r| r.arn.as_str()).collect::<Vec<_>>(),
            vec!["loc-2"]
        );
        assert_eq!(report.entries().len(), 2);
    }

    #[tokio::test]
    async fn dry_run_makes_no_calls() {
        let mut transfer = MockTransferClient::new();
        transfer.expect_create_s3_location().never();
        transfer.expect_create_task().never();

        let arn = builder(transfer)
            .with_mode(RunMode::DryRun)
            .build(&spec(), ROLE)
            .await
            .unwrap();
        assert_eq!(arn, "arn:aws:datasync:us-east-1:111111111111:task/task-DRYRUN");
    }
}
