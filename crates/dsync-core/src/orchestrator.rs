//! Run sequencing
//!
//! Accounts are resolved and the role is provisioned once, before any
//! migration. Migrations then run strictly in order; the first failing
//! migration stops the run and every earlier result is kept.

use crate::clients::{AccountResolver, Clients, StorageClient};
use crate::config::{MigrationConfig, MigrationSpec};
use crate::error::{IdentityError, MigrationError, SetupError};
use crate::notify::Notifier;
use crate::policy::PolicyMergeEngine;
use crate::retry::RetryPolicy;
use crate::role::{RoleDescriptor, RoleProvisioner, RoleRequest, DEFAULT_PROPAGATION_DELAY};
use crate::snapshot::{BackupRecord, SnapshotRecorder};
use crate::transaction::TransactionalBuilder;
use crate::types::{Accounts, RunMode};
use crate::verify::AccessVerifier;
use std::sync::Arc;
use std::time::Duration;

/// A migration whose resources were all created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationResult {
    /// 1-based position in the config
    pub index: usize,
    pub spec: MigrationSpec,
    pub task_arn: String,
    /// `None` in dry-run mode
    pub backup: Option<BackupRecord>,
}

/// The migration that stopped the run
#[derive(Debug)]
pub struct MigrationFailure {
    pub index: usize,
    pub spec: MigrationSpec,
    pub error: MigrationError,
}

/// Outcome of a run that got past shared setup
#[derive(Debug)]
pub struct RunReport {
    pub mode: RunMode,
    pub accounts: Accounts,
    pub role: RoleDescriptor,
    /// Completed migrations in order
    pub results: Vec<MigrationResult>,
    pub failure: Option<MigrationFailure>,
    /// Migrations in the config
    pub total: usize,
}

impl RunReport {
    /// Migrations never attempted because an earlier one failed
    #[must_use]
    pub fn skipped(&self) -> usize {
        let attempted = self.results.len() + usize::from(self.failure.is_some());
        self.total - attempted
    }

    /// False only when a failure invalidates the run as a whole
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failure
            .as_ref()
            .map_or(true, |failure| !failure.error.is_run_fatal())
    }
}

/// Per-migration components, built once the role is known
#[derive(Debug)]
struct Pipeline {
    verifier: AccessVerifier,
    recorder: SnapshotRecorder,
    merger: PolicyMergeEngine,
    builder: TransactionalBuilder,
    role_arn: String,
}

/// Drives a whole run
#[derive(Debug)]
pub struct MigrationOrchestrator {
    config: MigrationConfig,
    clients: Clients,
    notifier: Arc<dyn Notifier>,
    mode: RunMode,
    retry: RetryPolicy,
    propagation_delay: Duration,
}

impl MigrationOrchestrator {
    pub fn new(config: MigrationConfig, clients: Clients, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            config,
            clients,
            notifier,
            mode: RunMode::Live,
            retry: RetryPolicy::default(),
            propagation_delay: DEFAULT_PROPAGATION_DELAY,
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

    #[inline]
    #[must_use]
    pub fn with_propagation_delay(mut self, delay: Duration) -> Self {
        self.propagation_delay = delay;
        self
    }

    /// Execute the run
    ///
    /// # Errors
    /// `SetupError` if accounts cannot be resolved or the role cannot be
    /// provisioned; no migration is attempted in that case
    pub async fn run(&self) -> Result<RunReport, SetupError> {
        let accounts = self.resolve_accounts().await?;
        self.notifier.success(&accounts.to_string());

        let total = self.config.migrations.len();
        self.notifier
            .info(&format!("Processing {total} migration(s)"));

        self.notifier.info("Setting up IAM role...");
        let (sources, destinations) = (
            self.config.source_buckets(),
            self.config.destination_buckets(),
        );
        let role = RoleProvisioner::new(Arc::clone(&self.clients.identity), self.notifier.clone())
            .with_mode(self.mode)
            .with_retry(self.retry)
            .with_propagation_delay(self.propagation_delay)
            .ensure(&RoleRequest {
                role_name: &self.config.datasync_role_name,
                policy_name: &self.config.iam_policy_name,
                region: &self.config.aws_region,
                accounts: &accounts,
                source_buckets: &sources,
                destination_buckets: &destinations,
            })
            .await?;
        self.notifier.info(&format!("Role: {}", role.role_arn));

        let pipeline = self.pipeline(&accounts, &role);
        let mut results = Vec::with_capacity(total);
        let mut failure = None;

        for (offset, spec) in self.config.migrations.iter().enumerate() {
            let index = offset + 1;
            self.notifier.info(&format!(
                "Migration {index}/{total}: {} → {}",
                spec.source_bucket, spec.destination_bucket
            ));
            match self.migrate(&pipeline, index, spec).await {
                Ok(result) => {
                    self.notifier
                        .success(&format!("Migration {index} setup complete"));
                    results.push(result);
                }
                Err(error) => {
                    self.notifier
                        .error(&format!("Migration {index} failed: {error}"));
                    failure = Some(MigrationFailure {
                        index,
                        spec: spec.clone(),
                        error,
                    });
                    break;
                }
            }
        }

        Ok(RunReport {
            mode: self.mode,
            accounts,
            role,
            results,
            failure,
            total,
        })
    }

    async fn resolve_accounts(&self) -> Result<Accounts, SetupError> {
        let source = self
            .caller_account(
                "source",
                &self.config.profiles.source,
                self.clients.source_account.as_ref(),
            )
            .await?;
        let destination = self
            .caller_account(
                "target",
                &self.config.profiles.target,
                self.clients.destination_account.as_ref(),
            )
            .await?;
        Ok(Accounts::new(source, destination))
    }

    async fn caller_account(
        &self,
        side: &'static str,
        profile: &str,
        resolver: &dyn AccountResolver,
    ) -> Result<String, SetupError> {
        self.retry
            .run("get-caller-identity", self.notifier.as_ref(), || {
                resolver.caller_account()
            })
            .await
            .map_err(|source: IdentityError| SetupError::Account {
                side,
                profile: profile.to_string(),
                source,
            })
    }

    fn pipeline(&self, accounts: &Accounts, role: &RoleDescriptor) -> Pipeline {
        let notifier = &self.notifier;
        Pipeline {
            verifier: AccessVerifier::new(notifier.clone()),
            recorder: SnapshotRecorder::new(
                self.config.backup_root(),
                self.config.profiles.clone(),
                notifier.clone(),
            )
            .with_retry(self.retry),
            merger: PolicyMergeEngine::new(notifier.clone())
                .with_mode(self.mode)
                .with_retry(self.retry),
            builder: TransactionalBuilder::new(
                Arc::clone(&self.clients.transfer),
                notifier.clone(),
                &self.config.aws_region,
                &accounts.source,
            )
            .with_mode(self.mode)
            .with_retry(self.retry),
            role_arn: role.role_arn.clone(),
        }
    }

    async fn migrate(
        &self,
        pipeline: &Pipeline,
        index: usize,
        spec: &MigrationSpec,
    ) -> Result<MigrationResult, MigrationError> {
        let source_storage = self.clients.source_storage.as_ref();
        let destination_storage = self.clients.destination_storage.as_ref();

        if !self.mode.is_dry_run() {
            self.notifier.info("Verifying bucket access...");
            check_reachable(pipeline, source_storage, "source", &spec.source_bucket).await?;
            check_reachable(
                pipeline,
                destination_storage,
                "destination",
                &spec.destination_bucket,
            )
            .await?;
            self.notifier.success("Bucket access verified");
        }

        let backup = if self.mode.is_dry_run() {
            self.notifier.info("[DRY RUN] Would backup policies");
            None
        } else {
            Some(
                pipeline
                    .recorder
                    .capture(index, spec, source_storage, destination_storage)
                    .await?,
            )
        };

        self.notifier.info("Updating bucket policies...");
        pipeline
            .merger
            .apply(source_storage, &spec.source_bucket, &pipeline.role_arn)
            .await?;
        pipeline
            .merger
            .apply(destination_storage, &spec.destination_bucket, &pipeline.role_arn)
            .await?;

        self.notifier.info("Creating DataSync task...");
        let task_arn = pipeline.builder.build(spec, &pipeline.role_arn).await?;

        Ok(MigrationResult {
            index,
            spec: spec.clone(),
            task_arn,
            backup,
        })
    }
}

async fn check_reachable(
    pipeline: &Pipeline,
    storage: &dyn StorageClient,
    side: &'static str,
    bucket: &str,
) -> Result<(), MigrationError> {
    let access = pipeline
        .verifier
        .verify(storage, bucket)
        .await
        .map_err(|e| MigrationError::storage(bucket, e))?;
    if access.is_reachable() {
        Ok(())
    } else {
        Err(MigrationError::BucketUnreachable {
            side,
            bucket: bucket.to_string(),
            access,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{
        MockAccountResolver, MockIdentityClient, MockStorageClient, MockTransferClient, RoleInfo,
    };
    use crate::config::Profiles;
    use crate::error::StorageError;
    use crate::notify::TracingNotifier;

    fn config() -> MigrationConfig {
        MigrationConfig {
            profiles: Profiles {
                source: "legacy".to_string(),
                target: "platform".to_string(),
            },
            aws_region: "us-east-1".to_string(),
            datasync_role_name: "DataSyncMigrationRole".to_string(),
            iam_policy_name: "DataSyncMigrationPolicy".to_string(),
            backup_dir: None,
            migrations: vec![
                MigrationSpec::new("legacy-a", "platform-a"),
                MigrationSpec::new("legacy-b", "platform-b"),
            ],
        }
    }

    fn resolver(account: &'static str) -> Arc<MockAccountResolver> {
        let mut resolver = MockAccountResolver::new();
        resolver
            .expect_caller_account()
            .returning(move || Ok(account.to_string()));
        Arc::new(resolver)
    }

    fn clients(
        identity: MockIdentityClient,
        source: MockStorageClient,
        destination: MockStorageClient,
        transfer: MockTransferClient,
    ) -> Clients {
        Clients {
            source_account: resolver("111111111111"),
            destination_account: resolver("222222222222"),
            identity: Arc::new(identity),
            source_storage: Arc::new(source),
            destination_storage: Arc::new(destination),
            transfer: Arc::new(transfer),
        }
    }

    fn existing_role() -> MockIdentityClient {
        let mut identity = MockIdentityClient::new();
        identity.expect_get_role().returning(|name| {
            Ok(RoleInfo {
                role_name: name.to_string(),
                arn: format!("arn:aws:iam::111111111111:role/{name}"),
            })
        });
        identity
    }

    #[tokio::test]
    async fn account_failure_stops_before_role_setup() {
        let mut failing = MockAccountResolver::new();
        failing
            .expect_caller_account()
            .returning(|| Err(IdentityError::from_code("InvalidClientTokenId", "expired")));
        let mut identity = MockIdentityClient::new();
        identity.expect_get_role().never();

        let mut clients = clients(
            identity,
            MockStorageClient::new(),
            MockStorageClient::new(),
            MockTransferClient::new(),
        );
        clients.source_account = Arc::new(failing);

        let err = MigrationOrchestrator::new(config(), clients, Arc::new(TracingNotifier))
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, SetupError::Account { side: "source", .. }));
    }

    #[tokio::test]
    async fn dry_run_touches_no_bucket_and_creates_nothing() {
        let mut source = MockStorageClient::new();
        source.expect_head_bucket().never();
        source.expect_get_bucket_policy().never();
        source.expect_put_bucket_policy().never();
        let mut destination = MockStorageClient::new();
        destination.expect_head_bucket().never();
        destination.expect_put_bucket_policy().never();
        let mut transfer = MockTransferClient::new();
        transfer.expect_create_s3_location().never();
        transfer.expect_create_task().never();

        let report = MigrationOrchestrator::new(
            config(),
            clients(existing_role(), source, destination, transfer),
            Arc::new(TracingNotifier),
        )
        .with_mode(RunMode::DryRun)
        .run()
        .await
        .unwrap();

        assert_eq!(report.results.len(), 2);
        assert!(report.results.iter().all(|r| r.backup.is_none()));
        assert_eq!(
            report.results[0].task_arn,
            "arn:aws:datasync:us-east-1:111111111111:task/task-DRYRUN"
        );
        assert!(report.is_success());
    }

    #[tokio::test]
    async fn unreachable_bucket_stops_run_without_mutation() {
        let mut source = MockStorageClient::new();
        source
            .expect_head_bucket()
            .times(1)
            .returning(|_| Err(StorageError::from_status(404, "Not Found")));
        source.expect_put_bucket_policy().never();
        let mut transfer = MockTransferClient::new();
        transfer.expect_create_s3_location().never();

        let report = MigrationOrchestrator::new(
            config(),
            clients(existing_role(), source, MockStorageClient::new(), transfer),
            Arc::new(TracingNotifier),
        )
        .run()
        .await
        .unwrap();

        let failure = report.failure.as_ref().unwrap();
        assert_eq!(failure.index, 1);
        assert!(matches!(
            failure.error,
            MigrationError::BucketUnreachable { side: "source", .. }
        ));
        assert!(report.results.is_empty());
        assert_eq!(report.skipped(), 1);
        assert!(report.is_success());
    }
}
