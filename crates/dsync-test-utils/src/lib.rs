//! Testing utilities for dsync workspace
//!
//! In-memory fakes of every remote client. All fakes of a [`FakeWorld`] share
//! one [`CallLog`], so tests can assert on the global order of remote calls.
//! Failures are injected per operation with `fail_next`.

#![allow(missing_docs)]

use async_trait::async_trait;
use dsync_core::config::{MigrationConfig, MigrationSpec, Profiles};
use dsync_core::error::{IdentityError, RemoteFault, StorageError, TransferError};
use dsync_core::notify::{Level, Notifier};
use dsync_core::{
    AccountResolver, Clients, CreateRoleRequest, IdentityClient, LocationRequest, RoleInfo,
    StorageClient, TaskRequest, TransferClient,
};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;

pub const SOURCE_ACCOUNT: &str = "111111111111";
pub const DESTINATION_ACCOUNT: &str = "222222222222";
pub const REGION: &str = "us-east-1";
pub const ROLE_NAME: &str = "DataSyncMigrationRole";
pub const POLICY_NAME: &str = "DataSyncMigrationPolicy";

/// ARN of the test role in the source account
pub fn role_arn() -> String {
    format!("arn:aws:iam::{SOURCE_ACCOUNT}:role/{ROLE_NAME}")
}

/// One remote call as seen by a fake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CallerAccount(String),
    GetRole(String),
    CreateRole(String),
    PutRolePolicy { role: String, policy_name: String },
    HeadBucket(String),
    GetBucketPolicy(String),
    PutBucketPolicy { bucket: String, policy: String },
    CreateLocation(String),
    CreateTask(String),
    DeleteLocation(String),
    DeleteTask(String),
}

impl Call {
    /// True for calls that change remote state
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::CreateRole(_)
                | Self::PutRolePolicy { .. }
                | Self::PutBucketPolicy { .. }
                | Self::CreateLocation(_)
                | Self::CreateTask(_)
                | Self::DeleteLocation(_)
                | Self::DeleteTask(_)
        )
    }

    /// True for rollback deletes
    pub fn is_delete(&self) -> bool {
        matches!(self, Self::DeleteLocation(_) | Self::DeleteTask(_))
    }
}

/// Shared, ordered record of remote calls
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<Call>>>);

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, call: Call) {
        self.0.lock().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().clone()
    }

    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.0.lock().iter().filter(|c| predicate(c)).count()
    }

    pub fn mutations(&self) -> Vec<Call> {
        self.0.lock().iter().filter(|c| c.is_mutation()).cloned().collect()
    }

    pub fn deletes(&self) -> Vec<Call> {
        self.0.lock().iter().filter(|c| c.is_delete()).cloned().collect()
    }
}

/// Queued outcomes keyed by operation name; `None` lets a call through
#[derive(Debug)]
struct Failures<E>(Mutex<HashMap<&'static str, VecDeque<Option<E>>>>);

impl<E> Default for Failures<E> {
    fn default() -> Self {
        Self(Mutex::new(HashMap::new()))
    }
}

impl<E> Failures<E> {
    fn push(&self, operation: &'static str, err: E) {
        self.0.lock().entry(operation).or_default().push_back(Some(err));
    }

    /// Let `successes` calls through, then fail once
    fn push_after(&self, operation: &'static str, successes: usize, err: E) {
        let mut queues = self.0.lock();
        let queue = queues.entry(operation).or_default();
        queue.extend(std::iter::repeat_with(|| None).take(successes));
        queue.push_back(Some(err));
    }

    fn take(&self, operation: &'static str) -> Result<(), E> {
        match self.0.lock().get_mut(operation).and_then(VecDeque::pop_front) {
            Some(Some(err)) => Err(err),
            _ => Ok(()),
        }
    }
}

/// Fixed account id per profile
#[derive(Debug)]
pub struct FakeAccounts {
    log: CallLog,
    profile: String,
    account: String,
    failures: Failures<IdentityError>,
}

impl FakeAccounts {
    pub fn new(log: CallLog, profile: &str, account: &str) -> Self {
        Self {
            log,
            profile: profile.to_string(),
            account: account.to_string(),
            failures: Failures::default(),
        }
    }

    pub fn fail_next(&self, err: IdentityError) {
        self.failures.push("caller_account", err);
    }
}

#[async_trait]
impl AccountResolver for FakeAccounts {
    async fn caller_account(&self) -> Result<String, IdentityError> {
        self.log.record(Call::CallerAccount(self.profile.clone()));
        self.failures.take("caller_account")?;
        Ok(self.account.clone())
    }
}

/// In-memory IAM with a role table
#[derive(Debug)]
pub struct FakeIdentity {
    log: CallLog,
    account: String,
    roles: Mutex<HashMap<String, String>>,
    inline_policies: Mutex<HashMap<(String, String), String>>,
    failures: Failures<IdentityError>,
}

impl FakeIdentity {
    pub fn new(log: CallLog, account: &str) -> Self {
        Self {
            log,
            account: account.to_string(),
            roles: Mutex::new(HashMap::new()),
            inline_policies: Mutex::new(HashMap::new()),
            failures: Failures::default(),
        }
    }

    /// Pre-existing role
    pub fn with_role(self, role_name: &str) -> Self {
        let arn = format!("arn:aws:iam::{}:role/{role_name}", self.account);
        self.roles.lock().insert(role_name.to_string(), arn);
        self
    }

    /// Fail the next call to `operation` (`get_role`, `create_role`, `put_role_policy`)
    pub fn fail_next(&self, operation: &'static str, err: IdentityError) {
        self.failures.push(operation, err);
    }

    pub fn inline_policy(&self, role_name: &str, policy_name: &str) -> Option<String> {
        self.inline_policies
            .lock()
            .get(&(role_name.to_string(), policy_name.to_string()))
            .cloned()
    }
}

#[async_trait]
impl IdentityClient for FakeIdentity {
    async fn get_role(&self, role_name: &str) -> Result<RoleInfo, IdentityError> {
        self.log.record(Call::GetRole(role_name.to_string()));
        self.failures.take("get_role")?;
        match self.roles.lock().get(role_name) {
            Some(arn) => Ok(RoleInfo {
                role_name: role_name.to_string(),
                arn: arn.clone(),
            }),
            None => Err(IdentityError::NoSuchEntity(RemoteFault::new(
                "NoSuchEntity",
                format!("The role with name {role_name} cannot be found."),
            ))),
        }
    }

    async fn create_role(&self, request: &CreateRoleRequest) -> Result<RoleInfo, IdentityError> {
        self.log.record(Call::CreateRole(request.role_name.clone()));
        self.failures.take("create_role")?;
        let arn = format!("arn:aws:iam::{}:role/{}", self.account, request.role_name);
        self.roles
            .lock()
            .insert(request.role_name.clone(), arn.clone());
        Ok(RoleInfo {
            role_name: request.role_name.clone(),
            arn,
        })
    }

    async fn put_role_policy(
        &self,
        role_name: &str,
        policy_name: &str,
        policy_document: &str,
    ) -> Result<(), IdentityError> {
        self.log.record(Call::PutRolePolicy {
            role: role_name.to_string(),
            policy_name: policy_name.to_string(),
        });
        self.failures.take("put_role_policy")?;
        self.inline_policies.lock().insert(
            (role_name.to_string(), policy_name.to_string()),
            policy_document.to_string(),
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
struct Bucket {
    policy: Option<String>,
    forbidden: bool,
}

/// In-memory S3 as seen by one profile
#[derive(Debug)]
pub struct FakeStorage {
    log: CallLog,
    buckets: Mutex<HashMap<String, Bucket>>,
    failures: Failures<StorageError>,
}

impl FakeStorage {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            buckets: Mutex::new(HashMap::new()),
            failures: Failures::default(),
        }
    }

    /// Existing bucket with an optional policy
    pub fn with_bucket(self, bucket: &str, policy: Option<&str>) -> Self {
        self.buckets.lock().insert(
            bucket.to_string(),
            Bucket {
                policy: policy.map(str::to_string),
                forbidden: false,
            },
        );
        self
    }

    /// Existing bucket the profile may not access
    pub fn with_forbidden_bucket(self, bucket: &str) -> Self {
        self.buckets.lock().insert(
            bucket.to_string(),
            Bucket {
                policy: None,
                forbidden: true,
            },
        );
        self
    }

    /// Fail the next call to `operation` (`head_bucket`, `get_bucket_policy`, `put_bucket_policy`)
    pub fn fail_next(&self, operation: &'static str, err: StorageError) {
        self.failures.push(operation, err);
    }

    /// Current policy text of `bucket`
    pub fn policy(&self, bucket: &str) -> Option<String> {
        self.buckets.lock().get(bucket).and_then(|b| b.policy.clone())
    }

    fn lookup(&self, bucket: &str) -> Result<Bucket, StorageError> {
        match self.buckets.lock().get(bucket) {
            None => Err(StorageError::from_code(
                "NoSuchBucket",
                "The specified bucket does not exist",
            )),
            Some(b) if b.forbidden => Err(StorageError::from_code("AccessDenied", "Access Denied")),
            Some(b) => Ok(b.clone()),
        }
    }
}

#[async_trait]
impl StorageClient for FakeStorage {
    async fn head_bucket(&self, bucket: &str) -> Result<(), StorageError> {
        self.log.record(Call::HeadBucket(bucket.to_string()));
        self.failures.take("head_bucket")?;
        self.lookup(bucket).map(|_| ())
    }

    async fn get_bucket_policy(&self, bucket: &str) -> Result<String, StorageError> {
        self.log.record(Call::GetBucketPolicy(bucket.to_string()));
        self.failures.take("get_bucket_policy")?;
        self.lookup(bucket)?.policy.ok_or_else(|| {
            StorageError::from_code("NoSuchBucketPolicy", "The bucket policy does not exist")
        })
    }

    async fn put_bucket_policy(&self, bucket: &str, policy: &str) -> Result<(), StorageError> {
        self.log.record(Call::PutBucketPolicy {
            bucket: bucket.to_string(),
            policy: policy.to_string(),
        });
        self.failures.take("put_bucket_policy")?;
        self.lookup(bucket)?;
        if let Some(b) = self.buckets.lock().get_mut(bucket) {
            b.policy = Some(policy.to_string());
        }
        Ok(())
    }
}

/// In-memory DataSync tracking which resources currently exist
#[derive(Debug)]
pub struct FakeTransfer {
    log: CallLog,
    next_id: Mutex<u32>,
    live: Mutex<Vec<String>>,
    tasks: Mutex<Vec<TaskRequest>>,
    failures: Failures<TransferError>,
}

impl FakeTransfer {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            next_id: Mutex::new(0),
            live: Mutex::new(Vec::new()),
            tasks: Mutex::new(Vec::new()),
            failures: Failures::default(),
        }
    }

    /// Fail the next call to `operation`
    /// (`create_s3_location`, `create_task`, `delete_location`, `delete_task`)
    pub fn fail_next(&self, operation: &'static str, err: TransferError) {
        self.failures.push(operation, err);
    }

    /// Fail call number `nth` (1-based) to `operation`
    pub fn fail_nth(&self, operation: &'static str, nth: usize, err: TransferError) {
        self.failures.push_after(operation, nth.saturating_sub(1), err);
    }

    /// ARNs of resources that exist now
    pub fn live_resources(&self) -> Vec<String> {
        self.live.lock().clone()
    }

    /// Every task request that succeeded
    pub fn task_requests(&self) -> Vec<TaskRequest> {
        self.tasks.lock().clone()
    }

    fn mint(&self, kind: &str) -> String {
        let mut next = self.next_id.lock();
        *next += 1;
        let arn = format!("arn:aws:datasync:{REGION}:{SOURCE_ACCOUNT}:{kind}/{kind}-{:04}", *next);
        self.live.lock().push(arn.clone());
        arn
    }

    fn remove(&self, arn: &str) {
        self.live.lock().retain(|live| live != arn);
    }
}

#[async_trait]
impl TransferClient for FakeTransfer {
    async fn create_s3_location(&self, request: &LocationRequest) -> Result<String, TransferError> {
        self.log.record(Call::CreateLocation(request.bucket_arn.clone()));
        self.failures.take("create_s3_location")?;
        Ok(self.mint("location"))
    }

    async fn create_task(&self, request: &TaskRequest) -> Result<String, TransferError> {
        self.log.record(Call::CreateTask(request.name.clone()));
        self.failures.take("create_task")?;
        self.tasks.lock().push(request.clone());
        Ok(self.mint("task"))
    }

    async fn delete_location(&self, location_arn: &str) -> Result<(), TransferError> {
        self.log.record(Call::DeleteLocation(location_arn.to_string()));
        self.failures.take("delete_location")?;
        self.remove(location_arn);
        Ok(())
    }

    async fn delete_task(&self, task_arn: &str) -> Result<(), TransferError> {
        self.log.record(Call::DeleteTask(task_arn.to_string()));
        self.failures.take("delete_task")?;
        self.remove(task_arn);
        Ok(())
    }
}

/// Notifier keeping every message
#[derive(Debug, Default)]
pub struct RecordingNotifier(Mutex<Vec<(Level, String)>>);

impl RecordingNotifier {
    pub fn messages(&self, level: Level) -> Vec<String> {
        self.0
            .lock()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m.clone())
            .collect()
    }

    pub fn count(&self, level: Level) -> usize {
        self.0.lock().iter().filter(|(l, _)| *l == level).count()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, level: Level, message: &str) {
        self.0.lock().push((level, message.to_string()));
    }
}

/// Every fake of one test, sharing a call log
#[derive(Debug, Clone)]
pub struct FakeWorld {
    pub log: CallLog,
    pub source_account: Arc<FakeAccounts>,
    pub destination_account: Arc<FakeAccounts>,
    pub identity: Arc<FakeIdentity>,
    pub source_storage: Arc<FakeStorage>,
    pub destination_storage: Arc<FakeStorage>,
    pub transfer: Arc<FakeTransfer>,
    pub notifier: Arc<RecordingNotifier>,
}

impl FakeWorld {
    /// World where every bucket of `migrations` exists without a policy
    pub fn new(migrations: &[(&str, &str)]) -> Self {
        let log = CallLog::new();
        let mut source = FakeStorage::new(log.clone());
        let mut destination = FakeStorage::new(log.clone());
        for (src, dst) in migrations {
            source = source.with_bucket(src, None);
            destination = destination.with_bucket(dst, None);
        }
        Self::with_parts(log.clone(), FakeIdentity::new(log, SOURCE_ACCOUNT), source, destination)
    }

    /// World built from pre-configured fakes sharing `log`
    pub fn with_parts(
        log: CallLog,
        identity: FakeIdentity,
        source_storage: FakeStorage,
        destination_storage: FakeStorage,
    ) -> Self {
        Self {
            source_account: Arc::new(FakeAccounts::new(log.clone(), "legacy", SOURCE_ACCOUNT)),
            destination_account: Arc::new(FakeAccounts::new(
                log.clone(),
                "platform",
                DESTINATION_ACCOUNT,
            )),
            identity: Arc::new(identity),
            source_storage: Arc::new(source_storage),
            destination_storage: Arc::new(destination_storage),
            transfer: Arc::new(FakeTransfer::new(log.clone())),
            notifier: Arc::new(RecordingNotifier::default()),
            log,
        }
    }

    pub fn clients(&self) -> Clients {
        Clients {
            source_account: self.source_account.clone(),
            destination_account: self.destination_account.clone(),
            identity: self.identity.clone(),
            source_storage: self.source_storage.clone(),
            destination_storage: self.destination_storage.clone(),
            transfer: self.transfer.clone(),
        }
    }
}

/// Config for `migrations` writing backups under `backup_dir`
pub fn config(migrations: &[(&str, &str)], backup_dir: &Path) -> MigrationConfig {
    MigrationConfig {
        profiles: Profiles {
            source: "legacy".to_string(),
            target: "platform".to_string(),
        },
        aws_region: REGION.to_string(),
        datasync_role_name: ROLE_NAME.to_string(),
        iam_policy_name: POLICY_NAME.to_string(),
        backup_dir: Some(backup_dir.to_path_buf()),
        migrations: migrations
            .iter()
            .map(|(src, dst)| MigrationSpec::new(*src, *dst))
            .collect(),
    }
}

/// Transient rate-limit error from DataSync
pub fn throttled() -> TransferError {
    TransferError::from_code("ThrottlingException", "Rate exceeded")
}
