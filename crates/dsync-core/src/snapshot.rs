//! Pre-change backups of bucket policies
//!
//! Each migration gets its own directory `mig<index>-<YYYYmmdd-HHMMSS>` under
//! the backup root holding:
//! - `source-bucket-policy.json` / `dest-bucket-policy.json`: policy text as
//!   returned by S3, only for buckets that had one
//! - `manifest.json`: the [`BackupRecord`]
//! - `restore.sh`: puts both buckets back into their captured state
//!
//! Files are opened with `create_new`; an existing backup is never replaced.

use crate::clients::{fetch_bucket_policy, StorageClient};
use crate::config::{MigrationSpec, Profiles};
use crate::error::MigrationError;
use crate::notify::Notifier;
use crate::restore::render_restore_script;
use crate::retry::RetryPolicy;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

pub const SOURCE_POLICY_FILE: &str = "source-bucket-policy.json";
pub const DESTINATION_POLICY_FILE: &str = "dest-bucket-policy.json";
pub const MANIFEST_FILE: &str = "manifest.json";
pub const RESTORE_SCRIPT_FILE: &str = "restore.sh";

const DIR_TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

/// Failure writing a backup
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// Filesystem operation failed
    #[error("cannot write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Manifest could not be encoded
    #[error("cannot encode backup manifest: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl SnapshotError {
    /// Create I/O error for path
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Policy state of one bucket before the change
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapturedPolicy {
    pub bucket: String,
    /// Profile with rights on the bucket
    pub profile: String,
    /// Backup file name; `None` when the bucket had no policy
    pub file: Option<String>,
    #[serde(skip)]
    pub policy: Option<String>,
}

impl CapturedPolicy {
    /// True if the bucket had no policy attached
    #[inline]
    #[must_use]
    pub fn is_absent(&self) -> bool {
        self.policy.is_none()
    }
}

/// Write-once record of a migration's pre-change state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupRecord {
    /// 1-based migration index
    pub index: usize,
    pub timestamp: DateTime<Local>,
    pub directory: PathBuf,
    pub source: CapturedPolicy,
    pub destination: CapturedPolicy,
}

impl BackupRecord {
    /// Path of the restore script
    #[must_use]
    pub fn restore_script(&self) -> PathBuf {
        self.directory.join(RESTORE_SCRIPT_FILE)
    }
}

/// Directory name for migration `index` captured at `timestamp`
#[must_use]
pub fn backup_dir_name(index: usize, timestamp: &DateTime<Local>) -> String {
    format!("mig{index}-{}", timestamp.format(DIR_TIMESTAMP_FORMAT))
}

/// Captures bucket policies before they are changed
#[derive(Debug, Clone)]
pub struct SnapshotRecorder {
    root: PathBuf,
    profiles: Profiles,
    retry: RetryPolicy,
    notifier: Arc<dyn Notifier>,
}

impl SnapshotRecorder {
    pub fn new(root: impl Into<PathBuf>, profiles: Profiles, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            root: root.into(),
            profiles,
            retry: RetryPolicy::default(),
            notifier,
        }
    }

    /// With retry policy for policy reads
    #[inline]
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Capture both buckets of `spec` now
    ///
    /// # Errors
    /// - `MigrationError::Storage` if a policy cannot be read
    /// - `MigrationError::Snapshot` if anything cannot be written
    pub async fn capture(
        &self,
        index: usize,
        spec: &MigrationSpec,
        source_storage: &dyn StorageClient,
        destination_storage: &dyn StorageClient,
    ) -> Result<BackupRecord, MigrationError> {
        self.capture_at(index, spec, source_storage, destination_storage, Local::now())
            .await
    }

    /// Capture both buckets of `spec`, naming the backup after `timestamp`
    ///
    /// # Errors
    /// Same as [`SnapshotRecorder::capture`]
    pub async fn capture_at(
        &self,
        index: usize,
        spec: &MigrationSpec,
        source_storage: &dyn StorageClient,
        destination_storage: &dyn StorageClient,
        timestamp: DateTime<Local>,
    ) -> Result<BackupRecord, MigrationError> {
        let source_policy = self.read_policy(source_storage, &spec.source_bucket).await?;
        let destination_policy = self
            .read_policy(destination_storage, &spec.destination_bucket)
            .await?;

        let directory = self.root.join(backup_dir_name(index, &timestamp));
        tokio::fs::create_dir_all(&directory)
            .await
            .map_err(|e| SnapshotError::io(&directory, e))?;

        let record = BackupRecord {
            index,
            timestamp,
            source: captured(
                &spec.source_bucket,
                &self.profiles.source,
                SOURCE_POLICY_FILE,
                source_policy,
            ),
            destination: captured(
                &spec.destination_bucket,
                &self.profiles.target,
                DESTINATION_POLICY_FILE,
                destination_policy,
            ),
            directory,
        };

        for capture in [&record.source, &record.destination] {
            if let (Some(file), Some(policy)) = (&capture.file, &capture.policy) {
                write_new(&record.directory.join(file), policy.as_bytes()).await?;
            } else {
                self.notifier.info(&format!(
                    "No existing policy on bucket '{}' (restore will remove any policy)",
                    capture.bucket
                ));
            }
        }

        let manifest = serde_json::to_vec_pretty(&record).map_err(SnapshotError::from)?;
        write_new(&record.directory.join(MANIFEST_FILE), &manifest).await?;

        let script = record.restore_script();
        write_new(&script, render_restore_script(&record).as_bytes()).await?;
        make_executable(&script).await?;

        self.notifier
            .success(&format!("Backup saved to {}", record.directory.display()));
        Ok(record)
    }

    async fn read_policy(
        &self,
        storage: &dyn StorageClient,
        bucket: &str,
    ) -> Result<Option<String>, MigrationError> {
        self.retry
            .run("get-bucket-policy", self.notifier.as_ref(), || {
                fetch_bucket_policy(storage, bucket)
            })
            .await
            .map_err(|e| MigrationError::storage(bucket, e))
    }
}

fn captured(bucket: &str, profile: &str, file: &str, policy: Option<String>) -> CapturedPolicy {
    CapturedPolicy {
        bucket: bucket.to_string(),
        profile: profile.to_string(),
        file: policy.as_ref().map(|_| file.to_string()),
        policy,
    }
}

async fn write_new(path: &Path, contents: &[u8]) -> Result<(), SnapshotError> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
        .map_err(|e| SnapshotError::io(path, e))?;
    file.write_all(contents)
        .await
        .map_err(|e| SnapshotError::io(path, e))?;
    file.sync_all().await.map_err(|e| SnapshotError::io(path, e))
}

#[cfg(unix)]
async fn make_executable(path: &Path) -> Result<(), SnapshotError> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .await
        .map_err(|e| SnapshotError::io(path, e))
}

#[cfg(not(unix))]
async fn make_executable(_path: &Path) -> Result<(), SnapshotError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::MockStorageClient;
    use crate::error::{RemoteFault, StorageError};
    use crate::notify::TracingNotifier;
    use chrono::TimeZone;

    const POLICY: &str = "{\n  \"Version\": \"2012-10-17\",\n  \"Statement\": []\n}";

    fn profiles() -> Profiles {
        Profiles {
            source: "legacy".to_string(),
            target: "platform".to_string(),
        }
    }

    fn storage_with(policy: Option<&'static str>) -> MockStorageClient {
        let mut storage = MockStorageClient::new();
        storage.expect_get_bucket_policy().returning(move |_| match policy {
            Some(text) => Ok(text.to_string()),
            None => Err(StorageError::NoSuchBucketPolicy(RemoteFault::new(
                "NoSuchBucketPolicy",
                "",
            ))),
        });
        storage
    }

    fn timestamp() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap()
    }

    fn recorder(root: &Path) -> SnapshotRecorder {
        SnapshotRecorder::new(root, profiles(), Arc::new(TracingNotifier))
    }

    #[test]
    fn dir_name_format() {
        assert_eq!(backup_dir_name(2, &timestamp()), "mig2-20240309-140507");
    }

    #[tokio::test]
    async fn captures_policy_verbatim_and_marks_absent() {
        let root = tempfile::tempdir().unwrap();
        let spec = MigrationSpec::new("legacy-assets", "platform-assets");

        let record = recorder(root.path())
            .capture_at(1, &spec, &storage_with(Some(POLICY)), &storage_with(None), timestamp())
            .await
            .unwrap();

        assert_eq!(record.directory, root.path().join("mig1-20240309-140507"));
        assert_eq!(
            std::fs::read_to_string(record.directory.join(SOURCE_POLICY_FILE)).unwrap(),
            POLICY
        );
        assert!(!record.directory.join(DESTINATION_POLICY_FILE).exists());
        assert!(record.destination.is_absent());
        assert_eq!(record.destination.file, None);

        let manifest: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(record.directory.join(MANIFEST_FILE)).unwrap(),
        )
        .unwrap();
        assert_eq!(manifest["source"]["bucket"], "legacy-assets");
        assert_eq!(manifest["destination"]["file"], serde_json::Value::Null);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn restore_script_is_executable() {
        use std::os::unix::fs::PermissionsExt;

        let root = tempfile::tempdir().unwrap();
        let spec = MigrationSpec::new("legacy-assets", "platform-assets");
        let record = recorder(root.path())
            .capture_at(1, &spec, &storage_with(None), &storage_with(None), timestamp())
            .await
            .unwrap();

        let mode = std::fs::metadata(record.restore_script())
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[tokio::test]
    async fn existing_backup_never_overwritten() {
        let root = tempfile::tempdir().unwrap();
        let spec = MigrationSpec::new("legacy-assets", "platform-assets");
        let rec = recorder(root.path());

        rec.capture_at(1, &spec, &storage_with(Some(POLICY)), &storage_with(None), timestamp())
            .await
            .unwrap();
        let err = rec
            .capture_at(1, &spec, &storage_with(Some("{}")), &storage_with(None), timestamp())
            .await
            .unwrap_err();

        assert!(err.is_run_fatal());
        assert_eq!(
            std::fs::read_to_string(
                root.path()
                    .join("mig1-20240309-140507")
                    .join(SOURCE_POLICY_FILE)
            )
            .unwrap(),
            POLICY
        );
    }

    #[tokio::test]
    async fn unreadable_policy_is_migration_error() {
        let root = tempfile::tempdir().unwrap();
        let spec = MigrationSpec::new("legacy-assets", "platform-assets");
        let mut denied = MockStorageClient::new();
        denied
            .expect_get_bucket_policy()
            .returning(|_| Err(StorageError::from_code("AccessDenied", "")));

        let err = recorder(root.path())
            .capture_at(1, &spec, &denied, &storage_with(None), timestamp())
            .await
            .unwrap_err();

        assert!(matches!(err, MigrationError::Storage { ref bucket, .. } if bucket == "legacy-assets"));
        assert!(!err.is_run_fatal());
        assert!(std::fs::read_dir(root.path()).unwrap().next().is_none());
    }
}
