//! Error types for dsync
//!
//! Remote failures are closed enums per service domain. A machine-readable
//! error code is classified exactly once, by the `from_code` constructors;
//! everything downstream matches on variants.
//!
//! - [`IdentityError`]: IAM / STS
//! - [`StorageError`]: S3 bucket probes and policies
//! - [`TransferError`]: DataSync locations and tasks
//! - [`ConfigError`], [`SetupError`]: fatal to the whole run
//! - [`MigrationError`]: fatal to one migration

use crate::snapshot::SnapshotError;
use crate::transaction::BuildError;
use crate::verify::BucketAccess;
use dsync_policy::PolicyError;
use std::fmt;
use std::path::PathBuf;

/// Error codes signalling rate limiting
pub const THROTTLE_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "RequestLimitExceeded",
    "TooManyRequestsException",
    "SlowDown",
];

const ACCESS_DENIED_CODES: &[&str] = &["AccessDenied", "AccessDeniedException", "Forbidden", "403"];

/// True if `code` is a rate-limit code
#[inline]
#[must_use]
pub fn is_throttle_code(code: &str) -> bool {
    THROTTLE_CODES.contains(&code)
}

fn is_access_denied_code(code: &str) -> bool {
    ACCESS_DENIED_CODES.contains(&code)
}

/// Structured cause reported by a remote service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFault {
    /// Machine-readable error code
    pub code: String,
    /// Human-readable message
    pub message: String,
}

impl RemoteFault {
    /// Create a fault
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for RemoteFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{}: {}", self.code, self.message)
        }
    }
}

/// Errors that may be retried after a delay
pub trait Retryable {
    /// True for transient rate-limit failures
    fn is_transient_throttle(&self) -> bool;
}

/// IAM and STS failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    /// Entity (role, policy) does not exist
    #[error("no such entity: {0}")]
    NoSuchEntity(RemoteFault),

    /// Caller lacks permission
    #[error("access denied: {0}")]
    AccessDenied(RemoteFault),

    /// Rate limited
    #[error("throttled: {0}")]
    Throttled(RemoteFault),

    /// Any other service error
    #[error("identity service error: {0}")]
    Service(RemoteFault),

    /// Response lacked a required field
    #[error("malformed identity response: {0}")]
    MalformedResponse(String),

    /// Request never produced a service response
    #[error("identity transport error: {0}")]
    Transport(String),
}

impl IdentityError {
    /// Classify a service error code
    pub fn from_code(code: &str, message: impl Into<String>) -> Self {
        let fault = RemoteFault::new(code, message);
        match code {
            "NoSuchEntity" | "NoSuchEntityException" => Self::NoSuchEntity(fault),
            c if is_throttle_code(c) => Self::Throttled(fault),
            c if is_access_denied_code(c) => Self::AccessDenied(fault),
            _ => Self::Service(fault),
        }
    }
}

impl Retryable for IdentityError {
    fn is_transient_throttle(&self) -> bool {
        matches!(self, Self::Throttled(_))
    }
}

/// S3 failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// Bucket does not exist
    #[error("no such bucket: {0}")]
    NoSuchBucket(RemoteFault),

    /// Bucket has no policy attached
    #[error("no bucket policy: {0}")]
    NoSuchBucketPolicy(RemoteFault),

    /// Bucket exists but caller lacks permission
    #[error("access denied: {0}")]
    AccessDenied(RemoteFault),

    /// Rate limited
    #[error("throttled: {0}")]
    Throttled(RemoteFault),

    /// Any other service error
    #[error("storage service error: {0}")]
    Service(RemoteFault),

    /// Request never produced a service response
    #[error("storage transport error: {0}")]
    Transport(String),
}

impl StorageError {
    /// Classify a service error code
    pub fn from_code(code: &str, message: impl Into<String>) -> Self {
        let fault = RemoteFault::new(code, message);
        match code {
            "NoSuchBucketPolicy" => Self::NoSuchBucketPolicy(fault),
            "NoSuchBucket" | "NotFound" | "404" => Self::NoSuchBucket(fault),
            c if is_throttle_code(c) => Self::Throttled(fault),
            c if is_access_denied_code(c) => Self::AccessDenied(fault),
            _ => Self::Service(fault),
        }
    }

    /// Classify a bare HTTP status (HEAD responses carry no error body)
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        match status {
            404 => Self::NoSuchBucket(RemoteFault::new("404", message)),
            403 => Self::AccessDenied(RemoteFault::new("403", message)),
            429 | 503 => Self::Throttled(RemoteFault::new(status.to_string(), message)),
            _ => Self::Service(RemoteFault::new(status.to_string(), message)),
        }
    }
}

impl Retryable for StorageError {
    fn is_transient_throttle(&self) -> bool {
        matches!(self, Self::Throttled(_))
    }
}

/// DataSync failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransferError {
    /// Rate limited
    #[error("throttled: {0}")]
    Throttled(RemoteFault),

    /// Request rejected as invalid
    #[error("invalid request: {0}")]
    InvalidRequest(RemoteFault),

    /// Any other service error
    #[error("transfer service error: {0}")]
    Service(RemoteFault),

    /// Response lacked a required field
    #[error("malformed transfer response: {0}")]
    MalformedResponse(String),

    /// Request never produced a service response
    #[error("transfer transport error: {0}")]
    Transport(String),
}

impl TransferError {
    /// Classify a service error code
    pub fn from_code(code: &str, message: impl Into<String>) -> Self {
        let fault = RemoteFault::new(code, message);
        match code {
            c if is_throttle_code(c) => Self::Throttled(fault),
            "InvalidRequestException" | "ValidationException" => Self::InvalidRequest(fault),
            _ => Self::Service(fault),
        }
    }
}

impl Retryable for TransferError {
    fn is_transient_throttle(&self) -> bool {
        matches!(self, Self::Throttled(_))
    }
}

/// Malformed or unreadable configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Configuration file could not be read
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML syntax error or missing/mistyped field
    #[error("invalid config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Required field present but empty
    #[error("missing config field: {0}")]
    Missing(String),

    /// Field present but unusable
    #[error("invalid config field {field}: {reason}")]
    Invalid { field: String, reason: String },
}

impl ConfigError {
    /// Create invalid field error
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Failures in shared setup; nothing has been mutated per migration yet
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    /// Account id for a profile could not be resolved
    #[error("cannot resolve account for {side} profile '{profile}': {source}")]
    Account {
        side: &'static str,
        profile: String,
        #[source]
        source: IdentityError,
    },

    /// Role lookup or creation failed
    #[error("role setup failed for '{role}': {source}")]
    Role {
        role: String,
        #[source]
        source: IdentityError,
    },
}

/// Failures confined to one migration
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    /// Verifier reported the bucket missing or forbidden
    #[error("cannot access {side} bucket '{bucket}': {access}")]
    BucketUnreachable {
        side: &'static str,
        bucket: String,
        access: BucketAccess,
    },

    /// Storage call failed
    #[error("storage error on bucket '{bucket}': {source}")]
    Storage {
        bucket: String,
        #[source]
        source: StorageError,
    },

    /// Existing bucket policy cannot be merged safely
    #[error("refusing to update policy of bucket '{bucket}': {source}")]
    Policy {
        bucket: String,
        #[source]
        source: PolicyError,
    },

    /// Backup could not be written
    #[error("backup failed: {0}")]
    Snapshot(#[from] SnapshotError),

    /// Resource creation failed (already rolled back)
    #[error(transparent)]
    Provisioning(#[from] BuildError),
}

impl MigrationError {
    /// Create storage error for bucket
    pub fn storage(bucket: impl Into<String>, source: StorageError) -> Self {
        Self::Storage {
            bucket: bucket.into(),
            source,
        }
    }

    /// Create policy error for bucket
    pub fn policy(bucket: impl Into<String>, source: PolicyError) -> Self {
        Self::Policy {
            bucket: bucket.into(),
            source,
        }
    }

    /// True if the failure invalidates the whole run, not just this migration
    ///
    /// A backup that could not be written must never be followed by mutation.
    #[inline]
    #[must_use]
    pub fn is_run_fatal(&self) -> bool {
        matches!(self, Self::Snapshot(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttle_codes_classify_as_throttled() {
        for code in THROTTLE_CODES {
            assert!(IdentityError::from_code(code, "").is_transient_throttle());
            assert!(StorageError::from_code(code, "").is_transient_throttle());
            assert!(TransferError::from_code(code, "").is_transient_throttle());
        }
    }

    #[test]
    fn identity_classification() {
        assert!(matches!(
            IdentityError::from_code("NoSuchEntity", "role missing"),
            IdentityError::NoSuchEntity(_)
        ));
        assert!(matches!(
            IdentityError::from_code("AccessDenied", ""),
            IdentityError::AccessDenied(_)
        ));
        assert!(matches!(
            IdentityError::from_code("MalformedPolicyDocument", ""),
            IdentityError::Service(_)
        ));
    }

    #[test]
    fn storage_classification() {
        assert!(matches!(
            StorageError::from_code("NoSuchBucketPolicy", ""),
            StorageError::NoSuchBucketPolicy(_)
        ));
        assert!(matches!(
            StorageError::from_code("NoSuchBucket", ""),
            StorageError::NoSuchBucket(_)
        ));
        assert!(matches!(
            StorageError::from_status(404, ""),
            StorageError::NoSuchBucket(_)
        ));
        assert!(matches!(
            StorageError::from_status(403, ""),
            StorageError::AccessDenied(_)
        ));
        assert!(matches!(
            StorageError::from_status(500, ""),
            StorageError::Service(_)
        ));
    }

    #[test]
    fn non_throttle_errors_not_retryable() {
        assert!(!TransferError::from_code("InvalidRequestException", "").is_transient_throttle());
        assert!(!StorageError::from_code("AccessDenied", "").is_transient_throttle());
        assert!(!IdentityError::Transport("timeout".into()).is_transient_throttle());
    }

    #[test]
    fn fault_display() {
        assert_eq!(RemoteFault::new("Throttling", "slow down").to_string(), "Throttling: slow down");
        assert_eq!(RemoteFault::new("404", "").to_string(), "404");
    }

    #[test]
    fn only_snapshot_failures_are_run_fatal() {
        let storage = MigrationError::storage("b", StorageError::Transport("reset".into()));
        assert!(!storage.is_run_fatal());

        let snapshot = MigrationError::Snapshot(SnapshotError::io(
            "/tmp/x",
            std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        ));
        assert!(snapshot.is_run_fatal());
    }
}
