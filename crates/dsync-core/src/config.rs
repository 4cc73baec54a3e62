//! Run configuration
//!
//! Loaded from YAML once and validated before any remote call. All
//! defaults are named constants.

use crate::error::ConfigError;
use crate::options::TaskOverrides;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Backup root used when `backup_dir` is not set, relative to `$HOME`
pub const DEFAULT_BACKUP_SUBDIR: &str = "Downloads/backups";

static BUCKET_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9][a-z0-9.-]{1,61}[a-z0-9]$").expect("valid bucket regex"));

/// Named AWS profiles for the two accounts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profiles {
    /// Profile of the account owning the source buckets
    pub source: String,
    /// Profile of the account owning the destination buckets
    pub target: String,
}

/// One bucket-to-bucket migration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationSpec {
    pub source_bucket: String,
    pub destination_bucket: String,
    /// Task option overrides
    #[serde(default)]
    pub options: TaskOverrides,
}

impl MigrationSpec {
    /// Create spec with default options
    pub fn new(source_bucket: impl Into<String>, destination_bucket: impl Into<String>) -> Self {
        Self {
            source_bucket: source_bucket.into(),
            destination_bucket: destination_bucket.into(),
            options: TaskOverrides::default(),
        }
    }

    /// With option overrides
    #[inline]
    #[must_use]
    pub fn with_options(mut self, options: TaskOverrides) -> Self {
        self.options = options;
        self
    }
}

/// Validated run configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationConfig {
    pub profiles: Profiles,
    pub aws_region: String,
    /// Name of the DataSync role in the source account
    pub datasync_role_name: String,
    /// Name of the inline permission policy attached to a new role
    pub iam_policy_name: String,
    /// Root directory for policy backups
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_dir: Option<PathBuf>,
    pub migrations: Vec<MigrationSpec>,
}

impl MigrationConfig {
    /// Read and validate a YAML config file
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed or validated
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    /// Parse and validate YAML text
    ///
    /// # Errors
    /// Returns `ConfigError` on syntax errors, missing fields or invalid values
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check required fields and bucket names
    ///
    /// # Errors
    /// Returns the first problem found
    pub fn validate(&self) -> Result<(), ConfigError> {
        require("profiles.source", &self.profiles.source)?;
        require("profiles.target", &self.profiles.target)?;
        require("aws_region", &self.aws_region)?;
        require("datasync_role_name", &self.datasync_role_name)?;
        require("iam_policy_name", &self.iam_policy_name)?;

        if self.migrations.is_empty() {
            return Err(ConfigError::Missing("migrations".to_string()));
        }

        for (idx, migration) in self.migrations.iter().enumerate() {
            let source_field = format!("migrations[{idx}].source_bucket");
            let destination_field = format!("migrations[{idx}].destination_bucket");
            check_bucket(&source_field, &migration.source_bucket)?;
            check_bucket(&destination_field, &migration.destination_bucket)?;
            if migration.source_bucket == migration.destination_bucket {
                return Err(ConfigError::invalid(
                    destination_field,
                    "must differ from source_bucket",
                ));
            }
        }
        Ok(())
    }

    /// Backup root, falling back to `$HOME/Downloads/backups`
    #[must_use]
    pub fn backup_root(&self) -> PathBuf {
        if let Some(dir) = &self.backup_dir {
            return dir.clone();
        }
        std::env::var_os("HOME")
            .map_or_else(|| PathBuf::from("."), PathBuf::from)
            .join(DEFAULT_BACKUP_SUBDIR)
    }

    /// Source buckets in migration order
    #[must_use]
    pub fn source_buckets(&self) -> Vec<String> {
        self.migrations
            .iter()
            .map(|m| m.source_bucket.clone())
            .collect()
    }

    /// Destination buckets in migration order
    #[must_use]
    pub fn destination_buckets(&self) -> Vec<String> {
        self.migrations
            .iter()
            .map(|m| m.destination_bucket.clone())
            .collect()
    }
}

fn require(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Missing(field.to_string()));
    }
    Ok(())
}

fn check_bucket(field: &str, bucket: &str) -> Result<(), ConfigError> {
    require(field, bucket)?;
    if !BUCKET_NAME.is_match(bucket) {
        return Err(ConfigError::invalid(
            field,
            format!("'{bucket}' is not a valid bucket name"),
        ));
    }
    Ok(())
}
