//! Core types shared across components

use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether remote mutations are performed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RunMode {
    /// Perform every step
    #[default]
    Live,
    /// Report intent only; no backup, no mutation
    DryRun,
}

impl RunMode {
    /// Build from a `--dry-run` flag
    #[inline]
    #[must_use]
    pub fn from_dry_run(dry_run: bool) -> Self {
        if dry_run {
            Self::DryRun
        } else {
            Self::Live
        }
    }

    /// True in preview mode
    #[inline]
    #[must_use]
    pub fn is_dry_run(self) -> bool {
        matches!(self, Self::DryRun)
    }
}

/// Account ids behind the two profiles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accounts {
    /// Account owning the source buckets, the role and the DataSync resources
    pub source: String,
    /// Account owning the destination buckets
    pub destination: String,
}

impl Accounts {
    /// Create account pair
    pub fn new(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
        }
    }
}

impl fmt::Display for Accounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Source: {} | Target: {}", self.source, self.destination)
    }
}
