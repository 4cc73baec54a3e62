//! Non-destructive statement merging
//!
//! The merge removes every statement whose id is in an [`OwnedStatementSet`]
//! and appends freshly built owned statements. Foreign statements keep their
//! bytes and their relative order. Running the same merge twice yields the
//! same document.

use crate::document::{AccessDocument, Statement};
use crate::error::PolicyError;

/// Statement id granting the DataSync role bucket-level access
pub const BUCKET_ACCESS_SID: &str = "DataSyncAllowBucketAccess";

/// Statement id granting the DataSync role object-level access
pub const OBJECT_ACCESS_SID: &str = "DataSyncAllowObjectAccess";

/// Fixed set of statement ids this tool may insert or replace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnedStatementSet {
    sids: &'static [&'static str],
}

impl OwnedStatementSet {
    /// Statements installed for DataSync bucket access
    pub const DATASYNC: Self = Self {
        sids: &[BUCKET_ACCESS_SID, OBJECT_ACCESS_SID],
    };

    /// True if a statement with this id is owned (statements without id never are)
    #[inline]
    #[must_use]
    pub fn owns(&self, sid: Option<&str>) -> bool {
        sid.is_some_and(|sid| self.sids.contains(&sid))
    }

    /// Owned ids
    #[inline]
    #[must_use]
    pub fn sids(&self) -> &'static [&'static str] {
        self.sids
    }
}

impl Default for OwnedStatementSet {
    fn default() -> Self {
        Self::DATASYNC
    }
}

/// Result of a merge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Document to write back
    pub document: AccessDocument,
    /// Owned statements that were removed before appending fresh ones
    pub replaced: usize,
    /// Foreign statements carried over
    pub preserved: usize,
}

/// Replace the owned statements of `current` with `fresh`
///
/// # Errors
/// - `PolicyError::ForeignStatement` if a fresh statement is not owned
/// - `PolicyError::DuplicateSid` if `fresh` repeats an id
pub fn merge_statements(
    mut current: AccessDocument,
    owned: &OwnedStatementSet,
    fresh: Vec<Statement>,
) -> Result<MergeOutcome, PolicyError> {
    if let Some(stray) = fresh.iter().find(|s| !owned.owns(s.sid())) {
        return Err(PolicyError::foreign(stray.sid()));
    }

    let before = current.len();
    current.retain_statements(|s| !owned.owns(s.sid()));
    let preserved = current.len();

    for statement in fresh {
        current.push_statement(statement);
    }
    current.check_unique_sids()?;

    Ok(MergeOutcome {
        document: current,
        replaced: before - preserved,
        preserved,
    })
}
