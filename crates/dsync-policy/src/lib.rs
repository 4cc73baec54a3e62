//! Bucket access documents for cross-account DataSync migrations
//!
//! This crate is pure: it never talks to a remote service. It provides:
//! - [`AccessDocument`] / [`Statement`]: a policy model that keeps every
//!   statement as raw JSON, so unrelated statements survive a rewrite byte for byte
//! - [`OwnedStatementSet`] and [`merge_statements`]: replace only the statements
//!   this tool owns, keep everything else in place and in order
//! - Builders for the trust, permission and bucket statements the tool installs
//!
//! # Example
//!
//! ```rust
//! use dsync_policy::{bucket_access_statements, merge_statements, AccessDocument, OwnedStatementSet};
//!
//! # fn main() -> Result<(), dsync_policy::PolicyError> {
//! let current = AccessDocument::parse(r#"{"Version":"2012-10-17","Statement":[{"Sid":"AllowCI","Effect":"Allow"}]}"#)?;
//! let fresh = bucket_access_statements("my-bucket", "arn:aws:iam::111111111111:role/sync")?;
//! let outcome = merge_statements(current, &OwnedStatementSet::DATASYNC, fresh.to_vec())?;
//!
//! assert_eq!(outcome.document.len(), 3);
//! assert_eq!(outcome.preserved, 1);
//! # Ok(())
//! # }
//! ```

pub mod arn;
pub mod document;
pub mod error;
pub mod merge;
pub mod statements;

pub use document::{AccessDocument, Statement, POLICY_VERSION};
pub use error::PolicyError;
pub use merge::{
    merge_statements, MergeOutcome, OwnedStatementSet, BUCKET_ACCESS_SID, OBJECT_ACCESS_SID,
};
pub use statements::{bucket_access_statements, permission_policy, trust_policy};
