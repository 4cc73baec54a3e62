//! dsync core - cross-account S3 migration setup engine
//!
//! Prepares everything a DataSync migration needs without starting it:
//! - Verifies every bucket is reachable before touching it
//! - Backs up both bucket policies with a one-step restore script
//! - Reuses the DataSync role if it exists, creates it otherwise
//! - Merges the owned access statements into bucket policies, keeping all others
//! - Creates locations and the task as a unit, rolling back on failure
//!
//! Remote services are reached only through the traits in [`clients`].
//!
//! # Example
//!
//! ```rust,ignore
//! use dsync_core::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example(clients: Clients) -> Result<(), Box<dyn std::error::Error>> {
//! let config = MigrationConfig::load("migrations.yaml")?;
//! let report = MigrationOrchestrator::new(config, clients, Arc::new(TracingNotifier))
//!     .with_mode(RunMode::DryRun)
//!     .run()
//!     .await?;
//!
//! println!("{} of {} migration(s) configured", report.results.len(), report.total);
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod clients;
pub mod config;
pub mod error;
pub mod notify;
pub mod options;
pub mod orchestrator;
pub mod policy;
pub mod restore;
pub mod retry;
pub mod role;
pub mod snapshot;
pub mod transaction;
pub mod types;
pub mod verify;

pub use clients::{
    fetch_bucket_policy, AccountResolver, Clients, CreateRoleRequest, IdentityClient,
    LocationRequest, RoleInfo, StorageClient, TaskRequest, TransferClient,
};
pub use config::{MigrationConfig, MigrationSpec, Profiles};
pub use error::{
    ConfigError, IdentityError, MigrationError, RemoteFault, Retryable, SetupError, StorageError,
    TransferError,
};
pub use notify::{Level, Notifier, TracingNotifier};
pub use options::{TaskOptions, TaskOverrides};
pub use orchestrator::{MigrationFailure, MigrationOrchestrator, MigrationResult, RunReport};
pub use policy::{plan_merge, PolicyMergeEngine};
pub use retry::RetryPolicy;
pub use role::{RoleDescriptor, RoleProvisioner, RoleRequest};
pub use snapshot::{BackupRecord, CapturedPolicy, SnapshotError, SnapshotRecorder};
pub use transaction::{
    BuildError, BuildStep, CreatedResource, ProvisioningTransaction, ResourceKind, RollbackEntry,
    RollbackOutcome, RollbackReport, TransactionalBuilder,
};
pub use types::{Accounts, RunMode};
pub use verify::{AccessVerifier, BucketAccess};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for wiring a run
    pub use crate::{
        Clients, MigrationConfig, MigrationOrchestrator, MigrationSpec, Notifier, RetryPolicy,
        RunMode, RunReport, TracingNotifier,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
