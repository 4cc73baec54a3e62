//! AWS SDK implementations of the dsync client traits
//!
//! - [`IamIdentity`]: role lookup, creation and inline policies
//! - [`S3Storage`]: bucket probes and bucket policies
//! - [`DataSyncTransfer`]: S3 locations and tasks
//! - [`StsAccounts`]: caller account of a profile
//!
//! SDK-level retries are disabled; rate limiting is handled by
//! `dsync_core::RetryPolicy` so attempt counts stay exact.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod fault;
pub mod identity;
pub mod storage;
pub mod transfer;

pub use identity::{IamIdentity, StsAccounts};
pub use storage::S3Storage;
pub use transfer::DataSyncTransfer;

use aws_config::retry::RetryConfig;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use dsync_core::{Clients, MigrationConfig};
use std::sync::Arc;

/// Load SDK configuration for a named profile
pub async fn load_profile(profile: &str, region: &str) -> SdkConfig {
    aws_config::defaults(BehaviorVersion::latest())
        .profile_name(profile)
        .region(Region::new(region.to_string()))
        .retry_config(RetryConfig::disabled())
        .load()
        .await
}

/// Build every client of a run from the configured profiles
///
/// IAM, DataSync and the source buckets use the source profile; the
/// destination buckets use the target profile.
pub async fn connect(config: &MigrationConfig) -> Clients {
    let source = load_profile(&config.profiles.source, &config.aws_region).await;
    let target = load_profile(&config.profiles.target, &config.aws_region).await;
    tracing::debug!(
        source = %config.profiles.source,
        target = %config.profiles.target,
        region = %config.aws_region,
        "loaded AWS profiles"
    );

    Clients {
        source_account: Arc::new(StsAccounts::new(&source)),
        destination_account: Arc::new(StsAccounts::new(&target)),
        identity: Arc::new(IamIdentity::new(&source)),
        source_storage: Arc::new(S3Storage::new(&source)),
        destination_storage: Arc::new(S3Storage::new(&target)),
        transfer: Arc::new(DataSyncTransfer::new(&source)),
    }
}
