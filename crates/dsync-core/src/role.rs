//! DataSync role provisioning
//!
//! A role that already exists is reused exactly as found: its trust and
//! permission documents are neither compared nor rewritten. Only a missing role
//! is created, followed by a propagation wait and the inline permission policy.

use crate::clients::{CreateRoleRequest, IdentityClient};
use crate::error::{IdentityError, SetupError};
use crate::notify::Notifier;
use crate::retry::RetryPolicy;
use crate::types::{Accounts, RunMode};
use dsync_policy::arn::role_arn;
use dsync_policy::{permission_policy, trust_policy};
use std::sync::Arc;
use std::time::Duration;

/// Wait after creating a role before attaching its policy
pub const DEFAULT_PROPAGATION_DELAY: Duration = Duration::from_secs(15);

/// Description set on roles created by dsync
pub const ROLE_DESCRIPTION: &str = "DataSync S3 migration role";

/// What the role step needs to know about the run
#[derive(Debug, Clone, Copy)]
pub struct RoleRequest<'a> {
    pub role_name: &'a str,
    /// Name of the inline permission policy
    pub policy_name: &'a str,
    pub region: &'a str,
    pub accounts: &'a Accounts,
    /// Every source bucket of the run
    pub source_buckets: &'a [String],
    /// Every destination bucket of the run
    pub destination_buckets: &'a [String],
}

/// Role the DataSync resources will use
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleDescriptor {
    pub role_name: String,
    pub role_arn: String,
    /// False when an existing role is reused
    pub newly_created: bool,
    /// Trust policy sent on creation; `None` for reused roles
    pub trust_policy: Option<String>,
    /// Permission policy sent on creation; `None` for reused roles
    pub permission_policy: Option<String>,
}

/// Ensures the DataSync role exists without touching an existing one
#[derive(Clone)]
pub struct RoleProvisioner {
    identity: Arc<dyn IdentityClient>,
    notifier: Arc<dyn Notifier>,
    retry: RetryPolicy,
    mode: RunMode,
    propagation_delay: Duration,
}

impl std::fmt::Debug for RoleProvisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoleProvisioner")
            .field("mode", &self.mode)
            .field("propagation_delay", &self.propagation_delay)
            .finish_non_exhaustive()
    }
}

impl RoleProvisioner {
    pub fn new(identity: Arc<dyn IdentityClient>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            identity,
            notifier,
            retry: RetryPolicy::default(),
            mode: RunMode::Live,
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

    /// Look up the role and create it only if missing
    ///
    /// # Errors
    /// `SetupError::Role` for any lookup error other than "no such entity", or
    /// if creating the role or attaching its policy fails
    pub async fn ensure(&self, request: &RoleRequest<'_>) -> Result<RoleDescriptor, SetupError> {
        let name = request.role_name;
        let fail = |source: IdentityError| SetupError::Role {
            role: name.to_string(),
            source,
        };

        let lookup = self
            .retry
            .run("get-role", self.notifier.as_ref(), || {
                self.identity.get_role(name)
            })
            .await;

        match lookup {
            Ok(existing) => {
                self.notifier
                    .success("IAM role exists - reusing without modification");
                return Ok(RoleDescriptor {
                    role_name: existing.role_name,
                    role_arn: existing.arn,
                    newly_created: false,
                    trust_policy: None,
                    permission_policy: None,
                });
            }
            Err(IdentityError::NoSuchEntity(_)) => {}
            Err(err) => return Err(fail(err)),
        }

        let trust = trust_policy(&request.accounts.source, request.region).to_string();
        let permissions = permission_policy(
            request.source_buckets,
            request.destination_buckets,
            &request.accounts.destination,
        )
        .to_string();

        if self.mode.is_dry_run() {
            self.notifier
                .info(&format!("[DRY RUN] Would create IAM role: {name}"));
            return Ok(RoleDescriptor {
                role_name: name.to_string(),
                role_arn: role_arn(&request.accounts.source, name),
                newly_created: true,
                trust_policy: Some(trust),
                permission_policy: Some(permissions),
            });
        }

        let create = CreateRoleRequest {
            role_name: name.to_string(),
            assume_role_policy: trust.clone(),
            description: ROLE_DESCRIPTION.to_string(),
        };
        let created = self
            .retry
            .run("create-role", self.notifier.as_ref(), || {
                self.identity.create_role(&create)
            })
            .await
            .map_err(fail)?;
        self.notifier.success(&format!("Created role {name}"));

        self.notifier.info(&format!(
            "Waiting {}s for IAM propagation...",
            self.propagation_delay.as_secs()
        ));
        tokio::time::sleep(self.propagation_delay).await;

        self.retry
            .run("put-role-policy", self.notifier.as_ref(), || {
                self.identity
                    .put_role_policy(name, request.policy_name, &permissions)
            })
            .await
            .map_err(fail)?;
        self.notifier
            .success(&format!("Attached policy {}", request.policy_name));

        Ok(RoleDescriptor {
            role_name: created.role_name,
            role_arn: created.arn,
            newly_created: true,
            trust_policy: Some(trust),
            permission_policy: Some(permissions),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{MockIdentityClient, RoleInfo};
    use crate::error::RemoteFault;
    use crate::notify::TracingNotifier;
    use mockall::predicate::eq;

    const ROLE: &str = "DataSyncMigrationRole";

    fn accounts() -> Accounts {
        Accounts::new("111111111111", "222222222222")
    }

    fn sources() -> Vec<String> {
        vec!["legacy-assets".to_string()]
    }

    fn destinations() -> Vec<String> {
        vec!["platform-assets".to_string()]
    }

    async fn ensure(identity: MockIdentityClient, mode: RunMode) -> Result<RoleDescriptor, SetupError> {
        let accounts = accounts();
        let (src, dst) = (sources(), destinations());
        let request = RoleRequest {
            role_name: ROLE,
            policy_name: "DataSyncMigrationPolicy",
            region: "us-east-1",
            accounts: &accounts,
            source_buckets: &src,
            destination_buckets: &dst,
        };
        RoleProvisioner::new(Arc::new(identity), Arc::new(TracingNotifier))
            .with_mode(mode)
            .ensure(&request)
            .await
    }

    fn missing() -> IdentityError {
        IdentityError::NoSuchEntity(RemoteFault::new("NoSuchEntity", "role not found"))
    }

    #[tokio::test]
    async fn existing_role_reused_without_mutation() {
        let mut identity = MockIdentityClient::new();
        identity.expect_get_role().with(eq(ROLE)).times(1).returning(|name| {
            Ok(RoleInfo {
                role_name: name.to_string(),
                arn: format!("arn:aws:iam::111111111111:role/{name}"),
            })
        });
        identity.expect_create_role().never();
        identity.expect_put_role_policy().never();

        let role = ensure(identity, RunMode::Live).await.unwrap();
        assert!(!role.newly_created);
        assert_eq!(role.role_arn, "arn:aws:iam::111111111111:role/DataSyncMigrationRole");
        assert_eq!(role.trust_policy, None);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_role_created_then_policy_attached() {
        let mut identity = MockIdentityClient::new();
        let mut seq = mockall::Sequence::new();
        identity
            .expect_get_role()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(missing()));
        identity
            .expect_create_role()
            .withf(|req| {
                req.role_name == ROLE
                    && req.assume_role_policy.contains("\"aws:SourceAccount\":\"111111111111\"")
                    && req.assume_role_policy.contains("arn:aws:datasync:us-east-1:111111111111:*")
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|req| {
                Ok(RoleInfo {
                    role_name: req.role_name.clone(),
                    arn: "arn:aws:iam::111111111111:role/DataSyncMigrationRole".to_string(),
                })
            });
        identity
            .expect_put_role_policy()
            .withf(|role, policy, doc| {
                role == ROLE
                    && policy == "DataSyncMigrationPolicy"
                    && doc.contains("arn:aws:s3:::legacy-assets")
                    && doc.contains("\"aws:ResourceAccount\":\"222222222222\"")
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));

        let started = tokio::time::Instant::now();
        let role = ensure(identity, RunMode::Live).await.unwrap();

        assert!(role.newly_created);
        assert!(started.elapsed() >= DEFAULT_PROPAGATION_DELAY);
        assert!(role.permission_policy.is_some());
    }

    #[tokio::test]
    async fn dry_run_creates_nothing() {
        let mut identity = MockIdentityClient::new();
        identity.expect_get_role().times(1).returning(|_| Err(missing()));
        identity.expect_create_role().never();
        identity.expect_put_role_policy().never();

        let role = ensure(identity, RunMode::DryRun).await.unwrap();
        assert!(role.newly_created);
        assert_eq!(role.role_arn, "arn:aws:iam::111111111111:role/DataSyncMigrationRole");
    }

    #[tokio::test]
    async fn lookup_failure_is_fatal() {
        let mut identity = MockIdentityClient::new();
        identity
            .expect_get_role()
            .times(1)
            .returning(|_| Err(IdentityError::from_code("AccessDenied", "not authorized")));
        identity.expect_create_role().never();

        let err = ensure(identity, RunMode::Live).await.unwrap_err();
        assert!(matches!(
            err,
            SetupError::Role { source: IdentityError::AccessDenied(_), .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn attach_failure_surfaces() {
        let mut identity = MockIdentityClient::new();
        identity.expect_get_role().returning(|_| Err(missing()));
        identity.expect_create_role().returning(|req| {
            Ok(RoleInfo {
                role_name: req.role_name.clone(),
                arn: "arn:role".to_string(),
            })
        });
        identity
            .expect_put_role_policy()
            .returning(|_, _, _| Err(IdentityError::from_code("MalformedPolicyDocument", "bad")));

        assert!(matches!(
            ensure(identity, RunMode::Live).await,
            Err(SetupError::Role { source: IdentityError::Service(_), .. })
        ));
    }
}
