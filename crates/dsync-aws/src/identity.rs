//! IAM and STS clients

use crate::fault::{identity_error, Fault};
use async_trait::async_trait;
use aws_config::SdkConfig;
use dsync_core::error::IdentityError;
use dsync_core::{AccountResolver, CreateRoleRequest, IdentityClient, RoleInfo};

/// IAM in the source account
#[derive(Debug, Clone)]
pub struct IamIdentity {
    client: aws_sdk_iam::Client,
}

impl IamIdentity {
    pub fn new(config: &SdkConfig) -> Self {
        Self::from_client(aws_sdk_iam::Client::new(config))
    }

    /// Create from a pre-built client
    pub fn from_client(client: aws_sdk_iam::Client) -> Self {
        Self { client }
    }
}

fn role_info(role: Option<&aws_sdk_iam::types::Role>) -> Result<RoleInfo, IdentityError> {
    let role = role.ok_or_else(|| IdentityError::MalformedResponse("missing Role".to_string()))?;
    Ok(RoleInfo {
        role_name: role.role_name().to_string(),
        arn: role.arn().to_string(),
    })
}

#[async_trait]
impl IdentityClient for IamIdentity {
    async fn get_role(&self, role_name: &str) -> Result<RoleInfo, IdentityError> {
        tracing::debug!(role_name, "iam:GetRole");
        let output = self
            .client
            .get_role()
            .role_name(role_name)
            .send()
            .await
            .map_err(|e| identity_error(Fault::from_sdk(&e)))?;
        role_info(output.role())
    }

    async fn create_role(&self, request: &CreateRoleRequest) -> Result<RoleInfo, IdentityError> {
        tracing::debug!(role_name = %request.role_name, "iam:CreateRole");
        let output = self
            .client
            .create_role()
            .role_name(&request.role_name)
            .assume_role_policy_document(&request.assume_role_policy)
            .description(&request.description)
            .send()
            .await
            .map_err(|e| identity_error(Fault::from_sdk(&e)))?;
        role_info(output.role())
    }

    async fn put_role_policy(
        &self,
        role_name: &str,
        policy_name: &str,
        policy_document: &str,
    ) -> Result<(), IdentityError> {
        tracing::debug!(role_name, policy_name, "iam:PutRolePolicy");
        self.client
            .put_role_policy()
            .role_name(role_name)
            .policy_name(policy_name)
            .policy_document(policy_document)
            .send()
            .await
            .map_err(|e| identity_error(Fault::from_sdk(&e)))?;
        Ok(())
    }
}

/// STS caller identity of one profile
#[derive(Debug, Clone)]
pub struct StsAccounts {
    client: aws_sdk_sts::Client,
}

impl StsAccounts {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: aws_sdk_sts::Client::new(config),
        }
    }
}

#[async_trait]
impl AccountResolver for StsAccounts {
    async fn caller_account(&self) -> Result<String, IdentityError> {
        let output = self
            .client
            .get_caller_identity()
            .send()
            .await
            .map_err(|e| identity_error(Fault::from_sdk(&e)))?;
        output
            .account()
            .map(str::to_string)
            .ok_or_else(|| IdentityError::MalformedResponse("missing Account".to_string()))
    }
}
