//! Profile identity resolution through STS

use crate::error::{AwsError, Result};
use async_trait::async_trait;
use aws_sdk_sts::error::{DisplayErrorContext, ProvideErrorMetadata};
use polaris_cloud::IdentityResolver;

/// Resolves a named profile to its account with `GetCallerIdentity`.
#[derive(Debug, Clone, Default)]
pub struct StsIdentityResolver {
    region: Option<String>,
}

impl StsIdentityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Region for the STS endpoint, when the profile does not set one.
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub async fn account_for_profile(&self, profile: &str) -> Result<String> {
        let config = crate::load_config(Some(profile), self.region.as_deref()).await;
        let output = aws_sdk_sts::Client::new(&config)
            .get_caller_identity()
            .send()
            .await
            .map_err(|err| AwsError::Sdk {
                service: "STS",
                operation: "GetCallerIdentity",
                message: err
                    .message()
                    .map(str::to_string)
                    .unwrap_or_else(|| DisplayErrorContext(&err).to_string()),
            })?;
        let account = output.account().ok_or(AwsError::MissingField {
            operation: "GetCallerIdentity",
            field: "Account",
        })?;
        tracing::debug!(%profile, %account, "Resolved profile");
        Ok(account.to_string())
    }
}

#[async_trait]
impl IdentityResolver for StsIdentityResolver {
    async fn native_id_for_profile(&self, profile: &str) -> polaris_cloud::Result<String> {
        Ok(self.account_for_profile(profile).await?)
    }
}
