//! Control plane collaborator
//!
//! The orchestrator talks to the control plane only through the
//! [`ControlPlane`] trait. Implementations translate these calls to the
//! remote API (see the `polaris-graphql` crate) and convert the prose
//! success messages of mutations into an [`Outcome`].

use crate::account::CloudAccount;
use crate::error::{CloudError, Result};
use crate::feature::{Feature, ProtectionJob};
use crate::job::JobState;
use crate::region::Region;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Control plane operations used by the feature lifecycle saga
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// List accounts together with their catalog features. `filter` is a
    /// substring matched against account names and native IDs; an empty
    /// filter lists every account.
    async fn list_accounts(&self, filter: &str) -> Result<Vec<CloudAccount>>;

    /// Validate that the features can be added to the account and obtain the
    /// stack the customer must deploy.
    async fn validate_and_initiate(&self, request: &InitiateRequest) -> Result<Initiation>;

    /// Register the features as protected in the given regions.
    async fn finalize_protection(&self, request: &FinalizeRequest) -> Result<Outcome>;

    /// Prepare removal of a feature. Returns a stack URL when the customer
    /// stack must be updated or deleted as part of the removal.
    async fn prepare_feature_deletion(
        &self,
        account_id: Uuid,
        feature: &Feature,
    ) -> Result<Option<String>>;

    /// Remove the feature from the account.
    async fn finalize_feature_deletion(&self, account_id: Uuid, feature: &Feature)
    -> Result<Outcome>;

    /// Replace the regions a feature is enabled in.
    async fn update_feature_regions(
        &self,
        account_id: Uuid,
        feature: &Feature,
        regions: &[Region],
    ) -> Result<Outcome>;

    /// Start the data-plane disable job of a protection feature.
    async fn start_disable_job(
        &self,
        account_id: Uuid,
        job: ProtectionJob,
        delete_snapshots: bool,
    ) -> Result<Uuid>;

    /// Current state of an async job.
    async fn job_state(&self, job_id: Uuid) -> Result<JobState>;

    /// Account with exactly this native ID, if registered.
    async fn account_by_native_id(&self, native_id: &str) -> Result<Option<CloudAccount>> {
        let accounts = self.list_accounts(native_id).await?;
        Ok(accounts.into_iter().find(|a| a.native_id == native_id))
    }

    /// Account with this platform ID, if registered.
    async fn account_by_id(&self, id: Uuid) -> Result<Option<CloudAccount>> {
        let accounts = self.list_accounts("").await?;
        Ok(accounts.into_iter().find(|a| a.id == id))
    }
}

/// Request to validate and initiate features on an account
#[derive(Debug, Clone, Serialize)]
pub struct InitiateRequest {
    pub native_id: String,
    pub name: String,
    pub features: Vec<Feature>,
}

/// Result of `validate_and_initiate`
#[derive(Debug, Clone, PartialEq)]
pub enum Initiation {
    /// The account may be onboarded using this stack.
    Initiated(StackDescriptor),
    /// The control plane refused the account, e.g. because it is already
    /// onboarded elsewhere.
    Rejected { native_id: String, message: String },
}

/// Request to finalize protection of an initiated account
#[derive(Debug, Clone, Serialize)]
pub struct FinalizeRequest {
    pub native_id: String,
    pub name: String,
    pub features: Vec<Feature>,
    pub regions: Vec<Region>,
    pub stack: StackDescriptor,
}

/// Stack the customer deploys to grant the control plane its permissions.
/// Obtained when initiating features and consumed by one reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackDescriptor {
    pub stack_name: String,
    pub template_url: String,
    pub external_id: String,

    /// Console quick-create URL, for operators applying the stack by hand
    #[serde(default)]
    pub cloud_formation_url: String,

    #[serde(default)]
    pub feature_versions: Vec<FeatureVersion>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureVersion {
    pub feature: String,
    pub version: i64,
    #[serde(default)]
    pub permission_groups: Vec<PermissionGroupVersion>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionGroupVersion {
    pub permission_group: String,
    pub version: i64,
}

/// Outcome of a mutation whose only success signal is a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub ok: bool,
    pub detail: String,
}

impl Outcome {
    pub fn success(detail: impl Into<String>) -> Self {
        Self {
            ok: true,
            detail: detail.into(),
        }
    }

    pub fn failure(detail: impl Into<String>) -> Self {
        Self {
            ok: false,
            detail: detail.into(),
        }
    }

    /// Interpret a mutation message. The remote API reports success with a
    /// message starting with "successfully" (any case); any other message is
    /// an error description.
    pub fn from_message(message: &str) -> Self {
        let ok = message
            .trim_start()
            .get(..SUCCESS_PREFIX.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(SUCCESS_PREFIX));
        Self {
            ok,
            detail: message.to_string(),
        }
    }

    /// Convert into a result, keeping the remote message on failure.
    pub fn into_result(self, operation: &'static str) -> Result<()> {
        if self.ok {
            Ok(())
        } else {
            Err(CloudError::ControlPlaneOperationFailed {
                operation,
                message: self.detail,
            })
        }
    }
}

const SUCCESS_PREFIX: &str = "successfully";
