//! [`ControlPlane`] over the Polaris GraphQL API
//!
//! Each method is one GraphQL operation. The top-level field of every
//! operation is aliased to `result` so all responses share one envelope.
//! Mutation messages are converted with [`Outcome::from_message`] and
//! nowhere else.

use crate::client::GraphqlClient;
use async_trait::async_trait;
use polaris_cloud::{
    CloudAccount, CloudError, ControlPlane, Feature, FeatureName, FeatureState, FeatureStatus,
    FeatureVersion, FinalizeRequest, InitiateRequest, Initiation, JobState, Outcome,
    PermissionGroupVersion, ProtectionJob, Region, StackDescriptor,
};
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

const LIST_ACCOUNTS: &str = r#"query PolarisListAwsAccounts($filter: String!, $features: [CloudAccountFeature!]!) {
  result: allAwsCloudAccountsWithFeatures(awsCloudAccountsArg: {columnSearchFilter: $filter, statusFilters: [], features: $features}) {
    awsCloudAccount { id nativeId accountName }
    featureDetails { feature roleArn stackArn status awsRegions permissionsGroups }
  }
}"#;

const VALIDATE_AND_INITIATE: &str = r#"mutation PolarisValidateAndInitiate($accountName: String!, $nativeId: String!, $featuresWithPG: [FeatureWithPermissionsGroups!]!) {
  result: validateAndCreateAwsCloudAccount(input: {action: CREATE, awsChildAccounts: [{accountName: $accountName, nativeId: $nativeId}], featuresWithPG: $featuresWithPG}) {
    initiateResponse {
      cloudFormationUrl externalId stackName templateUrl
      featureVersions { feature version permsGroupVersions { permsGroup version } }
    }
    validateResponse {
      invalidAwsAccounts { accountName nativeId message }
      invalidAwsAdminAccount { accountName nativeId message }
    }
  }
}"#;

const FINALIZE_PROTECTION: &str = r#"mutation PolarisFinalizeProtection($accountName: String!, $nativeId: String!, $awsRegions: [AwsCloudAccountRegion!]!, $externalId: String!, $featureVersion: [AwsCloudAccountFeatureVersionInput!]!, $featuresWithPG: [FeatureWithPermissionsGroups!]!, $stackName: String!) {
  result: finalizeAwsCloudAccountProtection(input: {action: CREATE, awsChildAccounts: [{accountName: $accountName, nativeId: $nativeId}], awsRegions: $awsRegions, externalId: $externalId, featureVersion: $featureVersion, featuresWithPG: $featuresWithPG, stackName: $stackName}) {
    message
  }
}"#;

const PREPARE_DELETION: &str = r#"mutation PolarisPrepareDeletion($cloudAccountId: UUID!, $feature: CloudAccountFeature!) {
  result: prepareAwsCloudAccountDeletion(input: {cloudAccountId: $cloudAccountId, feature: $feature}) {
    cloudFormationUrl
  }
}"#;

const FINALIZE_DELETION: &str = r#"mutation PolarisFinalizeDeletion($cloudAccountId: UUID!, $feature: CloudAccountFeature!) {
  result: finalizeAwsCloudAccountDeletion(input: {cloudAccountId: $cloudAccountId, feature: $feature}) {
    message
  }
}"#;

const UPDATE_REGIONS: &str = r#"mutation PolarisUpdateRegions($cloudAccountId: UUID!, $feature: CloudAccountFeature!, $awsRegions: [AwsCloudAccountRegion!]!) {
  result: updateAwsCloudAccountFeature(input: {action: UPDATE_REGIONS, cloudAccountId: $cloudAccountId, awsRegions: $awsRegions, feature: $feature}) {
    message
  }
}"#;

const START_DISABLE_JOB: &str = r#"mutation PolarisStartDisableJob($cloudAccountId: UUID!, $feature: AwsNativeProtectionFeature!, $deleteSnapshots: Boolean!) {
  result: startAwsNativeAccountDisableJob(input: {awsAccountRubrikId: $cloudAccountId, awsNativeProtectionFeature: $feature, shouldDeleteNativeSnapshots: $deleteSnapshots}) {
    jobId
    error
  }
}"#;

const JOB_STATUS: &str = r#"query PolarisJobStatus($jobId: UUID!) {
  result: getKorgTaskchainStatus(taskchainId: $jobId) {
    taskchain { state }
  }
}"#;

#[derive(Deserialize)]
struct Data<T> {
    result: T,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountWithFeatures {
    aws_cloud_account: AccountNode,
    #[serde(default)]
    feature_details: Vec<FeatureNode>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountNode {
    id: Uuid,
    native_id: String,
    account_name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeatureNode {
    feature: String,
    #[serde(default)]
    role_arn: String,
    #[serde(default)]
    stack_arn: String,
    status: String,
    #[serde(default)]
    aws_regions: Vec<String>,
    #[serde(default)]
    permissions_groups: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValidateAndInitiate {
    initiate_response: Option<InitiateNode>,
    validate_response: Option<ValidateNode>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitiateNode {
    cloud_formation_url: String,
    external_id: String,
    stack_name: String,
    template_url: String,
    #[serde(default)]
    feature_versions: Vec<FeatureVersionNode>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeatureVersionNode {
    feature: String,
    version: i64,
    #[serde(default)]
    perms_group_versions: Vec<PermsGroupVersionNode>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PermsGroupVersionNode {
    perms_group: String,
    version: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValidateNode {
    #[serde(default)]
    invalid_aws_accounts: Vec<InvalidAccountNode>,
    invalid_aws_admin_account: Option<InvalidAccountNode>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InvalidAccountNode {
    native_id: String,
    message: String,
}

#[derive(Deserialize)]
struct MessageNode {
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PrepareDeletionNode {
    #[serde(default)]
    cloud_formation_url: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DisableJobNode {
    job_id: Option<Uuid>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct TaskchainStatusNode {
    taskchain: TaskchainNode,
}

#[derive(Deserialize)]
struct TaskchainNode {
    state: String,
}

/// Control plane reached through GraphQL
#[derive(Debug, Clone)]
pub struct PolarisControlPlane {
    client: GraphqlClient,
}

impl PolarisControlPlane {
    pub fn new(client: GraphqlClient) -> Self {
        Self { client }
    }

    async fn request<T>(&self, operation: &'static str, query: &str, variables: Value) -> polaris_cloud::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let data: Data<T> = self.client.request(operation, query, variables).await?;
        Ok(data.result)
    }
}

fn features_with_groups(features: &[Feature]) -> Value {
    features
        .iter()
        .map(|f| {
            json!({
                "featureType": f.name.remote_name(),
                "permissionsGroups": f.permission_groups.iter().map(|g| g.remote_name()).collect::<Vec<_>>(),
            })
        })
        .collect()
}

fn remote_regions(regions: &[Region]) -> Vec<&'static str> {
    regions.iter().map(Region::remote_name).collect()
}

fn into_account(node: AccountWithFeatures) -> polaris_cloud::Result<CloudAccount> {
    let mut features = Vec::new();
    for detail in node.feature_details {
        // Features unknown to this SDK are skipped.
        let Some(feature) = Feature::from_remote(&detail.feature, detail.permissions_groups.as_slice()) else {
            tracing::debug!(feature = %detail.feature, "Skipping unknown feature");
            continue;
        };
        let status = FeatureStatus::from_remote(&detail.status).ok_or_else(|| {
            CloudError::Protocol(format!(
                "unknown status {} for feature {}",
                detail.status, detail.feature
            ))
        })?;
        let regions = detail
            .aws_regions
            .iter()
            .filter_map(|r| Region::from_remote(r))
            .collect();
        features.push(FeatureState {
            feature,
            regions,
            role_arn: detail.role_arn,
            stack_arn: detail.stack_arn,
            status,
        });
    }
    Ok(CloudAccount {
        id: node.aws_cloud_account.id,
        native_id: node.aws_cloud_account.native_id,
        name: node.aws_cloud_account.account_name,
        features,
    })
}

fn into_descriptor(node: InitiateNode) -> StackDescriptor {
    StackDescriptor {
        stack_name: node.stack_name,
        template_url: node.template_url,
        external_id: node.external_id,
        cloud_formation_url: node.cloud_formation_url,
        feature_versions: node
            .feature_versions
            .into_iter()
            .map(|v| FeatureVersion {
                feature: v.feature,
                version: v.version,
                permission_groups: v
                    .perms_group_versions
                    .into_iter()
                    .map(|pg| PermissionGroupVersion {
                        permission_group: pg.perms_group,
                        version: pg.version,
                    })
                    .collect(),
            })
            .collect(),
    }
}

fn feature_versions(descriptor: &StackDescriptor) -> Value {
    descriptor
        .feature_versions
        .iter()
        .map(|v| {
            json!({
                "feature": v.feature,
                "version": v.version,
                "permsGroupVersions": v.permission_groups.iter().map(|pg| json!({
                    "permsGroup": pg.permission_group,
                    "version": pg.version,
                })).collect::<Vec<_>>(),
            })
        })
        .collect()
}

#[async_trait]
impl ControlPlane for PolarisControlPlane {
    async fn list_accounts(&self, filter: &str) -> polaris_cloud::Result<Vec<CloudAccount>> {
        let features: Vec<&str> = FeatureName::ALL.iter().map(FeatureName::remote_name).collect();
        let nodes: Vec<AccountWithFeatures> = self
            .request(
                "PolarisListAwsAccounts",
                LIST_ACCOUNTS,
                json!({ "filter": filter, "features": features }),
            )
            .await?;
        nodes.into_iter().map(into_account).collect()
    }

    async fn validate_and_initiate(
        &self,
        request: &InitiateRequest,
    ) -> polaris_cloud::Result<Initiation> {
        let result: ValidateAndInitiate = self
            .request(
                "PolarisValidateAndInitiate",
                VALIDATE_AND_INITIATE,
                json!({
                    "accountName": request.name,
                    "nativeId": request.native_id,
                    "featuresWithPG": features_with_groups(&request.features),
                }),
            )
            .await?;

        if let Some(validation) = result.validate_response {
            let invalid = validation
                .invalid_aws_accounts
                .into_iter()
                .chain(validation.invalid_aws_admin_account)
                .next();
            if let Some(invalid) = invalid {
                return Ok(Initiation::Rejected {
                    native_id: invalid.native_id,
                    message: invalid.message,
                });
            }
        }
        let initiate = result.initiate_response.ok_or_else(|| {
            CloudError::Protocol("validateAndCreateAwsCloudAccount returned no stack".to_string())
        })?;
        Ok(Initiation::Initiated(into_descriptor(initiate)))
    }

    async fn finalize_protection(&self, request: &FinalizeRequest) -> polaris_cloud::Result<Outcome> {
        let result: MessageNode = self
            .request(
                "PolarisFinalizeProtection",
                FINALIZE_PROTECTION,
                json!({
                    "accountName": request.name,
                    "nativeId": request.native_id,
                    "awsRegions": remote_regions(&request.regions),
                    "externalId": request.stack.external_id,
                    "featureVersion": feature_versions(&request.stack),
                    "featuresWithPG": features_with_groups(&request.features),
                    "stackName": request.stack.stack_name,
                }),
            )
            .await?;
        Ok(Outcome::from_message(&result.message))
    }

    async fn prepare_feature_deletion(
        &self,
        account_id: Uuid,
        feature: &Feature,
    ) -> polaris_cloud::Result<Option<String>> {
        let result: PrepareDeletionNode = self
            .request(
                "PolarisPrepareDeletion",
                PREPARE_DELETION,
                json!({ "cloudAccountId": account_id, "feature": feature.name.remote_name() }),
            )
            .await?;
        Ok(result.cloud_formation_url.filter(|url| !url.is_empty()))
    }

    async fn finalize_feature_deletion(
        &self,
        account_id: Uuid,
        feature: &Feature,
    ) -> polaris_cloud::Result<Outcome> {
        let result: MessageNode = self
            .request(
                "PolarisFinalizeDeletion",
                FINALIZE_DELETION,
                json!({ "cloudAccountId": account_id, "feature": feature.name.remote_name() }),
            )
            .await?;
        Ok(Outcome::from_message(&result.message))
    }

    async fn update_feature_regions(
        &self,
        account_id: Uuid,
        feature: &Feature,
        regions: &[Region],
    ) -> polaris_cloud::Result<Outcome> {
        let result: MessageNode = self
            .request(
                "PolarisUpdateRegions",
                UPDATE_REGIONS,
                json!({
                    "cloudAccountId": account_id,
                    "feature": feature.name.remote_name(),
                    "awsRegions": remote_regions(regions),
                }),
            )
            .await?;
        Ok(Outcome::from_message(&result.message))
    }

    async fn start_disable_job(
        &self,
        account_id: Uuid,
        job: ProtectionJob,
        delete_snapshots: bool,
    ) -> polaris_cloud::Result<Uuid> {
        let result: DisableJobNode = self
            .request(
                "PolarisStartDisableJob",
                START_DISABLE_JOB,
                json!({
                    "cloudAccountId": account_id,
                    "feature": job.remote_name(),
                    "deleteSnapshots": delete_snapshots,
                }),
            )
            .await?;
        if let Some(error) = result.error.filter(|e| !e.is_empty()) {
            return Err(CloudError::ControlPlaneOperationFailed {
                operation: "startAwsNativeAccountDisableJob",
                message: error,
            });
        }
        result.job_id.ok_or_else(|| {
            CloudError::Protocol("startAwsNativeAccountDisableJob returned no job id".to_string())
        })
    }

    async fn job_state(&self, job_id: Uuid) -> polaris_cloud::Result<JobState> {
        let result: TaskchainStatusNode = self
            .request("PolarisJobStatus", JOB_STATUS, json!({ "jobId": job_id }))
            .await?;
        JobState::from_remote(&result.taskchain.state).ok_or_else(|| {
            CloudError::Protocol(format!(
                "unknown state {} for job {job_id}",
                result.taskchain.state
            ))
        })
    }
}
