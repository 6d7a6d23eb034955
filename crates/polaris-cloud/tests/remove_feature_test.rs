mod common;

use common::{NATIVE_ID, TestAccount};
use polaris_cloud::{
    CloudError, Feature, FeatureName, FeatureStatus, JobState, ProtectionJob, RemoveRequest,
    SagaStep, StackStatus,
};
use std::time::Duration;

fn features(names: &[FeatureName]) -> Vec<Feature> {
    names.iter().copied().map(Feature::from).collect()
}

/// Removing the only feature deletes the stack and the account
#[tokio::test(start_paused = true)]
async fn test_remove_last_feature_deletes_stack() {
    let account = TestAccount::with_deployed_stack();
    account.control_plane.seed_account(
        NATIVE_ID,
        "production",
        &[(FeatureName::CloudNativeProtection, FeatureStatus::Connected)],
    );
    let request = RemoveRequest::new(
        account.target(),
        features(&[FeatureName::CloudNativeProtection]),
    );

    let outcome = account.orchestrator().remove(&request).await.unwrap();

    assert!(outcome.stack_deleted);
    assert_eq!(outcome.removed, features(&[FeatureName::CloudNativeProtection]));
    let jobs = account.control_plane.started_jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].job, ProtectionJob::Ec2);
    assert_eq!(account.control_plane.job_polls(jobs[0].id), 2);
    assert!(account.stacks.calls().contains(&"delete"));
    assert!(!account.stacks.calls().contains(&"update"));
    assert_eq!(
        account.stacks.status(&account.stack_name()),
        Some(StackStatus::DeleteComplete)
    );

    let err = account
        .orchestrator()
        .account(&account.identity)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

/// A feature left on the stack keeps the stack; it is updated instead
#[tokio::test(start_paused = true)]
async fn test_remove_with_remaining_feature_updates_stack() {
    let account = TestAccount::with_deployed_stack();
    account.control_plane.seed_account(
        NATIVE_ID,
        "production",
        &[
            (FeatureName::CloudNativeProtection, FeatureStatus::Connected),
            (FeatureName::Exocompute, FeatureStatus::Connected),
        ],
    );
    let request = RemoveRequest::new(
        account.target(),
        features(&[FeatureName::CloudNativeProtection]),
    );

    let outcome = account.orchestrator().remove(&request).await.unwrap();

    assert!(!outcome.stack_deleted);
    assert!(account.stacks.calls().contains(&"update"));
    assert!(!account.stacks.calls().contains(&"delete"));
    assert_eq!(
        account.stacks.status(&account.stack_name()),
        Some(StackStatus::UpdateComplete)
    );

    let spec = account.stacks.specs().pop().unwrap();
    assert_eq!(spec.template_url, polaris_cloud::testing::TEMPLATE_URL);
    assert_eq!(
        spec.parameters,
        vec![("ExternalId".to_string(), "polaris-external-id".to_string())]
    );

    let remote = account.control_plane.account(NATIVE_ID).unwrap();
    assert!(remote.has_feature(&FeatureName::Exocompute.into()));
    assert!(!remote.has_feature(&FeatureName::CloudNativeProtection.into()));
}

#[tokio::test(start_paused = true)]
async fn test_discovery_is_removed_last() {
    let account = TestAccount::with_deployed_stack();
    account.control_plane.seed_account(
        NATIVE_ID,
        "production",
        &[
            (FeatureName::CloudDiscovery, FeatureStatus::Connected),
            (FeatureName::CloudNativeProtection, FeatureStatus::Connected),
            (FeatureName::Exocompute, FeatureStatus::Connected),
        ],
    );
    let request = RemoveRequest::new(
        account.target(),
        features(&[
            FeatureName::CloudDiscovery,
            FeatureName::CloudNativeProtection,
            FeatureName::Exocompute,
        ]),
    );

    let outcome = account.orchestrator().remove(&request).await.unwrap();

    let finalized: Vec<String> = account
        .control_plane
        .calls()
        .into_iter()
        .filter(|c| c.starts_with("finalizeFeatureDeletion"))
        .collect();
    assert_eq!(
        finalized,
        vec![
            "finalizeFeatureDeletion:CLOUD_NATIVE_PROTECTION",
            "finalizeFeatureDeletion:EXOCOMPUTE",
            "finalizeFeatureDeletion:CLOUD_DISCOVERY",
        ]
    );
    assert_eq!(
        outcome.removed.last().map(|f| f.name),
        Some(FeatureName::CloudDiscovery)
    );
    assert!(outcome.stack_deleted);
}

/// A missing feature fails the request before anything is removed
#[tokio::test(start_paused = true)]
async fn test_remove_missing_feature() {
    let account = TestAccount::with_deployed_stack();
    account.control_plane.seed_account(
        NATIVE_ID,
        "production",
        &[(FeatureName::CloudNativeProtection, FeatureStatus::Connected)],
    );
    let request = RemoveRequest::new(
        account.target(),
        features(&[FeatureName::CloudNativeProtection, FeatureName::Exocompute]),
    );

    let err = account.orchestrator().remove(&request).await.unwrap_err();
    assert!(matches!(err, CloudError::NotFound(_)));
    assert!(account.control_plane.started_jobs().is_empty());
    assert_eq!(account.control_plane.count("prepareFeatureDeletion"), 0);
    assert!(account.stacks.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_remove_from_unknown_account() {
    let account = TestAccount::new();
    let request = RemoveRequest::new(
        account.target(),
        features(&[FeatureName::CloudNativeProtection]),
    );
    let err = account.orchestrator().remove(&request).await.unwrap_err();
    assert!(err.is_not_found());
}

/// Features before the failing one stay removed; a re-run finishes the job
#[tokio::test(start_paused = true)]
async fn test_partial_failure_names_feature_and_step() {
    let account = TestAccount::with_deployed_stack();
    account.control_plane.seed_account(
        NATIVE_ID,
        "production",
        &[
            (FeatureName::Exocompute, FeatureStatus::Connected),
            (FeatureName::CloudNativeProtection, FeatureStatus::Connected),
        ],
    );
    account
        .control_plane
        .script_disable_job(ProtectionJob::Ec2, [JobState::Running, JobState::Failed]);
    let request = RemoveRequest::new(
        account.target(),
        features(&[FeatureName::Exocompute, FeatureName::CloudNativeProtection]),
    );

    let err = account.orchestrator().remove(&request).await.unwrap_err();
    match &err {
        CloudError::FeatureStep {
            features: failed,
            step,
            ..
        } => {
            assert_eq!(*failed, features(&[FeatureName::CloudNativeProtection]));
            assert_eq!(*step, SagaStep::DisableJob);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(matches!(
        err.root(),
        CloudError::AsyncJobFailed {
            state: JobState::Failed,
            ..
        }
    ));

    let remote = account.control_plane.account(NATIVE_ID).unwrap();
    assert!(!remote.has_feature(&FeatureName::Exocompute.into()));
    assert!(remote.has_feature(&FeatureName::CloudNativeProtection.into()));

    account
        .control_plane
        .script_disable_job(ProtectionJob::Ec2, [JobState::Succeeded]);
    let retry = RemoveRequest::new(
        account.target(),
        features(&[FeatureName::CloudNativeProtection]),
    );
    let outcome = account.orchestrator().remove(&retry).await.unwrap();
    assert!(outcome.stack_deleted);
    assert!(account.control_plane.account(NATIVE_ID).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_finalize_deletion_failure() {
    let account = TestAccount::with_deployed_stack();
    account.control_plane.seed_account(
        NATIVE_ID,
        "production",
        &[
            (FeatureName::CloudNativeProtection, FeatureStatus::Connected),
            (FeatureName::Exocompute, FeatureStatus::Connected),
        ],
    );
    account.control_plane.fail(
        "finalizeFeatureDeletion",
        Some(FeatureName::Exocompute),
        "Exocompute clusters are still running",
    );
    let request = RemoveRequest::new(account.target(), features(&[FeatureName::Exocompute]));

    let err = account.orchestrator().remove(&request).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "Failed to finalize deletion of feature EXOCOMPUTE: Control plane operation \
         finalizeFeatureDeletion failed: Exocompute clusters are still running"
    );
}

#[tokio::test(start_paused = true)]
async fn test_cancel_while_waiting_for_disable_job() {
    let account = TestAccount::with_deployed_stack();
    account.control_plane.seed_account(
        NATIVE_ID,
        "production",
        &[(FeatureName::CloudNativeProtection, FeatureStatus::Connected)],
    );
    account
        .control_plane
        .script_disable_job(ProtectionJob::Ec2, [JobState::Running]);
    let token = account.ctx.cancellation_token().clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(25)).await;
        token.cancel();
    });
    let request = RemoveRequest::new(
        account.target(),
        features(&[FeatureName::CloudNativeProtection]),
    );

    let err = account.orchestrator().remove(&request).await.unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(account.control_plane.count("prepareFeatureDeletion"), 0);
    assert!(account.control_plane.account(NATIVE_ID).is_some());
}

#[tokio::test(start_paused = true)]
async fn test_deadline_while_waiting_for_disable_job() {
    let mut account = TestAccount::with_deployed_stack();
    account.ctx = account.ctx.clone().with_timeout(Duration::from_secs(60));
    account.control_plane.seed_account(
        NATIVE_ID,
        "production",
        &[(FeatureName::RdsProtection, FeatureStatus::Connected)],
    );
    account
        .control_plane
        .script_disable_job(ProtectionJob::Rds, [JobState::Running]);
    let request = RemoveRequest::new(account.target(), features(&[FeatureName::RdsProtection]));

    let err = account.orchestrator().remove(&request).await.unwrap_err();
    assert!(matches!(err, CloudError::DeadlineExceeded));
}

/// Each mutation is followed by a read of the account
#[tokio::test(start_paused = true)]
async fn test_remove_reads_back_after_each_mutation() {
    let account = TestAccount::with_deployed_stack();
    account.control_plane.seed_account(
        NATIVE_ID,
        "production",
        &[
            (FeatureName::CloudNativeProtection, FeatureStatus::Connected),
            (FeatureName::Exocompute, FeatureStatus::Connected),
        ],
    );
    let request = RemoveRequest::new(
        account.target(),
        features(&[FeatureName::CloudNativeProtection]),
    );

    account.orchestrator().remove(&request).await.unwrap();
    assert_eq!(
        account.control_plane.calls(),
        vec![
            "listAccounts",
            "listAccounts",
            "startDisableJob:EC2",
            "listAccounts",
            "prepareFeatureDeletion:CLOUD_NATIVE_PROTECTION",
            "listAccounts",
            "finalizeFeatureDeletion:CLOUD_NATIVE_PROTECTION",
            "listAccounts",
        ]
    );
}

/// Deletion is not prepared while the feature still reads back as connected
#[tokio::test(start_paused = true)]
async fn test_feature_still_connected_after_disable_job() {
    let account = TestAccount::with_deployed_stack();
    account.control_plane.seed_account(
        NATIVE_ID,
        "production",
        &[(FeatureName::CloudNativeProtection, FeatureStatus::Connected)],
    );
    account.control_plane.ignore_disable_jobs();
    let request = RemoveRequest::new(
        account.target(),
        features(&[FeatureName::CloudNativeProtection]),
    );

    let err = account.orchestrator().remove(&request).await.unwrap_err();
    assert!(matches!(
        err,
        CloudError::FeatureStep {
            step: SagaStep::DisableJob,
            ..
        }
    ));
    assert!(matches!(err.root(), CloudError::Protocol(_)));
    assert_eq!(account.control_plane.count("prepareFeatureDeletion"), 0);
    assert!(account.stacks.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_features_are_removed_once() {
    let account = TestAccount::with_deployed_stack();
    account.control_plane.seed_account(
        NATIVE_ID,
        "production",
        &[
            (FeatureName::CloudNativeProtection, FeatureStatus::Connected),
            (FeatureName::Exocompute, FeatureStatus::Connected),
        ],
    );
    let request = RemoveRequest::new(
        account.target(),
        features(&[FeatureName::Exocompute, FeatureName::Exocompute]),
    );

    let outcome = account.orchestrator().remove(&request).await.unwrap();
    assert_eq!(outcome.removed, features(&[FeatureName::Exocompute]));
    assert_eq!(account.control_plane.count("finalizeFeatureDeletion"), 1);
}
