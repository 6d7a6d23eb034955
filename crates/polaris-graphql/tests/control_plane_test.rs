use httpmock::prelude::*;
use polaris_cloud::{
    CloudError, ControlPlane, Feature, FeatureName, FeatureStatus, InitiateRequest, Initiation,
    JobState, ProtectionJob, Region,
};
use polaris_graphql::{GraphqlClient, GraphqlError, PolarisControlPlane};
use serde_json::json;
use uuid::Uuid;

const TOKEN: &str = "test-access-token";
const ACCOUNT_ID: &str = "3f6c3c1e-8f55-4a2b-9c58-0e6f5b7a1d20";

fn control_plane(server: &MockServer) -> PolarisControlPlane {
    PolarisControlPlane::new(GraphqlClient::new(server.url("/api/graphql"), TOKEN))
}

fn operation(name: &str) -> String {
    format!("\"operationName\":\"{name}\"")
}

fn account_id() -> Uuid {
    ACCOUNT_ID.parse().unwrap()
}

#[tokio::test]
async fn test_list_accounts() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/api/graphql")
            .header("authorization", format!("Bearer {TOKEN}"))
            .body_includes(operation("PolarisListAwsAccounts"))
            .body_includes("\"filter\":\"123456789012\"");
        then.status(200).json_body(json!({
            "data": {
                "result": [{
                    "awsCloudAccount": {
                        "id": ACCOUNT_ID,
                        "nativeId": "123456789012",
                        "accountName": "production",
                    },
                    "featureDetails": [{
                        "feature": "CLOUD_NATIVE_PROTECTION",
                        "roleArn": "arn:aws:iam::123456789012:role/polaris",
                        "stackArn": "arn:aws:cloudformation:us-east-2:123456789012:stack/polaris-123456789012/1",
                        "status": "CONNECTED",
                        "awsRegions": ["US_EAST_2", "EU_WEST_1"],
                        "permissionsGroups": [],
                    }],
                }],
            },
        }));
    });

    let accounts = control_plane(&server)
        .list_accounts("123456789012")
        .await
        .unwrap();

    mock.assert();
    assert_eq!(accounts.len(), 1);
    let account = &accounts[0];
    assert_eq!(account.id, account_id());
    assert_eq!(account.native_id, "123456789012");
    let state = account
        .feature(&FeatureName::CloudNativeProtection.into())
        .unwrap();
    assert_eq!(state.status, FeatureStatus::Connected);
    assert!(state.regions.contains(&Region::EuWest1));
    assert_eq!(state.stack_name(), Some("polaris-123456789012"));
}

#[tokio::test]
async fn test_account_by_native_id_ignores_partial_matches() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST)
            .path("/api/graphql")
            .body_includes(operation("PolarisListAwsAccounts"));
        then.status(200).json_body(json!({
            "data": {
                "result": [{
                    "awsCloudAccount": {
                        "id": ACCOUNT_ID,
                        "nativeId": "9123456789012",
                        "accountName": "other",
                    },
                    "featureDetails": [],
                }],
            },
        }));
    });

    let account = control_plane(&server)
        .account_by_native_id("123456789012")
        .await
        .unwrap();
    assert!(account.is_none());
}

#[tokio::test]
async fn test_validation_rejected() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST)
            .path("/api/graphql")
            .body_includes(operation("PolarisValidateAndInitiate"))
            .body_includes("\"featureType\":\"CLOUD_NATIVE_PROTECTION\"");
        then.status(200).json_body(json!({
            "data": {
                "result": {
                    "initiateResponse": null,
                    "validateResponse": {
                        "invalidAwsAccounts": [{
                            "accountName": "production",
                            "nativeId": "123456789012",
                            "message": "Account is already onboarded",
                        }],
                        "invalidAwsAdminAccount": null,
                    },
                },
            },
        }));
    });

    let request = InitiateRequest {
        native_id: "123456789012".to_string(),
        name: "production".to_string(),
        features: vec![Feature::new(FeatureName::CloudNativeProtection)],
    };
    let initiation = control_plane(&server)
        .validate_and_initiate(&request)
        .await
        .unwrap();
    assert_eq!(
        initiation,
        Initiation::Rejected {
            native_id: "123456789012".to_string(),
            message: "Account is already onboarded".to_string(),
        }
    );
}

#[tokio::test]
async fn test_initiate_returns_stack_descriptor() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST)
            .path("/api/graphql")
            .body_includes(operation("PolarisValidateAndInitiate"));
        then.status(200).json_body(json!({
            "data": {
                "result": {
                    "initiateResponse": {
                        "cloudFormationUrl": "https://console.aws.amazon.com/cloudformation/home#/stacks/quickcreate",
                        "externalId": "ext-1",
                        "stackName": "polaris-123456789012",
                        "templateUrl": "https://templates.example.com/aws.json",
                        "featureVersions": [{
                            "feature": "CLOUD_NATIVE_PROTECTION",
                            "version": 7,
                            "permsGroupVersions": [],
                        }],
                    },
                    "validateResponse": {
                        "invalidAwsAccounts": [],
                        "invalidAwsAdminAccount": null,
                    },
                },
            },
        }));
    });

    let request = InitiateRequest {
        native_id: "123456789012".to_string(),
        name: "production".to_string(),
        features: vec![Feature::new(FeatureName::CloudNativeProtection)],
    };
    let initiation = control_plane(&server)
        .validate_and_initiate(&request)
        .await
        .unwrap();
    let Initiation::Initiated(stack) = initiation else {
        panic!("expected an initiated stack");
    };
    assert_eq!(stack.stack_name, "polaris-123456789012");
    assert_eq!(stack.external_id, "ext-1");
    assert_eq!(stack.feature_versions[0].version, 7);
}

#[tokio::test]
async fn test_finalize_deletion_message() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST)
            .path("/api/graphql")
            .body_includes(operation("PolarisFinalizeDeletion"))
            .body_includes("\"feature\":\"EXOCOMPUTE\"");
        then.status(200).json_body(json!({
            "data": { "result": { "message": "Exocompute clusters are still running" } },
        }));
    });

    let outcome = control_plane(&server)
        .finalize_feature_deletion(account_id(), &FeatureName::Exocompute.into())
        .await
        .unwrap();
    assert!(!outcome.ok);
    assert_eq!(outcome.detail, "Exocompute clusters are still running");
}

#[tokio::test]
async fn test_update_regions_success() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/api/graphql")
            .body_includes(operation("PolarisUpdateRegions"))
            .body_includes("\"awsRegions\":[\"US_EAST_1\",\"US_WEST_2\"]");
        then.status(200).json_body(json!({
            "data": { "result": { "message": "Successfully updated regions" } },
        }));
    });

    let outcome = control_plane(&server)
        .update_feature_regions(
            account_id(),
            &FeatureName::CloudNativeProtection.into(),
            &[Region::UsEast1, Region::UsWest2],
        )
        .await
        .unwrap();
    mock.assert();
    assert!(outcome.ok);
}

#[tokio::test]
async fn test_prepare_deletion_without_url() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST)
            .path("/api/graphql")
            .body_includes(operation("PolarisPrepareDeletion"));
        then.status(200).json_body(json!({
            "data": { "result": { "cloudFormationUrl": "" } },
        }));
    });

    let url = control_plane(&server)
        .prepare_feature_deletion(account_id(), &FeatureName::Exocompute.into())
        .await
        .unwrap();
    assert!(url.is_none());
}

#[tokio::test]
async fn test_disable_job_error() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST)
            .path("/api/graphql")
            .body_includes(operation("PolarisStartDisableJob"))
            .body_includes("\"deleteSnapshots\":true");
        then.status(200).json_body(json!({
            "data": { "result": { "jobId": null, "error": "Account is being refreshed" } },
        }));
    });

    let err = control_plane(&server)
        .start_disable_job(account_id(), ProtectionJob::Ec2, true)
        .await
        .unwrap_err();
    match err {
        CloudError::ControlPlaneOperationFailed { message, .. } => {
            assert_eq!(message, "Account is being refreshed");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_job_state() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST)
            .path("/api/graphql")
            .body_includes(operation("PolarisJobStatus"));
        then.status(200).json_body(json!({
            "data": { "result": { "taskchain": { "state": "SUCCEEDED" } } },
        }));
    });

    let state = control_plane(&server)
        .job_state(Uuid::new_v4())
        .await
        .unwrap();
    assert_eq!(state, JobState::Succeeded);
}

#[tokio::test]
async fn test_graphql_errors_are_transport_errors() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/api/graphql");
        then.status(200).json_body(json!({
            "data": null,
            "errors": [{ "message": "Not authorized to perform this operation" }],
        }));
    });

    let err = control_plane(&server).job_state(Uuid::new_v4()).await.unwrap_err();
    let CloudError::Transport(source) = err else {
        panic!("expected a transport error");
    };
    match source.downcast_ref::<GraphqlError>() {
        Some(GraphqlError::Graphql { operation, messages }) => {
            assert_eq!(*operation, "PolarisJobStatus");
            assert_eq!(messages, &vec!["Not authorized to perform this operation".to_string()]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_http_status_is_reported() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/api/graphql");
        then.status(401).body("token expired");
    });

    let err = control_plane(&server).list_accounts("").await.unwrap_err();
    let CloudError::Transport(source) = err else {
        panic!("expected a transport error");
    };
    assert_eq!(
        source.to_string(),
        "PolarisListAwsAccounts returned HTTP 401: token expired"
    );
}
