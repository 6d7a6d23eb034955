//! Saga error types

use thiserror::Error;
use uuid::Uuid;

use crate::feature::Feature;
use crate::job::JobState;
use crate::stack::StackStatus;

/// Boxed error raised by a collaborator (GraphQL transport, cloud SDK).
pub type TransportError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Saga errors
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Invalid account identity: {0}")]
    InvalidIdentity(String),

    #[error("Invalid region: {0}")]
    InvalidRegion(String),

    #[error("Invalid feature: {0}")]
    InvalidFeature(String),

    #[error("Control plane rejected account {native_id}: {message}")]
    ValidationRejected { native_id: String, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Stack {stack_id} reached terminal status {status}")]
    StackReconciliationFailed { stack_id: String, status: StackStatus },

    #[error("Async job {job_id} finished in state {state}")]
    AsyncJobFailed { job_id: Uuid, state: JobState },

    #[error("Control plane operation {operation} failed: {message}")]
    ControlPlaneOperationFailed {
        operation: &'static str,
        message: String,
    },

    #[error("Failed to {step} {}: {source}", display_features(.features))]
    FeatureStep {
        features: Vec<Feature>,
        step: SagaStep,
        #[source]
        source: Box<CloudError>,
    },

    #[error("Malformed stack URL: {0}")]
    InvalidStackUrl(String),

    #[error("Unexpected control plane response: {0}")]
    Protocol(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Deadline exceeded")]
    DeadlineExceeded,

    #[error("Transport error: {0}")]
    Transport(#[source] TransportError),
}

impl CloudError {
    /// Wrap a collaborator error without altering it.
    pub fn transport(err: impl Into<TransportError>) -> Self {
        CloudError::Transport(err.into())
    }

    /// Attach the features and saga step that produced this error.
    pub fn in_step(self, features: &[Feature], step: SagaStep) -> Self {
        match self {
            // Cancellation is not a property of any one feature.
            CloudError::Cancelled | CloudError::DeadlineExceeded => self,
            CloudError::FeatureStep { .. } => self,
            other => CloudError::FeatureStep {
                features: features.to_vec(),
                step,
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, looking through `FeatureStep` wrappers.
    pub fn root(&self) -> &CloudError {
        match self {
            CloudError::FeatureStep { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), CloudError::NotFound(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(
            self.root(),
            CloudError::Cancelled | CloudError::DeadlineExceeded
        )
    }
}

/// Saga step names used to report which step of which feature failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SagaStep {
    ValidateAndInitiate,
    FinalizeProtection,
    ReconcileStack,
    DisableJob,
    PrepareDeletion,
    FinalizeDeletion,
    UpdateRegions,
}

impl std::fmt::Display for SagaStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SagaStep::ValidateAndInitiate => write!(f, "validate and initiate"),
            SagaStep::FinalizeProtection => write!(f, "finalize protection of"),
            SagaStep::ReconcileStack => write!(f, "reconcile stack for"),
            SagaStep::DisableJob => write!(f, "disable"),
            SagaStep::PrepareDeletion => write!(f, "prepare deletion of"),
            SagaStep::FinalizeDeletion => write!(f, "finalize deletion of"),
            SagaStep::UpdateRegions => write!(f, "update regions of"),
        }
    }
}

fn display_features(features: &[Feature]) -> String {
    let names: Vec<String> = features.iter().map(Feature::to_string).collect();
    match names.len() {
        1 => format!("feature {}", names[0]),
        _ => format!("features {}", names.join(", ")),
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::FeatureName;

    #[test]
    fn test_in_step_wraps_once() {
        let feature = Feature::new(FeatureName::Exocompute);
        let err = CloudError::NotFound("x".to_string())
            .in_step(std::slice::from_ref(&feature), SagaStep::PrepareDeletion)
            .in_step(std::slice::from_ref(&feature), SagaStep::FinalizeDeletion);

        match &err {
            CloudError::FeatureStep { step, .. } => assert_eq!(*step, SagaStep::PrepareDeletion),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.is_not_found());
        assert_eq!(
            err.to_string(),
            "Failed to prepare deletion of feature EXOCOMPUTE: Not found: x"
        );
    }

    #[test]
    fn test_cancellation_is_not_wrapped() {
        let feature = Feature::new(FeatureName::CloudNativeProtection);
        let err = CloudError::Cancelled.in_step(&[feature], SagaStep::DisableJob);
        assert!(matches!(err, CloudError::Cancelled));
        assert!(err.is_cancelled());
    }
}
