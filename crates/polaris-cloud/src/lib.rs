//! Polaris Cloud Feature Lifecycle
//!
//! This crate onboards and offboards features of a cloud account on the
//! Polaris control plane, coordinating three systems that are each
//! consistent on their own: the control plane, the customer's
//! CloudFormation stack and the control plane's async job engine.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  Polaris CLI                     │
//! │          (polaris add / remove / show)           │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                polaris-cloud                     │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │              Orchestrator                 │   │
//! │  │        add / remove / update regions      │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────────┐ ┌────────────┐ ┌──────────┐   │
//! │  │    Stack     │ │    Job     │ │ Identity │   │
//! │  │  Reconciler  │ │   Waiter   │ │ Catalog  │   │
//! │  └──────────────┘ └────────────┘ └──────────┘   │
//! │  trait ControlPlane   trait StackApi             │
//! └───────┬─────────────────┬───────────────────────┘
//!         │                 │
//! ┌───────▼───────┐ ┌───────▼───────┐
//! │polaris-graphql│ │polaris-cloud- │
//! │ control plane │ │  aws (CFN,STS)│
//! └───────────────┘ └───────────────┘
//! ```

pub mod account;
pub mod context;
pub mod control_plane;
pub mod error;
pub mod feature;
pub mod identity;
pub mod job;
pub mod orchestrator;
pub mod poll;
pub mod region;
pub mod stack;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// Re-exports
pub use account::{CloudAccount, FeatureState};
pub use context::{Context, DEFAULT_POLL_INTERVAL, PollSettings};
pub use control_plane::{
    ControlPlane, FeatureVersion, FinalizeRequest, InitiateRequest, Initiation, Outcome,
    PermissionGroupVersion, StackDescriptor,
};
pub use error::{CloudError, Result, SagaStep, TransportError};
pub use feature::{
    Feature, FeatureClass, FeatureName, FeatureStatus, PermissionGroup, ProtectionJob,
    order_for_removal, split_outpost,
};
pub use identity::{AccountIdentity, AccountRef, IdentityResolver, ResolvedIdentity};
pub use job::{AsyncJob, JobState, JobWaiter};
pub use orchestrator::{
    AddOutcome, AddReport, AddRequest, Orchestrator, RemoveOutcome, RemoveRequest, Target,
};
pub use poll::{Poller, Progress, drive};
pub use region::{Region, parse_regions};
pub use stack::{
    StackApi, StackIntent, StackPhase, StackReconciler, StackSnapshot, StackSpec, StackStatus,
    StackUrl, parse_stack_url,
};
