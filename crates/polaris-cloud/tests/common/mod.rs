use polaris_cloud::testing::{FakeControlPlane, FakeStackApi, stack_name};
use polaris_cloud::{AccountIdentity, Context, Orchestrator, Target};
use std::sync::Arc;

pub const NATIVE_ID: &str = "123456789012";

/// One account, an in-memory control plane and a scripted CloudFormation.
pub struct TestAccount {
    pub control_plane: Arc<FakeControlPlane>,
    pub stacks: FakeStackApi,
    pub identity: AccountIdentity,
    pub ctx: Context,
}

impl TestAccount {
    pub fn new() -> Self {
        let control_plane = Arc::new(FakeControlPlane::new());
        let ctx = Context::new(control_plane.clone());
        Self {
            control_plane,
            stacks: FakeStackApi::new(),
            identity: AccountIdentity::NativeId(NATIVE_ID.to_string()),
            ctx,
        }
    }

    /// Start with the account's stack already deployed.
    pub fn with_deployed_stack() -> Self {
        let mut account = Self::new();
        account.stacks =
            FakeStackApi::with_stack(&stack_name(NATIVE_ID), polaris_cloud::StackStatus::CreateComplete);
        account
    }

    pub fn target(&self) -> Target<'_> {
        Target::new(&self.identity).with_stacks(&self.stacks)
    }

    pub fn orchestrator(&self) -> Orchestrator<'_> {
        Orchestrator::new(&self.ctx)
    }

    #[allow(dead_code)]
    pub fn stack_name(&self) -> String {
        stack_name(NATIVE_ID)
    }
}
