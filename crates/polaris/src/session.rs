//! Per-process wiring of settings, control plane and AWS collaborators

use crate::AwsArgs;
use anyhow::Context as _;
use polaris_cloud::{Context, Orchestrator, PollSettings};
use polaris_cloud_aws::{CloudFormationStacks, StsIdentityResolver};
use polaris_config::Settings;
use polaris_graphql::{GraphqlClient, PolarisControlPlane};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct Session {
    ctx: Context,
}

impl Session {
    /// Load settings and build the saga context.
    pub fn open(config: Option<&Path>, cancel: CancellationToken) -> anyhow::Result<Self> {
        let settings = match config {
            Some(path) => polaris_config::load_settings_from(path),
            None => polaris_config::load_settings(),
        }
        .context("Failed to load settings")?;
        tracing::debug!(endpoint = %settings.endpoint, "Loaded settings");
        Ok(Self {
            ctx: build_context(&settings, cancel),
        })
    }

    pub fn orchestrator(&self) -> Orchestrator<'_> {
        Orchestrator::new(&self.ctx)
    }

    /// CloudFormation access for the account behind `aws`.
    pub async fn stacks(&self, aws: &AwsArgs) -> CloudFormationStacks {
        let config =
            polaris_cloud_aws::load_config(aws.profile.as_deref(), aws.stack_region.as_deref())
                .await;
        CloudFormationStacks::new(&config)
    }
}

fn build_context(settings: &Settings, cancel: CancellationToken) -> Context {
    let client = GraphqlClient::new(&settings.endpoint, &settings.access_token);
    let ctx = Context::new(Arc::new(PolarisControlPlane::new(client)))
        .with_identity_resolver(Arc::new(StsIdentityResolver::new()))
        .with_cancellation(cancel)
        .with_stack_poll(
            PollSettings::new(settings.stack_poll_interval()).with_jitter(settings.poll_jitter()),
        )
        .with_job_poll(
            PollSettings::new(settings.job_poll_interval()).with_jitter(settings.poll_jitter()),
        );
    match settings.timeout() {
        Some(timeout) => ctx.with_timeout(timeout),
        None => ctx,
    }
}
