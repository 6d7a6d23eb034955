//! Feature lifecycle orchestrator
//!
//! Adds features to and removes features from one cloud account by driving
//! the control plane, the customer stack and the control plane's async jobs
//! in a fixed order. Nothing is cached between steps: after every remote
//! mutation the account is read back before the next decision.
//!
//! ```text
//! add:    resolve ─▶ read ─▶ validate+initiate ─▶ read ─▶ finalize ─▶ read
//!           ─▶ reconcile stack ─▶ read
//! remove: resolve ─▶ verify ─▶ for each feature (discovery last):
//!           read ─▶ disable job ─▶ read ─▶ prepare deletion ─▶ read
//!           ─▶ update/delete stack ─▶ finalize ─▶ read
//! ```
//!
//! The sagas are not transactional. When a step fails, the error names the
//! features and the step, and re-running the same request resumes the work.

use crate::account::{CloudAccount, FeatureState};
use crate::context::Context;
use crate::control_plane::{FinalizeRequest, InitiateRequest, Initiation, StackDescriptor};
use crate::error::{CloudError, Result, SagaStep};
use crate::feature::{Feature, ProtectionJob, order_for_removal, split_outpost};
use crate::identity::{AccountIdentity, AccountRef};
use crate::job::{JobState, JobWaiter};
use crate::region::Region;
use crate::stack::{StackApi, StackIntent, StackReconciler, StackSpec, StackUrl, parse_stack_url};
use std::future::Future;
use uuid::Uuid;

/// The account a saga operates on, together with the stack API holding
/// credentials for that account. Without a stack API the stack steps are
/// left to the operator.
#[derive(Clone, Copy)]
pub struct Target<'a> {
    pub identity: &'a AccountIdentity,
    pub stacks: Option<&'a dyn StackApi>,
}

impl<'a> Target<'a> {
    pub fn new(identity: &'a AccountIdentity) -> Self {
        Self {
            identity,
            stacks: None,
        }
    }

    pub fn with_stacks(mut self, stacks: &'a dyn StackApi) -> Self {
        self.stacks = Some(stacks);
        self
    }
}

impl std::fmt::Debug for Target<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Target")
            .field("identity", self.identity)
            .field("stacks", &self.stacks.is_some())
            .finish()
    }
}

/// Features to add to an account
#[derive(Debug, Clone)]
pub struct AddRequest<'a> {
    pub target: Target<'a>,
    /// Account for the outpost feature. Defaults to `target`.
    pub outpost: Option<Target<'a>>,
    pub features: Vec<Feature>,
    pub regions: Vec<Region>,
    /// Display name for a new account. Ignored when the account exists.
    pub name: Option<String>,
}

impl<'a> AddRequest<'a> {
    pub fn new(target: Target<'a>, features: Vec<Feature>, regions: Vec<Region>) -> Self {
        Self {
            target,
            outpost: None,
            features,
            regions,
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_outpost(mut self, outpost: Target<'a>) -> Self {
        self.outpost = Some(outpost);
        self
    }
}

/// Result of adding features to one account
#[derive(Debug, Clone, PartialEq)]
pub struct AddOutcome {
    pub account_id: Uuid,
    pub native_id: String,
    pub added: Vec<Feature>,
    /// Requested features that were already connected and left untouched
    pub already_connected: Vec<Feature>,
    /// Stack the operator must apply when no stack API was supplied
    pub pending_stack: Option<StackDescriptor>,
}

/// Result of an add request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AddReport {
    pub primary: Option<AddOutcome>,
    pub outpost: Option<AddOutcome>,
}

/// Features to remove from an account
#[derive(Debug, Clone)]
pub struct RemoveRequest<'a> {
    pub target: Target<'a>,
    pub features: Vec<Feature>,
    /// Delete snapshots taken by protection features
    pub delete_snapshots: bool,
}

impl<'a> RemoveRequest<'a> {
    pub fn new(target: Target<'a>, features: Vec<Feature>) -> Self {
        Self {
            target,
            features,
            delete_snapshots: false,
        }
    }

    pub fn delete_snapshots(mut self, delete: bool) -> Self {
        self.delete_snapshots = delete;
        self
    }
}

/// Result of a remove request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoveOutcome {
    /// Features removed, in removal order
    pub removed: Vec<Feature>,
    pub stack_deleted: bool,
    /// Stack changes the operator must apply when no stack API was supplied
    pub pending_stack_urls: Vec<StackUrl>,
}

/// Add/remove saga over one account
pub struct Orchestrator<'a> {
    ctx: &'a Context,
}

impl<'a> Orchestrator<'a> {
    pub fn new(ctx: &'a Context) -> Self {
        Self { ctx }
    }

    /// Add features to an account. The outpost feature is onboarded first,
    /// as its own saga against the outpost account.
    pub async fn add(&self, request: &AddRequest<'_>) -> Result<AddReport> {
        if request.regions.is_empty() {
            return Err(CloudError::InvalidRegion(
                "at least one region is required".to_string(),
            ));
        }
        let (outpost, rest) = split_outpost(&request.features);
        let mut report = AddReport::default();

        // An identity is resolved at most once per request, even when the
        // outpost and the primary features share the account.
        let primary_ref = AccountRef::new(request.target.identity);
        let outpost_ref = request
            .outpost
            .filter(|o| o.identity != request.target.identity)
            .map(|o| AccountRef::new(o.identity));

        if let Some(outpost) = outpost {
            let target = request.outpost.unwrap_or(request.target);
            let account_ref = outpost_ref.as_ref().unwrap_or(&primary_ref);
            tracing::info!(identity = %target.identity, "Adding outpost feature");
            report.outpost = Some(
                self.add_to_account(
                    account_ref,
                    target.stacks,
                    &[outpost],
                    &request.regions,
                    request.name.as_deref(),
                )
                .await?,
            );
        }
        if !rest.is_empty() {
            report.primary = Some(
                self.add_to_account(
                    &primary_ref,
                    request.target.stacks,
                    &rest,
                    &request.regions,
                    request.name.as_deref(),
                )
                .await?,
            );
        }
        Ok(report)
    }

    async fn add_to_account(
        &self,
        account_ref: &AccountRef<'_>,
        stacks: Option<&dyn StackApi>,
        features: &[Feature],
        regions: &[Region],
        name: Option<&str>,
    ) -> Result<AddOutcome> {
        let native_id = account_ref.resolve(self.ctx).await?.native_id.clone();
        let existing = self.read_account(&native_id).await?;

        // All features of an account share the account's name.
        let name = match (&existing, name) {
            (Some(account), Some(requested)) if account.name != requested => {
                tracing::warn!(
                    account = %native_id,
                    existing = %account.name,
                    requested,
                    "Account already exists, keeping its name"
                );
                account.name.clone()
            }
            (Some(account), _) => account.name.clone(),
            (None, Some(requested)) => requested.to_string(),
            (None, None) => native_id.clone(),
        };

        let (already_connected, to_add): (Vec<Feature>, Vec<Feature>) =
            features.iter().cloned().partition(|f| {
                existing
                    .as_ref()
                    .and_then(|a| a.feature(f))
                    .is_some_and(|state| state.is_connected())
            });
        for feature in &already_connected {
            tracing::info!(account = %native_id, %feature, "Feature already connected");
        }
        if to_add.is_empty()
            && let Some(account) = existing
        {
            return Ok(AddOutcome {
                account_id: account.id,
                native_id,
                added: Vec::new(),
                already_connected,
                pending_stack: None,
            });
        }

        tracing::info!(account = %native_id, features = ?to_add, "Validating and initiating features");
        let initiation = self
            .call(self.ctx.control_plane().validate_and_initiate(&InitiateRequest {
                native_id: native_id.clone(),
                name: name.clone(),
                features: to_add.clone(),
            }))
            .await
            .map_err(|e| e.in_step(&to_add, SagaStep::ValidateAndInitiate))?;
        let descriptor = match initiation {
            Initiation::Initiated(descriptor) => descriptor,
            Initiation::Rejected { native_id, message } => {
                return Err(CloudError::ValidationRejected { native_id, message }
                    .in_step(&to_add, SagaStep::ValidateAndInitiate));
            }
        };

        // Initiation may have registered the account under its final name.
        let name = match self.read_account(&native_id).await? {
            Some(account) => account.name,
            None => name,
        };

        tracing::info!(account = %native_id, stack = %descriptor.stack_name, "Finalizing feature protection");
        self.call(self.ctx.control_plane().finalize_protection(&FinalizeRequest {
            native_id: native_id.clone(),
            name,
            features: to_add.clone(),
            regions: regions.to_vec(),
            stack: descriptor.clone(),
        }))
        .await
        .and_then(|outcome| outcome.into_result("finalizeFeatureProtection"))
        .map_err(|e| e.in_step(&to_add, SagaStep::FinalizeProtection))?;

        let account = self.require_account(&native_id).await?;
        if let Some(missing) = to_add.iter().find(|f| !account.has_feature(f)) {
            return Err(CloudError::Protocol(format!(
                "feature {missing} not registered after finalize"
            ))
            .in_step(&to_add, SagaStep::FinalizeProtection));
        }

        let pending_stack = match stacks {
            Some(stacks) => {
                let spec = StackSpec::new(&descriptor.stack_name, &descriptor.template_url);
                StackReconciler::new(self.ctx, stacks)
                    .reconcile(&spec)
                    .await
                    .map_err(|e| e.in_step(&to_add, SagaStep::ReconcileStack))?;
                None
            }
            None => {
                tracing::warn!(
                    account = %native_id,
                    stack = %descriptor.stack_name,
                    url = %descriptor.cloud_formation_url,
                    "No stack API available, the stack must be applied manually"
                );
                Some(descriptor)
            }
        };

        let account = self.require_account(&native_id).await?;
        tracing::info!(account = %native_id, account_id = %account.id, "Features added");
        Ok(AddOutcome {
            account_id: account.id,
            native_id,
            added: to_add,
            already_connected,
            pending_stack,
        })
    }

    /// Remove features from an account. Every requested feature must be
    /// present before anything is removed. The discovery feature goes last.
    pub async fn remove(&self, request: &RemoveRequest<'_>) -> Result<RemoveOutcome> {
        let account_ref = AccountRef::new(request.target.identity);
        let native_id = account_ref.resolve(self.ctx).await?.native_id.clone();

        let mut requested: Vec<Feature> = Vec::with_capacity(request.features.len());
        for feature in &request.features {
            if !requested.iter().any(|f| f.same_name(feature)) {
                requested.push(feature.clone());
            }
        }

        let account = self.require_account(&native_id).await?;
        if let Some(missing) = requested.iter().find(|f| !account.has_feature(f)) {
            return Err(CloudError::NotFound(format!(
                "feature {} on account {native_id}",
                missing.name
            )));
        }

        let mut outcome = RemoveOutcome::default();
        for feature in order_for_removal(&requested) {
            self.ctx.checkpoint()?;
            self.remove_feature(request, &native_id, &feature, &mut outcome)
                .await?;
            outcome.removed.push(feature);
        }
        Ok(outcome)
    }

    async fn remove_feature(
        &self,
        request: &RemoveRequest<'_>,
        native_id: &str,
        feature: &Feature,
        outcome: &mut RemoveOutcome,
    ) -> Result<()> {
        let features = std::slice::from_ref(feature);
        let account = self.require_account(native_id).await?;
        let state = feature_state(&account, feature)?;

        if let Some(job) = feature.name.disable_job() {
            if state.is_inactive() {
                tracing::info!(%feature, status = %state.status, "Nothing to disable");
            } else {
                tracing::info!(%feature, "Disabling feature");
                self.disable(account.id, job, request.delete_snapshots)
                    .await
                    .map_err(|e| e.in_step(features, SagaStep::DisableJob))?;

                // Deletion is prepared only once the feature reads back disabled.
                let account = self.require_account(native_id).await?;
                let state = feature_state(&account, feature)?;
                if !state.is_inactive() {
                    return Err(CloudError::Protocol(format!(
                        "feature {feature} is {} after its disable job succeeded",
                        state.status
                    ))
                    .in_step(features, SagaStep::DisableJob));
                }
            }
        }

        tracing::info!(%feature, "Preparing feature deletion");
        let url = self
            .call(
                self.ctx
                    .control_plane()
                    .prepare_feature_deletion(account.id, feature),
            )
            .await
            .map_err(|e| e.in_step(features, SagaStep::PrepareDeletion))?;

        let account = self.require_account(native_id).await?;
        let Some(state) = account.feature(feature) else {
            tracing::info!(%feature, "Feature no longer listed, nothing to finalize");
            return Ok(());
        };

        if let Some(url) = url {
            let stack_url =
                parse_stack_url(&url).map_err(|e| e.in_step(features, SagaStep::PrepareDeletion))?;
            let sharing = account
                .features
                .iter()
                .filter(|f| !f.feature.same_name(feature))
                .filter(|f| state.stack_arn.is_empty() || f.stack_arn == state.stack_arn)
                .count();
            self.apply_stack_url(request.target, stack_url, sharing, outcome)
                .await
                .map_err(|e| e.in_step(features, SagaStep::ReconcileStack))?;
        }

        tracing::info!(%feature, "Finalizing feature deletion");
        self.call(
            self.ctx
                .control_plane()
                .finalize_feature_deletion(account.id, feature),
        )
        .await
        .and_then(|o| o.into_result("finalizeFeatureDeletion"))
        .map_err(|e| e.in_step(features, SagaStep::FinalizeDeletion))?;

        if let Some(account) = self.read_account(native_id).await?
            && account.has_feature(feature)
        {
            tracing::warn!(%feature, "Feature still listed after deletion was finalized");
        }
        Ok(())
    }

    async fn disable(
        &self,
        account_id: Uuid,
        job: ProtectionJob,
        delete_snapshots: bool,
    ) -> Result<()> {
        let job_id = self
            .call(
                self.ctx
                    .control_plane()
                    .start_disable_job(account_id, job, delete_snapshots),
            )
            .await?;
        match JobWaiter::new(self.ctx).wait_for(job_id).await? {
            JobState::Succeeded => Ok(()),
            state => Err(CloudError::AsyncJobFailed { job_id, state }),
        }
    }

    /// Update or delete the stack as the control plane asked. `sharing` is
    /// the number of other features on the account backed by the stack.
    async fn apply_stack_url(
        &self,
        target: Target<'_>,
        stack_url: StackUrl,
        sharing: usize,
        outcome: &mut RemoveOutcome,
    ) -> Result<()> {
        let Some(stacks) = target.stacks else {
            tracing::warn!(
                stack = %stack_url.stack_id,
                intent = ?stack_url.intent,
                "No stack API available, the stack change must be applied manually"
            );
            outcome.pending_stack_urls.push(stack_url);
            return Ok(());
        };
        let reconciler = StackReconciler::new(self.ctx, stacks);

        match (stack_url.intent, stack_url.update_spec()) {
            (StackIntent::Update, Some(spec)) => {
                reconciler.update(&spec).await?;
            }
            (StackIntent::Update, None) => {
                return Err(CloudError::InvalidStackUrl(format!(
                    "update url for stack {} has no templateURL",
                    stack_url.stack_id
                )));
            }
            (StackIntent::Delete, _) if sharing == 0 => {
                reconciler.delete(&stack_url.stack_id).await?;
                outcome.stack_deleted = true;
            }
            (StackIntent::Delete, _) => {
                tracing::warn!(
                    stack = %stack_url.stack_id,
                    remaining = sharing,
                    "Stack still backs other features, not deleting it"
                );
            }
        }
        Ok(())
    }

    /// Replace the regions of a feature. Returns the account as read back
    /// after the change.
    pub async fn update_regions(
        &self,
        identity: &AccountIdentity,
        feature: &Feature,
        regions: &[Region],
    ) -> Result<CloudAccount> {
        if regions.is_empty() {
            return Err(CloudError::InvalidRegion(
                "at least one region is required".to_string(),
            ));
        }
        let account = self.account(identity).await?;
        if !account.has_feature(feature) {
            return Err(CloudError::NotFound(format!(
                "feature {} on account {}",
                feature.name, account.native_id
            )));
        }

        tracing::info!(account = %account.native_id, %feature, ?regions, "Updating feature regions");
        self.call(
            self.ctx
                .control_plane()
                .update_feature_regions(account.id, feature, regions),
        )
        .await
        .and_then(|o| o.into_result("updateFeatureRegions"))
        .map_err(|e| e.in_step(std::slice::from_ref(feature), SagaStep::UpdateRegions))?;
        self.require_account(&account.native_id).await
    }

    /// The registered account behind an identity.
    pub async fn account(&self, identity: &AccountIdentity) -> Result<CloudAccount> {
        let account_ref = AccountRef::new(identity);
        let resolved = account_ref.resolve(self.ctx).await?;
        self.require_account(&resolved.native_id).await
    }

    /// Accounts whose name or native ID contains `filter`.
    pub async fn accounts(&self, filter: &str) -> Result<Vec<CloudAccount>> {
        self.call(self.ctx.control_plane().list_accounts(filter))
            .await
    }

    async fn read_account(&self, native_id: &str) -> Result<Option<CloudAccount>> {
        self.call(self.ctx.control_plane().account_by_native_id(native_id))
            .await
    }

    async fn require_account(&self, native_id: &str) -> Result<CloudAccount> {
        self.read_account(native_id)
            .await?
            .ok_or_else(|| CloudError::NotFound(format!("account {native_id}")))
    }

    /// Run a remote call under the context's cancellation and deadline.
    async fn call<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.ctx.run(fut).await?
    }
}

fn feature_state<'a>(account: &'a CloudAccount, feature: &Feature) -> Result<&'a FeatureState> {
    account.feature(feature).ok_or_else(|| {
        CloudError::NotFound(format!(
            "feature {} on account {}",
            feature.name, account.native_id
        ))
    })
}
