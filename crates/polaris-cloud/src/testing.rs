//! In-memory collaborators for tests
//!
//! [`FakeControlPlane`] keeps accounts in memory and applies mutations the
//! way the remote control plane does. [`FakeStackApi`] replays scripted
//! CloudFormation statuses. Both record the calls they receive.

use crate::account::{CloudAccount, FeatureState};
use crate::control_plane::{
    ControlPlane, FeatureVersion, FinalizeRequest, InitiateRequest, Initiation, Outcome,
    StackDescriptor,
};
use crate::error::{CloudError, Result};
use crate::feature::{Feature, FeatureName, FeatureStatus, ProtectionJob};
use crate::identity::IdentityResolver;
use crate::job::JobState;
use crate::region::Region;
use crate::stack::{StackApi, StackSnapshot, StackSpec, StackStatus};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

pub const TEMPLATE_URL: &str = "https://polaris-templates.s3.amazonaws.com/aws/template.json";
const CONSOLE_URL: &str = "https://console.aws.amazon.com/cloudformation/home";

/// Disable job started through the fake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedJob {
    pub id: Uuid,
    pub account_id: Uuid,
    pub job: ProtectionJob,
    pub delete_snapshots: bool,
}

#[derive(Debug)]
struct ScriptedJob {
    script: VecDeque<JobState>,
    current: JobState,
    polls: usize,
    /// Account and sub-feature disabled once the job succeeds
    disables: Option<(Uuid, ProtectionJob)>,
}

impl ScriptedJob {
    fn new(states: impl IntoIterator<Item = JobState>) -> Self {
        Self {
            script: states.into_iter().collect(),
            current: JobState::Ready,
            polls: 0,
            disables: None,
        }
    }
}

#[derive(Debug, Default)]
struct ControlPlaneState {
    accounts: Vec<CloudAccount>,
    jobs: HashMap<Uuid, ScriptedJob>,
    started_jobs: Vec<StartedJob>,
    disable_job_scripts: HashMap<ProtectionJob, Vec<JobState>>,
    rejections: HashMap<String, String>,
    failures: Vec<(&'static str, Option<FeatureName>, String)>,
    deletion_urls: HashMap<FeatureName, Option<String>>,
    finalize_status: Option<FeatureStatus>,
    ignore_disable_jobs: bool,
    calls: Vec<String>,
}

/// In-memory control plane
#[derive(Debug, Default)]
pub struct FakeControlPlane {
    state: Mutex<ControlPlaneState>,
}

impl FakeControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ControlPlaneState> {
        self.state.lock().unwrap()
    }

    /// Register an account directly, bypassing the add flow.
    pub fn insert_account(&self, account: CloudAccount) {
        let mut state = self.lock();
        state.accounts.retain(|a| a.id != account.id);
        state.accounts.push(account);
    }

    /// Register an account carrying the given features, all sharing one
    /// stack named `polaris-<native_id>`.
    pub fn seed_account(
        &self,
        native_id: &str,
        name: &str,
        features: &[(FeatureName, FeatureStatus)],
    ) -> Uuid {
        let id = Uuid::new_v4();
        let features = features
            .iter()
            .map(|(feature, status)| FeatureState {
                feature: Feature::new(*feature),
                regions: [Region::UsEast2].into_iter().collect(),
                role_arn: role_arn(native_id),
                stack_arn: stack_arn(native_id, &stack_name(native_id)),
                status: *status,
            })
            .collect();
        self.insert_account(CloudAccount {
            id,
            native_id: native_id.to_string(),
            name: name.to_string(),
            features,
        });
        id
    }

    pub fn account(&self, native_id: &str) -> Option<CloudAccount> {
        self.lock()
            .accounts
            .iter()
            .find(|a| a.native_id == native_id)
            .cloned()
    }

    /// Script the state sequence of a new job and return its ID. The last
    /// state repeats once the script is exhausted.
    pub fn script_job(&self, states: impl IntoIterator<Item = JobState>) -> Uuid {
        let id = Uuid::new_v4();
        self.lock().jobs.insert(id, ScriptedJob::new(states));
        id
    }

    /// Number of times the job's state was read.
    pub fn job_polls(&self, job_id: Uuid) -> usize {
        self.lock().jobs.get(&job_id).map_or(0, |j| j.polls)
    }

    /// Script the state sequence of disable jobs started for `job`. Jobs
    /// without a script run once and succeed.
    pub fn script_disable_job(&self, job: ProtectionJob, states: impl IntoIterator<Item = JobState>) {
        self.lock()
            .disable_job_scripts
            .insert(job, states.into_iter().collect());
    }

    pub fn started_jobs(&self) -> Vec<StartedJob> {
        self.lock().started_jobs.clone()
    }

    /// Reject `validate_and_initiate` for this native account.
    pub fn reject(&self, native_id: &str, message: &str) {
        self.lock()
            .rejections
            .insert(native_id.to_string(), message.to_string());
    }

    /// Make a mutation report failure, for one feature or for all of them.
    pub fn fail(&self, operation: &'static str, feature: Option<FeatureName>, message: &str) {
        self.lock()
            .failures
            .push((operation, feature, message.to_string()));
    }

    /// Override the stack URL `prepare_feature_deletion` returns for a
    /// feature. By default the URL is derived from the remaining features.
    pub fn set_deletion_url(&self, feature: FeatureName, url: Option<&str>) {
        self.lock()
            .deletion_urls
            .insert(feature, url.map(str::to_string));
    }

    /// Status of features registered by `finalize_protection`. Defaults to
    /// connected; use `Connecting` to model a stack not deployed yet.
    pub fn set_finalize_status(&self, status: FeatureStatus) {
        self.lock().finalize_status = Some(status);
    }

    /// Leave feature statuses untouched when disable jobs succeed.
    pub fn ignore_disable_jobs(&self) {
        self.lock().ignore_disable_jobs = true;
    }

    /// Calls received, as `operation` or `operation:FEATURE`.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn count(&self, operation: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.split(':').next() == Some(operation))
            .count()
    }

    fn failure(
        state: &ControlPlaneState,
        operation: &'static str,
        features: &[&Feature],
    ) -> Option<String> {
        state
            .failures
            .iter()
            .find(|(op, feature, _)| {
                *op == operation
                    && feature.is_none_or(|name| features.iter().any(|f| f.name == name))
            })
            .map(|(_, _, message)| message.clone())
    }

    fn account_mut(state: &mut ControlPlaneState, id: Uuid) -> Result<&mut CloudAccount> {
        state
            .accounts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| CloudError::NotFound(format!("platform account {id}")))
    }
}

pub fn stack_name(native_id: &str) -> String {
    format!("polaris-{native_id}")
}

pub fn stack_arn(native_id: &str, stack_name: &str) -> String {
    format!("arn:aws:cloudformation:us-east-2:{native_id}:stack/{stack_name}/7f1c0e42-5a8b-4c1d-9e3f-2b6a8d0c4e11")
}

fn role_arn(native_id: &str) -> String {
    format!("arn:aws:iam::{native_id}:role/polaris-cross-account")
}

fn stack_url(marker: &str, stack_id: &str, template_url: Option<&str>) -> String {
    let mut query = url::form_urlencoded::Serializer::new(String::new());
    query.append_pair("stackId", stack_id);
    if let Some(template_url) = template_url {
        query.append_pair("templateURL", template_url);
        query.append_pair("param_ExternalId", "polaris-external-id");
    }
    format!("{CONSOLE_URL}#/stack/{marker}?{}", query.finish())
}

#[async_trait]
impl ControlPlane for FakeControlPlane {
    async fn list_accounts(&self, filter: &str) -> Result<Vec<CloudAccount>> {
        let mut state = self.lock();
        state.calls.push("listAccounts".to_string());
        Ok(state
            .accounts
            .iter()
            .filter(|a| a.name.contains(filter) || a.native_id.contains(filter))
            .cloned()
            .collect())
    }

    async fn account_by_id(&self, id: Uuid) -> Result<Option<CloudAccount>> {
        let mut state = self.lock();
        state.calls.push("accountById".to_string());
        Ok(state.accounts.iter().find(|a| a.id == id).cloned())
    }

    async fn validate_and_initiate(&self, request: &InitiateRequest) -> Result<Initiation> {
        let mut state = self.lock();
        state.calls.push("validateAndInitiate".to_string());
        if let Some(message) = state.rejections.get(&request.native_id) {
            return Ok(Initiation::Rejected {
                native_id: request.native_id.clone(),
                message: message.clone(),
            });
        }
        let stack_name = stack_name(&request.native_id);
        Ok(Initiation::Initiated(StackDescriptor {
            cloud_formation_url: stack_url("create", &stack_name, Some(TEMPLATE_URL)),
            stack_name,
            template_url: TEMPLATE_URL.to_string(),
            external_id: "polaris-external-id".to_string(),
            feature_versions: request
                .features
                .iter()
                .map(|f| FeatureVersion {
                    feature: f.name.remote_name().to_string(),
                    version: 1,
                    permission_groups: Vec::new(),
                })
                .collect(),
        }))
    }

    async fn finalize_protection(&self, request: &FinalizeRequest) -> Result<Outcome> {
        let mut state = self.lock();
        state.calls.push("finalizeFeatureProtection".to_string());
        let features: Vec<&Feature> = request.features.iter().collect();
        if let Some(message) = Self::failure(&state, "finalizeFeatureProtection", &features) {
            return Ok(Outcome::failure(message));
        }

        let index = match state
            .accounts
            .iter()
            .position(|a| a.native_id == request.native_id)
        {
            Some(index) => index,
            None => {
                state.accounts.push(CloudAccount {
                    id: Uuid::new_v4(),
                    native_id: request.native_id.clone(),
                    name: request.name.clone(),
                    features: Vec::new(),
                });
                state.accounts.len() - 1
            }
        };
        let status = state.finalize_status.unwrap_or(FeatureStatus::Connected);
        let account = &mut state.accounts[index];
        account.name = request.name.clone();
        for feature in &request.features {
            account.features.retain(|f| !f.feature.same_name(feature));
            account.features.push(FeatureState {
                feature: feature.clone(),
                regions: request.regions.iter().copied().collect(),
                role_arn: role_arn(&request.native_id),
                stack_arn: stack_arn(&request.native_id, &request.stack.stack_name),
                status,
            });
        }
        Ok(Outcome::from_message("Successfully finalized feature protection"))
    }

    async fn prepare_feature_deletion(
        &self,
        account_id: Uuid,
        feature: &Feature,
    ) -> Result<Option<String>> {
        let mut state = self.lock();
        state
            .calls
            .push(format!("prepareFeatureDeletion:{}", feature.name.remote_name()));
        if let Some(url) = state.deletion_urls.get(&feature.name) {
            return Ok(url.clone());
        }

        let account = Self::account_mut(&mut state, account_id)?;
        let Some(current) = account.feature(feature) else {
            return Err(CloudError::NotFound(format!("feature {feature}")));
        };
        let stack_id = current.stack_arn.clone();
        let shared = account
            .features
            .iter()
            .any(|f| !f.feature.same_name(feature) && f.stack_arn == stack_id);
        Ok(Some(if shared {
            stack_url("update", &stack_id, Some(TEMPLATE_URL))
        } else {
            stack_url("detail", &stack_id, None)
        }))
    }

    async fn finalize_feature_deletion(
        &self,
        account_id: Uuid,
        feature: &Feature,
    ) -> Result<Outcome> {
        let mut state = self.lock();
        state
            .calls
            .push(format!("finalizeFeatureDeletion:{}", feature.name.remote_name()));
        if let Some(message) = Self::failure(&state, "finalizeFeatureDeletion", &[feature]) {
            return Ok(Outcome::failure(message));
        }

        let account = Self::account_mut(&mut state, account_id)?;
        account.features.retain(|f| !f.feature.same_name(feature));
        if account.features.is_empty() {
            state.accounts.retain(|a| a.id != account_id);
        }
        Ok(Outcome::from_message("Successfully deleted feature"))
    }

    async fn update_feature_regions(
        &self,
        account_id: Uuid,
        feature: &Feature,
        regions: &[Region],
    ) -> Result<Outcome> {
        let mut state = self.lock();
        state
            .calls
            .push(format!("updateFeatureRegions:{}", feature.name.remote_name()));
        if let Some(message) = Self::failure(&state, "updateFeatureRegions", &[feature]) {
            return Ok(Outcome::failure(message));
        }

        let account = Self::account_mut(&mut state, account_id)?;
        let current = account
            .features
            .iter_mut()
            .find(|f| f.feature.same_name(feature))
            .ok_or_else(|| CloudError::NotFound(format!("feature {feature}")))?;
        current.regions = regions.iter().copied().collect();
        Ok(Outcome::from_message("Successfully updated regions"))
    }

    async fn start_disable_job(
        &self,
        account_id: Uuid,
        job: ProtectionJob,
        delete_snapshots: bool,
    ) -> Result<Uuid> {
        let mut state = self.lock();
        state
            .calls
            .push(format!("startDisableJob:{}", job.remote_name()));
        Self::account_mut(&mut state, account_id)?;

        let id = Uuid::new_v4();
        let script = state
            .disable_job_scripts
            .get(&job)
            .cloned()
            .unwrap_or_else(|| vec![JobState::Running, JobState::Succeeded]);
        let mut scripted = ScriptedJob::new(script);
        scripted.disables = Some((account_id, job));
        state.jobs.insert(id, scripted);
        state.started_jobs.push(StartedJob {
            id,
            account_id,
            job,
            delete_snapshots,
        });
        Ok(id)
    }

    async fn job_state(&self, job_id: Uuid) -> Result<JobState> {
        let mut state = self.lock();
        let job = state
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| CloudError::NotFound(format!("job {job_id}")))?;
        job.polls += 1;
        if let Some(next) = job.script.pop_front() {
            job.current = next;
        }
        let current = job.current;
        let disables = match current {
            JobState::Succeeded => job.disables.take(),
            _ => None,
        };
        if state.ignore_disable_jobs {
            return Ok(current);
        }

        if let Some((account_id, job)) = disables
            && let Some(account) = state.accounts.iter_mut().find(|a| a.id == account_id)
        {
            for feature in &mut account.features {
                if feature.feature.name.disable_job() == Some(job) {
                    feature.status = FeatureStatus::Disabled;
                }
            }
        }
        Ok(current)
    }
}

#[derive(Debug)]
struct FakeStack {
    stack_id: String,
    current: StackStatus,
    script: VecDeque<StackStatus>,
}

#[derive(Debug, Default)]
struct StackApiState {
    stacks: HashMap<String, FakeStack>,
    create_script: Vec<StackStatus>,
    update_script: Vec<StackStatus>,
    delete_script: Vec<StackStatus>,
    up_to_date: bool,
    specs: Vec<StackSpec>,
    calls: Vec<&'static str>,
}

impl StackApiState {
    /// Find a stack by name, stack ID or the name embedded in a stack ARN.
    fn find(&mut self, name: &str) -> Option<(&String, &mut FakeStack)> {
        let key = name
            .split_once(":stack/")
            .and_then(|(_, rest)| rest.split('/').next())
            .unwrap_or(name);
        self.stacks
            .iter_mut()
            .find(|(k, s)| k.as_str() == key || s.stack_id == name)
    }
}

/// Scripted CloudFormation
#[derive(Debug, Default)]
pub struct FakeStackApi {
    state: Mutex<StackApiState>,
}

impl FakeStackApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with an existing stack in the given status.
    pub fn with_stack(name: &str, status: StackStatus) -> Self {
        let api = Self::new();
        api.lock().stacks.insert(
            name.to_string(),
            FakeStack {
                stack_id: fake_stack_id(name),
                current: status,
                script: VecDeque::new(),
            },
        );
        api
    }

    fn lock(&self) -> MutexGuard<'_, StackApiState> {
        self.state.lock().unwrap()
    }

    /// Statuses reported after the next create, one per describe call.
    pub fn script_create(&self, statuses: impl IntoIterator<Item = StackStatus>) {
        self.lock().create_script = statuses.into_iter().collect();
    }

    pub fn script_update(&self, statuses: impl IntoIterator<Item = StackStatus>) {
        self.lock().update_script = statuses.into_iter().collect();
    }

    pub fn script_delete(&self, statuses: impl IntoIterator<Item = StackStatus>) {
        self.lock().delete_script = statuses.into_iter().collect();
    }

    /// Statuses an existing stack reports on the next describe calls.
    pub fn script_existing(&self, name: &str, statuses: impl IntoIterator<Item = StackStatus>) {
        if let Some((_, stack)) = self.lock().find(name) {
            stack.script = statuses.into_iter().collect();
        }
    }

    /// Report "no updates are to be performed" on update.
    pub fn mark_up_to_date(&self) {
        self.lock().up_to_date = true;
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.lock().calls.clone()
    }

    /// Specs passed to create and update calls.
    pub fn specs(&self) -> Vec<StackSpec> {
        self.lock().specs.clone()
    }

    pub fn stack_id(&self, name: &str) -> String {
        self.lock()
            .find(name)
            .map(|(_, s)| s.stack_id.clone())
            .unwrap_or_default()
    }

    /// Last status reported for the stack, without consuming the script.
    pub fn status(&self, name: &str) -> Option<StackStatus> {
        self.lock().find(name).map(|(_, s)| s.current.clone())
    }
}

fn fake_stack_id(name: &str) -> String {
    stack_arn("123456789012", name)
}

fn start_operation(script: &mut Vec<StackStatus>, in_progress: StackStatus, complete: StackStatus) -> FakeStack {
    let script = match std::mem::take(script) {
        s if s.is_empty() => vec![in_progress.clone(), complete],
        s => s,
    };
    FakeStack {
        stack_id: String::new(),
        current: in_progress,
        script: script.into(),
    }
}

#[async_trait]
impl StackApi for FakeStackApi {
    async fn describe_stack(&self, name: &str) -> Result<Option<StackSnapshot>> {
        let mut state = self.lock();
        state.calls.push("describe");
        Ok(state.find(name).map(|(_, stack)| {
            if let Some(next) = stack.script.pop_front() {
                stack.current = next;
            }
            StackSnapshot {
                stack_id: stack.stack_id.clone(),
                status: stack.current.clone(),
            }
        }))
    }

    async fn create_stack(&self, spec: &StackSpec) -> Result<String> {
        let mut state = self.lock();
        state.calls.push("create");
        state.specs.push(spec.clone());
        if let Some((_, existing)) = state.find(&spec.name)
            && existing.current != StackStatus::DeleteComplete
        {
            return Err(CloudError::transport(format!(
                "AlreadyExistsException: Stack [{}] already exists",
                spec.name
            )));
        }
        let mut stack = start_operation(
            &mut state.create_script,
            StackStatus::CreateInProgress,
            StackStatus::CreateComplete,
        );
        stack.stack_id = fake_stack_id(&spec.name);
        let stack_id = stack.stack_id.clone();
        state.stacks.insert(spec.name.clone(), stack);
        Ok(stack_id)
    }

    async fn update_stack(&self, spec: &StackSpec) -> Result<Option<String>> {
        let mut state = self.lock();
        state.calls.push("update");
        state.specs.push(spec.clone());
        if state.up_to_date {
            return Ok(None);
        }
        let mut started = start_operation(
            &mut state.update_script,
            StackStatus::UpdateInProgress,
            StackStatus::UpdateComplete,
        );
        let (_, stack) = state
            .find(&spec.name)
            .ok_or_else(|| CloudError::transport(format!("Stack [{}] does not exist", spec.name)))?;
        started.stack_id = stack.stack_id.clone();
        *stack = started;
        Ok(Some(stack.stack_id.clone()))
    }

    async fn delete_stack(&self, name: &str) -> Result<()> {
        let mut state = self.lock();
        state.calls.push("delete");
        let mut started = start_operation(
            &mut state.delete_script,
            StackStatus::DeleteInProgress,
            StackStatus::DeleteComplete,
        );
        if let Some((_, stack)) = state.find(name) {
            started.stack_id = stack.stack_id.clone();
            *stack = started;
        }
        Ok(())
    }
}

/// Resolves every profile to the same native ID and counts lookups.
#[derive(Debug)]
pub struct FakeIdentityResolver {
    native_id: String,
    lookups: Mutex<usize>,
}

impl FakeIdentityResolver {
    pub fn new(native_id: &str) -> Self {
        Self {
            native_id: native_id.to_string(),
            lookups: Mutex::new(0),
        }
    }

    pub fn lookups(&self) -> usize {
        *self.lookups.lock().unwrap()
    }
}

#[async_trait]
impl IdentityResolver for FakeIdentityResolver {
    async fn native_id_for_profile(&self, _profile: &str) -> Result<String> {
        *self.lookups.lock().unwrap() += 1;
        Ok(self.native_id.clone())
    }
}
