//! Customer stack reconciliation
//!
//! The control plane obtains its IAM permissions through a CloudFormation
//! stack deployed in the customer's account. [`StackReconciler`] creates,
//! updates or deletes that stack and blocks until CloudFormation reports a
//! terminal status.
//!
//! ```text
//! Absent ──create──▶ Creating ──▶ Created ──update──▶ Updating ──▶ Created
//!                        │            │                   │
//!                        ▼            └──delete──▶ Deleting ──▶ Absent
//!                      Failed ◀───────────────────────┘
//! ```

use crate::context::Context;
use crate::error::{CloudError, Result};
use crate::poll::{Poller, Progress, drive};
use async_trait::async_trait;
use std::str::FromStr;

/// Cloud-provider stack operations
#[async_trait]
pub trait StackApi: Send + Sync {
    /// Describe a stack by name or stack ID. `None` if it does not exist.
    async fn describe_stack(&self, name: &str) -> Result<Option<StackSnapshot>>;

    /// Start creating a stack, returning its stack ID.
    async fn create_stack(&self, spec: &StackSpec) -> Result<String>;

    /// Start updating a stack, returning its stack ID. `None` means the
    /// stack already matches the template and nothing was started.
    async fn update_stack(&self, spec: &StackSpec) -> Result<Option<String>>;

    /// Start deleting a stack.
    async fn delete_stack(&self, name: &str) -> Result<()>;
}

/// Observed state of a stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackSnapshot {
    pub stack_id: String,
    pub status: StackStatus,
}

/// Desired stack
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StackSpec {
    /// Stack name or stack ID
    pub name: String,
    pub template_url: String,
    pub parameters: Vec<(String, String)>,
}

impl StackSpec {
    pub fn new(name: impl Into<String>, template_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            template_url: template_url.into(),
            parameters: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.push((key.into(), value.into()));
        self
    }
}

macro_rules! stack_statuses {
    ($($variant:ident => $name:literal,)+) => {
        /// CloudFormation stack status
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub enum StackStatus {
            $($variant,)+
            /// A status this SDK does not know about
            Other(String),
        }

        impl StackStatus {
            pub fn as_str(&self) -> &str {
                match self {
                    $(StackStatus::$variant => $name,)+
                    StackStatus::Other(s) => s,
                }
            }
        }

        impl From<&str> for StackStatus {
            fn from(s: &str) -> Self {
                match s {
                    $($name => StackStatus::$variant,)+
                    other => StackStatus::Other(other.to_string()),
                }
            }
        }
    };
}

stack_statuses! {
    CreateInProgress => "CREATE_IN_PROGRESS",
    CreateFailed => "CREATE_FAILED",
    CreateComplete => "CREATE_COMPLETE",
    RollbackInProgress => "ROLLBACK_IN_PROGRESS",
    RollbackFailed => "ROLLBACK_FAILED",
    RollbackComplete => "ROLLBACK_COMPLETE",
    DeleteInProgress => "DELETE_IN_PROGRESS",
    DeleteFailed => "DELETE_FAILED",
    DeleteComplete => "DELETE_COMPLETE",
    UpdateInProgress => "UPDATE_IN_PROGRESS",
    UpdateCompleteCleanupInProgress => "UPDATE_COMPLETE_CLEANUP_IN_PROGRESS",
    UpdateComplete => "UPDATE_COMPLETE",
    UpdateFailed => "UPDATE_FAILED",
    UpdateRollbackInProgress => "UPDATE_ROLLBACK_IN_PROGRESS",
    UpdateRollbackFailed => "UPDATE_ROLLBACK_FAILED",
    UpdateRollbackCompleteCleanupInProgress => "UPDATE_ROLLBACK_COMPLETE_CLEANUP_IN_PROGRESS",
    UpdateRollbackComplete => "UPDATE_ROLLBACK_COMPLETE",
    ReviewInProgress => "REVIEW_IN_PROGRESS",
    ImportInProgress => "IMPORT_IN_PROGRESS",
    ImportComplete => "IMPORT_COMPLETE",
    ImportRollbackInProgress => "IMPORT_ROLLBACK_IN_PROGRESS",
    ImportRollbackFailed => "IMPORT_ROLLBACK_FAILED",
    ImportRollbackComplete => "IMPORT_ROLLBACK_COMPLETE",
}

impl StackStatus {
    /// Whether CloudFormation is still working on the stack. Unknown
    /// statuses follow the `*_IN_PROGRESS` naming convention.
    pub fn is_in_progress(&self) -> bool {
        self.as_str().ends_with("_IN_PROGRESS")
    }

    pub fn phase(&self) -> StackPhase {
        use StackStatus::*;
        match self {
            CreateInProgress | ReviewInProgress | RollbackInProgress => StackPhase::Creating,
            UpdateInProgress
            | UpdateCompleteCleanupInProgress
            | UpdateRollbackInProgress
            | UpdateRollbackCompleteCleanupInProgress
            | ImportInProgress
            | ImportRollbackInProgress => StackPhase::Updating,
            DeleteInProgress => StackPhase::Deleting,
            CreateComplete | UpdateComplete | UpdateRollbackComplete | ImportComplete
            | ImportRollbackComplete => StackPhase::Created,
            DeleteComplete => StackPhase::Absent,
            CreateFailed | RollbackFailed | RollbackComplete | DeleteFailed | UpdateFailed
            | UpdateRollbackFailed | ImportRollbackFailed => StackPhase::Failed,
            Other(_) if self.is_in_progress() => StackPhase::Updating,
            Other(_) => StackPhase::Failed,
        }
    }
}

impl FromStr for StackStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(StackStatus::from(s))
    }
}

impl std::fmt::Display for StackStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle phase of a stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackPhase {
    Absent,
    Creating,
    Created,
    Updating,
    Deleting,
    Failed,
}

impl StackPhase {
    pub fn of(snapshot: Option<&StackSnapshot>) -> StackPhase {
        snapshot.map_or(StackPhase::Absent, |s| s.status.phase())
    }
}

/// Stack operation being waited on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackOperation {
    Create,
    Update,
    Delete,
    /// Wait out an operation started by someone else; any terminal status
    /// is accepted.
    Settle,
}

impl StackOperation {
    /// The terminal status that counts as success
    pub fn success_status(&self) -> Option<StackStatus> {
        match self {
            StackOperation::Create => Some(StackStatus::CreateComplete),
            StackOperation::Update => Some(StackStatus::UpdateComplete),
            StackOperation::Delete => Some(StackStatus::DeleteComplete),
            StackOperation::Settle => None,
        }
    }
}

struct StackWatch<'a> {
    api: &'a dyn StackApi,
    stack_id: String,
    operation: StackOperation,
}

#[async_trait]
impl Poller for StackWatch<'_> {
    type State = StackStatus;

    async fn poll(&mut self) -> Result<Progress<StackStatus>> {
        match self.api.describe_stack(&self.stack_id).await? {
            Some(snapshot) if snapshot.status.is_in_progress() => {
                Ok(Progress::Pending(snapshot.status))
            }
            Some(snapshot) => Ok(Progress::Done(snapshot.status)),
            // A deleted stack may disappear from describe calls entirely.
            None if matches!(
                self.operation,
                StackOperation::Delete | StackOperation::Settle
            ) =>
            {
                Ok(Progress::Done(StackStatus::DeleteComplete))
            }
            None => Err(CloudError::NotFound(format!("stack {}", self.stack_id))),
        }
    }
}

/// Drives a customer stack to the desired state
pub struct StackReconciler<'a> {
    ctx: &'a Context,
    api: &'a dyn StackApi,
}

impl<'a> StackReconciler<'a> {
    pub fn new(ctx: &'a Context, api: &'a dyn StackApi) -> Self {
        Self { ctx, api }
    }

    /// Create the stack if it is absent, update it otherwise. An operation
    /// already in flight (e.g. from an interrupted earlier run) is waited
    /// out first. A stack left in `ROLLBACK_COMPLETE` by a failed create
    /// cannot be updated and is deleted and created again.
    pub async fn reconcile(&self, spec: &StackSpec) -> Result<StackStatus> {
        let current = self.settle(&spec.name).await?;
        match StackPhase::of(current.as_ref()) {
            StackPhase::Absent => self.create(spec).await,
            StackPhase::Created => self.update(spec).await,
            StackPhase::Failed => {
                let snapshot = current.ok_or_else(|| {
                    CloudError::NotFound(format!("stack {}", spec.name))
                })?;
                if snapshot.status == StackStatus::RollbackComplete {
                    tracing::warn!(
                        stack = %spec.name,
                        "Stack is in ROLLBACK_COMPLETE, recreating it"
                    );
                    self.delete(&snapshot.stack_id).await?;
                    self.create(spec).await
                } else {
                    Err(CloudError::StackReconciliationFailed {
                        stack_id: snapshot.stack_id,
                        status: snapshot.status,
                    })
                }
            }
            phase => Err(CloudError::Protocol(format!(
                "stack {} still {:?} after settling",
                spec.name, phase
            ))),
        }
    }

    /// Create the stack and wait for `CREATE_COMPLETE`.
    pub async fn create(&self, spec: &StackSpec) -> Result<StackStatus> {
        tracing::info!(stack = %spec.name, "Creating stack");
        let stack_id = self.ctx.run(self.api.create_stack(spec)).await??;
        self.wait(stack_id, StackOperation::Create).await
    }

    /// Update the stack and wait for `UPDATE_COMPLETE`. A stack that is
    /// already up to date counts as updated.
    pub async fn update(&self, spec: &StackSpec) -> Result<StackStatus> {
        tracing::info!(stack = %spec.name, "Updating stack");
        match self.ctx.run(self.api.update_stack(spec)).await?? {
            Some(stack_id) => self.wait(stack_id, StackOperation::Update).await,
            None => {
                tracing::info!(stack = %spec.name, "Stack is already up to date");
                Ok(StackStatus::UpdateComplete)
            }
        }
    }

    /// Delete the stack and wait for `DELETE_COMPLETE`. Deleting an absent
    /// stack succeeds immediately.
    pub async fn delete(&self, name: &str) -> Result<StackStatus> {
        let Some(snapshot) = self.settle(name).await? else {
            tracing::info!(stack = %name, "Stack already deleted");
            return Ok(StackStatus::DeleteComplete);
        };
        tracing::info!(stack = %name, "Deleting stack");
        self.ctx.run(self.api.delete_stack(&snapshot.stack_id)).await??;
        self.wait(snapshot.stack_id, StackOperation::Delete).await
    }

    /// Describe the stack, waiting for any in-flight operation to finish.
    /// A deleted stack is reported as absent.
    async fn settle(&self, name: &str) -> Result<Option<StackSnapshot>> {
        let Some(snapshot) = self.ctx.run(self.api.describe_stack(name)).await?? else {
            return Ok(None);
        };
        let snapshot = if snapshot.status.is_in_progress() {
            tracing::info!(
                stack = %name,
                status = %snapshot.status,
                "Waiting for in-flight stack operation"
            );
            let mut watch = StackWatch {
                api: self.api,
                stack_id: snapshot.stack_id.clone(),
                operation: StackOperation::Settle,
            };
            let status = drive(self.ctx, self.ctx.stack_poll(), &mut watch).await?;
            StackSnapshot {
                stack_id: snapshot.stack_id,
                status,
            }
        } else {
            snapshot
        };
        Ok((snapshot.status != StackStatus::DeleteComplete).then_some(snapshot))
    }

    async fn wait(&self, stack_id: String, operation: StackOperation) -> Result<StackStatus> {
        let mut watch = StackWatch {
            api: self.api,
            stack_id,
            operation,
        };
        let status = drive(self.ctx, self.ctx.stack_poll(), &mut watch).await?;
        match operation.success_status() {
            Some(expected) if status != expected => Err(CloudError::StackReconciliationFailed {
                stack_id: watch.stack_id,
                status,
            }),
            _ => {
                tracing::info!(stack_id = %watch.stack_id, %status, "Stack operation finished");
                Ok(status)
            }
        }
    }
}

/// What a stack URL returned by the control plane asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackIntent {
    /// `#/stack/update`: apply a new template to the stack
    Update,
    /// `#/stack/detail`: the stack is no longer needed as-is; delete it when
    /// no feature uses it anymore
    Delete,
}

/// Stack URL parsed from a control plane response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackUrl {
    pub intent: StackIntent,
    pub stack_id: String,
    pub template_url: Option<String>,
    /// Template parameters, from `param_<Key>=<value>` query entries
    pub parameters: Vec<(String, String)>,
}

impl StackUrl {
    /// Spec for updating the stack to the template named in the URL
    pub fn update_spec(&self) -> Option<StackSpec> {
        let template_url = self.template_url.as_ref()?;
        Some(StackSpec {
            name: self.stack_id.clone(),
            template_url: template_url.clone(),
            parameters: self.parameters.clone(),
        })
    }
}

const UPDATE_MARKER: &str = "#/stack/update";
const DETAIL_MARKER: &str = "#/stack/detail";

/// Parse a CloudFormation console URL such as
/// `https://console.aws.amazon.com/cloudformation/home#/stack/update?stackId=X&templateURL=Y`.
pub fn parse_stack_url(url: &str) -> Result<StackUrl> {
    let (intent, rest) = if let Some(i) = url.find(UPDATE_MARKER) {
        (StackIntent::Update, &url[i + UPDATE_MARKER.len()..])
    } else if let Some(i) = url.find(DETAIL_MARKER) {
        (StackIntent::Delete, &url[i + DETAIL_MARKER.len()..])
    } else {
        return Err(CloudError::InvalidStackUrl(format!(
            "CloudFormation url does not contain {UPDATE_MARKER} or {DETAIL_MARKER}: {url}"
        )));
    };

    let query = rest.split_once('?').map_or("", |(_, q)| q);
    let mut stack_id = None;
    let mut template_url = None;
    let mut parameters = Vec::new();
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        match key.as_ref() {
            "stackId" => stack_id = Some(value.into_owned()),
            "templateURL" => template_url = Some(value.into_owned()),
            k => {
                if let Some(name) = k.strip_prefix("param_") {
                    parameters.push((name.to_string(), value.into_owned()));
                }
            }
        }
    }

    let stack_id = stack_id.filter(|id| !id.is_empty()).ok_or_else(|| {
        CloudError::InvalidStackUrl(format!("CloudFormation url does not contain stackId: {url}"))
    })?;

    Ok(StackUrl {
        intent,
        stack_id,
        template_url: template_url.filter(|t| !t.is_empty()),
        parameters,
    })
}
