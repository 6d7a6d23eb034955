//! Async job waiter
//!
//! Disable jobs run as task chains inside the control plane. They are
//! created by a remote call, polled to a terminal state and then forgotten.

use crate::context::{Context, PollSettings};
use crate::error::Result;
use crate::poll::{Poller, Progress, drive};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// State of a control plane job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Ready,
    Running,
    Canceling,
    Canceled,
    Failed,
    Succeeded,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Canceled | JobState::Failed | JobState::Succeeded
        )
    }

    pub fn from_remote(state: &str) -> Option<JobState> {
        match state.to_ascii_uppercase().as_str() {
            "READY" => Some(JobState::Ready),
            "RUNNING" => Some(JobState::Running),
            "CANCELING" => Some(JobState::Canceling),
            "CANCELED" => Some(JobState::Canceled),
            "FAILED" => Some(JobState::Failed),
            "SUCCEEDED" => Some(JobState::Succeeded),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Ready => write!(f, "ready"),
            JobState::Running => write!(f, "running"),
            JobState::Canceling => write!(f, "canceling"),
            JobState::Canceled => write!(f, "canceled"),
            JobState::Failed => write!(f, "failed"),
            JobState::Succeeded => write!(f, "succeeded"),
        }
    }
}

/// An async job being observed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AsyncJob {
    pub id: Uuid,
    pub state: JobState,
}

struct JobWatch<'a> {
    ctx: &'a Context,
    id: Uuid,
}

#[async_trait]
impl Poller for JobWatch<'_> {
    type State = AsyncJob;

    async fn poll(&mut self) -> Result<Progress<AsyncJob>> {
        let state = self.ctx.control_plane().job_state(self.id).await?;
        let job = AsyncJob { id: self.id, state };
        Ok(if state.is_terminal() {
            Progress::Done(job)
        } else {
            Progress::Pending(job)
        })
    }
}

/// Waits for control plane jobs to finish
pub struct JobWaiter<'a> {
    ctx: &'a Context,
}

impl<'a> JobWaiter<'a> {
    pub fn new(ctx: &'a Context) -> Self {
        Self { ctx }
    }

    /// Wait for the job using the context's job poll settings.
    pub async fn wait_for(&self, job_id: Uuid) -> Result<JobState> {
        self.wait_with(job_id, self.ctx.job_poll()).await
    }

    /// Wait for the job, polling with the given settings. Returns the
    /// terminal state; callers decide whether anything but `Succeeded` is
    /// an error.
    pub async fn wait_with(&self, job_id: Uuid, settings: &PollSettings) -> Result<JobState> {
        tracing::info!(%job_id, "Waiting for job");
        let mut watch = JobWatch {
            ctx: self.ctx,
            id: job_id,
        };
        let job = drive(self.ctx, settings, &mut watch).await?;
        tracing::info!(%job_id, state = %job.state, "Job finished");
        Ok(job.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CloudError;
    use crate::testing::FakeControlPlane;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_succeeded() {
        let cp = Arc::new(FakeControlPlane::new());
        let job = cp.script_job([JobState::Ready, JobState::Running, JobState::Succeeded]);
        let ctx = Context::new(cp.clone());

        let state = JobWaiter::new(&ctx).wait_for(job).await.unwrap();
        assert_eq!(state, JobState::Succeeded);
        assert_eq!(cp.job_polls(job), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_and_canceled_are_terminal() {
        let cp = Arc::new(FakeControlPlane::new());
        let failed = cp.script_job([JobState::Running, JobState::Failed]);
        let canceled = cp.script_job([JobState::Canceling, JobState::Canceled]);
        let ctx = Context::new(cp.clone());
        let waiter = JobWaiter::new(&ctx);

        assert_eq!(waiter.wait_for(failed).await.unwrap(), JobState::Failed);
        assert_eq!(waiter.wait_for(canceled).await.unwrap(), JobState::Canceled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_running() {
        let cp = Arc::new(FakeControlPlane::new());
        let job = cp.script_job([JobState::Running]);
        let ctx = Context::new(cp.clone());
        let token = ctx.cancellation_token().clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(15)).await;
            token.cancel();
        });

        let err = JobWaiter::new(&ctx)
            .wait_with(job, &PollSettings::new(Duration::from_secs(10)))
            .await
            .unwrap_err();
        assert!(matches!(err, CloudError::Cancelled));
        assert_eq!(cp.job_polls(job), 2);
    }

    #[test]
    fn test_remote_states() {
        assert_eq!(JobState::from_remote("SUCCEEDED"), Some(JobState::Succeeded));
        assert_eq!(JobState::from_remote("running"), Some(JobState::Running));
        assert_eq!(JobState::from_remote("UNDOING"), None);
        assert!(!JobState::Canceling.is_terminal());
    }
}
