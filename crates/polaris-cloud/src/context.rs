//! Per-process saga context
//!
//! Holds the collaborators and the cancellation/deadline discipline shared by
//! the orchestrator, the stack reconciler and the job waiter. Build one at
//! startup and pass it by reference; there is no global client.

use crate::control_plane::ControlPlane;
use crate::error::{CloudError, Result};
use crate::identity::IdentityResolver;
use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Default interval between two polls of a stack or an async job
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Polling cadence for one kind of remote operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Fixed interval between polls
    pub interval: Duration,

    /// Upper bound of the random delay added to every interval
    pub jitter: Duration,
}

impl PollSettings {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            jitter: Duration::ZERO,
        }
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before the next poll
    pub fn next_delay(&self) -> Duration {
        if self.jitter.is_zero() {
            return self.interval;
        }
        let jitter_ms = self.jitter.as_millis() as u64;
        self.interval + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

/// Saga context
#[derive(Clone)]
pub struct Context {
    control_plane: Arc<dyn ControlPlane>,
    identity_resolver: Option<Arc<dyn IdentityResolver>>,
    cancel: CancellationToken,
    deadline: Option<Instant>,
    stack_poll: PollSettings,
    job_poll: PollSettings,
}

impl Context {
    pub fn new(control_plane: Arc<dyn ControlPlane>) -> Self {
        Self {
            control_plane,
            identity_resolver: None,
            cancel: CancellationToken::new(),
            deadline: None,
            stack_poll: PollSettings::default(),
            job_poll: PollSettings::default(),
        }
    }

    pub fn with_identity_resolver(mut self, resolver: Arc<dyn IdentityResolver>) -> Self {
        self.identity_resolver = Some(resolver);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_stack_poll(mut self, settings: PollSettings) -> Self {
        self.stack_poll = settings;
        self
    }

    pub fn with_job_poll(mut self, settings: PollSettings) -> Self {
        self.job_poll = settings;
        self
    }

    /// Context for one saga invocation. Cancelling the parent cancels the
    /// child, not the other way round.
    pub fn child(&self) -> Context {
        Context {
            cancel: self.cancel.child_token(),
            ..self.clone()
        }
    }

    pub fn control_plane(&self) -> &dyn ControlPlane {
        self.control_plane.as_ref()
    }

    pub fn identity_resolver(&self) -> Option<&dyn IdentityResolver> {
        self.identity_resolver.as_deref()
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn stack_poll(&self) -> &PollSettings {
        &self.stack_poll
    }

    pub fn job_poll(&self) -> &PollSettings {
        &self.job_poll
    }

    /// Fail if the context is cancelled or past its deadline.
    pub fn checkpoint(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(CloudError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(CloudError::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    /// Sleep for `delay`, waking early on cancellation or deadline.
    pub async fn sleep(&self, delay: Duration) -> Result<()> {
        self.run(tokio::time::sleep(delay)).await
    }

    /// Run `fut` to completion unless the context is cancelled or its
    /// deadline passes first. The future is dropped in that case; whatever
    /// it started remotely keeps running.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output> {
        self.checkpoint()?;
        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };
        tokio::select! {
            _ = self.cancel.cancelled() => Err(CloudError::Cancelled),
            _ = deadline => Err(CloudError::DeadlineExceeded),
            out = fut => Ok(out),
        }
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("cancelled", &self.cancel.is_cancelled())
            .field("deadline", &self.deadline)
            .field("stack_poll", &self.stack_poll)
            .field("job_poll", &self.job_poll)
            .finish_non_exhaustive()
    }
}
