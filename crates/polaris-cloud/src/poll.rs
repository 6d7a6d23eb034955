//! Poll driver
//!
//! Remote operations that take minutes (stack operations, async jobs) are
//! modelled as a [`Poller`] that reports one observation per call. [`drive`]
//! owns the loop: sleeping, cancellation and the deadline all live here, so
//! pollers stay plain state machines that tests can script.

use crate::context::{Context, PollSettings};
use crate::error::Result;
use async_trait::async_trait;

/// One observation of a remote operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress<S> {
    /// Still running
    Pending(S),
    /// Reached a terminal state
    Done(S),
}

#[async_trait]
pub trait Poller: Send {
    type State: std::fmt::Debug + Send;

    /// Observe the operation once.
    async fn poll(&mut self) -> Result<Progress<Self::State>>;
}

/// Poll until the operation reaches a terminal state.
///
/// Returns `Cancelled` or `DeadlineExceeded` as soon as the context says so,
/// including while a poll is in flight. Nothing is done to stop the remote
/// operation in that case.
pub async fn drive<P: Poller>(
    ctx: &Context,
    settings: &PollSettings,
    poller: &mut P,
) -> Result<P::State> {
    let mut polls = 0u32;
    loop {
        polls += 1;
        match ctx.run(poller.poll()).await?? {
            Progress::Done(state) => {
                tracing::debug!(?state, polls, "Remote operation finished");
                return Ok(state);
            }
            Progress::Pending(state) => {
                tracing::debug!(?state, polls, "Remote operation in progress");
            }
        }
        ctx.sleep(settings.next_delay()).await?;
    }
}
