//! Cancellation scope shared by everything taking part in a scrape run.
//!
//! A [`RunContext`] couples a [`CancellationToken`] with an optional
//! deadline. Child contexts are cancelled together with their parent and
//! inherit the tighter of the two deadlines.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, CancelCause};

#[derive(Debug, Clone, Default)]
pub struct RunContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl RunContext {
    /// A context that is never done until [`cancel`](Self::cancel) is called.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing token, e.g. one tied to Ctrl-C handling.
    pub fn from_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Set a deadline `timeout` from now, keeping an earlier one if present.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    /// Derive a context cancelled by this one but cancellable on its own.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Non-blocking check. Explicit cancellation wins over an elapsed deadline.
    pub fn cause(&self) -> Option<CancelCause> {
        if self.token.is_cancelled() {
            return Some(CancelCause::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(CancelCause::DeadlineExceeded),
            _ => None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.cause().is_some()
    }

    /// `Err(AppError::Cancelled)` if the context is already done.
    pub fn check(&self) -> Result<(), AppError> {
        match self.cause() {
            Some(cause) => Err(AppError::Cancelled(cause)),
            None => Ok(()),
        }
    }

    /// Resolve once the context is cancelled or its deadline passes.
    pub async fn done(&self) -> CancelCause {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    () = self.token.cancelled() => CancelCause::Cancelled,
                    () = tokio::time::sleep_until(deadline) => CancelCause::DeadlineExceeded,
                }
            }
            None => {
                self.token.cancelled().await;
                CancelCause::Cancelled
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_context_is_not_done() {
        let ctx = RunContext::new();
        assert!(!ctx.is_done());
        assert!(ctx.check().is_ok());
        assert!(ctx.deadline().is_none());
    }

    #[tokio::test]
    async fn cancel_is_observed_by_children() {
        let parent = RunContext::new();
        let child = parent.child();
        parent.cancel();
        assert_eq!(child.cause(), Some(CancelCause::Cancelled));
        assert_eq!(child.done().await, CancelCause::Cancelled);
    }

    #[tokio::test]
    async fn cancelling_child_leaves_parent_running() {
        let parent = RunContext::new();
        let child = parent.child();
        child.cancel();
        assert!(child.is_done());
        assert!(!parent.is_done());
    }

    #[tokio::test]
    async fn deadline_resolves_done() {
        let ctx = RunContext::new().with_timeout(Duration::from_millis(50));
        assert!(!ctx.is_done());
        assert_eq!(ctx.done().await, CancelCause::DeadlineExceeded);
        assert!(matches!(
            ctx.check(),
            Err(AppError::Cancelled(CancelCause::DeadlineExceeded))
        ));
    }

    #[tokio::test]
    async fn earlier_deadline_wins() {
        let ctx = RunContext::new()
            .with_timeout(Duration::from_millis(10))
            .with_timeout(Duration::from_secs(60));
        let deadline = ctx.deadline().unwrap();
        assert!(deadline <= Instant::now() + Duration::from_millis(10));
    }

    #[tokio::test]
    async fn explicit_cancel_takes_priority_over_deadline() {
        let ctx = RunContext::new().with_timeout(Duration::ZERO);
        ctx.cancel();
        assert_eq!(ctx.cause(), Some(CancelCause::Cancelled));
    }
}
