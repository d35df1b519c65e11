//! Token-bucket rate limiting shared by all workers of an engine.
//!
//! The bucket holds up to `capacity` tokens. A single background task resets
//! it to full capacity once per [`REFILL_INTERVAL`] (a full reset, not an
//! incremental trickle), so callers get bursts of at most `capacity` calls
//! per second.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use jobhound_core::context::RunContext;
//! use jobhound_core::rate_limit::RateLimiter;
//!
//! # async fn run() -> Result<(), jobhound_core::AppError> {
//! let limiter = RateLimiter::new(10);
//! let ctx = RunContext::new().with_timeout(Duration::from_secs(5));
//! limiter.acquire(&ctx).await?;
//! limiter.stop();
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::context::RunContext;
use crate::error::AppError;
use crate::reporter::{ScrapeEvent, ScrapeReporter, SilentReporter};
use crate::util::lock_or_recover;

/// How often the bucket is reset to full capacity.
pub const REFILL_INTERVAL: Duration = Duration::from_secs(1);

/// Sleep between `try_acquire` attempts while the bucket is empty.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Token bucket refilled by full reset on a fixed cadence.
///
/// Shared between workers behind an `Arc`. The token count sits behind its
/// own mutex, held only for the read-modify-write.
pub struct RateLimiter {
    capacity: u32,
    tokens: Arc<Mutex<u32>>,
    poll_interval: Duration,
    /// Cancelling this token ends the refill task.
    stop_token: CancellationToken,
    stopped: AtomicBool,
    reporter: Arc<dyn ScrapeReporter>,
}

impl RateLimiter {
    /// Create a limiter allowing `capacity` acquisitions per second.
    ///
    /// Spawns the refill task, so it must be called inside a Tokio runtime.
    pub fn new(capacity: u32) -> Self {
        Self::with_options(capacity, DEFAULT_POLL_INTERVAL, Arc::new(SilentReporter))
    }

    pub fn with_options(
        capacity: u32,
        poll_interval: Duration,
        reporter: Arc<dyn ScrapeReporter>,
    ) -> Self {
        let tokens = Arc::new(Mutex::new(capacity));
        let stop_token = CancellationToken::new();

        tokio::spawn(refill_loop(
            capacity,
            Arc::clone(&tokens),
            stop_token.clone(),
            Arc::clone(&reporter),
        ));

        Self {
            capacity,
            tokens,
            poll_interval,
            stop_token,
            stopped: AtomicBool::new(false),
            reporter,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Tokens left in the current refill window.
    pub fn available(&self) -> u32 {
        *lock_tokens(&self.tokens)
    }

    /// Wait for a token, or fail with the context's cancellation cause.
    ///
    /// Polls every `poll_interval` while the bucket is empty and returns
    /// within one interval of the context being cancelled.
    pub async fn acquire(&self, ctx: &RunContext) -> Result<(), AppError> {
        loop {
            ctx.check()?;
            if self.try_acquire() {
                return Ok(());
            }
            tokio::select! {
                () = tokio::time::sleep(self.poll_interval) => {}
                cause = ctx.done() => return Err(AppError::Cancelled(cause)),
            }
        }
    }

    /// Take a token without blocking. Returns false if the bucket is empty.
    pub fn try_acquire(&self) -> bool {
        let mut tokens = lock_tokens(&self.tokens);
        if *tokens > 0 {
            *tokens -= 1;
            true
        } else {
            false
        }
    }

    /// Stop the refill task. Safe to call more than once, from any task.
    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::AcqRel) {
            self.stop_token.cancel();
            self.reporter.report(ScrapeEvent::LimiterStopped);
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        self.stop_token.cancel();
    }
}

fn lock_tokens(tokens: &Mutex<u32>) -> MutexGuard<'_, u32> {
    lock_or_recover(tokens)
}

async fn refill_loop(
    capacity: u32,
    tokens: Arc<Mutex<u32>>,
    stop_token: CancellationToken,
    reporter: Arc<dyn ScrapeReporter>,
) {
    // First tick one full interval after construction; the bucket starts full.
    let start = tokio::time::Instant::now() + REFILL_INTERVAL;
    let mut ticker = tokio::time::interval_at(start, REFILL_INTERVAL);

    loop {
        tokio::select! {
            () = stop_token.cancelled() => break,
            _ = ticker.tick() => {
                *lock_tokens(&tokens) = capacity;
                reporter.report(ScrapeEvent::LimiterRefilled { tokens: capacity });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::error::CancelCause;
    use crate::testutil::MockReporter;

    #[tokio::test]
    async fn burst_up_to_capacity_does_not_block() {
        let limiter = RateLimiter::new(10);
        let ctx = RunContext::new();

        let start = Instant::now();
        for _ in 0..10 {
            limiter.acquire(&ctx).await.unwrap();
        }
        let elapsed = start.elapsed();

        assert!(
            elapsed < Duration::from_millis(100),
            "Expected fast acquisition, took {elapsed:?}"
        );
        assert_eq!(limiter.available(), 0);
        limiter.stop();
    }

    #[tokio::test]
    async fn acquire_past_capacity_waits_for_refill() {
        let limiter = RateLimiter::new(3);
        let ctx = RunContext::new();
        for _ in 0..3 {
            limiter.acquire(&ctx).await.unwrap();
        }

        let start = Instant::now();
        limiter.acquire(&ctx).await.unwrap();
        let elapsed = start.elapsed();

        assert!(
            elapsed >= Duration::from_millis(900),
            "Expected to wait ~1s for refill, waited {elapsed:?}"
        );
        // Full reset: the bucket was refilled to 3 and we took one.
        assert_eq!(limiter.available(), 2);
        limiter.stop();
    }

    #[tokio::test]
    async fn cancelled_context_returns_promptly() {
        let limiter = RateLimiter::new(1);
        let ctx = RunContext::new();
        limiter.acquire(&ctx).await.unwrap();

        let cancelled = RunContext::new();
        cancelled.cancel();

        let start = Instant::now();
        let err = limiter.acquire(&cancelled).await.unwrap_err();
        assert!(matches!(err, AppError::Cancelled(CancelCause::Cancelled)));
        assert!(start.elapsed() < Duration::from_millis(50));
        limiter.stop();
    }

    #[tokio::test]
    async fn cancelled_context_fails_even_with_tokens_left() {
        let limiter = RateLimiter::new(5);
        let ctx = RunContext::new();
        ctx.cancel();

        assert!(limiter.acquire(&ctx).await.is_err());
        assert_eq!(limiter.available(), 5);
        limiter.stop();
    }

    #[tokio::test]
    async fn waiting_acquire_observes_deadline() {
        let limiter = RateLimiter::new(1);
        assert!(limiter.try_acquire());

        let ctx = RunContext::new().with_timeout(Duration::from_millis(100));
        let start = Instant::now();
        let err = limiter.acquire(&ctx).await.unwrap_err();
        let elapsed = start.elapsed();

        assert!(matches!(
            err,
            AppError::Cancelled(CancelCause::DeadlineExceeded)
        ));
        assert!(
            elapsed < Duration::from_millis(500),
            "Expected to give up near the deadline, waited {elapsed:?}"
        );
        limiter.stop();
    }

    #[tokio::test]
    async fn refill_resets_to_capacity() {
        let limiter = RateLimiter::new(2);
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());

        tokio::time::sleep(REFILL_INTERVAL + Duration::from_millis(100)).await;
        assert_eq!(limiter.available(), 2);
        limiter.stop();
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_reported_once() {
        let reporter = Arc::new(MockReporter::new());
        let limiter = RateLimiter::with_options(1, DEFAULT_POLL_INTERVAL, reporter.clone());

        limiter.stop();
        limiter.stop();

        assert!(limiter.is_stopped());
        let events = reporter.events.lock().unwrap();
        assert_eq!(events.iter().filter(|e| *e == "LimiterStopped").count(), 1);
    }

    #[tokio::test]
    async fn stopped_limiter_no_longer_refills() {
        let limiter = RateLimiter::new(1);
        assert!(limiter.try_acquire());
        limiter.stop();

        tokio::time::sleep(REFILL_INTERVAL + Duration::from_millis(100)).await;
        assert_eq!(limiter.available(), 0);
    }
}
