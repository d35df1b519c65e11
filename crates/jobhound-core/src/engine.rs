//! Scrape orchestrator: fans a query out to every registered source.
//!
//! ```text
//!                 ┌──────────── WorkQueue (registry snapshot) ────────────┐
//!                 ▼                         ▼                             ▼
//!             worker 0                  worker 1        ...          worker W-1
//!          acquire token             acquire token                 acquire token
//!          source.scrape             source.scrape                 source.scrape
//!                 │                         │                             │
//!                 ├──── postings (bounded mpsc) ──▶ posting collector ──▶ result set
//!                 └──── errors   (bounded mpsc) ──▶ error collector   ──▶ stats.errors
//! ```
//!
//! Both channels close when the last worker exits and drops its senders,
//! which lets the collectors finish. A run ends `Completed` once workers and
//! collectors are done, or `Cancelled` as soon as the caller's context is;
//! in that case `start` returns the cancellation error straight away and
//! postings not yet collected are discarded.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::config::EngineConfig;
use crate::context::RunContext;
use crate::error::{AppError, CancelCause};
use crate::models::{Posting, RunState, RunStats};
use crate::rate_limit::RateLimiter;
use crate::reporter::{ScrapeEvent, ScrapeReporter, TracingReporter};
use crate::traits::Source;
use crate::util::lock_or_recover;
use crate::worker::{WorkQueue, Worker};

/// Lock-guarded run statistics. The lock never escapes this type.
#[derive(Default)]
struct StatsCell {
    inner: Mutex<RunStats>,
}

impl StatsCell {
    fn begin(&self) {
        *lock_or_recover(&self.inner) = RunStats {
            started_at: Some(Utc::now()),
            ..RunStats::default()
        };
    }

    fn record_posting(&self) {
        lock_or_recover(&self.inner).jobs_scraped += 1;
    }

    fn record_error(&self) {
        lock_or_recover(&self.inner).errors += 1;
    }

    fn finish(&self) -> RunStats {
        let mut stats = lock_or_recover(&self.inner);
        stats.finished_at = Some(Utc::now());
        stats.clone()
    }

    fn snapshot(&self) -> RunStats {
        lock_or_recover(&self.inner).clone()
    }
}

/// Held by `start` and every task it spawns; the engine accepts a new run
/// only after the last holder of the previous run is gone.
struct RunGuard {
    active: Arc<AtomicBool>,
}

impl RunGuard {
    fn try_acquire(active: &Arc<AtomicBool>) -> Option<Self> {
        active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self {
                active: Arc::clone(active),
            })
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
    }
}

/// The concurrent scraping engine.
///
/// Sources are registered up front; each [`start`](Self::start) scrapes all
/// of them with `config.workers` concurrent workers sharing one rate limiter.
/// Only one run may be in flight at a time.
pub struct Engine {
    config: EngineConfig,
    sources: Vec<Arc<dyn Source>>,
    limiter: Arc<RateLimiter>,
    reporter: Arc<dyn ScrapeReporter>,
    stats: Arc<StatsCell>,
    state: Mutex<RunState>,
    last_errors: Arc<Mutex<Vec<String>>>,
    active: Arc<AtomicBool>,
}

impl Engine {
    /// Create an engine that logs through `tracing`.
    ///
    /// Must be called inside a Tokio runtime (the rate limiter spawns its
    /// refill task).
    pub fn new(config: EngineConfig) -> Result<Self, AppError> {
        Self::with_reporter(config, Arc::new(TracingReporter))
    }

    pub fn with_reporter(
        config: EngineConfig,
        reporter: Arc<dyn ScrapeReporter>,
    ) -> Result<Self, AppError> {
        config.validate()?;
        let limiter = RateLimiter::with_options(
            config.rate_limit,
            config.poll_interval,
            Arc::clone(&reporter),
        );
        Ok(Self {
            config,
            sources: Vec::new(),
            limiter: Arc::new(limiter),
            reporter,
            stats: Arc::new(StatsCell::default()),
            state: Mutex::new(RunState::Idle),
            last_errors: Arc::new(Mutex::new(Vec::new())),
            active: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Append a source to the registry.
    ///
    /// Names are not required to be unique: two sources with the same name
    /// are both scraped, and their errors carry the same attribution.
    pub fn register_source(&mut self, source: Arc<dyn Source>) {
        self.reporter.report(ScrapeEvent::SourceRegistered {
            source: source.name(),
        });
        self.sources.push(source);
    }

    pub fn source_names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name().to_string()).collect()
    }

    /// Scrape every registered source for `query`.
    ///
    /// Returns all collected postings once every worker and both collectors
    /// are done. If `ctx` is cancelled or times out first, returns
    /// [`AppError::Cancelled`] immediately; postings produced by that run
    /// are dropped, while `stats()` keeps whatever was counted so far.
    ///
    /// Fails with [`AppError::ShutDown`] once [`shutdown`](Self::shutdown)
    /// has been called.
    pub async fn start(&self, ctx: &RunContext, query: &str) -> Result<Vec<Posting>, AppError> {
        if self.limiter.is_stopped() {
            return Err(AppError::ShutDown);
        }
        let guard = Arc::new(RunGuard::try_acquire(&self.active).ok_or(AppError::RunInProgress)?);

        self.stats.begin();
        self.set_state(RunState::Running);
        lock_or_recover(&self.last_errors).clear();

        self.reporter.report(ScrapeEvent::RunStarted {
            query,
            workers: self.config.workers,
            sources: self.sources.len(),
        });

        let queue = Arc::new(WorkQueue::new(self.sources.iter().cloned()));
        let (posting_tx, posting_rx) = mpsc::channel(self.config.posting_buffer);
        let (error_tx, error_rx) = mpsc::channel(self.config.error_buffer);

        let posting_collector = tokio::spawn(collect_postings(
            posting_rx,
            Arc::clone(&self.stats),
            Arc::clone(&guard),
        ));
        let error_collector = tokio::spawn(collect_errors(
            error_rx,
            Arc::clone(&self.stats),
            Arc::clone(&self.last_errors),
            Arc::clone(&self.reporter),
            Arc::clone(&guard),
        ));

        let query: Arc<str> = Arc::from(query);
        let mut workers = JoinSet::new();
        for worker_id in 0..self.config.workers {
            let worker = Worker::new(
                worker_id,
                Arc::clone(&query),
                Arc::clone(&queue),
                Arc::clone(&self.limiter),
                posting_tx.clone(),
                error_tx.clone(),
                Arc::clone(&self.reporter),
            );
            let worker_ctx = ctx.clone();
            let guard = Arc::clone(&guard);
            workers.spawn(async move {
                let _guard = guard;
                worker.run(worker_ctx).await;
            });
        }
        // Workers now own the only senders; channels close when they exit.
        drop(posting_tx);
        drop(error_tx);
        drop(guard);

        let cancelled = tokio::select! {
            biased;
            () = join_workers(&mut workers, self.reporter.as_ref()) => None,
            cause = ctx.done() => Some(cause),
        };

        if let Some(cause) = cancelled {
            // Workers observe the same context and unwind on their own.
            workers.detach_all();
            return Err(self.abort_run(cause));
        }

        let postings = posting_collector
            .await
            .map_err(|e| AppError::Generic(format!("posting collector failed: {e}")))?;
        error_collector
            .await
            .map_err(|e| AppError::Generic(format!("error collector failed: {e}")))?;

        let stats = self.stats.finish();
        self.set_state(RunState::Completed);
        self.reporter.report(ScrapeEvent::RunCompleted { stats: &stats });

        Ok(postings)
    }

    /// Snapshot of the current or most recent run's statistics.
    pub fn stats(&self) -> RunStats {
        self.stats.snapshot()
    }

    pub fn state(&self) -> RunState {
        *lock_or_recover(&self.state)
    }

    /// Messages of the errors recorded during the current or most recent run.
    pub fn last_errors(&self) -> Vec<String> {
        lock_or_recover(&self.last_errors).clone()
    }

    /// True while tasks of a run are still alive.
    pub fn is_busy(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Stop the rate limiter. Call after `start` has returned; calling it
    /// more than once is harmless.
    pub fn shutdown(&self) {
        if !self.limiter.is_stopped() {
            self.reporter.report(ScrapeEvent::ShuttingDown);
        }
        self.limiter.stop();
    }

    fn set_state(&self, state: RunState) {
        *lock_or_recover(&self.state) = state;
    }

    fn abort_run(&self, cause: CancelCause) -> AppError {
        self.set_state(RunState::Cancelled);
        self.reporter.report(ScrapeEvent::RunCancelled { cause });
        AppError::Cancelled(cause)
    }
}

async fn join_workers(workers: &mut JoinSet<()>, reporter: &dyn ScrapeReporter) {
    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            let error = AppError::Generic(format!("worker task failed: {e}"));
            reporter.report(ScrapeEvent::ErrorRecorded { error: &error });
        }
    }
}

async fn collect_postings(
    mut rx: mpsc::Receiver<Posting>,
    stats: Arc<StatsCell>,
    _guard: Arc<RunGuard>,
) -> Vec<Posting> {
    let mut postings = Vec::new();
    while let Some(posting) = rx.recv().await {
        postings.push(posting);
        stats.record_posting();
    }
    postings
}

async fn collect_errors(
    mut rx: mpsc::Receiver<AppError>,
    stats: Arc<StatsCell>,
    last_errors: Arc<Mutex<Vec<String>>>,
    reporter: Arc<dyn ScrapeReporter>,
    _guard: Arc<RunGuard>,
) {
    while let Some(error) = rx.recv().await {
        stats.record_error();
        reporter.report(ScrapeEvent::ErrorRecorded { error: &error });
        lock_or_recover(&last_errors).push(error.to_string());
    }
}
