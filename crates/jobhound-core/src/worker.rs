use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::mpsc;

use crate::context::RunContext;
use crate::error::{AppError, CancelCause};
use crate::models::Posting;
use crate::rate_limit::RateLimiter;
use crate::reporter::{ScrapeEvent, ScrapeReporter};
use crate::traits::Source;
use crate::util::lock_or_recover;

/// Shared queue of sources for one run.
///
/// Filled once from the registry snapshot and never pushed to again, so an
/// empty queue is a closed queue.
pub struct WorkQueue {
    sources: Mutex<VecDeque<Arc<dyn Source>>>,
}

impl WorkQueue {
    pub fn new(sources: impl IntoIterator<Item = Arc<dyn Source>>) -> Self {
        Self {
            sources: Mutex::new(sources.into_iter().collect()),
        }
    }

    /// Next source to scrape, or `None` once the queue is drained.
    pub fn pop(&self) -> Option<Arc<dyn Source>> {
        lock_or_recover(&self.sources).pop_front()
    }

    pub fn len(&self) -> usize {
        lock_or_recover(&self.sources).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One worker of the pool: drains the shared queue, one source at a time.
///
/// Results and errors leave the worker only through the two channels; when
/// the worker returns, its senders are dropped.
pub struct Worker {
    id: usize,
    query: Arc<str>,
    queue: Arc<WorkQueue>,
    limiter: Arc<RateLimiter>,
    postings: mpsc::Sender<Posting>,
    errors: mpsc::Sender<AppError>,
    reporter: Arc<dyn ScrapeReporter>,
}

impl Worker {
    pub fn new(
        id: usize,
        query: Arc<str>,
        queue: Arc<WorkQueue>,
        limiter: Arc<RateLimiter>,
        postings: mpsc::Sender<Posting>,
        errors: mpsc::Sender<AppError>,
        reporter: Arc<dyn ScrapeReporter>,
    ) -> Self {
        Self {
            id,
            query,
            queue,
            limiter,
            postings,
            errors,
            reporter,
        }
    }

    /// Run until the queue is drained or the context is done.
    pub async fn run(self, ctx: RunContext) {
        self.reporter.report(ScrapeEvent::WorkerStarted { worker_id: self.id });

        while let Some(source) = self.queue.pop() {
            if ctx.is_done() {
                break;
            }
            if !self.process_source(&ctx, source.as_ref()).await {
                break;
            }
        }

        self.reporter.report(ScrapeEvent::WorkerStopped { worker_id: self.id });
    }

    /// Scrape one source and forward its postings.
    ///
    /// Returns false when the worker should stop: the context ended while
    /// forwarding, or the collector went away.
    async fn process_source(&self, ctx: &RunContext, source: &dyn Source) -> bool {
        let name = source.name();
        self.reporter.report(ScrapeEvent::SourceStarted {
            worker_id: self.id,
            source: name,
        });

        if let Err(e) = self.limiter.acquire(ctx).await {
            let cause = e.cancel_cause().unwrap_or(CancelCause::Cancelled);
            self.record_error(AppError::RateLimitWait {
                source_name: name.to_string(),
                cause,
            })
            .await;
            return true;
        }

        let result = tokio::select! {
            biased;
            result = source.scrape(ctx, &self.query) => result,
            cause = ctx.done() => Err(AppError::Cancelled(cause)),
        };

        let raw_postings = match result {
            Ok(raw) => raw,
            Err(e) => {
                let error = AppError::source_failed(name, e);
                self.reporter.report(ScrapeEvent::SourceFailed {
                    worker_id: self.id,
                    error: &error,
                });
                self.record_error(error).await;
                return true;
            }
        };

        let count = raw_postings.len();
        for raw in raw_postings {
            if ctx.is_done() {
                return false;
            }
            let posting = Posting::from_raw(raw, Utc::now());
            tokio::select! {
                biased;
                sent = self.postings.send(posting) => {
                    if sent.is_err() {
                        return false;
                    }
                }
                _ = ctx.done() => return false,
            }
        }

        self.reporter.report(ScrapeEvent::SourceCompleted {
            worker_id: self.id,
            source: name,
            postings: count,
        });
        true
    }

    async fn record_error(&self, error: AppError) {
        if let Err(mpsc::error::SendError(error)) = self.errors.send(error).await {
            self.reporter.report(ScrapeEvent::ErrorDropped {
                worker_id: self.id,
                error: &error,
            });
        }
    }
}
