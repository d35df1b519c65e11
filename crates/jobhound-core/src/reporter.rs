use crate::error::{AppError, CancelCause};
use crate::models::RunStats;

/// Events emitted by the engine, its workers and the rate limiter.
#[derive(Debug, Clone)]
pub enum ScrapeEvent<'a> {
    SourceRegistered {
        source: &'a str,
    },
    RunStarted {
        query: &'a str,
        workers: usize,
        sources: usize,
    },
    WorkerStarted {
        worker_id: usize,
    },
    SourceStarted {
        worker_id: usize,
        source: &'a str,
    },
    SourceCompleted {
        worker_id: usize,
        source: &'a str,
        postings: usize,
    },
    SourceFailed {
        worker_id: usize,
        error: &'a AppError,
    },
    ErrorRecorded {
        error: &'a AppError,
    },
    /// A worker had an error to record but the error collector was gone.
    ErrorDropped {
        worker_id: usize,
        error: &'a AppError,
    },
    WorkerStopped {
        worker_id: usize,
    },
    RunCompleted {
        stats: &'a RunStats,
    },
    RunCancelled {
        cause: CancelCause,
    },
    LimiterRefilled {
        tokens: u32,
    },
    LimiterStopped,
    ShuttingDown,
}

impl ScrapeEvent<'_> {
    /// Short stable name, handy for assertions and metrics labels.
    pub fn label(&self) -> &'static str {
        match self {
            ScrapeEvent::SourceRegistered { .. } => "SourceRegistered",
            ScrapeEvent::RunStarted { .. } => "RunStarted",
            ScrapeEvent::WorkerStarted { .. } => "WorkerStarted",
            ScrapeEvent::SourceStarted { .. } => "SourceStarted",
            ScrapeEvent::SourceCompleted { .. } => "SourceCompleted",
            ScrapeEvent::SourceFailed { .. } => "SourceFailed",
            ScrapeEvent::ErrorRecorded { .. } => "ErrorRecorded",
            ScrapeEvent::ErrorDropped { .. } => "ErrorDropped",
            ScrapeEvent::WorkerStopped { .. } => "WorkerStopped",
            ScrapeEvent::RunCompleted { .. } => "RunCompleted",
            ScrapeEvent::RunCancelled { .. } => "RunCancelled",
            ScrapeEvent::LimiterRefilled { .. } => "LimiterRefilled",
            ScrapeEvent::LimiterStopped => "LimiterStopped",
            ScrapeEvent::ShuttingDown => "ShuttingDown",
        }
    }
}

/// Trait for receiving scrape events (decoupled logging).
///
/// Handed to each component at construction instead of logging through a
/// process-wide logger.
pub trait ScrapeReporter: Send + Sync {
    fn report(&self, event: ScrapeEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentReporter;

impl ScrapeReporter for SilentReporter {}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ScrapeReporter for TracingReporter {
    fn report(&self, event: ScrapeEvent<'_>) {
        match event {
            ScrapeEvent::SourceRegistered { source } => {
                tracing::info!(%source, "Registered scraper source");
            }
            ScrapeEvent::RunStarted {
                query,
                workers,
                sources,
            } => {
                tracing::info!(%query, %workers, %sources, "Starting scraper engine");
            }
            ScrapeEvent::WorkerStarted { worker_id } => {
                tracing::debug!(%worker_id, "Worker started");
            }
            ScrapeEvent::SourceStarted { worker_id, source } => {
                tracing::info!(%worker_id, %source, "Scraping source");
            }
            ScrapeEvent::SourceCompleted {
                worker_id,
                source,
                postings,
            } => {
                tracing::info!(%worker_id, %source, %postings, "Source scraped");
            }
            ScrapeEvent::SourceFailed { worker_id, error } => {
                tracing::warn!(%worker_id, %error, "Source failed");
            }
            ScrapeEvent::ErrorRecorded { error } => {
                tracing::error!(%error, "Scraper error");
            }
            ScrapeEvent::ErrorDropped { worker_id, error } => {
                tracing::debug!(%worker_id, %error, "Error collector closed, dropping error");
            }
            ScrapeEvent::WorkerStopped { worker_id } => {
                tracing::debug!(%worker_id, "Worker stopped");
            }
            ScrapeEvent::RunCompleted { stats } => {
                let duration_ms = stats.duration().map(|d| d.as_millis()).unwrap_or_default();
                tracing::info!(
                    jobs = %stats.jobs_scraped,
                    errors = %stats.errors,
                    %duration_ms,
                    "Scraping completed"
                );
            }
            ScrapeEvent::RunCancelled { cause } => {
                tracing::warn!(%cause, "Scraping run aborted");
            }
            ScrapeEvent::LimiterRefilled { tokens } => {
                tracing::trace!(%tokens, "Rate limiter refilled");
            }
            ScrapeEvent::LimiterStopped => {
                tracing::debug!("Rate limiter stopped");
            }
            ScrapeEvent::ShuttingDown => {
                tracing::info!("Shutting down scraper engine");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_distinct() {
        let err = AppError::Generic("x".into());
        let stats = RunStats::default();
        let events = [
            ScrapeEvent::SourceRegistered { source: "a" },
            ScrapeEvent::RunStarted {
                query: "q",
                workers: 1,
                sources: 1,
            },
            ScrapeEvent::WorkerStarted { worker_id: 0 },
            ScrapeEvent::SourceStarted {
                worker_id: 0,
                source: "a",
            },
            ScrapeEvent::SourceCompleted {
                worker_id: 0,
                source: "a",
                postings: 2,
            },
            ScrapeEvent::SourceFailed {
                worker_id: 0,
                error: &err,
            },
            ScrapeEvent::ErrorRecorded { error: &err },
            ScrapeEvent::ErrorDropped {
                worker_id: 0,
                error: &err,
            },
            ScrapeEvent::WorkerStopped { worker_id: 0 },
            ScrapeEvent::RunCompleted { stats: &stats },
            ScrapeEvent::RunCancelled {
                cause: CancelCause::Cancelled,
            },
            ScrapeEvent::LimiterRefilled { tokens: 3 },
            ScrapeEvent::LimiterStopped,
            ScrapeEvent::ShuttingDown,
        ];
        let mut labels: Vec<_> = events.iter().map(ScrapeEvent::label).collect();
        labels.sort_unstable();
        labels.dedup();
        assert_eq!(labels.len(), events.len());
    }
}
