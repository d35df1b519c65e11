//! Test utilities: mock implementations of the core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! Recorded state sits behind `Arc<Mutex<_>>` (or atomics) so tests can
//! assert on it after the mock has been moved into an engine.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::context::RunContext;
use crate::error::AppError;
use crate::models::{EmploymentType, Posting, RawPosting};
use crate::reporter::{ScrapeEvent, ScrapeReporter};
use crate::traits::{PostingStore, Source};

// ---------------------------------------------------------------------------
// MockSource
// ---------------------------------------------------------------------------

/// Source that returns a fixed list of postings, or a fixed failure.
pub struct MockSource {
    name: String,
    postings: Vec<RawPosting>,
    failure: Option<String>,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
}

impl MockSource {
    pub fn new(name: &str, postings: Vec<RawPosting>) -> Self {
        Self {
            name: name.to_string(),
            postings,
            failure: None,
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Source whose every call fails with `AppError::HttpError(message)`.
    pub fn failing(name: &str, message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::new(name, Vec::new())
        }
    }

    /// Sleep before answering. The sleep ends early when the context does.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Shared call counter, readable after the source is moved.
    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl Source for MockSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn scrape(&self, ctx: &RunContext, _query: &str) -> Result<Vec<RawPosting>, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                cause = ctx.done() => return Err(AppError::Cancelled(cause)),
            }
        }

        match &self.failure {
            Some(message) => Err(AppError::HttpError(message.clone())),
            None => Ok(self.postings.clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// MockReporter
// ---------------------------------------------------------------------------

/// Reporter that records the label of every event it sees.
#[derive(Clone, Default)]
pub struct MockReporter {
    pub events: Arc<Mutex<Vec<String>>>,
}

impl MockReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn labels(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl ScrapeReporter for MockReporter {
    fn report(&self, event: ScrapeEvent<'_>) {
        self.events.lock().unwrap().push(event.label().to_string());
    }
}

// ---------------------------------------------------------------------------
// MockStore
// ---------------------------------------------------------------------------

/// Store that keeps one posting per fingerprint, like the real one.
#[derive(Clone)]
pub struct MockStore {
    pub saved: Arc<Mutex<Vec<Posting>>>,
    save_error: Arc<Mutex<Option<AppError>>>,
}

impl MockStore {
    pub fn empty() -> Self {
        Self {
            saved: Arc::new(Mutex::new(Vec::new())),
            save_error: Arc::new(Mutex::new(None)),
        }
    }

    /// Store whose next save fails with `error`.
    pub fn with_save_error(error: AppError) -> Self {
        Self {
            saved: Arc::new(Mutex::new(Vec::new())),
            save_error: Arc::new(Mutex::new(Some(error))),
        }
    }
}

impl PostingStore for MockStore {
    async fn save_batch(&self, postings: &[Posting]) -> Result<usize, AppError> {
        if let Some(e) = self.save_error.lock().unwrap().take() {
            return Err(e);
        }
        let mut saved = self.saved.lock().unwrap();
        for posting in postings {
            match saved
                .iter_mut()
                .find(|p| p.fingerprint() == posting.fingerprint())
            {
                Some(existing) => existing.scraped_at = posting.scraped_at,
                None => saved.push(posting.clone()),
            }
        }
        Ok(postings.len())
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn make_raw_posting(source: &str, title: &str, company: &str, location: &str) -> RawPosting {
    RawPosting {
        title: title.to_string(),
        company: company.to_string(),
        location: location.to_string(),
        salary: None,
        description: format!("{title} at {company}"),
        url: format!(
            "https://{source}.example.com/jobs/{}",
            title.to_lowercase().replace(' ', "-")
        ),
        source: source.to_string(),
        remote: location.eq_ignore_ascii_case("remote"),
        employment_type: EmploymentType::FullTime,
        posted_at: None,
    }
}
