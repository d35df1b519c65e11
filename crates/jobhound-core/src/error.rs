use std::fmt;

use thiserror::Error;

/// Why a [`RunContext`](crate::context::RunContext) stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelCause {
    /// The context (or one of its parents) was cancelled explicitly.
    Cancelled,
    /// The context's deadline elapsed.
    DeadlineExceeded,
}

impl CancelCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            CancelCause::Cancelled => "context cancelled",
            CancelCause::DeadlineExceeded => "deadline exceeded",
        }
    }
}

impl fmt::Display for CancelCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Application-wide error types for jobhound.
#[derive(Error, Debug)]
pub enum AppError {
    /// A single source adapter call failed. The run carries on.
    #[error("{source_name} scraper failed: {cause}")]
    SourceFailed {
        source_name: String,
        #[source]
        cause: Box<AppError>,
    },

    /// The context was cancelled while a worker waited for a rate-limit token.
    #[error("rate limiter wait for {source_name} aborted: {cause}")]
    RateLimitWait {
        source_name: String,
        cause: CancelCause,
    },

    /// The run-level context was cancelled or timed out.
    #[error("run aborted: {0}")]
    Cancelled(CancelCause),

    /// `start` was called while tasks from a previous run were still unwinding.
    #[error("a scrape run is already in progress")]
    RunInProgress,

    /// `start` was called after `shutdown`; the rate limiter no longer refills.
    #[error("engine has been shut down")]
    ShutDown,

    /// HTTP request against a job board failed.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// A board response could not be turned into postings.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Database operation failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

impl AppError {
    /// Wrap an adapter error with the name of the source that produced it.
    pub fn source_failed(source_name: impl Into<String>, cause: AppError) -> Self {
        AppError::SourceFailed {
            source_name: source_name.into(),
            cause: Box::new(cause),
        }
    }

    /// Returns true if this error means the whole run was cancelled.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, AppError::Cancelled(_))
    }

    /// The cancellation cause carried by this error, if any.
    pub fn cancel_cause(&self) -> Option<CancelCause> {
        match self {
            AppError::Cancelled(cause) | AppError::RateLimitWait { cause, .. } => Some(*cause),
            AppError::SourceFailed { cause, .. } => cause.cancel_cause(),
            _ => None,
        }
    }
}
