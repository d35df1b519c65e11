pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod models;
pub mod rate_limit;
pub mod reporter;
pub mod traits;
pub mod util;
pub mod worker;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use config::EngineConfig;
pub use context::RunContext;
pub use engine::Engine;
pub use error::{AppError, CancelCause};
pub use models::{
    EmploymentType, Posting, RawPosting, RunState, RunStats, compute_hash, dedupe_by_fingerprint,
    fingerprint,
};
pub use rate_limit::RateLimiter;
pub use reporter::{ScrapeEvent, ScrapeReporter, SilentReporter, TracingReporter};
pub use traits::{NullStore, PostingStore, Source};
