use std::future::Future;

use async_trait::async_trait;

use crate::context::RunContext;
use crate::error::AppError;
use crate::models::{Posting, RawPosting};

/// A job board adapter that turns a query into raw postings.
///
/// Object safe so an engine can hold heterogeneous adapters. Implementations
/// must return promptly once `ctx` is done. Any `Err` counts as total failure
/// for that invocation: the engine does not look at partial results.
#[async_trait]
pub trait Source: Send + Sync {
    /// Stable identifier, used for error attribution and provenance.
    fn name(&self) -> &str;

    async fn scrape(&self, ctx: &RunContext, query: &str) -> Result<Vec<RawPosting>, AppError>;
}

/// Persists fingerprinted postings.
///
/// Implementations must be idempotent per fingerprint: saving a posting
/// whose fingerprint already exists refreshes its timestamps instead of
/// inserting a duplicate.
pub trait PostingStore: Send + Sync + Clone {
    /// Save a batch. Returns the number of rows written or refreshed.
    fn save_batch(
        &self,
        postings: &[Posting],
    ) -> impl Future<Output = Result<usize, AppError>> + Send;
}

/// A no-op PostingStore for use when persistence is not needed.
#[derive(Debug, Clone)]
pub struct NullStore;

impl PostingStore for NullStore {
    async fn save_batch(&self, _postings: &[Posting]) -> Result<usize, AppError> {
        Ok(0)
    }
}
