use std::path::Path;

use async_trait::async_trait;
use jobhound_core::context::RunContext;
use jobhound_core::error::AppError;
use jobhound_core::models::RawPosting;
use jobhound_core::traits::Source;

/// Serves postings loaded from a JSON file (an array of raw postings).
///
/// `scrape` returns the postings whose title, company or description
/// contain the query, case-insensitively. An empty query matches everything.
#[derive(Debug, Clone)]
pub struct FixtureSource {
    name: String,
    postings: Vec<RawPosting>,
}

impl FixtureSource {
    pub fn new(name: impl Into<String>, postings: Vec<RawPosting>) -> Self {
        let name = name.into();
        let postings = postings
            .into_iter()
            .map(|mut p| {
                if p.source.is_empty() {
                    p.source.clone_from(&name);
                }
                p
            })
            .collect();
        Self { name, postings }
    }

    /// Load a fixture file. The source is named after the file stem.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::ConfigError(format!("Failed to read fixture {}: {e}", path.display()))
        })?;
        let postings: Vec<RawPosting> = serde_json::from_str(&content).map_err(|e| {
            AppError::ParseError(format!("Invalid fixture {}: {e}", path.display()))
        })?;
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("fixture");

        tracing::debug!(path = %path.display(), count = postings.len(), "Loaded fixture");
        Ok(Self::new(name, postings))
    }

    pub fn len(&self) -> usize {
        self.postings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }

    fn matching(&self, query: &str) -> Vec<RawPosting> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return self.postings.clone();
        }
        self.postings
            .iter()
            .filter(|p| {
                [&p.title, &p.company, &p.description]
                    .iter()
                    .any(|field| field.to_lowercase().contains(&needle))
            })
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Source for FixtureSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn scrape(&self, ctx: &RunContext, query: &str) -> Result<Vec<RawPosting>, AppError> {
        ctx.check()?;
        Ok(self.matching(query))
    }
}
