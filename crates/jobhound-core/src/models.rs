use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Kind of contract offered by a posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmploymentType {
    FullTime,
    PartTime,
    Contract,
    Internship,
    Temporary,
    #[default]
    Unspecified,
}

impl EmploymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmploymentType::FullTime => "full_time",
            EmploymentType::PartTime => "part_time",
            EmploymentType::Contract => "contract",
            EmploymentType::Internship => "internship",
            EmploymentType::Temporary => "temporary",
            EmploymentType::Unspecified => "unspecified",
        }
    }
}

impl fmt::Display for EmploymentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EmploymentType {
    type Err = String;

    /// Accepts the spellings job boards use ("Full-time", "full time", "FULL_TIME").
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect();
        match key.as_str() {
            "fulltime" => Ok(EmploymentType::FullTime),
            "parttime" => Ok(EmploymentType::PartTime),
            "contract" | "contractor" | "freelance" => Ok(EmploymentType::Contract),
            "internship" | "intern" => Ok(EmploymentType::Internship),
            "temporary" | "temp" => Ok(EmploymentType::Temporary),
            "" | "unspecified" => Ok(EmploymentType::Unspecified),
            _ => Err(format!("Unknown employment type: {}", s)),
        }
    }
}

/// A posting as returned by a source adapter, before the engine enriches it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPosting {
    pub title: String,
    pub company: String,
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salary: Option<String>,
    #[serde(default)]
    pub description: String,
    pub url: String,
    pub source: String,
    #[serde(default)]
    pub remote: bool,
    #[serde(default)]
    pub employment_type: EmploymentType,
    #[serde(default)]
    pub posted_at: Option<DateTime<Utc>>,
}

/// A fingerprinted, timestamped posting produced by a scrape run.
///
/// The fingerprint is derived from `(title, company, location)` only and
/// cannot be supplied by callers; see [`fingerprint`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Posting {
    pub title: String,
    pub company: String,
    pub location: String,
    pub salary: Option<String>,
    pub description: String,
    pub url: String,
    pub source: String,
    pub remote: bool,
    pub employment_type: EmploymentType,
    pub posted_at: Option<DateTime<Utc>>,
    pub scraped_at: DateTime<Utc>,
    fingerprint: String,
}

impl Posting {
    /// Enrich a raw posting with its fingerprint and scrape timestamp.
    pub fn from_raw(raw: RawPosting, scraped_at: DateTime<Utc>) -> Self {
        let fingerprint = fingerprint(&raw.title, &raw.company, &raw.location);
        Self {
            title: raw.title,
            company: raw.company,
            location: raw.location,
            salary: raw.salary,
            description: raw.description,
            url: raw.url,
            source: raw.source,
            remote: raw.remote,
            employment_type: raw.employment_type,
            posted_at: raw.posted_at,
            scraped_at,
            fingerprint,
        }
    }

    /// Deduplication key, 64 hex chars.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

/// Compute a SHA-256 hash of a string, returned as 64-char hex.
pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Trim, collapse inner whitespace, lowercase.
fn normalize_identity(field: &str) -> String {
    field
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Deduplication key for a posting: hash of its normalized identity fields.
///
/// Only title, company and location participate. Two postings that agree on
/// those collide regardless of description, salary, URL or source.
pub fn fingerprint(title: &str, company: &str, location: &str) -> String {
    compute_hash(&format!(
        "{}|{}|{}",
        normalize_identity(title),
        normalize_identity(company),
        normalize_identity(location)
    ))
}

/// Keep the first posting for every fingerprint, preserving order.
pub fn dedupe_by_fingerprint(postings: Vec<Posting>) -> Vec<Posting> {
    let mut seen = HashSet::with_capacity(postings.len());
    postings
        .into_iter()
        .filter(|p| seen.insert(p.fingerprint.clone()))
        .collect()
}

/// Lifecycle of the engine's most recent run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Completed,
    Cancelled,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::Running => "running",
            RunState::Completed => "completed",
            RunState::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Aggregate counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunStats {
    pub jobs_scraped: u64,
    pub errors: u64,
    pub started_at: Option<DateTime<Utc>>,
    /// `None` until the run completes. Stays `None` for cancelled runs.
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunStats {
    pub fn duration(&self) -> Option<Duration> {
        let (start, end) = (self.started_at?, self.finished_at?);
        (end - start).to_std().ok()
    }

    pub fn jobs_per_second(&self) -> Option<f64> {
        let secs = self.duration()?.as_secs_f64();
        (secs > 0.0).then(|| self.jobs_scraped as f64 / secs)
    }
}
