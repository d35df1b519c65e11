use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use jobhound_core::error::AppError;
use jobhound_core::models::{EmploymentType, Posting};
use jobhound_core::traits::PostingStore;
use serde::Serialize;
use sqlx::{PgPool, Pool, Postgres, QueryBuilder};
use uuid::Uuid;

const DEFAULT_SEARCH_LIMIT: i64 = 20;
const MAX_SEARCH_LIMIT: i64 = 100;
const TOP_N: i64 = 10;

const POSTING_COLUMNS: &str = "id, fingerprint, title, company, location, salary, description, \
     url, source, remote, employment_type, posted_at, scraped_at, created_at, updated_at";

/// A posting as persisted, with its storage identity and timestamps.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredPosting {
    pub id: Uuid,
    pub fingerprint: String,
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
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Aggregate view over every stored posting.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PostingStats {
    pub total: i64,
    pub by_source: BTreeMap<String, i64>,
    pub by_employment_type: BTreeMap<String, i64>,
    pub remote: i64,
    /// Postings whose `posted_at` falls on the database's current date.
    pub posted_today: i64,
    pub last_scraped_at: Option<DateTime<Utc>>,
    /// Ten most frequent companies, most postings first.
    pub top_companies: Vec<NameCount>,
    pub top_locations: Vec<NameCount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct NameCount {
    pub name: String,
    pub count: i64,
}

/// Filters for [`PostingRepository::search`]. Unset fields match everything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostingQuery {
    /// Substring matched against title, description and company.
    pub keywords: Option<String>,
    /// Substring matched against location.
    pub location: Option<String>,
    pub remote: Option<bool>,
    pub source: Option<String>,
    pub employment_type: Option<EmploymentType>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for PostingQuery {
    fn default() -> Self {
        Self {
            keywords: None,
            location: None,
            remote: None,
            source: None,
            employment_type: None,
            limit: DEFAULT_SEARCH_LIMIT,
            offset: 0,
        }
    }
}

impl PostingQuery {
    /// Limit clamped to `1..=100`; non-positive values fall back to 20.
    pub fn effective_limit(&self) -> i64 {
        if self.limit <= 0 {
            DEFAULT_SEARCH_LIMIT
        } else {
            self.limit.min(MAX_SEARCH_LIMIT)
        }
    }

    pub fn effective_offset(&self) -> i64 {
        self.offset.max(0)
    }
}

/// Repository for posting persistence in PostgreSQL.
#[derive(Clone)]
pub struct PostingRepository {
    pool: Pool<Postgres>,
}

impl PostingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a batch in one transaction.
    ///
    /// A posting whose fingerprint is already stored only refreshes
    /// `scraped_at` and `updated_at`. Returns the number of rows inserted or
    /// refreshed.
    pub async fn save_batch(&self, postings: &[Posting]) -> Result<usize, AppError> {
        if postings.is_empty() {
            return Ok(0);
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to begin transaction: {e}")))?;

        let now = Utc::now();
        let mut written = 0u64;
        for posting in postings {
            let result = sqlx::query(
                r#"
                INSERT INTO postings (fingerprint, title, company, location, salary, description,
                                      url, source, remote, employment_type, posted_at, scraped_at,
                                      created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $13)
                ON CONFLICT (fingerprint) DO UPDATE SET
                    scraped_at = EXCLUDED.scraped_at,
                    updated_at = EXCLUDED.updated_at
                "#,
            )
            .bind(posting.fingerprint())
            .bind(&posting.title)
            .bind(&posting.company)
            .bind(&posting.location)
            .bind(&posting.salary)
            .bind(&posting.description)
            .bind(&posting.url)
            .bind(&posting.source)
            .bind(posting.remote)
            .bind(posting.employment_type.as_str())
            .bind(posting.posted_at)
            .bind(posting.scraped_at)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!(
                    "Failed to save posting {}: {e}",
                    posting.fingerprint()
                ))
            })?;
            written += result.rows_affected();
        }

        tx.commit()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to commit transaction: {e}")))?;

        tracing::debug!(count = postings.len(), written, "Saved posting batch");
        Ok(written as usize)
    }

    pub async fn find_by_fingerprint(
        &self,
        fingerprint: &str,
    ) -> Result<Option<StoredPosting>, AppError> {
        let row = sqlx::query_as::<_, PostingRow>(&format!(
            "SELECT {POSTING_COLUMNS} FROM postings WHERE fingerprint = $1"
        ))
        .bind(fingerprint)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(row.map(Into::into))
    }

    /// Newest postings first (by `posted_at`, then `scraped_at`).
    pub async fn search(&self, query: &PostingQuery) -> Result<Vec<StoredPosting>, AppError> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {POSTING_COLUMNS} FROM postings WHERE TRUE"));

        if let Some(keywords) = non_blank(&query.keywords) {
            let pattern = like_pattern(keywords);
            builder
                .push(" AND (title ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR description ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR company ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
        if let Some(location) = non_blank(&query.location) {
            builder
                .push(" AND location ILIKE ")
                .push_bind(like_pattern(location));
        }
        if let Some(remote) = query.remote {
            builder.push(" AND remote = ").push_bind(remote);
        }
        if let Some(source) = non_blank(&query.source) {
            builder.push(" AND source = ").push_bind(source.to_string());
        }
        if let Some(employment_type) = query.employment_type {
            builder
                .push(" AND employment_type = ")
                .push_bind(employment_type.as_str());
        }

        builder
            .push(" ORDER BY posted_at DESC NULLS LAST, scraped_at DESC LIMIT ")
            .push_bind(query.effective_limit())
            .push(" OFFSET ")
            .push_bind(query.effective_offset());

        let rows = builder
            .build_query_as::<PostingRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn count(&self) -> Result<i64, AppError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM postings")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;
        Ok(row.0)
    }

    /// Stored postings per source, alphabetically.
    pub async fn count_by_source(&self) -> Result<Vec<(String, i64)>, AppError> {
        sqlx::query_as("SELECT source, COUNT(*) FROM postings GROUP BY source ORDER BY source")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))
    }

    /// Totals, breakdowns and top companies/locations in one snapshot.
    pub async fn stats(&self) -> Result<PostingStats, AppError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to begin transaction: {e}")))?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        let (total, remote, posted_today, last_scraped_at): (
            i64,
            i64,
            i64,
            Option<DateTime<Utc>>,
        ) = sqlx::query_as(
            r#"
            SELECT COUNT(*),
                   COUNT(*) FILTER (WHERE remote),
                   COUNT(*) FILTER (WHERE posted_at::date = CURRENT_DATE),
                   MAX(scraped_at)
            FROM postings
            "#,
        )
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to get posting totals: {e}")))?;

        let by_source: Vec<(String, i64)> =
            sqlx::query_as("SELECT source, COUNT(*) FROM postings GROUP BY source")
                .fetch_all(&mut *tx)
                .await
                .map_err(|e| AppError::DatabaseError(e.to_string()))?;
        let by_employment_type: Vec<(String, i64)> = sqlx::query_as(
            "SELECT employment_type, COUNT(*) FROM postings GROUP BY employment_type",
        )
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        let top_companies = sqlx::query_as::<_, NameCount>(
            r#"
            SELECT company AS name, COUNT(*) AS count FROM postings
            GROUP BY company ORDER BY count DESC, company LIMIT $1
            "#,
        )
        .bind(TOP_N)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;
        let top_locations = sqlx::query_as::<_, NameCount>(
            r#"
            SELECT location AS name, COUNT(*) AS count FROM postings
            GROUP BY location ORDER BY count DESC, location LIMIT $1
            "#,
        )
        .bind(TOP_N)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(PostingStats {
            total,
            by_source: by_source.into_iter().collect(),
            by_employment_type: by_employment_type.into_iter().collect(),
            remote,
            posted_today,
            last_scraped_at,
            top_companies,
            top_locations,
        })
    }

    /// Delete postings older than `days` days. Returns the number deleted.
    ///
    /// Age is taken from `posted_at`, or `scraped_at` when the board gave no
    /// posting date.
    pub async fn delete_older_than(&self, days: u32) -> Result<u64, AppError> {
        let days = i32::try_from(days)
            .map_err(|_| AppError::ConfigError(format!("retention of {days} days is too large")))?;
        let result = sqlx::query(
            "DELETE FROM postings WHERE COALESCE(posted_at, scraped_at) < NOW() - make_interval(days => $1)",
        )
        .bind(days)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to delete old postings: {e}")))?;

        let deleted = result.rows_affected();
        tracing::info!(days, deleted, "Deleted old postings");
        Ok(deleted)
    }

    /// Check database connectivity.
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;
        Ok(())
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// `%value%` with LIKE metacharacters escaped.
fn like_pattern(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len() + 2);
    escaped.push('%');
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

// -- Internal row type for sqlx deserialization --

#[derive(sqlx::FromRow)]
struct PostingRow {
    id: Uuid,
    fingerprint: String,
    title: String,
    company: String,
    location: String,
    salary: Option<String>,
    description: String,
    url: String,
    source: String,
    remote: bool,
    employment_type: String,
    posted_at: Option<DateTime<Utc>>,
    scraped_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<PostingRow> for StoredPosting {
    fn from(row: PostingRow) -> Self {
        StoredPosting {
            id: row.id,
            fingerprint: row.fingerprint,
            title: row.title,
            company: row.company,
            location: row.location,
            salary: row.salary,
            description: row.description,
            url: row.url,
            source: row.source,
            remote: row.remote,
            employment_type: row.employment_type.parse().unwrap_or_default(),
            posted_at: row.posted_at,
            scraped_at: row.scraped_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

// -- Trait implementation --

impl PostingStore for PostingRepository {
    async fn save_batch(&self, postings: &[Posting]) -> Result<usize, AppError> {
        PostingRepository::save_batch(self, postings).await
    }
}
