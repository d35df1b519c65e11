use std::time::Duration;

use crate::error::AppError;
use crate::rate_limit::DEFAULT_POLL_INTERVAL;

/// Tunable knobs for a scrape engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Number of concurrent workers per run.
    pub workers: usize,
    /// Rate limiter capacity, in source calls per second.
    pub rate_limit: u32,
    /// Default run timeout used by callers that don't bring their own deadline.
    pub timeout: Duration,
    /// Capacity of the posting channel between workers and the collector.
    pub posting_buffer: usize,
    /// Capacity of the error channel.
    pub error_buffer: usize,
    /// Rate limiter polling interval while the bucket is empty.
    pub poll_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            rate_limit: 100,
            timeout: Duration::from_secs(30),
            posting_buffer: 1000,
            error_buffer: 100,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl EngineConfig {
    /// Read configuration from environment variables, on top of the defaults.
    ///
    /// - `SCRAPER_WORKERS` (optional, defaults to 10)
    /// - `SCRAPER_RATE_LIMIT` (optional, defaults to 100 per second)
    /// - `SCRAPER_TIMEOUT` (optional, seconds, defaults to 30)
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let workers = parse_positive(&lookup, "SCRAPER_WORKERS")?.unwrap_or(defaults.workers as u64);
        let rate_limit =
            parse_positive(&lookup, "SCRAPER_RATE_LIMIT")?.unwrap_or(defaults.rate_limit as u64);
        let timeout = parse_positive(&lookup, "SCRAPER_TIMEOUT")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.timeout);

        let config = Self {
            workers: usize::try_from(workers)
                .map_err(|_| AppError::ConfigError("SCRAPER_WORKERS is too large".into()))?,
            rate_limit: u32::try_from(rate_limit)
                .map_err(|_| AppError::ConfigError("SCRAPER_RATE_LIMIT is too large".into()))?,
            timeout,
            ..defaults
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_rate_limit(mut self, rate_limit: u32) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_buffers(mut self, postings: usize, errors: usize) -> Self {
        self.posting_buffer = postings;
        self.error_buffer = errors;
        self
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.workers == 0 {
            return Err(AppError::ConfigError("workers must be at least 1".into()));
        }
        if self.rate_limit == 0 {
            return Err(AppError::ConfigError("rate_limit must be at least 1".into()));
        }
        if self.posting_buffer == 0 || self.error_buffer == 0 {
            return Err(AppError::ConfigError(
                "channel buffers must hold at least one item".into(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(AppError::ConfigError("poll_interval must be non-zero".into()));
        }
        Ok(())
    }
}

fn parse_positive<F>(lookup: &F, key: &str) -> Result<Option<u64>, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    let parsed: u64 = raw.parse().map_err(|_| {
        AppError::ConfigError(format!("Invalid {key} '{raw}': must be a positive integer"))
    })?;
    if parsed == 0 {
        return Err(AppError::ConfigError(format!("{key} must be at least 1")));
    }
    Ok(Some(parsed))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = EngineConfig::default();
        assert_eq!(config.workers, 10);
        assert_eq!(config.rate_limit, 100);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn env_overrides_defaults() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("SCRAPER_WORKERS", "3"),
            ("SCRAPER_RATE_LIMIT", "7"),
            ("SCRAPER_TIMEOUT", "90"),
        ]))
        .unwrap();
        assert_eq!(config.workers, 3);
        assert_eq!(config.rate_limit, 7);
        assert_eq!(config.timeout, Duration::from_secs(90));
        assert_eq!(config.posting_buffer, 1000);
    }

    #[test]
    fn missing_or_blank_vars_fall_back() {
        let config = EngineConfig::from_lookup(lookup(&[("SCRAPER_WORKERS", "  ")])).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn invalid_values_are_config_errors() {
        for (key, value) in [
            ("SCRAPER_WORKERS", "0"),
            ("SCRAPER_WORKERS", "many"),
            ("SCRAPER_RATE_LIMIT", "-1"),
            ("SCRAPER_TIMEOUT", "0"),
        ] {
            let err = EngineConfig::from_lookup(lookup(&[(key, value)])).unwrap_err();
            assert!(matches!(err, AppError::ConfigError(_)), "{key}={value}");
        }
    }

    #[test]
    fn validate_rejects_zero_buffers() {
        let config = EngineConfig::default().with_buffers(0, 10);
        assert!(config.validate().is_err());
        assert!(EngineConfig::default().with_workers(0).validate().is_err());
        assert!(EngineConfig::default().with_rate_limit(0).validate().is_err());
    }
}
