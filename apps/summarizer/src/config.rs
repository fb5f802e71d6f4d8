use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{ensure, Context, Result};

/// Longest cache TTL accepted for either cache.
const MAX_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Knobs the pipeline, its clients and the batch scheduler read. Tests build this directly.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Folded into every fingerprint; bump it when prompts or rules change.
    pub pipeline_version: String,
    pub max_revisions: u32,
    pub call_timeout: Duration,
    pub run_budget: Duration,
    pub model_max_attempts: u32,
    pub model_backoff_base: Duration,
    pub enrich_max_attempts: u32,
    pub enrich_backoff_base: Duration,
    pub result_ttl: Duration,
    pub enrich_ttl: Duration,
    pub batch_concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            pipeline_version: env!("CARGO_PKG_VERSION").to_string(),
            max_revisions: 2,
            call_timeout: Duration::from_secs(20),
            run_budget: Duration::from_secs(120),
            model_max_attempts: 3,
            model_backoff_base: Duration::from_millis(500),
            enrich_max_attempts: 3,
            enrich_backoff_base: Duration::from_millis(250),
            result_ttl: Duration::from_secs(7 * 24 * 60 * 60),
            enrich_ttl: Duration::from_secs(24 * 60 * 60),
            batch_concurrency: 4,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.enrich_ttl <= self.result_ttl,
            "ENRICH_TTL_SECS ({}s) must not exceed RESULT_TTL_SECS ({}s)",
            self.enrich_ttl.as_secs(),
            self.result_ttl.as_secs()
        );
        ensure!(
            self.result_ttl <= MAX_TTL,
            "RESULT_TTL_SECS ({}s) must not exceed {}s",
            self.result_ttl.as_secs(),
            MAX_TTL.as_secs()
        );
        ensure!(self.model_max_attempts >= 1, "MODEL_MAX_ATTEMPTS must be at least 1");
        ensure!(self.enrich_max_attempts >= 1, "ENRICH_MAX_ATTEMPTS must be at least 1");
        ensure!(self.batch_concurrency >= 1, "BATCH_CONCURRENCY must be at least 1");
        ensure!(!self.call_timeout.is_zero(), "CALL_TIMEOUT_SECS must be at least 1");
        ensure!(!self.run_budget.is_zero(), "RUN_BUDGET_SECS must be at least 1");
        Ok(())
    }
}

/// Application configuration loaded from environment variables.
/// Startup fails if a required variable is missing or any value does not parse.
#[derive(Debug, Clone)]
pub struct Config {
    pub anthropic_api_key: String,
    /// Unset means in-memory caches.
    pub redis_url: Option<String>,
    /// Unset means enrichment is disabled and every run proceeds without context.
    pub tavily_api_key: Option<String>,
    pub guidelines_path: Option<PathBuf>,
    pub port: u16,
    pub rust_log: String,
    pub pipeline: PipelineConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let defaults = PipelineConfig::default();
        let pipeline = PipelineConfig {
            pipeline_version: optional_env("PIPELINE_VERSION").unwrap_or(defaults.pipeline_version),
            max_revisions: parse_env("MAX_REVISIONS", defaults.max_revisions)?,
            call_timeout: secs_env("CALL_TIMEOUT_SECS", defaults.call_timeout)?,
            run_budget: secs_env("RUN_BUDGET_SECS", defaults.run_budget)?,
            model_max_attempts: parse_env("MODEL_MAX_ATTEMPTS", defaults.model_max_attempts)?,
            model_backoff_base: millis_env("MODEL_BACKOFF_BASE_MS", defaults.model_backoff_base)?,
            enrich_max_attempts: parse_env("ENRICH_MAX_ATTEMPTS", defaults.enrich_max_attempts)?,
            enrich_backoff_base: millis_env("ENRICH_BACKOFF_BASE_MS", defaults.enrich_backoff_base)?,
            result_ttl: secs_env("RESULT_TTL_SECS", defaults.result_ttl)?,
            enrich_ttl: secs_env("ENRICH_TTL_SECS", defaults.enrich_ttl)?,
            batch_concurrency: parse_env("BATCH_CONCURRENCY", defaults.batch_concurrency)?,
        };
        pipeline.validate()?;

        Ok(Config {
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            redis_url: optional_env("REDIS_URL"),
            tavily_api_key: optional_env("TAVILY_API_KEY"),
            guidelines_path: optional_env("GUIDELINES_PATH").map(PathBuf::from),
            port: parse_env("PORT", 8080u16).context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            pipeline,
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

/// Unset and blank are the same thing.
fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse::<T>()
        .with_context(|| format!("Environment variable '{key}' has invalid value '{raw}'"))
}

fn secs_env(key: &str, default: Duration) -> Result<Duration> {
    parse_env(key, default.as_secs()).map(Duration::from_secs)
}

fn millis_env(key: &str, default: Duration) -> Result<Duration> {
    parse_env(key, default.as_millis() as u64).map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        assert_eq!(config.max_revisions, 2);
        assert_eq!(config.batch_concurrency, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_enrich_ttl_cannot_exceed_result_ttl() {
        let config = PipelineConfig {
            enrich_ttl: Duration::from_secs(100),
            result_ttl: Duration::from_secs(10),
            ..PipelineConfig::default()
        };
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("ENRICH_TTL_SECS"));
    }

    #[test]
    fn test_unbounded_result_ttl_rejected() {
        let config = PipelineConfig {
            result_ttl: Duration::from_secs(u64::MAX),
            ..PipelineConfig::default()
        };
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("RESULT_TTL_SECS"));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let config = PipelineConfig {
            batch_concurrency: 0,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_value_names_variable() {
        let err = parse_value::<u32>("MAX_REVISIONS", "two").unwrap_err();
        assert!(err.to_string().contains("MAX_REVISIONS"));
        assert_eq!(parse_value::<u32>("MAX_REVISIONS", " 3 ").unwrap(), 3);
    }
}
