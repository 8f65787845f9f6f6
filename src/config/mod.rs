//! Configuration management for the keyword resolver
//!
//! This module handles loading and validating configuration from environment
//! variables and TOML files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Hard ceiling on keywords per HTTP call, imposed by the metrics endpoints.
pub const PROTOCOL_MAX_BATCH: usize = 5;

fn default_delimiter() -> String {
    String::from(",")
}

/// One backing metrics endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    /// Base URL the joined keyword list is appended to
    pub base_url: String,

    /// Delimiter used to join keywords in the request URL.
    /// Some deployments expect a full-width comma ("，").
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
}

impl Endpoint {
    /// Create an endpoint with the default delimiter
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            delimiter: default_delimiter(),
        }
    }

    /// Build the batch query URL for a set of keywords
    pub fn query_url(&self, keywords: &[String]) -> String {
        format!("{}{}", self.base_url, keywords.join(&self.delimiter))
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Metrics endpoints to query
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,

    /// Query orchestration configuration
    #[serde(default)]
    pub query: QueryConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Query orchestration configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Keywords per HTTP call, clamped to the protocol ceiling
    pub max_batch_size: usize,

    /// Maximum concurrent workers in queue-scheduled mode
    pub max_workers: usize,

    /// Wall-clock budget for a whole resolution run, in seconds
    pub queue_timeout_secs: u64,

    /// Base pause between consecutive batches against one endpoint, in seconds
    pub request_interval_secs: f64,

    /// Consecutive failures before an endpoint's circuit opens
    pub circuit_breaker_threshold: u32,

    /// Cap on the circuit recovery interval, in seconds
    pub health_check_interval_secs: u64,

    /// Per-request HTTP timeout, in seconds
    pub request_timeout_secs: u64,

    /// Retry attempts after the first failure of a call
    pub max_retries: u32,

    /// Unique-keyword count at or below which direct fan-out is used
    pub small_workload_threshold: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            max_batch_size: PROTOCOL_MAX_BATCH,
            max_workers: 2,
            queue_timeout_secs: 300,
            request_interval_secs: 2.0,
            circuit_breaker_threshold: 3,
            health_check_interval_secs: 30,
            request_timeout_secs: 80,
            max_retries: 2,
            small_workload_threshold: 100,
        }
    }
}

impl QueryConfig {
    /// Batch size clamped to the protocol ceiling
    #[must_use]
    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size.clamp(1, PROTOCOL_MAX_BATCH)
    }

    /// Get request timeout as Duration
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Get the whole-run budget as Duration
    #[must_use]
    pub fn queue_timeout(&self) -> Duration {
        Duration::from_secs(self.queue_timeout_secs)
    }

    /// Get the base batch interval as Duration
    #[must_use]
    pub fn request_interval(&self) -> Duration {
        Duration::from_secs_f64(self.request_interval_secs.max(0.0))
    }

    /// Get the health-check interval as Duration
    #[must_use]
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let delimiter = std::env::var("KEYWIND_KEYWORD_DELIMITER")
            .unwrap_or_else(|_| default_delimiter());

        let endpoints = std::env::var("KEYWIND_ENDPOINTS")
            .map(|raw| parse_endpoint_list(&raw, &delimiter))
            .unwrap_or_default();

        let defaults = QueryConfig::default();

        let max_batch_size = std::env::var("KEYWIND_MAX_BATCH_SIZE")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults.max_batch_size);

        let max_workers = std::env::var("KEYWIND_MAX_WORKERS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults.max_workers);

        let queue_timeout_secs = std::env::var("KEYWIND_QUEUE_TIMEOUT")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults.queue_timeout_secs);

        let request_interval_secs = std::env::var("KEYWIND_REQUEST_INTERVAL")
            .ok()
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(defaults.request_interval_secs);

        let circuit_breaker_threshold = std::env::var("KEYWIND_CIRCUIT_THRESHOLD")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(defaults.circuit_breaker_threshold);

        let health_check_interval_secs = std::env::var("KEYWIND_HEALTH_CHECK_INTERVAL")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults.health_check_interval_secs);

        let request_timeout_secs = std::env::var("KEYWIND_REQUEST_TIMEOUT")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults.request_timeout_secs);

        let max_retries = std::env::var("KEYWIND_MAX_RETRIES")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(defaults.max_retries);

        let small_workload_threshold = std::env::var("KEYWIND_SMALL_WORKLOAD_THRESHOLD")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults.small_workload_threshold);

        let log_level = std::env::var("KEYWIND_LOG_LEVEL").unwrap_or_else(|_| String::from("info"));
        let log_format =
            std::env::var("KEYWIND_LOG_FORMAT").unwrap_or_else(|_| String::from("text"));

        Ok(Self {
            endpoints,
            query: QueryConfig {
                max_batch_size,
                max_workers,
                queue_timeout_secs,
                request_interval_secs,
                circuit_breaker_threshold,
                health_check_interval_secs,
                request_timeout_secs,
                max_retries,
                small_workload_threshold,
            },
            logging: LoggingConfig {
                level: log_level,
                format: log_format,
            },
        })
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        for endpoint in &self.endpoints {
            url::Url::parse(&endpoint.base_url)
                .with_context(|| format!("Invalid endpoint URL: {}", endpoint.base_url))?;
            if endpoint.delimiter.is_empty() {
                anyhow::bail!("endpoint delimiter must not be empty: {}", endpoint.base_url);
            }
        }

        if self.query.max_workers == 0 {
            anyhow::bail!("max_workers must be greater than 0");
        }

        if self.query.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be greater than 0");
        }

        if self.query.queue_timeout_secs == 0 {
            anyhow::bail!("queue_timeout_secs must be greater than 0");
        }

        if self.query.request_interval_secs < 0.0 {
            anyhow::bail!("request_interval_secs must not be negative");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            query: QueryConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Parse a comma-separated endpoint URL list from the environment
fn parse_endpoint_list(raw: &str, delimiter: &str) -> Vec<Endpoint> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|base_url| Endpoint {
            base_url: base_url.to_string(),
            delimiter: delimiter.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_max_workers() {
        let mut config = Config::default();
        config.query.max_workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_endpoint_url() {
        let mut config = Config::default();
        config.endpoints.push(Endpoint::new("not a url"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_batch_size_clamped_to_ceiling() {
        let mut query = QueryConfig::default();
        query.max_batch_size = 50;
        assert_eq!(query.max_batch_size(), PROTOCOL_MAX_BATCH);

        query.max_batch_size = 0;
        assert_eq!(query.max_batch_size(), 1);
    }

    #[test]
    fn test_duration_accessors() {
        let query = QueryConfig::default();
        assert_eq!(query.request_timeout(), Duration::from_secs(80));
        assert_eq!(query.queue_timeout(), Duration::from_secs(300));
        assert_eq!(query.request_interval(), Duration::from_secs(2));
    }

    #[test]
    fn test_parse_endpoint_list() {
        let endpoints =
            parse_endpoint_list("http://a.example/kw/, http://b.example/kw/ ,", "，");
        assert_eq!(endpoints.len(), 2);
        assert_eq!(endpoints[0].base_url, "http://a.example/kw/");
        assert_eq!(endpoints[1].delimiter, "，");
    }

    #[test]
    fn test_query_url_join() {
        let endpoint = Endpoint::new("http://a.example/kw/");
        let url = endpoint.query_url(&["rust".to_string(), "tokio".to_string()]);
        assert_eq!(url, "http://a.example/kw/rust,tokio");
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keywind.toml");
        std::fs::write(
            &path,
            r#"
[[endpoints]]
base_url = "http://metrics.example/kw/"

[query]
max_batch_size = 4
max_workers = 3
queue_timeout_secs = 120
request_interval_secs = 1.5
circuit_breaker_threshold = 2
health_check_interval_secs = 10
request_timeout_secs = 30
max_retries = 1
small_workload_threshold = 50
"#,
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.endpoints.len(), 1);
        assert_eq!(config.endpoints[0].delimiter, ",");
        assert_eq!(config.query.max_batch_size, 4);
        assert_eq!(config.query.small_workload_threshold, 50);
        assert!(config.validate().is_ok());
    }
}
