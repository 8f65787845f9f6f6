//! keywind - multi-endpoint keyword metrics resolver
//!
//! Resolves batches of keyword strings against a fleet of flaky
//! keyword-metrics HTTP endpoints, as the query core of a content-update
//! watcher.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`health`] - Per-endpoint circuit breaking and adaptive pacing
//! - [`client`] - Batch HTTP calls with retry and strict validation
//! - [`partition`] - Keyword normalization, deduplication, and batching
//! - [`pool`] - Bounded worker pool for large workloads
//! - [`orchestrator`] - Strategy selection and result merging
//!
//! # Example
//!
//! ```no_run
//! use keywind::config::Config;
//! use keywind::orchestrator::Orchestrator;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     config.validate()?;
//!     let orchestrator = Orchestrator::new(&config)?;
//!     let keywords = vec!["rust async".to_string(), "tokio runtime".to_string()];
//!     let results = orchestrator.resolve(&keywords).await;
//!     println!("resolved {} keywords", results.len());
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod health;
pub mod orchestrator;
pub mod partition;
pub mod pool;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::client::protocol::{KeywordMetrics, MonthlySearches};
    pub use crate::client::{BatchClient, ClientError};
    pub use crate::config::{Config, Endpoint};
    pub use crate::error::{Error, ErrorCategory, Result};
    pub use crate::health::{CircuitState, HealthConfig, HealthMonitor};
    pub use crate::orchestrator::{Orchestrator, QueryStrategy};
}

// Direct re-exports for convenience
pub use client::protocol::KeywordMetrics;
pub use orchestrator::Orchestrator;
