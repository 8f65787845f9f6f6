//! Resolution strategies and the top-level orchestrator
//!
//! `resolve` is the single entry point: deduplicate the keywords, pick a
//! strategy from the workload size and endpoint count, and return whatever
//! resolved within the wall-clock budget. Partial results are a normal
//! outcome, never an error; unresolved keys are simply absent from the map.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;

use crate::client::protocol::KeywordMetrics;
use crate::client::BatchClient;
use crate::config::{Config, Endpoint};
use crate::error::{Error, Result};
use crate::health::{EndpointSummary, HealthConfig, HealthMonitor};
use crate::partition::{dedupe, split_into_batches};
use crate::pool::{PoolConfig, WorkerPool};

// ============================================================================
// Strategy Selection
// ============================================================================

/// How a resolution run is executed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStrategy {
    /// One endpoint: adaptive batches in order
    Sequential,
    /// Small workload, several endpoints: health-weighted sharding
    DirectFanout,
    /// Large workload: task queue drained by a bounded worker pool
    QueueScheduled,
}

/// Pick the strategy for a workload
pub fn select_strategy(
    unique_keywords: usize,
    endpoint_count: usize,
    small_workload_threshold: usize,
) -> QueryStrategy {
    if endpoint_count <= 1 {
        QueryStrategy::Sequential
    } else if unique_keywords <= small_workload_threshold {
        QueryStrategy::DirectFanout
    } else {
        QueryStrategy::QueueScheduled
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Top-level keyword resolution engine
pub struct Orchestrator {
    endpoints: Arc<Vec<Endpoint>>,
    health: Arc<HealthMonitor>,
    client: Arc<BatchClient>,
    max_batch_size: usize,
    max_workers: usize,
    queue_timeout: std::time::Duration,
    small_workload_threshold: usize,
}

impl Orchestrator {
    /// Build the orchestrator and its health monitor and client from config
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` when no endpoints are configured; this is the
    /// only fatal error in the subsystem.
    pub fn new(config: &Config) -> Result<Self> {
        let health = Arc::new(HealthMonitor::new(HealthConfig {
            circuit_breaker_threshold: config.query.circuit_breaker_threshold,
            health_check_interval: config.query.health_check_interval(),
            request_interval: config.query.request_interval(),
            max_batch_size: config.query.max_batch_size(),
            ..HealthConfig::default()
        }));
        let client = Arc::new(BatchClient::new(
            Arc::clone(&health),
            config.query.request_timeout(),
            config.query.max_retries,
        )?);

        Self::with_parts(config, health, client)
    }

    /// Build around an existing health monitor and client (used by tests to
    /// inject short intervals and backoff ladders)
    pub fn with_parts(
        config: &Config,
        health: Arc<HealthMonitor>,
        client: Arc<BatchClient>,
    ) -> Result<Self> {
        if config.endpoints.is_empty() {
            return Err(Error::config(
                "at least one metrics endpoint must be configured",
            ));
        }

        Ok(Self {
            endpoints: Arc::new(config.endpoints.clone()),
            health,
            client,
            max_batch_size: config.query.max_batch_size(),
            max_workers: config.query.max_workers,
            queue_timeout: config.query.queue_timeout(),
            small_workload_threshold: config.query.small_workload_threshold,
        })
    }

    /// Resolve a set of raw keywords to validated metrics entries
    ///
    /// The returned map's keys are a subset of the normalized input keys.
    /// An absent key means "not resolved this run", never "zero volume".
    pub async fn resolve(&self, keywords: &[String]) -> HashMap<String, KeywordMetrics> {
        let items = dedupe(keywords);
        if items.is_empty() {
            tracing::debug!("no queryable keywords after normalization");
            return HashMap::new();
        }

        let keys: Vec<String> = items.into_iter().map(|item| item.key).collect();
        let strategy = select_strategy(
            keys.len(),
            self.endpoints.len(),
            self.small_workload_threshold,
        );
        let deadline = Instant::now() + self.queue_timeout;

        tracing::info!(
            unique = keys.len(),
            endpoints = self.endpoints.len(),
            strategy = ?strategy,
            "resolving keywords"
        );

        let results = match strategy {
            QueryStrategy::Sequential => self.resolve_sequential(&keys, deadline).await,
            QueryStrategy::DirectFanout => self.resolve_fanout(&keys, deadline).await,
            QueryStrategy::QueueScheduled => self.resolve_queued(&keys, deadline).await,
        };

        tracing::info!(
            resolved = results.len(),
            requested = keys.len(),
            "resolution finished"
        );
        results
    }

    /// Health snapshot for every endpoint seen so far
    pub async fn health_summary(&self) -> Vec<EndpointSummary> {
        self.health.summary().await
    }

    // ------------------------------------------------------------------
    // Sequential path (single endpoint)
    // ------------------------------------------------------------------

    async fn resolve_sequential(
        &self,
        keys: &[String],
        deadline: Instant,
    ) -> HashMap<String, KeywordMetrics> {
        let endpoint = &self.endpoints[0];
        let mut results = HashMap::new();
        let mut offset = 0;

        while offset < keys.len() {
            if Instant::now() >= deadline {
                tracing::warn!(
                    resolved = results.len(),
                    remaining = keys.len() - offset,
                    "time budget exhausted, returning partial results"
                );
                break;
            }

            let size = self.health.adaptive_batch_size(&endpoint.base_url).await;
            let end = (offset + size).min(keys.len());
            let started = Instant::now();

            results.extend(self.client.resolve_batch(endpoint, &keys[offset..end]).await);
            offset = end;

            if offset < keys.len() {
                let interval = self.health.adaptive_interval(&endpoint.base_url).await;
                let elapsed = started.elapsed();
                if interval > elapsed {
                    tokio::time::sleep(interval - elapsed).await;
                }
            }
        }

        results
    }

    // ------------------------------------------------------------------
    // Direct fan-out path (small workload, several endpoints)
    // ------------------------------------------------------------------

    async fn resolve_fanout(
        &self,
        keys: &[String],
        deadline: Instant,
    ) -> HashMap<String, KeywordMetrics> {
        let shards = self.shard_by_health(keys).await;
        let mut tasks = Vec::new();

        for (idx, shard) in shards.into_iter().enumerate() {
            if shard.is_empty() {
                continue;
            }

            let endpoint = self.endpoints[idx].clone();
            let client = Arc::clone(&self.client);
            let health = Arc::clone(&self.health);

            tasks.push(tokio::spawn(async move {
                let mut resolved = HashMap::new();
                let mut offset = 0;

                while offset < shard.len() {
                    if Instant::now() >= deadline {
                        tracing::warn!(
                            endpoint = %endpoint.base_url,
                            remaining = shard.len() - offset,
                            "time budget exhausted, abandoning shard remainder"
                        );
                        break;
                    }

                    let size = health.adaptive_batch_size(&endpoint.base_url).await;
                    let end = (offset + size).min(shard.len());
                    let started = Instant::now();

                    resolved.extend(client.resolve_batch(&endpoint, &shard[offset..end]).await);
                    offset = end;

                    if offset < shard.len() {
                        let interval = health.adaptive_interval(&endpoint.base_url).await;
                        let elapsed = started.elapsed();
                        if interval > elapsed {
                            tokio::time::sleep(interval - elapsed).await;
                        }
                    }
                }

                resolved
            }));
        }

        let mut results = HashMap::new();
        for outcome in join_all(tasks).await {
            match outcome {
                Ok(map) => results.extend(map),
                Err(e) => tracing::error!(error = %e, "fan-out shard task panicked"),
            }
        }
        results
    }

    /// Shard keys across endpoints weighted by health
    ///
    /// Available endpoints are ranked by success rate and keys dealt across
    /// them round-robin, so healthier endpoints sit earlier in the rotation.
    /// A shard that fails stays failed for this run; its keys come back on
    /// the next cycle. With every endpoint unavailable the shard plan
    /// degrades to plain round-robin over all of them.
    async fn shard_by_health(&self, keys: &[String]) -> Vec<Vec<String>> {
        let mut ranked: Vec<(usize, f64)> = Vec::new();
        for (idx, endpoint) in self.endpoints.iter().enumerate() {
            if self.health.is_available(&endpoint.base_url).await {
                ranked.push((idx, self.health.success_rate(&endpoint.base_url).await));
            }
        }

        if ranked.is_empty() {
            tracing::warn!("no endpoint currently available, falling back to round-robin");
            ranked = (0..self.endpoints.len()).map(|idx| (idx, 0.0)).collect();
        }

        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

        let mut shards = vec![Vec::new(); self.endpoints.len()];
        for (i, key) in keys.iter().enumerate() {
            let (endpoint_idx, _) = ranked[i % ranked.len()];
            shards[endpoint_idx].push(key.clone());
        }
        shards
    }

    // ------------------------------------------------------------------
    // Queue-scheduled path (large workload)
    // ------------------------------------------------------------------

    async fn resolve_queued(
        &self,
        keys: &[String],
        deadline: Instant,
    ) -> HashMap<String, KeywordMetrics> {
        let results = Arc::new(tokio::sync::Mutex::new(HashMap::new()));
        let workers = self.max_workers.min(self.endpoints.len()).max(1);

        let pool = WorkerPool::start(
            PoolConfig {
                workers,
                ..PoolConfig::default()
            },
            Arc::clone(&self.client),
            Arc::clone(&self.health),
            Arc::clone(&self.endpoints),
            Arc::clone(&results),
        );

        let batches = split_into_batches(keys, self.max_batch_size);
        tracing::info!(tasks = batches.len(), workers, "queue-scheduled resolution");

        for batch in batches {
            if !pool.submit(batch, deadline).await {
                tracing::warn!("time budget exhausted while queueing, dropping remaining batches");
                break;
            }
        }

        if !pool.wait_for_drain(deadline).await {
            tracing::warn!(
                pending = pool.status().pending,
                "queue did not drain within budget, returning partial results"
            );
        }

        let stats = pool.shutdown().await;
        tracing::debug!(
            completed = stats.tasks_completed,
            failed = stats.tasks_failed,
            resolved = stats.keywords_resolved,
            "worker pool stopped"
        );

        let map = results.lock().await;
        map.clone()
    }
}
