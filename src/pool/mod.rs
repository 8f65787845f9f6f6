//! Bounded worker pool for queue-scheduled resolution
//!
//! Workers share one task channel behind a mutex and pull with a short poll
//! timeout so stop sentinels are observed promptly. Each worker is bound to an
//! endpoint by `worker_id % endpoint_count` and paces itself with the
//! endpoint's adaptive interval after every batch.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::client::protocol::KeywordMetrics;
use crate::client::BatchClient;
use crate::config::Endpoint;
use crate::health::HealthMonitor;

// ============================================================================
// Configuration
// ============================================================================

/// Worker pool configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of workers to spawn
    pub workers: usize,

    /// How long a worker waits on the queue before re-checking for shutdown
    pub poll_timeout: Duration,

    /// How long shutdown waits for each worker to join
    pub join_timeout: Duration,

    /// Pause between pending-task checks while draining
    pub drain_poll_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            poll_timeout: Duration::from_secs(1),
            join_timeout: Duration::from_secs(10),
            drain_poll_interval: Duration::from_millis(500),
        }
    }
}

// ============================================================================
// Tasks and Statistics
// ============================================================================

/// Message consumed by exactly one worker
#[derive(Debug)]
pub enum Task {
    /// A batch of normalized keys to resolve
    Batch(Vec<String>),
    /// Stop sentinel; the receiving worker exits
    Stop,
}

/// Pool statistics (thread-safe)
#[derive(Debug, Default)]
pub struct PoolStats {
    /// Batches that yielded at least one entry
    pub tasks_completed: AtomicU64,

    /// Batches that yielded nothing
    pub tasks_failed: AtomicU64,

    /// Keywords resolved across all batches
    pub keywords_resolved: AtomicU64,
}

impl PoolStats {
    fn record_completion(&self, resolved: u64) {
        self.tasks_completed.fetch_add(1, Ordering::Relaxed);
        self.keywords_resolved.fetch_add(resolved, Ordering::Relaxed);
    }

    fn record_failure(&self) {
        self.tasks_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of current stats
    pub fn snapshot(&self) -> PoolStatsSnapshot {
        PoolStatsSnapshot {
            tasks_completed: self.tasks_completed.load(Ordering::Relaxed),
            tasks_failed: self.tasks_failed.load(Ordering::Relaxed),
            keywords_resolved: self.keywords_resolved.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of pool statistics
#[derive(Debug, Clone, Copy, Default)]
pub struct PoolStatsSnapshot {
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub keywords_resolved: u64,
}

/// Point-in-time pool status
#[derive(Debug, Clone, Copy)]
pub struct PoolStatus {
    /// Workers spawned
    pub total: usize,
    /// Workers still running
    pub alive: usize,
    /// Batches submitted but not yet finished
    pub pending: usize,
}

// ============================================================================
// Worker Pool
// ============================================================================

/// Bounded pool of batch-resolution workers
pub struct WorkerPool {
    task_tx: mpsc::Sender<Task>,
    handles: Vec<JoinHandle<()>>,
    pending: Arc<AtomicUsize>,
    alive: Arc<AtomicUsize>,
    stop: Arc<AtomicBool>,
    stats: Arc<PoolStats>,
    config: PoolConfig,
}

impl WorkerPool {
    /// Spawn the workers and return the running pool
    ///
    /// Resolved entries are merged into `results` under its lock as each
    /// batch finishes, so partial results survive an abandoned run.
    pub fn start(
        config: PoolConfig,
        client: Arc<BatchClient>,
        health: Arc<HealthMonitor>,
        endpoints: Arc<Vec<Endpoint>>,
        results: Arc<tokio::sync::Mutex<HashMap<String, KeywordMetrics>>>,
    ) -> Self {
        let (task_tx, task_rx) = mpsc::channel::<Task>(1024);
        let task_rx = Arc::new(tokio::sync::Mutex::new(task_rx));
        let pending = Arc::new(AtomicUsize::new(0));
        let alive = Arc::new(AtomicUsize::new(0));
        let stop = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(PoolStats::default());

        let worker_count = config.workers.max(1);
        let mut handles = Vec::with_capacity(worker_count);

        for worker_id in 0..worker_count {
            let task_rx = Arc::clone(&task_rx);
            let client = Arc::clone(&client);
            let health = Arc::clone(&health);
            let endpoints = Arc::clone(&endpoints);
            let results = Arc::clone(&results);
            let pending = Arc::clone(&pending);
            let alive = Arc::clone(&alive);
            let stop = Arc::clone(&stop);
            let stats = Arc::clone(&stats);
            let poll_timeout = config.poll_timeout;

            alive.fetch_add(1, Ordering::SeqCst);

            let handle = tokio::spawn(async move {
                loop {
                    let task = {
                        let mut rx = task_rx.lock().await;
                        match tokio::time::timeout(poll_timeout, rx.recv()).await {
                            Ok(Some(task)) => task,
                            Ok(None) => break, // Channel closed
                            Err(_) => continue,
                        }
                    };

                    match task {
                        Task::Stop => break,
                        Task::Batch(batch) => {
                            // Stop sentinels queue behind the backlog, so a
                            // shutting-down pool is detected here instead
                            if stop.load(Ordering::SeqCst) {
                                pending.fetch_sub(1, Ordering::SeqCst);
                                break;
                            }

                            let endpoint = &endpoints[worker_id % endpoints.len()];
                            let started = Instant::now();

                            tracing::debug!(
                                worker_id,
                                endpoint = %endpoint.base_url,
                                size = batch.len(),
                                "worker executing batch"
                            );

                            let resolved = client.resolve_batch(endpoint, &batch).await;
                            if resolved.is_empty() {
                                stats.record_failure();
                            } else {
                                stats.record_completion(resolved.len() as u64);
                            }

                            {
                                let mut map = results.lock().await;
                                map.extend(resolved);
                            }
                            pending.fetch_sub(1, Ordering::SeqCst);

                            if stop.load(Ordering::SeqCst) {
                                break;
                            }

                            // Self-pace: the processing time counts toward the interval
                            let interval = health.adaptive_interval(&endpoint.base_url).await;
                            let elapsed = started.elapsed();
                            if interval > elapsed {
                                tokio::time::sleep(interval - elapsed).await;
                            }
                        }
                    }
                }

                alive.fetch_sub(1, Ordering::SeqCst);
                tracing::debug!(worker_id, "worker shutting down");
            });

            handles.push(handle);
        }

        Self {
            task_tx,
            handles,
            pending,
            alive,
            stop,
            stats,
            config,
        }
    }

    /// Submit a batch, waiting for queue space at most until `deadline`.
    /// Returns false once the deadline passed or the pool stopped accepting
    /// work; the batch is dropped in either case.
    pub async fn submit(&self, batch: Vec<String>, deadline: Instant) -> bool {
        self.pending.fetch_add(1, Ordering::SeqCst);
        let remaining = deadline.saturating_duration_since(Instant::now());
        match tokio::time::timeout(remaining, self.task_tx.send(Task::Batch(batch))).await {
            Ok(Ok(())) => true,
            Ok(Err(_)) => {
                self.pending.fetch_sub(1, Ordering::SeqCst);
                tracing::error!("task channel closed, dropping batch");
                false
            }
            Err(_) => {
                self.pending.fetch_sub(1, Ordering::SeqCst);
                tracing::warn!("queue still full at deadline, dropping batch");
                false
            }
        }
    }

    /// Wait until every submitted batch finished, the pool died, or the
    /// deadline passed. Returns whether the queue fully drained.
    pub async fn wait_for_drain(&self, deadline: Instant) -> bool {
        loop {
            if self.pending.load(Ordering::SeqCst) == 0 {
                return true;
            }
            if self.alive.load(Ordering::SeqCst) == 0 {
                tracing::error!("all workers died with tasks still pending");
                return false;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            tokio::time::sleep(self.config.drain_poll_interval.min(remaining)).await;
        }
    }

    /// Current pool status
    pub fn status(&self) -> PoolStatus {
        PoolStatus {
            total: self.handles.len(),
            alive: self.alive.load(Ordering::SeqCst),
            pending: self.pending.load(Ordering::SeqCst),
        }
    }

    /// Stop every worker and join them, abandoning stragglers after the join
    /// timeout rather than blocking exit
    ///
    /// Batches still queued are not executed: the stop flag is checked before
    /// each dequeued batch, so workers finish at most their in-flight call.
    pub async fn shutdown(self) -> PoolStatsSnapshot {
        self.stop.store(true, Ordering::SeqCst);
        // Best-effort sentinels for idle workers; a full channel is fine, the
        // stop flag and the closed channel cover busy ones
        for _ in 0..self.handles.len() {
            let _ = self.task_tx.try_send(Task::Stop);
        }
        drop(self.task_tx);

        for (worker_id, handle) in self.handles.into_iter().enumerate() {
            if tokio::time::timeout(self.config.join_timeout, handle).await.is_err() {
                tracing::warn!(worker_id, "worker did not stop within join timeout, abandoning");
            }
        }

        self.stats.snapshot()
    }
}
