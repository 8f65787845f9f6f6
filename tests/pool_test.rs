//! Worker pool behavior: concurrency bound, drain deadline, shutdown

mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{fast_client, fast_health, metrics_endpoint, slow_metrics_server};
use keywind::client::protocol::KeywordMetrics;
use keywind::pool::{PoolConfig, WorkerPool};
use wiremock::MockServer;

type SharedResults = Arc<tokio::sync::Mutex<HashMap<String, KeywordMetrics>>>;

fn fast_pool_config(workers: usize) -> PoolConfig {
    PoolConfig {
        workers,
        poll_timeout: Duration::from_millis(50),
        join_timeout: Duration::from_secs(2),
        drain_poll_interval: Duration::from_millis(20),
    }
}

fn start_pool(workers: usize, server: &MockServer) -> (WorkerPool, SharedResults) {
    let health = fast_health();
    let client = fast_client(Arc::clone(&health), 0);
    let endpoints = Arc::new(vec![metrics_endpoint(server)]);
    let results: SharedResults = Arc::new(tokio::sync::Mutex::new(HashMap::new()));
    let pool = WorkerPool::start(
        fast_pool_config(workers),
        client,
        health,
        endpoints,
        Arc::clone(&results),
    );
    (pool, results)
}

#[tokio::test]
async fn worker_count_bounds_concurrency() {
    let server = slow_metrics_server(Duration::from_millis(100)).await;
    let (pool, results) = start_pool(2, &server);

    let deadline = Instant::now() + Duration::from_secs(10);
    let started = Instant::now();
    for i in 0..6 {
        assert!(pool.submit(vec![format!("term{i}")], deadline).await);
    }
    assert!(pool.wait_for_drain(deadline).await);

    // Six 100ms batches on two workers take at least three sequential
    // rounds; a wider pool would finish in one
    assert!(started.elapsed() >= Duration::from_millis(300));

    let stats = pool.shutdown().await;
    assert_eq!(stats.tasks_completed, 6);
    assert_eq!(results.lock().await.len(), 6);
}

#[tokio::test]
async fn shutdown_stops_workers_after_drain_deadline() {
    let server = slow_metrics_server(Duration::from_millis(200)).await;
    let (pool, _results) = start_pool(2, &server);

    let deadline = Instant::now() + Duration::from_millis(300);
    for i in 0..20 {
        pool.submit(vec![format!("term{i}")], deadline).await;
    }
    assert!(!pool.wait_for_drain(deadline).await);

    // Queued backlog is dropped, not worked through
    let stopping = Instant::now();
    let stats = pool.shutdown().await;
    assert!(stopping.elapsed() < Duration::from_secs(1));
    assert!(stats.tasks_completed < 20);

    // No further calls reach the endpoint once shutdown returned
    let settled = server.received_requests().await.unwrap().len();
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(server.received_requests().await.unwrap().len(), settled);
}

#[tokio::test]
async fn idle_pool_shuts_down_promptly() {
    let server = slow_metrics_server(Duration::from_millis(50)).await;
    let (pool, _results) = start_pool(2, &server);

    let started = Instant::now();
    let stats = pool.shutdown().await;
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(stats.tasks_completed, 0);
    assert_eq!(stats.tasks_failed, 0);
}
