//! Per-endpoint health tracking and circuit breaking
//!
//! Every call outcome against an endpoint feeds its rolling statistics here.
//! The monitor answers three questions for the rest of the system:
//!
//! - may this endpoint receive work right now (circuit breaker),
//! - how large should the next batch be (adaptive batch size),
//! - how long to pause before the next batch (adaptive interval).
//!
//! Health scores derived from the same statistics rank endpoints for sharding
//! but never gate admission.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Upper bound on how long an open circuit stays closed to traffic.
pub const MAX_RECOVERY_INTERVAL: Duration = Duration::from_secs(15);

/// Rolling latency window size per endpoint.
const LATENCY_WINDOW: usize = 10;

// ============================================================================
// Circuit State
// ============================================================================

/// Circuit breaker state for one endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CircuitState {
    /// Normal operation, calls flow through
    Closed,
    /// Tripped, calls are rejected until the recovery interval elapses
    Open,
    /// Recovery probe, exactly one trial call is admitted
    HalfOpen,
}

/// Circuit transition produced by recording an outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    Opened,
    Closed,
    Reopened,
}

// ============================================================================
// Endpoint Statistics
// ============================================================================

/// Health record for one endpoint
#[derive(Debug, Clone)]
pub struct EndpointStats {
    /// Successful calls
    pub success_count: u64,

    /// Failed calls
    pub failure_count: u64,

    /// Consecutive failure streak (reset on success)
    pub consecutive_failures: u32,

    /// Current circuit state
    pub state: CircuitState,

    /// When the circuit last opened
    opened_at: Option<Instant>,

    /// Whether a half-open trial call is outstanding
    trial_in_flight: bool,

    /// Rolling window of recent call latencies
    latencies: VecDeque<Duration>,

    /// When this record was last updated
    pub updated_at: DateTime<Utc>,
}

impl EndpointStats {
    fn new() -> Self {
        Self {
            success_count: 0,
            failure_count: 0,
            consecutive_failures: 0,
            state: CircuitState::Closed,
            opened_at: None,
            trial_in_flight: false,
            latencies: VecDeque::with_capacity(LATENCY_WINDOW),
            updated_at: Utc::now(),
        }
    }

    /// Success rate over all recorded calls; an untouched endpoint counts as perfect
    pub fn success_rate(&self) -> f64 {
        let total = self.success_count + self.failure_count;
        if total == 0 {
            return 1.0;
        }
        self.success_count as f64 / total as f64
    }

    /// Average latency over the rolling window
    pub fn average_latency(&self) -> Duration {
        if self.latencies.is_empty() {
            return Duration::ZERO;
        }
        let total: Duration = self.latencies.iter().sum();
        total / self.latencies.len() as u32
    }

    /// Ranking score: success percentage minus average latency in seconds
    pub fn health_score(&self) -> f64 {
        (self.success_rate() * 100.0 - self.average_latency().as_secs_f64()).max(0.0)
    }

    fn record(&mut self, success: bool, latency: Duration, threshold: u32) -> Option<Transition> {
        self.latencies.push_back(latency);
        if self.latencies.len() > LATENCY_WINDOW {
            self.latencies.pop_front();
        }
        self.updated_at = Utc::now();

        if success {
            self.success_count += 1;
            self.consecutive_failures = 0;
            match self.state {
                CircuitState::HalfOpen | CircuitState::Open => {
                    self.state = CircuitState::Closed;
                    self.opened_at = None;
                    self.trial_in_flight = false;
                    Some(Transition::Closed)
                }
                CircuitState::Closed => None,
            }
        } else {
            self.failure_count += 1;
            self.consecutive_failures += 1;
            match self.state {
                CircuitState::HalfOpen => {
                    // Failed recovery probe, reopen and restart the timer
                    self.state = CircuitState::Open;
                    self.opened_at = Some(Instant::now());
                    self.trial_in_flight = false;
                    Some(Transition::Reopened)
                }
                CircuitState::Closed if self.consecutive_failures >= threshold => {
                    self.state = CircuitState::Open;
                    self.opened_at = Some(Instant::now());
                    Some(Transition::Opened)
                }
                CircuitState::Open => {
                    // A straggler call failed while open; restart the timer
                    self.opened_at = Some(Instant::now());
                    None
                }
                CircuitState::Closed => None,
            }
        }
    }
}

/// Point-in-time health summary for one endpoint
#[derive(Debug, Clone, Serialize)]
pub struct EndpointSummary {
    pub endpoint: String,
    pub state: CircuitState,
    pub total_requests: u64,
    pub success_rate: f64,
    pub consecutive_failures: u32,
    pub average_latency_ms: f64,
    pub health_score: f64,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Health Configuration
// ============================================================================

/// Tuning knobs for the health monitor
#[derive(Debug, Clone)]
pub struct HealthConfig {
    /// Consecutive failures before the circuit opens
    pub circuit_breaker_threshold: u32,

    /// Cap on the recovery interval (also bounded by [`MAX_RECOVERY_INTERVAL`])
    pub health_check_interval: Duration,

    /// Base pause between batches against one endpoint
    pub request_interval: Duration,

    /// Floor applied to the base pause
    pub min_interval: Duration,

    /// Batch size ceiling handed out to fully healthy endpoints
    pub max_batch_size: usize,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            circuit_breaker_threshold: 3,
            health_check_interval: Duration::from_secs(30),
            request_interval: Duration::from_secs(2),
            min_interval: Duration::from_secs(2),
            max_batch_size: 5,
        }
    }
}

// ============================================================================
// Health Monitor
// ============================================================================

/// Tracks health for every known endpoint
///
/// Endpoints register lazily on first reference; an unknown endpoint is
/// treated as fully healthy.
pub struct HealthMonitor {
    endpoints: RwLock<HashMap<String, EndpointStats>>,
    config: HealthConfig,
}

impl HealthMonitor {
    /// Create a monitor with the given tuning
    pub fn new(config: HealthConfig) -> Self {
        Self {
            endpoints: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Create a monitor with default tuning
    pub fn with_defaults() -> Self {
        Self::new(HealthConfig::default())
    }

    fn recovery_interval(&self) -> Duration {
        self.config.health_check_interval.min(MAX_RECOVERY_INTERVAL)
    }

    /// Record the outcome of one call attempt against an endpoint
    pub async fn record_outcome(&self, endpoint: &str, success: bool, latency: Duration) {
        let transition = {
            let mut map = self.endpoints.write().await;
            let stats = map.entry(endpoint.to_string()).or_insert_with(EndpointStats::new);
            stats.record(success, latency, self.config.circuit_breaker_threshold)
        };

        match transition {
            Some(Transition::Opened) => {
                tracing::warn!(endpoint, "circuit opened after repeated failures");
            }
            Some(Transition::Reopened) => {
                tracing::warn!(endpoint, "recovery probe failed, circuit reopened");
            }
            Some(Transition::Closed) => {
                tracing::info!(endpoint, "circuit closed, endpoint recovered");
            }
            None => {}
        }
    }

    /// Check whether an endpoint may currently receive work.
    ///
    /// Read-only: an open circuit whose recovery interval has elapsed counts
    /// as available, but the half-open trial slot is only claimed through
    /// [`try_acquire`](Self::try_acquire).
    pub async fn is_available(&self, endpoint: &str) -> bool {
        let map = self.endpoints.read().await;
        match map.get(endpoint) {
            None => true,
            Some(stats) => match stats.state {
                CircuitState::Closed => true,
                CircuitState::HalfOpen => true,
                CircuitState::Open => stats
                    .opened_at
                    .map(|t| t.elapsed() >= self.recovery_interval())
                    .unwrap_or(true),
            },
        }
    }

    /// Claim admission for one call against an endpoint.
    ///
    /// Transitions an open circuit to half-open once the recovery interval has
    /// elapsed, admitting exactly one trial call.
    pub async fn try_acquire(&self, endpoint: &str) -> bool {
        let mut map = self.endpoints.write().await;
        let stats = map.entry(endpoint.to_string()).or_insert_with(EndpointStats::new);
        match stats.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => {
                if stats.trial_in_flight {
                    false
                } else {
                    stats.trial_in_flight = true;
                    true
                }
            }
            CircuitState::Open => {
                let elapsed = stats.opened_at.map(|t| t.elapsed()).unwrap_or(Duration::MAX);
                if elapsed >= self.recovery_interval() {
                    stats.state = CircuitState::HalfOpen;
                    stats.trial_in_flight = true;
                    tracing::info!(endpoint, "circuit half-open, admitting trial call");
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Success rate for an endpoint (1.0 when unknown)
    pub async fn success_rate(&self, endpoint: &str) -> f64 {
        let map = self.endpoints.read().await;
        map.get(endpoint).map(EndpointStats::success_rate).unwrap_or(1.0)
    }

    /// Ranking score for an endpoint (100.0 when unknown)
    pub async fn health_score(&self, endpoint: &str) -> f64 {
        let map = self.endpoints.read().await;
        map.get(endpoint).map(EndpointStats::health_score).unwrap_or(100.0)
    }

    /// Batch size advice based on recent success rate
    pub async fn adaptive_batch_size(&self, endpoint: &str) -> usize {
        let max = self.config.max_batch_size.max(1);
        let map = self.endpoints.read().await;
        let Some(stats) = map.get(endpoint) else {
            return max;
        };

        let rate = stats.success_rate();
        if rate > 0.9 {
            max
        } else if rate > 0.7 {
            max.saturating_sub(1).max(1)
        } else if rate > 0.5 {
            max.saturating_sub(2).max(1)
        } else {
            max.saturating_sub(3).max(1)
        }
    }

    /// Pacing advice: how long to wait before the next batch
    ///
    /// Recent failures stretch the base interval linearly (capped at 4x);
    /// otherwise a mildly degraded success rate stretches it fractionally.
    pub async fn adaptive_interval(&self, endpoint: &str) -> Duration {
        let base = self.config.request_interval.max(self.config.min_interval);
        let map = self.endpoints.read().await;
        let Some(stats) = map.get(endpoint) else {
            return base;
        };

        if stats.consecutive_failures > 0 {
            return base * (stats.consecutive_failures + 1).min(4);
        }

        let rate = stats.success_rate();
        if rate > 0.95 {
            base
        } else if rate > 0.8 {
            base.mul_f64(1.2)
        } else {
            base.mul_f64(1.5)
        }
    }

    /// Snapshot of every tracked endpoint, for logging and CLI output
    pub async fn summary(&self) -> Vec<EndpointSummary> {
        let map = self.endpoints.read().await;
        let mut summaries: Vec<EndpointSummary> = map
            .iter()
            .map(|(endpoint, stats)| EndpointSummary {
                endpoint: endpoint.clone(),
                state: stats.state,
                total_requests: stats.success_count + stats.failure_count,
                success_rate: stats.success_rate(),
                consecutive_failures: stats.consecutive_failures,
                average_latency_ms: stats.average_latency().as_secs_f64() * 1000.0,
                health_score: stats.health_score(),
                updated_at: stats.updated_at,
            })
            .collect();
        summaries.sort_by(|a, b| a.endpoint.cmp(&b.endpoint));
        summaries
    }
}

// ============================================================================
// Tests
// ============================================================================
