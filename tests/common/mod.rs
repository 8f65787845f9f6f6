//! Shared helpers for integration tests
#![allow(dead_code)]

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use keywind::client::BatchClient;
use keywind::config::{Config, Endpoint};
use keywind::health::{HealthConfig, HealthMonitor};
use keywind::orchestrator::Orchestrator;

/// Responds to any GET by echoing metrics for every keyword in the path.
/// Keywords containing "broken" come back without a metrics object.
pub struct EchoMetrics;

impl Respond for EchoMetrics {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let path = request.url.path();
        let raw = path.rsplit('/').next().unwrap_or_default();
        let decoded = raw.replace("%20", " ");

        let data: Vec<serde_json::Value> = decoded
            .split(',')
            .filter(|kw| !kw.is_empty())
            .map(|kw| {
                if kw.contains("broken") {
                    json!({ "keyword": kw })
                } else {
                    json!({
                        "keyword": kw,
                        "metrics": {
                            "avg_monthly_searches": 1200,
                            "competition": "low",
                            "competition_index": "25",
                            "monthly_searches": [
                                { "year": "2025", "month": "jan", "searches": 90 }
                            ]
                        }
                    })
                }
            })
            .collect();

        ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "geo_target": "global",
            "data": data
        }))
    }
}

/// Echoes metrics like [`EchoMetrics`] after a fixed response delay
pub struct DelayedEcho(pub Duration);

impl Respond for DelayedEcho {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        EchoMetrics.respond(request).set_delay(self.0)
    }
}

/// Responds 500 to any batch mentioning "poison", echoes metrics otherwise
pub struct PoisonAware;

impl Respond for PoisonAware {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        if request.url.path().contains("poison") {
            ResponseTemplate::new(500)
        } else {
            EchoMetrics.respond(request)
        }
    }
}

/// Start a mock metrics server answering every GET with echoed metrics
pub async fn start_metrics_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(EchoMetrics)
        .mount(&server)
        .await;
    server
}

/// Mock metrics server that holds every response for `delay`
pub async fn slow_metrics_server(delay: Duration) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(DelayedEcho(delay))
        .mount(&server)
        .await;
    server
}

/// Endpoint pointing at a mock server's /kw/ prefix
pub fn metrics_endpoint(server: &MockServer) -> Endpoint {
    Endpoint::new(format!("{}/kw/", server.uri()))
}

/// Health monitor wired for fast tests
pub fn fast_health() -> Arc<HealthMonitor> {
    Arc::new(HealthMonitor::new(HealthConfig {
        circuit_breaker_threshold: 3,
        health_check_interval: Duration::from_millis(100),
        request_interval: Duration::from_millis(10),
        min_interval: Duration::from_millis(10),
        max_batch_size: 5,
    }))
}

/// Client wired for fast tests (millisecond backoff ladder)
pub fn fast_client(health: Arc<HealthMonitor>, max_retries: u32) -> Arc<BatchClient> {
    Arc::new(
        BatchClient::new(health, Duration::from_secs(5), max_retries)
            .unwrap()
            .with_backoff_ladder(vec![Duration::from_millis(10)]),
    )
}

/// Config pointing at the given endpoints, tuned for fast tests
pub fn test_config(endpoints: Vec<Endpoint>) -> Config {
    let mut config = Config::default();
    config.endpoints = endpoints;
    config.query.request_interval_secs = 0.01;
    config.query.queue_timeout_secs = 30;
    config.query.request_timeout_secs = 5;
    config.query.max_retries = 1;
    config
}

/// Orchestrator with fast health and client injected
pub fn fast_orchestrator(config: &Config) -> Orchestrator {
    let health = fast_health();
    let client = fast_client(Arc::clone(&health), config.query.max_retries);
    Orchestrator::with_parts(config, health, client).unwrap()
}

pub fn keywords(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|s| s.to_string()).collect()
}
