//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_operations_submitted_total` (counter): accepted submissions by kind
//! - `gateway_operations_rejected_total` (counter): refused submissions by topic, reason
//! - `gateway_operations_completed_total` (counter): terminal results by kind, outcome
//! - `gateway_operation_duration_seconds` (histogram): execution time by kind
//! - `gateway_cache_lookups_total` (counter): by kind, result (hit/miss)
//! - `gateway_cache_entries` (gauge): live cache entries
//! - `gateway_cache_evictions_total` (counter): live entries dropped for room
//! - `gateway_retries_total` (counter): retry attempts by operation
//! - `gateway_duplicate_deliveries_total` (counter): by topic
//! - `gateway_dead_letters_total` (counter): undecodable payloads by topic
//! - `gateway_operation_panics_total` (counter): handler panics by kind
//! - `gateway_journal_compactions_total` (counter)
//! - `gateway_queue_depth` (gauge): ready messages by topic
//! - `gateway_chain_healthy` (gauge): 1=healthy, 0=unhealthy
//! - `gateway_http_requests_total` / `gateway_http_request_duration_seconds`
//!
//! # Design Decisions
//! - The `metrics` facade is a no-op until a recorder is installed, so
//!   library code records unconditionally
//! - Labels are low-cardinality: kind, topic, outcome, never ids or addresses

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Prometheus metrics endpoint listening");
    Ok(())
}

pub fn record_submitted(kind: &str) {
    counter!("gateway_operations_submitted_total", "kind" => kind.to_string()).increment(1);
}

pub fn record_rejected(topic: &str, reason: &'static str) {
    counter!(
        "gateway_operations_rejected_total",
        "topic" => topic.to_string(),
        "reason" => reason
    )
    .increment(1);
}

pub fn record_completed(kind: &str, outcome: &'static str, elapsed: Duration) {
    counter!(
        "gateway_operations_completed_total",
        "kind" => kind.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    histogram!("gateway_operation_duration_seconds", "kind" => kind.to_string())
        .record(elapsed.as_secs_f64());
}

pub fn record_cache_lookup(kind: &str, hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!(
        "gateway_cache_lookups_total",
        "kind" => kind.to_string(),
        "result" => result
    )
    .increment(1);
}

pub fn record_cache_size(entries: usize) {
    gauge!("gateway_cache_entries").set(entries as f64);
}

pub fn record_cache_evictions(evicted: usize) {
    counter!("gateway_cache_evictions_total").increment(evicted as u64);
}

pub fn record_retry(operation: &str) {
    counter!("gateway_retries_total", "operation" => operation.to_string()).increment(1);
}

pub fn record_duplicate(topic: &str) {
    counter!("gateway_duplicate_deliveries_total", "topic" => topic.to_string()).increment(1);
}

pub fn record_dead_letter(topic: &str) {
    counter!("gateway_dead_letters_total", "topic" => topic.to_string()).increment(1);
}

pub fn record_panic(kind: &str) {
    counter!("gateway_operation_panics_total", "kind" => kind.to_string()).increment(1);
}

pub fn record_journal_compaction() {
    counter!("gateway_journal_compactions_total").increment(1);
}

pub fn record_queue_depth(topic: &str, depth: usize) {
    gauge!("gateway_queue_depth", "topic" => topic.to_string()).set(depth as f64);
}

pub fn record_chain_health(healthy: bool) {
    gauge!("gateway_chain_healthy").set(if healthy { 1.0 } else { 0.0 });
}

pub fn record_request(method: &str, status: u16, route: &str, start: Instant) {
    counter!(
        "gateway_http_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "route" => route.to_string()
    )
    .increment(1);
    histogram!(
        "gateway_http_request_duration_seconds",
        "method" => method.to_string(),
        "route" => route.to_string()
    )
    .record(start.elapsed().as_secs_f64());
}
