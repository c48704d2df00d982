//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (capacities > 0, attempts >= 1)
//! - Validate addresses and URLs parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::GatewayConfig;

/// Longest accepted cache TTL: one year. Use an unset receipt TTL for
/// values that never change.
pub const MAX_CACHE_TTL_SECS: u64 = 365 * 24 * 60 * 60;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    if url::Url::parse(&config.blockchain.rpc_url).is_err() {
        errors.push(ValidationError::new(
            "blockchain.rpc_url",
            format!("'{}' is not a valid URL", config.blockchain.rpc_url),
        ));
    }
    if config.blockchain.rpc_timeout_secs == 0 {
        errors.push(ValidationError::new("blockchain.rpc_timeout_secs", "must be > 0"));
    }
    if config.blockchain.gas_price_multiplier < 1.0 {
        errors.push(ValidationError::new("blockchain.gas_price_multiplier", "must be >= 1.0"));
    }
    if config.blockchain.history_scan_blocks == 0 {
        errors.push(ValidationError::new("blockchain.history_scan_blocks", "must be > 0"));
    }

    if config.queues.wallet_max_length == 0 {
        errors.push(ValidationError::new("queues.wallet_max_length", "must be > 0"));
    }
    if config.queues.chain_max_length == 0 {
        errors.push(ValidationError::new("queues.chain_max_length", "must be > 0"));
    }

    if config.workers.concurrency == 0 {
        errors.push(ValidationError::new("workers.concurrency", "must be > 0"));
    }

    if config.retries.max_attempts == 0 {
        errors.push(ValidationError::new("retries.max_attempts", "must be >= 1"));
    }
    if config.retries.attempt_timeout_ms == 0 {
        errors.push(ValidationError::new("retries.attempt_timeout_ms", "must be > 0"));
    }
    if config.retries.max_delay_ms < config.retries.delay_ms {
        errors.push(ValidationError::new("retries.max_delay_ms", "must be >= retries.delay_ms"));
    }

    if config.cache.enabled && config.cache.max_entries == 0 {
        errors.push(ValidationError::new("cache.max_entries", "must be > 0 when caching is enabled"));
    }
    for (field, secs) in config.cache.ttl_fields() {
        if secs > MAX_CACHE_TTL_SECS {
            errors.push(ValidationError::new(
                field,
                format!("must be at most {MAX_CACHE_TTL_SECS} seconds"),
            ));
        }
    }

    if config.results.sweep_interval_secs == 0 {
        errors.push(ValidationError::new("results.sweep_interval_secs", "must be > 0"));
    }

    if config.timeouts.max_wait_ms >= config.timeouts.request_secs.saturating_mul(1000) {
        errors.push(ValidationError::new(
            "timeouts.max_wait_ms",
            "must be shorter than timeouts.request_secs",
        ));
    }

    if config.health_check.enabled && config.health_check.interval_secs == 0 {
        errors.push(ValidationError::new("health_check.interval_secs", "must be > 0"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
