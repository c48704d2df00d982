//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::operation::OperationKind;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// HTTP listener configuration.
    pub listener: ListenerConfig,

    /// Chain RPC settings.
    pub blockchain: BlockchainConfig,

    /// Queue capacity and durability.
    pub queues: QueueConfig,

    /// Worker pool settings.
    pub workers: WorkerConfig,

    /// Retry configuration for chain calls.
    pub retries: RetryConfig,

    /// Per-kind result cache policies.
    pub cache: CacheConfig,

    /// Completed result retention.
    pub results: ResultsConfig,

    /// HTTP timeouts and wait bounds.
    pub timeouts: TimeoutConfig,

    /// Chain RPC health monitoring.
    pub health_check: HealthCheckConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum accepted request body in bytes.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_bytes: 64 * 1024,
        }
    }
}

/// Blockchain integration configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BlockchainConfig {
    /// JSON-RPC endpoint URL.
    pub rpc_url: String,

    /// Failover JSON-RPC endpoint URLs.
    pub failover_urls: Vec<String>,

    /// Chain ID (e.g., 1 for Ethereum mainnet, 31337 for local Anvil).
    pub chain_id: u64,

    /// RPC request timeout in seconds.
    pub rpc_timeout_secs: u64,

    /// Gas price multiplier (1.0 = estimated, 1.2 = 20% buffer).
    pub gas_price_multiplier: f64,

    /// Maximum gas price in gwei (protection against spikes).
    pub max_gas_price_gwei: u64,

    /// How many recent blocks a transaction history lookup scans.
    pub history_scan_blocks: u64,
}

impl Default for BlockchainConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://localhost:8545".to_string(),
            failover_urls: Vec::new(),
            chain_id: 1,
            rpc_timeout_secs: 10,
            gas_price_multiplier: 1.2,
            max_gas_price_gwei: 500,
            history_scan_blocks: 100,
        }
    }
}

/// Queue configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum ready messages on the wallet topic before publishes are rejected.
    pub wallet_max_length: usize,

    /// Maximum ready messages on the chain-read topic.
    pub chain_max_length: usize,

    /// Append-only journal. When unset the queue lives in memory only and
    /// accepted operations are lost on restart.
    pub journal_path: Option<String>,

    /// fsync the journal after every publish record.
    pub fsync: bool,

    /// Settle records written before the running journal is compacted.
    pub compact_after_settled: usize,
}

impl QueueConfig {
    /// Whether an acknowledged submission survives a restart.
    pub fn is_durable(&self) -> bool {
        self.journal_path.is_some()
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            wallet_max_length: 100_000,
            chain_max_length: 100_000,
            journal_path: None,
            fsync: true,
            compact_after_settled: 10_000,
        }
    }
}

/// Worker pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Concurrent consumers per topic.
    pub concurrency: usize,

    /// Serialize transfers from the same sender address.
    pub serialize_sends_per_address: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            serialize_sends_per_address: true,
        }
    }
}

/// Delay strategy between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    Fixed,
    Exponential,
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    pub max_attempts: u32,

    /// Delay between attempts in milliseconds (base delay for exponential).
    pub delay_ms: u64,

    /// Cap for exponential backoff in milliseconds.
    pub max_delay_ms: u64,

    pub strategy: BackoffStrategy,

    /// Deadline for a single attempt in milliseconds.
    pub attempt_timeout_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_ms: 1000,
            max_delay_ms: 10_000,
            strategy: BackoffStrategy::Fixed,
            attempt_timeout_ms: 15_000,
        }
    }
}

/// How long results of one operation kind stay cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// Never cached.
    Disabled,
    /// Cached for the given duration.
    Ttl(Duration),
    /// Cached until evicted; for values that never change.
    Forever,
}

/// Result cache configuration.
///
/// TTLs are in seconds; zero disables caching for that kind.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_entries: usize,
    pub balance_ttl_secs: u64,
    pub transaction_count_ttl_secs: u64,
    pub history_ttl_secs: u64,
    pub gas_price_ttl_secs: u64,
    pub latest_block_ttl_secs: u64,
    pub block_ttl_secs: u64,
    pub transaction_ttl_secs: u64,
    /// Unset means receipts are cached forever.
    pub receipt_ttl_secs: Option<u64>,
    pub estimate_gas_ttl_secs: u64,
    pub network_info_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 50_000,
            balance_ttl_secs: 10,
            transaction_count_ttl_secs: 10,
            history_ttl_secs: 30,
            gas_price_ttl_secs: 5,
            latest_block_ttl_secs: 2,
            block_ttl_secs: 300,
            transaction_ttl_secs: 60,
            receipt_ttl_secs: None,
            estimate_gas_ttl_secs: 15,
            network_info_ttl_secs: 3600,
        }
    }
}

impl CacheConfig {
    /// Every configured TTL with its field name.
    pub fn ttl_fields(&self) -> Vec<(&'static str, u64)> {
        let mut fields = vec![
            ("cache.balance_ttl_secs", self.balance_ttl_secs),
            ("cache.transaction_count_ttl_secs", self.transaction_count_ttl_secs),
            ("cache.history_ttl_secs", self.history_ttl_secs),
            ("cache.gas_price_ttl_secs", self.gas_price_ttl_secs),
            ("cache.latest_block_ttl_secs", self.latest_block_ttl_secs),
            ("cache.block_ttl_secs", self.block_ttl_secs),
            ("cache.transaction_ttl_secs", self.transaction_ttl_secs),
            ("cache.estimate_gas_ttl_secs", self.estimate_gas_ttl_secs),
            ("cache.network_info_ttl_secs", self.network_info_ttl_secs),
        ];
        if let Some(secs) = self.receipt_ttl_secs {
            fields.push(("cache.receipt_ttl_secs", secs));
        }
        fields
    }

    /// Caching policy for one operation kind.
    pub fn policy_for(&self, kind: OperationKind) -> CachePolicy {
        if !self.enabled {
            return CachePolicy::Disabled;
        }
        let ttl_secs = match kind {
            OperationKind::CreateWallet | OperationKind::SendFunds => return CachePolicy::Disabled,
            OperationKind::GetTransactionReceipt => match self.receipt_ttl_secs {
                None => return CachePolicy::Forever,
                Some(secs) => secs,
            },
            OperationKind::GetBalance => self.balance_ttl_secs,
            OperationKind::GetTransactionCount => self.transaction_count_ttl_secs,
            OperationKind::GetTransactionHistory => self.history_ttl_secs,
            OperationKind::GetGasPrice => self.gas_price_ttl_secs,
            OperationKind::GetLatestBlock => self.latest_block_ttl_secs,
            OperationKind::GetBlock => self.block_ttl_secs,
            OperationKind::GetTransaction => self.transaction_ttl_secs,
            OperationKind::EstimateGas => self.estimate_gas_ttl_secs,
            OperationKind::GetNetworkInfo => self.network_info_ttl_secs,
        };
        if ttl_secs == 0 {
            CachePolicy::Disabled
        } else {
            CachePolicy::Ttl(Duration::from_secs(ttl_secs))
        }
    }
}

/// Completed result retention.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ResultsConfig {
    /// How long completed results stay queryable, in seconds.
    pub retention_secs: u64,

    /// Maintenance sweep interval in seconds (cache and results).
    pub sweep_interval_secs: u64,
}

impl Default for ResultsConfig {
    fn default() -> Self {
        Self {
            retention_secs: 600,
            sweep_interval_secs: 30,
        }
    }
}

/// Timeout configuration for the HTTP surface.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,

    /// Upper bound for `wait_ms` / `timeout_ms` query parameters.
    pub max_wait_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            max_wait_ms: 25_000,
        }
    }
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable active health checks of the chain RPC.
    pub enabled: bool,

    /// Health check interval in seconds.
    pub interval_secs: u64,

    /// Health check timeout in seconds.
    pub timeout_secs: u64,

    /// Number of consecutive failures before marking unhealthy.
    pub unhealthy_threshold: u32,

    /// Number of consecutive successes before marking healthy.
    pub healthy_threshold: u32,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 10,
            timeout_secs: 5,
            unhealthy_threshold: 3,
            healthy_threshold: 2,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
