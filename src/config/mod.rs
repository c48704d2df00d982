//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → sections handed to each subsystem at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, load_or_default, ConfigError};
pub use schema::{
    BackoffStrategy, BlockchainConfig, CacheConfig, CachePolicy, GatewayConfig, HealthCheckConfig,
    ListenerConfig, LogFormat, ObservabilityConfig, QueueConfig, ResultsConfig, RetryConfig,
    TimeoutConfig, WorkerConfig,
};
