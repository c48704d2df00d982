//! Blockchain integration subsystem.
//!
//! # Data Flow
//! ```text
//! Worker (operation handler)
//!     → ChainClient trait (client.rs)
//!     → RpcChainClient: failover across providers, per-call timeout
//!     → transaction.rs (transfer request building, gas guard)
//!     → wallet.rs (fresh account generation)
//! ```
//!
//! # Security Constraints
//! - No private keys are held by the gateway; transfers are sent from
//!   node-managed accounts
//! - Never log private keys or sensitive data
//! - All RPC calls have configurable timeouts

pub mod client;
pub mod transaction;
pub mod types;
pub mod wallet;

pub use client::{ChainClient, RpcChainClient};
pub use types::{BlockchainConfig, BlockchainError, BlockchainResult, ChainId};
