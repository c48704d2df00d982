//! Chain RPC health subsystem.
//!
//! # Data Flow
//! ```text
//! Active checks (active.rs):
//!     Periodic timer
//!     → ChainClient::get_block_number with timeout
//!     → Update state.rs
//!
//! State machine (state.rs):
//!     Healthy ←→ Unhealthy
//!     With thresholds to prevent flapping
//!
//! Consumers:
//!     → GET /health
//!     → gateway_chain_healthy gauge
//! ```
//!
//! # Design Decisions
//! - Health is informational; workers keep consuming while unhealthy and
//!   rely on retries
//! - State transitions require consecutive successes/failures

pub mod active;
pub mod state;

pub use active::ChainHealthMonitor;
pub use state::{HealthSnapshot, HealthState, HealthTracker};
