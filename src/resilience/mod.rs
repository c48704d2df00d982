//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Worker handler → chain call:
//!     → retries.rs (RetryExecutor: bounded attempts, transient errors only)
//!     → timeouts.rs (per-attempt deadline)
//!     → backoff.rs (fixed or exponential delay between attempts)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every remote call has a deadline
//! - Retries only for idempotent calls; transfers retry only with a
//!   client-supplied nonce
//! - Composition is explicit in the handler, not hidden in middleware

pub mod backoff;
pub mod retries;
pub mod timeouts;

pub use retries::{RetryExecutor, RetryPolicy};
