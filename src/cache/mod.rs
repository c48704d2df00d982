//! Result caching subsystem.
//!
//! # Data Flow
//! ```text
//! Worker receives operation
//!     → OperationRequest::cache_key() (None for wallet creation and transfers)
//!     → ResultCache::get (fresh hit skips the chain call)
//!     → on success: ResultCache::put under CacheConfig::policy_for(kind)
//! ```
//!
//! # Design Decisions
//! - Keyed by kind + canonical params so different kinds never collide
//! - Failures are never cached
//! - Expiry uses the tokio clock so tests can pause time

pub mod result_cache;

pub use result_cache::{CacheKey, ResultCache};
