//! Worker subsystem.
//!
//! # Data Flow
//! ```text
//! Broker::receive(topic)
//!     → Operation::decode (undecodable → recorded failure / rejected)
//!     → ResultStore::try_claim (duplicates acked without executing)
//!     → handler.rs: ResultCache → RetryExecutor → ChainClient → ResultCache
//!     → ResultStore::complete
//!     → Delivery::ack
//! ```
//!
//! # Design Decisions
//! - Fixed number of consumers per topic; each handles one message at a time
//! - A remote call blocks only its worker
//! - Transfers from one sender are serialized by ordering.rs; everything
//!   else has no ordering guarantee

pub mod handler;
pub mod ordering;
pub mod pool;

pub use handler::OperationHandler;
pub use ordering::AddressLocks;
pub use pool::WorkerPool;
