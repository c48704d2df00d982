//! Correlation of results back to submitters.
//!
//! # Data Flow
//! ```text
//! Dispatcher::submit → ResultStore::register (Pending)
//! Worker → try_claim (skip duplicates) → execute → complete (write-once)
//! Caller → status(id)            poll:  Pending | Completed | unknown
//!        → wait(id, timeout)     await: resolves once, on completion
//! Maintenance → purge_completed(retention)
//! ```
//!
//! # Design Decisions
//! - Enqueue acknowledgement and result readiness are separate futures;
//!   `submit` returning says nothing about execution
//! - Each slot is a `watch` channel so any number of waiters observe the
//!   single transition without polling

pub mod store;

pub use store::{
    Claim, ClaimGuard, Completion, OperationOutcome, OperationStatus, ResultStore, WaitError,
};
