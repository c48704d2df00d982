//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Open queues (replay journal) → Cache, handler, workers
//!     → Health monitor → Maintenance sweeper → Bind listener
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Workers finish message in hand
//!     → Close queues → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then core, then listeners
//! - Messages still queued at shutdown stay in the journal for the next start

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{run, Gateway, StartupError};
