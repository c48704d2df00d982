//! Durable operation queue.
//!
//! # Data Flow
//! ```text
//! Dispatcher::submit(request)
//!     → Operation::encode
//!     → Broker::publish(topic, id, payload)   (journal first, then visible)
//!     → Submission { id }                      (enqueue ack only)
//!
//! Worker:
//!     Broker::receive(topic) → Delivery
//!     → ack / reject / requeue (drop = requeue)
//! ```
//!
//! # Design Decisions
//! - Two topics so wallet work and chain reads cannot starve each other
//! - Each topic is bounded; overflow refuses the publish, never drops
//!   accepted messages
//! - At-least-once: a message leaves the journal only when settled
//! - FIFO per topic is best effort; requeued messages go to the head

pub mod broker;
pub mod dispatcher;
pub mod journal;
pub mod memory;

pub use broker::{Broker, Delivery, QueueError, Settle, Settlement, Topic};
pub use dispatcher::{CancelOutcome, DispatchError, Dispatcher, Submission, CANCELLED_MESSAGE};
pub use memory::MemoryBroker;
