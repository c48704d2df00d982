//! Operation model.
//!
//! # Data Flow
//! ```text
//! Submission edge (HTTP, CLI)
//!     → validation.rs (raw params → OperationRequest, rejects malformed input)
//!     → types.rs (Operation envelope: id + request + timestamp)
//!     → encode() → queue payload
//!
//! Worker:
//!     queue payload → decode() → OperationRequest → handler
//! ```
//!
//! # Design Decisions
//! - The id is assigned at submission and never changes
//! - Decoding is two-phase so an unknown kind still yields its id and the
//!   failure can be reported against it

pub mod types;
pub mod validation;

pub use types::{DecodeError, Operation, OperationId, OperationKind, OperationRequest, UnknownKind};
pub use validation::{build_request, build_request_named, InvalidRequest, SubmitParams};
