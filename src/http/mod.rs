//! HTTP submission edge.
//!
//! # Data Flow
//! ```text
//! Client request
//!     → server.rs (request id, tracing, timeout, body limit, metrics)
//!     → handlers.rs (validate, submit, optionally wait)
//!     → request.rs (bodies and query strings)
//!     → response.rs ({success, message, data, error} envelope)
//!     → Send to client
//! ```
//!
//! # Design Decisions
//! - Submission answers 202 with an operation id unless `wait_ms` is given
//! - Validation failures are 400 and never enqueue anything
//! - A refused enqueue (full, closed, unpersisted) is a 503

pub mod handlers;
pub mod request;
pub mod response;
pub mod server;

pub use request::X_REQUEST_ID;
pub use response::{ApiError, ApiResponse};
pub use server::{build_router, AppState, HttpServer};
