//! Span helpers.
//!
//! Every unit of worker and submission work runs inside a span carrying the
//! operation id, so log lines from the cache, the retry loop and the chain
//! client can be correlated without threading the id through each call.

use tracing::Span;

use crate::operation::{OperationId, OperationKind};

/// Span for one worker executing one delivery.
pub fn operation_span(id: OperationId, kind: OperationKind, worker: &str, redelivered: bool) -> Span {
    tracing::info_span!(
        "operation",
        operation_id = %id,
        kind = %kind,
        worker = %worker,
        redelivered
    )
}

/// Span for a submission accepted at the edge.
pub fn submit_span(id: OperationId, kind: OperationKind) -> Span {
    tracing::debug_span!("submit", operation_id = %id, kind = %kind)
}
