//! Request bodies, query strings and request ids.

use axum::http::HeaderMap;
use serde::Deserialize;

use crate::operation::SubmitParams;

pub const X_REQUEST_ID: &str = "x-request-id";

/// Body of `POST /api/v1/operations`.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitBody {
    pub kind: String,
    #[serde(default)]
    pub params: SubmitParams,
}

/// `?wait_ms=` on submitting routes. Absent means return 202 immediately.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct WaitQuery {
    pub wait_ms: Option<u64>,
}

/// `?timeout_ms=` on the wait route. Absent means the configured maximum.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct TimeoutQuery {
    pub timeout_ms: Option<u64>,
}

/// Request id assigned by the request-id layer, if any.
pub fn request_id(headers: &HeaderMap) -> &str {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
}
