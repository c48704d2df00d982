//! Response envelope and error mapping.
//!
//! Every body has the shape `{success, message, data, error}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::completion::{Completion, OperationOutcome};
use crate::operation::{InvalidRequest, OperationId};
use crate::queue::{DispatchError, QueueError, Submission};

#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
            error: None,
        }
    }
}

impl ApiResponse<Value> {
    pub fn failed(message: impl Into<String>, error: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data,
            error: Some(error.into()),
        }
    }
}

/// Errors surfaced by handlers, each with a fixed status code.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "Invalid request",
            ApiError::NotFound(_) => "Not found",
            ApiError::Conflict(_) => "Conflict",
            ApiError::Unavailable(_) => "Service unavailable",
            ApiError::Internal(_) => "Internal error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ApiResponse::failed(self.message(), self.to_string(), None);
        (status, Json(body)).into_response()
    }
}

impl From<InvalidRequest> for ApiError {
    fn from(e: InvalidRequest) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl From<DispatchError> for ApiError {
    fn from(e: DispatchError) -> Self {
        match e {
            DispatchError::Queue(q) => ApiError::Unavailable(q.to_string()),
            DispatchError::Encode(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<QueueError> for ApiError {
    fn from(e: QueueError) -> Self {
        ApiError::Unavailable(e.to_string())
    }
}

/// 202 for a queued operation.
pub fn accepted(submission: &Submission) -> Response {
    let data = json!({
        "operation_id": submission.id,
        "kind": submission.kind,
        "topic": submission.topic,
        "status": "pending",
    });
    (StatusCode::ACCEPTED, Json(ApiResponse::ok("Operation queued", data))).into_response()
}

/// 202 for an operation that is still running.
pub fn pending(id: OperationId) -> Response {
    let data = json!({ "operation_id": id, "status": "pending" });
    (StatusCode::ACCEPTED, Json(ApiResponse::ok("Operation pending", data))).into_response()
}

/// Full completion record, for the operations API.
pub fn completed(id: OperationId, completion: &Completion) -> Response {
    let data = json!({
        "operation_id": id,
        "status": "completed",
        "result": completion,
    });
    (StatusCode::OK, Json(ApiResponse::ok("Operation completed", data))).into_response()
}

/// Payload only, for the shortcut routes. A failed operation is a 502.
pub fn outcome(id: OperationId, completion: &Completion) -> Response {
    match &completion.outcome {
        OperationOutcome::Success { payload } => {
            (StatusCode::OK, Json(ApiResponse::ok("Operation completed", payload.clone()))).into_response()
        }
        OperationOutcome::Failure { error } => (
            StatusCode::BAD_GATEWAY,
            Json(ApiResponse::failed(
                "Operation failed",
                error.clone(),
                Some(json!({ "operation_id": id })),
            )),
        )
            .into_response(),
    }
}
