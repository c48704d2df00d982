//! Route handlers.
//!
//! The operations API exposes the dispatch layer directly. The `/api/v1/web3`
//! and `/wallets` shortcuts build one typed operation each and, with
//! `?wait_ms=`, answer with its payload once it completes.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

use crate::completion::{OperationStatus, WaitError};
use crate::health::HealthState;
use crate::http::request::{SubmitBody, TimeoutQuery, WaitQuery};
use crate::http::response::{self, ApiError, ApiResponse};
use crate::http::server::AppState;
use crate::operation::{build_request, build_request_named, OperationId, OperationKind, OperationRequest, SubmitParams};
use crate::queue::{CancelOutcome, Topic};

fn parse_id(raw: &str) -> Result<OperationId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("'{raw}' is not a valid operation id")))
}

async fn submit(state: &AppState, request: OperationRequest, wait: WaitQuery) -> Result<Response, ApiError> {
    let submission = state.dispatcher.submit(request).await?;
    let Some(wait_ms) = wait.wait_ms else {
        return Ok(response::accepted(&submission));
    };

    match state.results().wait(submission.id, state.clamp_wait(wait_ms)).await {
        Ok(done) => Ok(response::outcome(submission.id, &done)),
        Err(WaitError::TimedOut(_)) => Ok(response::accepted(&submission)),
        Err(WaitError::NotFound) => Err(ApiError::NotFound(format!("operation {} not found", submission.id))),
    }
}

async fn shortcut(
    state: &AppState,
    kind: OperationKind,
    params: SubmitParams,
    wait: WaitQuery,
) -> Result<Response, ApiError> {
    let request = build_request(kind, &params)?;
    submit(state, request, wait).await
}

fn with_address(address: String) -> SubmitParams {
    SubmitParams {
        address: Some(address),
        ..SubmitParams::default()
    }
}

fn with_hash(hash: String) -> SubmitParams {
    SubmitParams {
        tx_hash: Some(hash),
        ..SubmitParams::default()
    }
}

// --- Operations API ---

pub async fn submit_operation(
    State(state): State<AppState>,
    Query(wait): Query<WaitQuery>,
    Json(body): Json<SubmitBody>,
) -> Result<Response, ApiError> {
    let request = build_request_named(&body.kind, &body.params)?;
    submit(&state, request, wait).await
}

pub async fn get_operation(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, ApiError> {
    let id = parse_id(&id)?;
    match state.results().status(id) {
        Some(OperationStatus::Completed(done)) => Ok(response::completed(id, &done)),
        Some(OperationStatus::Pending) => Ok(response::pending(id)),
        None => Err(ApiError::NotFound(format!("operation {id} not found"))),
    }
}

pub async fn wait_operation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<TimeoutQuery>,
) -> Result<Response, ApiError> {
    let id = parse_id(&id)?;
    let timeout = state.clamp_wait(query.timeout_ms.unwrap_or(u64::MAX));
    match state.results().wait(id, timeout).await {
        Ok(done) => Ok(response::completed(id, &done)),
        Err(WaitError::TimedOut(_)) => Ok(response::pending(id)),
        Err(WaitError::NotFound) => Err(ApiError::NotFound(format!("operation {id} not found"))),
    }
}

pub async fn cancel_operation(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, ApiError> {
    let id = parse_id(&id)?;
    match state.dispatcher.cancel(id).await? {
        CancelOutcome::Cancelled => {
            let data = json!({ "operation_id": id, "status": "cancelled" });
            Ok((StatusCode::OK, Json(ApiResponse::ok("Operation cancelled", data))).into_response())
        }
        CancelOutcome::Running => Err(ApiError::Conflict(format!(
            "operation {id} is already executing"
        ))),
        CancelOutcome::AlreadyComplete => Err(ApiError::Conflict(format!(
            "operation {id} has already completed"
        ))),
        CancelOutcome::NotFound => Err(ApiError::NotFound(format!("operation {id} not found"))),
    }
}

// --- Chain read shortcuts ---

pub async fn balance(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Query(wait): Query<WaitQuery>,
) -> Result<Response, ApiError> {
    shortcut(&state, OperationKind::GetBalance, with_address(address), wait).await
}

pub async fn transaction_count(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Query(wait): Query<WaitQuery>,
) -> Result<Response, ApiError> {
    shortcut(&state, OperationKind::GetTransactionCount, with_address(address), wait).await
}

pub async fn gas_price(State(state): State<AppState>, Query(wait): Query<WaitQuery>) -> Result<Response, ApiError> {
    shortcut(&state, OperationKind::GetGasPrice, SubmitParams::default(), wait).await
}

pub async fn latest_block(State(state): State<AppState>, Query(wait): Query<WaitQuery>) -> Result<Response, ApiError> {
    shortcut(&state, OperationKind::GetLatestBlock, SubmitParams::default(), wait).await
}

pub async fn block(
    State(state): State<AppState>,
    Path(number): Path<u64>,
    Query(wait): Query<WaitQuery>,
) -> Result<Response, ApiError> {
    let params = SubmitParams {
        block_number: Some(number),
        ..SubmitParams::default()
    };
    shortcut(&state, OperationKind::GetBlock, params, wait).await
}

pub async fn transaction(
    State(state): State<AppState>,
    Path(hash): Path<String>,
    Query(wait): Query<WaitQuery>,
) -> Result<Response, ApiError> {
    shortcut(&state, OperationKind::GetTransaction, with_hash(hash), wait).await
}

pub async fn transaction_receipt(
    State(state): State<AppState>,
    Path(hash): Path<String>,
    Query(wait): Query<WaitQuery>,
) -> Result<Response, ApiError> {
    shortcut(&state, OperationKind::GetTransactionReceipt, with_hash(hash), wait).await
}

/// `?from=&to=&value=` with value in ETH.
pub async fn estimate_gas(
    State(state): State<AppState>,
    Query(params): Query<SubmitParams>,
    Query(wait): Query<WaitQuery>,
) -> Result<Response, ApiError> {
    shortcut(&state, OperationKind::EstimateGas, params, wait).await
}

pub async fn network_info(State(state): State<AppState>, Query(wait): Query<WaitQuery>) -> Result<Response, ApiError> {
    shortcut(&state, OperationKind::GetNetworkInfo, SubmitParams::default(), wait).await
}

// --- Wallet shortcuts ---

pub async fn create_wallet(State(state): State<AppState>, Query(wait): Query<WaitQuery>) -> Result<Response, ApiError> {
    shortcut(&state, OperationKind::CreateWallet, SubmitParams::default(), wait).await
}

pub async fn wallet_balance(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Query(wait): Query<WaitQuery>,
) -> Result<Response, ApiError> {
    shortcut(&state, OperationKind::GetBalance, with_address(address), wait).await
}

/// `?from=&to=&amount=[&nonce=]` with amount in ETH.
pub async fn send_funds(
    State(state): State<AppState>,
    Query(params): Query<SubmitParams>,
    Query(wait): Query<WaitQuery>,
) -> Result<Response, ApiError> {
    shortcut(&state, OperationKind::SendFunds, params, wait).await
}

pub async fn transaction_history(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Query(wait): Query<WaitQuery>,
) -> Result<Response, ApiError> {
    shortcut(&state, OperationKind::GetTransactionHistory, with_address(address), wait).await
}

// --- Health ---

pub async fn health(State(state): State<AppState>) -> Response {
    let broker = state.dispatcher.broker();
    let queues: serde_json::Map<String, Value> = Topic::ALL
        .into_iter()
        .map(|topic| {
            (
                topic.name().to_string(),
                json!({ "depth": broker.depth(topic), "in_flight": broker.in_flight(topic) }),
            )
        })
        .collect();

    let chain = state.health.as_ref().map(|tracker| tracker.snapshot());
    let healthy = chain.map_or(true, |snapshot| snapshot.state != HealthState::Unhealthy);

    let data = json!({
        "status": if healthy { "ok" } else { "degraded" },
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "chain": chain,
        "queues": queues,
        "pending_operations": state.results().pending_count(),
    });
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(ApiResponse::ok("Health status", data))).into_response()
}

