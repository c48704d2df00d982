//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with all handlers
//! - Wire up middleware (request id, tracing, timeout, body limit, metrics)
//! - Serve on a bound listener until the shutdown future resolves

use axum::body::Body;
use axum::extract::{MatchedPath, Request};
use axum::http::Request as HttpRequest;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::completion::ResultStore;
use crate::config::GatewayConfig;
use crate::health::HealthTracker;
use crate::http::handlers;
use crate::http::request::request_id;
use crate::observability::metrics;
use crate::queue::Dispatcher;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Dispatcher,
    pub health: Option<Arc<HealthTracker>>,
    pub max_wait: Duration,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(dispatcher: Dispatcher, health: Option<Arc<HealthTracker>>, max_wait: Duration) -> Self {
        Self {
            dispatcher,
            health,
            max_wait,
            started_at: Instant::now(),
        }
    }

    pub fn results(&self) -> &ResultStore {
        self.dispatcher.results()
    }

    /// Bound a client-requested wait by the configured maximum.
    pub fn clamp_wait(&self, requested_ms: u64) -> Duration {
        Duration::from_millis(requested_ms).min(self.max_wait)
    }
}

/// Build the Axum router with all middleware layers.
#[allow(deprecated)]
pub fn build_router(state: AppState, config: &GatewayConfig) -> Router {
    let operations = Router::new()
        .route("/api/v1/operations", post(handlers::submit_operation))
        .route(
            "/api/v1/operations/{id}",
            get(handlers::get_operation).delete(handlers::cancel_operation),
        )
        .route("/api/v1/operations/{id}/wait", get(handlers::wait_operation));

    let web3 = Router::new()
        .route("/api/v1/web3/balance/{address}", get(handlers::balance))
        .route(
            "/api/v1/web3/transaction-count/{address}",
            get(handlers::transaction_count),
        )
        .route("/api/v1/web3/gas-price", get(handlers::gas_price))
        .route("/api/v1/web3/latest-block", get(handlers::latest_block))
        .route("/api/v1/web3/block/{number}", get(handlers::block))
        .route("/api/v1/web3/transaction/{hash}", get(handlers::transaction))
        .route(
            "/api/v1/web3/transaction-receipt/{hash}",
            get(handlers::transaction_receipt),
        )
        .route("/api/v1/web3/estimate-gas", post(handlers::estimate_gas))
        .route("/api/v1/web3/network-info", get(handlers::network_info))
        .route("/api/v1/web3/network-id", get(handlers::network_info))
        .route("/api/v1/web3/syncing", get(handlers::network_info));

    let wallets = Router::new()
        .route("/wallets/create", post(handlers::create_wallet))
        .route("/wallets/balance/{address}", get(handlers::wallet_balance))
        .route("/wallets/send", post(handlers::send_funds))
        .route("/wallets/transactions/{address}", get(handlers::transaction_history));

    Router::new()
        .merge(operations)
        .merge(web3)
        .merge(wallets)
        .route("/health", get(handlers::health))
        .route_layer(middleware::from_fn(track_metrics))
        .with_state(state)
        .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
        .layer(RequestBodyLimitLayer::new(config.listener.max_body_bytes))
        .layer(TraceLayer::new_for_http().make_span_with(|req: &HttpRequest<Body>| {
            tracing::info_span!(
                "http_request",
                method = %req.method(),
                uri = %req.uri(),
                request_id = %request_id(req.headers()),
            )
        }))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

/// Records latency and status per matched route.
async fn track_metrics(req: Request, next: Next) -> Response {
    let start = std::time::Instant::now();
    let method = req.method().to_string();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    let response = next.run(req).await;
    metrics::record_request(&method, response.status().as_u16(), &route, start);
    response
}

/// HTTP front end of the gateway.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(state: AppState, config: &GatewayConfig) -> Self {
        Self {
            router: build_router(state, config),
        }
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
