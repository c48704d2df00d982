//! Startup orchestration.
//!
//! # Responsibilities
//! - Open the queues, replaying any journal left by a previous run
//! - Initialize subsystems in dependency order
//! - Start background tasks (workers, health checks, maintenance)
//! - Bind the listener and begin accepting traffic
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - Listeners start last (traffic only when ready)

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinSet;

use crate::blockchain::{BlockchainError, ChainClient, RpcChainClient};
use crate::cache::ResultCache;
use crate::completion::ResultStore;
use crate::config::GatewayConfig;
use crate::health::{ChainHealthMonitor, HealthTracker};
use crate::http::{AppState, HttpServer};
use crate::lifecycle::{signals, Shutdown};
use crate::observability::metrics;
use crate::operation::Operation;
use crate::queue::{Broker, Dispatcher, MemoryBroker, QueueError, Topic};
use crate::resilience::{RetryExecutor, RetryPolicy};
use crate::worker::{AddressLocks, OperationHandler, WorkerPool};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("queue: {0}")]
    Queue(#[from] QueueError),

    #[error("chain client: {0}")]
    Chain(#[from] BlockchainError),

    #[error("listener: {0}")]
    Io(#[from] std::io::Error),
}

/// A running dispatch layer: queues, workers and background tasks.
///
/// The HTTP edge is attached separately through [`Gateway::app_state`].
pub struct Gateway {
    config: GatewayConfig,
    broker: Arc<dyn Broker>,
    dispatcher: Dispatcher,
    handler: Arc<OperationHandler>,
    health: Option<Arc<HealthTracker>>,
    shutdown: Shutdown,
    workers: WorkerPool,
    background: JoinSet<()>,
}

impl Gateway {
    /// Bring up everything behind the HTTP edge. Must run inside a Tokio runtime.
    pub async fn start(config: GatewayConfig, chain: Arc<dyn ChainClient>) -> Result<Self, StartupError> {
        let queue = MemoryBroker::open(&config.queues)?;
        let results = ResultStore::new();
        register_recovered(&queue, &results);
        let broker: Arc<dyn Broker> = Arc::new(queue.clone());

        let dispatcher = Dispatcher::new(broker.clone(), results.clone());

        let cache = ResultCache::new(config.cache.max_entries);
        let retry = RetryExecutor::new(RetryPolicy::from(&config.retries));
        let send_locks = config
            .workers
            .serialize_sends_per_address
            .then(AddressLocks::new);
        let handler = Arc::new(OperationHandler::new(
            chain.clone(),
            cache,
            config.cache.clone(),
            retry,
            send_locks,
        ));

        let shutdown = Shutdown::new();
        let workers = WorkerPool::start(
            broker.clone(),
            results.clone(),
            handler.clone(),
            config.workers.concurrency,
            shutdown.sender(),
        );

        let mut background = JoinSet::new();

        let health = if config.health_check.enabled {
            let monitor = ChainHealthMonitor::new(chain, config.health_check.clone());
            let tracker = monitor.tracker();
            background.spawn(monitor.run(shutdown.subscribe()));
            Some(tracker)
        } else {
            None
        };

        background.spawn(maintenance(
            queue,
            results,
            handler.clone(),
            Duration::from_secs(config.results.sweep_interval_secs),
            Duration::from_secs(config.results.retention_secs),
            shutdown.subscribe(),
        ));

        Ok(Self {
            config,
            broker,
            dispatcher,
            handler,
            health,
            shutdown,
            workers,
            background,
        })
    }

    /// Handler state for the HTTP edge.
    pub fn app_state(&self) -> AppState {
        AppState::new(
            self.dispatcher.clone(),
            self.health.clone(),
            Duration::from_millis(self.config.timeouts.max_wait_ms),
        )
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn handler(&self) -> &Arc<OperationHandler> {
        &self.handler
    }

    pub fn health(&self) -> Option<&Arc<HealthTracker>> {
        self.health.as_ref()
    }

    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Stop consuming. Workers finish the message in hand; anything still
    /// queued stays in the journal.
    pub async fn stop(mut self) {
        self.shutdown.trigger();
        self.broker.close();
        self.workers.join().await;
        while let Some(result) = self.background.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Background task failed");
            }
        }
        tracing::info!("Gateway stopped");
    }
}

/// Track operations replayed from the journal as pending, so they can be
/// polled and cancelled before a worker reaches them. Payloads that do not
/// decode are left for the workers to dead-letter.
fn register_recovered(queue: &MemoryBroker, results: &ResultStore) -> usize {
    let mut registered = 0;
    for topic in Topic::ALL {
        for payload in queue.queued_payloads(topic) {
            if let Ok(operation) = Operation::decode(&payload) {
                results.register(operation.id, operation.kind());
                registered += 1;
            }
        }
    }
    if registered > 0 {
        tracing::info!(registered, "Recovered queued operations");
    }
    registered
}

/// Periodic housekeeping: expire completions and cache entries, drop idle
/// sender locks, compact the queue journal, publish queue depth gauges.
async fn maintenance(
    queue: MemoryBroker,
    results: ResultStore,
    handler: Arc<OperationHandler>,
    every: Duration,
    retention: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(every);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.recv() => break,
        }

        let purged = results.purge_completed(retention);
        let expired = handler.cache().purge_expired();
        let pruned = handler.send_locks().map_or(0, |locks| locks.prune());
        if let Err(e) = queue.compact_journal().await {
            tracing::error!(error = %e, "Queue journal compaction failed");
        }
        metrics::record_cache_size(handler.cache().len());
        for topic in Topic::ALL {
            metrics::record_queue_depth(topic.name(), queue.depth(topic));
        }

        if purged + expired + pruned > 0 {
            tracing::debug!(purged, expired, pruned, "Maintenance sweep");
        }
    }
}

/// Full process lifecycle: start, serve until a signal, drain.
pub async fn run(config: GatewayConfig) -> Result<(), StartupError> {
    tracing::info!(
        bind_address = %config.listener.bind_address,
        rpc_url = %config.blockchain.rpc_url,
        workers_per_topic = config.workers.concurrency,
        durable = config.queues.is_durable(),
        "Configuration loaded"
    );

    let chain = RpcChainClient::new(config.blockchain.clone()).await?;
    let gateway = Gateway::start(config.clone(), Arc::new(chain)).await?;

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let server = HttpServer::new(gateway.app_state(), &config);

    let trigger = gateway.shutdown().clone();
    tokio::spawn(async move {
        let signal = signals::wait_for_signal().await;
        tracing::info!(signal, "Signal received, shutting down");
        trigger.trigger();
    });

    let served = server.run(listener, gateway.shutdown().wait()).await;
    gateway.stop().await;
    served?;

    tracing::info!("Shutdown complete");
    Ok(())
}
