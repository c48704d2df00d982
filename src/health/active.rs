//! Active chain RPC health checking.
//!
//! # Responsibilities
//! - Periodically probe the chain client (`eth_blockNumber`)
//! - Update the health state machine from the probe result

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time;

use crate::blockchain::ChainClient;
use crate::config::HealthCheckConfig;
use crate::health::state::HealthTracker;
use crate::observability::metrics;

pub struct ChainHealthMonitor {
    chain: Arc<dyn ChainClient>,
    tracker: Arc<HealthTracker>,
    config: HealthCheckConfig,
}

impl ChainHealthMonitor {
    pub fn new(chain: Arc<dyn ChainClient>, config: HealthCheckConfig) -> Self {
        let tracker = Arc::new(HealthTracker::new(
            config.healthy_threshold,
            config.unhealthy_threshold,
        ));
        Self {
            chain,
            tracker,
            config,
        }
    }

    pub fn tracker(&self) -> Arc<HealthTracker> {
        self.tracker.clone()
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Chain health checks disabled");
            return;
        }

        tracing::info!(interval = self.config.interval_secs, "Chain health monitor starting");

        let mut ticker = time::interval(Duration::from_secs(self.config.interval_secs));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Chain health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Run one probe and record the result.
    pub async fn check(&self) {
        let timeout = Duration::from_secs(self.config.timeout_secs);
        match time::timeout(timeout, self.chain.get_block_number()).await {
            Ok(Ok(block)) => {
                if self.tracker.mark_success(block) {
                    tracing::info!(block, "Chain RPC is healthy");
                }
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Chain health probe failed");
                if self.tracker.mark_failure() {
                    tracing::error!("Chain RPC marked unhealthy");
                }
            }
            Err(_) => {
                tracing::warn!(timeout = ?timeout, "Chain health probe timed out");
                if self.tracker.mark_failure() {
                    tracing::error!("Chain RPC marked unhealthy");
                }
            }
        }
        metrics::record_chain_health(self.tracker.is_healthy());
    }
}
