//! Shutdown coordination for the gateway.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

/// Coordinator for graceful shutdown.
///
/// Long-running tasks subscribe to the broadcast channel; the HTTP server
/// awaits [`Shutdown::wait`]. Triggering is sticky, so late waiters resolve
/// immediately.
#[derive(Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
    triggered: Arc<watch::Sender<bool>>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        let (triggered, _) = watch::channel(false);
        Self {
            tx,
            triggered: Arc::new(triggered),
        }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    pub fn sender(&self) -> &broadcast::Sender<()> {
        &self.tx
    }

    /// Trigger the shutdown signal. Idempotent.
    pub fn trigger(&self) {
        if self.triggered.send_replace(true) {
            return;
        }
        tracing::info!("Shutdown triggered");
        let _ = self.tx.send(());
    }

    pub fn is_triggered(&self) -> bool {
        *self.triggered.borrow()
    }

    /// Resolves once [`Shutdown::trigger`] has been called.
    pub fn wait(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.triggered.subscribe();
        async move {
            let _ = rx.wait_for(|triggered| *triggered).await;
        }
    }

    /// Number of tasks still subscribed.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_trigger_reaches_subscribers_and_waiters() {
        let shutdown = Shutdown::new();
        let mut rx = shutdown.subscribe();
        let waiter = tokio::spawn(shutdown.wait());

        assert!(!shutdown.is_triggered());
        shutdown.trigger();
        shutdown.trigger();

        assert!(rx.recv().await.is_ok());
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(shutdown.is_triggered());
    }

    #[tokio::test]
    async fn test_late_waiter_resolves_immediately() {
        let shutdown = Shutdown::new();
        shutdown.trigger();
        tokio::time::timeout(Duration::from_millis(100), shutdown.wait())
            .await
            .unwrap();
    }
}
