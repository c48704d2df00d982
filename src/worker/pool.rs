//! Fixed-size pool of queue consumers.

use serde_json::Value;
use std::any::Any;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tokio::task::{JoinError, JoinSet};
use tracing::Instrument;

use crate::blockchain::BlockchainResult;
use crate::completion::{Claim, OperationOutcome, ResultStore};
use crate::observability::{metrics, spans};
use crate::operation::{DecodeError, Operation};
use crate::queue::{Broker, Delivery, Topic};
use crate::worker::handler::OperationHandler;

/// Running consumer tasks, `concurrency` per topic.
pub struct WorkerPool {
    tasks: JoinSet<()>,
    size: usize,
}

impl WorkerPool {
    /// Spawn the workers. They stop when `shutdown` fires or the broker closes,
    /// finishing the message in hand first.
    pub fn start(
        broker: Arc<dyn Broker>,
        results: ResultStore,
        handler: Arc<OperationHandler>,
        concurrency: usize,
        shutdown: &broadcast::Sender<()>,
    ) -> Self {
        let mut tasks = JoinSet::new();
        for topic in Topic::ALL {
            for n in 0..concurrency {
                let worker = Worker {
                    name: format!("{topic}#{n}"),
                    topic,
                    broker: broker.clone(),
                    results: results.clone(),
                    handler: handler.clone(),
                };
                tasks.spawn(worker.run(shutdown.subscribe()));
            }
        }

        let size = tasks.len();
        tracing::info!(workers = size, per_topic = concurrency, "Worker pool started");
        Self { tasks, size }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Wait for every worker to exit.
    pub async fn join(mut self) {
        while let Some(result) = self.tasks.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Worker task failed");
            }
        }
        tracing::info!("Worker pool stopped");
    }
}

struct Worker {
    name: String,
    topic: Topic,
    broker: Arc<dyn Broker>,
    results: ResultStore,
    handler: Arc<OperationHandler>,
}

impl Worker {
    async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        loop {
            let delivery = tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                next = self.broker.receive(self.topic) => match next {
                    Some(delivery) => delivery,
                    None => break,
                },
            };
            self.process(delivery).await;
        }
        tracing::debug!(worker = %self.name, "Worker stopped");
    }

    async fn process(&self, delivery: Delivery) {
        match Operation::decode(&delivery.payload) {
            Ok(operation) => {
                let span = spans::operation_span(
                    operation.id,
                    operation.kind(),
                    &self.name,
                    delivery.redelivered,
                );
                self.execute(operation, delivery).instrument(span).await
            }
            Err(error) => self.dead_letter(delivery, error),
        }
    }

    /// Undecodable payloads are never redelivered. If the id survived, the
    /// failure becomes that operation's result.
    fn dead_letter(&self, delivery: Delivery, error: DecodeError) {
        metrics::record_dead_letter(self.topic.name());
        let settled = match error.operation_id() {
            Some(id) => {
                tracing::warn!(operation_id = %id, worker = %self.name, error = %error, "Undecodable operation");
                self.results.fail_undecodable(id, &error);
                delivery.ack()
            }
            None => {
                tracing::error!(key = %delivery.key, worker = %self.name, error = %error, "Rejecting malformed payload");
                delivery.reject()
            }
        };
        if let Err(e) = settled {
            tracing::error!(worker = %self.name, error = %e, "Failed to settle dead letter");
        }
    }

    async fn execute(&self, operation: Operation, delivery: Delivery) {
        let kind = operation.kind();
        let _claim = match self.results.try_claim(operation.id, kind) {
            Claim::Acquired(guard) => guard,
            Claim::InFlight | Claim::AlreadyComplete => {
                metrics::record_duplicate(self.topic.name());
                tracing::debug!("Duplicate delivery, skipping");
                if let Err(e) = delivery.ack() {
                    tracing::error!(error = %e, "Failed to ack duplicate delivery");
                }
                return;
            }
        };

        let started = Instant::now();
        let outcome = match self.run_isolated(&operation).await {
            Ok(Ok(payload)) => OperationOutcome::Success { payload },
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Operation failed");
                OperationOutcome::failure(e)
            }
            Err(e) if e.is_panic() => {
                let message = panic_message(e.into_panic());
                tracing::error!(panic = %message, "Operation panicked");
                metrics::record_panic(kind.as_str());
                OperationOutcome::failure(format!("operation panicked: {message}"))
            }
            Err(e) => {
                // Runtime shutting down; dropping the delivery requeues it.
                tracing::warn!(error = %e, "Operation task cancelled");
                return;
            }
        };
        let elapsed = started.elapsed();
        metrics::record_completed(kind.as_str(), outcome.label(), elapsed);

        if self.results.complete(operation.id, kind, outcome) {
            tracing::info!(elapsed_ms = elapsed.as_millis() as u64, "Operation completed");
        } else {
            tracing::debug!("Result was already recorded");
        }

        // Ack only once the result is stored.
        if let Err(e) = delivery.ack() {
            tracing::error!(error = %e, "Failed to ack delivery");
        }
    }

    /// Run the handler on its own task so a panic in chain code fails this
    /// operation instead of killing the worker.
    async fn run_isolated(&self, operation: &Operation) -> Result<BlockchainResult<Value>, JoinError> {
        let handler = self.handler.clone();
        let request = operation.request.clone();
        tokio::spawn(async move { handler.handle(&request).await }.in_current_span()).await
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(message) => message.to_string(),
            Err(_) => "unknown panic payload".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_panic_message_is_extracted() {
        let formatted = tokio::spawn(async { panic!("boom {}", 7) }).await.unwrap_err();
        assert_eq!(panic_message(formatted.into_panic()), "boom 7");

        let literal = tokio::spawn(async { panic!("static boom") }).await.unwrap_err();
        assert_eq!(panic_message(literal.into_panic()), "static boom");
    }
}
