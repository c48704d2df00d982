//! Submission side of the queue.

use std::sync::Arc;
use thiserror::Error;
use tracing::Instrument;

use crate::completion::{OperationOutcome, OperationStatus, ResultStore};
use crate::observability::{metrics, spans};
use crate::operation::{Operation, OperationId, OperationKind, OperationRequest};
use crate::queue::broker::{Broker, QueueError, Topic};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to encode operation: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Acknowledgement that an operation is durably queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submission {
    pub id: OperationId,
    pub kind: OperationKind,
    pub topic: Topic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Removed from the queue; its result is a cancellation failure.
    Cancelled,
    /// Already dequeued by a worker; it will run to completion.
    Running,
    AlreadyComplete,
    NotFound,
}

pub const CANCELLED_MESSAGE: &str = "operation cancelled before execution";

/// Accepts operations and persists them on their topic.
#[derive(Clone)]
pub struct Dispatcher {
    broker: Arc<dyn Broker>,
    results: ResultStore,
}

impl Dispatcher {
    pub fn new(broker: Arc<dyn Broker>, results: ResultStore) -> Self {
        Self { broker, results }
    }

    /// Enqueue a validated request.
    ///
    /// `Ok` confirms the operation is queued, durably when the broker keeps
    /// a journal. The operation is tracked only once the publish succeeds, so
    /// a refused or abandoned submission leaves no pending slot behind.
    pub async fn submit(&self, request: OperationRequest) -> Result<Submission, DispatchError> {
        let operation = Operation::new(request);
        let kind = operation.kind();
        let topic = kind.topic();

        async {
            let payload = operation.encode().map_err(DispatchError::from)?;

            if let Err(e) = self
                .broker
                .publish(topic, &operation.id.to_string(), payload)
                .await
            {
                metrics::record_rejected(topic.name(), e.reason());
                tracing::warn!(topic = %topic, error = %e, "Submission refused");
                return Err(DispatchError::from(e));
            }
            // A worker may already have claimed or completed the slot;
            // registering never overwrites it.
            self.results.register(operation.id, kind);

            metrics::record_submitted(kind.as_str());
            tracing::debug!(topic = %topic, "Operation queued");
            Ok::<_, DispatchError>(Submission {
                id: operation.id,
                kind,
                topic,
            })
        }
        .instrument(spans::submit_span(operation.id, kind))
        .await
    }

    /// Cancel an operation that no worker has picked up yet.
    pub async fn cancel(&self, id: OperationId) -> Result<CancelOutcome, QueueError> {
        let Some(kind) = self.results.kind_of(id) else {
            return Ok(CancelOutcome::NotFound);
        };
        if let Some(OperationStatus::Completed(_)) = self.results.status(id) {
            return Ok(CancelOutcome::AlreadyComplete);
        }

        if !self.broker.cancel(kind.topic(), &id.to_string()).await? {
            return Ok(CancelOutcome::Running);
        }

        self.results
            .complete(id, kind, OperationOutcome::failure(CANCELLED_MESSAGE));
        tracing::info!(operation_id = %id, kind = %kind, "Operation cancelled");
        Ok(CancelOutcome::Cancelled)
    }

    pub fn results(&self) -> &ResultStore {
        &self.results
    }

    pub fn broker(&self) -> &Arc<dyn Broker> {
        &self.broker
    }
}
