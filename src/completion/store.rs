//! Write-once result slots keyed by operation id.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::operation::{OperationId, OperationKind};

/// Terminal result of an operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OperationOutcome {
    Success { payload: Value },
    Failure { error: String },
}

impl OperationOutcome {
    pub fn failure(error: impl ToString) -> Self {
        OperationOutcome::Failure {
            error: error.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, OperationOutcome::Success { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            OperationOutcome::Success { .. } => "success",
            OperationOutcome::Failure { .. } => "failure",
        }
    }
}

/// A recorded result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Completion {
    #[serde(flatten)]
    pub outcome: OperationOutcome,
    pub completed_at_ms: u64,
    #[serde(skip)]
    completed_at: Instant,
}

impl Completion {
    fn new(outcome: OperationOutcome) -> Self {
        Self {
            outcome,
            completed_at_ms: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or_default(),
            completed_at: Instant::now(),
        }
    }
}

/// Poll view of an operation.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationStatus {
    Pending,
    Completed(Arc<Completion>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WaitError {
    #[error("operation not found")]
    NotFound,
    #[error("operation still pending after {0:?}")]
    TimedOut(Duration),
}

/// Result of trying to take exclusive execution of an operation.
#[derive(Debug)]
pub enum Claim {
    /// Caller may execute; the claim is released when the guard drops.
    Acquired(ClaimGuard),
    /// Another worker is executing it right now.
    InFlight,
    /// A result is already recorded.
    AlreadyComplete,
}

#[derive(Debug)]
pub struct ClaimGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

struct Slot {
    /// `None` for payloads whose kind could not be decoded.
    kind: Option<OperationKind>,
    result: watch::Sender<Option<Arc<Completion>>>,
    claimed: Arc<AtomicBool>,
}

impl Slot {
    fn new(kind: Option<OperationKind>) -> Self {
        let (result, _) = watch::channel(None);
        Self {
            kind,
            result,
            claimed: Arc::new(AtomicBool::new(false)),
        }
    }

    fn completion(&self) -> Option<Arc<Completion>> {
        self.result.borrow().clone()
    }
}

/// Shared store of result slots.
///
/// The pending → completed transition happens at most once per id; later
/// attempts are ignored and reported as such.
#[derive(Clone, Default)]
pub struct ResultStore {
    slots: Arc<DashMap<OperationId, Slot>>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a freshly submitted operation as pending.
    pub fn register(&self, id: OperationId, kind: OperationKind) {
        self.slots.entry(id).or_insert_with(|| Slot::new(Some(kind)));
    }

    pub fn kind_of(&self, id: OperationId) -> Option<OperationKind> {
        self.slots.get(&id).and_then(|slot| slot.kind)
    }

    /// Record the terminal result. Returns `false` if one was already recorded.
    ///
    /// Completing an id this store has never seen (for example one replayed
    /// from the queue journal after a restart) creates its slot.
    pub fn complete(&self, id: OperationId, kind: OperationKind, outcome: OperationOutcome) -> bool {
        self.settle(id, Some(kind), outcome)
    }

    /// Record a failure for a payload whose kind could not be decoded.
    pub fn fail_undecodable(&self, id: OperationId, error: impl ToString) -> bool {
        self.settle(id, None, OperationOutcome::failure(error))
    }

    fn settle(&self, id: OperationId, kind: Option<OperationKind>, outcome: OperationOutcome) -> bool {
        let completion = Arc::new(Completion::new(outcome));
        let slot = self.slots.entry(id).or_insert_with(|| Slot::new(kind));
        slot.result.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(completion);
            true
        })
    }

    /// Poll: `None` when the id is unknown.
    pub fn status(&self, id: OperationId) -> Option<OperationStatus> {
        self.slots.get(&id).map(|slot| match slot.completion() {
            Some(done) => OperationStatus::Completed(done),
            None => OperationStatus::Pending,
        })
    }

    /// Await completion for at most `timeout`.
    pub async fn wait(&self, id: OperationId, timeout: Duration) -> Result<Arc<Completion>, WaitError> {
        let mut rx = self
            .slots
            .get(&id)
            .map(|slot| slot.result.subscribe())
            .ok_or(WaitError::NotFound)?;

        // Bound to a local so the borrowed value drops before `rx`.
        let waited = match tokio::time::timeout(timeout, rx.wait_for(Option::is_some)).await {
            Ok(Ok(done)) => done.clone().ok_or(WaitError::NotFound),
            // Sender dropped: the slot was purged while we waited
            Ok(Err(_)) => Err(WaitError::NotFound),
            Err(_) => Err(WaitError::TimedOut(timeout)),
        };
        waited
    }

    /// Take exclusive execution rights for a delivery of `id`.
    pub fn try_claim(&self, id: OperationId, kind: OperationKind) -> Claim {
        let slot = self.slots.entry(id).or_insert_with(|| Slot::new(Some(kind)));
        if slot.result.borrow().is_some() {
            return Claim::AlreadyComplete;
        }
        if slot.claimed.swap(true, Ordering::AcqRel) {
            return Claim::InFlight;
        }
        Claim::Acquired(ClaimGuard {
            flag: slot.claimed.clone(),
        })
    }

    /// Drop results completed more than `retention` ago. Pending slots stay.
    pub fn purge_completed(&self, retention: Duration) -> usize {
        let now = Instant::now();
        let before = self.slots.len();
        self.slots.retain(|_, slot| match slot.completion() {
            Some(done) => now.duration_since(done.completed_at) < retention,
            None => true,
        });
        before.saturating_sub(self.slots.len())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.result.borrow().is_none())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn success(v: Value) -> OperationOutcome {
        OperationOutcome::Success { payload: v }
    }

    #[test]
    fn test_poll_tri_state() {
        let store = ResultStore::new();
        let id = OperationId::new();
        assert!(store.status(id).is_none());

        store.register(id, OperationKind::GetGasPrice);
        assert_eq!(store.status(id), Some(OperationStatus::Pending));

        assert!(store.complete(id, OperationKind::GetGasPrice, success(json!("7"))));
        match store.status(id) {
            Some(OperationStatus::Completed(done)) => assert_eq!(done.outcome, success(json!("7"))),
            other => panic!("unexpected status {other:?}"),
        }
    }

    #[test]
    fn test_result_is_write_once() {
        let store = ResultStore::new();
        let id = OperationId::new();
        store.register(id, OperationKind::GetBalance);

        assert!(store.complete(id, OperationKind::GetBalance, success(json!(1))));
        assert!(!store.complete(id, OperationKind::GetBalance, OperationOutcome::failure("late")));

        let Some(OperationStatus::Completed(done)) = store.status(id) else {
            panic!("expected completion");
        };
        assert_eq!(done.outcome, success(json!(1)));
    }

    #[tokio::test]
    async fn test_wait_resolves_on_completion() {
        let store = ResultStore::new();
        let id = OperationId::new();
        store.register(id, OperationKind::GetLatestBlock);

        let waiter = {
            let store = store.clone();
            tokio::spawn(async move { store.wait(id, Duration::from_secs(5)).await })
        };
        tokio::task::yield_now().await;
        store.complete(id, OperationKind::GetLatestBlock, success(json!({"number": 1})));

        let done = waiter.await.unwrap().unwrap();
        assert!(done.outcome.is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out_and_unknown_is_not_found() {
        let store = ResultStore::new();
        let id = OperationId::new();
        assert_eq!(store.wait(id, Duration::from_secs(1)).await, Err(WaitError::NotFound));

        store.register(id, OperationKind::GetBlock);
        assert_eq!(
            store.wait(id, Duration::from_secs(1)).await,
            Err(WaitError::TimedOut(Duration::from_secs(1)))
        );
    }

    #[tokio::test]
    async fn test_wait_ends_when_slot_is_dropped() {
        let store = ResultStore::new();
        let id = OperationId::new();
        store.register(id, OperationKind::GetGasPrice);

        let waiter = {
            let store = store.clone();
            tokio::spawn(async move { store.wait(id, Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        store.slots.remove(&id);

        assert_eq!(waiter.await.unwrap(), Err(WaitError::NotFound));
    }

    #[test]
    fn test_claims() {
        let store = ResultStore::new();
        let id = OperationId::new();

        let guard = match store.try_claim(id, OperationKind::SendFunds) {
            Claim::Acquired(guard) => guard,
            other => panic!("expected claim, got {other:?}"),
        };
        assert!(matches!(store.try_claim(id, OperationKind::SendFunds), Claim::InFlight));

        // A crashed worker releases its claim
        drop(guard);
        let guard = store.try_claim(id, OperationKind::SendFunds);
        assert!(matches!(guard, Claim::Acquired(_)));

        store.complete(id, OperationKind::SendFunds, success(json!("0x01")));
        drop(guard);
        assert!(matches!(store.try_claim(id, OperationKind::SendFunds), Claim::AlreadyComplete));
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_keeps_pending_and_recent() {
        let store = ResultStore::new();
        let old = OperationId::new();
        let recent = OperationId::new();
        let pending = OperationId::new();

        store.complete(old, OperationKind::GetGasPrice, success(json!(1)));
        tokio::time::advance(Duration::from_secs(120)).await;
        store.complete(recent, OperationKind::GetGasPrice, success(json!(2)));
        store.register(pending, OperationKind::GetGasPrice);

        assert_eq!(store.purge_completed(Duration::from_secs(60)), 1);
        assert!(store.status(old).is_none());
        assert!(store.status(recent).is_some());
        assert_eq!(store.status(pending), Some(OperationStatus::Pending));
    }

    #[test]
    fn test_undecodable_failure_is_recorded() {
        let store = ResultStore::new();
        let id = OperationId::new();
        assert!(store.fail_undecodable(id, "unknown operation kind 'MINT'"));
        assert!(store.kind_of(id).is_none());
        assert!(matches!(store.status(id), Some(OperationStatus::Completed(_))));
    }

    #[test]
    fn test_outcome_serialization() {
        let failure = serde_json::to_value(OperationOutcome::failure("boom")).unwrap();
        assert_eq!(failure, json!({"status": "failure", "error": "boom"}));
    }
}
