//! Insert-once outcome store and the one-shot completion barrier.
//!
//! Every dispatched `(kind, file)` key gets exactly one outcome. Writers call
//! [`OutcomeStore::record`]; the orchestrator waits on a [`CompletionBarrier`]
//! which releases once every key is settled or the deadline passes.

use crate::models::{OutcomeKey, TaskKind, TaskOutcome};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Rejected writes to the outcome store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    /// The key already has an outcome; the first write wins.
    #[error("outcome for {0} already recorded")]
    Duplicate(OutcomeKey),

    /// The key was never dispatched for this wave.
    #[error("{0} was not dispatched")]
    Unexpected(OutcomeKey),

    /// The barrier already released; late results are dropped.
    #[error("store sealed, late outcome for {0} dropped")]
    Sealed(OutcomeKey),
}

#[derive(Debug, Default)]
struct StoreState {
    expected: BTreeSet<OutcomeKey>,
    outcomes: BTreeMap<OutcomeKey, TaskOutcome>,
    sealed: bool,
}

impl StoreState {
    fn pending(&self) -> impl Iterator<Item = &OutcomeKey> {
        self.expected
            .iter()
            .filter(|key| !self.outcomes.contains_key(*key))
    }
}

/// Keyed outcome store shared by the units of one wave.
#[derive(Debug)]
pub struct OutcomeStore {
    state: Mutex<StoreState>,
    changed: Notify,
}

impl OutcomeStore {
    /// Create a store expecting exactly the given keys.
    pub fn new(expected: impl IntoIterator<Item = OutcomeKey>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(StoreState {
                expected: expected.into_iter().collect(),
                ..StoreState::default()
            }),
            changed: Notify::new(),
        })
    }

    /// Record an outcome. Insert-once: the first write for a key wins.
    pub fn record(&self, key: OutcomeKey, outcome: TaskOutcome) -> Result<(), RecordError> {
        {
            let mut state = self.lock();
            if state.sealed {
                return Err(RecordError::Sealed(key));
            }
            if !state.expected.contains(&key) {
                return Err(RecordError::Unexpected(key));
            }
            if state.outcomes.contains_key(&key) {
                return Err(RecordError::Duplicate(key));
            }
            debug!("Recorded {} ({})", key, outcome_label(&outcome));
            state.outcomes.insert(key, outcome);
        }
        self.changed.notify_one();
        Ok(())
    }

    /// Keys of the given kind that have no outcome yet.
    pub fn pending_for(&self, kind: TaskKind) -> Vec<OutcomeKey> {
        self.lock()
            .pending()
            .filter(|key| key.kind == kind)
            .cloned()
            .collect()
    }

    /// Number of keys still waiting for an outcome.
    pub fn pending_count(&self) -> usize {
        self.lock().pending().count()
    }

    /// Force-resolve anything pending, seal the store and hand back its contents.
    fn seal(&self) -> Settled {
        let mut state = self.lock();
        let forced: Vec<OutcomeKey> = state.pending().cloned().collect();
        for key in &forced {
            let detail = format!("{} still running when the global deadline elapsed", key.kind);
            state
                .outcomes
                .insert(key.clone(), TaskOutcome::timeout(detail));
        }
        state.sealed = true;

        Settled {
            outcomes: std::mem::take(&mut state.outcomes),
            forced,
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        // A writer that panicked mid-insert leaves the map consistent.
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn outcome_label(outcome: &TaskOutcome) -> String {
    match outcome {
        TaskOutcome::Success(_) => "success".to_string(),
        TaskOutcome::Failure { reason, .. } => format!("failure: {}", reason),
    }
}

/// Contents of a sealed store.
#[derive(Debug, Clone, Default)]
pub struct Settled {
    /// Exactly one outcome per expected key.
    pub outcomes: BTreeMap<OutcomeKey, TaskOutcome>,
    /// Keys the barrier resolved to a timeout at the deadline.
    pub forced: Vec<OutcomeKey>,
}

impl Settled {
    /// Fold another wave's settled outcomes into this one.
    pub fn merge(&mut self, other: Settled) {
        self.outcomes.extend(other.outcomes);
        self.forced.extend(other.forced);
    }
}

/// One-shot barrier over an [`OutcomeStore`].
pub struct CompletionBarrier {
    store: Arc<OutcomeStore>,
}

impl CompletionBarrier {
    pub fn new(store: Arc<OutcomeStore>) -> Self {
        Self { store }
    }

    /// Wait until every key is settled or the deadline passes.
    ///
    /// Consumes the barrier; the store is sealed on return and any write
    /// after that is rejected with [`RecordError::Sealed`].
    pub async fn wait(self, deadline: Instant) -> Settled {
        loop {
            if self.store.pending_count() == 0 {
                break;
            }
            if tokio::time::timeout_at(deadline, self.store.changed.notified())
                .await
                .is_err()
            {
                warn!(
                    "Global deadline reached with {} outcome(s) pending",
                    self.store.pending_count()
                );
                break;
            }
        }
        self.store.seal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocumentationReport, FailureReason, Payload};
    use std::time::Duration;

    fn doc_outcome() -> TaskOutcome {
        TaskOutcome::Success(Payload::Documentation(DocumentationReport {
            coverage_percent: 100.0,
            total_items: 1,
            documented_items: 1,
            missing: vec![],
        }))
    }

    fn key(kind: TaskKind, file: &str) -> OutcomeKey {
        OutcomeKey::new(kind, file)
    }

    #[test]
    fn test_insert_once() {
        let store = OutcomeStore::new([key(TaskKind::Documentation, "a.py")]);
        store
            .record(key(TaskKind::Documentation, "a.py"), doc_outcome())
            .unwrap();

        let second = store.record(
            key(TaskKind::Documentation, "a.py"),
            TaskOutcome::timeout("late"),
        );
        assert_eq!(
            second,
            Err(RecordError::Duplicate(key(TaskKind::Documentation, "a.py")))
        );
        assert_eq!(store.pending_count(), 0);
    }

    #[test]
    fn test_unexpected_key_rejected() {
        let store = OutcomeStore::new([key(TaskKind::Security, "a.py")]);
        let result = store.record(key(TaskKind::Quality, "a.py"), doc_outcome());
        assert!(matches!(result, Err(RecordError::Unexpected(_))));
        assert_eq!(store.pending_count(), 1);
    }

    #[test]
    fn test_pending_for_kind() {
        let store = OutcomeStore::new([
            key(TaskKind::Security, "a.py"),
            key(TaskKind::Security, "b.py"),
            key(TaskKind::Quality, "a.py"),
        ]);
        store
            .record(key(TaskKind::Security, "a.py"), TaskOutcome::timeout("x"))
            .unwrap();

        assert_eq!(
            store.pending_for(TaskKind::Security),
            vec![key(TaskKind::Security, "b.py")]
        );
        assert_eq!(store.pending_count(), 2);
    }

    #[tokio::test]
    async fn test_barrier_releases_when_complete() {
        let store = OutcomeStore::new([
            key(TaskKind::Documentation, "a.py"),
            key(TaskKind::Documentation, "b.py"),
        ]);
        let barrier = CompletionBarrier::new(Arc::clone(&store));

        let writer = Arc::clone(&store);
        tokio::spawn(async move {
            writer
                .record(key(TaskKind::Documentation, "a.py"), doc_outcome())
                .unwrap();
            tokio::task::yield_now().await;
            writer
                .record(key(TaskKind::Documentation, "b.py"), doc_outcome())
                .unwrap();
        });

        let settled = barrier
            .wait(Instant::now() + Duration::from_secs(30))
            .await;
        assert_eq!(settled.outcomes.len(), 2);
        assert!(settled.forced.is_empty());
        assert!(settled.outcomes.values().all(|o| !o.is_failure()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_barrier_deadline_forces_timeouts_and_seals() {
        let store = OutcomeStore::new([
            key(TaskKind::Security, "a.py"),
            key(TaskKind::Quality, "a.py"),
        ]);
        store
            .record(key(TaskKind::Security, "a.py"), TaskOutcome::timeout("own"))
            .unwrap();

        let barrier = CompletionBarrier::new(Arc::clone(&store));
        let settled = barrier
            .wait(Instant::now() + Duration::from_secs(5))
            .await;

        assert_eq!(settled.forced, vec![key(TaskKind::Quality, "a.py")]);
        match &settled.outcomes[&key(TaskKind::Quality, "a.py")] {
            TaskOutcome::Failure { reason, .. } => assert_eq!(*reason, FailureReason::Timeout),
            other => panic!("expected forced timeout, got {:?}", other),
        }

        let late = store.record(key(TaskKind::Quality, "a.py"), doc_outcome());
        assert!(matches!(late, Err(RecordError::Sealed(_))));
    }

    #[tokio::test]
    async fn test_empty_store_releases_immediately() {
        let store = OutcomeStore::new(Vec::new());
        let settled = CompletionBarrier::new(store)
            .wait(Instant::now() + Duration::from_secs(1))
            .await;
        assert!(settled.outcomes.is_empty());
        assert!(settled.forced.is_empty());
    }
}
