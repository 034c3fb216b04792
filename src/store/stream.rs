use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ExecutionError, StoreError, StoreResult};

use super::subscription::SubscriptionId;

/// Mutation that produced a [`StoreEvent`].
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Set,
    Add,
    Update,
    Delete,
}

/// A foreground mutation as seen by watch streams.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreEvent {
    /// Monotonic per-store counter.
    pub sequence: u64,
    pub operation: Operation,
    pub record_type: String,
    /// Ids written or removed by the call, in input order.
    pub ids: Vec<String>,
    pub at: DateTime<Utc>,
}

#[derive(Default)]
pub(crate) struct Watchers {
    senders: Mutex<Vec<(SubscriptionId, Sender<StoreEvent>)>>,
    dropped_events: AtomicU64,
}

impl Watchers {
    fn senders(&self) -> MutexGuard<'_, Vec<(SubscriptionId, Sender<StoreEvent>)>> {
        self.senders.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(self: &Arc<Self>, capacity: usize) -> StoreStream {
        let (tx, rx) = bounded(capacity.max(1));
        let id = SubscriptionId::new();
        self.senders().push((id, tx));
        StoreStream {
            id,
            rx,
            registry: Arc::downgrade(self),
            unregistered: AtomicBool::new(false),
        }
    }

    pub fn unregister(&self, id: SubscriptionId) -> bool {
        let mut senders = self.senders();
        let before = senders.len();
        senders.retain(|(entry, _)| *entry != id);
        senders.len() != before
    }

    /// Never blocks: a full stream loses the event, a disconnected one is
    /// pruned.
    pub fn broadcast(&self, event: &StoreEvent) {
        self.senders().retain(|(id, tx)| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.dropped_events.fetch_add(1, Ordering::Relaxed);
                warn!(subscription_id = %id, sequence = event.sequence, "watch stream full, event dropped");
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
    }

    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.senders().len()
    }
}

/// A stream of store events.
///
/// Dropping this stream unregisters it.
pub struct StoreStream {
    id: SubscriptionId,
    rx: Receiver<StoreEvent>,
    registry: Weak<Watchers>,
    unregistered: AtomicBool,
}

impl StoreStream {
    /// The id backing this stream.
    #[must_use]
    pub const fn subscription_id(&self) -> SubscriptionId {
        self.id
    }

    /// Explicit unregistration. Idempotent; events already buffered can
    /// still be received.
    pub fn unsubscribe(&self) {
        if self.unregistered.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.unregister(self.id);
        }
    }

    /// Receive the next event (blocking).
    pub fn recv(&self) -> StoreResult<StoreEvent> {
        self.rx.recv().map_err(|_| disconnected())
    }

    /// Receive the next event with a timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> StoreResult<StoreEvent> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => StoreError::Execution(ExecutionError::Timeout {
                duration_ms: timeout.as_millis().min(u128::from(u64::MAX)) as u64,
            }),
            RecvTimeoutError::Disconnected => disconnected(),
        })
    }

    /// Returns a buffered event, if any.
    pub fn try_recv(&self) -> StoreResult<Option<StoreEvent>> {
        match self.rx.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(disconnected()),
        }
    }
}

impl Drop for StoreStream {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for StoreStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreStream")
            .field("subscription_id", &self.id)
            .field("buffered", &self.rx.len())
            .finish()
    }
}

fn disconnected() -> StoreError {
    StoreError::Execution(ExecutionError::Disconnected {
        path: "store_stream".to_string(),
    })
}
