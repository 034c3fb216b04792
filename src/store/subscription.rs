//! Change-callback registry.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies a registered callback or watch stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Create a new random subscription id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

pub(crate) type Callback = Arc<dyn Fn() + Send + Sync>;

/// Callbacks in registration order.
#[derive(Default)]
pub(crate) struct Subscribers {
    entries: Mutex<Vec<(SubscriptionId, Callback)>>,
}

impl Subscribers {
    // A callback that panicked must not disable notification for the others.
    fn entries(&self) -> MutexGuard<'_, Vec<(SubscriptionId, Callback)>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, callback: Callback) -> SubscriptionId {
        let id = SubscriptionId::new();
        self.entries().push((id, callback));
        id
    }

    pub fn remove(&self, id: SubscriptionId) -> bool {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|(entry, _)| *entry != id);
        entries.len() != before
    }

    /// Callbacks to invoke, cloned so none runs under the registry lock.
    pub fn snapshot(&self) -> Vec<Callback> {
        self.entries().iter().map(|(_, callback)| Arc::clone(callback)).collect()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }
}

/// Handle returned by [`Store::subscribe`](crate::Store::subscribe).
///
/// Dropping the handle keeps the callback registered; call
/// [`Subscription::unsubscribe`] to remove it.
pub struct Subscription {
    id: SubscriptionId,
    registry: Weak<Subscribers>,
}

impl Subscription {
    pub(crate) fn new(id: SubscriptionId, registry: &Arc<Subscribers>) -> Self {
        Self {
            id,
            registry: Arc::downgrade(registry),
        }
    }

    /// The id backing this subscription.
    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Removes the callback. Returns false if it was already removed or the
    /// store is gone.
    pub fn unsubscribe(self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|registry| registry.remove(self.id))
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
