//! Deferred mutation queue.
//!
//! A [`Batch`] records mutations and replays them in FIFO order on
//! [`Batch::commit`]. Without explicit options every operation but the last
//! runs in the background, so the whole batch notifies at most once, after
//! all of its changes have landed.

use serde_json::Value;
use tracing::debug;

use crate::error::StoreResult;
use crate::store::{MutationOptions, Store};

/// A queued mutation and its arguments.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOperation {
    Set { record_type: String, records: Vec<Value> },
    Add { record_type: String, record: Value },
    Update { record_type: String, id: String, attributes: Value },
    Delete { record_type: String, id: String },
}

/// Mutations queued against one store.
#[derive(Debug)]
#[must_use = "a batch does nothing until committed"]
pub struct Batch<'a> {
    store: &'a Store,
    queue: Vec<BatchOperation>,
}

impl<'a> Batch<'a> {
    pub(crate) fn new(store: &'a Store) -> Self {
        Self {
            store,
            queue: Vec::new(),
        }
    }

    /// Queues a [`Store::set`].
    pub fn set(&mut self, record_type: impl Into<String>, records: Vec<Value>) -> &mut Self {
        self.queue.push(BatchOperation::Set {
            record_type: record_type.into(),
            records,
        });
        self
    }

    /// Queues a [`Store::add`].
    pub fn add(&mut self, record_type: impl Into<String>, record: Value) -> &mut Self {
        self.queue.push(BatchOperation::Add {
            record_type: record_type.into(),
            record,
        });
        self
    }

    /// Queues a [`Store::update`].
    pub fn update(&mut self, record_type: impl Into<String>, id: impl Into<String>, attributes: Value) -> &mut Self {
        self.queue.push(BatchOperation::Update {
            record_type: record_type.into(),
            id: id.into(),
            attributes,
        });
        self
    }

    /// Queues a [`Store::delete`].
    pub fn delete(&mut self, record_type: impl Into<String>, id: impl Into<String>) -> &mut Self {
        self.queue.push(BatchOperation::Delete {
            record_type: record_type.into(),
            id: id.into(),
        });
        self
    }

    /// Queued operations, oldest first.
    #[must_use]
    pub fn operations(&self) -> &[BatchOperation] {
        &self.queue
    }

    /// Number of queued operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether nothing has been queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Replays the queue against the store.
    ///
    /// `options`, when given, applies to every operation. Otherwise all but
    /// the last operation run in the background and the last one notifies.
    ///
    /// # Errors
    /// The first failing operation's error. Operations applied before it stay
    /// applied; the rest of the queue is discarded.
    pub fn commit(self, options: Option<MutationOptions>) -> StoreResult<()> {
        let last = self.queue.len().saturating_sub(1);
        debug!(operations = self.queue.len(), explicit_options = options.is_some(), "committing batch");

        for (index, operation) in self.queue.into_iter().enumerate() {
            let options = options.unwrap_or(MutationOptions {
                background: index != last,
            });

            match operation {
                BatchOperation::Set { record_type, records } => {
                    self.store.set_with(&record_type, &records, options)?;
                }
                BatchOperation::Add { record_type, record } => {
                    self.store.add_with(&record_type, &record, options)?;
                }
                BatchOperation::Update {
                    record_type,
                    id,
                    attributes,
                } => self.store.update_with(&record_type, &id, &attributes, options)?,
                BatchOperation::Delete { record_type, id } => self.store.delete_with(&record_type, &id, options)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::schema::{Model, Schema};

    fn store() -> Store {
        Store::new(Schema::new().with_model("user", Model::new().attribute("name"))).unwrap()
    }

    fn counter(store: &Store) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        store.subscribe(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        count
    }

    #[test]
    fn queue_methods_chain() {
        let store = store();
        let mut batch = store.batch();
        batch
            .set("user", vec![json!({ "id": "a" })])
            .add("user", json!({ "id": "b" }))
            .delete("user", "a");

        assert_eq!(batch.len(), 3);
        assert!(matches!(batch.operations()[2], BatchOperation::Delete { .. }));
    }

    #[test]
    fn empty_commit_is_noop() {
        let store = store();
        let count = counter(&store);
        let batch = store.batch();
        assert!(batch.is_empty());
        batch.commit(None).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn explicit_options_apply_to_every_operation() {
        let store = store();
        let count = counter(&store);

        let mut batch = store.batch();
        batch.add("user", json!({ "id": "a" })).add("user", json!({ "id": "b" }));
        batch.commit(Some(MutationOptions::foreground())).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);

        let mut batch = store.batch();
        batch.update("user", "a", json!({ "name": "A" }));
        batch.commit(Some(MutationOptions::background())).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn failure_stops_replay_without_rollback() {
        let store = store();
        let mut batch = store.batch();
        batch
            .add("user", json!({ "id": "a" }))
            .update("user", "ghost", json!({ "name": "x" }))
            .add("user", json!({ "id": "b" }));

        let err = batch.commit(None).unwrap_err();
        assert!(err.is_not_found());
        assert!(store.contains("user", "a").unwrap());
        assert!(!store.contains("user", "b").unwrap());
    }
}
