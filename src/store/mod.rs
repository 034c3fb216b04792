//! The normalized record store.
//!
//! [`Store`] owns one arena of normalized records per declared type. Every
//! mutation runs to completion under a single write lock, relationship
//! synchronization included, and notifies subscribers only after the lock is
//! released. Reads rebuild nested views on demand; fetch-backed reads await
//! the fetch without holding any lock.

mod config;
mod state;
mod stream;
mod subscription;
pub(crate) mod writer;

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::Utc;
use serde_json::Value;
use tracing::debug;

use crate::batch::Batch;
use crate::error::{BoxError, StoreError, StoreResult};
use crate::normalizer::denormalize;
use crate::schema::{RawRecord, Schema};

use self::state::StoreState;
use self::stream::Watchers;
use self::subscription::Subscribers;
use self::writer::Writer;

pub use config::{MutationOptions, StoreConfig};
pub use stream::{Operation, StoreEvent, StoreStream};
pub use subscription::{Subscription, SubscriptionId};

fn lock_err(context: &'static str) -> StoreError {
    StoreError::internal(format!("poisoned lock: {context}"))
}

fn as_record<'v>(record_type: &str, value: &'v Value) -> StoreResult<&'v RawRecord> {
    value
        .as_object()
        .ok_or_else(|| StoreError::invalid_record(record_type, "record must be a JSON object"))
}

/// In-memory, schema-driven store of normalized records.
pub struct Store {
    schema: Schema,
    config: StoreConfig,
    state: RwLock<StoreState>,
    subscribers: Arc<Subscribers>,
    watchers: Arc<Watchers>,
    sequence: AtomicU64,
}

impl Store {
    /// Creates an empty store with the default configuration.
    ///
    /// # Errors
    /// `InvalidSchema` if the schema references undeclared types or inverses.
    pub fn new(schema: Schema) -> StoreResult<Self> {
        Self::with_config(schema, StoreConfig::default())
    }

    /// Creates an empty store.
    ///
    /// # Errors
    /// `InvalidSchema` if the schema references undeclared types or inverses.
    pub fn with_config(schema: Schema, config: StoreConfig) -> StoreResult<Self> {
        schema.validate()?;
        let state = StoreState::new(&schema);
        Ok(Self {
            schema,
            config,
            state: RwLock::new(state),
            subscribers: Arc::new(Subscribers::default()),
            watchers: Arc::new(Watchers::default()),
            sequence: AtomicU64::new(0),
        })
    }

    /// The schema this store was built with.
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn write<T>(&self, context: &'static str, f: impl FnOnce(&mut Writer<'_>) -> StoreResult<T>) -> StoreResult<T> {
        let mut state = self.state.write().map_err(|_| lock_err(context))?;
        let mut writer = Writer::new(&self.schema, &mut state);
        f(&mut writer)
    }

    /// Replaces each listed record, notifying once.
    ///
    /// # Errors
    /// - `InvalidRecord` if an entry is not a JSON object
    /// - `MissingIdentifier` / `InvalidRelationship` if an entry (or a record
    ///   embedded in it) cannot be normalized; nothing is written in that case
    /// - `UnknownType` if `record_type` is not declared
    pub fn set(&self, record_type: &str, records: &[Value]) -> StoreResult<Vec<String>> {
        self.set_with(record_type, records, MutationOptions::default())
    }

    /// [`Store::set`] with explicit options.
    ///
    /// # Errors
    /// See [`Store::set`].
    pub fn set_with(&self, record_type: &str, records: &[Value], options: MutationOptions) -> StoreResult<Vec<String>> {
        self.schema.model(record_type)?;
        let records = records
            .iter()
            .map(|record| as_record(record_type, record))
            .collect::<StoreResult<Vec<_>>>()?;

        let ids = self.write("store.set", |writer| writer.set_all(record_type, &records))?;
        debug!(record_type, count = ids.len(), background = options.background, "set records");

        self.notify(options, Operation::Set, record_type, ids.clone());
        Ok(ids)
    }

    /// Merges `record` under the cached one; cached values that are already
    /// set win. Returns the record id.
    ///
    /// # Errors
    /// Same as [`Store::set`].
    pub fn add(&self, record_type: &str, record: &Value) -> StoreResult<String> {
        self.add_with(record_type, record, MutationOptions::default())
    }

    /// [`Store::add`] with explicit options.
    ///
    /// # Errors
    /// See [`Store::add`].
    pub fn add_with(&self, record_type: &str, record: &Value, options: MutationOptions) -> StoreResult<String> {
        self.schema.model(record_type)?;
        let record = as_record(record_type, record)?;

        let id = self.write("store.add", |writer| writer.add(record_type, record))?;
        debug!(record_type, id = %id, background = options.background, "added record");

        self.notify(options, Operation::Add, record_type, vec![id.clone()]);
        Ok(id)
    }

    /// Merges `attributes` over the cached record `record_type#id`.
    ///
    /// # Errors
    /// - `RecordNotFound` if the record is not cached
    /// - `InvalidRecord` if `attributes` is not a JSON object
    /// - `InvalidRelationship` if a merged relationship has an unsupported shape
    pub fn update(&self, record_type: &str, id: &str, attributes: &Value) -> StoreResult<()> {
        self.update_with(record_type, id, attributes, MutationOptions::default())
    }

    /// [`Store::update`] with explicit options.
    ///
    /// # Errors
    /// See [`Store::update`].
    pub fn update_with(
        &self,
        record_type: &str,
        id: &str,
        attributes: &Value,
        options: MutationOptions,
    ) -> StoreResult<()> {
        self.schema.model(record_type)?;
        let attributes = as_record(record_type, attributes)?;

        self.write("store.update", |writer| writer.update(record_type, id, attributes))?;
        debug!(record_type, id, background = options.background, "updated record");

        self.notify(options, Operation::Update, record_type, vec![id.to_string()]);
        Ok(())
    }

    /// Removes `record_type#id` and unlinks it from every related record.
    ///
    /// # Errors
    /// `RecordNotFound` if the record is not cached.
    pub fn delete(&self, record_type: &str, id: &str) -> StoreResult<()> {
        self.delete_with(record_type, id, MutationOptions::default())
    }

    /// [`Store::delete`] with explicit options.
    ///
    /// # Errors
    /// See [`Store::delete`].
    pub fn delete_with(&self, record_type: &str, id: &str, options: MutationOptions) -> StoreResult<()> {
        self.write("store.delete", |writer| writer.delete(record_type, id))?;
        debug!(record_type, id, background = options.background, "deleted record");

        self.notify(options, Operation::Delete, record_type, vec![id.to_string()]);
        Ok(())
    }

    /// Returns the nested view of a cached record, or `None` on a miss.
    ///
    /// # Errors
    /// `UnknownType` if `record_type` is not declared.
    pub fn get(&self, record_type: &str, id: &str) -> StoreResult<Option<Value>> {
        self.schema.model(record_type)?;
        let state = self.state.read().map_err(|_| lock_err("store.get"))?;
        if !state.contains(record_type, id) {
            return Ok(None);
        }
        denormalize(&self.schema, &*state, record_type, id, self.config.max_depth).map(Some)
    }

    /// Like [`Store::get`], but on a miss awaits `fetch`, adds its result as
    /// a background mutation and returns the now-cached view.
    ///
    /// # Errors
    /// - `Fetch` if the fetch fails; its error is kept as the source
    /// - any error [`Store::add`] can return for the fetched record
    pub async fn get_or_fetch<F, Fut, E>(&self, record_type: &str, id: &str, fetch: F) -> StoreResult<Option<Value>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, E>>,
        E: Into<BoxError>,
    {
        if let Some(view) = self.get(record_type, id)? {
            return Ok(Some(view));
        }

        debug!(record_type, id, "cache miss, fetching record");
        let record = fetch().await.map_err(|err| StoreError::fetch(record_type, err))?;
        self.add_with(record_type, &record, MutationOptions::background())?;
        self.get(record_type, id)
    }

    /// Returns the nested views of every cached record of `record_type`, in
    /// first-cached order, and marks the type complete.
    ///
    /// # Errors
    /// `UnknownType` if `record_type` is not declared.
    pub fn get_all(&self, record_type: &str) -> StoreResult<Vec<Value>> {
        let mut state = self.state.write().map_err(|_| lock_err("store.get_all"))?;
        state.type_state_mut(record_type)?.is_data_complete = true;

        let ids = state.ids(record_type);
        ids.iter()
            .map(|id| denormalize(&self.schema, &*state, record_type, id, self.config.max_depth))
            .collect()
    }

    /// Like [`Store::get_all`], but first awaits `fetch` and sets its results
    /// as a background mutation unless the type is already complete.
    ///
    /// # Errors
    /// - `Fetch` if the fetch fails
    /// - any error [`Store::set`] can return for the fetched records
    pub async fn get_all_with<F, Fut, E>(&self, record_type: &str, fetch: F) -> StoreResult<Vec<Value>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<Value>, E>>,
        E: Into<BoxError>,
    {
        if !self.is_data_complete(record_type)? {
            debug!(record_type, "collection incomplete, fetching records");
            let records = fetch().await.map_err(|err| StoreError::fetch(record_type, err))?;
            self.set_with(record_type, &records, MutationOptions::background())?;
        }
        self.get_all(record_type)
    }

    /// Always awaits `fetch`, adds each result as a background mutation and
    /// returns the views of exactly the fetched records, in fetch order.
    /// Completeness is left untouched.
    ///
    /// # Errors
    /// - `Fetch` if the fetch fails
    /// - any error [`Store::add`] can return for a fetched record
    pub async fn query<F, Fut, E>(&self, record_type: &str, fetch: F) -> StoreResult<Vec<Value>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<Value>, E>>,
        E: Into<BoxError>,
    {
        self.schema.model(record_type)?;
        debug!(record_type, "running query fetch");
        let records = fetch().await.map_err(|err| StoreError::fetch(record_type, err))?;

        let ids = records
            .iter()
            .map(|record| self.add_with(record_type, record, MutationOptions::background()))
            .collect::<StoreResult<Vec<_>>>()?;

        let state = self.state.read().map_err(|_| lock_err("store.query"))?;
        ids.iter()
            .map(|id| denormalize(&self.schema, &*state, record_type, id, self.config.max_depth))
            .collect()
    }

    /// Registers a callback invoked after every foreground mutation, in
    /// registration order.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = self.subscribers.insert(Arc::new(callback));
        Subscription::new(id, &self.subscribers)
    }

    /// Removes a callback by id. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers.remove(id)
    }

    /// Opens a stream receiving an event for every foreground mutation.
    #[must_use]
    pub fn watch(&self) -> StoreStream {
        self.watchers.register(self.config.stream_capacity)
    }

    /// Starts a batch of deferred mutations against this store.
    #[must_use]
    pub fn batch(&self) -> Batch<'_> {
        Batch::new(self)
    }

    /// Whether `record_type#id` is cached.
    ///
    /// # Errors
    /// `Internal` if the state lock is poisoned.
    pub fn contains(&self, record_type: &str, id: &str) -> StoreResult<bool> {
        let state = self.state.read().map_err(|_| lock_err("store.contains"))?;
        Ok(state.contains(record_type, id))
    }

    /// Whether the full collection of `record_type` has been loaded.
    ///
    /// # Errors
    /// `UnknownType` if `record_type` is not declared.
    pub fn is_data_complete(&self, record_type: &str) -> StoreResult<bool> {
        let state = self.state.read().map_err(|_| lock_err("store.is_data_complete"))?;
        Ok(state.type_state(record_type)?.is_data_complete)
    }

    /// Number of cached records of `record_type`.
    ///
    /// # Errors
    /// `UnknownType` if `record_type` is not declared.
    pub fn len(&self, record_type: &str) -> StoreResult<usize> {
        let state = self.state.read().map_err(|_| lock_err("store.len"))?;
        Ok(state.type_state(record_type)?.data.len())
    }

    /// The cached normalized record, without expanding relationships.
    ///
    /// # Errors
    /// `Internal` if the state lock is poisoned.
    pub fn peek(&self, record_type: &str, id: &str) -> StoreResult<Option<RawRecord>> {
        let state = self.state.read().map_err(|_| lock_err("store.peek"))?;
        Ok(state.get(record_type, id).cloned())
    }

    /// Number of registered callbacks.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Events lost because a watch stream's buffer was full.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.watchers.dropped_events()
    }

    fn notify(&self, options: MutationOptions, operation: Operation, record_type: &str, ids: Vec<String>) {
        if options.background {
            return;
        }

        let event = StoreEvent {
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed) + 1,
            operation,
            record_type: record_type.to_string(),
            ids,
            at: Utc::now(),
        };
        self.watchers.broadcast(&event);

        for callback in self.subscribers.snapshot() {
            callback();
        }
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("types", &self.schema.types().collect::<Vec<_>>())
            .field("config", &self.config)
            .field("subscribers", &self.subscribers.len())
            .field("watchers", &self.watchers.len())
            .finish_non_exhaustive()
    }
}
