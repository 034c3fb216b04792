//! Synchronous mutation pipeline.
//!
//! A [`Writer`] borrows the locked state for the duration of one public
//! mutation. It normalizes input, writes records and drives the relationship
//! synchronizer, which re-enters `set` for related records. Notification is
//! the caller's job once the lock is released.

use serde_json::Value;

use crate::error::{StoreError, StoreResult};
use crate::normalizer::{normalize_checked, normalize_record, Normalized};
use crate::record::{is_truthy, ID_FIELD};
use crate::schema::{RawRecord, Schema};

use super::state::StoreState;

pub(crate) struct Writer<'a> {
    pub(crate) schema: &'a Schema,
    pub(crate) state: &'a mut StoreState,
}

impl<'a> Writer<'a> {
    pub fn new(schema: &'a Schema, state: &'a mut StoreState) -> Self {
        Self { schema, state }
    }

    /// Full replace of each record. Every record (embedded objects included)
    /// is validated before the first write.
    pub fn set_all(&mut self, record_type: &str, records: &[&RawRecord]) -> StoreResult<Vec<String>> {
        let normalized = records
            .iter()
            .map(|record| normalize_checked(self.schema, record_type, record))
            .collect::<StoreResult<Vec<_>>>()?;

        let mut ids = Vec::with_capacity(normalized.len());
        for record in normalized {
            ids.push(record.id.clone());
            self.write(record_type, record)?;
        }
        Ok(ids)
    }

    /// Full replace used by the synchronizer for related records.
    pub(crate) fn set(&mut self, record_type: &str, record: &RawRecord) -> StoreResult<()> {
        let normalized = normalize_record(self.schema, record_type, record)?;
        self.write(record_type, normalized)
    }

    /// Merges `record` under the cached one: cached values win unless they are
    /// unset (`null` or an empty collection). A record not yet cached is
    /// written as-is.
    pub fn add(&mut self, record_type: &str, record: &RawRecord) -> StoreResult<String> {
        let normalized = normalize_checked(self.schema, record_type, record)?;
        let id = normalized.id.clone();

        let Some(cached) = self.state.get(record_type, &id).cloned() else {
            self.write(record_type, normalized)?;
            return Ok(id);
        };

        let schema = self.schema;
        let model = schema.model(record_type)?;
        let Normalized { raw, record: mut merged, .. } = normalized;
        let mut sync_view = raw;
        for (key, value) in cached {
            if is_unset(&value) {
                continue;
            }
            if model.relationships.contains_key(&key) {
                sync_view.insert(key.clone(), value.clone());
            }
            merged.insert(key, value);
        }

        self.state.insert(record_type, &id, merged)?;
        self.sync_added_relationships(record_type, &id, &sync_view)?;
        Ok(id)
    }

    /// Merges `attributes` over the cached record and replaces it.
    pub fn update(&mut self, record_type: &str, id: &str, attributes: &RawRecord) -> StoreResult<()> {
        self.schema.model(record_type)?;
        let Some(cached) = self.state.get(record_type, id) else {
            return Err(StoreError::record_not_found(record_type, id));
        };

        let mut merged = cached.clone();
        for (key, value) in attributes {
            merged.insert(key.clone(), value.clone());
        }
        merged.insert(ID_FIELD.to_string(), Value::String(id.to_string()));

        let normalized = normalize_checked(self.schema, record_type, &merged)?;
        self.write(record_type, normalized)
    }

    /// Removes the record and unlinks every relationship it held.
    pub fn delete(&mut self, record_type: &str, id: &str) -> StoreResult<()> {
        let schema = self.schema;
        let model = schema.model(record_type)?;
        let Some(previous) = self.state.remove(record_type, id)? else {
            return Err(StoreError::record_not_found(record_type, id));
        };

        let mut current = model.default_record();
        current.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
        self.sync_removed_relationships(record_type, id, &current, &previous);
        Ok(())
    }

    /// Stores a normalized record, links its relationships and, when it
    /// replaced a cached record, unlinks whatever it no longer references.
    fn write(&mut self, record_type: &str, normalized: Normalized) -> StoreResult<()> {
        let Normalized { id, raw, record } = normalized;
        let previous = self.state.insert(record_type, &id, record)?;

        self.sync_added_relationships(record_type, &id, &raw)?;

        if let Some(previous) = previous {
            if let Some(current) = self.state.get(record_type, &id).cloned() {
                self.sync_removed_relationships(record_type, &id, &current, &previous);
            }
        }
        Ok(())
    }
}

fn is_unset(value: &Value) -> bool {
    match value {
        Value::Array(items) => items.is_empty(),
        other => !is_truthy(other),
    }
}
