//! Per-type store state: completeness flag plus an insertion-ordered,
//! id-keyed map of normalized records.
//!
//! Besides whole-record inserts, this module exposes the in-place edits the
//! relationship synchronizer uses to patch inverse fields. Those edits skip
//! normalization and notification entirely.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde_json::Value;

use crate::error::{StoreError, StoreResult};
use crate::normalizer::RecordSource;
use crate::schema::{RawRecord, Schema};

#[derive(Debug, Default)]
pub(crate) struct TypeState {
    pub is_data_complete: bool,
    pub data: IndexMap<String, RawRecord>,
}

#[derive(Debug, Default)]
pub(crate) struct StoreState {
    types: HashMap<String, TypeState>,
}

impl StoreState {
    pub fn new(schema: &Schema) -> Self {
        let types = schema
            .types()
            .map(|record_type| (record_type.to_string(), TypeState::default()))
            .collect();
        Self { types }
    }

    pub fn type_state(&self, record_type: &str) -> StoreResult<&TypeState> {
        self.types
            .get(record_type)
            .ok_or_else(|| StoreError::unknown_type(record_type))
    }

    pub fn type_state_mut(&mut self, record_type: &str) -> StoreResult<&mut TypeState> {
        self.types
            .get_mut(record_type)
            .ok_or_else(|| StoreError::unknown_type(record_type))
    }

    pub fn get(&self, record_type: &str, id: &str) -> Option<&RawRecord> {
        self.types.get(record_type).and_then(|t| t.data.get(id))
    }

    pub fn contains(&self, record_type: &str, id: &str) -> bool {
        self.get(record_type, id).is_some()
    }

    /// Stores `record`, returning the record it replaced. A replaced record
    /// keeps its position in the type's ordering.
    pub fn insert(&mut self, record_type: &str, id: &str, record: RawRecord) -> StoreResult<Option<RawRecord>> {
        Ok(self.type_state_mut(record_type)?.data.insert(id.to_string(), record))
    }

    pub fn remove(&mut self, record_type: &str, id: &str) -> StoreResult<Option<RawRecord>> {
        Ok(self.type_state_mut(record_type)?.data.shift_remove(id))
    }

    pub fn records(&self, record_type: &str) -> impl Iterator<Item = (&String, &RawRecord)> {
        self.types
            .get(record_type)
            .into_iter()
            .flat_map(|t| t.data.iter())
    }

    pub fn ids(&self, record_type: &str) -> Vec<String> {
        self.records(record_type).map(|(id, _)| id.clone()).collect()
    }

    fn field_mut(&mut self, record_type: &str, id: &str, field: &str) -> Option<&mut Value> {
        self.types
            .get_mut(record_type)
            .and_then(|t| t.data.get_mut(id))
            .map(|record| record.entry(field.to_string()).or_insert(Value::Null))
    }

    /// Appends `value` to a collection field unless already present.
    /// Returns true if the record changed.
    pub fn push_id(&mut self, record_type: &str, id: &str, field: &str, value: &str) -> bool {
        let Some(slot) = self.field_mut(record_type, id, field) else {
            return false;
        };
        match slot {
            Value::Array(items) => {
                if items.iter().any(|item| item.as_str() == Some(value)) {
                    false
                } else {
                    items.push(Value::String(value.to_string()));
                    true
                }
            }
            other => {
                *other = Value::Array(vec![Value::String(value.to_string())]);
                true
            }
        }
    }

    /// Removes `value` from a collection field. Returns true if the record changed.
    pub fn remove_id(&mut self, record_type: &str, id: &str, field: &str, value: &str) -> bool {
        let Some(Value::Array(items)) = self.field_mut(record_type, id, field) else {
            return false;
        };
        let before = items.len();
        items.retain(|item| item.as_str() != Some(value));
        items.len() != before
    }

    /// Points a singular field at `value`. Returns true if the record exists.
    pub fn set_id(&mut self, record_type: &str, id: &str, field: &str, value: &str) -> bool {
        match self.field_mut(record_type, id, field) {
            Some(slot) => {
                *slot = Value::String(value.to_string());
                true
            }
            None => false,
        }
    }

    /// Nulls a singular field if it currently points at `value`.
    /// Returns true if the record changed.
    pub fn clear_id(&mut self, record_type: &str, id: &str, field: &str, value: &str) -> bool {
        match self.field_mut(record_type, id, field) {
            Some(slot) if slot.as_str() == Some(value) => {
                *slot = Value::Null;
                true
            }
            _ => false,
        }
    }
}

impl RecordSource for StoreState {
    fn record(&self, record_type: &str, id: &str) -> Option<&RawRecord> {
        self.get(record_type, id)
    }
}
