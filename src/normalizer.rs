//! Normalize / denormalize transforms.
//!
//! Normalization turns an arbitrary input record (possibly with embedded
//! related objects) into the canonical flat form where relationships are ids
//! only. Denormalization rebuilds a nested view from cached records, capping
//! recursion so cyclic schemas terminate.

use serde_json::{Map, Value};

use crate::error::{StoreError, StoreResult};
use crate::record::{coalesce, record_id, ID_FIELD};
use crate::schema::{Model, RawRecord, RelationshipKind, Schema};

/// Default nesting depth past which related records degrade to `{id}` stubs.
pub const DEFAULT_MAX_DEPTH: usize = 3;

/// Read access to cached normalized records.
pub trait RecordSource {
    /// Returns the cached normalized record, if any.
    fn record(&self, record_type: &str, id: &str) -> Option<&RawRecord>;
}

/// A normalized record together with the hook-processed raw input it came
/// from. The raw form still carries embedded objects, which the relationship
/// synchronizer needs.
#[derive(Debug, Clone)]
pub(crate) struct Normalized {
    pub id: String,
    pub raw: RawRecord,
    pub record: RawRecord,
}

/// Normalizes `record` against the schema of `record_type`.
///
/// The type's pre-normalization hook runs first. Attributes are copied with
/// falsy values collapsed to `null`; belongsTo fields keep an id string or
/// `null` (embedded objects contribute their `id`); hasMany fields become a
/// de-duplicated list of ids.
///
/// # Errors
/// - `UnknownType` if `record_type` is not declared
/// - `MissingIdentifier` if the record has no usable `id`
/// - `InvalidRelationship` if a relationship value has an unsupported shape
pub fn normalize(schema: &Schema, record_type: &str, record: &RawRecord) -> StoreResult<RawRecord> {
    normalize_record(schema, record_type, record).map(|n| n.record)
}

pub(crate) fn normalize_record(schema: &Schema, record_type: &str, record: &RawRecord) -> StoreResult<Normalized> {
    let model = schema.model(record_type)?;
    let id = record_id(record)
        .ok_or_else(|| StoreError::missing_identifier(record_type))?
        .to_string();

    let mut raw = model.pre_normalize(record.clone());
    raw.insert(ID_FIELD.to_string(), Value::String(id.clone()));

    let record = normalize_fields(model, record_type, &id, &raw)?;
    Ok(Normalized { id, raw, record })
}

/// Normalizes `record` and every related object embedded in it, so a
/// malformed nested record is reported before any state is written.
pub(crate) fn normalize_checked(schema: &Schema, record_type: &str, record: &RawRecord) -> StoreResult<Normalized> {
    let normalized = normalize_record(schema, record_type, record)?;
    let model = schema.model(record_type)?;

    for (field, descriptor) in &model.relationships {
        let embedded: Vec<&RawRecord> = match normalized.raw.get(field) {
            Some(Value::Object(object)) => vec![object],
            Some(Value::Array(items)) => items.iter().filter_map(Value::as_object).collect(),
            _ => Vec::new(),
        };
        for object in embedded {
            normalize_checked(schema, &descriptor.target_type, object)?;
        }
    }

    Ok(normalized)
}

fn normalize_fields(model: &Model, record_type: &str, id: &str, raw: &RawRecord) -> StoreResult<RawRecord> {
    let mut out = Map::new();
    out.insert(ID_FIELD.to_string(), Value::String(id.to_string()));

    for attribute in &model.attributes {
        out.insert(attribute.clone(), coalesce(raw.get(attribute)));
    }

    for (field, descriptor) in &model.relationships {
        let value = match descriptor.kind {
            RelationshipKind::BelongsTo => normalize_belongs_to(record_type, field, raw.get(field))?,
            RelationshipKind::HasMany => normalize_has_many(record_type, field, raw.get(field))?,
        };
        out.insert(field.clone(), value);
    }

    Ok(out)
}

fn normalize_belongs_to(record_type: &str, field: &str, value: Option<&Value>) -> StoreResult<Value> {
    match value {
        None | Some(Value::Null) => Ok(Value::Null),
        Some(Value::String(id)) => Ok(Value::String(id.clone())),
        Some(Value::Object(object)) => record_id(object)
            .map(|id| Value::String(id.to_string()))
            .ok_or_else(|| StoreError::invalid_relationship(record_type, field, RelationshipKind::BelongsTo)),
        Some(_) => Err(StoreError::invalid_relationship(
            record_type,
            field,
            RelationshipKind::BelongsTo,
        )),
    }
}

fn normalize_has_many(record_type: &str, field: &str, value: Option<&Value>) -> StoreResult<Value> {
    let invalid = || StoreError::invalid_relationship(record_type, field, RelationshipKind::HasMany);

    let items = match value {
        None => return Ok(Value::Array(Vec::new())),
        Some(Value::Array(items)) => items,
        Some(_) => return Err(invalid()),
    };

    let mut ids: Vec<Value> = Vec::with_capacity(items.len());
    for item in items {
        let id = match item {
            Value::String(id) => id.as_str(),
            Value::Object(object) => record_id(object).ok_or_else(invalid)?,
            _ => return Err(invalid()),
        };
        if !ids.iter().any(|existing| existing.as_str() == Some(id)) {
            ids.push(Value::String(id.to_string()));
        }
    }

    Ok(Value::Array(ids))
}

/// Rebuilds the nested view of `record_type#id`.
///
/// The view starts from the type's default record, overlaid with the cached
/// record and the id, so every declared field is present even if the record
/// predates a schema change. Related records are expanded recursively until
/// `max_depth` nested levels, after which they degrade to `{id}` stubs.
///
/// # Errors
/// `UnknownType` if `record_type` (or a related type) is not declared.
pub fn denormalize<S: RecordSource + ?Sized>(
    schema: &Schema,
    source: &S,
    record_type: &str,
    id: &str,
    max_depth: usize,
) -> StoreResult<Value> {
    denormalize_at(schema, source, record_type, id, 0, max_depth)
}

fn denormalize_at<S: RecordSource + ?Sized>(
    schema: &Schema,
    source: &S,
    record_type: &str,
    id: &str,
    depth: usize,
    max_depth: usize,
) -> StoreResult<Value> {
    let model = schema.model(record_type)?;

    let mut view = model.default_record();
    if let Some(cached) = source.record(record_type, id) {
        for (key, value) in cached {
            view.insert(key.clone(), value.clone());
        }
    }
    view.insert(ID_FIELD.to_string(), Value::String(id.to_string()));

    for (field, descriptor) in &model.relationships {
        let expanded = match descriptor.kind {
            RelationshipKind::BelongsTo => match view.get(field).and_then(Value::as_str) {
                Some(target) if !target.is_empty() => {
                    expand(schema, source, &descriptor.target_type, target, depth, max_depth)?
                }
                _ => Value::Null,
            },
            RelationshipKind::HasMany => {
                let targets: Vec<String> = view
                    .get(field)
                    .and_then(Value::as_array)
                    .map(|items| items.iter().filter_map(Value::as_str).map(str::to_string).collect())
                    .unwrap_or_default();
                let mut out = Vec::with_capacity(targets.len());
                for target in &targets {
                    out.push(expand(schema, source, &descriptor.target_type, target, depth, max_depth)?);
                }
                Value::Array(out)
            }
        };
        view.insert(field.clone(), expanded);
    }

    Ok(Value::Object(view))
}

fn expand<S: RecordSource + ?Sized>(
    schema: &Schema,
    source: &S,
    target_type: &str,
    id: &str,
    depth: usize,
    max_depth: usize,
) -> StoreResult<Value> {
    if depth < max_depth {
        denormalize_at(schema, source, target_type, id, depth + 1, max_depth)
    } else {
        let mut stub = Map::new();
        stub.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
        Ok(Value::Object(stub))
    }
}
