//! Record identity and reference helpers shared by the normalizer and the
//! relationship synchronizer.

use serde_json::Value;

use crate::schema::RawRecord;

/// Field holding a record's identity.
pub const ID_FIELD: &str = "id";

/// Returns the id of a raw record, if it has a usable one.
///
/// Ids are non-empty strings; anything else counts as missing.
#[must_use]
pub fn record_id(record: &RawRecord) -> Option<&str> {
    record
        .get(ID_FIELD)
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
}

/// Loose truthiness used when deciding whether a field was "supplied".
///
/// `null`, `false`, `0`, and `""` are falsy; arrays and objects are always
/// truthy, even when empty.
#[must_use]
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Coerces a falsy scalar to `null`.
///
/// Attributes are normalized with this rule, so `0`, `false` and `""` are
/// stored as `null`.
#[must_use]
pub fn coalesce(value: Option<&Value>) -> Value {
    match value {
        Some(v) if is_truthy(v) => v.clone(),
        _ => Value::Null,
    }
}

/// A resolved relationship reference: the target id plus, when the reference
/// was an embedded object, the object itself.
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    /// Target record id.
    pub id: String,
    /// Embedded target record, if the reference carried one.
    pub embedded: Option<RawRecord>,
}

impl Reference {
    /// Resolves a bare id or an embedded object carrying an `id`.
    #[must_use]
    pub fn resolve(value: &Value) -> Option<Self> {
        match value {
            Value::String(id) if !id.is_empty() => Some(Self {
                id: id.clone(),
                embedded: None,
            }),
            Value::Object(object) => record_id(object).map(|id| Self {
                id: id.to_string(),
                embedded: Some(object.clone()),
            }),
            _ => None,
        }
    }

    /// Builds the record to persist for this target: the embedded object (or
    /// a bare `{id}`), with `id` forced to the resolved id.
    #[must_use]
    pub fn into_record(self) -> RawRecord {
        let mut record = self.embedded.unwrap_or_default();
        record.insert(ID_FIELD.to_string(), Value::String(self.id));
        record
    }
}

/// Reads a normalized hasMany field as a list of ids.
#[must_use]
pub fn id_list(record: &RawRecord, field: &str) -> Vec<String> {
    record
        .get(field)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Reads a normalized belongsTo field as an id.
#[must_use]
pub fn single_id<'a>(record: &'a RawRecord, field: &str) -> Option<&'a str> {
    record
        .get(field)
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
}
