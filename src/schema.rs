//! Model registry.
//!
//! A [`Schema`] maps every declared record type to a [`Model`]: its scalar
//! attribute names, its relationship descriptors and an optional
//! pre-normalization hook. The schema is fixed once a store is built from it.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{StoreError, StoreResult};

/// A record as a JSON object, before or after normalization.
pub type RawRecord = Map<String, Value>;

/// Which side of a relationship a field sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RelationshipKind {
    /// Singular reference: an id or `null`.
    BelongsTo,
    /// Collection reference: an ordered list of unique ids.
    HasMany,
}

impl fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BelongsTo => write!(f, "belongsTo"),
            Self::HasMany => write!(f, "hasMany"),
        }
    }
}

/// Relationship descriptor for one field of a model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    /// The related record type.
    #[serde(rename = "type")]
    pub target_type: String,
    /// Singular or collection-valued.
    pub kind: RelationshipKind,
    /// Field on `target_type` holding the back-reference. `None` marks a
    /// one-directional relationship whose inverse is never maintained.
    #[serde(default)]
    pub inverse: Option<String>,
}

impl Relationship {
    /// Creates a descriptor.
    #[must_use]
    pub fn new(target_type: impl Into<String>, kind: RelationshipKind, inverse: Option<&str>) -> Self {
        Self {
            target_type: target_type.into(),
            kind,
            inverse: inverse.map(str::to_string),
        }
    }
}

/// Type-specific coercion applied to a raw record before it is normalized.
#[derive(Clone)]
pub struct NormalizeHook(Arc<dyn Fn(RawRecord) -> RawRecord + Send + Sync>);

impl NormalizeHook {
    /// Wraps a closure.
    pub fn new(f: impl Fn(RawRecord) -> RawRecord + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Runs the hook.
    #[must_use]
    pub fn apply(&self, record: RawRecord) -> RawRecord {
        (self.0)(record)
    }
}

impl fmt::Debug for NormalizeHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("NormalizeHook(..)")
    }
}

/// Schema for a single record type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Model {
    /// Scalar field names.
    #[serde(default)]
    pub attributes: Vec<String>,
    /// Relationship descriptors keyed by field name.
    #[serde(default, rename = "relationship")]
    pub relationships: BTreeMap<String, Relationship>,
    #[serde(skip)]
    hook: Option<NormalizeHook>,
}

impl Model {
    /// Creates an empty model.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a scalar attribute.
    #[must_use]
    pub fn attribute(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.attributes.contains(&name) {
            self.attributes.push(name);
        }
        self
    }

    /// Declares a singular relationship.
    #[must_use]
    pub fn belongs_to(self, field: impl Into<String>, target_type: impl Into<String>, inverse: Option<&str>) -> Self {
        self.relationship(field, Relationship::new(target_type, RelationshipKind::BelongsTo, inverse))
    }

    /// Declares a collection-valued relationship.
    #[must_use]
    pub fn has_many(self, field: impl Into<String>, target_type: impl Into<String>, inverse: Option<&str>) -> Self {
        self.relationship(field, Relationship::new(target_type, RelationshipKind::HasMany, inverse))
    }

    /// Declares a relationship from a prepared descriptor.
    #[must_use]
    pub fn relationship(mut self, field: impl Into<String>, descriptor: Relationship) -> Self {
        self.relationships.insert(field.into(), descriptor);
        self
    }

    /// Attaches a pre-normalization hook.
    #[must_use]
    pub fn normalize_with(mut self, hook: impl Fn(RawRecord) -> RawRecord + Send + Sync + 'static) -> Self {
        self.hook = Some(NormalizeHook::new(hook));
        self
    }

    /// Looks up the descriptor for `field`.
    #[must_use]
    pub fn descriptor(&self, field: &str) -> Option<&Relationship> {
        self.relationships.get(field)
    }

    /// Applies the pre-normalization hook (identity when none is set).
    #[must_use]
    pub fn pre_normalize(&self, record: RawRecord) -> RawRecord {
        match &self.hook {
            Some(hook) => hook.apply(record),
            None => record,
        }
    }

    /// Returns the record with every declared field set to its empty value:
    /// `null` for attributes and belongsTo fields, `[]` for hasMany fields.
    #[must_use]
    pub fn default_record(&self) -> RawRecord {
        let mut record = RawRecord::new();
        for attribute in &self.attributes {
            record.insert(attribute.clone(), Value::Null);
        }
        for (field, descriptor) in &self.relationships {
            let empty = match descriptor.kind {
                RelationshipKind::BelongsTo => Value::Null,
                RelationshipKind::HasMany => Value::Array(Vec::new()),
            };
            record.insert(field.clone(), empty);
        }
        record
    }
}

/// All declared record types.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    models: BTreeMap<String, Model>,
}

impl Schema {
    /// Creates an empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) the model for `record_type`.
    #[must_use]
    pub fn with_model(mut self, record_type: impl Into<String>, model: Model) -> Self {
        self.models.insert(record_type.into(), model);
        self
    }

    /// Parses a schema from its JSON descriptor form:
    ///
    /// ```json
    /// { "post": { "attributes": ["message"],
    ///             "relationship": { "author": { "type": "user", "kind": "belongsTo", "inverse": "posts" } } } }
    /// ```
    ///
    /// # Errors
    /// `InvalidSchema` if the value does not match the descriptor shape.
    pub fn from_json(value: Value) -> StoreResult<Self> {
        serde_json::from_value(value).map_err(|e| StoreError::invalid_schema(e.to_string()))
    }

    /// Attaches a pre-normalization hook to an already declared type.
    ///
    /// # Errors
    /// `UnknownType` if `record_type` is not declared.
    pub fn set_normalize_hook(
        &mut self,
        record_type: &str,
        hook: impl Fn(RawRecord) -> RawRecord + Send + Sync + 'static,
    ) -> StoreResult<()> {
        let model = self
            .models
            .get_mut(record_type)
            .ok_or_else(|| StoreError::unknown_type(record_type))?;
        model.hook = Some(NormalizeHook::new(hook));
        Ok(())
    }

    /// Returns the model for `record_type`.
    ///
    /// # Errors
    /// `UnknownType` if `record_type` is not declared.
    pub fn model(&self, record_type: &str) -> StoreResult<&Model> {
        self.models
            .get(record_type)
            .ok_or_else(|| StoreError::unknown_type(record_type))
    }

    /// Returns the descriptor of `record_type.field`, if declared.
    #[must_use]
    pub fn descriptor(&self, record_type: &str, field: &str) -> Option<&Relationship> {
        self.models.get(record_type).and_then(|m| m.descriptor(field))
    }

    /// Declared type names, sorted.
    pub fn types(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    /// Returns true if `record_type` is declared.
    #[must_use]
    pub fn contains(&self, record_type: &str) -> bool {
        self.models.contains_key(record_type)
    }

    /// See [`Model::default_record`].
    ///
    /// # Errors
    /// `UnknownType` if `record_type` is not declared.
    pub fn default_record(&self, record_type: &str) -> StoreResult<RawRecord> {
        Ok(self.model(record_type)?.default_record())
    }

    /// Checks that every relationship points at a declared type and that each
    /// named inverse is a relationship declared on that type.
    ///
    /// # Errors
    /// `InvalidSchema` describing the first offending field.
    pub fn validate(&self) -> StoreResult<()> {
        for (record_type, model) in &self.models {
            for (field, descriptor) in &model.relationships {
                let Some(target) = self.models.get(&descriptor.target_type) else {
                    return Err(StoreError::invalid_schema(format!(
                        "{record_type}.{field} targets undeclared type '{}'",
                        descriptor.target_type
                    )));
                };

                if model.attributes.contains(field) {
                    return Err(StoreError::invalid_schema(format!(
                        "{record_type}.{field} is declared as both attribute and relationship"
                    )));
                }

                if let Some(inverse) = &descriptor.inverse {
                    if !target.relationships.contains_key(inverse) {
                        return Err(StoreError::invalid_schema(format!(
                            "{record_type}.{field} names inverse '{}.{inverse}' which is not a relationship",
                            descriptor.target_type
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn blog() -> Schema {
        Schema::new()
            .with_model(
                "user",
                Model::new()
                    .attribute("name")
                    .has_many("posts", "post", Some("author")),
            )
            .with_model(
                "post",
                Model::new()
                    .attribute("message")
                    .belongs_to("author", "user", Some("posts")),
            )
    }

    #[test]
    fn builder_declares_fields() {
        let schema = blog();
        let user = schema.model("user").unwrap();
        assert_eq!(user.attributes, vec!["name".to_string()]);
        let posts = user.descriptor("posts").unwrap();
        assert_eq!(posts.kind, RelationshipKind::HasMany);
        assert_eq!(posts.target_type, "post");
        assert_eq!(posts.inverse.as_deref(), Some("author"));
        assert!(schema.validate().is_ok());
    }

    #[test]
    fn duplicate_attribute_is_ignored() {
        let model = Model::new().attribute("name").attribute("name");
        assert_eq!(model.attributes.len(), 1);
    }

    #[test]
    fn unknown_type_is_an_error() {
        let err = blog().model("comment").unwrap_err();
        assert!(err.is_execution());
        assert!(format!("{err}").contains("comment"));
    }

    #[test]
    fn default_record_is_all_empty() {
        let record = blog().default_record("user").unwrap();
        assert_eq!(Value::Object(record), json!({ "name": null, "posts": [] }));

        let record = blog().default_record("post").unwrap();
        assert_eq!(Value::Object(record), json!({ "message": null, "author": null }));
    }

    #[test]
    fn from_json_parses_descriptor_mapping() {
        let schema = Schema::from_json(json!({
            "country": { "attributes": ["name"] },
            "user": {
                "attributes": ["name"],
                "relationship": {
                    "country": { "type": "country", "kind": "belongsTo", "inverse": null },
                    "groups": { "type": "group", "kind": "hasMany", "inverse": "members" }
                }
            },
            "group": {
                "attributes": ["name"],
                "relationship": {
                    "members": { "type": "user", "kind": "hasMany", "inverse": "groups" }
                }
            }
        }))
        .unwrap();

        assert!(schema.validate().is_ok());
        assert_eq!(schema.types().collect::<Vec<_>>(), vec!["country", "group", "user"]);
        let country = schema.descriptor("user", "country").unwrap();
        assert_eq!(country.kind, RelationshipKind::BelongsTo);
        assert!(country.inverse.is_none());
    }

    #[test]
    fn from_json_rejects_unknown_kind() {
        let err = Schema::from_json(json!({
            "user": { "relationship": { "x": { "type": "user", "kind": "hasOne" } } }
        }))
        .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn validate_rejects_undeclared_target() {
        let schema = Schema::new().with_model("post", Model::new().belongs_to("author", "user", None));
        let err = schema.validate().unwrap_err();
        assert!(format!("{err}").contains("undeclared type 'user'"));
    }

    #[test]
    fn validate_rejects_missing_inverse() {
        let schema = Schema::new()
            .with_model("user", Model::new())
            .with_model("post", Model::new().belongs_to("author", "user", Some("posts")));
        let err = schema.validate().unwrap_err();
        assert!(format!("{err}").contains("user.posts"));
    }

    #[test]
    fn hook_runs_before_normalization() {
        let mut schema = blog();
        schema
            .set_normalize_hook("user", |mut record| {
                if record.get("name").and_then(Value::as_str) == Some("123") {
                    record.insert("name".into(), json!("Foobar"));
                }
                record
            })
            .unwrap();

        let mut raw = RawRecord::new();
        raw.insert("name".into(), json!("123"));
        let out = schema.model("user").unwrap().pre_normalize(raw);
        assert_eq!(out.get("name"), Some(&json!("Foobar")));

        assert!(schema.set_normalize_hook("comment", |r| r).is_err());
    }
}
