//! Cardinality classification.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::StoreResult;
use crate::schema::{Relationship, RelationshipKind, Schema};

/// Relationship shape inferred from both sides' declared kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Cardinality {
    /// belongsTo on both sides.
    OneToOne,
    /// belongsTo on one side, hasMany on the other.
    OneToMany,
    /// hasMany on both sides.
    ManyToMany,
    /// No inverse is declared; the back-reference is never maintained.
    None,
}

impl Cardinality {
    /// Classifies `descriptor` by looking up its inverse on the target type.
    ///
    /// An unset inverse (or one that is not declared on the target) yields
    /// [`Cardinality::None`].
    #[must_use]
    pub fn of(schema: &Schema, descriptor: &Relationship) -> Self {
        let Some(inverse) = descriptor.inverse.as_deref() else {
            return Self::None;
        };
        let Some(inverse) = schema.descriptor(&descriptor.target_type, inverse) else {
            return Self::None;
        };

        match (descriptor.kind, inverse.kind) {
            (RelationshipKind::BelongsTo, RelationshipKind::BelongsTo) => Self::OneToOne,
            (RelationshipKind::BelongsTo, RelationshipKind::HasMany)
            | (RelationshipKind::HasMany, RelationshipKind::BelongsTo) => Self::OneToMany,
            (RelationshipKind::HasMany, RelationshipKind::HasMany) => Self::ManyToMany,
        }
    }
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OneToOne => write!(f, "oneToOne"),
            Self::OneToMany => write!(f, "oneToMany"),
            Self::ManyToMany => write!(f, "manyToMany"),
            Self::None => write!(f, "none"),
        }
    }
}

/// Classifies `record_type.field`. Fields that are not relationships
/// classify as [`Cardinality::None`].
///
/// # Errors
/// `UnknownType` if `record_type` is not declared.
pub fn cardinality(schema: &Schema, record_type: &str, field: &str) -> StoreResult<Cardinality> {
    let model = schema.model(record_type)?;
    Ok(model
        .descriptor(field)
        .map_or(Cardinality::None, |descriptor| Cardinality::of(schema, descriptor)))
}
