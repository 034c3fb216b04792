//! Inverse-link maintenance.
//!
//! The synchronizer runs inside a [`Writer`] while the store's write lock is
//! held. New targets are materialized through [`Writer::set`]; targets that
//! are already cached are patched in place through the state's id edits,
//! which bypass normalization and notification.

use serde_json::Value;
use tracing::trace;

use crate::error::StoreResult;
use crate::record::{id_list, is_truthy, single_id, Reference};
use crate::schema::{RawRecord, Relationship, RelationshipKind};
use crate::store::writer::Writer;

use super::cardinality::Cardinality;

impl Writer<'_> {
    /// Links every relationship supplied on `raw` to its inverse. A hasMany
    /// field that was not supplied is instead rebuilt from peers that
    /// already point back at the owner.
    pub(crate) fn sync_added_relationships(
        &mut self,
        record_type: &str,
        owner_id: &str,
        raw: &RawRecord,
    ) -> StoreResult<()> {
        let schema = self.schema;
        let model = schema.model(record_type)?;

        for (field, descriptor) in &model.relationships {
            let cardinality = Cardinality::of(schema, descriptor);
            let supplied = raw.get(field).filter(|value| is_truthy(value));

            match (descriptor.kind, supplied) {
                (RelationshipKind::BelongsTo, Some(value)) => {
                    self.sync_added_belongs_to(owner_id, descriptor, cardinality, value)?;
                }
                (RelationshipKind::HasMany, Some(Value::Array(items))) => {
                    for item in items {
                        self.sync_added_has_many(record_type, field, owner_id, descriptor, cardinality, item)?;
                    }
                }
                (RelationshipKind::HasMany, Some(_)) => {}
                (RelationshipKind::HasMany, None) => {
                    self.sync_existing_has_many(record_type, field, owner_id, descriptor, cardinality);
                }
                (RelationshipKind::BelongsTo, None) => {}
            }
        }
        Ok(())
    }

    fn sync_added_belongs_to(
        &mut self,
        owner_id: &str,
        descriptor: &Relationship,
        cardinality: Cardinality,
        value: &Value,
    ) -> StoreResult<()> {
        let Some(target) = Reference::resolve(value) else {
            return Ok(());
        };
        let target_type = descriptor.target_type.as_str();

        let inverse = match (cardinality, descriptor.inverse.as_deref()) {
            (Cardinality::OneToOne | Cardinality::OneToMany, Some(inverse)) => inverse,
            _ => return self.ensure_placeholder(target_type, target),
        };

        let cached = self.state.get(target_type, &target.id);
        if cardinality == Cardinality::OneToOne {
            // First writer wins: a target already paired with a peer is left alone.
            if cached.is_some_and(|record| single_id(record, inverse).is_some()) {
                return Ok(());
            }
            let mut record = cached.cloned().unwrap_or_default();
            record.extend(target.into_record());
            record.insert(inverse.to_string(), Value::String(owner_id.to_string()));
            trace!(target_type, inverse, owner_id, "linking one-to-one inverse");
            return self.set(target_type, &record);
        }

        if cached.is_some() {
            if self.state.push_id(target_type, &target.id, inverse, owner_id) {
                trace!(target_type, target_id = %target.id, inverse, owner_id, "appended inverse id");
            }
            return Ok(());
        }

        let mut record = target.into_record();
        record.insert(inverse.to_string(), Value::Array(vec![Value::String(owner_id.to_string())]));
        trace!(target_type, inverse, owner_id, "creating target with inverse collection");
        self.set(target_type, &record)
    }

    fn sync_added_has_many(
        &mut self,
        record_type: &str,
        field: &str,
        owner_id: &str,
        descriptor: &Relationship,
        cardinality: Cardinality,
        item: &Value,
    ) -> StoreResult<()> {
        let Some(target) = Reference::resolve(item) else {
            return Ok(());
        };
        let target_type = descriptor.target_type.as_str();

        let inverse = match (cardinality, descriptor.inverse.as_deref()) {
            (Cardinality::OneToMany | Cardinality::ManyToMany, Some(inverse)) => inverse,
            _ => return self.ensure_placeholder(target_type, target),
        };

        let Some(cached) = self.state.get(target_type, &target.id) else {
            let inverse_value = match cardinality {
                Cardinality::ManyToMany => Value::Array(vec![Value::String(owner_id.to_string())]),
                _ => Value::String(owner_id.to_string()),
            };
            let mut record = target.into_record();
            record.insert(inverse.to_string(), inverse_value);
            trace!(target_type, inverse, owner_id, "creating target with inverse");
            return self.set(target_type, &record);
        };

        if cardinality == Cardinality::ManyToMany {
            if self.state.push_id(target_type, &target.id, inverse, owner_id) {
                trace!(target_type, target_id = %target.id, inverse, owner_id, "appended inverse id");
            }
            return Ok(());
        }

        // A target owned elsewhere moves to this owner.
        let previous_owner = single_id(cached, inverse)
            .filter(|previous| *previous != owner_id)
            .map(str::to_string);
        if let Some(previous_owner) = previous_owner {
            self.state.remove_id(record_type, &previous_owner, field, &target.id);
            trace!(record_type, field, %previous_owner, target_id = %target.id, "detached from previous owner");
        }
        self.state.set_id(target_type, &target.id, inverse, owner_id);
        trace!(target_type, target_id = %target.id, inverse, owner_id, "pointed inverse at owner");
        Ok(())
    }

    /// Rebuilds `record_type#owner_id.field` from cached peers whose inverse
    /// already references the owner.
    fn sync_existing_has_many(
        &mut self,
        record_type: &str,
        field: &str,
        owner_id: &str,
        descriptor: &Relationship,
        cardinality: Cardinality,
    ) {
        let Some(inverse) = descriptor.inverse.as_deref() else {
            return;
        };
        let points_back = |peer: &RawRecord| match cardinality {
            Cardinality::OneToMany => single_id(peer, inverse) == Some(owner_id),
            Cardinality::ManyToMany => id_list(peer, inverse).iter().any(|id| id == owner_id),
            Cardinality::OneToOne | Cardinality::None => false,
        };

        let peers: Vec<String> = self
            .state
            .records(&descriptor.target_type)
            .filter(|(_, peer)| points_back(*peer))
            .map(|(id, _)| id.clone())
            .collect();

        for peer in peers {
            if self.state.push_id(record_type, owner_id, field, &peer) {
                trace!(record_type, field, owner_id, peer = %peer, "recovered existing link");
            }
        }
    }

    /// Unlinks inverses for every relationship `previous` held that
    /// `current` no longer references.
    pub(crate) fn sync_removed_relationships(
        &mut self,
        record_type: &str,
        owner_id: &str,
        current: &RawRecord,
        previous: &RawRecord,
    ) {
        let schema = self.schema;
        let Ok(model) = schema.model(record_type) else {
            return;
        };

        for (field, descriptor) in &model.relationships {
            let cardinality = Cardinality::of(schema, descriptor);
            let Some(inverse) = descriptor.inverse.as_deref() else {
                continue;
            };

            let removed: Vec<String> = match descriptor.kind {
                RelationshipKind::BelongsTo => single_id(previous, field)
                    .filter(|old| single_id(current, field) != Some(*old))
                    .map(str::to_string)
                    .into_iter()
                    .collect(),
                RelationshipKind::HasMany => {
                    let kept = id_list(current, field);
                    id_list(previous, field)
                        .into_iter()
                        .filter(|old| !kept.contains(old))
                        .collect()
                }
            };

            for target_id in removed {
                self.unlink(&descriptor.target_type, &target_id, inverse, owner_id, descriptor.kind, cardinality);
            }
        }
    }

    fn unlink(
        &mut self,
        target_type: &str,
        target_id: &str,
        inverse: &str,
        owner_id: &str,
        kind: RelationshipKind,
        cardinality: Cardinality,
    ) {
        let changed = match (cardinality, kind) {
            (Cardinality::OneToOne, _) | (Cardinality::OneToMany, RelationshipKind::HasMany) => {
                self.state.clear_id(target_type, target_id, inverse, owner_id)
            }
            (Cardinality::OneToMany, RelationshipKind::BelongsTo) | (Cardinality::ManyToMany, _) => {
                self.state.remove_id(target_type, target_id, inverse, owner_id)
            }
            (Cardinality::None, _) => false,
        };
        if changed {
            trace!(target_type, target_id, inverse, owner_id, "unlinked inverse");
        }
    }

    /// Makes sure a target referenced through an uninversed relationship
    /// exists. Embedded objects are merged over the cached record.
    fn ensure_placeholder(&mut self, target_type: &str, target: Reference) -> StoreResult<()> {
        let cached = self.state.get(target_type, &target.id);
        if cached.is_some() && target.embedded.is_none() {
            return Ok(());
        }

        let mut record = cached.cloned().unwrap_or_default();
        record.extend(target.into_record());
        trace!(target_type, "persisting placeholder");
        self.set(target_type, &record)
    }
}
