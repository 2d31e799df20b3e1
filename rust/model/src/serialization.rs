// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! JSON snapshots of a model's records.
//!
//! Records are written in insertion order with their handles in the braced
//! string form, so a snapshot reloads with the same identities, the same
//! `by_type` order and the same references. This is an interchange and
//! debugging format; it carries no schema, so the loading schema decides
//! which top-level pointers survive.

use std::sync::Arc;

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::config::ModelConfig;
use crate::error::{Error, Result};
use crate::field::{self, FieldSlot, FieldValue};
use crate::keys::{Handle, TypeTag};
use crate::model::Model;
use crate::schema::Schema;
use crate::store::{Record, Store};

/// Serializable representation of a model's store.
#[derive(Debug, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub records: Vec<RecordSnapshot>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecordSnapshot {
    pub handle: Handle,
    #[serde(rename = "type")]
    pub type_tag: TypeTag,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldValue>,
}

impl Model {
    /// Serializes the model's records to a JSON string.
    pub fn to_json(&self) -> Result<String> {
        let snapshot = self.to_snapshot();
        serde_json::to_string_pretty(&snapshot).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Creates a serializable snapshot of the store in insertion order.
    pub fn to_snapshot(&self) -> StoreSnapshot {
        let store = self.store();
        StoreSnapshot {
            records: store
                .records()
                .map(|r| RecordSnapshot {
                    handle: r.handle(),
                    type_tag: r.type_tag().clone(),
                    name: r.name().map(str::to_string),
                    fields: r.fields().to_vec(),
                })
                .collect(),
        }
    }

    /// Deserializes a model from a JSON string with the default
    /// configuration.
    pub fn from_json(json: &str, schema: impl Into<Arc<Schema>>) -> Result<Self> {
        Self::from_json_with_config(json, schema, ModelConfig::default())
    }

    pub fn from_json_with_config(json: &str, schema: impl Into<Arc<Schema>>, config: ModelConfig) -> Result<Self> {
        let snapshot: StoreSnapshot =
            serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))?;
        Self::from_snapshot(snapshot, schema.into(), config)
    }

    /// Rebuilds a model from a snapshot.
    ///
    /// Duplicate handles and pointers to handles outside the snapshot are
    /// rejected before anything is built. Top-level pointers that
    /// [`add`](Model::add) would refuse are then cleared.
    fn from_snapshot(snapshot: StoreSnapshot, schema: Arc<Schema>, config: ModelConfig) -> Result<Self> {
        let mut handles = FxHashSet::default();
        for record in &snapshot.records {
            if !handles.insert(record.handle) {
                return Err(Error::DuplicateHandle(record.handle));
            }
        }
        for record in &snapshot.records {
            if let Some((_, to)) = field::pointer_slots(&record.fields)
                .into_iter()
                .find(|(_, to)| !handles.contains(to))
            {
                return Err(Error::DanglingReference {
                    from: record.handle,
                    to,
                });
            }
        }

        let mut store = Store::new(config.reverse_lookup);
        for record in snapshot.records {
            store.insert(Record::new(record.handle, record.type_tag, record.name, record.fields));
        }
        let model = Model::from_store(schema, config, store);
        let dropped = model.drop_rejected_pointers();
        if dropped > 0 {
            tracing::warn!(dropped, "snapshot pointers rejected by the schema");
        }
        tracing::debug!(records = model.len(), "loaded snapshot");
        Ok(model)
    }

    /// Clears undeclared and incompatible top-level pointers, checking
    /// records in insertion order. Returns how many were cleared.
    fn drop_rejected_pointers(&self) -> usize {
        let handles: Vec<Handle> = self.store().records().map(|r| r.handle()).collect();
        let mut dropped = 0;
        for handle in handles {
            let rejected: Vec<(usize, Handle)> = {
                let store = self.store();
                let Some(record) = store.get(handle) else {
                    continue;
                };
                let type_tag = record.type_tag();
                record
                    .pointers()
                    .into_iter()
                    .filter(|(slot, _)| slot.is_top_level())
                    .filter(|(slot, target)| {
                        let declared = self.schema().pointer(type_tag, slot.index).is_some();
                        let accepted = store
                            .get(*target)
                            .is_some_and(|t| self.accepts_target(type_tag, slot.index, t.type_tag(), *target));
                        !(declared && accepted)
                    })
                    .map(|(slot, target)| (slot.index, target))
                    .collect()
            };
            for (field, target) in rejected {
                self.store_mut()
                    .write_field(handle, FieldSlot::field(field), FieldValue::None);
                tracing::debug!(%handle, field, %target, "pointer rejected on load");
                dropped += 1;
            }
        }
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReverseLookup;
    use crate::schedule::ScheduleType;
    use crate::schema::{PortRole, StreamKind, NODE, SCHEDULE_CONSTANT, SCHEDULE_TYPE_LIMITS};

    const FAN: TypeTag = TypeTag::from_static("OS:Fan:ConstantVolume");
    const COIL: TypeTag = TypeTag::from_static("OS:Coil:Cooling:Water");
    const CURVE: TypeTag = TypeTag::from_static("OS:Curve:Quadratic");

    fn schema() -> Arc<Schema> {
        Arc::new(Schema::builder().shared(FAN, 1).build())
    }

    #[test]
    fn roundtrip_empty_model() {
        let model = Model::new(schema());
        let json = model.to_json().unwrap();
        let restored = Model::from_json(&json, schema()).unwrap();
        assert!(restored.is_empty());
    }

    #[test]
    fn roundtrip_preserves_handles_order_and_references() {
        let model = Model::new(schema());
        let curve = model.add_named(CURVE, "Curve 1", vec![FieldValue::Double(1.5)]);
        let fan_a = model.add(FAN, vec![FieldValue::Integer(3), FieldValue::Pointer(curve)]);
        let fan_b = model.add(
            FAN,
            vec![
                FieldValue::None,
                FieldValue::None,
                FieldValue::SubRecords(vec![vec![FieldValue::Pointer(curve), "Branch".into()]]),
            ],
        );

        let json = model.to_json().unwrap();
        for lookup in [ReverseLookup::Scan, ReverseLookup::Indexed] {
            let config = ModelConfig::default().with_reverse_lookup(lookup);
            let restored = Model::from_json_with_config(&json, schema(), config).unwrap();
            assert_eq!(restored.by_type(&FAN), vec![fan_a, fan_b]);
            assert_eq!(restored.name(curve).as_deref(), Some("Curve 1"));
            assert_eq!(restored.resolve(fan_a, 1), Some(curve));
            assert_eq!(restored.field(fan_a, 0), Some(FieldValue::Integer(3)));
            assert_eq!(restored.sources_of_any(curve), vec![fan_a, fan_b]);
        }
    }

    #[test]
    fn incompatible_schedule_is_cleared_on_load() {
        let loose = Model::new(Schema::builder().shared(FAN, 0).shared(FAN, 1).build());
        let limits = loose.add(
            SCHEDULE_TYPE_LIMITS,
            vec![FieldValue::None, FieldValue::None, "Continuous".into(), "Temperature".into()],
        );
        let temperature = loose.add(SCHEDULE_CONSTANT, vec![FieldValue::Pointer(limits), FieldValue::Double(21.0)]);
        let curve = loose.add(CURVE, vec![]);
        let fan = loose.add(FAN, vec![FieldValue::Pointer(temperature), FieldValue::Pointer(curve)]);
        assert_eq!(loose.resolve(fan, 0), Some(temperature));

        let strict = Schema::builder()
            .schedule(FAN, 0, "Availability", ScheduleType::availability())
            .build();
        let restored = Model::from_json(&loose.to_json().unwrap(), strict).unwrap();
        assert_eq!(restored.len(), 4);
        assert_eq!(restored.resolve(fan, 0), None);
        assert_eq!(restored.resolve(fan, 1), None);
        assert_eq!(restored.resolve(temperature, 0), Some(limits));
    }

    #[test]
    fn mixed_stream_node_keeps_first_connection_on_load() {
        let loose = Model::new(Schema::builder().shared(FAN, 2).shared(COIL, 2).build());
        let node = loose.add(NODE, vec![]);
        let fan = loose.add(FAN, vec![FieldValue::None, FieldValue::None, FieldValue::Pointer(node)]);
        let coil = loose.add(COIL, vec![FieldValue::None, FieldValue::None, FieldValue::Pointer(node)]);

        let strict = Arc::new(
            Schema::builder()
                .port(FAN, 2, StreamKind::Air, PortRole::Inlet)
                .port(COIL, 2, StreamKind::Water, PortRole::Inlet)
                .build(),
        );
        for lookup in [ReverseLookup::Scan, ReverseLookup::Indexed] {
            let config = ModelConfig::default().with_reverse_lookup(lookup);
            let restored = Model::from_json_with_config(&loose.to_json().unwrap(), Arc::clone(&strict), config).unwrap();
            assert_eq!(restored.resolve(fan, 2), Some(node));
            assert_eq!(restored.resolve(coil, 2), None);
            assert_eq!(restored.node_stream_kind(node), Some(StreamKind::Air));
        }
    }

    #[test]
    fn handles_are_written_as_strings() {
        let model = Model::new(schema());
        let curve = model.add(CURVE, vec![]);
        let json = model.to_json().unwrap();
        assert!(json.contains(&curve.to_string()));
    }

    #[test]
    fn dangling_pointer_is_rejected() {
        let missing = Handle::new();
        let from = Handle::new();
        let json = serde_json::json!({
            "records": [{
                "handle": from.to_string(),
                "type": "OS:Fan:ConstantVolume",
                "fields": [{ "kind": "Pointer", "value": missing.to_string() }]
            }]
        })
        .to_string();
        let err = Model::from_json(&json, schema()).unwrap_err();
        assert!(matches!(err, Error::DanglingReference { from: f, to } if f == from && to == missing));
    }

    #[test]
    fn duplicate_handle_is_rejected() {
        let h = Handle::new();
        let json = serde_json::json!({
            "records": [
                { "handle": h.to_string(), "type": "A" },
                { "handle": h.to_string(), "type": "B" }
            ]
        })
        .to_string();
        assert!(matches!(Model::from_json(&json, schema()), Err(Error::DuplicateHandle(d)) if d == h));
    }

    #[test]
    fn malformed_json_is_a_serialization_error() {
        assert!(matches!(
            Model::from_json("{ not json", schema()),
            Err(Error::Serialization(_))
        ));
    }
}
