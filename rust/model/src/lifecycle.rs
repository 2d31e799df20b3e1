// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Clone and remove cascades.
//!
//! Both walks are driven by the schema's ownership table:
//!
//! - **Owned** pointers are followed forward: an owned child is copied with
//!   its holder and removed with it.
//! - **Dependent** pointers are followed backward: a record holding one is
//!   copied and removed together with its target.
//! - **Shared** pointers are never followed; removal clears them.
//!
//! Removal never leaves a dangling pointer, and a clone never writes into
//! the source model unless it is also the target.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::{Error, Result};
use crate::field::{self, FieldValue};
use crate::keys::Handle;
use crate::model::Model;
use crate::schema::{Ownership, ReferenceKind, Schema};
use crate::store::{Record, Store};

/// What [`Model::remove`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// The record and its cascade are gone; the requested record first.
    Removed(Vec<Handle>),
    /// The record's removability predicate refused; nothing changed.
    Blocked,
    /// The handle was not in the model.
    AlreadyAbsent,
}

impl RemoveOutcome {
    /// Removed handles; empty unless [`RemoveOutcome::Removed`].
    pub fn removed(&self) -> &[Handle] {
        match self {
            RemoveOutcome::Removed(handles) => handles,
            _ => &[],
        }
    }

    pub fn is_removed(&self) -> bool {
        matches!(self, RemoveOutcome::Removed(_))
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, RemoveOutcome::Blocked)
    }
}

/// Owned children of a record, in slot order.
fn owned_children(schema: &Schema, store: &Store, handle: Handle) -> Vec<Handle> {
    let Some(record) = store.get(handle) else {
        return Vec::new();
    };
    record
        .pointers()
        .into_iter()
        .filter(|(slot, target)| {
            schema.ownership(record.type_tag(), *slot) == Ownership::Owned && store.contains(*target)
        })
        .map(|(_, target)| target)
        .collect()
}

/// Records holding a dependent pointer to `handle`, in insertion order.
fn dependents(schema: &Schema, store: &Store, handle: Handle) -> Vec<Handle> {
    let mut seen = FxHashSet::default();
    store
        .referrer_slots(handle)
        .into_iter()
        .filter(|(source, slot)| {
            store
                .get(*source)
                .is_some_and(|r| schema.ownership(r.type_tag(), *slot) == Ownership::Dependent)
        })
        .map(|(source, _)| source)
        .filter(|source| seen.insert(*source))
        .collect()
}

/// Depth-first removal set, root first. Cascaded records are included
/// unconditionally.
fn removal_set(schema: &Schema, store: &Store, root: Handle) -> Vec<Handle> {
    let mut visited = FxHashSet::default();
    let mut order = Vec::new();
    let mut stack = vec![root];

    while let Some(handle) = stack.pop() {
        if !visited.insert(handle) {
            continue;
        }
        order.push(handle);
        let mut next = owned_children(schema, store, handle);
        next.extend(dependents(schema, store, handle));
        stack.extend(next.into_iter().rev().filter(|h| !visited.contains(h)));
    }
    order
}

/// Owned subtree and dependent holders in pre-order. An ownership path that
/// revisits a record is a cycle; a holder pointing back along the path is
/// not.
fn clone_plan(
    schema: &Schema,
    store: &Store,
    handle: Handle,
    on_path: &mut FxHashSet<Handle>,
    done: &mut FxHashSet<Handle>,
    plan: &mut Vec<Handle>,
) -> Result<()> {
    if on_path.contains(&handle) {
        return Err(Error::OwnershipCycle(handle));
    }
    if done.contains(&handle) {
        return Ok(());
    }
    on_path.insert(handle);
    plan.push(handle);
    for child in owned_children(schema, store, handle) {
        clone_plan(schema, store, child, on_path, done, plan)?;
    }
    for holder in dependents(schema, store, handle) {
        if !on_path.contains(&holder) {
            clone_plan(schema, store, holder, on_path, done, plan)?;
        }
    }
    on_path.remove(&handle);
    done.insert(handle);
    Ok(())
}

impl Model {
    /// Owned children of a record, in slot order.
    pub fn owned_children(&self, handle: Handle) -> Vec<Handle> {
        owned_children(self.schema(), &self.store(), handle)
    }

    /// Records that are removed together with `handle`, in insertion order.
    pub fn dependents(&self, handle: Handle) -> Vec<Handle> {
        dependents(self.schema(), &self.store(), handle)
    }

    /// Whether the removability predicate allows removing the record.
    /// `false` for absent handles.
    pub fn is_removable(&self, handle: Handle) -> bool {
        let store = self.store();
        store
            .get(handle)
            .is_some_and(|record| self.schema().is_removable(&store, record))
    }

    /// Removes a record with its owned children and dependents.
    ///
    /// Only the requested record is checked for removability. Every pointer
    /// from a surviving record into the removed set is cleared first.
    pub fn remove(&self, handle: Handle) -> RemoveOutcome {
        let plan = {
            let store = self.store();
            let Some(record) = store.get(handle) else {
                return RemoveOutcome::AlreadyAbsent;
            };
            if !self.schema().is_removable(&store, record) {
                tracing::warn!(%handle, type_tag = %record.type_tag(), "removal blocked");
                return RemoveOutcome::Blocked;
            }
            removal_set(self.schema(), &store, handle)
        };

        let members: FxHashSet<Handle> = plan.iter().copied().collect();
        let mut severed = 0usize;
        {
            let mut store = self.store_mut();
            for target in &plan {
                for (source, slot) in store.referrer_slots(*target) {
                    if !members.contains(&source) && store.write_field(source, slot, FieldValue::None) {
                        severed += 1;
                    }
                }
            }
            for removed in &plan {
                store.take(*removed);
            }
        }
        self.forget_views(&plan);

        tracing::debug!(%handle, removed = plan.len(), severed, "removed records");
        RemoveOutcome::Removed(plan)
    }

    /// Deep copy within this model.
    pub fn clone_object(&self, source: Handle) -> Result<Option<Handle>> {
        self.clone_into(source, self)
    }

    /// Deep-copies `source`, its owned subtree and the records depending on
    /// them into `target`.
    ///
    /// Returns the copy's handle, or `None` when `source` is absent. Ports
    /// of the copies start unconnected. Pointers into the copied set are
    /// rewritten to the copies; pointers leaving it are kept when `target`
    /// is this model and unset otherwise. Nothing is written when the
    /// ownership graph has a cycle.
    ///
    /// A [unique](crate::SchemaBuilder::unique) record cloned within its
    /// model is returned as is; cloned into another model, it replaces the
    /// instance already there.
    pub fn clone_into(&self, source: Handle, target: &Model) -> Result<Option<Handle>> {
        let Some(source_type) = self.type_of(source) else {
            return Ok(None);
        };
        let same_model = self.same_model(target);
        let unique = self.schema().is_unique(&source_type);
        if unique && same_model {
            tracing::debug!(%source, type_tag = %source_type, "unique record is its own clone");
            return Ok(Some(source));
        }

        let originals: Vec<Record> = {
            let store = self.store();
            let mut plan = Vec::new();
            clone_plan(
                self.schema(),
                &store,
                source,
                &mut FxHashSet::default(),
                &mut FxHashSet::default(),
                &mut plan,
            )?;
            plan.iter().filter_map(|h| store.get(*h).cloned()).collect()
        };

        let mapping: FxHashMap<Handle, Handle> = originals.iter().map(|r| (r.handle, Handle::new())).collect();
        let mut dropped = 0usize;

        let copies: Vec<Record> = originals
            .iter()
            .filter_map(|original| {
                let handle = *mapping.get(&original.handle)?;
                let mut fields = original.fields.clone();
                for (slot, old) in field::pointer_slots(&original.fields) {
                    let is_port = matches!(
                        self.schema().reference_kind(&original.type_tag, slot),
                        ReferenceKind::Port { .. }
                    );
                    let value = if is_port {
                        FieldValue::None
                    } else if let Some(new) = mapping.get(&old) {
                        FieldValue::Pointer(*new)
                    } else if same_model {
                        FieldValue::Pointer(old)
                    } else {
                        dropped += 1;
                        FieldValue::None
                    };
                    field::write_at(&mut fields, slot, value);
                }
                Some(Record::new(
                    handle,
                    original.type_tag.clone(),
                    original.name.clone(),
                    fields,
                ))
            })
            .collect();

        if unique {
            for existing in target.by_type(&source_type) {
                if !target.remove(existing).is_removed() {
                    tracing::warn!(%existing, type_tag = %source_type, "unique record not replaced");
                }
            }
        }

        {
            let mut store = target.store_mut();
            for copy in copies {
                store.insert(copy);
            }
        }

        let root = mapping.get(&source).copied();
        if dropped > 0 {
            tracing::debug!(%source, dropped, "references outside the cloned subtree left unset");
        }
        tracing::debug!(%source, copies = originals.len(), same_model, "cloned records");
        Ok(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ModelConfig, ReverseLookup};
    use crate::keys::TypeTag;
    use crate::schema::{PortRole, StreamKind, NODE};

    const FAN: TypeTag = TypeTag::from_static("OS:Fan:ComponentModel");
    const CURVE: TypeTag = TypeTag::from_static("OS:Curve:Quadratic");
    const CONTROLLER: TypeTag = TypeTag::from_static("OS:Controller:WaterCoil");
    const LOOP: TypeTag = TypeTag::from_static("OS:PlantLoop");
    const SITE: TypeTag = TypeTag::from_static("OS:Site");
    const A: TypeTag = TypeTag::from_static("Test:A");
    const B: TypeTag = TypeTag::from_static("Test:B");

    fn schema() -> Schema {
        Schema::builder()
            .owned(FAN, 0)
            .shared(FAN, 1)
            .port(FAN, 2, StreamKind::Air, PortRole::Inlet)
            .dependent(CONTROLLER, 0)
            .removable_if(LOOP, |_, r| r.name() != Some("Plant Loop 1"))
            .owned(A, 0)
            .owned(B, 0)
            .unique(SITE)
            .build()
    }

    fn models() -> Vec<Model> {
        [ReverseLookup::Scan, ReverseLookup::Indexed]
            .into_iter()
            .map(|r| Model::with_config(schema(), ModelConfig::default().with_reverse_lookup(r)))
            .collect()
    }

    #[test]
    fn remove_absent_is_idempotent() {
        let model = Model::new(schema());
        let fan = model.add(FAN, vec![]);
        assert_eq!(model.remove(fan).removed(), &[fan]);
        assert_eq!(model.remove(fan), RemoveOutcome::AlreadyAbsent);
        assert!(model.remove(fan).removed().is_empty());
    }

    #[test]
    fn blocked_removal_changes_nothing() {
        let model = Model::new(schema());
        let plant = model.add_named(LOOP, "Plant Loop 1", vec![]);
        let len = model.len();
        assert!(!model.is_removable(plant));
        assert!(model.remove(plant).is_blocked());
        assert_eq!(model.len(), len);
        assert!(model.contains(plant));
    }

    #[test]
    fn remove_cascades_owned_and_dependents() {
        for model in models() {
            let curve = model.add(CURVE, vec![]);
            let fan = model.add(FAN, vec![FieldValue::Pointer(curve)]);
            let controller = model.add(CONTROLLER, vec![FieldValue::Pointer(fan)]);

            let outcome = model.remove(fan);
            assert_eq!(outcome, RemoveOutcome::Removed(vec![fan, curve, controller]));
            assert!(model.is_empty());
        }
    }

    #[test]
    fn remove_severs_shared_pointers() {
        for model in models() {
            let curve = model.add(CURVE, vec![]);
            let fan = model.add(FAN, vec![FieldValue::None, FieldValue::Pointer(curve)]);
            let other = model.add(CURVE, vec![FieldValue::SubRecords(vec![vec![FieldValue::Pointer(curve)]])]);

            assert_eq!(model.remove(curve).removed(), &[curve]);
            assert_eq!(model.resolve(fan, 1), None);
            assert!(model.record(other).unwrap().pointers().is_empty());
            assert!(model.contains(fan));
        }
    }

    #[test]
    fn clone_copies_owned_subtree() {
        let model = Model::new(schema());
        let curve = model.add_named(CURVE, "Curve", vec![FieldValue::Double(2.0)]);
        let shared = model.add(CURVE, vec![]);
        let node = model.add(NODE, vec![]);
        let fan = model.add(FAN, vec![FieldValue::Pointer(curve), FieldValue::Pointer(shared)]);
        model.connect(fan, 2, node).unwrap();

        let copy = model.clone_object(fan).unwrap().unwrap();
        assert_ne!(copy, fan);
        let copied_curve = model.resolve(copy, 0).unwrap();
        assert_ne!(copied_curve, curve);
        assert_eq!(model.name(copied_curve).as_deref(), Some("Curve"));
        assert_eq!(model.resolve(copy, 1), Some(shared));
        assert_eq!(model.resolve(copy, 2), None);

        assert_eq!(model.resolve(fan, 0), Some(curve));
        assert_eq!(model.resolve(fan, 2), Some(node));
        assert_eq!(model.by_type(&CURVE).len(), 3);
    }

    #[test]
    fn clone_copies_dependent_holders() {
        let model = Model::new(schema());
        let fan = model.add(FAN, vec![]);
        let controller = model.add(CONTROLLER, vec![FieldValue::Pointer(fan)]);

        let copy = model.clone_object(fan).unwrap().unwrap();
        let copied = model.sources_of(copy, &CONTROLLER);
        assert_eq!(copied.len(), 1);
        assert_ne!(copied[0], controller);
        assert_eq!(model.sources_of(fan, &CONTROLLER), vec![controller]);

        assert_eq!(model.remove(copy).removed(), &[copy, copied[0]]);
        assert!(model.contains(controller));
    }

    #[test]
    fn clone_into_other_model_carries_dependent_holders() {
        let source = Model::new(schema());
        let target = Model::new(schema());
        let fan = source.add(FAN, vec![]);
        source.add(CONTROLLER, vec![FieldValue::Pointer(fan)]);

        let copy = source.clone_into(fan, &target).unwrap().unwrap();
        assert_eq!(target.len(), 2);
        let holder = target.by_type(&CONTROLLER)[0];
        assert_eq!(target.resolve(holder, 0), Some(copy));
    }

    #[test]
    fn unique_record_clones_to_itself() {
        let model = Model::new(schema());
        let site = model.add(SITE, vec![]);
        assert_eq!(model.clone_object(site).unwrap(), Some(site));
        assert_eq!(model.by_type(&SITE), vec![site]);
    }

    #[test]
    fn unique_record_replaces_instance_in_other_model() {
        let source = Model::new(schema());
        let target = Model::new(schema());
        let site = source.add_named(SITE, "Boulder", vec![]);
        let existing = target.add_named(SITE, "Denver", vec![]);

        let copy = source.clone_into(site, &target).unwrap().unwrap();
        assert_eq!(target.by_type(&SITE), vec![copy]);
        assert!(!target.contains(existing));
        assert_eq!(target.name(copy).as_deref(), Some("Boulder"));
        assert!(source.contains(site));
    }

    #[test]
    fn clone_into_other_model_unsets_shared() {
        let source = Model::new(schema());
        let target = Model::new(schema());
        let curve = source.add(CURVE, vec![]);
        let shared = source.add(CURVE, vec![]);
        let fan = source.add(FAN, vec![FieldValue::Pointer(curve), FieldValue::Pointer(shared)]);
        let before = source.len();

        let copy = source.clone_into(fan, &target).unwrap().unwrap();
        assert_eq!(source.len(), before);
        assert_eq!(target.len(), 2);
        assert!(target.resolve(copy, 0).is_some());
        assert_eq!(target.resolve(copy, 1), None);
    }

    #[test]
    fn clone_absent_is_none() {
        let model = Model::new(schema());
        assert_eq!(model.clone_object(Handle::new()).unwrap(), None);
    }

    #[test]
    fn ownership_cycle_is_reported_and_nothing_written() {
        let model = Model::new(schema());
        let a = model.add(A, vec![]);
        let b = model.add(B, vec![FieldValue::Pointer(a)]);
        model.set_reference(a, 0, b).unwrap();

        let len = model.len();
        assert!(matches!(model.clone_object(a), Err(Error::OwnershipCycle(h)) if h == a));
        assert_eq!(model.len(), len);
    }

    #[test]
    fn remove_terminates_on_ownership_cycle() {
        let model = Model::new(schema());
        let a = model.add(A, vec![]);
        let b = model.add(B, vec![FieldValue::Pointer(a)]);
        model.set_reference(a, 0, b).unwrap();
        assert_eq!(model.remove(a).removed(), &[a, b]);
        assert!(model.is_empty());
    }
}
