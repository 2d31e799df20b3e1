// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Declarative description of record types.
//!
//! The schema answers, per `(type, field)`: is this a pointer, what does it
//! point at ([`ReferenceKind`]), and who owns the target ([`Ownership`]).
//! It also carries the removability predicates, the compatibility registry
//! and the schedule type registry. A schema is built once with
//! [`SchemaBuilder`] and shared read-only between models.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::field::FieldSlot;
use crate::keys::TypeTag;
use crate::registry::{CompatibilityRegistry, Requirement};
use crate::schedule::{ScheduleEntry, ScheduleType, ScheduleTypeRegistry, CONSTANT_LIMITS};
use crate::store::{Record, Store};

/// Topology junction between components.
pub const NODE: TypeTag = TypeTag::from_static("OS:Node");
/// Schedule category record (bounds, numeric type, unit type).
pub const SCHEDULE_TYPE_LIMITS: TypeTag = TypeTag::from_static("OS:ScheduleTypeLimits");
/// Schedule with one constant value.
pub const SCHEDULE_CONSTANT: TypeTag = TypeTag::from_static("OS:Schedule:Constant");

/// The fluid a port carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamKind {
    Air,
    Water,
    Refrigerant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortRole {
    Inlet,
    Outlet,
}

/// What a pointer field refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReferenceKind {
    Object,
    Schedule,
    Port { stream: StreamKind, role: PortRole },
    SubComponent,
}

/// Lifecycle relation between a record and the target of one of its
/// pointers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Ownership {
    /// Target outlives the pointer; removal only clears the pointer.
    Shared,
    /// Target is cloned and removed with the holder.
    Owned,
    /// Holder exists only for the target; removing the target removes the
    /// holder.
    Dependent,
}

/// Declaration of one pointer field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerDecl {
    pub kind: ReferenceKind,
    pub ownership: Ownership,
}

/// How the registry derives a record's [`Category`](crate::Category).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategorySource {
    /// A schedule; limits are read through the pointer at `limits_field`.
    Schedule { limits_field: usize },
    /// A topology node; its stream is derived from connected ports.
    Node,
}

/// Predicate deciding whether a record may be removed.
pub type RemovalPredicate = Arc<dyn Fn(&Store, &Record) -> bool + Send + Sync>;

/// Read-only type declarations shared by every model built on them.
pub struct Schema {
    pointers: FxHashMap<TypeTag, BTreeMap<usize, PointerDecl>>,
    categories: FxHashMap<TypeTag, CategorySource>,
    removable: FxHashMap<TypeTag, RemovalPredicate>,
    compatibility: CompatibilityRegistry,
    schedule_types: ScheduleTypeRegistry,
    unique: FxHashSet<TypeTag>,
    disconnect_removals: FxHashMap<(TypeTag, usize), Vec<TypeTag>>,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::new()
    }

    /// The declaration of a top-level pointer field.
    pub fn pointer(&self, type_tag: &TypeTag, field: usize) -> Option<PointerDecl> {
        self.pointers.get(type_tag)?.get(&field).copied()
    }

    /// Declared pointer fields of a type in field order.
    pub fn pointer_fields(&self, type_tag: &TypeTag) -> Vec<(usize, PointerDecl)> {
        self.pointers
            .get(type_tag)
            .map(|fields| fields.iter().map(|(i, d)| (*i, *d)).collect())
            .unwrap_or_default()
    }

    /// Declared ports of a type in field order.
    pub fn ports(&self, type_tag: &TypeTag) -> Vec<(usize, StreamKind, PortRole)> {
        self.pointer_fields(type_tag)
            .into_iter()
            .filter_map(|(i, d)| match d.kind {
                ReferenceKind::Port { stream, role } => Some((i, stream, role)),
                _ => None,
            })
            .collect()
    }

    pub fn port(&self, type_tag: &TypeTag, field: usize) -> Option<(StreamKind, PortRole)> {
        match self.pointer(type_tag, field)?.kind {
            ReferenceKind::Port { stream, role } => Some((stream, role)),
            _ => None,
        }
    }

    /// Declared sub-component slots of a type in field order.
    pub fn sub_component_fields(&self, type_tag: &TypeTag) -> Vec<usize> {
        self.pointer_fields(type_tag)
            .into_iter()
            .filter(|(_, d)| d.kind == ReferenceKind::SubComponent)
            .map(|(i, _)| i)
            .collect()
    }

    /// Ownership of the pointer at `slot`.
    ///
    /// Undeclared slots and slots inside sub-records are shared.
    pub fn ownership(&self, type_tag: &TypeTag, slot: FieldSlot) -> Ownership {
        if !slot.is_top_level() {
            return Ownership::Shared;
        }
        self.pointer(type_tag, slot.index)
            .map_or(Ownership::Shared, |d| d.ownership)
    }

    /// Kind of the pointer at `slot`; plain object references by default.
    pub fn reference_kind(&self, type_tag: &TypeTag, slot: FieldSlot) -> ReferenceKind {
        if !slot.is_top_level() {
            return ReferenceKind::Object;
        }
        self.pointer(type_tag, slot.index)
            .map_or(ReferenceKind::Object, |d| d.kind)
    }

    /// Whether `record` may be removed. Types without a predicate always may.
    pub fn is_removable(&self, store: &Store, record: &Record) -> bool {
        self.removable
            .get(record.type_tag())
            .map_or(true, |predicate| predicate(store, record))
    }

    /// Whether a model holds at most one record of this type.
    pub fn is_unique(&self, type_tag: &TypeTag) -> bool {
        self.unique.contains(type_tag)
    }

    /// Holder types removed when `port` of a `type_tag` record is
    /// disconnected.
    pub fn disconnect_removals(&self, type_tag: &TypeTag, port: usize) -> &[TypeTag] {
        self.disconnect_removals
            .get(&(type_tag.clone(), port))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn category_source(&self, type_tag: &TypeTag) -> Option<CategorySource> {
        self.categories.get(type_tag).copied()
    }

    /// Limits field of a schedule type.
    pub fn schedule_limits_field(&self, type_tag: &TypeTag) -> Option<usize> {
        match self.category_source(type_tag)? {
            CategorySource::Schedule { limits_field } => Some(limits_field),
            CategorySource::Node => None,
        }
    }

    /// Every type declared as a schedule.
    pub fn schedule_types_declared(&self) -> Vec<&TypeTag> {
        let mut types: Vec<&TypeTag> = self
            .categories
            .iter()
            .filter(|(_, s)| matches!(s, CategorySource::Schedule { .. }))
            .map(|(t, _)| t)
            .collect();
        types.sort();
        types
    }

    pub fn compatibility(&self) -> &CompatibilityRegistry {
        &self.compatibility
    }

    pub fn schedule_types(&self) -> &ScheduleTypeRegistry {
        &self.schedule_types
    }
}

impl Default for Schema {
    /// Built-in types only.
    fn default() -> Self {
        SchemaBuilder::new().build()
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("pointer_types", &self.pointers.len())
            .field("categories", &self.categories)
            .field("removable_types", &self.removable.len())
            .field("requirements", &self.compatibility.len())
            .field("unique", &self.unique)
            .finish()
    }
}

/// Builder for [`Schema`]. Starts with the built-in node and schedule types.
pub struct SchemaBuilder {
    schema: Schema,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        let schema = Schema {
            pointers: FxHashMap::default(),
            categories: FxHashMap::default(),
            removable: FxHashMap::default(),
            compatibility: CompatibilityRegistry::new(),
            schedule_types: ScheduleTypeRegistry::new(),
            unique: FxHashSet::default(),
            disconnect_removals: FxHashMap::default(),
        };
        SchemaBuilder { schema }
            .schedule_source(SCHEDULE_CONSTANT, CONSTANT_LIMITS)
            .category(NODE, CategorySource::Node)
    }

    /// Declares a pointer field.
    pub fn pointer(mut self, type_tag: TypeTag, field: usize, kind: ReferenceKind, ownership: Ownership) -> Self {
        self.schema
            .pointers
            .entry(type_tag)
            .or_default()
            .insert(field, PointerDecl { kind, ownership });
        self
    }

    pub fn shared(self, type_tag: TypeTag, field: usize) -> Self {
        self.pointer(type_tag, field, ReferenceKind::Object, Ownership::Shared)
    }

    pub fn owned(self, type_tag: TypeTag, field: usize) -> Self {
        self.pointer(type_tag, field, ReferenceKind::Object, Ownership::Owned)
    }

    /// The holder is removed when the target is.
    pub fn dependent(self, type_tag: TypeTag, field: usize) -> Self {
        self.pointer(type_tag, field, ReferenceKind::Object, Ownership::Dependent)
    }

    /// Declares a port; only nodes carrying `stream` (or none yet) connect.
    pub fn port(self, type_tag: TypeTag, field: usize, stream: StreamKind, role: PortRole) -> Self {
        self.pointer(type_tag.clone(), field, ReferenceKind::Port { stream, role }, Ownership::Shared)
            .require(type_tag, field, Requirement::Stream(stream))
    }

    /// Declares an owned sub-component slot of an assembly.
    pub fn sub_component(self, type_tag: TypeTag, field: usize) -> Self {
        self.pointer(type_tag, field, ReferenceKind::SubComponent, Ownership::Owned)
    }

    /// Declares a schedule field accepting `schedule_type`.
    pub fn schedule(
        mut self,
        type_tag: TypeTag,
        field: usize,
        display_name: impl Into<String>,
        schedule_type: ScheduleType,
    ) -> Self {
        self.schema.schedule_types.register(
            type_tag.clone(),
            ScheduleEntry {
                display_name: display_name.into(),
                field,
                schedule_type: schedule_type.clone(),
            },
        );
        self.pointer(type_tag.clone(), field, ReferenceKind::Schedule, Ownership::Shared)
            .require(type_tag, field, Requirement::Schedule(schedule_type))
    }

    /// Adds a compatibility requirement to a field.
    pub fn require(mut self, type_tag: TypeTag, field: usize, requirement: Requirement) -> Self {
        self.schema.compatibility.insert(type_tag, field, requirement);
        self
    }

    /// Declares records of `type_tag` as schedules whose limits sit behind
    /// the pointer at `limits_field`.
    pub fn schedule_source(self, type_tag: TypeTag, limits_field: usize) -> Self {
        self.shared(type_tag.clone(), limits_field)
            .require(type_tag.clone(), limits_field, Requirement::OneOf(vec![SCHEDULE_TYPE_LIMITS]))
            .category(type_tag, CategorySource::Schedule { limits_field })
    }

    fn category(mut self, type_tag: TypeTag, source: CategorySource) -> Self {
        self.schema.categories.insert(type_tag, source);
        self
    }

    /// Records of `type_tag` may only be removed when `predicate` holds.
    pub fn removable_if<F>(mut self, type_tag: TypeTag, predicate: F) -> Self
    where
        F: Fn(&Store, &Record) -> bool + Send + Sync + 'static,
    {
        self.schema.removable.insert(type_tag, Arc::new(predicate));
        self
    }

    /// At most one record of `type_tag` per model. Cloning one within its
    /// model returns the original; cloning it into another model replaces
    /// the instance already there.
    pub fn unique(mut self, type_tag: TypeTag) -> Self {
        self.schema.unique.insert(type_tag);
        self
    }

    /// Disconnecting `port` of a `type_tag` record also removes the
    /// `holder` records that hold a dependent pointer to it, e.g. the
    /// controller that only exists for a coil's plant-side connection.
    pub fn remove_on_disconnect(mut self, type_tag: TypeTag, port: usize, holder: TypeTag) -> Self {
        self.schema
            .disconnect_removals
            .entry((type_tag, port))
            .or_default()
            .push(holder);
        self
    }

    pub fn build(self) -> Schema {
        self.schema
    }
}

impl Default for SchemaBuilder {
    fn default() -> Self {
        Self::new()
    }
}
