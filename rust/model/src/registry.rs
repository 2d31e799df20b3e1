// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Compatibility rules for pointer fields.
//!
//! A [`Requirement`] constrains what a `(consumer type, field)` pair may point
//! at. The target's [`Category`] is derived from the store at check time, so
//! the registry itself is immutable once the schema is built.

use rustc_hash::FxHashMap;

use crate::keys::TypeTag;
use crate::schedule::{ScheduleLimits, ScheduleType};
use crate::schema::StreamKind;

/// What a pointer field accepts.
#[derive(Debug, Clone, PartialEq)]
pub enum Requirement {
    /// A schedule whose limits satisfy this schedule type.
    Schedule(ScheduleType),
    /// A topology node carrying this stream (or no stream yet).
    Stream(StreamKind),
    /// A record of one of these types.
    OneOf(Vec<TypeTag>),
}

/// The category of a reference target as seen by the registry.
#[derive(Debug, Clone, PartialEq)]
pub enum Category {
    /// A schedule; `None` when it has no type limits.
    Schedule(Option<ScheduleLimits>),
    /// A node; `None` when no port references it yet.
    Stream(Option<StreamKind>),
    /// Anything else.
    Record,
}

impl Requirement {
    /// Whether a target of `target_type` with `category` satisfies this
    /// requirement.
    ///
    /// Untyped schedules and unconnected nodes are accepted.
    pub fn accepts(&self, target_type: &TypeTag, category: &Category) -> bool {
        match (self, category) {
            (Requirement::Schedule(_), Category::Schedule(None)) => true,
            (Requirement::Schedule(wanted), Category::Schedule(Some(limits))) => {
                wanted.is_compatible(limits, false)
            }
            (Requirement::Stream(_), Category::Stream(None)) => true,
            (Requirement::Stream(wanted), Category::Stream(Some(actual))) => wanted == actual,
            (Requirement::OneOf(types), _) => types.contains(target_type),
            _ => false,
        }
    }
}

/// Read-only table of `(consumer type, field) -> Requirement`.
#[derive(Debug, Clone, Default)]
pub struct CompatibilityRegistry {
    requirements: FxHashMap<(TypeTag, usize), Requirement>,
}

impl CompatibilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, type_tag: TypeTag, field: usize, requirement: Requirement) {
        self.requirements.insert((type_tag, field), requirement);
    }

    pub fn get(&self, type_tag: &TypeTag, field: usize) -> Option<&Requirement> {
        self.requirements.get(&(type_tag.clone(), field))
    }

    /// Whether the pair accepts the target. Fields without a requirement
    /// accept anything.
    pub fn check(&self, type_tag: &TypeTag, field: usize, target_type: &TypeTag, category: &Category) -> bool {
        self.get(type_tag, field)
            .map_or(true, |req| req.accepts(target_type, category))
    }

    pub fn len(&self) -> usize {
        self.requirements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }
}
