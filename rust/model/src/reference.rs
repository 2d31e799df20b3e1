// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Pointer writes, resolution and reverse lookup.
//!
//! Every pointer write is checked against the schema's compatibility
//! registry before anything is stored; a rejected write leaves the field as
//! it was. Reverse lookups are answered by the store's referrer index or by
//! a scan, depending on [`ReverseLookup`](crate::ReverseLookup), always in
//! record insertion order.

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::field::{FieldSlot, FieldValue};
use crate::keys::{Handle, TypeTag};
use crate::model::Model;
use crate::registry::Category;
use crate::schema::{CategorySource, ReferenceKind};

/// One pointer between two records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReferenceEdge {
    pub from: Handle,
    pub slot: FieldSlot,
    pub to: Handle,
    pub kind: ReferenceKind,
}

/// Result of a singular lookup that may have several candidates.
///
/// The first candidate by insertion order wins; `ambiguous` tells the caller
/// there were others.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirstMatch {
    pub handle: Handle,
    pub ambiguous: bool,
}

/// A pointer field resolved against an explicit default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedReference {
    /// The field is set.
    Explicit(Handle),
    /// The field is unset; this is the default the caller supplied.
    Default(Handle),
    Unset,
}

impl ResolvedReference {
    pub fn handle(&self) -> Option<Handle> {
        match self {
            ResolvedReference::Explicit(h) | ResolvedReference::Default(h) => Some(*h),
            ResolvedReference::Unset => None,
        }
    }

    pub fn is_explicit(&self) -> bool {
        matches!(self, ResolvedReference::Explicit(_))
    }
}

impl Model {
    /// Points field `field` of `source` at `target`.
    ///
    /// Returns `Ok(false)` and leaves the field untouched when either record
    /// is absent or the target's category does not satisfy the field's
    /// requirement. Writing a field the schema does not declare as a pointer
    /// is an error.
    pub fn set_reference(&self, source: Handle, field: usize, target: Handle) -> Result<bool> {
        let (source_type, target_type) = {
            let store = self.store();
            let Some(source_record) = store.get(source) else {
                tracing::debug!(%source, field, "reference source not found");
                return Ok(false);
            };
            let source_type = source_record.type_tag().clone();
            if self.schema().pointer(&source_type, field).is_none() {
                return Err(Error::NotAPointerField {
                    type_tag: source_type,
                    field,
                });
            }
            let Some(target_record) = store.get(target) else {
                tracing::debug!(%source, field, %target, "reference target not found");
                return Ok(false);
            };
            (source_type, target_record.type_tag().clone())
        };

        if !self.accepts_target(&source_type, field, &target_type, target) {
            tracing::debug!(
                %source,
                source_type = %source_type,
                field,
                %target,
                target_type = %target_type,
                "incompatible reference rejected"
            );
            return Ok(false);
        }

        Ok(self
            .store_mut()
            .write_field(source, FieldSlot::field(field), FieldValue::Pointer(target)))
    }

    /// Whether the field's requirement, if any, accepts `target` as it is
    /// now.
    pub(crate) fn accepts_target(&self, source_type: &TypeTag, field: usize, target_type: &TypeTag, target: Handle) -> bool {
        let Some(requirement) = self.schema().compatibility().get(source_type, field) else {
            return true;
        };
        let category = self.category_of(target).unwrap_or(Category::Record);
        requirement.accepts(target_type, &category)
    }

    /// Unsets a pointer field; `false` when the record is absent.
    pub fn clear_reference(&self, source: Handle, field: usize) -> bool {
        let is_pointer = match self.store().get(source) {
            Some(record) => record.pointer(field).is_some(),
            None => return false,
        };
        if is_pointer {
            self.store_mut()
                .write_field(source, FieldSlot::field(field), FieldValue::None);
        }
        true
    }

    /// The record a pointer field names.
    pub fn resolve(&self, source: Handle, field: usize) -> Option<Handle> {
        let store = self.store();
        let target = store.get(source)?.pointer(field)?;
        store.contains(target).then_some(target)
    }

    /// Records of `source_type` pointing at `target`, each once, in
    /// insertion order.
    pub fn sources_of(&self, target: Handle, source_type: &TypeTag) -> Vec<Handle> {
        let store = self.store();
        let mut seen = FxHashSet::default();
        store
            .referrer_slots(target)
            .into_iter()
            .map(|(source, _)| source)
            .filter(|source| seen.insert(*source))
            .filter(|source| store.get(*source).is_some_and(|r| r.type_tag() == source_type))
            .collect()
    }

    /// Every record pointing at `target`, each once, in insertion order.
    pub fn sources_of_any(&self, target: Handle) -> Vec<Handle> {
        let mut seen = FxHashSet::default();
        self.store()
            .referrer_slots(target)
            .into_iter()
            .map(|(source, _)| source)
            .filter(|source| seen.insert(*source))
            .collect()
    }

    /// Every pointer into `target`.
    pub fn referrers(&self, target: Handle) -> Vec<ReferenceEdge> {
        let store = self.store();
        store
            .referrer_slots(target)
            .into_iter()
            .filter_map(|(from, slot)| {
                let kind = self.schema().reference_kind(store.get(from)?.type_tag(), slot);
                Some(ReferenceEdge {
                    from,
                    slot,
                    to: target,
                    kind,
                })
            })
            .collect()
    }

    /// Every pointer held by `source`, in slot order.
    pub fn references_from(&self, source: Handle) -> Vec<ReferenceEdge> {
        let store = self.store();
        let Some(record) = store.get(source) else {
            return Vec::new();
        };
        record
            .pointers()
            .into_iter()
            .map(|(slot, to)| ReferenceEdge {
                from: source,
                slot,
                to,
                kind: self.schema().reference_kind(record.type_tag(), slot),
            })
            .collect()
    }

    /// The single record of `source_type` pointing at `target`.
    ///
    /// Several matches are not an error: the first by insertion order is
    /// returned and flagged ambiguous.
    pub fn single_source_of(&self, target: Handle, source_type: &TypeTag) -> Option<FirstMatch> {
        let candidates = self.sources_of(target, source_type);
        self.first_match(target, source_type.as_str(), candidates)
    }

    pub(crate) fn first_match(&self, anchor: Handle, what: &str, candidates: Vec<Handle>) -> Option<FirstMatch> {
        let handle = *candidates.first()?;
        let ambiguous = candidates.len() > 1;
        if ambiguous && self.config().warn_on_ambiguous {
            tracing::warn!(
                %anchor,
                what,
                matches = candidates.len(),
                chosen = %handle,
                "ambiguous lookup, using first match"
            );
        }
        Some(FirstMatch { handle, ambiguous })
    }

    /// The category the compatibility registry sees for a record.
    pub fn category_of(&self, handle: Handle) -> Option<Category> {
        let type_tag = self.type_of(handle)?;
        Some(match self.schema().category_source(&type_tag) {
            Some(CategorySource::Schedule { .. }) => Category::Schedule(self.schedule_limits(handle)),
            Some(CategorySource::Node) => Category::Stream(self.node_stream_kind(handle)),
            None => Category::Record,
        })
    }
}
