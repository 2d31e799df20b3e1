// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Arena-based storage for model records.
//!
//! The [`Store`] is the sole owner of every record. Records live in a slot
//! map with generational keys; a handle map translates the public
//! [`Handle`] identity into arena keys. Type and insertion-order indices make
//! `by_type` and full iteration deterministic, and an optional referrer index
//! (target → referring slots) answers reverse lookups without a scan.
//!
//! ## Referential integrity
//!
//! Every pointer held by a record, nested ones included, names a record in
//! the same store. The store itself does not enforce this on raw writes; the
//! [`Model`](crate::Model) operations that reach the mutators below do.

use rustc_hash::{FxHashMap, FxHashSet};
use slotmap::SlotMap;

use crate::config::ReverseLookup;
use crate::field::{self, FieldSlot, FieldValue};
use crate::keys::{Handle, RecordKey, TypeTag};

/// One object of the model: a typed, optionally named list of fields.
#[derive(Debug, Clone)]
pub struct Record {
    pub(crate) handle: Handle,
    pub(crate) type_tag: TypeTag,
    pub(crate) name: Option<String>,
    pub(crate) fields: Vec<FieldValue>,
    /// Insertion sequence number within the owning store.
    pub(crate) seq: u64,
}

impl Record {
    pub(crate) fn new(
        handle: Handle,
        type_tag: TypeTag,
        name: Option<String>,
        fields: Vec<FieldValue>,
    ) -> Self {
        Self {
            handle,
            type_tag,
            name,
            fields,
            seq: 0,
        }
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn type_tag(&self) -> &TypeTag {
        &self.type_tag
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn fields(&self) -> &[FieldValue] {
        &self.fields
    }

    /// The field at `index`; `None` past the end.
    pub fn field(&self, index: usize) -> Option<&FieldValue> {
        self.fields.get(index)
    }

    /// The field at any slot, sub-record slots included.
    pub fn slot(&self, slot: FieldSlot) -> Option<&FieldValue> {
        field::value_at(&self.fields, slot)
    }

    /// The pointer held at top-level field `index`, if any.
    pub fn pointer(&self, index: usize) -> Option<Handle> {
        self.fields.get(index).and_then(FieldValue::as_pointer)
    }

    /// Every pointer held by this record, in slot order.
    pub fn pointers(&self) -> Vec<(FieldSlot, Handle)> {
        field::pointer_slots(&self.fields)
    }
}

/// The central arena that owns all records and their indices.
#[derive(Debug)]
pub struct Store {
    pub(crate) records: SlotMap<RecordKey, Record>,
    pub(crate) handles: FxHashMap<Handle, RecordKey>,

    // Iteration order
    pub(crate) order: Vec<RecordKey>,
    pub(crate) by_type: FxHashMap<TypeTag, Vec<RecordKey>>,

    // Reverse adjacency: target → (source, slot)
    pub(crate) referrers: Option<FxHashMap<Handle, FxHashSet<(Handle, FieldSlot)>>>,

    next_seq: u64,
}

impl Store {
    /// Creates a new, empty store with the given reverse lookup strategy.
    pub fn new(reverse_lookup: ReverseLookup) -> Self {
        Self {
            records: SlotMap::with_key(),
            handles: FxHashMap::default(),
            order: Vec::new(),
            by_type: FxHashMap::default(),
            referrers: match reverse_lookup {
                ReverseLookup::Scan => None,
                ReverseLookup::Indexed => Some(FxHashMap::default()),
            },
            next_seq: 0,
        }
    }

    pub fn reverse_lookup(&self) -> ReverseLookup {
        if self.referrers.is_some() {
            ReverseLookup::Indexed
        } else {
            ReverseLookup::Scan
        }
    }

    // --- Insertion ---

    /// Adds a record under a fresh handle.
    pub(crate) fn add(
        &mut self,
        type_tag: TypeTag,
        name: Option<String>,
        fields: Vec<FieldValue>,
    ) -> Handle {
        self.insert(Record::new(Handle::new(), type_tag, name, fields))
    }

    /// Inserts a fully formed record, keeping its handle.
    ///
    /// The caller guarantees the handle is not already present.
    pub(crate) fn insert(&mut self, mut record: Record) -> Handle {
        let handle = record.handle;
        record.seq = self.next_seq;
        self.next_seq += 1;

        let pointers = record.pointers();
        let type_tag = record.type_tag.clone();
        let key = self.records.insert(record);
        self.handles.insert(handle, key);
        self.order.push(key);
        self.by_type.entry(type_tag).or_default().push(key);

        if let Some(index) = self.referrers.as_mut() {
            for (slot, target) in pointers {
                index.entry(target).or_default().insert((handle, slot));
            }
        }
        handle
    }

    // --- Lookup ---

    /// Returns the record for the given handle, or `None` if not found.
    pub fn get(&self, handle: Handle) -> Option<&Record> {
        self.handles.get(&handle).and_then(|k| self.records.get(*k))
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.handles.contains_key(&handle)
    }

    /// Returns the number of records in the store.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Every record in insertion order.
    pub fn records(&self) -> impl Iterator<Item = &Record> + '_ {
        self.order.iter().filter_map(|k| self.records.get(*k))
    }

    /// Records of one type in insertion order.
    pub fn records_of_type<'a>(&'a self, type_tag: &TypeTag) -> impl Iterator<Item = &'a Record> + 'a {
        self.by_type
            .get(type_tag)
            .into_iter()
            .flatten()
            .filter_map(|k| self.records.get(*k))
    }

    /// Handles of one type in insertion order.
    pub fn by_type(&self, type_tag: &TypeTag) -> Vec<Handle> {
        self.records_of_type(type_tag).map(|r| r.handle).collect()
    }

    /// Records of one type whose name matches case-insensitively.
    pub fn objects_by_name(&self, type_tag: &TypeTag, name: &str) -> Vec<Handle> {
        let wanted = name.to_lowercase();
        self.records_of_type(type_tag)
            .filter(|r| r.name.as_deref().map(str::to_lowercase).as_deref() == Some(&wanted))
            .map(|r| r.handle)
            .collect()
    }

    /// Insertion position of a record, used to order reverse lookups.
    pub(crate) fn seq_of(&self, handle: Handle) -> Option<u64> {
        self.get(handle).map(|r| r.seq)
    }

    // --- Reverse lookup ---

    /// Every `(source, slot)` holding a pointer to `target`, ordered by the
    /// source's insertion order, then by slot.
    ///
    /// Scan and index answer identically.
    pub fn referrer_slots(&self, target: Handle) -> Vec<(Handle, FieldSlot)> {
        match &self.referrers {
            Some(index) => {
                let mut hits: Vec<(u64, FieldSlot, Handle)> = index
                    .get(&target)
                    .into_iter()
                    .flatten()
                    .filter_map(|(source, slot)| self.seq_of(*source).map(|seq| (seq, *slot, *source)))
                    .collect();
                hits.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
                hits.into_iter().map(|(_, slot, source)| (source, slot)).collect()
            }
            None => self
                .records()
                .flat_map(|r| {
                    r.pointers()
                        .into_iter()
                        .filter(|(_, h)| *h == target)
                        .map(|(slot, _)| (r.handle, slot))
                        .collect::<Vec<_>>()
                })
                .collect(),
        }
    }

    // --- Mutation ---

    /// Writes a field value, keeping the referrer index current.
    ///
    /// Returns `false` when the record or the sub-record slot does not exist.
    pub(crate) fn write_field(&mut self, handle: Handle, slot: FieldSlot, value: FieldValue) -> bool {
        let Some(key) = self.handles.get(&handle).copied() else {
            return false;
        };
        let Some(record) = self.records.get_mut(key) else {
            return false;
        };

        let before = if self.referrers.is_some() {
            record.pointers()
        } else {
            Vec::new()
        };
        if !field::write_at(&mut record.fields, slot, value) {
            return false;
        }

        if let Some(index) = self.referrers.as_mut() {
            let after = record.pointers();
            for (s, target) in &before {
                if let Some(set) = index.get_mut(target) {
                    set.remove(&(handle, *s));
                    if set.is_empty() {
                        index.remove(target);
                    }
                }
            }
            for (s, target) in after {
                index.entry(target).or_default().insert((handle, s));
            }
        }
        true
    }

    pub(crate) fn set_name(&mut self, handle: Handle, name: Option<String>) -> bool {
        match self.handles.get(&handle).and_then(|k| self.records.get_mut(*k)) {
            Some(record) => {
                record.name = name;
                true
            }
            None => false,
        }
    }

    /// Removes a record from the arena and every index.
    ///
    /// Raw removal: pointers into the record are not touched.
    pub(crate) fn take(&mut self, handle: Handle) -> Option<Record> {
        let key = self.handles.remove(&handle)?;
        let record = self.records.remove(key)?;

        self.order.retain(|k| *k != key);
        if let Some(keys) = self.by_type.get_mut(&record.type_tag) {
            keys.retain(|k| *k != key);
            if keys.is_empty() {
                self.by_type.remove(&record.type_tag);
            }
        }

        if let Some(index) = self.referrers.as_mut() {
            index.remove(&handle);
            for (slot, target) in record.pointers() {
                if let Some(set) = index.get_mut(&target) {
                    set.remove(&(handle, slot));
                    if set.is_empty() {
                        index.remove(&target);
                    }
                }
            }
        }
        Some(record)
    }
}
