// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The model context: one store, one schema, one view registry.
//!
//! [`Model`] is a cheap reference-counted handle; clones share the same
//! store. All mutation goes through `&self` methods that borrow the store for
//! the duration of one operation, so no borrow is ever held across a call
//! into user code other than the schema's removability predicates.

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::config::ModelConfig;
use crate::error::{Error, Result};
use crate::field::{FieldSlot, FieldValue};
use crate::keys::{Handle, TypeTag};
use crate::schema::Schema;
use crate::store::{Record, Store};
use crate::view::ObjectImpl;

pub(crate) struct ModelShared {
    pub(crate) schema: Arc<Schema>,
    pub(crate) config: ModelConfig,
    pub(crate) store: RefCell<Store>,
    /// Live implementation objects, one per wrapped handle.
    pub(crate) views: RefCell<FxHashMap<Handle, Weak<ObjectImpl>>>,
}

/// A building energy model: records plus the schema that interprets them.
///
/// # Example
///
/// ```
/// use bem_lite_model::{FieldValue, Model, Schema, TypeTag};
///
/// const FAN: TypeTag = TypeTag::from_static("OS:Fan:ConstantVolume");
///
/// let model = Model::new(Schema::default());
/// let fan = model.add_named(FAN, "Supply Fan", vec![FieldValue::Double(0.7)]);
///
/// assert_eq!(model.by_type(&FAN), vec![fan]);
/// assert_eq!(model.name(fan).as_deref(), Some("Supply Fan"));
/// ```
#[derive(Clone)]
pub struct Model {
    pub(crate) shared: Rc<ModelShared>,
}

impl Model {
    /// Creates an empty model with the default configuration.
    pub fn new(schema: impl Into<Arc<Schema>>) -> Self {
        Self::with_config(schema, ModelConfig::default())
    }

    pub fn with_config(schema: impl Into<Arc<Schema>>, config: ModelConfig) -> Self {
        let store = Store::new(config.reverse_lookup);
        Self::from_store(schema.into(), config, store)
    }

    pub(crate) fn from_store(schema: Arc<Schema>, config: ModelConfig, store: Store) -> Self {
        Model {
            shared: Rc::new(ModelShared {
                schema,
                config,
                store: RefCell::new(store),
                views: RefCell::new(FxHashMap::default()),
            }),
        }
    }

    pub(crate) fn from_shared(shared: Rc<ModelShared>) -> Self {
        Model { shared }
    }

    pub(crate) fn downgrade(&self) -> Weak<ModelShared> {
        Rc::downgrade(&self.shared)
    }

    pub fn schema(&self) -> &Schema {
        &self.shared.schema
    }

    pub fn shared_schema(&self) -> Arc<Schema> {
        Arc::clone(&self.shared.schema)
    }

    pub fn config(&self) -> &ModelConfig {
        &self.shared.config
    }

    /// Shared borrow of the record store.
    ///
    /// Drop the guard before calling a mutating model operation.
    pub fn store(&self) -> Ref<'_, Store> {
        self.shared.store.borrow()
    }

    pub(crate) fn store_mut(&self) -> RefMut<'_, Store> {
        self.shared.store.borrow_mut()
    }

    /// Whether both handles refer to the same model context.
    pub fn same_model(&self, other: &Model) -> bool {
        Rc::ptr_eq(&self.shared, &other.shared)
    }

    // --- Record operations ---

    /// Adds a record and returns its fresh handle.
    ///
    /// Pointer fields go through the same checks as
    /// [`set_reference`](Model::set_reference); a rejected pointer is left
    /// unset, and so is a pointer in a field the schema does not declare.
    /// Pointers nested in sub-records only need an existing target.
    pub fn add(&self, type_tag: TypeTag, fields: Vec<FieldValue>) -> Handle {
        self.insert_new(type_tag, None, fields)
    }

    pub fn add_named(&self, type_tag: TypeTag, name: impl Into<String>, fields: Vec<FieldValue>) -> Handle {
        self.insert_new(type_tag, Some(name.into()), fields)
    }

    fn insert_new(&self, type_tag: TypeTag, name: Option<String>, mut fields: Vec<FieldValue>) -> Handle {
        let mut deferred = Vec::new();
        {
            let store = self.store();
            for (index, value) in fields.iter_mut().enumerate() {
                match value {
                    FieldValue::Pointer(target) => {
                        deferred.push((index, *target));
                        *value = FieldValue::None;
                    }
                    FieldValue::SubRecords(groups) => {
                        for inner in groups.iter_mut().flatten() {
                            if let FieldValue::Pointer(target) = inner {
                                if !store.contains(*target) {
                                    tracing::debug!(%target, field = index, "dropping dangling sub-record pointer");
                                    *inner = FieldValue::None;
                                }
                            }
                        }
                    }
                    _ => {}
                }
            }
        }

        let handle = self.store_mut().add(type_tag, name, fields);
        for (field, target) in deferred {
            match self.set_reference(handle, field, target) {
                Ok(true) => {}
                Ok(false) => tracing::debug!(%handle, field, %target, "pointer rejected on add"),
                Err(err) => tracing::debug!(%handle, field, %target, %err, "pointer dropped on add"),
            }
        }
        handle
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.store().contains(handle)
    }

    /// Owned copy of a record.
    pub fn record(&self, handle: Handle) -> Option<Record> {
        self.store().get(handle).cloned()
    }

    pub fn type_of(&self, handle: Handle) -> Option<TypeTag> {
        self.store().get(handle).map(|r| r.type_tag().clone())
    }

    /// Handles of one type in insertion order.
    pub fn by_type(&self, type_tag: &TypeTag) -> Vec<Handle> {
        self.store().by_type(type_tag)
    }

    pub fn len(&self) -> usize {
        self.store().len()
    }

    pub fn is_empty(&self) -> bool {
        self.store().is_empty()
    }

    pub fn name(&self, handle: Handle) -> Option<String> {
        self.store().get(handle)?.name().map(str::to_string)
    }

    /// Renames a record; `false` when it is absent.
    pub fn set_name(&self, handle: Handle, name: impl Into<String>) -> bool {
        self.store_mut().set_name(handle, Some(name.into()))
    }

    /// Field value of a record. `None` when the record is absent;
    /// [`FieldValue::None`] past the end of its field list.
    pub fn field(&self, handle: Handle, index: usize) -> Option<FieldValue> {
        let store = self.store();
        let record = store.get(handle)?;
        Some(record.field(index).cloned().unwrap_or_default())
    }

    /// Writes a non-pointer field value.
    ///
    /// Returns `Ok(false)` when the record is absent or a nested sub-record
    /// pointer names a missing record. Pointer values, and non-empty values
    /// for declared pointer fields, are contract violations.
    pub fn set_field(&self, handle: Handle, index: usize, value: FieldValue) -> Result<bool> {
        if matches!(value, FieldValue::Pointer(_)) {
            return Err(Error::PointerWrite { field: index });
        }
        {
            let store = self.store();
            let Some(record) = store.get(handle) else {
                return Ok(false);
            };
            if !value.is_none() && self.schema().pointer(record.type_tag(), index).is_some() {
                return Err(Error::PointerWrite { field: index });
            }
            if let FieldValue::SubRecords(groups) = &value {
                let dangling = groups
                    .iter()
                    .flatten()
                    .filter_map(FieldValue::as_pointer)
                    .find(|target| !store.contains(*target));
                if let Some(target) = dangling {
                    tracing::debug!(%handle, field = index, %target, "sub-record pointer to missing record");
                    return Ok(false);
                }
            }
        }
        Ok(self.store_mut().write_field(handle, FieldSlot::field(index), value))
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let records = self.shared.store.try_borrow().map(|s| s.len()).ok();
        f.debug_struct("Model")
            .field("records", &records)
            .field("config", &self.shared.config)
            .finish()
    }
}
