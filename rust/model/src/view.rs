// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Typed views over records.
//!
//! A [`ModelObject`] is a cheap, clonable view of one record. All views of
//! the same record share a single [`ObjectImpl`], so identity is by
//! reference: a write through one view is visible through every other, and
//! once the record is removed every view reports [`Error::Detached`].
//!
//! Views hold the model weakly. The store owns the data; a view never keeps
//! a model alive and never caches field values.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

use crate::error::{Error, Result};
use crate::field::FieldValue;
use crate::keys::{Handle, TypeTag};
use crate::lifecycle::RemoveOutcome;
use crate::model::{Model, ModelShared};

/// Shared state behind every view of one record.
pub struct ObjectImpl {
    handle: Handle,
    model: Weak<ModelShared>,
}

impl ObjectImpl {
    pub fn handle(&self) -> Handle {
        self.handle
    }

    fn model(&self) -> Result<Model> {
        self.model
            .upgrade()
            .map(Model::from_shared)
            .ok_or(Error::Detached(self.handle))
    }

    fn attached(&self) -> Result<Model> {
        let model = self.model()?;
        if model.contains(self.handle) {
            Ok(model)
        } else {
            Err(Error::Detached(self.handle))
        }
    }
}

impl Drop for ObjectImpl {
    fn drop(&mut self) {
        let Some(shared) = self.model.upgrade() else {
            return;
        };
        if let Ok(mut views) = shared.views.try_borrow_mut() {
            let is_self = views
                .get(&self.handle)
                .is_some_and(|w| std::ptr::eq(w.as_ptr(), self as *const ObjectImpl));
            if is_self {
                views.remove(&self.handle);
            }
        };
    }
}

/// A view of one record.
#[derive(Clone)]
pub struct ModelObject {
    imp: Rc<ObjectImpl>,
}

impl ModelObject {
    pub fn handle(&self) -> Handle {
        self.imp.handle
    }

    /// The owning model; `Err(Detached)` once the model is dropped.
    pub fn model(&self) -> Result<Model> {
        self.imp.model()
    }

    /// Whether the record is gone (removed, or its model dropped).
    pub fn is_detached(&self) -> bool {
        self.imp.attached().is_err()
    }

    /// Whether both views share the same implementation object.
    pub fn ptr_eq(&self, other: &ModelObject) -> bool {
        Rc::ptr_eq(&self.imp, &other.imp)
    }

    pub fn type_tag(&self) -> Result<TypeTag> {
        let model = self.imp.attached()?;
        model.type_of(self.handle()).ok_or(Error::Detached(self.handle()))
    }

    pub fn name(&self) -> Result<Option<String>> {
        let model = self.imp.attached()?;
        Ok(model.name(self.handle()))
    }

    pub fn set_name(&self, name: impl Into<String>) -> Result<()> {
        let model = self.imp.attached()?;
        model.set_name(self.handle(), name);
        Ok(())
    }

    /// Field value; [`FieldValue::None`] past the end of the field list.
    pub fn field(&self, index: usize) -> Result<FieldValue> {
        let model = self.imp.attached()?;
        model.field(self.handle(), index).ok_or(Error::Detached(self.handle()))
    }

    pub fn fields(&self) -> Result<Vec<FieldValue>> {
        let model = self.imp.attached()?;
        let store = model.store();
        store
            .get(self.handle())
            .map(|r| r.fields().to_vec())
            .ok_or(Error::Detached(self.handle()))
    }

    /// Writes a non-pointer field. `Ok(false)` when a nested sub-record
    /// pointer names a missing record.
    pub fn set_field(&self, index: usize, value: FieldValue) -> Result<bool> {
        let model = self.imp.attached()?;
        model.set_field(self.handle(), index, value)
    }

    /// View of the record a pointer field names.
    pub fn reference(&self, index: usize) -> Result<Option<ModelObject>> {
        let model = self.imp.attached()?;
        Ok(model
            .resolve(self.handle(), index)
            .and_then(|target| model.object(target)))
    }

    /// Points a field at another view's record.
    ///
    /// Both views must belong to the same model.
    pub fn set_reference(&self, index: usize, target: &ModelObject) -> Result<bool> {
        let model = self.imp.attached()?;
        if !Weak::ptr_eq(&self.imp.model, &target.imp.model) {
            return Err(Error::ForeignObject(target.handle()));
        }
        model.set_reference(self.handle(), index, target.handle())
    }

    pub fn clear_reference(&self, index: usize) -> Result<()> {
        let model = self.imp.attached()?;
        model.clear_reference(self.handle(), index);
        Ok(())
    }

    /// Views of every record of `source_type` pointing at this one.
    pub fn sources(&self, source_type: &TypeTag) -> Result<Vec<ModelObject>> {
        let model = self.imp.attached()?;
        Ok(model
            .sources_of(self.handle(), source_type)
            .into_iter()
            .filter_map(|h| model.object(h))
            .collect())
    }

    /// Removes the record through the cascade engine.
    pub fn remove(&self) -> Result<RemoveOutcome> {
        let model = self.imp.model()?;
        Ok(model.remove(self.handle()))
    }

    /// Deep-copies the record into `target` and wraps the copy.
    pub fn clone_into(&self, target: &Model) -> Result<ModelObject> {
        let model = self.imp.attached()?;
        let copy = model
            .clone_into(self.handle(), target)?
            .ok_or(Error::Detached(self.handle()))?;
        target.object(copy).ok_or(Error::Detached(copy))
    }

    /// Typed facade over this view, if the record has the facade's type.
    pub fn cast<T: TypedObject>(&self) -> Option<T> {
        let type_tag = self.type_tag().ok()?;
        (type_tag == T::TYPE_TAG).then(|| T::from_object(self.clone()))
    }
}

impl PartialEq for ModelObject {
    fn eq(&self, other: &Self) -> bool {
        self.handle() == other.handle() && Weak::ptr_eq(&self.imp.model, &other.imp.model)
    }
}

impl Eq for ModelObject {}

impl Hash for ModelObject {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.handle().hash(state);
    }
}

impl fmt::Debug for ModelObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelObject")
            .field("handle", &self.handle())
            .field("detached", &self.is_detached())
            .finish()
    }
}

/// A facade type over [`ModelObject`] for one record type.
///
/// ```
/// use bem_lite_model::{Model, ModelObject, Schema, TypeTag, TypedObject};
///
/// struct Curve(ModelObject);
///
/// impl TypedObject for Curve {
///     const TYPE_TAG: TypeTag = TypeTag::from_static("OS:Curve:Quadratic");
///     fn from_object(object: ModelObject) -> Self {
///         Curve(object)
///     }
///     fn object(&self) -> &ModelObject {
///         &self.0
///     }
/// }
///
/// let model = Model::new(Schema::default());
/// model.add(Curve::TYPE_TAG, vec![]);
/// assert_eq!(model.concrete_objects::<Curve>().len(), 1);
/// ```
pub trait TypedObject: Sized {
    const TYPE_TAG: TypeTag;

    /// Wraps a view already known to have [`Self::TYPE_TAG`].
    fn from_object(object: ModelObject) -> Self;

    fn object(&self) -> &ModelObject;

    fn handle(&self) -> Handle {
        self.object().handle()
    }
}

// --- Model operations ---

impl Model {
    /// View of an existing record; `None` when the handle is absent.
    ///
    /// Reuses the live implementation object when one exists.
    pub fn object(&self, handle: Handle) -> Option<ModelObject> {
        if !self.contains(handle) {
            return None;
        }
        let mut views = self.shared.views.borrow_mut();
        if let Some(imp) = views.get(&handle).and_then(Weak::upgrade) {
            return Some(ModelObject { imp });
        }
        let imp = Rc::new(ObjectImpl {
            handle,
            model: self.downgrade(),
        });
        views.insert(handle, Rc::downgrade(&imp));
        Some(ModelObject { imp })
    }

    /// Adds a record and wraps it.
    pub fn create_object(&self, type_tag: TypeTag, fields: Vec<FieldValue>) -> ModelObject {
        let handle = self.add(type_tag, fields);
        let imp = Rc::new(ObjectImpl {
            handle,
            model: self.downgrade(),
        });
        self.shared.views.borrow_mut().insert(handle, Rc::downgrade(&imp));
        ModelObject { imp }
    }

    /// Views of every record of one type in insertion order.
    pub fn objects_of_type(&self, type_tag: &TypeTag) -> Vec<ModelObject> {
        self.by_type(type_tag)
            .into_iter()
            .filter_map(|h| self.object(h))
            .collect()
    }

    /// Typed facades of every record of `T`'s type in insertion order.
    pub fn concrete_objects<T: TypedObject>(&self) -> Vec<T> {
        self.objects_of_type(&T::TYPE_TAG)
            .into_iter()
            .map(T::from_object)
            .collect()
    }

    /// Typed facade of one record, if it has `T`'s type.
    pub fn typed_object<T: TypedObject>(&self, handle: Handle) -> Option<T> {
        self.object(handle)?.cast()
    }

    /// Number of records with at least one live view.
    pub fn live_view_count(&self) -> usize {
        self.shared
            .views
            .borrow()
            .values()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    pub(crate) fn forget_views(&self, handles: &[Handle]) {
        let mut views = self.shared.views.borrow_mut();
        for handle in handles {
            views.remove(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schema;

    const FAN: TypeTag = TypeTag::from_static("OS:Fan:ConstantVolume");
    const CURVE: TypeTag = TypeTag::from_static("OS:Curve:Quadratic");

    struct Fan(ModelObject);

    impl TypedObject for Fan {
        const TYPE_TAG: TypeTag = FAN;
        fn from_object(object: ModelObject) -> Self {
            Fan(object)
        }
        fn object(&self) -> &ModelObject {
            &self.0
        }
    }

    fn model() -> Model {
        Model::new(Schema::builder().shared(FAN, 1).build())
    }

    #[test]
    fn views_share_one_impl() {
        let model = model();
        let a = model.create_object(FAN, vec![FieldValue::Double(0.5)]);
        let b = model.object(a.handle()).unwrap();
        assert!(a.ptr_eq(&b));
        assert_eq!(a, b);
        assert_eq!(model.live_view_count(), 1);

        a.set_field(0, FieldValue::Double(0.8)).unwrap();
        assert_eq!(b.field(0).unwrap(), FieldValue::Double(0.8));
    }

    #[test]
    fn impl_is_dropped_with_last_view() {
        let model = model();
        let handle = {
            let view = model.create_object(FAN, vec![]);
            view.handle()
        };
        assert_eq!(model.live_view_count(), 0);
        assert!(model.shared.views.borrow().is_empty());
        assert!(model.object(handle).is_some());
    }

    #[test]
    fn absent_handle_has_no_view() {
        let model = model();
        assert!(model.object(Handle::new()).is_none());
    }

    #[test]
    fn views_detach_together() {
        let model = model();
        let a = model.create_object(FAN, vec![]);
        let b = a.clone();
        assert!(!a.is_detached());
        assert!(a.remove().unwrap().is_removed());
        assert!(a.is_detached());
        assert!(b.is_detached());
        assert!(matches!(b.field(0), Err(Error::Detached(h)) if h == a.handle()));
        assert!(matches!(a.name(), Err(Error::Detached(_))));
        assert_eq!(a.remove().unwrap(), RemoveOutcome::AlreadyAbsent);
    }

    #[test]
    fn dropped_model_detaches_views() {
        let view = {
            let model = model();
            model.create_object(FAN, vec![])
        };
        assert!(view.is_detached());
        assert!(matches!(view.model(), Err(Error::Detached(_))));
    }

    #[test]
    fn foreign_object_is_a_contract_violation() {
        let one = model();
        let two = model();
        let fan = one.create_object(FAN, vec![]);
        let curve = two.create_object(CURVE, vec![]);
        assert!(matches!(fan.set_reference(1, &curve), Err(Error::ForeignObject(_))));
    }

    #[test]
    fn reference_round_trip() {
        let model = model();
        let fan = model.create_object(FAN, vec![]);
        let curve = model.create_object(CURVE, vec![]);
        assert!(fan.set_reference(1, &curve).unwrap());
        assert!(fan.reference(1).unwrap().unwrap().ptr_eq(&curve));
        assert_eq!(curve.sources(&FAN).unwrap(), vec![fan.clone()]);
        fan.clear_reference(1).unwrap();
        assert!(fan.reference(1).unwrap().is_none());
    }

    #[test]
    fn typed_facades() {
        let model = model();
        let fan = model.create_object(FAN, vec![]);
        let curve = model.create_object(CURVE, vec![]);
        assert!(fan.cast::<Fan>().is_some());
        assert!(curve.cast::<Fan>().is_none());
        let fans = model.concrete_objects::<Fan>();
        assert_eq!(fans.len(), 1);
        assert_eq!(fans[0].handle(), fan.handle());
        assert!(model.typed_object::<Fan>(curve.handle()).is_none());
    }

    #[test]
    fn clone_into_wraps_the_copy() {
        let source = model();
        let target = model();
        let fan = source.create_object(FAN, vec![FieldValue::Double(0.4)]);
        fan.set_name("Fan").unwrap();
        let copy = fan.clone_into(&target).unwrap();
        assert_ne!(copy.handle(), fan.handle());
        assert_eq!(copy.field(0).unwrap(), FieldValue::Double(0.4));
        assert_eq!(copy.name().unwrap().as_deref(), Some("Fan"));
        assert!(copy.model().unwrap().same_model(&target));
    }
}
