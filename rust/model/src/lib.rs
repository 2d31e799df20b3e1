// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # BEM-Lite Model
//!
//! Object graph and HVAC component topology for building energy models.
//!
//! Every object of a model is a [`Record`] owned by one [`Store`] and
//! addressed by a never-reused [`Handle`]. Records point at each other only
//! through handles, so there is exactly one owner and no reference cycles.
//! On top of the store the crate provides:
//!
//! - a [`Schema`] that declares, per type and field, pointers, ports,
//!   ownership and removability;
//! - checked pointer writes and reverse lookup ([`Model::set_reference`],
//!   [`Model::sources_of`]), including schedule compatibility;
//! - shared-identity views ([`ModelObject`], [`TypedObject`]);
//! - component topology: ports, nodes, containing assemblies and flow paths;
//! - clone and remove cascades driven by the ownership table.
//!
//! ## Threading
//!
//! A [`Model`] is single-threaded (`Rc` + `RefCell`). A [`Schema`] is
//! immutable and can be shared between models through an `Arc`.

pub mod config;
pub mod error;
pub mod field;
pub mod keys;
pub mod lifecycle;
pub mod model;
pub mod reference;
pub mod registry;
pub mod schedule;
pub mod schema;
pub mod serialization;
pub mod store;
pub mod topology;
pub mod view;

pub use config::{ModelConfig, ReverseLookup};
pub use error::{Error, Result};
pub use field::{FieldSlot, FieldValue};
pub use keys::{Handle, RecordKey, TypeTag};
pub use lifecycle::RemoveOutcome;
pub use model::Model;
pub use reference::{FirstMatch, ReferenceEdge, ResolvedReference};
pub use registry::{Category, CompatibilityRegistry, Requirement};
pub use schedule::{ScheduleEntry, ScheduleLimits, ScheduleType, ScheduleTypeRegistry};
pub use schema::{
    CategorySource, Ownership, PointerDecl, PortRole, ReferenceKind, Schema, SchemaBuilder, StreamKind,
    NODE, SCHEDULE_CONSTANT, SCHEDULE_TYPE_LIMITS,
};
pub use serialization::{RecordSnapshot, StoreSnapshot};
pub use store::{Record, Store};
pub use topology::{PortConnection, StreamNeighbors};
pub use view::{ModelObject, ObjectImpl, TypedObject};
