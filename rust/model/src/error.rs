// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for model operations.
//!
//! Only contract violations are errors. Absent records, rejected references
//! and blocked removals are ordinary outcomes and are reported through
//! `Option`, `bool` and [`RemoveOutcome`](crate::RemoveOutcome).

use crate::keys::{Handle, TypeTag};

/// Result type alias for model operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during model operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The view's record was removed, or its model was dropped.
    #[error("object {0} is detached from its model")]
    Detached(Handle),

    /// A view was handed to an operation of a different model.
    #[error("object {0} belongs to a different model")]
    ForeignObject(Handle),

    /// The schema does not declare the field as a pointer.
    #[error("field {field} of {type_tag} is not a pointer field")]
    NotAPointerField { type_tag: TypeTag, field: usize },

    /// The schema does not declare the field as a port.
    #[error("field {field} of {type_tag} is not a port")]
    NotAPort { type_tag: TypeTag, field: usize },

    /// Pointer values must go through `set_reference`.
    #[error("field {field} takes a pointer; use set_reference")]
    PointerWrite { field: usize },

    /// The ownership declarations form a cycle through this record.
    #[error("ownership cycle through {0}")]
    OwnershipCycle(Handle),

    /// A snapshot contains the same handle twice.
    #[error("duplicate handle in snapshot: {0}")]
    DuplicateHandle(Handle),

    /// A snapshot record points at a handle that is not in the snapshot.
    #[error("record {from} references missing record {to}")]
    DanglingReference { from: Handle, to: Handle },

    /// A string could not be parsed as a handle.
    #[error("invalid handle: {0:?}")]
    InvalidHandle(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}
