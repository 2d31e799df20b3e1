// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Identity types for records.
//!
//! A [`Handle`] is the only long-lived reference between records: it is a
//! random 128-bit identifier that is never reused, so a handle to a removed
//! record can be detected instead of silently pointing at something else.
//! [`RecordKey`] is the arena slot inside one store and never leaves it.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use slotmap::new_key_type;
use uuid::Uuid;

use crate::error::Error;

new_key_type! {
    /// Arena slot of a record inside one store.
    pub struct RecordKey;
}

/// Process-unique identifier of a record.
///
/// Renders as the canonical braced form
/// `{xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx}` and parses with or without the
/// braces.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(Uuid);

impl Handle {
    /// Creates a fresh random handle.
    pub fn new() -> Self {
        Handle(Uuid::new_v4())
    }

    /// Wraps an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Handle(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for Handle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.0.hyphenated())
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({self})")
    }
}

impl FromStr for Handle {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let inner = trimmed
            .strip_prefix('{')
            .and_then(|rest| rest.strip_suffix('}'))
            .unwrap_or(trimmed);
        Uuid::parse_str(inner)
            .map(Handle)
            .map_err(|_| Error::InvalidHandle(s.to_string()))
    }
}

impl Serialize for Handle {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Handle {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// The IDD object type of a record, e.g. `OS:Fan:ConstantVolume`.
///
/// Built-in and facade types are usually `const` values created with
/// [`TypeTag::from_static`]; types read from a snapshot own their string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeTag(Cow<'static, str>);

impl TypeTag {
    /// Creates a type tag from a static name, usable in `const` items.
    pub const fn from_static(name: &'static str) -> Self {
        TypeTag(Cow::Borrowed(name))
    }

    /// Creates a type tag from an owned name.
    pub fn new(name: impl Into<String>) -> Self {
        TypeTag(Cow::Owned(name.into()))
    }

    /// Returns the type name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for TypeTag {
    fn from(name: &'static str) -> Self {
        TypeTag::from_static(name)
    }
}
