// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Typed field values and field addressing.

use serde::{Deserialize, Serialize};

use crate::keys::Handle;

/// A single field of a record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum FieldValue {
    #[default]
    None,
    String(String),
    Integer(i64),
    UnsignedInteger(u64),
    Double(f64),
    Pointer(Handle),
    /// Extensible groups, e.g. the branch list of a splitter.
    SubRecords(Vec<Vec<FieldValue>>),
}

impl FieldValue {
    pub fn is_none(&self) -> bool {
        matches!(self, FieldValue::None)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric value; integers are widened.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Double(v) => Some(*v),
            FieldValue::Integer(v) => Some(*v as f64),
            FieldValue::UnsignedInteger(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(v) => Some(*v),
            FieldValue::UnsignedInteger(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_pointer(&self) -> Option<Handle> {
        match self {
            FieldValue::Pointer(h) => Some(*h),
            _ => None,
        }
    }

    pub fn as_sub_records(&self) -> Option<&[Vec<FieldValue>]> {
        match self {
            FieldValue::SubRecords(groups) => Some(groups),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::String(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::String(s)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Double(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        FieldValue::UnsignedInteger(v)
    }
}

impl From<Handle> for FieldValue {
    fn from(h: Handle) -> Self {
        FieldValue::Pointer(h)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(FieldValue::None, Into::into)
    }
}

/// Address of a field: a top-level index, or a field inside one group of a
/// [`FieldValue::SubRecords`] sequence stored at that index.
///
/// Ordering is by top-level index first, which is also the order in which
/// [`pointer_slots`] reports pointers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldSlot {
    pub index: usize,
    /// `(group, field)` within the sub-record sequence.
    pub group: Option<(usize, usize)>,
}

impl FieldSlot {
    pub const fn field(index: usize) -> Self {
        FieldSlot { index, group: None }
    }

    pub const fn sub(index: usize, group: usize, field: usize) -> Self {
        FieldSlot {
            index,
            group: Some((group, field)),
        }
    }

    pub fn is_top_level(&self) -> bool {
        self.group.is_none()
    }
}

/// Every pointer in a field list, nested ones included, in slot order.
pub(crate) fn pointer_slots(fields: &[FieldValue]) -> Vec<(FieldSlot, Handle)> {
    let mut out = Vec::new();
    for (index, value) in fields.iter().enumerate() {
        match value {
            FieldValue::Pointer(h) => out.push((FieldSlot::field(index), *h)),
            FieldValue::SubRecords(groups) => {
                for (g, group) in groups.iter().enumerate() {
                    for (f, inner) in group.iter().enumerate() {
                        if let FieldValue::Pointer(h) = inner {
                            out.push((FieldSlot::sub(index, g, f), *h));
                        }
                    }
                }
            }
            _ => {}
        }
    }
    out
}

pub(crate) fn value_at(fields: &[FieldValue], slot: FieldSlot) -> Option<&FieldValue> {
    let top = fields.get(slot.index)?;
    match slot.group {
        None => Some(top),
        Some((g, f)) => top.as_sub_records()?.get(g)?.get(f),
    }
}

/// Writes `value` at `slot`, growing the top-level list with `None` as
/// needed. Returns `false` when a sub-record slot does not exist.
pub(crate) fn write_at(fields: &mut Vec<FieldValue>, slot: FieldSlot, value: FieldValue) -> bool {
    match slot.group {
        None => {
            if fields.len() <= slot.index {
                fields.resize(slot.index + 1, FieldValue::None);
            }
            fields[slot.index] = value;
            true
        }
        Some((g, f)) => {
            let Some(FieldValue::SubRecords(groups)) = fields.get_mut(slot.index) else {
                return false;
            };
            match groups.get_mut(g).and_then(|group| group.get_mut(f)) {
                Some(inner) => {
                    *inner = value;
                    true
                }
                None => false,
            }
        }
    }
}
