// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Schedule types, schedule type limits and schedule defaults.
//!
//! A consumer field declares the [`ScheduleType`] it needs; a schedule record
//! carries its category through a pointer to an `OS:ScheduleTypeLimits`
//! record, read here as [`ScheduleLimits`]. Compatibility compares the
//! physical unit and the numeric range, never the continuous/discrete flag.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::field::FieldValue;
use crate::keys::{Handle, TypeTag};
use crate::model::Model;
use crate::reference::ResolvedReference;
use crate::registry::Requirement;
use crate::schema::{SCHEDULE_CONSTANT, SCHEDULE_TYPE_LIMITS};
use crate::store::Record;

/// Name of the shared always-on discrete schedule.
pub const ALWAYS_ON_DISCRETE_NAME: &str = "Always On Discrete";
/// Name of the shared always-on continuous schedule.
pub const ALWAYS_ON_CONTINUOUS_NAME: &str = "Always On Continuous";

// Field layout of OS:ScheduleTypeLimits
const LIMITS_LOWER: usize = 0;
const LIMITS_UPPER: usize = 1;
const LIMITS_NUMERIC_TYPE: usize = 2;
const LIMITS_UNIT_TYPE: usize = 3;

// Field layout of OS:Schedule:Constant
pub(crate) const CONSTANT_LIMITS: usize = 0;
const CONSTANT_VALUE: usize = 1;

/// The kind of schedule a consumer field needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleType {
    /// Unit type name, e.g. `Temperature`; empty means dimensionless.
    pub unit_type: String,
    pub lower: Option<f64>,
    pub upper: Option<f64>,
    pub continuous: bool,
}

impl ScheduleType {
    pub fn new(unit_type: impl Into<String>, continuous: bool) -> Self {
        Self {
            unit_type: unit_type.into(),
            lower: None,
            upper: None,
            continuous,
        }
    }

    pub fn with_limits(mut self, lower: Option<f64>, upper: Option<f64>) -> Self {
        self.lower = lower;
        self.upper = upper;
        self
    }

    /// On/off availability: discrete, `[0, 1]`.
    pub fn availability() -> Self {
        Self::new("Availability", false).with_limits(Some(0.0), Some(1.0))
    }

    /// Dimensionless fraction: continuous, `[0, 1]`.
    pub fn fractional() -> Self {
        Self::new("", true).with_limits(Some(0.0), Some(1.0))
    }

    /// Unbounded temperature.
    pub fn temperature() -> Self {
        Self::new("Temperature", true)
    }

    pub fn control_mode() -> Self {
        Self::new("ControlMode", false).with_limits(Some(0.0), Some(1.0))
    }

    /// Whether schedules with `limits` may serve this type.
    ///
    /// Units must agree physically. A required bound must be present on the
    /// candidate and lie inside it. In stringent mode a bound this type does
    /// not require must be absent from the candidate too.
    pub fn is_compatible(&self, limits: &ScheduleLimits, stringent: bool) -> bool {
        if !same_physical_unit(&self.unit_type, &limits.unit_type) {
            return false;
        }

        match (self.lower, limits.lower) {
            (Some(required), Some(actual)) if actual < required => return false,
            (Some(_), None) => return false,
            (None, Some(_)) if stringent => return false,
            _ => {}
        }
        match (self.upper, limits.upper) {
            (Some(required), Some(actual)) if actual > required => return false,
            (Some(_), None) => return false,
            (None, Some(_)) if stringent => return false,
            _ => {}
        }
        true
    }

    /// Name given to limits created for this type.
    pub fn default_limits_name(&self) -> String {
        let unit_range = self.lower == Some(0.0) && self.upper == Some(1.0);
        match self.unit_type.as_str() {
            "" if self.continuous && unit_range => "Fractional".into(),
            "" if self.continuous => "Dimensionless".into(),
            "" if unit_range => "Binary".into(),
            "" => "Integer".into(),
            "Availability" => "OnOff".into(),
            other => other.to_string(),
        }
    }

    /// Limits describing exactly this type.
    pub fn to_limits(&self) -> ScheduleLimits {
        ScheduleLimits {
            lower: self.lower,
            upper: self.upper,
            numeric_type: Some(if self.continuous { "Continuous" } else { "Discrete" }.into()),
            unit_type: self.unit_type.clone(),
        }
    }
}

/// Contents of an `OS:ScheduleTypeLimits` record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleLimits {
    pub lower: Option<f64>,
    pub upper: Option<f64>,
    pub numeric_type: Option<String>,
    pub unit_type: String,
}

impl ScheduleLimits {
    pub fn from_record(record: &Record) -> Self {
        let number = |i| record.field(i).and_then(FieldValue::as_f64);
        let text = |i| record.field(i).and_then(FieldValue::as_str).map(str::to_string);
        Self {
            lower: number(LIMITS_LOWER),
            upper: number(LIMITS_UPPER),
            numeric_type: text(LIMITS_NUMERIC_TYPE),
            unit_type: text(LIMITS_UNIT_TYPE).unwrap_or_default(),
        }
    }

    pub fn to_fields(&self) -> Vec<FieldValue> {
        let text = |s: &str| {
            if s.is_empty() {
                FieldValue::None
            } else {
                FieldValue::String(s.to_string())
            }
        };
        vec![
            self.lower.into(),
            self.upper.into(),
            self.numeric_type.as_deref().map_or(FieldValue::None, text),
            text(&self.unit_type),
        ]
    }

    pub fn is_discrete(&self) -> bool {
        self.numeric_type
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case("Discrete"))
    }
}

/// SI unit behind a schedule unit type; `Some("")` for dimensionless types.
pub fn physical_unit(unit_type: &str) -> Option<&'static str> {
    let unit = match unit_type.to_ascii_lowercase().as_str() {
        "" | "dimensionless" | "fraction" | "availability" | "controlmode" | "mode" | "onoff" => "",
        "temperature" => "C",
        "deltatemperature" => "deltaC",
        "precipitationrate" => "m/h",
        "percent" => "%",
        "power" | "capacity" => "W",
        "powerdensity" => "W/m^2",
        "linearpowerdensity" => "W/m",
        "activitylevel" => "W/person",
        "volumetricflowrate" => "m^3/s",
        "massflowrate" => "kg/s",
        "velocity" => "m/s",
        "pressure" => "Pa",
        "rotationsperminute" => "1/min",
        "convectioncoefficient" => "W/m^2*K",
        "illuminance" => "lux",
        "humidityratio" => "kgWater/kgDryAir",
        _ => return None,
    };
    Some(unit)
}

fn same_physical_unit(a: &str, b: &str) -> bool {
    match (physical_unit(a), physical_unit(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a.eq_ignore_ascii_case(b),
    }
}

/// One registered schedule slot of a consumer class.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleEntry {
    pub display_name: String,
    pub field: usize,
    pub schedule_type: ScheduleType,
}

/// `(class, display name) -> ScheduleType` table.
#[derive(Debug, Clone, Default)]
pub struct ScheduleTypeRegistry {
    by_class: BTreeMap<TypeTag, Vec<ScheduleEntry>>,
}

impl ScheduleTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a schedule slot; a second entry with the same display name
    /// replaces the first.
    pub fn register(&mut self, class: TypeTag, entry: ScheduleEntry) {
        let entries = self.by_class.entry(class).or_default();
        match entries.iter_mut().find(|e| e.display_name == entry.display_name) {
            Some(existing) => *existing = entry,
            None => entries.push(entry),
        }
    }

    pub fn get(&self, class: &TypeTag, display_name: &str) -> Option<&ScheduleEntry> {
        self.by_class
            .get(class)?
            .iter()
            .find(|e| e.display_name == display_name)
    }

    pub fn schedule_types_of(&self, class: &TypeTag) -> &[ScheduleEntry] {
        self.by_class.get(class).map_or(&[], Vec::as_slice)
    }

    /// Sorted class names with at least one registered schedule.
    pub fn class_names(&self) -> Vec<&TypeTag> {
        self.by_class.keys().collect()
    }
}

// --- Model operations ---

impl Model {
    /// Type limits of a schedule record; `None` for untyped schedules and
    /// non-schedules.
    pub fn schedule_limits(&self, schedule: Handle) -> Option<ScheduleLimits> {
        let store = self.store();
        let record = store.get(schedule)?;
        let limits_field = self.schema().schedule_limits_field(record.type_tag())?;
        let limits = store.get(record.pointer(limits_field)?)?;
        Some(ScheduleLimits::from_record(limits))
    }

    /// Every schedule acceptable for a schedule field, untyped schedules
    /// included, in insertion order.
    ///
    /// Candidates with bounds the field does not ask for are left out.
    pub fn compatible_schedules(&self, consumer: &TypeTag, field: usize) -> Vec<Handle> {
        let Some(Requirement::Schedule(wanted)) = self.schema().compatibility().get(consumer, field) else {
            return Vec::new();
        };
        let store = self.store();
        store
            .records()
            .filter_map(|record| {
                let limits_field = self.schema().schedule_limits_field(record.type_tag())?;
                match record.pointer(limits_field).and_then(|h| store.get(h)) {
                    None => Some(record.handle()),
                    Some(limits) => wanted
                        .is_compatible(&ScheduleLimits::from_record(limits), true)
                        .then_some(record.handle()),
                }
            })
            .collect()
    }

    /// The schedule set at `field`, or `default` when the field is unset.
    ///
    /// Never writes; callers that want the default persisted do so
    /// explicitly.
    pub fn schedule_or_default(&self, source: Handle, field: usize, default: Option<Handle>) -> ResolvedReference {
        if let Some(explicit) = self.resolve(source, field) {
            return ResolvedReference::Explicit(explicit);
        }
        match default.filter(|h| self.contains(*h)) {
            Some(h) => ResolvedReference::Default(h),
            None => ResolvedReference::Unset,
        }
    }

    /// Reuses limits named after `schedule_type` that match it stringently,
    /// or creates them.
    pub fn get_or_create_schedule_type_limits(&self, schedule_type: &ScheduleType) -> Handle {
        let name = schedule_type.default_limits_name();
        let existing = {
            let store = self.store();
            store
                .objects_by_name(&SCHEDULE_TYPE_LIMITS, &name)
                .into_iter()
                .find(|h| {
                    store
                        .get(*h)
                        .is_some_and(|r| schedule_type.is_compatible(&ScheduleLimits::from_record(r), true))
                })
        };
        match existing {
            Some(h) => h,
            None => {
                let handle = self.add_named(SCHEDULE_TYPE_LIMITS, name, schedule_type.to_limits().to_fields());
                tracing::debug!(%handle, unit_type = %schedule_type.unit_type, "created schedule type limits");
                handle
            }
        }
    }

    /// The always-on discrete schedule, if the model has one. Never creates.
    pub fn always_on_discrete_schedule(&self) -> Option<Handle> {
        self.find_constant_schedule(ALWAYS_ON_DISCRETE_NAME, 1.0, true)
    }

    /// Finds the always-on discrete schedule or creates it.
    pub fn ensure_always_on_discrete_schedule(&self) -> Handle {
        match self.always_on_discrete_schedule() {
            Some(h) => h,
            None => self.create_constant_schedule(ALWAYS_ON_DISCRETE_NAME, 1.0, &ScheduleType::availability()),
        }
    }

    /// The always-on continuous schedule, if the model has one. Never
    /// creates.
    pub fn always_on_continuous_schedule(&self) -> Option<Handle> {
        self.find_constant_schedule(ALWAYS_ON_CONTINUOUS_NAME, 1.0, false)
    }

    /// Finds the always-on continuous schedule or creates it.
    pub fn ensure_always_on_continuous_schedule(&self) -> Handle {
        match self.always_on_continuous_schedule() {
            Some(h) => h,
            None => self.create_constant_schedule(ALWAYS_ON_CONTINUOUS_NAME, 1.0, &ScheduleType::fractional()),
        }
    }

    fn find_constant_schedule(&self, name: &str, value: f64, discrete: bool) -> Option<Handle> {
        let store = self.store();
        store
            .objects_by_name(&SCHEDULE_CONSTANT, name)
            .into_iter()
            .find(|h| {
                let Some(record) = store.get(*h) else {
                    return false;
                };
                let value_matches = record
                    .field(CONSTANT_VALUE)
                    .and_then(FieldValue::as_f64)
                    .is_some_and(|v| (v - value).abs() < f64::EPSILON);
                let limits = record
                    .pointer(CONSTANT_LIMITS)
                    .and_then(|l| store.get(l))
                    .map(ScheduleLimits::from_record);
                let numeric_matches = limits.is_some_and(|l| {
                    if discrete {
                        l.is_discrete()
                    } else {
                        l.numeric_type
                            .as_deref()
                            .is_some_and(|t| t.eq_ignore_ascii_case("Continuous"))
                    }
                });
                value_matches && numeric_matches
            })
    }

    fn create_constant_schedule(&self, name: &str, value: f64, schedule_type: &ScheduleType) -> Handle {
        let limits = self.get_or_create_schedule_type_limits(schedule_type);
        let handle = self.add_named(
            SCHEDULE_CONSTANT,
            name,
            vec![FieldValue::Pointer(limits), FieldValue::Double(value)],
        );
        tracing::debug!(%handle, name, "created constant schedule");
        handle
    }
}
