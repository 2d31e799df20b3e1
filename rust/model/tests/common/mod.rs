// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shared fixtures: a small HVAC schema and typed facades over it.

#![allow(dead_code)]

use bem_lite_model::{
    FieldValue, Handle, Model, ModelConfig, ModelObject, PortRole, Result, ReverseLookup, Schema, ScheduleType,
    StreamKind, TypeTag, TypedObject, NODE, SCHEDULE_CONSTANT, SCHEDULE_TYPE_LIMITS,
};

pub const FAN: TypeTag = TypeTag::from_static("OS:Fan:ConstantVolume");
pub const FAN_COMPONENT_MODEL: TypeTag = TypeTag::from_static("OS:Fan:ComponentModel");
pub const COIL: TypeTag = TypeTag::from_static("OS:Coil:Cooling:Water");
pub const CONTROLLER: TypeTag = TypeTag::from_static("OS:Controller:WaterCoil");
pub const CURVE: TypeTag = TypeTag::from_static("OS:Curve:Quadratic");
pub const UNITARY: TypeTag = TypeTag::from_static("OS:AirLoopHVAC:UnitarySystem");
pub const PTAC: TypeTag = TypeTag::from_static("OS:ZoneHVAC:PackagedTerminalAirConditioner");
pub const SCHEDULE_COMPACT: TypeTag = TypeTag::from_static("OS:Schedule:Compact");

// OS:Fan:ConstantVolume
pub const FAN_AVAILABILITY: usize = 0;
pub const FAN_EFFICIENCY: usize = 1;
pub const FAN_INLET: usize = 2;
pub const FAN_OUTLET: usize = 3;

// OS:Fan:ComponentModel
pub const FCM_INLET: usize = 1;
pub const FCM_OUTLET: usize = 2;
pub const FCM_EFFICIENCY_CURVE: usize = 3;
pub const FCM_PRESSURE_CURVE: usize = 4;

// OS:Coil:Cooling:Water
pub const COIL_AVAILABILITY: usize = 0;
pub const COIL_AIR_INLET: usize = 1;
pub const COIL_AIR_OUTLET: usize = 2;
pub const COIL_WATER_INLET: usize = 3;
pub const COIL_WATER_OUTLET: usize = 4;

// OS:Controller:WaterCoil
pub const CONTROLLER_COIL: usize = 0;

// OS:AirLoopHVAC:UnitarySystem and OS:ZoneHVAC:PackagedTerminalAirConditioner
pub const ASSEMBLY_FAN: usize = 1;
pub const ASSEMBLY_COIL: usize = 2;

/// The fixture schema. With `guard_connected_nodes`, nodes that a port
/// still references cannot be removed.
pub fn schema(guard_connected_nodes: bool) -> Schema {
    let builder = Schema::builder()
        .schedule(FAN, FAN_AVAILABILITY, "Availability", ScheduleType::availability())
        .port(FAN, FAN_INLET, StreamKind::Air, PortRole::Inlet)
        .port(FAN, FAN_OUTLET, StreamKind::Air, PortRole::Outlet)
        .schedule(FAN_COMPONENT_MODEL, 0, "Availability", ScheduleType::availability())
        .port(FAN_COMPONENT_MODEL, FCM_INLET, StreamKind::Air, PortRole::Inlet)
        .port(FAN_COMPONENT_MODEL, FCM_OUTLET, StreamKind::Air, PortRole::Outlet)
        .owned(FAN_COMPONENT_MODEL, FCM_EFFICIENCY_CURVE)
        .owned(FAN_COMPONENT_MODEL, FCM_PRESSURE_CURVE)
        .schedule(COIL, COIL_AVAILABILITY, "Availability Schedule", ScheduleType::availability())
        .port(COIL, COIL_AIR_INLET, StreamKind::Air, PortRole::Inlet)
        .port(COIL, COIL_AIR_OUTLET, StreamKind::Air, PortRole::Outlet)
        .port(COIL, COIL_WATER_INLET, StreamKind::Water, PortRole::Inlet)
        .port(COIL, COIL_WATER_OUTLET, StreamKind::Water, PortRole::Outlet)
        .dependent(CONTROLLER, CONTROLLER_COIL)
        .remove_on_disconnect(COIL, COIL_WATER_INLET, CONTROLLER)
        .remove_on_disconnect(COIL, COIL_WATER_OUTLET, CONTROLLER)
        .schedule(UNITARY, 0, "Availability", ScheduleType::availability())
        .sub_component(UNITARY, ASSEMBLY_FAN)
        .sub_component(UNITARY, ASSEMBLY_COIL)
        .schedule(PTAC, 0, "Availability Schedule", ScheduleType::availability())
        .sub_component(PTAC, ASSEMBLY_FAN)
        .sub_component(PTAC, ASSEMBLY_COIL)
        .schedule_source(SCHEDULE_COMPACT, 0);

    if guard_connected_nodes {
        builder
            .removable_if(NODE, |store, node| store.referrer_slots(node.handle()).is_empty())
            .build()
    } else {
        builder.build()
    }
}

pub fn model() -> Model {
    init_tracing();
    Model::new(schema(false))
}

/// One model per reverse lookup strategy.
pub fn models(guard_connected_nodes: bool) -> Vec<Model> {
    init_tracing();
    let schema = std::sync::Arc::new(schema(guard_connected_nodes));
    [ReverseLookup::Scan, ReverseLookup::Indexed]
        .into_iter()
        .map(|lookup| {
            Model::with_config(
                std::sync::Arc::clone(&schema),
                ModelConfig::default().with_reverse_lookup(lookup),
            )
        })
        .collect()
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A constant schedule with freshly created type limits.
pub fn constant_schedule(model: &Model, unit_type: &str, lower: Option<f64>, upper: Option<f64>) -> Handle {
    let limits = model.add_named(
        SCHEDULE_TYPE_LIMITS,
        unit_type,
        vec![lower.into(), upper.into(), "Discrete".into(), unit_type.into()],
    );
    model.add(SCHEDULE_CONSTANT, vec![FieldValue::Pointer(limits), FieldValue::Double(1.0)])
}

pub fn availability_schedule(model: &Model) -> Handle {
    constant_schedule(model, "Availability", Some(0.0), Some(1.0))
}

pub fn temperature_schedule(model: &Model) -> Handle {
    constant_schedule(model, "Temperature", None, None)
}

/// Facade over `OS:Fan:ConstantVolume`.
pub struct Fan(ModelObject);

impl TypedObject for Fan {
    const TYPE_TAG: TypeTag = FAN;

    fn from_object(object: ModelObject) -> Self {
        Fan(object)
    }

    fn object(&self) -> &ModelObject {
        &self.0
    }
}

impl Fan {
    pub fn new(model: &Model) -> Self {
        Fan(model.create_object(FAN, vec![FieldValue::None, FieldValue::Double(0.7)]))
    }

    pub fn efficiency(&self) -> Result<Option<f64>> {
        Ok(self.0.field(FAN_EFFICIENCY)?.as_f64())
    }

    pub fn availability_schedule(&self) -> Result<Option<ModelObject>> {
        self.0.reference(FAN_AVAILABILITY)
    }

    pub fn set_availability_schedule(&self, schedule: &ModelObject) -> Result<bool> {
        self.0.set_reference(FAN_AVAILABILITY, schedule)
    }
}

/// Facade over `OS:Coil:Cooling:Water`.
pub struct CoolingCoil(ModelObject);

impl TypedObject for CoolingCoil {
    const TYPE_TAG: TypeTag = COIL;

    fn from_object(object: ModelObject) -> Self {
        CoolingCoil(object)
    }

    fn object(&self) -> &ModelObject {
        &self.0
    }
}

impl CoolingCoil {
    /// The unitary system or PTAC holding this coil, unitary systems first.
    pub fn containing_hvac_component(&self) -> Result<Option<ModelObject>> {
        let model = self.0.model()?;
        Ok(model
            .find_containing_assembly(self.0.handle(), &[UNITARY, PTAC])
            .and_then(|h| model.object(h)))
    }

    /// Disconnects the water side; the coil's controller goes with it.
    pub fn remove_from_plant_loop(&self) -> Result<()> {
        let model = self.0.model()?;
        model.disconnect(self.0.handle(), COIL_WATER_INLET)?;
        model.disconnect(self.0.handle(), COIL_WATER_OUTLET)?;
        Ok(())
    }

    /// The controller attached to this coil, if any.
    pub fn controller(&self) -> Result<Option<ModelObject>> {
        let model = self.0.model()?;
        Ok(model
            .single_source_of(self.0.handle(), &CONTROLLER)
            .and_then(|m| model.object(m.handle)))
    }
}
