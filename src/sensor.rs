//! Sensor adapter
//!
//! Maps derived values onto host entities. A sensor never lets an error
//! escape its refresh: failures become [`SensorState::Unavailable`] and a
//! warning in the log.

use crate::calculator::{Calculator, DerivedQuantity};
use crate::catalog::{Catalog, FuelType, Meter, QuantityKind};
use crate::logging::get_logger;
use chrono::{DateTime, Utc};
use serde::Serialize;

const MANUFACTURER: &str = "Hildebrand";
const MODEL: &str = "Glow (DCC)";

/// Host device a sensor is attached to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub identifier: String,
    pub name: String,
    pub manufacturer: &'static str,
    pub model: &'static str,
}

impl DeviceInfo {
    fn for_meter(meter: &Meter, identifier: &str) -> Self {
        Self {
            identifier: identifier.to_string(),
            name: meter.device_name(),
            manufacturer: MANUFACTURER,
            model: MODEL,
        }
    }
}

/// Static description of a sensor as registered with the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SensorDescriptor {
    pub unique_id: String,
    pub meter_id: String,
    pub fuel: FuelType,
    pub name: &'static str,
    pub unit: &'static str,
    pub device_class: Option<&'static str>,
    pub state_class: Option<&'static str>,
    pub icon: Option<&'static str>,
    pub enabled_by_default: bool,
    /// Set on cost sensors only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_source: Option<CostSource>,
    pub device: DeviceInfo,
}

/// Where a cost sensor's value comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CostSource {
    /// The account's own cost resource
    Reported,
    /// Consumption multiplied by the unit rate
    Derived,
}

/// Host-visible state of a sensor
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SensorState {
    Available { value: f64, unit: &'static str },
    Unavailable { reason: String },
}

impl SensorState {
    pub const fn value(&self) -> Option<f64> {
        match self {
            Self::Available { value, .. } => Some(*value),
            Self::Unavailable { .. } => None,
        }
    }

    pub const fn is_available(&self) -> bool {
        matches!(self, Self::Available { .. })
    }
}

/// The closed set of sensors exposed per meter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sensor {
    RawConsumption(SensorDescriptor),
    Cost(SensorDescriptor),
    StandingCharge(SensorDescriptor),
    Rate(SensorDescriptor),
}

impl Sensor {
    pub const fn descriptor(&self) -> &SensorDescriptor {
        match self {
            Self::RawConsumption(d)
            | Self::StandingCharge(d)
            | Self::Rate(d)
            | Self::Cost(d) => d,
        }
    }

    pub fn unique_id(&self) -> &str {
        &self.descriptor().unique_id
    }

    pub const fn quantity(&self) -> DerivedQuantity {
        match self {
            Self::RawConsumption(_) => DerivedQuantity::DailyUsage,
            Self::Cost(_) => DerivedQuantity::DailyCost,
            Self::StandingCharge(_) => DerivedQuantity::StandingCharge,
            Self::Rate(_) => DerivedQuantity::UnitRate,
        }
    }

    /// Recompute the sensor's state
    pub async fn refresh(&self, calculator: &Calculator, as_of: DateTime<Utc>) -> SensorState {
        let descriptor = self.descriptor();
        match calculator
            .compute(&descriptor.meter_id, self.quantity(), as_of)
            .await
        {
            Ok(value) => SensorState::Available {
                value,
                unit: descriptor.unit,
            },
            Err(e) => {
                get_logger("sensor")
                    .for_resource(&descriptor.unique_id)
                    .warn(&format!("Sensor unavailable: {e}"));
                SensorState::Unavailable {
                    reason: e.to_string(),
                }
            }
        }
    }
}

/// Sensors for every meter in the catalog
pub fn build_sensors(catalog: &Catalog) -> Vec<Sensor> {
    let mut sensors = Vec::new();

    for meter in catalog.meters() {
        let Some(consumption) = catalog.find(&meter.id, QuantityKind::Consumption) else {
            // A meter with only a cost resource: nothing to anchor the device on
            if let Some(cost) = catalog.find(&meter.id, QuantityKind::Cost) {
                let device = DeviceInfo::for_meter(meter, &cost.id);
                sensors.push(cost_sensor(meter, &cost.id, device, CostSource::Reported));
            }
            continue;
        };
        let device = DeviceInfo::for_meter(meter, &consumption.id);
        let descriptor = |unique_id: &str, template: Template| SensorDescriptor {
            unique_id: unique_id.to_string(),
            meter_id: meter.id.clone(),
            fuel: meter.fuel,
            name: template.name,
            unit: template.unit,
            device_class: template.device_class,
            state_class: template.state_class,
            icon: template.icon,
            enabled_by_default: template.enabled_by_default,
            cost_source: None,
            device: device.clone(),
        };

        let mut usage = USAGE;
        if meter.fuel == FuelType::Gas {
            usage.icon = Some("mdi:fire");
        }
        sensors.push(Sensor::RawConsumption(descriptor(&consumption.id, usage)));

        if let Some(cost) = catalog.find(&meter.id, QuantityKind::Cost) {
            sensors.push(cost_sensor(meter, &cost.id, device.clone(), CostSource::Reported));
        } else if catalog.find(&meter.id, QuantityKind::Rate).is_some() {
            let unique_id = format!("{}-cost", consumption.id);
            sensors.push(cost_sensor(meter, &unique_id, device.clone(), CostSource::Derived));
        }

        if let Some(standing) = catalog.find(&meter.id, QuantityKind::StandingCharge) {
            sensors.push(Sensor::StandingCharge(descriptor(&standing.id, STANDING_CHARGE)));
        }
        if let Some(rate) = catalog.find(&meter.id, QuantityKind::Rate) {
            sensors.push(Sensor::Rate(descriptor(&rate.id, RATE)));
        }
    }

    sensors
}

fn cost_sensor(meter: &Meter, unique_id: &str, device: DeviceInfo, source: CostSource) -> Sensor {
    Sensor::Cost(SensorDescriptor {
        unique_id: unique_id.to_string(),
        meter_id: meter.id.clone(),
        fuel: meter.fuel,
        name: COST.name,
        unit: COST.unit,
        device_class: COST.device_class,
        state_class: COST.state_class,
        icon: COST.icon,
        enabled_by_default: COST.enabled_by_default,
        cost_source: Some(source),
        device,
    })
}

#[derive(Clone, Copy)]
struct Template {
    name: &'static str,
    unit: &'static str,
    device_class: Option<&'static str>,
    state_class: Option<&'static str>,
    icon: Option<&'static str>,
    enabled_by_default: bool,
}

const USAGE: Template = Template {
    name: "Usage (today)",
    unit: "kWh",
    device_class: Some("energy"),
    state_class: Some("total_increasing"),
    icon: None,
    enabled_by_default: true,
};

const COST: Template = Template {
    name: "Cost (today)",
    unit: "GBP",
    device_class: Some("monetary"),
    state_class: Some("total_increasing"),
    icon: None,
    enabled_by_default: true,
};

// Tariff sensors fail for accounts whose supplier publishes no tariff
const STANDING_CHARGE: Template = Template {
    name: "Standing charge",
    unit: "GBP",
    device_class: Some("monetary"),
    state_class: None,
    icon: None,
    enabled_by_default: false,
};

const RATE: Template = Template {
    name: "Rate",
    unit: "GBP/kWh",
    device_class: None,
    state_class: None,
    icon: Some("mdi:cash-multiple"),
    enabled_by_default: false,
};
