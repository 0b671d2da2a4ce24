//! Resource catalog
//!
//! Classifies the account's remote resources into fuel and quantity, groups
//! them into meters and synthesizes the tariff resources that the remote API
//! only exposes through a consumption resource.

use crate::account::Account;
use crate::api::ResourceDescriptor;
use crate::error::{GlowError, Result};
use crate::logging::get_logger;
use crate::units::Unit;
use serde::Serialize;
use std::collections::HashSet;

/// Supply type of a meter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FuelType {
    Electricity,
    Gas,
}

impl FuelType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Electricity => "electricity",
            Self::Gas => "gas",
        }
    }
}

impl std::fmt::Display for FuelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a resource measures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantityKind {
    Consumption,
    Cost,
    StandingCharge,
    Rate,
}

impl QuantityKind {
    /// Whether values come from the tariff endpoint rather than readings
    pub const fn is_tariff(self) -> bool {
        matches!(self, Self::StandingCharge | Self::Rate)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Classification {
    pub fuel: FuelType,
    pub quantity: QuantityKind,
}

impl Classification {
    pub const fn new(fuel: FuelType, quantity: QuantityKind) -> Self {
        Self { fuel, quantity }
    }

    /// Map a remote classifier onto a classification
    pub fn from_classifier(classifier: &str) -> Option<Self> {
        use FuelType::{Electricity, Gas};
        use QuantityKind::{Consumption, Cost};
        match classifier {
            "electricity.consumption" => Some(Self::new(Electricity, Consumption)),
            "gas.consumption" => Some(Self::new(Gas, Consumption)),
            "electricity.consumption.cost" => Some(Self::new(Electricity, Cost)),
            "gas.consumption.cost" => Some(Self::new(Gas, Cost)),
            _ => None,
        }
    }
}

/// One classified, remotely metered quantity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resource {
    /// Unique id within the account
    pub id: String,
    /// Id used to address the remote API
    pub remote_id: String,
    /// Meter the resource belongs to
    pub meter_id: String,
    pub classification: Classification,
    /// Unit of the raw remote values
    pub unit: Unit,
    pub name: String,
}

impl Resource {
    pub const fn fuel(&self) -> FuelType {
        self.classification.fuel
    }

    pub const fn quantity(&self) -> QuantityKind {
        self.classification.quantity
    }
}

/// The resources of one fuel on one virtual entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Meter {
    pub id: String,
    pub virtual_entity_id: String,
    pub virtual_entity_name: Option<String>,
    pub fuel: FuelType,
}

impl Meter {
    /// Host device name, e.g. "Home smart electricity meter"
    pub fn device_name(&self) -> String {
        match &self.virtual_entity_name {
            Some(name) => format!("{name} smart {} meter", self.fuel),
            None => format!("Smart {} meter", self.fuel),
        }
    }
}

/// Classified resources and meters of one account
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    resources: Vec<Resource>,
    meters: Vec<Meter>,
}

impl Catalog {
    /// Query the account and classify its resources.
    ///
    /// Fails with [`GlowError::Discovery`] when the account has no usable
    /// resources or the listing fails for any reason other than rejected
    /// credentials.
    pub async fn discover(account: &Account) -> Result<Self> {
        let descriptors = account.list_resources().await.map_err(|e| {
            if e.is_auth() {
                e
            } else {
                GlowError::discovery(format!("Failed to list resources: {e}"))
            }
        })?;
        Self::from_descriptors(descriptors)
    }

    pub fn from_descriptors(descriptors: Vec<ResourceDescriptor>) -> Result<Self> {
        let logger = get_logger("catalog");
        let mut catalog = Self::default();
        let mut seen = HashSet::new();

        for descriptor in descriptors {
            let Some(classification) = Classification::from_classifier(&descriptor.classifier)
            else {
                logger.debug(&format!(
                    "Ignoring resource {} with classifier '{}'",
                    descriptor.resource_id, descriptor.classifier
                ));
                continue;
            };
            if !seen.insert(descriptor.resource_id.clone()) {
                continue;
            }

            let meter_id = catalog.meter_for(&descriptor, classification.fuel);
            let unit = Unit::from_base_unit(&descriptor.base_unit).unwrap_or(
                match classification.quantity {
                    QuantityKind::Cost => Unit::Pence,
                    _ => Unit::KilowattHours,
                },
            );

            if classification.quantity == QuantityKind::Consumption {
                catalog.push_tariff_resources(&descriptor, &meter_id, classification.fuel);
            }

            catalog.resources.push(Resource {
                id: descriptor.resource_id.clone(),
                remote_id: descriptor.resource_id,
                meter_id,
                classification,
                unit,
                name: descriptor.name,
            });
        }

        if catalog.resources.is_empty() {
            return Err(GlowError::discovery(
                "No electricity or gas resources found for this account",
            ));
        }

        // Consumption first within each meter
        catalog.resources.sort_by(|a, b| {
            a.meter_id
                .cmp(&b.meter_id)
                .then((a.quantity() as u8).cmp(&(b.quantity() as u8)))
        });

        logger.info(&format!(
            "Discovered {} resources on {} meters",
            catalog.resources.len(),
            catalog.meters.len()
        ));
        Ok(catalog)
    }

    fn meter_for(&mut self, descriptor: &ResourceDescriptor, fuel: FuelType) -> String {
        let id = format!("{}:{}", descriptor.virtual_entity_id, fuel);
        if !self.meters.iter().any(|m| m.id == id) {
            self.meters.push(Meter {
                id: id.clone(),
                virtual_entity_id: descriptor.virtual_entity_id.clone(),
                virtual_entity_name: descriptor.virtual_entity_name.clone(),
                fuel,
            });
        }
        id
    }

    fn push_tariff_resources(
        &mut self,
        consumption: &ResourceDescriptor,
        meter_id: &str,
        fuel: FuelType,
    ) {
        let remote_id = &consumption.resource_id;
        self.resources.push(Resource {
            id: format!("{remote_id}-rate"),
            remote_id: remote_id.clone(),
            meter_id: meter_id.to_string(),
            classification: Classification::new(fuel, QuantityKind::Rate),
            unit: Unit::PencePerKilowattHour,
            name: format!("{fuel} rate"),
        });
        self.resources.push(Resource {
            id: format!("{remote_id}-tariff"),
            remote_id: remote_id.clone(),
            meter_id: meter_id.to_string(),
            classification: Classification::new(fuel, QuantityKind::StandingCharge),
            unit: Unit::PencePerDay,
            name: format!("{fuel} standing charge"),
        });
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn meters(&self) -> &[Meter] {
        &self.meters
    }

    pub fn resource(&self, id: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.id == id)
    }

    pub fn meter(&self, id: &str) -> Option<&Meter> {
        self.meters.iter().find(|m| m.id == id)
    }

    /// The resource of `quantity` on `meter_id`, if the account has one
    pub fn find(&self, meter_id: &str, quantity: QuantityKind) -> Option<&Resource> {
        self.resources
            .iter()
            .find(|r| r.meter_id == meter_id && r.quantity() == quantity)
    }
}
