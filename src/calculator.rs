//! Derived value calculator
//!
//! Turns cached raw readings into the values the host shows: energy in kWh,
//! money in GBP. Nothing here is cached; every call recomputes from the
//! coordinator, which serves repeat requests from its own cache.

use crate::catalog::{Catalog, FuelType, Meter, QuantityKind, Resource};
use crate::coordinator::{Coordinator, ReadingPeriod};
use crate::error::{GlowError, Result};
use crate::units::{self, Unit};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Quantities computed per meter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DerivedQuantity {
    /// Energy used on the reporting day, kWh
    DailyUsage,
    /// Cost of the reporting day, GBP
    DailyCost,
    /// Standing charge, GBP per day
    StandingCharge,
    /// Unit rate, GBP per kWh
    UnitRate,
}

impl DerivedQuantity {
    pub const fn label(self) -> &'static str {
        match self {
            Self::DailyUsage => "daily usage",
            Self::DailyCost => "daily cost",
            Self::StandingCharge => "standing charge",
            Self::UnitRate => "unit rate",
        }
    }

    /// Human readable name including the fuel, used in errors and logs
    pub fn describe(self, fuel: FuelType) -> String {
        format!("{fuel} {}", self.label())
    }
}

/// Computes derived quantities from the coordinator's readings
#[derive(Debug, Clone)]
pub struct Calculator {
    catalog: Arc<Catalog>,
    coordinator: Arc<Coordinator>,
}

impl Calculator {
    pub const fn new(catalog: Arc<Catalog>, coordinator: Arc<Coordinator>) -> Self {
        Self {
            catalog,
            coordinator,
        }
    }

    /// Compute `quantity` for the meter `meter_id` at `as_of`.
    ///
    /// Any missing input (no such resource on the meter, or no reading
    /// available for it) fails with [`GlowError::IncompleteData`]; a
    /// missing input is never treated as zero.
    pub async fn compute(
        &self,
        meter_id: &str,
        quantity: DerivedQuantity,
        as_of: DateTime<Utc>,
    ) -> Result<f64> {
        let meter = self
            .catalog
            .meter(meter_id)
            .ok_or_else(|| GlowError::incomplete(quantity.label(), format!("unknown meter {meter_id}")))?;
        let name = quantity.describe(meter.fuel);

        match quantity {
            DerivedQuantity::DailyUsage => self.daily_usage(meter, &name, as_of).await,
            DerivedQuantity::DailyCost => self.daily_cost(meter, &name, as_of).await,
            DerivedQuantity::StandingCharge => {
                let pence = self
                    .raw(meter, QuantityKind::StandingCharge, &name, as_of)
                    .await?;
                Ok(units::tariff_pence_to_pounds(pence))
            }
            DerivedQuantity::UnitRate => {
                let pence = self.raw(meter, QuantityKind::Rate, &name, as_of).await?;
                Ok(units::tariff_pence_to_pounds(pence))
            }
        }
    }

    async fn daily_usage(&self, meter: &Meter, name: &str, as_of: DateTime<Utc>) -> Result<f64> {
        let resource = self.input(meter, QuantityKind::Consumption, name)?;
        let value = self.current(resource, name, as_of).await?;
        kwh(value, resource.unit, name)
    }

    async fn daily_cost(&self, meter: &Meter, name: &str, as_of: DateTime<Utc>) -> Result<f64> {
        // A reported cost reflects the billed tariff structure
        if let Some(cost) = self.catalog.find(&meter.id, QuantityKind::Cost) {
            let pence = self.current(cost, name, as_of).await?;
            return Ok(units::pence_to_pounds(pence));
        }

        let consumption = self.input(meter, QuantityKind::Consumption, name)?;
        let rate = self.input(meter, QuantityKind::Rate, name)?;
        let (usage, rate_pence) = tokio::join!(
            self.current(consumption, name, as_of),
            self.current(rate, name, as_of)
        );
        let usage = kwh(usage?, consumption.unit, name)?;
        Ok(units::pence_to_pounds(usage * rate_pence?))
    }

    async fn raw(
        &self,
        meter: &Meter,
        quantity: QuantityKind,
        name: &str,
        as_of: DateTime<Utc>,
    ) -> Result<f64> {
        let resource = self.input(meter, quantity, name)?;
        self.current(resource, name, as_of).await
    }

    fn input(&self, meter: &Meter, quantity: QuantityKind, name: &str) -> Result<&Resource> {
        self.catalog.find(&meter.id, quantity).ok_or_else(|| {
            GlowError::incomplete(name, format!("{} has no {quantity:?} resource", meter.id))
        })
    }

    async fn current(&self, resource: &Resource, name: &str, as_of: DateTime<Utc>) -> Result<f64> {
        let period = self.coordinator.current_period(resource, as_of);
        self.coordinator
            .get_reading(resource, period, as_of)
            .await
            .map(|reading| reading.value)
            .map_err(|e| match period {
                ReadingPeriod::Day(day) => {
                    GlowError::incomplete(name, format!("no reading of {} for {day}: {e}", resource.id))
                }
                ReadingPeriod::Tariff => {
                    GlowError::incomplete(name, format!("no tariff for {}: {e}", resource.id))
                }
            })
    }
}

fn kwh(value: f64, unit: Unit, name: &str) -> Result<f64> {
    units::to_kwh(value, unit)
        .ok_or_else(|| GlowError::incomplete(name, format!("cannot express {unit} as energy")))
}
