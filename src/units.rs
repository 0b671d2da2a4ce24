//! Units and conversions
//!
//! The remote API reports money in pence and gas either in kWh or cubic
//! metres. Everything exposed to the host is in kWh and GBP.

use serde::Serialize;

/// Gas volume correction factor (temperature and pressure)
pub const GAS_VOLUME_CORRECTION: f64 = 1.022_64;

/// Typical UK calorific value of mains gas, MJ per cubic metre
pub const GAS_CALORIFIC_VALUE: f64 = 39.9;

const MJ_PER_KWH: f64 = 3.6;

/// Unit of a remote resource's raw values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    KilowattHours,
    CubicMetres,
    Pence,
    PencePerKilowattHour,
    PencePerDay,
}

impl Unit {
    /// Parse the `baseUnit` field of a resource
    pub fn from_base_unit(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "kwh" => Some(Self::KilowattHours),
            "m3" | "m³" => Some(Self::CubicMetres),
            "pence" | "p" => Some(Self::Pence),
            _ => None,
        }
    }

    pub const fn symbol(self) -> &'static str {
        match self {
            Self::KilowattHours => "kWh",
            Self::CubicMetres => "m³",
            Self::Pence => "p",
            Self::PencePerKilowattHour => "p/kWh",
            Self::PencePerDay => "p/day",
        }
    }
}

impl std::fmt::Display for Unit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Energy content of `cubic_metres` of gas in kWh
pub fn gas_cubic_metres_to_kwh(cubic_metres: f64) -> f64 {
    cubic_metres * GAS_VOLUME_CORRECTION * GAS_CALORIFIC_VALUE / MJ_PER_KWH
}

/// Energy in kWh, converting from cubic metres when needed
pub fn to_kwh(value: f64, unit: Unit) -> Option<f64> {
    match unit {
        Unit::KilowattHours => Some(value),
        Unit::CubicMetres => Some(gas_cubic_metres_to_kwh(value)),
        _ => None,
    }
}

/// A monetary amount in pence as GBP, rounded half-to-even to the penny
pub fn pence_to_pounds(pence: f64) -> f64 {
    pence.round_ties_even() / 100.0
}

/// A tariff component in pence as GBP with four decimal places.
///
/// Unit rates are quoted to fractions of a penny, so rounding to the penny
/// would lose information.
pub fn tariff_pence_to_pounds(pence: f64) -> f64 {
    (pence * 100.0).round_ties_even() / 10_000.0
}
