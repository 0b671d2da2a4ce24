use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Account credentials presented to the remote API
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// An authenticated API session
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(token: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    /// Whether the token has passed its advertised expiry
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// A remote resource as listed by the API, before classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDescriptor {
    pub resource_id: String,
    pub classifier: String,
    pub name: String,
    pub base_unit: String,
    pub virtual_entity_id: String,
    pub virtual_entity_name: Option<String>,
}

/// Current tariff of a consumption resource, in pence
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tariff {
    /// Unit rate, pence per kWh
    pub rate: f64,
    /// Standing charge, pence per day
    pub standing_charge: f64,
}

// Wire formats of the Glowmarkt API

#[derive(Debug, Deserialize)]
pub(crate) struct AuthResponse {
    #[serde(default)]
    pub valid: bool,
    pub token: Option<String>,
    /// Expiry as epoch seconds
    pub exp: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct VirtualEntityWire {
    pub ve_id: String,
    pub name: Option<String>,
    #[serde(default)]
    pub resources: Vec<ResourceWire>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ResourceWire {
    pub resource_id: String,
    pub classifier: Option<String>,
    pub name: Option<String>,
    pub base_unit: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReadingsResponse {
    #[serde(default)]
    pub data: Vec<(i64, Option<f64>)>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TariffResponse {
    #[serde(default)]
    pub data: Vec<TariffDataWire>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TariffDataWire {
    pub current_rates: Option<CurrentRatesWire>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CurrentRatesWire {
    pub rate: f64,
    pub standing_charge: f64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    pub error: Option<String>,
    pub message: Option<String>,
}

impl VirtualEntityWire {
    pub(crate) fn into_descriptors(self) -> Vec<ResourceDescriptor> {
        let ve_id = self.ve_id;
        let ve_name = self.name.filter(|n| !n.trim().is_empty());
        self.resources
            .into_iter()
            .map(|r| ResourceDescriptor {
                resource_id: r.resource_id,
                classifier: r.classifier.unwrap_or_default(),
                name: r.name.unwrap_or_default(),
                base_unit: r.base_unit.unwrap_or_default(),
                virtual_entity_id: ve_id.clone(),
                virtual_entity_name: ve_name.clone(),
            })
            .collect()
    }
}
