#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use glowdcc::account::Account;
use glowdcc::api::{Credentials, MeteringClient, ResourceDescriptor, Session, Tariff};
use glowdcc::catalog::Catalog;
use glowdcc::coordinator::{Coordinator, RefreshPolicy};
use glowdcc::error::{GlowError, Result};
use glowdcc::reading::{Reading, TimeRange};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const ELEC: &str = "elec-1";
pub const ELEC_COST: &str = "elec-cost-1";
pub const GAS: &str = "gas-1";

/// Scripted metering client that records every call
#[derive(Default)]
pub struct FakeClient {
    resources: Mutex<Vec<ResourceDescriptor>>,
    values: Mutex<HashMap<String, f64>>,
    failures: Mutex<HashMap<String, VecDeque<GlowError>>>,
    tariffs: Mutex<HashMap<String, Tariff>>,
    delays: Mutex<HashMap<String, Duration>>,
    ranges: Mutex<Vec<(String, TimeRange)>>,
    fetches: Mutex<HashMap<String, usize>>,
    tariff_fetches: Mutex<HashMap<String, usize>>,
    pub auth_calls: AtomicUsize,
    pub catchup_calls: AtomicUsize,
    pub reject_auth: AtomicBool,
}

impl FakeClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Electricity with a reported cost, gas without
    pub fn standard() -> Self {
        let client = Self::new()
            .with_resource(ELEC, "electricity.consumption", "kWh")
            .with_resource(ELEC_COST, "electricity.consumption.cost", "pence")
            .with_resource(GAS, "gas.consumption", "kWh");
        client.set_value(ELEC, 7.5);
        client.set_value(ELEC_COST, 250.5);
        client.set_value(GAS, 20.0);
        client.set_tariff(ELEC, 24.5, 53.35);
        client.set_tariff(GAS, 6.0, 29.11);
        client
    }

    pub fn with_resource(self, id: &str, classifier: &str, base_unit: &str) -> Self {
        self.resources.lock().unwrap().push(ResourceDescriptor {
            resource_id: id.to_string(),
            classifier: classifier.to_string(),
            name: classifier.replace('.', " "),
            base_unit: base_unit.to_string(),
            virtual_entity_id: "ve-1".to_string(),
            virtual_entity_name: Some("Home".to_string()),
        });
        self
    }

    pub fn descriptors(&self) -> Vec<ResourceDescriptor> {
        self.resources.lock().unwrap().clone()
    }

    pub fn set_value(&self, id: &str, value: f64) {
        self.values.lock().unwrap().insert(id.to_string(), value);
    }

    pub fn set_tariff(&self, id: &str, rate: f64, standing_charge: f64) {
        self.tariffs.lock().unwrap().insert(
            id.to_string(),
            Tariff {
                rate,
                standing_charge,
            },
        );
    }

    pub fn clear_tariff(&self, id: &str) {
        self.tariffs.lock().unwrap().remove(id);
    }

    /// The next call for `id` (readings or tariff) fails with `err`
    pub fn fail_next(&self, id: &str, err: GlowError) {
        self.failures
            .lock()
            .unwrap()
            .entry(id.to_string())
            .or_default()
            .push_back(err);
    }

    pub fn set_delay(&self, id: &str, delay: Duration) {
        self.delays.lock().unwrap().insert(id.to_string(), delay);
    }

    pub fn clear_delay(&self, id: &str) {
        self.delays.lock().unwrap().remove(id);
    }

    pub fn fetch_count(&self, id: &str) -> usize {
        self.fetches.lock().unwrap().get(id).copied().unwrap_or(0)
    }

    pub fn tariff_count(&self, id: &str) -> usize {
        self.tariff_fetches.lock().unwrap().get(id).copied().unwrap_or(0)
    }

    pub fn requested_ranges(&self, id: &str) -> Vec<TimeRange> {
        self.ranges
            .lock()
            .unwrap()
            .iter()
            .filter(|(rid, _)| rid == id)
            .map(|(_, range)| *range)
            .collect()
    }

    async fn pause(&self, id: &str) {
        let delay = self.delays.lock().unwrap().get(id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn next_failure(&self, id: &str) -> Option<GlowError> {
        self.failures
            .lock()
            .unwrap()
            .get_mut(id)
            .and_then(VecDeque::pop_front)
    }
}

#[async_trait::async_trait]
impl MeteringClient for FakeClient {
    async fn authenticate(&self, credentials: &Credentials) -> Result<Session> {
        if self.reject_auth.load(Ordering::SeqCst) {
            return Err(GlowError::auth(format!(
                "Invalid credentials for {}",
                credentials.username
            )));
        }
        let n = self.auth_calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Session::new(format!("token-{n}"), None))
    }

    async fn list_resources(&self, _session: &Session) -> Result<Vec<ResourceDescriptor>> {
        Ok(self.descriptors())
    }

    async fn fetch_readings(
        &self,
        _session: &Session,
        resource_id: &str,
        range: &TimeRange,
    ) -> Result<Vec<Reading>> {
        *self
            .fetches
            .lock()
            .unwrap()
            .entry(resource_id.to_string())
            .or_default() += 1;
        self.ranges
            .lock()
            .unwrap()
            .push((resource_id.to_string(), *range));
        self.pause(resource_id).await;

        if let Some(err) = self.next_failure(resource_id) {
            return Err(err);
        }
        let value = self.values.lock().unwrap().get(resource_id).copied();
        Ok(value
            .map(|v| vec![Reading::new(*range, v)])
            .unwrap_or_default())
    }

    async fn catchup(&self, _session: &Session, _resource_id: &str) -> Result<()> {
        self.catchup_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn fetch_tariff(&self, _session: &Session, resource_id: &str) -> Result<Tariff> {
        *self
            .tariff_fetches
            .lock()
            .unwrap()
            .entry(resource_id.to_string())
            .or_default() += 1;
        self.pause(resource_id).await;

        if let Some(err) = self.next_failure(resource_id) {
            return Err(err);
        }
        self.tariffs
            .lock()
            .unwrap()
            .get(resource_id)
            .copied()
            .ok_or_else(|| GlowError::no_data("No tariff published"))
    }
}

pub fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

pub fn credentials() -> Credentials {
    Credentials::new("user@example.com", "secret")
}

pub struct Fixture {
    pub client: Arc<FakeClient>,
    pub catalog: Arc<Catalog>,
    pub coordinator: Arc<Coordinator>,
}

pub async fn fixture(client: FakeClient, policy: RefreshPolicy) -> Fixture {
    let client = Arc::new(client);
    let account = Account::connect(credentials(), client.clone())
        .await
        .unwrap();
    let catalog = Arc::new(Catalog::discover(&account).await.unwrap());
    let coordinator = Arc::new(Coordinator::new(Arc::new(account), policy));
    Fixture {
        client,
        catalog,
        coordinator,
    }
}
