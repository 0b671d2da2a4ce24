//! Host-side lifecycle of one configured account
//!
//! `setup` authenticates, discovers the catalog and builds the sensors.
//! `poll` refreshes every sensor once; `run` drives `poll` on the configured
//! cadence until shutdown, standing in for the host platform's scheduler.

use crate::account::Account;
use crate::api::{Credentials, MeteringClient};
use crate::calculator::Calculator;
use crate::catalog::Catalog;
use crate::config::Config;
use crate::coordinator::{Coordinator, RefreshPolicy};
use crate::error::Result;
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use crate::sensor::{Sensor, SensorDescriptor, SensorState, build_sensors};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{MissedTickBehavior, interval};

/// Latest state of one sensor together with its registration data
#[derive(Debug, Clone, Serialize)]
pub struct SensorSnapshot {
    #[serde(flatten)]
    pub descriptor: SensorDescriptor,
    pub state: SensorState,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Outcome counts of one poll
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PollSummary {
    pub available: usize,
    pub unavailable: usize,
}

/// A set-up account with its sensors
pub struct Integration {
    account: Arc<Account>,
    catalog: Arc<Catalog>,
    coordinator: Arc<Coordinator>,
    calculator: Calculator,
    sensors: Vec<Sensor>,
    states: RwLock<HashMap<String, SensorSnapshot>>,
    poll_interval: Duration,
    logger: StructuredLogger,
}

impl Integration {
    /// Set up from configuration.
    ///
    /// Fails with `Auth` when the credentials are rejected and with
    /// `Discovery` when the account has no usable resources; no sensors
    /// exist in either case.
    pub async fn setup(config: &Config, client: Arc<dyn MeteringClient>) -> Result<Self> {
        let credentials = Credentials::new(
            config.account.username.clone(),
            config.account.password.clone(),
        );
        Self::connect(
            credentials,
            client,
            RefreshPolicy::for_timezone(config.tz()?),
            Duration::from_secs(config.poll_interval_secs),
        )
        .await
    }

    /// Set up with an explicit refresh policy
    pub async fn connect(
        credentials: Credentials,
        client: Arc<dyn MeteringClient>,
        policy: RefreshPolicy,
        poll_interval: Duration,
    ) -> Result<Self> {
        let logger = get_logger_with_context(
            LogContext::new("integration").with_account(&credentials.username),
        );

        let account = Arc::new(Account::connect(credentials, client).await?);
        let catalog = Arc::new(Catalog::discover(&account).await?);
        let coordinator = Arc::new(Coordinator::new(Arc::clone(&account), policy));
        let calculator = Calculator::new(Arc::clone(&catalog), Arc::clone(&coordinator));
        let sensors = build_sensors(&catalog);

        let states = sensors
            .iter()
            .map(|sensor| {
                let snapshot = SensorSnapshot {
                    descriptor: sensor.descriptor().clone(),
                    state: SensorState::Unavailable {
                        reason: "Not refreshed yet".to_string(),
                    },
                    updated_at: None,
                };
                (sensor.unique_id().to_string(), snapshot)
            })
            .collect();

        logger.info(&format!("Set up {} sensors", sensors.len()));
        Ok(Self {
            account,
            catalog,
            coordinator,
            calculator,
            sensors,
            states: RwLock::new(states),
            poll_interval,
            logger,
        })
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub fn sensors(&self) -> &[Sensor] {
        &self.sensors
    }

    /// Refresh every sensor once, concurrently
    pub async fn poll(&self, as_of: DateTime<Utc>) -> PollSummary {
        let mut tasks = JoinSet::new();
        for sensor in &self.sensors {
            let sensor = sensor.clone();
            let calculator = self.calculator.clone();
            tasks.spawn(async move {
                let state = sensor.refresh(&calculator, as_of).await;
                (sensor.unique_id().to_string(), state)
            });
        }

        let mut summary = PollSummary::default();
        while let Some(joined) = tasks.join_next().await {
            let (id, state) = match joined {
                Ok(done) => done,
                Err(e) => {
                    self.logger.error(&format!("Sensor refresh task failed: {e}"));
                    continue;
                }
            };
            if state.is_available() {
                summary.available += 1;
            } else {
                summary.unavailable += 1;
            }
            let mut states = self.states.write().unwrap_or_else(PoisonError::into_inner);
            if let Some(snapshot) = states.get_mut(&id) {
                snapshot.state = state;
                snapshot.updated_at = Some(as_of);
            }
        }

        self.logger.debug(&format!(
            "Poll finished: {} available, {} unavailable",
            summary.available, summary.unavailable
        ));
        summary
    }

    /// Poll on the configured interval until `shutdown` resolves, then unload
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    self.logger.info("Shutdown signal received");
                    break;
                }
                _ = ticker.tick() => {
                    self.poll(Utc::now()).await;
                }
            }
        }

        self.unload();
    }

    /// Drop all cached readings; sensors stay registered but unavailable
    pub fn unload(&self) {
        self.coordinator.clear();
        let mut states = self.states.write().unwrap_or_else(PoisonError::into_inner);
        for snapshot in states.values_mut() {
            snapshot.state = SensorState::Unavailable {
                reason: "Integration unloaded".to_string(),
            };
        }
        self.logger.info("Integration unloaded");
    }

    /// Current state of every sensor, in registration order
    pub fn snapshot(&self) -> Vec<SensorSnapshot> {
        let states = self.states.read().unwrap_or_else(PoisonError::into_inner);
        self.sensors
            .iter()
            .filter_map(|sensor| states.get(sensor.unique_id()).cloned())
            .collect()
    }

    pub fn sensor_state(&self, unique_id: &str) -> Option<SensorSnapshot> {
        self.states
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(unique_id)
            .cloned()
    }
}

impl std::fmt::Debug for Integration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Integration")
            .field("account", &self.account)
            .field("sensors", &self.sensors.len())
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}
