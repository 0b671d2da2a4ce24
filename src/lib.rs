//! # glowdcc - Hildebrand Glow (DCC) smart meter sensors
//!
//! Exposes the energy usage, cost and tariff of a Glowmarkt account as a set
//! of polled sensors. Readings are fetched from the Glowmarkt API only when
//! the cached value is stale, concurrent requests for one resource share a
//! single fetch, and short API outages are bridged with recent readings.
//!
//! ## Architecture
//!
//! - `api`: the remote metering client boundary and its Glowmarkt implementation
//! - `account`: credentials and the session token, re-authentication
//! - `catalog`: resource discovery and classification into meters
//! - `coordinator`: reading cache and refresh policy
//! - `calculator`: derived values (daily usage and cost, tariff) in kWh and GBP
//! - `sensor`: host-facing sensors and their states
//! - `integration`: setup, polling and teardown of one account
//! - `web`: optional read-only HTTP API over the sensor states
//! - `config`, `logging`, `error`: ambient plumbing

pub mod account;
pub mod api;
pub mod calculator;
pub mod catalog;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod integration;
pub mod logging;
pub mod reading;
pub mod sensor;
pub mod units;
#[cfg(feature = "web")]
pub mod web;

// Re-export commonly used types
pub use config::Config;
pub use coordinator::{Coordinator, ReadingPeriod, RefreshPolicy};
pub use error::{GlowError, Result};
pub use integration::Integration;
pub use reading::{Reading, TimeRange};
