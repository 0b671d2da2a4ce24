//! Remote metering API boundary
//!
//! [`MeteringClient`] is the only path to the network. The production
//! implementation talks to Glowmarkt; tests substitute scripted fakes.

pub mod glowmarkt;
pub mod types;

pub use glowmarkt::GlowmarktClient;
pub use types::{Credentials, ResourceDescriptor, Session, Tariff};

use crate::error::Result;
use crate::reading::{Reading, TimeRange};

/// Remote metering client
#[async_trait::async_trait]
pub trait MeteringClient: Send + Sync {
    /// Exchange credentials for a session token
    async fn authenticate(&self, credentials: &Credentials) -> Result<Session>;

    /// All resources of every virtual entity on the account
    async fn list_resources(&self, session: &Session) -> Result<Vec<ResourceDescriptor>>;

    /// Daily-summed readings of `resource_id` inside `range`
    async fn fetch_readings(
        &self,
        session: &Session,
        resource_id: &str,
        range: &TimeRange,
    ) -> Result<Vec<Reading>>;

    /// Ask the backend to pull the latest data from the DCC
    async fn catchup(&self, _session: &Session, _resource_id: &str) -> Result<()> {
        Ok(())
    }

    /// Current tariff attached to a consumption resource
    async fn fetch_tariff(&self, session: &Session, resource_id: &str) -> Result<Tariff>;
}
