//! Account and session ownership
//!
//! An [`Account`] owns the credentials, the metering client and the current
//! session token. Every remote operation goes through it so that an expired
//! or revoked token is refreshed in one place.

use crate::api::{Credentials, MeteringClient, ResourceDescriptor, Session, Tariff};
use crate::error::Result;
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use crate::reading::{Reading, TimeRange};
use chrono::Utc;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

/// One configured metering account
pub struct Account {
    credentials: Credentials,
    client: Arc<dyn MeteringClient>,
    session: RwLock<Session>,
    // Held for the whole re-authentication round trip
    reauth: tokio::sync::Mutex<()>,
    logger: StructuredLogger,
}

impl Account {
    /// Authenticate and return a ready account.
    ///
    /// Rejected credentials surface as [`crate::GlowError::Auth`]; the caller
    /// should abort setup rather than retry.
    pub async fn connect(credentials: Credentials, client: Arc<dyn MeteringClient>) -> Result<Self> {
        let logger =
            get_logger_with_context(LogContext::new("account").with_account(&credentials.username));
        let session = client.authenticate(&credentials).await?;
        logger.info("Account connected");
        Ok(Self {
            credentials,
            client,
            session: RwLock::new(session),
            reauth: tokio::sync::Mutex::new(()),
            logger,
        })
    }

    pub fn username(&self) -> &str {
        &self.credentials.username
    }

    /// Snapshot of the current session
    pub fn session(&self) -> Session {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace `stale` with a fresh session.
    ///
    /// Concurrent callers presenting the same stale token converge on a single
    /// `authenticate` call. A caller whose token was already replaced gets the
    /// new session without another round trip.
    pub async fn reauthenticate(&self, stale: &Session) -> Result<Session> {
        let _guard = self.reauth.lock().await;

        let current = self.session();
        if current.token != stale.token {
            return Ok(current);
        }

        self.logger.info("Re-authenticating");
        let fresh = self.client.authenticate(&self.credentials).await?;
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = fresh.clone();
        Ok(fresh)
    }

    /// Run `op` with a valid session, retrying once after an auth rejection
    async fn with_session<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: Fn(Session) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut session = self.session();
        if session.is_expired(Utc::now()) {
            session = self.reauthenticate(&session).await?;
        }

        match op(session.clone()).await {
            Err(e) if e.is_auth() => {
                self.logger
                    .warn(&format!("Session rejected ({e}), refreshing auth"));
                let fresh = self.reauthenticate(&session).await?;
                op(fresh).await
            }
            other => other,
        }
    }

    pub async fn list_resources(&self) -> Result<Vec<ResourceDescriptor>> {
        self.with_session(|session| {
            let client = Arc::clone(&self.client);
            async move { client.list_resources(&session).await }
        })
        .await
    }

    pub async fn fetch_readings(&self, resource_id: &str, range: &TimeRange) -> Result<Vec<Reading>> {
        self.with_session(|session| {
            let client = Arc::clone(&self.client);
            async move { client.fetch_readings(&session, resource_id, range).await }
        })
        .await
    }

    pub async fn catchup(&self, resource_id: &str) -> Result<()> {
        self.with_session(|session| {
            let client = Arc::clone(&self.client);
            async move { client.catchup(&session, resource_id).await }
        })
        .await
    }

    pub async fn fetch_tariff(&self, resource_id: &str) -> Result<Tariff> {
        self.with_session(|session| {
            let client = Arc::clone(&self.client);
            async move { client.fetch_tariff(&session, resource_id).await }
        })
        .await
    }
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("username", &self.credentials.username)
            .finish_non_exhaustive()
    }
}
