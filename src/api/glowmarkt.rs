//! Glowmarkt REST client
//!
//! Thin mapping of the handful of endpoints the integration needs onto
//! [`MeteringClient`]. Status codes are translated into the crate error
//! taxonomy here so that callers never look at HTTP details.

use super::MeteringClient;
use super::types::{
    AuthResponse, Credentials, ErrorBody, ReadingsResponse, ResourceDescriptor, Session, Tariff,
    TariffResponse, VirtualEntityWire,
};
use crate::config::Config;
use crate::error::{GlowError, Result};
use crate::logging::{StructuredLogger, get_logger};
use crate::reading::{Reading, TimeRange};
use chrono::{DateTime, Duration, FixedOffset, Offset, TimeZone, Utc};
use chrono_tz::Tz;
use reqwest::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use reqwest::{RequestBuilder, Response};

const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(20);
const USER_AGENT_VALUE: &str = concat!("glowdcc/", env!("CARGO_PKG_VERSION"));
const QUERY_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Glowmarkt API client
pub struct GlowmarktClient {
    http: reqwest::Client,
    base_url: String,
    application_id: String,
    tz: Tz,
    logger: StructuredLogger,
}

impl GlowmarktClient {
    /// Create a client for `base_url`, bucketing daily sums in `tz`
    pub fn new(base_url: impl Into<String>, application_id: impl Into<String>, tz: Tz) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            application_id: application_id.into(),
            tz,
            logger: get_logger("glowmarkt"),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.account.base_url.clone(),
            config.account.application_id.clone(),
            config.tz()?,
        )
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, self.url(path))
            .header("applicationId", &self.application_id)
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, USER_AGENT_VALUE)
    }

    fn authed_get(&self, session: &Session, path: &str) -> RequestBuilder {
        self.request(reqwest::Method::GET, path)
            .header("token", &session.token)
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response> {
        self.logger.debug(&format!("Requesting {what}"));
        let response = request.send().await?;
        check_status(response).await
    }

    /// UTC offset in force at `instant` in the account timezone
    fn offset_at(&self, instant: DateTime<Utc>) -> FixedOffset {
        self.tz.offset_from_utc_datetime(&instant.naive_utc()).fix()
    }
}

/// Wall time of `instant` at `offset`, in the readings query format
fn format_at(instant: DateTime<Utc>, offset: FixedOffset) -> String {
    instant
        .with_timezone(&offset)
        .naive_local()
        .format(QUERY_TIME_FORMAT)
        .to_string()
}

/// Translate a non-success response into the crate error taxonomy
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|b| b.error.or(b.message))
        .unwrap_or(body);
    let detail = if detail.trim().is_empty() {
        status.to_string()
    } else {
        detail
    };

    match status.as_u16() {
        401 | 403 => Err(GlowError::auth(detail)),
        429 => Err(GlowError::rate_limited(detail)),
        code => Err(GlowError::api(code, detail)),
    }
}

#[async_trait::async_trait]
impl MeteringClient for GlowmarktClient {
    async fn authenticate(&self, credentials: &Credentials) -> Result<Session> {
        let request = self
            .request(reqwest::Method::POST, "auth")
            .header(CONTENT_TYPE, "application/json")
            .json(&serde_json::json!({
                "username": credentials.username,
                "password": credentials.password,
            }));
        let response = self.send(request, "auth").await?;
        let body: AuthResponse = response.json().await?;

        match body.token {
            Some(token) if body.valid && !token.is_empty() => {
                let expires_at = body
                    .exp
                    .and_then(|exp| Utc.timestamp_opt(exp, 0).single());
                self.logger.info("Authenticated with Glowmarkt");
                Ok(Session::new(token, expires_at))
            }
            _ => Err(GlowError::auth("Credentials were rejected")),
        }
    }

    async fn list_resources(&self, session: &Session) -> Result<Vec<ResourceDescriptor>> {
        let response = self
            .send(self.authed_get(session, "virtualentity"), "virtualentity")
            .await?;
        let entities: Vec<VirtualEntityWire> = response.json().await?;
        Ok(entities
            .into_iter()
            .flat_map(VirtualEntityWire::into_descriptors)
            .collect())
    }

    async fn fetch_readings(
        &self,
        session: &Session,
        resource_id: &str,
        range: &TimeRange,
    ) -> Result<Vec<Reading>> {
        // The API treats `to` as inclusive
        let to = range.end - Duration::seconds(1);
        // One offset applies to both bounds. On DST change days `to` is
        // written at the offset in force at `from` so the span stays exact.
        let offset = self.offset_at(range.start);
        let request = self
            .authed_get(session, &format!("resource/{resource_id}/readings"))
            .query(&[
                ("from", format_at(range.start, offset)),
                ("to", format_at(to, offset)),
                ("period", "P1D".to_string()),
                // Minutes to add to local time to get UTC
                ("offset", (-offset.local_minus_utc() / 60).to_string()),
                ("function", "sum".to_string()),
                ("nulls", "1".to_string()),
            ]);
        let response = self
            .send(request, &format!("readings of {resource_id}"))
            .await?;
        let body: ReadingsResponse = response.json().await?;

        let readings = body
            .data
            .into_iter()
            .filter_map(|(epoch, value)| {
                let start = Utc.timestamp_opt(epoch, 0).single()?;
                let value = value?;
                if start >= range.end {
                    return None;
                }
                let bucket = TimeRange::new(
                    start.max(range.start),
                    (start + Duration::days(1)).min(range.end),
                );
                Some(Reading::new(bucket, value))
            })
            .collect();
        Ok(readings)
    }

    async fn catchup(&self, session: &Session, resource_id: &str) -> Result<()> {
        self.send(
            self.authed_get(session, &format!("resource/{resource_id}/catchup")),
            &format!("catchup of {resource_id}"),
        )
        .await?;
        Ok(())
    }

    async fn fetch_tariff(&self, session: &Session, resource_id: &str) -> Result<Tariff> {
        let response = self
            .send(
                self.authed_get(session, &format!("resource/{resource_id}/tariff")),
                &format!("tariff of {resource_id}"),
            )
            .await?;
        let body: TariffResponse = response.json().await?;

        body.data
            .into_iter()
            .find_map(|d| d.current_rates)
            .map(|rates| Tariff {
                rate: rates.rate,
                standing_charge: rates.standing_charge,
            })
            .ok_or_else(|| {
                GlowError::no_data(format!(
                    "No tariff data for {resource_id}; disable the rate and standing charge sensors if your supplier does not publish one"
                ))
            })
    }
}
