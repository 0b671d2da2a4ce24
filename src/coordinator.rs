//! Reading cache and refresh coordinator
//!
//! The coordinator is the only component that fetches readings. It keeps a
//! small per-resource cache and decides, for every request, whether the
//! cached reading can be served or a fetch is due:
//!
//! - DCC data is published in half-hour slots, so a reading for the current
//!   day (or the current tariff) becomes stale once a new slot has started
//!   since it was fetched and at least the minimum refresh interval passed.
//! - Daily totals settle shortly after midnight. A day fetched after its
//!   settle instant never changes again and is served from cache forever.
//! - Concurrent requests for the same resource share one fetch; requests for
//!   different resources never wait on each other. The rate and standing
//!   charge of one meter come from the same tariff call and share one entry.
//! - A transient fetch failure falls back to the previous reading of the same
//!   period as long as it is not older than the maximum stale age.
//!
//! There is no internal timer. Callers pass `as_of` explicitly, which is also
//! what the fetch timestamp of a new reading is recorded as.

use crate::account::Account;
use crate::api::Tariff;
use crate::catalog::{QuantityKind, Resource};
use crate::error::{GlowError, Result};
use crate::logging::{StructuredLogger, get_logger};
use crate::reading::{Reading, TimeRange, local_midnight};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tokio::sync::watch;

/// Fixed refresh policy.
///
/// Not part of the configuration file; the defaults reflect when the
/// backend publishes data.
#[derive(Debug, Clone)]
pub struct RefreshPolicy {
    /// Length of one publication slot
    pub slot: Duration,
    /// Never refetch a current reading sooner than this
    pub min_refresh_interval: Duration,
    /// Local time after which the previous day's total is final
    pub settle_cutoff: NaiveTime,
    /// Oldest cached reading that may be served when a fetch fails
    pub max_stale_age: Duration,
    /// Budget for one fetch, including catch-up
    pub fetch_timeout: std::time::Duration,
    /// Zone defining day boundaries
    pub timezone: Tz,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            slot: Duration::minutes(30),
            min_refresh_interval: Duration::minutes(5),
            settle_cutoff: NaiveTime::from_hms_opt(1, 30, 0).unwrap_or(NaiveTime::MIN),
            max_stale_age: Duration::hours(3),
            fetch_timeout: std::time::Duration::from_secs(30),
            timezone: chrono_tz::Europe::London,
        }
    }
}

impl RefreshPolicy {
    /// Default policy for another timezone
    pub fn for_timezone(timezone: Tz) -> Self {
        Self {
            timezone,
            ..Self::default()
        }
    }

    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.timezone).date_naive()
    }

    /// Day whose usage is reported at `as_of`.
    ///
    /// Before the settle cutoff the current day has no data yet, so the
    /// previous day is still the one being reported.
    pub fn reporting_day(&self, as_of: DateTime<Utc>) -> NaiveDate {
        let local = as_of.with_timezone(&self.timezone);
        let today = local.date_naive();
        if local.time() < self.settle_cutoff {
            today.pred_opt().unwrap_or(today)
        } else {
            today
        }
    }

    /// Instant after which the total for `day` no longer changes
    pub fn settle_instant(&self, day: NaiveDate) -> DateTime<Utc> {
        let next = day.succ_opt().unwrap_or(day);
        let cutoff = next.and_time(self.settle_cutoff);
        self.timezone
            .from_local_datetime(&cutoff)
            .earliest()
            .map_or_else(
                || local_midnight(next, self.timezone) + (self.settle_cutoff - NaiveTime::MIN),
                |local| local.with_timezone(&Utc),
            )
    }

    fn slot_index(&self, instant: DateTime<Utc>) -> i64 {
        let slot = self.slot.num_seconds().max(1);
        instant.timestamp().div_euclid(slot)
    }

    /// Whether a current-period reading fetched at `fetched_at` is due again
    pub fn refresh_due(&self, fetched_at: DateTime<Utc>, as_of: DateTime<Utc>) -> bool {
        self.slot_index(as_of) > self.slot_index(fetched_at)
            && as_of - fetched_at >= self.min_refresh_interval
    }
}

/// The window a reading is requested for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingPeriod {
    /// Total over a local calendar day (so far, if the day is not over)
    Day(NaiveDate),
    /// The tariff currently in force
    Tariff,
}

/// A reading together with when it was fetched
#[derive(Debug, Clone, PartialEq)]
pub struct CachedReading {
    pub reading: Reading,
    pub fetched_at: DateTime<Utc>,
}

/// What one fetch produced
#[derive(Debug, Clone, PartialEq)]
enum Sample {
    /// Sum of a resource's readings over the range
    Total(Reading),
    /// Both tariff components, in force over the range
    Tariff { range: TimeRange, tariff: Tariff },
}

impl Sample {
    const fn range(&self) -> TimeRange {
        match self {
            Self::Total(reading) => reading.range,
            Self::Tariff { range, .. } => *range,
        }
    }

    /// The reading `resource` takes from this sample
    fn reading_for(&self, resource: &Resource) -> Reading {
        match self {
            Self::Total(reading) => reading.clone(),
            Self::Tariff { range, tariff } => {
                let value = match resource.quantity() {
                    QuantityKind::StandingCharge => tariff.standing_charge,
                    _ => tariff.rate,
                };
                Reading::new(*range, value)
            }
        }
    }
}

struct Stored {
    sample: Sample,
    fetched_at: DateTime<Utc>,
}

/// Cache entry serving `resource`.
///
/// Tariff resources are keyed by the consumption resource they are read
/// through, so one tariff call feeds both components.
fn cache_key(resource: &Resource) -> String {
    if resource.quantity().is_tariff() {
        format!("{}#tariff", resource.remote_id)
    } else {
        resource.id.clone()
    }
}

type Outcome = Result<Sample>;

struct InFlight {
    period: ReadingPeriod,
    done: watch::Receiver<Option<Outcome>>,
}

/// Cached samples of one entry, chronological and non-overlapping
#[derive(Default)]
struct CacheEntry {
    samples: Vec<Stored>,
    in_flight: Option<InFlight>,
}

impl CacheEntry {
    fn lookup(&self, period: ReadingPeriod, policy: &RefreshPolicy) -> Option<&Stored> {
        match period {
            ReadingPeriod::Day(day) => {
                let start = local_midnight(day, policy.timezone);
                self.samples.iter().find(|s| s.sample.range().start == start)
            }
            ReadingPeriod::Tariff => self.samples.last(),
        }
    }

    /// Insert `stored`, replacing whatever it overlaps, and drop samples
    /// older than the previous local day
    fn store(&mut self, stored: Stored, as_of: DateTime<Utc>, policy: &RefreshPolicy) {
        let range = stored.sample.range();
        self.samples.retain(|s| !s.sample.range().overlaps(&range));
        let at = self
            .samples
            .partition_point(|s| s.sample.range().start < range.start);
        self.samples.insert(at, stored);

        let today = policy.local_date(as_of);
        let horizon = local_midnight(today.pred_opt().unwrap_or(today), policy.timezone);
        self.samples.retain(|s| s.sample.range().end > horizon);
    }
}

fn lock(entry: &Mutex<CacheEntry>) -> MutexGuard<'_, CacheEntry> {
    entry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Publishes the leader's outcome and clears the in-flight marker.
///
/// Dropping it without [`FetchLease::complete`] (cancellation) still clears
/// the marker; waiters then see a closed channel and retry.
struct FetchLease {
    entry: Arc<Mutex<CacheEntry>>,
    done: Option<watch::Sender<Option<Outcome>>>,
}

impl FetchLease {
    fn complete(mut self, update: impl FnOnce(&mut CacheEntry) -> Outcome) -> Outcome {
        let mut entry = lock(&self.entry);
        let outcome = update(&mut entry);
        entry.in_flight = None;
        if let Some(done) = self.done.take() {
            done.send_replace(Some(outcome.clone()));
        }
        outcome
    }
}

impl Drop for FetchLease {
    fn drop(&mut self) {
        if self.done.is_some() {
            lock(&self.entry).in_flight = None;
        }
    }
}

enum Step {
    Hit(Sample),
    Wait(ReadingPeriod, watch::Receiver<Option<Outcome>>),
    Lead(FetchLease),
}

/// Per-account reading cache
pub struct Coordinator {
    account: Arc<Account>,
    policy: RefreshPolicy,
    entries: RwLock<HashMap<String, Arc<Mutex<CacheEntry>>>>,
    logger: StructuredLogger,
}

impl Coordinator {
    pub fn new(account: Arc<Account>, policy: RefreshPolicy) -> Self {
        Self {
            account,
            policy,
            entries: RwLock::new(HashMap::new()),
            logger: get_logger("coordinator"),
        }
    }

    pub const fn policy(&self) -> &RefreshPolicy {
        &self.policy
    }

    /// Period served by [`Self::get_current`] for `resource` at `as_of`
    pub fn current_period(&self, resource: &Resource, as_of: DateTime<Utc>) -> ReadingPeriod {
        if resource.quantity().is_tariff() {
            ReadingPeriod::Tariff
        } else {
            ReadingPeriod::Day(self.policy.reporting_day(as_of))
        }
    }

    /// Current reading of `resource`: today so far (or yesterday before the
    /// settle cutoff) for usage and cost, the tariff in force for rates and
    /// standing charges.
    pub async fn get_current(&self, resource: &Resource, as_of: DateTime<Utc>) -> Result<Reading> {
        self.get_reading(resource, self.current_period(resource, as_of), as_of)
            .await
    }

    /// Reading of `resource` for `period`, fetching only when the cached one
    /// is missing or stale
    pub async fn get_reading(
        &self,
        resource: &Resource,
        period: ReadingPeriod,
        as_of: DateTime<Utc>,
    ) -> Result<Reading> {
        if resource.quantity().is_tariff() != (period == ReadingPeriod::Tariff) {
            return Err(GlowError::validation(
                "period",
                format!("{period:?} does not apply to {}", resource.id),
            ));
        }

        let entry = self.entry(&cache_key(resource));
        loop {
            match self.next_step(&entry, period, as_of) {
                Step::Hit(sample) => return Ok(sample.reading_for(resource)),
                Step::Wait(in_flight_period, mut done) => {
                    // A closed channel means the leader was cancelled
                    let outcome = match done.wait_for(Option::is_some).await {
                        Ok(outcome) => outcome.clone(),
                        Err(_) => continue,
                    };
                    if in_flight_period == period
                        && let Some(outcome) = outcome
                    {
                        return outcome.map(|sample| sample.reading_for(resource));
                    }
                }
                Step::Lead(lease) => {
                    return self
                        .lead(lease, resource, period, as_of)
                        .await
                        .map(|sample| sample.reading_for(resource));
                }
            }
        }
    }

    /// Cached reading of `resource` for `period`, without fetching
    pub fn cached(&self, resource: &Resource, period: ReadingPeriod) -> Option<CachedReading> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let entry = lock(entries.get(&cache_key(resource))?);
        entry.lookup(period, &self.policy).map(|stored| CachedReading {
            reading: stored.sample.reading_for(resource),
            fetched_at: stored.fetched_at,
        })
    }

    /// Forget the readings of `resource`; the next request fetches again.
    ///
    /// For a tariff resource this also drops its sibling component.
    pub fn invalidate(&self, resource: &Resource) {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = entries.get(&cache_key(resource)) {
            lock(entry).samples.clear();
        }
    }

    /// Drop every cache entry (account teardown)
    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn entry(&self, key: &str) -> Arc<Mutex<CacheEntry>> {
        if let Some(entry) = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
        {
            return Arc::clone(entry);
        }
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(entries.entry(key.to_string()).or_default())
    }

    fn next_step(
        &self,
        entry: &Arc<Mutex<CacheEntry>>,
        period: ReadingPeriod,
        as_of: DateTime<Utc>,
    ) -> Step {
        let mut guard = lock(entry);
        if let Some(stored) = guard.lookup(period, &self.policy)
            && self.is_fresh(stored.fetched_at, period, as_of)
        {
            return Step::Hit(stored.sample.clone());
        }
        if let Some(in_flight) = &guard.in_flight {
            return Step::Wait(in_flight.period, in_flight.done.clone());
        }

        let (tx, rx) = watch::channel(None);
        guard.in_flight = Some(InFlight { period, done: rx });
        Step::Lead(FetchLease {
            entry: Arc::clone(entry),
            done: Some(tx),
        })
    }

    fn is_fresh(&self, fetched_at: DateTime<Utc>, period: ReadingPeriod, as_of: DateTime<Utc>) -> bool {
        match period {
            ReadingPeriod::Day(day) => {
                let settle = self.policy.settle_instant(day);
                if fetched_at >= settle {
                    return true;
                }
                as_of < settle && !self.policy.refresh_due(fetched_at, as_of)
            }
            ReadingPeriod::Tariff => !self.policy.refresh_due(fetched_at, as_of),
        }
    }

    async fn lead(
        &self,
        lease: FetchLease,
        resource: &Resource,
        period: ReadingPeriod,
        as_of: DateTime<Utc>,
    ) -> Outcome {
        let logger = self.logger.for_resource(&resource.id);
        let fetched = match tokio::time::timeout(
            self.policy.fetch_timeout,
            self.fetch(resource, period, as_of),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(GlowError::timeout(format!(
                "Fetch exceeded {}s",
                self.policy.fetch_timeout.as_secs()
            ))),
        };

        let policy = &self.policy;
        let max_stale_age = policy.max_stale_age;
        lease.complete(|entry| match fetched {
            Ok(sample) => {
                logger.debug(&format!("Fetched {period:?}: {sample:?}"));
                entry.store(
                    Stored {
                        sample: sample.clone(),
                        fetched_at: as_of,
                    },
                    as_of,
                    policy,
                );
                Ok(sample)
            }
            Err(e) => match entry.lookup(period, policy) {
                Some(previous)
                    if e.is_transient() && as_of - previous.fetched_at <= max_stale_age =>
                {
                    logger.warn(&format!(
                        "Fetch failed ({e}), serving reading from {}",
                        previous.fetched_at
                    ));
                    Ok(previous.sample.clone())
                }
                _ => {
                    logger.warn(&format!("Fetch failed: {e}"));
                    Err(e)
                }
            },
        })
    }

    async fn fetch(
        &self,
        resource: &Resource,
        period: ReadingPeriod,
        as_of: DateTime<Utc>,
    ) -> Outcome {
        let tz = self.policy.timezone;
        match period {
            ReadingPeriod::Tariff => {
                let tariff = self.account.fetch_tariff(&resource.remote_id).await?;
                let range = TimeRange::local_day(self.policy.local_date(as_of), tz);
                Ok(Sample::Tariff { range, tariff })
            }
            ReadingPeriod::Day(day) => {
                let full = TimeRange::local_day(day, tz);
                let end = full.end.min(as_of);
                if end <= full.start {
                    return Err(GlowError::no_data(format!("{day} has not started yet")));
                }
                let range = TimeRange::new(full.start, end);

                if as_of < self.policy.settle_instant(day)
                    && let Err(e) = self.account.catchup(&resource.remote_id).await
                {
                    self.logger
                        .for_resource(&resource.id)
                        .warn(&format!("Catch-up request failed: {e}"));
                }

                let readings = self
                    .account
                    .fetch_readings(&resource.remote_id, &range)
                    .await?;
                let mut values = readings
                    .iter()
                    .filter(|r| r.range.overlaps(&range))
                    .map(|r| r.value)
                    .peekable();
                if values.peek().is_none() {
                    return Err(GlowError::no_data(format!("No readings for {day} yet")));
                }
                Ok(Sample::Total(Reading::new(range, values.sum())))
            }
        }
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("account", &self.account)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
