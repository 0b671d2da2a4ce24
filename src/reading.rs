//! Readings and the time windows they cover
//!
//! All ranges are half-open `[start, end)` in UTC. Local calendar days are
//! resolved through the account timezone so that DST transitions produce
//! 23 or 25 hour days rather than misaligned buckets.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;

/// A half-open time window `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub const fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// The full local calendar day `date` in `tz`
    pub fn local_day(date: NaiveDate, tz: Tz) -> Self {
        let start = local_midnight(date, tz);
        let end = date
            .succ_opt()
            .map_or_else(|| start + Duration::days(1), |next| local_midnight(next, tz));
        Self { start, end }
    }

    /// Whether two windows share any instant
    pub fn overlaps(&self, other: &Self) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// First instant of `date` in `tz`, expressed in UTC.
///
/// Midnight can be skipped by a DST jump in some zones; the earliest valid
/// local time at or after midnight is used then.
pub fn local_midnight(date: NaiveDate, tz: Tz) -> DateTime<Utc> {
    let mut naive = date.and_time(chrono::NaiveTime::MIN);
    for _ in 0..4 {
        if let Some(local) = tz.from_local_datetime(&naive).earliest() {
            return local.with_timezone(&Utc);
        }
        naive += Duration::minutes(30);
    }
    Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN))
}

/// One value for one resource over a time window, in the resource's unit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    pub range: TimeRange,
    pub value: f64,
}

impl Reading {
    pub const fn new(range: TimeRange, value: f64) -> Self {
        Self { range, value }
    }
}
