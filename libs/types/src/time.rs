//! Timestamp policy
//!
//! All vault timestamps are UTC. Open validity intervals end at a fixed
//! far-future sentinel rather than `None`, so interval arithmetic stays total.

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};

pub type Timestamp = DateTime<Utc>;

/// Unix seconds of 9999-12-31T23:59:59Z.
const OPEN_END_SECS: i64 = 253_402_300_799;

/// The "open" sentinel used as `effective_to` of a current row.
pub fn open_end() -> Timestamp {
    Utc.timestamp_opt(OPEN_END_SECS, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

pub fn is_open_end(ts: &Timestamp) -> bool {
    *ts >= open_end()
}

/// Canonical RFC 3339 form with microsecond precision and a `Z` suffix.
pub fn canonical_timestamp(ts: &Timestamp) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}
