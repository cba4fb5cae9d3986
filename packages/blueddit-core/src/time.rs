//! Clock helpers and time-derived identifiers.

use chrono::{DateTime, SecondsFormat, Utc};

/// Returns the current Unix timestamp in seconds.
pub fn now_timestamp() -> i64 {
    Utc::now().timestamp()
}

/// Returns the current Unix timestamp in milliseconds.
pub fn now_timestamp_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Current time as an RFC 3339 string with millisecond precision.
///
/// This is the format every `created_at` / `timestamp` column holds, so
/// lexical order matches chronological order.
pub fn now_rfc3339() -> String {
    to_rfc3339(Utc::now())
}

/// Format an instant the way records store it.
pub fn to_rfc3339(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// A unique record id derived from the current time.
///
/// The millisecond clock orders ids roughly by creation; the random suffix
/// keeps two ids minted in the same millisecond apart.
pub fn time_token() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", now_timestamp_millis(), &suffix[..8])
}
