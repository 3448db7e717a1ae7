use chrono::{DateTime, Utc};

/// Current wall-clock time. A single choke point so tests can reason about
/// "now" without reaching for a mocking framework.
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Milliseconds since the Unix epoch, for TTL arithmetic against the
/// coordination store (Redis `PX` values are always milliseconds).
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn to_epoch_ms(t: DateTime<Utc>) -> i64 {
    t.timestamp_millis()
}

pub fn from_epoch_ms(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}
