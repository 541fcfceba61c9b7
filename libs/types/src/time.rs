//! Unix-nanosecond timestamps
//!
//! All timestamps in the pipeline are `i64` nanoseconds since the Unix epoch.

use chrono::{DateTime, Utc};

/// Current wall-clock time in Unix nanoseconds.
///
/// Saturates to `i64::MAX` past year 2262.
pub fn now_nanos() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
}

/// Convert Unix nanoseconds to a `DateTime<Utc>` for display.
pub fn to_datetime(nanos: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_nanos(nanos)
}
