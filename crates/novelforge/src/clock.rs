//! Millisecond wall-clock timestamps used for every persisted time column.

use chrono::Utc;

/// Current time as milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
