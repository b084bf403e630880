//! Shared helpers and constants.

use chrono::Utc;

pub const APP_NAME: &str = "murmur_sync";

/// Nanosecond wall-clock timestamp. Content items carry author-assigned
/// timestamps at this resolution, so everything the engine stamps locally
/// composes with them.
pub fn now_timestamp_nanos() -> i64 {
    let now = Utc::now();
    now.timestamp_nanos_opt()
        .unwrap_or_else(|| now.timestamp_micros().saturating_mul(1_000))
}
