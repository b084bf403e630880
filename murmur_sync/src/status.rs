//! Presentation-time classification of optimistically authored items.

use crate::database::models::ContentStatus;
use std::time::Duration;

pub const DEFAULT_OPTIMISTIC_TIMEOUT: Duration = Duration::from_secs(20);

/// Decides how a content item should be presented given only the item and
/// the current clock. A publisher is only ever attached by a confirmed
/// remote batch, so its presence means the item has settled. Unconfirmed
/// items stay `syncing` for the grace period and read as `failed` after
/// it; a genuine resubmission is a new item with a fresh timestamp.
pub fn classify(
    publisher: Option<&str>,
    timestamp_nanos: i64,
    now_nanos: i64,
    timeout: Duration,
) -> ContentStatus {
    if publisher.is_some_and(|value| !value.is_empty()) {
        return ContentStatus::Synced;
    }
    let elapsed = now_nanos.saturating_sub(timestamp_nanos);
    if elapsed < timeout.as_nanos() as i64 {
        ContentStatus::Syncing
    } else {
        ContentStatus::Failed
    }
}
