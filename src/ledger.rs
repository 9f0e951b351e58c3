//! Time ledger: pure interval-to-hours arithmetic for status accounting.
//!
//! `now` is always injected by the caller so that the transition engine
//! and escalation policy stay deterministic under test.

use chrono::{DateTime, Utc};
use tracing::warn;

const MILLIS_PER_HOUR: i64 = 3_600_000;

/// Whole hours elapsed between `since` and `now` (floor of the millisecond
/// delta). A `since` in the future means clock skew or bad data; the delta
/// is clamped to zero so accumulators never decrease.
pub fn elapsed_hours(since: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let millis = now.signed_duration_since(since).num_milliseconds();
    if millis < 0 {
        warn!(
            since = %since.to_rfc3339(),
            now = %now.to_rfc3339(),
            "status interval starts in the future, clamping elapsed time to 0"
        );
        return 0;
    }
    millis / MILLIS_PER_HOUR
}

/// Render a whole-hour count as "Nd Mh" when it spans a day or more,
/// otherwise plain "Nh".
pub fn format_hours(hours: i64) -> String {
    if hours >= 24 {
        format!("{}d {}h", hours / 24, hours % 24)
    } else {
        format!("{}h", hours)
    }
}
