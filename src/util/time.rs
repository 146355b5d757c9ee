//! Wall-clock helpers
//!
//! Polls, sampling windows and peak records are all expressed in whole epoch
//! seconds, the unit storage targets use for `snapshot_time`.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Current time in epoch seconds
pub fn epoch_now() -> i64 {
    Utc::now().timestamp()
}

/// Render epoch seconds as RFC 3339, falling back to the raw number
///
/// # Examples
///
/// ```
/// use gljobstat::util::time::format_epoch;
///
/// assert_eq!(format_epoch(0), "1970-01-01T00:00:00Z");
/// assert_eq!(format_epoch(1697018723), "2023-10-11T10:05:23Z");
/// ```
pub fn format_epoch(secs: i64) -> String {
    match DateTime::<Utc>::from_timestamp(secs, 0) {
        Some(dt) => dt.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        None => secs.to_string(),
    }
}

/// Format a duration compactly (e.g. `90s`, `5m`, `2h`)
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use gljobstat::util::time::format_interval;
///
/// assert_eq!(format_interval(Duration::from_secs(45)), "45s");
/// assert_eq!(format_interval(Duration::from_secs(300)), "5m");
/// assert_eq!(format_interval(Duration::from_secs(7200)), "2h");
/// ```
pub fn format_interval(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 3600 && secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs >= 60 && secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}
