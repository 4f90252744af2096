//! UTC timestamps shared by snapshot names and transfer log files.
//!
//! The format sorts lexicographically in chronological order, which the
//! retention policy relies on.

use chrono::{DateTime, Utc};

/// `strftime` pattern producing `YYYY-MM-DD--HH-MM-SS`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d--%H-%M-%S";

/// Renders `at` in the sortable snapshot/log format.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use offsite::timestamp::format_timestamp;
///
/// let at = Utc.with_ymd_and_hms(2024, 1, 4, 3, 2, 1).single().expect("valid");
/// assert_eq!(format_timestamp(at), "2024-01-04--03-02-01");
/// ```
#[must_use]
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Returns the current UTC time.
#[must_use]
pub fn now() -> DateTime<Utc> {
    Utc::now()
}
