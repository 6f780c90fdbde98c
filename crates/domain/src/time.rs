//! Time and timestamp helpers.

use chrono::{DateTime, NaiveTime, Utc};

/// UTC timestamp used for event times and execution reports.
pub type Timestamp = DateTime<Utc>;

/// Wall-clock time of day carried by `Time` properties.
pub type TimeOfDay = NaiveTime;

/// Return the current UTC time.
#[must_use]
pub fn now() -> Timestamp {
    Utc::now()
}

/// Parse `HH:MM` or `HH:MM:SS`.
#[must_use]
pub fn parse_time_of_day(input: &str) -> Option<TimeOfDay> {
    let input = input.trim();
    NaiveTime::parse_from_str(input, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(input, "%H:%M"))
        .ok()
}
