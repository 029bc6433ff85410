//! Identifier and timestamp helpers.

use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

/// Generates a new UUID v4.
#[must_use]
pub fn generate_uuid() -> Uuid {
    Uuid::new_v4()
}

/// Formats a timestamp as RFC 3339 with microseconds, e.g.
/// `2024-05-01T12:00:00.000000Z`.
#[must_use]
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Returns the current UTC time in [`format_timestamp`] form.
#[must_use]
pub fn iso_timestamp() -> String {
    format_timestamp(Utc::now())
}
