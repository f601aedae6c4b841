//! Date parsing and display helpers for record fields.
//!
//! Records arrive from the data layer with dates as either plain calendar dates
//! (`2026-01-01`) or full timestamps (`2026-01-01T09:30:00.000Z`). Both collapse
//! to a calendar [`Date`]; the time of day is never shown on paperwork.

use serde::{Deserialize, Deserializer};
use time::{Date, OffsetDateTime, format_description::well_known::Rfc3339, macros::format_description};

use super::error::DomainError;

/// Parse a calendar date from the shapes the data layer produces.
pub fn parse_date(value: &str) -> Result<Date, DomainError> {
    let trimmed = value.trim();
    let iso = format_description!("[year]-[month]-[day]");

    if let Ok(date) = Date::parse(trimmed, iso) {
        return Ok(date);
    }
    if let Ok(timestamp) = OffsetDateTime::parse(trimmed, &Rfc3339) {
        return Ok(timestamp.date());
    }
    // `2026-01-01 10:00:00` and similar SQL renderings.
    if let Some(prefix) = trimmed.get(..10)
        && let Ok(date) = Date::parse(prefix, iso)
    {
        return Ok(date);
    }

    Err(DomainError::validation(
        "date",
        format!("`{trimmed}` is not a recognised date"),
    ))
}

/// Fixed display format used on every document, e.g. `1 January 2026`.
pub fn display_date(date: Date) -> String {
    date.format(format_description!("[day padding:none] [month repr:long] [year]"))
        .unwrap_or_else(|_| date.to_string())
}

/// Serde adapter for optional date fields; blank strings count as absent.
pub fn deserialize_optional<'de, D>(deserializer: D) -> Result<Option<Date>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw {
        Some(value) if !value.trim().is_empty() => parse_date(&value)
            .map(Some)
            .map_err(serde::de::Error::custom),
        _ => Ok(None),
    }
}
