//! Tolerant date handling for operator-entered and persisted values.
//!
//! Dates arrive either as ISO `YYYY-MM-DD` or as the local `DD/MM/YYYY` form.
//! Nothing in here fails loudly: unparseable input becomes `None` and the
//! caller decides how to degrade.

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;

const ISO_FORMAT: &str = "%Y-%m-%d";
const LOCAL_FORMAT: &str = "%d/%m/%Y";

/// Parses either accepted textual form. Surrounding whitespace is ignored.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    NaiveDate::parse_from_str(trimmed, ISO_FORMAT)
        .or_else(|_| NaiveDate::parse_from_str(trimmed, LOCAL_FORMAT))
        .ok()
}

/// Like [`parse_date`] for optional fields, logging values that are present but unusable.
pub fn parse_optional(raw: Option<&str>, field: &'static str) -> Option<NaiveDate> {
    let raw = raw?;
    let parsed = parse_date(raw);
    if parsed.is_none() && !raw.trim().is_empty() {
        tracing::warn!(field, value = raw, "ignoring unparseable date");
    }
    parsed
}

/// Calendar date of `now` in the business timezone.
pub fn local_today(now: DateTime<Utc>, timezone: Tz) -> NaiveDate {
    now.with_timezone(&timezone).date_naive()
}

/// Serde adapter for optional RFC 3339 timestamps that never rejects a document.
///
/// A malformed value loads as `None` so a single bad record cannot make the
/// whole state file unreadable.
pub mod lenient_timestamp {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(at) => serializer.serialize_some(&at.to_rfc3339()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
        Ok(match raw {
            Some(serde_json::Value::String(text)) => {
                match DateTime::parse_from_rfc3339(text.trim()) {
                    Ok(at) => Some(at.with_timezone(&Utc)),
                    Err(_) => {
                        tracing::warn!(value = %text, "dropping unparseable timestamp");
                        None
                    }
                }
            }
            Some(serde_json::Value::Null) | None => None,
            Some(other) => {
                tracing::warn!(value = %other, "dropping non-string timestamp");
                None
            }
        })
    }
}
