//! Timestamp parsing, formatting and calendar helpers.
//!
//! Every timestamp handled by the statistics crates is a UTC
//! [`DateTime<Utc>`]. On disk they are written as RFC 3339 with an explicit
//! `+00:00` offset; on the way back in a handful of looser ISO-8601 shapes
//! are accepted so that hand-edited and legacy cache files still load.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};

use crate::error::{Result, StatsError};

/// Naive layouts tried after the offset-aware ones. Values are taken as UTC.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
];

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Parse a timestamp string into UTC.
///
/// Accepts RFC 3339 with any offset (normalised to UTC), a trailing `Z`,
/// the space-separated `YYYY-MM-DD HH:MM:SS+00:00` form, offset-less ISO
/// date-times and bare dates (both interpreted as UTC).
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(StatsError::TimestampParse(s.to_string()));
    }

    let normalised = match trimmed.strip_suffix('Z').or_else(|| trimmed.strip_suffix('z')) {
        Some(stripped) => format!("{stripped}+00:00"),
        None => trimmed.to_string(),
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(&normalised) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(&normalised, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Ok(dt.with_timezone(&Utc));
    }

    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }

    Err(StatsError::TimestampParse(s.to_string()))
}

// ── Formatting ────────────────────────────────────────────────────────────────

/// Render a timestamp as RFC 3339 with an explicit `+00:00` offset.
///
/// Sub-second precision is kept (in 3, 6 or 9 digit groups) so that the
/// value parses back to the identical instant.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, false)
}

// ── Calendar ──────────────────────────────────────────────────────────────────

/// First instant of the given calendar month, or `None` for an invalid month.
pub fn month_start_of(year: i32, month: u32) -> Option<DateTime<Utc>> {
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).single()
}

// ── Serde adapters ────────────────────────────────────────────────────────────

/// `#[serde(with = "...")]` adapter for required timestamps.
pub mod rfc3339 {
    use chrono::{DateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_timestamp(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_timestamp(&raw).map_err(de::Error::custom)
    }
}

/// `#[serde(with = "...")]` adapter for optional timestamps; `null` and a
/// missing field both map to `None`.
pub mod rfc3339_option {
    use chrono::{DateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        ts: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match ts {
            Some(ts) => serializer.serialize_str(&super::format_timestamp(ts)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(raw) if !raw.trim().is_empty() => super::parse_timestamp(&raw)
                .map(Some)
                .map_err(de::Error::custom),
            _ => Ok(None),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
