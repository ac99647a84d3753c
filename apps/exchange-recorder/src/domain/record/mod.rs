//! Time-Series Records
//!
//! The flat record shape committed to the store, and the coercion rules that
//! turn loosely typed exchange JSON into tags, fields and timestamps.
//!
//! # Coercion
//!
//! - Tags become strings. Numbers and booleans are rendered, nulls and
//!   nested values are dropped.
//! - Fields become finite `f64`. Numbers pass through, numeric strings are
//!   parsed, everything else (null, bool, text, NaN) is dropped.
//! - Timestamps are parsed as RFC 3339 with any fractional width and any
//!   offset, converted to UTC and truncated to milliseconds.

use std::collections::BTreeMap;

use chrono::{DateTime, DurationRound, SecondsFormat, TimeDelta, Utc};
use serde_json::Value;

// =============================================================================
// Record
// =============================================================================

/// A single tagged, timestamped measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesRecord {
    measurement: String,
    tags: BTreeMap<String, String>,
    fields: BTreeMap<String, f64>,
    timestamp: DateTime<Utc>,
}

impl TimeSeriesRecord {
    /// Create an empty record. The timestamp is truncated to milliseconds.
    #[must_use]
    pub fn new(measurement: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            measurement: measurement.into(),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
            timestamp: truncate_to_millis(timestamp),
        }
    }

    /// Add a tag.
    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Add a field. Non-finite values are ignored.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: f64) -> Self {
        self.set_field(key, value);
        self
    }

    /// Set a field. Non-finite values are ignored.
    pub fn set_field(&mut self, key: impl Into<String>, value: f64) {
        if value.is_finite() {
            self.fields.insert(key.into(), value);
        }
    }

    /// Set a tag from a raw JSON value, skipping values that cannot be a tag.
    pub fn set_tag_from(&mut self, key: &str, value: Option<&Value>) {
        if let Some(tag) = value.and_then(coerce_tag) {
            self.tags.insert(key.to_string(), tag);
        }
    }

    /// Set a field from a raw JSON value, skipping values that are not numeric.
    pub fn set_field_from(&mut self, key: &str, value: Option<&Value>) {
        if let Some(field) = value.and_then(coerce_field) {
            self.fields.insert(key.to_string(), field);
        }
    }

    /// Measurement name.
    #[must_use]
    pub fn measurement(&self) -> &str {
        &self.measurement
    }

    /// All tags, ordered by key.
    #[must_use]
    pub const fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    /// All fields, ordered by key.
    #[must_use]
    pub const fn fields(&self) -> &BTreeMap<String, f64> {
        &self.fields
    }

    /// Look up a tag.
    #[must_use]
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// Look up a field.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<f64> {
        self.fields.get(key).copied()
    }

    /// Whether the record carries at least one field.
    #[must_use]
    pub fn has_fields(&self) -> bool {
        !self.fields.is_empty()
    }

    /// Record timestamp (millisecond precision).
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Timestamp as ISO-8601 UTC, e.g. `2021-01-01T00:00:00.123Z`.
    #[must_use]
    pub fn timestamp_iso(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

// =============================================================================
// Coercion
// =============================================================================

/// Coerce a raw value into a tag string.
#[must_use]
pub fn coerce_tag(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Coerce a raw value into a finite float.
#[must_use]
pub fn coerce_field(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

/// Parse an exchange timestamp into UTC.
///
/// Accepts RFC 3339 strings (`2021-01-01T00:00:00.123456+00:00`) and numeric
/// Unix seconds with an optional fractional part.
#[must_use]
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|dt| truncate_to_millis(dt.with_timezone(&Utc))),
        Value::Number(n) => {
            let secs = n.as_f64().filter(|v| v.is_finite())?;
            #[allow(clippy::cast_possible_truncation)]
            let millis = (secs * 1000.0).round() as i64;
            DateTime::from_timestamp_millis(millis)
        }
        _ => None,
    }
}

fn truncate_to_millis(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    timestamp
        .duration_trunc(TimeDelta::milliseconds(1))
        .unwrap_or(timestamp)
}
