//! InfluxDB line protocol encoding.

use std::fmt::Write;

use crate::domain::record::TimeSeriesRecord;

/// Encode one record as a line, or `None` if it has no fields.
///
/// Timestamps are in milliseconds; empty tag values are omitted.
#[must_use]
pub fn encode_record(record: &TimeSeriesRecord) -> Option<String> {
    if !record.has_fields() {
        return None;
    }

    let mut line = escape(record.measurement(), &[',', ' ']);
    for (key, value) in record.tags() {
        if value.is_empty() {
            continue;
        }
        let _ = write!(line, ",{}={}", escape_key(key), escape_key(value));
    }

    let fields: Vec<String> = record
        .fields()
        .iter()
        .map(|(key, value)| format!("{}={value}", escape_key(key)))
        .collect();
    let _ = write!(
        line,
        " {} {}",
        fields.join(","),
        record.timestamp().timestamp_millis()
    );
    Some(line)
}

/// Encode a batch, one line per record with fields.
#[must_use]
pub fn encode_batch(records: &[TimeSeriesRecord]) -> String {
    records
        .iter()
        .filter_map(encode_record)
        .collect::<Vec<_>>()
        .join("\n")
}

fn escape_key(value: &str) -> String {
    escape(value, &[',', '=', ' '])
}

fn escape(value: &str, special: &[char]) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if special.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
