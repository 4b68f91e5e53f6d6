//! Conversion between local times and the REST API's timestamp strings.
//!
//! The API speaks `YYYY-MM-DDTHH:MM:SS` with no offset; by convention those values are UTC.

use std::time::SystemTime;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

use crate::error::{Result, WpError};

pub const REMOTE_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

const REMOTE_TIMESTAMP_LEN: usize = 19;

pub fn parse_remote_timestamp(s: &str) -> Result<NaiveDateTime> {
    // chrono accepts unpadded fields; the wire format does not.
    if s.len() != REMOTE_TIMESTAMP_LEN {
        return Err(WpError::Format(format!(
            "{s:?} does not match {REMOTE_TIMESTAMP_FORMAT}"
        )));
    }
    NaiveDateTime::parse_from_str(s, REMOTE_TIMESTAMP_FORMAT)
        .map_err(|e| WpError::Format(format!("{s:?}: {e}")))
}

pub fn format_remote_timestamp(dt: &NaiveDateTime) -> String {
    dt.format(REMOTE_TIMESTAMP_FORMAT).to_string()
}

pub fn system_time_to_utc(t: SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(t)
}

/// Remote-format string for a local file time, truncated to whole seconds.
pub fn format_system_time(t: SystemTime) -> String {
    format_remote_timestamp(&system_time_to_utc(t).naive_utc())
}

/// Normalises a metadata value holding a date into the remote format.
///
/// Accepts the remote format itself, `YYYY-MM-DD HH:MM:SS`, RFC 3339 (converted to UTC)
/// and bare dates (midnight).
pub fn normalize_timestamp(value: &Value) -> Result<String> {
    let raw = match value {
        Value::String(s) => s.trim(),
        other => {
            return Err(WpError::Format(format!(
                "expected a date string, got {other}"
            )))
        }
    };

    if let Ok(dt) = parse_remote_timestamp(raw) {
        return Ok(format_remote_timestamp(&dt));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(format_remote_timestamp(&dt));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(format_remote_timestamp(&dt.with_timezone(&Utc).naive_utc()));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(dt) = date.and_hms_opt(0, 0, 0) {
            return Ok(format_remote_timestamp(&dt));
        }
    }
    Err(WpError::Format(format!("unrecognised date {raw:?}")))
}
