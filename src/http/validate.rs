//! Boundary validation turning a JSON body into a [`Reading`].

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Value};

use super::error::ApiError;
use crate::analytics::round_to;
use crate::state::{Reading, TIMESTAMP_FORMAT, format_timestamp, parse_timestamp};

const ID_MAX_CHARS: usize = 50;
const LEVEL_RANGE: (f64, f64) = (0.0, 100.0);
const FLOW_RANGE: (f64, f64) = (0.0, 100.0);

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

pub fn validate_reading(body: &Value, now: DateTime<Utc>) -> Result<Reading, ApiError> {
    let object = match body.as_object() {
        Some(object) if !object.is_empty() => object,
        _ => return Err(ApiError::validation("Request body must be valid JSON")),
    };

    let device_id = required_id(object, "device_id")?;
    let tank_id = required_id(object, "tank_id")?;
    let water_level_percent = bounded_number(object, "water_level_percent", LEVEL_RANGE)?;
    let flow_rate_lpm = bounded_number(object, "flow_rate_lpm", FLOW_RANGE)?;

    let timestamp = match object.get("timestamp") {
        None | Some(Value::Null) => format_timestamp(now),
        Some(Value::String(raw)) if raw.is_empty() => format_timestamp(now),
        Some(Value::String(raw)) => normalize_timestamp(raw).ok_or_else(|| {
            ApiError::invalid_field(
                "timestamp",
                format!("timestamp must be in ISO format or {TIMESTAMP_FORMAT}"),
            )
        })?,
        Some(_) => {
            return Err(ApiError::invalid_field(
                "timestamp",
                "timestamp must be a string",
            ));
        }
    };

    Ok(Reading {
        device_id,
        tank_id,
        water_level_percent,
        flow_rate_lpm,
        timestamp,
    })
}

fn required_id(object: &Map<String, Value>, field: &'static str) -> Result<String, ApiError> {
    let raw = match object.get(field) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(Value::String(s)) => Some(s),
        Some(_) => {
            return Err(ApiError::invalid_field(
                field,
                format!("{field} must be a string"),
            ));
        }
    };
    let raw = raw.ok_or_else(|| ApiError::invalid_field(field, format!("{field} is required")))?;

    if raw.chars().count() > ID_MAX_CHARS {
        return Err(ApiError::invalid_field(
            field,
            format!("{field} must be at most {ID_MAX_CHARS} characters"),
        ));
    }
    Ok(raw.trim().to_string())
}

fn bounded_number(
    object: &Map<String, Value>,
    field: &'static str,
    (min, max): (f64, f64),
) -> Result<f64, ApiError> {
    let value = match object.get(field) {
        None | Some(Value::Null) => {
            return Err(ApiError::invalid_field(field, format!("{field} is required")));
        }
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    }
    .ok_or_else(|| ApiError::invalid_field(field, format!("{field} must be a number")))?;

    // NaN fails the range check as well.
    if !(min..=max).contains(&value) {
        return Err(ApiError::invalid_field(
            field,
            format!("{field} must be between {min} and {max}"),
        ));
    }
    Ok(round_to(value, 2))
}

/// Accept RFC 3339, naive ISO-8601 (read as UTC), a bare date, or the
/// canonical format; emit the canonical format.
fn normalize_timestamp(raw: &str) -> Option<String> {
    if let Some(ts) = parse_timestamp(raw) {
        return Some(format_timestamp(ts));
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(format_timestamp(ts.with_timezone(&Utc)));
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(format_timestamp(naive.and_utc()));
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| format_timestamp(naive.and_utc()))
}
