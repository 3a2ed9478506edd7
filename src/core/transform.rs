use crate::domain::model::{RawRecord, TransformedRecord};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Timelike, Utc};
use serde_json::{Map, Value};
use thiserror::Error;

/// Numeric `born_at` above this is epoch milliseconds, otherwise epoch seconds.
pub const EPOCH_MILLIS_THRESHOLD: f64 = 1e10;

const AWARE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M%:z",
    "%Y-%m-%d %H:%M%:z",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

#[derive(Debug, Error, PartialEq)]
pub enum BornAtError {
    #[error("timestamp {0} is out of range")]
    OutOfRange(String),

    #[error("cannot parse '{0}' as ISO-8601")]
    Unparseable(String),

    #[error("unexpected born_at type: {0}")]
    UnexpectedType(&'static str),
}

/// Normalizes `friends` and `born_at`; every other field is copied as is.
///
/// Never fails: a `born_at` that cannot be interpreted keeps its raw value
/// and a warning is logged.
pub fn transform_record(raw: &RawRecord) -> TransformedRecord {
    let mut data = raw.data.clone();

    normalize_friends(&mut data);

    let replacement = match data.get("born_at") {
        Some(value) if is_truthy(value) => match normalize_born_at(value) {
            Ok(iso) => Some(iso),
            Err(e) => {
                tracing::warn!(
                    record_id = ?raw.id(),
                    error = %e,
                    "Failed to transform born_at, keeping raw value"
                );
                None
            }
        },
        _ => None,
    };
    if let Some(iso) = replacement {
        data.insert("born_at".to_string(), Value::String(iso));
    }

    TransformedRecord { data }
}

/// Splits a comma-delimited list, trimming pieces and dropping empty ones.
pub fn split_friends(friends: &str) -> Vec<String> {
    friends
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

fn normalize_friends(data: &mut Map<String, Value>) {
    let replacement = match data.get("friends") {
        Some(Value::String(s)) if !s.is_empty() => Some(split_friends(s)),
        // 已經是陣列（重複轉換）等其他有值的型別就不動
        Some(value) if is_truthy(value) => None,
        _ => Some(Vec::new()),
    };

    if let Some(friends) = replacement {
        data.insert(
            "friends".to_string(),
            Value::Array(friends.into_iter().map(Value::String).collect()),
        );
    }
}

/// Converts a numeric or string `born_at` to `YYYY-MM-DDTHH:MM:SS[.ffffff]+00:00`.
pub fn normalize_born_at(value: &Value) -> Result<String, BornAtError> {
    let instant = match value {
        Value::Number(n) => {
            if let Some(ts) = n.as_i64() {
                from_epoch_integer(ts)?
            } else {
                let ts = n
                    .as_f64()
                    .ok_or_else(|| BornAtError::OutOfRange(n.to_string()))?;
                from_epoch_float(ts)?
            }
        }
        Value::String(s) => {
            parse_iso8601(s).ok_or_else(|| BornAtError::Unparseable(s.clone()))?
        }
        Value::Null => return Err(BornAtError::UnexpectedType("null")),
        Value::Bool(_) => return Err(BornAtError::UnexpectedType("bool")),
        Value::Array(_) => return Err(BornAtError::UnexpectedType("array")),
        Value::Object(_) => return Err(BornAtError::UnexpectedType("object")),
    };

    Ok(format_utc(&instant))
}

fn from_epoch_integer(ts: i64) -> Result<DateTime<Utc>, BornAtError> {
    let instant = if (ts as f64) > EPOCH_MILLIS_THRESHOLD {
        DateTime::from_timestamp_millis(ts)
    } else {
        DateTime::from_timestamp(ts, 0)
    };
    instant.ok_or_else(|| BornAtError::OutOfRange(ts.to_string()))
}

fn from_epoch_float(ts: f64) -> Result<DateTime<Utc>, BornAtError> {
    let seconds = if ts > EPOCH_MILLIS_THRESHOLD {
        ts / 1000.0
    } else {
        ts
    };

    let micros = (seconds * 1_000_000.0).round();
    if !micros.is_finite() || micros.abs() >= i64::MAX as f64 {
        return Err(BornAtError::OutOfRange(ts.to_string()));
    }

    DateTime::from_timestamp_micros(micros as i64)
        .ok_or_else(|| BornAtError::OutOfRange(ts.to_string()))
}

/// 結尾的 `Z` 視為 `+00:00`；沒有時區的時間當作 UTC
pub fn parse_iso8601(input: &str) -> Option<DateTime<Utc>> {
    let trimmed = input.trim();
    let normalized = match trimmed.strip_suffix('Z').or_else(|| trimmed.strip_suffix('z')) {
        Some(head) => format!("{}+00:00", head),
        None => trimmed.to_string(),
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(&normalized) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in AWARE_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(&normalized, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&normalized, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(&normalized, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Microsecond precision; the fraction is only written when non-zero.
pub fn format_utc(instant: &DateTime<Utc>) -> String {
    let micros = instant.timestamp_subsec_micros();
    let instant = instant.with_nanosecond(micros * 1000).unwrap_or(*instant);

    if micros == 0 {
        instant.format("%Y-%m-%dT%H:%M:%S+00:00").to_string()
    } else {
        instant.format("%Y-%m-%dT%H:%M:%S%.6f+00:00").to_string()
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
    }
}
