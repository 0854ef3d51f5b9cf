use crate::error::TimestampError;
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, UtcOffset};

/// Epoch seconds for a timestamp that must already be normalized to UTC.
/// Any other offset is rejected rather than converted.
pub fn epoch_seconds_utc(dt: &OffsetDateTime, context: &str) -> Result<i64, TimestampError> {
    if dt.offset() != UtcOffset::UTC {
        return Err(TimestampError::NotUtc {
            context: context.to_string(),
            value: format_rfc3339(dt),
            offset: dt.offset().to_string(),
        });
    }
    Ok(dt.unix_timestamp())
}

/// UTC datetime for an epoch-seconds value.
pub fn datetime_from_epoch(epoch: i64, context: &str) -> Result<OffsetDateTime, TimestampError> {
    OffsetDateTime::from_unix_timestamp(epoch)
        .map_err(|_| TimestampError::OutOfRange { context: context.to_string(), epoch })
}

/// Read `created_utc` as dumped by Reddit: integer, float, or a numeric string.
pub fn created_utc_from_value(v: &Value, context: &str) -> Result<i64, TimestampError> {
    let unreadable = || TimestampError::Unreadable { context: context.to_string(), value: v.to_string() };
    match v {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(i)
            } else {
                n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64).ok_or_else(unreadable)
            }
        }
        Value::String(s) => {
            let s = s.trim();
            if let Ok(i) = s.parse::<i64>() {
                return Ok(i);
            }
            s.parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(|f| f.trunc() as i64)
                .ok_or_else(unreadable)
        }
        _ => Err(unreadable()),
    }
}

pub fn format_rfc3339(dt: &OffsetDateTime) -> String {
    dt.format(&Rfc3339).unwrap_or_else(|_| dt.unix_timestamp().to_string())
}
