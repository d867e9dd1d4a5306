use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::value::{parse_timestamp, FieldValue};

/// Largest offset accepted in a relative expression, in units.
const MAX_OFFSET_UNITS: i64 = 100_000;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TimeExprError {
    #[error("`{0}` is neither a timestamp nor a relative time expression")]
    Unrecognised(String),
    #[error("unsupported time unit `{unit}` in `{expression}`")]
    UnknownUnit { expression: String, unit: String },
    #[error("time offset in `{0}` is out of range")]
    OutOfRange(String),
    #[error("{0} value cannot be used as a point in time")]
    NotTemporal(&'static str),
}

/// Whether `raw` is a relative expression such as `24_hours_from_now`.
pub fn is_relative(raw: &str) -> bool {
    let raw = raw.trim().to_ascii_lowercase();
    matches!(raw.as_str(), "now" | "today" | "tomorrow" | "yesterday")
        || raw.ends_with("_from_now")
        || raw.ends_with("_ago")
}

/// Resolves an RFC 3339 instant, a `YYYY-MM-DD` date, or a relative expression
/// (`now`, `today`, `3_days_ago`, `24_hours_from_now`) against `now`.
pub fn resolve(raw: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, TimeExprError> {
    if let Some(instant) = parse_timestamp(raw) {
        return Ok(instant);
    }

    let expression = raw.trim().to_ascii_lowercase();
    let start_of_day = |instant: DateTime<Utc>| {
        instant.date_naive().and_hms_opt(0, 0, 0).map(|naive| naive.and_utc()).unwrap_or(instant)
    };

    match expression.as_str() {
        "now" => return Ok(now),
        "today" => return Ok(start_of_day(now)),
        "tomorrow" => return shift(now, 1, 24 * 60, raw).map(start_of_day),
        "yesterday" => return shift(now, -1, 24 * 60, raw).map(start_of_day),
        _ => {}
    }

    let (body, sign) = if let Some(body) = expression.strip_suffix("_from_now") {
        (body, 1)
    } else if let Some(body) = expression.strip_suffix("_ago") {
        (body, -1)
    } else {
        return Err(TimeExprError::Unrecognised(raw.to_owned()));
    };

    let (amount, unit) =
        body.split_once('_').ok_or_else(|| TimeExprError::Unrecognised(raw.to_owned()))?;
    let amount =
        amount.parse::<i64>().map_err(|_| TimeExprError::Unrecognised(raw.to_owned()))?;
    if !(0..=MAX_OFFSET_UNITS).contains(&amount) {
        return Err(TimeExprError::OutOfRange(raw.to_owned()));
    }

    let minutes_per_unit = match unit {
        "minute" | "minutes" => 1,
        "hour" | "hours" => 60,
        "day" | "days" => 24 * 60,
        "week" | "weeks" => 7 * 24 * 60,
        other => {
            return Err(TimeExprError::UnknownUnit {
                expression: raw.to_owned(),
                unit: other.to_owned(),
            })
        }
    };

    shift(now, sign * amount, minutes_per_unit, raw)
}

/// Resolves a comparison value: timestamps pass through, text goes through [`resolve`].
pub fn resolve_value(
    value: &FieldValue,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, TimeExprError> {
    match value {
        FieldValue::Timestamp(instant) => Ok(*instant),
        FieldValue::String(raw) => resolve(raw, now),
        other => Err(TimeExprError::NotTemporal(other.type_name())),
    }
}

fn shift(
    now: DateTime<Utc>,
    units: i64,
    minutes_per_unit: i64,
    raw: &str,
) -> Result<DateTime<Utc>, TimeExprError> {
    now.checked_add_signed(Duration::minutes(units * minutes_per_unit))
        .ok_or_else(|| TimeExprError::OutOfRange(raw.to_owned()))
}
