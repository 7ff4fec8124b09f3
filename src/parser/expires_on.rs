use chrono::{NaiveDateTime, TimeDelta, Timelike, Utc};

use crate::error::{BrokerError, BrokerResult};

const EXPIRES_ON_DATE_FORMAT: &str = "%m/%d/%Y %H:%M:%S";
const EXPIRES_ON_UTC_OFFSET: &str = "+00:00";

/// Parse an `expires_on` value.
///
/// Accepts either a plain integer, returned unchanged, or a timestamp shaped like
/// `M/D/YYYY h:mm:ss [AM|PM] +00:00`, converted to the number of seconds from now
/// until that instant (rounded to the nearest second).
pub fn parse_expires_on(value: &str) -> BrokerResult<i64> {
    if let Ok(seconds) = value.parse::<i64>() {
        return Ok(seconds);
    }

    let expires_on = parse_expires_on_timestamp(value)?;
    let millis = (expires_on.and_utc() - Utc::now()).num_milliseconds();
    Ok((millis as f64 / 1000.0).round() as i64)
}

fn parse_expires_on_timestamp(value: &str) -> BrokerResult<NaiveDateTime> {
    let parts: Vec<&str> = value.split(' ').collect();
    let (date, time, meridiem, offset) = match parts.as_slice() {
        [date, time, offset] => (*date, *time, None, *offset),
        [date, time, meridiem, offset] => (*date, *time, Some(*meridiem), *offset),
        _ => return Err(BrokerError::parse(format!("unrecognized expires_on value '{}'", value))),
    };

    if offset != EXPIRES_ON_UTC_OFFSET {
        return Err(BrokerError::parse(format!(
            "expires_on '{}' must carry a {} offset",
            value, EXPIRES_ON_UTC_OFFSET
        )));
    }

    let parsed = NaiveDateTime::parse_from_str(&format!("{} {}", date, time), EXPIRES_ON_DATE_FORMAT)
        .map_err(|e| BrokerError::parse(format!("invalid expires_on '{}': {}", value, e)))?;

    // the hour is read on a 24h clock; a meridiem only shifts hours that are still ambiguous
    let hour = parsed.hour();
    let shifted = match meridiem {
        None => Some(parsed),
        Some("PM") if hour < 12 => parsed.checked_add_signed(TimeDelta::hours(12)),
        Some("PM") => Some(parsed),
        Some("AM") if hour == 12 => parsed.checked_sub_signed(TimeDelta::hours(12)),
        Some("AM") => Some(parsed),
        Some(other) => {
            return Err(BrokerError::parse(format!(
                "invalid meridiem '{}' in expires_on '{}'",
                other, value
            )))
        }
    };
    shifted.ok_or_else(|| BrokerError::parse(format!("expires_on '{}' is out of range", value)))
}
