//! Calendar view of `Time` values, which are stored as seconds since the
//! Unix epoch.

use time::macros::format_description;
use time::{Duration, OffsetDateTime};

use crate::RuntimeError;

/// The UTC date and time `secs` seconds after the epoch.
pub fn utc_datetime(secs: f64) -> Result<OffsetDateTime, RuntimeError> {
    let out_of_range = || RuntimeError::TimeOutOfRange(secs);
    if !secs.is_finite() {
        return Err(out_of_range());
    }
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9).round() as i64;
    OffsetDateTime::from_unix_timestamp(whole as i64)
        .map_err(|_| out_of_range())?
        .checked_add(Duration::nanoseconds(nanos))
        .ok_or_else(out_of_range)
}

/// Seconds since the epoch of the current wall-clock time.
pub fn now_secs() -> f64 {
    let now = OffsetDateTime::now_utc();
    now.unix_timestamp() as f64 + f64::from(now.nanosecond()) / 1e9
}

/// `YYYY-MM-DD HH:MM:SS UTC`, with fractional seconds dropped.
pub(crate) fn format_time(secs: f64) -> Result<String, RuntimeError> {
    utc_datetime(secs)?
        .format(format_description!(
            "[year]-[month]-[day] [hour]:[minute]:[second] UTC"
        ))
        .map_err(|err| RuntimeError::Inspect {
            type_name: "Time".to_owned(),
            message: err.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use time::{Month, Weekday};

    use crate::Value;

    #[test]
    fn renders_in_utc() {
        assert_eq!(format_time(0.0).unwrap(), "1970-01-01 00:00:00 UTC");
        assert_eq!(format_time(1_700_000_000.5).unwrap(), "2023-11-14 22:13:20 UTC");
        assert_eq!(format_time(-0.5).unwrap(), "1969-12-31 23:59:59 UTC");
    }

    #[test]
    fn calendar_fields_keep_subsecond_precision() {
        let t = utc_datetime(1_614_834_367.25).unwrap();
        assert_eq!((t.year(), t.month(), t.day()), (2021, Month::March, 4));
        assert_eq!((t.hour(), t.minute(), t.second()), (5, 6, 7));
        assert_eq!(t.millisecond(), 250);
        assert_eq!(t.weekday(), Weekday::Thursday);
    }

    #[test]
    fn unrepresentable_times_are_errors() {
        assert!(utc_datetime(f64::NAN).is_err());
        assert!(utc_datetime(f64::INFINITY).is_err());
        assert!(utc_datetime(1e300).is_err());
        assert!(Value::Time(1e300).inspect().is_err());
    }
}
