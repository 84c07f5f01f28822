use std::fmt::Write as _;

use peek_runtime::{now_secs, utc_datetime, Value};
use time::OffsetDateTime;

use super::{arity, comparable, display, float_of, object, runtime_error, str_arg};
use crate::ast::Block;
use crate::interpreter::{raise, Flow, Interpreter};

pub(super) fn call(
    interp: &mut Interpreter<'_>,
    receiver: &Value,
    secs: f64,
    name: &str,
    args: &[Value],
    block: Option<&Block>,
) -> Flow<Value> {
    if let Some(result) = comparable(receiver, name, args) {
        return result;
    }
    let calendar = || utc_datetime(secs).map_err(runtime_error);
    let value = match name {
        "year" => Value::Int(i64::from(calendar()?.year())),
        "month" | "mon" => Value::Int(i64::from(u8::from(calendar()?.month()))),
        "day" | "mday" => Value::Int(i64::from(calendar()?.day())),
        "yday" => Value::Int(i64::from(calendar()?.ordinal())),
        "hour" => Value::Int(i64::from(calendar()?.hour())),
        "min" => Value::Int(i64::from(calendar()?.minute())),
        "sec" => Value::Int(i64::from(calendar()?.second())),
        "wday" => Value::Int(i64::from(calendar()?.weekday().number_days_from_sunday())),
        "usec" => Value::Int(i64::from(calendar()?.microsecond())),
        "nsec" => Value::Int(i64::from(calendar()?.nanosecond())),
        "to_i" => Value::Int(secs.floor() as i64),
        "to_f" => Value::Float(secs),
        "to_s" | "inspect" => Value::str(display(receiver)?),
        "utc" | "getutc" | "gmtime" => receiver.clone(),
        "utc?" | "gmt?" => Value::Bool(true),
        "zone" => Value::str("UTC"),
        "+" => {
            arity(args, 1..=1)?;
            let delta = seconds_arg(&args[0])?;
            Value::Time(secs + delta)
        }
        "-" => {
            arity(args, 1..=1)?;
            match &args[0] {
                Value::Time(other) => Value::Float(secs - other),
                other => Value::Time(secs - seconds_arg(other)?),
            }
        }
        "strftime" => {
            arity(args, 1..=1)?;
            Value::str(strftime(&str_arg(&args[0])?, &calendar()?))
        }
        _ => return object::call(interp, receiver, name, args, block),
    };
    Ok(value)
}

fn seconds_arg(value: &Value) -> Flow<f64> {
    float_of(value).ok_or_else(|| {
        raise(
            "TypeError",
            format!("can't convert {} into an exact number", value.type_name()),
        )
    })
}

/// `Time.now` and `Time.at`.
pub(super) fn call_class(name: &str, args: &[Value]) -> Flow<Value> {
    match name {
        "now" => {
            arity(args, 0..=0)?;
            Ok(Value::Time(now_secs()))
        }
        "at" => {
            arity(args, 1..=1)?;
            match &args[0] {
                Value::Time(secs) => Ok(Value::Time(*secs)),
                other => Ok(Value::Time(seconds_arg(other)?)),
            }
        }
        _ => Err(raise(
            "NoMethodError",
            format!("undefined method `{name}' for class Time"),
        )),
    }
}

fn strftime(format: &str, t: &OffsetDateTime) -> String {
    let mut out = String::with_capacity(format.len() + 16);
    let mut chars = format.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let _ = match chars.next() {
            Some('Y') => write!(out, "{}", t.year()),
            Some('y') => write!(out, "{:02}", t.year().rem_euclid(100)),
            Some('m') => write!(out, "{:02}", u8::from(t.month())),
            Some('d') => write!(out, "{:02}", t.day()),
            Some('e') => write!(out, "{:>2}", t.day()),
            Some('j') => write!(out, "{:03}", t.ordinal()),
            Some('H') => write!(out, "{:02}", t.hour()),
            Some('I') => write!(out, "{:02}", (t.hour() + 11) % 12 + 1),
            Some('p') => write!(out, "{}", if t.hour() < 12 { "AM" } else { "PM" }),
            Some('M') => write!(out, "{:02}", t.minute()),
            Some('S') => write!(out, "{:02}", t.second()),
            Some('L') => write!(out, "{:03}", t.millisecond()),
            Some('N') => write!(out, "{:09}", t.nanosecond()),
            Some('z') => write!(out, "+0000"),
            Some('Z') => write!(out, "UTC"),
            Some('A') => write!(out, "{}", t.weekday()),
            Some('a') => write!(out, "{:.3}", t.weekday().to_string()),
            Some('u') => write!(out, "{}", t.weekday().number_from_monday()),
            Some('w') => write!(out, "{}", t.weekday().number_days_from_sunday()),
            Some('B') => write!(out, "{}", t.month()),
            Some('b') => write!(out, "{:.3}", t.month().to_string()),
            Some('s') => write!(out, "{}", t.unix_timestamp()),
            Some('%') => write!(out, "%"),
            Some(other) => write!(out, "%{other}"),
            None => write!(out, "%"),
        };
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn strftime_directives() {
        // 2021-03-04 05:06:07.250 UTC, a Thursday.
        let t = utc_datetime(1_614_834_367.25).unwrap();
        assert_eq!(
            strftime("%Y-%m-%d %H:%M:%S.%L %Z", &t),
            "2021-03-04 05:06:07.250 UTC"
        );
        assert_eq!(strftime("%a %b %e, 100%%", &t), "Thu Mar  4, 100%");
        assert_eq!(strftime("%A %B %j %I%p %u/%w", &t), "Thursday March 063 05AM 4/4");
        assert_eq!(strftime("%s", &t), "1614834367");
        assert_eq!(strftime("%Q", &t), "%Q");
    }

    #[test]
    fn time_at_accepts_numbers_only() {
        assert!(matches!(call_class("at", &[Value::Int(0)]), Ok(Value::Time(t)) if t == 0.0));
        assert!(call_class("at", &[Value::str("0")]).is_err());
        assert!(call_class("parse", &[]).is_err());
    }
}
