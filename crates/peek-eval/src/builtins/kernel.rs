//! Functions callable without a receiver (`format`, `Integer()`, `loop`).
//!
//! Recognised names include the dangerous ones (`system`, `puts`, `exit`)
//! so that calling them reports a rejected native call rather than an
//! undefined method.

use peek_runtime::Value;

use super::{arity, check_built_len, conversion_error, display, inspect, str_arg};
use crate::ast::Block;
use crate::interpreter::{raise, Flow, Interpreter, Interrupt};

const FUNCTIONS: &[&str] = &[
    "format",
    "sprintf",
    "Integer",
    "Float",
    "String",
    "Array",
    "loop",
    "puts",
    "print",
    "p",
    "pp",
    "system",
    "exec",
    "spawn",
    "fork",
    "exit",
    "exit!",
    "abort",
    "sleep",
    "require",
    "require_relative",
    "load",
    "open",
    "gets",
    "raise",
    "fail",
    "rand",
    "srand",
    "trap",
    "at_exit",
    "caller",
    "`",
];

pub(crate) fn is_function(name: &str) -> bool {
    FUNCTIONS.contains(&name)
}

pub(crate) fn call(
    interp: &mut Interpreter<'_>,
    name: &str,
    args: &[Value],
    block: Option<&Block>,
) -> Flow<Value> {
    match name {
        "format" | "sprintf" => {
            let Some((template, rest)) = args.split_first() else {
                return Err(raise("ArgumentError", "too few arguments"));
            };
            Ok(Value::str(format(&str_arg(template)?, rest)?))
        }
        "Integer" => {
            arity(args, 1..=2)?;
            let base = match args.get(1) {
                Some(Value::Int(base)) => Some(*base),
                Some(other) => return Err(conversion_error(other, "Integer")),
                None => None,
            };
            to_integer(&args[0], base).map(Value::Int)
        }
        "Float" => {
            arity(args, 1..=1)?;
            to_float(&args[0]).map(Value::Float)
        }
        "String" => {
            arity(args, 1..=1)?;
            Ok(Value::str(interp.to_s(&args[0])?))
        }
        "Array" => {
            arity(args, 1..=1)?;
            Ok(match &args[0] {
                Value::Nil => Value::array(Vec::new()),
                Value::Array(_) => args[0].clone(),
                Value::Hash(heap) => Value::array(
                    heap.snapshot()
                        .into_iter()
                        .map(|(key, value)| Value::array(vec![key, value]))
                        .collect(),
                ),
                Value::Range(range) => {
                    check_built_len(usize::try_from(range.len()).unwrap_or(usize::MAX))?;
                    Value::array(range.iter().map(Value::Int).collect())
                }
                other => Value::array(vec![other.clone()]),
            })
        }
        "loop" => {
            let Some(block) = block else {
                return Err(raise("LocalJumpError", "no block given (yield)"));
            };
            // Ends only by unwinding; `break` is caught by the enclosing call.
            loop {
                interp.yield_block(block, &[])?;
            }
        }
        _ => Err(raise(
            "NoMethodError",
            format!("undefined method `{name}' for main:Object"),
        )),
    }
}

fn invalid_value(kind: &str, value: &str) -> Interrupt {
    raise(
        "ArgumentError",
        format!("invalid value for {kind}(): {value:?}"),
    )
}

/// Strict `Integer()` conversion.
fn to_integer(value: &Value, base: Option<i64>) -> Flow<i64> {
    match value {
        Value::Int(n) => Ok(*n),
        Value::Float(f) if f.is_finite() => {
            let truncated = f.trunc();
            if truncated < i64::MIN as f64 || truncated >= i64::MAX as f64 {
                return Err(raise("RangeError", "integer overflow"));
            }
            Ok(truncated as i64)
        }
        Value::Float(f) => Err(raise("FloatDomainError", inspect(&Value::Float(*f))?)),
        Value::Str(text) => {
            parse_integer_literal(text, base).ok_or_else(|| invalid_value("Integer", text))
        }
        Value::Nil => Err(raise("TypeError", "can't convert nil into Integer")),
        other => Err(conversion_error(other, "Integer")),
    }
}

fn parse_integer_literal(text: &str, base: Option<i64>) -> Option<i64> {
    let trimmed = text.trim();
    let (negative, digits) = match trimmed.as_bytes().first()? {
        b'-' => (true, &trimmed[1..]),
        b'+' => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let lower = digits.to_ascii_lowercase();
    let (radix, body) = match (base, lower.as_bytes()) {
        (Some(base), _) if !(2..=36).contains(&base) => return None,
        (None | Some(16), [b'0', b'x', ..]) => (16, &digits[2..]),
        (None | Some(2), [b'0', b'b', ..]) => (2, &digits[2..]),
        (None | Some(8), [b'0', b'o', ..]) => (8, &digits[2..]),
        (None, [b'0', _, ..]) => (8, &digits[1..]),
        (Some(base), _) => (base as u32, digits),
        (None, _) => (10, digits),
    };
    if body.is_empty()
        || body.starts_with(['_', '+', '-'])
        || body.ends_with('_')
        || body.contains("__")
    {
        return None;
    }
    let cleaned: String = body.chars().filter(|c| *c != '_').collect();
    let magnitude = i128::from_str_radix(&cleaned, radix).ok()?;
    let signed = if negative { -magnitude } else { magnitude };
    i64::try_from(signed).ok()
}

/// Strict `Float()` conversion.
fn to_float(value: &Value) -> Flow<f64> {
    match value {
        Value::Int(n) => Ok(*n as f64),
        Value::Float(f) => Ok(*f),
        Value::Str(text) => {
            let trimmed = text.trim();
            let valid = !trimmed.is_empty()
                && trimmed
                    .chars()
                    .all(|c| c.is_ascii_digit() || matches!(c, '.' | '_' | 'e' | 'E' | '+' | '-'))
                && !trimmed.starts_with('_')
                && !trimmed.contains("__")
                && trimmed.chars().any(|c| c.is_ascii_digit());
            let parsed = valid
                .then(|| trimmed.replace('_', "").parse::<f64>().ok())
                .flatten();
            parsed.ok_or_else(|| invalid_value("Float", text))
        }
        Value::Nil => Err(raise("TypeError", "can't convert nil into Float")),
        other => Err(conversion_error(other, "Float")),
    }
}

#[derive(Default)]
struct Spec {
    left: bool,
    plus: bool,
    space: bool,
    zero: bool,
    alternate: bool,
    width: usize,
    precision: Option<usize>,
}

/// Ruby `format`/`sprintf` for the common conversions.
pub(super) fn format(template: &str, args: &[Value]) -> Flow<String> {
    let mut out = String::with_capacity(template.len());
    let mut remaining = args.iter();
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        if chars.peek() == Some(&'%') {
            chars.next();
            out.push('%');
            continue;
        }
        let mut spec = Spec::default();
        while let Some(flag) = chars.peek() {
            match flag {
                '-' => spec.left = true,
                '+' => spec.plus = true,
                ' ' => spec.space = true,
                '0' => spec.zero = true,
                '#' => spec.alternate = true,
                _ => break,
            }
            chars.next();
        }
        spec.width = read_number(&mut chars);
        if chars.peek() == Some(&'.') {
            chars.next();
            spec.precision = Some(read_number(&mut chars));
        }
        check_built_len(spec.width)?;
        let Some(conversion) = chars.next() else {
            return Err(raise(
                "ArgumentError",
                "incomplete format specifier; use %% (double %) instead",
            ));
        };
        let arg = remaining
            .next()
            .ok_or_else(|| raise("ArgumentError", "too few arguments"))?;
        let (sign, body, numeric) = convert(conversion, arg, &spec)?;
        pad(&mut out, &spec, &sign, &body, numeric);
        check_built_len(out.len())?;
    }
    Ok(out)
}

fn read_number(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> usize {
    let mut n: usize = 0;
    while let Some(digit) = chars.peek().and_then(|c| c.to_digit(10)) {
        n = n.saturating_mul(10).saturating_add(digit as usize);
        chars.next();
    }
    n
}

/// Render one argument. Returns the sign prefix, the body and whether zero
/// padding applies.
fn convert(conversion: char, arg: &Value, spec: &Spec) -> Flow<(String, String, bool)> {
    let sign_of = |negative: bool| {
        if negative {
            "-".to_owned()
        } else if spec.plus {
            "+".to_owned()
        } else if spec.space {
            " ".to_owned()
        } else {
            String::new()
        }
    };
    let result = match conversion {
        'd' | 'i' | 'u' => {
            let n = to_integer(arg, None)?;
            (sign_of(n < 0), n.unsigned_abs().to_string(), true)
        }
        'x' | 'X' | 'o' | 'b' | 'B' => {
            let n = to_integer(arg, None)?;
            let magnitude = n.unsigned_abs();
            let (digits, prefix) = match conversion {
                'x' => (format!("{magnitude:x}"), "0x"),
                'X' => (format!("{magnitude:X}"), "0X"),
                'o' => (format!("{magnitude:o}"), "0"),
                'b' => (format!("{magnitude:b}"), "0b"),
                _ => (format!("{magnitude:b}"), "0B"),
            };
            let mut sign = sign_of(n < 0);
            if spec.alternate && magnitude != 0 {
                sign.push_str(prefix);
            }
            (sign, digits, true)
        }
        'f' | 'e' | 'E' | 'g' | 'G' => {
            let x = to_float(arg)?;
            if !x.is_finite() {
                let body = if x.is_nan() { "NaN" } else { "Inf" };
                (sign_of(x < 0.0), body.to_owned(), false)
            } else {
                let precision = spec.precision.unwrap_or(6);
                let body = match conversion {
                    'f' => format!("{:.*}", precision, x.abs()),
                    'e' | 'E' => exponent(x.abs(), precision, conversion == 'E'),
                    _ => general(x.abs(), precision, conversion == 'G', spec.alternate),
                };
                (sign_of(x.is_sign_negative() && x != 0.0), body, true)
            }
        }
        's' | 'p' => {
            let mut body = if conversion == 's' { display(arg)? } else { inspect(arg)? };
            if let Some(precision) = spec.precision {
                body = body.chars().take(precision).collect();
            }
            (String::new(), body, false)
        }
        'c' => {
            let body = match arg {
                Value::Int(n) => u32::try_from(*n)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| raise("RangeError", format!("{n} out of char range")))?
                    .to_string(),
                Value::Str(text) => text.chars().take(1).collect(),
                other => return Err(conversion_error(other, "Integer")),
            };
            (String::new(), body, false)
        }
        other => {
            return Err(raise(
                "ArgumentError",
                format!("malformed format string - %{other}"),
            ))
        }
    };
    Ok(result)
}

/// `%e`: mantissa with `precision` digits, exponent with sign and at least
/// two digits.
fn exponent(x: f64, precision: usize, upper: bool) -> String {
    let rendered = format!("{:.*e}", precision, x);
    let (mantissa, exp) = rendered.split_once('e').unwrap_or((&rendered, "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    let sign = if exp < 0 { '-' } else { '+' };
    let marker = if upper { 'E' } else { 'e' };
    format!("{mantissa}{marker}{sign}{:02}", exp.abs())
}

/// `%g`: `%e` or `%f`, whichever C would pick, without trailing zeros.
fn general(x: f64, precision: usize, upper: bool, keep_zeros: bool) -> String {
    let precision = precision.max(1);
    let exp = if x == 0.0 {
        0
    } else {
        let rendered = format!("{:.*e}", precision - 1, x);
        rendered
            .split_once('e')
            .and_then(|(_, exp)| exp.parse::<i32>().ok())
            .unwrap_or(0)
    };
    let body = if exp < -4 || exp >= precision as i32 {
        exponent(x, precision - 1, upper)
    } else {
        let decimals = (precision as i32 - 1 - exp).max(0) as usize;
        format!("{:.*}", decimals, x)
    };
    if keep_zeros {
        return body;
    }
    match body.split_once(['e', 'E']) {
        Some((mantissa, exp)) => {
            let marker = if upper { 'E' } else { 'e' };
            format!("{}{marker}{exp}", strip_zeros(mantissa))
        }
        None => strip_zeros(&body).to_owned(),
    }
}

fn strip_zeros(body: &str) -> &str {
    if body.contains('.') {
        body.trim_end_matches('0').trim_end_matches('.')
    } else {
        body
    }
}

fn pad(out: &mut String, spec: &Spec, sign: &str, body: &str, numeric: bool) {
    let len = sign.chars().count() + body.chars().count();
    let fill = spec.width.saturating_sub(len);
    if spec.left {
        out.push_str(sign);
        out.push_str(body);
        out.extend(std::iter::repeat(' ').take(fill));
    } else if spec.zero && numeric {
        out.push_str(sign);
        out.extend(std::iter::repeat('0').take(fill));
        out.push_str(body);
    } else {
        out.extend(std::iter::repeat(' ').take(fill));
        out.push_str(sign);
        out.push_str(body);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn fmt(template: &str, args: &[Value]) -> String {
        format(template, args).unwrap()
    }

    #[test]
    fn integer_conversions() {
        assert_eq!(fmt("%d items", &[Value::Int(3)]), "3 items");
        assert_eq!(
            fmt("%05d|%-4d|%+d", &[Value::Int(-42), Value::Int(7), Value::Int(7)]),
            "-0042|7   |+7"
        );
        let ints = [Value::Int(255), Value::Int(255), Value::Int(8), Value::Int(5)];
        assert_eq!(fmt("%x %#X %o %b", &ints), "ff 0XFF 10 101");
        assert_eq!(fmt("%c%c", &[Value::Int(72), Value::str("iya")]), "Hi");
    }

    #[test]
    fn float_conversions() {
        assert_eq!(fmt("%.2f", &[Value::Float(3.14159)]), "3.14");
        assert_eq!(fmt("%8.3f", &[Value::Int(2)]), "   2.000");
        assert_eq!(fmt("%e", &[Value::Float(12345.678)]), "1.234568e+04");
        assert_eq!(fmt("%.1E", &[Value::Float(0.00012)]), "1.2E-04");
        assert_eq!(fmt("%g", &[Value::Float(0.0001)]), "0.0001");
        assert_eq!(fmt("%g", &[Value::Float(123456789.0)]), "1.23457e+08");
        assert_eq!(fmt("%g", &[Value::Float(2.5)]), "2.5");
    }

    #[test]
    fn strings_and_errors() {
        assert_eq!(fmt("%s and %p", &[Value::str("a"), Value::str("b")]), "a and \"b\"");
        assert_eq!(fmt("%-5s|%.2s", &[Value::symbol("ab"), Value::str("xyz")]), "ab   |xy");
        assert_eq!(fmt("100%%", &[]), "100%");
        assert!(format("%d %d", &[Value::Int(1)]).is_err());
        assert!(format("%d", &[Value::str("abc")]).is_err());
        assert!(format("%q", &[Value::Int(1)]).is_err());
    }

    #[test]
    fn strict_integer_parsing() {
        assert_eq!(parse_integer_literal("0x1F", None), Some(31));
        assert_eq!(parse_integer_literal(" -1_000 ", None), Some(-1000));
        assert_eq!(parse_integer_literal("0b101", None), Some(5));
        assert_eq!(parse_integer_literal("017", None), Some(15));
        assert_eq!(parse_integer_literal("z", Some(36)), Some(35));
        assert_eq!(parse_integer_literal("12abc", None), None);
        assert_eq!(parse_integer_literal("1__0", None), None);
        assert_eq!(parse_integer_literal("", None), None);
    }
}
