use peek_runtime::Value;

use super::{arity, float_of, int_arg};
use crate::interpreter::{raise, Flow, Interrupt};

fn float_arg(value: &Value) -> Flow<f64> {
    float_of(value).ok_or_else(|| {
        let source = match value {
            Value::Nil => "nil".to_owned(),
            other => other.type_name(),
        };
        raise("TypeError", format!("can't convert {source} into Float"))
    })
}

fn domain_error(name: &str) -> Interrupt {
    raise(
        "Math::DomainError",
        format!("Numerical argument is out of domain - \"{name}\""),
    )
}

/// Module functions of `Math`.
pub(super) fn call_math(name: &str, args: &[Value]) -> Flow<Value> {
    let unary = |f: fn(f64) -> f64| -> Flow<Value> {
        arity(args, 1..=1)?;
        Ok(Value::Float(f(float_arg(&args[0])?)))
    };
    match name {
        "sqrt" => {
            arity(args, 1..=1)?;
            let x = float_arg(&args[0])?;
            if x < 0.0 {
                return Err(domain_error(name));
            }
            Ok(Value::Float(x.sqrt()))
        }
        "log" | "log2" | "log10" => {
            arity(args, 1..=if name == "log" { 2 } else { 1 })?;
            let x = float_arg(&args[0])?;
            if x < 0.0 {
                return Err(domain_error(name));
            }
            let result = match (name, args.get(1)) {
                ("log2", _) => x.log2(),
                ("log10", _) => x.log10(),
                (_, Some(base)) => {
                    let base = float_arg(base)?;
                    if base < 0.0 {
                        return Err(domain_error(name));
                    }
                    x.ln() / base.ln()
                }
                (_, None) => x.ln(),
            };
            Ok(Value::Float(result))
        }
        "cbrt" => unary(f64::cbrt),
        "sin" => unary(f64::sin),
        "cos" => unary(f64::cos),
        "tan" => unary(f64::tan),
        "atan" => unary(f64::atan),
        "exp" => unary(f64::exp),
        "atan2" | "hypot" => {
            arity(args, 2..=2)?;
            let (a, b) = (float_arg(&args[0])?, float_arg(&args[1])?);
            Ok(Value::Float(if name == "atan2" { a.atan2(b) } else { a.hypot(b) }))
        }
        _ => Err(raise(
            "NoMethodError",
            format!("undefined method `{name}' for module Math"),
        )),
    }
}

/// Class methods of `Integer`.
pub(super) fn call_integer(name: &str, args: &[Value]) -> Flow<Value> {
    match name {
        "sqrt" => {
            arity(args, 1..=1)?;
            let n = int_arg(&args[0])?;
            if n < 0 {
                return Err(domain_error("isqrt"));
            }
            Ok(Value::Int(isqrt(n as u64) as i64))
        }
        _ => Err(raise(
            "NoMethodError",
            format!("undefined method `{name}' for class Integer"),
        )),
    }
}

fn isqrt(n: u64) -> u64 {
    if n < 2 {
        return n;
    }
    let mut x = (n as f64).sqrt() as u64;
    while x.saturating_mul(x) > n {
        x -= 1;
    }
    while (x + 1).saturating_mul(x + 1) <= n {
        x += 1;
    }
    x
}
