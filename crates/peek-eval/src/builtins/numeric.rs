use peek_runtime::Value;

use super::{
    arity, check_built_len, comparable, compare, float_of, int_arg, inspect, object, ordering_value,
};
use crate::ast::Block;
use crate::interpreter::{raise, Flow, Interpreter, Interrupt};

pub(super) fn call(
    interp: &mut Interpreter<'_>,
    receiver: &Value,
    name: &str,
    args: &[Value],
    block: Option<&Block>,
) -> Flow<Value> {
    if let Some(op) = binary_op(name) {
        if let [rhs] = args {
            return arithmetic(op, receiver, rhs);
        }
    }
    if name == "<=>" {
        arity(args, 1..=1)?;
        return Ok(ordering_value(compare(receiver, &args[0])));
    }
    if let Some(result) = comparable(receiver, name, args) {
        return result;
    }
    match receiver {
        Value::Int(n) => call_int(interp, receiver, *n, name, args, block),
        Value::Float(f) => call_float(interp, receiver, *f, name, args, block),
        _ => object::call(interp, receiver, name, args, block),
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Op {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
}

fn binary_op(name: &str) -> Option<Op> {
    Some(match name {
        "+" => Op::Add,
        "-" => Op::Sub,
        "*" => Op::Mul,
        "/" => Op::Div,
        "%" | "modulo" => Op::Mod,
        "**" | "pow" => Op::Pow,
        _ => return None,
    })
}

fn arithmetic(op: Op, lhs: &Value, rhs: &Value) -> Flow<Value> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => int_arithmetic(op, *a, *b),
        _ => match (float_of(lhs), float_of(rhs)) {
            (Some(a), Some(b)) => Ok(Value::Float(float_arithmetic(op, a, b))),
            _ => {
                let rhs_name = match rhs {
                    Value::Nil => "nil".to_owned(),
                    other => other.type_name(),
                };
                Err(raise(
                    "TypeError",
                    format!("{rhs_name} can't be coerced into {}", lhs.type_name()),
                ))
            }
        },
    }
}

fn overflow() -> Interrupt {
    raise("RangeError", "integer overflow")
}

fn zero_division() -> Interrupt {
    raise("ZeroDivisionError", "divided by 0")
}

fn int_arithmetic(op: Op, a: i64, b: i64) -> Flow<Value> {
    let result = match op {
        Op::Add => a.checked_add(b),
        Op::Sub => a.checked_sub(b),
        Op::Mul => a.checked_mul(b),
        Op::Div => {
            if b == 0 {
                return Err(zero_division());
            }
            floor_div(a, b)
        }
        Op::Mod => {
            if b == 0 {
                return Err(zero_division());
            }
            floor_mod(a, b)
        }
        Op::Pow => {
            if b < 0 {
                return Ok(Value::Float((a as f64).powf(b as f64)));
            }
            let exp = u32::try_from(b).map_err(|_| overflow())?;
            a.checked_pow(exp)
        }
    };
    result.map(Value::Int).ok_or_else(overflow)
}

/// Integer division rounding toward negative infinity.
fn floor_div(a: i64, b: i64) -> Option<i64> {
    let quotient = a.checked_div(b)?;
    let remainder = a.checked_rem(b)?;
    if remainder != 0 && ((remainder < 0) != (b < 0)) {
        quotient.checked_sub(1)
    } else {
        Some(quotient)
    }
}

/// Remainder with the sign of the divisor.
fn floor_mod(a: i64, b: i64) -> Option<i64> {
    let remainder = a.checked_rem(b)?;
    if remainder != 0 && ((remainder < 0) != (b < 0)) {
        remainder.checked_add(b)
    } else {
        Some(remainder)
    }
}

fn float_arithmetic(op: Op, a: f64, b: f64) -> f64 {
    match op {
        Op::Add => a + b,
        Op::Sub => a - b,
        Op::Mul => a * b,
        Op::Div => a / b,
        Op::Mod => a - b * (a / b).floor(),
        Op::Pow => a.powf(b),
    }
}

fn float_to_int(f: f64) -> Flow<i64> {
    if f.is_nan() || f.is_infinite() {
        let rendered = inspect(&Value::Float(f))?;
        return Err(raise("FloatDomainError", rendered));
    }
    if f < i64::MIN as f64 || f >= i64::MAX as f64 {
        return Err(overflow());
    }
    Ok(f as i64)
}

/// `round`/`floor`/`ceil` with an optional digits argument.
fn round_float(f: f64, args: &[Value], round: fn(f64) -> f64) -> Flow<Value> {
    arity(args, 0..=1)?;
    let digits = args.first().map(int_arg).transpose()?.unwrap_or(0);
    if digits > 0 {
        let scale = 10f64.powi(digits.min(15) as i32);
        return Ok(Value::Float(round(f * scale) / scale));
    }
    let scale = 10f64.powi((-digits).min(18) as i32);
    float_to_int(round(f / scale) * scale).map(Value::Int)
}

fn integer_sequence(
    interp: &mut Interpreter<'_>,
    receiver: &Value,
    values: impl Iterator<Item = i64>,
    block: Option<&Block>,
) -> Flow<Value> {
    match block {
        Some(block) => {
            for n in values {
                interp.check()?;
                interp.yield_block(block, &[Value::Int(n)])?;
            }
            Ok(receiver.clone())
        }
        // Without a block the sequence is materialized so it can be chained
        // (`5.times.map { ... }`).
        None => {
            let mut items = Vec::new();
            for n in values {
                interp.check()?;
                items.push(Value::Int(n));
                check_built_len(items.len())?;
            }
            Ok(Value::array(items))
        }
    }
}

fn call_int(
    interp: &mut Interpreter<'_>,
    receiver: &Value,
    n: i64,
    name: &str,
    args: &[Value],
    block: Option<&Block>,
) -> Flow<Value> {
    let value = match name {
        "-@" => n.checked_neg().map(Value::Int).ok_or_else(overflow)?,
        "+@" | "to_i" | "to_int" | "floor" | "ceil" | "round" | "truncate" | "ord" => {
            Value::Int(n)
        }
        "~" => Value::Int(!n),
        "&" | "|" | "^" | "<<" | ">>" => {
            arity(args, 1..=1)?;
            let rhs = int_arg(&args[0])?;
            Value::Int(match name {
                "&" => n & rhs,
                "|" => n | rhs,
                "^" => n ^ rhs,
                "<<" => shift_left(n, rhs)?,
                _ => shift_left(n, rhs.checked_neg().ok_or_else(overflow)?)?,
            })
        }
        "==" | "===" | "equal?" => Value::Bool(args.first().is_some_and(|rhs| receiver.equals(rhs))),
        "eql?" => Value::Bool(matches!(args.first(), Some(Value::Int(m)) if *m == n)),
        "abs" | "magnitude" => n.checked_abs().map(Value::Int).ok_or_else(overflow)?,
        "zero?" => Value::Bool(n == 0),
        "positive?" => Value::Bool(n > 0),
        "negative?" => Value::Bool(n < 0),
        "even?" => Value::Bool(n % 2 == 0),
        "odd?" => Value::Bool(n % 2 != 0),
        "succ" | "next" => n.checked_add(1).map(Value::Int).ok_or_else(overflow)?,
        "pred" => n.checked_sub(1).map(Value::Int).ok_or_else(overflow)?,
        "to_f" => Value::Float(n as f64),
        "to_s" | "inspect" => {
            let base = args.first().map(int_arg).transpose()?.unwrap_or(10);
            Value::str(int_to_string(n, base)?)
        }
        "integer?" | "finite?" => Value::Bool(true),
        "infinite?" => Value::Nil,
        "nan?" => Value::Bool(false),
        "div" => {
            arity(args, 1..=1)?;
            match &args[0] {
                Value::Int(0) => return Err(zero_division()),
                Value::Int(m) => floor_div(n, *m).map(Value::Int).ok_or_else(overflow)?,
                other => {
                    let quotient = float_arithmetic(Op::Div, n as f64, float_of(other).unwrap_or(f64::NAN));
                    Value::Int(float_to_int(quotient.floor())?)
                }
            }
        }
        "fdiv" => {
            arity(args, 1..=1)?;
            let rhs = float_of(&args[0]).ok_or_else(|| raise("TypeError", "expected a number"))?;
            Value::Float(n as f64 / rhs)
        }
        "divmod" => {
            arity(args, 1..=1)?;
            let quotient = arithmetic(Op::Div, receiver, &args[0])?;
            let quotient = match quotient {
                Value::Float(f) => Value::Float(f.floor()),
                other => other,
            };
            let modulo = arithmetic(Op::Mod, receiver, &args[0])?;
            Value::array(vec![quotient, modulo])
        }
        "gcd" | "lcm" => {
            arity(args, 1..=1)?;
            let m = int_arg(&args[0])?;
            let gcd = gcd(n.unsigned_abs(), m.unsigned_abs());
            let result = if name == "gcd" {
                i64::try_from(gcd).ok()
            } else if gcd == 0 {
                Some(0)
            } else {
                (n.unsigned_abs() / gcd)
                    .checked_mul(m.unsigned_abs())
                    .and_then(|v| i64::try_from(v).ok())
            };
            result.map(Value::Int).ok_or_else(overflow)?
        }
        "digits" => {
            if n < 0 {
                return Err(raise("Math::DomainError", "out of domain"));
            }
            let mut digits = Vec::new();
            let mut rest = n;
            loop {
                digits.push(Value::Int(rest % 10));
                rest /= 10;
                if rest == 0 {
                    break;
                }
            }
            Value::array(digits)
        }
        "bit_length" => Value::Int(i64::from(64 - if n < 0 { (!n).leading_zeros() } else { n.leading_zeros() })),
        "times" => {
            arity(args, 0..=0)?;
            return integer_sequence(interp, receiver, 0..n.max(0), block);
        }
        "upto" => {
            arity(args, 1..=1)?;
            let limit = int_arg(&args[0])?;
            return integer_sequence(interp, receiver, n..=limit, block);
        }
        "downto" => {
            arity(args, 1..=1)?;
            let limit = int_arg(&args[0])?;
            return integer_sequence(interp, receiver, (limit..=n).rev(), block);
        }
        "step" => {
            arity(args, 2..=2)?;
            let limit = int_arg(&args[0])?;
            let step = int_arg(&args[1])?;
            if step == 0 {
                return Err(raise("ArgumentError", "step can't be 0"));
            }
            let mut current = Some(n);
            let values = std::iter::from_fn(move || {
                let value = current?;
                let in_range = if step > 0 { value <= limit } else { value >= limit };
                if !in_range {
                    return None;
                }
                current = value.checked_add(step);
                Some(value)
            });
            return integer_sequence(interp, receiver, values, block);
        }
        "coerce" => {
            arity(args, 1..=1)?;
            Value::array(vec![args[0].clone(), receiver.clone()])
        }
        "hash" => Value::Int(n.wrapping_mul(0x9E37_79B9_7F4A_7C15_u64 as i64)),
        _ => return object::call(interp, receiver, name, args, block),
    };
    Ok(value)
}

fn shift_left(n: i64, by: i64) -> Flow<i64> {
    if by >= 0 {
        let by = u32::try_from(by).map_err(|_| overflow())?;
        let shifted = n.checked_shl(by).ok_or_else(overflow)?;
        if shifted >> by != n {
            return Err(overflow());
        }
        Ok(shifted)
    } else {
        let by = by.unsigned_abs().min(63) as u32;
        Ok(n >> by)
    }
}

fn int_to_string(n: i64, base: i64) -> Flow<String> {
    if !(2..=36).contains(&base) {
        return Err(raise("ArgumentError", format!("invalid radix {base}")));
    }
    if base == 10 {
        return Ok(n.to_string());
    }
    let mut digits = Vec::new();
    let mut rest = n.unsigned_abs();
    let base = base as u64;
    loop {
        let digit = (rest % base) as u32;
        digits.push(std::char::from_digit(digit, base as u32).unwrap_or('?'));
        rest /= base;
        if rest == 0 {
            break;
        }
    }
    if n < 0 {
        digits.push('-');
    }
    Ok(digits.into_iter().rev().collect())
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

fn call_float(
    interp: &mut Interpreter<'_>,
    receiver: &Value,
    f: f64,
    name: &str,
    args: &[Value],
    block: Option<&Block>,
) -> Flow<Value> {
    let value = match name {
        "-@" => Value::Float(-f),
        "+@" | "to_f" => Value::Float(f),
        "==" | "===" | "equal?" => Value::Bool(args.first().is_some_and(|rhs| receiver.equals(rhs))),
        "eql?" => Value::Bool(matches!(args.first(), Some(Value::Float(g)) if *g == f)),
        "abs" | "magnitude" => Value::Float(f.abs()),
        "zero?" => Value::Bool(f == 0.0),
        "positive?" => Value::Bool(f > 0.0),
        "negative?" => Value::Bool(f < 0.0),
        "nan?" => Value::Bool(f.is_nan()),
        "finite?" => Value::Bool(f.is_finite()),
        "infinite?" => {
            if f.is_infinite() {
                Value::Int(if f > 0.0 { 1 } else { -1 })
            } else {
                Value::Nil
            }
        }
        "integer?" => Value::Bool(false),
        "to_i" | "to_int" | "truncate" => Value::Int(float_to_int(f.trunc())?),
        "floor" => return round_float(f, args, f64::floor),
        "ceil" => return round_float(f, args, f64::ceil),
        "round" => return round_float(f, args, f64::round),
        "to_s" | "inspect" => Value::str(inspect(receiver)?),
        "fdiv" => {
            arity(args, 1..=1)?;
            let rhs = float_of(&args[0]).ok_or_else(|| raise("TypeError", "expected a number"))?;
            Value::Float(f / rhs)
        }
        "divmod" => {
            arity(args, 1..=1)?;
            let rhs = float_of(&args[0]).ok_or_else(|| raise("TypeError", "expected a number"))?;
            if rhs == 0.0 {
                return Err(zero_division());
            }
            let quotient = (f / rhs).floor();
            Value::array(vec![
                Value::Int(float_to_int(quotient)?),
                Value::Float(float_arithmetic(Op::Mod, f, rhs)),
            ])
        }
        "hash" => Value::Int(f.to_bits() as i64),
        "coerce" => {
            arity(args, 1..=1)?;
            let other = float_of(&args[0]).ok_or_else(|| raise("TypeError", "expected a number"))?;
            Value::array(vec![Value::Float(other), Value::Float(f)])
        }
        _ => return object::call(interp, receiver, name, args, block),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_division_floors() {
        assert_eq!(floor_div(-7, 2), Some(-4));
        assert_eq!(floor_div(7, 2), Some(3));
        assert_eq!(floor_mod(-7, 3), Some(2));
        assert_eq!(floor_mod(7, -3), Some(-2));
        assert_eq!(floor_div(i64::MIN, -1), None);
    }

    #[test]
    fn radix_rendering() {
        assert_eq!(int_to_string(255, 16).ok(), Some("ff".to_owned()));
        assert_eq!(int_to_string(-5, 2).ok(), Some("-101".to_owned()));
        assert!(int_to_string(1, 1).is_err());
    }

    #[test]
    fn shifts_detect_overflow() {
        assert_eq!(shift_left(1, 3).ok(), Some(8));
        assert_eq!(shift_left(8, -2).ok(), Some(2));
        assert!(shift_left(1, 64).is_err());
        assert!(shift_left(i64::MAX, 1).is_err());
    }
}
