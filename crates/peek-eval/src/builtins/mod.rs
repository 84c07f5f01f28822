//! Read-only implementations of the builtin types' methods.
//!
//! Callers have already consulted the sandbox; these functions only
//! implement semantics. Anything a type does not implement falls through to
//! [`object::call`] and ends in `NoMethodError`.

mod collection;
mod hash;
mod kernel;
mod math;
mod numeric;
mod object;
mod regexp;
mod string;
mod time;

use std::cmp::Ordering;
use std::ops::RangeInclusive;
use std::sync::Arc;

use peek_runtime::{IntRange, PatternOptions, Value};

use crate::ast::Block;
use crate::error::EvaluationError;
use crate::interpreter::{raise, Flow, Interpreter, Interrupt};

pub(crate) use kernel::{call as call_kernel, is_function as is_kernel_function};
pub(crate) use object::{call as call_object, call_on_class};

/// Upper bound on collections and strings built by a single call.
const MAX_BUILT_LEN: usize = 1 << 20;

const BUILTIN_CLASSES: &[&str] = &[
    "BasicObject",
    "Object",
    "Kernel",
    "Comparable",
    "Enumerable",
    "Numeric",
    "Integer",
    "Float",
    "String",
    "Symbol",
    "Array",
    "Hash",
    "Range",
    "Time",
    "NilClass",
    "TrueClass",
    "FalseClass",
    "Regexp",
    "Class",
    "Module",
    "Math",
    "File",
    "IO",
    "Dir",
    "Process",
    "Signal",
    "Socket",
    "ObjectSpace",
    "GC",
    "Thread",
];

pub(crate) fn is_builtin_class(name: &str) -> bool {
    BUILTIN_CLASSES.contains(&name)
}

/// Constants nested in builtin classes, e.g. `Math::PI`.
pub(crate) fn class_constant(scope: &str, name: &str) -> Option<Value> {
    match (scope, name) {
        ("Math", "PI") => Some(Value::Float(std::f64::consts::PI)),
        ("Math", "E") => Some(Value::Float(std::f64::consts::E)),
        ("Float", "INFINITY") => Some(Value::Float(f64::INFINITY)),
        ("Float", "NAN") => Some(Value::Float(f64::NAN)),
        ("Float", "EPSILON") => Some(Value::Float(f64::EPSILON)),
        ("Float", "MAX") => Some(Value::Float(f64::MAX)),
        ("Float", "MIN") => Some(Value::Float(f64::MIN_POSITIVE)),
        ("Regexp", "IGNORECASE") => Some(Value::Int(PatternOptions::IGNORECASE)),
        ("Regexp", "EXTENDED") => Some(Value::Int(PatternOptions::EXTENDED)),
        ("Regexp", "MULTILINE") => Some(Value::Int(PatternOptions::MULTILINE)),
        _ => None,
    }
}

pub(crate) fn call(
    interp: &mut Interpreter<'_>,
    receiver: &Value,
    name: &str,
    args: &[Value],
    block: Option<&Block>,
) -> Flow<Value> {
    match receiver {
        Value::Int(_) | Value::Float(_) => numeric::call(interp, receiver, name, args, block),
        Value::Str(text) => string::call(interp, receiver, text, name, args, block),
        Value::Symbol(sym) => string::call_symbol(interp, receiver, sym, name, args, block),
        Value::Array(heap) => {
            collection::call_array(interp, receiver, &heap.snapshot(), name, args, block)
        }
        Value::Hash(heap) => hash::call(interp, receiver, &heap.snapshot(), name, args, block),
        Value::Range(range) => collection::call_range(interp, receiver, *range, name, args, block),
        Value::Time(secs) => time::call(interp, receiver, *secs, name, args, block),
        Value::Regexp(pattern) => regexp::call(interp, receiver, pattern, name, args, block),
        _ => object::call(interp, receiver, name, args, block),
    }
}

/// Class-level builtins reached through the sandbox's class table.
pub(crate) fn call_class_method(
    interp: &mut Interpreter<'_>,
    class: &str,
    name: &str,
    args: &[Value],
) -> Flow<Value> {
    match class {
        "Math" => math::call_math(name, args),
        "Integer" => math::call_integer(name, args),
        "Time" => time::call_class(name, args),
        "Regexp" => regexp::call_class(name, args),
        _ => object::call_on_class(interp, class, name, args),
    }
}

pub(crate) fn hash_insert(entries: &mut Vec<(Value, Value)>, key: Value, value: Value) {
    match entries.iter_mut().find(|(existing, _)| existing.equals(&key)) {
        Some((_, slot)) => *slot = value,
        None => entries.push((key, value)),
    }
}

fn runtime_error(err: peek_runtime::RuntimeError) -> Interrupt {
    Interrupt::Error(EvaluationError::Raised(err.to_string()))
}

pub(crate) fn display(value: &Value) -> Flow<String> {
    value.to_display().map_err(runtime_error)
}

pub(crate) fn inspect(value: &Value) -> Flow<String> {
    value.inspect().map_err(runtime_error)
}

fn arity(args: &[Value], expected: RangeInclusive<usize>) -> Flow<()> {
    if expected.contains(&args.len()) {
        return Ok(());
    }
    let expected = if expected.start() == expected.end() {
        expected.start().to_string()
    } else {
        format!("{}..{}", expected.start(), expected.end())
    };
    Err(raise(
        "ArgumentError",
        format!(
            "wrong number of arguments (given {}, expected {expected})",
            args.len()
        ),
    ))
}

fn conversion_error(value: &Value, target: &str) -> Interrupt {
    let source = match value {
        Value::Nil => "nil".to_owned(),
        Value::Bool(true) => "true".to_owned(),
        Value::Bool(false) => "false".to_owned(),
        other => other.type_name(),
    };
    raise(
        "TypeError",
        format!("no implicit conversion of {source} into {target}"),
    )
}

fn int_arg(value: &Value) -> Flow<i64> {
    match value {
        Value::Int(n) => Ok(*n),
        other => Err(conversion_error(other, "Integer")),
    }
}

/// Non-negative count argument (`take(n)`, `"ab" * n`).
fn count_arg(value: &Value) -> Flow<usize> {
    let n = int_arg(value)?;
    usize::try_from(n).map_err(|_| raise("ArgumentError", "negative argument"))
}

fn str_arg(value: &Value) -> Flow<Arc<str>> {
    match value {
        Value::Str(text) => Ok(text.clone()),
        other => Err(conversion_error(other, "String")),
    }
}

fn float_of(value: &Value) -> Option<f64> {
    match value {
        Value::Int(n) => Some(*n as f64),
        Value::Float(f) => Some(*f),
        _ => None,
    }
}

fn check_built_len(len: usize) -> Flow<()> {
    if len > MAX_BUILT_LEN {
        return Err(raise("ArgumentError", "argument too big"));
    }
    Ok(())
}

/// Nested arrays compare element-wise down to this depth.
const MAX_COMPARE_DEPTH: usize = 32;

/// `<=>` for builtin values; `None` when the values are not comparable.
pub(crate) fn compare(lhs: &Value, rhs: &Value) -> Option<Ordering> {
    compare_at(lhs, rhs, 0)
}

fn compare_at(lhs: &Value, rhs: &Value, depth: usize) -> Option<Ordering> {
    if depth > MAX_COMPARE_DEPTH {
        return None;
    }
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            float_of(lhs)?.partial_cmp(&float_of(rhs)?)
        }
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        (Value::Symbol(a), Value::Symbol(b)) => Some(a.cmp(b)),
        (Value::Time(a), Value::Time(b)) => a.partial_cmp(b),
        (Value::Bool(a), Value::Bool(b)) if a == b => Some(Ordering::Equal),
        (Value::Nil, Value::Nil) => Some(Ordering::Equal),
        (Value::Array(a), Value::Array(b)) => {
            if a.ptr_eq(b) {
                return Some(Ordering::Equal);
            }
            let (a, b) = (a.snapshot(), b.snapshot());
            for (x, y) in a.iter().zip(b.iter()) {
                match compare_at(x, y, depth + 1)? {
                    Ordering::Equal => continue,
                    other => return Some(other),
                }
            }
            Some(a.len().cmp(&b.len()))
        }
        _ => None,
    }
}

fn compare_or_raise(lhs: &Value, rhs: &Value) -> Flow<Ordering> {
    compare(lhs, rhs).ok_or_else(|| {
        let rhs = inspect(rhs).unwrap_or_else(|_| rhs.type_name());
        raise(
            "ArgumentError",
            format!("comparison of {} with {rhs} failed", lhs.type_name()),
        )
    })
}

fn ordering_value(ordering: Option<Ordering>) -> Value {
    match ordering {
        Some(Ordering::Less) => Value::Int(-1),
        Some(Ordering::Equal) => Value::Int(0),
        Some(Ordering::Greater) => Value::Int(1),
        None => Value::Nil,
    }
}

/// Comparison operators shared by every `Comparable` type.
fn comparable(lhs: &Value, name: &str, args: &[Value]) -> Option<Flow<Value>> {
    let rhs = args.first()?;
    let result = match name {
        "<=>" => Ok(ordering_value(compare(lhs, rhs))),
        "<" => compare_or_raise(lhs, rhs).map(|o| Value::Bool(o == Ordering::Less)),
        "<=" => compare_or_raise(lhs, rhs).map(|o| Value::Bool(o != Ordering::Greater)),
        ">" => compare_or_raise(lhs, rhs).map(|o| Value::Bool(o == Ordering::Greater)),
        ">=" => compare_or_raise(lhs, rhs).map(|o| Value::Bool(o != Ordering::Less)),
        "between?" => {
            let Some(upper) = args.get(1) else {
                return Some(arity(args, 2..=2).map(|()| Value::Nil));
            };
            compare_or_raise(lhs, rhs).and_then(|low| {
                let high = compare_or_raise(lhs, upper)?;
                Ok(Value::Bool(
                    low != Ordering::Less && high != Ordering::Greater,
                ))
            })
        }
        "clamp" => {
            let Some(upper) = args.get(1) else {
                return Some(arity(args, 2..=2).map(|()| Value::Nil));
            };
            compare_or_raise(lhs, rhs).and_then(|low| {
                if low == Ordering::Less {
                    return Ok(rhs.clone());
                }
                if compare_or_raise(lhs, upper)? == Ordering::Greater {
                    return Ok(upper.clone());
                }
                Ok(lhs.clone())
            })
        }
        _ => return None,
    };
    Some(result)
}

/// Resolve a Ruby-style `[start, len]` or range slice against a sequence of
/// `len` elements. Returns the start offset and element count.
fn slice_bounds(start: i64, count: i64, len: usize) -> Option<(usize, usize)> {
    let len_i = i64::try_from(len).ok()?;
    let start = if start < 0 { start + len_i } else { start };
    if start < 0 || start > len_i || count < 0 {
        return None;
    }
    let count = count.min(len_i - start);
    Some((start as usize, count as usize))
}

fn range_bounds(range: IntRange, len: usize) -> Option<(usize, usize)> {
    let len_i = i64::try_from(len).ok()?;
    let start = if range.start < 0 {
        range.start + len_i
    } else {
        range.start
    };
    let mut end = if range.end < 0 {
        range.end + len_i
    } else {
        range.end
    };
    if range.exclusive {
        end -= 1;
    }
    if start < 0 || start > len_i {
        return None;
    }
    let count = (end - start + 1).max(0);
    slice_bounds(start, count, len)
}

/// `Class === value`, `Range === value` and `Regexp === value` as used by
/// `any?(pattern)` and friends; plain equality otherwise.
fn case_equals(interp: &Interpreter<'_>, pattern: &Value, value: &Value) -> bool {
    match (pattern, value) {
        (Value::Class(class), _) => object::is_kind_of(interp, value, class),
        (Value::Range(range), Value::Int(n)) => range.contains(*n),
        (Value::Regexp(regexp), Value::Str(text) | Value::Symbol(text)) => regexp.is_match(text),
        (Value::Regexp(_), _) => false,
        _ => pattern.equals(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slices_follow_ruby_bounds() {
        assert_eq!(slice_bounds(1, 2, 5), Some((1, 2)));
        assert_eq!(slice_bounds(-2, 10, 5), Some((3, 2)));
        assert_eq!(slice_bounds(5, 1, 5), Some((5, 0)));
        assert_eq!(slice_bounds(6, 1, 5), None);
        assert_eq!(range_bounds(IntRange::new(1, -1, false), 5), Some((1, 4)));
        assert_eq!(range_bounds(IntRange::new(0, 2, true), 5), Some((0, 2)));
        assert_eq!(range_bounds(IntRange::new(3, 1, false), 5), Some((3, 0)));
    }

    #[test]
    fn mixed_numeric_comparison() {
        assert_eq!(compare(&Value::Int(1), &Value::Float(1.5)), Some(Ordering::Less));
        assert_eq!(compare(&Value::Int(1), &Value::str("1")), None);
        assert_eq!(
            compare(
                &Value::array(vec![Value::Int(1), Value::Int(2)]),
                &Value::array(vec![Value::Int(1)])
            ),
            Some(Ordering::Greater)
        );
    }
}
