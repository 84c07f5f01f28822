use std::sync::Arc;

use peek_runtime::Value;

use peek_runtime::{Pattern, PatternOptions};

use super::regexp::{self, Replacement};
use super::{
    arity, check_built_len, comparable, conversion_error, count_arg, int_arg, inspect, kernel,
    object, range_bounds, slice_bounds, str_arg,
};
use crate::ast::Block;
use crate::interpreter::{raise, Flow, Interpreter};

pub(super) fn call(
    interp: &mut Interpreter<'_>,
    receiver: &Value,
    text: &Arc<str>,
    name: &str,
    args: &[Value],
    block: Option<&Block>,
) -> Flow<Value> {
    if let Some(result) = comparable(receiver, name, args) {
        return result;
    }
    let value = match name {
        "length" | "size" => Value::Int(text.chars().count() as i64),
        "bytesize" => Value::Int(text.len() as i64),
        "empty?" => Value::Bool(text.is_empty()),
        "to_s" | "to_str" => receiver.clone(),
        "inspect" => Value::str(inspect(receiver)?),
        "to_sym" | "intern" => Value::symbol(text.clone()),
        "to_i" => {
            arity(args, 0..=1)?;
            let base = args.first().map(int_arg).transpose()?.unwrap_or(10);
            Value::Int(parse_int_prefix(text, base)?)
        }
        "to_f" => Value::Float(parse_float_prefix(text)),
        "upcase" => Value::str(text.to_uppercase()),
        "downcase" => Value::str(text.to_lowercase()),
        "capitalize" => Value::str(capitalize(text)),
        "swapcase" => Value::str(
            text.chars()
                .map(|c| {
                    if c.is_uppercase() {
                        c.to_lowercase().to_string()
                    } else {
                        c.to_uppercase().to_string()
                    }
                })
                .collect::<String>(),
        ),
        "reverse" => Value::str(text.chars().rev().collect::<String>()),
        "strip" => Value::str(text.trim_matches(is_ruby_space)),
        "lstrip" => Value::str(text.trim_start_matches(is_ruby_space)),
        "rstrip" => Value::str(text.trim_end_matches(is_ruby_space)),
        "chomp" => {
            arity(args, 0..=1)?;
            match args.first() {
                Some(suffix) => {
                    let suffix = str_arg(suffix)?;
                    Value::str(text.strip_suffix(&*suffix).unwrap_or(&**text))
                }
                None => Value::str(chomp(text)),
            }
        }
        "chars" => Value::array(text.chars().map(|c| Value::str(c.to_string())).collect()),
        "bytes" => Value::array(text.bytes().map(|b| Value::Int(i64::from(b))).collect()),
        "lines" => Value::array(text.split_inclusive('\n').map(Value::str).collect()),
        "split" => {
            arity(args, 0..=2)?;
            let limit = args.get(1).map(int_arg).transpose()?.unwrap_or(0);
            let parts = match args.first() {
                None | Some(Value::Nil) => split_whitespace(text, limit),
                Some(Value::Regexp(pattern)) => regexp::split(interp, text, pattern, limit)?,
                Some(sep) => {
                    let sep = str_arg(sep)?;
                    if &*sep == " " {
                        split_whitespace(text, limit)
                    } else {
                        split_on(text, &sep, limit)
                    }
                }
            };
            Value::array(parts.into_iter().map(Value::str).collect())
        }
        "include?" => {
            arity(args, 1..=1)?;
            Value::Bool(text.contains(&*str_arg(&args[0])?))
        }
        "start_with?" => Value::Bool(
            args.iter()
                .map(str_arg)
                .collect::<Flow<Vec<_>>>()?
                .iter()
                .any(|prefix| text.starts_with(&**prefix)),
        ),
        "end_with?" => Value::Bool(
            args.iter()
                .map(str_arg)
                .collect::<Flow<Vec<_>>>()?
                .iter()
                .any(|suffix| text.ends_with(&**suffix)),
        ),
        "index" => {
            arity(args, 1..=2)?;
            let from = args.get(1).map(int_arg).transpose()?.unwrap_or(0);
            let found = match &args[0] {
                Value::Regexp(pattern) => regexp::byte_offset(text, from)
                    .and_then(|start| pattern.regex().find_at(text, start))
                    .map(|found| text[..found.start()].chars().count()),
                needle => char_index(text, &str_arg(needle)?, from),
            };
            found.map(|idx| Value::Int(idx as i64)).unwrap_or(Value::Nil)
        }
        "[]" | "slice" => index(text, args)?,
        "+" => {
            arity(args, 1..=1)?;
            let rhs = str_arg(&args[0])?;
            check_built_len(text.len() + rhs.len())?;
            Value::str(format!("{text}{rhs}"))
        }
        "*" => {
            arity(args, 1..=1)?;
            let times = count_arg(&args[0])?;
            check_built_len(text.len().saturating_mul(times))?;
            Value::str(text.repeat(times))
        }
        "%" => {
            arity(args, 1..=1)?;
            let values = match &args[0] {
                Value::Array(heap) => heap.snapshot(),
                other => vec![other.clone()],
            };
            Value::str(kernel::format(text, &values)?)
        }
        "=~" => {
            arity(args, 1..=1)?;
            match &args[0] {
                Value::Regexp(pattern) => regexp::match_index(pattern, text),
                other => {
                    return Err(raise(
                        "TypeError",
                        format!("wrong argument type {} (expected Regexp)", other.type_name()),
                    ))
                }
            }
        }
        "match?" => {
            arity(args, 1..=2)?;
            let from = args.get(1).map(int_arg).transpose()?.unwrap_or(0);
            let Some(start) = regexp::byte_offset(text, from) else {
                return Ok(Value::Bool(false));
            };
            let pattern = pattern_arg(&args[0])?;
            Value::Bool(pattern.regex().is_match_at(text, start))
        }
        "scan" => {
            arity(args, 1..=1)?;
            let pattern = pattern_arg(&args[0])?;
            let found = regexp::scan(interp, text, &pattern)?;
            match block {
                Some(block) => {
                    for item in found {
                        interp.yield_block(block, &[item])?;
                    }
                    receiver.clone()
                }
                None => Value::array(found),
            }
        }
        "center" | "ljust" | "rjust" => {
            arity(args, 1..=2)?;
            let width = int_arg(&args[0])?;
            let pad = match args.get(1) {
                Some(pad) => str_arg(pad)?,
                None => Arc::from(" "),
            };
            if pad.is_empty() {
                return Err(raise("ArgumentError", "zero width padding"));
            }
            let width = usize::try_from(width).unwrap_or(0);
            check_built_len(width)?;
            Value::str(justify(text, name, width, &pad))
        }
        "count" => {
            arity(args, 1..=1)?;
            let set = CharSet::parse(&str_arg(&args[0])?);
            Value::Int(text.chars().filter(|c| set.matches(*c)).count() as i64)
        }
        "each_char" => {
            let chars: Vec<Value> = text.chars().map(|c| Value::str(c.to_string())).collect();
            match block {
                Some(block) => {
                    for c in chars {
                        interp.yield_block(block, &[c])?;
                    }
                    receiver.clone()
                }
                None => Value::array(chars),
            }
        }
        "sub" | "gsub" => {
            arity(args, 1..=2)?;
            let pattern = pattern_arg(&args[0])?;
            let template = args.get(1).map(str_arg).transpose()?;
            let replacement = match (&template, block) {
                (Some(template), _) => Replacement::Template(template),
                (None, Some(block)) => Replacement::Block(block),
                (None, None) => {
                    return Err(raise(
                        "ArgumentError",
                        "wrong number of arguments (given 1, expected 2)",
                    ))
                }
            };
            let replaced = regexp::substitute(interp, text, &pattern, replacement, name == "gsub")?;
            Value::str(replaced)
        }
        "ord" => match text.chars().next() {
            Some(c) => Value::Int(i64::from(u32::from(c))),
            None => return Err(raise("ArgumentError", "empty string")),
        },
        _ => return object::call(interp, receiver, name, args, block),
    };
    Ok(value)
}

pub(super) fn call_symbol(
    interp: &mut Interpreter<'_>,
    receiver: &Value,
    sym: &Arc<str>,
    name: &str,
    args: &[Value],
    block: Option<&Block>,
) -> Flow<Value> {
    if let Some(result) = comparable(receiver, name, args) {
        return result;
    }
    let value = match name {
        "to_s" | "name" | "id2name" => Value::str(sym.clone()),
        "to_sym" => receiver.clone(),
        "inspect" => Value::str(inspect(receiver)?),
        "length" | "size" => Value::Int(sym.chars().count() as i64),
        "empty?" => Value::Bool(sym.is_empty()),
        "upcase" => Value::symbol(sym.to_uppercase()),
        "downcase" => Value::symbol(sym.to_lowercase()),
        "capitalize" => Value::symbol(capitalize(sym)),
        "[]" => index(sym, args)?,
        "start_with?" | "end_with?" => {
            let text = Value::str(sym.clone());
            return call(interp, &text, sym, name, args, block);
        }
        _ => return object::call(interp, receiver, name, args, block),
    };
    Ok(value)
}

/// A regexp argument, or a string matched literally.
fn pattern_arg(value: &Value) -> Flow<Arc<Pattern>> {
    match value {
        Value::Regexp(pattern) => Ok(Arc::clone(pattern)),
        Value::Str(literal) => Pattern::new(&regex::escape(literal), PatternOptions::default())
            .map(Arc::new)
            .map_err(regexp::regexp_error),
        other => Err(raise(
            "TypeError",
            format!("wrong argument type {} (expected Regexp)", other.type_name()),
        )),
    }
}

fn is_ruby_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\x0b' | '\x0c' | '\r' | '\0')
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.as_str().to_lowercase().chars())
            .collect(),
        None => String::new(),
    }
}

fn chomp(text: &str) -> &str {
    text.strip_suffix("\r\n")
        .or_else(|| text.strip_suffix('\n'))
        .or_else(|| text.strip_suffix('\r'))
        .unwrap_or(text)
}

fn split_whitespace(text: &str, limit: i64) -> Vec<String> {
    if limit <= 0 {
        return text.split_whitespace().map(str::to_owned).collect();
    }
    let mut parts = Vec::new();
    let mut rest = text.trim_start();
    while !rest.is_empty() {
        if parts.len() as i64 == limit - 1 {
            parts.push(rest.to_owned());
            break;
        }
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        parts.push(rest[..end].to_owned());
        rest = rest[end..].trim_start();
    }
    parts
}

fn split_on(text: &str, sep: &str, limit: i64) -> Vec<String> {
    let mut parts: Vec<String> = if sep.is_empty() {
        text.chars().map(String::from).collect()
    } else if limit > 0 {
        text.splitn(limit as usize, sep).map(str::to_owned).collect()
    } else {
        text.split(sep).map(str::to_owned).collect()
    };
    if limit == 0 {
        while parts.last().is_some_and(String::is_empty) {
            parts.pop();
        }
    }
    parts
}

fn char_index(text: &str, needle: &str, from: i64) -> Option<usize> {
    let len = text.chars().count() as i64;
    let from = if from < 0 { from + len } else { from };
    if from < 0 || from > len {
        return None;
    }
    let byte_from = text
        .char_indices()
        .nth(from as usize)
        .map_or(text.len(), |(idx, _)| idx);
    let found = text[byte_from..].find(needle)? + byte_from;
    Some(text[..found].chars().count())
}

fn char_slice(text: &str, start: usize, count: usize) -> String {
    text.chars().skip(start).take(count).collect()
}

/// `str[idx]`, `str[start, len]`, `str[range]` and `str[substring]`.
fn index(text: &str, args: &[Value]) -> Flow<Value> {
    arity(args, 1..=2)?;
    let len = text.chars().count();
    let slice = match args {
        [Value::Int(idx)] => slice_bounds(*idx, 1, len)
            .filter(|(start, count)| *start < len && *count == 1),
        [Value::Int(start), count] => slice_bounds(*start, int_arg(count)?, len),
        [Value::Range(range)] => range_bounds(*range, len),
        [Value::Regexp(pattern)] => {
            return Ok(pattern
                .regex()
                .find(text)
                .map_or(Value::Nil, |found| Value::str(found.as_str())))
        }
        [Value::Str(needle)] => {
            return Ok(if text.contains(&**needle) {
                Value::Str(needle.clone())
            } else {
                Value::Nil
            })
        }
        [other, ..] => return Err(conversion_error(other, "Integer")),
        [] => None,
    };
    Ok(match slice {
        Some((start, count)) => Value::str(char_slice(text, start, count)),
        None => Value::Nil,
    })
}

fn justify(text: &str, mode: &str, width: usize, pad: &str) -> String {
    let len = text.chars().count();
    if width <= len {
        return text.to_owned();
    }
    let total = width - len;
    let (left, right) = match mode {
        "ljust" => (0, total),
        "rjust" => (total, 0),
        _ => (total / 2, total - total / 2),
    };
    let fill = |n: usize| pad.chars().cycle().take(n).collect::<String>();
    format!("{}{text}{}", fill(left), fill(right))
}

/// Ruby's lenient `String#to_i`: leading whitespace, an optional sign, then
/// as many digits (and single underscores) as parse. Garbage yields 0.
fn parse_int_prefix(text: &str, base: i64) -> Flow<i64> {
    if !(2..=36).contains(&base) {
        return Err(raise("ArgumentError", format!("invalid radix {base}")));
    }
    let base = base as u32;
    let rest = text.trim_start_matches(is_ruby_space);
    let (negative, rest) = match rest.as_bytes().first() {
        Some(b'-') => (true, &rest[1..]),
        Some(b'+') => (false, &rest[1..]),
        _ => (false, rest),
    };
    let mut value: i64 = 0;
    let mut prev_underscore = true;
    for c in rest.chars() {
        if c == '_' && !prev_underscore {
            prev_underscore = true;
            continue;
        }
        let Some(digit) = c.to_digit(base) else {
            break;
        };
        prev_underscore = false;
        value = value
            .checked_mul(i64::from(base))
            .and_then(|v| v.checked_add(i64::from(digit)))
            .ok_or_else(|| raise("RangeError", "integer overflow"))?;
    }
    Ok(if negative { -value } else { value })
}

fn parse_float_prefix(text: &str) -> f64 {
    let rest = text.trim_start_matches(is_ruby_space);
    let bytes = rest.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'-' | b'+')) {
        end = 1;
    }
    let digits = |from: usize| {
        bytes[from..]
            .iter()
            .take_while(|b| b.is_ascii_digit() || **b == b'_')
            .count()
    };
    let int_len = digits(end);
    if int_len == 0 {
        return 0.0;
    }
    end += int_len;
    if bytes.get(end) == Some(&b'.') && bytes.get(end + 1).is_some_and(u8::is_ascii_digit) {
        end += 1 + digits(end + 1);
    }
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'-' | b'+')) {
            exp_end += 1;
        }
        let exp_digits = digits(exp_end);
        if exp_digits > 0 {
            end = exp_end + exp_digits;
        }
    }
    rest[..end].replace('_', "").parse().unwrap_or(0.0)
}

/// Character set argument of `String#count`: `"a-z"`, `"^aeiou"`.
struct CharSet {
    negated: bool,
    ranges: Vec<(char, char)>,
}

impl CharSet {
    fn parse(spec: &str) -> Self {
        let chars: Vec<char> = spec.chars().collect();
        let (negated, body) = match chars.split_first() {
            Some(('^', rest)) if !rest.is_empty() => (true, rest),
            _ => (false, chars.as_slice()),
        };
        let mut ranges = Vec::new();
        let mut idx = 0;
        while idx < body.len() {
            if idx + 2 < body.len() && body[idx + 1] == '-' {
                ranges.push((body[idx], body[idx + 2]));
                idx += 3;
            } else {
                ranges.push((body[idx], body[idx]));
                idx += 1;
            }
        }
        Self { negated, ranges }
    }

    fn matches(&self, c: char) -> bool {
        let hit = self.ranges.iter().any(|(lo, hi)| (*lo..=*hi).contains(&c));
        hit != self.negated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn lenient_number_parsing() {
        assert_eq!(parse_int_prefix("  42abc", 10).ok(), Some(42));
        assert_eq!(parse_int_prefix("-1_000", 10).ok(), Some(-1000));
        assert_eq!(parse_int_prefix("ff", 16).ok(), Some(255));
        assert_eq!(parse_int_prefix("abc", 10).ok(), Some(0));
        assert_eq!(parse_float_prefix("3.25kg"), 3.25);
        assert_eq!(parse_float_prefix("1e3"), 1000.0);
        assert_eq!(parse_float_prefix("1."), 1.0);
        assert_eq!(parse_float_prefix("x"), 0.0);
    }

    #[test]
    fn splitting_drops_trailing_empties() {
        assert_eq!(split_on("a,b,,", ",", 0), vec!["a", "b"]);
        assert_eq!(split_on("a,b,c", ",", 2), vec!["a", "b,c"]);
        assert_eq!(split_whitespace("  one  two ", 0), vec!["one", "two"]);
        assert_eq!(split_whitespace("one two three", 2), vec!["one", "two three"]);
    }

    #[test]
    fn padding_and_sets() {
        assert_eq!(justify("ab", "center", 6, "*"), "**ab**");
        assert_eq!(justify("ab", "rjust", 5, "12"), "121ab");
        assert_eq!(justify("abc", "ljust", 2, " "), "abc");
        let vowels = CharSet::parse("aeiou");
        assert_eq!("hello world".chars().filter(|c| vowels.matches(*c)).count(), 3);
        let consonants = CharSet::parse("^aeiou ");
        assert_eq!("hello world".chars().filter(|c| consonants.matches(*c)).count(), 7);
        let letters = CharSet::parse("a-c");
        assert!(letters.matches('b') && !letters.matches('d'));
    }

    #[test]
    fn character_offsets_are_not_byte_offsets() {
        assert_eq!(char_index("héllo", "l", 0), Some(2));
        assert_eq!(char_index("héllo", "l", 3), Some(3));
        assert_eq!(char_index("héllo", "z", 0), None);
        assert_eq!(chomp("line\r\n"), "line");
        assert_eq!(capitalize("hELLO"), "Hello");
    }
}
