use std::sync::Arc;

use peek_runtime::{Pattern, PatternOptions, RuntimeError, Value};
use regex::Captures;

use super::{arity, check_built_len, conversion_error, int_arg, object, str_arg};
use crate::ast::Block;
use crate::interpreter::{raise, Flow, Interpreter, Interrupt};

pub(super) fn call(
    interp: &mut Interpreter<'_>,
    receiver: &Value,
    pattern: &Arc<Pattern>,
    name: &str,
    args: &[Value],
    block: Option<&Block>,
) -> Flow<Value> {
    let value = match name {
        "source" => Value::str(pattern.source()),
        "to_s" => Value::str(pattern.embedded()),
        "inspect" => Value::str(pattern.literal()),
        "options" => Value::Int(pattern.options().bits()),
        "casefold?" => Value::Bool(pattern.options().ignore_case),
        "names" => Value::array(
            pattern
                .regex()
                .capture_names()
                .flatten()
                .map(Value::str)
                .collect(),
        ),
        "match?" => {
            arity(args, 1..=2)?;
            let from = args.get(1).map(int_arg).transpose()?.unwrap_or(0);
            match &args[0] {
                Value::Nil => Value::Bool(false),
                subject => {
                    let text = subject_text(subject)?;
                    let found = byte_offset(&text, from)
                        .is_some_and(|start| pattern.regex().is_match_at(&text, start));
                    Value::Bool(found)
                }
            }
        }
        "=~" => {
            arity(args, 1..=1)?;
            match &args[0] {
                Value::Nil => Value::Nil,
                subject => match_index(pattern, &subject_text(subject)?),
            }
        }
        "===" => {
            arity(args, 1..=1)?;
            Value::Bool(match &args[0] {
                Value::Str(text) | Value::Symbol(text) => pattern.is_match(text),
                _ => false,
            })
        }
        _ => return object::call(interp, receiver, name, args, block),
    };
    Ok(value)
}

/// `Regexp.new`/`compile` and `Regexp.escape`/`quote`.
pub(super) fn call_class(name: &str, args: &[Value]) -> Flow<Value> {
    match name {
        "new" | "compile" => {
            arity(args, 1..=2)?;
            let source = match &args[0] {
                Value::Regexp(pattern) => return Ok(Value::Regexp(Arc::clone(pattern))),
                other => str_arg(other)?,
            };
            let options = match args.get(1) {
                None | Some(Value::Nil | Value::Bool(false)) => PatternOptions::default(),
                Some(Value::Int(bits)) => PatternOptions::from_bits(*bits),
                Some(Value::Str(flags)) => PatternOptions::from_flags(flags).map_err(regexp_error)?,
                Some(_) => PatternOptions {
                    ignore_case: true,
                    ..PatternOptions::default()
                },
            };
            let pattern = Pattern::new(&source, options).map_err(regexp_error)?;
            Ok(Value::regexp(pattern))
        }
        "escape" | "quote" => {
            arity(args, 1..=1)?;
            let text = subject_text(&args[0])?;
            Ok(Value::str(regex::escape(&text)))
        }
        _ => Err(raise(
            "NoMethodError",
            format!("undefined method `{name}' for class Regexp"),
        )),
    }
}

pub(super) fn regexp_error(err: RuntimeError) -> Interrupt {
    raise("RegexpError", err.to_string())
}

/// Strings and symbols can be matched against.
fn subject_text(value: &Value) -> Flow<Arc<str>> {
    match value {
        Value::Str(text) | Value::Symbol(text) => Ok(text.clone()),
        other => Err(conversion_error(other, "String")),
    }
}

/// Byte offset of character `from` (negative counts from the end).
pub(super) fn byte_offset(text: &str, from: i64) -> Option<usize> {
    let len = i64::try_from(text.chars().count()).ok()?;
    let from = if from < 0 { from + len } else { from };
    if from < 0 || from > len {
        return None;
    }
    Some(
        text.char_indices()
            .nth(from as usize)
            .map_or(text.len(), |(idx, _)| idx),
    )
}

/// `=~`: character index of the first match, or nil.
pub(super) fn match_index(pattern: &Pattern, text: &str) -> Value {
    match pattern.find_char_index(text) {
        Some(idx) => Value::Int(idx as i64),
        None => Value::Nil,
    }
}

/// What `sub`/`gsub` put in place of each match.
#[derive(Clone, Copy)]
pub(super) enum Replacement<'a> {
    /// Text with `\1`, `\k<name>`, `\0`/`\&`, `` \` `` and `\'` references.
    Template(&'a str),
    /// The block's result for the matched text.
    Block(&'a Block),
}

pub(super) fn substitute(
    interp: &mut Interpreter<'_>,
    text: &str,
    pattern: &Pattern,
    replacement: Replacement<'_>,
    global: bool,
) -> Flow<String> {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for captures in pattern.regex().captures_iter(text) {
        interp.check()?;
        let Some(whole) = captures.get(0) else {
            continue;
        };
        out.push_str(&text[last..whole.start()]);
        match replacement {
            Replacement::Template(template) => expand(template, text, &captures, &mut out),
            Replacement::Block(block) => {
                let value = interp.yield_block(block, &[Value::str(whole.as_str())])?;
                out.push_str(&interp.to_s(&value)?);
            }
        }
        check_built_len(out.len())?;
        last = whole.end();
        if !global {
            break;
        }
    }
    out.push_str(&text[last..]);
    check_built_len(out.len())?;
    Ok(out)
}

fn expand(template: &str, text: &str, captures: &Captures<'_>, out: &mut String) {
    let group = |index: usize| captures.get(index).map_or("", |m| m.as_str());
    let mut chars = template.char_indices();
    while let Some((_, ch)) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        let Some((at, next)) = chars.next() else {
            out.push('\\');
            break;
        };
        match next {
            '0'..='9' => out.push_str(group(next as usize - '0' as usize)),
            '&' => out.push_str(group(0)),
            '`' => out.push_str(captures.get(0).map_or("", |m| &text[..m.start()])),
            '\'' => out.push_str(captures.get(0).map_or("", |m| &text[m.end()..])),
            '\\' => out.push('\\'),
            'k' => {
                let rest = &template[at + 1..];
                let named = rest
                    .strip_prefix('<')
                    .and_then(|rest| rest.find('>').map(|end| &rest[..end]));
                match named {
                    Some(name) => {
                        out.push_str(captures.name(name).map_or("", |m| m.as_str()));
                        // Skip `<name>`.
                        for _ in 0..name.chars().count() + 2 {
                            chars.next();
                        }
                    }
                    None => out.push_str("\\k"),
                }
            }
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }
}

/// `scan`: every match, or the groups of every match when the pattern has
/// groups.
pub(super) fn scan(interp: &Interpreter<'_>, text: &str, pattern: &Pattern) -> Flow<Vec<Value>> {
    let grouped = pattern.regex().captures_len() > 1;
    let mut found = Vec::new();
    for captures in pattern.regex().captures_iter(text) {
        interp.check()?;
        let item = if grouped {
            Value::array(
                captures
                    .iter()
                    .skip(1)
                    .map(|group| group.map_or(Value::Nil, |m| Value::str(m.as_str())))
                    .collect(),
            )
        } else {
            captures.get(0).map_or(Value::Nil, |m| Value::str(m.as_str()))
        };
        found.push(item);
        check_built_len(found.len())?;
    }
    Ok(found)
}

/// `split(regexp)`: pieces between matches, with trailing empty pieces
/// dropped unless `limit` is negative.
pub(super) fn split(
    interp: &Interpreter<'_>,
    text: &str,
    pattern: &Pattern,
    limit: i64,
) -> Flow<Vec<String>> {
    let mut parts = Vec::new();
    if limit > 0 {
        for part in pattern.regex().splitn(text, limit as usize) {
            interp.check()?;
            parts.push(part.to_owned());
        }
    } else {
        for part in pattern.regex().split(text) {
            interp.check()?;
            parts.push(part.to_owned());
            check_built_len(parts.len())?;
        }
    }
    if limit == 0 {
        while parts.last().is_some_and(String::is_empty) {
            parts.pop();
        }
    }
    Ok(parts)
}
