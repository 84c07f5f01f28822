//! Ruby-style textual rendering of values.

use std::fmt::Write as _;

use crate::clock::format_time;
use crate::value::{ObjectId, Value, MAX_VALUE_DEPTH};
use crate::RuntimeError;

impl Value {
    /// Developer-facing representation (`inspect`): strings are quoted,
    /// symbols carry their colon, containers render their elements.
    pub fn inspect(&self) -> Result<String, RuntimeError> {
        let mut out = String::new();
        let mut seen = Vec::new();
        write_inspect(self, &mut out, &mut seen)?;
        Ok(out)
    }

    /// User-facing representation (`to_s`), as used by string interpolation.
    pub fn to_display(&self) -> Result<String, RuntimeError> {
        match self {
            Value::Nil => Ok(String::new()),
            Value::Str(s) => Ok(s.to_string()),
            Value::Symbol(s) | Value::Class(s) => Ok(s.to_string()),
            Value::Time(secs) => format_time(*secs),
            Value::Regexp(pattern) => Ok(pattern.embedded()),
            _ => self.inspect(),
        }
    }
}

fn write_inspect(
    value: &Value,
    out: &mut String,
    seen: &mut Vec<ObjectId>,
) -> Result<(), RuntimeError> {
    match value {
        Value::Nil => out.push_str("nil"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Int(i) => {
            let _ = write!(out, "{i}");
        }
        Value::Float(f) => out.push_str(&format_float(*f)),
        Value::Str(s) => write_quoted(s, out),
        Value::Symbol(s) => write_symbol(s, out),
        Value::Range(range) => {
            let op = if range.exclusive { "..." } else { ".." };
            let _ = write!(out, "{}{op}{}", range.start, range.end);
        }
        Value::Time(secs) => out.push_str(&format_time(*secs)?),
        Value::Regexp(pattern) => out.push_str(&pattern.literal()),
        Value::Class(name) => out.push_str(name),
        Value::Foreign(foreign) => {
            let text = foreign.inspect().map_err(|message| RuntimeError::Inspect {
                type_name: foreign.type_name().to_owned(),
                message,
            })?;
            out.push_str(&text);
        }
        Value::Array(heap) => {
            if seen.contains(&heap.id()) || seen.len() >= MAX_VALUE_DEPTH {
                out.push_str("[...]");
                return Ok(());
            }
            seen.push(heap.id());
            let items = heap.snapshot();
            out.push('[');
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    out.push_str(", ");
                }
                write_inspect(item, out, seen)?;
            }
            out.push(']');
            seen.pop();
        }
        Value::Hash(heap) => {
            if seen.contains(&heap.id()) || seen.len() >= MAX_VALUE_DEPTH {
                out.push_str("{...}");
                return Ok(());
            }
            seen.push(heap.id());
            let entries = heap.snapshot();
            out.push('{');
            for (idx, (key, value)) in entries.iter().enumerate() {
                if idx > 0 {
                    out.push_str(", ");
                }
                write_inspect(key, out, seen)?;
                out.push_str("=>");
                write_inspect(value, out, seen)?;
            }
            out.push('}');
            seen.pop();
        }
        Value::Object(heap) => {
            let instance = heap.snapshot();
            if seen.contains(&heap.id()) || seen.len() >= MAX_VALUE_DEPTH {
                let _ = write!(out, "#<{} ...>", instance.class);
                return Ok(());
            }
            seen.push(heap.id());
            let _ = write!(out, "#<{}", instance.class);
            for (idx, (name, value)) in instance.fields.iter().enumerate() {
                out.push_str(if idx == 0 { " " } else { ", " });
                let _ = write!(out, "@{name}=");
                write_inspect(value, out, seen)?;
            }
            out.push('>');
            seen.pop();
        }
    }
    Ok(())
}

pub(crate) fn format_float(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_owned();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Infinity" } else { "-Infinity" }.to_owned();
    }
    if value.fract() == 0.0 && value.abs() < 1e16 {
        return format!("{value:.1}");
    }
    let text = format!("{value}");
    if text.contains('.') || text.contains('e') {
        text
    } else {
        format!("{text}.0")
    }
}

fn write_quoted(s: &str, out: &mut String) {
    out.push('"');
    let mut chars = s.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\u{1b}' => out.push_str("\\e"),
            '#' if matches!(chars.peek(), Some('{' | '$' | '@')) => out.push_str("\\#"),
            ch if ch.is_control() => {
                let _ = write!(out, "\\u{:04X}", ch as u32);
            }
            ch => out.push(ch),
        }
    }
    out.push('"');
}

const OPERATOR_SYMBOLS: &[&str] = &[
    "!", "!=", "!~", "%", "&", "*", "**", "+", "+@", "-", "-@", "/", "<", "<<", "<=", "<=>",
    "==", "===", "=~", ">", ">=", ">>", "[]", "[]=", "^", "`", "|", "~",
];

fn is_plain_symbol(name: &str) -> bool {
    if OPERATOR_SYMBOLS.contains(&name) {
        return true;
    }
    let body = name
        .strip_prefix("@@")
        .or_else(|| name.strip_prefix('@'))
        .or_else(|| name.strip_prefix('$'))
        .unwrap_or(name);
    let body = body
        .strip_suffix('?')
        .or_else(|| body.strip_suffix('!'))
        .or_else(|| body.strip_suffix('='))
        .unwrap_or(body);
    let mut chars = body.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' => {
            chars.all(|ch| ch.is_alphanumeric() || ch == '_')
        }
        _ => false,
    }
}

fn write_symbol(name: &str, out: &mut String) {
    out.push(':');
    if is_plain_symbol(name) {
        out.push_str(name);
    } else {
        write_quoted(name, out);
    }
}
