//! `$N` templates of log points.

use peek_eval::EvaluationError;
use peek_runtime::Value;

/// Expand a log-point template.
///
/// `$N` (one or more decimal digits) is replaced by `values[N]`, `$$` by a
/// single `$`. A placeholder without a matching value expands to nothing; a
/// `$` not followed by a digit or another `$` is kept as is.
pub fn format_message(template: &str, values: &[String]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        if let Some(tail) = after.strip_prefix('$') {
            out.push('$');
            rest = tail;
            continue;
        }
        let digits = after.bytes().take_while(u8::is_ascii_digit).count();
        if digits == 0 {
            out.push('$');
            rest = after;
            continue;
        }
        let value = after[..digits]
            .parse::<usize>()
            .ok()
            .and_then(|index| values.get(index));
        if let Some(value) = value {
            out.push_str(value);
        }
        rest = &after[digits..];
    }
    out.push_str(rest);
    out
}

/// Render evaluated log-point arguments: `inspect` text for values, the
/// error description for expressions that failed.
pub fn format_log_values(results: &[Result<Value, EvaluationError>]) -> Vec<String> {
    results
        .iter()
        .map(|result| match result {
            Ok(value) => value
                .inspect()
                .unwrap_or_else(|err| format!("<{}: {err}>", value.type_name())),
            Err(err) => err.to_string(),
        })
        .collect()
}
