use std::str;

/// Expressions and log templates are short; larger inputs only slow the
/// fuzzer down.
pub const MAX_INPUT_SIZE: usize = 16 * 1024;

/// Returns a UTF-8 view of `data` truncated to `MAX_INPUT_SIZE`, trimming up
/// to 3 bytes when the cut lands inside a multibyte codepoint.
#[inline]
pub fn truncate_utf8(data: &[u8]) -> Option<&str> {
    let cap = data.len().min(MAX_INPUT_SIZE);
    for trim in 0..=3.min(cap) {
        if let Ok(text) = str::from_utf8(&data[..cap - trim]) {
            return Some(text);
        }
    }
    None
}
