//! Regular expressions as runtime values.
//!
//! Patterns compile with the `regex` crate, whose matching time is linear in
//! the input. Ruby-only syntax such as backreferences and lookaround is
//! rejected at compile time.

use std::fmt;

use regex::{Regex, RegexBuilder};

use crate::RuntimeError;

/// Compiled programs above this many bytes are refused.
const MAX_PROGRAM_SIZE: usize = 1 << 20;

/// `Regexp::IGNORECASE`, `Regexp::EXTENDED` and `Regexp::MULTILINE`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct PatternOptions {
    pub ignore_case: bool,
    pub extended: bool,
    /// Ruby's `m`: `.` also matches a newline.
    pub multiline: bool,
}

impl PatternOptions {
    pub const IGNORECASE: i64 = 1;
    pub const EXTENDED: i64 = 2;
    pub const MULTILINE: i64 = 4;

    /// Options from literal flags such as `im`.
    pub fn from_flags(flags: &str) -> Result<Self, RuntimeError> {
        let mut options = Self::default();
        for flag in flags.chars() {
            match flag {
                'i' => options.ignore_case = true,
                'x' => options.extended = true,
                'm' => options.multiline = true,
                other => {
                    return Err(RuntimeError::Regexp(format!("unknown regexp option: {other}")))
                }
            }
        }
        Ok(options)
    }

    pub fn from_bits(bits: i64) -> Self {
        Self {
            ignore_case: bits & Self::IGNORECASE != 0,
            extended: bits & Self::EXTENDED != 0,
            multiline: bits & Self::MULTILINE != 0,
        }
    }

    pub fn bits(self) -> i64 {
        let mut bits = 0;
        if self.ignore_case {
            bits |= Self::IGNORECASE;
        }
        if self.extended {
            bits |= Self::EXTENDED;
        }
        if self.multiline {
            bits |= Self::MULTILINE;
        }
        bits
    }

    /// The enabled and disabled flags, each in `mix` order.
    fn split(self) -> (String, String) {
        let mut on = String::new();
        let mut off = String::new();
        for (flag, set) in [('m', self.multiline), ('i', self.ignore_case), ('x', self.extended)] {
            if set {
                on.push(flag);
            } else {
                off.push(flag);
            }
        }
        (on, off)
    }
}

/// A compiled regular expression together with the source it came from.
#[derive(Clone)]
pub struct Pattern {
    source: String,
    options: PatternOptions,
    regex: Regex,
}

impl Pattern {
    pub fn new(source: &str, options: PatternOptions) -> Result<Self, RuntimeError> {
        let regex = RegexBuilder::new(&translate(source))
            .case_insensitive(options.ignore_case)
            .ignore_whitespace(options.extended)
            .dot_matches_new_line(options.multiline)
            // `^` and `$` always match at line boundaries in Ruby.
            .multi_line(true)
            .size_limit(MAX_PROGRAM_SIZE)
            .dfa_size_limit(MAX_PROGRAM_SIZE)
            .build()
            .map_err(|err| RuntimeError::Regexp(summary(&err.to_string())))?;
        Ok(Self {
            source: source.to_owned(),
            options,
            regex,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn options(&self) -> PatternOptions {
        self.options
    }

    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    /// Character offset of the first match in `text`.
    pub fn find_char_index(&self, text: &str) -> Option<usize> {
        let found = self.regex.find(text)?;
        Some(text[..found.start()].chars().count())
    }

    /// `/source/flags`, as `inspect` shows it.
    pub fn literal(&self) -> String {
        let (on, _) = self.options.split();
        format!("/{}/{on}", self.source.replace('/', "\\/"))
    }

    /// `(?flags-flags:source)`, as `to_s` and interpolation show it.
    pub fn embedded(&self) -> String {
        let (on, off) = self.options.split();
        let off = if off.is_empty() { off } else { format!("-{off}") };
        format!("(?{on}{off}:{})", self.source)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source && self.options == other.options
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pattern").field(&self.literal()).finish()
    }
}

/// Rewrites Ruby escapes the `regex` syntax spells differently.
fn translate(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('h') => out.push_str("[0-9a-fA-F]"),
            Some('H') => out.push_str("[^0-9a-fA-F]"),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// `regex` errors quote the pattern over several lines; the summary is last.
fn summary(message: &str) -> String {
    let last = message
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .unwrap_or(message)
        .trim();
    last.strip_prefix("error: ").unwrap_or(last).to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn renders_like_ruby() {
        let pattern = Pattern::new("a/b+", PatternOptions::from_flags("mi").unwrap()).unwrap();
        assert_eq!(pattern.literal(), "/a\\/b+/mi");
        assert_eq!(pattern.embedded(), "(?mi-x:a/b+)");
        assert_eq!(pattern.options().bits(), 5);

        let plain = Pattern::new("x", PatternOptions::default()).unwrap();
        assert_eq!(plain.embedded(), "(?-mix:x)");
    }

    #[test]
    fn anchors_match_at_line_boundaries() {
        let pattern = Pattern::new("^b$", PatternOptions::default()).unwrap();
        assert!(pattern.is_match("a\nb\nc"));
        assert_eq!(pattern.find_char_index("é\nb"), Some(2));

        let dot = Pattern::new("a.b", PatternOptions::default()).unwrap();
        assert!(!dot.is_match("a\nb"));
        let dot_all = Pattern::new("a.b", PatternOptions::from_bits(PatternOptions::MULTILINE)).unwrap();
        assert!(dot_all.is_match("a\nb"));
    }

    #[test]
    fn invalid_patterns_and_flags_are_errors() {
        let err = Pattern::new("(a", PatternOptions::default()).unwrap_err();
        assert!(err.to_string().starts_with("invalid regexp:"), "{err}");
        assert!(!err.to_string().contains('\n'));
        assert!(PatternOptions::from_flags("q").is_err());
        assert!(Pattern::new(r"(a)\1", PatternOptions::default()).is_err());
    }

    #[test]
    fn ruby_hex_digit_escapes() {
        let pattern = Pattern::new(r"^\h+$", PatternOptions::default()).unwrap();
        assert!(pattern.is_match("c0ffee"));
        assert!(!pattern.is_match("coffee"));
        assert_eq!(pattern.source(), r"^\h+$");
        let escaped = Pattern::new(r"\\h", PatternOptions::default()).unwrap();
        assert!(escaped.is_match("\\h"));
    }

    #[test]
    fn equality_ignores_the_compiled_program() {
        let a = Pattern::new("a+", PatternOptions::default()).unwrap();
        let b = Pattern::new("a+", PatternOptions::default()).unwrap();
        let c = Pattern::new("a+", PatternOptions::from_flags("i").unwrap()).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
