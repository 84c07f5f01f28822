use crate::error::CompileError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Keyword {
    Nil,
    True,
    False,
    SelfKw,
    And,
    Or,
    Not,
    If,
    Unless,
    Elsif,
    Else,
    Then,
    End,
    While,
    Until,
    Do,
    Class,
    Module,
    Def,
    Begin,
    Rescue,
    Ensure,
    Return,
    Break,
    Next,
    Yield,
    Case,
    When,
    Defined,
}

impl Keyword {
    fn from_ident(ident: &str) -> Option<Self> {
        Some(match ident {
            "nil" => Keyword::Nil,
            "true" => Keyword::True,
            "false" => Keyword::False,
            "self" => Keyword::SelfKw,
            "and" => Keyword::And,
            "or" => Keyword::Or,
            "not" => Keyword::Not,
            "if" => Keyword::If,
            "unless" => Keyword::Unless,
            "elsif" => Keyword::Elsif,
            "else" => Keyword::Else,
            "then" => Keyword::Then,
            "end" => Keyword::End,
            "while" => Keyword::While,
            "until" => Keyword::Until,
            "do" => Keyword::Do,
            "class" => Keyword::Class,
            "module" => Keyword::Module,
            "def" => Keyword::Def,
            "begin" => Keyword::Begin,
            "rescue" => Keyword::Rescue,
            "ensure" => Keyword::Ensure,
            "return" => Keyword::Return,
            "break" => Keyword::Break,
            "next" => Keyword::Next,
            "yield" => Keyword::Yield,
            "case" => Keyword::Case,
            "when" => Keyword::When,
            "defined?" => Keyword::Defined,
            _ => return None,
        })
    }

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Keyword::Nil => "nil",
            Keyword::True => "true",
            Keyword::False => "false",
            Keyword::SelfKw => "self",
            Keyword::And => "and",
            Keyword::Or => "or",
            Keyword::Not => "not",
            Keyword::If => "if",
            Keyword::Unless => "unless",
            Keyword::Elsif => "elsif",
            Keyword::Else => "else",
            Keyword::Then => "then",
            Keyword::End => "end",
            Keyword::While => "while",
            Keyword::Until => "until",
            Keyword::Do => "do",
            Keyword::Class => "class",
            Keyword::Module => "module",
            Keyword::Def => "def",
            Keyword::Begin => "begin",
            Keyword::Rescue => "rescue",
            Keyword::Ensure => "ensure",
            Keyword::Return => "return",
            Keyword::Break => "break",
            Keyword::Next => "next",
            Keyword::Yield => "yield",
            Keyword::Case => "case",
            Keyword::When => "when",
            Keyword::Defined => "defined?",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RawStrPart {
    Lit(String),
    /// Interpolated source and the byte offset it starts at.
    Code(String, usize),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    Int(i64),
    Float(f64),
    Str(Vec<RawStrPart>),
    Symbol(String),
    Ident(String),
    Const(String),
    /// `name:` inside hash literals and argument lists.
    Label(String),
    IVar(String),
    CVar(String),
    GVar(String),
    /// `/source/flags`, with `\/` already unescaped.
    Regexp { source: String, flags: String },
    Keyword(Keyword),
    Op(&'static str),
    Newline,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub(crate) kind: TokenKind,
    pub(crate) position: usize,
    /// Whitespace separated this token from the previous one.
    pub(crate) space_before: bool,
}

/// Operators, longest first so that greedy matching picks e.g. `**=` over `**`.
const OPERATORS: &[&str] = &[
    "**=", "<=>", "===", "...", "||=", "&&=", "<<=", ">>=", "**", "==", "!=", ">=", "<=", "&&",
    "||", "<<", ">>", "+=", "-=", "*=", "/=", "%=", "|=", "&=", "^=", "=~", "!~", "..", "::",
    "=>", "->", "&.", "(", ")", "[", "]", "{", "}", ",", ".", ";", "+", "-", "*", "/", "%", "=",
    "<", ">", "!", "?", ":", "|", "&", "^", "~",
];

/// Operator method names that may follow `:` in a symbol literal.
const SYMBOL_OPERATORS: &[&str] = &[
    "[]=", "<=>", "===", "[]", "==", "=~", "!=", "!~", "**", "+@", "-@", "<<", ">>", "<=", ">=",
    "!", "+", "-", "*", "/", "%", "<", ">", "&", "|", "^", "~",
];

/// Whether the previous token ended an operand, which makes a following `/`
/// a division rather than the start of a regexp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Preceding {
    Start,
    Operand,
}

impl Preceding {
    fn after(kind: &TokenKind) -> Self {
        match kind {
            TokenKind::Int(_)
            | TokenKind::Float(_)
            | TokenKind::Str(_)
            | TokenKind::Symbol(_)
            | TokenKind::Ident(_)
            | TokenKind::Const(_)
            | TokenKind::IVar(_)
            | TokenKind::CVar(_)
            | TokenKind::GVar(_)
            | TokenKind::Regexp { .. }
            | TokenKind::Keyword(
                Keyword::Nil | Keyword::True | Keyword::False | Keyword::SelfKw | Keyword::End,
            )
            | TokenKind::Op(")" | "]" | "}") => Preceding::Operand,
            _ => Preceding::Start,
        }
    }
}

pub(crate) struct Lexer<'a> {
    input: &'a [u8],
    src: &'a str,
    pos: usize,
    /// Added to every reported position; non-zero for interpolated code.
    base: usize,
    preceding: Preceding,
}

impl<'a> Lexer<'a> {
    pub(crate) fn new(src: &'a str, base: usize) -> Self {
        Self {
            input: src.as_bytes(),
            src,
            pos: 0,
            base,
            preceding: Preceding::Start,
        }
    }

    pub(crate) fn tokenize(mut self) -> Result<Vec<Token>, CompileError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            self.preceding = Preceding::after(&token.kind);
            let eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if eof {
                return Ok(tokens);
            }
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn peek2(&self) -> Option<u8> {
        self.input.get(self.pos + 1).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.input.get(self.pos + offset).copied()
    }

    fn error(&self, message: impl Into<String>, position: usize) -> CompileError {
        CompileError::syntax(message, self.base + position)
    }

    /// Skips blanks, comments and escaped newlines. Returns whether anything
    /// was skipped.
    fn skip_blanks(&mut self) -> bool {
        let start = self.pos;
        loop {
            match self.peek() {
                Some(b' ' | b'\t' | b'\r' | 0x0C) => self.pos += 1,
                Some(b'\\') if self.peek2() == Some(b'\n') => self.pos += 2,
                Some(b'#') => {
                    while let Some(b) = self.peek() {
                        if b == b'\n' {
                            break;
                        }
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }
        self.pos != start
    }

    fn next_token(&mut self) -> Result<Token, CompileError> {
        let space_before = self.skip_blanks();
        let start = self.pos;
        let position = self.base + start;
        let token = move |kind| Token {
            kind,
            position,
            space_before,
        };

        let Some(b) = self.peek() else {
            return Ok(token(TokenKind::Eof));
        };

        if b == b'\n' {
            self.pos += 1;
            return Ok(token(TokenKind::Newline));
        }
        if b.is_ascii_digit() {
            let kind = self.lex_number()?;
            return Ok(token(kind));
        }
        if b == b'"' {
            self.pos += 1;
            let parts = self.lex_double_quoted(b'"')?;
            return Ok(token(TokenKind::Str(parts)));
        }
        if b == b'\'' {
            self.pos += 1;
            let text = self.lex_single_quoted()?;
            return Ok(token(TokenKind::Str(vec![RawStrPart::Lit(text)])));
        }
        if b == b'@' {
            let (sigil_len, cvar) = if self.peek2() == Some(b'@') {
                (2, true)
            } else {
                (1, false)
            };
            self.pos += sigil_len;
            let name = self.lex_ident_chars();
            if name.is_empty() {
                return Err(self.error("expected a variable name after `@`", start));
            }
            return Ok(token(if cvar {
                TokenKind::CVar(name)
            } else {
                TokenKind::IVar(name)
            }));
        }
        if b == b'$' {
            self.pos += 1;
            let name = self.lex_ident_chars();
            if name.is_empty() {
                return Err(self.error("unsupported global variable", start));
            }
            return Ok(token(TokenKind::GVar(format!("${name}"))));
        }
        if b == b':' && self.peek2() != Some(b':') {
            if let Some(kind) = self.try_lex_symbol()? {
                return Ok(token(kind));
            }
        }
        if is_ident_start(b) {
            return Ok(token(self.lex_word()));
        }
        if b == b'/' && self.preceding == Preceding::Start {
            self.pos += 1;
            return Ok(token(self.lex_regexp()?));
        }

        let rest = &self.input[self.pos..];
        for op in OPERATORS {
            if rest.starts_with(op.as_bytes()) {
                self.pos += op.len();
                return Ok(token(TokenKind::Op(*op)));
            }
        }

        let ch = self.src[self.pos..].chars().next().unwrap_or('?');
        Err(self.error(format!("unexpected character {ch:?}"), start))
    }

    fn lex_ident_chars(&mut self) -> String {
        let start = self.pos;
        while matches!(self.peek(), Some(b) if is_ident_char(b)) {
            self.pos += 1;
        }
        self.src[start..self.pos].to_owned()
    }

    fn lex_word(&mut self) -> TokenKind {
        let mut word = self.lex_ident_chars();

        // `empty?`, `map!`, but not the `!=` in `a!=b`.
        if matches!(self.peek(), Some(b'?' | b'!')) && self.peek2() != Some(b'=') {
            word.push(self.input[self.pos] as char);
            self.pos += 1;
        }

        if self.peek() == Some(b':') && self.peek2() != Some(b':') && !word.ends_with('?') {
            self.pos += 1;
            return TokenKind::Label(word);
        }

        if let Some(keyword) = Keyword::from_ident(&word) {
            return TokenKind::Keyword(keyword);
        }
        if word.starts_with(|ch: char| ch.is_ascii_uppercase()) {
            TokenKind::Const(word)
        } else {
            TokenKind::Ident(word)
        }
    }

    fn try_lex_symbol(&mut self) -> Result<Option<TokenKind>, CompileError> {
        let start = self.pos;
        let Some(next) = self.peek2() else {
            return Ok(None);
        };
        if next == b'"' {
            self.pos += 2;
            let parts = self.lex_double_quoted(b'"')?;
            let mut name = String::new();
            for part in parts {
                match part {
                    RawStrPart::Lit(text) => name.push_str(&text),
                    RawStrPart::Code(..) => {
                        return Err(self.error("interpolated symbols are not supported", start))
                    }
                }
            }
            return Ok(Some(TokenKind::Symbol(name)));
        }
        if is_ident_start(next) || next == b'@' || next == b'$' {
            self.pos += 1;
            let mut name = String::new();
            while matches!(self.peek(), Some(b'@' | b'$')) {
                name.push(self.input[self.pos] as char);
                self.pos += 1;
            }
            name.push_str(&self.lex_ident_chars());
            if matches!(self.peek(), Some(b'?' | b'!' | b'='))
                && !matches!(self.peek2(), Some(b'=' | b'~' | b'>'))
            {
                name.push(self.input[self.pos] as char);
                self.pos += 1;
            }
            return Ok(Some(TokenKind::Symbol(name)));
        }
        let rest = &self.input[self.pos + 1..];
        for op in SYMBOL_OPERATORS {
            if rest.starts_with(op.as_bytes()) {
                self.pos += 1 + op.len();
                return Ok(Some(TokenKind::Symbol((*op).to_owned())));
            }
        }
        Ok(None)
    }

    fn lex_number(&mut self) -> Result<TokenKind, CompileError> {
        let start = self.pos;
        if self.peek() == Some(b'0') && matches!(self.peek2(), Some(b'x' | b'X')) {
            self.pos += 2;
            let digits_start = self.pos;
            while matches!(self.peek(), Some(b) if b.is_ascii_hexdigit() || b == b'_') {
                self.pos += 1;
            }
            let digits: String = self.src[digits_start..self.pos]
                .chars()
                .filter(|ch| *ch != '_')
                .collect();
            return i64::from_str_radix(&digits, 16)
                .map(TokenKind::Int)
                .map_err(|_| self.error("invalid hexadecimal literal", start));
        }

        while matches!(self.peek(), Some(b) if b.is_ascii_digit() || b == b'_') {
            self.pos += 1;
        }
        let mut is_float = false;
        if self.peek() == Some(b'.') && matches!(self.peek2(), Some(b) if b.is_ascii_digit()) {
            is_float = true;
            self.pos += 1;
            while matches!(self.peek(), Some(b) if b.is_ascii_digit() || b == b'_') {
                self.pos += 1;
            }
        }
        if matches!(self.peek(), Some(b'e' | b'E')) {
            let sign = usize::from(matches!(self.peek2(), Some(b'+' | b'-')));
            if matches!(self.peek_at(1 + sign), Some(b) if b.is_ascii_digit()) {
                is_float = true;
                self.pos += 1 + sign;
                while matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
                    self.pos += 1;
                }
            }
        }

        let text: String = self.src[start..self.pos]
            .chars()
            .filter(|ch| *ch != '_')
            .collect();
        if is_float {
            text.parse::<f64>()
                .map(TokenKind::Float)
                .map_err(|_| self.error("invalid float literal", start))
        } else {
            text.parse::<i64>()
                .map(TokenKind::Int)
                .map_err(|_| self.error("integer literal out of range", start))
        }
    }

    fn lex_single_quoted(&mut self) -> Result<String, CompileError> {
        let start = self.pos - 1;
        let mut out = String::new();
        loop {
            let Some(ch) = self.src[self.pos..].chars().next() else {
                return Err(self.error("unterminated string literal", start));
            };
            self.pos += ch.len_utf8();
            match ch {
                '\'' => return Ok(out),
                '\\' if matches!(self.peek(), Some(b'\'' | b'\\')) => {
                    out.push(self.input[self.pos] as char);
                    self.pos += 1;
                }
                ch => out.push(ch),
            }
        }
    }

    fn lex_double_quoted(&mut self, terminator: u8) -> Result<Vec<RawStrPart>, CompileError> {
        let start = self.pos - 1;
        let mut parts = Vec::new();
        let mut lit = String::new();
        loop {
            let Some(ch) = self.src[self.pos..].chars().next() else {
                return Err(self.error("unterminated string literal", start));
            };
            if ch as u32 == u32::from(terminator) {
                self.pos += 1;
                break;
            }
            self.pos += ch.len_utf8();
            match ch {
                '\\' => {
                    let Some(esc) = self.src[self.pos..].chars().next() else {
                        return Err(self.error("unterminated string literal", start));
                    };
                    self.pos += esc.len_utf8();
                    match esc {
                        'n' => lit.push('\n'),
                        't' => lit.push('\t'),
                        'r' => lit.push('\r'),
                        'e' => lit.push('\u{1b}'),
                        's' => lit.push(' '),
                        '0' => lit.push('\0'),
                        'u' => lit.push(self.lex_unicode_escape()?),
                        '\n' => {}
                        other => lit.push(other),
                    }
                }
                '#' if self.peek() == Some(b'{') => {
                    self.pos += 1;
                    let code_start = self.pos;
                    let mut depth = 1usize;
                    while depth > 0 {
                        match self.peek() {
                            None => {
                                return Err(self.error("unterminated interpolation", code_start))
                            }
                            Some(b'{') => depth += 1,
                            Some(b'}') => depth -= 1,
                            _ => {}
                        }
                        self.pos += 1;
                    }
                    if !lit.is_empty() {
                        parts.push(RawStrPart::Lit(std::mem::take(&mut lit)));
                    }
                    let code = self.src[code_start..self.pos - 1].to_owned();
                    parts.push(RawStrPart::Code(code, self.base + code_start));
                }
                ch => lit.push(ch),
            }
        }
        if !lit.is_empty() || parts.is_empty() {
            parts.push(RawStrPart::Lit(lit));
        }
        Ok(parts)
    }

    /// Lexes a regexp literal after its opening `/`, up to the closing `/`
    /// outside any character class, plus trailing option letters.
    fn lex_regexp(&mut self) -> Result<TokenKind, CompileError> {
        let start = self.pos - 1;
        let mut source = String::new();
        let mut class_depth = 0usize;
        loop {
            let Some(ch) = self.src[self.pos..].chars().next() else {
                return Err(self.error("unterminated regexp", start));
            };
            self.pos += ch.len_utf8();
            match ch {
                '\n' => return Err(self.error("unterminated regexp", start)),
                '/' if class_depth == 0 => break,
                '\\' => {
                    let Some(esc) = self.src[self.pos..].chars().next() else {
                        return Err(self.error("unterminated regexp", start));
                    };
                    self.pos += esc.len_utf8();
                    if esc != '/' {
                        source.push('\\');
                    }
                    source.push(esc);
                }
                '#' if self.peek() == Some(b'{') => {
                    return Err(self.error("interpolation in regexps is not supported", self.pos - 1));
                }
                '[' => {
                    class_depth += 1;
                    source.push(ch);
                }
                ']' => {
                    class_depth = class_depth.saturating_sub(1);
                    source.push(ch);
                }
                ch => source.push(ch),
            }
        }
        let flags_start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_alphabetic()) {
            self.pos += 1;
        }
        let flags = self.src[flags_start..self.pos].to_owned();
        Ok(TokenKind::Regexp { source, flags })
    }

    fn lex_unicode_escape(&mut self) -> Result<char, CompileError> {
        let start = self.pos;
        let braced = self.peek() == Some(b'{');
        if braced {
            self.pos += 1;
        }
        let digits_start = self.pos;
        while matches!(self.peek(), Some(b) if b.is_ascii_hexdigit())
            && (braced || self.pos - digits_start < 4)
        {
            self.pos += 1;
        }
        let digits = &self.src[digits_start..self.pos];
        if braced {
            if self.peek() != Some(b'}') {
                return Err(self.error("unterminated unicode escape", start));
            }
            self.pos += 1;
        }
        u32::from_str_radix(digits, 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| self.error("invalid unicode escape", start))
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b >= 0x80
}

fn is_ident_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80
}
