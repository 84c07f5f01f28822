//! Recursive-descent parser for the expression language.
//!
//! The grammar is a Ruby subset. It parses more than the evaluator will run
//! (definitions, handlers, assignments to instance state) so that validation
//! can reject those constructs by name instead of failing
//! with an opaque syntax error.

use std::sync::Arc;

use peek_runtime::{Pattern, PatternOptions};

use crate::ast::{Block, Call, Expr, StrPart, Target};
use crate::error::CompileError;
use crate::lexer::{Keyword, Lexer, RawStrPart, Token, TokenKind};

/// Maximum syntactic nesting, including interpolated code.
const MAX_NESTING: usize = 64;

pub(crate) fn parse_program(src: &str) -> Result<Vec<Expr>, CompileError> {
    parse_nested(src, 0, 0)
}

fn parse_nested(src: &str, base: usize, depth: usize) -> Result<Vec<Expr>, CompileError> {
    let tokens = Lexer::new(src, base).tokenize()?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth,
        no_do: false,
    };
    let body = parser.parse_stmts()?;
    parser.skip_separators();
    if !parser.at_eof() {
        return Err(parser.unexpected());
    }
    Ok(body)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    /// Set while parsing a loop condition, where `do` opens the loop body
    /// rather than a block.
    no_do: bool,
}

impl Parser {
    fn peek(&self) -> &TokenKind {
        &self.current().kind
    }

    fn current(&self) -> &Token {
        // The token stream always ends with `Eof`; never step past it.
        let idx = self.pos.min(self.tokens.len() - 1);
        &self.tokens[idx]
    }

    fn peek_nth(&self, n: usize) -> &Token {
        let idx = (self.pos + n).min(self.tokens.len() - 1);
        &self.tokens[idx]
    }

    fn bump(&mut self) -> TokenKind {
        let kind = self.current().kind.clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        kind
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek(), TokenKind::Eof)
    }

    fn at_op(&self, op: &str) -> bool {
        matches!(self.peek(), TokenKind::Op(current) if *current == op)
    }

    fn at_keyword(&self, keyword: Keyword) -> bool {
        matches!(self.peek(), TokenKind::Keyword(current) if *current == keyword)
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if self.at_op(op) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: Keyword) -> bool {
        if self.at_keyword(keyword) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect_op(&mut self, op: &str) -> Result<(), CompileError> {
        if self.eat_op(op) {
            Ok(())
        } else {
            Err(self.error(format!("expected `{op}`")))
        }
    }

    fn expect_keyword(&mut self, keyword: Keyword) -> Result<(), CompileError> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(self.error(format!("expected `{}`", keyword.as_str())))
        }
    }

    fn error(&self, message: impl Into<String>) -> CompileError {
        CompileError::syntax(message, self.current().position)
    }

    fn unexpected(&self) -> CompileError {
        let what = match self.peek() {
            TokenKind::Eof => "end of input".to_owned(),
            TokenKind::Newline => "newline".to_owned(),
            TokenKind::Op(op) => format!("`{op}`"),
            TokenKind::Keyword(keyword) => format!("`{}`", keyword.as_str()),
            TokenKind::Ident(name) | TokenKind::Const(name) => format!("`{name}`"),
            TokenKind::Label(name) => format!("`{name}:`"),
            _ => "literal".to_owned(),
        };
        self.error(format!("unexpected {what}"))
    }

    fn skip_newlines(&mut self) {
        while matches!(self.peek(), TokenKind::Newline) {
            self.bump();
        }
    }

    fn skip_separators(&mut self) {
        while matches!(self.peek(), TokenKind::Newline) || self.at_op(";") {
            self.bump();
        }
    }

    fn nested<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, CompileError>,
    ) -> Result<T, CompileError> {
        if self.depth >= MAX_NESTING {
            return Err(self.error("expression is nested too deeply"));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    /// Runs a loop that builds a left-deep chain (`a.b.c`, `1 + 2 + 3`),
    /// restoring the nesting depth its links consumed.
    fn chain<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, CompileError>,
    ) -> Result<T, CompileError> {
        let base = self.depth;
        let result = f(self);
        self.depth = base;
        result
    }

    /// Each link of a chain puts the tree one level deeper.
    fn chain_link(&mut self) -> Result<(), CompileError> {
        if self.depth >= MAX_NESTING {
            return Err(self.error("expression is nested too deeply"));
        }
        self.depth += 1;
        Ok(())
    }

    fn at_stmts_end(&self) -> bool {
        match self.peek() {
            TokenKind::Eof => true,
            TokenKind::Op(op) => matches!(*op, "}" | ")"),
            TokenKind::Keyword(keyword) => matches!(
                keyword,
                Keyword::End
                    | Keyword::Else
                    | Keyword::Elsif
                    | Keyword::Rescue
                    | Keyword::Ensure
                    | Keyword::When
            ),
            _ => false,
        }
    }

    fn parse_stmts(&mut self) -> Result<Vec<Expr>, CompileError> {
        let mut stmts = Vec::new();
        loop {
            self.skip_separators();
            if self.at_stmts_end() {
                return Ok(stmts);
            }
            stmts.push(self.parse_stmt()?);
            let separated = matches!(self.peek(), TokenKind::Newline) || self.at_op(";");
            if !separated && !self.at_stmts_end() {
                return Err(self.unexpected());
            }
        }
    }

    fn parse_stmt(&mut self) -> Result<Expr, CompileError> {
        let mut expr = self.parse_expr_stmt()?;
        loop {
            if self.eat_keyword(Keyword::If) {
                let cond = self.parse_expr_stmt()?;
                expr = Expr::If {
                    cond: Box::new(cond),
                    then_body: vec![expr],
                    else_body: Vec::new(),
                };
            } else if self.eat_keyword(Keyword::Unless) {
                let cond = self.parse_expr_stmt()?;
                expr = Expr::If {
                    cond: Box::new(cond),
                    then_body: Vec::new(),
                    else_body: vec![expr],
                };
            } else if self.at_keyword(Keyword::While) || self.at_keyword(Keyword::Until) {
                let negated = matches!(self.bump(), TokenKind::Keyword(Keyword::Until));
                let cond = self.parse_expr_stmt()?;
                expr = Expr::While {
                    cond: Box::new(cond),
                    body: vec![expr],
                    negated,
                };
            } else if self.eat_keyword(Keyword::Rescue) {
                let fallback = self.parse_expr_stmt()?;
                expr = Expr::Rescue {
                    body: vec![expr],
                    handlers: vec![vec![fallback]],
                    ensure: Vec::new(),
                };
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_expr_stmt(&mut self) -> Result<Expr, CompileError> {
        self.chain(|p| {
            let mut lhs = p.parse_not_keyword()?;
            loop {
                if p.eat_keyword(Keyword::And) {
                    p.chain_link()?;
                    p.skip_newlines();
                    let rhs = p.parse_not_keyword()?;
                    lhs = Expr::And(Box::new(lhs), Box::new(rhs));
                } else if p.eat_keyword(Keyword::Or) {
                    p.chain_link()?;
                    p.skip_newlines();
                    let rhs = p.parse_not_keyword()?;
                    lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
                } else {
                    return Ok(lhs);
                }
            }
        })
    }

    fn parse_not_keyword(&mut self) -> Result<Expr, CompileError> {
        if self.eat_keyword(Keyword::Not) {
            let inner = self.nested(Self::parse_not_keyword)?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_expr()
    }

    fn parse_expr(&mut self) -> Result<Expr, CompileError> {
        self.nested(Self::parse_assignment)
    }

    fn parse_assignment(&mut self) -> Result<Expr, CompileError> {
        let lhs = self.parse_ternary()?;
        let op = match self.peek() {
            TokenKind::Op(op) if *op == "=" || is_op_assign(op) => *op,
            _ => return Ok(lhs),
        };
        let position = self.current().position;
        self.bump();
        self.skip_newlines();
        let target = to_target(lhs)
            .ok_or_else(|| CompileError::syntax("invalid assignment target", position))?;
        let value = Box::new(self.parse_expr()?);
        if op == "=" {
            Ok(Expr::Assign { target, value })
        } else {
            Ok(Expr::OpAssign {
                target,
                op: op.trim_end_matches('=').to_owned(),
                value,
            })
        }
    }

    fn parse_ternary(&mut self) -> Result<Expr, CompileError> {
        let cond = self.parse_range()?;
        if !self.eat_op("?") {
            return Ok(cond);
        }
        self.skip_newlines();
        // `c ? a: b` lexes `a:` as a label.
        let then_expr = if let TokenKind::Label(name) = self.peek().clone() {
            self.bump();
            bare_name(name)
        } else {
            let expr = self.nested(Self::parse_ternary)?;
            self.skip_newlines();
            self.expect_op(":")?;
            expr
        };
        self.skip_newlines();
        let else_expr = self.nested(Self::parse_ternary)?;
        Ok(Expr::If {
            cond: Box::new(cond),
            then_body: vec![then_expr],
            else_body: vec![else_expr],
        })
    }

    fn parse_range(&mut self) -> Result<Expr, CompileError> {
        let start = self.parse_oror()?;
        let exclusive = if self.at_op("..") {
            false
        } else if self.at_op("...") {
            true
        } else {
            return Ok(start);
        };
        self.bump();
        let end = self.parse_oror()?;
        Ok(Expr::Range {
            start: Box::new(start),
            end: Box::new(end),
            exclusive,
        })
    }

    fn parse_oror(&mut self) -> Result<Expr, CompileError> {
        self.chain(|p| {
            let mut lhs = p.parse_andand()?;
            while p.eat_op("||") {
                p.chain_link()?;
                p.skip_newlines();
                let rhs = p.parse_andand()?;
                lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
            }
            Ok(lhs)
        })
    }

    fn parse_andand(&mut self) -> Result<Expr, CompileError> {
        self.chain(|p| {
            let mut lhs = p.parse_equality()?;
            while p.eat_op("&&") {
                p.chain_link()?;
                p.skip_newlines();
                let rhs = p.parse_equality()?;
                lhs = Expr::And(Box::new(lhs), Box::new(rhs));
            }
            Ok(lhs)
        })
    }

    /// One left-associative level of binary operators.
    fn parse_binary_level(
        &mut self,
        ops: &[&'static str],
        next: fn(&mut Self) -> Result<Expr, CompileError>,
    ) -> Result<Expr, CompileError> {
        self.chain(|p| {
            let mut lhs = next(p)?;
            loop {
                let op = match p.peek() {
                    TokenKind::Op(op) if ops.contains(op) => *op,
                    _ => return Ok(lhs),
                };
                p.chain_link()?;
                p.bump();
                p.skip_newlines();
                let rhs = next(p)?;
                lhs = match op {
                    "!=" => Expr::Not(Box::new(Expr::binary(lhs, "==", rhs))),
                    "!~" => Expr::Not(Box::new(Expr::binary(lhs, "=~", rhs))),
                    op => Expr::binary(lhs, op, rhs),
                };
            }
        })
    }

    fn parse_equality(&mut self) -> Result<Expr, CompileError> {
        self.parse_binary_level(&["<=>", "==", "===", "!=", "=~", "!~"], Self::parse_comparison)
    }

    fn parse_comparison(&mut self) -> Result<Expr, CompileError> {
        self.parse_binary_level(&["<", "<=", ">", ">="], Self::parse_bitor)
    }

    fn parse_bitor(&mut self) -> Result<Expr, CompileError> {
        self.parse_binary_level(&["|", "^"], Self::parse_bitand)
    }

    fn parse_bitand(&mut self) -> Result<Expr, CompileError> {
        self.parse_binary_level(&["&"], Self::parse_shift)
    }

    fn parse_shift(&mut self) -> Result<Expr, CompileError> {
        self.parse_binary_level(&["<<", ">>"], Self::parse_additive)
    }

    fn parse_additive(&mut self) -> Result<Expr, CompileError> {
        self.parse_binary_level(&["+", "-"], Self::parse_multiplicative)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, CompileError> {
        self.parse_binary_level(&["*", "/", "%"], Self::parse_unary_minus)
    }

    fn parse_unary_minus(&mut self) -> Result<Expr, CompileError> {
        if self.eat_op("-") {
            let operand = self.nested(Self::parse_unary_minus)?;
            return Ok(match operand {
                Expr::Int(value) => Expr::Int(value.wrapping_neg()),
                Expr::Float(value) => Expr::Float(-value),
                other => Expr::call(Some(other), "-@", Vec::new()),
            });
        }
        self.parse_pow()
    }

    fn parse_pow(&mut self) -> Result<Expr, CompileError> {
        let base = self.parse_bang()?;
        if self.eat_op("**") {
            self.skip_newlines();
            let exponent = self.nested(Self::parse_unary_minus)?;
            return Ok(Expr::binary(base, "**", exponent));
        }
        Ok(base)
    }

    fn parse_bang(&mut self) -> Result<Expr, CompileError> {
        if self.eat_op("!") {
            let inner = self.nested(Self::parse_bang)?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        if self.eat_op("~") {
            let inner = self.nested(Self::parse_bang)?;
            return Ok(Expr::call(Some(inner), "~", Vec::new()));
        }
        if self.eat_op("+") {
            let inner = self.nested(Self::parse_bang)?;
            return Ok(Expr::call(Some(inner), "+@", Vec::new()));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, CompileError> {
        self.chain(|p| {
            let mut expr = p.parse_primary()?;
            loop {
                if matches!(p.peek(), TokenKind::Newline) && p.continues_on_next_line() {
                    p.skip_newlines();
                }
                if p.at_op(".") || p.at_op("&.") {
                    p.chain_link()?;
                    let safe_nav = matches!(p.bump(), TokenKind::Op("&."));
                    p.skip_newlines();
                    let name = p.parse_method_name()?;
                    let mut call = Call::new(Some(expr), name, Vec::new());
                    call.safe_nav = safe_nav;
                    p.parse_call_rest(&mut call)?;
                    expr = Expr::Call(Box::new(call));
                } else if p.eat_op("::") {
                    p.chain_link()?;
                    match p.bump() {
                        TokenKind::Const(name) if !p.call_parens_follow() => {
                            expr = Expr::ScopedConst {
                                scope: Box::new(expr),
                                name,
                            };
                        }
                        TokenKind::Const(name) | TokenKind::Ident(name) => {
                            let mut call = Call::new(Some(expr), name, Vec::new());
                            p.parse_call_rest(&mut call)?;
                            expr = Expr::Call(Box::new(call));
                        }
                        _ => return Err(p.error("expected a name after `::`")),
                    }
                } else if p.at_op("[") && !p.current().space_before {
                    p.chain_link()?;
                    p.bump();
                    let args = p.parse_list("]")?;
                    expr = Expr::call(Some(expr), "[]", args);
                } else {
                    return Ok(expr);
                }
            }
        })
    }

    /// A newline followed by `.method` continues the previous expression.
    fn continues_on_next_line(&self) -> bool {
        let mut n = 0;
        while matches!(self.peek_nth(n).kind, TokenKind::Newline) {
            n += 1;
        }
        matches!(self.peek_nth(n).kind, TokenKind::Op("." | "&."))
    }

    fn call_parens_follow(&self) -> bool {
        self.at_op("(") && !self.current().space_before
    }

    fn parse_method_name(&mut self) -> Result<String, CompileError> {
        match self.bump() {
            TokenKind::Ident(name) | TokenKind::Const(name) => Ok(name),
            TokenKind::Keyword(keyword) => Ok(keyword.as_str().to_owned()),
            // `h.key: v` is never valid; `obj.name:` only appears as a typo.
            TokenKind::Label(name) => Err(self.error(format!("unexpected `{name}:`"))),
            TokenKind::Op(op) if matches!(op, "+" | "-" | "*" | "/" | "%" | "==" | "<" | ">") => {
                Ok(op.to_owned())
            }
            _ => Err(self.error("expected a method name")),
        }
    }

    /// Arguments in parentheses, then an optional block.
    fn parse_call_rest(&mut self, call: &mut Call) -> Result<(), CompileError> {
        if self.call_parens_follow() {
            self.bump();
            let (args, block) = self.parse_call_args()?;
            call.args = args;
            call.block = block;
        }
        if let Some(block) = self.parse_block()? {
            if call.block.is_some() {
                return Err(self.error("both block argument and literal block given"));
            }
            call.block = Some(block);
        }
        Ok(())
    }

    fn parse_call_args(&mut self) -> Result<(Vec<Expr>, Option<Block>), CompileError> {
        let mut args = Vec::new();
        let mut keywords = Vec::new();
        let mut block = None;
        loop {
            self.skip_newlines();
            if self.eat_op(")") {
                break;
            }
            if self.at_op("&") {
                self.bump();
                match self.bump() {
                    TokenKind::Symbol(name) => block = Some(Block::Symbol(name)),
                    _ => return Err(self.error("only `&:symbol` block arguments are supported")),
                }
            } else if let TokenKind::Label(name) = self.peek().clone() {
                self.bump();
                self.skip_newlines();
                let value = self.parse_expr()?;
                keywords.push((Expr::Symbol(name), value));
            } else {
                let value = self.parse_expr_stmt()?;
                if self.eat_op("=>") {
                    self.skip_newlines();
                    let mapped = self.parse_expr()?;
                    keywords.push((value, mapped));
                } else {
                    args.push(value);
                }
            }
            self.skip_newlines();
            if !self.eat_op(",") {
                self.skip_newlines();
                self.expect_op(")")?;
                break;
            }
        }
        if !keywords.is_empty() {
            args.push(Expr::Hash(keywords));
        }
        Ok((args, block))
    }

    fn parse_block(&mut self) -> Result<Option<Block>, CompileError> {
        let closer = if self.at_op("{") {
            "}"
        } else if self.at_keyword(Keyword::Do) && !self.no_do {
            "end"
        } else {
            return Ok(None);
        };
        self.bump();
        self.nested(|p| {
            p.skip_newlines();
            let mut params = Vec::new();
            if p.eat_op("|") {
                loop {
                    match p.bump() {
                        TokenKind::Ident(name) => params.push(name),
                        _ => return Err(p.error("expected a block parameter name")),
                    }
                    if !p.eat_op(",") {
                        break;
                    }
                }
                p.expect_op("|")?;
            }
            let saved = std::mem::replace(&mut p.no_do, false);
            let body = p.parse_stmts();
            p.no_do = saved;
            let body = body?;
            if closer == "}" {
                p.expect_op("}")?;
            } else {
                p.expect_keyword(Keyword::End)?;
            }
            Ok(Some(Block::Literal { params, body }))
        })
    }

    /// Comma-separated expressions up to `closer`, allowing trailing commas
    /// and line breaks.
    fn parse_list(&mut self, closer: &str) -> Result<Vec<Expr>, CompileError> {
        self.nested(|p| {
            let mut items = Vec::new();
            loop {
                p.skip_newlines();
                if p.eat_op(closer) {
                    return Ok(items);
                }
                items.push(p.parse_expr_stmt()?);
                p.skip_newlines();
                if !p.eat_op(",") {
                    p.skip_newlines();
                    p.expect_op(closer)?;
                    return Ok(items);
                }
            }
        })
    }

    fn parse_hash(&mut self) -> Result<Expr, CompileError> {
        self.nested(|p| {
            let mut entries = Vec::new();
            loop {
                p.skip_newlines();
                if p.eat_op("}") {
                    return Ok(Expr::Hash(entries));
                }
                if let TokenKind::Label(name) = p.peek().clone() {
                    p.bump();
                    p.skip_newlines();
                    let value = p.parse_expr()?;
                    entries.push((Expr::Symbol(name), value));
                } else {
                    let key = p.parse_expr()?;
                    p.skip_newlines();
                    p.expect_op("=>")?;
                    p.skip_newlines();
                    let value = p.parse_expr()?;
                    entries.push((key, value));
                }
                p.skip_newlines();
                if !p.eat_op(",") {
                    p.skip_newlines();
                    p.expect_op("}")?;
                    return Ok(Expr::Hash(entries));
                }
            }
        })
    }

    fn parse_string(&mut self, parts: Vec<RawStrPart>) -> Result<Expr, CompileError> {
        if let [RawStrPart::Lit(text)] = parts.as_slice() {
            return Ok(Expr::Str(text.clone()));
        }
        let mut out = Vec::with_capacity(parts.len());
        for part in parts {
            match part {
                RawStrPart::Lit(text) => out.push(StrPart::Lit(text)),
                RawStrPart::Code(code, base) => {
                    if self.depth >= MAX_NESTING {
                        return Err(self.error("expression is nested too deeply"));
                    }
                    out.push(StrPart::Code(parse_nested(&code, base, self.depth + 1)?));
                }
            }
        }
        Ok(Expr::Interp(out))
    }

    fn parse_primary(&mut self) -> Result<Expr, CompileError> {
        let token = self.current().clone();
        match token.kind {
            TokenKind::Int(value) => {
                self.bump();
                Ok(Expr::Int(value))
            }
            TokenKind::Float(value) => {
                self.bump();
                Ok(Expr::Float(value))
            }
            TokenKind::Str(parts) => {
                self.bump();
                let mut expr = self.parse_string(parts)?;
                // Adjacent literals concatenate: `"a" "b"`.
                while let TokenKind::Str(next) = self.peek().clone() {
                    self.bump();
                    let next = self.parse_string(next)?;
                    expr = concat_strings(expr, next);
                }
                Ok(expr)
            }
            TokenKind::Symbol(name) => {
                self.bump();
                Ok(Expr::Symbol(name))
            }
            TokenKind::Regexp { source, flags } => {
                let pattern = PatternOptions::from_flags(&flags)
                    .and_then(|options| Pattern::new(&source, options))
                    .map_err(|err| self.error(err.to_string()))?;
                self.bump();
                Ok(Expr::Regexp(Arc::new(pattern)))
            }
            TokenKind::IVar(name) => {
                self.bump();
                Ok(Expr::IVar(name))
            }
            TokenKind::CVar(name) => {
                self.bump();
                Ok(Expr::CVar(name))
            }
            TokenKind::GVar(name) => {
                self.bump();
                Ok(Expr::GVar(name))
            }
            TokenKind::Ident(name) => {
                self.bump();
                if self.call_parens_follow()
                    || self.at_op("{")
                    || (self.at_keyword(Keyword::Do) && !self.no_do)
                {
                    let mut call = Call::new(None, name, Vec::new());
                    self.parse_call_rest(&mut call)?;
                    return Ok(Expr::Call(Box::new(call)));
                }
                Ok(Expr::Ident(name))
            }
            TokenKind::Const(name) => {
                self.bump();
                if self.call_parens_follow() {
                    let mut call = Call::new(None, name, Vec::new());
                    self.parse_call_rest(&mut call)?;
                    return Ok(Expr::Call(Box::new(call)));
                }
                Ok(Expr::Const(name))
            }
            TokenKind::Op("(") => {
                self.bump();
                self.nested(|p| {
                    let saved = std::mem::replace(&mut p.no_do, false);
                    let body = p.parse_stmts();
                    p.no_do = saved;
                    let mut body = body?;
                    p.skip_separators();
                    p.expect_op(")")?;
                    Ok(match body.len() {
                        0 => Expr::Nil,
                        1 => body.remove(0),
                        _ => Expr::Begin(body),
                    })
                })
            }
            TokenKind::Op("[") => {
                self.bump();
                Ok(Expr::Array(self.parse_list("]")?))
            }
            TokenKind::Op("{") => {
                self.bump();
                self.parse_hash()
            }
            TokenKind::Op("->") => Err(self.error("lambda literals are not supported")),
            TokenKind::Keyword(keyword) => self.parse_keyword(keyword),
            _ => Err(self.unexpected()),
        }
    }

    fn parse_keyword(&mut self, keyword: Keyword) -> Result<Expr, CompileError> {
        match keyword {
            Keyword::Nil => {
                self.bump();
                Ok(Expr::Nil)
            }
            Keyword::True => {
                self.bump();
                Ok(Expr::True)
            }
            Keyword::False => {
                self.bump();
                Ok(Expr::False)
            }
            Keyword::SelfKw => {
                self.bump();
                Ok(Expr::SelfRef)
            }
            Keyword::If | Keyword::Unless => {
                self.bump();
                self.nested(|p| p.parse_if(keyword == Keyword::Unless))
            }
            Keyword::While | Keyword::Until => {
                self.bump();
                self.nested(|p| p.parse_while(keyword == Keyword::Until))
            }
            Keyword::Begin => {
                self.bump();
                self.nested(|p| {
                    let expr = p.parse_body_with_handlers()?;
                    p.expect_keyword(Keyword::End)?;
                    Ok(expr)
                })
            }
            Keyword::Class | Keyword::Module => {
                self.bump();
                self.nested(|p| p.parse_class_or_module(keyword == Keyword::Module))
            }
            Keyword::Def => {
                self.bump();
                self.nested(Self::parse_def)
            }
            Keyword::Return | Keyword::Break | Keyword::Next => {
                self.bump();
                let value = if self.starts_expression() {
                    Some(Box::new(self.parse_expr()?))
                } else {
                    None
                };
                Ok(match keyword {
                    Keyword::Return => Expr::Return(value),
                    Keyword::Break => Expr::Break(value),
                    _ => Expr::Next(value),
                })
            }
            Keyword::Yield | Keyword::Case | Keyword::Defined => Err(self.error(format!(
                "`{}` is not supported in diagnostic expressions",
                keyword.as_str()
            ))),
            _ => Err(self.unexpected()),
        }
    }

    fn starts_expression(&self) -> bool {
        match self.peek() {
            TokenKind::Newline | TokenKind::Eof => false,
            TokenKind::Op(op) => matches!(*op, "(" | "[" | "{" | "-" | "!" | "~"),
            TokenKind::Keyword(keyword) => matches!(
                keyword,
                Keyword::Nil
                    | Keyword::True
                    | Keyword::False
                    | Keyword::SelfKw
                    | Keyword::Not
                    | Keyword::Begin
            ),
            _ => true,
        }
    }

    fn skip_then(&mut self) {
        self.skip_separators();
        if self.eat_keyword(Keyword::Then) {
            self.skip_separators();
        }
    }

    fn parse_if(&mut self, negated: bool) -> Result<Expr, CompileError> {
        let cond = self.parse_expr_stmt()?;
        self.skip_then();
        let body = self.parse_stmts()?;
        let rest = if self.eat_keyword(Keyword::Elsif) {
            vec![self.nested(|p| p.parse_if(false))?]
        } else if self.eat_keyword(Keyword::Else) {
            let rest = self.parse_stmts()?;
            self.expect_keyword(Keyword::End)?;
            rest
        } else {
            self.expect_keyword(Keyword::End)?;
            Vec::new()
        };
        // `elsif` chains consume the shared `end` in the innermost call.
        let (then_body, else_body) = if negated { (rest, body) } else { (body, rest) };
        Ok(Expr::If {
            cond: Box::new(cond),
            then_body,
            else_body,
        })
    }

    fn parse_while(&mut self, negated: bool) -> Result<Expr, CompileError> {
        let saved = std::mem::replace(&mut self.no_do, true);
        let cond = self.parse_expr_stmt();
        self.no_do = saved;
        let cond = cond?;
        self.skip_separators();
        self.eat_keyword(Keyword::Do);
        let body = self.parse_stmts()?;
        self.expect_keyword(Keyword::End)?;
        Ok(Expr::While {
            cond: Box::new(cond),
            body,
            negated,
        })
    }

    /// `stmts [rescue ...]* [else stmts] [ensure stmts]`, up to but not
    /// including the closing `end`.
    fn parse_body_with_handlers(&mut self) -> Result<Expr, CompileError> {
        let body = self.parse_stmts()?;
        let mut handlers = Vec::new();
        while self.eat_keyword(Keyword::Rescue) {
            // Exception classes and the `=> e` binding are irrelevant to
            // validation, which rejects every handler.
            while !matches!(self.peek(), TokenKind::Newline | TokenKind::Eof)
                && !self.at_op(";")
                && !self.at_keyword(Keyword::Then)
            {
                self.bump();
            }
            self.skip_then();
            handlers.push(self.parse_stmts()?);
        }
        let mut body = body;
        if self.eat_keyword(Keyword::Else) {
            body.extend(self.parse_stmts()?);
        }
        let ensure = if self.eat_keyword(Keyword::Ensure) {
            self.parse_stmts()?
        } else {
            Vec::new()
        };
        if handlers.is_empty() && ensure.is_empty() {
            return Ok(Expr::Begin(body));
        }
        Ok(Expr::Rescue {
            body,
            handlers,
            ensure,
        })
    }

    fn parse_class_or_module(&mut self, module: bool) -> Result<Expr, CompileError> {
        let mut name = match self.bump() {
            TokenKind::Const(name) => name,
            _ => return Err(self.error("expected a class name")),
        };
        while self.eat_op("::") {
            match self.bump() {
                TokenKind::Const(part) => {
                    name.push_str("::");
                    name.push_str(&part);
                }
                _ => return Err(self.error("expected a class name")),
            }
        }
        if !module && self.eat_op("<") {
            self.parse_expr()?;
        }
        let body = self.parse_stmts()?;
        self.expect_keyword(Keyword::End)?;
        Ok(if module {
            Expr::ModuleDef { name, body }
        } else {
            Expr::ClassDef { name, body }
        })
    }

    fn parse_def(&mut self) -> Result<Expr, CompileError> {
        let mut name = self.parse_method_name()?;
        if name == "self" && self.eat_op(".") {
            name = self.parse_method_name()?;
        }
        if self.at_op("=") && !self.current().space_before {
            self.bump();
            name.push('=');
        }
        let mut params = Vec::new();
        let parenthesized = self.eat_op("(");
        loop {
            match self.peek().clone() {
                TokenKind::Ident(param) => {
                    self.bump();
                    params.push(param);
                    if !self.eat_op(",") {
                        break;
                    }
                }
                _ => break,
            }
        }
        if parenthesized {
            self.expect_op(")")?;
        }
        let body = match self.parse_body_with_handlers()? {
            Expr::Begin(body) => body,
            other => vec![other],
        };
        self.expect_keyword(Keyword::End)?;
        Ok(Expr::MethodDef { name, params, body })
    }
}

fn is_op_assign(op: &str) -> bool {
    matches!(
        op,
        "+=" | "-=" | "*=" | "/=" | "%=" | "**=" | "||=" | "&&=" | "|=" | "&=" | "^=" | "<<=" | ">>="
    )
}

fn bare_name(name: String) -> Expr {
    if name.starts_with(|ch: char| ch.is_ascii_uppercase()) {
        Expr::Const(name)
    } else {
        Expr::Ident(name)
    }
}

fn to_target(expr: Expr) -> Option<Target> {
    Some(match expr {
        Expr::Ident(name) => Target::Local(name),
        Expr::IVar(name) => Target::IVar(name),
        Expr::CVar(name) => Target::CVar(name),
        Expr::GVar(name) => Target::GVar(name),
        Expr::Const(name) => Target::Const(name),
        Expr::ScopedConst { name, .. } => Target::Const(name),
        Expr::Call(call) => {
            let Call {
                receiver,
                name,
                args,
                block,
                ..
            } = *call;
            let receiver = receiver?;
            if block.is_some() {
                return None;
            }
            if name == "[]" {
                Target::Index {
                    receiver: Box::new(receiver),
                    args,
                }
            } else if args.is_empty() {
                Target::Attr {
                    receiver: Box::new(receiver),
                    name,
                }
            } else {
                return None;
            }
        }
        _ => return None,
    })
}

fn concat_strings(lhs: Expr, rhs: Expr) -> Expr {
    let into_parts = |expr: Expr| match expr {
        Expr::Str(text) => vec![StrPart::Lit(text)],
        Expr::Interp(parts) => parts,
        other => vec![StrPart::Code(vec![other])],
    };
    match (lhs, rhs) {
        (Expr::Str(mut a), Expr::Str(b)) => {
            a.push_str(&b);
            Expr::Str(a)
        }
        (lhs, rhs) => {
            let mut parts = into_parts(lhs);
            parts.extend(into_parts(rhs));
            Expr::Interp(parts)
        }
    }
}
