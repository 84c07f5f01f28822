use std::sync::Arc;

use crate::ast::{Block, Call, Expr, StrPart, Target};
use crate::error::CompileError;
use crate::parser;
use crate::sandbox;

/// How much a compiled body may do to its own scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    /// User-supplied source: no writes of any kind.
    Strict,
    /// Bodies of host methods reached during evaluation: local variables of
    /// the method's own frame may be written.
    Relaxed,
}

/// A parsed and validated expression, cheap to clone and share across hits.
#[derive(Debug, Clone)]
pub struct CompiledExpr {
    source: Arc<str>,
    body: Arc<Vec<Expr>>,
    mode: ValidationMode,
}

impl CompiledExpr {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn mode(&self) -> ValidationMode {
        self.mode
    }

    pub(crate) fn body(&self) -> &Arc<Vec<Expr>> {
        &self.body
    }
}

pub fn compile(source: &str) -> Result<CompiledExpr, CompileError> {
    compile_with_mode(source, ValidationMode::Strict)
}

pub fn compile_with_mode(source: &str, mode: ValidationMode) -> Result<CompiledExpr, CompileError> {
    let body = parser::parse_program(source)?;
    if body.is_empty() {
        return Err(CompileError::syntax("empty expression", 0));
    }
    let validator = Validator { mode };
    validator.stmts(&body)?;
    tracing::debug!(
        target: "peek.eval",
        mode = ?mode,
        len = source.len(),
        "compiled expression"
    );
    Ok(CompiledExpr {
        source: Arc::from(source),
        body: Arc::new(body),
        mode,
    })
}

struct Validator {
    mode: ValidationMode,
}

impl Validator {
    fn stmts(&self, body: &[Expr]) -> Result<(), CompileError> {
        body.iter().try_for_each(|expr| self.expr(expr))
    }

    fn expr(&self, expr: &Expr) -> Result<(), CompileError> {
        match expr {
            Expr::Nil
            | Expr::True
            | Expr::False
            | Expr::SelfRef
            | Expr::Int(_)
            | Expr::Float(_)
            | Expr::Str(_)
            | Expr::Symbol(_)
            | Expr::Regexp(_)
            | Expr::Ident(_)
            | Expr::Const(_)
            | Expr::IVar(_)
            | Expr::CVar(_)
            | Expr::GVar(_) => Ok(()),
            Expr::Interp(parts) => parts.iter().try_for_each(|part| match part {
                StrPart::Lit(_) => Ok(()),
                StrPart::Code(code) => self.stmts(code),
            }),
            Expr::Array(items) | Expr::Begin(items) => self.stmts(items),
            Expr::Hash(entries) => entries.iter().try_for_each(|(key, value)| {
                self.expr(key)?;
                self.expr(value)
            }),
            Expr::Range { start, end, .. } => {
                self.expr(start)?;
                self.expr(end)
            }
            Expr::ScopedConst { scope, .. } => self.expr(scope),
            Expr::Call(call) => self.call(call),
            Expr::Not(inner) => self.expr(inner),
            Expr::And(lhs, rhs) | Expr::Or(lhs, rhs) => {
                self.expr(lhs)?;
                self.expr(rhs)
            }
            Expr::If {
                cond,
                then_body,
                else_body,
            } => {
                self.expr(cond)?;
                self.stmts(then_body)?;
                self.stmts(else_body)
            }
            Expr::While { cond, body, .. } => {
                self.expr(cond)?;
                self.stmts(body)
            }
            Expr::Break(value) | Expr::Next(value) | Expr::Return(value) => {
                value.as_deref().map_or(Ok(()), |value| self.expr(value))
            }
            Expr::Assign { target, value } | Expr::OpAssign { target, value, .. } => {
                self.target(target)?;
                self.expr(value)
            }
            Expr::ClassDef { .. } => Err(CompileError::prohibited("class definition")),
            Expr::ModuleDef { .. } => Err(CompileError::prohibited("module definition")),
            Expr::MethodDef { .. } => Err(CompileError::prohibited("method definition")),
            Expr::Rescue { .. } => Err(CompileError::prohibited("exception handler")),
        }
    }

    fn target(&self, target: &Target) -> Result<(), CompileError> {
        match target {
            Target::Local(_) if self.mode == ValidationMode::Relaxed => Ok(()),
            other => Err(CompileError::prohibited(other.describe())),
        }
    }

    fn call(&self, call: &Call) -> Result<(), CompileError> {
        if let Some(receiver) = &call.receiver {
            self.expr(receiver)?;
        }
        self.stmts(&call.args)?;
        match &call.block {
            None => Ok(()),
            Some(_) if !sandbox::accepts_block(&call.name) => Err(CompileError::prohibited(
                format!("block passed to `{}`", call.name),
            )),
            Some(Block::Symbol(_)) => Ok(()),
            Some(Block::Literal { body, .. }) => self.stmts(body),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected(source: &str) -> String {
        match compile(source) {
            Err(CompileError::Prohibited { construct }) => construct,
            other => panic!("expected `{source}` to be prohibited, got {other:?}"),
        }
    }

    #[test]
    fn read_only_expressions_compile() {
        for source in [
            "a + b * 2",
            "user.name.upcase",
            "items.map { |x| x * 2 }.select(&:even?)",
            "h[:key] || 'default'",
            "x > 3 ? \"big\" : \"small\"",
            "while false do end",
            "\"#{a} and #{b}\"",
        ] {
            assert!(compile(source).is_ok(), "{source}");
        }
    }

    #[test]
    fn strict_mode_rejects_every_write() {
        assert_eq!(rejected("@count = 1"), "instance variable assignment");
        assert_eq!(rejected("@@total += 1"), "class variable assignment");
        assert_eq!(rejected("$stdout = nil"), "global variable assignment");
        assert_eq!(rejected("LIMIT = 3"), "constant assignment");
        assert_eq!(rejected("x = 1"), "local variable assignment");
        assert_eq!(rejected("x += 1"), "local variable assignment");
        assert_eq!(rejected("user.name = 'eve'"), "attribute assignment");
        assert_eq!(rejected("list[0] = 1"), "index assignment");
        assert_eq!(rejected("[1].map { |v| @seen = v }"), "instance variable assignment");
        assert_eq!(rejected("\"#{@x = 1}\""), "instance variable assignment");
    }

    #[test]
    fn definitions_and_handlers_are_rejected() {
        assert_eq!(rejected("class Foo; end"), "class definition");
        assert_eq!(rejected("module M; end"), "module definition");
        assert_eq!(rejected("def hack; end"), "method definition");
        assert_eq!(rejected("risky rescue nil"), "exception handler");
        assert_eq!(rejected("begin; 1; ensure; 2; end"), "exception handler");
    }

    #[test]
    fn blocks_only_go_to_known_iterators() {
        assert_eq!(rejected("define_method(:x) { 1 }"), "block passed to `define_method`");
        assert_eq!(rejected("obj.tap { |o| o }"), "block passed to `tap`");
        assert!(compile("list.each_with_index { |v, i| v }").is_ok());
    }

    #[test]
    fn relaxed_mode_allows_only_local_writes() {
        assert!(compile_with_mode("total = 0\ntotal += 1\ntotal", ValidationMode::Relaxed).is_ok());
        assert!(compile_with_mode("@total = 0", ValidationMode::Relaxed).is_err());
        assert!(compile_with_mode("self.total = 0", ValidationMode::Relaxed).is_err());
    }

    #[test]
    fn syntax_errors_map_to_compilation_failed() {
        let err = compile("a +* b").unwrap_err();
        assert!(matches!(err, CompileError::Syntax { .. }));
        assert!(compile("   ").is_err());
    }
}
