//! Syntax tree of the expression language.
//!
//! Binary and unary operators are method calls on their left operand, as in
//! Ruby, so the sandbox sees every operator as an ordinary dispatch.

use std::sync::Arc;

use peek_runtime::Pattern;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Nil,
    True,
    False,
    SelfRef,
    Int(i64),
    Float(f64),
    Str(String),
    /// String with `#{...}` interpolation.
    Interp(Vec<StrPart>),
    Symbol(String),
    /// Compiled once at parse time and shared by every evaluation.
    Regexp(Arc<Pattern>),
    Array(Vec<Expr>),
    Hash(Vec<(Expr, Expr)>),
    Range {
        start: Box<Expr>,
        end: Box<Expr>,
        exclusive: bool,
    },
    /// A bare identifier: a local variable, or a zero-argument call on `self`.
    Ident(String),
    Const(String),
    ScopedConst {
        scope: Box<Expr>,
        name: String,
    },
    IVar(String),
    CVar(String),
    GVar(String),
    Call(Box<Call>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    If {
        cond: Box<Expr>,
        then_body: Vec<Expr>,
        else_body: Vec<Expr>,
    },
    While {
        cond: Box<Expr>,
        body: Vec<Expr>,
        /// `until` loops run while the condition is false.
        negated: bool,
    },
    Begin(Vec<Expr>),
    Break(Option<Box<Expr>>),
    Next(Option<Box<Expr>>),
    Return(Option<Box<Expr>>),
    Assign {
        target: Target,
        value: Box<Expr>,
    },
    /// `a += 1`, `a ||= x` and friends. `op` is the binary operator name.
    OpAssign {
        target: Target,
        op: String,
        value: Box<Expr>,
    },
    ClassDef {
        name: String,
        body: Vec<Expr>,
    },
    ModuleDef {
        name: String,
        body: Vec<Expr>,
    },
    MethodDef {
        name: String,
        params: Vec<String>,
        body: Vec<Expr>,
    },
    /// `begin ... rescue ... ensure ... end` or a `rescue` modifier.
    Rescue {
        body: Vec<Expr>,
        handlers: Vec<Vec<Expr>>,
        ensure: Vec<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum StrPart {
    Lit(String),
    Code(Vec<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    /// `None` for calls on the implicit `self`.
    pub receiver: Option<Expr>,
    pub name: String,
    pub args: Vec<Expr>,
    pub block: Option<Block>,
    /// `&.`: a nil receiver short-circuits to nil.
    pub safe_nav: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Literal { params: Vec<String>, body: Vec<Expr> },
    /// `&:name`
    Symbol(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Local(String),
    IVar(String),
    CVar(String),
    GVar(String),
    Const(String),
    Attr { receiver: Box<Expr>, name: String },
    Index { receiver: Box<Expr>, args: Vec<Expr> },
}

impl Target {
    pub fn describe(&self) -> &'static str {
        match self {
            Target::Local(_) => "local variable assignment",
            Target::IVar(_) => "instance variable assignment",
            Target::CVar(_) => "class variable assignment",
            Target::GVar(_) => "global variable assignment",
            Target::Const(_) => "constant assignment",
            Target::Attr { .. } => "attribute assignment",
            Target::Index { .. } => "index assignment",
        }
    }
}

impl Call {
    pub fn new(receiver: Option<Expr>, name: impl Into<String>, args: Vec<Expr>) -> Self {
        Self {
            receiver,
            name: name.into(),
            args,
            block: None,
            safe_nav: false,
        }
    }
}

impl Expr {
    pub fn call(receiver: Option<Expr>, name: impl Into<String>, args: Vec<Expr>) -> Expr {
        Expr::Call(Box::new(Call::new(receiver, name, args)))
    }

    pub fn binary(lhs: Expr, op: &str, rhs: Expr) -> Expr {
        Expr::call(Some(lhs), op, vec![rhs])
    }
}
