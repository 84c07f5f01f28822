//! Sandboxed evaluation of diagnostic expressions.
//!
//! Conditions, watch expressions and log-point arguments are compiled into a
//! validated syntax tree ([`compile`]) and run by a tree-walking interpreter
//! whose every call is checked against the capability tables in [`sandbox`].
//! [`Evaluator`] runs the interpreter on a watchdog worker so a runaway
//! expression cannot hold the paused thread past its deadline.

mod ast;
mod builtins;
mod compiler;
mod error;
mod evaluator;
mod interpreter;
mod lexer;
mod parser;
pub mod sandbox;

pub use compiler::{compile, compile_with_mode, CompiledExpr, ValidationMode};
pub use error::{CompileError, EvaluationError, MutationCause};
pub use evaluator::{Evaluator, EvaluatorOptions, ExecutionContext};
pub use peek_scheduler::CancellationToken;
