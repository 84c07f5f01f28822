//! The breakpoint side of the Peek agent.
//!
//! A [`Breakpoint`] is created from a controller request, checked on every hit
//! against the paused [`CallStack`](peek_runtime::CallStack) and, once its
//! condition holds, either captures a snapshot of the stack into a
//! [`VariableTable`] or emits a log-point message.

pub mod breakpoint;
pub mod capture;
pub mod hardening;
pub mod log_format;
pub mod status;
pub mod variable;
pub mod variable_table;

pub use breakpoint::{Action, AgentContext, Breakpoint, BreakpointSpec, LogLevel};
pub use capture::{Capture, CaptureBudget, CaptureLimits};
pub use log_format::{format_log_values, format_message};
pub use status::{Reference, StatusMessage};
pub use variable::{StackFrame, Variable};
pub use variable_table::VariableTable;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Config(#[from] peek_config::ConfigError),
    #[error(transparent)]
    Runtime(#[from] peek_runtime::RuntimeError),
    #[error("invalid breakpoint request: {0}")]
    InvalidBreakpoint(#[from] serde_json::Error),
    #[error("stack has no frame {0}")]
    MissingFrame(usize),
}

pub type AgentResult<T> = Result<T, AgentError>;
