//! Bounded-time execution helpers.
//!
//! Expression evaluation must never block the thread that hit a breakpoint for
//! longer than its budget. This crate runs work on a dedicated worker and hands
//! the worker a [`CancellationToken`] that is cancelled once the deadline
//! passes, so cooperative workers stop touching shared state.

use std::time::Duration;

use thiserror::Error;

mod watchdog;

pub use tokio_util::sync::CancellationToken;
pub use watchdog::{run_blocking_with_timeout, run_with_timeout, Watchdog};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("task was cancelled")]
    Cancelled,
    #[error("task panicked")]
    Panicked,
    #[error("deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),
    #[error("failed to spawn worker: {0}")]
    Spawn(String),
}
