use std::sync::mpsc;
use std::time::{Duration, Instant};

use crate::{CancellationToken, TaskError};

const WORKER_THREAD_NAME: &str = "peek-eval-worker";

/// Evaluation recurses through the expression tree; give workers more room than
/// the 2 MiB default so deep (but bounded) expressions do not overflow.
const WORKER_STACK_SIZE: usize = 8 * 1024 * 1024;

/// A best-effort watchdog that bounds evaluation latency.
///
/// The work is executed on a dedicated worker thread. If it exceeds the
/// provided deadline, the token handed to the worker is cancelled and a
/// controlled error is returned to the caller. The worker thread itself cannot
/// be killed, so work run under the watchdog must poll its token.
#[derive(Debug, Clone, Copy)]
pub struct Watchdog;

impl Watchdog {
    pub fn new() -> Self {
        Self
    }

    pub fn run_with_deadline<F, T>(
        &self,
        deadline: Duration,
        cancel: CancellationToken,
        func: F,
    ) -> Result<T, TaskError>
    where
        F: FnOnce(CancellationToken) -> T + Send + 'static,
        T: Send + 'static,
    {
        run_with_timeout(deadline, cancel, func)
    }
}

impl Default for Watchdog {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs `f` on a dedicated worker thread and waits up to `timeout` for it to finish.
///
/// If the timeout elapses, `cancel_token` is cancelled before returning so the
/// worker stops at its next cancellation check.
pub fn run_with_timeout<T, F>(
    timeout: Duration,
    cancel_token: CancellationToken,
    f: F,
) -> Result<T, TaskError>
where
    T: Send + 'static,
    F: FnOnce(CancellationToken) -> T + Send + 'static,
{
    if cancel_token.is_cancelled() {
        return Err(TaskError::Cancelled);
    }

    let (tx, rx) = mpsc::channel::<Result<T, TaskError>>();
    let token_for_task = cancel_token.clone();
    std::thread::Builder::new()
        .name(WORKER_THREAD_NAME.to_string())
        .stack_size(WORKER_STACK_SIZE)
        .spawn(move || {
            let result =
                std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| f(token_for_task)))
                    .map_err(|_| TaskError::Panicked);
            let _ = tx.send(result);
        })
        .map_err(|err| TaskError::Spawn(err.to_string()))?;

    let start = Instant::now();
    let deadline = start + timeout;
    let poll_interval = Duration::from_millis(5);

    loop {
        if cancel_token.is_cancelled() {
            return Err(TaskError::Cancelled);
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            cancel_token.cancel();
            tracing::debug!(
                target: "peek.scheduler",
                timeout_ms = timeout.as_millis() as u64,
                "worker exceeded deadline; cancellation requested"
            );
            return Err(TaskError::DeadlineExceeded(timeout));
        }

        match rx.recv_timeout(remaining.min(poll_interval)) {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(err)) => return Err(err),
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => return Err(TaskError::Panicked),
        }
    }
}

/// Async counterpart of [`run_with_timeout`] for hosts that drive evaluation
/// from a tokio runtime.
///
/// The closure runs on tokio's blocking pool; the awaiting task is released as
/// soon as the deadline passes.
pub async fn run_blocking_with_timeout<T, F>(
    timeout: Duration,
    cancel_token: CancellationToken,
    f: F,
) -> Result<T, TaskError>
where
    T: Send + 'static,
    F: FnOnce(CancellationToken) -> T + Send + 'static,
{
    if cancel_token.is_cancelled() {
        return Err(TaskError::Cancelled);
    }

    let token_for_task = cancel_token.clone();
    let handle = tokio::task::spawn_blocking(move || f(token_for_task));

    tokio::select! {
        biased;
        _ = cancel_token.cancelled() => Err(TaskError::Cancelled),
        result = tokio::time::timeout(timeout, handle) => match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) if err.is_cancelled() => Err(TaskError::Cancelled),
            Ok(Err(_err)) => Err(TaskError::Panicked),
            Err(_elapsed) => {
                cancel_token.cancel();
                Err(TaskError::DeadlineExceeded(timeout))
            }
        }
    }
}
