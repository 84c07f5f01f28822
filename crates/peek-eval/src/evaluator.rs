use std::sync::Arc;
use std::time::Duration;

use peek_config::EvaluationConfig;
use peek_runtime::{ClassRegistry, Frame, Value};
use peek_scheduler::{run_blocking_with_timeout, CancellationToken, TaskError, Watchdog};

use crate::compiler::{self, CompiledExpr};
use crate::error::EvaluationError;
use crate::interpreter::Interpreter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluatorOptions {
    /// Upper bound on the wall-clock time of a single evaluation.
    pub timeout: Duration,
    /// Maximum nesting of interpreted host method calls.
    pub max_call_depth: usize,
}

impl Default for EvaluatorOptions {
    fn default() -> Self {
        Self::from(&EvaluationConfig::default())
    }
}

impl From<&EvaluationConfig> for EvaluatorOptions {
    fn from(config: &EvaluationConfig) -> Self {
        Self {
            timeout: config.timeout(),
            max_call_depth: config.max_call_depth,
        }
    }
}

/// The state an expression is evaluated against: one paused frame and the
/// registry its values refer to.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub frame: Frame,
    pub registry: Arc<ClassRegistry>,
}

impl ExecutionContext {
    pub fn new(frame: Frame, registry: Arc<ClassRegistry>) -> Self {
        Self { frame, registry }
    }
}

/// Runs compiled expressions on a watchdog worker.
///
/// The worker's cancellation token is cancelled as soon as the deadline
/// passes, so a timed-out expression stops reading live state at its next
/// node even though the caller has already moved on.
#[derive(Debug, Clone, Default)]
pub struct Evaluator {
    options: EvaluatorOptions,
    watchdog: Watchdog,
}

impl Evaluator {
    pub fn new(options: EvaluatorOptions) -> Self {
        Self {
            options,
            watchdog: Watchdog::new(),
        }
    }

    pub fn options(&self) -> &EvaluatorOptions {
        &self.options
    }

    pub fn compile(&self, source: &str) -> Result<CompiledExpr, EvaluationError> {
        Ok(compiler::compile(source)?)
    }

    pub fn evaluate(
        &self,
        expr: &CompiledExpr,
        context: ExecutionContext,
    ) -> Result<Value, EvaluationError> {
        self.evaluate_with_hint(expr, context, None)
    }

    /// Like [`Evaluator::evaluate`], with an optional caller-supplied time
    /// budget. The effective deadline is the smaller of the hint and the
    /// configured timeout.
    pub fn evaluate_with_hint(
        &self,
        expr: &CompiledExpr,
        context: ExecutionContext,
        remaining: Option<Duration>,
    ) -> Result<Value, EvaluationError> {
        let deadline = self.deadline(remaining);
        let job = self.job(expr, context);
        let result = self
            .watchdog
            .run_with_deadline(deadline, CancellationToken::new(), job);
        finish(expr, deadline, result)
    }

    /// Compile and evaluate in one step.
    pub fn evaluate_source(
        &self,
        source: &str,
        context: ExecutionContext,
    ) -> Result<Value, EvaluationError> {
        let expr = self.compile(source)?;
        self.evaluate(&expr, context)
    }

    /// Evaluation for callers already running inside a tokio runtime. The
    /// expression runs on the blocking pool; `cancel` aborts it early.
    pub async fn evaluate_async(
        &self,
        expr: &CompiledExpr,
        context: ExecutionContext,
        cancel: CancellationToken,
    ) -> Result<Value, EvaluationError> {
        let deadline = self.options.timeout;
        let job = self.job(expr, context);
        let result = run_blocking_with_timeout(deadline, cancel, job).await;
        finish(expr, deadline, result)
    }

    fn deadline(&self, remaining: Option<Duration>) -> Duration {
        match remaining {
            Some(hint) => hint.min(self.options.timeout),
            None => self.options.timeout,
        }
    }

    fn job(
        &self,
        expr: &CompiledExpr,
        context: ExecutionContext,
    ) -> impl FnOnce(CancellationToken) -> Result<Value, EvaluationError> + Send + 'static {
        let body = Arc::clone(expr.body());
        let max_call_depth = self.options.max_call_depth;
        move |token| {
            let ExecutionContext { frame, registry } = context;
            Interpreter::new(&registry, &token, max_call_depth, &frame).run(&body)
        }
    }
}

fn finish(
    expr: &CompiledExpr,
    deadline: Duration,
    result: Result<Result<Value, EvaluationError>, TaskError>,
) -> Result<Value, EvaluationError> {
    let outcome = match result {
        Ok(outcome) => outcome,
        Err(TaskError::DeadlineExceeded(_)) => {
            tracing::warn!(
                target: "peek.eval",
                deadline_ms = deadline.as_millis() as u64,
                expression = expr.source(),
                "expression evaluation timed out"
            );
            Err(EvaluationError::Timeout)
        }
        Err(TaskError::Cancelled) => Err(EvaluationError::Cancelled),
        Err(TaskError::Panicked) => Err(EvaluationError::Raised(
            "fatal: evaluation panicked".to_owned(),
        )),
        Err(TaskError::Spawn(message)) => Err(EvaluationError::Raised(format!(
            "fatal: unable to start evaluation worker: {message}"
        ))),
    };
    match &outcome {
        Ok(_) => tracing::debug!(target: "peek.eval", expression = expr.source(), "evaluated"),
        Err(err) if err.is_mutation() => tracing::warn!(
            target: "peek.sandbox",
            expression = expr.source(),
            cause = ?err.cause(),
            "expression rejected: {err}"
        ),
        Err(err) => tracing::debug!(
            target: "peek.eval",
            expression = expr.source(),
            "evaluation failed: {err}"
        ),
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use peek_runtime::SourceLocation;

    fn context() -> ExecutionContext {
        let frame = Frame::new("main", SourceLocation::new("main.rb", 1))
            .with_local("x", Value::Int(20));
        ExecutionContext::new(frame, Arc::new(ClassRegistry::new()))
    }

    #[test]
    fn hint_only_shortens_the_deadline() {
        let evaluator = Evaluator::new(EvaluatorOptions {
            timeout: Duration::from_millis(50),
            max_call_depth: 8,
        });
        assert_eq!(
            evaluator.deadline(Some(Duration::from_millis(10))),
            Duration::from_millis(10)
        );
        assert_eq!(
            evaluator.deadline(Some(Duration::from_secs(5))),
            Duration::from_millis(50)
        );
        assert_eq!(evaluator.deadline(None), Duration::from_millis(50));
    }

    #[test]
    fn defaults_follow_config() {
        let options = EvaluatorOptions::default();
        assert_eq!(options.timeout, Duration::from_millis(50));
        assert_eq!(options.max_call_depth, 64);
    }

    #[test]
    fn evaluates_against_frame_locals() {
        let evaluator = Evaluator::default();
        let value = evaluator.evaluate_source("x * 2 + 2", context()).unwrap();
        assert!(matches!(value, Value::Int(42)));
    }

    #[test]
    fn zero_hint_times_out() {
        let evaluator = Evaluator::default();
        let expr = evaluator.compile("loop { }").unwrap();
        let err = evaluator
            .evaluate_with_hint(&expr, context(), Some(Duration::ZERO))
            .unwrap_err();
        assert_eq!(err, EvaluationError::Timeout);
    }
}
