use std::time::{Duration, Instant};

use peek_eval::{CancellationToken, EvaluationError, Evaluator, EvaluatorOptions};

use super::context;

fn short_evaluator() -> Evaluator {
    Evaluator::new(EvaluatorOptions {
        timeout: Duration::from_millis(30),
        max_call_depth: 16,
    })
}

#[test]
fn infinite_loops_hit_the_deadline() {
    let evaluator = short_evaluator();
    for source in ["loop { }", "while true do end", "until false do end"] {
        let start = Instant::now();
        let err = evaluator.evaluate_source(source, context()).unwrap_err();
        assert_eq!(err, EvaluationError::Timeout, "{source}");
        assert!(err.cause().is_none());
        assert!(start.elapsed() < Duration::from_secs(1), "{source}");
    }
}

#[test]
fn hint_shortens_the_deadline() {
    let evaluator = Evaluator::new(EvaluatorOptions {
        timeout: Duration::from_secs(30),
        max_call_depth: 16,
    });
    let expr = evaluator.compile("loop { }").unwrap();
    let start = Instant::now();
    let err = evaluator
        .evaluate_with_hint(&expr, context(), Some(Duration::from_millis(20)))
        .unwrap_err();
    assert_eq!(err, EvaluationError::Timeout);
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[test]
fn fast_expressions_finish_within_the_deadline() {
    let value = short_evaluator()
        .evaluate_source("names.length", context())
        .unwrap();
    assert_eq!(value.inspect().unwrap(), "3");
}

#[tokio::test]
async fn async_evaluation_times_out_and_cancels() {
    let evaluator = short_evaluator();
    let expr = evaluator.compile("while true do end").unwrap();
    let token = CancellationToken::new();
    let err = evaluator
        .evaluate_async(&expr, context(), token.clone())
        .await
        .unwrap_err();
    assert_eq!(err, EvaluationError::Timeout);
    assert!(token.is_cancelled());

    let cancelled = CancellationToken::new();
    cancelled.cancel();
    let err = evaluator
        .evaluate_async(&expr, context(), cancelled)
        .await
        .unwrap_err();
    assert_eq!(err, EvaluationError::Cancelled);
}

/// Evaluation worker threads currently alive in this process. Linux caps
/// thread names at 15 bytes, so the name is matched by prefix.
#[cfg(target_os = "linux")]
fn live_workers() -> usize {
    let Ok(tasks) = std::fs::read_dir("/proc/self/task") else {
        return 0;
    };
    tasks
        .filter_map(Result::ok)
        .filter_map(|task| std::fs::read_to_string(task.path().join("comm")).ok())
        .filter(|name| name.starts_with("peek-eval-work"))
        .count()
}

#[cfg(target_os = "linux")]
#[test]
fn quadratic_builtins_stop_once_the_deadline_passes() {
    let evaluator = short_evaluator();
    for source in [
        "(1..300000).to_a.uniq.size",
        "((1..300000).to_a - (1..300000).to_a.reverse).size",
        "((1..300000).to_a & (1..300000).to_a).size",
        "(1..300000).to_a.tally.size",
        "(1..300000).to_a.group_by { |n| n }.size",
    ] {
        let err = evaluator.evaluate_source(source, context()).unwrap_err();
        assert_eq!(err, EvaluationError::Timeout, "{source}");
    }

    // Other tests start short-lived workers concurrently; wait for a moment
    // when none is left rather than expecting zero right away.
    let deadline = Instant::now() + Duration::from_secs(10);
    while live_workers() > 0 {
        assert!(
            Instant::now() < deadline,
            "evaluation workers kept running after their deadline"
        );
        std::thread::sleep(Duration::from_millis(20));
    }
}
