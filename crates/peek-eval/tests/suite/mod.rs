use std::sync::Arc;
use std::time::Duration;

use peek_eval::{EvaluationError, Evaluator, EvaluatorOptions, ExecutionContext};
use peek_runtime::{load_call_stack, CallStack, Value};
use serde_json::json;

mod builtins;
mod deep_inputs;
mod host_methods;
mod regexps;
mod sandbox;
mod timeouts;

/// A paused `handle` frame whose receiver is a `Rect` and whose locals
/// cover the common value kinds.
pub(crate) fn stack() -> CallStack {
    let fixture = json!({
        "classes": [
            {
                "name": "Shape",
                "methods": { "area": { "body": "0" }, "label": { "body": "\"shape\"" } },
                "constants": { "SIDES": 0 }
            },
            {
                "name": "Rect",
                "superclass": "Shape",
                "methods": {
                    "area": { "body": "@w * @h" },
                    "scaled_area": { "params": ["k"], "body": "total = area\ntotal *= k\ntotal" },
                    "fact": { "params": ["n"], "body": "n <= 1 ? 1 : n * fact(n - 1)" },
                    "forever": { "params": ["n"], "body": "forever(n + 1)" },
                    "tamper": { "body": "@w = 0" },
                    "sides": { "body": "SIDES + 4" }
                },
                "singleton_methods": { "unit": { "body": "1" } },
                "constants": { "KIND": "rect" }
            }
        ],
        "globals": { "requests": 3 },
        "frames": [{
            "function": "handle",
            "location": { "path": "app/rect.rb", "line": 12 },
            "arguments": { "id": 7 },
            "locals": {
                "rect": { "$id": "r", "$class": "Rect", "fields": { "w": 3, "h": 4 } },
                "names": ["ann", "bob", "cy"],
                "opts": { "$hash": [[{ "$symbol": "mode" }, "fast"], [{ "$symbol": "retries" }, 2]] },
                "limit": 10,
                "ratio": 2.5,
                "nothing": null,
                "started": { "$time": 1614834367.25 }
            },
            "receiver": { "$ref": "r" }
        }]
    });
    load_call_stack(&fixture.to_string()).expect("fixture should load")
}

pub(crate) fn context() -> ExecutionContext {
    let stack = stack();
    let frame = stack.top().cloned().expect("fixture has a frame");
    ExecutionContext::new(frame, Arc::clone(&stack.registry))
}

pub(crate) fn evaluator() -> Evaluator {
    Evaluator::new(EvaluatorOptions {
        // Generous, so slow CI machines do not turn ordinary expressions
        // into timeouts.
        timeout: Duration::from_secs(2),
        max_call_depth: 32,
    })
}

pub(crate) fn eval(source: &str) -> Result<Value, EvaluationError> {
    evaluator().evaluate_source(source, context())
}

/// Evaluate and render the result the way a captured value is rendered.
#[track_caller]
pub(crate) fn eval_inspect(source: &str) -> String {
    match eval(source) {
        Ok(value) => value.inspect().expect("result should inspect"),
        Err(err) => panic!("`{source}` failed: {err}"),
    }
}

#[track_caller]
pub(crate) fn eval_err(source: &str) -> EvaluationError {
    match eval(source) {
        Ok(value) => panic!("`{source}` unexpectedly evaluated to {value:?}"),
        Err(err) => err,
    }
}
