use std::sync::Arc;
use std::time::Duration;

use peek_agent::{AgentContext, Breakpoint, BreakpointSpec, Reference, Variable};
use peek_config::PeekConfig;
use peek_eval::{Evaluator, EvaluatorOptions};
use pretty_assertions::assert_eq;
use serde_json::json;

use super::{breakpoint, location, stack, stack_with_total};

fn snapshot(expressions: &[&str]) -> Breakpoint {
    breakpoint(
        json!({ "id": "snap", "location": location(), "expressions": expressions }),
        &PeekConfig::default(),
    )
}

#[test]
fn snapshot_captures_expressions_and_frames() {
    let mut bp = snapshot(&["total * 2", "cart.size", "missing_thing"]);
    assert!(bp.evaluate(&stack()));
    assert!(bp.is_complete());
    assert!(bp.final_time().is_some());
    assert_eq!(bp.status(), None);

    let evaluated = bp.evaluated_expressions();
    assert_eq!(evaluated[0], Variable::scalar(Some("total * 2"), "Integer", "20"));
    assert_eq!(evaluated[1], Variable::scalar(Some("cart.size"), "Integer", "3"));
    assert!(evaluated[2].is_error());
    assert_eq!(
        evaluated[2].status.as_ref().map(|s| s.refers_to),
        Some(Reference::VariableValue)
    );

    let frames = bp.stack_frames();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].function, "checkout");
    assert!(frames[0].arguments[0].is_reference());
    assert_eq!(frames[1].locals[0], Variable::scalar(Some("depth"), "Integer", "1"));
    assert!(bp.variable_table().len() > 1);
}

#[test]
fn completion_is_idempotent() {
    let mut bp = snapshot(&[]);
    assert!(bp.evaluate(&stack()));
    let final_time = bp.final_time();
    std::thread::sleep(Duration::from_millis(5));

    bp.complete();
    assert!(!bp.evaluate(&stack()));
    assert_eq!(bp.final_time(), final_time);
    assert_eq!(bp.hit_count(), 1);
}

#[test]
fn frames_past_the_limit_keep_only_their_location() {
    let mut config = PeekConfig::default();
    config.capture.max_frames = 1;
    let mut bp = breakpoint(json!({ "id": "b", "location": location() }), &config);
    assert!(bp.evaluate(&stack()));

    let frames = bp.stack_frames();
    assert_eq!(frames.len(), 2);
    assert!(!frames[0].locals.is_empty());
    assert!(frames[1].locals.is_empty());
    assert_eq!(frames[1].location.path, "app/main.rb");
}

#[test]
fn blank_condition_skips_the_interpreter() {
    // Any evaluation with a zero deadline times out.
    let context = Arc::new(AgentContext {
        evaluator: Evaluator::new(EvaluatorOptions {
            timeout: Duration::ZERO,
            max_call_depth: 8,
        }),
        ..AgentContext::default()
    });
    let spec = |condition: &str| -> BreakpointSpec {
        serde_json::from_value(json!({ "id": "b", "location": location(), "condition": condition }))
            .unwrap()
    };

    let mut blank = Breakpoint::new(spec("   "), Arc::clone(&context));
    assert!(blank.evaluate(&stack()));

    let mut spinning = Breakpoint::new(spec("loop { }"), context);
    assert!(!spinning.evaluate(&stack()));
    assert_eq!(
        spinning.status().map(|s| s.description.as_str()),
        Some("evaluation exceeded time limit")
    );
}

#[test]
fn condition_errors_finalize_after_the_limit() {
    let mut config = PeekConfig::default();
    config.agent.max_condition_errors = 3;
    let mut bp = breakpoint(
        json!({ "id": "b", "location": location(), "condition": "10 / total > 100" }),
        &config,
    );
    let failing = stack_with_total(0);
    let passing = stack_with_total(10);

    assert!(!bp.evaluate(&failing));
    assert!(!bp.evaluate(&failing));
    let status = bp.status().cloned().unwrap();
    assert!(status.is_error);
    assert_eq!(status.refers_to, Reference::BreakpointCondition);
    assert!(status.description.starts_with("ZeroDivisionError"));
    assert!(!bp.is_complete());

    // A clean evaluation resets the streak and clears the status.
    assert!(!bp.evaluate(&passing));
    assert_eq!(bp.status(), None);

    assert!(!bp.evaluate(&failing));
    assert!(!bp.evaluate(&failing));
    assert!(!bp.is_complete());
    assert!(!bp.evaluate(&failing));
    assert!(bp.is_complete());
    assert_eq!(bp.hit_count(), 6);
}

#[test]
fn zero_limit_never_finalizes() {
    let mut config = PeekConfig::default();
    config.agent.max_condition_errors = 0;
    let mut bp = breakpoint(
        json!({ "id": "b", "location": location(), "condition": "nosuch(" }),
        &config,
    );
    for _ in 0..20 {
        assert!(!bp.evaluate(&stack()));
    }
    assert!(!bp.is_complete());
    assert_eq!(
        bp.status().map(|s| s.refers_to),
        Some(Reference::BreakpointCondition)
    );
}

#[test]
fn true_condition_takes_the_snapshot() {
    let mut bp = breakpoint(
        json!({ "id": "b", "location": location(), "condition": "cart.size == 3 && total > 5" }),
        &PeekConfig::default(),
    );
    assert!(bp.evaluate(&stack()));
    assert!(bp.is_complete());
}

#[test]
fn mutating_conditions_are_refused() {
    let mut bp = breakpoint(
        json!({ "id": "b", "location": location(), "condition": "total = 0" }),
        &PeekConfig::default(),
    );
    assert!(!bp.evaluate(&stack()));
    assert!(bp.status().is_some_and(|s| s.is_error));
}

#[test]
fn serializes_for_the_controller() {
    let mut bp = snapshot(&["total"]);
    bp.evaluate(&stack());
    let json = serde_json::to_value(&bp).unwrap();

    assert_eq!(json["id"], "snap");
    assert_eq!(json["isFinalState"], true);
    assert_eq!(json["action"], "CAPTURE");
    assert_eq!(json["location"], location());
    assert_eq!(json["evaluatedExpressions"][0]["value"], "10");
    assert_eq!(json["stackFrames"][0]["function"], "checkout");
    assert_eq!(
        json["variableTable"][0]["status"]["description"],
        "Buffer full. Use an expression to see more data"
    );
    assert!(json.get("condition").is_none());
}

#[test]
fn invalid_requests_are_rejected() {
    let context = Arc::new(AgentContext::default());
    assert!(Breakpoint::from_json("{\"id\": 1}", Arc::clone(&context)).is_err());

    let bp = Breakpoint::from_json(
        r#"{"id":"b","location":{"path":"","line":3}}"#,
        context,
    )
    .unwrap();
    assert!(bp.is_complete());
    assert_eq!(
        bp.status().map(|s| s.refers_to),
        Some(Reference::BreakpointSourceLocation)
    );
}

#[test]
fn runaway_nesting_in_snapshot_expressions_is_reported() {
    let mut bp = snapshot(&["(1..20_000).reduce([]) { |acc, x| [acc] }", "total"]);
    assert!(bp.evaluate(&stack()));

    let evaluated = bp.evaluated_expressions();
    assert!(evaluated[0].is_error());
    let description = &evaluated[0].status.as_ref().unwrap().description;
    assert!(description.starts_with("SystemStackError"), "{description}");
    assert_eq!(evaluated[1], Variable::scalar(Some("total"), "Integer", "10"));
}

#[test]
fn oversized_conditions_fail_to_compile() {
    let condition = format!("{}total", "cart.".repeat(10_000));
    let mut bp = breakpoint(
        json!({ "id": "b", "location": location(), "condition": condition }),
        &PeekConfig::default(),
    );
    assert!(!bp.evaluate(&stack()));
    let status = bp.status().unwrap();
    assert_eq!(status.refers_to, Reference::BreakpointCondition);
    assert!(status.description.contains("nested too deeply"), "{}", status.description);
}
