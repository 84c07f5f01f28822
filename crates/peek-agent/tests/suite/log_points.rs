use peek_agent::{Action, LogLevel};
use peek_config::PeekConfig;
use pretty_assertions::assert_eq;
use serde_json::json;

use super::{breakpoint, location, stack};

#[test]
fn log_points_format_every_hit_and_stay_active() {
    let mut bp = breakpoint(
        json!({
            "id": "log",
            "location": location(),
            "action": "LOG",
            "logLevel": "WARNING",
            "logMessageFormat": "total=$0 size=$1 $$ $2",
            "expressions": ["total", "cart.size"]
        }),
        &PeekConfig::default(),
    );
    assert_eq!(bp.action, Action::Log);
    assert_eq!(bp.log_level, LogLevel::Warning);

    for hit in 1..=3 {
        assert!(bp.evaluate(&stack()));
        assert_eq!(bp.hit_count(), hit);
    }
    assert!(!bp.is_complete());
    assert_eq!(bp.last_log_message(), Some("total=10 size=3 $ "));
    assert!(bp.stack_frames().is_empty());
}

#[test]
fn failed_log_arguments_render_their_error() {
    let mut bp = breakpoint(
        json!({
            "id": "log",
            "location": location(),
            "action": "LOG",
            "logMessageFormat": "ratio: $0",
            "expressions": ["total / 0"]
        }),
        &PeekConfig::default(),
    );
    assert!(bp.evaluate(&stack()));
    assert_eq!(bp.last_log_message(), Some("ratio: ZeroDivisionError: divided by 0"));
}

#[test]
fn log_points_respect_their_condition() {
    let mut bp = breakpoint(
        json!({
            "id": "log",
            "location": location(),
            "action": "LOG",
            "condition": "total > 100",
            "logMessageFormat": "big order"
        }),
        &PeekConfig::default(),
    );
    assert!(!bp.evaluate(&stack()));
    assert_eq!(bp.last_log_message(), None);
}

#[test]
fn runaway_nesting_in_log_arguments_is_reported() {
    let mut bp = breakpoint(
        json!({
            "id": "log",
            "location": location(),
            "action": "LOG",
            "logMessageFormat": "deep: $0",
            "expressions": ["(1..20_000).reduce([]) { |acc, x| [acc] }"]
        }),
        &PeekConfig::default(),
    );
    assert!(bp.evaluate(&stack()));
    let message = bp.last_log_message().unwrap();
    assert!(message.starts_with("deep: SystemStackError"), "{message}");
}
