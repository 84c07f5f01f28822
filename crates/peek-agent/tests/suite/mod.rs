use std::sync::Arc;
use std::time::Duration;

use peek_agent::{AgentContext, Breakpoint, BreakpointSpec};
use peek_config::PeekConfig;
use peek_eval::{Evaluator, EvaluatorOptions};
use peek_runtime::{load_call_stack, CallStack};
use serde_json::{json, Value as Json};

mod breakpoints;
mod capture;
mod config;
mod log_points;

/// Two frames: `checkout` with a shared array and a self-referencing node,
/// and an outer `main` frame.
pub(crate) fn stack_with_total(total: i64) -> CallStack {
    let fixture = json!({
        "classes": [
            { "name": "Cart", "methods": { "size": { "body": "@items.size" } } }
        ],
        "frames": [
            {
                "function": "checkout",
                "location": { "path": "app/cart.rb", "line": 40 },
                "arguments": {
                    "cart": {
                        "$id": "c",
                        "$class": "Cart",
                        "fields": { "items": { "$id": "items", "$array": [1, 2, 3] }, "owner": "ann" }
                    }
                },
                "locals": {
                    "node": { "$id": "n", "$class": "Node", "fields": { "next": { "$ref": "n" }, "value": 1 } },
                    "same": { "$ref": "items" },
                    "socket": { "$opaque": "Socket", "inspect_error": "closed" },
                    "total": total
                },
                "receiver": { "$ref": "c" }
            },
            {
                "function": "main",
                "location": { "path": "app/main.rb", "line": 1 },
                "locals": { "depth": 1 }
            }
        ]
    });
    load_call_stack(&fixture.to_string()).expect("fixture should load")
}

pub(crate) fn stack() -> CallStack {
    stack_with_total(10)
}

pub(crate) fn agent(config: &PeekConfig) -> Arc<AgentContext> {
    let mut context = AgentContext::from_config(config);
    // Generous, so slow CI machines do not turn ordinary expressions into
    // timeouts.
    context.evaluator = Evaluator::new(EvaluatorOptions {
        timeout: Duration::from_secs(2),
        ..EvaluatorOptions::from(&config.evaluation)
    });
    Arc::new(context)
}

pub(crate) fn breakpoint(request: Json, config: &PeekConfig) -> Breakpoint {
    let spec: BreakpointSpec = serde_json::from_value(request).expect("valid request");
    Breakpoint::new(spec, agent(config))
}

pub(crate) fn location() -> Json {
    json!({ "path": "app/cart.rb", "line": 40 })
}
