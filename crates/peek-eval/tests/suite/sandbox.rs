use std::sync::Arc;

use peek_eval::sandbox::{is_call_allowed, ReceiverKind};
use peek_eval::{compile, CompileError, EvaluationError, ExecutionContext, MutationCause};
use peek_runtime::{ClassDef, ClassRegistry, Frame, SourceLocation, Value};

use super::{eval, eval_err, evaluator, stack};

fn cause(source: &str) -> Option<MutationCause> {
    eval_err(source).cause()
}

#[test]
fn writes_are_rejected_before_evaluation() {
    for source in [
        "limit = 3",
        "limit += 1",
        "@w = 0",
        "$requests = 0",
        "rect.w = 0",
        "names[0] = \"eve\"",
        "def area; 1; end",
        "class Rect; end",
        "limit rescue nil",
    ] {
        let err = eval_err(source);
        assert!(
            matches!(err, EvaluationError::Compile(CompileError::Prohibited { .. })),
            "`{source}`: {err:?}"
        );
        assert_eq!(err.cause(), Some(MutationCause::ProhibitedConstruct));
        assert!(err.is_mutation());
    }
}

#[test]
fn syntax_errors_are_compilation_failures() {
    assert_eq!(cause("limit +"), Some(MutationCause::CompilationFailed));
    assert_eq!(cause("(("), Some(MutationCause::CompilationFailed));
}

#[test]
fn mutating_builtins_are_denied() {
    for source in [
        "names.push(\"eve\")",
        "names << \"eve\"",
        "names.clear",
        "opts.delete(:mode)",
        "opts.store(:mode, 1)",
        "names.first.upcase!",
        "names.first.replace(\"x\")",
    ] {
        assert_eq!(cause(source), Some(MutationCause::ProhibitedNativeCall), "{source}");
    }
}

#[test]
fn process_and_io_entry_points_are_denied() {
    for source in ["system(\"ls\")", "puts(1)", "exit", "File.read(\"/etc/passwd\")", "fork"] {
        let err = eval_err(source);
        assert!(err.is_mutation(), "`{source}`: {err:?}");
    }
}

#[test]
fn meta_programming_has_its_own_cause() {
    for source in [
        "names.send(:clear)",
        "rect.instance_variable_set(\"@w\", 0)",
        "Rect.class_eval(\"1\")",
        "rect.method(:area)",
        "send(:exit)",
    ] {
        assert_eq!(cause(source), Some(MutationCause::MetaProgramming), "{source}");
    }
}

#[test]
fn rejected_calls_leave_values_untouched() {
    let stack = stack();
    let frame = stack.top().cloned().unwrap();
    let names = frame.lookup("names").cloned().unwrap();
    let context = ExecutionContext::new(frame, Arc::clone(&stack.registry));

    let err = evaluator()
        .evaluate_source("names.push(1)", context)
        .unwrap_err();
    assert!(err.is_mutation());
    assert_eq!(names.inspect().unwrap(), "[\"ann\", \"bob\", \"cy\"]");
}

#[test]
fn host_natives_need_an_explicit_capability() {
    let mut registry = ClassRegistry::new();
    registry.define_class(
        ClassDef::new("Conn")
            .native("close", |_, _| Ok(Value::Nil))
            .singleton_native("open", |_, _| Ok(Value::Nil)),
    );
    let conn = Value::object("Conn", vec![("fd".to_owned(), Value::Int(4))]);
    let frame = Frame::new("serve", SourceLocation::new("conn.rb", 9)).with_local("conn", conn);
    let context = ExecutionContext::new(frame, Arc::new(registry));
    let evaluator = evaluator();

    let err = evaluator
        .evaluate_source("conn.close", context.clone())
        .unwrap_err();
    assert_eq!(err.cause(), Some(MutationCause::ProhibitedNativeCall));

    let err = evaluator
        .evaluate_source("Conn.open", context.clone())
        .unwrap_err();
    assert_eq!(err.cause(), Some(MutationCause::ProhibitedNativeCall));

    // Field readers are not native calls.
    let value = evaluator.evaluate_source("conn.fd", context).unwrap();
    assert!(matches!(value, Value::Int(4)));
}

#[test]
fn capability_tables_default_to_deny() {
    assert!(!is_call_allowed("Point", "anything", ReceiverKind::Instance));
    assert!(!is_call_allowed("Point", "new", ReceiverKind::Type));
    assert!(is_call_allowed("Symbol", "to_proc", ReceiverKind::Instance));
    assert!(is_call_allowed("Math", "sqrt", ReceiverKind::Type));
}

#[test]
fn compiled_expressions_are_reusable() {
    let expr = compile("limit * 2").unwrap();
    let evaluator = evaluator();
    for _ in 0..3 {
        let value = evaluator.evaluate(&expr, super::context()).unwrap();
        assert!(matches!(value, Value::Int(20)));
    }
    assert!(eval("limit").is_ok());
}
