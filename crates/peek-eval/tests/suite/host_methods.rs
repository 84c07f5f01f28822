use pretty_assertions::assert_eq;

use peek_eval::{EvaluationError, MutationCause};

use super::{eval_err, eval_inspect};

#[test]
fn interpreted_methods_run_against_the_receiver() {
    assert_eq!(eval_inspect("rect.area"), "12");
    assert_eq!(eval_inspect("area"), "12");
    assert_eq!(eval_inspect("@w + @h"), "7");
    assert_eq!(eval_inspect("rect.label"), "\"shape\"");
    assert_eq!(eval_inspect("rect.fact(5)"), "120");
    assert_eq!(eval_inspect("Rect.unit"), "1");
}

#[test]
fn method_bodies_may_write_their_own_locals() {
    assert_eq!(eval_inspect("rect.scaled_area(2)"), "24");
    // The method's locals do not leak into the caller's scope.
    assert_eq!(
        eval_err("rect.scaled_area(2); total").to_string(),
        "NameError: undefined local variable or method `total' for an instance of Rect"
    );
}

#[test]
fn constants_resolve_through_the_class_chain() {
    assert_eq!(eval_inspect("Rect::KIND"), "\"rect\"");
    assert_eq!(eval_inspect("rect.sides"), "4");
    assert_eq!(eval_inspect("Rect.superclass"), "Shape");
    assert_eq!(eval_inspect("rect.is_a?(Shape)"), "true");
    assert_eq!(eval_inspect("rect.class.name"), "\"Rect\"");
}

#[test]
fn mutating_method_bodies_are_rejected() {
    let err = eval_err("rect.tamper");
    assert_eq!(err.cause(), Some(MutationCause::ProhibitedMethodBody));
    assert!(err.is_mutation());
}

#[test]
fn recursion_is_bounded() {
    assert_eq!(
        eval_err("rect.forever(0)"),
        EvaluationError::Raised("SystemStackError: stack level too deep".to_owned())
    );
}

#[test]
fn arity_is_checked() {
    let err = eval_err("rect.fact");
    assert_eq!(
        err.to_string(),
        "ArgumentError: wrong number of arguments (given 0, expected 1)"
    );
}
