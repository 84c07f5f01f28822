use peek_eval::{compile, CompileError, EvaluationError};
use pretty_assertions::assert_eq;

use super::{eval, eval_err};

#[test]
fn long_chains_are_rejected_at_compile_time() {
    for source in [
        format!("{}b", "a.".repeat(10_000)),
        format!("{}1", "1+".repeat(10_000)),
        format!("{}true", "true && ".repeat(10_000)),
        format!("{}true", "true and ".repeat(10_000)),
    ] {
        let err = compile(&source).unwrap_err();
        assert!(
            matches!(&err, CompileError::Syntax { message, .. } if message.contains("nested too deeply")),
            "{err:?}"
        );
    }
}

#[test]
fn modest_chains_still_compile() {
    assert!(compile(&format!("{}0", "1 + ".repeat(30))).is_ok());
    assert!(compile("names.map(&:upcase).sort.reverse.first(2).join(\", \").length").is_ok());
}

#[test]
fn deeply_nested_results_are_refused() {
    let err = eval_err("(1..20_000).reduce([]) { |acc, x| [acc] }");
    assert!(err.to_string().starts_with("SystemStackError"), "{err}");
    assert!(!err.is_mutation());

    let err = eval_err("[1, (1..20_000).reduce([]) { |acc, x| [acc] }]");
    assert!(err.to_string().starts_with("SystemStackError"), "{err}");
}

#[test]
fn deep_intermediates_can_still_be_reduced() {
    let value = eval("(1..20_000).reduce([]) { |acc, x| [acc] }.length").unwrap();
    assert_eq!(value.inspect().unwrap(), "1");

    let err = eval_err("(1..20_000).reduce([]) { |acc, x| [acc] }.flatten");
    assert!(err.to_string().contains("nested too deeply"), "{err}");
    assert!(!matches!(err, EvaluationError::Timeout));
}
