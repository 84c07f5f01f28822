use peek_eval::{CompileError, EvaluationError, MutationCause};
use pretty_assertions::assert_eq;

use super::{eval_err, eval_inspect};

#[test]
fn literals_and_division_coexist() {
    assert_eq!(eval_inspect("/ab+c/i"), "/ab+c/i");
    assert_eq!(eval_inspect("/ab+c/i.source"), "\"ab+c\"");
    assert_eq!(eval_inspect("/a/mx.options"), "6");
    assert_eq!(eval_inspect(r#""re: #{/a/m}""#), r#""re: (?m-ix:a)""#);
    assert_eq!(eval_inspect("limit / 2 / 1"), "5");
    assert_eq!(eval_inspect("(limit)/2"), "5");
}

#[test]
fn matching() {
    assert_eq!(eval_inspect(r#""GET /users/42" =~ /\d+/"#), "11");
    assert_eq!(eval_inspect("names.first =~ /z/"), "nil");
    assert_eq!(eval_inspect(r#""GET /users" !~ /POST/"#), "true");
    assert_eq!(eval_inspect(r#"/\d/ =~ "a1""#), "1");
    assert_eq!(eval_inspect(r#""Abc".match?(/abc/i)"#), "true");
    assert_eq!(eval_inspect(r#""abc".match?(/a/, 1)"#), "false");
    assert_eq!(eval_inspect("names.any?(/^b/)"), "true");
    assert_eq!(eval_inspect("/^c/ === names.last"), "true");
    assert_eq!(eval_inspect(r#""order-77"[/\d+/]"#), r#""77""#);
    assert_eq!(eval_inspect(r#""héllo wörld".index(/w/)"#), "6");
}

#[test]
fn scanning_and_splitting() {
    assert_eq!(eval_inspect(r#""a1b22c333".scan(/\d+/)"#), r#"["1", "22", "333"]"#);
    assert_eq!(
        eval_inspect(r#""k1=v1;k2=v2".scan(/(\w+)=(\w+)/)"#),
        r#"[["k1", "v1"], ["k2", "v2"]]"#
    );
    assert_eq!(eval_inspect(r#""a, b,c,,".split(/,\s*/)"#), r#"["a", "b", "c"]"#);
}

#[test]
fn substitution() {
    assert_eq!(eval_inspect(r#""aaa".sub(/a/, "b")"#), r#""baa""#);
    assert_eq!(
        eval_inspect(r#""2021-03-04".gsub(/(\d+)-(\d+)-(\d+)/, '\3/\2/\1')"#),
        r#""04/03/2021""#
    );
    assert_eq!(
        eval_inspect(r#""id=7".sub(/(?<key>\w+)=/, '\k<key>: ')"#),
        r#""id: 7""#
    );
    assert_eq!(
        eval_inspect(r#"names.join(" ").gsub(/\b\w/) { |c| c.upcase }"#),
        r#""Ann Bob Cy""#
    );
    // String patterns match literally.
    assert_eq!(eval_inspect(r#""a.b.c".gsub(".", "-")"#), r#""a-b-c""#);
    assert_eq!(eval_inspect(r#""abc".gsub("", "-")"#), r#""-a-b-c-""#);
}

#[test]
fn regexp_class_methods() {
    assert_eq!(
        eval_inspect(r#"Regexp.new("x+", Regexp::IGNORECASE) =~ "aXX""#),
        "1"
    );
    assert_eq!(eval_inspect(r#"Regexp.new("x", "mi")"#), "/x/mi");
    assert_eq!(eval_inspect(r#"Regexp.escape("1.5")"#), r#""1\\.5""#);
}

#[test]
fn bad_patterns_are_errors() {
    let err = eval_err("/(/");
    assert!(
        matches!(err, EvaluationError::Compile(CompileError::Syntax { .. })),
        "{err:?}"
    );
    // Backreferences would need a backtracking engine.
    assert!(matches!(eval_err(r"/(a)\1/"), EvaluationError::Compile(_)));
    assert!(matches!(eval_err("/a/q"), EvaluationError::Compile(_)));
    assert!(matches!(eval_err("/a#{limit}/"), EvaluationError::Compile(_)));

    assert!(eval_err(r#"Regexp.new("(a")"#)
        .to_string()
        .starts_with("RegexpError: invalid regexp"));
    assert!(eval_err(r#""x" =~ "x""#).to_string().starts_with("TypeError"));
    assert!(eval_err(r#""x".gsub(/x/)"#).to_string().starts_with("ArgumentError"));
}

#[test]
fn last_match_state_is_not_reachable() {
    assert_eq!(
        eval_err("Regexp.last_match").cause(),
        Some(MutationCause::ProhibitedNativeCall)
    );
}
