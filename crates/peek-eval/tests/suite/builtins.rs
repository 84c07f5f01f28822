use pretty_assertions::assert_eq;

use super::{eval, eval_err, eval_inspect};

#[test]
fn arithmetic_and_comparisons() {
    assert_eq!(eval_inspect("1 + 2 * 3"), "7");
    assert_eq!(eval_inspect("-7 / 2"), "-4");
    assert_eq!(eval_inspect("2 ** 10"), "1024");
    assert_eq!(eval_inspect("ratio * 2"), "5.0");
    assert_eq!(eval_inspect("limit > 5 && id == 7"), "true");
    assert_eq!(eval_inspect("limit.between?(1, 20)"), "true");
    assert_eq!(eval_inspect("limit <=> 11"), "-1");
}

#[test]
fn runtime_errors_are_reported_as_raised() {
    assert_eq!(
        eval_err("limit / 0").to_string(),
        "ZeroDivisionError: divided by 0"
    );
    assert_eq!(
        eval_err("nothing.length").to_string(),
        "NoMethodError: undefined method `length' for nil"
    );
    assert_eq!(
        eval_err("opts.fetch(:missing)").to_string(),
        "KeyError: key not found: :missing"
    );
    assert!(eval_err("9223372036854775807 + 1")
        .to_string()
        .starts_with("RangeError"));
}

#[test]
fn locals_arguments_and_safe_navigation() {
    assert_eq!(eval_inspect("id"), "7");
    assert_eq!(eval_inspect("nothing&.length"), "nil");
    assert_eq!(eval_inspect("nothing.nil?"), "true");
    assert_eq!(eval_inspect("$requests"), "3");
    assert_eq!(eval_inspect("$unset"), "nil");
}

#[test]
fn strings_and_interpolation() {
    assert_eq!(eval_inspect("names.first.upcase"), "\"ANN\"");
    assert_eq!(eval_inspect("\"#{names.first} has #{limit} items\""), "\"ann has 10 items\"");
    assert_eq!(eval_inspect("names.join(\", \")"), "\"ann, bob, cy\"");
    assert_eq!(eval_inspect("\"a,b,,c\".split(\",\")"), "[\"a\", \"b\", \"\", \"c\"]");
    assert_eq!(eval_inspect("\"hello\"[1]"), "\"e\"");
    assert_eq!(eval_inspect("format(\"%05.1f|%-4s|%x\", ratio, \"ab\", 255)"), "\"002.5|ab  |ff\"");
}

#[test]
fn collections_and_blocks() {
    assert_eq!(eval_inspect("[1, 2, 3].map { |x| x * 2 }.sum"), "12");
    assert_eq!(eval_inspect("names.map(&:upcase)"), "[\"ANN\", \"BOB\", \"CY\"]");
    assert_eq!(eval_inspect("(1..10).select { |n| n % 2 == 0 }"), "[2, 4, 6, 8, 10]");
    assert_eq!(eval_inspect("[3, 1, 2].sort.reverse"), "[3, 2, 1]");
    assert_eq!(
        eval_inspect("names.group_by(&:length)"),
        "{3=>[\"ann\", \"bob\"], 2=>[\"cy\"]}"
    );
    assert_eq!(eval_inspect("names.find { |n| n.start_with?(\"b\") }"), "\"bob\"");
    assert_eq!(eval_inspect("[1, 2, 3].reduce(0) { |acc, x| acc + x }"), "6");
    assert_eq!(eval_inspect("[1, 2, 3].each { |x| break x * 10 if x == 2 }"), "20");
}

#[test]
fn hashes() {
    assert_eq!(eval_inspect("opts[:mode]"), "\"fast\"");
    assert_eq!(eval_inspect("opts.keys"), "[:mode, :retries]");
    assert_eq!(eval_inspect("opts.map { |k, v| k }"), "[:mode, :retries]");
    assert_eq!(eval_inspect("opts.key?(:retries)"), "true");
    assert_eq!(eval_inspect("{a: 1}.merge({b: 2})"), "{:a=>1, :b=>2}");
}

#[test]
fn ranges_are_lazy() {
    assert_eq!(eval_inspect("(1..1_000_000_000).sum"), "500000000500000000");
    assert_eq!(eval_inspect("(1...10).size"), "9");
    assert_eq!(eval_inspect("(1..1_000_000_000).include?(42)"), "true");
    assert!(eval("(1..1_000_000_000).to_a").is_err());
    assert_eq!(eval_inspect("(1..10).step(3).to_a"), "[1, 4, 7, 10]");
    assert_eq!(eval_inspect("(1...10).step(3).to_a"), "[1, 4, 7]");
    assert_eq!(eval_inspect("(9_223_372_036_854_775_806..9_223_372_036_854_775_807).step(5).to_a"), "[9223372036854775806]");
}

#[test]
fn set_operations() {
    assert_eq!(eval_inspect("[1, 2, 2, 3] - [2]"), "[1, 3]");
    assert_eq!(eval_inspect("[1, 2, 2, 3] & [3, 2, 5]"), "[2, 3]");
    assert_eq!(eval_inspect("[1, 2] | [2, 3]"), "[1, 2, 3]");
    assert_eq!(eval_inspect("[1, 1.0, 2].uniq"), "[1, 2]");
    assert_eq!(eval_inspect("names.tally.values"), "[1, 1, 1]");
}

#[test]
fn math_time_and_class_checks() {
    assert_eq!(eval_inspect("Math.sqrt(16)"), "4.0");
    assert_eq!(eval_inspect("Integer.sqrt(17)"), "4");
    assert_eq!(eval_inspect("Math::PI.round(2)"), "3.14");
    assert_eq!(eval_inspect("started.strftime(\"%Y-%m-%d\")"), "\"2021-03-04\"");
    assert_eq!(eval_inspect("started.year"), "2021");
    assert_eq!(eval_inspect("[started.month, started.day, started.wday]"), "[3, 4, 4]");
    assert_eq!(eval_inspect("started.usec"), "250000");
    assert_eq!(eval_inspect("started.strftime(\"%A %B %e %H:%M:%S.%L\")"), "\"Thursday March  4 05:06:07.250\"");
    assert_eq!(eval_inspect("(started + 86_400).strftime(\"%a %j\")"), "\"Fri 064\"");
    assert!(eval_err("Time.at(1e300).year").to_string().contains("out of range"));
    assert_eq!(eval_inspect("Integer === limit"), "true");
    assert_eq!(eval_inspect("limit.is_a?(Numeric)"), "true");
    assert_eq!(eval_inspect("ratio.class"), "Float");
}

#[test]
fn conditionals_and_loops() {
    assert_eq!(eval_inspect("limit > 5 ? \"big\" : \"small\""), "\"big\"");
    assert_eq!(eval_inspect("\"odd\" unless limit.even?"), "nil");
    assert_eq!(eval_inspect("while false do end"), "nil");
    assert_eq!(eval_inspect("limit.times.to_a.last"), "9");
}
