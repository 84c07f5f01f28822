//! Capability tables consulted on every call the interpreter dispatches.
//!
//! The tables are built once per process and never change afterwards. A call
//! is allowed when the receiver's type (or a builtin ancestor of it) is
//! immutable, or when the `(owner, member)` pair is listed for the receiver
//! kind. Everything else is denied, including every native method of a host
//! class unless it has an exact entry.

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

/// Whether the receiver of a call is a class value or an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverKind {
    Type,
    Instance,
}

/// Types whose instances cannot carry externally observable state.
const IMMUTABLE_TYPES: &[&str] = &[
    "Integer",
    "Float",
    "TrueClass",
    "FalseClass",
    "NilClass",
    "Symbol",
    "Regexp",
    "Range",
    "Time",
    "FormatMessage",
];

const CLASS_METHODS: &[(&str, &[&str])] = &[
    (
        "Math",
        &[
            "sqrt", "cbrt", "sin", "cos", "tan", "atan", "atan2", "exp", "log", "log2", "log10",
            "hypot",
        ],
    ),
    ("Time", &["now", "at"]),
    ("Regexp", &["new", "compile", "escape", "quote"]),
    ("Integer", &["sqrt"]),
];

const INSTANCE_METHODS: &[(&str, &[&str])] = &[
    ("BasicObject", &["==", "!=", "!", "equal?"]),
    (
        "Object",
        &[
            "==",
            "!=",
            "!",
            "===",
            "=~",
            "equal?",
            "eql?",
            "hash",
            "class",
            "inspect",
            "to_s",
            "nil?",
            "is_a?",
            "kind_of?",
            "instance_of?",
            "respond_to?",
            "frozen?",
            "instance_variables",
            "instance_variable_get",
            "instance_variable_defined?",
            "object_id",
            "itself",
            "then",
        ],
    ),
    (
        "Kernel",
        &["format", "sprintf", "Integer", "Float", "String", "Array", "loop"],
    ),
    ("Comparable", &["<", "<=", ">", ">=", "between?", "clamp"]),
    (
        "Enumerable",
        &[
            "each",
            "each_with_index",
            "map",
            "collect",
            "flat_map",
            "select",
            "filter",
            "filter_map",
            "reject",
            "find",
            "detect",
            "find_index",
            "count",
            "all?",
            "any?",
            "none?",
            "include?",
            "member?",
            "sum",
            "min",
            "max",
            "min_by",
            "max_by",
            "sort",
            "sort_by",
            "group_by",
            "partition",
            "reduce",
            "inject",
            "to_a",
            "entries",
            "first",
            "take",
            "drop",
            "uniq",
            "zip",
            "tally",
        ],
    ),
    (
        "Array",
        &[
            "length", "size", "empty?", "last", "[]", "at", "fetch", "dig", "index", "reverse",
            "compact", "flatten", "join", "+", "-", "&", "|", "*", "<=>",
        ],
    ),
    (
        "Hash",
        &[
            "length",
            "size",
            "empty?",
            "[]",
            "fetch",
            "dig",
            "key?",
            "has_key?",
            "value?",
            "has_value?",
            "key",
            "keys",
            "values",
            "each_pair",
            "merge",
            "invert",
            "to_h",
            "transform_values",
        ],
    ),
    (
        "String",
        &[
            "length",
            "size",
            "bytesize",
            "empty?",
            "upcase",
            "downcase",
            "capitalize",
            "swapcase",
            "reverse",
            "strip",
            "lstrip",
            "rstrip",
            "chomp",
            "chars",
            "bytes",
            "lines",
            "split",
            "include?",
            "start_with?",
            "end_with?",
            "index",
            "[]",
            "slice",
            "+",
            "*",
            "%",
            "<=>",
            "to_str",
            "to_sym",
            "to_i",
            "to_f",
            "center",
            "ljust",
            "rjust",
            "count",
            "each_char",
            "sub",
            "gsub",
            "match?",
            "scan",
            "ord",
        ],
    ),
    ("Class", &["name", "to_s", "inspect", "==", "superclass"]),
];

/// Reflective entry points that could reach arbitrary methods or rewrite
/// the program.
const META_PROGRAMMING: &[&str] = &[
    "send",
    "__send__",
    "public_send",
    "eval",
    "instance_eval",
    "instance_exec",
    "class_eval",
    "class_exec",
    "module_eval",
    "define_method",
    "define_singleton_method",
    "instance_variable_set",
    "class_variable_set",
    "const_set",
    "remove_const",
    "remove_method",
    "undef_method",
    "alias_method",
    "extend",
    "include",
    "prepend",
    "binding",
    "method",
];

/// Calls that may receive a literal block or `&:symbol`.
const BLOCK_ACCEPTING: &[&str] = &[
    "each",
    "each_with_index",
    "each_pair",
    "each_char",
    "map",
    "collect",
    "flat_map",
    "select",
    "filter",
    "filter_map",
    "reject",
    "find",
    "detect",
    "find_index",
    "count",
    "all?",
    "any?",
    "none?",
    "sum",
    "min_by",
    "max_by",
    "sort_by",
    "group_by",
    "partition",
    "reduce",
    "inject",
    "times",
    "upto",
    "downto",
    "step",
    "loop",
    "sort",
    "uniq",
    "max",
    "min",
    "then",
    "transform_values",
    "fetch",
    "sub",
    "gsub",
    "scan",
];

const NUMERIC_ANCESTORS: &[&str] = &[
    "Numeric",
    "Comparable",
    "Object",
    "Kernel",
    "BasicObject",
];
const COMPARABLE_ANCESTORS: &[&str] = &["Comparable", "Object", "Kernel", "BasicObject"];
const ENUMERABLE_ANCESTORS: &[&str] = &["Enumerable", "Object", "Kernel", "BasicObject"];
const OBJECT_ANCESTORS: &[&str] = &["Object", "Kernel", "BasicObject"];

/// Builtin ancestors of `type_name`, excluding the type itself. Host classes
/// and unknown types have none, so their members need exact entries.
pub fn builtin_ancestors(type_name: &str) -> &'static [&'static str] {
    match type_name {
        "Integer" | "Float" => NUMERIC_ANCESTORS,
        "String" | "Symbol" | "Time" => COMPARABLE_ANCESTORS,
        "Array" | "Hash" | "Range" => ENUMERABLE_ANCESTORS,
        "NilClass" | "TrueClass" | "FalseClass" | "Class" | "Regexp" => OBJECT_ANCESTORS,
        "Object" => &["Kernel", "BasicObject"],
        "Kernel" => &["BasicObject"],
        _ => &[],
    }
}

struct Tables {
    immutable: HashSet<&'static str>,
    class_methods: MemberTable,
    instance_methods: MemberTable,
    meta_programming: HashSet<&'static str>,
    block_accepting: HashSet<&'static str>,
}

type MemberTable = HashMap<&'static str, HashSet<&'static str>>;

fn build_table(entries: &[(&'static str, &[&'static str])]) -> MemberTable {
    entries
        .iter()
        .map(|(owner, members)| (*owner, members.iter().copied().collect()))
        .collect()
}

fn tables() -> &'static Tables {
    static TABLES: OnceLock<Tables> = OnceLock::new();
    TABLES.get_or_init(|| Tables {
        immutable: IMMUTABLE_TYPES.iter().copied().collect(),
        class_methods: build_table(CLASS_METHODS),
        instance_methods: build_table(INSTANCE_METHODS),
        meta_programming: META_PROGRAMMING.iter().copied().collect(),
        block_accepting: BLOCK_ACCEPTING.iter().copied().collect(),
    })
}

pub fn is_immutable_type(type_name: &str) -> bool {
    let tables = tables();
    tables.immutable.contains(type_name)
        || builtin_ancestors(type_name)
            .iter()
            .any(|ancestor| tables.immutable.contains(ancestor))
}

pub fn is_call_allowed(owner: &str, member: &str, receiver: ReceiverKind) -> bool {
    let tables = tables();
    if tables.meta_programming.contains(member) {
        return false;
    }
    match receiver {
        ReceiverKind::Type => tables
            .class_methods
            .get(owner)
            .is_some_and(|members| members.contains(member)),
        ReceiverKind::Instance => {
            if is_immutable_type(owner) {
                return true;
            }
            std::iter::once(owner)
                .chain(builtin_ancestors(owner).iter().copied())
                .any(|candidate| {
                    tables
                        .instance_methods
                        .get(candidate)
                        .is_some_and(|members| members.contains(member))
                })
        }
    }
}

pub fn is_meta_programming(member: &str) -> bool {
    tables().meta_programming.contains(member)
}

pub fn accepts_block(member: &str) -> bool {
    tables().block_accepting.contains(member)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn immutable_types_allow_any_member() {
        assert!(is_call_allowed("Integer", "anything", ReceiverKind::Instance));
        assert!(is_call_allowed("Range", "step", ReceiverKind::Instance));
        assert!(is_call_allowed("Time", "year", ReceiverKind::Instance));
        assert!(!is_call_allowed("Integer", "send", ReceiverKind::Instance));
    }

    #[test]
    fn mutators_and_setters_are_denied() {
        for (owner, member) in [
            ("String", "upcase!"),
            ("String", "<<"),
            ("String", "replace"),
            ("Array", "push"),
            ("Array", "<<"),
            ("Array", "[]="),
            ("Array", "map!"),
            ("Hash", "store"),
            ("Hash", "delete"),
            ("Hash", "[]="),
            ("Object", "freeze"),
            ("Kernel", "system"),
            ("Kernel", "puts"),
            ("Kernel", "exit"),
            ("Kernel", "fork"),
        ] {
            assert!(
                !is_call_allowed(owner, member, ReceiverKind::Instance),
                "{owner}#{member} should be denied"
            );
        }
    }

    #[test]
    fn class_level_calls_need_exact_entries() {
        assert!(is_call_allowed("Math", "sqrt", ReceiverKind::Type));
        assert!(is_call_allowed("Time", "now", ReceiverKind::Type));
        assert!(is_call_allowed("Regexp", "new", ReceiverKind::Type));
        assert!(!is_call_allowed("Regexp", "last_match", ReceiverKind::Type));
        assert!(!is_call_allowed("File", "read", ReceiverKind::Type));
        assert!(!is_call_allowed("Point", "new", ReceiverKind::Type));
        // Integer instances are immutable, the Integer class is not.
        assert!(!is_call_allowed("Integer", "class_eval", ReceiverKind::Type));
        assert!(!is_call_allowed("Integer", "instance_method", ReceiverKind::Type));
    }

    #[test]
    fn ancestors_contribute_instance_members() {
        assert!(is_call_allowed("Array", "map", ReceiverKind::Instance));
        assert!(is_call_allowed("Hash", "inspect", ReceiverKind::Instance));
        assert!(is_call_allowed("String", "<", ReceiverKind::Instance));
        assert!(is_call_allowed("String", "=~", ReceiverKind::Instance));
        assert!(is_call_allowed("String", "scan", ReceiverKind::Instance));
        assert!(is_call_allowed("Regexp", "match?", ReceiverKind::Instance));
        assert!(!is_call_allowed("Point", "inspect", ReceiverKind::Instance));
    }

    #[test]
    fn meta_programming_is_classified_separately() {
        assert!(is_meta_programming("instance_variable_set"));
        assert!(is_meta_programming("send"));
        assert!(!is_meta_programming("instance_variable_get"));
        assert!(accepts_block("map"));
        assert!(accepts_block("gsub"));
        assert!(!accepts_block("define_method"));
    }
}
