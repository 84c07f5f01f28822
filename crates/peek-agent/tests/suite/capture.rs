use peek_agent::variable::{BUFFER_FULL_MESSAGE, UNABLE_TO_INSPECT_MESSAGE};
use peek_agent::{Capture, CaptureBudget, CaptureLimits, Reference, Variable, VariableTable};
use peek_runtime::{value_from_json, Value};
use pretty_assertions::assert_eq;
use serde_json::json;

use super::stack;

fn frame_capture(budget_bytes: i64) -> (Vec<peek_agent::StackFrame>, VariableTable) {
    let stack = stack();
    let capture = Capture::default();
    let mut budget = CaptureBudget::new(budget_bytes);
    let mut table = VariableTable::new();
    let frames = stack
        .frames
        .iter()
        .map(|frame| capture.frame(frame, true, &mut budget, &mut table))
        .collect();
    (frames, table)
}

fn local<'a>(frame: &'a peek_agent::StackFrame, name: &str) -> &'a Variable {
    frame
        .locals
        .iter()
        .find(|var| var.name.as_deref() == Some(name))
        .unwrap_or_else(|| panic!("no local {name}"))
}

#[test]
fn shared_values_are_stored_once() {
    let (frames, table) = frame_capture(65_536);
    let cart = &frames[0].arguments[0];
    let cart_entry = table.get(cart.var_table_index.unwrap()).unwrap();
    assert_eq!(cart_entry.type_name.as_deref(), Some("Cart"));
    assert_eq!(cart_entry.name, None);

    let items = &cart_entry.members[0];
    assert_eq!(items.name.as_deref(), Some("@items"));
    assert_eq!(cart_entry.members[1], Variable::scalar(Some("@owner"), "String", "\"ann\""));

    let same = local(&frames[0], "same");
    assert!(same.is_reference());
    assert_eq!(same.var_table_index, items.var_table_index);

    // cart, items and node; plus the buffer-full sentinel.
    assert_eq!(table.len(), 4);
}

#[test]
fn cycles_terminate_through_the_table() {
    let (frames, table) = frame_capture(65_536);
    let node = local(&frames[0], "node");
    let index = node.var_table_index.unwrap();
    let entry = table.get(index).unwrap();
    assert_eq!(entry.members[0].name.as_deref(), Some("@next"));
    assert_eq!(entry.members[0].var_table_index, Some(index));
    assert_eq!(entry.members[1], Variable::scalar(Some("@value"), "Integer", "1"));
}

#[test]
fn inspect_failures_become_status_nodes() {
    let (frames, _) = frame_capture(65_536);
    let socket = local(&frames[0], "socket");
    assert_eq!(socket.type_name.as_deref(), Some("Socket"));
    let status = socket.status.as_ref().unwrap();
    assert!(status.is_error);
    assert_eq!(status.refers_to, Reference::VariableValue);
    assert_eq!(status.description, UNABLE_TO_INSPECT_MESSAGE);
}

#[test]
fn capturing_again_does_not_grow_the_table() {
    let capture = Capture::default();
    let mut budget = CaptureBudget::new(65_536);
    let mut table = VariableTable::new();
    let list = Value::array(vec![Value::Int(1), Value::Int(2)]);

    let first = capture.capture(&list, Some("a"), 3, &mut budget, Some(&mut table));
    let len = table.len();
    let second = capture.capture(&list, Some("b"), 3, &mut budget, Some(&mut table));

    assert_eq!(len, 2);
    assert_eq!(table.len(), len);
    assert_eq!(first.var_table_index, second.var_table_index);
    assert_eq!(second.name.as_deref(), Some("b"));
}

#[test]
fn depth_bounds_inline_cycles() {
    let cyclic = value_from_json(&json!({ "$id": "a", "$array": [1, { "$ref": "a" }] })).unwrap();
    let mut budget = CaptureBudget::new(65_536);
    let node = Capture::default().capture(&cyclic, Some("a"), 2, &mut budget, None);

    let level1 = &node.members[1];
    assert_eq!(level1.members.len(), 2);
    let level2 = &level1.members[1];
    assert_eq!(level2.type_name.as_deref(), Some("Array"));
    assert!(level2.members.is_empty());
    assert!(level2.var_table_index.is_none());
}

#[test]
fn budget_only_shrinks() {
    let capture = Capture::default();
    let mut budget = CaptureBudget::new(2_000);
    let mut table = VariableTable::new();
    let mut last = budget.remaining();
    for n in 0..50 {
        let value = Value::array(vec![Value::str("x".repeat(n)), Value::Int(n as i64)]);
        capture.capture(&value, Some("v"), 3, &mut budget, Some(&mut table));
        assert!(budget.remaining() <= last);
        last = budget.remaining();
    }
    assert!(budget.is_exhausted());
}

#[test]
fn exhausted_budget_points_at_the_sentinel() {
    let list = Value::array((0..4).map(|_| Value::str("aaaaaaaaaa")).collect());

    let mut budget = CaptureBudget::new(20);
    let inline = Capture::default().capture(&list, Some("list"), 3, &mut budget, None);
    // "list" + "Array" leaves 11 bytes, which the first member overdraws.
    assert_eq!(inline.members[0].value.as_deref(), Some("\"aaaaaaaaaa\""));
    for member in &inline.members[1..] {
        assert_eq!(member.status.as_ref().unwrap().description, BUFFER_FULL_MESSAGE);
    }

    let (frames, table) = frame_capture(10);
    assert_eq!(frames[1].locals[0].var_table_index, Some(0));
    assert_eq!(
        table.get(0).and_then(|v| v.status.as_ref()).map(|s| s.description.as_str()),
        Some(BUFFER_FULL_MESSAGE)
    );
}

#[test]
fn long_strings_are_truncated() {
    let capture = Capture::new(CaptureLimits {
        max_string_length: 8,
        ..CaptureLimits::default()
    });
    let mut budget = CaptureBudget::new(65_536);
    let node = capture.capture(&Value::str("abcdefghijkl"), None, 3, &mut budget, None);
    assert_eq!(node.value.as_deref(), Some("\"abcdefg..."));
}
