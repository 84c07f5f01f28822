//! Conversion of live values into bounded [`Variable`] trees.
//!
//! Three limits apply to every capture: nesting depth, members per compound
//! value and bytes per scalar rendering. A shared [`CaptureBudget`] bounds
//! the total payload of one hit on top of those; once it runs out, further
//! values become references to the buffer-full entry of the table.

use peek_config::CaptureConfig;
use peek_runtime::{Frame, Value};

use crate::status::{Reference, StatusMessage};
use crate::variable::{StackFrame, Variable, BUFFER_FULL_MESSAGE, UNABLE_TO_INSPECT_MESSAGE};
use crate::variable_table::{VariableTable, BUFFER_FULL_INDEX};

/// Remaining payload bytes for one breakpoint hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureBudget {
    remaining: i64,
}

impl CaptureBudget {
    pub fn new(bytes: i64) -> Self {
        Self { remaining: bytes }
    }

    pub fn remaining(&self) -> i64 {
        self.remaining
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining <= 0
    }

    fn charge(&mut self, bytes: usize) {
        let bytes = i64::try_from(bytes).unwrap_or(i64::MAX);
        self.remaining = self.remaining.saturating_sub(bytes);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureLimits {
    pub max_depth: usize,
    pub max_members: usize,
    pub max_string_length: usize,
}

impl Default for CaptureLimits {
    fn default() -> Self {
        Self::from(&CaptureConfig::default())
    }
}

impl From<&CaptureConfig> for CaptureLimits {
    fn from(config: &CaptureConfig) -> Self {
        Self {
            max_depth: config.max_depth,
            max_members: config.max_members,
            max_string_length: config.max_string_length,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Capture {
    limits: CaptureLimits,
}

impl Capture {
    pub fn new(limits: CaptureLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &CaptureLimits {
        &self.limits
    }

    /// Capture `value` with `depth` levels of members below it.
    ///
    /// With a table, compound values are stored there once per identity and
    /// the returned node refers to them; without one they are captured inline
    /// (and a cycle is cut off by the depth limit).
    pub fn capture(
        &self,
        value: &Value,
        name: Option<&str>,
        depth: usize,
        budget: &mut CaptureBudget,
        mut table: Option<&mut VariableTable>,
    ) -> Variable {
        if budget.is_exhausted() {
            return buffer_full(name, table.is_some());
        }

        let Some(members) = compound_members(value) else {
            let node = self.scalar(value, name);
            budget.charge(node.payload_size());
            return node;
        };

        match (table.as_deref_mut(), value.identity()) {
            (Some(table), Some(id)) => {
                if let Some(index) = table.lookup(id) {
                    budget.charge(name.map_or(0, str::len));
                    return Variable::reference(name, index);
                }
                let index = table.reserve(id);
                let entry = self.compound(value, None, members, depth, budget, Some(&mut *table));
                table.set(index, entry);
                budget.charge(name.map_or(0, str::len));
                Variable::reference(name, index)
            }
            (table, _) => self.compound(value, name, members, depth, budget, table),
        }
    }

    fn scalar(&self, value: &Value, name: Option<&str>) -> Variable {
        match value.inspect() {
            Ok(text) => Variable::scalar(
                name,
                value.type_name(),
                truncate(&text, self.limits.max_string_length),
            ),
            Err(err) => {
                tracing::debug!(target: "peek.capture", error = %err, "value failed to render");
                Variable {
                    type_name: Some(value.type_name()),
                    ..Variable::error(name, Reference::VariableValue, UNABLE_TO_INSPECT_MESSAGE)
                }
            }
        }
    }

    fn compound(
        &self,
        value: &Value,
        name: Option<&str>,
        members: Vec<(String, Value)>,
        depth: usize,
        budget: &mut CaptureBudget,
        mut table: Option<&mut VariableTable>,
    ) -> Variable {
        let mut node = Variable {
            name: name.map(str::to_owned),
            type_name: Some(value.type_name()),
            ..Variable::default()
        };
        budget.charge(node.payload_size());
        if depth == 0 {
            return node;
        }

        let total = members.len();
        for (member_name, member) in members.into_iter().take(self.limits.max_members) {
            let child = self.capture(
                &member,
                Some(member_name.as_str()),
                depth - 1,
                budget,
                table.as_deref_mut(),
            );
            node.members.push(child);
        }
        if total > self.limits.max_members {
            node.members.push(Variable {
                status: Some(StatusMessage::info(
                    Reference::VariableValue,
                    format!(
                        "Only first {} items were captured. Use in an expression to see all items.",
                        self.limits.max_members
                    ),
                )),
                ..Variable::default()
            });
        }
        node
    }

    /// Arguments and locals of `frame`, or just its location when
    /// `with_variables` is false.
    pub fn frame(
        &self,
        frame: &Frame,
        with_variables: bool,
        budget: &mut CaptureBudget,
        table: &mut VariableTable,
    ) -> StackFrame {
        let mut out = StackFrame {
            function: frame.function.clone(),
            location: frame.location.clone(),
            arguments: Vec::new(),
            locals: Vec::new(),
        };
        if !with_variables {
            return out;
        }
        for (name, value) in &frame.arguments {
            let node = self.capture(
                value,
                Some(name.as_str()),
                self.limits.max_depth,
                budget,
                Some(&mut *table),
            );
            out.arguments.push(node);
        }
        for (name, value) in &frame.locals {
            let node = self.capture(
                value,
                Some(name.as_str()),
                self.limits.max_depth,
                budget,
                Some(&mut *table),
            );
            out.locals.push(node);
        }
        out
    }
}

fn buffer_full(name: Option<&str>, has_table: bool) -> Variable {
    if has_table {
        Variable::reference(name, BUFFER_FULL_INDEX)
    } else {
        Variable::error(name, Reference::VariableValue, BUFFER_FULL_MESSAGE)
    }
}

/// Members of a value that is captured member by member: non-empty arrays
/// and hashes, and objects with at least one field.
fn compound_members(value: &Value) -> Option<Vec<(String, Value)>> {
    let members: Vec<(String, Value)> = match value {
        Value::Array(heap) => heap
            .snapshot()
            .into_iter()
            .enumerate()
            .map(|(index, item)| (format!("[{index}]"), item))
            .collect(),
        Value::Hash(heap) => heap
            .snapshot()
            .into_iter()
            .map(|(key, item)| {
                let name = key.inspect().unwrap_or_else(|_| key.type_name());
                (name, item)
            })
            .collect(),
        Value::Object(heap) => heap
            .read()
            .fields
            .iter()
            .map(|(field, item)| (format!("@{field}"), item.clone()))
            .collect(),
        _ => return None,
    };
    (!members.is_empty()).then_some(members)
}

/// Cut `text` to at most `max_len` bytes on a char boundary, marking the cut
/// with `...`.
pub fn truncate(text: &str, max_len: usize) -> String {
    if text.len() <= max_len {
        return text.to_owned();
    }
    let mut end = max_len;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn limits(max_depth: usize, max_members: usize) -> Capture {
        Capture::new(CaptureLimits {
            max_depth,
            max_members,
            max_string_length: 500,
        })
    }

    #[test]
    fn truncates_on_char_boundaries() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello", 3), "hel...");
        // 'é' is two bytes; cutting inside it backs off to the boundary.
        assert_eq!(truncate("aé", 2), "a...");
    }

    #[test]
    fn scalars_carry_type_and_inspect_text() {
        let mut budget = CaptureBudget::new(1_000);
        let node = Capture::default().capture(&Value::str("hi"), Some("s"), 3, &mut budget, None);
        assert_eq!(node, Variable::scalar(Some("s"), "String", "\"hi\""));
        assert_eq!(budget.remaining(), 1_000 - ("s".len() + "String".len() + 4) as i64);
    }

    #[test]
    fn empty_compounds_are_scalars() {
        let mut budget = CaptureBudget::new(1_000);
        let node = Capture::default().capture(&Value::array(Vec::new()), None, 3, &mut budget, None);
        assert_eq!(node.value.as_deref(), Some("[]"));
        assert!(node.members.is_empty());
    }

    #[test]
    fn member_cap_appends_a_status_node() {
        let list = Value::array((0..5).map(Value::Int).collect());
        let mut budget = CaptureBudget::new(10_000);
        let node = limits(3, 2).capture(&list, Some("list"), 3, &mut budget, None);

        assert_eq!(node.members.len(), 3);
        assert_eq!(node.members[1].name.as_deref(), Some("[1]"));
        let status = node.members[2].status.as_ref().unwrap();
        assert!(!status.is_error);
        assert!(status.description.starts_with("Only first 2 items were captured."));
    }

    #[test]
    fn depth_zero_keeps_only_the_type() {
        let nested = Value::array(vec![Value::array(vec![Value::Int(1)])]);
        let mut budget = CaptureBudget::new(10_000);
        let node = limits(1, 10).capture(&nested, None, 1, &mut budget, None);

        assert_eq!(node.members.len(), 1);
        let inner = &node.members[0];
        assert_eq!(inner.type_name.as_deref(), Some("Array"));
        assert!(inner.members.is_empty());
        assert!(inner.value.is_none());
    }

    #[test]
    fn exhausted_budget_without_table_is_inline() {
        let mut budget = CaptureBudget::new(0);
        let node = Capture::default().capture(&Value::Int(1), Some("n"), 3, &mut budget, None);
        assert_eq!(node.name.as_deref(), Some("n"));
        assert_eq!(node.status.unwrap().description, BUFFER_FULL_MESSAGE);
    }
}
