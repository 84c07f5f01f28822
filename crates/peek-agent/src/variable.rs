//! Captured values as they are reported for a breakpoint hit.

use serde::Serialize;

use peek_runtime::SourceLocation;

use crate::status::{Reference, StatusMessage};
use crate::variable_table::VariableTable;

pub const BUFFER_FULL_MESSAGE: &str = "Buffer full. Use an expression to see more data";
pub const UNABLE_TO_INSPECT_MESSAGE: &str = "Unable to inspect value";

/// One node of a captured value tree.
///
/// At most one of `value`, `members` and `var_table_index` carries content.
/// A node with `var_table_index` set borrows its content from the shared
/// [`VariableTable`]; see [`Variable::resolve`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<Variable>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub var_table_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<StatusMessage>,
}

impl Variable {
    pub fn scalar(name: Option<&str>, type_name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.map(str::to_owned),
            type_name: Some(type_name.into()),
            value: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn reference(name: Option<&str>, index: usize) -> Self {
        Self {
            name: name.map(str::to_owned),
            var_table_index: Some(index),
            ..Self::default()
        }
    }

    /// A node whose value could not be produced.
    pub fn error(name: Option<&str>, refers_to: Reference, message: impl Into<String>) -> Self {
        Self {
            name: name.map(str::to_owned),
            status: Some(StatusMessage::error(refers_to, message)),
            ..Self::default()
        }
    }

    /// Table entry 0.
    pub fn buffer_full() -> Self {
        Self::error(None, Reference::VariableValue, BUFFER_FULL_MESSAGE)
    }

    pub fn is_reference(&self) -> bool {
        self.var_table_index.is_some()
    }

    pub fn is_error(&self) -> bool {
        self.status.as_ref().is_some_and(|status| status.is_error)
    }

    /// Bytes this node contributes to a capture payload.
    pub fn payload_size(&self) -> usize {
        self.name.as_deref().map_or(0, str::len)
            + self.type_name.as_deref().map_or(0, str::len)
            + self.value.as_deref().map_or(0, str::len)
    }

    /// Merge a reference node with its table entry, keeping this node's
    /// name. Non-reference nodes and dangling indices resolve to themselves.
    pub fn resolve(&self, table: &VariableTable) -> Variable {
        let Some(entry) = self.var_table_index.and_then(|index| table.get(index)) else {
            return self.clone();
        };
        Variable {
            name: self.name.clone(),
            ..entry.clone()
        }
    }
}

/// Arguments and locals of one frame of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StackFrame {
    pub function: String,
    pub location: SourceLocation,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<Variable>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub locals: Vec<Variable>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn resolve_keeps_the_reference_name() {
        let mut table = VariableTable::new();
        let index = table.push(Variable {
            type_name: Some("Array".into()),
            members: vec![Variable::scalar(Some("[0]"), "Integer", "1")],
            ..Variable::default()
        });

        let resolved = Variable::reference(Some("list"), index).resolve(&table);
        assert_eq!(resolved.name.as_deref(), Some("list"));
        assert_eq!(resolved.type_name.as_deref(), Some("Array"));
        assert_eq!(resolved.members.len(), 1);
        assert_eq!(resolved.var_table_index, None);

        let dangling = Variable::reference(Some("x"), 99);
        assert_eq!(dangling.resolve(&table), dangling);
    }

    #[test]
    fn skips_empty_fields_when_serialized() {
        let node = Variable::scalar(Some("n"), "Integer", "3");
        assert_eq!(
            serde_json::to_value(&node).unwrap(),
            serde_json::json!({ "name": "n", "type": "Integer", "value": "3" })
        );
        assert_eq!(node.payload_size(), "n".len() + "Integer".len() + "3".len());
    }
}
