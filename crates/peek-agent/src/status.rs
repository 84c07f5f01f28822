use serde::{Deserialize, Serialize};

/// The part of a breakpoint or variable a status message is about.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Reference {
    #[default]
    Unspecified,
    BreakpointSourceLocation,
    BreakpointCondition,
    BreakpointExpression,
    BreakpointAge,
    VariableName,
    VariableValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusMessage {
    pub is_error: bool,
    pub refers_to: Reference,
    pub description: String,
}

impl StatusMessage {
    pub fn error(refers_to: Reference, description: impl Into<String>) -> Self {
        Self {
            is_error: true,
            refers_to,
            description: description.into(),
        }
    }

    pub fn info(refers_to: Reference, description: impl Into<String>) -> Self {
        Self {
            is_error: false,
            refers_to,
            description: description.into(),
        }
    }
}
