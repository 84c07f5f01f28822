use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::registry::ClassRegistry;
use crate::value::Value;

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    pub path: String,
    pub line: u32,
}

impl SourceLocation {
    pub fn new(path: impl Into<String>, line: u32) -> Self {
        Self {
            path: path.into(),
            line,
        }
    }
}

/// One paused call frame as exposed by the stack provider.
#[derive(Clone, Debug)]
pub struct Frame {
    pub function: String,
    pub location: SourceLocation,
    pub arguments: Vec<(String, Value)>,
    pub locals: Vec<(String, Value)>,
    /// `self` inside the frame.
    pub receiver: Value,
}

impl Frame {
    pub fn new(function: impl Into<String>, location: SourceLocation) -> Self {
        Self {
            function: function.into(),
            location,
            arguments: Vec::new(),
            locals: Vec::new(),
            receiver: Value::Nil,
        }
    }

    pub fn with_argument(mut self, name: impl Into<String>, value: Value) -> Self {
        self.arguments.push((name.into(), value));
        self
    }

    pub fn with_local(mut self, name: impl Into<String>, value: Value) -> Self {
        self.locals.push((name.into(), value));
        self
    }

    pub fn with_receiver(mut self, receiver: Value) -> Self {
        self.receiver = receiver;
        self
    }

    /// Resolve a local variable name; locals shadow arguments.
    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.locals
            .iter()
            .chain(self.arguments.iter())
            .find(|(candidate, _)| candidate == name)
            .map(|(_, value)| value)
    }

    /// Arguments followed by locals, the order a fresh scope is seeded in.
    pub fn bindings(&self) -> impl Iterator<Item = &(String, Value)> {
        self.arguments.iter().chain(self.locals.iter())
    }
}

/// The paused stack, innermost frame first, together with the class registry
/// its values refer to.
#[derive(Clone, Debug)]
pub struct CallStack {
    pub frames: Vec<Frame>,
    pub registry: Arc<ClassRegistry>,
}

impl CallStack {
    pub fn new(frames: Vec<Frame>, registry: Arc<ClassRegistry>) -> Self {
        Self { frames, registry }
    }

    pub fn top(&self) -> Option<&Frame> {
        self.frames.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locals_shadow_arguments() {
        let frame = Frame::new("handle", SourceLocation::new("app.rb", 3))
            .with_argument("id", Value::Int(1))
            .with_local("id", Value::Int(2))
            .with_local("name", Value::str("x"));

        assert!(matches!(frame.lookup("id"), Some(Value::Int(2))));
        assert!(frame.lookup("missing").is_none());
        assert_eq!(frame.bindings().count(), 3);
    }
}
