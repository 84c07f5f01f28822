use std::fmt;

use thiserror::Error;

/// Why an evaluation was refused as potentially state-mutating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationCause {
    /// The source failed to parse.
    CompilationFailed,
    /// The source contains a statically forbidden construct.
    ProhibitedConstruct,
    /// A call reached a native method outside the capability tables.
    ProhibitedNativeCall,
    /// An interpreted method body failed relaxed validation.
    ProhibitedMethodBody,
    /// A reflective or meta-programming entry point was invoked.
    MetaProgramming,
    Unknown,
}

impl MutationCause {
    pub fn as_str(self) -> &'static str {
        match self {
            MutationCause::CompilationFailed => "compilation_failed",
            MutationCause::ProhibitedConstruct => "prohibited_construct",
            MutationCause::ProhibitedNativeCall => "prohibited_c_func",
            MutationCause::ProhibitedMethodBody => "prohibited_yarv",
            MutationCause::MetaProgramming => "meta_programming",
            MutationCause::Unknown => "unknown",
        }
    }
}

impl fmt::Display for MutationCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("syntax error at byte {position}: {message}")]
    Syntax { message: String, position: usize },
    #[error("{construct} is not allowed in a diagnostic expression")]
    Prohibited { construct: String },
}

impl CompileError {
    pub(crate) fn syntax(message: impl Into<String>, position: usize) -> Self {
        CompileError::Syntax {
            message: message.into(),
            position,
        }
    }

    pub(crate) fn prohibited(construct: impl Into<String>) -> Self {
        CompileError::Prohibited {
            construct: construct.into(),
        }
    }

    pub fn cause(&self) -> MutationCause {
        match self {
            CompileError::Syntax { .. } => MutationCause::CompilationFailed,
            CompileError::Prohibited { .. } => MutationCause::ProhibitedConstruct,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvaluationError {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error("{message}")]
    Mutation {
        cause: MutationCause,
        message: String,
    },
    #[error("evaluation exceeded time limit")]
    Timeout,
    #[error("evaluation was cancelled")]
    Cancelled,
    /// An exception raised by the expression itself.
    #[error("{0}")]
    Raised(String),
}

impl EvaluationError {
    pub(crate) fn mutation(cause: MutationCause, message: impl Into<String>) -> Self {
        EvaluationError::Mutation {
            cause,
            message: message.into(),
        }
    }

    pub(crate) fn raise(class: &str, message: impl fmt::Display) -> Self {
        EvaluationError::Raised(format!("{class}: {message}"))
    }

    /// The mutation cause, when the error is a sandbox refusal or a raised
    /// exception. Timeouts and cancellation carry none.
    pub fn cause(&self) -> Option<MutationCause> {
        match self {
            EvaluationError::Compile(err) => Some(err.cause()),
            EvaluationError::Mutation { cause, .. } => Some(*cause),
            EvaluationError::Raised(_) => Some(MutationCause::Unknown),
            EvaluationError::Timeout | EvaluationError::Cancelled => None,
        }
    }

    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            EvaluationError::Compile(CompileError::Prohibited { .. })
                | EvaluationError::Mutation { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn causes_use_wire_names() {
        assert_eq!(MutationCause::ProhibitedNativeCall.to_string(), "prohibited_c_func");
        assert_eq!(MutationCause::ProhibitedMethodBody.to_string(), "prohibited_yarv");
        let err = EvaluationError::from(CompileError::syntax("unexpected end", 3));
        assert_eq!(err.cause(), Some(MutationCause::CompilationFailed));
        assert_eq!(EvaluationError::Timeout.to_string(), "evaluation exceeded time limit");
    }
}
