use crate::{ConfigError, PeekConfig};

/// A configuration value that is accepted but likely unintended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub toml_path: String,
    pub message: String,
}

impl ConfigWarning {
    fn new(toml_path: &str, message: impl Into<String>) -> Self {
        Self {
            toml_path: toml_path.to_owned(),
            message: message.into(),
        }
    }
}

impl PeekConfig {
    /// Hard errors: values that would leave evaluation unbounded.
    pub(crate) fn check_limits(&self) -> Result<(), ConfigError> {
        let invalid = |toml_path: &str, message: &str| ConfigError::Invalid {
            toml_path: toml_path.to_owned(),
            message: message.to_owned(),
        };

        if self.evaluation.timeout_ms == 0 {
            return Err(invalid("evaluation.timeout_ms", "must be greater than 0"));
        }
        if self.evaluation.max_call_depth == 0 {
            return Err(invalid("evaluation.max_call_depth", "must be greater than 0"));
        }
        if self.capture.budget_bytes < 0 {
            return Err(invalid("capture.budget_bytes", "must not be negative"));
        }
        Ok(())
    }

    /// Soft diagnostics for settings that are legal but suspicious.
    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut out = Vec::new();

        if self.evaluation.timeout_ms > 1_000 {
            out.push(ConfigWarning::new(
                "evaluation.timeout_ms",
                format!(
                    "{} ms per expression will stall the host thread noticeably",
                    self.evaluation.timeout_ms
                ),
            ));
        }
        if self.capture.max_members == 0 {
            out.push(ConfigWarning::new(
                "capture.max_members",
                "compound values will be captured without any members",
            ));
        }
        if self.capture.max_string_length < 3 {
            out.push(ConfigWarning::new(
                "capture.max_string_length",
                "too short to hold the truncation marker",
            ));
        }
        if self.capture.budget_bytes == 0 {
            out.push(ConfigWarning::new(
                "capture.budget_bytes",
                "every captured variable will report a full buffer",
            ));
        }
        if self.logging.buffer_lines == 0 {
            out.push(ConfigWarning::new(
                "logging.buffer_lines",
                "rounded up to 1",
            ));
        }

        out
    }
}
