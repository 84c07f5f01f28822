//! Configuration for the Peek debugger agent.
//!
//! Configuration is loaded from TOML. Every section is optional and falls back
//! to defaults tuned for evaluating expressions inside a live production
//! process:
//!
//! ```toml
//! [logging]
//! level = "info"
//!
//! [evaluation]
//! timeout_ms = 50
//!
//! [capture]
//! max_depth = 3
//! max_members = 1000
//! max_string_length = 500
//! budget_bytes = 65536
//!
//! [agent]
//! max_condition_errors = 10
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

mod logging;
mod validation;

pub use logging::{init_tracing, LogBuffer};
pub use validation::ConfigWarning;

/// Tracing target used for log-point output.
pub const LOGPOINT_TARGET: &str = "peek.logpoint";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PeekConfig {
    /// Global logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Limits applied to a single expression evaluation.
    #[serde(default)]
    pub evaluation: EvaluationConfig,

    /// Limits applied to capturing variables for one breakpoint hit.
    #[serde(default)]
    pub capture: CaptureConfig,

    /// Breakpoint lifecycle policy.
    #[serde(default)]
    pub agent: AgentConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Logging level, or a full `EnvFilter` directive string.
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,

    /// Emit logs in JSON format.
    #[serde(default)]
    pub json: bool,

    /// Mirror logs to stderr (in addition to the in-memory buffer).
    #[serde(default = "LoggingConfig::default_stderr")]
    pub stderr: bool,

    /// Append logs to the given file path (in addition to the in-memory buffer).
    ///
    /// If the file cannot be opened, file logging is disabled while other sinks
    /// remain active.
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Number of log lines kept in memory.
    #[serde(default = "LoggingConfig::default_buffer_lines")]
    pub buffer_lines: usize,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_owned()
    }

    fn default_stderr() -> bool {
        true
    }

    fn default_buffer_lines() -> usize {
        2_000
    }

    pub(crate) fn normalize_level_directives(input: &str) -> String {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Self::default_level();
        }

        match trimmed.to_ascii_lowercase().as_str() {
            "trace" => "trace".to_owned(),
            "debug" => "debug".to_owned(),
            "info" => "info".to_owned(),
            "warn" | "warning" => "warn".to_owned(),
            "error" => "error".to_owned(),
            // Anything else is treated as an `EnvFilter` directive string.
            _ => trimmed.to_owned(),
        }
    }

    fn config_env_filter(&self) -> tracing_subscriber::EnvFilter {
        let directives = Self::normalize_level_directives(&self.level);
        tracing_subscriber::EnvFilter::try_new(directives).unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::default()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
        })
    }

    /// Create the effective `EnvFilter`.
    ///
    /// If `RUST_LOG` is set, it is merged into the configured directives.
    pub fn env_filter(&self) -> tracing_subscriber::EnvFilter {
        let env_directives = std::env::var("RUST_LOG")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty());

        let config_directives = Self::normalize_level_directives(&self.level);

        match env_directives {
            Some(env_directives) => {
                let combined = format!("{config_directives},{env_directives}");
                tracing_subscriber::EnvFilter::try_new(combined)
                    .or_else(|_| tracing_subscriber::EnvFilter::try_new(env_directives))
                    .unwrap_or_else(|_| self.config_env_filter())
            }
            None => self.config_env_filter(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            json: false,
            stderr: Self::default_stderr(),
            file: None,
            buffer_lines: Self::default_buffer_lines(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EvaluationConfig {
    /// Wall-clock budget for a single expression, in milliseconds.
    #[serde(default = "EvaluationConfig::default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum nesting of interpreted host method calls.
    #[serde(default = "EvaluationConfig::default_max_call_depth")]
    pub max_call_depth: usize,
}

impl EvaluationConfig {
    fn default_timeout_ms() -> u64 {
        50
    }

    fn default_max_call_depth() -> usize {
        64
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            timeout_ms: Self::default_timeout_ms(),
            max_call_depth: Self::default_max_call_depth(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CaptureConfig {
    /// Levels of compound values expanded below each captured root.
    #[serde(default = "CaptureConfig::default_max_depth")]
    pub max_depth: usize,

    /// Members captured per compound value before truncation.
    #[serde(default = "CaptureConfig::default_max_members")]
    pub max_members: usize,

    /// Maximum length in bytes of a scalar value before it is truncated.
    #[serde(default = "CaptureConfig::default_max_string_length")]
    pub max_string_length: usize,

    /// Number of innermost frames whose arguments and locals are captured.
    #[serde(default = "CaptureConfig::default_max_frames")]
    pub max_frames: usize,

    /// Total bytes of names, types and values serialized per hit.
    #[serde(default = "CaptureConfig::default_budget_bytes")]
    pub budget_bytes: i64,
}

impl CaptureConfig {
    fn default_max_depth() -> usize {
        3
    }

    fn default_max_members() -> usize {
        1_000
    }

    fn default_max_string_length() -> usize {
        500
    }

    fn default_max_frames() -> usize {
        5
    }

    fn default_budget_bytes() -> i64 {
        65_536
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            max_depth: Self::default_max_depth(),
            max_members: Self::default_max_members(),
            max_string_length: Self::default_max_string_length(),
            max_frames: Self::default_max_frames(),
            budget_bytes: Self::default_budget_bytes(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Consecutive condition failures after which a breakpoint is finalized
    /// with an error. `0` keeps retrying on every hit.
    #[serde(default = "AgentConfig::default_max_condition_errors")]
    pub max_condition_errors: u32,
}

impl AgentConfig {
    fn default_max_condition_errors() -> u32 {
        10
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_condition_errors: Self::default_max_condition_errors(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse toml config: {0}")]
    Toml(String),
    #[error("invalid value for `{toml_path}`: {message}")]
    Invalid { toml_path: String, message: String },
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        // The default `Display` embeds a snippet of the source document; keep
        // just the message so config contents never end up in logs.
        ConfigError::Toml(err.message().to_string())
    }
}

impl PeekConfig {
    /// Load a config file from TOML.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::load_from_str(&text)
    }

    /// Parse a config from a TOML string and reject values that would disable
    /// the evaluation limits.
    pub fn load_from_str(text: &str) -> Result<Self, ConfigError> {
        let config: PeekConfig = toml::from_str(text)?;
        config.check_limits()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = PeekConfig::load_from_str("").unwrap();
        assert_eq!(config, PeekConfig::default());
        assert_eq!(config.evaluation.timeout(), Duration::from_millis(50));
        assert_eq!(config.capture.max_depth, 3);
        assert_eq!(config.capture.max_members, 1_000);
        assert_eq!(config.capture.max_string_length, 500);
        assert_eq!(config.agent.max_condition_errors, 10);
    }

    #[test]
    fn sections_override_defaults() {
        let config = PeekConfig::load_from_str(
            r#"
[evaluation]
timeout_ms = 10

[capture]
max_depth = 5
budget_bytes = 128
"#,
        )
        .unwrap();

        assert_eq!(config.evaluation.timeout_ms, 10);
        assert_eq!(config.evaluation.max_call_depth, 64);
        assert_eq!(config.capture.max_depth, 5);
        assert_eq!(config.capture.budget_bytes, 128);
        assert_eq!(config.capture.max_members, 1_000);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = PeekConfig::load_from_str("[capture]\nmax_dept = 3\n").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)), "{err:?}");
    }

    #[test]
    fn zero_timeout_is_invalid() {
        let err = PeekConfig::load_from_str("[evaluation]\ntimeout_ms = 0\n").unwrap_err();
        match err {
            ConfigError::Invalid { toml_path, .. } => {
                assert_eq!(toml_path, "evaluation.timeout_ms")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("peek.toml");
        std::fs::write(&path, "[agent]\nmax_condition_errors = 0\n").unwrap();

        let config = PeekConfig::load_from_path(&path).unwrap();
        assert_eq!(config.agent.max_condition_errors, 0);
    }

    #[test]
    fn missing_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");
        let err = PeekConfig::load_from_path(&path).unwrap_err();
        assert!(err.to_string().contains("missing.toml"), "{err}");
    }

    #[test]
    fn level_synonyms_are_normalized() {
        assert_eq!(LoggingConfig::normalize_level_directives(" WARNING "), "warn");
        assert_eq!(LoggingConfig::normalize_level_directives(""), "info");
        assert_eq!(
            LoggingConfig::normalize_level_directives("peek_eval=debug"),
            "peek_eval=debug"
        );
    }
}
