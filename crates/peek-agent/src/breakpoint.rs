//! Lifecycle of a single breakpoint: condition checks, snapshot capture and
//! log-point output.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use peek_config::{CaptureConfig, PeekConfig, LOGPOINT_TARGET};
use peek_eval::{CompiledExpr, EvaluationError, Evaluator, EvaluatorOptions, ExecutionContext};
use peek_runtime::{CallStack, SourceLocation, Value};

use crate::capture::{Capture, CaptureBudget, CaptureLimits};
use crate::log_format::{format_log_values, format_message};
use crate::status::{Reference, StatusMessage};
use crate::variable::{StackFrame, Variable};
use crate::variable_table::VariableTable;
use crate::AgentResult;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    /// Take one snapshot of the stack, then complete.
    #[default]
    Capture,
    /// Emit a formatted message on every hit.
    Log,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogLevel {
    #[default]
    Info,
    Warning,
    Error,
}

/// A breakpoint as requested by the controller.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakpointSpec {
    pub id: String,
    pub location: SourceLocation,
    #[serde(default)]
    pub action: Action,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub expressions: Vec<String>,
    #[serde(default)]
    pub log_level: LogLevel,
    #[serde(default)]
    pub log_message_format: Option<String>,
}

/// Settings shared by every breakpoint of one agent.
#[derive(Debug, Clone)]
pub struct AgentContext {
    pub evaluator: Evaluator,
    pub capture: CaptureConfig,
    /// See [`peek_config::AgentConfig::max_condition_errors`].
    pub max_condition_errors: u32,
}

impl AgentContext {
    pub fn from_config(config: &PeekConfig) -> Self {
        Self {
            evaluator: Evaluator::new(EvaluatorOptions::from(&config.evaluation)),
            capture: config.capture.clone(),
            max_condition_errors: config.agent.max_condition_errors,
        }
    }
}

impl Default for AgentContext {
    fn default() -> Self {
        Self::from_config(&PeekConfig::default())
    }
}

type Compiled = Result<CompiledExpr, EvaluationError>;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Breakpoint {
    pub id: String,
    pub location: SourceLocation,
    pub action: Action,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub expressions: Vec<String>,
    pub log_level: LogLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_message_format: Option<String>,

    is_final_state: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<StatusMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    evaluated_expressions: Vec<Variable>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stack_frames: Vec<StackFrame>,
    #[serde(skip_serializing_if = "VariableTable::is_empty")]
    variable_table: VariableTable,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_log_message: Option<String>,
    create_time: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    final_time: Option<u64>,
    hit_count: u64,

    #[serde(skip)]
    condition_errors: u32,
    #[serde(skip)]
    compiled_condition: Option<Compiled>,
    #[serde(skip)]
    compiled_expressions: Option<Vec<Compiled>>,
    #[serde(skip)]
    context: Arc<AgentContext>,
}

impl Breakpoint {
    /// Build a breakpoint from its request. An unusable request yields a
    /// breakpoint already in a final error state.
    pub fn new(spec: BreakpointSpec, context: Arc<AgentContext>) -> Self {
        let BreakpointSpec {
            id,
            location,
            action,
            condition,
            expressions,
            log_level,
            log_message_format,
        } = spec;
        let mut breakpoint = Self {
            id,
            location,
            action,
            condition,
            expressions,
            log_level,
            log_message_format,
            is_final_state: false,
            status: None,
            evaluated_expressions: Vec::new(),
            stack_frames: Vec::new(),
            variable_table: VariableTable::new(),
            last_log_message: None,
            create_time: unix_millis(),
            final_time: None,
            hit_count: 0,
            condition_errors: 0,
            compiled_condition: None,
            compiled_expressions: None,
            context,
        };

        if breakpoint.location.path.is_empty() || breakpoint.location.line == 0 {
            breakpoint.set_error_state(
                "Invalid breakpoint location",
                Reference::BreakpointSourceLocation,
                true,
            );
        } else if breakpoint.is_log_point() && breakpoint.log_message_format.is_none() {
            breakpoint.set_error_state(
                "Log point is missing a message format",
                Reference::BreakpointExpression,
                true,
            );
        }
        breakpoint
    }

    pub fn from_json(text: &str, context: Arc<AgentContext>) -> AgentResult<Self> {
        let spec: BreakpointSpec = serde_json::from_str(text)?;
        Ok(Self::new(spec, context))
    }

    pub fn is_log_point(&self) -> bool {
        self.action == Action::Log
    }

    pub fn is_complete(&self) -> bool {
        self.is_final_state
    }

    pub fn status(&self) -> Option<&StatusMessage> {
        self.status.as_ref()
    }

    pub fn evaluated_expressions(&self) -> &[Variable] {
        &self.evaluated_expressions
    }

    pub fn stack_frames(&self) -> &[StackFrame] {
        &self.stack_frames
    }

    pub fn variable_table(&self) -> &VariableTable {
        &self.variable_table
    }

    pub fn last_log_message(&self) -> Option<&str> {
        self.last_log_message.as_deref()
    }

    pub fn hit_count(&self) -> u64 {
        self.hit_count
    }

    pub fn create_time(&self) -> u64 {
        self.create_time
    }

    pub fn final_time(&self) -> Option<u64> {
        self.final_time
    }

    /// Handle one hit. Returns `true` when the hit produced output (a
    /// snapshot or a log line).
    pub fn evaluate(&mut self, stack: &CallStack) -> bool {
        if self.is_complete() {
            return false;
        }
        self.hit_count += 1;

        let Some(frame) = stack.top() else {
            tracing::debug!(target: "peek.breakpoint", id = %self.id, "hit with an empty stack");
            return false;
        };
        let context = ExecutionContext::new(frame.clone(), Arc::clone(&stack.registry));

        match self.check_condition(&context) {
            Ok(true) => self.condition_succeeded(),
            Ok(false) => {
                self.condition_succeeded();
                return false;
            }
            Err(err) => {
                self.condition_failed(err);
                return false;
            }
        }

        match self.action {
            Action::Capture => self.take_snapshot(stack, &context),
            Action::Log => self.emit_log(&context),
        }
        true
    }

    /// Whether the condition holds in `context`. A blank condition holds
    /// without running the interpreter.
    pub fn check_condition(&mut self, context: &ExecutionContext) -> Result<bool, EvaluationError> {
        let Some(source) = self.condition.as_deref().filter(|c| !c.trim().is_empty()) else {
            return Ok(true);
        };
        let evaluator = &self.context.evaluator;
        let compiled = self
            .compiled_condition
            .get_or_insert_with(|| evaluator.compile(source));
        let expr = compiled.as_ref().map_err(Clone::clone)?;
        let value = evaluator.evaluate(expr, context.clone())?;
        Ok(value.truthy())
    }

    /// Evaluate every watch expression in `context`, in order.
    pub fn eval_expressions(
        &mut self,
        context: &ExecutionContext,
    ) -> Vec<Result<Value, EvaluationError>> {
        let evaluator = &self.context.evaluator;
        let expressions = &self.expressions;
        let compiled = self.compiled_expressions.get_or_insert_with(|| {
            expressions
                .iter()
                .map(|source| evaluator.compile(source))
                .collect()
        });
        compiled
            .iter()
            .map(|expr| {
                let expr = expr.as_ref().map_err(Clone::clone)?;
                evaluator.evaluate(expr, context.clone())
            })
            .collect()
    }

    pub fn set_error_state(&mut self, message: impl Into<String>, refers_to: Reference, is_final: bool) {
        let status = StatusMessage::error(refers_to, message);
        tracing::debug!(
            target: "peek.breakpoint",
            id = %self.id,
            is_final,
            "breakpoint error: {}",
            status.description
        );
        self.status = Some(status);
        if is_final {
            self.complete();
        }
    }

    /// Move to the final state. Later calls leave the final time untouched.
    pub fn complete(&mut self) {
        if self.is_final_state {
            return;
        }
        self.is_final_state = true;
        self.final_time = Some(unix_millis());
        tracing::debug!(target: "peek.breakpoint", id = %self.id, hits = self.hit_count, "breakpoint completed");
    }

    fn condition_succeeded(&mut self) {
        self.condition_errors = 0;
        let stale = self
            .status
            .as_ref()
            .is_some_and(|status| status.refers_to == Reference::BreakpointCondition);
        if stale {
            self.status = None;
        }
    }

    fn condition_failed(&mut self, err: EvaluationError) {
        self.condition_errors = self.condition_errors.saturating_add(1);
        let max = self.context.max_condition_errors;
        let is_final = max > 0 && self.condition_errors >= max;
        self.set_error_state(err.to_string(), Reference::BreakpointCondition, is_final);
    }

    fn take_snapshot(&mut self, stack: &CallStack, context: &ExecutionContext) {
        let results = self.eval_expressions(context);
        let config = &self.context.capture;
        let capture = Capture::new(CaptureLimits::from(config));
        let max_depth = config.max_depth;
        let max_frames = config.max_frames;
        let mut budget = CaptureBudget::new(config.budget_bytes);
        let mut table = VariableTable::new();

        let evaluated: Vec<Variable> = self
            .expressions
            .iter()
            .zip(results)
            .map(|(source, result)| match result {
                Ok(value) => capture.capture(
                    &value,
                    Some(source.as_str()),
                    max_depth,
                    &mut budget,
                    Some(&mut table),
                ),
                Err(err) => {
                    Variable::error(Some(source.as_str()), Reference::VariableValue, err.to_string())
                }
            })
            .collect();

        let frames: Vec<StackFrame> = stack
            .frames
            .iter()
            .enumerate()
            .map(|(index, frame)| capture.frame(frame, index < max_frames, &mut budget, &mut table))
            .collect();

        self.evaluated_expressions = evaluated;
        self.stack_frames = frames;
        self.variable_table = table;
        tracing::debug!(
            target: "peek.breakpoint",
            id = %self.id,
            table_entries = self.variable_table.len(),
            budget_left = budget.remaining(),
            "snapshot captured"
        );
        self.complete();
    }

    fn emit_log(&mut self, context: &ExecutionContext) {
        let results = self.eval_expressions(context);
        let values = format_log_values(&results);
        let template = self.log_message_format.as_deref().unwrap_or_default();
        let message = format_message(template, &values);
        match self.log_level {
            LogLevel::Info => tracing::info!(target: LOGPOINT_TARGET, id = %self.id, "LOGPOINT: {message}"),
            LogLevel::Warning => tracing::warn!(target: LOGPOINT_TARGET, id = %self.id, "LOGPOINT: {message}"),
            LogLevel::Error => tracing::error!(target: LOGPOINT_TARGET, id = %self.id, "LOGPOINT: {message}"),
        }
        self.last_log_message = Some(message);
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use peek_runtime::{ClassRegistry, Frame};
    use pretty_assertions::assert_eq;

    fn spec(condition: Option<&str>) -> BreakpointSpec {
        BreakpointSpec {
            id: "bp-1".into(),
            location: SourceLocation::new("app.rb", 3),
            action: Action::Capture,
            condition: condition.map(str::to_owned),
            expressions: Vec::new(),
            log_level: LogLevel::Info,
            log_message_format: None,
        }
    }

    fn stack() -> CallStack {
        let frame = Frame::new("main", SourceLocation::new("app.rb", 3)).with_local("n", Value::Int(2));
        CallStack::new(vec![frame], Arc::new(ClassRegistry::new()))
    }

    #[test]
    fn invalid_location_is_final() {
        let mut request = spec(None);
        request.location.line = 0;
        let breakpoint = Breakpoint::new(request, Arc::default());
        assert!(breakpoint.is_complete());
        assert_eq!(
            breakpoint.status().map(|s| s.refers_to),
            Some(Reference::BreakpointSourceLocation)
        );
    }

    #[test]
    fn log_point_needs_a_format() {
        let mut request = spec(None);
        request.action = Action::Log;
        let breakpoint = Breakpoint::new(request, Arc::default());
        assert!(breakpoint.is_complete());
    }

    #[test]
    fn false_condition_keeps_the_breakpoint_active() {
        let mut breakpoint = Breakpoint::new(spec(Some("n > 5")), Arc::default());
        assert!(!breakpoint.evaluate(&stack()));
        assert!(!breakpoint.is_complete());
        assert_eq!(breakpoint.hit_count(), 1);
    }

    #[test]
    fn completed_breakpoints_ignore_hits() {
        let mut breakpoint = Breakpoint::new(spec(None), Arc::default());
        assert!(breakpoint.evaluate(&stack()));
        assert!(!breakpoint.evaluate(&stack()));
        assert_eq!(breakpoint.hit_count(), 1);
    }

    #[test]
    fn spec_defaults_from_json() {
        let request: BreakpointSpec =
            serde_json::from_str(r#"{"id":"b","location":{"path":"a.rb","line":1}}"#).unwrap();
        assert_eq!(request.action, Action::Capture);
        assert_eq!(request.log_level, LogLevel::Info);
        assert!(request.expressions.is_empty());
    }
}
