use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use peek_agent::{
    hardening, AgentContext, AgentError, Breakpoint, Capture, CaptureBudget, CaptureLimits,
    Reference, Variable, VariableTable,
};
use peek_config::PeekConfig;
use peek_eval::ExecutionContext;
use peek_runtime::{load_call_stack, CallStack};

#[derive(Parser)]
#[command(name = "peek-agent", version, about = "Evaluate breakpoint expressions against a recorded stack")]
struct Cli {
    /// Agent config file (TOML)
    #[arg(long, env = "PEEK_CONFIG", global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Evaluate one expression and print the captured result
    Evaluate(EvaluateArgs),
    /// Feed a recorded stack to a breakpoint and print its final state
    Hit(HitArgs),
}

#[derive(Args)]
struct EvaluateArgs {
    /// JSON stack fixture
    #[arg(long)]
    stack: PathBuf,
    /// Expression source
    #[arg(long)]
    expr: String,
    /// Frame to evaluate in (0 is the innermost)
    #[arg(long, default_value_t = 0)]
    frame: usize,
}

#[derive(Args)]
struct HitArgs {
    /// JSON stack fixture
    #[arg(long)]
    stack: PathBuf,
    /// JSON breakpoint request
    #[arg(long)]
    breakpoint: PathBuf,
    /// Number of times the breakpoint is hit
    #[arg(long, default_value_t = 1)]
    hits: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EvaluateOutput {
    variable: Variable,
    #[serde(skip_serializing_if = "VariableTable::is_empty")]
    variable_table: VariableTable,
}

fn main() {
    let cli = Cli::parse();
    let exit_code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            2
        }
    };

    std::process::exit(exit_code);
}

fn run(cli: Cli) -> Result<i32> {
    let config = match &cli.config {
        Some(path) => PeekConfig::load_from_path(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PeekConfig::default(),
    };
    for warning in config.validate() {
        eprintln!("warning: {}: {}", warning.toml_path, warning.message);
    }
    let logs = hardening::init(&config);
    let context = Arc::new(AgentContext::from_config(&config));

    match cli.command {
        Command::Evaluate(args) => {
            let stack = read_stack(&args.stack)?;
            let frame = stack
                .frames
                .get(args.frame)
                .cloned()
                .ok_or(AgentError::MissingFrame(args.frame))?;
            let exec = ExecutionContext::new(frame, Arc::clone(&stack.registry));

            let capture = Capture::new(CaptureLimits::from(&context.capture));
            let mut budget = CaptureBudget::new(context.capture.budget_bytes);
            let mut table = VariableTable::new();
            let variable = match context.evaluator.evaluate_source(&args.expr, exec) {
                Ok(value) => capture.capture(
                    &value,
                    Some(args.expr.as_str()),
                    context.capture.max_depth,
                    &mut budget,
                    Some(&mut table),
                ),
                Err(err) => Variable::error(
                    Some(args.expr.as_str()),
                    Reference::VariableValue,
                    err.to_string(),
                ),
            };
            let failed = variable.is_error();
            print_json(&EvaluateOutput {
                variable,
                variable_table: table,
            })?;
            Ok(if failed { 1 } else { 0 })
        }
        Command::Hit(args) => {
            let stack = read_stack(&args.stack)?;
            let request = std::fs::read_to_string(&args.breakpoint)
                .with_context(|| format!("reading {}", args.breakpoint.display()))?;
            let mut breakpoint = Breakpoint::from_json(&request, context)?;
            let mark = logs.pushed();
            for _ in 0..args.hits {
                if breakpoint.is_complete() {
                    break;
                }
                breakpoint.evaluate(&stack);
            }
            // Without stderr mirroring, log-point output would only reach the buffer.
            if !config.logging.stderr {
                for line in logs.last_lines(logs.pushed() - mark) {
                    eprintln!("{line}");
                }
            }
            print_json(&breakpoint)?;
            let failed = breakpoint.status().is_some_and(|status| status.is_error);
            Ok(if failed { 1 } else { 0 })
        }
    }
}

fn read_stack(path: &Path) -> Result<CallStack> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let stack = load_call_stack(&text).map_err(AgentError::from)?;
    Ok(stack)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value)?;
    println!("{out}");
    Ok(())
}
