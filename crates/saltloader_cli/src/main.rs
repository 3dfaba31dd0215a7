//! `saltloader` command-line entry point.
//!
//! # Responsibility
//! - Build one execution context from an options file and the built-in
//!   adapters.
//! - Render results as JSON or YAML.
//!
//! Exit codes: 0 success, 1 unknown function, 2 adapter error, 3 setup error.

mod cli;

use clap::Parser;
use cli::{Cli, Commands, OutputFormat};
use log::{error, info};
use saltloader_core::modules::builtin_source;
use saltloader_core::{
    init_logging, CallArgs, DispatchError, ExecutionContext, LoaderOptions, LogTarget,
};
use serde_json::{json, Map, Value};
use std::process::ExitCode;

const EXIT_UNKNOWN_FUNCTION: u8 = 1;
const EXIT_ADAPTER_ERROR: u8 = 2;
const EXIT_SETUP_ERROR: u8 = 3;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let target = match cli.log_dir.as_deref() {
        Some(dir) => LogTarget::directory(dir),
        None => Ok(LogTarget::Stderr),
    };
    if let Err(err) = target.and_then(|target| init_logging(&cli.log_level, target)) {
        eprintln!("logging setup failed: {err}");
        return ExitCode::from(EXIT_SETUP_ERROR);
    }

    let options = match &cli.config {
        Some(path) => match LoaderOptions::load(path) {
            Ok(options) => options,
            Err(err) => {
                error!("event=cli_config module=cli status=error error={err}");
                eprintln!("{err}");
                return ExitCode::from(EXIT_SETUP_ERROR);
            }
        },
        None => LoaderOptions::new(),
    };

    let context = ExecutionContext::new(options, vec![builtin_source()]);
    info!(
        "event=cli_context module=cli status=ok context_id={}",
        context.registry().context_id()
    );

    match cli.command {
        Commands::Call { fun, args } => {
            let args = parse_call_args(&args);
            match context.call(&fun, &args) {
                Ok(result) => print_value(cli.out, &result),
                Err(err) => {
                    eprintln!("{err}");
                    return ExitCode::from(exit_code_for(&err));
                }
            }
        }
        Commands::List { module } => {
            let table = context.snapshot();
            let names: Vec<&str> = match module.as_deref() {
                Some(module) => table
                    .functions_of(module)
                    .map(|bound| bound.qualified_name())
                    .collect(),
                None => table.qualified_names(),
            };
            print_value(cli.out, &json!(names));
        }
        Commands::Report => {
            let report = context.report();
            print_value(cli.out, &json!(report.entries()));
        }
        Commands::Sync => {
            let before = context.current();
            let after = context.sync();
            print_value(
                cli.out,
                &json!({
                    "generation": after.generation(),
                    "before": before.table().len(),
                    "after": after.table().len(),
                }),
            );
        }
    }
    ExitCode::SUCCESS
}

fn exit_code_for(err: &DispatchError) -> u8 {
    match err {
        DispatchError::UnknownCapability { .. } => EXIT_UNKNOWN_FUNCTION,
        DispatchError::Adapter { .. } => EXIT_ADAPTER_ERROR,
    }
}

/// Splits raw CLI arguments into positional and keyword arguments.
fn parse_call_args(raw: &[String]) -> CallArgs {
    let mut args = Vec::new();
    let mut kwargs = Map::new();
    for item in raw {
        match item.split_once('=') {
            Some((key, value)) if is_kwarg_key(key) => {
                kwargs.insert(key.to_string(), parse_scalar(value));
            }
            _ => args.push(parse_scalar(item)),
        }
    }
    CallArgs { args, kwargs }
}

fn is_kwarg_key(key: &str) -> bool {
    let mut chars = key.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// YAML scalar parsing: `true`, `10`, `[a, b]` become typed values; anything
/// unparseable stays a string.
fn parse_scalar(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::String(String::new());
    }
    match serde_yaml::from_str::<Value>(raw) {
        Ok(Value::Null) if raw != "null" && raw != "~" => Value::String(raw.to_string()),
        Ok(value) => value,
        Err(_) => Value::String(raw.to_string()),
    }
}

fn print_value(format: OutputFormat, value: &Value) {
    let rendered = match format {
        OutputFormat::Json => serde_json::to_string_pretty(value).map_err(|err| err.to_string()),
        OutputFormat::Yaml => serde_yaml::to_string(value).map_err(|err| err.to_string()),
    };
    match rendered {
        Ok(text) => println!("{}", text.trim_end()),
        Err(err) => eprintln!("failed to render output: {err}"),
    }
}
