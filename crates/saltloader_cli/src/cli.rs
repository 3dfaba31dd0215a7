//! CLI command definitions.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Load adapters for one execution context and dispatch calls against them.
#[derive(Debug, Parser)]
#[command(name = "saltloader")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Options file (`.json`, otherwise YAML)
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level: trace|debug|info|warn|error
    #[arg(short = 'l', long, global = true, default_value = "warn")]
    pub log_level: String,

    /// Write rotating log files to this absolute directory instead of stderr
    #[arg(long, global = true)]
    pub log_dir: Option<String>,

    /// Output format
    #[arg(long = "out", global = true, value_enum, default_value_t = OutputFormat::Json)]
    pub out: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Yaml,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Call `<module>.<function>`; `key=value` arguments become keyword arguments
    Call {
        /// Qualified function name
        fun: String,

        /// Arguments, each parsed as a YAML scalar
        #[arg(allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// List loaded functions
    List {
        /// Only functions of this virtual name
        module: Option<String>,
    },

    /// Show adapters that were not loaded and why
    Report,

    /// Rebuild the dispatch table once
    Sync,
}
