//! CLI argument parsing for muestreo

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Output format for cache summaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table (default)
    Text,
    /// JSON for machine parsing
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "muestreo")]
#[command(version)]
#[command(about = "Inspect runtime argument sample caches", long_about = None)]
pub struct Cli {
    /// Enable debug tracing output to stderr
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Summarize a sample cache file
    Summary {
        /// Cache file written by an instrumented run
        #[arg(value_name = "CACHE")]
        cache: PathBuf,

        /// Output format (text or json)
        #[arg(long = "format", value_enum, default_value = "text")]
        format: OutputFormat,

        /// Only show this fully-qualified function (e.g. utils.add)
        #[arg(long = "function", value_name = "NAME")]
        function: Option<String>,
    },

    /// Report whether a module file would be instrumented
    Check {
        /// Source file of the module
        #[arg(value_name = "PATH")]
        path: PathBuf,

        /// Workspace root; only files beneath it are instrumented
        #[arg(long = "workspace-root", value_name = "ROOT")]
        workspace_root: Option<PathBuf>,

        /// TOML instrumentation config providing the skip rules
        #[arg(long = "config", value_name = "FILE")]
        config: Option<PathBuf>,
    },
}
