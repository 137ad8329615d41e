//! CLI parse: clap types for Attune. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Attune CLI - reconcile desired configuration against observed machine state
#[derive(Parser)]
#[command(name = "attune")]
#[command(about = "Reconcile desired configuration trees against observed machine state")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory
    #[arg(long, global = true, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    pub format: String,

    /// Enable verbose logging (default: off)
    #[arg(long, global = true, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long, global = true)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long, global = true)]
    pub log_output: Option<String>,

    /// Log file path (if output is "file")
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Classify every address of two tree documents
    Diff {
        /// Observed tree (JSON)
        #[arg(long)]
        observed: PathBuf,
        /// Desired tree (JSON)
        #[arg(long)]
        desired: PathBuf,
        /// Also list unchanged addresses
        #[arg(long)]
        all: bool,
    },
    /// Show the work units and levels a cycle would dispatch
    Plan {
        /// Desired tree (JSON)
        #[arg(long)]
        desired: PathBuf,
        /// Observed tree (JSON); defaults to the persisted status
        #[arg(long)]
        observed: Option<PathBuf>,
    },
    /// Run a full cycle against recording workers and persist the result
    Simulate {
        /// Desired tree (JSON)
        #[arg(long)]
        desired: PathBuf,
    },
    /// Validate a tree document (.json), a worker schema (.toml), or the configuration
    Validate {
        /// File to validate; validates configuration and schemas when omitted
        file: Option<PathBuf>,
    },
}
