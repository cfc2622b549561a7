//! CLI parse: clap types for quizgen. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// quizgen - quiz batches from study-group notes
#[derive(Parser, Debug)]
#[command(name = "quizgen")]
#[command(about = "Generate and persist quiz batches for finished study steps")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (replaces global and workspace config files)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Disable logging
    #[arg(long)]
    pub quiet: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Generate quizzes for every step that ended before today and has none
    Scan {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Generate today's batch for one step
    Generate {
        #[arg(long)]
        group: i64,
        #[arg(long)]
        step: i32,
    },
    /// Load groups, steps and notes from a JSON file into the sled store
    Import {
        /// JSON file with "groups", "steps" and "notes" arrays
        file: PathBuf,
    },
    /// List persisted quizzes for one step
    Show {
        #[arg(long)]
        group: i64,
        #[arg(long)]
        step: i32,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
}
