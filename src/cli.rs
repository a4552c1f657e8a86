use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "steward")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Keep kernel parameters at their declared values", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Resources document (default: $STEWARD_CONFIG or <config dir>/resources.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Decode and validate every definition
    Validate,

    /// Show which resources differ from their desired value
    Check(CheckArgs),

    /// Write desired values once
    Apply(ApplyArgs),

    /// Converge and keep watching until interrupted
    Run(RunArgs),

    /// Compare two resources documents
    Diff(DiffArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Declarative Commands
// ============================================================================

#[derive(Args)]
pub struct CheckArgs {
    /// Resource filter: "kind" or "kind:name" (e.g., "sysctl:net.ipv4")
    pub target: Option<String>,

    /// Print the summary as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct ApplyArgs {
    /// Resource filter: "kind" or "kind:name"
    pub target: Option<String>,

    /// Number of parallel jobs (default: [engine] jobs)
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Print the summary as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct RunArgs {
    /// Resource filter: "kind" or "kind:name"
    pub target: Option<String>,

    /// Report divergence without writing anything
    #[arg(short, long)]
    pub noop: bool,

    /// Log every wait and notification of the watch loops
    #[arg(short, long)]
    pub debug: bool,
}

#[derive(Args)]
pub struct DiffArgs {
    /// Currently deployed document
    pub old: PathBuf,

    /// Proposed document
    pub new: PathBuf,

    /// Print the changes as JSON
    #[arg(long)]
    pub json: bool,
}
