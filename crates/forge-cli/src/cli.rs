use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    version,
    about = "fragforge - combinatorial, fragment-based exploration of chemical space.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Number of worker threads for graph building and fitness evaluation.
    /// Overrides `exploration.parallel-tasks` from the run file.
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Enumerate every molecule reachable from the root graphs, level by level.
    Explore(ExploreArgs),
    /// Score a single graph (JSON) or structure (SDF) with the configured fitness provider.
    Evaluate(EvaluateArgs),
}

/// Arguments for the `explore` subcommand.
#[derive(Args, Debug)]
pub struct ExploreArgs {
    /// Path to the run file in TOML format.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub config: PathBuf,

    /// Continue from the checkpoint found in the work directory.
    #[arg(short, long)]
    pub resume: bool,

    /// Override `exploration.max-level` from the run file.
    #[arg(short = 'l', long, value_name = "INT")]
    pub max_level: Option<usize>,

    /// Override the work directory from the run file.
    #[arg(short, long, value_name = "PATH")]
    pub work_dir: Option<PathBuf>,

    /// Set a specific configuration value, overriding the run file.
    /// Can be used multiple times. Example: -S exploration.batch-size=64
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Arguments for the `evaluate` subcommand.
#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// Path to the run file in TOML format. Only its fitness settings are required.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub config: PathBuf,

    /// Graph (`.json`) or structure (`.sdf`) to evaluate.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub input: PathBuf,

    /// Override the work directory from the run file.
    #[arg(short, long, value_name = "PATH")]
    pub work_dir: Option<PathBuf>,

    /// Set a specific configuration value, overriding the run file.
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}
