//! Command-line interface definition.
use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

/// Top-level CLI entry point for the perch reconciliation engine.
#[derive(Parser, Debug)]
#[command(
    name = "perch",
    about = "Desired-state reconciliation for dotfiles, packages and machine settings",
    version
)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Options shared by every subcommand.
    #[command(flatten)]
    pub global: GlobalOpts,
}

/// Options shared across all subcommands.
#[derive(Parser, Debug, Clone, Default)]
pub struct GlobalOpts {
    /// Config repository (overrides PERCH_CONFIG_PATH and the settings file)
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    /// Preview changes without applying
    #[arg(short = 'd', long, global = true)]
    pub dry_run: bool,

    /// Machine name used to pick the machine profile (defaults to the host name)
    #[arg(long, global = true)]
    pub machine: Option<String>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Converge every eligible module, then system packages and fonts
    Deploy(DeployOpts),
    /// Report link and registry drift without changing anything
    Status(StatusOpts),
    /// List pre-deploy snapshots, newest first
    Snapshots,
    /// Put files from a snapshot back in place
    Restore(RestoreOpts),
    /// Git integration for the config repository
    #[command(subcommand)]
    Git(GitCommand),
    /// Record a directory and list what changed in it afterwards
    #[command(subcommand)]
    Diff(DiffCommand),
    /// Generate shell completions
    Completions(CompletionsOpts),
    /// Print version information
    Version,
}

/// Options for the `deploy` subcommand.
#[derive(Parser, Debug, Clone, Default)]
pub struct DeployOpts {
    /// Ask before each module and package section
    #[arg(short, long)]
    pub interactive: bool,
}

/// Output format for `status`.
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable lines grouped by module
    #[default]
    Pretty,
    /// One JSON array of results on stdout
    Json,
}

/// Options for the `status` subcommand.
#[derive(Parser, Debug, Clone, Default)]
pub struct StatusOpts {
    /// Output format
    #[arg(short, long, value_enum, default_value_t)]
    pub output: OutputFormat,
}

/// Options for the `restore` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct RestoreOpts {
    /// Snapshot id as printed by `perch snapshots`
    pub id: String,

    /// Restore only the entry with this file name
    #[arg(long)]
    pub file: Option<String>,
}

/// `git` subcommands.
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitCommand {
    /// Register module clean filters without deploying
    Setup,
}

/// `diff` subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum DiffCommand {
    /// Record the files below a directory
    Start(DiffStartOpts),
    /// List what changed since `diff start` and forget the recording
    Stop,
}

/// Options for `diff start`.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
pub struct DiffStartOpts {
    /// Directory to record
    pub path: PathBuf,
}

/// Options for the `completions` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct CompletionsOpts {
    /// Target shell
    #[arg(value_enum)]
    pub shell: Shell,
}
