use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Shared application context for global flags
#[derive(Clone, Debug)]
pub struct AppContext {
    pub quiet: bool,    // global --quiet
    pub no_color: bool, // global --no-color
    pub dry_run: bool,  // global --dry-run
}

#[derive(Parser)]
#[command(name = "stagehand")]
#[command(
    about = "Review and selectively apply AI-proposed file changes before they touch disk"
)]
#[command(version, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Suppress progress bars and non-essential output
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Show what would be done without executing
    #[arg(long, global = true)]
    pub dry_run: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show a proposal as a tree plus side-by-side diffs
    Preview(PreviewArgs),

    /// Cross-check a proposal against the workspace
    Validate(ValidateArgs),

    /// Apply the selected operations of a proposal
    Apply(ApplyArgs),

    /// Manage backup sessions created by apply
    Backup(BackupArgs),

    /// Initialize a stagehand.toml config file
    Init(InitArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Parser)]
pub struct PreviewArgs {
    /// Proposal document (JSON) to preview
    pub proposal: Option<PathBuf>,

    /// Read the proposal document from the clipboard
    #[arg(long, conflicts_with = "proposal")]
    pub from_clipboard: bool,

    /// Workspace root (defaults to config, then the current directory)
    #[arg(long)]
    pub workspace_root: Option<PathBuf>,

    /// Total column budget for side-by-side output
    #[arg(long)]
    pub width: Option<usize>,

    /// Show only the file tree, no diffs
    #[arg(long)]
    pub tree_only: bool,
}

#[derive(Parser)]
pub struct ValidateArgs {
    /// Proposal document (JSON) to validate
    pub proposal: Option<PathBuf>,

    /// Read the proposal document from the clipboard
    #[arg(long, conflicts_with = "proposal")]
    pub from_clipboard: bool,

    /// Workspace root (defaults to config, then the current directory)
    #[arg(long)]
    pub workspace_root: Option<PathBuf>,

    /// Emit the report as single-line JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser)]
pub struct ApplyArgs {
    /// Proposal document (JSON) to apply
    pub proposal: Option<PathBuf>,

    /// Read the proposal document from the clipboard
    #[arg(long, conflicts_with = "proposal")]
    pub from_clipboard: bool,

    /// Workspace root (defaults to config, then the current directory)
    #[arg(long)]
    pub workspace_root: Option<PathBuf>,

    /// Apply only these workspace-relative paths (everything else is
    /// deselected)
    #[arg(long, value_name = "PATH")]
    pub only: Vec<PathBuf>,

    /// Deselect these workspace-relative paths before applying
    #[arg(long, value_name = "PATH")]
    pub skip: Vec<PathBuf>,

    /// Back up existing files into a session before overwriting
    #[arg(long, overrides_with = "no_backup")]
    pub backup: bool,

    /// Skip the backup session even if the config enables it
    #[arg(long, overrides_with = "backup")]
    pub no_backup: bool,

    /// Apply even when validation reports errors
    #[arg(long)]
    pub force: bool,

    /// Emit the batch result as single-line JSON
    #[arg(long)]
    pub json: bool,
}

impl ApplyArgs {
    /// Resolve the backup flag pair against the configured default.
    pub fn backup_enabled(&self, default: bool) -> bool {
        if self.backup {
            true
        } else if self.no_backup {
            false
        } else {
            default
        }
    }
}

#[derive(Parser)]
pub struct BackupArgs {
    #[command(subcommand)]
    pub command: BackupSubcommand,
}

#[derive(Subcommand)]
pub enum BackupSubcommand {
    /// List backup sessions
    List(BackupListArgs),

    /// Show detailed information about a backup session
    Show(BackupShowArgs),

    /// Restore files from a backup session
    Restore(BackupRestoreArgs),
}

#[derive(Parser, Debug)]
pub struct BackupListArgs {
    /// Workspace root (defaults to config, then the current directory)
    #[arg(long)]
    pub workspace_root: Option<PathBuf>,

    /// Limit result count
    #[arg(long, default_value_t = 50)]
    pub limit: usize,

    /// Machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct BackupShowArgs {
    /// Session identifier or 'latest'
    pub id: String,

    /// Workspace root (defaults to config, then the current directory)
    #[arg(long)]
    pub workspace_root: Option<PathBuf>,

    /// JSON output
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct BackupRestoreArgs {
    /// Session ID or 'latest'
    pub session: String,

    /// Workspace root (defaults to config, then the current directory)
    #[arg(long)]
    pub workspace_root: Option<PathBuf>,

    /// Restore only this workspace-relative path from the session
    #[arg(long)]
    pub path: Option<PathBuf>,

    /// Overwrite even if current content differs from the backup
    #[arg(long)]
    pub force: bool,

    /// Validate backed-up content against manifest checksums
    #[arg(long)]
    pub verify_checksum: bool,

    /// Emit JSON result instead of human text
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser)]
pub struct InitArgs {
    /// Directory to initialize config in
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Overwrite existing config file
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

#[derive(Parser)]
pub struct CompletionsArgs {
    /// Target shell
    #[arg(value_enum)]
    pub shell: Shell,

    /// Output directory; if omitted and --stdout not set, prints error
    #[arg(long)]
    pub out_dir: Option<PathBuf>,

    /// Print completion script to stdout instead of a file
    #[arg(long)]
    pub stdout: bool,
}
