//! **stagehand** - Review and selectively apply AI-proposed file changes before they touch disk
//!
//! Proposals arrive as a flat list of create/overwrite operations, get built
//! into a selectable tree, cross-checked against the workspace, and applied
//! one file at a time with progress, cancellation and session backups.

/// Command-line interface with clap integration
pub mod cli;

/// Shell completion generation
pub mod completion;

/// Core review-and-apply pipeline
pub mod core {
    /// Side-by-side alignment of classified diff lines
    pub mod diff_align;
    pub use diff_align::{AlignedHunk, DiffLine, DiffLineKind, DiffRow, align};

    /// Diff backend adapter over the `similar` crate
    pub mod diff_source;
    pub use diff_source::diff_lines;

    /// Proposal model: arena-backed operation tree with selection state
    pub mod proposal;
    pub use proposal::{
        FileOp, NodeId, OperationStatus, Proposal, ProposalDoc, ProposedOperation,
        SelectionState,
    };

    /// Selection propagation and tri-state maintenance
    pub mod selection;

    /// Filesystem cross-checks with per-node issue attachment
    pub mod validate;
    pub use validate::{IssueKind, Severity, ValidationIssue, ValidationReport, validate};

    /// Sequential batch executor with progress, cancellation and backups
    pub mod apply;
    pub use apply::{
        ApplyEngine, ApplyOptions, BatchApplyProgress, BatchApplyResult, CancelFlag,
        PerFileResult, ProgressSink,
    };

    /// Session-scoped backup store with manifests and restore
    pub mod backup;
    pub use backup::{BackupManager, list_sessions, restore_session};

    /// Terminal rendering: tree view, diff columns, issue tables
    pub mod render;
}

/// Infrastructure - Configuration and filesystem access
pub mod infra {
    /// Configuration management with TOML support
    pub mod config;
    pub use config::{Config, load_config};

    /// Filesystem trait seam with an atomic-write production impl
    pub mod fs;
    pub use fs::{FileSystem, RealFileSystem};
}

// Strategic re-exports for clean consumer interfaces
pub use cli::{AppContext, Cli, Commands};
pub use core::{
    ApplyEngine, BatchApplyResult, CancelFlag, Proposal, ProposalDoc, ValidationReport, align,
    diff_lines, validate,
};
pub use infra::{Config, FileSystem, RealFileSystem, load_config};
