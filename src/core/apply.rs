//! Batch apply executor.
//!
//! Walks the selected file leaves of a proposal in document order and
//! performs each create/overwrite through the filesystem seam, one file at a
//! time. Execution is deliberately sequential: progress percentages and the
//! "currently applying" file stay unambiguous, and a cancelled run leaves an
//! explainable prefix of completed work.
//!
//! Failure policy is continue-on-error: one file's failure is recorded and
//! the batch moves on. Cancellation is cooperative and checked only at file
//! boundaries; already-applied files stay applied.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::cli::{AppContext, ApplyArgs};
use crate::core::backup::BackupManager;
use crate::core::proposal::{self, NodeId, OperationStatus, Proposal};
use crate::core::render;
use crate::core::validate::{IssueKind, Severity, ValidationIssue};
use crate::infra::config::{load_config, resolve_workspace_root};
use crate::infra::fs::{FileSystem, RealFileSystem};

/// Cooperative cancellation handle, shared between the driver and the run.
///
/// Advisory only: it never interrupts an in-flight write, it stops the batch
/// at the next file boundary.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Snapshot emitted after every processed file, in file order.
#[derive(Debug, Clone, Serialize)]
pub struct BatchApplyProgress {
    pub current: PathBuf,
    pub processed: usize,
    pub total: usize,
    pub percent: f64,
}

/// Push channel for progress snapshots; delivery order matches emission.
pub trait ProgressSink {
    fn emit(&mut self, progress: &BatchApplyProgress);
}

/// Sink that drops everything; for callers that do not report progress.
#[derive(Debug, Default)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn emit(&mut self, _progress: &BatchApplyProgress) {}
}

/// Sink that keeps every snapshot; used by tests to assert ordering.
#[derive(Debug, Default)]
pub struct CollectingProgress(pub Vec<BatchApplyProgress>);

impl ProgressSink for CollectingProgress {
    fn emit(&mut self, progress: &BatchApplyProgress) {
        self.0.push(progress.clone());
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ApplyOptions {
    /// Copy existing targets into a backup session before overwriting.
    pub create_backup: bool,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            create_backup: true,
        }
    }
}

/// Per-file outcome, in execution order.
#[derive(Debug, Clone, Serialize)]
pub struct PerFileResult {
    pub path: PathBuf,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregated outcome of one apply run. Immutable once produced.
#[derive(Debug, Clone, Serialize)]
pub struct BatchApplyResult {
    pub results: Vec<PerFileResult>,
    pub success_count: usize,
    pub failed_count: usize,
    pub cancelled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_session: Option<String>,
}

/// Errors that prevent a run from starting at all. Per-file failures are
/// never surfaced here; they live in [`BatchApplyResult`].
#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    #[error("an apply pass is already running on this engine")]
    AlreadyRunning,
    #[error("backup session could not be started: {0}")]
    Backup(String),
}

/// Sequential batch executor. One engine value never runs two passes at
/// once; a second call while one is in flight is rejected.
#[derive(Debug, Default)]
pub struct ApplyEngine {
    running: AtomicBool,
}

struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl ApplyEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Execute every selected file operation, in document order.
    ///
    /// Callers must not mutate the proposal's selection while this runs; the
    /// work list is snapshotted at entry and node statuses are written back
    /// as the run progresses.
    #[instrument(skip_all, fields(description = %proposal.description))]
    pub fn apply(
        &self,
        proposal: &mut Proposal,
        workspace_root: &Path,
        options: &ApplyOptions,
        fs: &dyn FileSystem,
        sink: &mut dyn ProgressSink,
        cancel: &CancelFlag,
    ) -> Result<BatchApplyResult, ApplyError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ApplyError::AlreadyRunning);
        }
        let _guard = RunGuard(&self.running);

        let targets: Vec<NodeId> = proposal.selected_files();
        let total = targets.len();
        info!(files = total, "starting apply pass");

        let mut backup = if options.create_backup && total > 0 {
            let manager = BackupManager::begin(workspace_root, &proposal.description)
                .map_err(|e| ApplyError::Backup(format!("{e:#}")))?;
            Some(manager)
        } else {
            None
        };

        let mut results = Vec::with_capacity(total);
        let mut cancelled = false;

        for id in targets {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let rel = proposal.node(id).path.clone();
            let target = workspace_root.join(&rel);
            proposal.node_mut(id).status = OperationStatus::InProgress;

            let outcome = apply_one(proposal, id, &target, &rel, fs, &mut backup);
            match outcome {
                Ok(()) => {
                    proposal.node_mut(id).status = OperationStatus::Applied;
                    results.push(PerFileResult {
                        path: rel.clone(),
                        success: true,
                        error: None,
                    });
                }
                Err(e) => {
                    let message = format!("{e:#}");
                    debug!(path = %rel.display(), error = %message, "file apply failed");
                    let node = proposal.node_mut(id);
                    node.status = OperationStatus::Failed;
                    node.issue = Some(ValidationIssue {
                        path: rel.clone(),
                        kind: IssueKind::WriteFailed,
                        severity: Severity::Error,
                        message: message.clone(),
                    });
                    results.push(PerFileResult {
                        path: rel.clone(),
                        success: false,
                        error: Some(message),
                    });
                }
            }

            let processed = results.len();
            sink.emit(&BatchApplyProgress {
                current: rel,
                processed,
                total,
                percent: processed as f64 / total as f64 * 100.0,
            });
        }

        let success_count = results.iter().filter(|r| r.success).count();
        let failed_count = results.len() - success_count;

        let backup_session = match backup.as_mut() {
            Some(manager) => {
                let session = manager.session_id().to_string();
                if let Err(e) = manager.finalize(failed_count == 0 && !cancelled) {
                    warn!(error = %format!("{e:#}"), "backup session finalize failed");
                }
                Some(session)
            }
            None => None,
        };

        info!(
            succeeded = success_count,
            failed = failed_count,
            cancelled,
            "apply pass finished"
        );

        Ok(BatchApplyResult {
            results,
            success_count,
            failed_count,
            cancelled,
            backup_session,
        })
    }
}

/// One file: back up the existing target if asked, then write.
fn apply_one(
    proposal: &Proposal,
    id: NodeId,
    target: &Path,
    rel: &Path,
    fs: &dyn FileSystem,
    backup: &mut Option<BackupManager>,
) -> Result<()> {
    if let Some(manager) = backup.as_mut()
        && fs.exists(target)
    {
        manager.backup_file(rel)?;
    }
    let content = proposal
        .node(id)
        .file_content()
        .expect("apply targets are file nodes");
    fs.write(target, content)
}

/// Progress sink driving an indicatif bar.
struct BarSink(indicatif::ProgressBar);

impl ProgressSink for BarSink {
    fn emit(&mut self, progress: &BatchApplyProgress) {
        self.0.set_position(progress.processed as u64);
        self.0
            .set_message(progress.current.display().to_string());
    }
}

/// CLI entry: load the proposal, adjust selection, validate, gate and run.
///
/// Exit codes: 0 on success, 2 when any file failed, 3 for an unusable
/// proposal document, 4 when validation errors block the run.
pub fn run(args: ApplyArgs, ctx: &AppContext) -> Result<()> {
    let config = load_config().unwrap_or_default();
    let workspace_root = resolve_workspace_root(args.workspace_root.as_deref(), &config)?;

    let doc = match proposal::load_doc(args.proposal.as_deref(), args.from_clipboard) {
        Ok(doc) => doc,
        Err(e) => {
            eprintln!("invalid proposal document: {e:#}");
            std::process::exit(3);
        }
    };
    let (description, operations) = doc.into_operations();
    let mut prop = match Proposal::build(description, operations) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("invalid proposal document: {e}");
            std::process::exit(3);
        }
    };

    // Narrow the selection before anything touches disk.
    if !args.only.is_empty() {
        prop.deselect_all();
        for path in &args.only {
            match prop.find(path) {
                Some(id) => prop.set_selected(id, true),
                None => {
                    eprintln!("--only path not in proposal: {}", path.display());
                    std::process::exit(3);
                }
            }
        }
    }
    for path in &args.skip {
        match prop.find(path) {
            Some(id) => prop.set_selected(id, false),
            None => {
                eprintln!("--skip path not in proposal: {}", path.display());
                std::process::exit(3);
            }
        }
    }

    let fs_impl = RealFileSystem;
    let cancel = CancelFlag::new();
    let report = crate::core::validate::validate(&mut prop, &workspace_root, &fs_impl, &cancel);
    if !report.issues.is_empty() && !args.json && !ctx.quiet {
        println!("{}", render::issues_table(&report.issues));
    }
    if report.has_errors && !args.force {
        eprintln!("validation reported errors; fix them or rerun with --force");
        std::process::exit(4);
    }

    if ctx.dry_run {
        if !ctx.quiet {
            println!(
                "DRY RUN: would apply {} file(s) under {}",
                prop.selected_count(),
                workspace_root.display()
            );
            for id in prop.selected_files() {
                println!("  {}", prop.node(id).path.display());
            }
        }
        return Ok(());
    }

    let options = ApplyOptions {
        create_backup: args.backup_enabled(config.apply.backup),
    };

    let bar = if ctx.quiet || args.json {
        indicatif::ProgressBar::hidden()
    } else {
        let pb = indicatif::ProgressBar::new(prop.selected_count() as u64);
        if let Ok(style) =
            indicatif::ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}")
        {
            pb.set_style(style);
        }
        pb
    };
    let mut sink = BarSink(bar.clone());

    let engine = ApplyEngine::new();
    let result = engine.apply(&mut prop, &workspace_root, &options, &fs_impl, &mut sink, &cancel)?;
    bar.finish_and_clear();

    if args.json {
        println!("{}", serde_json::to_string(&result)?);
    } else if !ctx.quiet {
        println!(
            "Applied {} file(s), {} failed",
            result.success_count, result.failed_count
        );
        for r in result.results.iter().filter(|r| !r.success) {
            eprintln!(
                "  failed: {} ({})",
                r.path.display(),
                r.error.as_deref().unwrap_or("unknown error")
            );
        }
        if let Some(session) = &result.backup_session {
            println!("Backup session: {session}");
        }
    }

    if result.failed_count > 0 {
        std::process::exit(2);
    }
    Ok(())
}
