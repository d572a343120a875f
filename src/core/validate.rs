//! Proposal validation against the live workspace.
//!
//! Walks the tree in document order and cross-checks every node's target
//! path: containment inside the workspace root, collisions with existing
//! files, write reachability, and staleness of overwrite bases. Issues are
//! collected flat, then mapped back onto nodes by exact path; a node carries
//! at most one issue, and every run fully clears the previous run's results
//! before writing its own.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::core::apply::CancelFlag;
use crate::core::proposal::{FileOp, Proposal, content_cid};
use crate::infra::fs::FileSystem;

/// What a validation issue is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// A `Create` target already exists on disk.
    FileExists,
    /// Path escapes the workspace root or is not relative.
    InvalidPath,
    /// Target location cannot be written.
    PermissionDenied,
    /// An `Overwrite` target's current content no longer matches the base
    /// recorded in the proposal.
    StaleContent,
    /// The write itself failed during apply.
    WriteFailed,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueKind::FileExists => write!(f, "file exists"),
            IssueKind::InvalidPath => write!(f, "invalid path"),
            IssueKind::PermissionDenied => write!(f, "permission denied"),
            IssueKind::StaleContent => write!(f, "stale content"),
            IssueKind::WriteFailed => write!(f, "write failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Shown to the reviewer; does not block apply.
    Warning,
    /// Blocks apply until resolved.
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// One finding, attached to the node whose path matches.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationIssue {
    pub path: PathBuf,
    pub kind: IssueKind,
    pub severity: Severity,
    pub message: String,
}

impl ValidationIssue {
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// Outcome of one validation pass.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
    pub has_errors: bool,
    /// True when the pass was interrupted; findings cover a prefix only.
    pub cancelled: bool,
}

/// Run one validation pass and annotate the tree.
///
/// Checks per file node, first finding wins (a node carries one issue):
/// 1. path containment — absolute paths and `..` escapes are structural
///    errors and skip the filesystem checks entirely;
/// 2. write reachability at the target location;
/// 3. `Create` targets that already exist (warning, apply may proceed);
/// 4. `Overwrite` bases that went stale since the proposal was generated.
///
/// Directory nodes get the containment check only.
#[instrument(skip_all, fields(description = %proposal.description))]
pub fn validate(
    proposal: &mut Proposal,
    workspace_root: &Path,
    fs: &dyn FileSystem,
    cancel: &CancelFlag,
) -> ValidationReport {
    proposal.clear_issues();

    // Canonicalize once so join results are stable; fall back to the given
    // root when it does not exist yet.
    let root = dunce::canonicalize(workspace_root)
        .unwrap_or_else(|_| workspace_root.to_path_buf());

    let mut issues: IndexMap<PathBuf, ValidationIssue> = IndexMap::new();
    let mut cancelled = false;

    for id in proposal.document_order() {
        if cancel.is_cancelled() {
            cancelled = true;
            break;
        }

        let node = proposal.node(id);
        let rel = node.path.clone();

        if let Some(reason) = escape_reason(&rel) {
            issues.insert(
                rel.clone(),
                ValidationIssue {
                    path: rel,
                    kind: IssueKind::InvalidPath,
                    severity: Severity::Error,
                    message: reason,
                },
            );
            continue;
        }
        if node.is_dir() {
            continue;
        }

        let target = root.join(&rel);
        if !fs.is_writable(&target) {
            issues.insert(
                rel.clone(),
                ValidationIssue {
                    path: rel,
                    kind: IssueKind::PermissionDenied,
                    severity: Severity::Error,
                    message: format!("cannot write to {}", target.display()),
                },
            );
            continue;
        }

        let exists = fs.exists(&target);
        match node.file_op() {
            Some(FileOp::Create) if exists => {
                issues.insert(
                    rel.clone(),
                    ValidationIssue {
                        path: rel,
                        kind: IssueKind::FileExists,
                        severity: Severity::Warning,
                        message: format!(
                            "{} already exists and would be overwritten",
                            target.display()
                        ),
                    },
                );
            }
            Some(FileOp::Overwrite) if exists => {
                if let Some(base_cid) = node.base_cid()
                    && let Ok(current) = fs.read_to_string(&target)
                    && content_cid(&current) != base_cid
                {
                    issues.insert(
                        rel.clone(),
                        ValidationIssue {
                            path: rel,
                            kind: IssueKind::StaleContent,
                            severity: Severity::Warning,
                            message: format!(
                                "{} changed since the proposal was generated",
                                target.display()
                            ),
                        },
                    );
                }
            }
            _ => {}
        }
    }

    // Map findings back onto nodes by exact path. Nodes without a finding
    // were cleared above.
    for id in proposal.document_order() {
        let path = proposal.node(id).path.clone();
        if let Some(issue) = issues.get(&path) {
            proposal.node_mut(id).issue = Some(issue.clone());
        }
    }

    let issues: Vec<ValidationIssue> = issues.into_values().collect();
    let has_errors = issues.iter().any(ValidationIssue::is_error);
    debug!(
        issues = issues.len(),
        has_errors, cancelled, "validation pass finished"
    );

    ValidationReport {
        issues,
        has_errors,
        cancelled,
    }
}

/// CLI entry: validate a proposal document and report findings.
///
/// Exits 1 when error-severity issues are present, 3 when the document
/// itself is unusable.
pub fn run(args: crate::cli::ValidateArgs, ctx: &crate::cli::AppContext) -> anyhow::Result<()> {
    use crate::infra::config::{load_config, resolve_workspace_root};
    use crate::infra::fs::RealFileSystem;

    let config = load_config().unwrap_or_default();
    let workspace_root = resolve_workspace_root(args.workspace_root.as_deref(), &config)?;

    let doc = match crate::core::proposal::load_doc(args.proposal.as_deref(), args.from_clipboard)
    {
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

    let report = validate(&mut prop, &workspace_root, &RealFileSystem, &CancelFlag::new());

    if args.json {
        println!("{}", serde_json::to_string(&report)?);
    } else if !ctx.quiet {
        if report.issues.is_empty() {
            println!("No issues found ({} file(s) checked)", prop.file_count);
        } else {
            println!("{}", crate::core::render::issues_table(&report.issues));
        }
    }

    if report.has_errors {
        std::process::exit(1);
    }
    Ok(())
}

/// Why a workspace-relative path is unacceptable, if it is.
fn escape_reason(path: &Path) -> Option<String> {
    for component in path.components() {
        match component {
            Component::ParentDir => {
                return Some(format!("{} escapes the workspace root", path.display()));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Some(format!("{} is not workspace-relative", path.display()));
            }
            Component::Normal(_) | Component::CurDir => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use tempfile::TempDir;

    use super::*;
    use crate::core::proposal::{ProposedOperation, content_cid};
    use crate::infra::fs::RealFileSystem;

    fn op(path: &str, op: FileOp, content: &str) -> ProposedOperation {
        ProposedOperation {
            path: PathBuf::from(path),
            op,
            content: content.to_string(),
            base_cid: None,
        }
    }

    /// Trait double that refuses writes everywhere.
    struct ReadOnlyFs;

    impl FileSystem for ReadOnlyFs {
        fn read_to_string(&self, _path: &Path) -> anyhow::Result<String> {
            anyhow::bail!("read-only double")
        }
        fn write(&self, _path: &Path, _content: &str) -> anyhow::Result<()> {
            anyhow::bail!("read-only double")
        }
        fn exists(&self, _path: &Path) -> bool {
            false
        }
        fn is_writable(&self, _path: &Path) -> bool {
            false
        }
    }

    #[test]
    fn escaping_path_is_a_structural_error() {
        let mut p =
            Proposal::build("t", vec![op("../evil.txt", FileOp::Create, "x")]).unwrap();
        let report = validate(
            &mut p,
            Path::new("/tmp/ws"),
            &ReadOnlyFs,
            &CancelFlag::new(),
        );

        assert!(report.has_errors);
        // Both the synthesized ".." directory and the file are flagged.
        assert_eq!(report.issues.len(), 2);
        assert!(report.issues.iter().all(|i| i.kind == IssueKind::InvalidPath));

        let node = p.find(Path::new("../evil.txt")).unwrap();
        let issue = p.node(node).issue.as_ref().expect("issue attached");
        assert_eq!(issue.kind, IssueKind::InvalidPath);
    }

    #[test]
    fn existing_create_target_warns_but_does_not_block() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.txt"), "already here").unwrap();

        let mut p = Proposal::build(
            "t",
            vec![
                op("a.txt", FileOp::Create, "new"),
                op("b/c.txt", FileOp::Create, "new"),
            ],
        )
        .unwrap();
        let report = validate(&mut p, tmp.path(), &RealFileSystem, &CancelFlag::new());

        assert!(!report.has_errors);
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].kind, IssueKind::FileExists);
        assert_eq!(report.issues[0].severity, Severity::Warning);
        assert_eq!(report.issues[0].path, PathBuf::from("a.txt"));

        // The clean file carries no issue.
        let clean = p.find(Path::new("b/c.txt")).unwrap();
        assert!(p.node(clean).issue.is_none());
    }

    #[test]
    fn unwritable_target_is_an_error() {
        let mut p = Proposal::build("t", vec![op("x.txt", FileOp::Create, "x")]).unwrap();
        let report = validate(
            &mut p,
            Path::new("/tmp/ws"),
            &ReadOnlyFs,
            &CancelFlag::new(),
        );

        assert!(report.has_errors);
        assert_eq!(report.issues[0].kind, IssueKind::PermissionDenied);
    }

    #[test]
    fn stale_overwrite_base_warns() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("f.txt"), "edited since").unwrap();

        let mut p = Proposal::build(
            "t",
            vec![ProposedOperation {
                path: PathBuf::from("f.txt"),
                op: FileOp::Overwrite,
                content: "proposed".into(),
                base_cid: Some(content_cid("original content")),
            }],
        )
        .unwrap();
        let report = validate(&mut p, tmp.path(), &RealFileSystem, &CancelFlag::new());

        assert!(!report.has_errors);
        assert_eq!(report.issues[0].kind, IssueKind::StaleContent);
    }

    #[test]
    fn matching_overwrite_base_is_silent() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("f.txt"), "same content").unwrap();

        let mut p = Proposal::build(
            "t",
            vec![ProposedOperation {
                path: PathBuf::from("f.txt"),
                op: FileOp::Overwrite,
                content: "proposed".into(),
                base_cid: Some(content_cid("same content")),
            }],
        )
        .unwrap();
        let report = validate(&mut p, tmp.path(), &RealFileSystem, &CancelFlag::new());
        assert!(report.issues.is_empty());
    }

    #[test]
    fn revalidation_clears_stale_issues() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.txt"), "conflict").unwrap();

        let mut p = Proposal::build("t", vec![op("a.txt", FileOp::Create, "x")]).unwrap();
        let first = validate(&mut p, tmp.path(), &RealFileSystem, &CancelFlag::new());
        assert_eq!(first.issues.len(), 1);

        // Conflict resolved on disk; the old warning must not linger.
        std::fs::remove_file(tmp.path().join("a.txt")).unwrap();
        let second = validate(&mut p, tmp.path(), &RealFileSystem, &CancelFlag::new());

        assert!(second.issues.is_empty());
        let node = p.find(Path::new("a.txt")).unwrap();
        assert!(p.node(node).issue.is_none());
    }

    #[test]
    fn cancelled_pass_reports_partial_findings() {
        let cancel = CancelFlag::new();
        cancel.cancel();

        let tmp = TempDir::new().unwrap();
        let mut p = Proposal::build("t", vec![op("a.txt", FileOp::Create, "x")]).unwrap();
        let report = validate(&mut p, tmp.path(), &RealFileSystem, &cancel);

        assert!(report.cancelled);
        assert!(report.issues.is_empty());
    }
}
