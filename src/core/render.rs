//! Terminal presentation of proposals: tree view, side-by-side diff columns
//! and validation issue tables. Pure formatting over core data; nothing here
//! mutates a proposal.

use anyhow::Result;
use owo_colors::OwoColorize;
use ptree::TreeBuilder;
use tabled::{Table, Tabled};

use crate::core::diff_align::{AlignedHunk, DiffLineKind, DiffRow};
use crate::core::proposal::{
    FileOp, NodeId, OperationStatus, Proposal, SelectionState,
};
use crate::core::validate::ValidationIssue;

/// Render the proposal forest as an indented tree, one line per node.
///
/// Files show a selection mark, an operation badge (A = create,
/// M = overwrite) and any attached issue; directories show their tri-state.
pub fn proposal_tree(proposal: &Proposal) -> Result<String> {
    let mut builder = TreeBuilder::new(proposal.description.clone());
    for &root in proposal.roots() {
        add_node(&mut builder, proposal, root);
    }
    let tree = builder.build();

    let mut buf = Vec::new();
    ptree::write_tree(&tree, &mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn add_node(builder: &mut TreeBuilder, proposal: &Proposal, id: NodeId) {
    let node = proposal.node(id);
    if node.is_dir() {
        builder.begin_child(node_label(proposal, id));
        for &child in &node.children {
            add_node(builder, proposal, child);
        }
        builder.end_child();
    } else {
        builder.add_empty_child(node_label(proposal, id));
    }
}

fn node_label(proposal: &Proposal, id: NodeId) -> String {
    let node = proposal.node(id);
    let mark = selection_mark(proposal.selection_state(id));

    let mut label = if node.is_dir() {
        format!("{} {}/", mark, node.name.blue())
    } else {
        let badge = match node.file_op() {
            Some(FileOp::Create) => "A".green().to_string(),
            Some(FileOp::Overwrite) => "M".yellow().to_string(),
            None => " ".to_string(),
        };
        format!("{} [{}] {}", mark, badge, node.name)
    };

    match node.status {
        OperationStatus::Applied => label.push_str(&format!(" {}", "applied".green())),
        OperationStatus::Failed => label.push_str(&format!(" {}", "failed".red())),
        OperationStatus::InProgress | OperationStatus::Pending => {}
    }
    if let Some(issue) = &node.issue {
        label.push_str(&format!(" ({}: {})", issue.severity, issue.kind));
    }
    label
}

fn selection_mark(state: SelectionState) -> &'static str {
    match state {
        SelectionState::All => "[x]",
        SelectionState::Some => "[~]",
        SelectionState::None => "[ ]",
    }
}

/// Render an aligned hunk as two padded columns separated by a gutter.
///
/// `width` is the total line budget; each side gets half, minus the gutter.
pub fn side_by_side(hunk: &AlignedHunk, width: usize) -> Vec<String> {
    let cell_width = width.saturating_sub(3).max(20) / 2;

    hunk.original
        .iter()
        .zip(hunk.proposed.iter())
        .map(|(left, right)| {
            format!(
                "{} │ {}",
                render_cell(left, cell_width),
                render_cell(right, cell_width)
            )
        })
        .collect()
}

fn render_cell(row: &DiffRow, width: usize) -> String {
    match row {
        DiffRow::Placeholder => pad_to_width("", width).dimmed().to_string(),
        DiffRow::Line {
            content,
            line_no,
            kind,
            ..
        } => {
            let number = match line_no {
                Some(n) => format!("{n:>4}"),
                None => "    ".to_string(),
            };
            let marker = match kind {
                DiffLineKind::Added => "+",
                DiffLineKind::Removed => "-",
                DiffLineKind::Modified => "~",
                DiffLineKind::Unchanged => " ",
            };
            let body = pad_to_width(content, width.saturating_sub(6));
            let cell = format!("{number} {marker}{body}");
            match kind {
                DiffLineKind::Added => cell.green().to_string(),
                DiffLineKind::Removed => cell.red().to_string(),
                DiffLineKind::Modified => cell.yellow().to_string(),
                DiffLineKind::Unchanged => cell,
            }
        }
    }
}

/// Truncate or pad to an exact display width. Char-based, so multi-byte
/// content cannot split mid-codepoint.
fn pad_to_width(s: &str, width: usize) -> String {
    let mut out: String = s.chars().take(width).collect();
    let used = out.chars().count();
    out.extend(std::iter::repeat_n(' ', width.saturating_sub(used)));
    out
}

/// CLI entry: print the proposal tree and per-file side-by-side diffs.
pub fn run(args: crate::cli::PreviewArgs, ctx: &crate::cli::AppContext) -> Result<()> {
    use crate::core::diff_align::align;
    use crate::core::diff_source::diff_lines;
    use crate::infra::config::{load_config, resolve_workspace_root};
    use crate::infra::fs::{FileSystem, RealFileSystem};

    let config = load_config().unwrap_or_default();
    let workspace_root = resolve_workspace_root(args.workspace_root.as_deref(), &config)?;

    let doc = crate::core::proposal::load_doc(args.proposal.as_deref(), args.from_clipboard)?;
    let (description, operations) = doc.into_operations();
    let prop = Proposal::build(description, operations)?;

    if ctx.quiet {
        return Ok(());
    }

    println!("{}", proposal_tree(&prop)?);
    if args.tree_only {
        return Ok(());
    }

    let width = args.width.unwrap_or(config.preview.width);
    let fs_impl = RealFileSystem;

    for id in prop.document_order() {
        let node = prop.node(id);
        let Some(op) = node.file_op() else { continue };

        let current = match op {
            FileOp::Overwrite => {
                let target = workspace_root.join(&node.path);
                if fs_impl.exists(&target) {
                    fs_impl.read_to_string(&target)?
                } else {
                    String::new()
                }
            }
            FileOp::Create => String::new(),
        };
        let proposed = node.file_content().unwrap_or_default();
        let hunk = align(&diff_lines(&current, proposed));

        let op_label = match op {
            FileOp::Create => "create",
            FileOp::Overwrite => "overwrite",
        };
        println!("── {} ({op_label})", node.path.display().bold());
        for line in side_by_side(&hunk, width) {
            println!("{line}");
        }
        println!();
    }
    Ok(())
}

#[derive(Tabled)]
struct IssueRow {
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Path")]
    path: String,
    #[tabled(rename = "Message")]
    message: String,
}

/// Render validation findings as an ASCII table, in report order.
pub fn issues_table(issues: &[ValidationIssue]) -> String {
    let rows: Vec<IssueRow> = issues
        .iter()
        .map(|issue| IssueRow {
            severity: issue.severity.to_string(),
            kind: issue.kind.to_string(),
            path: issue.path.display().to_string(),
            message: issue.message.clone(),
        })
        .collect();
    Table::new(rows).to_string()
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::core::diff_align::align;
    use crate::core::diff_source::diff_lines;
    use crate::core::proposal::ProposedOperation;
    use crate::core::validate::{IssueKind, Severity};

    fn proposal() -> Proposal {
        Proposal::build(
            "demo",
            vec![
                ProposedOperation {
                    path: PathBuf::from("src/lib.rs"),
                    op: FileOp::Overwrite,
                    content: "x".into(),
                    base_cid: None,
                },
                ProposedOperation {
                    path: PathBuf::from("README.md"),
                    op: FileOp::Create,
                    content: "y".into(),
                    base_cid: None,
                },
            ],
        )
        .unwrap()
    }

    #[test]
    fn tree_lists_every_node_in_display_order() {
        let rendered = proposal_tree(&proposal()).unwrap();
        let src_pos = rendered.find("src").unwrap();
        let readme_pos = rendered.find("README.md").unwrap();
        assert!(src_pos < readme_pos, "directories come first");
        assert!(rendered.contains("lib.rs"));
    }

    #[test]
    fn side_by_side_output_matches_row_count() {
        let hunk = align(&diff_lines("a\nb\n", "a\nc\nd\n"));
        let lines = side_by_side(&hunk, 80);
        assert_eq!(lines.len(), hunk.row_count());
        assert!(lines.iter().all(|l| l.contains('│')));
    }

    #[test]
    fn pad_to_width_is_exact() {
        assert_eq!(pad_to_width("ab", 4), "ab  ");
        assert_eq!(pad_to_width("abcdef", 4), "abcd");
        assert_eq!(pad_to_width("héllo", 3).chars().count(), 3);
    }

    #[test]
    fn issues_render_as_table_rows() {
        let issues = vec![ValidationIssue {
            path: PathBuf::from("a.txt"),
            kind: IssueKind::FileExists,
            severity: Severity::Warning,
            message: "a.txt already exists".into(),
        }];
        let table = issues_table(&issues);
        assert!(table.contains("a.txt"));
        assert!(table.contains("warning"));
    }
}
