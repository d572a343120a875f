//! Proposal model: an arena-backed forest of pending file operations.
//!
//! A proposal is built once from the flat operation list supplied by whatever
//! generated the change set (model output, a patch file, ...). Directory nodes
//! are synthesized from path segments; parent/child links are arena indices,
//! so rebuilds and upward traversal never fight the borrow checker.
//!
//! Ordering contract at every level: directories before files, then
//! lexicographic by name. Incremental inserts keep that ordering.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::validate::ValidationIssue;

/// Arena index of a node inside its owning [`Proposal`].
pub type NodeId = usize;

/// What a file operation does to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileOp {
    /// Target is expected to be new.
    Create,
    /// Target is expected to exist and will be replaced.
    Overwrite,
}

/// Tri-state selection of a directory, derived from its file descendants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionState {
    /// No file descendant is selected.
    None,
    /// At least one, but not all.
    Some,
    /// Every file descendant is selected.
    All,
}

/// Lifecycle of a node during an apply pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Pending,
    InProgress,
    Applied,
    Failed,
}

/// One flat input operation, before tree construction.
#[derive(Debug, Clone)]
pub struct ProposedOperation {
    /// Workspace-relative target path.
    pub path: PathBuf,
    pub op: FileOp,
    pub content: String,
    /// Content id of the target at proposal-generation time, for staleness
    /// detection on overwrites.
    pub base_cid: Option<String>,
}

/// Node payload: directory bookkeeping or file operation.
#[derive(Debug, Clone)]
pub enum NodeKind {
    Dir {
        state: SelectionState,
        expanded: bool,
    },
    File {
        op: FileOp,
        content: String,
        base_cid: Option<String>,
        selected: bool,
    },
}

#[derive(Debug, Clone)]
pub struct ProposalNode {
    /// Workspace-relative path of this node.
    pub path: PathBuf,
    /// Last path segment, used for ordering and display.
    pub name: String,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub kind: NodeKind,
    pub issue: Option<ValidationIssue>,
    pub status: OperationStatus,
}

impl ProposalNode {
    pub fn is_dir(&self) -> bool {
        matches!(self.kind, NodeKind::Dir { .. })
    }

    pub fn is_file(&self) -> bool {
        matches!(self.kind, NodeKind::File { .. })
    }

    /// File selection flag; false for directories.
    pub fn selected(&self) -> bool {
        match &self.kind {
            NodeKind::File { selected, .. } => *selected,
            NodeKind::Dir { .. } => false,
        }
    }

    pub fn expanded(&self) -> bool {
        match &self.kind {
            NodeKind::Dir { expanded, .. } => *expanded,
            NodeKind::File { .. } => false,
        }
    }

    pub fn file_op(&self) -> Option<FileOp> {
        match &self.kind {
            NodeKind::File { op, .. } => Some(*op),
            NodeKind::Dir { .. } => None,
        }
    }

    pub fn file_content(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::File { content, .. } => Some(content.as_str()),
            NodeKind::Dir { .. } => None,
        }
    }

    pub fn base_cid(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::File { base_cid, .. } => base_cid.as_deref(),
            NodeKind::Dir { .. } => None,
        }
    }
}

/// Structural errors raised while building a tree from flat operations.
#[derive(Debug, thiserror::Error)]
pub enum ProposalError {
    #[error("operation has an empty path")]
    EmptyPath,
    #[error("duplicate operation path: {0}")]
    DuplicatePath(String),
    #[error("path {0} is used both as a file and as a directory")]
    DirFileClash(String),
}

/// The full set of pending operations under review.
///
/// Mutated only through the selection entry points and the apply engine;
/// dropped when the review ends.
#[derive(Debug, Clone)]
pub struct Proposal {
    pub description: String,
    pub(crate) nodes: Vec<ProposalNode>,
    pub(crate) roots: Vec<NodeId>,
    pub(crate) by_path: HashMap<PathBuf, NodeId>,
    pub file_count: usize,
    pub directory_count: usize,
    pub(crate) selected_count: usize,
}

impl Proposal {
    /// Build a tree from flat operations. Files start selected; directories
    /// are synthesized from shared path segments and start fully selected and
    /// expanded.
    pub fn build(
        description: impl Into<String>,
        operations: Vec<ProposedOperation>,
    ) -> Result<Self, ProposalError> {
        let mut proposal = Self {
            description: description.into(),
            nodes: Vec::new(),
            roots: Vec::new(),
            by_path: HashMap::new(),
            file_count: 0,
            directory_count: 0,
            selected_count: 0,
        };
        for op in operations {
            proposal.insert_operation(op)?;
        }
        Ok(proposal)
    }

    /// Rebuild from a fresh operation list, carrying over each directory's
    /// expansion flag by path. Directories with no match in the old tree
    /// default to collapsed.
    pub fn rebuild(
        &self,
        operations: Vec<ProposedOperation>,
    ) -> Result<Self, ProposalError> {
        let mut next = Self::build(self.description.clone(), operations)?;
        for node in &mut next.nodes {
            if let NodeKind::Dir { expanded, .. } = &mut node.kind {
                *expanded = match self.find(&node.path) {
                    Some(old_id) => self.nodes[old_id].expanded(),
                    None => false,
                };
            }
        }
        Ok(next)
    }

    fn insert_operation(&mut self, op: ProposedOperation) -> Result<(), ProposalError> {
        let segments = path_segments(&op.path);
        if segments.is_empty() {
            return Err(ProposalError::EmptyPath);
        }

        // Synthesize missing directories along the way.
        let mut parent: Option<NodeId> = None;
        let mut partial = PathBuf::new();
        for segment in &segments[..segments.len() - 1] {
            partial.push(segment);
            parent = Some(match self.by_path.get(&partial) {
                Some(&id) if self.nodes[id].is_dir() => id,
                Some(_) => {
                    return Err(ProposalError::DirFileClash(partial.display().to_string()));
                }
                None => self.new_dir(partial.clone(), segment.clone(), parent),
            });
        }

        let file_path = partial.join(&segments[segments.len() - 1]);
        match self.by_path.get(&file_path) {
            Some(&id) if self.nodes[id].is_dir() => {
                return Err(ProposalError::DirFileClash(file_path.display().to_string()));
            }
            Some(_) => {
                return Err(ProposalError::DuplicatePath(file_path.display().to_string()));
            }
            None => {}
        }

        let id = self.nodes.len();
        self.nodes.push(ProposalNode {
            path: file_path.clone(),
            name: segments[segments.len() - 1].clone(),
            parent,
            children: Vec::new(),
            kind: NodeKind::File {
                op: op.op,
                content: op.content,
                base_cid: op.base_cid,
                selected: true,
            },
            issue: None,
            status: OperationStatus::Pending,
        });
        self.by_path.insert(file_path, id);
        self.file_count += 1;
        self.selected_count += 1;
        self.insert_child_sorted(parent, id);
        Ok(())
    }

    fn new_dir(&mut self, path: PathBuf, name: String, parent: Option<NodeId>) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(ProposalNode {
            path: path.clone(),
            name,
            parent,
            children: Vec::new(),
            kind: NodeKind::Dir {
                state: SelectionState::All,
                expanded: true,
            },
            issue: None,
            status: OperationStatus::Pending,
        });
        self.by_path.insert(path, id);
        self.directory_count += 1;
        self.insert_child_sorted(parent, id);
        id
    }

    /// Insert `child` into its parent's (or the root) sibling list, keeping
    /// directories before files and names lexicographic within each group.
    fn insert_child_sorted(&mut self, parent: Option<NodeId>, child: NodeId) {
        let child_key = (self.nodes[child].is_file(), self.nodes[child].name.clone());
        let siblings = match parent {
            Some(p) => &self.nodes[p].children,
            None => &self.roots,
        };
        let pos = siblings
            .iter()
            .position(|&id| {
                let sibling = &self.nodes[id];
                (sibling.is_file(), sibling.name.as_str())
                    > (child_key.0, child_key.1.as_str())
            })
            .unwrap_or(siblings.len());

        match parent {
            Some(p) => self.nodes[p].children.insert(pos, child),
            None => self.roots.insert(pos, child),
        }
    }

    pub fn node(&self, id: NodeId) -> &ProposalNode {
        &self.nodes[id]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut ProposalNode {
        &mut self.nodes[id]
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn find(&self, path: &Path) -> Option<NodeId> {
        self.by_path.get(path).copied()
    }

    /// Incrementally maintained count of selected files.
    pub fn selected_count(&self) -> usize {
        self.selected_count
    }

    /// Full recount over all file nodes; must always agree with
    /// [`Proposal::selected_count`].
    pub fn recount_selected_files(&self) -> usize {
        self.nodes.iter().filter(|n| n.selected()).count()
    }

    /// Depth-first node order: each directory before its contents, siblings
    /// in display order. This is the order validation walks and apply
    /// executes in.
    pub fn document_order(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<NodeId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.nodes[id].children.iter().rev());
        }
        order
    }

    /// Selected file nodes in document order; the apply work list.
    pub fn selected_files(&self) -> Vec<NodeId> {
        self.document_order()
            .into_iter()
            .filter(|&id| self.nodes[id].selected())
            .collect()
    }

    pub fn set_expanded(&mut self, id: NodeId, value: bool) {
        if let NodeKind::Dir { expanded, .. } = &mut self.nodes[id].kind {
            *expanded = value;
        }
    }

    pub(crate) fn clear_issues(&mut self) {
        for node in &mut self.nodes {
            node.issue = None;
        }
    }
}

fn path_segments(path: &Path) -> Vec<String> {
    path.components()
        .filter(|c| !matches!(c, std::path::Component::CurDir))
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect()
}

/// Serialized proposal document, the on-disk/clipboard interchange format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalDoc {
    pub description: String,
    pub operations: Vec<OperationDoc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationDoc {
    pub path: PathBuf,
    pub op: FileOp,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_cid: Option<String>,
}

impl ProposalDoc {
    pub fn from_json(input: &str) -> Result<Self> {
        serde_json::from_str(input).context("parse proposal document")
    }

    pub fn into_operations(self) -> (String, Vec<ProposedOperation>) {
        let ops = self
            .operations
            .into_iter()
            .map(|o| ProposedOperation {
                path: o.path,
                op: o.op,
                content: o.content,
                base_cid: o.base_cid,
            })
            .collect();
        (self.description, ops)
    }
}

/// Read a proposal document from a file or, when requested, the clipboard.
pub fn load_doc(path: Option<&Path>, from_clipboard: bool) -> Result<ProposalDoc> {
    let input = if from_clipboard {
        let mut clipboard = arboard::Clipboard::new().context("clipboard init")?;
        clipboard.get_text().context("read clipboard")?
    } else {
        let path = path.ok_or_else(|| {
            anyhow::anyhow!("provide a proposal file or pass --from-clipboard")
        })?;
        std::fs::read_to_string(path)
            .with_context(|| format!("read proposal file: {}", path.display()))?
    };
    ProposalDoc::from_json(&input)
}

/// Shared normalizer for content-id comparisons: strips trailing whitespace
/// and carriage returns so formatting-only churn does not flag staleness.
pub fn normalize_for_cid(s: &str) -> String {
    s.lines()
        .map(|l| l.trim_end_matches(&[' ', '\t', '\r'][..]))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Deterministic content id: xxh64 over normalized content, fixed seed.
pub fn content_cid(content: &str) -> String {
    let normalized = normalize_for_cid(content);
    let h = xxhash_rust::xxh64::xxh64(normalized.as_bytes(), 0);
    format!("{h:016x}")
}
