//! Selection mutation for proposal trees.
//!
//! All selection state changes flow through here: direct file toggles,
//! directory-level writes that fan out to every file descendant, and the
//! bottom-up tri-state recomputation that keeps directory states honest.
//!
//! The tri-state rule: a directory is `All` iff every file descendant is
//! selected, `None` iff none are, `Some` otherwise. Recomputation reads only
//! file-level booleans, never a directory's previous cached state, so
//! repeated recomputation cannot drift.

use crate::core::proposal::{NodeId, NodeKind, Proposal, SelectionState};

impl Proposal {
    /// Set a node's selection. A file write flips its boolean; a directory
    /// write propagates the value to every file descendant. Ancestor
    /// directory states are recomputed either way.
    pub fn set_selected(&mut self, id: NodeId, value: bool) {
        if self.nodes[id].is_file() {
            self.set_file_selected(id, value);
        } else {
            self.propagate_down(id, value);
        }
        self.recompute_ancestors(id);
    }

    /// Toggle a node. A fully selected directory deselects; a partially or
    /// unselected one selects.
    pub fn toggle(&mut self, id: NodeId) {
        let value = match &self.nodes[id].kind {
            NodeKind::File { selected, .. } => !*selected,
            NodeKind::Dir { state, .. } => *state != SelectionState::All,
        };
        self.set_selected(id, value);
    }

    pub fn select_all(&mut self) {
        for root in self.roots.clone() {
            self.set_selected(root, true);
        }
    }

    pub fn deselect_all(&mut self) {
        for root in self.roots.clone() {
            self.set_selected(root, false);
        }
    }

    /// Effective selection of any node: directories report their cached
    /// tri-state, files map their boolean onto All/None.
    pub fn selection_state(&self, id: NodeId) -> SelectionState {
        match &self.nodes[id].kind {
            NodeKind::Dir { state, .. } => *state,
            NodeKind::File { selected: true, .. } => SelectionState::All,
            NodeKind::File { selected: false, .. } => SelectionState::None,
        }
    }

    fn set_file_selected(&mut self, id: NodeId, value: bool) {
        if let NodeKind::File { selected, .. } = &mut self.nodes[id].kind
            && *selected != value
        {
            *selected = value;
            if value {
                self.selected_count += 1;
            } else {
                self.selected_count -= 1;
            }
        }
    }

    /// Write `value` to every file in the subtree. Directory states in the
    /// subtree become uniform, so they are set directly.
    fn propagate_down(&mut self, id: NodeId, value: bool) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if self.nodes[current].is_file() {
                self.set_file_selected(current, value);
                continue;
            }
            if let NodeKind::Dir { state, .. } = &mut self.nodes[current].kind {
                *state = if value {
                    SelectionState::All
                } else {
                    SelectionState::None
                };
            }
            stack.extend(self.nodes[current].children.iter().copied());
        }
    }

    /// Walk the parent chain and recompute each directory's tri-state from
    /// its file descendants. Idempotent.
    pub fn recompute_ancestors(&mut self, id: NodeId) {
        let mut current = self.nodes[id].parent;
        while let Some(dir) = current {
            let state = self.state_from_files(dir);
            if let NodeKind::Dir { state: cached, .. } = &mut self.nodes[dir].kind {
                *cached = state;
            }
            current = self.nodes[dir].parent;
        }
    }

    /// Derive a directory's tri-state from file booleans alone.
    pub fn state_from_files(&self, id: NodeId) -> SelectionState {
        let mut any_selected = false;
        let mut any_unselected = false;

        let mut stack: Vec<NodeId> = self.nodes[id].children.clone();
        while let Some(current) = stack.pop() {
            match &self.nodes[current].kind {
                NodeKind::File { selected, .. } => {
                    if *selected {
                        any_selected = true;
                    } else {
                        any_unselected = true;
                    }
                    if any_selected && any_unselected {
                        return SelectionState::Some;
                    }
                }
                NodeKind::Dir { .. } => {
                    stack.extend(self.nodes[current].children.iter().copied());
                }
            }
        }

        if any_selected {
            SelectionState::All
        } else {
            SelectionState::None
        }
    }
}
