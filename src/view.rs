//! Presentation-facing state: which folders are expanded, which node is in
//! rename mode, and the flattened rows a tree widget draws.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;

use crate::fs::storage::EntryKind;
use crate::fs::tree::{is_same_or_descendant, Forest, Node, SEPARATOR};

/// Expansion and rename-mode state, keyed by node id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewState {
    expanded: BTreeSet<String>,
    editing: Option<String>,
}

impl ViewState {
    pub fn is_expanded(&self, id: &str) -> bool {
        self.expanded.contains(id)
    }

    pub fn expand(&mut self, id: impl Into<String>) {
        self.expanded.insert(id.into());
    }

    /// Flip the expansion of `id`. Returns the new state.
    pub fn toggle(&mut self, id: &str) -> bool {
        if self.expanded.remove(id) {
            false
        } else {
            self.expanded.insert(id.to_string());
            true
        }
    }

    pub fn expanded(&self) -> impl Iterator<Item = &str> {
        self.expanded.iter().map(String::as_str)
    }

    /// The node currently in rename mode.
    pub fn editing(&self) -> Option<&str> {
        self.editing.as_deref()
    }

    pub fn set_editing(&mut self, id: Option<String>) {
        self.editing = id;
    }

    /// Forget ids for which `exists` is false.
    pub fn retain_existing(&mut self, exists: impl Fn(&str) -> bool) {
        self.expanded.retain(|id| exists(id));
        if self.editing.as_deref().is_some_and(|id| !exists(id)) {
            self.editing = None;
        }
    }

    /// Move every id at or under `old` to the same place under `new`.
    pub fn rekey(&mut self, old: &str, new: &str) {
        let moved: Vec<String> = self
            .expanded
            .iter()
            .filter(|id| is_same_or_descendant(id, old))
            .cloned()
            .collect();
        for id in moved {
            self.expanded.remove(&id);
            self.expanded.insert(format!("{}{}", new, &id[old.len()..]));
        }
        if let Some(editing) = &self.editing {
            if is_same_or_descendant(editing, old) {
                self.editing = Some(format!("{}{}", new, &editing[old.len()..]));
            }
        }
    }

    pub fn clear(&mut self) {
        self.expanded.clear();
        self.editing = None;
    }
}

/// Immutable view of the tree published after every change.
#[derive(Debug, Clone)]
pub struct TreeSnapshot {
    pub revision: u64,
    pub root_id: String,
    /// Display name of the connected root, `None` in virtual mode.
    pub connected: Option<String>,
    pub roots: Arc<Forest>,
    pub view: ViewState,
}

impl TreeSnapshot {
    pub fn empty(root_id: impl Into<String>) -> Self {
        Self {
            revision: 0,
            root_id: root_id.into(),
            connected: None,
            roots: Arc::new(Vec::new()),
            view: ViewState::default(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.is_some()
    }

    /// Rows for every visible node. With `expand_all`, collapsed folders are
    /// shown open.
    pub fn flatten(&self, expand_all: bool) -> Vec<FlatItem> {
        let mut items = Vec::new();
        flatten_nodes(&self.roots, 0, &self.view, expand_all, &mut items);
        items
    }
}

/// A flattened representation of a tree node for rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlatItem {
    pub id: String,
    pub name: String,
    pub kind: EntryKind,
    pub depth: usize,
    pub is_expanded: bool,
    pub is_last_sibling: bool,
    pub is_editing: bool,
}

impl FlatItem {
    /// Box-drawing prefix for text output, e.g. `│   └── `.
    pub fn prefix(&self, open_ancestors: &[bool]) -> String {
        let mut prefix = String::new();
        for &open in open_ancestors.iter().take(self.depth) {
            prefix.push_str(if open { "│   " } else { "    " });
        }
        prefix.push_str(if self.is_last_sibling { "└── " } else { "├── " });
        prefix
    }
}

fn flatten_nodes(
    nodes: &[Arc<Node>],
    depth: usize,
    view: &ViewState,
    expand_all: bool,
    items: &mut Vec<FlatItem>,
) {
    for (i, node) in nodes.iter().enumerate() {
        let is_expanded = node.is_folder() && (expand_all || view.is_expanded(&node.id));
        items.push(FlatItem {
            id: node.id.clone(),
            name: node.name.clone(),
            kind: node.kind(),
            depth,
            is_expanded,
            is_last_sibling: i + 1 == nodes.len(),
            is_editing: view.editing() == Some(node.id.as_str()),
        });
        if is_expanded {
            flatten_nodes(node.children(), depth + 1, view, expand_all, items);
        }
    }
}

/// Render rows as an indented tree, one line per row.
pub fn render_text(items: &[FlatItem]) -> String {
    let mut out = String::new();
    // open_ancestors[d] is true while the ancestor at depth d has siblings below it
    let mut open_ancestors: Vec<bool> = Vec::new();
    for item in items {
        open_ancestors.truncate(item.depth);
        out.push_str(&item.prefix(&open_ancestors));
        out.push_str(&item.name);
        if item.kind == EntryKind::Folder {
            out.push(SEPARATOR);
        }
        if item.is_editing {
            out.push_str("  (renaming)");
        }
        out.push('\n');
        open_ancestors.push(!item.is_last_sibling);
    }
    out
}
