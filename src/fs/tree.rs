use std::sync::Arc;

use serde::Serialize;

use crate::error::{Result, TreeError};
use crate::fs::storage::EntryKind;

/// Separator between the names that make up a node id.
pub const SEPARATOR: char = '/';

/// Id of the child `name` under `parent_id`.
pub fn child_id(parent_id: &str, name: &str) -> String {
    format!("{}{}{}", parent_id, SEPARATOR, name)
}

/// Split an id into its parent id and leaf name.
pub fn split_id(id: &str) -> Option<(&str, &str)> {
    id.rsplit_once(SEPARATOR)
}

/// Whether `id` equals `ancestor` or lies anywhere beneath it.
pub fn is_same_or_descendant(id: &str, ancestor: &str) -> bool {
    match id.strip_prefix(ancestor) {
        Some("") => true,
        Some(rest) => rest.starts_with(SEPARATOR),
        None => false,
    }
}

/// A file or folder in the tree. Folders carry `children`, files never do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Node {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<Arc<Node>>>,
}

/// An ordered list of sibling nodes. Unmodified subtrees are shared between
/// revisions.
pub type Forest = Vec<Arc<Node>>;

impl Node {
    pub fn file(parent_id: &str, name: &str) -> Self {
        Self {
            id: child_id(parent_id, name),
            name: name.to_string(),
            children: None,
        }
    }

    pub fn folder(parent_id: &str, name: &str, children: Forest) -> Self {
        Self {
            id: child_id(parent_id, name),
            name: name.to_string(),
            children: Some(children),
        }
    }

    pub fn kind(&self) -> EntryKind {
        if self.children.is_some() {
            EntryKind::Folder
        } else {
            EntryKind::File
        }
    }

    pub fn is_folder(&self) -> bool {
        self.children.is_some()
    }

    /// Children of a folder; empty for files.
    pub fn children(&self) -> &[Arc<Node>] {
        self.children.as_deref().unwrap_or(&[])
    }

    /// Copy of this subtree placed under `parent_id` as `name`, with every id
    /// recomputed.
    fn reparented(&self, parent_id: &str, name: &str) -> Node {
        let id = child_id(parent_id, name);
        let children = self.children.as_ref().map(|children| {
            children
                .iter()
                .map(|child| Arc::new(child.reparented(&id, &child.name)))
                .collect()
        });
        Node {
            id,
            name: name.to_string(),
            children,
        }
    }
}

/// In-memory forest of nodes below a root id.
///
/// The root folder itself is not part of the forest; its children are.
/// Every mutation produces a new forest and bumps the revision.
#[derive(Debug, Clone)]
pub struct TreeModel {
    root_id: String,
    roots: Arc<Forest>,
    revision: u64,
}

impl TreeModel {
    /// Create an empty model whose top-level nodes live under `root_id`.
    pub fn new(root_id: impl Into<String>) -> Self {
        Self {
            root_id: root_id.into(),
            roots: Arc::new(Vec::new()),
            revision: 0,
        }
    }

    pub fn root_id(&self) -> &str {
        &self.root_id
    }

    pub fn roots(&self) -> &Arc<Forest> {
        &self.roots
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Replace the whole forest, e.g. after a rebuild.
    pub fn replace_all(&mut self, forest: Forest) {
        self.roots = Arc::new(forest);
        self.revision += 1;
    }

    /// Drop every node and move the model under a new root id.
    pub fn reset(&mut self, root_id: impl Into<String>) {
        self.root_id = root_id.into();
        self.replace_all(Vec::new());
    }

    /// Find a node by id.
    pub fn find(&self, id: &str) -> Option<&Arc<Node>> {
        Self::find_in(&self.roots, id)
    }

    fn find_in<'a>(nodes: &'a [Arc<Node>], id: &str) -> Option<&'a Arc<Node>> {
        let node = nodes.iter().find(|n| is_same_or_descendant(id, &n.id))?;
        if node.id == id {
            Some(node)
        } else {
            Self::find_in(node.children(), id)
        }
    }

    /// Children of the folder `parent_id`, or the top level for the root id.
    pub fn children_of(&self, parent_id: &str) -> Option<&[Arc<Node>]> {
        if parent_id == self.root_id {
            return Some(self.roots.as_slice());
        }
        self.find(parent_id)
            .and_then(|node| node.children.as_deref())
    }

    /// Names of the children of `parent_id`.
    pub fn child_names(&self, parent_id: &str) -> Option<Vec<String>> {
        self.children_of(parent_id)
            .map(|children| children.iter().map(|c| c.name.clone()).collect())
    }

    /// Append `node` to the children of `parent_id`.
    pub fn insert_child(&mut self, parent_id: &str, node: Node) -> Result<()> {
        let node = Arc::new(node);
        self.edit_children(parent_id, move |children| {
            children.push(node);
            Some(())
        })
        .ok_or_else(|| TreeError::NotFound(format!("Parent folder not found: {}", parent_id)))
    }

    /// Remove the node `id` together with its subtree.
    pub fn remove_by_id(&mut self, id: &str) -> Option<Arc<Node>> {
        let (parent_id, _) = split_id(id)?;
        self.edit_children(parent_id, |children| {
            let idx = children.iter().position(|c| c.id == id)?;
            Some(children.remove(idx))
        })
    }

    /// Rename the node `id`, recomputing its id and every descendant id.
    /// Returns the new id.
    pub fn rename_by_id(&mut self, id: &str, new_name: &str) -> Option<String> {
        let (parent_id, _) = split_id(id)?;
        let parent_id = parent_id.to_string();
        self.edit_children(&parent_id, |children| {
            let idx = children.iter().position(|c| c.id == id)?;
            let renamed = children[idx].reparented(&parent_id, new_name);
            let new_id = renamed.id.clone();
            children[idx] = Arc::new(renamed);
            Some(new_id)
        })
    }

    /// Every id in the forest, parents before children.
    pub fn ids(&self) -> Vec<String> {
        let mut ids = Vec::new();
        let mut stack: Vec<&Arc<Node>> = self.roots.iter().rev().collect();
        while let Some(node) = stack.pop() {
            ids.push(node.id.clone());
            stack.extend(node.children().iter().rev());
        }
        ids
    }

    /// Apply `edit` to a copy of the children of `parent_id` and swap the
    /// copy in, cloning only the nodes on the path from the top level.
    fn edit_children<R>(
        &mut self,
        parent_id: &str,
        edit: impl FnOnce(&mut Forest) -> Option<R>,
    ) -> Option<R> {
        let (forest, result) = if parent_id == self.root_id {
            let mut roots = self.roots.as_ref().clone();
            let result = edit(&mut roots)?;
            (roots, result)
        } else {
            Self::edit_below(&self.roots, parent_id, edit)?
        };
        self.replace_all(forest);
        Some(result)
    }

    fn edit_below<R>(
        nodes: &[Arc<Node>],
        parent_id: &str,
        edit: impl FnOnce(&mut Forest) -> Option<R>,
    ) -> Option<(Forest, R)> {
        let idx = nodes
            .iter()
            .position(|n| is_same_or_descendant(parent_id, &n.id))?;
        let node = &nodes[idx];
        let children = node.children.as_ref()?;

        let (children, result) = if node.id == parent_id {
            let mut children = children.clone();
            let result = edit(&mut children)?;
            (children, result)
        } else {
            Self::edit_below(children, parent_id, edit)?
        };

        let mut updated = nodes.to_vec();
        updated[idx] = Arc::new(Node {
            id: node.id.clone(),
            name: node.name.clone(),
            children: Some(children),
        });
        Some((updated, result))
    }
}
