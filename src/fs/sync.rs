//! Rebuild the in-memory forest and handle cache from external storage.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::error::Result;
use crate::fs::handles::HandleCache;
use crate::fs::storage::{EntryHandle, EntryKind, HandleOf, StorageProvider};
use crate::fs::tree::{child_id, Forest, Node};

/// Visible children of each listed folder, keyed by folder id.
type Listings = HashMap<String, Vec<(String, EntryKind)>>;

/// Walk the store below `root` and produce a fresh forest plus a handle for
/// every node (and for the root itself, under `root_name`).
///
/// Entries whose name starts with `hidden_prefix` are skipped along with
/// their subtrees. An empty prefix skips nothing.
#[instrument(skip(provider, root), fields(root = %root_name))]
pub async fn rebuild<P: StorageProvider>(
    provider: &P,
    root: &P::Folder,
    root_name: &str,
    hidden_prefix: &str,
) -> Result<(Forest, HandleCache<HandleOf<P>>)> {
    let mut handles = HandleCache::new();
    handles.insert(root_name, EntryHandle::Folder(root.clone()));

    let mut listings = Listings::new();
    let mut pending = vec![(root_name.to_string(), root.clone())];
    while let Some((folder_id, folder)) = pending.pop() {
        let entries = provider.list_entries(&folder).await?;
        debug!(folder = %folder_id, entries = entries.len(), "listed folder");

        let mut visible = Vec::with_capacity(entries.len());
        for entry in entries {
            if is_hidden(&entry.name, hidden_prefix) {
                continue;
            }
            let id = child_id(&folder_id, &entry.name);
            if let EntryHandle::Folder(child) = &entry.handle {
                pending.push((id.clone(), child.clone()));
            }
            visible.push((entry.name, entry.handle.kind()));
            handles.insert(id, entry.handle);
        }
        listings.insert(folder_id, visible);
    }

    let forest = assemble(&listings, root_name);
    info!(nodes = handles.len() - 1, "rebuilt tree from storage");
    Ok((forest, handles))
}

/// Whether `name` is skipped by [`rebuild`]. An empty prefix hides nothing.
pub fn is_hidden(name: &str, hidden_prefix: &str) -> bool {
    !hidden_prefix.is_empty() && name.starts_with(hidden_prefix)
}

/// Build the children of `folder_id` in listing order.
fn assemble(listings: &Listings, folder_id: &str) -> Forest {
    let Some(entries) = listings.get(folder_id) else {
        return Vec::new();
    };
    entries
        .iter()
        .map(|(name, kind)| {
            let node = match kind {
                EntryKind::File => Node::file(folder_id, name),
                EntryKind::Folder => {
                    let id = child_id(folder_id, name);
                    Node::folder(folder_id, name, assemble(listings, &id))
                }
            };
            Arc::new(node)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::memory::{MemFolder, MemoryStorage};
    use crate::fs::storage::Connect;
    use proptest::prelude::*;

    async fn root_of(store: &MemoryStorage) -> (MemFolder, String) {
        match store.connect().await.unwrap() {
            Connect::Connected { root, name } => (root, name),
            Connect::Cancelled => panic!("unexpected cancel"),
        }
    }

    fn sample() -> MemoryStorage {
        let store = MemoryStorage::new("project");
        store.add_folder("chapters/intro");
        store.add_file("chapters/one.tex", "one");
        store.add_file("main.tex", "main");
        store.add_folder(".git/objects");
        store.add_file("chapters/.draft.tex", "draft");
        store
    }

    fn shape(nodes: &[Arc<Node>]) -> Vec<(String, String, EntryKind, Vec<String>)> {
        let mut out = Vec::new();
        for node in nodes {
            out.push((
                node.id.clone(),
                node.name.clone(),
                node.kind(),
                node.children().iter().map(|c| c.id.clone()).collect(),
            ));
            out.extend(shape(node.children()));
        }
        out
    }

    fn assert_ids_derived(nodes: &[Arc<Node>], parent_id: &str) {
        for node in nodes {
            assert_eq!(node.id, child_id(parent_id, &node.name));
            assert_ids_derived(node.children(), &node.id);
        }
    }

    #[tokio::test]
    async fn builds_ids_from_root_name() {
        let store = sample();
        let (root, name) = root_of(&store).await;
        let (forest, _) = rebuild(&store, &root, &name, ".").await.unwrap();

        let names: Vec<&str> = forest.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["chapters", "main.tex"]);
        assert_eq!(forest[0].id, "project/chapters");
        assert_ids_derived(&forest, "project");
    }

    #[tokio::test]
    async fn hidden_entries_are_skipped() {
        let store = sample();
        let (root, name) = root_of(&store).await;
        let (forest, handles) = rebuild(&store, &root, &name, ".").await.unwrap();

        assert!(!handles.contains("project/.git"));
        assert!(!handles.contains("project/.git/objects"));
        assert!(!handles.contains("project/chapters/.draft.tex"));
        let chapter_names: Vec<&str> = forest[0]
            .children()
            .iter()
            .map(|n| n.name.as_str())
            .collect();
        assert_eq!(chapter_names, vec!["intro", "one.tex"]);
    }

    #[tokio::test]
    async fn empty_prefix_shows_everything() {
        let store = sample();
        let (root, name) = root_of(&store).await;
        let (_, handles) = rebuild(&store, &root, &name, "").await.unwrap();
        assert!(handles.contains("project/.git/objects"));
    }

    #[tokio::test]
    async fn every_node_has_a_handle_of_its_kind() {
        let store = sample();
        let (root, name) = root_of(&store).await;
        let (forest, handles) = rebuild(&store, &root, &name, ".").await.unwrap();

        assert!(handles.get("project").unwrap().as_folder().is_some());
        let mut stack: Vec<&Arc<Node>> = forest.iter().collect();
        while let Some(node) = stack.pop() {
            let handle = handles.get(&node.id).unwrap();
            assert_eq!(handle.kind(), node.kind());
            stack.extend(node.children());
        }
    }

    #[tokio::test]
    async fn empty_store_is_empty_forest() {
        let store = MemoryStorage::new("empty");
        let (root, name) = root_of(&store).await;
        let (forest, handles) = rebuild(&store, &root, &name, ".").await.unwrap();
        assert!(forest.is_empty());
        assert_eq!(handles.ids(), vec!["empty"]);
    }

    #[tokio::test]
    async fn rebuild_is_idempotent() {
        let store = sample();
        let (root, name) = root_of(&store).await;
        let (first, _) = rebuild(&store, &root, &name, ".").await.unwrap();
        let (second, _) = rebuild(&store, &root, &name, ".").await.unwrap();
        assert_eq!(shape(&first), shape(&second));
    }

    proptest! {
        #[test]
        fn rebuild_idempotent_for_any_store(
            paths in proptest::collection::vec(
                proptest::collection::vec("[a-c]{1,2}", 1..4),
                0..12,
            )
        ) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .build()
                .unwrap();
            let store = MemoryStorage::new("r");
            for (i, parts) in paths.iter().enumerate() {
                let path = parts.join("/");
                if i % 2 == 0 {
                    store.add_folder(&path);
                } else {
                    store.add_file(&path, "x");
                }
            }
            let (first, second) = rt.block_on(async {
                let (root, name) = root_of(&store).await;
                let first = rebuild(&store, &root, &name, ".").await.unwrap().0;
                let second = rebuild(&store, &root, &name, ".").await.unwrap().0;
                (first, second)
            });
            prop_assert_eq!(shape(&first), shape(&second));
            assert_ids_derived(&first, "r");
        }
    }
}
