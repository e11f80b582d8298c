//! Structural operations synthesized from the storage primitives.
//!
//! The provider has no rename or move. A file rename is read, create, write,
//! remove; a folder rename is create, copy every descendant, remove. Every
//! target is created fresh, never reused, and the source is only removed
//! once the target is complete.

use tracing::{debug, warn};

use crate::error::{Result, TreeError};
use crate::fs::storage::{EntryHandle, EntryKind, HandleOf, StorageProvider};

/// Names of every child of `parent`, in listing order.
pub async fn sibling_names<P: StorageProvider>(
    provider: &P,
    parent: &P::Folder,
) -> Result<Vec<String>> {
    Ok(provider
        .list_entries(parent)
        .await?
        .into_iter()
        .map(|entry| entry.name)
        .collect())
}

/// Create `name` under `parent`, failing with `Conflict` if the store already
/// has an entry by that name. Files are filled with `payload` when given; if
/// that write fails the empty file is removed again.
pub async fn create_entry<P: StorageProvider>(
    provider: &P,
    parent: &P::Folder,
    name: &str,
    kind: EntryKind,
    payload: Option<&[u8]>,
) -> Result<HandleOf<P>> {
    let handle = provider.create_child(parent, name, kind).await?;
    if let (EntryHandle::File(file), Some(bytes)) = (&handle, payload) {
        if let Err(e) = provider.write_all(file, bytes).await {
            discard_partial(provider, parent, name).await;
            return Err(e);
        }
    }
    Ok(handle)
}

/// Rename the child `old_name` of `parent` to `new_name`.
///
/// Fails with `Conflict` if `new_name` is already taken. The caller passes
/// the handle it resolved for the source entry.
pub async fn rename_entry<P: StorageProvider>(
    provider: &P,
    parent: &P::Folder,
    old_name: &str,
    source: &HandleOf<P>,
    new_name: &str,
) -> Result<()> {
    let siblings = sibling_names(provider, parent).await?;
    if siblings.iter().any(|name| name == new_name) {
        return Err(TreeError::Conflict(new_name.to_string()));
    }
    match source {
        EntryHandle::File(file) => rename_file(provider, parent, old_name, file, new_name).await,
        EntryHandle::Folder(folder) => {
            rename_folder(provider, parent, old_name, folder, new_name).await
        }
    }
}

/// Copy the content of `file` into a new sibling `new_name`, then remove the
/// original.
pub async fn rename_file<P: StorageProvider>(
    provider: &P,
    parent: &P::Folder,
    old_name: &str,
    file: &P::File,
    new_name: &str,
) -> Result<()> {
    let bytes = provider.read_all(file).await?;
    debug!(from = old_name, to = new_name, bytes = bytes.len(), "copying file");
    create_entry(provider, parent, new_name, EntryKind::File, Some(bytes.as_slice())).await?;
    provider.remove(parent, old_name, false).await
}

/// Recreate `folder` as the sibling `new_name` with a full copy of its
/// contents, then remove the original recursively.
pub async fn rename_folder<P: StorageProvider>(
    provider: &P,
    parent: &P::Folder,
    old_name: &str,
    folder: &P::Folder,
    new_name: &str,
) -> Result<()> {
    let target = provider
        .create_child(parent, new_name, EntryKind::Folder)
        .await?;
    let Some(target) = target.as_folder() else {
        return Err(TreeError::Conflict(new_name.to_string()));
    };
    if let Err(e) = copy_folder_contents(provider, folder, target).await {
        discard_partial(provider, parent, new_name).await;
        return Err(e);
    }
    debug!(from = old_name, to = new_name, "copied folder");
    provider.remove(parent, old_name, true).await
}

/// Copy every descendant of `src` into `dest`. Returns the number of entries
/// copied.
pub async fn copy_folder_contents<P: StorageProvider>(
    provider: &P,
    src: &P::Folder,
    dest: &P::Folder,
) -> Result<usize> {
    let mut copied = 0;
    let mut stack = vec![(src.clone(), dest.clone())];
    while let Some((from, to)) = stack.pop() {
        for entry in provider.list_entries(&from).await? {
            match entry.handle {
                EntryHandle::File(file) => {
                    let bytes = provider.read_all(&file).await?;
                    let created = provider
                        .create_child(&to, &entry.name, EntryKind::File)
                        .await?;
                    let Some(created) = created.as_file() else {
                        return Err(TreeError::Conflict(entry.name));
                    };
                    provider.write_all(created, &bytes).await?;
                }
                EntryHandle::Folder(folder) => {
                    let created = provider
                        .create_child(&to, &entry.name, EntryKind::Folder)
                        .await?;
                    let Some(created) = created.as_folder() else {
                        return Err(TreeError::Conflict(entry.name));
                    };
                    stack.push((folder, created.clone()));
                }
            }
            copied += 1;
        }
    }
    Ok(copied)
}

async fn discard_partial<P: StorageProvider>(provider: &P, parent: &P::Folder, name: &str) {
    if let Err(e) = provider.remove(parent, name, true).await {
        warn!(name, error = %e, "could not remove partial entry");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::memory::{MemFolder, MemoryStorage};
    use crate::fs::storage::Connect;

    async fn root(store: &MemoryStorage) -> MemFolder {
        match store.connect().await.unwrap() {
            Connect::Connected { root, .. } => root,
            Connect::Cancelled => panic!("unexpected cancel"),
        }
    }

    async fn handle(store: &MemoryStorage, parent: &MemFolder, name: &str) -> HandleOf<MemoryStorage> {
        store.lookup(parent, name).await.unwrap().unwrap().handle
    }

    #[tokio::test]
    async fn test_sibling_names() {
        let store = MemoryStorage::new("p");
        store.add_file("a.tex", "");
        store.add_folder("b");
        let root = root(&store).await;
        assert_eq!(sibling_names(&store, &root).await.unwrap(), vec!["a.tex", "b"]);
    }

    #[tokio::test]
    async fn test_create_file_with_payload() {
        let store = MemoryStorage::new("p");
        let root = root(&store).await;
        create_entry(&store, &root, "x.tex", EntryKind::File, Some(b"hello".as_slice()))
            .await
            .unwrap();
        assert_eq!(store.read("x.tex").unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_create_file_failed_write_leaves_nothing() {
        let store = MemoryStorage::new("p");
        store.fail_writes_to("x.tex");
        let root = root(&store).await;
        let result = create_entry(&store, &root, "x.tex", EntryKind::File, Some(b"hello".as_slice())).await;
        assert!(result.is_err());
        assert!(!store.exists("x.tex"));
    }

    #[tokio::test]
    async fn test_rename_file_moves_content() {
        let store = MemoryStorage::new("p");
        store.add_file("old.tex", "body");
        let root = root(&store).await;
        let source = handle(&store, &root, "old.tex").await;
        rename_entry(&store, &root, "old.tex", &source, "new.tex")
            .await
            .unwrap();
        assert!(!store.exists("old.tex"));
        assert_eq!(store.read("new.tex").unwrap(), b"body");
    }

    #[tokio::test]
    async fn test_rename_file_failed_write_keeps_source() {
        let store = MemoryStorage::new("p");
        store.add_file("old.tex", "body");
        store.fail_writes_to("new.tex");
        let root = root(&store).await;
        let source = handle(&store, &root, "old.tex").await;
        let result = rename_entry(&store, &root, "old.tex", &source, "new.tex").await;
        assert!(result.is_err());
        assert_eq!(store.read("old.tex").unwrap(), b"body");
        assert!(!store.exists("new.tex"));
    }

    #[tokio::test]
    async fn test_rename_folder_copies_descendants() {
        let store = MemoryStorage::new("p");
        store.add_file("A/f.txt", "content");
        store.add_file("A/sub/deep.txt", "deep");
        store.add_folder("A/empty");
        let root = root(&store).await;
        let source = handle(&store, &root, "A").await;
        rename_entry(&store, &root, "A", &source, "B").await.unwrap();

        assert!(!store.exists("A"));
        assert_eq!(store.read("B/f.txt").unwrap(), b"content");
        assert_eq!(store.read("B/sub/deep.txt").unwrap(), b"deep");
        assert_eq!(store.kind_at("B/empty"), Some(EntryKind::Folder));
    }

    #[tokio::test]
    async fn test_rename_folder_failure_keeps_source() {
        let store = MemoryStorage::new("p");
        store.add_file("A/f.txt", "content");
        store.fail_writes_to("f.txt");
        let root = root(&store).await;
        let source = handle(&store, &root, "A").await;
        let result = rename_entry(&store, &root, "A", &source, "B").await;

        assert!(result.is_err());
        assert_eq!(store.read("A/f.txt").unwrap(), b"content");
        assert!(!store.exists("B"));
    }

    #[tokio::test]
    async fn test_rename_collision_is_conflict() {
        let store = MemoryStorage::new("p");
        store.add_file("a.tex", "a");
        store.add_file("b.tex", "b");
        let root = root(&store).await;
        let source = handle(&store, &root, "a.tex").await;
        let err = rename_entry(&store, &root, "a.tex", &source, "b.tex")
            .await
            .unwrap_err();
        assert!(matches!(err, TreeError::Conflict(_)));
        assert_eq!(store.read("a.tex").unwrap(), b"a");
        assert_eq!(store.read("b.tex").unwrap(), b"b");
    }

    #[tokio::test]
    async fn test_collision_check_is_case_sensitive() {
        let store = MemoryStorage::new("p");
        store.add_file("a.tex", "a");
        store.add_file("B.tex", "b");
        let root = root(&store).await;
        let source = handle(&store, &root, "a.tex").await;
        rename_entry(&store, &root, "a.tex", &source, "b.tex")
            .await
            .unwrap();
        assert_eq!(store.names(""), vec!["B.tex", "b.tex"]);
    }

    #[tokio::test]
    async fn test_case_only_folder_rename_on_folding_store_keeps_source() {
        let store = MemoryStorage::new("p");
        store.add_file("chapters/one.tex", "1");
        store.fold_case(true);
        let root = root(&store).await;
        let source = handle(&store, &root, "chapters").await;
        let err = rename_entry(&store, &root, "chapters", &source, "Chapters")
            .await
            .unwrap_err();

        assert!(matches!(err, TreeError::Conflict(_)));
        assert_eq!(store.names(""), vec!["chapters"]);
        assert_eq!(store.read("chapters/one.tex").unwrap(), b"1");
    }

    #[tokio::test]
    async fn test_case_only_file_rename_on_folding_store_keeps_source() {
        let store = MemoryStorage::new("p");
        store.add_file("main.tex", "body");
        store.fold_case(true);
        let root = root(&store).await;
        let source = handle(&store, &root, "main.tex").await;
        let err = rename_entry(&store, &root, "main.tex", &source, "Main.tex")
            .await
            .unwrap_err();

        assert!(matches!(err, TreeError::Conflict(_)));
        assert_eq!(store.names(""), vec!["main.tex"]);
        assert_eq!(store.read("main.tex").unwrap(), b"body");
    }

    #[tokio::test]
    async fn test_create_entry_refuses_existing_name() {
        let store = MemoryStorage::new("p");
        store.add_file("x.tex", "keep");
        let root = root(&store).await;
        let err = create_entry(&store, &root, "x.tex", EntryKind::File, Some(b"new".as_slice()))
            .await
            .unwrap_err();
        assert!(matches!(err, TreeError::Conflict(_)));
        assert_eq!(store.read("x.tex").unwrap(), b"keep");
    }

    #[tokio::test]
    async fn test_copy_folder_contents_counts_entries() {
        let store = MemoryStorage::new("p");
        store.add_file("src/a", "1");
        store.add_file("src/d/b", "2");
        store.add_folder("dst");
        let root = root(&store).await;
        let src = handle(&store, &root, "src").await;
        let dst = handle(&store, &root, "dst").await;
        let copied = copy_folder_contents(
            &store,
            src.as_folder().unwrap(),
            dst.as_folder().unwrap(),
        )
        .await
        .unwrap();
        assert_eq!(copied, 3);
        assert_eq!(store.read("dst/d/b").unwrap(), b"2");
        assert_eq!(store.read("src/d/b").unwrap(), b"2");
    }
}
