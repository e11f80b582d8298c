//! The storage provider seam: a capability-based hierarchical store that only
//! offers create, read-all, write-all and (recursive) remove.

use std::fmt::Debug;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;

/// Kind of a storage entry or tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Folder,
}

/// A storage handle tagged with the capabilities of its entry.
///
/// The variant is resolved once, when the entry is listed or created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryHandle<F, D> {
    /// Supports `read_all` / `write_all`.
    File(F),
    /// Supports `list_entries` / `get_or_create_child` / `create_child` / `remove`.
    Folder(D),
}

impl<F, D> EntryHandle<F, D> {
    pub fn kind(&self) -> EntryKind {
        match self {
            EntryHandle::File(_) => EntryKind::File,
            EntryHandle::Folder(_) => EntryKind::Folder,
        }
    }

    pub fn as_folder(&self) -> Option<&D> {
        match self {
            EntryHandle::Folder(d) => Some(d),
            EntryHandle::File(_) => None,
        }
    }

    pub fn as_file(&self) -> Option<&F> {
        match self {
            EntryHandle::File(f) => Some(f),
            EntryHandle::Folder(_) => None,
        }
    }
}

/// Handle type produced by provider `P`.
pub type HandleOf<P> =
    EntryHandle<<P as StorageProvider>::File, <P as StorageProvider>::Folder>;

/// One listed child of a folder.
#[derive(Debug, Clone)]
pub struct Entry<F, D> {
    pub name: String,
    pub handle: EntryHandle<F, D>,
}

/// Listed entry type produced by provider `P`.
pub type EntryOf<P> = Entry<<P as StorageProvider>::File, <P as StorageProvider>::Folder>;

/// Outcome of a write permission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Granted,
    Denied,
}

/// Outcome of the interactive connect flow.
#[derive(Debug, Clone)]
pub enum Connect<D> {
    /// Access was granted to the root folder `root`, displayed as `name`.
    Connected { root: D, name: String },
    /// The user aborted the flow.
    Cancelled,
}

/// A hierarchical store reachable only through handles.
///
/// There is no rename or move primitive; callers synthesize them from the
/// operations below.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    type File: Clone + Debug + Send + Sync;
    type Folder: Clone + Debug + Send + Sync;

    /// Obtain a root folder with read/write capability.
    async fn connect(&self) -> Result<Connect<Self::Folder>>;

    /// Re-request write capability on `folder`.
    async fn request_write_permission(&self, folder: &Self::Folder) -> Result<Permission>;

    /// List the children of `folder` in a stable order.
    async fn list_entries(&self, folder: &Self::Folder) -> Result<Vec<EntryOf<Self>>>;

    /// Return the child `name` of `parent`, creating it as `kind` if missing.
    async fn get_or_create_child(
        &self,
        parent: &Self::Folder,
        name: &str,
        kind: EntryKind,
    ) -> Result<HandleOf<Self>>;

    /// Create a new child `name` of `parent` as `kind`. Fails with `Conflict`
    /// if the store already resolves `name` to an entry of any kind, which
    /// on case-insensitive stores includes names differing only in case.
    async fn create_child(
        &self,
        parent: &Self::Folder,
        name: &str,
        kind: EntryKind,
    ) -> Result<HandleOf<Self>>;

    async fn read_all(&self, file: &Self::File) -> Result<Vec<u8>>;

    async fn write_all(&self, file: &Self::File, bytes: &[u8]) -> Result<()>;

    /// Remove the child `name` of `parent`. Non-empty folders need `recursive`.
    async fn remove(&self, parent: &Self::Folder, name: &str, recursive: bool) -> Result<()>;

    /// Look up a single child by name, reporting its kind.
    async fn lookup(&self, parent: &Self::Folder, name: &str) -> Result<Option<EntryOf<Self>>> {
        Ok(self
            .list_entries(parent)
            .await?
            .into_iter()
            .find(|entry| entry.name == name))
    }
}
