//! Storage provider backed by a directory on the local filesystem.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs;

use crate::error::{Result, TreeError};
use crate::fs::storage::{
    Connect, Entry, EntryHandle, EntryKind, EntryOf, HandleOf, Permission, StorageProvider,
};

/// Handle to a file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile(pub PathBuf);

/// Handle to a directory on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFolder(pub PathBuf);

/// Asks the user whether the given root may be opened read/write.
pub type ConsentFn = Arc<dyn Fn(&Path) -> bool + Send + Sync>;

/// A directory exposed through the handle-based storage API.
#[derive(Clone)]
pub struct LocalStorage {
    root: PathBuf,
    consent: Option<ConsentFn>,
}

impl std::fmt::Debug for LocalStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStorage")
            .field("root", &self.root)
            .field("consent", &self.consent.is_some())
            .finish()
    }
}

impl LocalStorage {
    /// Expose `root`. Connecting never prompts.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            consent: None,
        }
    }

    /// Ask `consent` before every connect; a refusal cancels the connect.
    pub fn with_consent(mut self, consent: ConsentFn) -> Self {
        self.consent = Some(consent);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Translate an I/O failure on `path` into the engine's error taxonomy.
fn io_error(err: std::io::Error, path: &Path) -> TreeError {
    match err.kind() {
        ErrorKind::NotFound => TreeError::NotFound(path.display().to_string()),
        ErrorKind::PermissionDenied => TreeError::Permission(path.display().to_string()),
        ErrorKind::AlreadyExists => TreeError::Conflict(path.display().to_string()),
        _ => TreeError::Io(err),
    }
}

/// Kind of the entry at `path`. Symlinks are not followed and, like other
/// special files, are `None`.
async fn kind_of(path: &Path) -> Result<Option<EntryKind>> {
    match fs::symlink_metadata(path).await {
        Ok(meta) if meta.is_dir() => Ok(Some(EntryKind::Folder)),
        Ok(meta) if meta.is_file() => Ok(Some(EntryKind::File)),
        Ok(_) => Ok(None),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(io_error(e, path)),
    }
}

fn handle_for(path: PathBuf, kind: EntryKind) -> HandleOf<LocalStorage> {
    match kind {
        EntryKind::File => EntryHandle::File(LocalFile(path)),
        EntryKind::Folder => EntryHandle::Folder(LocalFolder(path)),
    }
}

#[async_trait]
impl StorageProvider for LocalStorage {
    type File = LocalFile;
    type Folder = LocalFolder;

    async fn connect(&self) -> Result<Connect<LocalFolder>> {
        // The root itself may be reached through a link.
        let is_dir = match fs::metadata(&self.root).await {
            Ok(meta) => meta.is_dir(),
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => return Err(io_error(e, &self.root)),
        };
        let root = match is_dir {
            true => self.root.canonicalize().map_err(|e| io_error(e, &self.root))?,
            false => {
                return Err(TreeError::NotFound(format!(
                    "{} is not a directory",
                    self.root.display()
                )))
            }
        };

        if let Some(consent) = &self.consent {
            if !consent(&root) {
                return Ok(Connect::Cancelled);
            }
        }

        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| root.to_string_lossy().to_string());
        Ok(Connect::Connected {
            root: LocalFolder(root),
            name,
        })
    }

    async fn request_write_permission(&self, folder: &LocalFolder) -> Result<Permission> {
        let meta = fs::metadata(&folder.0)
            .await
            .map_err(|e| io_error(e, &folder.0))?;
        Ok(if meta.permissions().readonly() {
            Permission::Denied
        } else {
            Permission::Granted
        })
    }

    async fn list_entries(&self, folder: &LocalFolder) -> Result<Vec<EntryOf<Self>>> {
        let mut dir = fs::read_dir(&folder.0)
            .await
            .map_err(|e| io_error(e, &folder.0))?;
        let mut entries = Vec::new();
        while let Some(entry) = dir.next_entry().await.map_err(|e| io_error(e, &folder.0))? {
            let path = entry.path();
            // Symlinks, sockets and devices are not tree entries.
            let Some(kind) = kind_of(&path).await? else {
                continue;
            };
            entries.push(Entry {
                name: entry.file_name().to_string_lossy().to_string(),
                handle: handle_for(path, kind),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn get_or_create_child(
        &self,
        parent: &LocalFolder,
        name: &str,
        kind: EntryKind,
    ) -> Result<HandleOf<Self>> {
        let path = parent.0.join(name);
        match kind_of(&path).await? {
            Some(existing) if existing == kind => return Ok(handle_for(path, kind)),
            Some(_) => return Err(TreeError::Conflict(name.to_string())),
            None => {}
        }
        match kind {
            EntryKind::Folder => fs::create_dir(&path).await,
            EntryKind::File => fs::OpenOptions::new()
                .write(true)
                .create(true)
                .open(&path)
                .await
                .map(|_| ()),
        }
        .map_err(|e| io_error(e, &path))?;
        Ok(handle_for(path, kind))
    }

    async fn create_child(
        &self,
        parent: &LocalFolder,
        name: &str,
        kind: EntryKind,
    ) -> Result<HandleOf<Self>> {
        let path = parent.0.join(name);
        match kind {
            EntryKind::Folder => fs::create_dir(&path).await,
            EntryKind::File => fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
                .map(|_| ()),
        }
        .map_err(|e| io_error(e, &path))?;
        Ok(handle_for(path, kind))
    }

    async fn read_all(&self, file: &LocalFile) -> Result<Vec<u8>> {
        fs::read(&file.0).await.map_err(|e| io_error(e, &file.0))
    }

    async fn write_all(&self, file: &LocalFile, bytes: &[u8]) -> Result<()> {
        fs::write(&file.0, bytes)
            .await
            .map_err(|e| io_error(e, &file.0))
    }

    async fn remove(&self, parent: &LocalFolder, name: &str, recursive: bool) -> Result<()> {
        let path = parent.0.join(name);
        let meta = fs::symlink_metadata(&path)
            .await
            .map_err(|e| io_error(e, &path))?;
        let result = if meta.is_dir() {
            if recursive {
                fs::remove_dir_all(&path).await
            } else {
                fs::remove_dir(&path).await
            }
        } else {
            fs::remove_file(&path).await
        };
        result.map_err(|e| io_error(e, &path))
    }

    async fn lookup(&self, parent: &LocalFolder, name: &str) -> Result<Option<EntryOf<Self>>> {
        let path = parent.0.join(name);
        Ok(kind_of(&path).await?.map(|kind| Entry {
            name: name.to_string(),
            handle: handle_for(path, kind),
        }))
    }
}
