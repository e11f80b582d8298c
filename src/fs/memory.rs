//! In-memory storage provider.
//!
//! Entries live in an index arena; handles are slot indices. A removed slot
//! stays in the arena marked dead, so stale handles fail with `NotFound`
//! instead of aliasing a newer entry. Faults can be injected to exercise
//! permission and write failures, and name lookup can be made
//! case-insensitive like the default volumes of some desktop systems.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{Result, TreeError};
use crate::fs::storage::{
    Connect, Entry, EntryHandle, EntryKind, EntryOf, HandleOf, Permission, StorageProvider,
};

/// Handle to a file slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemFile(usize);

/// Handle to a folder slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemFolder(usize);

const ROOT: usize = 0;

#[derive(Debug)]
enum Content {
    File(Vec<u8>),
    Folder(Vec<usize>),
}

#[derive(Debug)]
struct Slot {
    name: String,
    content: Content,
    live: bool,
}

#[derive(Debug, Default)]
struct Faults {
    deny_permission: bool,
    cancel_connect: bool,
    failing_writes: HashSet<String>,
}

#[derive(Debug)]
struct Inner {
    slots: Vec<Slot>,
    faults: Faults,
    fold_case: bool,
    calls: usize,
}

impl Inner {
    fn slot(&self, index: usize) -> Result<&Slot> {
        match self.slots.get(index) {
            Some(slot) if slot.live => Ok(slot),
            _ => Err(TreeError::NotFound(format!("stale handle #{}", index))),
        }
    }

    fn children(&self, folder: usize) -> Result<&[usize]> {
        match &self.slot(folder)?.content {
            Content::Folder(children) => Ok(children),
            Content::File(_) => Err(TreeError::Storage(format!(
                "handle #{} is not a folder",
                folder
            ))),
        }
    }

    fn child_named(&self, folder: usize, name: &str) -> Result<Option<usize>> {
        Ok(self
            .children(folder)?
            .iter()
            .copied()
            .find(|&i| self.same_name(&self.slots[i].name, name)))
    }

    fn same_name(&self, a: &str, b: &str) -> bool {
        if self.fold_case {
            a.to_lowercase() == b.to_lowercase()
        } else {
            a == b
        }
    }

    fn handle(&self, index: usize) -> EntryHandle<MemFile, MemFolder> {
        match self.slots[index].content {
            Content::File(_) => EntryHandle::File(MemFile(index)),
            Content::Folder(_) => EntryHandle::Folder(MemFolder(index)),
        }
    }

    fn push_child(&mut self, parent: usize, name: &str, content: Content) -> usize {
        let index = self.slots.len();
        self.slots.push(Slot {
            name: name.to_string(),
            content,
            live: true,
        });
        if let Content::Folder(children) = &mut self.slots[parent].content {
            children.push(index);
        }
        index
    }

    fn kill(&mut self, index: usize) {
        let mut stack = vec![index];
        while let Some(i) = stack.pop() {
            self.slots[i].live = false;
            if let Content::Folder(children) = &self.slots[i].content {
                stack.extend(children.iter().copied());
            }
        }
    }

    /// Resolve a `/`-separated path relative to the root.
    fn resolve(&self, path: &str) -> Option<usize> {
        let mut current = ROOT;
        for part in path.split('/').filter(|p| !p.is_empty()) {
            current = self.child_named(current, part).ok()??;
        }
        Some(current)
    }
}

/// Shared in-memory hierarchical store. Clones share the same contents.
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    root_name: String,
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStorage {
    /// Create an empty store whose root folder is called `root_name`.
    pub fn new(root_name: impl Into<String>) -> Self {
        let root = Slot {
            name: String::new(),
            content: Content::Folder(Vec::new()),
            live: true,
        };
        Self {
            root_name: root_name.into(),
            inner: Arc::new(Mutex::new(Inner {
                slots: vec![root],
                faults: Faults::default(),
                fold_case: false,
                calls: 0,
            })),
        }
    }

    /// Create the folder at `path` (and any missing ancestors).
    pub fn add_folder(&self, path: &str) {
        let mut inner = self.inner.lock();
        let mut current = ROOT;
        for part in path.split('/').filter(|p| !p.is_empty()) {
            current = match inner.child_named(current, part) {
                Ok(Some(existing)) => existing,
                _ => inner.push_child(current, part, Content::Folder(Vec::new())),
            };
        }
    }

    /// Create or overwrite the file at `path`. Missing folders are created.
    pub fn add_file(&self, path: &str, content: impl Into<Vec<u8>>) {
        let (dir, name) = path.rsplit_once('/').unwrap_or(("", path));
        self.add_folder(dir);
        let mut inner = self.inner.lock();
        let parent = inner.resolve(dir).unwrap_or(ROOT);
        match inner.child_named(parent, name) {
            Ok(Some(existing)) => inner.slots[existing].content = Content::File(content.into()),
            _ => {
                inner.push_child(parent, name, Content::File(content.into()));
            }
        }
    }

    /// Kind of the entry at `path`, if it exists.
    pub fn kind_at(&self, path: &str) -> Option<EntryKind> {
        let inner = self.inner.lock();
        let index = inner.resolve(path)?;
        Some(inner.handle(index).kind())
    }

    pub fn exists(&self, path: &str) -> bool {
        self.kind_at(path).is_some()
    }

    /// Content of the file at `path`.
    pub fn read(&self, path: &str) -> Option<Vec<u8>> {
        let inner = self.inner.lock();
        let index = inner.resolve(path)?;
        match &inner.slots[index].content {
            Content::File(bytes) => Some(bytes.clone()),
            Content::Folder(_) => None,
        }
    }

    /// Names of the children of the folder at `path`, in listing order.
    pub fn names(&self, path: &str) -> Vec<String> {
        let inner = self.inner.lock();
        inner
            .resolve(path)
            .and_then(|index| inner.children(index).ok())
            .map(|children| {
                children
                    .iter()
                    .map(|&i| inner.slots[i].name.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Make every later permission request return `Denied` (or `Granted` again).
    pub fn revoke_write_permission(&self, revoked: bool) {
        self.inner.lock().faults.deny_permission = revoked;
    }

    /// Make the next connects report a cancelled consent flow.
    pub fn cancel_connect(&self, cancel: bool) {
        self.inner.lock().faults.cancel_connect = cancel;
    }

    /// Make writes to any file called `name` fail.
    pub fn fail_writes_to(&self, name: &str) {
        self.inner.lock().faults.failing_writes.insert(name.to_string());
    }

    /// Resolve names case-insensitively from now on. Listings keep the case
    /// each entry was created with.
    pub fn fold_case(&self, fold: bool) {
        self.inner.lock().fold_case = fold;
    }

    /// Number of provider calls made so far.
    pub fn call_count(&self) -> usize {
        self.inner.lock().calls
    }
}

#[async_trait]
impl StorageProvider for MemoryStorage {
    type File = MemFile;
    type Folder = MemFolder;

    async fn connect(&self) -> Result<Connect<MemFolder>> {
        let mut inner = self.inner.lock();
        inner.calls += 1;
        if inner.faults.cancel_connect {
            return Ok(Connect::Cancelled);
        }
        Ok(Connect::Connected {
            root: MemFolder(ROOT),
            name: self.root_name.clone(),
        })
    }

    async fn request_write_permission(&self, folder: &MemFolder) -> Result<Permission> {
        let mut inner = self.inner.lock();
        inner.calls += 1;
        inner.children(folder.0)?;
        Ok(if inner.faults.deny_permission {
            Permission::Denied
        } else {
            Permission::Granted
        })
    }

    async fn list_entries(&self, folder: &MemFolder) -> Result<Vec<EntryOf<Self>>> {
        let mut inner = self.inner.lock();
        inner.calls += 1;
        let entries = inner
            .children(folder.0)?
            .iter()
            .map(|&i| Entry {
                name: inner.slots[i].name.clone(),
                handle: inner.handle(i),
            })
            .collect();
        Ok(entries)
    }

    async fn get_or_create_child(
        &self,
        parent: &MemFolder,
        name: &str,
        kind: EntryKind,
    ) -> Result<HandleOf<Self>> {
        let mut inner = self.inner.lock();
        inner.calls += 1;
        if let Some(existing) = inner.child_named(parent.0, name)? {
            let handle = inner.handle(existing);
            if handle.kind() != kind {
                return Err(TreeError::Conflict(name.to_string()));
            }
            return Ok(handle);
        }
        if inner.faults.deny_permission {
            return Err(TreeError::Permission(format!("cannot create {}", name)));
        }
        let content = match kind {
            EntryKind::File => Content::File(Vec::new()),
            EntryKind::Folder => Content::Folder(Vec::new()),
        };
        let index = inner.push_child(parent.0, name, content);
        Ok(inner.handle(index))
    }

    async fn create_child(
        &self,
        parent: &MemFolder,
        name: &str,
        kind: EntryKind,
    ) -> Result<HandleOf<Self>> {
        let mut inner = self.inner.lock();
        inner.calls += 1;
        if inner.child_named(parent.0, name)?.is_some() {
            return Err(TreeError::Conflict(name.to_string()));
        }
        if inner.faults.deny_permission {
            return Err(TreeError::Permission(format!("cannot create {}", name)));
        }
        let content = match kind {
            EntryKind::File => Content::File(Vec::new()),
            EntryKind::Folder => Content::Folder(Vec::new()),
        };
        let index = inner.push_child(parent.0, name, content);
        Ok(inner.handle(index))
    }

    async fn read_all(&self, file: &MemFile) -> Result<Vec<u8>> {
        let mut inner = self.inner.lock();
        inner.calls += 1;
        match &inner.slot(file.0)?.content {
            Content::File(bytes) => Ok(bytes.clone()),
            Content::Folder(_) => Err(TreeError::Storage(format!(
                "handle #{} is not a file",
                file.0
            ))),
        }
    }

    async fn write_all(&self, file: &MemFile, bytes: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.calls += 1;
        let slot = inner.slot(file.0)?;
        if inner.faults.failing_writes.contains(&slot.name) {
            return Err(TreeError::Storage(format!("write to {} failed", slot.name)));
        }
        if inner.faults.deny_permission {
            return Err(TreeError::Permission(format!("cannot write {}", slot.name)));
        }
        match &mut inner.slots[file.0].content {
            Content::File(content) => {
                *content = bytes.to_vec();
                Ok(())
            }
            Content::Folder(_) => Err(TreeError::Storage(format!(
                "handle #{} is not a file",
                file.0
            ))),
        }
    }

    async fn remove(&self, parent: &MemFolder, name: &str, recursive: bool) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.calls += 1;
        let index = inner
            .child_named(parent.0, name)?
            .ok_or_else(|| TreeError::NotFound(name.to_string()))?;
        if let Content::Folder(children) = &inner.slots[index].content {
            if !children.is_empty() && !recursive {
                return Err(TreeError::Storage(format!("folder {} is not empty", name)));
            }
        }
        if inner.faults.deny_permission {
            return Err(TreeError::Permission(format!("cannot remove {}", name)));
        }
        inner.kill(index);
        if let Content::Folder(children) = &mut inner.slots[parent.0].content {
            children.retain(|&i| i != index);
        }
        Ok(())
    }
}
