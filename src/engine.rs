//! The tree service: owns the tree model, the handle cache and the view
//! state, and serializes every mutation behind a single-flight lock.
//!
//! While connected, mutations go to storage and the tree is rebuilt from it
//! (delete prunes in place). While disconnected the tree is a purely
//! in-memory workspace that is edited directly.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::time::Duration;

use tokio::sync::{watch, Mutex, MutexGuard};
use tracing::{debug, info, instrument, warn};

use crate::config::{
    DEFAULT_FILE_EXTENSION, DEFAULT_FILE_STEM, DEFAULT_FILE_TEMPLATE, DEFAULT_FOLDER_NAME,
    DEFAULT_HIDDEN_PREFIX, DEFAULT_NOTIFY_MS, DEFAULT_VIRTUAL_ROOT,
};
use crate::error::{Result, TreeError};
use crate::fs::handles::HandleCache;
use crate::fs::names;
use crate::fs::operations;
use crate::fs::storage::{Connect, EntryKind, HandleOf, Permission, StorageProvider};
use crate::fs::sync;
use crate::fs::tree::{child_id, split_id, Node, TreeModel, SEPARATOR};
use crate::fs::validate::validate;
use crate::notify::{NotificationKind, Notifier};
use crate::view::{TreeSnapshot, ViewState};

/// What a second mutation does while one is already running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BusyPolicy {
    /// Wait for the running one to finish.
    #[default]
    Queue,
    /// Fail immediately with `Busy`.
    Reject,
}

/// Settings for [`TreeService`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Root id of the in-memory workspace used while disconnected.
    pub virtual_root: String,
    pub hidden_prefix: String,
    pub folder_name: String,
    pub file_stem: String,
    pub file_extension: Option<String>,
    /// Initial content of files created in storage.
    pub file_template: Vec<u8>,
    pub busy_policy: BusyPolicy,
    pub notify_duration: Duration,
    pub error_notify_duration: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            virtual_root: DEFAULT_VIRTUAL_ROOT.to_string(),
            hidden_prefix: DEFAULT_HIDDEN_PREFIX.to_string(),
            folder_name: DEFAULT_FOLDER_NAME.to_string(),
            file_stem: DEFAULT_FILE_STEM.to_string(),
            file_extension: Some(DEFAULT_FILE_EXTENSION.to_string()),
            file_template: DEFAULT_FILE_TEMPLATE.as_bytes().to_vec(),
            busy_policy: BusyPolicy::Queue,
            notify_duration: Duration::from_millis(DEFAULT_NOTIFY_MS),
            error_notify_duration: Duration::from_millis(DEFAULT_NOTIFY_MS),
        }
    }
}

impl EngineConfig {
    fn default_name(&self, kind: EntryKind) -> String {
        match kind {
            EntryKind::Folder => self.folder_name.clone(),
            EntryKind::File => names::with_extension(&self.file_stem, self.file_extension.as_deref()),
        }
    }
}

/// Kind of the operation currently holding the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Connect,
    Disconnect,
    Refresh,
    CreateFolder,
    CreateFile,
    Delete,
    Rename,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            OperationKind::Connect => "connect",
            OperationKind::Disconnect => "disconnect",
            OperationKind::Refresh => "refresh",
            OperationKind::CreateFolder => "create folder",
            OperationKind::CreateFile => "create file",
            OperationKind::Delete => "delete",
            OperationKind::Rename => "rename",
        };
        f.write_str(label)
    }
}

/// The in-flight marker: operation kind plus target id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub kind: OperationKind,
    pub target: String,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.target.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{} {}", self.kind, self.target)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// Connected; carries the root's display name.
    Connected(String),
    /// The user backed out of the consent flow.
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// Confirmation was refused; nothing was touched.
    Declined,
}

struct Connection<D> {
    root: D,
    name: String,
}

struct EngineState<P: StorageProvider> {
    connection: Option<Connection<P::Folder>>,
    tree: TreeModel,
    handles: HandleCache<HandleOf<P>>,
    view: ViewState,
}

/// Lock guard that also owns the in-flight marker; dropping it clears the
/// marker before releasing the lock.
struct Flight<'a, P: StorageProvider> {
    state: MutexGuard<'a, EngineState<P>>,
    marker: &'a watch::Sender<Option<Operation>>,
}

impl<P: StorageProvider> Deref for Flight<'_, P> {
    type Target = EngineState<P>;

    fn deref(&self) -> &Self::Target {
        &self.state
    }
}

impl<P: StorageProvider> DerefMut for Flight<'_, P> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.state
    }
}

impl<P: StorageProvider> Drop for Flight<'_, P> {
    fn drop(&mut self) {
        self.marker.send_replace(None);
    }
}

/// Tree synchronization and mutation service over a storage provider.
pub struct TreeService<P: StorageProvider> {
    provider: P,
    config: EngineConfig,
    state: Mutex<EngineState<P>>,
    snapshots: watch::Sender<TreeSnapshot>,
    in_flight: watch::Sender<Option<Operation>>,
    notifier: Notifier,
}

impl<P: StorageProvider> TreeService<P> {
    /// Start disconnected, with an empty workspace.
    pub fn new(provider: P, config: EngineConfig, notifier: Notifier) -> Self {
        let tree = TreeModel::new(config.virtual_root.clone());
        let (snapshots, _) = watch::channel(TreeSnapshot::empty(config.virtual_root.clone()));
        let (in_flight, _) = watch::channel(None);
        Self {
            provider,
            config,
            state: Mutex::new(EngineState {
                connection: None,
                tree,
                handles: HandleCache::new(),
                view: ViewState::default(),
            }),
            snapshots,
            in_flight,
            notifier,
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Receiver that sees every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<TreeSnapshot> {
        self.snapshots.subscribe()
    }

    /// The latest published snapshot.
    pub fn snapshot(&self) -> TreeSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Receiver for the in-flight marker.
    pub fn in_flight(&self) -> watch::Receiver<Option<Operation>> {
        self.in_flight.subscribe()
    }

    /// Map a `/`-separated path relative to the root to a node id. An empty
    /// path or `.` is the root itself.
    pub fn resolve_path(&self, path: &str) -> String {
        let root_id = self.snapshots.borrow().root_id.clone();
        let path = path.trim_matches(SEPARATOR);
        if path.is_empty() || path == "." {
            root_id
        } else {
            child_id(&root_id, path)
        }
    }

    // ── Lock handling ───────────────────────────────────────────────────────

    async fn begin(&self, kind: OperationKind, target: &str) -> Result<Flight<'_, P>> {
        let state = match self.config.busy_policy {
            BusyPolicy::Queue => self.state.lock().await,
            BusyPolicy::Reject => self.state.try_lock().map_err(|_| {
                let running = self
                    .in_flight
                    .borrow()
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "another operation".to_string());
                TreeError::Busy(running)
            })?,
        };
        self.in_flight.send_replace(Some(Operation {
            kind,
            target: target.to_string(),
        }));
        Ok(Flight {
            state,
            marker: &self.in_flight,
        })
    }

    fn publish(&self, state: &EngineState<P>) {
        self.snapshots.send_replace(TreeSnapshot {
            revision: state.tree.revision(),
            root_id: state.tree.root_id().to_string(),
            connected: state.connection.as_ref().map(|c| c.name.clone()),
            roots: state.tree.roots().clone(),
            view: state.view.clone(),
        });
    }

    /// Notify a failure, prefixed with `context`. Cancellation is silent and
    /// validation messages carry their own prefix.
    fn report(&self, context: &str, err: &TreeError) {
        match err {
            TreeError::Cancelled => debug!("operation cancelled"),
            TreeError::Validation(_) => self.notifier.error(err.to_string()),
            _ => {
                warn!(error = %err, "{}", context);
                self.notifier.error(format!("{}: {}", context, err));
            }
        }
    }

    /// Replace tree and cache with a fresh walk of the connected storage.
    async fn rebuild_into(&self, state: &mut EngineState<P>) -> Result<()> {
        let Some(conn) = &state.connection else {
            return Ok(());
        };
        let (forest, handles) =
            sync::rebuild(&self.provider, &conn.root, &conn.name, &self.config.hidden_prefix)
                .await?;
        state.tree.replace_all(forest);
        state.handles = handles;
        let tree = &state.tree;
        state.view.retain_existing(|id| tree.find(id).is_some());
        Ok(())
    }

    fn folder_handle(state: &EngineState<P>, id: &str) -> Result<P::Folder> {
        state
            .handles
            .get(id)
            .and_then(|h| h.as_folder())
            .cloned()
            .ok_or_else(|| TreeError::NotFound(format!("Parent folder not found: {}", id)))
    }

    // ── Connection ──────────────────────────────────────────────────────────

    /// Ask the provider for a root, check write access and load the tree.
    #[instrument(skip(self))]
    pub async fn connect(&self) -> Result<ConnectOutcome> {
        let result = self.try_connect().await;
        match &result {
            Ok(ConnectOutcome::Connected(name)) => self
                .notifier
                .notify(format!("Connected to {}", name), NotificationKind::Info),
            Ok(ConnectOutcome::Cancelled) => debug!("connect cancelled"),
            Err(e) => self.report("Failed to load directory", e),
        }
        result
    }

    async fn try_connect(&self) -> Result<ConnectOutcome> {
        let mut flight = self.begin(OperationKind::Connect, "").await?;
        let state = &mut *flight;

        let (root, name) = match self.provider.connect().await {
            Ok(Connect::Connected { root, name }) => (root, name),
            Ok(Connect::Cancelled) | Err(TreeError::Cancelled) => {
                return Ok(ConnectOutcome::Cancelled)
            }
            Err(e) => return Err(e),
        };
        if self.provider.request_write_permission(&root).await? != Permission::Granted {
            return Err(TreeError::Permission(
                "Write permission is required to create/delete files and folders".into(),
            ));
        }

        let (forest, handles) =
            sync::rebuild(&self.provider, &root, &name, &self.config.hidden_prefix).await?;
        state.tree.reset(name.clone());
        state.tree.replace_all(forest);
        state.handles = handles;
        state.view.clear();
        state.connection = Some(Connection {
            root,
            name: name.clone(),
        });
        self.publish(state);
        info!(root = %name, "connected");
        Ok(ConnectOutcome::Connected(name))
    }

    /// Drop the connection and return to an empty workspace.
    #[instrument(skip(self))]
    pub async fn disconnect(&self) -> Result<()> {
        let mut flight = match self.begin(OperationKind::Disconnect, "").await {
            Ok(flight) => flight,
            Err(e) => {
                self.report("Failed to disconnect", &e);
                return Err(e);
            }
        };
        let state = &mut *flight;
        let was = state.connection.take().map(|c| c.name);
        state.handles.clear();
        state.tree.reset(self.config.virtual_root.clone());
        state.view.clear();
        self.publish(state);
        if let Some(name) = was {
            info!(root = %name, "disconnected");
            self.notifier
                .notify(format!("Disconnected from {}", name), NotificationKind::Info);
        }
        Ok(())
    }

    /// Rebuild from storage. Does nothing while disconnected.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<()> {
        let result = self.try_refresh().await;
        if let Err(e) = &result {
            self.report("Failed to refresh", e);
        }
        result
    }

    async fn try_refresh(&self) -> Result<()> {
        let mut flight = self.begin(OperationKind::Refresh, "").await?;
        let state = &mut *flight;
        if state.connection.is_none() {
            return Ok(());
        }
        self.rebuild_into(state).await?;
        self.publish(state);
        Ok(())
    }

    // ── Create ──────────────────────────────────────────────────────────────

    /// Create a folder with a default name under `parent_id` (the root when
    /// empty). Returns the new id, which is left in rename mode.
    #[instrument(skip(self))]
    pub async fn create_folder(&self, parent_id: &str) -> Result<String> {
        let result = self.try_create(parent_id, EntryKind::Folder).await;
        match &result {
            Ok(_) => self.notifier.success("Folder created successfully"),
            Err(e) => self.report("Failed to create folder", e),
        }
        result
    }

    /// Create a file with a default name and the configured template.
    #[instrument(skip(self))]
    pub async fn create_file(&self, parent_id: &str) -> Result<String> {
        let result = self.try_create(parent_id, EntryKind::File).await;
        match &result {
            Ok(_) => self.notifier.success("File created successfully"),
            Err(e) => self.report("Failed to create file", e),
        }
        result
    }

    async fn try_create(&self, parent_id: &str, kind: EntryKind) -> Result<String> {
        let op = match kind {
            EntryKind::Folder => OperationKind::CreateFolder,
            EntryKind::File => OperationKind::CreateFile,
        };
        let mut flight = self.begin(op, parent_id).await?;
        let state = &mut *flight;

        let parent_id = if parent_id.is_empty() {
            state.tree.root_id().to_string()
        } else {
            parent_id.to_string()
        };
        let base = self.config.default_name(kind);

        let name = if state.connection.is_some() {
            let parent = Self::folder_handle(state, &parent_id)?;
            match self.provider.request_write_permission(&parent).await? {
                Permission::Granted => {}
                Permission::Denied => {
                    return Err(TreeError::Permission("Write permission denied".into()))
                }
            }
            let existing = operations::sibling_names(&self.provider, &parent).await?;
            let name = names::allocate(&base, &existing);
            let payload = match kind {
                EntryKind::File => Some(self.config.file_template.as_slice()),
                EntryKind::Folder => None,
            };
            operations::create_entry(&self.provider, &parent, &name, kind, payload).await?;
            debug!(parent = %parent_id, %name, "created in storage");
            self.rebuild_into(state).await?;
            name
        } else {
            let existing = state.tree.child_names(&parent_id).ok_or_else(|| {
                TreeError::NotFound(format!("Parent folder not found: {}", parent_id))
            })?;
            let name = names::allocate(&base, &existing);
            let node = match kind {
                EntryKind::File => Node::file(&parent_id, &name),
                EntryKind::Folder => Node::folder(&parent_id, &name, Vec::new()),
            };
            state.tree.insert_child(&parent_id, node)?;
            name
        };

        let id = child_id(&parent_id, &name);
        if parent_id != state.tree.root_id() {
            state.view.expand(parent_id);
        }
        state.view.set_editing(Some(id.clone()));
        self.publish(state);
        info!(%id, "created");
        Ok(id)
    }

    // ── Delete ──────────────────────────────────────────────────────────────

    /// Delete `id` and everything under it once `confirm` agrees. `confirm`
    /// sees the node about to go; refusing makes no storage call.
    #[instrument(skip(self, confirm))]
    pub async fn delete_entry<C>(&self, id: &str, confirm: C) -> Result<DeleteOutcome>
    where
        C: FnOnce(&Node) -> bool,
    {
        let result = self.try_delete(id, confirm).await;
        match &result {
            Ok(DeleteOutcome::Deleted) => self.notifier.success("Item deleted successfully"),
            Ok(DeleteOutcome::Declined) => debug!("delete declined"),
            Err(e) => self.report("Failed to delete item", e),
        }
        result
    }

    async fn try_delete<C>(&self, id: &str, confirm: C) -> Result<DeleteOutcome>
    where
        C: FnOnce(&Node) -> bool,
    {
        let node = {
            let snapshot = self.snapshots.borrow();
            find_in(&snapshot.roots, id)
        }
        .ok_or_else(|| TreeError::NotFound(id.to_string()))?;
        if !confirm(&node) {
            return Ok(DeleteOutcome::Declined);
        }

        let mut flight = self.begin(OperationKind::Delete, id).await?;
        let state = &mut *flight;

        if state.connection.is_some() {
            let (parent_id, name) =
                split_id(id).ok_or_else(|| TreeError::NotFound(id.to_string()))?;
            let parent = Self::folder_handle(state, parent_id)?;
            self.provider.remove(&parent, name, true).await?;
            let dropped = state.handles.remove_subtree(id);
            debug!(%id, dropped, "pruned handle cache");
            state.tree.remove_by_id(id);
        } else {
            state
                .tree
                .remove_by_id(id)
                .ok_or_else(|| TreeError::NotFound(id.to_string()))?;
        }

        let tree = &state.tree;
        state.view.retain_existing(|i| tree.find(i).is_some());
        self.publish(state);
        info!(%id, "deleted");
        Ok(DeleteOutcome::Deleted)
    }

    // ── Rename ──────────────────────────────────────────────────────────────

    /// Rename `id` to `new_name`. Returns the node's new id; renaming to the
    /// current name changes nothing.
    #[instrument(skip(self))]
    pub async fn rename_entry(&self, id: &str, new_name: &str) -> Result<String> {
        let result = self.try_rename(id, new_name).await;
        match &result {
            Ok(_) => self.notifier.success("Item renamed successfully"),
            Err(e) => self.report("Failed to rename item", e),
        }
        result
    }

    async fn try_rename(&self, id: &str, new_name: &str) -> Result<String> {
        let new_name = validate(new_name)?;
        let mut flight = self.begin(OperationKind::Rename, id).await?;
        let state = &mut *flight;

        let (parent_id, old_name) =
            split_id(id).ok_or_else(|| TreeError::NotFound(id.to_string()))?;
        if state.tree.find(id).is_none() {
            return Err(TreeError::NotFound(id.to_string()));
        }
        if old_name == new_name {
            debug!(%id, "rename to current name");
            Self::finish_editing(state, id);
            self.publish(state);
            return Ok(id.to_string());
        }

        let siblings = state.tree.child_names(parent_id).unwrap_or_default();
        if siblings.iter().any(|s| *s == new_name) {
            return Err(TreeError::Conflict(new_name));
        }

        let new_id = child_id(parent_id, &new_name);
        if state.connection.is_some() {
            if sync::is_hidden(&new_name, &self.config.hidden_prefix) {
                return Err(TreeError::Validation(format!(
                    "Names starting with \"{}\" are hidden",
                    self.config.hidden_prefix
                )));
            }
            let parent = Self::folder_handle(state, parent_id)?;
            let source = state
                .handles
                .get(id)
                .cloned()
                .ok_or_else(|| TreeError::NotFound(id.to_string()))?;
            operations::rename_entry(&self.provider, &parent, old_name, &source, &new_name)
                .await?;
            state.view.rekey(id, &new_id);
            self.rebuild_into(state).await?;
        } else {
            state
                .tree
                .rename_by_id(id, &new_name)
                .ok_or_else(|| TreeError::NotFound(id.to_string()))?;
            state.view.rekey(id, &new_id);
        }

        Self::finish_editing(state, &new_id);
        self.publish(state);
        info!(from = %id, to = %new_id, "renamed");
        Ok(new_id)
    }

    fn finish_editing(state: &mut EngineState<P>, id: &str) {
        if state.view.editing() == Some(id) {
            state.view.set_editing(None);
        }
    }

    // ── View state ──────────────────────────────────────────────────────────

    /// Flip the expansion of folder `id`. Returns whether it is now expanded;
    /// files are never expanded.
    pub async fn toggle_expand(&self, id: &str) -> Result<bool> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let node = state
            .tree
            .find(id)
            .ok_or_else(|| TreeError::NotFound(id.to_string()))?;
        if !node.is_folder() {
            return Ok(false);
        }
        let expanded = state.view.toggle(id);
        self.publish(state);
        Ok(expanded)
    }

    /// Put `id` into rename mode, or leave rename mode with `None`.
    pub async fn set_editing(&self, id: Option<&str>) -> Result<()> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        if let Some(id) = id {
            if state.tree.find(id).is_none() {
                return Err(TreeError::NotFound(id.to_string()));
            }
        }
        state.view.set_editing(id.map(str::to_string));
        self.publish(state);
        Ok(())
    }
}

/// Clone of the node `id` in `roots`, if present.
fn find_in(roots: &[std::sync::Arc<Node>], id: &str) -> Option<Node> {
    let mut nodes = roots;
    loop {
        let node = nodes
            .iter()
            .find(|n| crate::fs::tree::is_same_or_descendant(id, &n.id))?;
        if node.id == id {
            return Some(Node::clone(node));
        }
        nodes = node.children();
    }
}
