//! Inline rename editor.
//!
//! `Idle -> Editing` when a rename starts (explicitly or right after a
//! create), `Editing -> Committing` on confirm, then `Idle` on success or back
//! to `Editing` with the previous name on failure. Cancel returns to `Idle`.

use crate::engine::TreeService;
use crate::error::Result;
use crate::fs::storage::StorageProvider;
use crate::fs::tree::split_id;

/// Where the editor is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EditPhase {
    #[default]
    Idle,
    Editing { id: String, original: String },
    Committing { id: String, original: String },
}

/// Text being typed, with a byte-offset cursor on a char boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputBuffer {
    pub input: String,
    pub cursor_position: usize,
}

impl InputBuffer {
    pub fn set(&mut self, text: &str) {
        self.input = text.to_string();
        self.cursor_position = self.input.len();
    }

    pub fn insert_char(&mut self, c: char) {
        self.input.insert(self.cursor_position, c);
        self.cursor_position += c.len_utf8();
    }

    /// Delete the character before the cursor (backspace).
    pub fn delete_char(&mut self) {
        if let Some(prev) = self.input[..self.cursor_position].chars().next_back() {
            self.cursor_position -= prev.len_utf8();
            self.input.remove(self.cursor_position);
        }
    }

    pub fn move_left(&mut self) {
        if let Some(prev) = self.input[..self.cursor_position].chars().next_back() {
            self.cursor_position -= prev.len_utf8();
        }
    }

    pub fn move_right(&mut self) {
        if let Some(next) = self.input[self.cursor_position..].chars().next() {
            self.cursor_position += next.len_utf8();
        }
    }

    pub fn home(&mut self) {
        self.cursor_position = 0;
    }

    pub fn end(&mut self) {
        self.cursor_position = self.input.len();
    }
}

/// Drives one rename at a time against a [`TreeService`].
#[derive(Debug, Default)]
pub struct RenameEditor {
    phase: EditPhase,
    pub buffer: InputBuffer,
}

impl RenameEditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> &EditPhase {
        &self.phase
    }

    /// Id of the node being renamed, if any.
    pub fn target(&self) -> Option<&str> {
        match &self.phase {
            EditPhase::Idle => None,
            EditPhase::Editing { id, .. } | EditPhase::Committing { id, .. } => Some(id.as_str()),
        }
    }

    /// Start renaming `id`, with its current name in the buffer.
    pub async fn begin<P: StorageProvider>(
        &mut self,
        service: &TreeService<P>,
        id: &str,
    ) -> Result<()> {
        service.set_editing(Some(id)).await?;
        let original = split_id(id).map(|(_, name)| name).unwrap_or(id).to_string();
        self.buffer.set(&original);
        self.phase = EditPhase::Editing {
            id: id.to_string(),
            original,
        };
        Ok(())
    }

    /// Submit the buffer. Returns the new id, or `None` when nothing was
    /// being edited. On failure the buffer is reset to the previous name and
    /// editing continues.
    pub async fn commit<P: StorageProvider>(
        &mut self,
        service: &TreeService<P>,
    ) -> Result<Option<String>> {
        let (id, original) = match std::mem::take(&mut self.phase) {
            EditPhase::Editing { id, original } => (id, original),
            other => {
                self.phase = other;
                return Ok(None);
            }
        };
        self.phase = EditPhase::Committing {
            id: id.clone(),
            original: original.clone(),
        };

        match service.rename_entry(&id, &self.buffer.input).await {
            Ok(new_id) => {
                self.phase = EditPhase::Idle;
                self.buffer = InputBuffer::default();
                Ok(Some(new_id))
            }
            Err(e) => {
                self.buffer.set(&original);
                self.phase = EditPhase::Editing { id, original };
                Err(e)
            }
        }
    }

    /// Abandon the rename without touching storage.
    pub async fn cancel<P: StorageProvider>(&mut self, service: &TreeService<P>) -> Result<()> {
        if matches!(self.phase, EditPhase::Idle) {
            return Ok(());
        }
        self.phase = EditPhase::Idle;
        self.buffer = InputBuffer::default();
        service.set_editing(None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineConfig;
    use crate::error::TreeError;
    use crate::fs::memory::MemoryStorage;
    use crate::notify::Notifier;

    fn buffer(text: &str) -> InputBuffer {
        let mut b = InputBuffer::default();
        b.set(text);
        b
    }

    async fn connected(store: &MemoryStorage) -> TreeService<MemoryStorage> {
        let config = EngineConfig::default();
        let (notifier, _rx) = Notifier::channel(config.notify_duration, config.error_notify_duration);
        let svc = TreeService::new(store.clone(), config, notifier);
        svc.connect().await.unwrap();
        svc
    }

    #[test]
    fn input_char_inserts_at_cursor() {
        let mut b = buffer("ac");
        b.move_left();
        b.insert_char('b');
        assert_eq!(b.input, "abc");
        assert_eq!(b.cursor_position, 2);
    }

    #[test]
    fn delete_char_at_start_is_noop() {
        let mut b = buffer("x");
        b.home();
        b.delete_char();
        assert_eq!(b.input, "x");
        b.end();
        b.delete_char();
        assert!(b.input.is_empty());
    }

    #[test]
    fn cursor_moves_by_char_not_byte() {
        let mut b = buffer("é1");
        b.home();
        b.move_right();
        assert_eq!(b.cursor_position, 2);
        b.move_right();
        b.move_right();
        assert_eq!(b.cursor_position, 3);
        b.move_left();
        b.move_left();
        b.move_left();
        assert_eq!(b.cursor_position, 0);
    }

    #[tokio::test]
    async fn commit_renames_and_goes_idle() {
        let store = MemoryStorage::new("p");
        store.add_file("draft.tex", "d");
        let svc = connected(&store).await;
        let mut editor = RenameEditor::new();

        editor.begin(&svc, "p/draft.tex").await.unwrap();
        assert_eq!(editor.buffer.input, "draft.tex");
        assert_eq!(svc.snapshot().view.editing(), Some("p/draft.tex"));

        editor.buffer.set("final.tex");
        let new_id = editor.commit(&svc).await.unwrap();
        assert_eq!(new_id.as_deref(), Some("p/final.tex"));
        assert_eq!(editor.phase(), &EditPhase::Idle);
        assert_eq!(svc.snapshot().view.editing(), None);
        assert!(store.exists("final.tex"));
    }

    #[tokio::test]
    async fn failed_commit_rolls_back_to_editing() {
        let store = MemoryStorage::new("p");
        store.add_file("a.tex", "a");
        store.add_file("b.tex", "b");
        let svc = connected(&store).await;
        let mut editor = RenameEditor::new();

        editor.begin(&svc, "p/a.tex").await.unwrap();
        editor.buffer.set("b.tex");
        let err = editor.commit(&svc).await.unwrap_err();
        assert!(matches!(err, TreeError::Conflict(_)));
        assert_eq!(
            editor.phase(),
            &EditPhase::Editing {
                id: "p/a.tex".into(),
                original: "a.tex".into()
            }
        );
        assert_eq!(editor.buffer.input, "a.tex");
        assert_eq!(svc.snapshot().view.editing(), Some("p/a.tex"));
    }

    #[tokio::test]
    async fn cancel_leaves_storage_alone() {
        let store = MemoryStorage::new("p");
        store.add_file("a.tex", "a");
        let svc = connected(&store).await;
        let mut editor = RenameEditor::new();
        editor.begin(&svc, "p/a.tex").await.unwrap();
        editor.buffer.insert_char('x');
        let calls = store.call_count();

        editor.cancel(&svc).await.unwrap();
        assert_eq!(editor.phase(), &EditPhase::Idle);
        assert_eq!(editor.target(), None);
        assert_eq!(store.call_count(), calls);
        assert_eq!(svc.snapshot().view.editing(), None);
    }

    #[tokio::test]
    async fn commit_when_idle_is_none() {
        let store = MemoryStorage::new("p");
        let svc = connected(&store).await;
        let mut editor = RenameEditor::new();
        assert_eq!(editor.commit(&svc).await.unwrap(), None);
    }

    #[tokio::test]
    async fn editing_after_create() {
        let store = MemoryStorage::new("p");
        let svc = connected(&store).await;
        let id = svc.create_folder("").await.unwrap();
        let mut editor = RenameEditor::new();
        editor.begin(&svc, &id).await.unwrap();
        editor.buffer.set("Chapters");
        editor.commit(&svc).await.unwrap();
        assert_eq!(store.names(""), vec!["Chapters"]);
    }
}
