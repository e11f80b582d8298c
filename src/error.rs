use thiserror::Error;

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, TreeError>;

/// Errors raised by the tree engine and its storage providers.
#[derive(Debug, Error)]
pub enum TreeError {
    /// A proposed name failed validation. Never reaches storage.
    #[error("Invalid name: {0}")]
    Validation(String),

    /// Write capability was denied or revoked.
    #[error("Permission denied: {0}")]
    Permission(String),

    /// A parent or entry is missing, e.g. a stale id after external changes.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The target name already exists among the siblings.
    #[error("An item named \"{0}\" already exists")]
    Conflict(String),

    /// The storage provider reported a failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// The user aborted an interactive flow. Not a failure.
    #[error("Cancelled by user")]
    Cancelled,

    /// Another mutation is in flight and the engine rejects concurrent calls.
    #[error("Another operation is in progress: {0}")]
    Busy(String),

    /// I/O errors from the local filesystem provider.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl TreeError {
    /// Whether this outcome is a silent user cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TreeError::Cancelled)
    }
}
