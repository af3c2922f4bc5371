/// Core error types for membank.
///
/// The first four variants are the store contract's error taxonomy; their
/// messages are user-facing remediation text and are tested on content.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// The path failed validation. Never reaches storage.
    #[error("{0}")]
    InvalidPath(String),

    /// The target (a path, or the text to replace) does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The text to replace matched more than once.
    #[error("{0}")]
    Ambiguous(String),

    /// An insert line index was out of range.
    #[error("{0}")]
    InvalidLine(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Encryption error: {0}")]
    Crypto(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MemoryError>;
