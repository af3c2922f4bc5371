//! Storage backend contract and its four physical adapters.
//!
//! One contract, four substrates: volatile process memory, an
//! identity-scoped persisted key-value store (with a branch-aware variant),
//! an encrypted-at-rest key-value store, and a real on-disk tree. Directory
//! semantics and text editing are shared; only the physical medium varies.

pub mod disk;
mod engine;
pub mod encrypted;
pub mod persisted;
pub mod volatile;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{MemoryError, Result};
use crate::path::{self, MEMORY_ROOT};

pub use disk::DiskStore;
pub use encrypted::{parse_master_key, EncryptedStore};
pub use engine::{Flush, Substrate, TreeEngine};
pub use persisted::{detect_git_branch, PersistedStore, StoreScope};
pub use volatile::VolatileStore;

pub use crate::tree::TreeState;

/// What a path resolves to inside the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

/// One entry in a `list_all` snapshot, with resolved metadata and pin state.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryEntry {
    pub path: String,
    pub kind: EntryKind,
    pub size: u64,
    pub modified_at: Option<DateTime<Utc>>,
    pub accessed_at: Option<DateTime<Utc>>,
    pub pinned: bool,
    pub summary: Option<String>,
}

/// Inclusive 1-based line range for `view`; an end of `-1` means "to end".
pub type ViewRange = (i64, i64);

/// The store contract every adapter implements.
///
/// Operations may suspend on I/O and are never retried internally. One
/// logical caller per instance: methods take `&mut self` and the store does
/// no locking of its own — serialization belongs to the caller.
#[async_trait]
pub trait MemoryStore: Send {
    /// Directory listing, or file text rendered with line numbers.
    async fn view(&mut self, p: &str, range: Option<ViewRange>) -> Result<String>;

    /// Unrendered file text. Directories are not readable.
    async fn read_raw(&mut self, p: &str) -> Result<String>;

    /// Upsert a file, materializing missing ancestors. Overwrites silently.
    async fn create(&mut self, p: &str, file_text: &str) -> Result<String>;

    /// Replace exactly one occurrence of `old_str` in an existing file.
    async fn replace(&mut self, p: &str, old_str: &str, new_str: &str) -> Result<String>;

    /// Splice a new line into an existing file at a 0-based index.
    async fn insert(&mut self, p: &str, insert_line: i64, insert_text: &str) -> Result<String>;

    /// Remove a file, or a directory and everything beneath it. The root
    /// itself always survives.
    async fn delete(&mut self, p: &str) -> Result<String>;

    /// Move a file, or a directory and everything beneath it, preserving
    /// metadata.
    async fn rename(&mut self, old_path: &str, new_path: &str) -> Result<String>;

    /// Every entry excluding the root, sorted lexicographically by path.
    async fn list_all(&mut self) -> Result<Vec<MemoryEntry>>;

    /// Externally-owned opaque summary text for an entry, if any.
    async fn summary_of(&mut self, p: &str) -> Result<Option<String>>;

    /// Attach a summary to an existing entry.
    async fn set_summary(&mut self, p: &str, summary: &str) -> Result<()>;

    /// Drop an entry's summary, if present.
    async fn clear_summary(&mut self, p: &str) -> Result<()>;
}

// Shared message construction. Every adapter goes through these so error
// and success text is byte-identical across substrates.

pub(crate) fn err_missing(p: &str) -> MemoryError {
    MemoryError::NotFound(format!(
        "Path not found: {p}. Use the view command on {MEMORY_ROOT} first to see what exists."
    ))
}

pub(crate) fn err_file_missing(p: &str) -> MemoryError {
    MemoryError::NotFound(format!(
        "File not found: {p}. It has not been created yet; use the create command to write it first."
    ))
}

pub(crate) fn err_not_a_file(p: &str) -> MemoryError {
    MemoryError::NotFound(format!(
        "{p} is a directory, not a file. Use the view command to list its contents."
    ))
}

/// Missing-path message for `view`: name-looking-like-a-file paths get the
/// "not yet created" wording, everything else the generic remediation.
pub(crate) fn err_view_missing(p: &str) -> MemoryError {
    if path::basename(p).contains('.') {
        err_file_missing(p)
    } else {
        err_missing(p)
    }
}

pub(crate) fn err_dir_in_the_way(p: &str) -> MemoryError {
    MemoryError::InvalidPath(format!(
        "A directory already exists at {p}; a path denotes either a file or a directory, never both."
    ))
}

pub(crate) fn err_ancestor_is_file(ancestor: &str, p: &str) -> MemoryError {
    MemoryError::InvalidPath(format!(
        "Cannot place {p}: {ancestor} is a file, not a directory."
    ))
}

pub(crate) fn err_rename_collision(new_path: &str) -> MemoryError {
    MemoryError::InvalidPath(format!(
        "Cannot rename: {new_path} already exists. Delete it first or pick another destination."
    ))
}

pub(crate) fn err_rename_root() -> MemoryError {
    MemoryError::InvalidPath(format!("The memory root {MEMORY_ROOT} cannot be renamed."))
}

pub(crate) fn msg_created(p: &str) -> String {
    format!("File created successfully at {p}")
}

pub(crate) fn msg_edited(p: &str) -> String {
    format!("File {p} has been edited")
}

pub(crate) fn msg_inserted(line: i64, p: &str) -> String {
    format!("Text inserted at line {line} in {p}")
}

pub(crate) fn msg_deleted_file(p: &str) -> String {
    format!("File deleted: {p}")
}

pub(crate) fn msg_deleted_dir(p: &str) -> String {
    format!("Directory deleted: {p}")
}

pub(crate) fn msg_renamed(old: &str, new: &str) -> String {
    format!("Renamed {old} to {new}")
}
