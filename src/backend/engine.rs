//! Shared store engine for the map-backed adapters.
//!
//! Directory model, text editing, metadata bookkeeping and message
//! construction all live here, once. An adapter contributes only a
//! `Substrate`: how a tree state is physically loaded and persisted.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use crate::editor;
use crate::error::Result;
use crate::path::{self, MEMORY_ROOT};
use crate::pins::PinTracker;
use crate::tree::{render_listing, FileRecord, TreeState};

use super::{
    err_ancestor_is_file, err_dir_in_the_way, err_file_missing, err_missing, err_not_a_file,
    err_rename_collision, err_rename_root, err_view_missing, msg_created, msg_deleted_dir,
    msg_deleted_file, msg_edited, msg_inserted, msg_renamed, EntryKind, MemoryEntry, MemoryStore,
    ViewRange,
};

/// What a mutation changed, for substrates that persist incrementally.
pub enum Flush<'a> {
    /// Only timestamps, directories or summaries changed.
    MetaOnly,
    /// File contents changed.
    Content {
        written: &'a [String],
        removed: &'a [String],
    },
}

/// Physical persistence seam. The engine owns all semantics; a substrate
/// only loads a tree state and writes changes back to its medium.
#[async_trait]
pub trait Substrate: Send {
    async fn load(&mut self) -> Result<TreeState>;

    async fn flush(&mut self, state: &TreeState, change: Flush<'_>) -> Result<()>;
}

/// One engine serves every map-backed adapter; only the substrate varies.
pub struct TreeEngine<S> {
    pub(crate) state: TreeState,
    pub(crate) substrate: S,
    pins: Arc<dyn PinTracker>,
}

impl<S: Substrate> TreeEngine<S> {
    pub(crate) fn from_parts(state: TreeState, substrate: S, pins: Arc<dyn PinTracker>) -> Self {
        Self {
            state,
            substrate,
            pins,
        }
    }

    pub(crate) async fn open_with(mut substrate: S, pins: Arc<dyn PinTracker>) -> Result<Self> {
        let state = substrate.load().await?;
        Ok(Self::from_parts(state, substrate, pins))
    }

    /// Drop the in-memory state and reload it from the substrate.
    pub(crate) async fn reload(&mut self) -> Result<()> {
        self.state = self.substrate.load().await?;
        Ok(())
    }
}

#[async_trait]
impl<S: Substrate> MemoryStore for TreeEngine<S> {
    async fn view(&mut self, p: &str, range: Option<ViewRange>) -> Result<String> {
        let p = path::validate(p)?;
        debug!("view {p}");
        match self.state.resolve_kind(&p) {
            Some(EntryKind::Directory) => {
                let children = self.state.list_immediate_children(&p);
                Ok(render_listing(&p, &children))
            }
            Some(EntryKind::File) => {
                let text = {
                    let record = self.state.files.get_mut(&p).ok_or_else(|| err_missing(&p))?;
                    record.accessed_at = Utc::now();
                    record.content.clone()
                };
                self.substrate.flush(&self.state, Flush::MetaOnly).await?;
                Ok(editor::render_view(&text, range))
            }
            None => Err(err_view_missing(&p)),
        }
    }

    async fn read_raw(&mut self, p: &str) -> Result<String> {
        let p = path::validate(p)?;
        match self.state.resolve_kind(&p) {
            Some(EntryKind::File) => {
                let text = {
                    let record = self.state.files.get_mut(&p).ok_or_else(|| err_missing(&p))?;
                    record.accessed_at = Utc::now();
                    record.content.clone()
                };
                self.substrate.flush(&self.state, Flush::MetaOnly).await?;
                Ok(text)
            }
            Some(EntryKind::Directory) => Err(err_not_a_file(&p)),
            None => Err(err_file_missing(&p)),
        }
    }

    async fn create(&mut self, p: &str, file_text: &str) -> Result<String> {
        let p = path::validate(p)?;
        if self.state.resolve_kind(&p) == Some(EntryKind::Directory) {
            return Err(err_dir_in_the_way(&p));
        }
        for dir in path::ancestors(&p) {
            if self.state.resolve_kind(dir) == Some(EntryKind::File) {
                return Err(err_ancestor_is_file(dir, &p));
            }
        }
        debug!("create {p} ({} bytes)", file_text.len());
        self.state.ensure_ancestors(&p);
        self.state
            .files
            .insert(p.clone(), FileRecord::new(file_text));
        let written = [p.clone()];
        self.substrate
            .flush(
                &self.state,
                Flush::Content {
                    written: &written,
                    removed: &[],
                },
            )
            .await?;
        Ok(msg_created(&p))
    }

    async fn replace(&mut self, p: &str, old_str: &str, new_str: &str) -> Result<String> {
        let p = path::validate(p)?;
        match self.state.resolve_kind(&p) {
            Some(EntryKind::File) => {
                {
                    let record = self.state.files.get_mut(&p).ok_or_else(|| err_missing(&p))?;
                    record.content =
                        editor::unique_replace(&record.content, old_str, new_str, Some(&p))?;
                    record.modified_at = Utc::now();
                }
                let written = [p.clone()];
                self.substrate
                    .flush(
                        &self.state,
                        Flush::Content {
                            written: &written,
                            removed: &[],
                        },
                    )
                    .await?;
                Ok(msg_edited(&p))
            }
            Some(EntryKind::Directory) => Err(err_not_a_file(&p)),
            None => Err(err_file_missing(&p)),
        }
    }

    async fn insert(&mut self, p: &str, insert_line: i64, insert_text: &str) -> Result<String> {
        let p = path::validate(p)?;
        match self.state.resolve_kind(&p) {
            Some(EntryKind::File) => {
                {
                    let record = self.state.files.get_mut(&p).ok_or_else(|| err_missing(&p))?;
                    record.content =
                        editor::insert_at_line(&record.content, insert_line, insert_text)?;
                    record.modified_at = Utc::now();
                }
                let written = [p.clone()];
                self.substrate
                    .flush(
                        &self.state,
                        Flush::Content {
                            written: &written,
                            removed: &[],
                        },
                    )
                    .await?;
                Ok(msg_inserted(insert_line, &p))
            }
            Some(EntryKind::Directory) => Err(err_not_a_file(&p)),
            None => Err(err_file_missing(&p)),
        }
    }

    async fn delete(&mut self, p: &str) -> Result<String> {
        let p = path::validate(p)?;
        let kind = self.state.resolve_kind(&p).ok_or_else(|| err_missing(&p))?;
        debug!("delete {p}");
        let removed = self.state.delete_subtree(&p);
        for r in &removed {
            self.pins.on_remove(r);
        }
        self.substrate
            .flush(
                &self.state,
                Flush::Content {
                    written: &[],
                    removed: &removed,
                },
            )
            .await?;
        match kind {
            EntryKind::File => Ok(msg_deleted_file(&p)),
            EntryKind::Directory => Ok(msg_deleted_dir(&p)),
        }
    }

    async fn rename(&mut self, old_path: &str, new_path: &str) -> Result<String> {
        let old = path::validate(old_path)?;
        let new = path::validate(new_path)?;
        if old == MEMORY_ROOT {
            return Err(err_rename_root());
        }
        self.state.resolve_kind(&old).ok_or_else(|| err_missing(&old))?;
        if self.state.resolve_kind(&new).is_some() {
            return Err(err_rename_collision(&new));
        }
        for dir in path::ancestors(&new) {
            if self.state.resolve_kind(dir) == Some(EntryKind::File) {
                return Err(err_ancestor_is_file(dir, &new));
            }
        }
        debug!("rename {old} -> {new}");

        self.state.ensure_ancestors(&new);
        let moved = self.state.rename_subtree(&old, &new);
        for (o, n) in &moved {
            self.pins.on_rename(o, n);
        }

        let mut written = Vec::new();
        let mut removed = Vec::new();
        for (o, n) in &moved {
            if self.state.files.contains_key(n) {
                written.push(n.clone());
                removed.push(o.clone());
            }
        }
        self.substrate
            .flush(
                &self.state,
                Flush::Content {
                    written: &written,
                    removed: &removed,
                },
            )
            .await?;
        Ok(msg_renamed(&old, &new))
    }

    async fn list_all(&mut self) -> Result<Vec<MemoryEntry>> {
        let mut entries: Vec<MemoryEntry> = Vec::new();
        for d in &self.state.dirs {
            entries.push(MemoryEntry {
                path: d.clone(),
                kind: EntryKind::Directory,
                size: 0,
                modified_at: None,
                accessed_at: None,
                pinned: self.pins.is_pinned(d),
                summary: self.state.summaries.get(d).cloned(),
            });
        }
        for (p, record) in &self.state.files {
            entries.push(MemoryEntry {
                path: p.clone(),
                kind: EntryKind::File,
                size: record.content.len() as u64,
                modified_at: Some(record.modified_at),
                accessed_at: Some(record.accessed_at),
                pinned: self.pins.is_pinned(p),
                summary: self.state.summaries.get(p).cloned(),
            });
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    async fn summary_of(&mut self, p: &str) -> Result<Option<String>> {
        let p = path::validate(p)?;
        Ok(self.state.summaries.get(&p).cloned())
    }

    async fn set_summary(&mut self, p: &str, summary: &str) -> Result<()> {
        let p = path::validate(p)?;
        if self.state.resolve_kind(&p).is_none() {
            return Err(err_missing(&p));
        }
        self.state.summaries.insert(p, summary.to_string());
        self.substrate.flush(&self.state, Flush::MetaOnly).await
    }

    async fn clear_summary(&mut self, p: &str) -> Result<()> {
        let p = path::validate(p)?;
        if self.state.summaries.remove(&p).is_some() {
            self.substrate.flush(&self.state, Flush::MetaOnly).await?;
        }
        Ok(())
    }
}
