//! On-disk adapter: the memory tree is a real directory tree.
//!
//! Directories are actual directories and metadata comes from native file
//! stats instead of being tracked separately. Summaries are the one
//! exception — stats cannot carry them, so they stay in process memory.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;
use walkdir::WalkDir;

use crate::editor;
use crate::error::Result;
use crate::path::{self, MEMORY_ROOT};
use crate::pins::PinTracker;
use crate::tree::{render_listing, Child};

use super::{
    err_ancestor_is_file, err_dir_in_the_way, err_file_missing, err_missing, err_not_a_file,
    err_rename_collision, err_rename_root, err_view_missing, msg_created, msg_deleted_dir,
    msg_deleted_file, msg_edited, msg_inserted, msg_renamed, EntryKind, MemoryEntry, MemoryStore,
    ViewRange,
};

/// Store rooted at a real directory on the host filesystem.
pub struct DiskStore {
    root: PathBuf,
    pins: Arc<dyn PinTracker>,
    summaries: BTreeMap<String, String>,
}

impl DiskStore {
    /// Create the store, materializing the root directory if needed.
    pub fn new(root: impl Into<PathBuf>, pins: Arc<dyn PinTracker>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            pins,
            summaries: BTreeMap::new(),
        })
    }

    fn host_path(&self, virt: &str) -> PathBuf {
        let rel = path::relative_of(virt);
        if rel.is_empty() {
            self.root.clone()
        } else {
            self.root.join(rel)
        }
    }

    fn virt_path(&self, host: &Path) -> String {
        let rel = host.strip_prefix(&self.root).unwrap_or(host);
        let rel: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        if rel.is_empty() {
            MEMORY_ROOT.to_string()
        } else {
            format!("{MEMORY_ROOT}/{}", rel.join("/"))
        }
    }

    fn resolve_kind(&self, virt: &str) -> Option<EntryKind> {
        let meta = std::fs::metadata(self.host_path(virt)).ok()?;
        if meta.is_dir() {
            Some(EntryKind::Directory)
        } else {
            Some(EntryKind::File)
        }
    }

    /// Virtual paths of every file at or under `virt`, for pin notification.
    fn files_under(&self, virt: &str) -> Vec<String> {
        let host = self.host_path(virt);
        if host.is_file() {
            return vec![virt.to_string()];
        }
        WalkDir::new(&host)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| self.virt_path(e.path()))
            .collect()
    }

    /// Every entry at or under `virt`, directories included.
    fn entries_under(&self, virt: &str) -> Vec<String> {
        let host = self.host_path(virt);
        if host.is_file() {
            return vec![virt.to_string()];
        }
        WalkDir::new(&host)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| self.virt_path(e.path()))
            .collect()
    }

    async fn list_children(&self, virt: &str) -> Result<Vec<Child>> {
        let mut children = Vec::new();
        let mut dir = tokio::fs::read_dir(self.host_path(virt)).await?;
        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let is_dir = entry.file_type().await?.is_dir();
            children.push(Child { name, is_dir });
        }
        children.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(children)
    }

    async fn read_file(&self, virt: &str) -> Result<String> {
        match self.resolve_kind(virt) {
            Some(EntryKind::File) => Ok(tokio::fs::read_to_string(self.host_path(virt)).await?),
            Some(EntryKind::Directory) => Err(err_not_a_file(virt)),
            None => Err(err_file_missing(virt)),
        }
    }

    fn drop_summaries_under(&mut self, virt: &str) {
        let prefix = format!("{virt}/");
        self.summaries
            .retain(|k, _| k != virt && !k.starts_with(&prefix));
    }
}

#[async_trait]
impl MemoryStore for DiskStore {
    async fn view(&mut self, p: &str, range: Option<ViewRange>) -> Result<String> {
        let p = path::validate(p)?;
        debug!("view {p}");
        match self.resolve_kind(&p) {
            Some(EntryKind::Directory) => {
                let children = self.list_children(&p).await?;
                Ok(render_listing(&p, &children))
            }
            Some(EntryKind::File) => {
                let text = tokio::fs::read_to_string(self.host_path(&p)).await?;
                Ok(editor::render_view(&text, range))
            }
            None => Err(err_view_missing(&p)),
        }
    }

    async fn read_raw(&mut self, p: &str) -> Result<String> {
        let p = path::validate(p)?;
        self.read_file(&p).await
    }

    async fn create(&mut self, p: &str, file_text: &str) -> Result<String> {
        let p = path::validate(p)?;
        if self.resolve_kind(&p) == Some(EntryKind::Directory) {
            return Err(err_dir_in_the_way(&p));
        }
        for dir in path::ancestors(&p) {
            if self.resolve_kind(dir) == Some(EntryKind::File) {
                return Err(err_ancestor_is_file(dir, &p));
            }
        }
        debug!("create {p} ({} bytes)", file_text.len());
        let host = self.host_path(&p);
        if let Some(parent) = host.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&host, file_text).await?;
        Ok(msg_created(&p))
    }

    async fn replace(&mut self, p: &str, old_str: &str, new_str: &str) -> Result<String> {
        let p = path::validate(p)?;
        let text = self.read_file(&p).await?;
        let updated = editor::unique_replace(&text, old_str, new_str, Some(&p))?;
        tokio::fs::write(self.host_path(&p), updated).await?;
        Ok(msg_edited(&p))
    }

    async fn insert(&mut self, p: &str, insert_line: i64, insert_text: &str) -> Result<String> {
        let p = path::validate(p)?;
        let text = self.read_file(&p).await?;
        let updated = editor::insert_at_line(&text, insert_line, insert_text)?;
        tokio::fs::write(self.host_path(&p), updated).await?;
        Ok(msg_inserted(insert_line, &p))
    }

    async fn delete(&mut self, p: &str) -> Result<String> {
        let p = path::validate(p)?;
        debug!("delete {p}");

        if p == MEMORY_ROOT {
            // Clear the contents; the root directory itself always survives.
            let removed = self.files_under(MEMORY_ROOT);
            let mut dir = tokio::fs::read_dir(&self.root).await?;
            while let Some(entry) = dir.next_entry().await? {
                if entry.file_type().await?.is_dir() {
                    tokio::fs::remove_dir_all(entry.path()).await?;
                } else {
                    tokio::fs::remove_file(entry.path()).await?;
                }
            }
            for r in &removed {
                self.pins.on_remove(r);
            }
            self.summaries.clear();
            return Ok(msg_deleted_dir(MEMORY_ROOT));
        }

        match self.resolve_kind(&p) {
            Some(EntryKind::File) => {
                tokio::fs::remove_file(self.host_path(&p)).await?;
                self.pins.on_remove(&p);
                self.drop_summaries_under(&p);
                Ok(msg_deleted_file(&p))
            }
            Some(EntryKind::Directory) => {
                let removed = self.files_under(&p);
                tokio::fs::remove_dir_all(self.host_path(&p)).await?;
                for r in &removed {
                    self.pins.on_remove(r);
                }
                self.drop_summaries_under(&p);
                Ok(msg_deleted_dir(&p))
            }
            None => Err(err_missing(&p)),
        }
    }

    async fn rename(&mut self, old_path: &str, new_path: &str) -> Result<String> {
        let old = path::validate(old_path)?;
        let new = path::validate(new_path)?;
        if old == MEMORY_ROOT {
            return Err(err_rename_root());
        }
        if self.resolve_kind(&old).is_none() {
            return Err(err_missing(&old));
        }
        if self.resolve_kind(&new).is_some() {
            return Err(err_rename_collision(&new));
        }
        for dir in path::ancestors(&new) {
            if self.resolve_kind(dir) == Some(EntryKind::File) {
                return Err(err_ancestor_is_file(dir, &new));
            }
        }
        debug!("rename {old} -> {new}");

        let moved_from = self.entries_under(&old);
        let new_host = self.host_path(&new);
        if let Some(parent) = new_host.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::rename(self.host_path(&old), &new_host).await?;

        let old_prefix = format!("{old}/");
        for o in &moved_from {
            let n = if o == &old {
                new.clone()
            } else if let Some(rest) = o.strip_prefix(&old_prefix) {
                format!("{new}/{rest}")
            } else {
                continue;
            };
            self.pins.on_rename(o, &n);
            if let Some(summary) = self.summaries.remove(o) {
                self.summaries.insert(n, summary);
            }
        }
        Ok(msg_renamed(&old, &new))
    }

    async fn list_all(&mut self) -> Result<Vec<MemoryEntry>> {
        let mut entries = Vec::new();
        for entry in WalkDir::new(&self.root).min_depth(1) {
            let entry = entry.map_err(|e| {
                std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
            })?;
            let virt = self.virt_path(entry.path());
            let meta = entry.metadata().map_err(|e| {
                std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
            })?;
            let kind = if meta.is_dir() {
                EntryKind::Directory
            } else {
                EntryKind::File
            };
            entries.push(MemoryEntry {
                path: virt.clone(),
                kind,
                size: if meta.is_dir() { 0 } else { meta.len() },
                modified_at: meta.modified().ok().map(DateTime::<Utc>::from),
                accessed_at: meta.accessed().ok().map(DateTime::<Utc>::from),
                pinned: self.pins.is_pinned(&virt),
                summary: self.summaries.get(&virt).cloned(),
            });
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    async fn summary_of(&mut self, p: &str) -> Result<Option<String>> {
        let p = path::validate(p)?;
        Ok(self.summaries.get(&p).cloned())
    }

    async fn set_summary(&mut self, p: &str, summary: &str) -> Result<()> {
        let p = path::validate(p)?;
        if self.resolve_kind(&p).is_none() {
            return Err(err_missing(&p));
        }
        self.summaries.insert(p, summary.to_string());
        Ok(())
    }

    async fn clear_summary(&mut self, p: &str) -> Result<()> {
        let p = path::validate(p)?;
        self.summaries.remove(&p);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pins::MemoryPinTracker;

    fn store(dir: &Path) -> DiskStore {
        DiskStore::new(dir.join("memories"), Arc::new(MemoryPinTracker::new())).unwrap()
    }

    #[tokio::test]
    async fn test_files_are_real() {
        let tmp = tempfile::tempdir().unwrap();
        let mut s = store(tmp.path());
        s.create("/memories/a/notes.txt", "on disk").await.unwrap();

        let host = tmp.path().join("memories").join("a").join("notes.txt");
        assert_eq!(std::fs::read_to_string(host).unwrap(), "on disk");
    }

    #[tokio::test]
    async fn test_metadata_comes_from_stats() {
        let tmp = tempfile::tempdir().unwrap();
        let mut s = store(tmp.path());
        s.create("/memories/notes.txt", "12345").await.unwrap();

        let entries = s.list_all().await.unwrap();
        let entry = entries.iter().find(|e| e.path == "/memories/notes.txt").unwrap();
        assert_eq!(entry.size, 5);
        assert!(entry.modified_at.is_some());
    }

    #[tokio::test]
    async fn test_existing_tree_is_visible() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("memories");
        std::fs::create_dir_all(root.join("pre")).unwrap();
        std::fs::write(root.join("pre").join("seeded.txt"), "seed").unwrap();

        let mut s = store(tmp.path());
        assert_eq!(s.read_raw("/memories/pre/seeded.txt").await.unwrap(), "seed");
    }

    #[tokio::test]
    async fn test_delete_root_keeps_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let mut s = store(tmp.path());
        s.create("/memories/a/b.txt", "x").await.unwrap();

        let msg = s.delete("/memories").await.unwrap();
        assert_eq!(msg, "Directory deleted: /memories");
        assert!(tmp.path().join("memories").exists());
        assert_eq!(
            s.view("/memories", None).await.unwrap(),
            "Directory: /memories\n(empty)"
        );
    }

    #[tokio::test]
    async fn test_rename_directory_moves_tree() {
        let tmp = tempfile::tempdir().unwrap();
        let mut s = store(tmp.path());
        s.create("/memories/a/deep/file.txt", "content").await.unwrap();

        s.rename("/memories/a", "/memories/z").await.unwrap();
        assert_eq!(
            s.read_raw("/memories/z/deep/file.txt").await.unwrap(),
            "content"
        );
        assert!(s.read_raw("/memories/a/deep/file.txt").await.is_err());
    }

    #[tokio::test]
    async fn test_rename_notifies_pins_per_moved_file() {
        let tmp = tempfile::tempdir().unwrap();
        let pins = Arc::new(MemoryPinTracker::new());
        let mut s = DiskStore::new(tmp.path().join("memories"), pins.clone()).unwrap();

        s.create("/memories/a/one.txt", "1").await.unwrap();
        pins.pin("/memories/a/one.txt");

        s.rename("/memories/a", "/memories/b").await.unwrap();
        assert!(pins.is_pinned("/memories/b/one.txt"));
        assert!(!pins.is_pinned("/memories/a/one.txt"));
    }
}
