//! Directory model over a flat path-keyed namespace.
//!
//! The store is not a linked tree: it is an arena of path → file records
//! plus a separate set of known directory paths. Listing and cascades are
//! prefix matches over that flat space. The root is implicit — always a
//! directory, never stored, never removable.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backend::EntryKind;
use crate::path::{self, MEMORY_ROOT};

/// A stored file with its tracked metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct FileRecord {
    pub content: String,
    pub modified_at: DateTime<Utc>,
    pub accessed_at: DateTime<Utc>,
}

impl FileRecord {
    pub fn new(content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            content: content.into(),
            modified_at: now,
            accessed_at: now,
        }
    }
}

/// One immediate child of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Child {
    pub name: String,
    pub is_dir: bool,
}

/// Render a directory listing. Directories carry a trailing `/` marker;
/// an empty listing renders the `(empty)` sentinel. Shared by every adapter
/// so the output is byte-identical across substrates.
pub(crate) fn render_listing(dir: &str, children: &[Child]) -> String {
    let mut out = format!("Directory: {dir}");
    if children.is_empty() {
        out.push_str("\n(empty)");
        return out;
    }
    for child in children {
        out.push_str("\n- ");
        out.push_str(&child.name);
        if child.is_dir {
            out.push('/');
        }
    }
    out
}

/// Flat arena of file records plus the set of known directories.
///
/// Opaque outside the crate; substrates and the engine share it internally.
#[derive(Debug, Default, Clone)]
pub struct TreeState {
    pub(crate) files: BTreeMap<String, FileRecord>,
    pub(crate) dirs: BTreeSet<String>,
    pub(crate) summaries: BTreeMap<String, String>,
}

impl TreeState {
    pub(crate) fn resolve_kind(&self, p: &str) -> Option<EntryKind> {
        if p == MEMORY_ROOT {
            return Some(EntryKind::Directory);
        }
        if self.files.contains_key(p) {
            return Some(EntryKind::File);
        }
        if self.dirs.contains(p) {
            return Some(EntryKind::Directory);
        }
        None
    }

    /// Materialize every missing parent directory up to (excluding) the root.
    pub(crate) fn ensure_ancestors(&mut self, p: &str) {
        for dir in path::ancestors(p) {
            self.dirs.insert(dir.to_string());
        }
    }

    /// Immediate children of a directory: entries whose path starts with
    /// `dir + "/"` and whose remainder has no further separator.
    pub(crate) fn list_immediate_children(&self, dir: &str) -> Vec<Child> {
        let prefix = format!("{dir}/");
        let mut children: Vec<Child> = Vec::new();

        let candidates = self
            .files
            .keys()
            .map(|p| (p, false))
            .chain(self.dirs.iter().map(|p| (p, true)));
        for (p, is_dir) in candidates {
            if let Some(rest) = p.strip_prefix(&prefix) {
                if !rest.is_empty() && !rest.contains('/') {
                    children.push(Child {
                        name: rest.to_string(),
                        is_dir,
                    });
                }
            }
        }

        children.sort_by(|a, b| a.name.cmp(&b.name));
        children
    }

    /// Remove everything equal to or nested under `p`, returning the removed
    /// file paths. Targeting the root clears its contents but the root itself
    /// always survives.
    pub(crate) fn delete_subtree(&mut self, p: &str) -> Vec<String> {
        if p == MEMORY_ROOT {
            let removed: Vec<String> = self.files.keys().cloned().collect();
            self.files.clear();
            self.dirs.clear();
            self.summaries.clear();
            return removed;
        }

        let prefix = format!("{p}/");
        let removed: Vec<String> = self
            .files
            .keys()
            .filter(|k| *k == p || k.starts_with(&prefix))
            .cloned()
            .collect();
        for k in &removed {
            self.files.remove(k);
        }
        self.dirs.retain(|d| d != p && !d.starts_with(&prefix));
        self.summaries.retain(|k, _| k != p && !k.starts_with(&prefix));
        removed
    }

    /// Remap every entry under `old` by prefix replacement, preserving file
    /// records and summaries. Returns the (old, new) pairs for every moved
    /// entry. The caller resolves existence and ensures ancestors of `new`.
    pub(crate) fn rename_subtree(&mut self, old: &str, new: &str) -> Vec<(String, String)> {
        let prefix = format!("{old}/");
        let remap = |p: &str| -> Option<String> {
            if p == old {
                Some(new.to_string())
            } else {
                p.strip_prefix(&prefix).map(|rest| format!("{new}/{rest}"))
            }
        };

        let mut moved = Vec::new();

        let file_keys: Vec<String> = self.files.keys().cloned().collect();
        for k in file_keys {
            if let Some(nk) = remap(&k) {
                if let Some(record) = self.files.remove(&k) {
                    self.files.insert(nk.clone(), record);
                }
                moved.push((k, nk));
            }
        }

        let dir_keys: Vec<String> = self.dirs.iter().cloned().collect();
        for d in dir_keys {
            if let Some(nd) = remap(&d) {
                self.dirs.remove(&d);
                self.dirs.insert(nd.clone());
                moved.push((d, nd));
            }
        }

        let summary_keys: Vec<String> = self.summaries.keys().cloned().collect();
        for k in summary_keys {
            if let Some(nk) = remap(&k) {
                if let Some(summary) = self.summaries.remove(&k) {
                    self.summaries.insert(nk, summary);
                }
            }
        }

        moved.sort();
        moved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with(paths: &[&str]) -> TreeState {
        let mut state = TreeState::default();
        for p in paths {
            state.ensure_ancestors(p);
            state.files.insert((*p).to_string(), FileRecord::new("x"));
        }
        state
    }

    #[test]
    fn test_resolve_kind() {
        let state = state_with(&["/memories/a/b.txt"]);
        assert_eq!(state.resolve_kind(MEMORY_ROOT), Some(EntryKind::Directory));
        assert_eq!(
            state.resolve_kind("/memories/a"),
            Some(EntryKind::Directory)
        );
        assert_eq!(
            state.resolve_kind("/memories/a/b.txt"),
            Some(EntryKind::File)
        );
        assert_eq!(state.resolve_kind("/memories/missing"), None);
    }

    #[test]
    fn test_ensure_ancestors_materializes_parents() {
        let state = state_with(&["/memories/a/b/c.txt"]);
        assert!(state.dirs.contains("/memories/a"));
        assert!(state.dirs.contains("/memories/a/b"));
        assert!(!state.dirs.contains(MEMORY_ROOT));
    }

    #[test]
    fn test_list_immediate_children() {
        let state = state_with(&["/memories/top.txt", "/memories/a/nested.txt"]);
        let children = state.list_immediate_children(MEMORY_ROOT);
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].name, "a");
        assert!(children[0].is_dir);
        assert_eq!(children[1].name, "top.txt");
        assert!(!children[1].is_dir);
    }

    #[test]
    fn test_render_listing_markers_and_sentinel() {
        let listing = render_listing(
            MEMORY_ROOT,
            &[
                Child {
                    name: "a".into(),
                    is_dir: true,
                },
                Child {
                    name: "top.txt".into(),
                    is_dir: false,
                },
            ],
        );
        assert_eq!(listing, "Directory: /memories\n- a/\n- top.txt");

        let empty = render_listing(MEMORY_ROOT, &[]);
        assert_eq!(empty, "Directory: /memories\n(empty)");
    }

    #[test]
    fn test_delete_subtree_cascades() {
        let mut state = state_with(&[
            "/memories/a/one.txt",
            "/memories/a/b/two.txt",
            "/memories/keep.txt",
        ]);
        let removed = state.delete_subtree("/memories/a");
        assert_eq!(removed.len(), 2);
        assert!(state.files.contains_key("/memories/keep.txt"));
        assert!(!state.dirs.contains("/memories/a"));
        assert!(!state.dirs.contains("/memories/a/b"));
    }

    #[test]
    fn test_delete_subtree_root_survives() {
        let mut state = state_with(&["/memories/a/one.txt"]);
        let removed = state.delete_subtree(MEMORY_ROOT);
        assert_eq!(removed, vec!["/memories/a/one.txt".to_string()]);
        assert!(state.files.is_empty());
        assert!(state.dirs.is_empty());
        assert_eq!(state.resolve_kind(MEMORY_ROOT), Some(EntryKind::Directory));
    }

    #[test]
    fn test_rename_subtree_remaps_descendants() {
        let mut state = state_with(&["/memories/a/one.txt", "/memories/a/b/two.txt"]);
        state
            .summaries
            .insert("/memories/a/one.txt".into(), "summary".into());

        let moved = state.rename_subtree("/memories/a", "/memories/z");
        assert!(state.files.contains_key("/memories/z/one.txt"));
        assert!(state.files.contains_key("/memories/z/b/two.txt"));
        assert!(state.dirs.contains("/memories/z"));
        assert!(state.dirs.contains("/memories/z/b"));
        assert_eq!(
            state.summaries.get("/memories/z/one.txt").map(String::as_str),
            Some("summary")
        );
        assert!(moved.contains(&(
            "/memories/a/one.txt".to_string(),
            "/memories/z/one.txt".to_string()
        )));
    }

    #[test]
    fn test_rename_single_file_preserves_metadata() {
        let mut state = state_with(&["/memories/a.txt"]);
        let before = state.files["/memories/a.txt"].modified_at;
        state.rename_subtree("/memories/a.txt", "/memories/b.txt");
        assert_eq!(state.files["/memories/b.txt"].modified_at, before);
        assert!(!state.files.contains_key("/memories/a.txt"));
    }
}
