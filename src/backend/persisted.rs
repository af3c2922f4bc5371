//! Cross-session persisted adapter over a key-value store.
//!
//! Entries live in parallel path-keyed mappings (content, directory set,
//! access times, modify times, summaries) serialized under a namespace
//! derived from the caller identity. The branch-aware variant re-partitions
//! the namespace by source-control branch: a branch change is cache
//! invalidation — recompute the namespace and reload, never mutate in place.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::Result;
use crate::kv::KeyValue;
use crate::pins::PinTracker;
use crate::tree::{FileRecord, TreeState};

use super::engine::{Flush, Substrate, TreeEngine};

/// Caller identity a persisted store is scoped by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreScope {
    pub workspace: String,
    pub branch: Option<String>,
}

impl StoreScope {
    pub fn new(workspace: impl Into<String>) -> Self {
        Self {
            workspace: workspace.into(),
            branch: None,
        }
    }

    pub fn with_branch(workspace: impl Into<String>, branch: Option<String>) -> Self {
        Self {
            workspace: workspace.into(),
            branch,
        }
    }

    /// Namespace prefix for every key this identity owns.
    pub(crate) fn namespace(&self) -> String {
        let ws = sanitize_component(&self.workspace);
        match &self.branch {
            Some(branch) => format!("membank/{ws}/{}", branch_key(branch)),
            None => format!("membank/{ws}"),
        }
    }
}

/// Reduce an identity component to a safe key fragment.
fn sanitize_component(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Branch names can contain anything (`feature/x`, unicode); sanitize for
/// readability and hash for uniqueness.
pub(crate) fn branch_key(branch: &str) -> String {
    let digest = Sha256::digest(branch.as_bytes());
    format!("{}-{}", sanitize_component(branch), hex::encode(&digest[..4]))
}

/// Read the current branch from `.git/HEAD`. Detached heads and missing
/// repositories yield `None`.
pub fn detect_git_branch(repo: &Path) -> Option<String> {
    let head = std::fs::read_to_string(repo.join(".git").join("HEAD")).ok()?;
    head.trim()
        .strip_prefix("ref: refs/heads/")
        .map(|branch| branch.to_string())
}

/// Physical substrate: five parallel mappings in the key-value store.
pub struct KvSubstrate {
    kv: Box<dyn KeyValue>,
    pub(crate) scope: StoreScope,
}

impl KvSubstrate {
    fn key(&self, leaf: &str) -> String {
        format!("{}/{leaf}", self.scope.namespace())
    }

    async fn get_json<T: DeserializeOwned + Default>(&self, leaf: &str) -> Result<T> {
        let key = self.key(leaf);
        match self.kv.get(&key).await? {
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(value) => Ok(value),
                Err(e) => {
                    warn!("discarding unreadable mapping {key}: {e}");
                    Ok(T::default())
                }
            },
            None => Ok(T::default()),
        }
    }

    async fn put_json<T: serde::Serialize>(&mut self, leaf: &str, value: &T) -> Result<()> {
        let key = self.key(leaf);
        self.kv.put(&key, serde_json::to_string(value)?).await
    }

    async fn write_meta(&mut self, state: &TreeState) -> Result<()> {
        let dirs: &BTreeSet<String> = &state.dirs;
        let atime: BTreeMap<&String, DateTime<Utc>> = state
            .files
            .iter()
            .map(|(p, r)| (p, r.accessed_at))
            .collect();
        let mtime: BTreeMap<&String, DateTime<Utc>> = state
            .files
            .iter()
            .map(|(p, r)| (p, r.modified_at))
            .collect();
        self.put_json("dirs", dirs).await?;
        self.put_json("atime", &atime).await?;
        self.put_json("mtime", &mtime).await?;
        self.put_json("summaries", &state.summaries).await
    }
}

#[async_trait]
impl Substrate for KvSubstrate {
    async fn load(&mut self) -> Result<TreeState> {
        let content: BTreeMap<String, String> = self.get_json("content").await?;
        let dirs: BTreeSet<String> = self.get_json("dirs").await?;
        let atime: BTreeMap<String, DateTime<Utc>> = self.get_json("atime").await?;
        let mtime: BTreeMap<String, DateTime<Utc>> = self.get_json("mtime").await?;
        let summaries: BTreeMap<String, String> = self.get_json("summaries").await?;

        let loaded_at = Utc::now();
        let files = content
            .into_iter()
            .map(|(p, text)| {
                let record = FileRecord {
                    content: text,
                    modified_at: mtime.get(&p).copied().unwrap_or(loaded_at),
                    accessed_at: atime.get(&p).copied().unwrap_or(loaded_at),
                };
                (p, record)
            })
            .collect();

        Ok(TreeState {
            files,
            dirs,
            summaries,
        })
    }

    async fn flush(&mut self, state: &TreeState, change: Flush<'_>) -> Result<()> {
        if let Flush::Content { .. } = change {
            let content: BTreeMap<&String, &String> = state
                .files
                .iter()
                .map(|(p, r)| (p, &r.content))
                .collect();
            self.put_json("content", &content).await?;
        }
        self.write_meta(state).await
    }
}

/// Persisted store: the shared engine over the key-value substrate.
pub type PersistedStore = TreeEngine<KvSubstrate>;

impl TreeEngine<KvSubstrate> {
    /// Open the namespace owned by `scope` and load its state.
    pub async fn open(
        kv: Box<dyn KeyValue>,
        scope: StoreScope,
        pins: Arc<dyn PinTracker>,
    ) -> Result<Self> {
        Self::open_with(KvSubstrate { kv, scope }, pins).await
    }

    /// Open a branch-partitioned namespace, detecting the branch once from
    /// the repository at `repo`.
    pub async fn open_branch_aware(
        kv: Box<dyn KeyValue>,
        workspace: &str,
        repo: &Path,
        pins: Arc<dyn PinTracker>,
    ) -> Result<Self> {
        let branch = detect_git_branch(repo);
        debug!("branch-aware store for {workspace}, branch {branch:?}");
        Self::open(kv, StoreScope::with_branch(workspace, branch), pins).await
    }

    pub fn scope(&self) -> &StoreScope {
        &self.substrate.scope
    }

    /// Re-partition under a new branch and reload. The previous branch's
    /// namespace is left untouched.
    pub async fn on_branch_changed(&mut self, branch: Option<&str>) -> Result<()> {
        let branch = branch.map(|b| b.to_string());
        if self.substrate.scope.branch == branch {
            return Ok(());
        }
        debug!(
            "re-keying memory store: branch {:?} -> {branch:?}",
            self.substrate.scope.branch
        );
        self.substrate.scope.branch = branch;
        self.reload().await
    }
}
