//! Key-value substrate abstraction for the persisted adapters.
//!
//! The host decides where keys actually live (an extension host's state
//! store, a cloud table, a file). `JsonFileKv` is the bundled
//! implementation: one JSON map per file, rewritten whole on every put.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tracing::warn;

use crate::error::Result;

/// Minimal async key-value contract. Operations may suspend on I/O; none
/// are retried internally.
#[async_trait]
pub trait KeyValue: Send {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn put(&mut self, key: &str, value: String) -> Result<()>;

    async fn remove(&mut self, key: &str) -> Result<()>;
}

/// Whole-file JSON map store.
pub struct JsonFileKv {
    file: PathBuf,
    map: BTreeMap<String, String>,
}

impl JsonFileKv {
    /// Open (or create) the backing file. A corrupt file is logged and
    /// treated as empty rather than poisoning every future operation.
    pub fn open(file: impl Into<PathBuf>) -> Result<Self> {
        let file = file.into();
        if let Some(parent) = file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let map = if file.exists() {
            let raw = std::fs::read_to_string(&file)?;
            match serde_json::from_str(&raw) {
                Ok(map) => map,
                Err(e) => {
                    warn!("discarding unreadable kv file {}: {}", file.display(), e);
                    BTreeMap::new()
                }
            }
        } else {
            BTreeMap::new()
        };
        Ok(Self { file, map })
    }

    fn persist(&self) -> Result<()> {
        let raw = serde_json::to_string(&self.map)?;
        std::fs::write(&self.file, raw)?;
        Ok(())
    }
}

#[async_trait]
impl KeyValue for JsonFileKv {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.map.get(key).cloned())
    }

    async fn put(&mut self, key: &str, value: String) -> Result<()> {
        self.map.insert(key.to_string(), value);
        self.persist()
    }

    async fn remove(&mut self, key: &str) -> Result<()> {
        if self.map.remove(key).is_some() {
            self.persist()?;
        }
        Ok(())
    }
}
