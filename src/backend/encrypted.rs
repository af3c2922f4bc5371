//! Encrypted-at-rest adapter — AES-256-GCM over a key-value store.
//!
//! Each file's content is sealed into its own record under an HKDF-derived
//! per-identity key. The underlying store has no native enumeration, so a
//! metadata index (itself sealed) is rewritten after every content write;
//! the index is the single source of truth for what exists.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    AeadCore, Aes256Gcm, Nonce,
};
use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use hkdf::Hkdf;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::warn;

use crate::error::{MemoryError, Result};
use crate::kv::KeyValue;
use crate::pins::PinTracker;
use crate::tree::{FileRecord, TreeState};

use super::engine::{Flush, Substrate, TreeEngine};
use super::persisted::StoreScope;

/// Parse a 64-hex-char master key into raw bytes.
pub fn parse_master_key(hex_str: &str) -> Result<[u8; 32]> {
    let hex_str = hex_str.trim();
    if hex_str.len() != 64 {
        return Err(MemoryError::Crypto(
            "master key must be 64 hex characters".to_string(),
        ));
    }
    let bytes = hex::decode(hex_str)
        .map_err(|_| MemoryError::Crypto("master key must be valid hex".to_string()))?;
    let mut key = [0u8; 32];
    key.copy_from_slice(&bytes);
    Ok(key)
}

/// Derive the per-identity AES-256 key from the master key.
fn derive_store_key(master_key: &[u8; 32], namespace: &str) -> [u8; 32] {
    let hk = Hkdf::<Sha256>::new(None, master_key);
    let mut okm = [0u8; 32];
    let info = format!("membank-store-{namespace}");
    hk.expand(info.as_bytes(), &mut okm)
        .expect("HKDF expand should not fail for 32-byte output");
    okm
}

/// A sealed value: base64 nonce + base64 ciphertext.
#[derive(Serialize, Deserialize)]
struct SealedBox {
    n: String,
    c: String,
}

fn seal(key: &[u8; 32], plaintext: &str) -> Result<String> {
    let cipher = Aes256Gcm::new(key.into());
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext.as_bytes())
        .map_err(|e| MemoryError::Crypto(e.to_string()))?;

    let sealed = SealedBox {
        n: base64::engine::general_purpose::STANDARD.encode(nonce),
        c: base64::engine::general_purpose::STANDARD.encode(&ciphertext),
    };
    Ok(serde_json::to_string(&sealed)?)
}

fn open_sealed(key: &[u8; 32], raw: &str) -> Result<String> {
    let sealed: SealedBox = serde_json::from_str(raw)?;
    let nonce_bytes = base64::engine::general_purpose::STANDARD
        .decode(&sealed.n)
        .map_err(|e| MemoryError::Crypto(format!("base64 nonce: {e}")))?;
    let ciphertext = base64::engine::general_purpose::STANDARD
        .decode(&sealed.c)
        .map_err(|e| MemoryError::Crypto(format!("base64 ciphertext: {e}")))?;

    if nonce_bytes.len() != 12 {
        return Err(MemoryError::Crypto(format!(
            "nonce must be 12 bytes, got {}",
            nonce_bytes.len()
        )));
    }

    let cipher = Aes256Gcm::new(key.into());
    let nonce = Nonce::from_slice(&nonce_bytes);
    let plaintext = cipher
        .decrypt(nonce, ciphertext.as_ref())
        .map_err(|e| MemoryError::Crypto(e.to_string()))?;
    String::from_utf8(plaintext).map_err(|e| MemoryError::Crypto(e.to_string()))
}

/// Per-file metadata carried by the index instead of the sealed blobs.
#[derive(Serialize, Deserialize)]
struct IndexedFile {
    modified_at: DateTime<Utc>,
    accessed_at: DateTime<Utc>,
}

/// The side-channel metadata index: everything the store knows except
/// content. Kept consistent with every content write.
#[derive(Default, Serialize, Deserialize)]
struct MetaIndex {
    files: BTreeMap<String, IndexedFile>,
    dirs: BTreeSet<String>,
    summaries: BTreeMap<String, String>,
}

/// Physical substrate: sealed per-path content records plus the index blob.
pub struct SealedSubstrate {
    kv: Box<dyn KeyValue>,
    namespace: String,
    key: [u8; 32],
}

impl SealedSubstrate {
    fn index_key(&self) -> String {
        format!("{}/index", self.namespace)
    }

    fn content_key(&self, p: &str) -> String {
        format!("{}/file{p}", self.namespace)
    }

    async fn write_index(&mut self, state: &TreeState) -> Result<()> {
        let index = MetaIndex {
            files: state
                .files
                .iter()
                .map(|(p, r)| {
                    (
                        p.clone(),
                        IndexedFile {
                            modified_at: r.modified_at,
                            accessed_at: r.accessed_at,
                        },
                    )
                })
                .collect(),
            dirs: state.dirs.clone(),
            summaries: state.summaries.clone(),
        };
        let sealed = seal(&self.key, &serde_json::to_string(&index)?)?;
        self.kv.put(&self.index_key(), sealed).await
    }
}

#[async_trait]
impl Substrate for SealedSubstrate {
    async fn load(&mut self) -> Result<TreeState> {
        let index: MetaIndex = match self.kv.get(&self.index_key()).await? {
            Some(raw) => {
                let plain = open_sealed(&self.key, &raw)?;
                match serde_json::from_str(&plain) {
                    Ok(index) => index,
                    Err(e) => {
                        warn!("discarding unreadable memory index: {e}");
                        MetaIndex::default()
                    }
                }
            }
            None => MetaIndex::default(),
        };

        let mut files = BTreeMap::new();
        for (p, meta) in index.files {
            match self.kv.get(&self.content_key(&p)).await? {
                Some(raw) => match open_sealed(&self.key, &raw) {
                    Ok(content) => {
                        files.insert(
                            p,
                            FileRecord {
                                content,
                                modified_at: meta.modified_at,
                                accessed_at: meta.accessed_at,
                            },
                        );
                    }
                    Err(e) => warn!("dropping undecryptable entry {p}: {e}"),
                },
                None => warn!("index lists {p} but its content record is missing; dropping"),
            }
        }

        Ok(TreeState {
            files,
            dirs: index.dirs,
            summaries: index.summaries,
        })
    }

    async fn flush(&mut self, state: &TreeState, change: Flush<'_>) -> Result<()> {
        if let Flush::Content { written, removed } = change {
            for p in written {
                if let Some(record) = state.files.get(p) {
                    let sealed = seal(&self.key, &record.content)?;
                    self.kv.put(&self.content_key(p), sealed).await?;
                }
            }
            for p in removed {
                self.kv.remove(&self.content_key(p)).await?;
            }
        }
        // The index goes last so it never references a blob that was not
        // written yet.
        self.write_index(state).await
    }
}

/// Encrypted store: the shared engine over sealed records.
pub type EncryptedStore = TreeEngine<SealedSubstrate>;

impl TreeEngine<SealedSubstrate> {
    /// Open the sealed namespace owned by `scope`, deriving its key from
    /// the master key.
    pub async fn open(
        kv: Box<dyn KeyValue>,
        scope: StoreScope,
        master_key: &[u8; 32],
        pins: Arc<dyn PinTracker>,
    ) -> Result<Self> {
        let namespace = scope.namespace();
        let key = derive_store_key(master_key, &namespace);
        Self::open_with(
            SealedSubstrate {
                kv,
                namespace,
                key,
            },
            pins,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryStore;
    use crate::kv::JsonFileKv;
    use crate::pins::MemoryPinTracker;
    use std::path::Path;

    const MASTER: [u8; 32] = [0x42u8; 32];

    fn pins() -> Arc<dyn PinTracker> {
        Arc::new(MemoryPinTracker::new())
    }

    fn kv(dir: &Path) -> Box<dyn KeyValue> {
        Box::new(JsonFileKv::open(dir.join("kv.json")).unwrap())
    }

    #[test]
    fn test_parse_master_key() {
        let hex64 = "ab".repeat(32);
        assert_eq!(parse_master_key(&hex64).unwrap(), [0xabu8; 32]);
        assert!(parse_master_key("too-short").is_err());
        assert!(parse_master_key(&"zz".repeat(32)).is_err());
    }

    #[test]
    fn test_seal_round_trip() {
        let key = [0x07u8; 32];
        let sealed = seal(&key, "secret text — 日本語").unwrap();
        assert_eq!(open_sealed(&key, &sealed).unwrap(), "secret text — 日本語");
    }

    #[test]
    fn test_wrong_key_fails_to_open() {
        let sealed = seal(&[1u8; 32], "secret").unwrap();
        assert!(open_sealed(&[2u8; 32], &sealed).is_err());
    }

    #[test]
    fn test_derive_store_key_varies_by_namespace() {
        let a = derive_store_key(&MASTER, "membank/ws-a");
        let b = derive_store_key(&MASTER, "membank/ws-b");
        assert_ne!(a, b);
        assert_eq!(a, derive_store_key(&MASTER, "membank/ws-a"));
    }

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let scope = StoreScope::new("ws");

        let mut store = EncryptedStore::open(kv(tmp.path()), scope.clone(), &MASTER, pins())
            .await
            .unwrap();
        store
            .create("/memories/secret/plan.txt", "the plan")
            .await
            .unwrap();
        store
            .set_summary("/memories/secret/plan.txt", "a plan")
            .await
            .unwrap();
        drop(store);

        let mut store = EncryptedStore::open(kv(tmp.path()), scope, &MASTER, pins())
            .await
            .unwrap();
        assert_eq!(
            store.read_raw("/memories/secret/plan.txt").await.unwrap(),
            "the plan"
        );
        assert_eq!(
            store
                .summary_of("/memories/secret/plan.txt")
                .await
                .unwrap()
                .as_deref(),
            Some("a plan")
        );
    }

    #[tokio::test]
    async fn test_nothing_stored_in_plaintext() {
        let tmp = tempfile::tempdir().unwrap();
        let kv_file = tmp.path().join("kv.json");

        let mut store = EncryptedStore::open(
            Box::new(JsonFileKv::open(&kv_file).unwrap()),
            StoreScope::new("ws"),
            &MASTER,
            pins(),
        )
        .await
        .unwrap();
        store
            .create("/memories/secret.txt", "VERY-SECRET-CONTENT")
            .await
            .unwrap();
        store
            .set_summary("/memories/secret.txt", "OPAQUE-SUMMARY")
            .await
            .unwrap();
        drop(store);

        let raw = std::fs::read_to_string(&kv_file).unwrap();
        assert!(!raw.contains("VERY-SECRET-CONTENT"));
        assert!(!raw.contains("OPAQUE-SUMMARY"));
    }

    #[tokio::test]
    async fn test_wrong_master_key_fails_open() {
        let tmp = tempfile::tempdir().unwrap();
        let scope = StoreScope::new("ws");

        let mut store = EncryptedStore::open(kv(tmp.path()), scope.clone(), &MASTER, pins())
            .await
            .unwrap();
        store.create("/memories/a.txt", "x").await.unwrap();
        drop(store);

        let result = EncryptedStore::open(kv(tmp.path()), scope, &[0x99u8; 32], pins()).await;
        assert!(matches!(result, Err(MemoryError::Crypto(_))));
    }

    #[tokio::test]
    async fn test_delete_removes_content_records() {
        let tmp = tempfile::tempdir().unwrap();
        let kv_file = tmp.path().join("kv.json");
        let scope = StoreScope::new("ws");

        let mut store = EncryptedStore::open(
            Box::new(JsonFileKv::open(&kv_file).unwrap()),
            scope.clone(),
            &MASTER,
            pins(),
        )
        .await
        .unwrap();
        store.create("/memories/a.txt", "x").await.unwrap();
        store.delete("/memories/a.txt").await.unwrap();
        drop(store);

        let raw: std::collections::BTreeMap<String, String> =
            serde_json::from_str(&std::fs::read_to_string(&kv_file).unwrap()).unwrap();
        assert!(raw.keys().all(|k| !k.contains("/file/memories/a.txt")));

        let mut store = EncryptedStore::open(
            Box::new(JsonFileKv::open(&kv_file).unwrap()),
            scope,
            &MASTER,
            pins(),
        )
        .await
        .unwrap();
        assert!(store.read_raw("/memories/a.txt").await.is_err());
    }
}
