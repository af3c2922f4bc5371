//! Mirror collaborator: reflect the whole store into one external document.
//!
//! Consumes only `list_all` and `read_raw`. Mirror failures are logged and
//! swallowed here — they must never make a memory operation appear to fail.

use async_trait::async_trait;
use tracing::warn;

use crate::backend::{EntryKind, MemoryStore};
use crate::error::Result;
use crate::path::MEMORY_ROOT;

/// Receiver for the rendered document.
#[async_trait]
pub trait MirrorSink: Send + Sync {
    async fn write_document(&self, document: &str) -> Result<()>;
}

/// Render the store as one markdown document: a listing of every entry,
/// then each file's content in a fenced block.
pub async fn render_document(store: &mut dyn MemoryStore) -> Result<String> {
    let entries = store.list_all().await?;

    let mut doc = format!("# Memory ({MEMORY_ROOT})\n");
    for entry in &entries {
        match entry.kind {
            EntryKind::Directory => doc.push_str(&format!("\n- {}/", entry.path)),
            EntryKind::File => doc.push_str(&format!("\n- {}", entry.path)),
        }
        if entry.pinned {
            doc.push_str(" (pinned)");
        }
    }
    doc.push('\n');

    for entry in &entries {
        if entry.kind != EntryKind::File {
            continue;
        }
        let content = store.read_raw(&entry.path).await?;
        doc.push_str(&format!("\n## {}\n\n```\n{content}\n```\n", entry.path));
    }
    Ok(doc)
}

/// Push a snapshot of the store into the sink, best-effort.
pub async fn mirror_to(store: &mut dyn MemoryStore, sink: &dyn MirrorSink) {
    let doc = match render_document(store).await {
        Ok(doc) => doc,
        Err(e) => {
            warn!("memory mirror skipped, snapshot failed: {e}");
            return;
        }
    };
    if let Err(e) = sink.write_document(&doc).await {
        warn!("memory mirror write failed: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::VolatileStore;
    use crate::error::MemoryError;
    use crate::pins::MemoryPinTracker;
    use std::sync::{Arc, Mutex};

    struct RecordingSink {
        documents: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MirrorSink for RecordingSink {
        async fn write_document(&self, document: &str) -> Result<()> {
            self.documents.lock().unwrap().push(document.to_string());
            Ok(())
        }
    }

    struct FailingSink;

    #[async_trait]
    impl MirrorSink for FailingSink {
        async fn write_document(&self, _document: &str) -> Result<()> {
            Err(MemoryError::Storage("sink unavailable".into()))
        }
    }

    async fn seeded_store() -> VolatileStore {
        let pins = Arc::new(MemoryPinTracker::new());
        let mut store = VolatileStore::new(pins);
        store
            .create("/memories/notes.txt", "Hello world")
            .await
            .unwrap();
        store
            .create("/memories/a/nested.txt", "deep")
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_document_covers_every_file() {
        let mut store = seeded_store().await;
        let doc = render_document(&mut store).await.unwrap();
        assert!(doc.contains("- /memories/a/"));
        assert!(doc.contains("## /memories/notes.txt"));
        assert!(doc.contains("Hello world"));
        assert!(doc.contains("## /memories/a/nested.txt"));
        assert!(doc.contains("deep"));
    }

    #[tokio::test]
    async fn test_mirror_delivers_document() {
        let mut store = seeded_store().await;
        let sink = RecordingSink {
            documents: Mutex::new(Vec::new()),
        };
        mirror_to(&mut store, &sink).await;
        let documents = sink.documents.lock().unwrap();
        assert_eq!(documents.len(), 1);
        assert!(documents[0].contains("Hello world"));
    }

    #[tokio::test]
    async fn test_sink_failure_never_propagates() {
        let mut store = seeded_store().await;
        // Must not panic or surface the error in any way.
        mirror_to(&mut store, &FailingSink).await;
        // The store is still fully usable afterwards.
        assert_eq!(
            store.read_raw("/memories/notes.txt").await.unwrap(),
            "Hello world"
        );
    }
}
