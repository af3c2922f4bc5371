//! The six-verb tool surface exposed to a model host.
//!
//! One tool, dispatched on `command`. Paths that omit the reserved root are
//! implicitly rooted before they reach the store. Errors come back as
//! `Error: …` text in the tool result, never as a transport failure.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::debug;

use crate::backend::{MemoryStore, ViewRange};
use crate::path;

/// Trait for agent tools.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name used in function calls.
    fn name(&self) -> &str;

    /// Description of what the tool does.
    fn description(&self) -> &str;

    /// JSON Schema for tool parameters.
    fn parameters(&self) -> serde_json::Value;

    /// Execute the tool with given parameters.
    async fn execute(&self, params: HashMap<String, serde_json::Value>) -> String;
}

/// The memory tool: view/create/str_replace/insert/delete/rename over one
/// store. The store is behind a mutex because the contract is one operation
/// at a time — the lock serializes callers, the store itself never locks.
pub struct MemoryTool {
    store: Arc<Mutex<Box<dyn MemoryStore>>>,
}

impl MemoryTool {
    pub fn new(store: Box<dyn MemoryStore>) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
        }
    }

    async fn dispatch(&self, params: &HashMap<String, serde_json::Value>) -> Option<String> {
        let command = str_param(params, "command")?;
        debug!("memory tool: {command}");
        let mut store = self.store.lock().await;

        let result = match command {
            "view" => {
                let p = rooted_param(params, "path")?;
                let range = view_range_param(params);
                store.view(&p, range).await
            }
            "create" => {
                let p = rooted_param(params, "path")?;
                let file_text = str_param(params, "file_text")?;
                store.create(&p, file_text).await
            }
            "str_replace" => {
                let p = rooted_param(params, "path")?;
                let old_str = str_param(params, "old_str")?;
                let new_str = str_param(params, "new_str")?;
                store.replace(&p, old_str, new_str).await
            }
            "insert" => {
                let p = rooted_param(params, "path")?;
                let insert_line = params.get("insert_line").and_then(|v| v.as_i64())?;
                let insert_text = str_param(params, "insert_text")?;
                store.insert(&p, insert_line, insert_text).await
            }
            "delete" => {
                let p = rooted_param(params, "path")?;
                store.delete(&p).await
            }
            "rename" => {
                let old = rooted_param(params, "old_path")?;
                let new = rooted_param(params, "new_path")?;
                store.rename(&old, &new).await
            }
            other => return Some(format!("Error: unknown command '{other}'")),
        };

        Some(match result {
            Ok(message) => message,
            Err(e) => format!("Error: {e}"),
        })
    }
}

fn str_param<'a>(params: &'a HashMap<String, serde_json::Value>, key: &str) -> Option<&'a str> {
    params.get(key).and_then(|v| v.as_str())
}

fn rooted_param(params: &HashMap<String, serde_json::Value>, key: &str) -> Option<String> {
    str_param(params, key).map(path::ensure_rooted)
}

fn view_range_param(params: &HashMap<String, serde_json::Value>) -> Option<ViewRange> {
    let range = params.get("view_range")?.as_array()?;
    match (range.first()?.as_i64(), range.get(1)?.as_i64()) {
        (Some(start), Some(end)) => Some((start, end)),
        _ => None,
    }
}

#[async_trait]
impl Tool for MemoryTool {
    fn name(&self) -> &str {
        "memory"
    }

    fn description(&self) -> &str {
        "Store, view and edit small text files under /memories that persist across conversations."
    }

    fn parameters(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "enum": ["view", "create", "str_replace", "insert", "delete", "rename"],
                    "description": "The operation to run"
                },
                "path": {
                    "type": "string",
                    "description": "Path under /memories (all commands except rename)"
                },
                "view_range": {
                    "type": "array",
                    "items": { "type": "integer" },
                    "description": "Optional [start, end] line range for view; end -1 means end of file"
                },
                "file_text": {
                    "type": "string",
                    "description": "Full file content for create"
                },
                "old_str": {
                    "type": "string",
                    "description": "Exact text to replace for str_replace; must occur exactly once"
                },
                "new_str": {
                    "type": "string",
                    "description": "Replacement text for str_replace"
                },
                "insert_line": {
                    "type": "integer",
                    "description": "0-based line index for insert; 0 inserts at the top"
                },
                "insert_text": {
                    "type": "string",
                    "description": "Text to insert as a new line"
                },
                "old_path": {
                    "type": "string",
                    "description": "Source path for rename"
                },
                "new_path": {
                    "type": "string",
                    "description": "Destination path for rename"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, params: HashMap<String, serde_json::Value>) -> String {
        match self.dispatch(&params).await {
            Some(result) => result,
            None => "Error: missing or invalid parameters for command".to_string(),
        }
    }
}
