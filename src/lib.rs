pub mod backend;
pub mod editor;
pub mod error;
pub mod kv;
pub mod mirror;
pub mod path;
pub mod pins;
pub mod tool;
mod tree;

pub use backend::{
    DiskStore, EncryptedStore, EntryKind, MemoryEntry, MemoryStore, PersistedStore, StoreScope,
    ViewRange, VolatileStore,
};
pub use error::{MemoryError, Result};
pub use path::MEMORY_ROOT;
pub use pins::{MemoryPinTracker, PinTracker};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
