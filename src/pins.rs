//! Pin tracking — a sticky marker on entries, owned outside the store.
//!
//! Stores never decide what is pinned; they consult the tracker for
//! listings and notify it when entries move or disappear.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

/// Narrow interface the store consults and notifies.
pub trait PinTracker: Send + Sync {
    fn is_pinned(&self, path: &str) -> bool;

    fn pin(&self, path: &str);

    fn unpin(&self, path: &str);

    /// Called by stores for every entry that changes path during a rename.
    fn on_rename(&self, old_path: &str, new_path: &str);

    /// Called by stores for every file removed by a delete.
    fn on_remove(&self, path: &str);
}

/// In-process tracker backed by a mutex-guarded set.
#[derive(Default)]
pub struct MemoryPinTracker {
    pinned: Mutex<HashSet<String>>,
}

impl MemoryPinTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn set(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.pinned.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PinTracker for MemoryPinTracker {
    fn is_pinned(&self, path: &str) -> bool {
        self.set().contains(path)
    }

    fn pin(&self, path: &str) {
        self.set().insert(path.to_string());
    }

    fn unpin(&self, path: &str) {
        self.set().remove(path);
    }

    fn on_rename(&self, old_path: &str, new_path: &str) {
        let mut set = self.set();
        if set.remove(old_path) {
            set.insert(new_path.to_string());
        }
    }

    fn on_remove(&self, path: &str) {
        self.set().remove(path);
    }
}
