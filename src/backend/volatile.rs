//! Process-local adapter. Contents live in memory and are lost on exit.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::pins::PinTracker;
use crate::tree::TreeState;

use super::engine::{Flush, Substrate, TreeEngine};

/// Substrate with no physical medium at all.
pub struct MemSubstrate;

#[async_trait]
impl Substrate for MemSubstrate {
    async fn load(&mut self) -> Result<TreeState> {
        Ok(TreeState::default())
    }

    async fn flush(&mut self, _state: &TreeState, _change: Flush<'_>) -> Result<()> {
        Ok(())
    }
}

/// Volatile store: the shared engine over an empty substrate.
pub type VolatileStore = TreeEngine<MemSubstrate>;

impl TreeEngine<MemSubstrate> {
    pub fn new(pins: Arc<dyn PinTracker>) -> Self {
        Self::from_parts(TreeState::default(), MemSubstrate, pins)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryStore;
    use crate::pins::MemoryPinTracker;

    fn store() -> VolatileStore {
        VolatileStore::new(Arc::new(MemoryPinTracker::new()))
    }

    #[tokio::test]
    async fn test_fresh_store_has_empty_root() {
        let mut s = store();
        let listing = s.view("/memories", None).await.unwrap();
        assert_eq!(listing, "Directory: /memories\n(empty)");
    }

    #[tokio::test]
    async fn test_two_instances_share_nothing() {
        let mut a = store();
        a.create("/memories/a.txt", "x").await.unwrap();

        let mut b = store();
        assert!(b.read_raw("/memories/a.txt").await.is_err());
    }
}
