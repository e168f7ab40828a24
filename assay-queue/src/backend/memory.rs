use async_trait::async_trait;
use parking_lot::RwLock;

use super::SnapshotStore;
use crate::QueueResult;

/// Snapshot kept in memory, for tests and throwaway engines.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    bytes: RwLock<Option<Vec<u8>>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with existing snapshot bytes.
    pub fn with_bytes(bytes: Vec<u8>) -> Self {
        Self {
            bytes: RwLock::new(Some(bytes)),
        }
    }

    pub fn saved(&self) -> Option<Vec<u8>> {
        self.bytes.read().clone()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn load(&self) -> QueueResult<Option<Vec<u8>>> {
        Ok(self.bytes.read().clone())
    }

    async fn save(&self, bytes: &[u8]) -> QueueResult<()> {
        *self.bytes.write() = Some(bytes.to_vec());
        Ok(())
    }
}
