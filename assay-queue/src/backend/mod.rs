//! Where registry snapshots live.

pub mod file;
pub mod memory;

use async_trait::async_trait;

use crate::QueueResult;

pub use file::FileSnapshotStore;
pub use memory::MemorySnapshotStore;

/// Storage for encoded registry snapshots
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Latest snapshot, or `None` when nothing was ever saved.
    async fn load(&self) -> QueueResult<Option<Vec<u8>>>;

    /// Replace the stored snapshot.
    async fn save(&self, bytes: &[u8]) -> QueueResult<()>;
}
