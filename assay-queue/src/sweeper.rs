use std::sync::{Arc, Weak};
use std::time::Duration;

use tracing::{debug, info};

use crate::{job::Registry, QueueError, QueueResult};

/// Drops jobs older than the retention window, with their working directories.
///
/// Holds the registry weakly; sweeping after the registry was dropped is an
/// error rather than a silent no-op.
#[derive(Debug, Clone)]
pub struct RetentionSweeper {
    registry: Weak<Registry>,
    retention: Duration,
}

impl RetentionSweeper {
    pub fn new(registry: &Arc<Registry>, retention: Duration) -> Self {
        Self {
            registry: Arc::downgrade(registry),
            retention,
        }
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Run one sweep, returning how many jobs were removed.
    pub async fn sweep(&self) -> QueueResult<usize> {
        let registry = self
            .registry
            .upgrade()
            .ok_or_else(|| QueueError::InvalidState("registry is not available".to_string()))?;

        let removed = registry.clear_older_than(self.retention).await?;
        if removed > 0 {
            info!("Removed {} jobs past retention", removed);
        } else {
            debug!("No jobs past retention");
        }
        Ok(removed)
    }
}
