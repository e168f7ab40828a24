use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use super::SnapshotStore;
use crate::{QueueError, QueueResult};

/// Snapshot kept in a single file, replaced atomically on every save.
pub struct FileSnapshotStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "snapshot".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn load(&self) -> QueueResult<Option<Vec<u8>>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(QueueError::io(format!("read {}", self.path.display()), e)),
        }
    }

    async fn save(&self, bytes: &[u8]) -> QueueResult<()> {
        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| QueueError::io(format!("create {}", parent.display()), e))?;
        }

        let tmp = self.temp_path();
        let mut file = tokio::fs::File::create(&tmp)
            .await
            .map_err(|e| QueueError::io(format!("create {}", tmp.display()), e))?;
        file.write_all(bytes)
            .await
            .map_err(|e| QueueError::io(format!("write {}", tmp.display()), e))?;
        file.sync_all()
            .await
            .map_err(|e| QueueError::io(format!("sync {}", tmp.display()), e))?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| QueueError::io(format!("rename to {}", self.path.display()), e))?;
        debug!(path = %self.path.display(), size = bytes.len(), "snapshot saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn absent_file_loads_as_none() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(tmp.path().join("queue.snapshot"));
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_creates_parents_and_replaces() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(tmp.path().join("nested/dir/queue.snapshot"));

        store.save(b"first").await.unwrap();
        store.save(b"second").await.unwrap();

        assert_eq!(store.load().await.unwrap().as_deref(), Some(&b"second"[..]));
        assert!(!store.temp_path().exists());
    }

    #[tokio::test]
    async fn unreadable_path_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        // a directory where the file should be
        let store = FileSnapshotStore::new(tmp.path());
        assert!(matches!(store.load().await, Err(QueueError::Io(_))));
    }
}
