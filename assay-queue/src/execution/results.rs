use std::path::Path;

use async_trait::async_trait;

use crate::{config::REPORT_SUFFIX, types::JobResult, QueueError, QueueResult};

/// Reads the structured outcome the analysis left in the working directory.
#[async_trait]
pub trait ResultParser: Send + Sync {
    async fn parse(&self, work_dir: &Path, stem: &str) -> QueueResult<JobResult>;
}

/// Parses `<stem>_transitions_report.json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransitionsReportParser;

#[async_trait]
impl ResultParser for TransitionsReportParser {
    async fn parse(&self, work_dir: &Path, stem: &str) -> QueueResult<JobResult> {
        let path = work_dir.join(format!("{}{}.json", stem, REPORT_SUFFIX));
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| QueueError::ParseFailed(format!("{}: {}", path.display(), e)))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| QueueError::ParseFailed(format!("{}: {}", path.display(), e)))
    }
}
