use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{job::Job, types::JobStatus, QueueError, QueueResult};

/// Body POSTed to a job's callback endpoint once it finished.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackPayload {
    pub job_id: String,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CallbackPayload {
    pub fn for_job(job: &Job) -> Self {
        Self {
            job_id: job.id().to_string(),
            status: job.status(),
            error: job.error().filter(|e| !e.is_empty()),
        }
    }
}

/// Delivers completion notifications. One attempt, no retry.
#[async_trait]
pub trait CallbackNotifier: Send + Sync {
    async fn notify(&self, endpoint: &Url, payload: &CallbackPayload) -> QueueResult<()>;
}

pub struct HttpCallbackNotifier {
    client: reqwest::Client,
}

impl HttpCallbackNotifier {
    pub fn new(timeout: Duration) -> QueueResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| QueueError::Callback(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl CallbackNotifier for HttpCallbackNotifier {
    async fn notify(&self, endpoint: &Url, payload: &CallbackPayload) -> QueueResult<()> {
        self.client
            .post(endpoint.clone())
            .json(payload)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| QueueError::Callback(e.to_string()))?;
        Ok(())
    }
}
