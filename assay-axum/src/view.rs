use assay_queue::{ColumnMapping, Job, JobId, JobInput, JobResult, JobStatus, QueueConfig};
use chrono::{DateTime, Utc};
use serde::Serialize;
use url::Url;

/// A job as clients see it.
#[derive(Debug, Clone, Serialize)]
pub struct JobView {
    pub id: JobId,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_csv: Option<Url>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_endpoint: Option<Url>,
    /// Where the input can be fetched: the remote URL, or the staged upload
    /// under the assets path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_log: Option<Url>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column_mapping: Option<ColumnMapping>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobView {
    pub fn new(job: &Job, config: &QueueConfig) -> Self {
        let event_log = match job.input() {
            JobInput::Remote { url } => Some(url.clone()),
            JobInput::Uploaded { file_name } => config.asset_url(job.id(), file_name).ok(),
        };

        Self {
            id: job.id().clone(),
            status: job.status(),
            error: job.error(),
            result: job.result(),
            report_csv: job.report_csv(),
            callback_endpoint: job.callback().cloned(),
            event_log,
            column_mapping: job.column_mapping().cloned(),
            created_at: job.created_at(),
            finished_at: job.completed_at(),
        }
    }
}

/// Body of `GET /jobs` and `DELETE /jobs`.
#[derive(Debug, Clone, Serialize)]
pub struct JobList {
    pub jobs: Vec<JobView>,
}

impl JobList {
    pub fn new<'a, I>(jobs: I, config: &QueueConfig) -> Self
    where
        I: IntoIterator<Item = &'a std::sync::Arc<Job>>,
    {
        Self {
            jobs: jobs.into_iter().map(|job| JobView::new(job, config)).collect(),
        }
    }

    pub fn empty() -> Self {
        Self { jobs: Vec::new() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uploaded_job_points_at_staged_input() {
        let config = QueueConfig::default();
        let job = Job::new_uploaded(None, None, &config.results_dir);

        let view = serde_json::to_value(JobView::new(&job, &config)).unwrap();

        assert_eq!(view["status"], "pending");
        assert_eq!(
            view["event_log"],
            format!("http://localhost:8080/assets/results/{}/event_log.csv", job.id())
        );
        assert!(view.get("finished_at").is_none());
        assert!(view.get("error").is_none());
        assert!(view.get("callback_endpoint").is_none());
    }

    #[test]
    fn remote_job_keeps_its_url_and_mapping() {
        let config = QueueConfig::default();
        let url = Url::parse("https://example.com/logs/a.csv").unwrap();
        let mapping = ColumnMapping::from_pairs(vec![("case", "CaseID")]);
        let job = Job::new_remote(url.clone(), None, Some(mapping), &config.results_dir);

        let view = serde_json::to_value(JobView::new(&job, &config)).unwrap();

        assert_eq!(view["event_log"], url.as_str());
        assert_eq!(view["column_mapping"]["case"], "CaseID");
        assert_eq!(view["id"], job.id().as_str());
    }
}
