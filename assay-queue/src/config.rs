use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::{types::JobId, QueueError, QueueResult};

/// Suffix of the analysis outputs, appended to the input file stem.
pub const REPORT_SUFFIX: &str = "_transitions_report";

/// Configuration for the queue engine
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Parent of every job's working directory
    pub results_dir: PathBuf,
    /// URL path under which `results_dir` is served
    pub results_url_path: String,
    /// Registry snapshot file
    pub snapshot_path: PathBuf,
    /// Codec used when writing snapshots (`msgpack` or `json`)
    pub snapshot_codec: String,
    /// Worker sleep when no job is pending
    pub idle_interval: Duration,
    /// Hard wall-clock limit for one analysis
    pub job_timeout: Duration,
    /// Jobs older than this are swept
    pub retention: Duration,
    /// Base of the public URLs handed out for reports and staged inputs
    pub public_url: String,
    /// Timeout of a single callback delivery
    pub callback_timeout: Duration,
    /// Longest wait for a connection or for more data of a remote input
    pub fetch_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            results_dir: PathBuf::from("assets/results"),
            results_url_path: "assets/results".to_string(),
            snapshot_path: PathBuf::from("assets/queue.snapshot"),
            snapshot_codec: "msgpack".to_string(),
            idle_interval: Duration::from_secs(60),
            job_timeout: Duration::from_secs(4 * 60 * 60),
            retention: Duration::from_secs(31 * 24 * 60 * 60),
            public_url: "http://localhost:8080/".to_string(),
            callback_timeout: Duration::from_secs(30),
            fetch_timeout: Duration::from_secs(60),
        }
    }
}

impl QueueConfig {
    /// Public URL of `file_name` inside the working directory of `job_id`.
    pub fn asset_url(&self, job_id: &JobId, file_name: &str) -> QueueResult<Url> {
        let mut base = Url::parse(&self.public_url).map_err(|e| {
            QueueError::invalid_argument(format!("public URL {:?}: {}", self.public_url, e))
        })?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let relative = format!(
            "{}/{}/{}",
            self.results_url_path.trim_matches('/'),
            job_id,
            file_name
        );
        base.join(&relative)
            .map_err(|e| QueueError::invalid_argument(format!("asset URL for {}: {}", job_id, e)))
    }

    /// Public URL of the CSV report produced for an input named `stem`.
    pub fn report_url(&self, job_id: &JobId, stem: &str) -> QueueResult<Url> {
        self.asset_url(job_id, &format!("{}{}.csv", stem, REPORT_SUFFIX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_deployment_layout() {
        let config = QueueConfig::default();
        assert_eq!(config.job_timeout, Duration::from_secs(14_400));
        assert_eq!(config.retention, Duration::from_secs(2_678_400));
        assert_eq!(config.idle_interval, Duration::from_secs(60));
    }

    #[test]
    fn report_url_points_at_results_assets() {
        let config = QueueConfig::default();
        let id = JobId::from("3f1c");
        assert_eq!(
            config.report_url(&id, "PurchasingExample").unwrap().as_str(),
            "http://localhost:8080/assets/results/3f1c/PurchasingExample_transitions_report.csv"
        );
    }

    #[test]
    fn asset_url_keeps_base_path() {
        let config = QueueConfig {
            public_url: "https://analysis.example.org/waiting-time".to_string(),
            ..Default::default()
        };
        assert_eq!(
            config.asset_url(&JobId::from("j1"), "event_log.csv").unwrap().as_str(),
            "https://analysis.example.org/waiting-time/assets/results/j1/event_log.csv"
        );
    }

    #[test]
    fn unparsable_public_url_is_an_error() {
        let config = QueueConfig {
            public_url: "not a url".to_string(),
            ..Default::default()
        };
        let err = config.report_url(&JobId::from("j1"), "log").unwrap_err();
        assert!(matches!(err, QueueError::InvalidArgument(_)));
    }
}
