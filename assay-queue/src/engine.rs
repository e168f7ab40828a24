use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use url::Url;

use crate::{
    backend::{FileSnapshotStore, SnapshotStore},
    codec::CodecRegistry,
    config::QueueConfig,
    execution::{
        AnalysisRunner, CallbackNotifier, ExecutionController, HttpCallbackNotifier, HttpFetcher,
        InputFetcher, ResultParser, ScriptRunner, ScriptRunnerConfig, TransitionsReportParser,
    },
    fingerprint::fingerprint_bytes,
    job::{CancelOutcome, Job, Registry},
    sweeper::RetentionSweeper,
    types::ColumnMapping,
    worker::{Worker, WorkerHandle},
    QueueError, QueueResult,
};

/// Reason recorded on a job interrupted because the worker stops.
pub const SHUTDOWN_REASON: &str = "worker shutting down";

/// A request to analyse a remote input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobSubmission {
    pub event_log: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_mapping: Option<ColumnMapping>,
}

fn parse_http_url(field: &str, value: &str) -> QueueResult<Url> {
    let value = value.trim();
    if value.is_empty() {
        return Err(QueueError::invalid_argument(format!("{} is required", field)));
    }
    let url = Url::parse(value)
        .map_err(|e| QueueError::invalid_argument(format!("{} is not a valid URL: {}", field, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(QueueError::invalid_argument(format!(
            "{} must be an http(s) URL, got {}",
            field, other
        ))),
    }
}

/// Validate an optional callback endpoint.
pub fn parse_callback(value: Option<&str>) -> QueueResult<Option<Url>> {
    value
        .filter(|v| !v.trim().is_empty())
        .map(|v| parse_http_url("callback_endpoint", v))
        .transpose()
}

/// Builder wiring the engine's collaborators; every one has a production default.
pub struct QueueEngineBuilder {
    config: QueueConfig,
    runner: Option<Arc<dyn AnalysisRunner>>,
    fetcher: Option<Arc<dyn InputFetcher>>,
    parser: Option<Arc<dyn ResultParser>>,
    notifier: Option<Arc<dyn CallbackNotifier>>,
    store: Option<Arc<dyn SnapshotStore>>,
}

impl QueueEngineBuilder {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            runner: None,
            fetcher: None,
            parser: None,
            notifier: None,
            store: None,
        }
    }

    pub fn with_runner(mut self, runner: Arc<dyn AnalysisRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    /// Use the script runner with `config`.
    pub fn with_scripts(self, config: ScriptRunnerConfig) -> Self {
        self.with_runner(Arc::new(ScriptRunner::new(config)))
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn InputFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn with_parser(mut self, parser: Arc<dyn ResultParser>) -> Self {
        self.parser = Some(parser);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn CallbackNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Build the engine and restore the persisted registry.
    ///
    /// A missing snapshot starts an empty queue; an unreadable one is an error.
    pub async fn open(self) -> QueueResult<QueueEngine> {
        let mut codecs = CodecRegistry::new();
        codecs.set_default_codec(&self.config.snapshot_codec)?;

        let notifier: Arc<dyn CallbackNotifier> = match self.notifier {
            Some(notifier) => notifier,
            None => Arc::new(HttpCallbackNotifier::new(self.config.callback_timeout)?),
        };
        let fetcher: Arc<dyn InputFetcher> = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(HttpFetcher::new(self.config.fetch_timeout)?),
        };
        let store: Arc<dyn SnapshotStore> = self
            .store
            .unwrap_or_else(|| Arc::new(FileSnapshotStore::new(self.config.snapshot_path.clone())));

        let registry = Arc::new(Registry::new());
        let controller = ExecutionController::new(
            registry.clone(),
            self.config.clone(),
            self.runner
                .unwrap_or_else(|| Arc::new(ScriptRunner::new(ScriptRunnerConfig::default()))),
            fetcher,
            self.parser.unwrap_or_else(|| Arc::new(TransitionsReportParser)),
            notifier,
        );
        let sweeper = RetentionSweeper::new(&registry, self.config.retention);

        let engine = QueueEngine {
            registry,
            controller,
            sweeper,
            store,
            codecs,
            persist_lock: tokio::sync::Mutex::new(()),
            config: self.config,
        };
        engine.load().await?;
        Ok(engine)
    }
}

/// The analysis queue: registry, persistence and the single-job pipeline.
pub struct QueueEngine {
    registry: Arc<Registry>,
    controller: ExecutionController,
    sweeper: RetentionSweeper,
    store: Arc<dyn SnapshotStore>,
    codecs: CodecRegistry,
    /// Serializes snapshot writes so a later save never carries older records.
    persist_lock: tokio::sync::Mutex<()>,
    config: QueueConfig,
}

impl QueueEngine {
    pub fn builder(config: QueueConfig) -> QueueEngineBuilder {
        QueueEngineBuilder::new(config)
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    async fn load(&self) -> QueueResult<usize> {
        let Some(bytes) = self.store.load().await? else {
            info!("No snapshot found, starting with an empty queue");
            return Ok(0);
        };
        let records = self.codecs.decode(&bytes)?;
        let restored = self.registry.restore(records);
        info!("Restored {} jobs from snapshot", restored);
        Ok(restored)
    }

    /// Write the registry to the snapshot store.
    pub async fn persist(&self) -> QueueResult<()> {
        let _guard = self.persist_lock.lock().await;
        let bytes = self.codecs.encode(&self.registry.records())?;
        self.store.save(&bytes).await
    }

    async fn persist_logged(&self) {
        if let Err(e) = self.persist().await {
            error!("Failed to persist queue: {}", e);
        }
    }

    /// Queue a remote input.
    #[instrument(skip(self, submission), fields(event_log = %submission.event_log))]
    pub async fn submit_remote(&self, submission: JobSubmission) -> QueueResult<Arc<Job>> {
        let url = parse_http_url("event_log", &submission.event_log)?;
        let callback = parse_callback(submission.callback_endpoint.as_deref())?;

        let job = Arc::new(Job::new_remote(
            url,
            callback,
            submission.column_mapping,
            &self.config.results_dir,
        ));
        self.registry.add(job.clone())?;
        info!(job_id = %job.id(), "job queued");
        self.persist_logged().await;
        Ok(job)
    }

    /// Queue an input received as raw bytes; it is staged immediately.
    #[instrument(skip(self, body, column_mapping, callback), fields(size = body.len()))]
    pub async fn submit_upload(
        &self,
        body: Bytes,
        column_mapping: Option<ColumnMapping>,
        callback: Option<Url>,
    ) -> QueueResult<Arc<Job>> {
        if body.is_empty() {
            return Err(QueueError::invalid_argument("request body is empty"));
        }

        let job = Arc::new(Job::new_uploaded(
            callback,
            column_mapping,
            &self.config.results_dir,
        ));
        if let Err(e) = stage_upload(&job, &body).await {
            let _ = tokio::fs::remove_dir_all(job.dir()).await;
            return Err(e);
        }
        job.set_fingerprint(fingerprint_bytes(&body));

        self.registry.add(job.clone())?;
        info!(job_id = %job.id(), "job queued");
        self.persist_logged().await;
        Ok(job)
    }

    pub fn get(&self, id: &str) -> QueueResult<Arc<Job>> {
        self.registry
            .find_by_id(id)
            .ok_or_else(|| QueueError::NotFound(id.to_string()))
    }

    /// All jobs, oldest first.
    pub fn jobs(&self) -> Vec<Arc<Job>> {
        self.registry.jobs()
    }

    /// Cancel a pending job or interrupt a running one.
    pub async fn cancel(&self, id: &str) -> QueueResult<(Arc<Job>, CancelOutcome)> {
        let job = self.get(id)?;
        let outcome = job.cancel()?;
        info!(job_id = %id, ?outcome, "job cancellation");
        if outcome == CancelOutcome::Cancelled {
            self.persist_logged().await;
        }
        Ok((job, outcome))
    }

    /// Remove every job and its files. Refused while a job is running.
    pub async fn clear(&self) -> QueueResult<usize> {
        let result = self.registry.clear().await;
        // jobs are gone even when some directories could not be removed
        if !matches!(result, Err(QueueError::ResourceBusy(_))) {
            self.persist_logged().await;
        }
        let removed = result?;
        info!("Cleared {} jobs", removed.len());
        Ok(removed.len())
    }

    /// Interrupt whatever is running, returning how many jobs were reached.
    pub fn interrupt_running(&self, reason: &str) -> usize {
        self.registry
            .running()
            .iter()
            .filter(|job| job.interrupt(reason))
            .count()
    }

    /// One worker iteration: sweep, take the oldest pending job, process it
    /// and persist. Returns `false` when there was nothing to do.
    pub async fn run_once(&self) -> bool {
        if let Err(e) = self.sweeper.sweep().await {
            warn!("Retention sweep failed: {}", e);
        }

        let Some(job) = self.registry.next() else {
            return false;
        };
        self.controller.process(&job).await;
        self.persist_logged().await;
        true
    }

    /// Spawn the single worker.
    pub fn start_worker(self: &Arc<Self>) -> WorkerHandle {
        Worker::spawn(Arc::clone(self))
    }
}

async fn stage_upload(job: &Job, body: &[u8]) -> QueueResult<()> {
    tokio::fs::create_dir_all(job.dir())
        .await
        .map_err(|e| QueueError::io(format!("create {}", job.dir().display()), e))?;
    let path = job.input_path();
    tokio::fs::write(&path, body)
        .await
        .map_err(|e| QueueError::io(format!("write {}", path.display()), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemorySnapshotStore;
    use crate::types::JobStatus;
    use async_trait::async_trait;

    /// Memory store that yields before writing, so concurrent saves interleave.
    #[derive(Default)]
    struct YieldingStore {
        inner: MemorySnapshotStore,
    }

    #[async_trait]
    impl SnapshotStore for YieldingStore {
        async fn load(&self) -> QueueResult<Option<Vec<u8>>> {
            self.inner.load().await
        }

        async fn save(&self, bytes: &[u8]) -> QueueResult<()> {
            for _ in 0..3 {
                tokio::task::yield_now().await;
            }
            self.inner.save(bytes).await
        }
    }

    async fn engine(store: Arc<MemorySnapshotStore>, dir: &std::path::Path) -> QueueEngine {
        QueueEngine::builder(QueueConfig {
            results_dir: dir.join("results"),
            ..Default::default()
        })
        .with_store(store)
        .open()
        .await
        .unwrap()
    }

    #[test]
    fn submission_urls_are_validated() {
        assert!(parse_http_url("event_log", "").is_err());
        assert!(parse_http_url("event_log", "not a url").is_err());
        assert!(parse_http_url("event_log", "ftp://x/y.csv").is_err());
        assert!(parse_http_url("event_log", "https://x/y.csv").is_ok());
        assert_eq!(parse_callback(Some("  ")).unwrap(), None);
        assert!(parse_callback(Some("mailto:a@b")).is_err());
    }

    #[tokio::test]
    async fn remote_submission_is_pending_and_persisted() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(MemorySnapshotStore::new());
        let engine = engine(store.clone(), tmp.path()).await;

        let job = engine
            .submit_remote(JobSubmission {
                event_log: "https://example.com/logs/a.csv".to_string(),
                callback_endpoint: Some("https://client.example/hook".to_string()),
                column_mapping: None,
            })
            .await
            .unwrap();

        assert_eq!(job.status(), JobStatus::Pending);
        assert_eq!(job.callback().unwrap().as_str(), "https://client.example/hook");
        assert!(store.saved().is_some());
        assert_eq!(engine.get(job.id().as_str()).unwrap().id(), job.id());
    }

    #[tokio::test]
    async fn empty_upload_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = engine(Arc::new(MemorySnapshotStore::new()), tmp.path()).await;
        let err = engine.submit_upload(Bytes::new(), None, None).await.unwrap_err();
        assert!(matches!(err, QueueError::InvalidArgument(_)));
        assert!(engine.jobs().is_empty());
    }

    #[tokio::test]
    async fn upload_is_staged_with_fingerprint() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = engine(Arc::new(MemorySnapshotStore::new()), tmp.path()).await;
        let body = Bytes::from_static(b"case,activity\n1,A\n");

        let job = engine.submit_upload(body.clone(), None, None).await.unwrap();

        assert_eq!(tokio::fs::read(job.input_path()).await.unwrap(), body.to_vec());
        assert_eq!(job.fingerprint(), Some(fingerprint_bytes(&body)));
    }

    #[tokio::test]
    async fn snapshot_survives_restart() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(MemorySnapshotStore::new());
        let first = engine(store.clone(), tmp.path()).await;
        let pending = first
            .submit_remote(JobSubmission {
                event_log: "https://example.com/a.csv".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        let cancelled = first
            .submit_remote(JobSubmission {
                event_log: "https://example.com/b.csv".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        first.cancel(cancelled.id().as_str()).await.unwrap();
        first.persist().await.unwrap();

        let second = engine(store, tmp.path()).await;
        let jobs = second.jobs();
        assert_eq!(jobs.len(), 2);
        let restored = second.get(pending.id().as_str()).unwrap();
        assert_eq!(restored.status(), JobStatus::Pending);
        assert_eq!(restored.created_at(), pending.created_at());
        let restored = second.get(cancelled.id().as_str()).unwrap();
        assert_eq!(restored.status(), JobStatus::Failed);
        assert_eq!(restored.completed_at(), cancelled.completed_at());
    }

    #[tokio::test]
    async fn corrupt_snapshot_fails_startup() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(MemorySnapshotStore::with_bytes(b"garbage".to_vec()));
        let result = QueueEngine::builder(QueueConfig {
            results_dir: tmp.path().to_path_buf(),
            ..Default::default()
        })
        .with_store(store)
        .open()
        .await;
        assert!(matches!(result, Err(QueueError::SnapshotCorrupt(_))));
    }

    #[tokio::test]
    async fn cancel_terminal_job_is_invalid_state() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = engine(Arc::new(MemorySnapshotStore::new()), tmp.path()).await;
        let job = engine
            .submit_upload(Bytes::from_static(b"x"), None, None)
            .await
            .unwrap();

        let (_, outcome) = engine.cancel(job.id().as_str()).await.unwrap();
        assert_eq!(outcome, CancelOutcome::Cancelled);
        assert!(matches!(
            engine.cancel(job.id().as_str()).await,
            Err(QueueError::InvalidState(_))
        ));
        assert!(matches!(engine.cancel("nope").await, Err(QueueError::NotFound(_))));
    }

    #[tokio::test]
    async fn idle_iteration_reports_nothing_done() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = engine(Arc::new(MemorySnapshotStore::new()), tmp.path()).await;
        assert!(!engine.run_once().await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_submissions_leave_the_latest_snapshot() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(YieldingStore::default());
        let engine = Arc::new(
            QueueEngine::builder(QueueConfig {
                results_dir: tmp.path().join("results"),
                ..Default::default()
            })
            .with_store(store.clone())
            .open()
            .await
            .unwrap(),
        );

        let mut tasks = Vec::new();
        for n in 0..16 {
            let engine = engine.clone();
            tasks.push(tokio::spawn(async move {
                engine
                    .submit_upload(Bytes::from(format!("case\n{}\n", n)), None, None)
                    .await
                    .unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let saved = store.inner.saved().unwrap();
        assert_eq!(CodecRegistry::new().decode(&saved).unwrap().len(), 16);
    }

    #[tokio::test]
    async fn clear_persists_even_when_a_directory_stays_behind() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(MemorySnapshotStore::new());
        let engine = engine(store.clone(), tmp.path()).await;
        let job = engine
            .submit_upload(Bytes::from_static(b"x"), None, None)
            .await
            .unwrap();
        tokio::fs::remove_dir_all(job.dir()).await.unwrap();
        tokio::fs::write(job.dir(), b"not a directory").await.unwrap();

        let err = engine.clear().await.unwrap_err();

        assert!(matches!(err, QueueError::Io(_)));
        assert!(engine.jobs().is_empty());
        let saved = store.saved().unwrap();
        assert!(CodecRegistry::new().decode(&saved).unwrap().is_empty());
    }
}
