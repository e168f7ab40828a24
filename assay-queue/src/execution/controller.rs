use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::time::Instant;
use tracing::{error, info, instrument, warn};

use super::{
    AnalysisRequest, AnalysisRunner, CallbackNotifier, CallbackPayload, InputFetcher, ResultParser,
};
use crate::{
    config::QueueConfig,
    fingerprint::fingerprint_file,
    job::{Job, Registry},
    types::{JobId, JobInput, JobStatus},
    QueueError, QueueResult,
};

/// Diagnostic recorded when a job reaches processing in the wrong state.
pub const NOT_PENDING: &str = "job is not pending";

/// Error recorded on a job removed from the registry just before it started.
pub const CLEARED_BEFORE_START: &str = "job was cleared before it started";

/// How a processed job ended when nothing went wrong.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    /// The outcome of the named job was reused.
    Duplicate(JobId),
}

/// Takes one job from `pending` to a terminal state.
pub struct ExecutionController {
    registry: Arc<Registry>,
    config: QueueConfig,
    runner: Arc<dyn AnalysisRunner>,
    fetcher: Arc<dyn InputFetcher>,
    parser: Arc<dyn ResultParser>,
    notifier: Arc<dyn CallbackNotifier>,
}

impl ExecutionController {
    pub fn new(
        registry: Arc<Registry>,
        config: QueueConfig,
        runner: Arc<dyn AnalysisRunner>,
        fetcher: Arc<dyn InputFetcher>,
        parser: Arc<dyn ResultParser>,
        notifier: Arc<dyn CallbackNotifier>,
    ) -> Self {
        Self {
            registry,
            config,
            runner,
            fetcher,
            parser,
            notifier,
        }
    }

    /// Process `job`. Every failure ends up on the job itself.
    #[instrument(skip(self, job), fields(job_id = %job.id()))]
    pub async fn process(&self, job: &Arc<Job>) {
        if let Err(e) = job.start() {
            self.reject_not_pending(job, e);
            return;
        }
        // a clear that ran before the start removed the job and its input
        if self.registry.find_by_id(job.id().as_str()).is_none() {
            warn!("{}", CLEARED_BEFORE_START);
            let _ = job.fail(CLEARED_BEFORE_START);
            return;
        }
        info!("job started");

        match self.execute(job).await {
            Ok(Outcome::Completed) => info!("job completed"),
            Ok(Outcome::Duplicate(source)) => info!(source = %source, "job is a duplicate"),
            Err(e) => {
                error!("job failed: {}", e);
                if let Err(t) = job.fail(e.to_string()) {
                    warn!("could not record failure: {}", t);
                }
            }
        }

        self.notify(job).await;
    }

    fn reject_not_pending(&self, job: &Job, err: QueueError) {
        let status = job.status();
        error!(%status, "{}: {}", NOT_PENDING, err);
        if status == JobStatus::Running {
            let _ = job.fail(NOT_PENDING);
        } else {
            job.append_error(NOT_PENDING);
        }
    }

    async fn execute(&self, job: &Arc<Job>) -> QueueResult<Outcome> {
        let deadline = Instant::now() + self.config.job_timeout;

        let input_path = tokio::select! {
            staged = self.stage_input(job) => staged?,
            _ = job.cancellation().cancelled() => return Err(self.cancelled(job)),
            _ = tokio::time::sleep_until(deadline) => {
                warn!("input staging exceeded the deadline");
                return Err(self.deadline_exceeded());
            }
        };

        match fingerprint_file(&input_path).await {
            Ok(computed) => {
                if !job.set_fingerprint(computed.clone()) {
                    warn!("fingerprint changed since first computed");
                }
                // the first recorded fingerprint is the one the index knows
                let fingerprint = job.fingerprint().unwrap_or(computed);
                if let Some(source) = self.registry.dedup_source(&fingerprint, job.id()) {
                    job.mark_duplicate(&source)?;
                    return Ok(Outcome::Duplicate(source.id().clone()));
                }
            }
            Err(e) => warn!("skipping deduplication: {}", e),
        }

        // the script runs from its own directory
        let request = AnalysisRequest {
            job_id: job.id().clone(),
            input_path: absolute(&input_path)?,
            work_dir: absolute(job.dir())?,
            column_mapping: job.column_mapping().cloned(),
        };
        self.run_with_deadline(job, &request, deadline).await?;

        let stem = job.input_stem();
        let report = self.config.report_url(job.id(), &stem)?;
        let result = self.parser.parse(job.dir(), &stem).await?;
        job.complete(Some(report), result)?;
        Ok(Outcome::Completed)
    }

    /// Make the input available in the working directory.
    async fn stage_input(&self, job: &Job) -> QueueResult<PathBuf> {
        let path = job.input_path();
        match job.input() {
            JobInput::Uploaded { .. } => {
                let staged = tokio::fs::try_exists(&path)
                    .await
                    .map_err(|e| QueueError::io(format!("stat {}", path.display()), e))?;
                if !staged {
                    return Err(QueueError::Io(format!(
                        "staged input {} is missing",
                        path.display()
                    )));
                }
            }
            JobInput::Remote { url } => {
                tokio::fs::create_dir_all(job.dir())
                    .await
                    .map_err(|e| QueueError::io(format!("create {}", job.dir().display()), e))?;
                let bytes = self.fetcher.fetch(url, &path).await?;
                info!(url = %url, bytes, "input staged");
            }
        }
        Ok(path)
    }

    /// Run the analysis, interrupting it at the deadline or on cancellation.
    async fn run_with_deadline(
        &self,
        job: &Job,
        request: &AnalysisRequest,
        deadline: Instant,
    ) -> QueueResult<()> {
        let token = job.cancellation().child_token();

        let run = self.runner.run(request, token.clone());
        tokio::pin!(run);

        let result = tokio::select! {
            result = &mut run => result,
            _ = tokio::time::sleep_until(deadline) => {
                warn!(timeout = ?self.config.job_timeout, "analysis exceeded its deadline");
                token.cancel();
                let _ = (&mut run).await;
                return Err(self.deadline_exceeded());
            }
        };

        match result {
            Err(QueueError::Interrupted(_)) if job.cancellation().is_cancelled() => {
                Err(self.cancelled(job))
            }
            other => other,
        }
    }

    fn cancelled(&self, job: &Job) -> QueueError {
        QueueError::Interrupted(job.interrupt_reason().unwrap_or_else(|| "cancelled".to_string()))
    }

    fn deadline_exceeded(&self) -> QueueError {
        QueueError::Interrupted(format!("exceeded the {:?} deadline", self.config.job_timeout))
    }

    async fn notify(&self, job: &Job) {
        let Some(endpoint) = job.callback() else {
            return;
        };
        let payload = CallbackPayload::for_job(job);
        match self.notifier.notify(endpoint, &payload).await {
            Ok(()) => info!(endpoint = %endpoint, "callback delivered"),
            Err(e) => {
                warn!(endpoint = %endpoint, "callback failed: {}", e);
                job.append_error(e.to_string());
            }
        }
    }
}

fn absolute(path: &Path) -> QueueResult<PathBuf> {
    std::path::absolute(path).map_err(|e| QueueError::io(format!("resolve {}", path.display()), e))
}
