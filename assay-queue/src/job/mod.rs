//! The job entity and its state machine.
//!
//! A [`Job`] is shared between the registry, the worker and the HTTP layer
//! through `Arc<Job>`. Its identity (id, creation time, input, callback,
//! working directory) never changes; everything that does change lives in a
//! single [`JobState`] behind one mutex so readers never see a half-applied
//! transition.

pub mod registry;

pub use registry::Registry;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::{
    types::{ColumnMapping, Fingerprint, JobId, JobInput, JobResult, JobStatus},
    QueueError, QueueResult,
};

/// Error recorded on a pending job cancelled through the API.
pub const CANCELLED_BY_USER: &str = "job cancelled by user";

/// What [`Job::cancel`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The job was pending and is now failed.
    Cancelled,
    /// The job is running; its task is being interrupted.
    Requested,
}

#[derive(Debug, Clone)]
struct JobState {
    status: JobStatus,
    fingerprint: Option<Fingerprint>,
    result: Option<JobResult>,
    report_csv: Option<Url>,
    error: Option<String>,
    completed_at: Option<DateTime<Utc>>,
    interrupt_reason: Option<String>,
}

/// Plain, serializable copy of a job at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub status: JobStatus,
    pub input: JobInput,
    pub callback: Option<Url>,
    pub column_mapping: Option<ColumnMapping>,
    pub dir: PathBuf,
    pub fingerprint: Option<Fingerprint>,
    pub result: Option<JobResult>,
    pub report_csv: Option<Url>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct Job {
    id: JobId,
    created_at: DateTime<Utc>,
    input: JobInput,
    callback: Option<Url>,
    column_mapping: Option<ColumnMapping>,
    dir: PathBuf,
    state: Mutex<JobState>,
    cancel: CancellationToken,
}

impl Job {
    /// Create a pending job whose working directory is `results_dir/<id>`.
    pub fn new(
        input: JobInput,
        callback: Option<Url>,
        column_mapping: Option<ColumnMapping>,
        results_dir: &Path,
    ) -> Self {
        let id = JobId::new();
        let dir = results_dir.join(id.as_str());
        Self {
            id,
            created_at: Utc::now(),
            input,
            callback,
            column_mapping: column_mapping.filter(|m| !m.is_empty()),
            dir,
            state: Mutex::new(JobState {
                status: JobStatus::Pending,
                fingerprint: None,
                result: None,
                report_csv: None,
                error: None,
                completed_at: None,
                interrupt_reason: None,
            }),
            cancel: CancellationToken::new(),
        }
    }

    pub fn new_remote(
        url: Url,
        callback: Option<Url>,
        column_mapping: Option<ColumnMapping>,
        results_dir: &Path,
    ) -> Self {
        Self::new(JobInput::Remote { url }, callback, column_mapping, results_dir)
    }

    pub fn new_uploaded(
        callback: Option<Url>,
        column_mapping: Option<ColumnMapping>,
        results_dir: &Path,
    ) -> Self {
        Self::new(JobInput::uploaded(), callback, column_mapping, results_dir)
    }

    /// Rebuild a job from a persisted record.
    ///
    /// `completed_at` is normalized so that it is present exactly when the
    /// status is terminal.
    pub fn from_record(record: JobRecord) -> Self {
        let completed_at = if record.status.is_terminal() {
            record.completed_at.or(Some(record.created_at))
        } else {
            None
        };
        Self {
            id: record.id,
            created_at: record.created_at,
            input: record.input,
            callback: record.callback,
            column_mapping: record.column_mapping,
            dir: record.dir,
            state: Mutex::new(JobState {
                status: record.status,
                fingerprint: record.fingerprint,
                result: record.result,
                report_csv: record.report_csv,
                error: record.error,
                completed_at,
                interrupt_reason: None,
            }),
            cancel: CancellationToken::new(),
        }
    }

    pub fn record(&self) -> JobRecord {
        let state = self.state.lock().clone();
        JobRecord {
            id: self.id.clone(),
            status: state.status,
            input: self.input.clone(),
            callback: self.callback.clone(),
            column_mapping: self.column_mapping.clone(),
            dir: self.dir.clone(),
            fingerprint: state.fingerprint,
            result: state.result,
            report_csv: state.report_csv,
            error: state.error,
            created_at: self.created_at,
            completed_at: state.completed_at,
        }
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn input(&self) -> &JobInput {
        &self.input
    }

    pub fn callback(&self) -> Option<&Url> {
        self.callback.as_ref()
    }

    pub fn column_mapping(&self) -> Option<&ColumnMapping> {
        self.column_mapping.as_ref()
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the staged input inside the working directory.
    pub fn input_path(&self) -> PathBuf {
        self.dir.join(self.input.file_name())
    }

    /// Input file name without its extension; analysis outputs are named after it.
    pub fn input_stem(&self) -> String {
        let name = self.input.file_name();
        Path::new(&name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or(name)
    }

    pub fn status(&self) -> JobStatus {
        self.state.lock().status
    }

    pub fn error(&self) -> Option<String> {
        self.state.lock().error.clone()
    }

    pub fn result(&self) -> Option<JobResult> {
        self.state.lock().result.clone()
    }

    pub fn report_csv(&self) -> Option<Url> {
        self.state.lock().report_csv.clone()
    }

    pub fn fingerprint(&self) -> Option<Fingerprint> {
        self.state.lock().fingerprint.clone()
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.state.lock().completed_at
    }

    /// Token that interrupts this job's external task.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    fn transition<F>(&self, next: JobStatus, apply: F) -> QueueResult<()>
    where
        F: FnOnce(&mut JobState),
    {
        let mut state = self.state.lock();
        if !state.status.can_transition_to(next) {
            return Err(QueueError::InvalidTransition {
                from: state.status,
                to: next,
            });
        }
        state.status = next;
        apply(&mut state);
        if next.is_terminal() && state.completed_at.is_none() {
            state.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    /// `pending -> running`
    pub fn start(&self) -> QueueResult<()> {
        self.transition(JobStatus::Running, |_| {})
    }

    /// `running -> completed`
    pub fn complete(&self, report_csv: Option<Url>, result: JobResult) -> QueueResult<()> {
        self.transition(JobStatus::Completed, |state| {
            state.report_csv = report_csv;
            state.result = Some(result);
        })
    }

    /// `pending | running -> failed`
    pub fn fail(&self, message: impl Into<String>) -> QueueResult<()> {
        let message = message.into();
        self.transition(JobStatus::Failed, |state| state.error = Some(message))
    }

    /// `running -> duplicate`, inheriting the outcome of `source`.
    pub fn mark_duplicate(&self, source: &Job) -> QueueResult<()> {
        let inherited = source.state.lock().clone();
        self.transition(JobStatus::Duplicate, |state| {
            state.result = inherited.result;
            state.report_csv = inherited.report_csv;
            state.error = inherited.error;
        })
    }

    /// Record the input fingerprint. Returns `false` if a different
    /// fingerprint was already set; the first one is kept.
    pub fn set_fingerprint(&self, fingerprint: Fingerprint) -> bool {
        let mut state = self.state.lock();
        match &state.fingerprint {
            Some(existing) => *existing == fingerprint,
            None => {
                state.fingerprint = Some(fingerprint);
                true
            }
        }
    }

    /// Record an error without touching the status.
    pub fn append_error(&self, message: impl AsRef<str>) {
        let mut state = self.state.lock();
        state.error = Some(match state.error.take() {
            Some(existing) if !existing.is_empty() => format!("{}; {}", existing, message.as_ref()),
            _ => message.as_ref().to_string(),
        });
    }

    /// Interrupt the task of a running job. Returns `false` if the job is
    /// not running.
    pub fn interrupt(&self, reason: impl Into<String>) -> bool {
        let mut state = self.state.lock();
        if state.status != JobStatus::Running {
            return false;
        }
        state.interrupt_reason.get_or_insert_with(|| reason.into());
        self.cancel.cancel();
        true
    }

    /// Why the running task was interrupted, if it was.
    pub fn interrupt_reason(&self) -> Option<String> {
        self.state.lock().interrupt_reason.clone()
    }

    /// Cancel a pending job outright, or interrupt a running one.
    pub fn cancel(&self) -> QueueResult<CancelOutcome> {
        let mut state = self.state.lock();
        match state.status {
            JobStatus::Pending => {
                state.status = JobStatus::Failed;
                state.error = Some(CANCELLED_BY_USER.to_string());
                state.completed_at = Some(Utc::now());
                Ok(CancelOutcome::Cancelled)
            }
            JobStatus::Running => {
                state
                    .interrupt_reason
                    .get_or_insert_with(|| "cancelled by user".to_string());
                self.cancel.cancel();
                Ok(CancelOutcome::Requested)
            }
            status => Err(QueueError::InvalidState(format!(
                "job cannot be cancelled, it is {}",
                status
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote_job() -> Job {
        Job::new_remote(
            Url::parse("https://example.com/logs/PurchasingExample.csv").unwrap(),
            None,
            None,
            Path::new("/tmp/assay-results"),
        )
    }

    #[test]
    fn new_job_is_pending_in_its_own_dir() {
        let job = remote_job();
        assert_eq!(job.status(), JobStatus::Pending);
        assert!(job.completed_at().is_none());
        assert_eq!(job.dir(), Path::new("/tmp/assay-results").join(job.id().as_str()));
        assert_eq!(job.input_stem(), "PurchasingExample");
        assert!(job.input_path().ends_with("PurchasingExample.csv"));
    }

    #[test]
    fn completion_sets_finish_time_once() {
        let job = remote_job();
        job.start().unwrap();
        assert!(job.completed_at().is_none());

        job.complete(None, JobResult::default()).unwrap();
        let finished = job.completed_at().expect("terminal job has completed_at");
        assert_eq!(job.status(), JobStatus::Completed);

        assert!(job.fail("late").is_err());
        assert_eq!(job.completed_at(), Some(finished));
        assert_eq!(job.status(), JobStatus::Completed);
    }

    #[test]
    fn pending_job_cannot_complete_directly() {
        let job = remote_job();
        let err = job.complete(None, JobResult::default()).unwrap_err();
        assert!(matches!(
            err,
            QueueError::InvalidTransition { from: JobStatus::Pending, to: JobStatus::Completed }
        ));
        assert!(job.completed_at().is_none());
    }

    #[test]
    fn duplicate_inherits_source_outcome() {
        let source = remote_job();
        source.start().unwrap();
        let report = Url::parse("http://localhost:8080/assets/results/x/a_transitions_report.csv").unwrap();
        let result = JobResult { num_cases: 3.0, ..Default::default() };
        source.complete(Some(report.clone()), result.clone()).unwrap();

        let dup = remote_job();
        dup.start().unwrap();
        dup.mark_duplicate(&source).unwrap();

        assert_eq!(dup.status(), JobStatus::Duplicate);
        assert_eq!(dup.report_csv(), Some(report));
        assert_eq!(dup.result(), Some(result));
        assert!(dup.completed_at().is_some());
    }

    #[test]
    fn fingerprint_is_stable_once_set() {
        let job = remote_job();
        assert!(job.set_fingerprint(Fingerprint::from("aa")));
        assert!(job.set_fingerprint(Fingerprint::from("aa")));
        assert!(!job.set_fingerprint(Fingerprint::from("bb")));
        assert_eq!(job.fingerprint(), Some(Fingerprint::from("aa")));
    }

    #[test]
    fn cancel_depends_on_status() {
        let pending = remote_job();
        assert_eq!(pending.cancel().unwrap(), CancelOutcome::Cancelled);
        assert_eq!(pending.status(), JobStatus::Failed);
        assert_eq!(pending.error().as_deref(), Some(CANCELLED_BY_USER));
        assert!(pending.completed_at().is_some());
        assert!(matches!(pending.cancel(), Err(QueueError::InvalidState(_))));

        let running = remote_job();
        running.start().unwrap();
        assert_eq!(running.cancel().unwrap(), CancelOutcome::Requested);
        assert!(running.cancellation().is_cancelled());
        assert_eq!(running.status(), JobStatus::Running);
        assert_eq!(running.interrupt_reason().as_deref(), Some("cancelled by user"));
    }

    #[test]
    fn interrupt_only_reaches_running_jobs() {
        let job = remote_job();
        assert!(!job.interrupt("shutting down"));
        assert!(!job.cancellation().is_cancelled());

        job.start().unwrap();
        assert!(job.interrupt("shutting down"));
        assert!(job.interrupt("again"));
        assert_eq!(job.interrupt_reason().as_deref(), Some("shutting down"));
    }

    #[test]
    fn append_error_keeps_status_and_history() {
        let job = remote_job();
        job.start().unwrap();
        job.fail("boom").unwrap();
        job.append_error("callback delivery failed");
        assert_eq!(job.status(), JobStatus::Failed);
        assert_eq!(job.error().as_deref(), Some("boom; callback delivery failed"));
    }

    #[test]
    fn record_round_trip_normalizes_finish_time() {
        let job = remote_job();
        let mut record = job.record();
        record.status = JobStatus::Failed;
        record.completed_at = None;

        let restored = Job::from_record(record.clone());
        assert_eq!(restored.id(), job.id());
        assert_eq!(restored.created_at(), job.created_at());
        assert_eq!(restored.completed_at(), Some(job.created_at()));

        record.status = JobStatus::Pending;
        record.completed_at = Some(Utc::now());
        assert!(Job::from_record(record).completed_at().is_none());
    }
}
