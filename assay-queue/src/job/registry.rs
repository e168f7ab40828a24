use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use tracing::{debug, warn};

use super::{Job, JobRecord};
use crate::{
    types::{Fingerprint, JobId, JobStatus},
    QueueError, QueueResult,
};

/// Error recorded on jobs found running when a snapshot is restored.
pub const INTERRUPTED_BY_RESTART: &str = "job interrupted by restart";

/// In-memory collection of every known job.
///
/// One lock guards the collection. Lookups take the read side; `next`,
/// `add` and the clear operations take the write side. Per-job state has
/// its own lock, always acquired after the collection lock.
#[derive(Debug, Default)]
pub struct Registry {
    jobs: RwLock<Vec<Arc<Job>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(Vec::new()),
        }
    }

    /// Register a job.
    pub fn add(&self, job: Arc<Job>) -> QueueResult<()> {
        if job.id().is_blank() {
            return Err(QueueError::invalid_argument("job identifier is empty"));
        }

        let mut jobs = self.jobs.write();
        if jobs
            .iter()
            .any(|existing| Arc::ptr_eq(existing, &job) || existing.id() == job.id())
        {
            return Err(QueueError::DuplicateIdentifier(job.id().to_string()));
        }
        debug!(job_id = %job.id(), "job registered");
        jobs.push(job);
        Ok(())
    }

    pub fn find_by_id(&self, id: &str) -> Option<Arc<Job>> {
        self.jobs
            .read()
            .iter()
            .find(|job| job.id().as_str() == id)
            .cloned()
    }

    /// First job whose input has this fingerprint, whatever its status.
    pub fn find_by_fingerprint(&self, fingerprint: &Fingerprint) -> Option<Arc<Job>> {
        self.jobs
            .read()
            .iter()
            .find(|job| job.fingerprint().as_ref() == Some(fingerprint))
            .cloned()
    }

    /// Job whose outcome a new job with `fingerprint` may reuse.
    ///
    /// Only `completed` and `duplicate` jobs qualify, and never `exclude`
    /// itself.
    pub fn dedup_source(&self, fingerprint: &Fingerprint, exclude: &JobId) -> Option<Arc<Job>> {
        self.jobs
            .read()
            .iter()
            .filter(|job| job.id() != exclude)
            .filter(|job| matches!(job.status(), JobStatus::Completed | JobStatus::Duplicate))
            .find(|job| job.fingerprint().as_ref() == Some(fingerprint))
            .cloned()
    }

    /// Oldest pending job. The job stays in the registry.
    pub fn next(&self) -> Option<Arc<Job>> {
        let mut jobs = self.jobs.write();
        jobs.sort_by_key(|job| job.created_at());
        jobs.iter()
            .find(|job| job.status() == JobStatus::Pending)
            .cloned()
    }

    /// All jobs, oldest first.
    pub fn jobs(&self) -> Vec<Arc<Job>> {
        let mut jobs = self.jobs.read().clone();
        jobs.sort_by_key(|job| job.created_at());
        jobs
    }

    pub fn running(&self) -> Vec<Arc<Job>> {
        self.jobs
            .read()
            .iter()
            .filter(|job| job.status() == JobStatus::Running)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.read().is_empty()
    }

    /// Remove every job and delete their working directories.
    ///
    /// Fails with `ResourceBusy`, leaving the registry untouched, while a job
    /// is running. Directory deletion failures are reported after all
    /// removals were attempted.
    pub async fn clear(&self) -> QueueResult<Vec<Arc<Job>>> {
        let removed = {
            let mut jobs = self.jobs.write();
            if let Some(running) = jobs.iter().find(|job| job.status() == JobStatus::Running) {
                return Err(QueueError::ResourceBusy(format!(
                    "job {} is running",
                    running.id()
                )));
            }
            std::mem::take(&mut *jobs)
        };

        remove_working_dirs(&removed).await?;
        Ok(removed)
    }

    /// Remove jobs created more than `age` ago and delete their working
    /// directories. A running job is never evicted. A window reaching past
    /// the earliest representable time removes nothing.
    pub async fn clear_older_than(&self, age: Duration) -> QueueResult<usize> {
        let Some(cutoff) = chrono::Duration::from_std(age)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age))
        else {
            debug!(?age, "retention window reaches past any job");
            return Ok(0);
        };

        let removed = {
            let mut jobs = self.jobs.write();
            let (old, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut *jobs)
                .into_iter()
                .partition(|job| job.created_at() < cutoff && job.status() != JobStatus::Running);
            *jobs = kept;
            old
        };

        remove_working_dirs(&removed).await?;
        Ok(removed.len())
    }

    /// Records of every job, oldest first.
    pub fn records(&self) -> Vec<JobRecord> {
        self.jobs().iter().map(|job| job.record()).collect()
    }

    /// Load persisted records, returning how many were registered.
    ///
    /// Records without an identifier or with an identifier already present
    /// are skipped. Jobs persisted while running cannot resume and are
    /// failed.
    pub fn restore(&self, records: Vec<JobRecord>) -> usize {
        let mut restored = 0;
        for record in records {
            if record.id.is_blank() {
                warn!("skipping snapshot record without identifier");
                continue;
            }
            let job = Arc::new(Job::from_record(record));
            if job.status() == JobStatus::Running {
                // running -> failed is a legal transition
                let _ = job.fail(INTERRUPTED_BY_RESTART);
            }
            match self.add(job) {
                Ok(()) => restored += 1,
                Err(e) => warn!("skipping snapshot record: {}", e),
            }
        }
        restored
    }
}

async fn remove_working_dirs(jobs: &[Arc<Job>]) -> QueueResult<()> {
    let mut failures = Vec::new();
    for job in jobs {
        match tokio::fs::remove_dir_all(job.dir()).await {
            Ok(()) => debug!(job_id = %job.id(), "removed working directory"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => failures.push(format!("{}: {}", job.dir().display(), e)),
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(QueueError::Io(format!(
            "failed to remove {} working directories: {}",
            failures.len(),
            failures.join(", ")
        )))
    }
}
