//! # assay-queue
//!
//! A single-worker queue for long-running analysis jobs.
//!
//! Jobs are submitted with a remote or uploaded input, persisted in a
//! snapshot, and processed strictly one at a time in creation order by an
//! external analysis task. Inputs identical to an already analysed one are
//! not re-run: the new job reuses the earlier outcome. Every run has a hard
//! deadline, running jobs can be cancelled individually, and jobs past a
//! retention window are swept together with their files.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use assay_queue::{QueueConfig, QueueEngine, JobSubmission};
//!
//! # async fn demo() -> assay_queue::QueueResult<()> {
//! let engine = Arc::new(QueueEngine::builder(QueueConfig::default()).open().await?);
//! let worker = engine.start_worker();
//!
//! let job = engine
//!     .submit_remote(JobSubmission {
//!         event_log: "https://example.com/logs/PurchasingExample.csv".to_string(),
//!         ..Default::default()
//!     })
//!     .await?;
//! println!("queued {}", job.id());
//!
//! worker.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod execution;
pub mod fingerprint;
pub mod job;
pub mod sweeper;
pub mod types;
pub mod worker;

pub use config::QueueConfig;
pub use engine::{JobSubmission, QueueEngine, QueueEngineBuilder};
pub use error::{QueueError, QueueResult};
pub use job::{CancelOutcome, Job, JobRecord, Registry};
pub use sweeper::RetentionSweeper;
pub use types::*;
pub use worker::WorkerHandle;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        backend::{FileSnapshotStore, MemorySnapshotStore, SnapshotStore},
        execution::{
            AnalysisRequest, AnalysisRunner, CallbackNotifier, CallbackPayload, InputFetcher,
            ResultParser, ScriptRunnerConfig,
        },
        CancelOutcome, ColumnMapping, Job, JobId, JobInput, JobResult, JobStatus, JobSubmission,
        QueueConfig, QueueEngine, QueueError, QueueResult, WorkerHandle,
    };
}
