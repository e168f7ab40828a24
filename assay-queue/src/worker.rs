use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{engine::SHUTDOWN_REASON, QueueEngine, QueueError, QueueResult};

/// Handle for managing the worker lifecycle
pub struct WorkerHandle {
    shutdown: CancellationToken,
    join_handle: JoinHandle<QueueResult<()>>,
}

impl WorkerHandle {
    /// Stop the worker. A running analysis is interrupted, its job is
    /// failed and the registry persisted before this returns.
    pub async fn shutdown(self) -> QueueResult<()> {
        self.shutdown.cancel();
        self.join_handle
            .await
            .map_err(|e| QueueError::Internal(format!("Worker join error: {}", e)))?
    }
}

/// The single consumer of the registry. Processing one job at a time is
/// what keeps at most one job `running`.
pub(crate) struct Worker {
    engine: Arc<QueueEngine>,
    shutdown: CancellationToken,
}

impl Worker {
    pub(crate) fn spawn(engine: Arc<QueueEngine>) -> WorkerHandle {
        let shutdown = CancellationToken::new();
        let worker = Worker {
            engine,
            shutdown: shutdown.clone(),
        };
        let join_handle = tokio::spawn(worker.run());
        WorkerHandle {
            shutdown,
            join_handle,
        }
    }

    async fn run(self) -> QueueResult<()> {
        let idle = self.engine.config().idle_interval;
        info!("Worker started, idle interval {:?}", idle);

        while !self.shutdown.is_cancelled() {
            let step = self.engine.run_once();
            tokio::pin!(step);

            let processed = tokio::select! {
                processed = &mut step => processed,
                _ = self.shutdown.cancelled() => {
                    let interrupted = self.engine.interrupt_running(SHUTDOWN_REASON);
                    if interrupted > 0 {
                        info!("Interrupting {} running job(s) for shutdown", interrupted);
                    }
                    (&mut step).await
                }
            };

            if !processed {
                tokio::select! {
                    _ = self.shutdown.cancelled() => break,
                    _ = tokio::time::sleep(idle) => {}
                }
            }
        }

        info!("Worker stopped");
        Ok(())
    }
}
