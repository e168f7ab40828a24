pub mod config;

use std::sync::Arc;

use anyhow::{Context, Result};
use assay_axum::AssayApp;
use assay_queue::QueueEngine;
use tracing::info;

pub use config::Settings;

/// Open the queue (restoring its snapshot) and mount the HTTP routes.
///
/// The worker is not started; callers own its lifecycle.
pub async fn build(settings: Settings) -> Result<AssayApp> {
    tokio::fs::create_dir_all(&settings.queue.results_dir)
        .await
        .with_context(|| format!("create {}", settings.queue.results_dir.display()))?;

    let engine = QueueEngine::builder(settings.queue)
        .with_scripts(settings.runner)
        .open()
        .await
        .context("open analysis queue")?;
    info!("Queue ready with {} jobs", engine.registry().len());

    Ok(AssayApp::new(Arc::new(engine), settings.http))
}
