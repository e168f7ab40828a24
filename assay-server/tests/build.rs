use std::path::Path;

use assay_core::AssayConfig;
use assay_server::{build, Settings};
use axum::body::Body;
use axum::http::Request;
use http_body_util::BodyExt;
use tower::ServiceExt;

fn settings(dir: &Path) -> Settings {
    let mut config = AssayConfig::new();
    config.set("assets.dir", dir.display().to_string());
    config.set("queue.results_dir", dir.join("results").display().to_string());
    config.set("queue.snapshot_path", dir.join("queue.snapshot").display().to_string());
    Settings::from_config(config, None).unwrap()
}

#[tokio::test]
async fn health_ok() {
    let tmp = tempfile::tempdir().unwrap();
    let ax = build(settings(tmp.path())).await.unwrap();

    let res = ax
        .router
        .oneshot(Request::builder().method("GET").uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(res.status().as_u16(), 200);
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(std::str::from_utf8(&bytes).unwrap(), "ok");
    assert!(tmp.path().join("results").is_dir());
}

#[tokio::test]
async fn queued_jobs_survive_a_rebuild() {
    let tmp = tempfile::tempdir().unwrap();

    let ax = build(settings(tmp.path())).await.unwrap();
    let res = ax
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/jobs")
                .header("content-type", "text/csv")
                .body(Body::from("case,activity\n1,A\n"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status().as_u16(), 201);
    assert!(tmp.path().join("queue.snapshot").is_file());
    drop(ax);

    let ax = build(settings(tmp.path())).await.unwrap();
    let jobs = ax.engine.jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].status(), assay_queue::JobStatus::Pending);
}

#[tokio::test]
async fn corrupt_snapshot_stops_startup() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("queue.snapshot"), b"not a snapshot").unwrap();

    assert!(build(settings(tmp.path())).await.is_err());
}
