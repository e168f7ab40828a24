use std::collections::HashMap;

use axum::{
    extract::{rejection::BytesRejection, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    routing::get,
    Json, Router,
};
use assay_queue::{engine::parse_callback, CancelOutcome, ColumnMapping, JobSubmission};
use bytes::Bytes;
use tracing::debug;

use crate::{
    routes::{map_body_rejection, map_json_error},
    view::{JobList, JobView},
    AssayAxumError, AssayState,
};

pub fn router() -> Router<AssayState> {
    Router::new()
        .route("/", get(list_jobs).post(create_job).delete(clear_jobs))
        .route("/{id}", get(get_job))
        .route("/{id}/cancel", get(cancel_job).post(cancel_job))
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|mime| {
            let mime = mime.trim();
            mime.eq_ignore_ascii_case("application/json") || mime.ends_with("+json")
        })
        .unwrap_or(false)
}

async fn list_jobs(State(state): State<AssayState>) -> Json<JobList> {
    let jobs = state.engine.jobs();
    Json(JobList::new(&jobs, state.engine.config()))
}

/// JSON bodies describe a remote input; anything else is the input itself,
/// with the column mapping taken from the query string.
async fn create_job(
    State(state): State<AssayState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    body: Result<Bytes, BytesRejection>,
) -> Result<(StatusCode, Json<JobView>), AssayAxumError> {
    let body = body.map_err(map_body_rejection)?;
    let job = if is_json(&headers) {
        let submission: JobSubmission = serde_json::from_slice(&body).map_err(map_json_error)?;
        state.engine.submit_remote(submission).await?
    } else {
        let mapping =
            ColumnMapping::from_pairs(query.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        let callback = parse_callback(query.get("callback_endpoint").map(String::as_str))?;
        debug!(size = body.len(), "raw event log upload");
        state.engine.submit_upload(body, Some(mapping), callback).await?
    };

    Ok((
        StatusCode::CREATED,
        Json(JobView::new(&job, state.engine.config())),
    ))
}

async fn clear_jobs(State(state): State<AssayState>) -> Result<Json<JobList>, AssayAxumError> {
    state.engine.clear().await?;
    Ok(Json(JobList::empty()))
}

async fn get_job(
    State(state): State<AssayState>,
    Path(id): Path<String>,
) -> Result<Json<JobView>, AssayAxumError> {
    let job = state.engine.get(&id)?;
    Ok(Json(JobView::new(&job, state.engine.config())))
}

async fn cancel_job(
    State(state): State<AssayState>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<JobView>), AssayAxumError> {
    let (job, outcome) = state.engine.cancel(&id).await?;
    let status = match outcome {
        CancelOutcome::Cancelled => StatusCode::OK,
        // the worker fails the job once the analysis is down
        CancelOutcome::Requested => StatusCode::ACCEPTED,
    };
    Ok((status, Json(JobView::new(&job, state.engine.config()))))
}
