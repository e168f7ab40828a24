use axum::{extract::rejection::JsonRejection, Json};
use assay_queue::execution::CallbackPayload;
use tracing::info;

use crate::{routes::map_json_rejection, AssayAxumError};

/// Sample receiver for job callbacks; logs the notification and echoes it.
pub async fn receive_callback(
    payload: Result<Json<CallbackPayload>, JsonRejection>,
) -> Result<Json<CallbackPayload>, AssayAxumError> {
    let Json(payload) = payload.map_err(map_json_rejection)?;
    info!(
        job_id = %payload.job_id,
        status = %payload.status,
        error = payload.error.as_deref().unwrap_or(""),
        "callback received"
    );
    Ok(Json(payload))
}
