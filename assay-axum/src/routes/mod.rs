pub mod api_doc;
pub mod callback;
pub mod jobs;

use axum::{
    extract::rejection::{BytesRejection, JsonRejection},
    http::StatusCode,
};
use assay_core::AssayError;
use serde_json::json;

use crate::AssayAxumError;

pub(crate) fn map_json_rejection(rejection: JsonRejection) -> AssayAxumError {
    AssayError::bad_request("Failed to parse the request body as JSON")
        .with_errors(json!({"_schema": [rejection.body_text()]}))
        .into_anyhow()
        .into()
}

pub(crate) fn map_json_error(err: serde_json::Error) -> AssayAxumError {
    AssayError::bad_request("Failed to parse the request body as JSON")
        .with_errors(json!({"_schema": [err.to_string()]}))
        .into_anyhow()
        .into()
}

/// Oversized bodies become `PayloadTooLarge`, anything else `BadRequest`.
pub(crate) fn map_body_rejection(rejection: BytesRejection) -> AssayAxumError {
    let err = if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AssayError::payload_too_large("Request body is too large")
    } else {
        AssayError::bad_request("Failed to read the request body")
    };
    err.with_errors(json!({"_schema": [rejection.body_text()]}))
        .into_anyhow()
        .into()
}

pub async fn hello() -> &'static str {
    "Hello World!"
}

pub async fn health() -> &'static str {
    "ok"
}
