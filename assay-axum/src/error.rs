use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use assay_core::AssayError;
use assay_queue::QueueError;

#[derive(Debug)]
pub struct AssayAxumError(pub anyhow::Error);

impl From<anyhow::Error> for AssayAxumError {
    fn from(e: anyhow::Error) -> Self {
        Self(e)
    }
}

impl From<AssayError> for AssayAxumError {
    fn from(e: AssayError) -> Self {
        Self(e.into_anyhow())
    }
}

impl From<QueueError> for AssayAxumError {
    fn from(e: QueueError) -> Self {
        queue_error(e).into()
    }
}

/// Classify a queue error for HTTP clients.
pub fn queue_error(err: QueueError) -> AssayError {
    let message = err.to_string();
    let mapped = match &err {
        QueueError::InvalidArgument(_)
        | QueueError::InvalidState(_)
        | QueueError::InvalidTransition { .. } => AssayError::bad_request(message),
        QueueError::DuplicateIdentifier(_) | QueueError::ResourceBusy(_) => {
            AssayError::conflict(message)
        }
        QueueError::NotFound(_) => AssayError::not_found(message),
        QueueError::Fetch(_) | QueueError::Callback(_) => AssayError::bad_gateway(message),
        _ => AssayError::general_error(message),
    };
    mapped.with_source(err.into())
}

impl IntoResponse for AssayAxumError {
    fn into_response(self) -> Response {
        // If it's an AssayError (even if wrapped by anyhow contexts), preserve its fields
        if let Some(err) = AssayError::from_anyhow(&self.0) {
            let safe = err.sanitize_for_client();
            let status = StatusCode::from_u16(safe.code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            return (status, Json(safe.to_json())).into_response();
        }

        if let Some(err) = self.0.chain().find_map(|e| e.downcast_ref::<QueueError>()) {
            let safe = queue_error(err.clone()).sanitize_for_client();
            let status = StatusCode::from_u16(safe.code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            return (status, Json(safe.to_json())).into_response();
        }

        let err = AssayError::general_error(self.0.to_string());
        let safe = err.sanitize_for_client();
        let status = StatusCode::from_u16(safe.code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(safe.to_json())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assay_core::ErrorKind;

    #[test]
    fn queue_errors_map_to_http_classes() {
        let cases = [
            (QueueError::invalid_argument("x"), ErrorKind::BadRequest),
            (QueueError::InvalidState("x".into()), ErrorKind::BadRequest),
            (QueueError::DuplicateIdentifier("x".into()), ErrorKind::Conflict),
            (QueueError::ResourceBusy("x".into()), ErrorKind::Conflict),
            (QueueError::NotFound("x".into()), ErrorKind::NotFound),
            (QueueError::Io("disk".into()), ErrorKind::GeneralError),
        ];
        for (err, kind) in cases {
            assert_eq!(queue_error(err).kind, kind);
        }
    }

    #[test]
    fn message_keeps_queue_wording() {
        let err = queue_error(QueueError::NotFound("abc".into()));
        assert_eq!(err.message, "Job not found: abc");
    }
}
