//! assay-axum: HTTP surface of the analysis queue.
//!
//! Jobs are submitted, listed, inspected and cancelled under `/jobs`; the
//! reports the analysis writes are served from `/assets`.

pub mod app;
pub mod routes;
pub mod state;
pub mod view;
mod error;
pub use error::{queue_error, AssayAxumError};
pub use state::AssayState;
pub use view::{JobList, JobView};

pub use app::{AssayApp, HttpOptions, DEFAULT_BODY_LIMIT};
