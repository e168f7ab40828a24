//! assay-core: structured errors and key/value configuration shared by
//! the queue engine, the HTTP layer and the server binary.

pub mod config;
pub mod errors;

pub use config::{AssayConfig, AssayConfigSnapshot};
pub use errors::{AssayError, AssayResult, ErrorKind};
