pub mod ids;
pub mod input;
pub mod result;
pub mod status;

pub use ids::{Fingerprint, JobId};
pub use input::{ColumnMapping, JobInput, UPLOADED_INPUT_NAME};
pub use result::{CteImpact, JobResult, ReportItem, ResourceReportItem};
pub use status::JobStatus;
