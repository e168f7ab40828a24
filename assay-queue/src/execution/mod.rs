//! Turning a dequeued job into a finished one: input staging, content
//! deduplication, the external analysis under a deadline, result parsing
//! and callback delivery.

pub mod callback;
pub mod controller;
pub mod fetch;
pub mod results;
pub mod runner;

pub use callback::{CallbackNotifier, CallbackPayload, HttpCallbackNotifier};
pub use controller::{ExecutionController, Outcome, NOT_PENDING};
pub use fetch::{HttpFetcher, InputFetcher};
pub use results::{ResultParser, TransitionsReportParser};
pub use runner::{AnalysisRequest, AnalysisRunner, ScriptRunner, ScriptRunnerConfig};
