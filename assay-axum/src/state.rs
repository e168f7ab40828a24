use std::sync::Arc;

use assay_queue::QueueEngine;

/// Shared handler state: the queue engine.
#[derive(Clone)]
pub struct AssayState {
    pub engine: Arc<QueueEngine>,
}

impl AssayState {
    pub fn new(engine: Arc<QueueEngine>) -> Self {
        Self { engine }
    }
}
