//! Server state

use std::sync::Arc;

use crate::deploy::pipeline::Pipeline;

/// Server state shared across handlers
pub struct ServerState {
    pub pipeline: Arc<Pipeline>,
}

impl ServerState {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self { pipeline }
    }
}
