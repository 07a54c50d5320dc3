//! Shared application state.
//!
//! Holds the webhook request processor handed to every actix worker.

use std::sync::Arc;

use crate::processor::RequestProcessor;

pub struct AppState {
    pub processor: Arc<RequestProcessor>,
}

impl AppState {
    pub fn new(processor: Arc<RequestProcessor>) -> Self {
        Self { processor }
    }
}
