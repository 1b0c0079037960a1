use crate::session::SessionOrchestrator;
use std::sync::Arc;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// The session orchestrator (owns the buffer and connection handle)
    pub orchestrator: Arc<SessionOrchestrator>,
}

impl AppState {
    pub fn new(orchestrator: Arc<SessionOrchestrator>) -> Self {
        Self { orchestrator }
    }
}
