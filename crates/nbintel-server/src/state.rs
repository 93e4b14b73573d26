//! Shared server state.

use nbintel_core::ChatService;
use std::sync::Arc;

/// State shared by all routes and WebSocket sessions.
#[derive(Clone)]
pub struct AppState {
    /// The chat orchestration service.
    pub service: Arc<ChatService>,
}

impl AppState {
    pub fn new(service: Arc<ChatService>) -> Self {
        Self { service }
    }
}
