//! HTTP API server for external collaborators (session UI, display layer)
//!
//! This module provides a REST API over the live session core:
//! - POST /sessions/start - Start a new tutoring session
//! - POST /sessions/pause, /sessions/resume - Toggle forwarding
//! - POST /sessions/end/:id - End a session
//! - GET /sessions/current - Live session summary
//! - GET /buffer, /buffer/stats, /buffer/export - Display buffer reads
//! - GET /connection - Connection state and quality
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
