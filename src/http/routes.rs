use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Session lifecycle
        .route("/sessions/start", post(handlers::start_session))
        .route("/sessions/pause", post(handlers::pause_session))
        .route("/sessions/resume", post(handlers::resume_session))
        .route("/sessions/end/:session_id", post(handlers::end_session))
        .route("/sessions/current", get(handlers::current_session))
        // Display buffer reads
        .route("/buffer", get(handlers::get_buffer))
        .route("/buffer/stats", get(handlers::get_buffer_stats))
        .route("/buffer/export", get(handlers::export_buffer))
        // Connection quality
        .route("/connection", get(handlers::get_connection))
        // Browser UI collaborators live on another origin
        .layer(CorsLayer::permissive())
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
