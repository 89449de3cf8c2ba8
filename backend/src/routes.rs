// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method},
    routing::{get, post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{history, progression, quiz},
    state::AppState,
};

/// Assembles the main application router.
///
/// * Quiz tests: open/resume, retry, submit, replay, attempt history.
/// * Progression checkpoints.
/// * Applies global middleware (Trace, CORS).
pub fn create_router(state: AppState) -> Router {
    let origins: Vec<HeaderValue> = state
        .config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([axum::http::header::CONTENT_TYPE]);

    let quiz_test_routes = Router::new()
        .route("/", post(quiz::create_quiz_test))
        .route("/retry", post(quiz::create_retry_quiz_test))
        .route("/history", post(history::retrieve_attempt_history))
        .route("/{set_id}/answers", post(quiz::submit_answer))
        .route("/{set_id}/submissions", get(quiz::list_submissions));

    let progression_routes = Router::new().route(
        "/",
        put(progression::upsert_progression).get(progression::get_progression),
    );

    Router::new()
        .nest("/api/quiz-tests", quiz_test_routes)
        .nest("/api/progressions", progression_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
