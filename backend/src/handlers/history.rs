// src/handlers/history.rs

use axum::{Json, extract::State, response::IntoResponse};
use tokio_util::sync::CancellationToken;

use crate::{
    error::AppError, models::attempt_history::AttemptHistoryRequest,
    services::attempt_history, state::AppState,
};

/// Attempt summaries with learning time and crown tier per study plan item.
///
/// Event-log retrieval is cancelled when the deadline passes or the client
/// goes away.
pub async fn retrieve_attempt_history(
    State(state): State<AppState>,
    Json(req): Json<AttemptHistoryRequest>,
) -> Result<impl IntoResponse, AppError> {
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let history = tokio::time::timeout(
        state.config.event_log_timeout,
        attempt_history::retrieve_attempt_history(
            state.store.as_ref(),
            &state.aggregator,
            state.learning_time.as_ref(),
            req,
            &cancel,
        ),
    )
    .await
    .map_err(|_| {
        tracing::warn!("attempt history timed out after {:?}", state.config.event_log_timeout);
        AppError::Cancelled("attempt history timed out".to_string())
    })??;

    Ok(Json(history))
}
