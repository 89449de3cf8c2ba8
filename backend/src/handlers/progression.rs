// src/handlers/progression.rs

use axum::{
    Json,
    extract::{Query, State},
    response::IntoResponse,
};

use crate::{
    error::AppError,
    models::progression::{StudyPlanItemIdentity, UpsertProgressionRequest},
    services::tracker,
    state::AppState,
};

/// Saves the resume checkpoint of a study plan item. Last write wins.
pub async fn upsert_progression(
    State(state): State<AppState>,
    Json(req): Json<UpsertProgressionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let progression = tracker::upsert_progression(state.store.as_ref(), req).await?;
    Ok(Json(progression))
}

pub async fn get_progression(
    State(state): State<AppState>,
    Query(identity): Query<StudyPlanItemIdentity>,
) -> Result<impl IntoResponse, AppError> {
    let progression = tracker::get_progression(state.store.as_ref(), &identity).await?;
    Ok(Json(progression))
}
