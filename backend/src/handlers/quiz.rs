// src/handlers/quiz.rs

use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};

use crate::{
    error::AppError,
    models::quiz_test::{
        CreateQuizTestRequest, RetryQuizTestRequest, SubmissionHistoryQuery, SubmitAnswerRequest,
    },
    services::{quiz_test, tracker},
    state::AppState,
};

/// Opens or resumes an attempt and returns the requested page.
///
/// * Resumes `shuffled_quiz_set_id` when given, or the attempt the session already opened.
/// * Otherwise creates an attempt with a fresh clock seed.
/// * Options of MCQ/MAQ/ORD quizzes come back in the attempt's display order.
pub async fn create_quiz_test(
    State(state): State<AppState>,
    Json(req): Json<CreateQuizTestRequest>,
) -> Result<impl IntoResponse, AppError> {
    let page = quiz_test::create_or_resume_quiz_page(
        state.store.as_ref(),
        state.question_groups.as_ref(),
        req,
    )
    .await?;

    Ok(Json(page))
}

/// Opens a retry of an attempt holding only the quizzes not yet answered correctly.
pub async fn create_retry_quiz_test(
    State(state): State<AppState>,
    Json(req): Json<RetryQuizTestRequest>,
) -> Result<impl IntoResponse, AppError> {
    let page = quiz_test::create_retry_quiz_page(
        state.store.as_ref(),
        state.question_groups.as_ref(),
        req,
    )
    .await?;

    Ok(Json(page))
}

/// Grades one answer and records it on the attempt.
pub async fn submit_answer(
    State(state): State<AppState>,
    Path(shuffled_quiz_set_id): Path<String>,
    Json(req): Json<SubmitAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    let record = tracker::submit_answer(
        state.store.as_ref(),
        &state.grader,
        &shuffled_quiz_set_id,
        req,
    )
    .await?;

    Ok(Json(record))
}

/// Replays a page of an attempt with submitted answers and answer keys.
pub async fn list_submissions(
    State(state): State<AppState>,
    Path(shuffled_quiz_set_id): Path<String>,
    Query(query): Query<SubmissionHistoryQuery>,
) -> Result<impl IntoResponse, AppError> {
    let page = quiz_test::retrieve_submission_history(
        state.store.as_ref(),
        state.question_groups.as_ref(),
        &state.grader,
        &shuffled_quiz_set_id,
        query.into(),
    )
    .await?;

    Ok(Json(page))
}
