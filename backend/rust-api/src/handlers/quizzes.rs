use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use std::sync::Arc;

use crate::{
    error::AppError,
    extractors::{AppJson, ValidJson},
    middlewares::auth::JwtClaims,
    models::quiz::{CreateQuizRequest, GenerateQuizRequest, SelectOptionRequest},
    services::AppState,
};

/// POST /api/v1/quizzes
pub async fn create_quiz(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    ValidJson(req): ValidJson<CreateQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    let handle = state.quizzes.create(&claims.sub, req.name).await?;
    let snapshot = handle.view().await?;
    Ok((StatusCode::CREATED, Json(snapshot)))
}

/// GET /api/v1/quizzes/{id}
pub async fn get_quiz(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(quiz_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let handle = state.quizzes.get(&quiz_id, &claims.sub).await?;
    Ok(Json(handle.view().await?))
}

/// POST /api/v1/quizzes/{id}/generate
///
/// Returns once questions are in hand; the body is the first active view.
pub async fn generate_quiz(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(quiz_id): Path<String>,
    ValidJson(req): ValidJson<GenerateQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    let handle = state.quizzes.get(&quiz_id, &claims.sub).await?;
    tracing::info!(
        quiz_id = %quiz_id,
        question_count = req.question_count,
        timed = req.minutes_per_question.is_some(),
        "Generating quiz"
    );
    Ok(Json(handle.generate(req).await?))
}

/// POST /api/v1/quizzes/{id}/selection
pub async fn select_option(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(quiz_id): Path<String>,
    AppJson(req): AppJson<SelectOptionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let handle = state.quizzes.get(&quiz_id, &claims.sub).await?;
    Ok(Json(handle.select(req.option).await?))
}

/// POST /api/v1/quizzes/{id}/submit
pub async fn submit_answer(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(quiz_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let handle = state.quizzes.get(&quiz_id, &claims.sub).await?;
    Ok(Json(handle.submit().await?))
}

/// POST /api/v1/quizzes/{id}/advance
pub async fn advance_quiz(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(quiz_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let handle = state.quizzes.get(&quiz_id, &claims.sub).await?;
    Ok(Json(handle.advance().await?))
}

/// POST /api/v1/quizzes/{id}/reset
pub async fn reset_quiz(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(quiz_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let handle = state.quizzes.get(&quiz_id, &claims.sub).await?;
    Ok(Json(handle.reset().await?))
}

/// DELETE /api/v1/quizzes/{id}
pub async fn delete_quiz(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(quiz_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    state.quizzes.remove(&quiz_id, &claims.sub).await?;
    Ok(StatusCode::NO_CONTENT)
}
