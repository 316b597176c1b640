use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Extension, Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::{
    error::AppError,
    extractors::{AppJson, ValidJson},
    middlewares::auth::JwtClaims,
    models::profile::{LogStudySessionRequest, UpdatePlanRequest},
    services::AppState,
};

#[derive(Debug, Deserialize)]
pub struct PastQuizzesQuery {
    pub limit: Option<usize>,
}

/// GET /api/v1/profile
pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<impl IntoResponse, AppError> {
    let profile = state.profiles.get_profile(&claims.sub).await?;
    Ok(Json(profile))
}

/// POST /api/v1/profile/login
pub async fn record_login(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = state.profiles.record_login(&claims.sub, Utc::now()).await?;
    Ok(Json(outcome))
}

/// POST /api/v1/profile/study-sessions
pub async fn log_study_session(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    ValidJson(req): ValidJson<LogStudySessionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let study_data = state
        .profiles
        .log_study_session(&claims.sub, &req, Utc::now())
        .await?;
    Ok(Json(study_data))
}

/// PUT /api/v1/profile/plan
pub async fn update_plan(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    AppJson(req): AppJson<UpdatePlanRequest>,
) -> Result<impl IntoResponse, AppError> {
    let profile = state.profiles.set_plan(&claims.sub, req.plan).await?;
    Ok(Json(profile))
}

/// GET /api/v1/profile/quizzes
pub async fn list_past_quizzes(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Query(query): Query<PastQuizzesQuery>,
) -> Result<impl IntoResponse, AppError> {
    let profile = state.profiles.get_profile(&claims.sub).await?;
    let mut quizzes = profile.study_data.past_quizzes;
    if let Some(limit) = query.limit {
        quizzes.truncate(limit);
    }
    Ok(Json(json!({
        "total": quizzes.len(),
        "quizzes": quizzes,
    })))
}

/// GET /api/v1/profile/achievements
pub async fn list_achievements(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<impl IntoResponse, AppError> {
    let profile = state.profiles.get_profile(&claims.sub).await?;
    Ok(Json(json!({
        "xp": profile.study_data.xp,
        "level": profile.study_data.level,
        "coins": profile.study_data.coins,
        "achievements": profile.study_data.achievements,
    })))
}
