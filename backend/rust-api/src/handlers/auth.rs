use axum::{extract::State, http::StatusCode, response::IntoResponse, Extension, Json};
use serde_json::json;
use std::sync::Arc;

use crate::{
    error::AppError,
    extractors::ValidJson,
    middlewares::auth::JwtClaims,
    models::account::{LoginRequest, RegisterRequest},
    services::{auth_service::AuthService, AppState},
};

/// POST /api/v1/auth/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    ValidJson(req): ValidJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    tracing::info!("Registering new user: {}", req.email);
    let response = state.auth.register(req).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /api/v1/auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    ValidJson(req): ValidJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let response = state.auth.login(req).await?;
    Ok(Json(response))
}

/// POST /api/v1/auth/logout
pub async fn logout(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<impl IntoResponse, AppError> {
    state.auth.logout(&claims).await?;
    Ok(Json(json!({ "message": "Signed out" })))
}

/// GET /api/v1/auth/me
pub async fn get_current_user(Extension(claims): Extension<JwtClaims>) -> impl IntoResponse {
    Json(AuthService::current_user(&claims))
}
