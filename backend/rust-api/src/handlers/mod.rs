use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose, Engine as _};
use serde_json::{json, Map, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::metrics;
use crate::services::AppState;

pub mod auth;
pub mod flows;
pub mod profile;
pub mod quizzes;
pub mod sse;
pub mod webhooks;

pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let profile_store = check_dependency("Profile store", async {
        state.profiles.ping().await.map_err(|e| e.to_string())
    })
    .await;
    let token_store = check_dependency("Token store", async {
        state.auth.ping().await.map_err(|e| format!("{:#}", e))
    })
    .await;

    let all_healthy = [&profile_store, &token_store]
        .iter()
        .all(|dep| dep.get("status").and_then(Value::as_str) == Some("healthy"));
    let (status_code, status) = if all_healthy {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        status_code,
        Json(json!({
            "status": status,
            "service": "studyforge-api",
            "version": env!("CARGO_PKG_VERSION"),
            "active_quizzes": state.quizzes.active_count().await,
            "dependencies": {
                "profile_store": profile_store,
                "token_store": token_store,
            }
        })),
    )
}

async fn check_dependency<F>(name: &str, ping: F) -> Map<String, Value>
where
    F: Future<Output = Result<(), String>>,
{
    let mut result = Map::new();
    match tokio::time::timeout(Duration::from_secs(1), ping).await {
        Ok(Ok(())) => {
            result.insert("status".to_string(), json!("healthy"));
        }
        Ok(Err(e)) => {
            tracing::warn!("{} health check failed: {}", name, e);
            result.insert("status".to_string(), json!("unhealthy"));
            result.insert("error".to_string(), json!(format!("{} error: {}", name, e)));
        }
        Err(_) => {
            result.insert("status".to_string(), json!("unhealthy"));
            result.insert("error".to_string(), json!(format!("{} timeout after 1s", name)));
        }
    }
    result
}

pub async fn metrics_handler() -> impl IntoResponse {
    match metrics::render_metrics() {
        Ok(metrics_text) => (StatusCode::OK, metrics_text),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to render metrics: {}", e),
        ),
    }
}

/// HTTP Basic auth in front of `/metrics`.
pub async fn metrics_auth_middleware(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let encoded = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "))
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let decoded = general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|_| StatusCode::UNAUTHORIZED)?;
    let credentials = String::from_utf8(decoded).map_err(|_| StatusCode::UNAUTHORIZED)?;

    if credentials != state.config.metrics_credentials {
        tracing::warn!("Rejected metrics scrape with wrong credentials");
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(next.run(request).await)
}
