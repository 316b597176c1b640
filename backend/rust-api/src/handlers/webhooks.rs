use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::sync::Arc;

use crate::{
    error::AppError,
    models::webhook::{WebhookAck, WebhookProvider},
    services::AppState,
};

/// POST /api/webhooks/heygen
pub async fn heygen_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    receive(&state, WebhookProvider::HeyGen, &headers, &body)
}

/// POST /api/webhooks/synthesia
pub async fn synthesia_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    receive(&state, WebhookProvider::Synthesia, &headers, &body)
}

/// GET on either webhook path, used by providers to probe the URL.
pub async fn webhook_probe() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

fn receive(
    state: &AppState,
    provider: WebhookProvider,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Json<WebhookAck>, AppError> {
    let signature = provider
        .signature_header()
        .and_then(|name| headers.get(name))
        .and_then(|value| value.to_str().ok());
    let ack = state.webhooks.acknowledge(provider, signature, body)?;
    Ok(Json(ack))
}
