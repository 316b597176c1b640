#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use studyforge_api::{
    config::{AiConfig, Config, QuizConfig, WebhookConfig},
    create_router,
    services::{
        account_store::InMemoryAccountStore,
        flows::model::{ModelError, ScriptedModel},
        profile_store::InMemoryProfileStore,
        revocation::InMemoryRevocationList,
        AppState, Backends,
    },
};
use tower::ServiceExt;

pub const HEYGEN_SECRET: &str = "test-heygen-secret";

pub fn test_config() -> Config {
    Config {
        environment: "test".to_string(),
        server_addr: "127.0.0.1:0".to_string(),
        mongo_uri: "mongodb://localhost:27017".to_string(),
        mongo_database: "studyforge_test".to_string(),
        redis_uri: "redis://127.0.0.1:6379/1".to_string(),
        jwt_secret: "integration-test-secret".to_string(),
        access_token_ttl_seconds: 3600,
        metrics_credentials: "metrics:secret".to_string(),
        ai: AiConfig {
            api_key: "unused".to_string(),
            base_url: "http://127.0.0.1:9".to_string(),
            model: "scripted".to_string(),
            temperature: 0.4,
            timeout_seconds: 5,
        },
        webhooks: WebhookConfig {
            heygen_secret: Some(HEYGEN_SECRET.to_string()),
            synthesia_api_key: None,
        },
        quiz: QuizConfig::default(),
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub model: Arc<ScriptedModel>,
}

/// Router over in-memory stores and a model that answers from `replies`.
pub fn create_test_app(replies: Vec<Result<Value, ModelError>>) -> TestApp {
    create_test_app_with(test_config(), replies)
}

pub fn create_test_app_with(config: Config, replies: Vec<Result<Value, ModelError>>) -> TestApp {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    let model = Arc::new(ScriptedModel::new(replies));
    let backends = Backends {
        profiles: Arc::new(InMemoryProfileStore::new()),
        accounts: Arc::new(InMemoryAccountStore::new()),
        revocations: Arc::new(InMemoryRevocationList::new()),
        model: model.clone(),
    };
    let state = Arc::new(AppState::for_tests(config, backends));
    TestApp {
        router: create_router(state.clone()),
        state,
        model,
    }
}

pub fn quiz_reply(count: usize) -> Value {
    let questions: Vec<_> = (0..count)
        .map(|i| {
            json!({
                "question": format!("Question {}", i),
                "answer": format!("right {}", i),
                "options": [format!("right {}", i), "wrong a", "wrong b", "wrong c"],
            })
        })
        .collect();
    json!({ "questions": questions })
}

pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };
    (status, value)
}

/// Registers `email` and returns its access token.
pub async fn register(app: &Router, email: &str) -> String {
    let (status, body) = send(
        app,
        "POST",
        "/api/v1/auth/register",
        None,
        Some(json!({ "email": email, "password": "correct horse battery" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "register failed: {}", body);
    body["access_token"].as_str().unwrap().to_string()
}
