use axum::http::StatusCode;
use serde_json::json;

mod common;

use common::{create_test_app, register, send};

#[tokio::test]
async fn test_register_creates_profile() {
    let app = create_test_app(vec![]);
    let (status, body) = send(
        &app.router,
        "POST",
        "/api/v1/auth/register",
        None,
        Some(json!({ "email": "Ada@Example.com", "password": "correct horse battery" })),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["expires_in"], 3600);
    assert_eq!(body["profile"]["email"], "ada@example.com");
    assert_eq!(body["profile"]["study_data"]["level"], 1);
    assert_eq!(body["profile"]["study_data"]["xp"], 0);
    assert!(body.get("login").is_none());
}

#[tokio::test]
async fn test_register_rejects_duplicates_and_bad_input() {
    let app = create_test_app(vec![]);
    register(&app.router, "ada@example.com").await;

    let (status, body) = send(
        &app.router,
        "POST",
        "/api/v1/auth/register",
        None,
        Some(json!({ "email": "ada@example.com", "password": "another password" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["status"], 409);

    let (status, body) = send(
        &app.router,
        "POST",
        "/api/v1/auth/register",
        None,
        Some(json!({ "email": "not-an-email", "password": "short" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("Validation error"));
}

#[tokio::test]
async fn test_login_records_streak() {
    let app = create_test_app(vec![]);
    register(&app.router, "ada@example.com").await;

    let (status, body) = send(
        &app.router,
        "POST",
        "/api/v1/auth/login",
        None,
        Some(json!({ "email": "ada@example.com", "password": "correct horse battery" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["access_token"].as_str().is_some());
    assert_eq!(body["login"]["change"], "reset");
    assert_eq!(body["login"]["login_streak"], 1);
    assert_eq!(body["profile"]["study_data"]["coins"], 5);

    // Same day again: nothing changes
    let (_, body) = send(
        &app.router,
        "POST",
        "/api/v1/auth/login",
        None,
        Some(json!({ "email": "ada@example.com", "password": "correct horse battery" })),
    )
    .await;
    assert_eq!(body["login"]["change"], "unchanged");
    assert_eq!(body["profile"]["study_data"]["coins"], 5);
}

#[tokio::test]
async fn test_login_with_wrong_password() {
    let app = create_test_app(vec![]);
    register(&app.router, "ada@example.com").await;

    let (status, body) = send(
        &app.router,
        "POST",
        "/api/v1/auth/login",
        None,
        Some(json!({ "email": "ada@example.com", "password": "wrong password" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid email or password");

    let (status, _) = send(
        &app.router,
        "POST",
        "/api/v1/auth/login",
        None,
        Some(json!({ "email": "nobody@example.com", "password": "whatever" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_me_requires_token() {
    let app = create_test_app(vec![]);
    let token = register(&app.router, "ada@example.com").await;

    let (status, body) = send(&app.router, "GET", "/api/v1/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "ada@example.com");

    let (status, body) = send(&app.router, "GET", "/api/v1/auth/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], 401);

    let (status, _) = send(
        &app.router,
        "GET",
        "/api/v1/auth/me",
        Some("not.a.token"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_revokes_token() {
    let app = create_test_app(vec![]);
    let token = register(&app.router, "ada@example.com").await;

    let (status, _) = send(&app.router, "POST", "/api/v1/auth/logout", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app.router, "GET", "/api/v1/profile", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Token has been revoked");
}
