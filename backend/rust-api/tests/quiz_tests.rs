use axum::http::StatusCode;
use serde_json::{json, Value};

mod common;

use common::{create_test_app, quiz_reply, register, send};
use studyforge_api::services::flows::model::ModelError;

fn generate_body(count: u32) -> Value {
    json!({
        "name": "Cell Biology",
        "source_document": "Cells are the basic unit of life.",
        "question_count": count,
    })
}

async fn answer(app: &axum::Router, token: &str, quiz_id: &str, option: &str) -> Value {
    let base = format!("/api/v1/quizzes/{}", quiz_id);
    let (status, _) = send(
        app,
        "POST",
        &format!("{}/selection", base),
        Some(token),
        Some(json!({ "option": option })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, feedback) =
        send(app, "POST", &format!("{}/submit", base), Some(token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(feedback["state"], "answered");

    let (status, next) = send(app, "POST", &format!("{}/advance", base), Some(token), None).await;
    assert_eq!(status, StatusCode::OK);
    next
}

#[tokio::test]
async fn test_perfect_quiz_end_to_end() {
    let app = create_test_app(vec![
        Ok(quiz_reply(3)),
        Ok(json!({ "reflection_text": "Strong work on cell structure." })),
    ]);
    let token = register(&app.router, "ada@example.com").await;

    let (status, created) = send(
        &app.router,
        "POST",
        "/api/v1/quizzes",
        Some(&token),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["state"], "idle");
    let quiz_id = created["quiz_id"].as_str().unwrap().to_string();

    let (status, active) = send(
        &app.router,
        "POST",
        &format!("/api/v1/quizzes/{}/generate", quiz_id),
        Some(&token),
        Some(generate_body(3)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(active["state"], "active");
    assert_eq!(active["total_questions"], 3);
    assert_eq!(active["question"]["options"].as_array().unwrap().len(), 4);
    assert!(active["question"].get("answer").is_none());

    answer(&app.router, &token, &quiz_id, "right 0").await;
    answer(&app.router, &token, &quiz_id, "right 1").await;
    let finished = answer(&app.router, &token, &quiz_id, "right 2").await;

    assert_eq!(finished["state"], "finished");
    assert_eq!(finished["result"]["score"], 3);
    assert_eq!(finished["persistence"]["persisted"], true);

    let (_, profile) = send(&app.router, "GET", "/api/v1/profile", Some(&token), None).await;
    let data = &profile["study_data"];
    assert_eq!(data["xp"], 130);
    assert_eq!(data["past_quizzes"].as_array().unwrap().len(), 1);
    assert_eq!(data["past_quizzes"][0]["score"], 3);
    assert_eq!(
        data["past_quizzes"][0]["reflection"],
        "Strong work on cell structure."
    );
    let ids: Vec<&str> = data["achievements"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|a| a["id"].as_str())
        .collect();
    assert!(ids.contains(&"first_quiz_completed"));
    assert!(ids.contains(&"perfect_quiz_cell_biology"));

    let (status, reset) = send(
        &app.router,
        "POST",
        &format!("/api/v1/quizzes/{}/reset", quiz_id),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reset["state"], "idle");
}

#[tokio::test]
async fn test_state_rules_are_enforced() {
    let app = create_test_app(vec![Ok(quiz_reply(2))]);
    let token = register(&app.router, "ada@example.com").await;
    let (_, created) = send(&app.router, "POST", "/api/v1/quizzes", Some(&token), Some(json!({}))).await;
    let base = format!("/api/v1/quizzes/{}", created["quiz_id"].as_str().unwrap());

    // Nothing to submit before generation
    let (status, body) = send(&app.router, "POST", &format!("{}/submit", base), Some(&token), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["status"], 409);

    let (status, _) = send(
        &app.router,
        "POST",
        &format!("{}/generate", base),
        Some(&token),
        Some(json!({ "source_document": "Photosynthesis", "question_count": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    send(&app.router, "POST", &format!("{}/generate", base), Some(&token), Some(generate_body(2))).await;

    let (status, _) = send(&app.router, "POST", &format!("{}/submit", base), Some(&token), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(
        &app.router,
        "POST",
        &format!("{}/selection", base),
        Some(&token),
        Some(json!({ "option": "not an option" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Reset is only allowed from idle or finished
    let (status, _) = send(&app.router, "POST", &format!("{}/reset", base), Some(&token), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_generation_failure_returns_to_idle() {
    let app = create_test_app(vec![Err(ModelError::EmptyResponse)]);
    let token = register(&app.router, "ada@example.com").await;
    let (_, created) = send(&app.router, "POST", "/api/v1/quizzes", Some(&token), Some(json!({}))).await;
    let base = format!("/api/v1/quizzes/{}", created["quiz_id"].as_str().unwrap());

    let (status, body) = send(
        &app.router,
        "POST",
        &format!("{}/generate", base),
        Some(&token),
        Some(generate_body(3)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["status"], 502);

    let (status, view) = send(&app.router, "GET", &base, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["state"], "idle");
    assert!(view["last_error"].as_str().is_some());

    let (_, profile) = send(&app.router, "GET", "/api/v1/profile", Some(&token), None).await;
    assert_eq!(profile["study_data"]["past_quizzes"], json!([]));
}

#[tokio::test]
async fn test_quiz_is_private_and_can_be_deleted() {
    let app = create_test_app(vec![Ok(quiz_reply(1))]);
    let owner = register(&app.router, "ada@example.com").await;
    let other = register(&app.router, "grace@example.com").await;

    let (_, created) = send(&app.router, "POST", "/api/v1/quizzes", Some(&owner), Some(json!({}))).await;
    let base = format!("/api/v1/quizzes/{}", created["quiz_id"].as_str().unwrap());

    let (status, _) = send(&app.router, "GET", &base, Some(&other), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app.router, "DELETE", &base, Some(&other), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app.router, "DELETE", &base, Some(&owner), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app.router, "GET", &base, Some(&owner), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app.router,
        "GET",
        "/api/v1/quizzes/does-not-exist/stream",
        Some(&owner),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_open_sessions_are_capped_per_user() {
    let app = create_test_app(vec![]);
    let token = register(&app.router, "ada@example.com").await;
    let limit = app.state.config.quiz.max_sessions_per_owner;

    for _ in 0..limit {
        let (status, _) =
            send(&app.router, "POST", "/api/v1/quizzes", Some(&token), Some(json!({}))).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) =
        send(&app.router, "POST", "/api/v1/quizzes", Some(&token), Some(json!({}))).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["status"], 429);
}
