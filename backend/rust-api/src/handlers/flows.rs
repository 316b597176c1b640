use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Extension, Json,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::{
    error::AppError,
    extractors::AppJson,
    middlewares::auth::JwtClaims,
    models::flows::StudyCoachingRequest,
    services::{flows::coaching_input, AppState},
};

/// POST /api/v1/flows/{flow}
///
/// One endpoint for every stateless flow; the body shape depends on the flow.
pub async fn run_flow(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(flow): Path<String>,
    AppJson(body): AppJson<Value>,
) -> Result<impl IntoResponse, AppError> {
    let flows = &state.flows;
    tracing::debug!(uid = %claims.sub, flow = %flow, "Running flow");

    let output = match flow.as_str() {
        "quiz" => to_json(flows.generate_interactive_quiz(&input(body)?).await?),
        "quiz-reflection" => to_json(flows.generate_quiz_reflection(&input(body)?).await?),
        "exam-blueprint" => to_json(flows.generate_exam_blueprint(&input(body)?).await?),
        "study-summary" => to_json(flows.summarize_study_material(&input(body)?).await?),
        "writing-feedback" => to_json(flows.review_writing(&input(body)?).await?),
        "concept-explainer" => to_json(flows.explain_concept(&input(body)?).await?),
        "study-coaching" => {
            let request: StudyCoachingRequest = input(body)?;
            let profile = state.profiles.get_profile(&claims.sub).await?;
            let coaching = coaching_input(request, &profile.study_data);
            to_json(flows.generate_study_coaching(&coaching).await?)
        }
        other => return Err(AppError::not_found(format!("Unknown flow: {}", other))),
    }?;

    Ok(Json(output))
}

fn input<T: DeserializeOwned>(body: Value) -> Result<T, AppError> {
    serde_json::from_value(body).map_err(|e| AppError::validation(format!("Invalid flow input: {}", e)))
}

fn to_json<T: Serialize>(output: T) -> Result<Value, AppError> {
    serde_json::to_value(output).map_err(|e| AppError::Internal(e.into()))
}
