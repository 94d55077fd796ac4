use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};

use crate::api::errors::ApiError;
use crate::api::validation::parse_uuid;
use crate::core::state::AppState;
use crate::schemas::evaluation::EvaluationAccepted;
use crate::services::answer_store::EvaluationScope;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/all-answers", post(evaluate_all))
        .route("/subject/:subject_id", post(evaluate_subject))
}

async fn evaluate_all(State(state): State<AppState>) -> (StatusCode, Json<EvaluationAccepted>) {
    let run_id = state.runner().schedule(EvaluationScope::All).await;
    accepted("Evaluation of all pending answers started", run_id)
}

async fn evaluate_subject(
    State(state): State<AppState>,
    Path(subject_id): Path<String>,
) -> Result<(StatusCode, Json<EvaluationAccepted>), ApiError> {
    let subject_id = parse_uuid(&subject_id, "subject_id")?;
    let run_id = state.runner().schedule(EvaluationScope::Subject(subject_id)).await;
    Ok(accepted(&format!("Evaluation of subject {subject_id} started"), run_id))
}

fn accepted(message: &str, run_id: uuid::Uuid) -> (StatusCode, Json<EvaluationAccepted>) {
    (StatusCode::ACCEPTED, Json(EvaluationAccepted { message: message.to_string(), run_id }))
}
