use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};

use crate::api::errors::ApiError;
use crate::api::validation::parse_uuid;
use crate::core::state::AppState;
use crate::schemas::answer::{AccuracyQuery, AccuracyResponse, AnswerVerdictResponse};
use crate::services::answer_store::EvaluationScope;

pub(crate) fn router() -> Router<AppState> {
    Router::new().route("/all", get(list_verdicts)).route("/accuracy", get(accuracy))
}

async fn list_verdicts(
    State(state): State<AppState>,
) -> Result<Json<Vec<AnswerVerdictResponse>>, ApiError> {
    let answers = state
        .store()
        .list_evaluated()
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list evaluated answers"))?;

    Ok(Json(answers.iter().filter_map(AnswerVerdictResponse::from_db).collect()))
}

async fn accuracy(
    State(state): State<AppState>,
    Query(query): Query<AccuracyQuery>,
) -> Result<Json<AccuracyResponse>, ApiError> {
    let subject_id = query
        .subject_id
        .as_deref()
        .filter(|raw| !raw.trim().is_empty())
        .map(|raw| parse_uuid(raw, "subject_id"))
        .transpose()?;
    let scope = subject_id.map_or(EvaluationScope::All, EvaluationScope::Subject);

    let counts = state
        .store()
        .accuracy(scope)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to compute accuracy"))?;

    Ok(Json(AccuracyResponse::from_counts(subject_id, counts)))
}
