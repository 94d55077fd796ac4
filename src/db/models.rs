use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::PrimitiveDateTime;
use uuid::Uuid;

use crate::db::types::{AnswerStatus, AttemptOutcome};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct TaskAnswer {
    pub(crate) id: Uuid,
    pub(crate) question_id: Uuid,
    pub(crate) student_id: Uuid,
    pub(crate) answer: String,
    pub(crate) ground_truth: Option<bool>,
    pub(crate) status: AnswerStatus,
    pub(crate) claimed_at: Option<PrimitiveDateTime>,
    pub(crate) evaluated_at: Option<PrimitiveDateTime>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

/// A pending answer joined with the question content needed to judge it.
#[derive(Debug, Clone, FromRow)]
pub(crate) struct PendingAnswer {
    pub(crate) id: Uuid,
    pub(crate) question_id: Uuid,
    pub(crate) subject_id: Uuid,
    pub(crate) answer: String,
    pub(crate) question_text: String,
    pub(crate) preferred_answer: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct EvaluationAttemptLog {
    pub(crate) id: Uuid,
    pub(crate) run_id: Uuid,
    pub(crate) task_answer_id: Uuid,
    pub(crate) question_id: Uuid,
    pub(crate) attempt: i32,
    pub(crate) outcome: AttemptOutcome,
    pub(crate) prompt_tokens: i64,
    pub(crate) completion_tokens: i64,
    pub(crate) total_tokens: i64,
    pub(crate) duration_seconds: f64,
    pub(crate) model: Option<String>,
    pub(crate) error: Option<String>,
    pub(crate) created_at: PrimitiveDateTime,
}
