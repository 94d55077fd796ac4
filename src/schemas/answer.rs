use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::models::TaskAnswer;
use crate::repositories::task_answers::AccuracyCounts;

#[derive(Debug, Serialize)]
pub(crate) struct AnswerVerdictResponse {
    pub(crate) task_answer_id: Uuid,
    pub(crate) correct: bool,
}

impl AnswerVerdictResponse {
    /// `None` for answers without a verdict.
    pub(crate) fn from_db(answer: &TaskAnswer) -> Option<Self> {
        answer
            .status
            .verdict()
            .map(|correct| Self { task_answer_id: answer.id, correct })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct AccuracyQuery {
    #[serde(default)]
    pub(crate) subject_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AccuracyResponse {
    pub(crate) subject_id: Option<Uuid>,
    pub(crate) evaluated: i64,
    pub(crate) with_ground_truth: i64,
    pub(crate) matching: i64,
    /// Share of labelled answers whose verdict matches `ground_truth`.
    pub(crate) accuracy: Option<f64>,
}

impl AccuracyResponse {
    pub(crate) fn from_counts(subject_id: Option<Uuid>, counts: AccuracyCounts) -> Self {
        let accuracy = (counts.with_ground_truth > 0)
            .then(|| counts.matching as f64 / counts.with_ground_truth as f64);
        Self {
            subject_id,
            evaluated: counts.evaluated,
            with_ground_truth: counts.with_ground_truth,
            matching: counts.matching,
            accuracy,
        }
    }
}
