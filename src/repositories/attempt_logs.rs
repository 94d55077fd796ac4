use sqlx::PgPool;

use crate::db::models::EvaluationAttemptLog;
use crate::db::types::AnswerStatus;

/// Appends `entry` only while its run still holds the claim on the answer.
/// `false` means the claim was released and possibly taken by another run.
pub(crate) async fn insert_for_claim(
    pool: &PgPool,
    entry: &EvaluationAttemptLog,
) -> Result<bool, sqlx::Error> {
    let inserted = sqlx::query(
        "INSERT INTO evaluation_attempt_logs (
            id, run_id, task_answer_id, question_id, attempt, outcome, prompt_tokens,
            completion_tokens, total_tokens, duration_seconds, model, error, created_at
         )
         SELECT $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13
         WHERE EXISTS (
             SELECT 1 FROM task_answers
             WHERE id = $3 AND status = $14 AND claimed_by = $2
         )",
    )
    .bind(entry.id)
    .bind(entry.run_id)
    .bind(entry.task_answer_id)
    .bind(entry.question_id)
    .bind(entry.attempt)
    .bind(entry.outcome)
    .bind(entry.prompt_tokens)
    .bind(entry.completion_tokens)
    .bind(entry.total_tokens)
    .bind(entry.duration_seconds)
    .bind(entry.model.as_deref())
    .bind(entry.error.as_deref())
    .bind(entry.created_at)
    .bind(AnswerStatus::InProgress)
    .execute(pool)
    .await?;

    Ok(inserted.rows_affected() == 1)
}
