use sqlx::PgPool;
use time::PrimitiveDateTime;
use uuid::Uuid;

use crate::db::models::{PendingAnswer, TaskAnswer};
use crate::db::types::AnswerStatus;

pub(crate) const COLUMNS: &str = "\
    id, question_id, student_id, answer, ground_truth, status, claimed_at, evaluated_at, \
    created_at, updated_at";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, sqlx::FromRow)]
pub(crate) struct AccuracyCounts {
    pub(crate) evaluated: i64,
    pub(crate) with_ground_truth: i64,
    pub(crate) matching: i64,
}

/// Pending answers, optionally restricted to questions of one subject, oldest first.
pub(crate) async fn list_pending(
    pool: &PgPool,
    subject_id: Option<Uuid>,
) -> Result<Vec<PendingAnswer>, sqlx::Error> {
    sqlx::query_as::<_, PendingAnswer>(
        "SELECT ta.id, ta.question_id, q.subject_id, ta.answer, q.question_text,
                q.preferred_answer
         FROM task_answers ta
         JOIN questions q ON q.id = ta.question_id
         WHERE ta.status = $1
           AND ($2::uuid IS NULL OR q.subject_id = $2)
         ORDER BY ta.created_at, ta.id",
    )
    .bind(AnswerStatus::Pending)
    .bind(subject_id)
    .fetch_all(pool)
    .await
}

/// Conditional `pending -> in_progress`, stamped with the claiming run.
/// `false` means another run got there first.
pub(crate) async fn claim(
    pool: &PgPool,
    id: Uuid,
    run_id: Uuid,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let updated = sqlx::query(
        "UPDATE task_answers
         SET status = $1,
             claimed_by = $2,
             claimed_at = $3,
             updated_at = $3
         WHERE id = $4 AND status = $5",
    )
    .bind(AnswerStatus::InProgress)
    .bind(run_id)
    .bind(now)
    .bind(id)
    .bind(AnswerStatus::Pending)
    .execute(pool)
    .await?;

    Ok(updated.rows_affected() == 1)
}

/// Terminal transition, applied only while `run_id` still holds the claim.
pub(crate) async fn finish(
    pool: &PgPool,
    id: Uuid,
    run_id: Uuid,
    status: AnswerStatus,
    evaluated_at: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let updated = sqlx::query(
        "UPDATE task_answers
         SET status = $1,
             evaluated_at = $2,
             updated_at = $2
         WHERE id = $3 AND status = $4 AND claimed_by = $5",
    )
    .bind(status)
    .bind(evaluated_at)
    .bind(id)
    .bind(AnswerStatus::InProgress)
    .bind(run_id)
    .execute(pool)
    .await?;

    Ok(updated.rows_affected() == 1)
}

pub(crate) async fn release_claimed_before(
    pool: &PgPool,
    cutoff: PrimitiveDateTime,
    now: PrimitiveDateTime,
) -> Result<u64, sqlx::Error> {
    let updated = sqlx::query(
        "UPDATE task_answers
         SET status = $1,
             claimed_by = NULL,
             claimed_at = NULL,
             updated_at = $2
         WHERE status = $3
           AND claimed_at < $4",
    )
    .bind(AnswerStatus::Pending)
    .bind(now)
    .bind(AnswerStatus::InProgress)
    .bind(cutoff)
    .execute(pool)
    .await?;

    Ok(updated.rows_affected())
}

pub(crate) async fn list_with_verdict(pool: &PgPool) -> Result<Vec<TaskAnswer>, sqlx::Error> {
    sqlx::query_as::<_, TaskAnswer>(&format!(
        "SELECT {COLUMNS} FROM task_answers
         WHERE status IN ($1, $2)
         ORDER BY created_at, id"
    ))
    .bind(AnswerStatus::Correct)
    .bind(AnswerStatus::Incorrect)
    .fetch_all(pool)
    .await
}

pub(crate) async fn accuracy_counts(
    pool: &PgPool,
    subject_id: Option<Uuid>,
) -> Result<AccuracyCounts, sqlx::Error> {
    sqlx::query_as::<_, AccuracyCounts>(
        "SELECT COUNT(*) AS evaluated,
                COUNT(*) FILTER (WHERE ta.ground_truth IS NOT NULL) AS with_ground_truth,
                COUNT(*) FILTER (WHERE ta.ground_truth = (ta.status = $1)) AS matching
         FROM task_answers ta
         JOIN questions q ON q.id = ta.question_id
         WHERE ta.status IN ($1, $2)
           AND ($3::uuid IS NULL OR q.subject_id = $3)",
    )
    .bind(AnswerStatus::Correct)
    .bind(AnswerStatus::Incorrect)
    .bind(subject_id)
    .fetch_one(pool)
    .await
}
