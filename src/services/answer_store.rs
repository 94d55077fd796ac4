use std::fmt;

use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use time::PrimitiveDateTime;
use uuid::Uuid;

use crate::db::models::{EvaluationAttemptLog, PendingAnswer, TaskAnswer};
use crate::db::types::AnswerStatus;
use crate::repositories;
use crate::repositories::task_answers::AccuracyCounts;

/// Selection filter for one orchestration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EvaluationScope {
    All,
    Subject(Uuid),
}

impl EvaluationScope {
    pub(crate) fn subject_id(self) -> Option<Uuid> {
        match self {
            Self::All => None,
            Self::Subject(id) => Some(id),
        }
    }
}

impl fmt::Display for EvaluationScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Subject(id) => write!(f, "subject:{id}"),
        }
    }
}

#[derive(Debug, Error)]
pub(crate) enum StoreError {
    #[error("answer store query failed: {0}")]
    Database(#[from] sqlx::Error),
}

/// Durable answer state. Every method is a single atomic statement; callers
/// never hold a transaction across an AI call.
#[async_trait]
pub(crate) trait AnswerStore: Send + Sync {
    async fn select_pending(&self, scope: EvaluationScope)
        -> Result<Vec<PendingAnswer>, StoreError>;

    /// Conditional `pending -> in_progress` owned by `run_id`; `false` when the
    /// row was not pending.
    async fn try_claim(
        &self,
        id: Uuid,
        run_id: Uuid,
        now: PrimitiveDateTime,
    ) -> Result<bool, StoreError>;

    /// Moves a claimed answer to a terminal status; `false` when it is no longer
    /// `in_progress` under `run_id`.
    async fn apply_outcome(
        &self,
        id: Uuid,
        run_id: Uuid,
        status: AnswerStatus,
        evaluated_at: PrimitiveDateTime,
    ) -> Result<bool, StoreError>;

    /// Records one attempt; `false` (and nothing written) when `entry.run_id`
    /// no longer holds the claim on the answer.
    async fn append_attempt_log(&self, entry: &EvaluationAttemptLog) -> Result<bool, StoreError>;

    /// Returns `in_progress` answers claimed before `cutoff` to `pending` and
    /// drops their owner.
    async fn release_stale_claims(
        &self,
        cutoff: PrimitiveDateTime,
        now: PrimitiveDateTime,
    ) -> Result<u64, StoreError>;

    async fn subject_exists(&self, id: Uuid) -> Result<bool, StoreError>;

    async fn list_evaluated(&self) -> Result<Vec<TaskAnswer>, StoreError>;

    async fn accuracy(&self, scope: EvaluationScope) -> Result<AccuracyCounts, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

#[derive(Debug, Clone)]
pub(crate) struct PgAnswerStore {
    pool: PgPool,
}

impl PgAnswerStore {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AnswerStore for PgAnswerStore {
    async fn select_pending(
        &self,
        scope: EvaluationScope,
    ) -> Result<Vec<PendingAnswer>, StoreError> {
        Ok(repositories::task_answers::list_pending(&self.pool, scope.subject_id()).await?)
    }

    async fn try_claim(
        &self,
        id: Uuid,
        run_id: Uuid,
        now: PrimitiveDateTime,
    ) -> Result<bool, StoreError> {
        Ok(repositories::task_answers::claim(&self.pool, id, run_id, now).await?)
    }

    async fn apply_outcome(
        &self,
        id: Uuid,
        run_id: Uuid,
        status: AnswerStatus,
        evaluated_at: PrimitiveDateTime,
    ) -> Result<bool, StoreError> {
        debug_assert!(status.is_terminal(), "outcome must be terminal, got {status:?}");
        Ok(repositories::task_answers::finish(&self.pool, id, run_id, status, evaluated_at)
            .await?)
    }

    async fn append_attempt_log(&self, entry: &EvaluationAttemptLog) -> Result<bool, StoreError> {
        Ok(repositories::attempt_logs::insert_for_claim(&self.pool, entry).await?)
    }

    async fn release_stale_claims(
        &self,
        cutoff: PrimitiveDateTime,
        now: PrimitiveDateTime,
    ) -> Result<u64, StoreError> {
        Ok(repositories::task_answers::release_claimed_before(&self.pool, cutoff, now).await?)
    }

    async fn subject_exists(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(repositories::subjects::exists(&self.pool, id).await?)
    }

    async fn list_evaluated(&self) -> Result<Vec<TaskAnswer>, StoreError> {
        Ok(repositories::task_answers::list_with_verdict(&self.pool).await?)
    }

    async fn accuracy(&self, scope: EvaluationScope) -> Result<AccuracyCounts, StoreError> {
        Ok(repositories::task_answers::accuracy_counts(&self.pool, scope.subject_id()).await?)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::time::primitive_now_utc;
    use crate::db::types::AttemptOutcome;
    use crate::test_support;

    #[test]
    fn scope_display() {
        let id = Uuid::nil();
        assert_eq!(EvaluationScope::All.to_string(), "all");
        assert_eq!(
            EvaluationScope::Subject(id).to_string(),
            "subject:00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(EvaluationScope::All.subject_id(), None);
    }

    #[tokio::test]
    async fn postgres_claim_is_conditional() {
        let Some(pool) = test_support::postgres_pool().await else {
            return;
        };
        let store = PgAnswerStore::new(pool.clone());

        let seeded = test_support::seed_postgres_question(&pool, "2+2=?", Some("4"), &["4", "5"])
            .await
            .expect("seed");
        let scope = EvaluationScope::Subject(seeded.subject_id);

        let pending = store.select_pending(scope).await.expect("select");
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].answer, "4");
        assert_eq!(pending[0].id, seeded.answer_ids[0]);
        assert_eq!(pending[0].question_id, seeded.question_id);

        let first = pending[0].id;
        let run_id = Uuid::new_v4();
        let now = primitive_now_utc();
        assert!(store.try_claim(first, run_id, now).await.expect("claim"));
        assert!(!store.try_claim(first, Uuid::new_v4(), now).await.expect("second claim"));
        assert_eq!(store.select_pending(scope).await.expect("select").len(), 1);

        let entry = |run_id: Uuid| EvaluationAttemptLog {
            id: Uuid::new_v4(),
            run_id,
            task_answer_id: first,
            question_id: pending[0].question_id,
            attempt: 1,
            outcome: AttemptOutcome::Correct,
            prompt_tokens: 10,
            completion_tokens: 2,
            total_tokens: 12,
            duration_seconds: 0.5,
            model: Some("test-model".to_string()),
            error: None,
            created_at: now,
        };
        assert!(!store.append_attempt_log(&entry(Uuid::new_v4())).await.expect("foreign log"));
        assert!(store.append_attempt_log(&entry(run_id)).await.expect("log"));
        assert!(!store
            .apply_outcome(first, Uuid::new_v4(), AnswerStatus::Incorrect, now)
            .await
            .expect("foreign apply"));
        assert!(store.apply_outcome(first, run_id, AnswerStatus::Correct, now).await.expect("apply"));
        assert!(!store
            .apply_outcome(first, run_id, AnswerStatus::Incorrect, now)
            .await
            .expect("apply"));

        let evaluated = store.list_evaluated().await.expect("list");
        assert!(evaluated.iter().any(|row| row.id == first && row.status == AnswerStatus::Correct));

        let second = seeded.answer_ids[1];
        let stale_run = Uuid::new_v4();
        assert!(store.try_claim(second, stale_run, now).await.expect("claim"));
        let later = now + std::time::Duration::from_secs(120);
        let released = store
            .release_stale_claims(later - std::time::Duration::from_secs(60), later)
            .await
            .expect("release");
        assert!(released >= 1);
        assert_eq!(store.select_pending(scope).await.expect("select").len(), 1);
        assert!(!store
            .apply_outcome(second, stale_run, AnswerStatus::Correct, later)
            .await
            .expect("released apply"));

        let counts = store.accuracy(scope).await.expect("accuracy");
        assert_eq!(counts.evaluated, 1);
        assert_eq!(counts.with_ground_truth, 0);
    }
}
