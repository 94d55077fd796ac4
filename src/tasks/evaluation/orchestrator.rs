use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio::task::JoinSet;
use uuid::Uuid;

use super::policy::EvaluationPolicy;
use crate::core::time::{lease_cutoff, primitive_now_utc};
use crate::db::models::{EvaluationAttemptLog, PendingAnswer};
use crate::db::types::{AnswerStatus, AttemptOutcome};
use crate::services::ai_judgment::{JudgmentClient, JudgmentError, JudgmentRequest};
use crate::services::answer_store::{AnswerStore, EvaluationScope, StoreError};

/// Counters for one run. `claimed` counts answers this run claimed;
/// `skipped` counts selected answers another run claimed first; `lost`
/// counts claims released by a lease before this run could record them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct RunSummary {
    pub(crate) released_claims: u64,
    pub(crate) selected: usize,
    pub(crate) claimed: usize,
    pub(crate) skipped: usize,
    pub(crate) lost: usize,
    pub(crate) correct: usize,
    pub(crate) incorrect: usize,
    pub(crate) errored: usize,
}

impl RunSummary {
    fn absorb(&mut self, other: RunSummary) {
        self.claimed += other.claimed;
        self.skipped += other.skipped;
        self.lost += other.lost;
        self.correct += other.correct;
        self.incorrect += other.incorrect;
        self.errored += other.errored;
    }

    fn record(&mut self, status: AnswerStatus) {
        self.claimed += 1;
        match status {
            AnswerStatus::Correct => self.correct += 1,
            AnswerStatus::Incorrect => self.incorrect += 1,
            _ => self.errored += 1,
        }
    }
}

#[derive(Default)]
struct WorkerReport {
    summary: RunSummary,
    error: Option<StoreError>,
}

enum Disposition {
    Skipped,
    Lost,
    Finished(AnswerStatus),
}

#[derive(Debug, Clone, Copy)]
struct Target {
    run_id: Uuid,
    task_answer_id: Uuid,
    question_id: Uuid,
}

#[derive(Clone)]
pub(crate) struct Orchestrator {
    store: Arc<dyn AnswerStore>,
    judge: Arc<dyn JudgmentClient>,
    policy: EvaluationPolicy,
}

impl Orchestrator {
    pub(crate) fn new(
        store: Arc<dyn AnswerStore>,
        judge: Arc<dyn JudgmentClient>,
        policy: EvaluationPolicy,
    ) -> Self {
        Self { store, judge, policy }
    }

    /// Evaluates every answer in `scope` that is `pending` when selected.
    ///
    /// Answers are claimed one at a time with a conditional update, so
    /// overlapping runs split the work instead of repeating it. A judgment
    /// failure only affects its own answer; a store failure stops the run and
    /// leaves the answer being processed in `in_progress`.
    pub(crate) async fn run(
        &self,
        run_id: Uuid,
        scope: EvaluationScope,
    ) -> Result<RunSummary, StoreError> {
        let timer = Instant::now();
        let scope_label = match scope {
            EvaluationScope::All => "all",
            EvaluationScope::Subject(_) => "subject",
        };
        tracing::info!(%run_id, %scope, "Evaluation run started");
        metrics::counter!("evaluation_runs_total", "scope" => scope_label).increment(1);

        let result = self.execute(run_id, scope).await;
        let elapsed = timer.elapsed().as_secs_f64();
        metrics::histogram!("evaluation_run_duration_seconds").record(elapsed);

        match &result {
            Ok(summary) => tracing::info!(
                %run_id,
                %scope,
                selected = summary.selected,
                claimed = summary.claimed,
                skipped = summary.skipped,
                lost = summary.lost,
                correct = summary.correct,
                incorrect = summary.incorrect,
                errored = summary.errored,
                duration_seconds = elapsed,
                "Evaluation run finished"
            ),
            Err(err) => {
                metrics::counter!("evaluation_runs_failed_total").increment(1);
                tracing::error!(%run_id, %scope, error = %err, "Evaluation run aborted");
            }
        }

        result
    }

    async fn execute(&self, run_id: Uuid, scope: EvaluationScope) -> Result<RunSummary, StoreError> {
        let mut summary = RunSummary::default();

        if let Some(lease) = self.policy.claim_lease {
            let now = primitive_now_utc();
            if let Some(cutoff) = lease_cutoff(now, lease) {
                summary.released_claims = self.store.release_stale_claims(cutoff, now).await?;
            }
            if summary.released_claims > 0 {
                tracing::warn!(
                    %run_id,
                    released = summary.released_claims,
                    lease_seconds = lease.as_secs(),
                    "Released expired claims back to pending"
                );
            }
        }

        if let EvaluationScope::Subject(subject_id) = scope {
            if !self.store.subject_exists(subject_id).await? {
                tracing::warn!(%run_id, %subject_id, "Subject not found; nothing to evaluate");
                return Ok(summary);
            }
        }

        let candidates = self.store.select_pending(scope).await?;
        summary.selected = candidates.len();
        if candidates.is_empty() {
            tracing::info!(%run_id, %scope, "No pending answers");
            return Ok(summary);
        }

        let queue = Arc::new(Mutex::new(VecDeque::from(candidates)));
        let aborted = Arc::new(AtomicBool::new(false));
        let worker_count = self.policy.concurrency.min(summary.selected).max(1);

        let mut workers = JoinSet::new();
        for _ in 0..worker_count {
            let orchestrator = self.clone();
            let queue = queue.clone();
            let aborted = aborted.clone();
            workers.spawn(async move { orchestrator.drain_queue(run_id, queue, aborted).await });
        }

        let mut first_error = None;
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(report) => {
                    summary.absorb(report.summary);
                    if first_error.is_none() {
                        first_error = report.error;
                    }
                }
                Err(err) => {
                    tracing::error!(%run_id, error = %err, "Evaluation worker terminated abnormally");
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(summary),
        }
    }

    async fn drain_queue(
        &self,
        run_id: Uuid,
        queue: Arc<Mutex<VecDeque<PendingAnswer>>>,
        aborted: Arc<AtomicBool>,
    ) -> WorkerReport {
        let mut report = WorkerReport::default();

        loop {
            if aborted.load(Ordering::Acquire) {
                break;
            }
            let Some(answer) = queue.lock().await.pop_front() else {
                break;
            };

            match self.process(run_id, answer).await {
                Ok(Disposition::Skipped) => report.summary.skipped += 1,
                Ok(Disposition::Lost) => {
                    report.summary.claimed += 1;
                    report.summary.lost += 1;
                }
                Ok(Disposition::Finished(status)) => report.summary.record(status),
                Err(err) => {
                    aborted.store(true, Ordering::Release);
                    report.error = Some(err);
                    break;
                }
            }
        }

        report
    }

    async fn process(&self, run_id: Uuid, answer: PendingAnswer) -> Result<Disposition, StoreError> {
        if !self.store.try_claim(answer.id, run_id, primitive_now_utc()).await? {
            tracing::debug!(
                %run_id,
                task_answer_id = %answer.id,
                subject_id = %answer.subject_id,
                "Answer claimed elsewhere; skipping"
            );
            metrics::counter!("evaluation_claims_skipped_total").increment(1);
            return Ok(Disposition::Skipped);
        }

        let target =
            Target { run_id, task_answer_id: answer.id, question_id: answer.question_id };
        let request = JudgmentRequest {
            task_answer_id: answer.id,
            question: answer.question_text,
            preferred_answer: answer.preferred_answer,
            answer: answer.answer,
        };

        tracing::debug!(
            %run_id,
            task_answer_id = %answer.id,
            subject_id = %answer.subject_id,
            "Answer claimed"
        );

        let Some(status) = self.judge_claimed(target, &request).await? else {
            return Ok(Disposition::Lost);
        };
        metrics::counter!("evaluation_answers_total", "status" => status.as_str()).increment(1);

        Ok(Disposition::Finished(status))
    }

    /// `None` when the claim was released under this run and the answer now
    /// belongs to someone else; nothing is recorded in that case.
    async fn judge_claimed(
        &self,
        target: Target,
        request: &JudgmentRequest,
    ) -> Result<Option<AnswerStatus>, StoreError> {
        let mut attempt = 0;

        loop {
            attempt += 1;
            let timer = Instant::now();
            let result =
                match tokio::time::timeout(self.policy.call_timeout, self.judge.evaluate(request))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(JudgmentError::Transient(format!(
                        "Judgment call timed out after {}s",
                        self.policy.call_timeout.as_secs_f64()
                    ))),
                };
            let elapsed = timer.elapsed();
            metrics::histogram!("evaluation_judgment_duration_seconds")
                .record(elapsed.as_secs_f64());

            let err = match result {
                Ok(judgment) => {
                    let outcome = AttemptOutcome::from_verdict(judgment.is_correct);
                    let entry = EvaluationAttemptLog {
                        prompt_tokens: judgment.usage.prompt_tokens,
                        completion_tokens: judgment.usage.completion_tokens,
                        total_tokens: judgment.usage.total_tokens,
                        model: Some(judgment.model),
                        ..attempt_entry(target, attempt, outcome, judgment.latency)
                    };
                    if !self.store.append_attempt_log(&entry).await? {
                        return Ok(self.claim_lost(target, attempt));
                    }
                    metrics::counter!("evaluation_attempts_total", "outcome" => outcome.as_str())
                        .increment(1);
                    metrics::counter!("evaluation_tokens_total")
                        .increment(u64::try_from(entry.total_tokens).unwrap_or(0));

                    let status = AnswerStatus::from_verdict(judgment.is_correct);
                    self.finish(target, status).await?;
                    tracing::info!(
                        run_id = %target.run_id,
                        task_answer_id = %target.task_answer_id,
                        attempt,
                        status = status.as_str(),
                        "Answer evaluated"
                    );
                    return Ok(Some(status));
                }
                Err(err) => err,
            };

            let (outcome, retry) = match &err {
                JudgmentError::Transient(_) => {
                    (AttemptOutcome::TransientError, attempt < self.policy.max_attempts)
                }
                JudgmentError::Permanent(_) => (AttemptOutcome::PermanentError, false),
            };
            let entry = EvaluationAttemptLog {
                error: Some(err.detail().to_string()),
                ..attempt_entry(target, attempt, outcome, elapsed)
            };
            if !self.store.append_attempt_log(&entry).await? {
                return Ok(self.claim_lost(target, attempt));
            }
            metrics::counter!("evaluation_attempts_total", "outcome" => outcome.as_str())
                .increment(1);

            if retry {
                let delay = self.policy.backoff_for(attempt);
                tracing::warn!(
                    run_id = %target.run_id,
                    task_answer_id = %target.task_answer_id,
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "Transient judgment failure; retrying"
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            tracing::error!(
                run_id = %target.run_id,
                task_answer_id = %target.task_answer_id,
                attempts = attempt,
                error = %err,
                "Answer evaluation failed"
            );
            self.finish(target, AnswerStatus::Error).await?;
            return Ok(Some(AnswerStatus::Error));
        }
    }

    fn claim_lost(&self, target: Target, attempt: u32) -> Option<AnswerStatus> {
        metrics::counter!("evaluation_claims_lost_total").increment(1);
        tracing::warn!(
            run_id = %target.run_id,
            task_answer_id = %target.task_answer_id,
            attempt,
            "Claim was released before the attempt was recorded; dropping the result"
        );
        None
    }

    async fn finish(&self, target: Target, status: AnswerStatus) -> Result<(), StoreError> {
        let applied = self
            .store
            .apply_outcome(target.task_answer_id, target.run_id, status, primitive_now_utc())
            .await?;
        if !applied {
            tracing::warn!(
                run_id = %target.run_id,
                task_answer_id = %target.task_answer_id,
                status = status.as_str(),
                "Answer is no longer claimed by this run; outcome not applied"
            );
        }
        Ok(())
    }
}

fn attempt_entry(
    target: Target,
    attempt: u32,
    outcome: AttemptOutcome,
    duration: Duration,
) -> EvaluationAttemptLog {
    EvaluationAttemptLog {
        id: Uuid::new_v4(),
        run_id: target.run_id,
        task_answer_id: target.task_answer_id,
        question_id: target.question_id,
        attempt: i32::try_from(attempt).unwrap_or(i32::MAX),
        outcome,
        prompt_tokens: 0,
        completion_tokens: 0,
        total_tokens: 0,
        duration_seconds: duration.as_secs_f64(),
        model: None,
        error: None,
        created_at: primitive_now_utc(),
    }
}
