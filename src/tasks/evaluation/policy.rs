use std::time::Duration;

use crate::core::config::Settings;

const MAX_BACKOFF: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub(crate) struct EvaluationPolicy {
    pub(crate) max_attempts: u32,
    pub(crate) backoff_base: Duration,
    pub(crate) call_timeout: Duration,
    pub(crate) concurrency: usize,
    pub(crate) claim_lease: Option<Duration>,
}

impl EvaluationPolicy {
    pub(crate) fn from_settings(settings: &Settings) -> Self {
        let evaluation = settings.evaluation();
        Self {
            max_attempts: evaluation.max_attempts.max(1),
            backoff_base: evaluation.backoff_base(),
            call_timeout: settings.ai().request_timeout(),
            concurrency: evaluation.concurrency.max(1),
            claim_lease: evaluation.claim_lease(),
        }
    }

    /// Delay after the failed `attempt` (1-based): base, 2x base, 4x base, ...
    pub(crate) fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.backoff_base.saturating_mul(1 << exponent).min(MAX_BACKOFF)
    }

    /// Longest a single answer can stay claimed by a live run: every attempt
    /// hits the call timeout and every retry waits its full backoff.
    pub(crate) fn worst_case_answer_time(&self) -> Duration {
        let calls = self.call_timeout.saturating_mul(self.max_attempts);
        (1..self.max_attempts)
            .map(|attempt| self.backoff_for(attempt))
            .fold(calls, Duration::saturating_add)
    }
}
