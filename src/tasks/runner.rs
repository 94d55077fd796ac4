use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::services::answer_store::EvaluationScope;
use crate::tasks::evaluation::Orchestrator;

/// Background executor for evaluation runs triggered over HTTP.
#[derive(Clone)]
pub(crate) struct EvaluationRunner {
    orchestrator: Orchestrator,
    runs: Arc<Mutex<JoinSet<()>>>,
}

impl EvaluationRunner {
    pub(crate) fn new(orchestrator: Orchestrator) -> Self {
        Self { orchestrator, runs: Arc::new(Mutex::new(JoinSet::new())) }
    }

    /// Starts a run in the background and returns its id immediately.
    pub(crate) async fn schedule(&self, scope: EvaluationScope) -> Uuid {
        let run_id = Uuid::new_v4();
        let orchestrator = self.orchestrator.clone();

        let mut runs = self.runs.lock().await;
        while let Some(finished) = runs.try_join_next() {
            if let Err(err) = finished {
                tracing::error!(error = %err, "Evaluation run task join failed");
            }
        }
        runs.spawn(async move {
            // The orchestrator logs the outcome of every run, including failures.
            let _ = orchestrator.run(run_id, scope).await;
        });
        tracing::debug!(%run_id, %scope, active_runs = runs.len(), "Evaluation run scheduled");

        run_id
    }

    /// Waits up to `grace` for in-flight runs, then aborts the rest. Answers
    /// claimed by an aborted run stay `in_progress` until a lease reclaims them.
    pub(crate) async fn drain(&self, grace: Duration) {
        let mut runs = self.runs.lock().await;
        if runs.is_empty() {
            return;
        }
        tracing::info!(active_runs = runs.len(), "Waiting for evaluation runs to finish");

        let waited = tokio::time::timeout(grace, async {
            while let Some(joined) = runs.join_next().await {
                if let Err(err) = joined {
                    tracing::error!(error = %err, "Evaluation run task join failed");
                }
            }
        })
        .await;

        if waited.is_err() {
            tracing::warn!(
                active_runs = runs.len(),
                grace_seconds = grace.as_secs(),
                "Shutdown grace period elapsed; aborting evaluation runs"
            );
            runs.shutdown().await;
        }
    }
}
