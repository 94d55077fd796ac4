pub(crate) mod api;
pub(crate) mod core;
pub(crate) mod db;
pub(crate) mod repositories;
pub(crate) mod schemas;
pub(crate) mod services;
pub(crate) mod tasks;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use anyhow::Context;
use uuid::Uuid;

use crate::core::{config::Settings, state::AppState, telemetry};
use crate::services::ai_judgment::LlmJudgmentClient;
use crate::services::answer_store::{AnswerStore, EvaluationScope, PgAnswerStore};
use crate::tasks::evaluation::{EvaluationPolicy, Orchestrator};
use crate::tasks::runner::EvaluationRunner;

struct Runtime {
    settings: Settings,
    store: Arc<dyn AnswerStore>,
    orchestrator: Orchestrator,
}

async fn bootstrap() -> anyhow::Result<Runtime> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let db_pool = db::init_pool(&settings).await.context("Failed to connect to Postgres")?;
    db::run_migrations(&db_pool).await.context("Failed to apply migrations")?;

    let store: Arc<dyn AnswerStore> = Arc::new(PgAnswerStore::new(db_pool));
    let judge = Arc::new(LlmJudgmentClient::from_settings(&settings)?);
    let orchestrator =
        Orchestrator::new(store.clone(), judge, EvaluationPolicy::from_settings(&settings));

    Ok(Runtime { settings, store, orchestrator })
}

/// Serves the HTTP API until a shutdown signal, then drains in-flight runs.
pub async fn run() -> anyhow::Result<()> {
    let Runtime { settings, store, orchestrator } = bootstrap().await?;
    let grace = settings.evaluation().shutdown_grace();

    let runner = EvaluationRunner::new(orchestrator);
    let state = AppState::new(settings, store, runner.clone());
    let app = api::router::router(state.clone());
    let listener = tokio::net::TcpListener::bind(state.settings().server_addr())
        .await
        .context("Failed to bind HTTP listener")?;

    tracing::info!(
        host = %state.settings().server_host(),
        port = state.settings().server_port(),
        environment = %state.settings().runtime().environment.as_str(),
        model = %state.settings().ai().ai_model,
        "Answer evaluator API listening"
    );

    let result =
        axum::serve(listener, app).with_graceful_shutdown(core::shutdown::shutdown_signal()).await;

    runner.drain(grace).await;
    tracing::info!("Evaluation runs drained");

    result?;

    Ok(())
}

/// Runs a single evaluation pass in the foreground, for cron-style use.
/// `subject_id` restricts the pass to one subject.
pub async fn run_once(subject_id: Option<&str>) -> anyhow::Result<()> {
    let scope = match subject_id {
        Some(raw) => EvaluationScope::Subject(
            Uuid::parse_str(raw.trim()).with_context(|| format!("Invalid subject id '{raw}'"))?,
        ),
        None => EvaluationScope::All,
    };

    let Runtime { orchestrator, .. } = bootstrap().await?;
    let summary = orchestrator.run(Uuid::new_v4(), scope).await?;

    if summary.errored > 0 {
        tracing::warn!(errored = summary.errored, "Some answers could not be evaluated");
    }

    Ok(())
}
