use std::sync::Arc;

use crate::core::config::Settings;
use crate::services::answer_store::AnswerStore;
use crate::tasks::runner::EvaluationRunner;

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    store: Arc<dyn AnswerStore>,
    runner: EvaluationRunner,
}

impl AppState {
    pub(crate) fn new(
        settings: Settings,
        store: Arc<dyn AnswerStore>,
        runner: EvaluationRunner,
    ) -> Self {
        Self { inner: Arc::new(InnerState { settings, store, runner }) }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn store(&self) -> &dyn AnswerStore {
        self.inner.store.as_ref()
    }

    pub(crate) fn runner(&self) -> &EvaluationRunner {
        &self.inner.runner
    }
}
