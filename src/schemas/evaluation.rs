use serde::Serialize;
use uuid::Uuid;

/// Acknowledgement for a scheduled run. The run itself completes later.
#[derive(Debug, Serialize)]
pub(crate) struct EvaluationAccepted {
    pub(crate) message: String,
    pub(crate) run_id: Uuid,
}
