mod orchestrator;
mod policy;


pub(crate) use orchestrator::{Orchestrator, RunSummary};
pub(crate) use policy::EvaluationPolicy;
