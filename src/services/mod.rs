pub(crate) mod ai_judgment;
pub(crate) mod answer_store;
