pub(crate) mod evaluation;
pub(crate) mod runner;
