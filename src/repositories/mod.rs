pub(crate) mod attempt_logs;
pub(crate) mod subjects;
pub(crate) mod task_answers;
