pub(crate) mod answers;
pub(crate) mod errors;
pub(crate) mod evaluation;
pub(crate) mod handlers;
pub(crate) mod router;
pub(crate) mod validation;
