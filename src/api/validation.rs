use uuid::Uuid;

use crate::api::errors::ApiError;

pub(crate) fn parse_uuid(raw: &str, field: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| ApiError::BadRequest(format!("Invalid {field}: expected a UUID")))
}
