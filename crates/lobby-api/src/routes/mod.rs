pub mod auth;
pub mod conversations;
pub mod messages;
pub mod users;

use crate::error::ApiError;

/// Snowflake ids travel as strings; parse them back at the edge.
pub(crate) fn parse_id(raw: &str, what: &str) -> Result<i64, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid {what}")))
}
