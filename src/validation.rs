use crate::error::{AppError, AppResult};

/// Maximum length for record identifiers (aircraft, regulations).
pub const MAX_ID_LENGTH: usize = 64;

/// Maximum regulations accepted in one compliance check.
pub const MAX_REGULATIONS_PER_CHECK: usize = 50;

/// Validate a record identifier taken from a path or request body.
///
/// Rules:
/// - Must be between 1 and 64 characters
/// - Must start and end with an alphanumeric character
/// - Can contain alphanumeric characters, dots, underscores, and hyphens
pub fn validate_record_id(id: &str, record_type: &str) -> AppResult<()> {
    if id.is_empty() {
        return Err(AppError::BadRequest(format!("{record_type} id cannot be empty")));
    }

    if id.len() > MAX_ID_LENGTH {
        return Err(AppError::BadRequest(format!(
            "{record_type} id cannot exceed {MAX_ID_LENGTH} characters"
        )));
    }

    let bytes = id.as_bytes();
    if !bytes.first().is_some_and(u8::is_ascii_alphanumeric)
        || !bytes.last().is_some_and(u8::is_ascii_alphanumeric)
    {
        return Err(AppError::BadRequest(format!(
            "{record_type} id must start and end with an alphanumeric character"
        )));
    }

    if let Some((i, c)) = id
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
    {
        return Err(AppError::BadRequest(format!(
            "{record_type} id contains invalid character '{c}' at position {i}. \
             Only alphanumeric characters, dots, underscores, and hyphens are allowed"
        )));
    }

    Ok(())
}

/// Validate the regulation list of a compliance check.
pub fn validate_regulation_ids(ids: &[String]) -> AppResult<()> {
    if ids.len() > MAX_REGULATIONS_PER_CHECK {
        return Err(AppError::BadRequest(format!(
            "At most {MAX_REGULATIONS_PER_CHECK} regulations can be checked at once"
        )));
    }
    ids.iter()
        .try_for_each(|id| validate_record_id(id, "Regulation"))
}
