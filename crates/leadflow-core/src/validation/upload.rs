use crate::error::AppError;

pub const MAX_UPLOAD_ID_LENGTH: usize = 255;

/// Upload ids travel in URLs and store keys, so the accepted alphabet is
/// kept narrow: ASCII alphanumerics, hyphens, and underscores.
pub fn validate_upload_id(upload_id: &str) -> Result<(), AppError> {
    if upload_id.is_empty() {
        return Err(AppError::Validation("Upload id cannot be empty".to_string()));
    }
    if upload_id.len() > MAX_UPLOAD_ID_LENGTH {
        return Err(AppError::Validation(format!(
            "Upload id cannot exceed {} characters",
            MAX_UPLOAD_ID_LENGTH
        )));
    }
    if !upload_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(AppError::Validation(
            "Upload id may only contain letters, digits, hyphens, and underscores".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_upload_ids() {
        for id in ["upload-1", "a", "UP_LOAD_2024", "550e8400-e29b-41d4"] {
            assert!(validate_upload_id(id).is_ok(), "{id:?} should be valid");
        }
    }

    #[test]
    fn test_invalid_upload_ids() {
        assert!(validate_upload_id("").is_err());
        assert!(validate_upload_id("has space").is_err());
        assert!(validate_upload_id("slash/id").is_err());
        assert!(validate_upload_id("dotted.id").is_err());
        assert!(validate_upload_id(&"x".repeat(MAX_UPLOAD_ID_LENGTH + 1)).is_err());
        assert!(validate_upload_id(&"x".repeat(MAX_UPLOAD_ID_LENGTH)).is_ok());
    }
}
