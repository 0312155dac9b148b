use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;

pub const MAX_TITLE_CHARS: usize = 140;
pub const MAX_DESCRIPTION_CHARS: usize = 520;

/// Plain `{ message }` body returned by liveness checks.
#[derive(Serialize, utoipa::ToSchema)]
pub struct MessageResponse {
    #[schema(example = "The materials service is working properly!")]
    pub message: String,
}

/// Parse a path identifier.
pub fn parse_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::Validation("Invalid ID format".into()))
}

/// Build the error reported when required form fields are absent.
pub fn missing_fields(missing: &[&str]) -> String {
    format!("Missing required fields: {}", missing.join(", "))
}

/// Check a trimmed text field is between 1 and `max` characters.
pub fn validate_text(field: &str, value: &str, max: usize) -> Result<(), String> {
    let len = value.trim().chars().count();
    if len == 0 || len > max {
        return Err(format!("{field} must be 1-{max} characters"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_text_bounds() {
        assert!(validate_text("title", "Intro", MAX_TITLE_CHARS).is_ok());
        assert!(validate_text("title", "   ", MAX_TITLE_CHARS).is_err());
        assert!(validate_text("title", &"x".repeat(141), MAX_TITLE_CHARS).is_err());
        assert!(validate_text("title", &"é".repeat(140), MAX_TITLE_CHARS).is_ok());
    }

    #[test]
    fn parse_id_rejects_garbage() {
        assert!(parse_id("not-a-uuid").is_err());
        assert!(parse_id(&Uuid::now_v7().to_string()).is_ok());
    }
}
