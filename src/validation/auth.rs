use crate::error::{AppError, Result};

/// Longest identifier accepted by the login form.
pub const MAX_IDENTIFIER_LEN: usize = 255;
/// Longest password accepted by the login form. Bounds the work one request
/// can push into the hasher.
pub const MAX_PASSWORD_LEN: usize = 1024;

/// Validates a submitted login identifier.
///
/// Only shape is checked here; whether the identifier exists is decided by the
/// authenticator and never reported back.
///
/// # Arguments
///
/// * `identifier` - The identifier to validate.
///
/// # Returns
///
/// A `Result<()>` indicating whether the identifier is acceptable.
pub fn validate_identifier(identifier: &str) -> Result<()> {
    if identifier.trim().is_empty() {
        return Err(AppError::Validation("Identifier is required".to_string()));
    }

    if identifier.len() > MAX_IDENTIFIER_LEN {
        return Err(AppError::Validation(format!(
            "Identifier must be at most {} characters",
            MAX_IDENTIFIER_LEN
        )));
    }

    if identifier.chars().any(char::is_control) {
        return Err(AppError::Validation(
            "Identifier contains invalid characters".to_string(),
        ));
    }

    Ok(())
}

/// Validates a submitted password.
pub fn validate_password(password: &str) -> Result<()> {
    if password.is_empty() {
        return Err(AppError::Validation("Password is required".to_string()));
    }

    if password.len() > MAX_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "Password must be at most {} characters",
            MAX_PASSWORD_LEN
        )));
    }

    Ok(())
}
