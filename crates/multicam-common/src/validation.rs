//! Input validation utilities.

use validator::Validate;

use crate::error::MulticamError;

/// Validate a request body, returning a MulticamError::Validation on failure.
pub fn validate_request<T: Validate>(body: &T) -> Result<(), MulticamError> {
    body.validate().map_err(|e| MulticamError::Validation {
        message: format_validation_errors(e),
    })
}

/// Format validation errors into a human-readable string.
fn format_validation_errors(errors: validator::ValidationErrors) -> String {
    let mut messages = errors
        .field_errors()
        .iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| {
                e.message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("Invalid value for '{field}'"))
            })
        })
        .collect::<Vec<_>>();
    messages.sort();
    messages.dedup();
    messages.join("; ")
}

/// Validate a room name: non-empty, at most 128 characters, letters, digits, `-` and `_`.
pub fn validate_room_name(name: &str) -> Result<(), MulticamError> {
    if name.trim().is_empty() {
        return Err(MulticamError::validation("Room name cannot be empty"));
    }

    if name.len() > 128 {
        return Err(MulticamError::validation(
            "Room name must be at most 128 characters",
        ));
    }

    let valid = name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_');

    if !valid {
        return Err(MulticamError::validation(
            "Room name can only contain letters, numbers, hyphens and underscores",
        ));
    }

    Ok(())
}
