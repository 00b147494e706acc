//! Request-shape validation applied at the store boundary, before any
//! uniqueness or referential checks run.

use crate::constants::system;
use crate::error::{Result, StoreError};

/// Validate a resource name: non-empty, within length bounds, no leading or
/// trailing whitespace.
pub fn validate_name(kind: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(StoreError::Validation(format!("{kind} name must not be empty")));
    }
    if name.len() > system::MAX_NAME_LENGTH {
        return Err(StoreError::Validation(format!(
            "{kind} name exceeds {} characters",
            system::MAX_NAME_LENGTH
        )));
    }
    if name.trim() != name {
        return Err(StoreError::Validation(format!(
            "{kind} name must not have surrounding whitespace"
        )));
    }
    Ok(())
}

/// Validate an artifact URI: non-empty and within length bounds.
pub fn validate_uri(uri: &str) -> Result<()> {
    if uri.is_empty() {
        return Err(StoreError::Validation("artifact uri must not be empty".into()));
    }
    if uri.len() > system::MAX_URI_LENGTH {
        return Err(StoreError::Validation(format!(
            "artifact uri exceeds {} characters",
            system::MAX_URI_LENGTH
        )));
    }
    Ok(())
}

/// Validate that a configuration field holds a JSON object.
pub fn validate_json_object(field: &str, value: &serde_json::Value) -> Result<()> {
    if !value.is_object() {
        return Err(StoreError::Validation(format!("{field} must be a JSON object")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rejects_empty_and_padded_names() {
        assert!(validate_name("stack", "").is_err());
        assert!(validate_name("stack", " padded ").is_err());
        assert!(validate_name("stack", "local-stack").is_ok());
    }

    #[test]
    fn rejects_oversized_names() {
        let long = "x".repeat(system::MAX_NAME_LENGTH + 1);
        assert!(validate_name("pipeline", &long).is_err());
    }

    #[test]
    fn configuration_must_be_an_object() {
        assert!(validate_json_object("configuration", &json!({"a": 1})).is_ok());
        assert!(validate_json_object("configuration", &json!([1, 2])).is_err());
    }
}
