//! Codec error types.

use thiserror::Error;

/// Errors produced while decoding inbound frames or encoding outbound ones.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The frame was not valid JSON, or not a JSON object.
    #[error("malformed frame: {0}")]
    Malformed(#[source] serde_json::Error),
    /// The frame had no `type` field, or it was not a string.
    #[error("frame is missing a string \"type\" field")]
    MissingType,
    /// The `id` field was present but was not a string.
    #[error("frame \"id\" must be a string")]
    InvalidId,
    /// The `connection_init` payload was not a JSON object.
    #[error("connection_init payload must be an object")]
    InvalidInitPayload,
    /// The `start` payload did not match `{query, variables, operationName}`.
    #[error("invalid operation payload: {0}")]
    InvalidOperation(#[source] serde_json::Error),
    /// An outbound frame could not be serialized.
    #[error("failed to encode frame: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Result type for codec operations.
pub type Result<T> = std::result::Result<T, CodecError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn json_error() -> serde_json::Error {
        serde_json::from_str::<serde_json::Value>("{oops").unwrap_err()
    }

    #[test]
    fn malformed_display_includes_cause() {
        let err = CodecError::Malformed(json_error());
        assert!(err.to_string().starts_with("malformed frame: "));
    }

    #[test]
    fn missing_type_display() {
        assert_eq!(
            CodecError::MissingType.to_string(),
            "frame is missing a string \"type\" field"
        );
    }

    #[test]
    fn invalid_operation_exposes_source() {
        let err = CodecError::InvalidOperation(json_error());
        assert!(std::error::Error::source(&err).is_some());
    }
}
