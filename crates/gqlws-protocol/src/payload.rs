//! Typed payload bodies.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{CodecError, Result};

/// Body of a `start` frame.
///
/// `variables` and `operationName` may be absent or `null`; accessors
/// normalize them to an empty map and an empty string.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationPayload {
    /// Query document text.
    pub query: String,
    /// Variable values keyed by name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<Map<String, Value>>,
    /// Operation to execute when the document holds several.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
}

impl OperationPayload {
    /// Decode a `start` payload. A missing payload is treated as `null`.
    pub fn decode(payload: Option<Value>) -> Result<Self> {
        serde_json::from_value(payload.unwrap_or(Value::Null)).map_err(CodecError::InvalidOperation)
    }

    /// Split into `(query, operation_name, variables)`.
    pub fn into_parts(self) -> (String, String, Map<String, Value>) {
        (
            self.query,
            self.operation_name.unwrap_or_default(),
            self.variables.unwrap_or_default(),
        )
    }
}

/// Body of `error` and `connection_error` frames.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Human-readable description.
    pub message: String,
}

impl ErrorPayload {
    /// Build from anything displayable.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn decode_full_payload() {
        let p = OperationPayload::decode(Some(json!({
            "query": "subscription { x }",
            "variables": {"a": 1},
            "operationName": "X"
        })))
        .unwrap();
        assert_eq!(p.query, "subscription { x }");
        assert_eq!(p.variables.as_ref().unwrap()["a"], 1);
        assert_eq!(p.operation_name.as_deref(), Some("X"));
    }

    #[test]
    fn decode_query_only() {
        let p = OperationPayload::decode(Some(json!({"query": "sub{x}"}))).unwrap();
        let (query, name, vars) = p.into_parts();
        assert_eq!(query, "sub{x}");
        assert!(name.is_empty());
        assert!(vars.is_empty());
    }

    #[test]
    fn null_variables_and_name_normalize() {
        let p = OperationPayload::decode(Some(json!({
            "query": "q",
            "variables": null,
            "operationName": null
        })))
        .unwrap();
        let (_, name, vars) = p.into_parts();
        assert!(name.is_empty());
        assert!(vars.is_empty());
    }

    #[test]
    fn missing_query_is_rejected() {
        let err = OperationPayload::decode(Some(json!({"variables": {}}))).unwrap_err();
        assert_matches!(err, CodecError::InvalidOperation(_));
    }

    #[test]
    fn missing_payload_is_rejected() {
        let err = OperationPayload::decode(None).unwrap_err();
        assert_matches!(err, CodecError::InvalidOperation(_));
    }

    #[test]
    fn non_object_variables_rejected() {
        let err = OperationPayload::decode(Some(json!({"query": "q", "variables": [1, 2]})))
            .unwrap_err();
        assert_matches!(err, CodecError::InvalidOperation(_));
    }

    #[test]
    fn error_payload_shape() {
        let v = serde_json::to_value(ErrorPayload::new("boom")).unwrap();
        assert_eq!(v, json!({"message": "boom"}));
    }
}
